extern crate diesel;
extern crate dotenv;

use std::time::Duration;

use actix_cors::Cors;
use actix_web::dev::RequestHead;
use actix_web::http::header::HeaderValue;
use actix_web::{web, App, HttpServer};

use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::AsyncPgConnection;

use once_cell::sync::Lazy;
use pickem_server::api::{account, admin, pick, standings, stats, week};
use pickem_server::util::{cipher_util, rate_limit::RateLimiter};

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use log::warn;
use pickem_server::DbPool;

static CORS_ORIGINS: Lazy<Vec<String>> = Lazy::new(|| {
    std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:5173".to_owned())
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
});

fn cors_check(head: &HeaderValue, _: &RequestHead) -> bool {
    if let Ok(origin) = head.to_str() {
        CORS_ORIGINS.iter().any(|allowed| allowed == origin)
    } else {
        false
    }
}

const LOGIN_RATE_LIMIT: u32 = 20;
const LOGIN_RATE_WINDOW: Duration = Duration::from_secs(60);

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let cookie_token = std::env::var("COOKIE_TOKEN").expect("COOKIE_TOKEN must be set");
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(9000);

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool: DbPool = Pool::builder()
        .build(manager)
        .await
        .expect("Failed to link to db");

    let secret_key = cipher_util::gen_cookie_key(&cookie_token);

    let is_production = match std::env::var("MODE") {
        Ok(mode) if mode == "dev" => {
            warn!("Under development mode.");
            false
        }
        _ => true, // Production mode as default!
    };

    let pool = web::Data::new(pool);
    let limiter = web::Data::new(RateLimiter::new(LOGIN_RATE_LIMIT, LOGIN_RATE_WINDOW));

    HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .app_data(limiter.clone())
            .wrap(
                Cors::default()
                    .allowed_origin_fn(cors_check)
                    .allow_any_header()
                    .allow_any_method()
                    .supports_credentials(),
            )
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_secure(is_production)
                    .cookie_same_site(actix_web::cookie::SameSite::None)
                    .build(),
            )
            .service(account::create_account)
            .service(account::login)
            .service(account::logout)
            .service(account::whoami)
            .service(week::list_weeks)
            .service(week::list_games)
            .service(pick::get_picks)
            .service(pick::submit_picks)
            .service(standings::weekly_standings)
            .service(standings::weekly_standings_detailed)
            .service(standings::weekly_standings_classic)
            .service(standings::overall_standings)
            .service(standings::overall_standings_detailed)
            .service(standings::overall_standings_classic)
            .service(stats::team_stats)
            .service(admin::list_users)
            .service(admin::set_tag)
            .service(admin::set_active)
            .service(admin::submit_picks_for_user)
            .service(admin::run_update)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
