use crate::schema::users;
use crate::util::api_util::*;
use crate::util::rate_limit::RateLimiter;

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::RunQueryDsl;

use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use dotenv::dotenv;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::User;
use crate::util::cipher_util;
use crate::DbPool;

use actix_session::Session;

static LOGIN_TOKEN: Lazy<String> = Lazy::new(|| {
    dotenv().ok();
    env::var("LOGIN_TOKEN").expect("Environment variable LOGIN_TOKEN not set")
});

static SITE_PASSWORD: Lazy<String> = Lazy::new(|| {
    dotenv().ok();
    env::var("SITE_PASSWORD").expect("Environment variable SITE_PASSWORD not set")
});

#[derive(Debug, Deserialize)]
struct CreateAccountRequest {
    email: String,
    nickname: String,
    realname: String,
    // SHA256 of the password.
    password: String,
    site_password: String,
}

impl APIRequest for CreateAccountRequest {
    fn ok(&self) -> bool {
        !self.email.is_empty()
            && self.email.len() <= 255
            && self.email.contains('@')
            && !self.nickname.is_empty()
            && self.nickname.len() <= 64
            && self.realname.len() <= 128
            && self.password.len() == 64
    }
}

#[derive(Debug, Serialize)]
enum CreateAccountResponse {
    // Returns the new user id.
    Success(i32),
    EmailTaken,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    // SHA256 of the password.
    password: String,
}

impl APIRequest for LoginRequest {
    fn ok(&self) -> bool {
        !self.email.is_empty() && self.password.len() == 64
    }
}

#[derive(Debug, Serialize)]
struct SessionUser {
    id: i32,
    nickname: String,
    privilege: i32,
}

fn client_key(req: &HttpRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_owned()
}

fn set_loggedin_session(
    session: &mut Session,
    id: i32,
    privilege: i32,
    location: &'static str,
) -> Result<(), APIError> {
    session
        .insert(SESSION_USER_ID, id)
        .map_err(|e| log_server_error(e, location, ERROR_SESSION_INSERT))?;
    session
        .insert(SESSION_PRIVILEGE, privilege)
        .map_err(|e| log_server_error(e, location, ERROR_SESSION_INSERT))?;
    Ok(())
}

// [[API]]
// desp: Create an account. Gated by the shared site passphrase.
// Method: POST
// URL: /create_account
// Request Body: `CreateAccountRequest`
// Response Body: `CreateAccountResponse`
#[post("/create_account")]
async fn create_account(
    pool: web::Data<DbPool>,
    limiter: web::Data<RateLimiter>,
    form: web::Json<CreateAccountRequest>,
    req: HttpRequest,
    mut session: Session,
) -> Result<impl Responder, APIError> {
    let location = "create_account";
    limiter.check(&client_key(&req)).await?;
    form.sanity()?;

    if form.site_password != *SITE_PASSWORD {
        return Err(APIError::AuthFailure);
    }

    let mut conn = get_db_conn(&pool, location).await?;

    let (salt, salted_password) = cipher_util::gen_salted_password(&form.password, &LOGIN_TOKEN);

    let inserted = diesel::insert_into(users::table)
        .values((
            users::email.eq(&form.email),
            users::nickname.eq(&form.nickname),
            users::realname.eq(&form.realname),
            users::salt.eq(&salt),
            users::password.eq(&salted_password),
            users::privilege.eq(PRIVILEGE_PLAYER),
            users::active.eq(true),
        ))
        .returning(User::as_returning())
        .get_result(&mut conn)
        .await;

    let response = match inserted {
        Ok(user) => {
            session.clear();
            set_loggedin_session(&mut session, user.id, user.privilege, location)?;
            CreateAccountResponse::Success(user.id)
        }
        Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            CreateAccountResponse::EmailTaken
        }
        Err(e) => return Err(log_server_error(e, location, ERROR_DB_UNKNOWN)),
    };
    Ok(HttpResponse::Ok().json(response))
}

// [[API]]
// desp: Login with email and password.
// Method: POST
// URL: /login
// Request Body: `LoginRequest`
// Response Body: `SessionUser`
#[post("/login")]
async fn login(
    pool: web::Data<DbPool>,
    limiter: web::Data<RateLimiter>,
    form: web::Json<LoginRequest>,
    req: HttpRequest,
    mut session: Session,
) -> Result<impl Responder, APIError> {
    let location = "login";
    limiter.check(&client_key(&req)).await?;
    form.sanity()?;

    let mut conn = get_db_conn(&pool, location).await?;

    let user = users::table
        .filter(users::email.eq(&form.email))
        .first::<User>(&mut conn)
        .await
        .map_err(|e| match e {
            DieselError::NotFound => APIError::AuthFailure,
            e => log_server_error(e, location, ERROR_DB_UNKNOWN),
        })?;

    if !user.active {
        return Err(APIError::AuthFailure);
    }

    let user = cipher_util::check_salted_password(&user, &form.password, &LOGIN_TOKEN)
        .ok_or(APIError::AuthFailure)?;

    session.clear();
    set_loggedin_session(&mut session, user.id, user.privilege, location)?;

    Ok(HttpResponse::Ok().json(SessionUser {
        id: user.id,
        nickname: user.nickname.clone(),
        privilege: user.privilege,
    }))
}

// [[API]]
// desp: Clear the session.
// Method: POST
// URL: /logout
#[post("/logout")]
async fn logout(session: Session) -> impl Responder {
    session.clear();
    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

// [[API]]
// desp: Current session identity.
// Method: GET
// URL: /whoami
#[get("/whoami")]
async fn whoami(
    pool: web::Data<DbPool>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "whoami";
    let (user_id, _) = user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let user = fetch_user_from_id(user_id, &mut conn)
        .await?
        .ok_or(APIError::InvalidSession)?;

    Ok(HttpResponse::Ok().json(SessionUser {
        id: user.id,
        nickname: user.nickname,
        privilege: user.privilege,
    }))
}
