use crate::api::pick::{replace_picks, PickEntry};
use crate::schema::users;
use crate::util::api_util::*;

use actix_web::{get, post, web, HttpResponse, Responder};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use dotenv::dotenv;
use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use actix_session::Session;

use crate::models::{User, UserId, WeekId};
use crate::{DbPool, Ext};

static UPDATE_SCRIPT_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dotenv().ok();
    PathBuf::from(env::var("UPDATE_SCRIPT_DIR").unwrap_or_else(|_| "scripts".to_owned()))
});

#[derive(Debug, Serialize)]
struct UserView {
    id: UserId,
    email: String,
    nickname: String,
    realname: String,
    privilege: i32,
    active: bool,
    tag: Option<String>,
}

impl From<User> for UserView {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            nickname: u.nickname,
            realname: u.realname,
            privilege: u.privilege,
            active: u.active,
            tag: u.tag,
        }
    }
}

// [[API]]
// desp: Full user list, credentials excluded.
// Method: GET
// URL: /admin/users
// Response Body: `Vec<UserView>`
#[get("/admin/users")]
async fn list_users(pool: web::Data<DbPool>, session: Session) -> Result<impl Responder, APIError> {
    let location = "admin_list_users";
    user_privilege_check(&session, PRIVILEGE_ADMIN)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let all_users = users::table
        .order(users::id.asc())
        .load::<User>(&mut conn)
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

    let views: Vec<UserView> = all_users.into_iter().map(UserView::from).collect();
    Ok(HttpResponse::Ok().json(views))
}

#[derive(Debug, Deserialize)]
struct SetTagRequest {
    user: UserId,
    // None clears the tag.
    tag: Option<String>,
}

impl APIRequest for SetTagRequest {
    fn ok(&self) -> bool {
        self.tag.as_ref().is_none_or(|t| !t.is_empty() && t.len() <= 64)
    }
}

// [[API]]
// desp: Assign or clear a user's grouping tag.
// Method: POST
// URL: /admin/tag
// Request Body: `SetTagRequest`
#[post("/admin/tag")]
async fn set_tag(
    pool: web::Data<DbPool>,
    form: web::Json<SetTagRequest>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "admin_set_tag";
    user_privilege_check(&session, PRIVILEGE_ADMIN)?;
    form.sanity()?;

    let mut conn = get_db_conn(&pool, location).await?;
    let updated = diesel::update(users::table.filter(users::id.eq(form.user)))
        .set(users::tag.eq(form.tag.as_deref()))
        .execute(&mut conn)
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

    if updated == 0 {
        return Err(APIError::NotFound);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct SetActiveRequest {
    user: UserId,
    active: bool,
}

impl APIRequest for SetActiveRequest {
    fn ok(&self) -> bool {
        self.user >= 0
    }
}

// [[API]]
// desp: Soft-activate or deactivate an account. Never hard-deletes.
// Method: POST
// URL: /admin/active
// Request Body: `SetActiveRequest`
#[post("/admin/active")]
async fn set_active(
    pool: web::Data<DbPool>,
    form: web::Json<SetActiveRequest>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "admin_set_active";
    user_privilege_check(&session, PRIVILEGE_ADMIN)?;
    form.sanity()?;

    let mut conn = get_db_conn(&pool, location).await?;
    let updated = diesel::update(users::table.filter(users::id.eq(form.user)))
        .set(users::active.eq(form.active))
        .execute(&mut conn)
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

    if updated == 0 {
        return Err(APIError::NotFound);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct AdminPicksRequest {
    user: UserId,
    picks: Vec<PickEntry>,
}

impl APIRequest for AdminPicksRequest {
    fn ok(&self) -> bool {
        self.picks.len() <= 64
    }
}

// [[API]]
// desp: Enter picks on behalf of a user. Same lock and validation rules
//       as self-service submission.
// Method: POST
// URL: /admin/picks/{week_id}
// Request Body: `AdminPicksRequest`
#[post("/admin/picks/{week_id}")]
async fn submit_picks_for_user(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    form: web::Json<AdminPicksRequest>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "admin_submit_picks";
    let (admin, _) = user_privilege_check(&session, PRIVILEGE_ADMIN)?;
    form.sanity()?;

    let week = path.into_inner();
    let mut conn = get_db_conn(&pool, location).await?;

    fetch_user_from_id(form.user, &mut conn)
        .await?
        .ok_or(APIError::NotFound)?;

    replace_picks(form.user, week, &form.picks, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    info!("admin {admin} entered picks for user {} week {week}", form.user);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct RunUpdateRequest {
    script: String,
}

impl APIRequest for RunUpdateRequest {
    fn ok(&self) -> bool {
        !self.script.is_empty()
            && self.script.len() <= 64
            && self
                .script
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

// [[API]]
// desp: Launch a named batch job from the configured script directory.
//       The job itself (score ingestion, team records) is opaque here.
// Method: POST
// URL: /admin/run_update
// Request Body: `RunUpdateRequest`
#[post("/admin/run_update")]
async fn run_update(
    form: web::Json<RunUpdateRequest>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "admin_run_update";
    let (admin, _) = user_privilege_check(&session, PRIVILEGE_ADMIN)?;
    form.sanity()?;

    let path = UPDATE_SCRIPT_DIR.join(&form.script);
    let child = tokio::process::Command::new(&path)
        .spawn()
        .map_err(|e| log_server_error(e, location, "update_script_spawn_failed"))?;

    info!(
        "admin {admin} launched update script {:?} (pid {:?})",
        path,
        child.id()
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}
