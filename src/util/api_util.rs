use std::ops::DerefMut;

use actix_session::Session;
use actix_web::{
    error,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use diesel::result::Error;

use derive_more::derive::Display;
use diesel::prelude::*;

use crate::{
    models::{Game, User, Week, WeekId},
    DbPool, Ext,
};
use log::error;

use diesel_async::AsyncPgConnection;
use diesel_async::RunQueryDsl;

pub trait APIRequest: Sized {
    fn ok(&self) -> bool;
    fn sanity(&self) -> Result<(), APIError> {
        if self.ok() {
            Ok(())
        } else {
            Err(APIError::InvalidFormData)
        }
    }
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum APIError {
    #[display("Invalid form data")]
    InvalidFormData,

    #[display("Invalid session")]
    InvalidSession,

    #[display("Not logged in")]
    NotLogin,

    #[display("Bad credentials")]
    AuthFailure,

    #[display("Unauthorized access")]
    Unauthorized,

    #[display("Week is locked")]
    WeekLocked,

    #[display("Invalid picks")]
    ValidationError(Vec<String>),

    #[display("Not found")]
    NotFound,

    #[display("Too many requests")]
    RateLimited,

    #[display("Server error at {location}, ref[{refnum}]: {msg}")]
    ServerError {
        location: &'static str,
        msg: &'static str,
        refnum: uuid::Uuid,
    },
}

impl APIError {
    pub fn set_location(self, location: &'static str) -> Self {
        match self {
            APIError::ServerError {
                location: _,
                msg,
                refnum,
            } => APIError::ServerError {
                location,
                msg,
                refnum,
            },
            _ => self,
        }
    }

    pub fn log(&self) {
        if let APIError::ServerError {
            location,
            msg,
            refnum,
        } = self
        {
            error!("Server error at {location}, ref[{refnum}]: {msg}");
        }
    }
}

impl From<Error> for APIError {
    fn from(e: Error) -> Self {
        new_unlocated_server_error(e, "Transaction")
    }
}

impl error::ResponseError for APIError {
    // Every failure degrades to the same {success:false, error} JSON shape.
    // Store errors only ever expose the refnum, never the driver detail.
    fn error_response(&self) -> HttpResponse {
        let body = match self {
            APIError::ValidationError(problems) => serde_json::json!({
                "success": false,
                "error": self.to_string(),
                "details": problems,
            }),
            APIError::ServerError { refnum, .. } => serde_json::json!({
                "success": false,
                "error": "Internal server error",
                "ref": refnum,
            }),
            _ => serde_json::json!({
                "success": false,
                "error": self.to_string(),
            }),
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            APIError::InvalidFormData => StatusCode::NOT_ACCEPTABLE,
            APIError::NotLogin | APIError::InvalidSession => StatusCode::UNAUTHORIZED,
            APIError::AuthFailure | APIError::Unauthorized => StatusCode::FORBIDDEN,
            APIError::NotFound => StatusCode::NOT_FOUND,
            APIError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            APIError::WeekLocked | APIError::ValidationError(_) => StatusCode::BAD_REQUEST,
            APIError::ServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn user_privilege_check(session: &Session, require: i32) -> Result<(i32, i32), APIError> {
    if let (Ok(Some(user_id)), Ok(Some(user_privilege))) = (
        session.get::<i32>(SESSION_USER_ID),
        session.get::<i32>(SESSION_PRIVILEGE),
    ) {
        if user_privilege >= require {
            Ok((user_id, user_privilege))
        } else {
            Err(APIError::Unauthorized)
        }
    } else {
        Err(APIError::NotLogin)
    }
}

pub async fn fetch_user_from_id<C>(user_id: i32, conn: &mut C) -> Result<Option<User>, APIError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    use crate::schema::users::dsl::*;

    match users.filter(id.eq(user_id)).first::<User>(conn).await {
        Ok(user) => Ok(Some(user)),
        Err(Error::NotFound) => Ok(None),
        Err(e) => Err(new_unlocated_server_error(e, ERROR_DB_UNKNOWN)),
    }
}

pub async fn fetch_week_from_id<C>(week_id: WeekId, conn: &mut C) -> Result<Week, APIError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    use crate::schema::weeks::dsl::*;

    match weeks.filter(id.eq(week_id)).first::<Week>(conn).await {
        Ok(week) => Ok(week),
        Err(Error::NotFound) => Err(APIError::NotFound),
        Err(e) => Err(new_unlocated_server_error(e, ERROR_DB_UNKNOWN)),
    }
}

pub async fn fetch_week_games<C>(week: WeekId, conn: &mut C) -> Result<Vec<Game>, APIError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    use crate::schema::games::dsl::*;

    games
        .filter(week_id.eq(week))
        .order(kickoff.asc())
        .load::<Game>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

/// Active users eligible for standings, optionally narrowed to one tag.
pub async fn fetch_eligible_users<C>(
    tag_filter: Option<&str>,
    conn: &mut C,
) -> Result<Vec<User>, APIError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    use crate::schema::users::dsl::*;

    let query = users.filter(active.eq(true)).into_boxed();
    let query = match tag_filter {
        Some(t) => query.filter(tag.eq(t)),
        None => query,
    };
    query
        .order(id.asc())
        .load::<User>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn get_db_conn<'a>(
    pool: &'a DbPool,
    location: &'static str,
) -> Result<
    diesel_async::pooled_connection::bb8::PooledConnection<'a, AsyncPgConnection>,
    APIError,
> {
    pool.get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))
}

pub fn log_server_error<E>(error: E, location: &'static str, msg: &'static str) -> APIError
where
    E: derive_more::Display,
{
    new_unlocated_server_error(error, msg)
        .set_location(location)
        .tap(APIError::log)
}

pub fn new_unlocated_server_error<E>(error: E, msg: &'static str) -> APIError
where
    E: derive_more::Display,
{
    let refnum = uuid::Uuid::new_v4();
    error!("Error [{refnum}]: {error}");
    APIError::ServerError {
        location: LOCATION_UNKNOWN,
        msg,
        refnum,
    }
}

pub fn kill_session(session: &mut Session) -> impl FnMut(&APIError) + '_ {
    |result| {
        if result == &APIError::InvalidSession {
            session.clear()
        };
    }
}

pub static SESSION_USER_ID: &str = "user_id";
pub static SESSION_PRIVILEGE: &str = "user_privilege";

pub static ERROR_DB_CONNECTION: &str = "db_connction_failed";
pub static ERROR_SESSION_INSERT: &str = "session_setting_failed";
pub static ERROR_DB_UNKNOWN: &str = "database_unknown";

pub static LOCATION_UNKNOWN: &str = "[unknown]";

pub const PRIVILEGE_PLAYER: i32 = 0;
pub const PRIVILEGE_ADMIN: i32 = 4;
