use std::collections::HashMap;

use crate::util::api_util::*;

use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Serialize;

use actix_session::Session;

use crate::models::{Team, TeamId, Week, WeekId};
use crate::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekStatus {
    Future,
    Current,
    Completed,
}

/// The current week is the earliest one that has not started; everything
/// started is completed, everything after the current week is future.
pub fn derive_statuses(starts: &[DateTime<Utc>], now: DateTime<Utc>) -> Vec<WeekStatus> {
    let current = starts
        .iter()
        .enumerate()
        .filter(|(_, start)| **start > now)
        .min_by_key(|(_, start)| **start)
        .map(|(i, _)| i);

    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            if Some(i) == current {
                WeekStatus::Current
            } else if *start <= now {
                WeekStatus::Completed
            } else {
                WeekStatus::Future
            }
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct WeekView {
    id: WeekId,
    number: i32,
    season: i32,
    start_time: DateTime<Utc>,
    multiplier: f64,
    status: WeekStatus,
}

// [[API]]
// desp: All weeks of the season with derived status.
// Method: GET
// URL: /weeks
// Response Body: `Vec<WeekView>`
#[get("/weeks")]
async fn list_weeks(pool: web::Data<DbPool>, session: Session) -> Result<impl Responder, APIError> {
    use crate::schema::weeks::dsl::*;

    let location = "list_weeks";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let all_weeks = weeks
        .order(number.asc())
        .load::<Week>(&mut conn)
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?;

    let starts: Vec<DateTime<Utc>> = all_weeks.iter().map(|w| w.start_time).collect();
    let statuses = derive_statuses(&starts, Utc::now());

    let views: Vec<WeekView> = all_weeks
        .into_iter()
        .zip(statuses)
        .map(|(w, status)| WeekView {
            id: w.id,
            number: w.number,
            season: w.season,
            start_time: w.start_time,
            multiplier: w.multiplier,
            status,
        })
        .collect();

    Ok(HttpResponse::Ok().json(views))
}

#[derive(Debug, Serialize)]
struct GameView {
    id: i32,
    kickoff: DateTime<Utc>,
    home: Team,
    away: Team,
    home_score: Option<i32>,
    away_score: Option<i32>,
    winner: Option<TeamId>,
}

#[derive(Debug, Serialize)]
struct WeekGamesResponse {
    read_only: bool,
    games: Vec<GameView>,
}

// [[API]]
// desp: Games of one week joined with both teams' season records.
// Method: GET
// URL: /games/{week_id}
// Response Body: `WeekGamesResponse`
#[get("/games/{week_id}")]
async fn list_games(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "list_games";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let week_id = path.into_inner();
    let mut conn = get_db_conn(&pool, location).await?;

    let week = fetch_week_from_id(week_id, &mut conn).await?;
    let week_games = fetch_week_games(week_id, &mut conn).await?;

    let team_index: HashMap<TeamId, Team> = {
        use crate::schema::teams::dsl::*;
        teams
            .load::<Team>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?
            .into_iter()
            .map(|t| (t.id, t))
            .collect()
    };

    let views = week_games
        .into_iter()
        .map(|g| {
            let home = team_index.get(&g.home_team).cloned();
            let away = team_index.get(&g.away_team).cloned();
            match (home, away) {
                (Some(home), Some(away)) => Ok(GameView {
                    id: g.id,
                    kickoff: g.kickoff,
                    home,
                    away,
                    home_score: g.home_score,
                    away_score: g.away_score,
                    winner: g.winner,
                }),
                _ => Err(log_server_error(
                    format!("game {} references a missing team", g.id),
                    location,
                    ERROR_DB_UNKNOWN,
                )),
            }
        })
        .collect::<Result<Vec<_>, APIError>>()?;

    Ok(HttpResponse::Ok().json(WeekGamesResponse {
        read_only: week.is_locked(Utc::now()),
        games: views,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, day, 17, 0, 0).unwrap()
    }

    #[test]
    fn earliest_unstarted_week_is_current() {
        let starts = [t(1), t(8), t(15), t(22)];
        let now = t(10);
        assert_eq!(
            derive_statuses(&starts, now),
            vec![
                WeekStatus::Completed,
                WeekStatus::Completed,
                WeekStatus::Current,
                WeekStatus::Future,
            ]
        );
    }

    #[test]
    fn all_started_means_all_completed() {
        let starts = [t(1), t(8)];
        assert_eq!(
            derive_statuses(&starts, t(28)),
            vec![WeekStatus::Completed, WeekStatus::Completed]
        );
    }

    #[test]
    fn season_not_begun_has_one_current_week() {
        let starts = [t(8), t(15)];
        assert_eq!(
            derive_statuses(&starts, t(1)),
            vec![WeekStatus::Current, WeekStatus::Future]
        );
    }
}
