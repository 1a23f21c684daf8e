use std::collections::HashMap;

use crate::util::api_util::*;
use crate::util::scoring;

use actix_web::{get, web, HttpResponse, Responder};
use diesel_async::RunQueryDsl;
use serde::Serialize;

use actix_session::Session;

use crate::models::{Game, Pick, Team, TeamId};
use crate::DbPool;

#[derive(Debug, Serialize)]
struct TeamStatRow {
    team: Team,
    points_won: i64,
    correct_picks: i32,
    points_lost: i64,
    incorrect_picks: i32,
    total_points: i64,
}

// [[API]]
// desp: Confidence weight staked for and against each team, decided
//       games only. Teams without a decided pick are omitted.
// Method: GET
// URL: /team_stats
// Response Body: `Vec<TeamStatRow>`
#[get("/team_stats")]
async fn team_stats(pool: web::Data<DbPool>, session: Session) -> Result<impl Responder, APIError> {
    let location = "team_stats";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;

    let all_games = {
        use crate::schema::games::dsl::*;
        games
            .load::<Game>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?
    };
    let all_picks = {
        use crate::schema::picks::dsl::*;
        picks
            .load::<Pick>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?
    };
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

    let rows: Vec<TeamStatRow> = scoring::tally_teams(&all_games, &all_picks)
        .into_iter()
        .filter_map(|stat| {
            team_index.get(&stat.team_id).map(|team| TeamStatRow {
                team: team.clone(),
                points_won: stat.points_won,
                correct_picks: stat.correct_picks,
                points_lost: stat.points_lost,
                incorrect_picks: stat.incorrect_picks,
                total_points: stat.total_points(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(rows))
}
