use std::collections::{HashMap, HashSet};
use std::ops::DerefMut;

use crate::util::api_util::*;

use actix_web::{get, post, web, HttpResponse, Responder};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use actix_session::Session;

use crate::models::{Game, GameId, NewPick, Pick, TeamId, UserId, WeekId};
use crate::{DbPool, Ext};

#[derive(Debug, Clone, Deserialize)]
pub struct PickEntry {
    pub game: GameId,
    pub winner: TeamId,
    pub weight: i32,
}

#[derive(Debug, Deserialize)]
struct SubmitPicksRequest {
    picks: Vec<PickEntry>,
}

impl APIRequest for SubmitPicksRequest {
    fn ok(&self) -> bool {
        self.picks.len() <= 64
    }
}

/// Collect every violation in one pass; nothing is persisted unless the
/// list comes back empty. Weights must cover [1, game_count] without
/// repeats and every game of the week needs exactly one entry.
pub fn validate_picks(games: &[Game], entries: &[PickEntry]) -> Vec<String> {
    let mut problems = Vec::new();

    let game_index: HashMap<GameId, &Game> = games.iter().map(|g| (g.id, g)).collect();
    let game_count = games.len() as i32;

    let mut seen_games: HashSet<GameId> = HashSet::new();
    let mut weight_users: HashMap<i32, Vec<GameId>> = HashMap::new();

    for entry in entries {
        let Some(game) = game_index.get(&entry.game) else {
            problems.push(format!("game {}: not part of this week", entry.game));
            continue;
        };
        if !seen_games.insert(entry.game) {
            problems.push(format!("game {}: picked more than once", entry.game));
            continue;
        }
        if entry.winner != game.home_team && entry.winner != game.away_team {
            problems.push(format!(
                "game {}: team {} is not playing in it",
                entry.game, entry.winner
            ));
        }
        if entry.weight < 1 || entry.weight > game_count {
            problems.push(format!(
                "game {}: weight {} outside 1..={}",
                entry.game, entry.weight, game_count
            ));
        } else {
            weight_users.entry(entry.weight).or_default().push(entry.game);
        }
    }

    for game in games {
        if !seen_games.contains(&game.id) {
            problems.push(format!("game {}: no pick submitted", game.id));
        }
    }

    let mut duplicated: Vec<(i32, Vec<GameId>)> = weight_users
        .into_iter()
        .filter(|(_, users)| users.len() > 1)
        .collect();
    duplicated.sort_by_key(|(w, _)| *w);
    for (weight, mut game_ids) in duplicated {
        game_ids.sort_unstable();
        for game_id in game_ids {
            problems.push(format!("game {game_id}: weight {weight} used more than once"));
        }
    }

    problems.sort();
    problems
}

/// Rows to persist for one submission. Every row targets a game of the
/// week, so the delete below (scoped to all of the week's games) always
/// covers what gets inserted: resubmitting the same set reproduces the
/// same rows with nothing left over.
fn pick_rows(user: UserId, entries: &[PickEntry]) -> Vec<NewPick> {
    entries
        .iter()
        .map(|e| NewPick {
            user_id: user,
            game_id: e.game,
            guess: e.winner,
            weight: e.weight,
        })
        .collect()
}

/// Validate and persist one user's picks for a week, replacing whatever
/// was there before. Delete and insert run in a single transaction, so a
/// failed submission never leaves a partial pick set.
pub async fn replace_picks<C>(
    user: UserId,
    week: WeekId,
    entries: &[PickEntry],
    conn: &mut C,
) -> Result<(), APIError>
where
    C: DerefMut<Target = AsyncPgConnection>
        + AsyncConnection<Backend = diesel::pg::Pg>
        + std::marker::Send,
{
    let week_row = fetch_week_from_id(week, conn).await?;
    if week_row.is_locked(Utc::now()) {
        return Err(APIError::WeekLocked);
    }

    let games = fetch_week_games(week, conn).await?;
    if games.is_empty() {
        return Err(APIError::NotFound);
    }

    let problems = validate_picks(&games, entries);
    if !problems.is_empty() {
        return Err(APIError::ValidationError(problems));
    }

    let game_ids: Vec<GameId> = games.iter().map(|g| g.id).collect();
    let rows = pick_rows(user, entries);

    conn.transaction::<_, APIError, _>(|conn| {
        Box::pin(async move {
            use crate::schema::picks::dsl::*;

            diesel::delete(picks.filter(user_id.eq(user).and(game_id.eq_any(&game_ids))))
                .execute(conn)
                .await?;

            diesel::insert_into(picks).values(&rows).execute(conn).await?;

            Ok(())
        })
    })
    .await
}

// [[API]]
// desp: The caller's picks for one week.
// Method: GET
// URL: /picks/{week_id}
// Response Body: `Vec<Pick>`
#[get("/picks/{week_id}")]
async fn get_picks(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "get_picks";
    let (user, _) = user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let week = path.into_inner();
    let mut conn = get_db_conn(&pool, location).await?;

    fetch_week_from_id(week, &mut conn).await?;
    let games = fetch_week_games(week, &mut conn).await?;
    let game_ids: Vec<GameId> = games.iter().map(|g| g.id).collect();

    let rows = {
        use crate::schema::picks::dsl::*;
        picks
            .filter(user_id.eq(user).and(game_id.eq_any(&game_ids)))
            .order(weight.desc())
            .load::<Pick>(&mut conn)
            .await
            .map_err(|e| log_server_error(e, location, ERROR_DB_UNKNOWN))?
    };

    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, Serialize)]
enum SubmitPicksResponse {
    Success { week: WeekId, saved: usize },
}

// [[API]]
// desp: Replace the caller's picks for one week. Rejected after lock.
// Method: POST
// URL: /picks/{week_id}
// Request Body: `SubmitPicksRequest`
// Response Body: `SubmitPicksResponse`
#[post("/picks/{week_id}")]
async fn submit_picks(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    form: web::Json<SubmitPicksRequest>,
    mut session: Session,
) -> Result<impl Responder, APIError> {
    let location = "submit_picks";
    let (user, _) = user_privilege_check(&session, PRIVILEGE_PLAYER)?;
    form.sanity()?;

    let week = path.into_inner();
    let mut conn = get_db_conn(&pool, location).await?;

    fetch_user_from_id(user, &mut conn)
        .await?
        .ok_or(APIError::InvalidSession)
        .inspect_err(kill_session(&mut session))?;

    replace_picks(user, week, &form.picks, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    Ok(HttpResponse::Ok().json(SubmitPicksResponse::Success {
        week,
        saved: form.picks.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game(id: GameId, home: TeamId, away: TeamId) -> Game {
        Game {
            id,
            week_id: 1,
            home_team: home,
            away_team: away,
            kickoff: Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
            home_score: None,
            away_score: None,
            winner: None,
        }
    }

    fn entry(game: GameId, winner: TeamId, weight: i32) -> PickEntry {
        PickEntry {
            game,
            winner,
            weight,
        }
    }

    #[test]
    fn complete_distinct_set_passes() {
        let games = [game(1, 100, 200), game(2, 300, 400)];
        let entries = [entry(1, 100, 2), entry(2, 400, 1)];
        assert!(validate_picks(&games, &entries).is_empty());
    }

    #[test]
    fn duplicate_weight_names_every_offending_game() {
        let games = [game(1, 100, 200), game(2, 300, 400)];
        let entries = [entry(1, 100, 2), entry(2, 400, 2)];
        let problems = validate_picks(&games, &entries);
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("game 1")));
        assert!(problems.iter().any(|p| p.contains("game 2")));
    }

    #[test]
    fn missing_game_and_bad_weight_are_both_reported() {
        let games = [game(1, 100, 200), game(2, 300, 400)];
        // Game 2 unpicked, game 1 weighted outside 1..=2.
        let entries = [entry(1, 100, 3)];
        let problems = validate_picks(&games, &entries);
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("no pick submitted")));
        assert!(problems.iter().any(|p| p.contains("outside 1..=2")));
    }

    #[test]
    fn team_not_in_game_is_rejected() {
        let games = [game(1, 100, 200)];
        let entries = [entry(1, 300, 1)];
        let problems = validate_picks(&games, &entries);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("not playing"));
    }

    #[test]
    fn unknown_game_and_double_entry_are_rejected() {
        let games = [game(1, 100, 200)];
        let entries = [entry(1, 100, 1), entry(1, 200, 1), entry(9, 100, 1)];
        let problems = validate_picks(&games, &entries);
        assert!(problems.iter().any(|p| p.contains("picked more than once")));
        assert!(problems.iter().any(|p| p.contains("not part of this week")));
    }

    #[test]
    fn zero_weight_is_out_of_range() {
        let games = [game(1, 100, 200)];
        let entries = [entry(1, 100, 0)];
        let problems = validate_picks(&games, &entries);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("outside 1..=1"));
    }

    #[test]
    fn resubmission_replaces_rather_than_accumulates() {
        // The transaction deletes every pick of the user scoped to the
        // week's games, then inserts the new rows. Both halves of that
        // invariant live here: identical input yields identical rows,
        // and every inserted row falls inside the deleted scope.
        let games = [game(1, 100, 200), game(2, 300, 400)];
        let entries = [entry(1, 100, 2), entry(2, 400, 1)];
        assert!(validate_picks(&games, &entries).is_empty());

        let as_tuples = |rows: &[crate::models::NewPick]| {
            rows.iter()
                .map(|r| (r.user_id, r.game_id, r.guess, r.weight))
                .collect::<Vec<_>>()
        };
        let first = pick_rows(7, &entries);
        let second = pick_rows(7, &entries);
        assert_eq!(as_tuples(&first), as_tuples(&second));

        let scope: HashSet<GameId> = games.iter().map(|g| g.id).collect();
        assert!(first.iter().all(|r| scope.contains(&r.game_id)));
    }

    #[test]
    fn week_locks_at_start_time() {
        let week = crate::models::Week {
            id: 1,
            number: 1,
            season: 2025,
            start_time: Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
            multiplier: 1.0,
        };
        let before = Utc.with_ymd_and_hms(2025, 9, 7, 16, 59, 59).unwrap();
        let at = week.start_time;
        assert!(!week.is_locked(before));
        assert!(week.is_locked(at));
    }
}
