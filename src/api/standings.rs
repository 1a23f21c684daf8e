use std::collections::{BTreeMap, HashMap};
use std::ops::DerefMut;

use crate::util::api_util::*;
use crate::util::scoring::{
    self, rank_by_potential, rank_by_score, SeasonTally, WeekRows, WeekTally,
};

use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use actix_session::Session;

use crate::models::{Game, GameId, Pick, TeamId, User, UserId, Week, WeekId};
use crate::DbPool;

#[derive(Debug, Deserialize)]
struct StandingsQuery {
    tag: Option<String>,
    order: Option<String>,
}

#[derive(Debug, Serialize)]
struct StandingRow {
    user: UserId,
    nickname: String,
    score: f64,
    correct: i32,
    potential: f64,
    picked: i32,
}

fn to_rows(tallies: Vec<WeekTally>, names: &HashMap<UserId, String>) -> Vec<StandingRow> {
    tallies
        .into_iter()
        .map(|t| StandingRow {
            user: t.user_id,
            nickname: names.get(&t.user_id).cloned().unwrap_or_default(),
            score: t.score,
            correct: t.correct,
            potential: t.potential,
            picked: t.picked,
        })
        .collect()
}

async fn load_week_scope<C>(
    week_id: WeekId,
    tag: Option<&str>,
    conn: &mut C,
) -> Result<(Week, Vec<Game>, Vec<Pick>, Vec<User>), APIError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    let week = fetch_week_from_id(week_id, conn).await?;
    let games = fetch_week_games(week_id, conn).await?;
    let eligible = fetch_eligible_users(tag, conn).await?;

    let game_ids: Vec<GameId> = games.iter().map(|g| g.id).collect();
    let week_picks = {
        use crate::schema::picks::dsl::*;
        picks
            .filter(game_id.eq_any(&game_ids))
            .load::<Pick>(conn)
            .await
            .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))?
    };

    Ok((week, games, week_picks, eligible))
}

// [[API]]
// desp: Weekly standings. `order=potential` ranks by projected score.
// Method: GET
// URL: /weekly_standings/{week_id}?tag=&order=
// Response Body: `Vec<StandingRow>`
#[get("/weekly_standings/{week_id}")]
async fn weekly_standings(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    query: web::Query<StandingsQuery>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "weekly_standings";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let (week, games, picks, eligible) =
        load_week_scope(path.into_inner(), query.tag.as_deref(), &mut conn).await?;

    let names: HashMap<UserId, String> = eligible
        .iter()
        .map(|u| (u.id, u.nickname.clone()))
        .collect();
    let eligible_ids: Vec<UserId> = eligible.iter().map(|u| u.id).collect();

    let mut tallies = scoring::tally_week(&games, &picks, week.multiplier, &eligible_ids);
    match query.order.as_deref() {
        Some("potential") => rank_by_potential(&mut tallies),
        _ => rank_by_score(&mut tallies),
    }

    Ok(HttpResponse::Ok().json(to_rows(tallies, &names)))
}

#[derive(Debug, Serialize)]
struct PickView {
    game: GameId,
    guess: TeamId,
    weight: i32,
    outcome: &'static str,
}

/// Per-user pick views in game order (kickoff order of the week).
/// Only eligible users appear; users without picks are left out.
fn build_pick_views(
    games: &[Game],
    picks: &[Pick],
    names: &HashMap<UserId, String>,
) -> HashMap<UserId, Vec<PickView>> {
    let by_user_game: HashMap<(UserId, GameId), &Pick> = picks
        .iter()
        .filter(|p| names.contains_key(&p.user_id))
        .map(|p| ((p.user_id, p.game_id), p))
        .collect();

    let mut per_user: HashMap<UserId, Vec<PickView>> = HashMap::new();
    for user in names.keys() {
        let views: Vec<PickView> = games
            .iter()
            .filter_map(|game| {
                by_user_game.get(&(*user, game.id)).map(|p| {
                    let outcome = match game.winner {
                        Some(w) if w == p.guess => "correct",
                        Some(_) => "wrong",
                        None => "pending",
                    };
                    PickView {
                        game: game.id,
                        guess: p.guess,
                        weight: p.weight,
                        outcome,
                    }
                })
            })
            .collect();
        if !views.is_empty() {
            per_user.insert(*user, views);
        }
    }
    per_user
}

#[derive(Debug, Serialize)]
struct DetailedWeeklyResponse {
    standings: Vec<StandingRow>,
    /// Per-user pick breakdown; withheld until the week locks, picks are
    /// private before then.
    picks: Option<HashMap<UserId, Vec<PickView>>>,
}

// [[API]]
// desp: Weekly standings plus everyone's per-game picks once locked.
// Method: GET
// URL: /weekly_standings_detailed/{week_id}?tag=
// Response Body: `DetailedWeeklyResponse`
#[get("/weekly_standings_detailed/{week_id}")]
async fn weekly_standings_detailed(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    query: web::Query<StandingsQuery>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "weekly_standings_detailed";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let (week, games, picks, eligible) =
        load_week_scope(path.into_inner(), query.tag.as_deref(), &mut conn).await?;

    let names: HashMap<UserId, String> = eligible
        .iter()
        .map(|u| (u.id, u.nickname.clone()))
        .collect();
    let eligible_ids: Vec<UserId> = eligible.iter().map(|u| u.id).collect();

    let mut tallies = scoring::tally_week(&games, &picks, week.multiplier, &eligible_ids);
    rank_by_score(&mut tallies);

    let breakdown = week
        .is_locked(Utc::now())
        .then(|| build_pick_views(&games, &picks, &names));

    Ok(HttpResponse::Ok().json(DetailedWeeklyResponse {
        standings: to_rows(tallies, &names),
        picks: breakdown,
    }))
}

#[derive(Debug, Serialize)]
struct ClassicWeeklyRow {
    #[serde(flatten)]
    row: StandingRow,
    /// In game order; None until the week locks.
    picks: Option<Vec<PickView>>,
}

#[derive(Debug, Serialize)]
struct ClassicWeeklyResponse {
    games: Vec<GameId>,
    standings: Vec<ClassicWeeklyRow>,
}

// [[API]]
// desp: The classic weekly grid: one row per user with their picks laid
//       out in game order next to the tally.
// Method: GET
// URL: /weekly_standings_classic/{week_id}?tag=
// Response Body: `ClassicWeeklyResponse`
#[get("/weekly_standings_classic/{week_id}")]
async fn weekly_standings_classic(
    pool: web::Data<DbPool>,
    path: web::Path<WeekId>,
    query: web::Query<StandingsQuery>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "weekly_standings_classic";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let (week, games, picks, eligible) =
        load_week_scope(path.into_inner(), query.tag.as_deref(), &mut conn).await?;

    let names: HashMap<UserId, String> = eligible
        .iter()
        .map(|u| (u.id, u.nickname.clone()))
        .collect();
    let eligible_ids: Vec<UserId> = eligible.iter().map(|u| u.id).collect();

    let mut tallies = scoring::tally_week(&games, &picks, week.multiplier, &eligible_ids);
    rank_by_score(&mut tallies);

    let mut breakdown = week
        .is_locked(Utc::now())
        .then(|| build_pick_views(&games, &picks, &names));

    let standings = to_rows(tallies, &names)
        .into_iter()
        .map(|row| {
            let picks = breakdown.as_mut().map(|b| b.remove(&row.user).unwrap_or_default());
            ClassicWeeklyRow { row, picks }
        })
        .collect();

    Ok(HttpResponse::Ok().json(ClassicWeeklyResponse {
        games: games.iter().map(|g| g.id).collect(),
        standings,
    }))
}

#[derive(Debug, Serialize)]
struct OverallRow {
    user: UserId,
    nickname: String,
    score: f64,
    correct: i32,
    weeks_played: i32,
    average: f64,
}

#[derive(Debug, Serialize)]
struct DetailedOverallRow {
    #[serde(flatten)]
    row: OverallRow,
    per_week: BTreeMap<i32, scoring::WeekLine>,
}

async fn season_tallies<C>(
    tag: Option<&str>,
    conn: &mut C,
) -> Result<(Vec<SeasonTally>, HashMap<UserId, String>, Vec<i32>), APIError>
where
    C: DerefMut<Target = AsyncPgConnection> + std::marker::Send,
{
    let eligible = fetch_eligible_users(tag, conn).await?;
    let names: HashMap<UserId, String> = eligible
        .iter()
        .map(|u| (u.id, u.nickname.clone()))
        .collect();
    let eligible_ids: Vec<UserId> = eligible.iter().map(|u| u.id).collect();

    let all_weeks = {
        use crate::schema::weeks::dsl::*;
        weeks
            .order(number.asc())
            .load::<Week>(conn)
            .await
            .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))?
    };
    let all_games = {
        use crate::schema::games::dsl::*;
        games
            .load::<Game>(conn)
            .await
            .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))?
    };
    let all_picks = {
        use crate::schema::picks::dsl::*;
        picks
            .load::<Pick>(conn)
            .await
            .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))?
    };

    let week_of_game: HashMap<GameId, WeekId> =
        all_games.iter().map(|g| (g.id, g.week_id)).collect();

    let mut games_by_week: HashMap<WeekId, Vec<Game>> = HashMap::new();
    for game in all_games {
        games_by_week.entry(game.week_id).or_default().push(game);
    }
    let mut picks_by_week: HashMap<WeekId, Vec<Pick>> = HashMap::new();
    for pick in all_picks {
        if let Some(&week) = week_of_game.get(&pick.game_id) {
            picks_by_week.entry(week).or_default().push(pick);
        }
    }

    static NO_GAMES: Vec<Game> = Vec::new();
    static NO_PICKS: Vec<Pick> = Vec::new();

    let rows: Vec<WeekRows<'_>> = all_weeks
        .iter()
        .map(|w| WeekRows {
            number: w.number,
            multiplier: w.multiplier,
            games: games_by_week.get(&w.id).unwrap_or(&NO_GAMES),
            picks: picks_by_week.get(&w.id).unwrap_or(&NO_PICKS),
        })
        .collect();

    let week_numbers: Vec<i32> = all_weeks.iter().map(|w| w.number).collect();

    Ok((
        scoring::tally_season(&rows, &eligible_ids),
        names,
        week_numbers,
    ))
}

// [[API]]
// desp: Season-to-date standings.
// Method: GET
// URL: /overall_standings?tag=
// Response Body: `Vec<OverallRow>`
#[get("/overall_standings")]
async fn overall_standings(
    pool: web::Data<DbPool>,
    query: web::Query<StandingsQuery>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "overall_standings";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let (tallies, names, _) = season_tallies(query.tag.as_deref(), &mut conn).await?;

    let rows: Vec<OverallRow> = tallies
        .into_iter()
        .map(|t| OverallRow {
            user: t.user_id,
            nickname: names.get(&t.user_id).cloned().unwrap_or_default(),
            score: t.score,
            correct: t.correct,
            weeks_played: t.weeks_played,
            average: t.average,
        })
        .collect();

    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, Serialize)]
struct ClassicOverallRow {
    #[serde(flatten)]
    row: OverallRow,
    /// One cell per season week, aligned with the `weeks` header.
    cells: Vec<Option<scoring::WeekLine>>,
}

#[derive(Debug, Serialize)]
struct ClassicOverallResponse {
    weeks: Vec<i32>,
    standings: Vec<ClassicOverallRow>,
}

// [[API]]
// desp: The classic season grid: one column per week, one row per user.
// Method: GET
// URL: /overall_standings_classic?tag=
// Response Body: `ClassicOverallResponse`
#[get("/overall_standings_classic")]
async fn overall_standings_classic(
    pool: web::Data<DbPool>,
    query: web::Query<StandingsQuery>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "overall_standings_classic";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let (tallies, names, week_numbers) = season_tallies(query.tag.as_deref(), &mut conn).await?;

    let standings: Vec<ClassicOverallRow> = tallies
        .into_iter()
        .map(|t| ClassicOverallRow {
            cells: scoring::align_week_lines(&t.per_week, &week_numbers),
            row: OverallRow {
                user: t.user_id,
                nickname: names.get(&t.user_id).cloned().unwrap_or_default(),
                score: t.score,
                correct: t.correct,
                weeks_played: t.weeks_played,
                average: t.average,
            },
        })
        .collect();

    Ok(HttpResponse::Ok().json(ClassicOverallResponse {
        weeks: week_numbers,
        standings,
    }))
}

// [[API]]
// desp: Season standings with the per-week score breakdown.
// Method: GET
// URL: /overall_standings_detailed?tag=
// Response Body: `Vec<DetailedOverallRow>`
#[get("/overall_standings_detailed")]
async fn overall_standings_detailed(
    pool: web::Data<DbPool>,
    query: web::Query<StandingsQuery>,
    session: Session,
) -> Result<impl Responder, APIError> {
    let location = "overall_standings_detailed";
    user_privilege_check(&session, PRIVILEGE_PLAYER)?;

    let mut conn = get_db_conn(&pool, location).await?;
    let (tallies, names, _) = season_tallies(query.tag.as_deref(), &mut conn).await?;

    let rows: Vec<DetailedOverallRow> = tallies
        .into_iter()
        .map(|t| DetailedOverallRow {
            row: OverallRow {
                user: t.user_id,
                nickname: names.get(&t.user_id).cloned().unwrap_or_default(),
                score: t.score,
                correct: t.correct,
                weeks_played: t.weeks_played,
                average: t.average,
            },
            per_week: t.per_week,
        })
        .collect();

    Ok(HttpResponse::Ok().json(rows))
}
