use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

pub type UserId = i32;
pub type TeamId = i32;
pub type WeekId = i32;
pub type GameId = i32;

#[derive(Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub nickname: String,
    pub realname: String,
    pub password: String,
    pub salt: String,
    pub privilege: i32,
    pub active: bool,
    pub tag: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::teams)]
pub struct Team {
    pub id: TeamId,
    pub city: String,
    pub name: String,
    pub abbreviation: String,
    pub wins: i32,
    pub losses: i32,
    pub ties: i32,
}

#[derive(Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::weeks)]
pub struct Week {
    pub id: WeekId,
    pub number: i32,
    pub season: i32,
    pub start_time: DateTime<Utc>,
    pub multiplier: f64,
}

impl Week {
    /// A week locks at its start time. Picks become read-only afterwards.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now
    }
}

#[derive(Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::games)]
pub struct Game {
    pub id: GameId,
    pub week_id: WeekId,
    pub home_team: TeamId,
    pub away_team: TeamId,
    pub kickoff: DateTime<Utc>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub winner: Option<TeamId>,
}

#[derive(Queryable, Selectable, Serialize, Clone)]
#[diesel(table_name = crate::schema::picks)]
pub struct Pick {
    pub id: i32,
    pub user_id: UserId,
    pub game_id: GameId,
    pub guess: TeamId,
    pub weight: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::picks)]
pub struct NewPick {
    pub user_id: UserId,
    pub game_id: GameId,
    pub guess: TeamId,
    pub weight: i32,
}
