//! Pure standings computation over already-fetched rows.
//!
//! All scoring is recomputed on read; nothing here touches the database.
//! Wrong picks contribute zero, never negative. The week multiplier is
//! applied to the summed raw weights, not per game.

use std::collections::{BTreeMap, HashMap};

use crate::models::{Game, GameId, Pick, TeamId, UserId};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WeekTally {
    pub user_id: UserId,
    pub score: f64,
    pub correct: i32,
    pub potential: f64,
    /// Number of games this user picked in the week.
    pub picked: i32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WeekLine {
    pub score: f64,
    pub correct: i32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SeasonTally {
    pub user_id: UserId,
    pub score: f64,
    pub correct: i32,
    pub weeks_played: i32,
    pub average: f64,
    pub per_week: BTreeMap<i32, WeekLine>,
}

pub struct WeekRows<'a> {
    pub number: i32,
    pub multiplier: f64,
    pub games: &'a [Game],
    pub picks: &'a [Pick],
}

/// Aggregate one week of picks against game outcomes.
///
/// Every eligible user appears in the output, zeroed if they picked
/// nothing. A week without games yields an empty list. Picks against
/// games outside `games` are ignored, as are picks by ineligible users.
pub fn tally_week(
    games: &[Game],
    picks: &[Pick],
    multiplier: f64,
    eligible: &[UserId],
) -> Vec<WeekTally> {
    if games.is_empty() {
        return Vec::new();
    }

    let winners: HashMap<GameId, Option<TeamId>> =
        games.iter().map(|g| (g.id, g.winner)).collect();

    // (raw score, correct, raw potential, picked)
    let mut acc: BTreeMap<UserId, (i64, i32, i64, i32)> =
        eligible.iter().map(|&u| (u, (0, 0, 0, 0))).collect();

    for pick in picks {
        let Some(winner) = winners.get(&pick.game_id) else {
            continue;
        };
        let Some(entry) = acc.get_mut(&pick.user_id) else {
            continue;
        };
        entry.3 += 1;
        match winner {
            Some(w) if *w == pick.guess => {
                entry.0 += pick.weight as i64;
                entry.1 += 1;
                entry.2 += pick.weight as i64;
            }
            Some(_) => {}
            // Undecided: assume the pick resolves favorably.
            None => entry.2 += pick.weight as i64,
        }
    }

    acc.into_iter()
        .map(|(user_id, (raw, correct, raw_potential, picked))| WeekTally {
            user_id,
            score: raw as f64 * multiplier,
            correct,
            potential: raw_potential as f64 * multiplier,
            picked,
        })
        .collect()
}

/// Rank by score desc, correct-pick count breaking ties.
pub fn rank_by_score(standings: &mut [WeekTally]) {
    standings.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.correct.cmp(&a.correct))
            .then(a.user_id.cmp(&b.user_id))
    });
}

/// Ranking used by the projection view: potential desc, score desc.
pub fn rank_by_potential(standings: &mut [WeekTally]) {
    standings.sort_by(|a, b| {
        b.potential
            .total_cmp(&a.potential)
            .then(b.score.total_cmp(&a.score))
            .then(a.user_id.cmp(&b.user_id))
    });
}

/// Season aggregate: sum of the weekly tallies, with a per-week
/// breakdown for every week the user actually picked in.
pub fn tally_season(weeks: &[WeekRows<'_>], eligible: &[UserId]) -> Vec<SeasonTally> {
    let mut acc: BTreeMap<UserId, SeasonTally> = eligible
        .iter()
        .map(|&u| {
            (
                u,
                SeasonTally {
                    user_id: u,
                    score: 0.0,
                    correct: 0,
                    weeks_played: 0,
                    average: 0.0,
                    per_week: BTreeMap::new(),
                },
            )
        })
        .collect();

    for week in weeks {
        for tally in tally_week(week.games, week.picks, week.multiplier, eligible) {
            if tally.picked == 0 {
                continue;
            }
            let Some(entry) = acc.get_mut(&tally.user_id) else {
                continue;
            };
            entry.score += tally.score;
            entry.correct += tally.correct;
            entry.weeks_played += 1;
            entry.per_week.insert(
                week.number,
                WeekLine {
                    score: tally.score,
                    correct: tally.correct,
                },
            );
        }
    }

    let mut standings: Vec<SeasonTally> = acc
        .into_values()
        .map(|mut t| {
            // Guard the zero-weeks case; an average of 0 beats a NaN.
            t.average = if t.weeks_played > 0 {
                t.score / t.weeks_played as f64
            } else {
                0.0
            };
            t
        })
        .collect();

    standings.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.correct.cmp(&a.correct))
            .then(a.user_id.cmp(&b.user_id))
    });
    standings
}

/// Align one user's per-week lines to the full season week list, for
/// grid-style views. Weeks the user did not play in come out as None.
pub fn align_week_lines(
    per_week: &BTreeMap<i32, WeekLine>,
    week_numbers: &[i32],
) -> Vec<Option<WeekLine>> {
    week_numbers
        .iter()
        .map(|n| per_week.get(n).cloned())
        .collect()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TeamStat {
    pub team_id: TeamId,
    pub points_won: i64,
    pub correct_picks: i32,
    pub points_lost: i64,
    pub incorrect_picks: i32,
}

impl TeamStat {
    pub fn total_points(&self) -> i64 {
        self.points_won + self.points_lost
    }
}

/// Per-team tally of confidence weight staked on it across all decided
/// games. Teams nobody has a decided pick against are left out.
pub fn tally_teams(games: &[Game], picks: &[Pick]) -> Vec<TeamStat> {
    let winners: HashMap<GameId, TeamId> = games
        .iter()
        .filter_map(|g| g.winner.map(|w| (g.id, w)))
        .collect();

    let mut acc: BTreeMap<TeamId, TeamStat> = BTreeMap::new();

    for pick in picks {
        let Some(&winner) = winners.get(&pick.game_id) else {
            continue;
        };
        let entry = acc.entry(pick.guess).or_insert_with(|| TeamStat {
            team_id: pick.guess,
            points_won: 0,
            correct_picks: 0,
            points_lost: 0,
            incorrect_picks: 0,
        });
        if winner == pick.guess {
            entry.points_won += pick.weight as i64;
            entry.correct_picks += 1;
        } else {
            entry.points_lost += pick.weight as i64;
            entry.incorrect_picks += 1;
        }
    }

    let mut stats: Vec<TeamStat> = acc.into_values().collect();
    stats.sort_by(|a, b| {
        b.total_points()
            .cmp(&a.total_points())
            .then(a.team_id.cmp(&b.team_id))
    });
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn game(id: GameId, winner: Option<TeamId>) -> Game {
        Game {
            id,
            week_id: 1,
            home_team: 100,
            away_team: 200,
            kickoff: Utc.with_ymd_and_hms(2025, 9, 7, 17, 0, 0).unwrap(),
            home_score: winner.map(|_| 21),
            away_score: winner.map(|_| 14),
            winner,
        }
    }

    fn pick(user_id: UserId, game_id: GameId, guess: TeamId, weight: i32) -> Pick {
        Pick {
            id: game_id * 1000 + user_id,
            user_id,
            game_id,
            guess,
            weight,
        }
    }

    #[test]
    fn decided_and_undecided_games_split_score_and_potential() {
        // Game A decided for team 100, game B undecided.
        let games = [game(1, Some(100)), game(2, None)];
        let picks = [pick(7, 1, 100, 2), pick(7, 2, 200, 1)];

        let standings = tally_week(&games, &picks, 1.0, &[7]);
        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].score, 2.0);
        assert_eq!(standings[0].correct, 1);
        assert_eq!(standings[0].potential, 3.0);
    }

    #[test]
    fn multiplier_applies_after_raw_summation() {
        // Correct on A (weight 2), wrong on B, multiplier 2.0.
        let games = [game(1, Some(100)), game(2, Some(100))];
        let picks = [pick(7, 1, 100, 2), pick(7, 2, 200, 1)];

        let standings = tally_week(&games, &picks, 2.0, &[7]);
        assert_eq!(standings[0].score, 4.0);
        assert_eq!(standings[0].correct, 1);
        // Nothing left undecided, so potential equals score.
        assert_eq!(standings[0].potential, 4.0);
    }

    #[test]
    fn wrong_pick_contributes_zero_not_negative() {
        let games = [game(1, Some(100))];
        let picks = [pick(7, 1, 200, 16)];

        let standings = tally_week(&games, &picks, 1.0, &[7]);
        assert_eq!(standings[0].score, 0.0);
        assert_eq!(standings[0].correct, 0);
    }

    #[test]
    fn eligible_user_without_picks_appears_zeroed() {
        let games = [game(1, Some(100))];
        let picks = [pick(7, 1, 100, 1)];

        let standings = tally_week(&games, &picks, 1.0, &[7, 8]);
        assert_eq!(standings.len(), 2);
        let idle = standings.iter().find(|t| t.user_id == 8).unwrap();
        assert_eq!((idle.score, idle.correct, idle.picked), (0.0, 0, 0));
    }

    #[test]
    fn ineligible_picks_are_ignored() {
        let games = [game(1, Some(100))];
        let picks = [pick(7, 1, 100, 1), pick(9, 1, 100, 1)];

        let standings = tally_week(&games, &picks, 1.0, &[7]);
        assert_eq!(standings.len(), 1);
        assert_eq!(standings[0].user_id, 7);
    }

    #[test]
    fn week_without_games_yields_empty_standings() {
        assert!(tally_week(&[], &[], 1.0, &[7, 8]).is_empty());
    }

    #[test]
    fn tally_is_order_independent() {
        let games = [game(1, Some(100)), game(2, Some(200)), game(3, None)];
        let picks = [
            pick(7, 1, 100, 3),
            pick(7, 2, 100, 2),
            pick(7, 3, 200, 1),
            pick(8, 1, 200, 1),
            pick(8, 2, 200, 3),
            pick(8, 3, 100, 2),
        ];

        let mut forward = tally_week(&games, &picks, 1.5, &[7, 8]);
        let mut games_rev: Vec<Game> = games.to_vec();
        games_rev.reverse();
        let mut picks_rev: Vec<Pick> = picks.to_vec();
        picks_rev.reverse();
        let mut backward = tally_week(&games_rev, &picks_rev, 1.5, &[7, 8]);

        rank_by_score(&mut forward);
        rank_by_score(&mut backward);
        assert_eq!(forward, backward);
    }

    #[test]
    fn ties_break_on_correct_count() {
        let mut standings = vec![
            WeekTally {
                user_id: 1,
                score: 10.0,
                correct: 5,
                potential: 10.0,
                picked: 5,
            },
            WeekTally {
                user_id: 2,
                score: 10.0,
                correct: 7,
                potential: 10.0,
                picked: 7,
            },
        ];
        rank_by_score(&mut standings);
        assert_eq!(standings[0].user_id, 2);
    }

    #[test]
    fn potential_ranking_breaks_ties_on_score() {
        let mut standings = vec![
            WeekTally {
                user_id: 1,
                score: 6.0,
                correct: 2,
                potential: 12.0,
                picked: 4,
            },
            WeekTally {
                user_id: 2,
                score: 8.0,
                correct: 3,
                potential: 12.0,
                picked: 4,
            },
            WeekTally {
                user_id: 3,
                score: 9.0,
                correct: 4,
                potential: 11.0,
                picked: 4,
            },
        ];
        rank_by_potential(&mut standings);
        assert_eq!(
            standings.iter().map(|t| t.user_id).collect::<Vec<_>>(),
            vec![2, 1, 3]
        );
    }

    #[test]
    fn season_sums_weeks_and_guards_empty_average() {
        let week1_games = [game(1, Some(100)), game(2, Some(200))];
        let week1_picks = [pick(7, 1, 100, 2), pick(7, 2, 200, 1)];
        let week2_games = [game(3, Some(100))];
        let week2_picks = [pick(7, 3, 200, 1)];

        let weeks = [
            WeekRows {
                number: 1,
                multiplier: 1.0,
                games: &week1_games,
                picks: &week1_picks,
            },
            WeekRows {
                number: 2,
                multiplier: 2.0,
                games: &week2_games,
                picks: &week2_picks,
            },
        ];

        let standings = tally_season(&weeks, &[7, 8]);
        assert_eq!(standings[0].user_id, 7);
        assert_eq!(standings[0].score, 3.0);
        assert_eq!(standings[0].correct, 2);
        assert_eq!(standings[0].weeks_played, 2);
        assert_eq!(standings[0].average, 1.5);
        assert_eq!(standings[0].per_week[&1].score, 3.0);
        assert_eq!(standings[0].per_week[&2].correct, 0);

        // User 8 never picked: present, zeroed, average 0 rather than NaN.
        assert_eq!(standings[1].user_id, 8);
        assert_eq!(standings[1].weeks_played, 0);
        assert_eq!(standings[1].average, 0.0);
        assert!(standings[1].per_week.is_empty());
    }

    #[test]
    fn week_lines_align_to_the_season_grid() {
        let mut per_week = BTreeMap::new();
        per_week.insert(
            1,
            WeekLine {
                score: 5.0,
                correct: 3,
            },
        );
        per_week.insert(
            3,
            WeekLine {
                score: 2.0,
                correct: 1,
            },
        );

        let aligned = align_week_lines(&per_week, &[1, 2, 3, 4]);
        assert_eq!(aligned.len(), 4);
        assert_eq!(aligned[0].as_ref().unwrap().score, 5.0);
        assert!(aligned[1].is_none());
        assert_eq!(aligned[2].as_ref().unwrap().correct, 1);
        assert!(aligned[3].is_none());
    }

    #[test]
    fn team_stats_skip_teams_without_decided_picks() {
        let games = [game(1, Some(100)), game(2, None)];
        let picks = [
            pick(7, 1, 100, 3),
            pick(8, 1, 200, 2),
            // Undecided game: contributes to nobody.
            pick(7, 2, 300, 5),
        ];

        let stats = tally_teams(&games, &picks);
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.team_id != 300));

        let winner = stats.iter().find(|s| s.team_id == 100).unwrap();
        assert_eq!((winner.points_won, winner.correct_picks), (3, 1));
        let loser = stats.iter().find(|s| s.team_id == 200).unwrap();
        assert_eq!((loser.points_lost, loser.incorrect_picks), (2, 1));
    }

    #[test]
    fn team_stats_sort_by_total_staked_points() {
        let games = [game(1, Some(100)), game(2, Some(200))];
        let picks = [
            pick(7, 1, 100, 1),
            pick(8, 2, 200, 4),
            pick(9, 2, 200, 2),
        ];

        let stats = tally_teams(&games, &picks);
        assert_eq!(stats[0].team_id, 200);
        assert_eq!(stats[0].points_won, 6);
        assert_eq!(stats[1].team_id, 100);
    }
}
