//! Domain records exchanged over the odds RPC queue
//!
//! `MatchRecord` travels from the request-serving process to the processor,
//! `OddsResult` travels back. Both are plain snapshots with no lifecycle.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::PROBABILITY_TOLERANCE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{name} probability out of range: {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },

    #[error("Probabilities sum to {total}, expected 1.0")]
    ProbabilitiesDoNotSum { total: f64 },
}

/// One played (or scheduled) match
///
/// Field names follow the match table columns so payloads stay readable by
/// anything that already speaks that schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_api_id: i64,
    pub country_id: i64,
    pub league_id: i64,
    /// Season label, e.g. "2015/2016"
    pub season: String,
    pub stage: i32,
    pub date: NaiveDate,
    pub home_team_api_id: i64,
    pub away_team_api_id: i64,
    pub home_team_goal: u32,
    pub away_team_goal: u32,
}

impl MatchRecord {
    /// Same league and same season
    pub fn same_competition(&self, other: &MatchRecord) -> bool {
        self.league_id == other.league_id && self.season == other.season
    }
}

/// Outcome probabilities for a single match
///
/// Serialized with the `home_team` / `draw` / `away_team` keys the reply
/// contract uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OddsResult {
    #[serde(rename = "home_team")]
    pub home_win: f64,
    pub draw: f64,
    #[serde(rename = "away_team")]
    pub away_win: f64,
}

impl OddsResult {
    /// Build a validated triple
    ///
    /// Each value must be finite and inside [0, 1], and the three must sum to
    /// 1.0 within `PROBABILITY_TOLERANCE`.
    pub fn new(home_win: f64, draw: f64, away_win: f64) -> Result<Self, ValidationError> {
        let odds = Self {
            home_win,
            draw,
            away_win,
        };
        odds.validate()?;
        Ok(odds)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("home_team", self.home_win),
            ("draw", self.draw),
            ("away_team", self.away_win),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ProbabilityOutOfRange { name, value });
            }
        }

        let total = self.total();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(ValidationError::ProbabilitiesDoNotSum { total });
        }

        Ok(())
    }

    pub fn total(&self) -> f64 {
        self.home_win + self.draw + self.away_win
    }
}

impl std::fmt::Display for OddsResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "home {:.4} / draw {:.4} / away {:.4}",
            self.home_win, self.draw, self.away_win
        )
    }
}
