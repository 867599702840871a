//! Match outcome estimation
//!
//! Fits a Poisson regression of goals on home advantage, scoring team and
//! opponent over the match history, predicts each side's expected goals for
//! the target match, and sums the joint score distribution (capped at
//! `max_goals` per side) into home win / draw / away win probabilities.

mod glm;
mod linalg;
mod training;

pub use glm::{fit_poisson, FitOptions, PoissonFit};
pub use training::{Observation, TrainingTable};

use odds_shared::constants::{DEFAULT_MAX_GOALS, TRUNCATION_TOLERANCE};
use odds_shared::{MatchRecord, OddsResult, ServiceError};
use statrs::distribution::{Discrete, Poisson};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Numeric divergence: {0}")]
    NumericDivergence(String),
}

impl EstimatorError {
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            EstimatorError::InsufficientData(reason) => ServiceError::insufficient_data(reason),
            EstimatorError::NumericDivergence(reason) => ServiceError::numeric_divergence(reason),
        }
    }
}

/// Everything the estimator worked out for one target match
#[derive(Debug, Clone)]
pub struct Estimate {
    pub odds: OddsResult,
    /// Expected goals for the home side
    pub home_rate: f64,
    /// Expected goals for the away side
    pub away_rate: f64,
    /// Probability mass of scores above `max_goals`, at most `TRUNCATION_TOLERANCE`
    pub truncation_deficit: f64,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct OddsEstimator {
    max_goals: usize,
    fit: FitOptions,
}

impl Default for OddsEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_GOALS)
    }
}

impl OddsEstimator {
    pub fn new(max_goals: usize) -> Self {
        Self {
            max_goals,
            fit: FitOptions::default(),
        }
    }

    /// Outcome probabilities for `records[0]`, trained on `records[1..]`
    pub fn estimate(&self, records: &[MatchRecord]) -> Result<Estimate, EstimatorError> {
        let (target, history) = records
            .split_first()
            .ok_or_else(|| EstimatorError::InsufficientData("request is empty".to_string()))?;

        if history.is_empty() {
            return Err(EstimatorError::InsufficientData(
                "no previous matches".to_string(),
            ));
        }

        let home = target.home_team_api_id;
        let away = target.away_team_api_id;
        if home == away {
            return Err(EstimatorError::InsufficientData(format!(
                "team {} cannot play itself",
                home
            )));
        }

        let table = TrainingTable::from_history(history);
        for team in [home, away] {
            if !table.contains_team(team) {
                return Err(EstimatorError::InsufficientData(format!(
                    "team {} has no previous matches",
                    team
                )));
            }
        }
        if table.total_goals() == 0 {
            return Err(EstimatorError::InsufficientData(
                "no goals scored in the history".to_string(),
            ));
        }

        let (x, y) = table.design_matrix();
        let fit = fit_poisson(&x, &y, self.fit)?;

        let home_row = table.design_row(home, away, true);
        let away_row = table.design_row(away, home, false);
        for (team, opponent, row) in [(home, away, &home_row), (away, home, &away_row)] {
            if !fit.is_estimable(row) {
                return Err(EstimatorError::InsufficientData(format!(
                    "scoring rate of team {} against team {} is not determined by the history",
                    team, opponent
                )));
            }
            if fit.saturates(row) {
                return Err(EstimatorError::InsufficientData(format!(
                    "scoring rate of team {} against team {} is out of range",
                    team, opponent
                )));
            }
        }

        let home_rate = fit.predict(&home_row);
        let away_rate = fit.predict(&away_row);
        debug!(
            match_api_id = target.match_api_id,
            history = history.len(),
            iterations = fit.iterations,
            rank = fit.rank,
            home_rate,
            away_rate,
            "Scoring model fitted"
        );

        let home_goals = goal_distribution(home_rate, self.max_goals)?;
        let away_goals = goal_distribution(away_rate, self.max_goals)?;
        let outcome = reduce_outcomes(&home_goals, &away_goals);

        let mass = outcome.mass();
        if !mass.is_finite() {
            return Err(EstimatorError::NumericDivergence(format!(
                "score distribution has mass {}",
                mass
            )));
        }

        let truncation_deficit = 1.0 - mass;
        if truncation_deficit > TRUNCATION_TOLERANCE {
            return Err(EstimatorError::InsufficientData(format!(
                "expected goals {:.3} and {:.3} leave {:.6} of the score mass above {} goals",
                home_rate, away_rate, truncation_deficit, self.max_goals
            )));
        }

        // Spread the negligible deficit so the triple sums to one
        let odds = OddsResult::new(
            outcome.home_win / mass,
            outcome.draw / mass,
            outcome.away_win / mass,
        )
        .map_err(|e| EstimatorError::NumericDivergence(e.to_string()))?;

        Ok(Estimate {
            odds,
            home_rate,
            away_rate,
            truncation_deficit,
            iterations: fit.iterations,
        })
    }
}

/// P(goals = k) for k in 0..=max_goals
pub fn goal_distribution(rate: f64, max_goals: usize) -> Result<Vec<f64>, EstimatorError> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(EstimatorError::NumericDivergence(format!(
            "invalid scoring rate {}",
            rate
        )));
    }

    if rate == 0.0 {
        let mut point_mass = vec![0.0; max_goals + 1];
        point_mass[0] = 1.0;
        return Ok(point_mass);
    }

    let poisson =
        Poisson::new(rate).map_err(|e| EstimatorError::NumericDivergence(e.to_string()))?;
    Ok((0..=max_goals).map(|k| poisson.pmf(k as u64)).collect())
}

/// Unnormalized outcome mass of a truncated joint score distribution
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutcomeMass {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl OutcomeMass {
    pub fn mass(&self) -> f64 {
        self.home_win + self.draw + self.away_win
    }
}

/// Sum the outer product of the two goal distributions by outcome
///
/// Cell (i, j) is home scoring i and away scoring j: below the diagonal is a
/// home win, the diagonal a draw, above it an away win.
pub fn reduce_outcomes(home_goals: &[f64], away_goals: &[f64]) -> OutcomeMass {
    let mut outcome = OutcomeMass::default();
    for (i, ph) in home_goals.iter().enumerate() {
        for (j, pa) in away_goals.iter().enumerate() {
            let p = ph * pa;
            match i.cmp(&j) {
                std::cmp::Ordering::Greater => outcome.home_win += p,
                std::cmp::Ordering::Equal => outcome.draw += p,
                std::cmp::Ordering::Less => outcome.away_win += p,
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use odds_shared::constants::PROBABILITY_TOLERANCE;

    const HOME: i64 = 8634;
    const AWAY: i64 = 8633;

    fn record(id: i64, day: u32, home: i64, away: i64, goals: (u32, u32)) -> MatchRecord {
        MatchRecord {
            match_api_id: id,
            country_id: 21518,
            league_id: 21518,
            season: "2015/2016".to_string(),
            stage: day as i32,
            date: NaiveDate::from_ymd_opt(2015, 10, day).unwrap(),
            home_team_api_id: home,
            away_team_api_id: away,
            home_team_goal: goals.0,
            away_team_goal: goals.1,
        }
    }

    fn target() -> MatchRecord {
        record(1, 30, HOME, AWAY, (0, 0))
    }

    /// Ten prior matches among six teams, both target teams included
    fn league_history() -> Vec<MatchRecord> {
        vec![
            record(2, 20, HOME, 10, (2, 1)),
            record(3, 19, AWAY, 11, (0, 0)),
            record(4, 18, 12, HOME, (0, 1)),
            record(5, 17, 13, AWAY, (1, 1)),
            record(6, 16, 10, 11, (1, 0)),
            record(7, 15, 12, 13, (2, 1)),
            record(8, 14, HOME, 12, (2, 1)),
            record(9, 13, AWAY, 10, (0, 0)),
            record(10, 12, 11, HOME, (1, 2)),
            record(11, 11, 13, 10, (0, 1)),
        ]
    }

    fn request(history: Vec<MatchRecord>) -> Vec<MatchRecord> {
        std::iter::once(target()).chain(history).collect()
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let estimate = OddsEstimator::default()
            .estimate(&request(league_history()))
            .unwrap();
        let odds = estimate.odds;

        assert!((odds.total() - 1.0).abs() <= PROBABILITY_TOLERANCE);
        for p in [odds.home_win, odds.draw, odds.away_win] {
            assert!((0.0..=1.0).contains(&p));
        }
        assert!(estimate.home_rate > 0.0 && estimate.away_rate > 0.0);
    }

    #[test]
    fn test_dominant_home_side_favoured() {
        let estimate = OddsEstimator::default()
            .estimate(&request(league_history()))
            .unwrap();

        // HOME won all four of its matches, AWAY drew all three
        assert!(estimate.home_rate > estimate.away_rate);
        assert!(estimate.odds.home_win > estimate.odds.away_win);
    }

    #[test]
    fn test_truncation_negligible_for_typical_rates() {
        let estimate = OddsEstimator::default()
            .estimate(&request(league_history()))
            .unwrap();
        assert!(estimate.truncation_deficit >= 0.0);
        assert!(estimate.truncation_deficit < TRUNCATION_TOLERANCE);
    }

    #[test]
    fn test_empty_request() {
        let result = OddsEstimator::default().estimate(&[]);
        assert!(matches!(result, Err(EstimatorError::InsufficientData(_))));
    }

    #[test]
    fn test_target_without_history() {
        let result = OddsEstimator::default().estimate(&[target()]);
        assert!(matches!(result, Err(EstimatorError::InsufficientData(_))));
    }

    #[test]
    fn test_team_absent_from_history() {
        let history = vec![record(2, 20, HOME, 10, (2, 1)), record(3, 19, 10, 11, (0, 1))];
        let result = OddsEstimator::default().estimate(&request(history));

        match result {
            Err(EstimatorError::InsufficientData(reason)) => {
                assert!(reason.contains(&AWAY.to_string()))
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_goalless_history() {
        let history = vec![record(2, 20, HOME, AWAY, (0, 0)), record(3, 19, AWAY, HOME, (0, 0))];
        let result = OddsEstimator::default().estimate(&request(history));
        assert!(matches!(result, Err(EstimatorError::InsufficientData(_))));
    }

    #[test]
    fn test_one_match_per_team_not_estimable() {
        // Nothing links HOME's attack to AWAY's defence
        let history = vec![record(2, 20, HOME, 10, (2, 1)), record(3, 19, 11, AWAY, (1, 1))];

        match OddsEstimator::default().estimate(&request(history)) {
            Err(EstimatorError::InsufficientData(reason)) => {
                assert!(reason.contains("not determined"), "{}", reason)
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_target_team_that_never_scored() {
        let history = vec![
            record(2, 20, HOME, 10, (2, 1)),
            record(3, 19, 10, 11, (1, 1)),
            record(4, 18, 11, HOME, (0, 2)),
            record(5, 17, 12, AWAY, (1, 0)),
        ];

        // AWAY's only match was goalless for them, so its rate drifts to zero
        match OddsEstimator::default().estimate(&request(history)) {
            Err(EstimatorError::InsufficientData(reason)) => {
                assert!(reason.contains("not determined"), "{}", reason)
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_goal_distribution_zero_rate_is_point_mass() {
        let dist = goal_distribution(0.0, 3).unwrap();
        assert_eq!(dist, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_goal_distribution_rejects_bad_rates() {
        assert!(goal_distribution(f64::NAN, 10).is_err());
        assert!(goal_distribution(f64::INFINITY, 10).is_err());
        assert!(goal_distribution(-1.0, 10).is_err());
    }

    #[test]
    fn test_goal_distribution_matches_poisson_pmf() {
        let dist = goal_distribution(1.5, 10).unwrap();
        assert!((dist[0] - (-1.5_f64).exp()).abs() < 1e-12);
        assert!((dist[2] - 1.5_f64.powi(2) / 2.0 * (-1.5_f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_reduce_outcomes_by_triangle() {
        let outcome = reduce_outcomes(&[0.5, 0.5], &[0.25, 0.75]);

        // (1,0) home win, (0,0) and (1,1) draws, (0,1) away win
        assert!((outcome.home_win - 0.125).abs() < 1e-12);
        assert!((outcome.draw - 0.5).abs() < 1e-12);
        assert!((outcome.away_win - 0.375).abs() < 1e-12);
        assert!((outcome.mass() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_small_goal_cap_is_rejected() {
        let result = OddsEstimator::new(1).estimate(&request(league_history()));

        match result {
            Err(EstimatorError::InsufficientData(reason)) => {
                assert!(reason.contains("above 1 goals"), "{}", reason)
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_high_scoring_league_exceeds_goal_cap() {
        let history = league_history()
            .into_iter()
            .map(|mut m| {
                m.home_team_goal *= 4;
                m.away_team_goal *= 4;
                m
            })
            .collect();

        let result = OddsEstimator::default().estimate(&request(history));
        assert!(matches!(result, Err(EstimatorError::InsufficientData(_))));
    }

    #[test]
    fn test_insufficient_data_maps_to_service_error() {
        let error = EstimatorError::InsufficientData("team 1 has no previous matches".to_string())
            .to_service_error();
        assert!(error.has_code(&odds_shared::ErrorCode::COMPUTATION_INSUFFICIENT_DATA));
        assert_eq!(error.context.as_deref(), Some("team 1 has no previous matches"));
    }
}
