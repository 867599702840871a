//! Training table and design matrix for the team-strength model
//!
//! Every historical match contributes two observations: goals scored by the
//! home side (`home = 1`) and goals scored by the away side (`home = 0`),
//! each keyed by the scoring team and its opponent. The regressors are an
//! intercept, the home indicator, and treatment-coded dummies for team and
//! opponent with the lowest team id as the baseline level.

use odds_shared::MatchRecord;

use super::linalg::Matrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub team: i64,
    pub opponent: i64,
    pub home: bool,
    pub goals: u32,
}

#[derive(Debug, Clone)]
pub struct TrainingTable {
    observations: Vec<Observation>,
    /// Sorted, deduplicated team ids; index 0 is the baseline
    levels: Vec<i64>,
}

impl TrainingTable {
    pub fn from_history(history: &[MatchRecord]) -> Self {
        let observations: Vec<Observation> = history
            .iter()
            .flat_map(|m| {
                [
                    Observation {
                        team: m.home_team_api_id,
                        opponent: m.away_team_api_id,
                        home: true,
                        goals: m.home_team_goal,
                    },
                    Observation {
                        team: m.away_team_api_id,
                        opponent: m.home_team_api_id,
                        home: false,
                        goals: m.away_team_goal,
                    },
                ]
            })
            .collect();

        let mut levels: Vec<i64> = observations.iter().map(|o| o.team).collect();
        levels.sort_unstable();
        levels.dedup();

        Self {
            observations,
            levels,
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn contains_team(&self, team: i64) -> bool {
        self.levels.binary_search(&team).is_ok()
    }

    pub fn total_goals(&self) -> u64 {
        self.observations.iter().map(|o| o.goals as u64).sum()
    }

    /// Intercept + home + (levels - 1) team dummies + (levels - 1) opponent dummies
    pub fn parameter_count(&self) -> usize {
        2 + 2 * self.levels.len().saturating_sub(1)
    }

    /// Regressor row for `team` scoring against `opponent`
    ///
    /// A team outside the training levels gets all-zero dummies, which is the
    /// baseline team's strength; callers check `contains_team` first.
    pub fn design_row(&self, team: i64, opponent: i64, home: bool) -> Vec<f64> {
        let dummies = self.levels.len().saturating_sub(1);
        let mut row = vec![0.0; self.parameter_count()];
        row[0] = 1.0;
        row[1] = if home { 1.0 } else { 0.0 };

        if let Some(index) = self.dummy_index(team) {
            row[2 + index] = 1.0;
        }
        if let Some(index) = self.dummy_index(opponent) {
            row[2 + dummies + index] = 1.0;
        }
        row
    }

    /// Design matrix and response vector, one row per observation
    pub fn design_matrix(&self) -> (Matrix, Vec<f64>) {
        let x = self
            .observations
            .iter()
            .map(|o| self.design_row(o.team, o.opponent, o.home))
            .collect();
        let y = self.observations.iter().map(|o| o.goals as f64).collect();
        (x, y)
    }

    fn dummy_index(&self, team: i64) -> Option<usize> {
        match self.levels.binary_search(&team) {
            Ok(0) | Err(_) => None,
            Ok(level) => Some(level - 1),
        }
    }
}
