//! Odds lookup for a stored match

use async_trait::async_trait;
use odds_shared::{MatchRecord, OddsResult};
use std::sync::Arc;

use crate::errors::{AppError, Result};
use crate::history;
use crate::rpc::OddsRpcClient;

/// Read access to stored matches
///
/// Implemented by the persistence layer of the hosting service.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn find_match(&self, match_api_id: i64) -> anyhow::Result<Option<MatchRecord>>;

    /// Matches of one league and season, in any order
    async fn season_matches(&self, league_id: i64, season: &str)
        -> anyhow::Result<Vec<MatchRecord>>;
}

pub struct OddsService<S> {
    source: S,
    client: Arc<OddsRpcClient>,
    history_limit: usize,
}

impl<S: MatchSource> OddsService<S> {
    pub fn new(source: S, client: Arc<OddsRpcClient>, history_limit: usize) -> Self {
        Self {
            source,
            client,
            history_limit,
        }
    }

    /// Outcome probabilities for a stored match
    pub async fn odds_for_match(&self, match_api_id: i64) -> Result<OddsResult> {
        let target = self
            .source
            .find_match(match_api_id)
            .await?
            .ok_or(AppError::NotFound(match_api_id))?;

        let candidates = self
            .source
            .season_matches(target.league_id, &target.season)
            .await?;
        let request = history::build_request(&target, candidates, self.history_limit);

        tracing::debug!(
            match_api_id,
            league_id = target.league_id,
            season = %target.season,
            history_len = request.len() - 1,
            "Requesting odds"
        );

        Ok(self.client.call(&request).await?)
    }
}
