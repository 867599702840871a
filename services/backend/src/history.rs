//! Training history selection
//!
//! The processor fits its model on the target match's most recent
//! predecessors from the same league and season.

use odds_shared::MatchRecord;

/// Build a call payload: the target first, then up to `limit` earlier matches
///
/// Candidates from another league or season, and those not strictly before
/// the target's date, are skipped. The rest are ordered newest first. The
/// target itself is never part of its own history.
pub fn build_request(
    target: &MatchRecord,
    candidates: impl IntoIterator<Item = MatchRecord>,
    limit: usize,
) -> Vec<MatchRecord> {
    let mut history: Vec<MatchRecord> = candidates
        .into_iter()
        .filter(|m| {
            m.match_api_id != target.match_api_id
                && m.same_competition(target)
                && m.date < target.date
        })
        .collect();

    // Newest first; ties keep a stable, deterministic order
    history.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.match_api_id.cmp(&a.match_api_id))
    });
    history.truncate(limit);

    let mut request = Vec::with_capacity(history.len() + 1);
    request.push(target.clone());
    request.extend(history);
    request
}
