//! Validator-committee ballots and quorum arithmetic.
//!
//! Every node broadcasts its own top-K view of the stake register as a
//! ballot. The committee is the K addresses appearing on the most ballots,
//! ties broken by ascending address so every node tallies the same result.

use std::collections::HashMap;

/// Count, per address, the number of ballots that include it.
///
/// An address listed twice on one ballot counts once.
pub fn count_ballots(ballots: &[Vec<String>]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for ballot in ballots {
        let mut seen: Vec<&String> = Vec::with_capacity(ballot.len());
        for candidate in ballot {
            if seen.contains(&candidate) {
                continue;
            }
            seen.push(candidate);
            *counts.entry(candidate.clone()).or_default() += 1;
        }
    }
    counts
}

/// Elect a committee of `committee_size` addresses from `ballots`.
pub fn tally_ballots(ballots: &[Vec<String>], committee_size: usize) -> Vec<String> {
    let mut ranked: Vec<(String, usize)> = count_ballots(ballots).into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(committee_size)
        .map(|(address, _)| address)
        .collect()
}

/// True iff strictly more than half of `participants` accepted.
pub fn quorum_reached(accepts: usize, participants: usize) -> bool {
    accepts * 2 > participants
}
