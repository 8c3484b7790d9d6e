//! Stake bookkeeping and validator nomination.

use std::collections::HashMap;

/// Default size of the validator committee.
pub const DEFAULT_COMMITTEE_SIZE: usize = 4;

/// Stake weight per participant address.
///
/// Addresses are remembered in the order they were first seen, which is the
/// tie-break order for ranking. Totals may go negative.
#[derive(Debug, Clone, Default)]
pub struct StakeRegister {
    entries: Vec<(String, f64)>,
    positions: HashMap<String, usize>,
}

impl StakeRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a register from initial `(address, stake)` pairs.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut register = Self::new();
        for (address, stake) in entries {
            register.update_stake(address, stake);
        }
        register
    }

    /// Add `delta` to the stake of `address`, registering it at 0 first if
    /// unknown.
    pub fn update_stake(&mut self, address: impl Into<String>, delta: f64) {
        let address = address.into();
        match self.positions.get(&address) {
            Some(&pos) => self.entries[pos].1 += delta,
            None => {
                self.positions.insert(address.clone(), self.entries.len());
                self.entries.push((address, delta));
            }
        }
    }

    /// Stake of `address`, 0 if unknown.
    pub fn stake_of(&self, address: &str) -> f64 {
        self.positions
            .get(address)
            .map(|&pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    /// Copy of the address-to-stake mapping.
    pub fn stake_map(&self) -> HashMap<String, f64> {
        self.entries.iter().cloned().collect()
    }

    /// All known addresses by stake, highest first; equal stakes keep their
    /// insertion order.
    pub fn get_highest_stake_addresses(&self) -> Vec<String> {
        let mut ranked: Vec<&(String, f64)> = self.entries.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.into_iter().map(|(address, _)| address.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Nominate the top `committee_size` addresses by stake.
///
/// Addresses whose stake is not strictly positive are never nominated.
pub fn vote_for_validators(register: &StakeRegister, committee_size: usize) -> Vec<String> {
    register
        .get_highest_stake_addresses()
        .into_iter()
        .filter(|address| register.stake_of(address) > 0.0)
        .take(committee_size)
        .collect()
}
