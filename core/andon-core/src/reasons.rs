//! Company-scoped view of the stop-reason registry.
//!
//! The gateway owns the reason list; this is the local read view plus the
//! rules around the reserved "Shift Ended" reason, which is created lazily
//! at most once per company and must never be offered as an emergency cause.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;

use crate::types::StopReason;

/// Wire name of the reserved end-of-shift reason.
pub const SHIFT_END_REASON_NAME: &str = "Shift Ended";

static SHIFT_END_KEY: Lazy<String> = Lazy::new(|| normalize_name(SHIFT_END_REASON_NAME));

/// Trims and lowercases for name comparison, so a gateway-side "shift ended"
/// row is recognized instead of duplicated.
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, Default)]
pub struct ReasonRegistry {
    by_id: HashMap<String, StopReason>,
}

impl ReasonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole view. Never merges with the previous one.
    pub fn replace_all(&mut self, reasons: Vec<StopReason>) {
        self.by_id = reasons
            .into_iter()
            .map(|reason| (reason.id.clone(), reason))
            .collect();
    }

    /// Inserts or replaces a single reason, e.g. the result of a
    /// get-or-create round-trip, without waiting for the next full refresh.
    pub fn upsert(&mut self, reason: StopReason) {
        self.by_id.insert(reason.id.clone(), reason);
    }

    pub fn get(&self, reason_id: &str) -> Option<&StopReason> {
        self.by_id.get(reason_id)
    }

    pub fn contains(&self, reason_id: &str) -> bool {
        self.by_id.contains_key(reason_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// All reasons, sorted by name for stable presentation.
    pub fn all(&self) -> Vec<&StopReason> {
        let mut reasons: Vec<&StopReason> = self.by_id.values().collect();
        reasons.sort_by(|a, b| a.name.cmp(&b.name));
        reasons
    }

    pub fn is_shift_end(reason: &StopReason) -> bool {
        normalize_name(&reason.name) == *SHIFT_END_KEY
    }

    /// The reserved "Shift Ended" reason, if the view already has it.
    pub fn shift_end_reason(&self) -> Option<&StopReason> {
        self.by_id.values().find(|r| Self::is_shift_end(r))
    }

    /// Reasons an operator may pick as an emergency cause: everything except
    /// the reserved "Shift Ended" one.
    pub fn emergency_choices(&self) -> Vec<&StopReason> {
        let mut choices: Vec<&StopReason> = self
            .by_id
            .values()
            .filter(|r| !Self::is_shift_end(r))
            .collect();
        choices.sort_by(|a, b| a.name.cmp(&b.name));
        choices
    }

    /// Ids of reasons excluded from ranked Pareto output.
    pub fn ignored_ids(&self) -> HashSet<&str> {
        self.by_id
            .values()
            .filter(|r| r.ignore_in_pareto)
            .map(|r| r.id.as_str())
            .collect()
    }
}
