//! Error types for andon-core operations.
//!
//! Validation errors are detected locally before any remote call and are
//! never retried automatically; remote failures are safe for callers to
//! retry because the engine re-derives state from the gateway afterwards.

use crate::types::{UnitRef, UnitStatus};

/// All errors that can occur in andon-core operations.
#[derive(Debug, thiserror::Error)]
pub enum AndonError {
    // ─────────────────────────────────────────────────────────────────────
    // Local validation
    // ─────────────────────────────────────────────────────────────────────
    #[error("invalid status transition on {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: UnitRef,
        from: UnitStatus,
        to: UnitStatus,
    },

    #[error("a stop reason is required to stop {unit}")]
    MissingReason { unit: UnitRef },

    #[error("no active session on machine {machine_id}")]
    NoActiveSession { machine_id: String },

    #[error("no stop reason selected for the emergency stop")]
    NoReasonSelected,

    #[error("operator {operator_id} has no machines assigned")]
    NoMachinesAssigned { operator_id: String },

    #[error("unknown machine: {machine_id}")]
    UnknownMachine { machine_id: String },

    #[error("status is not tracked for unit {unit}")]
    UnitNotTracked { unit: UnitRef },

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────
    #[error("an active session already exists on machine {machine_id} for operator {operator_id}")]
    SessionConflict {
        machine_id: String,
        operator_id: String,
    },

    #[error("no active session found: {session_id}")]
    SessionNotFound { session_id: String },

    // ─────────────────────────────────────────────────────────────────────
    // Remote
    // ─────────────────────────────────────────────────────────────────────
    #[error("gateway unavailable: {context}")]
    RemoteUnavailable { context: String },

    #[error("gateway rejected the request: {code}: {message}")]
    Gateway { code: String, message: String },

    /// Some but not all units of a batched mutation succeeded. The failed
    /// unit references are listed so the caller can show which machines or
    /// matrices still need attention.
    #[error("{} unit(s) failed in a batched stop", failed.len())]
    PartialBatchFailure { failed: Vec<UnitRef> },
}

impl AndonError {
    /// True for errors raised before any intent left the process.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            AndonError::InvalidTransition { .. }
                | AndonError::MissingReason { .. }
                | AndonError::NoActiveSession { .. }
                | AndonError::NoReasonSelected
                | AndonError::NoMachinesAssigned { .. }
                | AndonError::UnknownMachine { .. }
                | AndonError::UnitNotTracked { .. }
                | AndonError::SessionConflict { .. }
                | AndonError::SessionNotFound { .. }
        )
    }
}

/// Convenience type alias for Results using AndonError.
pub type Result<T> = std::result::Result<T, AndonError>;
