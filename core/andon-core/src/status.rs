//! Status transition rules for machines and matrices.
//! The table is closed: anything not explicitly allowed is rejected before
//! an intent is built, so the gateway never sees a nonsense transition.

use crate::error::{AndonError, Result};
use crate::types::{Machine, UnitRef, UnitStatus};

/// Enforces the unit-selection rule.
///
/// A machine with `number_of_matrices = 0` is itself the tracked unit. A
/// machine with matrices is only trackable per `(machine_id, matrix_number)`
/// with the number in `1..=N`; its own status field is not independently
/// meaningful.
pub fn check_addressing(machine: &Machine, unit: &UnitRef) -> Result<()> {
    match unit {
        UnitRef::Machine { .. } if !machine.tracks_matrices() => Ok(()),
        UnitRef::Matrix { matrix_number, .. }
            if machine.tracks_matrices()
                && *matrix_number >= 1
                && *matrix_number <= machine.number_of_matrices =>
        {
            Ok(())
        }
        _ => Err(AndonError::UnitNotTracked { unit: unit.clone() }),
    }
}

/// Validates a requested status change against the current unit state.
///
/// `EmergencyStopped` is never a valid direct target here; it is reachable
/// only through the emergency path, which addresses every unit an operator
/// controls at once.
pub fn validate_transition(
    unit: &UnitRef,
    current: UnitStatus,
    target: UnitStatus,
    reason_id: Option<&str>,
    has_active_session: bool,
) -> Result<()> {
    match (current, target) {
        (UnitStatus::Stopped | UnitStatus::EmergencyStopped, UnitStatus::Running) => {
            if has_active_session {
                Ok(())
            } else {
                Err(AndonError::NoActiveSession {
                    machine_id: unit.machine_id().to_string(),
                })
            }
        }
        (UnitStatus::Running, UnitStatus::Stopped) => {
            match reason_id.map(str::trim).filter(|r| !r.is_empty()) {
                Some(_) => Ok(()),
                None => Err(AndonError::MissingReason { unit: unit.clone() }),
            }
        }
        (from, to) => Err(AndonError::InvalidTransition {
            unit: unit.clone(),
            from,
            to,
        }),
    }
}
