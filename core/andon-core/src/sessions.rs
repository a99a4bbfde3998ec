//! Session lifecycle rules.
//!
//! The start/end round-trips live on the engine; this module holds the
//! local guards and the two end-of-session policies. The gateway is the
//! final arbiter of cross-client conflicts; the guards here only catch what
//! this client can already see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AndonError, Result};
use crate::snapshot::FloorSnapshot;
use crate::types::ProductionSession;

/// How an operator leaves a session.
///
/// `EndShift` closes the session and stops every unit the operator holds
/// with the reserved "Shift Ended" reason. `KeepOpen` is a plain logout:
/// the session keeps running and a later login resumes counting from the
/// original start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndPolicy {
    EndShift,
    KeepOpen,
}

pub fn ensure_can_start(
    snapshot: &FloorSnapshot,
    machine_id: &str,
    operator_id: &str,
) -> Result<()> {
    if snapshot.machine(machine_id).is_none() {
        return Err(AndonError::UnknownMachine {
            machine_id: machine_id.to_string(),
        });
    }
    if snapshot.active_session_for(machine_id, operator_id).is_some() {
        return Err(AndonError::SessionConflict {
            machine_id: machine_id.to_string(),
            operator_id: operator_id.to_string(),
        });
    }
    Ok(())
}

pub fn find_active<'a>(
    snapshot: &'a FloorSnapshot,
    session_id: &str,
) -> Result<&'a ProductionSession> {
    match snapshot.session(session_id) {
        Some(session) if session.active => Ok(session),
        _ => Err(AndonError::SessionNotFound {
            session_id: session_id.to_string(),
        }),
    }
}

/// Elapsed seconds for a session as of `now`. Pure function of the stored
/// start time, so it survives logout/login gaps without drift.
pub fn elapsed_seconds(session: &ProductionSession, now: DateTime<Utc>) -> i64 {
    session.elapsed(now).num_seconds()
}
