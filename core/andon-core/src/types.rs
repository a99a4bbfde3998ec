//! Core domain types shared across all Andon clients.
//!
//! These types are the local, strongly-typed view of what the gateway serves
//! as wire rows. The snapshot module converts rows into them on every
//! refresh; nothing here is authoritative on its own.

use std::fmt;

use andon_gateway_protocol::UnitTarget;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// Unit status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a trackable unit (a machine, or one matrix of a machine).
///
/// `EmergencyStopped` is a stopped variant reachable only through the
/// emergency path; it always carries a mandatory reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Running,
    #[default]
    Stopped,
    EmergencyStopped,
}

impl UnitStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, UnitStatus::Running)
    }

    /// Stopped-type statuses carry a `current_stop_reason_id`.
    pub fn is_stopped_kind(&self) -> bool {
        matches!(self, UnitStatus::Stopped | UnitStatus::EmergencyStopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Running => "RUNNING",
            UnitStatus::Stopped => "STOPPED",
            UnitStatus::EmergencyStopped => "EMERGENCY_STOPPED",
        }
    }

    /// Parses a wire status string. Unknown values map to `None`; callers
    /// decide whether to default or reject.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Some(UnitStatus::Running),
            "STOPPED" => Some(UnitStatus::Stopped),
            "EMERGENCY_STOPPED" => Some(UnitStatus::EmergencyStopped),
            _ => None,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Unit references
// ═══════════════════════════════════════════════════════════════════════════════

/// Reference to one trackable unit.
///
/// Machines with `number_of_matrices = 0` are addressed directly; machines
/// with matrices are addressed per `(machine_id, matrix_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitRef {
    Machine { machine_id: String },
    Matrix { machine_id: String, matrix_number: u32 },
}

impl UnitRef {
    pub fn machine(machine_id: impl Into<String>) -> Self {
        UnitRef::Machine {
            machine_id: machine_id.into(),
        }
    }

    pub fn matrix(machine_id: impl Into<String>, matrix_number: u32) -> Self {
        UnitRef::Matrix {
            machine_id: machine_id.into(),
            matrix_number,
        }
    }

    pub fn machine_id(&self) -> &str {
        match self {
            UnitRef::Machine { machine_id } => machine_id,
            UnitRef::Matrix { machine_id, .. } => machine_id,
        }
    }

    pub fn matrix_number(&self) -> Option<u32> {
        match self {
            UnitRef::Machine { .. } => None,
            UnitRef::Matrix { matrix_number, .. } => Some(*matrix_number),
        }
    }

    pub fn to_target(&self) -> UnitTarget {
        UnitTarget {
            machine_id: self.machine_id().to_string(),
            matrix_number: self.matrix_number(),
        }
    }

    pub fn from_target(target: &UnitTarget) -> Self {
        match target.matrix_number {
            Some(n) => UnitRef::matrix(target.machine_id.clone(), n),
            None => UnitRef::machine(target.machine_id.clone()),
        }
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitRef::Machine { machine_id } => write!(f, "{}", machine_id),
            UnitRef::Matrix {
                machine_id,
                matrix_number,
            } => write!(f, "{}#{}", machine_id, matrix_number),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entities
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub company_id: String,
    pub group_id: Option<String>,
    /// 0 means the machine itself is the tracked unit.
    pub number_of_matrices: u32,
    pub current_operator_id: Option<String>,
    pub status: UnitStatus,
    pub current_stop_reason_id: Option<String>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Machine {
    pub fn tracks_matrices(&self) -> bool {
        self.number_of_matrices > 0
    }
}

/// Where a matrix record came from. Synthesized placeholders exist only
/// locally, for machines the directory has not yet attached matrix rows to,
/// and are replaced wholesale once authoritative rows arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixProvenance {
    Authoritative,
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub id: String,
    pub machine_id: String,
    pub matrix_number: u32,
    pub status: UnitStatus,
    pub current_stop_reason_id: Option<String>,
    pub last_status_change_at: Option<DateTime<Utc>>,
    pub provenance: MatrixProvenance,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopReason {
    pub id: String,
    pub company_id: String,
    pub name: String,
    pub category: Option<String>,
    /// Excluded from ranked Pareto output; still listed with its absolute
    /// duration in raw reports.
    pub ignore_in_pareto: bool,
    pub is_system_reason: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionSession {
    pub id: String,
    pub machine_id: String,
    pub operator_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductionSession {
    /// Elapsed working time. Always derived from `started_at`, never from a
    /// stored counter, so a logout/login gap cannot drift it.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end = match (self.active, self.ended_at) {
            (false, Some(ended)) => ended,
            _ => now,
        };
        end.signed_duration_since(self.started_at)
    }
}

/// A single completed production cycle. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub machine_id: String,
    pub matrix_id: Option<String>,
    pub operator_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// A stop attributed to a reason, as consumed by the window aggregator.
/// An open interval (`ended_at = None`) is truncated at the window end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopInterval {
    pub unit: UnitRef,
    pub reason_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
