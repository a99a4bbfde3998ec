//! Wire contract types for the Andon floor gateway.
//!
//! This crate is shared by the gateway and its clients to prevent schema
//! drift. The gateway remains the authority on validation, but clients can
//! reuse the same types to construct valid requests.
//!
//! Timestamps on the wire are RFC3339 strings; clients parse them into their
//! own time types on ingest.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024; // 1MB

/// Gateway error codes a client is expected to recognize.
pub mod codes {
    pub const SESSION_CONFLICT: &str = "session_conflict";
    pub const SESSION_NOT_FOUND: &str = "session_not_found";
    pub const UNKNOWN_MACHINE: &str = "unknown_machine";
    pub const UNKNOWN_UNIT: &str = "unknown_unit";
    pub const UNKNOWN_REASON: &str = "unknown_reason";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const INTERNAL: &str = "internal_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetMachines,
    GetMachinesForOperator,
    GetStopReasons,
    CreateStopReason,
    UpdateStopReason,
    DeleteStopReason,
    GetOrCreateStopReason,
    GetSessions,
    GetSessionStart,
    StartSession,
    EndSession,
    SubmitStatusChange,
    SubmitEmergencyStop,
    SubmitCycle,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory rows
// ─────────────────────────────────────────────────────────────────────────────

/// A machine as returned by the machine/matrix directory.
///
/// `matrices` may be empty for machines created before matrix rows existed
/// server-side; clients are expected to synthesize placeholders locally.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MachineRow {
    pub id: String,
    pub name: String,
    pub company_id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub number_of_matrices: u32,
    #[serde(default)]
    pub current_operator_id: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_stop_reason_id: Option<String>,
    #[serde(default)]
    pub last_status_change_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub matrices: Vec<MatrixRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MatrixRow {
    pub id: String,
    pub machine_id: String,
    pub matrix_number: u32,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub current_stop_reason_id: Option<String>,
    #[serde(default)]
    pub last_status_change_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StopReasonRow {
    pub id: String,
    pub company_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub ignore_in_pareto: bool,
    #[serde(default)]
    pub is_system_reason: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Payload for creating a stop reason through the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStopReason {
    pub company_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub ignore_in_pareto: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionRow {
    pub id: String,
    pub machine_id: String,
    pub operator_id: String,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Mutation intents
// ─────────────────────────────────────────────────────────────────────────────

/// Wire form of a unit reference: the machine itself when `matrix_number`
/// is absent, one specific matrix otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTarget {
    pub machine_id: String,
    #[serde(default)]
    pub matrix_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusChangeIntent {
    pub intent_id: String,
    pub recorded_at: String,
    pub unit: UnitTarget,
    pub target_status: String,
    #[serde(default)]
    pub reason_id: Option<String>,
    pub operator_id: String,
}

/// Emergency stop across every unit an operator controls, as one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmergencyStopIntent {
    pub intent_id: String,
    pub recorded_at: String,
    pub operator_id: String,
    pub reason_id: String,
    pub units: Vec<UnitTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionStartIntent {
    pub intent_id: String,
    pub recorded_at: String,
    pub machine_id: String,
    pub operator_id: String,
}

/// Shift-end: close the session and stop every listed unit with the reserved
/// reason, as one batch. Logout-without-end never reaches the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndSessionIntent {
    pub intent_id: String,
    pub recorded_at: String,
    pub session_id: String,
    pub operator_id: String,
    pub reason_id: String,
    pub units: Vec<UnitTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CycleIntent {
    pub intent_id: String,
    pub recorded_at: String,
    pub machine_id: String,
    #[serde(default)]
    pub matrix_id: Option<String>,
    pub operator_id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch outcomes
// ─────────────────────────────────────────────────────────────────────────────

/// Per-unit result of a batched mutation (emergency stop, shift-end cascade).
///
/// The gateway reports every member; a batch with any entry in `failed` is
/// not a success even though the response envelope is `ok`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchOutcome {
    #[serde(default)]
    pub succeeded: Vec<UnitTarget>,
    #[serde(default)]
    pub failed: Vec<UnitFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: UnitTarget,
    pub error: ErrorInfo,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

impl StatusChangeIntent {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_intent_header(&self.intent_id, &self.recorded_at)?;
        require_nonempty(&self.unit.machine_id, "unit.machine_id")?;
        require_nonempty(&self.target_status, "target_status")?;
        require_nonempty(&self.operator_id, "operator_id")?;
        if let Some(0) = self.unit.matrix_number {
            return Err(ErrorInfo::new(
                codes::INVALID_PARAMS,
                "matrix_number must be 1 or greater",
            ));
        }
        Ok(())
    }
}

impl EmergencyStopIntent {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_intent_header(&self.intent_id, &self.recorded_at)?;
        require_nonempty(&self.operator_id, "operator_id")?;
        require_nonempty(&self.reason_id, "reason_id")?;
        require_units(&self.units)?;
        Ok(())
    }
}

impl SessionStartIntent {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_intent_header(&self.intent_id, &self.recorded_at)?;
        require_nonempty(&self.machine_id, "machine_id")?;
        require_nonempty(&self.operator_id, "operator_id")?;
        Ok(())
    }
}

impl EndSessionIntent {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_intent_header(&self.intent_id, &self.recorded_at)?;
        require_nonempty(&self.session_id, "session_id")?;
        require_nonempty(&self.operator_id, "operator_id")?;
        require_nonempty(&self.reason_id, "reason_id")?;
        require_units(&self.units)?;
        Ok(())
    }
}

impl CycleIntent {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_intent_header(&self.intent_id, &self.recorded_at)?;
        require_nonempty(&self.machine_id, "machine_id")?;
        require_nonempty(&self.operator_id, "operator_id")?;
        Ok(())
    }
}

fn require_intent_header(intent_id: &str, recorded_at: &str) -> Result<(), ErrorInfo> {
    if intent_id.trim().is_empty() {
        return Err(ErrorInfo::new(codes::INVALID_PARAMS, "intent_id is required"));
    }
    if intent_id.len() > 128 {
        return Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            "intent_id must be 128 characters or fewer",
        ));
    }
    if DateTime::parse_from_rfc3339(recorded_at).is_err() {
        return Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            "recorded_at must be RFC3339",
        ));
    }
    Ok(())
}

fn require_nonempty(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            format!("{} is required", field),
        ));
    }
    Ok(())
}

fn require_units(units: &[UnitTarget]) -> Result<(), ErrorInfo> {
    if units.is_empty() {
        return Err(ErrorInfo::new(
            codes::INVALID_PARAMS,
            "units must not be empty",
        ));
    }
    for unit in units {
        require_nonempty(&unit.machine_id, "units[].machine_id")?;
        if let Some(0) = unit.matrix_number {
            return Err(ErrorInfo::new(
                codes::INVALID_PARAMS,
                "units[].matrix_number must be 1 or greater",
            ));
        }
    }
    Ok(())
}
