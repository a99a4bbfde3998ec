//! Gateway seam to the system of record.
//!
//! The core never writes truth; it issues intents through this trait and
//! re-reads the authoritative collections afterwards. Every call is a
//! blocking round-trip that can fail or time out, and none of them is
//! assumed atomic with the local view update.

use andon_gateway_protocol::{
    BatchOutcome, CycleIntent, EmergencyStopIntent, EndSessionIntent, MachineRow, NewStopReason,
    SessionRow, SessionStartIntent, StatusChangeIntent, StopReasonRow,
};

use crate::error::Result;

/// The four collaborator capability groups behind one seam.
///
/// Implementors should surface transport problems as
/// [`crate::AndonError::RemoteUnavailable`] and gateway rejections as
/// [`crate::AndonError::Gateway`] (or the specific session errors where the
/// code is recognized).
pub trait Gateway: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────
    // Machine/matrix directory
    // ─────────────────────────────────────────────────────────────────────

    fn fetch_machines(&self, company_id: &str) -> Result<Vec<MachineRow>>;

    fn fetch_machines_for_operator(&self, operator_id: &str) -> Result<Vec<MachineRow>>;

    // ─────────────────────────────────────────────────────────────────────
    // Stop-reason directory
    // ─────────────────────────────────────────────────────────────────────

    fn fetch_stop_reasons(&self, company_id: &str) -> Result<Vec<StopReasonRow>>;

    fn create_stop_reason(&self, reason: &NewStopReason) -> Result<StopReasonRow>;

    fn update_stop_reason(&self, reason: &StopReasonRow) -> Result<StopReasonRow>;

    fn delete_stop_reason(&self, company_id: &str, reason_id: &str) -> Result<()>;

    /// Idempotent lookup-or-create by name, scoped to a company. Used for
    /// the reserved "Shift Ended" reason.
    fn get_or_create_stop_reason(&self, company_id: &str, name: &str) -> Result<StopReasonRow>;

    // ─────────────────────────────────────────────────────────────────────
    // Session directory
    // ─────────────────────────────────────────────────────────────────────

    fn fetch_sessions(&self, company_id: &str) -> Result<Vec<SessionRow>>;

    fn start_session(&self, intent: &SessionStartIntent) -> Result<SessionRow>;

    /// Shift-end: close the session and stop every listed unit, as one
    /// batch. The outcome reports every member.
    fn end_session(&self, intent: &EndSessionIntent) -> Result<BatchOutcome>;

    /// Start time of the active session on a machine for an operator, if
    /// the gateway knows one (RFC3339).
    fn session_started_at(&self, machine_id: &str, operator_id: &str) -> Result<Option<String>>;

    // ─────────────────────────────────────────────────────────────────────
    // Cycle/status mutation sink
    // ─────────────────────────────────────────────────────────────────────

    fn submit_status_change(&self, intent: &StatusChangeIntent) -> Result<()>;

    fn submit_emergency_stop(&self, intent: &EmergencyStopIntent) -> Result<BatchOutcome>;

    fn submit_cycle(&self, intent: &CycleIntent) -> Result<()>;
}
