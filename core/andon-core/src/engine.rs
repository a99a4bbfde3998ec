//! AndonEngine - the main entry point for Andon clients.
//!
//! One engine per signed-in client. It owns the local floor snapshot and a
//! gateway handle, and follows one pattern for every mutation: validate
//! locally, issue the intent, then re-fetch the authoritative collections.
//! Nothing is updated optimistically, which is what makes caller-side
//! retries safe.

use std::sync::Arc;

use andon_gateway_protocol::{
    BatchOutcome, CycleIntent, EmergencyStopIntent, EndSessionIntent, NewStopReason,
    SessionStartIntent, StatusChangeIntent, StopReasonRow,
};
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::cycles::{self, CycleLog, WindowReport};
use crate::error::{AndonError, Result};
use crate::gateway::Gateway;
use crate::reasons::{ReasonRegistry, SHIFT_END_REASON_NAME};
use crate::sessions::{self, EndPolicy};
use crate::snapshot::{self, FloorSnapshot};
use crate::status;
use crate::types::{
    CycleRecord, Machine, ProductionSession, StopInterval, StopReason, UnitRef, UnitStatus,
};

pub struct AndonEngine {
    gateway: Arc<dyn Gateway>,
    company_id: String,
    snapshot: FloorSnapshot,
    cycles: CycleLog,
}

impl AndonEngine {
    /// Creates an engine with an empty snapshot. Call [`refresh`] before the
    /// first read.
    ///
    /// [`refresh`]: AndonEngine::refresh
    pub fn new(gateway: Arc<dyn Gateway>, company_id: impl Into<String>) -> Self {
        Self {
            gateway,
            company_id: company_id.into(),
            snapshot: FloorSnapshot::new(),
            cycles: CycleLog::new(),
        }
    }

    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    pub fn snapshot(&self) -> &FloorSnapshot {
        &self.snapshot
    }

    pub fn cycles(&self) -> &CycleLog {
        &self.cycles
    }

    /// Replaces the whole local view with the gateway's current truth.
    pub fn refresh(&mut self) -> Result<()> {
        let machines = self.gateway.fetch_machines(&self.company_id)?;
        let reasons = self.gateway.fetch_stop_reasons(&self.company_id)?;
        let sessions = self.gateway.fetch_sessions(&self.company_id)?;
        self.snapshot.replace_machines(machines);
        self.snapshot.replace_reasons(reasons);
        self.snapshot.replace_sessions(sessions);
        Ok(())
    }

    fn refresh_reasons(&mut self) -> Result<()> {
        let reasons = self.gateway.fetch_stop_reasons(&self.company_id)?;
        self.snapshot.replace_reasons(reasons);
        Ok(())
    }

    /// Directory fetch-mine: the machines assigned to one operator, straight
    /// from the gateway. Does not touch the snapshot; the full [`refresh`]
    /// stays the only replacement path.
    ///
    /// [`refresh`]: AndonEngine::refresh
    pub fn fetch_my_machines(&self, operator_id: &str) -> Result<Vec<Machine>> {
        let rows = self.gateway.fetch_machines_for_operator(operator_id)?;
        Ok(rows
            .into_iter()
            .map(|row| snapshot::machine_from_row(row).0)
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Status changes
    // ─────────────────────────────────────────────────────────────────────

    /// Requests a status change on one unit.
    ///
    /// Validation happens against the local snapshot before any intent is
    /// built; on success the snapshot is re-fetched, never patched.
    pub fn request_status_change(
        &mut self,
        unit: &UnitRef,
        target: UnitStatus,
        reason_id: Option<&str>,
        operator_id: &str,
    ) -> Result<()> {
        let machine = self.snapshot.machine(unit.machine_id()).ok_or_else(|| {
            AndonError::UnknownMachine {
                machine_id: unit.machine_id().to_string(),
            }
        })?;
        status::check_addressing(machine, unit)?;
        let (current, _) = self
            .snapshot
            .unit_state(unit)
            .ok_or_else(|| AndonError::UnitNotTracked { unit: unit.clone() })?;
        let has_session = self.snapshot.has_active_session(unit.machine_id());
        status::validate_transition(unit, current, target, reason_id, has_session)?;

        // The reason must come from the company's registry; an id the
        // registry does not know is as good as no reason at all.
        if target.is_stopped_kind() {
            let known = reason_id
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| self.snapshot.reasons().contains(r))
                .unwrap_or(false);
            if !known {
                return Err(AndonError::MissingReason { unit: unit.clone() });
            }
        }

        let intent = StatusChangeIntent {
            intent_id: new_intent_id(),
            recorded_at: Utc::now().to_rfc3339(),
            unit: unit.to_target(),
            target_status: target.as_str().to_string(),
            reason_id: reason_id.map(str::trim).filter(|r| !r.is_empty()).map(String::from),
            operator_id: operator_id.to_string(),
        };
        self.gateway.submit_status_change(&intent)?;
        self.refresh()
    }

    /// Stops every unit an operator controls with one batched intent.
    ///
    /// The reserved "Shift Ended" reason is never a valid emergency cause.
    pub fn declare_emergency(&mut self, operator_id: &str, reason_id: &str) -> Result<()> {
        let reason_id = reason_id.trim();
        if reason_id.is_empty() {
            return Err(AndonError::NoReasonSelected);
        }
        let reason = self
            .snapshot
            .reasons()
            .get(reason_id)
            .ok_or(AndonError::NoReasonSelected)?;
        if ReasonRegistry::is_shift_end(reason) {
            return Err(AndonError::NoReasonSelected);
        }

        let units = self.snapshot.units_for_operator(operator_id);
        if units.is_empty() {
            return Err(AndonError::NoMachinesAssigned {
                operator_id: operator_id.to_string(),
            });
        }

        let intent = EmergencyStopIntent {
            intent_id: new_intent_id(),
            recorded_at: Utc::now().to_rfc3339(),
            operator_id: operator_id.to_string(),
            reason_id: reason_id.to_string(),
            units: units.iter().map(UnitRef::to_target).collect(),
        };
        let outcome = self.gateway.submit_emergency_stop(&intent)?;
        self.refresh()?;
        require_complete(outcome)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    pub fn start_session(
        &mut self,
        machine_id: &str,
        operator_id: &str,
    ) -> Result<ProductionSession> {
        sessions::ensure_can_start(&self.snapshot, machine_id, operator_id)?;

        let intent = SessionStartIntent {
            intent_id: new_intent_id(),
            recorded_at: Utc::now().to_rfc3339(),
            machine_id: machine_id.to_string(),
            operator_id: operator_id.to_string(),
        };
        let row = self.gateway.start_session(&intent)?;
        let session_id = row.id.clone();
        self.refresh()?;
        match self.snapshot.session(&session_id) {
            Some(session) => Ok(session.clone()),
            // The refresh raced the directory; fall back to the row the
            // gateway returned for the start call itself.
            None => snapshot::session_from_row(row).ok_or(AndonError::SessionNotFound {
                session_id,
            }),
        }
    }

    /// Ends or suspends a session.
    ///
    /// `EndShift` stops every unit the operator holds with the reserved
    /// reason and closes the session, as one batch; if any unit fails the
    /// session is left open and the failed units are reported so the caller
    /// can retry. `KeepOpen` leaves everything untouched (plain logout).
    pub fn end_session(&mut self, session_id: &str, policy: EndPolicy) -> Result<()> {
        let session = sessions::find_active(&self.snapshot, session_id)?.clone();

        match policy {
            EndPolicy::KeepOpen => {
                tracing::debug!(session_id, "logout without ending shift; session stays active");
                Ok(())
            }
            EndPolicy::EndShift => {
                let reason = self.ensure_shift_end_reason()?;
                let units = self.snapshot.units_for_operator(&session.operator_id);

                let intent = EndSessionIntent {
                    intent_id: new_intent_id(),
                    recorded_at: Utc::now().to_rfc3339(),
                    session_id: session.id.clone(),
                    operator_id: session.operator_id.clone(),
                    reason_id: reason.id.clone(),
                    units: units.iter().map(UnitRef::to_target).collect(),
                };
                let outcome = self.gateway.end_session(&intent)?;
                self.refresh()?;
                require_complete(outcome)
            }
        }
    }

    /// Elapsed seconds of a session as of `now`, derived from its start time.
    pub fn session_elapsed_seconds(&self, session_id: &str, now: DateTime<Utc>) -> Result<i64> {
        let session = self
            .snapshot
            .session(session_id)
            .ok_or_else(|| AndonError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;
        Ok(sessions::elapsed_seconds(session, now))
    }

    /// Asks the gateway when the active session on a machine started, e.g.
    /// to show another operator's running shift.
    pub fn session_started_at(
        &self,
        machine_id: &str,
        operator_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let raw = self.gateway.session_started_at(machine_id, operator_id)?;
        Ok(raw.and_then(|value| {
            DateTime::parse_from_rfc3339(&value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|err| {
                    tracing::warn!(value, error = %err, "gateway returned unparseable session start");
                    err
                })
                .ok()
        }))
    }

    fn ensure_shift_end_reason(&mut self) -> Result<StopReason> {
        if let Some(reason) = self.snapshot.reasons().shift_end_reason() {
            return Ok(reason.clone());
        }
        let row = self
            .gateway
            .get_or_create_stop_reason(&self.company_id, SHIFT_END_REASON_NAME)?;
        let reason = snapshot::reason_from_row(row);
        self.snapshot.insert_reason(reason.clone());
        Ok(reason)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Cycles
    // ─────────────────────────────────────────────────────────────────────

    /// Records a completed cycle. Append-only: no status validation beyond
    /// the machine reference, and no snapshot refresh afterwards.
    pub fn record_cycle(
        &mut self,
        machine_id: &str,
        matrix_id: Option<&str>,
        operator_id: &str,
        recorded_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if self.snapshot.machine(machine_id).is_none() {
            return Err(AndonError::UnknownMachine {
                machine_id: machine_id.to_string(),
            });
        }
        let recorded_at = recorded_at.unwrap_or_else(Utc::now);

        let intent = CycleIntent {
            intent_id: new_intent_id(),
            recorded_at: recorded_at.to_rfc3339(),
            machine_id: machine_id.to_string(),
            matrix_id: matrix_id.map(String::from),
            operator_id: operator_id.to_string(),
        };
        self.gateway.submit_cycle(&intent)?;

        self.cycles.record(CycleRecord {
            machine_id: machine_id.to_string(),
            matrix_id: matrix_id.map(String::from),
            operator_id: operator_id.to_string(),
            recorded_at,
        });
        Ok(())
    }

    /// Window aggregation over caller-supplied records (audit exports,
    /// improvement-plan baselines).
    pub fn aggregate_window(
        &self,
        cycles: &[CycleRecord],
        stops: &[StopInterval],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WindowReport {
        cycles::aggregate_window(cycles, stops, self.snapshot.reasons(), start, end)
    }

    /// Window aggregation over this engine's own cycle log.
    pub fn aggregate_recorded_window(
        &self,
        stops: &[StopInterval],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WindowReport {
        self.aggregate_window(self.cycles.records(), stops, start, end)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stop-reason directory
    // ─────────────────────────────────────────────────────────────────────

    pub fn create_stop_reason(
        &mut self,
        name: &str,
        category: Option<&str>,
        ignore_in_pareto: bool,
    ) -> Result<StopReason> {
        let row = self.gateway.create_stop_reason(&NewStopReason {
            company_id: self.company_id.clone(),
            name: name.to_string(),
            category: category.map(String::from),
            ignore_in_pareto,
        })?;
        let reason = snapshot::reason_from_row(row);
        self.refresh_reasons()?;
        Ok(reason)
    }

    pub fn update_stop_reason(&mut self, reason: &StopReason) -> Result<StopReason> {
        let row = self.gateway.update_stop_reason(&StopReasonRow {
            id: reason.id.clone(),
            company_id: reason.company_id.clone(),
            name: reason.name.clone(),
            category: reason.category.clone(),
            ignore_in_pareto: reason.ignore_in_pareto,
            is_system_reason: reason.is_system_reason,
            created_at: Some(reason.created_at.to_rfc3339()),
            updated_at: Some(reason.updated_at.to_rfc3339()),
        })?;
        let updated = snapshot::reason_from_row(row);
        self.refresh_reasons()?;
        Ok(updated)
    }

    pub fn delete_stop_reason(&mut self, reason_id: &str) -> Result<()> {
        self.gateway.delete_stop_reason(&self.company_id, reason_id)?;
        self.refresh_reasons()
    }
}

fn new_intent_id() -> String {
    Ulid::new().to_string()
}

fn require_complete(outcome: BatchOutcome) -> Result<()> {
    if outcome.is_complete() {
        return Ok(());
    }
    Err(AndonError::PartialBatchFailure {
        failed: outcome
            .failed
            .iter()
            .map(|f| UnitRef::from_target(&f.unit))
            .collect(),
    })
}
