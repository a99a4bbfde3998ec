//! Replace-on-refresh in-memory view of the floor.
//!
//! The gateway is the single writer of truth; this snapshot is a cache and
//! is fully replaced on every refresh. There is deliberately no field-level
//! merge of stale and fresh data: a record either comes from the latest
//! fetch or it does not exist here.
//!
//! # Placeholder matrices
//!
//! Machines created before matrix rows existed server-side arrive with
//! `number_of_matrices > 0` but no matrix collection. For those, the
//! snapshot synthesizes local placeholders (`<machineId>-mat<N>`, stopped,
//! tagged `Synthesized`) so status tracking has units to address. The next
//! refresh that carries authoritative rows replaces the placeholders
//! wholesale.

use std::collections::HashMap;

use andon_gateway_protocol::{MachineRow, MatrixRow, SessionRow, StopReasonRow};
use chrono::{DateTime, Utc};

use crate::reasons::ReasonRegistry;
use crate::types::{
    Machine, Matrix, MatrixProvenance, ProductionSession, StopReason, UnitRef, UnitStatus,
};

#[derive(Debug, Default)]
pub struct FloorSnapshot {
    machines: HashMap<String, Machine>,
    /// Keyed by machine id; each list sorted by `matrix_number`.
    matrices: HashMap<String, Vec<Matrix>>,
    sessions: HashMap<String, ProductionSession>,
    reasons: ReasonRegistry,
    refreshed_at: Option<DateTime<Utc>>,
}

impl FloorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ingest (full replacement)
    // ─────────────────────────────────────────────────────────────────────

    pub fn replace_machines(&mut self, rows: Vec<MachineRow>) {
        let mut machines = HashMap::with_capacity(rows.len());
        let mut matrices = HashMap::with_capacity(rows.len());

        for row in rows {
            let (machine, mut machine_matrices) = machine_from_row(row);
            if machine.tracks_matrices() && machine_matrices.is_empty() {
                tracing::debug!(
                    machine_id = %machine.id,
                    count = machine.number_of_matrices,
                    "synthesizing placeholder matrices"
                );
                machine_matrices = synthesize_matrices(&machine);
            }
            machine_matrices.sort_by_key(|m| m.matrix_number);
            matrices.insert(machine.id.clone(), machine_matrices);
            machines.insert(machine.id.clone(), machine);
        }

        self.machines = machines;
        self.matrices = matrices;
        self.refreshed_at = Some(Utc::now());
    }

    pub fn replace_sessions(&mut self, rows: Vec<SessionRow>) {
        self.sessions = rows
            .into_iter()
            .filter_map(session_from_row)
            .map(|s| (s.id.clone(), s))
            .collect();
    }

    pub fn replace_reasons(&mut self, rows: Vec<StopReasonRow>) {
        self.reasons
            .replace_all(rows.into_iter().map(reason_from_row).collect());
    }

    /// Makes a single reason visible without a full refresh (used right
    /// after a get-or-create round-trip).
    pub fn insert_reason(&mut self, reason: StopReason) {
        self.reasons.upsert(reason);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Machine / unit lookups
    // ─────────────────────────────────────────────────────────────────────

    pub fn machine(&self, machine_id: &str) -> Option<&Machine> {
        self.machines.get(machine_id)
    }

    /// All machines, sorted by name for stable presentation.
    pub fn machines(&self) -> Vec<&Machine> {
        let mut machines: Vec<&Machine> = self.machines.values().collect();
        machines.sort_by(|a, b| a.name.cmp(&b.name));
        machines
    }

    pub fn matrices_for(&self, machine_id: &str) -> &[Matrix] {
        self.matrices
            .get(machine_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Current status and stop reason of one unit, if it is tracked.
    pub fn unit_state(&self, unit: &UnitRef) -> Option<(UnitStatus, Option<&str>)> {
        match unit {
            UnitRef::Machine { machine_id } => {
                let machine = self.machines.get(machine_id)?;
                if machine.tracks_matrices() {
                    return None;
                }
                Some((machine.status, machine.current_stop_reason_id.as_deref()))
            }
            UnitRef::Matrix {
                machine_id,
                matrix_number,
            } => {
                let matrix = self
                    .matrices_for(machine_id)
                    .iter()
                    .find(|m| m.matrix_number == *matrix_number)?;
                Some((matrix.status, matrix.current_stop_reason_id.as_deref()))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lookups
    // ─────────────────────────────────────────────────────────────────────

    pub fn session(&self, session_id: &str) -> Option<&ProductionSession> {
        self.sessions.get(session_id)
    }

    pub fn active_session_for(
        &self,
        machine_id: &str,
        operator_id: &str,
    ) -> Option<&ProductionSession> {
        self.sessions
            .values()
            .find(|s| s.active && s.machine_id == machine_id && s.operator_id == operator_id)
    }

    pub fn has_active_session(&self, machine_id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.active && s.machine_id == machine_id)
    }

    pub fn active_sessions_for_operator(&self, operator_id: &str) -> Vec<&ProductionSession> {
        self.sessions
            .values()
            .filter(|s| s.active && s.operator_id == operator_id)
            .collect()
    }

    /// Machines currently held by an operator: an open session on the
    /// machine, or the directory's `current_operator_id` field.
    pub fn machines_for_operator(&self, operator_id: &str) -> Vec<&Machine> {
        let mut held: Vec<&Machine> = self
            .machines
            .values()
            .filter(|m| {
                m.current_operator_id.as_deref() == Some(operator_id)
                    || self.active_session_for(&m.id, operator_id).is_some()
            })
            .collect();
        held.sort_by(|a, b| a.name.cmp(&b.name));
        held
    }

    /// Every trackable unit under an operator's machines: all matrices where
    /// the machine has them, the machine itself where it does not.
    pub fn units_for_operator(&self, operator_id: &str) -> Vec<UnitRef> {
        let mut units = Vec::new();
        for machine in self.machines_for_operator(operator_id) {
            if machine.tracks_matrices() {
                for matrix in self.matrices_for(&machine.id) {
                    units.push(UnitRef::matrix(machine.id.clone(), matrix.matrix_number));
                }
            } else {
                units.push(UnitRef::machine(machine.id.clone()));
            }
        }
        units
    }

    pub fn reasons(&self) -> &ReasonRegistry {
        &self.reasons
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row conversion
// ─────────────────────────────────────────────────────────────────────────────

fn parse_wire_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = value?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(err) => {
            tracing::warn!(value = raw, error = %err, "discarding unparseable wire timestamp");
            None
        }
    }
}

/// Entity timestamps, with `updated_at` clamped to never precede
/// `created_at`. Missing values fall back to receive time.
fn entity_times(created: Option<&str>, updated: Option<&str>) -> (DateTime<Utc>, DateTime<Utc>) {
    let created_at = parse_wire_time(created).unwrap_or_else(Utc::now);
    let updated_at = parse_wire_time(updated)
        .unwrap_or(created_at)
        .max(created_at);
    (created_at, updated_at)
}

fn status_from_wire(value: &str, context: &str) -> UnitStatus {
    if value.trim().is_empty() {
        return UnitStatus::default();
    }
    UnitStatus::from_wire(value).unwrap_or_else(|| {
        tracing::warn!(status = value, context, "unknown wire status, treating as STOPPED");
        UnitStatus::default()
    })
}

pub(crate) fn machine_from_row(row: MachineRow) -> (Machine, Vec<Matrix>) {
    let (created_at, updated_at) = entity_times(row.created_at.as_deref(), row.updated_at.as_deref());
    let machine = Machine {
        status: status_from_wire(&row.status, "machine"),
        last_status_change_at: parse_wire_time(row.last_status_change_at.as_deref()),
        id: row.id,
        name: row.name,
        company_id: row.company_id,
        group_id: row.group_id,
        number_of_matrices: row.number_of_matrices,
        current_operator_id: row.current_operator_id,
        current_stop_reason_id: row.current_stop_reason_id,
        created_at,
        updated_at,
    };
    let matrices = row.matrices.into_iter().map(matrix_from_row).collect();
    (machine, matrices)
}

fn matrix_from_row(row: MatrixRow) -> Matrix {
    let (created_at, updated_at) = entity_times(row.created_at.as_deref(), row.updated_at.as_deref());
    Matrix {
        status: status_from_wire(&row.status, "matrix"),
        last_status_change_at: parse_wire_time(row.last_status_change_at.as_deref()),
        id: row.id,
        machine_id: row.machine_id,
        matrix_number: row.matrix_number,
        current_stop_reason_id: row.current_stop_reason_id,
        provenance: MatrixProvenance::Authoritative,
        created_at,
        updated_at,
    }
}

fn synthesize_matrices(machine: &Machine) -> Vec<Matrix> {
    (1..=machine.number_of_matrices)
        .map(|n| Matrix {
            id: format!("{}-mat{}", machine.id, n),
            machine_id: machine.id.clone(),
            matrix_number: n,
            status: UnitStatus::Stopped,
            current_stop_reason_id: None,
            last_status_change_at: None,
            provenance: MatrixProvenance::Synthesized,
            created_at: machine.created_at,
            updated_at: machine.updated_at,
        })
        .collect()
}

pub(crate) fn session_from_row(row: SessionRow) -> Option<ProductionSession> {
    let started_at = match parse_wire_time(Some(&row.started_at)) {
        Some(dt) => dt,
        None => {
            tracing::warn!(session_id = %row.id, "dropping session row without a valid start time");
            return None;
        }
    };
    let (created_at, updated_at) = entity_times(row.created_at.as_deref(), row.updated_at.as_deref());
    Some(ProductionSession {
        id: row.id,
        machine_id: row.machine_id,
        operator_id: row.operator_id,
        started_at,
        ended_at: parse_wire_time(row.ended_at.as_deref()),
        active: row.active,
        created_at,
        updated_at,
    })
}

pub(crate) fn reason_from_row(row: StopReasonRow) -> StopReason {
    let (created_at, updated_at) = entity_times(row.created_at.as_deref(), row.updated_at.as_deref());
    StopReason {
        id: row.id,
        company_id: row.company_id,
        name: row.name,
        category: row.category,
        ignore_in_pareto: row.ignore_in_pareto,
        is_system_reason: row.is_system_reason,
        created_at,
        updated_at,
    }
}
