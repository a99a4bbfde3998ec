//! In-memory gateway with real mutation semantics, so the engine's
//! validate -> intent -> refetch loop can be exercised end to end.

use std::collections::HashSet;
use std::sync::Mutex;

use andon_core::{AndonError, Gateway, Result};
use andon_gateway_protocol::{
    BatchOutcome, CycleIntent, EmergencyStopIntent, EndSessionIntent, ErrorInfo, MachineRow,
    MatrixRow, NewStopReason, SessionRow, SessionStartIntent, StatusChangeIntent, StopReasonRow,
    UnitFailure, UnitTarget,
};

#[derive(Default)]
struct State {
    machines: Vec<MachineRow>,
    reasons: Vec<StopReasonRow>,
    sessions: Vec<SessionRow>,
    next_session: u32,
    next_reason: u32,
    get_or_create_calls: u32,
    /// Machine ids whose units fail inside batched stops.
    fail_units: HashSet<String>,
    cycles: Vec<CycleIntent>,
}

#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_machine(&self, row: MachineRow) {
        self.state.lock().unwrap().machines.push(row);
    }

    pub fn add_reason(&self, row: StopReasonRow) {
        self.state.lock().unwrap().reasons.push(row);
    }

    pub fn add_session(&self, row: SessionRow) {
        self.state.lock().unwrap().sessions.push(row);
    }

    pub fn fail_units_of(&self, machine_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_units
            .insert(machine_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().fail_units.clear();
    }

    pub fn get_or_create_calls(&self) -> u32 {
        self.state.lock().unwrap().get_or_create_calls
    }

    pub fn reason_count_named(&self, name: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .reasons
            .iter()
            .filter(|r| r.name.eq_ignore_ascii_case(name))
            .count()
    }

    pub fn submitted_cycles(&self) -> usize {
        self.state.lock().unwrap().cycles.len()
    }
}

/// Ensures a machine's matrix rows exist server-side, the way the real
/// directory attaches them once the machine is first touched.
fn materialize_matrices(machine: &mut MachineRow) {
    if machine.number_of_matrices > 0 && machine.matrices.is_empty() {
        machine.matrices = (1..=machine.number_of_matrices)
            .map(|n| MatrixRow {
                id: format!("MX-{}-{}", machine.id, n),
                machine_id: machine.id.clone(),
                matrix_number: n,
                status: "STOPPED".to_string(),
                ..Default::default()
            })
            .collect();
    }
}

fn apply_stop(state: &mut State, unit: &UnitTarget, status: &str, reason_id: Option<&str>) -> bool {
    let machine = match state.machines.iter_mut().find(|m| m.id == unit.machine_id) {
        Some(machine) => machine,
        None => return false,
    };
    materialize_matrices(machine);

    match unit.matrix_number {
        None => {
            machine.status = status.to_string();
            machine.current_stop_reason_id = reason_id.map(String::from);
            true
        }
        Some(n) => match machine.matrices.iter_mut().find(|mx| mx.matrix_number == n) {
            Some(matrix) => {
                matrix.status = status.to_string();
                matrix.current_stop_reason_id = reason_id.map(String::from);
                true
            }
            None => false,
        },
    }
}

fn batch_apply(
    state: &mut State,
    units: &[UnitTarget],
    status: &str,
    reason_id: &str,
) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for unit in units {
        let failed = state.fail_units.contains(&unit.machine_id)
            || !apply_stop(state, unit, status, Some(reason_id));
        if failed {
            outcome.failed.push(UnitFailure {
                unit: unit.clone(),
                error: ErrorInfo::new("unknown_unit", "simulated unit failure"),
            });
        } else {
            outcome.succeeded.push(unit.clone());
        }
    }
    outcome
}

impl Gateway for InMemoryGateway {
    fn fetch_machines(&self, company_id: &str) -> Result<Vec<MachineRow>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .machines
            .iter()
            .filter(|m| m.company_id == company_id)
            .cloned()
            .collect())
    }

    fn fetch_machines_for_operator(&self, operator_id: &str) -> Result<Vec<MachineRow>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .machines
            .iter()
            .filter(|m| m.current_operator_id.as_deref() == Some(operator_id))
            .cloned()
            .collect())
    }

    fn fetch_stop_reasons(&self, company_id: &str) -> Result<Vec<StopReasonRow>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .reasons
            .iter()
            .filter(|r| r.company_id == company_id)
            .cloned()
            .collect())
    }

    fn create_stop_reason(&self, reason: &NewStopReason) -> Result<StopReasonRow> {
        let mut state = self.state.lock().unwrap();
        state.next_reason += 1;
        let row = StopReasonRow {
            id: format!("r-{}", state.next_reason),
            company_id: reason.company_id.clone(),
            name: reason.name.clone(),
            category: reason.category.clone(),
            ignore_in_pareto: reason.ignore_in_pareto,
            ..Default::default()
        };
        state.reasons.push(row.clone());
        Ok(row)
    }

    fn update_stop_reason(&self, reason: &StopReasonRow) -> Result<StopReasonRow> {
        let mut state = self.state.lock().unwrap();
        match state.reasons.iter_mut().find(|r| r.id == reason.id) {
            Some(existing) => {
                *existing = reason.clone();
                Ok(reason.clone())
            }
            None => Err(AndonError::Gateway {
                code: "unknown_reason".to_string(),
                message: reason.id.clone(),
            }),
        }
    }

    fn delete_stop_reason(&self, _company_id: &str, reason_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .reasons
            .retain(|r| r.id != reason_id);
        Ok(())
    }

    fn get_or_create_stop_reason(&self, company_id: &str, name: &str) -> Result<StopReasonRow> {
        let mut state = self.state.lock().unwrap();
        state.get_or_create_calls += 1;
        if let Some(existing) = state
            .reasons
            .iter()
            .find(|r| r.company_id == company_id && r.name.trim().eq_ignore_ascii_case(name.trim()))
        {
            return Ok(existing.clone());
        }
        state.next_reason += 1;
        let row = StopReasonRow {
            id: format!("r-sys-{}", state.next_reason),
            company_id: company_id.to_string(),
            name: name.to_string(),
            is_system_reason: true,
            ..Default::default()
        };
        state.reasons.push(row.clone());
        Ok(row)
    }

    fn fetch_sessions(&self, company_id: &str) -> Result<Vec<SessionRow>> {
        let state = self.state.lock().unwrap();
        let company_machines: HashSet<&str> = state
            .machines
            .iter()
            .filter(|m| m.company_id == company_id)
            .map(|m| m.id.as_str())
            .collect();
        Ok(state
            .sessions
            .iter()
            .filter(|s| company_machines.contains(s.machine_id.as_str()))
            .cloned()
            .collect())
    }

    fn start_session(&self, intent: &SessionStartIntent) -> Result<SessionRow> {
        let mut state = self.state.lock().unwrap();
        let conflict = state
            .sessions
            .iter()
            .any(|s| s.active && s.machine_id == intent.machine_id && s.operator_id == intent.operator_id);
        if conflict {
            return Err(AndonError::SessionConflict {
                machine_id: intent.machine_id.clone(),
                operator_id: intent.operator_id.clone(),
            });
        }
        state.next_session += 1;
        let row = SessionRow {
            id: format!("s-{}", state.next_session),
            machine_id: intent.machine_id.clone(),
            operator_id: intent.operator_id.clone(),
            started_at: intent.recorded_at.clone(),
            active: true,
            ..Default::default()
        };
        state.sessions.push(row.clone());
        if let Some(machine) = state
            .machines
            .iter_mut()
            .find(|m| m.id == intent.machine_id)
        {
            machine.current_operator_id = Some(intent.operator_id.clone());
        }
        Ok(row)
    }

    fn end_session(&self, intent: &EndSessionIntent) -> Result<BatchOutcome> {
        let mut state = self.state.lock().unwrap();
        let active = state
            .sessions
            .iter()
            .any(|s| s.id == intent.session_id && s.active);
        if !active {
            return Err(AndonError::SessionNotFound {
                session_id: intent.session_id.clone(),
            });
        }

        let outcome = batch_apply(&mut *state, &intent.units, "STOPPED", &intent.reason_id);
        if outcome.is_complete() {
            if let Some(session) = state.sessions.iter_mut().find(|s| s.id == intent.session_id)
            {
                session.active = false;
                session.ended_at = Some(intent.recorded_at.clone());
            }
            for machine in &mut state.machines {
                if machine.current_operator_id.as_deref() == Some(intent.operator_id.as_str()) {
                    machine.current_operator_id = None;
                }
            }
        }
        Ok(outcome)
    }

    fn session_started_at(&self, machine_id: &str, operator_id: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.active && s.machine_id == machine_id && s.operator_id == operator_id)
            .map(|s| s.started_at.clone()))
    }

    fn submit_status_change(&self, intent: &StatusChangeIntent) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let reason_id = intent.reason_id.as_deref();
        let applied = match intent.target_status.as_str() {
            "RUNNING" => apply_stop(&mut *state, &intent.unit, "RUNNING", None),
            other => apply_stop(&mut *state, &intent.unit, other, reason_id),
        };
        if applied {
            Ok(())
        } else {
            Err(AndonError::Gateway {
                code: "unknown_unit".to_string(),
                message: intent.unit.machine_id.clone(),
            })
        }
    }

    fn submit_emergency_stop(&self, intent: &EmergencyStopIntent) -> Result<BatchOutcome> {
        let mut state = self.state.lock().unwrap();
        Ok(batch_apply(
            &mut state,
            &intent.units,
            "EMERGENCY_STOPPED",
            &intent.reason_id,
        ))
    }

    fn submit_cycle(&self, intent: &CycleIntent) -> Result<()> {
        self.state.lock().unwrap().cycles.push(intent.clone());
        Ok(())
    }
}

pub fn machine_row(id: &str, number_of_matrices: u32, operator: Option<&str>) -> MachineRow {
    MachineRow {
        id: id.to_string(),
        name: id.to_string(),
        company_id: "co-1".to_string(),
        number_of_matrices,
        current_operator_id: operator.map(String::from),
        status: "STOPPED".to_string(),
        ..Default::default()
    }
}

pub fn reason_row(id: &str, name: &str) -> StopReasonRow {
    StopReasonRow {
        id: id.to_string(),
        company_id: "co-1".to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}
