//! Cycle recording and time-window aggregation.
//!
//! Cycles are append-only; the log also keeps live per-unit counters for
//! dashboards. The window aggregation feeds audits and the before/after
//! comparisons of improvement plans.
//!
//! # Percentage convention
//!
//! Ranked percentages are computed over the sum of durations of reasons NOT
//! flagged `ignore_in_pareto`. Ignored reasons keep their absolute duration
//! in the raw listing but never shrink the other reasons' share.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reasons::ReasonRegistry;
use crate::types::{CycleRecord, StopInterval};

/// Append-only cycle log with live counters.
#[derive(Debug, Default)]
pub struct CycleLog {
    records: Vec<CycleRecord>,
    counters: HashMap<(String, Option<String>), u64>,
}

impl CycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: CycleRecord) {
        let key = (record.machine_id.clone(), record.matrix_id.clone());
        *self.counters.entry(key).or_insert(0) += 1;
        self.records.push(record);
    }

    pub fn records(&self) -> &[CycleRecord] {
        &self.records
    }

    /// Live counter for one unit. `matrix_id = None` addresses the machine
    /// counter of a matrix-less machine.
    pub fn count(&self, machine_id: &str, matrix_id: Option<&str>) -> u64 {
        self.counters
            .get(&(machine_id.to_string(), matrix_id.map(str::to_string)))
            .copied()
            .unwrap_or(0)
    }

    /// Total across all units of one machine.
    pub fn machine_count(&self, machine_id: &str) -> u64 {
        self.counters
            .iter()
            .filter(|((m, _), _)| m == machine_id)
            .map(|(_, count)| count)
            .sum()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Window aggregation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonUsage {
    pub reason_id: String,
    pub name: String,
    pub seconds: i64,
    pub ignore_in_pareto: bool,
    /// Share of non-ignored stop time; `None` in raw listings and for
    /// ignored reasons.
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total_cycles: u64,
    pub running_seconds: i64,
    pub stopped_seconds: i64,
    /// Every reason observed in the window with its absolute duration,
    /// ignored ones included. Sorted by duration, largest first.
    pub reasons: Vec<ReasonUsage>,
    /// Pareto ranking: non-ignored reasons with percentages. Sorted by
    /// duration, largest first.
    pub ranked: Vec<ReasonUsage>,
}

/// Aggregates one unit timeline over the closed window `[start, end]`.
///
/// Stop intervals are clamped to the window on both sides; an interval
/// still open at `end` is truncated there. Running time is the remainder
/// of the window not attributed to any stop.
pub fn aggregate_window(
    cycles: &[CycleRecord],
    stops: &[StopInterval],
    registry: &ReasonRegistry,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> WindowReport {
    let total_cycles = cycles
        .iter()
        .filter(|c| c.recorded_at >= start && c.recorded_at <= end)
        .count() as u64;

    let mut seconds_by_reason: HashMap<&str, i64> = HashMap::new();
    for stop in stops {
        let from = stop.started_at.max(start);
        let to = stop.ended_at.unwrap_or(end).min(end);
        let seconds = to.signed_duration_since(from).num_seconds();
        if seconds > 0 {
            *seconds_by_reason.entry(stop.reason_id.as_str()).or_insert(0) += seconds;
        }
    }

    let stopped_seconds: i64 = seconds_by_reason.values().sum();
    let window_seconds = end.signed_duration_since(start).num_seconds();
    let running_seconds = (window_seconds - stopped_seconds).max(0);

    let mut reasons: Vec<ReasonUsage> = seconds_by_reason
        .iter()
        .map(|(reason_id, seconds)| {
            let known = registry.get(reason_id);
            ReasonUsage {
                reason_id: reason_id.to_string(),
                name: known
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| reason_id.to_string()),
                seconds: *seconds,
                ignore_in_pareto: known.map(|r| r.ignore_in_pareto).unwrap_or(false),
                percent: None,
            }
        })
        .collect();
    reasons.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.reason_id.cmp(&b.reason_id)));

    let denominator: i64 = reasons
        .iter()
        .filter(|r| !r.ignore_in_pareto)
        .map(|r| r.seconds)
        .sum();

    let ranked: Vec<ReasonUsage> = reasons
        .iter()
        .filter(|r| !r.ignore_in_pareto)
        .map(|r| ReasonUsage {
            percent: Some(percent_of(r.seconds, denominator)),
            ..r.clone()
        })
        .collect();

    WindowReport {
        window_start: start,
        window_end: end,
        total_cycles,
        running_seconds,
        stopped_seconds,
        reasons,
        ranked,
    }
}

/// Share rounded to one decimal place, e.g. 43200/64800 -> 66.7.
fn percent_of(seconds: i64, denominator: i64) -> f64 {
    if denominator <= 0 {
        return 0.0;
    }
    (seconds as f64 / denominator as f64 * 1000.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StopReason, UnitRef};
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn reason(id: &str, name: &str, ignore_in_pareto: bool) -> StopReason {
        let now = Utc::now();
        StopReason {
            id: id.to_string(),
            company_id: "co-1".to_string(),
            name: name.to_string(),
            category: None,
            ignore_in_pareto,
            is_system_reason: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn registry() -> ReasonRegistry {
        let mut registry = ReasonRegistry::new();
        registry.replace_all(vec![
            reason("r-mat", "Falta de Material", false),
            reason("r-tool", "Quebra de Ferramenta", false),
            reason("r-maint", "Manutenção Programada", true),
        ]);
        registry
    }

    fn stop(reason_id: &str, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> StopInterval {
        StopInterval {
            unit: UnitRef::machine("mach-1"),
            reason_id: reason_id.to_string(),
            started_at: from,
            ended_at: to,
        }
    }

    fn cycle(at: DateTime<Utc>) -> CycleRecord {
        CycleRecord {
            machine_id: "mach-1".to_string(),
            matrix_id: None,
            operator_id: "op-1".to_string(),
            recorded_at: at,
        }
    }

    #[test]
    fn test_cycle_log_counters() {
        let mut log = CycleLog::new();
        log.record(cycle(at(2024, 1, 2, 8)));
        log.record(cycle(at(2024, 1, 2, 9)));
        let mut matrix_cycle = cycle(at(2024, 1, 2, 10));
        matrix_cycle.matrix_id = Some("mx-1".to_string());
        log.record(matrix_cycle);

        assert_eq!(log.count("mach-1", None), 2);
        assert_eq!(log.count("mach-1", Some("mx-1")), 1);
        assert_eq!(log.machine_count("mach-1"), 3);
        assert_eq!(log.count("mach-2", None), 0);
    }

    #[test]
    fn test_january_baseline_percentages() {
        // 12h of material shortage, 6h of tool breakage.
        let start = at(2024, 1, 1, 0);
        let end = at(2024, 1, 31, 0);
        let stops = vec![
            stop("r-mat", at(2024, 1, 3, 0), Some(at(2024, 1, 3, 12))),
            stop("r-tool", at(2024, 1, 5, 0), Some(at(2024, 1, 5, 6))),
        ];

        let report = aggregate_window(&[], &stops, &registry(), start, end);
        assert_eq!(report.stopped_seconds, 43_200 + 21_600);

        assert_eq!(report.ranked.len(), 2);
        assert_eq!(report.ranked[0].reason_id, "r-mat");
        assert_eq!(report.ranked[0].percent, Some(66.7));
        assert_eq!(report.ranked[1].reason_id, "r-tool");
        assert_eq!(report.ranked[1].percent, Some(33.3));
    }

    #[test]
    fn test_ignored_reason_absent_from_ranking_present_in_raw() {
        let start = at(2024, 1, 1, 0);
        let end = at(2024, 1, 31, 0);
        let stops = vec![
            stop("r-mat", at(2024, 1, 3, 0), Some(at(2024, 1, 3, 12))),
            stop("r-tool", at(2024, 1, 5, 0), Some(at(2024, 1, 5, 6))),
            // Scheduled maintenance is flagged ignore_in_pareto.
            stop("r-maint", at(2024, 1, 7, 0), Some(at(2024, 1, 7, 18))),
        ];

        let report = aggregate_window(&[], &stops, &registry(), start, end);

        assert!(report.ranked.iter().all(|r| r.reason_id != "r-maint"));
        let raw_maint = report
            .reasons
            .iter()
            .find(|r| r.reason_id == "r-maint")
            .unwrap();
        assert_eq!(raw_maint.seconds, 18 * 3600);
        assert!(raw_maint.ignore_in_pareto);

        // Denominator excludes the ignored duration: shares are unchanged.
        assert_eq!(report.ranked[0].percent, Some(66.7));
        assert_eq!(report.ranked[1].percent, Some(33.3));
        assert_eq!(report.stopped_seconds, (12 + 6 + 18) * 3600);
    }

    #[test]
    fn test_open_interval_truncated_at_window_end() {
        let start = at(2024, 1, 1, 0);
        let end = at(2024, 1, 2, 0);
        let stops = vec![stop("r-mat", at(2024, 1, 1, 18), None)];

        let report = aggregate_window(&[], &stops, &registry(), start, end);
        assert_eq!(report.stopped_seconds, 6 * 3600);
    }

    #[test]
    fn test_interval_clamped_at_window_start() {
        let start = at(2024, 1, 2, 0);
        let end = at(2024, 1, 3, 0);
        let stops = vec![stop("r-mat", at(2024, 1, 1, 0), Some(at(2024, 1, 2, 4)))];

        let report = aggregate_window(&[], &stops, &registry(), start, end);
        assert_eq!(report.stopped_seconds, 4 * 3600);
    }

    #[test]
    fn test_interval_outside_window_contributes_nothing() {
        let start = at(2024, 1, 2, 0);
        let end = at(2024, 1, 3, 0);
        let stops = vec![stop("r-mat", at(2024, 1, 5, 0), Some(at(2024, 1, 5, 8)))];

        let report = aggregate_window(&[], &stops, &registry(), start, end);
        assert_eq!(report.stopped_seconds, 0);
        assert!(report.reasons.is_empty());
        assert!(report.ranked.is_empty());
    }

    #[test]
    fn test_cycles_counted_inside_closed_window_only() {
        let start = at(2024, 1, 2, 0);
        let end = at(2024, 1, 3, 0);
        let cycles = vec![
            cycle(at(2024, 1, 1, 23)),
            cycle(start),
            cycle(at(2024, 1, 2, 12)),
            cycle(end),
            cycle(at(2024, 1, 3, 1)),
        ];

        let report = aggregate_window(&cycles, &[], &registry(), start, end);
        assert_eq!(report.total_cycles, 3);
        assert_eq!(report.running_seconds, 24 * 3600);
    }

    #[test]
    fn test_running_time_is_window_remainder() {
        let start = at(2024, 1, 2, 0);
        let end = at(2024, 1, 3, 0);
        let stops = vec![stop("r-mat", at(2024, 1, 2, 6), Some(at(2024, 1, 2, 9)))];

        let report = aggregate_window(&[], &stops, &registry(), start, end);
        assert_eq!(report.stopped_seconds, 3 * 3600);
        assert_eq!(report.running_seconds, 21 * 3600);
    }

    #[test]
    fn test_only_ignored_reasons_yields_empty_ranking() {
        let start = at(2024, 1, 1, 0);
        let end = at(2024, 1, 31, 0);
        let stops = vec![stop("r-maint", at(2024, 1, 7, 0), Some(at(2024, 1, 7, 18)))];

        let report = aggregate_window(&[], &stops, &registry(), start, end);
        assert!(report.ranked.is_empty());
        assert_eq!(report.reasons.len(), 1);
    }
}
