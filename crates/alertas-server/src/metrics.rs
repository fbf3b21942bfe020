use alertas_core::types::IncidentType;
use metrics::{counter, gauge, histogram};

pub fn record_cycle_ok() {
    counter!("reconcile_cycles_total", "result" => "ok").increment(1);
}

pub fn record_cycle_failed() {
    counter!("reconcile_cycles_total", "result" => "error").increment(1);
}

pub fn record_incident_closed(kind: IncidentType) {
    counter!("incidents_closed_total", "type" => kind.to_string()).increment(1);
}

pub fn record_orphan_recovered() {
    counter!("orphans_recovered_total").increment(1);
}

pub fn record_lookup_failure() {
    counter!("orphan_lookup_failures_total").increment(1);
}

pub fn update_incident_gauges(active: usize, closed_history: usize) {
    gauge!("incidents_active").set(active as f64);
    gauge!("incidents_closed_history").set(closed_history as f64);
}

pub fn record_cycle_duration(ms: f64) {
    histogram!("reconcile_cycle_duration_ms").record(ms);
}
