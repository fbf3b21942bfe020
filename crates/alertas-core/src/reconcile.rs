use crate::history::ClosedHistory;
use crate::types::{Incident, IncidentStatus, IncidentType, Ticket};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Attribution stamped on incidents the feed stopped reporting.
pub const FEED_SOURCE: &str = "Waze";

/// Closed incidents stay render-visible this long after closing.
pub const CLOSED_VISIBILITY_MINS: i64 = 5;

/// Membership index over one ticket fetch: which incident UUIDs have an
/// open/in-progress ticket, and how many tickets (any status) reference each.
#[derive(Debug, Clone, Default)]
pub struct TicketIndex {
    open: HashSet<String>,
    counts: HashMap<String, u32>,
}

impl TicketIndex {
    pub fn build(tickets: &[Ticket]) -> Self {
        let mut index = TicketIndex::default();
        for ticket in tickets {
            let Some(uuid) = &ticket.incident_uuid else {
                continue;
            };
            *index.counts.entry(uuid.clone()).or_insert(0) += 1;
            if ticket.status.is_open() {
                index.open.insert(uuid.clone());
            }
        }
        index
    }

    pub fn has_open(&self, uuid: &str) -> bool {
        self.open.contains(uuid)
    }

    pub fn count(&self, uuid: &str) -> u32 {
        self.counts.get(uuid).copied().unwrap_or(0)
    }

    fn annotate(&self, incident: &mut Incident) {
        incident.has_open_ticket = self.has_open(&incident.uuid);
        incident.ticket_count = self.count(&incident.uuid);
    }

    /// Whether a previously-tracked incident must be kept alive: an open
    /// ticket in this fetch, or a previously-set flag whose ticket vanished
    /// from the store entirely (soft-deleted ticket, not a terminal status).
    fn keeps_alive(&self, prev: &Incident) -> bool {
        self.has_open(&prev.uuid) || (prev.has_open_ticket && self.count(&prev.uuid) == 0)
    }
}

/// Everything one cycle decided, before it is committed.
///
/// `plan_cycle` resolves what it can without the network; orphan UUIDs that
/// need an Incident Lookup call are left in `pending_lookups` for the driver,
/// which feeds results back through [`CyclePlan::resolve_orphan`]. The plan
/// never touches the engine until [`Reconciler::commit`] swaps it in whole.
#[derive(Debug)]
pub struct CyclePlan {
    index: TicketIndex,
    incidents: Vec<Incident>,
    pending_lookups: Vec<String>,
    recovered: Vec<Incident>,
    carried: Vec<Incident>,
    newly_closed: Vec<Incident>,
}

impl CyclePlan {
    /// Orphan UUIDs that were not found locally and need a lookup call.
    pub fn take_pending_lookups(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_lookups)
    }

    /// Feed back an incident recovered via Incident Lookup.
    pub fn resolve_orphan(&mut self, mut incident: Incident) {
        self.index.annotate(&mut incident);
        incident.status = IncidentStatus::Inactive;
        self.recovered.push(incident);
    }
}

/// Counts of what a committed cycle did, for events, metrics and the journal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleSummary {
    pub fetched: usize,
    pub active: usize,
    pub recovered: usize,
    pub carried: usize,
    pub closed: usize,
    pub lookup_failures: usize,
    #[serde(skip)]
    pub closed_incidents: Vec<Incident>,
}

/// The incident reconciliation engine.
///
/// Owns the current incident set and the closed history for the process
/// lifetime. Nothing here is async or fallible: the driver fetches, the
/// engine merges. A cycle that never reaches `commit` leaves no trace.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    current: Vec<Incident>,
    closed: ClosedHistory,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a fresh feed snapshot with ticket state against the previous
    /// in-memory set. Pure with respect to the network; see [`CyclePlan`].
    pub fn plan_cycle(&self, feed: &[Incident], tickets: &[Ticket], now: DateTime<Utc>) -> CyclePlan {
        let index = TicketIndex::build(tickets);
        let fresh_uuids: HashSet<&str> = feed.iter().map(|i| i.uuid.as_str()).collect();
        let fresh_ids: HashSet<i64> = feed.iter().map(|i| i.id).collect();

        let mut incidents = feed.to_vec();
        for incident in &mut incidents {
            index.annotate(incident);
        }

        // Orphans: open-ticketed UUIDs missing from the snapshot. Recover
        // from the previous set first; only unknown UUIDs go to the network.
        let mut recovered = Vec::new();
        let mut recovered_uuids: HashSet<String> = HashSet::new();
        let mut pending_lookups = Vec::new();
        for uuid in &index.open {
            if fresh_uuids.contains(uuid.as_str()) {
                continue;
            }
            if let Some(prev) = self.current.iter().find(|i| &i.uuid == uuid) {
                let mut incident = prev.clone();
                index.annotate(&mut incident);
                incident.status = IncidentStatus::Inactive;
                recovered_uuids.insert(incident.uuid.clone());
                recovered.push(incident);
            } else {
                pending_lookups.push(uuid.clone());
            }
        }

        // Carried-over: previously tracked, gone from the feed, still kept
        // alive by a ticket, and not already recovered above.
        let mut carried = Vec::new();
        for prev in &self.current {
            if fresh_uuids.contains(prev.uuid.as_str()) || recovered_uuids.contains(&prev.uuid) {
                continue;
            }
            if !index.keeps_alive(prev) {
                continue;
            }
            let flagged = prev.has_open_ticket;
            let mut incident = prev.clone();
            index.annotate(&mut incident);
            if index.count(&incident.uuid) == 0 {
                // Ticket vanished from the store; the flag is all we have.
                incident.has_open_ticket = flagged;
            }
            incident.status = IncidentStatus::Inactive;
            carried.push(incident);
        }

        // Newly closed: left the feed (by id) with no open work against them.
        let mut newly_closed = Vec::new();
        for prev in &self.current {
            if fresh_ids.contains(&prev.id) || index.keeps_alive(prev) {
                continue;
            }
            let mut incident = prev.clone();
            index.annotate(&mut incident);
            incident.closed_at = Some(now);
            incident.closed_by = Some(FEED_SOURCE.to_string());
            newly_closed.push(incident);
        }

        debug!(
            fresh = incidents.len(),
            recovered = recovered.len(),
            pending = pending_lookups.len(),
            carried = carried.len(),
            closed = newly_closed.len(),
            "planned reconciliation cycle"
        );

        CyclePlan {
            index,
            incidents,
            pending_lookups,
            recovered,
            carried,
            newly_closed,
        }
    }

    /// Atomically replace the in-memory set with the plan's outcome.
    pub fn commit(&mut self, plan: CyclePlan) -> CycleSummary {
        let CyclePlan {
            incidents,
            recovered,
            carried,
            newly_closed,
            ..
        } = plan;

        let mut summary = CycleSummary {
            fetched: incidents.len(),
            recovered: recovered.len(),
            carried: carried.len(),
            closed: newly_closed.len(),
            ..Default::default()
        };

        // Fresh snapshot entries win on UUID conflict.
        let mut next = incidents;
        let mut seen: HashSet<String> = next.iter().map(|i| i.uuid.clone()).collect();
        for incident in recovered.into_iter().chain(carried) {
            if seen.insert(incident.uuid.clone()) {
                next.push(incident);
            }
        }
        summary.active = next.len();

        for incident in &newly_closed {
            self.closed.record(incident.clone());
        }
        summary.closed_incidents = newly_closed;

        self.current = next;
        summary
    }

    /// The render-visible set: current incidents plus recently-closed ones,
    /// optionally narrowed to one incident type (presentation filter only).
    pub fn visible_at(&self, now: DateTime<Utc>, kind: Option<IncidentType>) -> Vec<Incident> {
        let cutoff = now - Duration::minutes(CLOSED_VISIBILITY_MINS);
        let mut visible: Vec<Incident> = self.current.clone();
        visible.extend(self.closed.recent(cutoff).cloned());
        if let Some(kind) = kind {
            visible.retain(|i| i.kind == kind);
        }
        visible
    }

    pub fn current(&self) -> &[Incident] {
        &self.current
    }

    pub fn closed_history(&self) -> &ClosedHistory {
        &self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::CLOSED_HISTORY_CAP;
    use crate::types::TicketStatus;

    fn incident(id: i64, uuid: &str, kind: IncidentType) -> Incident {
        Incident {
            id,
            uuid: uuid.to_string(),
            kind,
            subtype: None,
            city: Some("Lima".to_string()),
            street: None,
            category: None,
            priority: Some(2),
            status: IncidentStatus::Active,
            pub_time: Utc::now(),
            reliability: Some(7),
            confidence: None,
            lat: -12.05,
            lon: -77.04,
            has_open_ticket: false,
            ticket_count: 0,
            closed_at: None,
            closed_by: None,
        }
    }

    fn ticket(id: i64, uuid: &str, status: TicketStatus) -> Ticket {
        Ticket {
            id,
            incident_uuid: Some(uuid.to_string()),
            title: format!("ticket-{}", id),
            description: None,
            status,
            priority: Some(1),
            source: None,
            incident_type: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            created_by: "operator1".to_string(),
            assigned_to: None,
        }
    }

    fn run_cycle(engine: &mut Reconciler, feed: &[Incident], tickets: &[Ticket]) -> CycleSummary {
        let plan = engine.plan_cycle(feed, tickets, Utc::now());
        engine.commit(plan)
    }

    #[test]
    fn test_first_cycle_adopts_snapshot() {
        let mut engine = Reconciler::new();
        let feed = vec![
            incident(1, "u1", IncidentType::Accident),
            incident(2, "u2", IncidentType::Jam),
        ];

        let summary = run_cycle(&mut engine, &feed, &[]);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.closed, 0);
        assert_eq!(engine.visible_at(Utc::now(), None).len(), 2);
        assert!(engine.closed_history().is_empty());
    }

    #[test]
    fn test_open_ticket_keeps_incident_visible() {
        let mut engine = Reconciler::new();
        let feed = vec![
            incident(1, "u1", IncidentType::Accident),
            incident(2, "u2", IncidentType::Jam),
        ];
        run_cycle(&mut engine, &feed, &[]);

        // A leaves the feed but has an open ticket
        let feed = vec![incident(2, "u2", IncidentType::Jam)];
        let tickets = vec![ticket(10, "u1", TicketStatus::Open)];
        let summary = run_cycle(&mut engine, &feed, &tickets);

        assert_eq!(summary.closed, 0);
        let visible = engine.visible_at(Utc::now(), None);
        assert_eq!(visible.len(), 2);
        let a = visible.iter().find(|i| i.uuid == "u1").unwrap();
        assert!(a.has_open_ticket);
        assert_eq!(a.ticket_count, 1);
        assert_eq!(a.status, IncidentStatus::Inactive);
        assert!(a.closed_at.is_none());
        assert!(engine.closed_history().is_empty());
    }

    #[test]
    fn test_done_ticket_closes_incident() {
        let mut engine = Reconciler::new();
        run_cycle(
            &mut engine,
            &[
                incident(1, "u1", IncidentType::Accident),
                incident(2, "u2", IncidentType::Jam),
            ],
            &[],
        );
        run_cycle(
            &mut engine,
            &[incident(2, "u2", IncidentType::Jam)],
            &[ticket(10, "u1", TicketStatus::Open)],
        );

        // Ticket resolved; A finally closes
        let summary = run_cycle(
            &mut engine,
            &[incident(2, "u2", IncidentType::Jam)],
            &[ticket(10, "u1", TicketStatus::Done)],
        );

        assert_eq!(summary.closed, 1);
        assert_eq!(engine.closed_history().len(), 1);
        let closed = engine.closed_history().iter().next().unwrap();
        assert_eq!(closed.uuid, "u1");
        assert!(closed.closed_at.is_some());
        assert_eq!(closed.closed_by.as_deref(), Some(FEED_SOURCE));
        assert!(!closed.has_open_ticket);

        // Still visible inside the five-minute window
        let visible = engine.visible_at(Utc::now(), None);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().any(|i| i.uuid == "u1" && i.closed_at.is_some()));
    }

    #[test]
    fn test_closed_once_per_disappearance() {
        let mut engine = Reconciler::new();
        run_cycle(&mut engine, &[incident(1, "u1", IncidentType::Hazard)], &[]);
        run_cycle(&mut engine, &[], &[]);
        assert_eq!(engine.closed_history().len(), 1);

        // Unchanged feed: no duplicate stamping
        run_cycle(&mut engine, &[], &[]);
        run_cycle(&mut engine, &[], &[]);
        assert_eq!(engine.closed_history().len(), 1);
    }

    #[test]
    fn test_closed_history_stays_bounded() {
        let mut engine = Reconciler::new();
        for batch in 0..30 {
            let feed: Vec<Incident> = (0..5)
                .map(|i| {
                    let id = batch * 5 + i;
                    incident(id, &format!("u{}", id), IncidentType::Congestion)
                })
                .collect();
            run_cycle(&mut engine, &feed, &[]);
        }
        // Everything eventually leaves the feed
        run_cycle(&mut engine, &[], &[]);
        for batch in 0..30 {
            let feed: Vec<Incident> = (0..5)
                .map(|i| {
                    let id = 1000 + batch * 5 + i;
                    incident(id, &format!("x{}", id), IncidentType::Congestion)
                })
                .collect();
            run_cycle(&mut engine, &feed, &[]);
        }
        run_cycle(&mut engine, &[], &[]);

        assert!(engine.closed_history().len() <= CLOSED_HISTORY_CAP);
    }

    #[test]
    fn test_visibility_window_boundary() {
        let now = Utc::now();
        let mut engine = Reconciler::new();
        run_cycle(
            &mut engine,
            &[
                incident(1, "u1", IncidentType::Hazard),
                incident(2, "u2", IncidentType::Hazard),
            ],
            &[],
        );
        let plan = engine.plan_cycle(&[], &[], now);
        engine.commit(plan);

        // Both closed at `now`; shift the clock instead of the stamps
        let visible = engine.visible_at(now + Duration::minutes(4), None);
        assert_eq!(visible.len(), 2);
        let visible = engine.visible_at(now + Duration::minutes(6), None);
        assert!(visible.is_empty());
    }

    #[test]
    fn test_orphan_recovery_via_lookup() {
        let mut engine = Reconciler::new();
        run_cycle(&mut engine, &[incident(2, "u2", IncidentType::Jam)], &[]);

        // Open ticket references a UUID the engine has never seen
        let feed = vec![incident(2, "u2", IncidentType::Jam)];
        let tickets = vec![ticket(10, "u9", TicketStatus::InProgress)];
        let mut plan = engine.plan_cycle(&feed, &tickets, Utc::now());

        let pending = plan.take_pending_lookups();
        assert_eq!(pending, vec!["u9".to_string()]);

        plan.resolve_orphan(incident(9, "u9", IncidentType::RoadClosed));
        let summary = engine.commit(plan);

        assert_eq!(summary.recovered, 1);
        let visible = engine.visible_at(Utc::now(), None);
        let orphan = visible.iter().find(|i| i.uuid == "u9").unwrap();
        assert!(orphan.has_open_ticket);
        assert_eq!(orphan.status, IncidentStatus::Inactive);
    }

    #[test]
    fn test_failed_lookup_skips_only_that_orphan() {
        let mut engine = Reconciler::new();
        let tickets = vec![
            ticket(10, "u8", TicketStatus::Open),
            ticket(11, "u9", TicketStatus::Open),
        ];
        let mut plan = engine.plan_cycle(&[], &tickets, Utc::now());

        let mut pending = plan.take_pending_lookups();
        pending.sort();
        assert_eq!(pending, vec!["u8".to_string(), "u9".to_string()]);

        // u8's lookup failed; only u9 comes back
        plan.resolve_orphan(incident(9, "u9", IncidentType::Police));
        let summary = engine.commit(plan);

        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.active, 1);
        assert_eq!(engine.current()[0].uuid, "u9");
    }

    #[test]
    fn test_orphan_recovered_locally_without_lookup() {
        let mut engine = Reconciler::new();
        run_cycle(&mut engine, &[incident(1, "u1", IncidentType::Accident)], &[]);

        // u1 leaves the feed; the previous set satisfies the orphan search
        let mut plan = engine.plan_cycle(&[], &[ticket(10, "u1", TicketStatus::Open)], Utc::now());
        assert!(plan.take_pending_lookups().is_empty());
        let summary = engine.commit(plan);
        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.closed, 0);
    }

    #[test]
    fn test_fresh_snapshot_takes_precedence() {
        let mut engine = Reconciler::new();
        run_cycle(&mut engine, &[incident(1, "u1", IncidentType::Accident)], &[]);
        run_cycle(
            &mut engine,
            &[],
            &[ticket(10, "u1", TicketStatus::Open)],
        );
        // u1 is back in the feed while its carried copy is still inactive
        let summary = run_cycle(
            &mut engine,
            &[incident(1, "u1", IncidentType::Accident)],
            &[ticket(10, "u1", TicketStatus::Open)],
        );

        assert_eq!(summary.active, 1);
        let current = engine.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].status, IncidentStatus::Active);
        assert!(current[0].has_open_ticket);
    }

    #[test]
    fn test_flagged_incident_survives_ticket_store_gap() {
        let mut engine = Reconciler::new();
        run_cycle(&mut engine, &[incident(1, "u1", IncidentType::Hazard)], &[]);
        run_cycle(&mut engine, &[], &[ticket(10, "u1", TicketStatus::Open)]);

        // The ticket disappears from the store entirely (soft delete); the
        // previously-set flag keeps the incident out of the closed history.
        let summary = run_cycle(&mut engine, &[], &[]);
        assert_eq!(summary.closed, 0);
        assert_eq!(summary.carried, 1);
        let visible = engine.visible_at(Utc::now(), None);
        assert!(visible.iter().any(|i| i.uuid == "u1" && i.has_open_ticket));
    }

    #[test]
    fn test_uncommitted_plan_leaves_state_untouched() {
        let mut engine = Reconciler::new();
        run_cycle(&mut engine, &[incident(1, "u1", IncidentType::Accident)], &[]);
        let before = engine.visible_at(Utc::now(), None);

        // Driver aborts the cycle (e.g. ticket fetch failed) before commit
        let plan = engine.plan_cycle(&[], &[], Utc::now());
        drop(plan);

        assert_eq!(engine.visible_at(Utc::now(), None), before);
    }

    #[test]
    fn test_type_filter_is_presentation_only() {
        let mut engine = Reconciler::new();
        run_cycle(
            &mut engine,
            &[
                incident(1, "u1", IncidentType::Accident),
                incident(2, "u2", IncidentType::Jam),
            ],
            &[],
        );

        let jams = engine.visible_at(Utc::now(), Some(IncidentType::Jam));
        assert_eq!(jams.len(), 1);
        assert_eq!(jams[0].uuid, "u2");
        // Filtering never mutates the tracked set
        assert_eq!(engine.current().len(), 2);
    }

    #[test]
    fn test_three_cycle_scenario() {
        let mut engine = Reconciler::new();

        // Cycle 1: feed [A, B], no tickets
        run_cycle(
            &mut engine,
            &[
                incident(1, "u1", IncidentType::Accident),
                incident(2, "u2", IncidentType::Jam),
            ],
            &[],
        );
        assert_eq!(engine.visible_at(Utc::now(), None).len(), 2);
        assert!(engine.closed_history().is_empty());

        // Cycle 2: feed [B], u1 has an open ticket
        run_cycle(
            &mut engine,
            &[incident(2, "u2", IncidentType::Jam)],
            &[ticket(10, "u1", TicketStatus::Open)],
        );
        let visible = engine.visible_at(Utc::now(), None);
        assert_eq!(visible.len(), 2);
        let a = visible.iter().find(|i| i.uuid == "u1").unwrap();
        assert!(a.has_open_ticket && a.status == IncidentStatus::Inactive);
        assert!(engine.closed_history().is_empty());

        // Cycle 3: ticket done, A closes but stays in the window
        run_cycle(
            &mut engine,
            &[incident(2, "u2", IncidentType::Jam)],
            &[ticket(10, "u1", TicketStatus::Done)],
        );
        assert_eq!(engine.closed_history().len(), 1);
        let visible = engine.visible_at(Utc::now(), None);
        assert_eq!(visible.len(), 2);
        assert!(visible
            .iter()
            .any(|i| i.uuid == "u1" && i.closed_at.is_some()));
    }
}
