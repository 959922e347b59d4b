//! Drone State Machine
//!
//! Pure transition logic over a single drone record. Every function takes the
//! caller's copy of the record and returns a new snapshot; nothing here touches
//! storage or the transport.

use chrono::{DateTime, Utc};

use crate::{DroneError, DroneRecord, DroneResult, DroneStatus, StatusMessage};

/// Operator-initiated transitions on a registered drone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Takeoff,
    Land { dock_id: String },
    ReturnHome,
    AssignDock { dock_id: String },
}

impl Transition {
    /// Verb used in logs and error messages
    pub fn action(&self) -> &'static str {
        match self {
            Transition::Takeoff => "takeoff",
            Transition::Land { .. } => "land",
            Transition::ReturnHome => "return-home",
            Transition::AssignDock { .. } => "assign-dock",
        }
    }
}

/// Apply a transition to the current record
///
/// On success the returned snapshot carries a fresh `last_updated`. On failure
/// the caller's record is untouched and no snapshot exists.
pub fn apply(
    current: &DroneRecord,
    transition: &Transition,
    now: DateTime<Utc>,
) -> DroneResult<DroneRecord> {
    use DroneStatus::*;

    let (status, dock_id) = match (current.status, transition) {
        (Idle | Docked, Transition::Takeoff) => (Flying, None),

        (Flying | Returning, Transition::Land { dock_id }) => {
            (Docked, Some(require_dock(dock_id)?))
        }

        (Flying, Transition::ReturnHome) => (Returning, None),

        (Docked, Transition::AssignDock { dock_id }) => {
            let dock_id = require_dock(dock_id)?;
            if current.dock_id.as_deref() == Some(dock_id.as_str()) {
                return Err(invalid(current, transition, "already assigned"));
            }
            (Docked, Some(dock_id))
        }
        (_, Transition::AssignDock { .. }) => {
            return Err(invalid(current, transition, "not docked"));
        }

        (Flying | Returning, Transition::Takeoff) => {
            return Err(invalid(current, transition, "already airborne"));
        }
        (Idle | Docked, Transition::Land { .. }) => {
            return Err(invalid(current, transition, "not airborne"));
        }
        (Returning, Transition::ReturnHome) => {
            return Err(invalid(current, transition, "already returning"));
        }
        (Unknown, _) => {
            return Err(invalid(current, transition, "state unknown"));
        }
        (_, Transition::ReturnHome) => {
            return Err(invalid(current, transition, "not flying"));
        }
    };

    Ok(DroneRecord {
        drone_id: current.drone_id.clone(),
        dock_id,
        status,
        last_updated: stamp(current.last_updated, now),
    })
}

/// Create the initial record for a new drone
///
/// `existing` is whatever the store currently holds for the id.
pub fn register(
    existing: Option<&DroneRecord>,
    drone_id: &str,
    dock_id: Option<&str>,
    now: DateTime<Utc>,
) -> DroneResult<DroneRecord> {
    let drone_id = require_id(drone_id)?;
    if existing.is_some() {
        return Err(DroneError::AlreadyExists(drone_id));
    }

    let dock_id = dock_id.map(require_dock).transpose()?;
    let status = if dock_id.is_some() {
        DroneStatus::Docked
    } else {
        DroneStatus::Idle
    };

    Ok(DroneRecord {
        drone_id,
        dock_id,
        status,
        last_updated: now,
    })
}

/// Confirm a drone can be removed, handing back its last record
pub fn unregister(existing: Option<DroneRecord>, drone_id: &str) -> DroneResult<DroneRecord> {
    existing.ok_or_else(|| DroneError::NotFound(drone_id.to_string()))
}

/// Last-writer-wins merge of a status report into the stored record
///
/// Reports at or before the stored timestamp are stale. Otherwise the report
/// replaces every mutable field; a dock is only kept for a docked report.
pub fn reconcile(current: &DroneRecord, report: &StatusMessage) -> DroneResult<DroneRecord> {
    if report.timestamp <= current.last_updated {
        return Err(DroneError::StaleUpdate {
            drone_id: current.drone_id.clone(),
            incoming: report.timestamp,
            stored: current.last_updated,
        });
    }

    let dock_id = match report.status {
        DroneStatus::Docked => report.dock_id.clone().filter(|d| !d.trim().is_empty()),
        _ => None,
    };

    Ok(DroneRecord {
        drone_id: current.drone_id.clone(),
        dock_id,
        status: report.status,
        last_updated: report.timestamp,
    })
}

/// Check if a status change is one the state machine could produce itself
///
/// Reports are authoritative and are merged regardless; this only flags jumps
/// worth a log line.
pub fn is_valid_transition(from: DroneStatus, to: DroneStatus) -> bool {
    use DroneStatus::*;

    match (from, to) {
        (a, b) if a == b => true,

        // Reports may always pull a drone out of the unknown state
        (Unknown, _) => true,

        (Idle | Docked, Flying) => true,
        (Flying | Returning, Docked) => true,
        (Flying, Returning) => true,

        _ => false,
    }
}

/// Transition timestamp that never moves backwards for a drone
fn stamp(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    previous.max(now)
}

fn require_id(drone_id: &str) -> DroneResult<String> {
    let trimmed = drone_id.trim();
    if trimmed.is_empty() {
        return Err(DroneError::InvalidCommand("drone_id must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn require_dock(dock_id: &str) -> DroneResult<String> {
    let trimmed = dock_id.trim();
    if trimmed.is_empty() {
        return Err(DroneError::InvalidCommand("dock_id must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn invalid(current: &DroneRecord, transition: &Transition, reason: &str) -> DroneError {
    DroneError::InvalidTransition {
        drone_id: current.drone_id.clone(),
        from: current.status,
        action: transition.action(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(status: DroneStatus, dock_id: Option<&str>) -> DroneRecord {
        DroneRecord {
            drone_id: "drone-1".into(),
            dock_id: dock_id.map(String::from),
            status,
            last_updated: t(0),
        }
    }

    fn report(status: DroneStatus, dock_id: Option<&str>, at: DateTime<Utc>) -> StatusMessage {
        StatusMessage {
            message_id: None,
            drone_id: "drone-1".into(),
            status,
            dock_id: dock_id.map(String::from),
            timestamp: at,
        }
    }

    #[test]
    fn test_register_without_dock_is_idle() {
        let rec = register(None, "drone-1", None, t(0)).unwrap();
        assert_eq!(rec.status, DroneStatus::Idle);
        assert_eq!(rec.dock_id, None);
        assert_eq!(rec.last_updated, t(0));
    }

    #[test]
    fn test_register_with_dock_is_docked() {
        let rec = register(None, "drone-1", Some("dock-A"), t(0)).unwrap();
        assert_eq!(rec.status, DroneStatus::Docked);
        assert_eq!(rec.dock_id.as_deref(), Some("dock-A"));
        assert!(rec.is_docked());
    }

    #[test]
    fn test_register_existing_fails() {
        let existing = record(DroneStatus::Idle, None);
        let result = register(Some(&existing), "drone-1", None, t(1));
        assert!(matches!(result, Err(DroneError::AlreadyExists(id)) if id == "drone-1"));
    }

    #[test]
    fn test_register_rejects_blank_ids() {
        assert!(matches!(
            register(None, "  ", None, t(0)),
            Err(DroneError::InvalidCommand(_))
        ));
        assert!(matches!(
            register(None, "drone-1", Some(""), t(0)),
            Err(DroneError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_unregister_unknown_fails() {
        assert!(matches!(
            unregister(None, "drone-999"),
            Err(DroneError::NotFound(id)) if id == "drone-999"
        ));
        let rec = unregister(Some(record(DroneStatus::Idle, None)), "drone-1").unwrap();
        assert_eq!(rec.drone_id, "drone-1");
    }

    #[test]
    fn test_normal_flight_cycle() {
        let docked = record(DroneStatus::Docked, Some("dock-A"));

        let flying = apply(&docked, &Transition::Takeoff, t(1)).unwrap();
        assert_eq!(flying.status, DroneStatus::Flying);
        assert_eq!(flying.dock_id, None);
        assert_eq!(flying.last_updated, t(1));

        let returning = apply(&flying, &Transition::ReturnHome, t(2)).unwrap();
        assert_eq!(returning.status, DroneStatus::Returning);
        assert_eq!(returning.dock_id, None);

        let landed = apply(
            &returning,
            &Transition::Land { dock_id: "dock-B".into() },
            t(3),
        )
        .unwrap();
        assert_eq!(landed.status, DroneStatus::Docked);
        assert_eq!(landed.dock_id.as_deref(), Some("dock-B"));
        assert_eq!(landed.last_updated, t(3));
    }

    #[test]
    fn test_takeoff_from_idle() {
        let idle = record(DroneStatus::Idle, None);
        let flying = apply(&idle, &Transition::Takeoff, t(1)).unwrap();
        assert_eq!(flying.status, DroneStatus::Flying);
    }

    #[test]
    fn test_takeoff_while_airborne_is_invalid() {
        for status in [DroneStatus::Flying, DroneStatus::Returning] {
            let current = record(status, None);
            let result = apply(&current, &Transition::Takeoff, t(1));
            assert!(matches!(
                result,
                Err(DroneError::InvalidTransition { from, action: "takeoff", .. }) if from == status
            ));
            // The caller's copy is untouched
            assert_eq!(current.status, status);
        }
    }

    #[test]
    fn test_land_requires_airborne_and_dock() {
        let idle = record(DroneStatus::Idle, None);
        assert!(matches!(
            apply(&idle, &Transition::Land { dock_id: "dock-A".into() }, t(1)),
            Err(DroneError::InvalidTransition { .. })
        ));

        let flying = record(DroneStatus::Flying, None);
        assert!(matches!(
            apply(&flying, &Transition::Land { dock_id: " ".into() }, t(1)),
            Err(DroneError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_return_home_only_from_flying() {
        for status in [
            DroneStatus::Idle,
            DroneStatus::Docked,
            DroneStatus::Returning,
            DroneStatus::Unknown,
        ] {
            let current = record(status, None);
            assert!(
                matches!(
                    apply(&current, &Transition::ReturnHome, t(1)),
                    Err(DroneError::InvalidTransition { .. })
                ),
                "return-home from {status} should be rejected"
            );
        }
    }

    #[test]
    fn test_assign_dock() {
        let docked = record(DroneStatus::Docked, Some("dock-A"));

        let moved = apply(
            &docked,
            &Transition::AssignDock { dock_id: "dock-C".into() },
            t(1),
        )
        .unwrap();
        assert_eq!(moved.status, DroneStatus::Docked);
        assert_eq!(moved.dock_id.as_deref(), Some("dock-C"));

        let same = apply(
            &docked,
            &Transition::AssignDock { dock_id: "dock-A".into() },
            t(1),
        );
        assert!(matches!(
            same,
            Err(DroneError::InvalidTransition { ref reason, .. }) if reason == "already assigned"
        ));
    }

    #[test]
    fn test_assign_dock_while_flying_is_invalid() {
        let flying = record(DroneStatus::Flying, None);
        let result = apply(
            &flying,
            &Transition::AssignDock { dock_id: "dock-C".into() },
            t(1),
        );
        assert!(matches!(
            result,
            Err(DroneError::InvalidTransition { ref reason, .. }) if reason == "not docked"
        ));
    }

    #[test]
    fn test_unknown_state_rejects_commands() {
        let unknown = record(DroneStatus::Unknown, None);
        assert!(apply(&unknown, &Transition::Takeoff, t(1)).is_err());
        assert!(apply(&unknown, &Transition::Land { dock_id: "dock-A".into() }, t(1)).is_err());
    }

    #[test]
    fn test_transition_timestamp_never_moves_backwards() {
        let mut ahead = record(DroneStatus::Idle, None);
        ahead.last_updated = t(100);

        let flying = apply(&ahead, &Transition::Takeoff, t(5)).unwrap();
        assert_eq!(flying.last_updated, t(100));
    }

    #[test]
    fn test_reconcile_newer_report_replaces_fields() {
        let docked = record(DroneStatus::Docked, Some("dock-A"));
        let merged = reconcile(&docked, &report(DroneStatus::Flying, None, t(10))).unwrap();

        assert_eq!(merged.status, DroneStatus::Flying);
        assert_eq!(merged.dock_id, None);
        assert_eq!(merged.last_updated, t(10));
    }

    #[test]
    fn test_reconcile_equal_or_older_is_stale() {
        let current = record(DroneStatus::Flying, None);

        for at in [t(0), t(-1)] {
            let result = reconcile(&current, &report(DroneStatus::Docked, Some("dock-A"), at));
            assert!(matches!(result, Err(DroneError::StaleUpdate { .. })));
        }
    }

    #[test]
    fn test_reconcile_drops_dock_for_undocked_report() {
        let current = record(DroneStatus::Docked, Some("dock-A"));
        let merged = reconcile(&current, &report(DroneStatus::Flying, Some("dock-A"), t(1))).unwrap();
        assert_eq!(merged.dock_id, None);
    }

    #[test]
    fn test_reconcile_converges_in_either_order() {
        let start = record(DroneStatus::Idle, None);
        let early = report(DroneStatus::Flying, None, t(1));
        let late = report(DroneStatus::Docked, Some("dock-B"), t(2));

        let merge = |rec: DroneRecord, msg: &StatusMessage| reconcile(&rec, msg).unwrap_or(rec);

        let in_order = merge(merge(start.clone(), &early), &late);
        let reversed = merge(merge(start.clone(), &late), &early);
        let duplicated = merge(merge(merge(start, &late), &late), &early);

        assert_eq!(in_order, reversed);
        assert_eq!(in_order, duplicated);
        assert_eq!(in_order.status, DroneStatus::Docked);
        assert_eq!(in_order.dock_id.as_deref(), Some("dock-B"));
        assert_eq!(in_order.last_updated, t(2));
    }

    #[test]
    fn test_reconcile_sub_second_ordering() {
        let current = record(DroneStatus::Idle, None);
        let later = t(0) + Duration::microseconds(1);
        assert!(reconcile(&current, &report(DroneStatus::Flying, None, later)).is_ok());
    }

    #[test]
    fn test_valid_transitions() {
        assert!(is_valid_transition(DroneStatus::Docked, DroneStatus::Flying));
        assert!(is_valid_transition(DroneStatus::Returning, DroneStatus::Docked));
        assert!(is_valid_transition(DroneStatus::Unknown, DroneStatus::Flying));
        assert!(!is_valid_transition(DroneStatus::Docked, DroneStatus::Returning));
        assert!(!is_valid_transition(DroneStatus::Flying, DroneStatus::Idle));
    }
}
