//! Incident state machine
//!
//! Each monitor is either CLOSED (no open incident) or OPEN (exactly one open
//! incident). Every new check drives one step:
//!
//! ```text
//! CLOSED + down → open incident ("Down", last status) → OPEN
//! OPEN   + up   → resolve at the check's timestamp     → CLOSED
//! CLOSED + up   → no change
//! OPEN   + down → no change
//! ```
//!
//! The machine is pure. Storage backends call [`evaluate`] inside the same
//! transaction that writes the check, so the "at most one open incident"
//! invariant holds under concurrent firings.

use chrono::{DateTime, Utc};

use crate::storage::schema::{IncidentRow, NewCheck};

/// Reason recorded on incidents opened by a failed check
pub const DOWN_REASON: &str = "Down";

/// Incident state of one monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentState {
    Closed,
    Open { incident_id: i64 },
}

impl IncidentState {
    /// Derive the state from the monitor's open incident, if any
    pub fn from_open(open: Option<&IncidentRow>) -> Self {
        match open {
            Some(incident) => IncidentState::Open {
                incident_id: incident.id,
            },
            None => IncidentState::Closed,
        }
    }
}

/// What the store has to do after recording a check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentAction {
    Open {
        reason: &'static str,
        last_status_code: Option<u16>,
    },
    Resolve {
        incident_id: i64,
        resolved_at: DateTime<Utc>,
    },
    None,
}

/// Advance the state machine by one check
pub fn evaluate(state: IncidentState, check: &NewCheck) -> IncidentAction {
    match (state, check.ok) {
        (IncidentState::Closed, false) => IncidentAction::Open {
            reason: DOWN_REASON,
            last_status_code: check.status_code,
        },
        (IncidentState::Open { incident_id }, true) => IncidentAction::Resolve {
            incident_id,
            resolved_at: check.observed_at,
        },
        _ => IncidentAction::None,
    }
}
