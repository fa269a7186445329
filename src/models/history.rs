// History events - audit trail of one workflow instance

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::{EventId, StateRef};

/// Record of one state change of a workflow instance
///
/// Every accepted event (and every step back) appends one of these, so the
/// UI can show the path the user took and support tooling can replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// When the change happened (UTC)
    pub timestamp: DateTime<Utc>,

    /// The event that caused it; `BACK` for steps backwards
    pub event: EventId,

    /// Configuration before the change
    pub from: StateRef,

    /// Configuration after the change
    pub to: StateRef,
}

impl HistoryEvent {
    pub fn new(event: EventId, from: StateRef, to: StateRef) -> Self {
        HistoryEvent {
            timestamp: Utc::now(),
            event,
            from,
            to,
        }
    }
}
