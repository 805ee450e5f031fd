// ============================================================================
// Transaction Listeners
// ============================================================================
//
// The event sink an end-point reports to. The "changing" notifications run
// before a modification is performed and may veto it by returning an error.
//
// ============================================================================

use crate::command::RelationChange;
use crate::core::{ChangeState, RelationEndPointId, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{Level, event};

/// Receives tri-state change notifications from a change-caching collection.
pub trait StateUpdateListener: Send + Sync {
    fn state_updated(&self, state: ChangeState);
}

/// Transaction-level event sink. Every method defaults to a no-op.
pub trait ClientTransactionListener: Send + Sync {
    /// Before any phase of a modification runs. Returning an error vetoes it.
    fn relation_changing(&self, _change: &RelationChange) -> Result<()> {
        Ok(())
    }

    fn relation_changed(&self, _change: &RelationChange) {}

    /// Object-level begin phase. Returning an error vetoes the modification.
    fn object_relation_changing(&self, _change: &RelationChange) -> Result<()> {
        Ok(())
    }

    fn object_relation_changed(&self, _change: &RelationChange) {}

    fn virtual_relation_end_point_state_updated(
        &self,
        _end_point_id: &RelationEndPointId,
        _state: ChangeState,
    ) {
    }

    fn relation_end_point_unloading(&self, _end_point_id: &RelationEndPointId) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransactionListener;

impl ClientTransactionListener for NullTransactionListener {}

/// Forwards a collection's state updates to the transaction, tagged with the end-point.
pub struct VirtualEndPointStateUpdateListener {
    end_point_id: RelationEndPointId,
    sink: Arc<dyn ClientTransactionListener>,
}

impl VirtualEndPointStateUpdateListener {
    pub fn new(end_point_id: RelationEndPointId, sink: Arc<dyn ClientTransactionListener>) -> Self {
        Self { end_point_id, sink }
    }
}

impl StateUpdateListener for VirtualEndPointStateUpdateListener {
    fn state_updated(&self, state: ChangeState) {
        event!(Level::TRACE, end_point = %self.end_point_id, %state, "end-point state updated");
        self.sink
            .virtual_relation_end_point_state_updated(&self.end_point_id, state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransactionEvent {
    RelationChanging(RelationChange),
    RelationChanged(RelationChange),
    ObjectRelationChanging(RelationChange),
    ObjectRelationChanged(RelationChange),
    StateUpdated {
        end_point_id: RelationEndPointId,
        state: ChangeState,
    },
    Unloading {
        end_point_id: RelationEndPointId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub at: DateTime<Utc>,
    pub event: TransactionEvent,
}

/// Listener that records every notification in order.
#[derive(Debug, Default)]
pub struct TransactionEventLog {
    events: Mutex<Vec<LoggedEvent>>,
}

impl TransactionEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Result<Vec<TransactionEvent>> {
        let events = self.events.lock()?;
        Ok(events.iter().map(|logged| logged.event.clone()).collect())
    }

    pub fn logged(&self) -> Result<Vec<LoggedEvent>> {
        Ok(self.events.lock()?.clone())
    }

    /// State updates for one end-point, oldest first
    pub fn state_updates(&self, end_point_id: &RelationEndPointId) -> Result<Vec<ChangeState>> {
        let events = self.events.lock()?;
        Ok(events
            .iter()
            .filter_map(|logged| match &logged.event {
                TransactionEvent::StateUpdated {
                    end_point_id: id,
                    state,
                } if id == end_point_id => Some(*state),
                _ => None,
            })
            .collect())
    }

    pub fn clear(&self) -> Result<()> {
        self.events.lock()?.clear();
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        let events = self.events.lock()?;
        Ok(serde_json::to_string_pretty(&*events)?)
    }

    /// A poisoned lock is logged at error level and then written through.
    fn record(&self, event: TransactionEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| {
            event!(Level::ERROR, "transaction event log lock poisoned, recording anyway");
            poisoned.into_inner()
        });
        events.push(LoggedEvent {
            at: Utc::now(),
            event,
        });
    }
}

impl ClientTransactionListener for TransactionEventLog {
    fn relation_changing(&self, change: &RelationChange) -> Result<()> {
        self.record(TransactionEvent::RelationChanging(change.clone()));
        Ok(())
    }

    fn relation_changed(&self, change: &RelationChange) {
        self.record(TransactionEvent::RelationChanged(change.clone()));
    }

    fn object_relation_changing(&self, change: &RelationChange) -> Result<()> {
        self.record(TransactionEvent::ObjectRelationChanging(change.clone()));
        Ok(())
    }

    fn object_relation_changed(&self, change: &RelationChange) {
        self.record(TransactionEvent::ObjectRelationChanged(change.clone()));
    }

    fn virtual_relation_end_point_state_updated(
        &self,
        end_point_id: &RelationEndPointId,
        state: ChangeState,
    ) {
        self.record(TransactionEvent::StateUpdated {
            end_point_id: end_point_id.clone(),
            state,
        });
    }

    fn relation_end_point_unloading(&self, end_point_id: &RelationEndPointId) {
        self.record(TransactionEvent::Unloading {
            end_point_id: end_point_id.clone(),
        });
    }
}
