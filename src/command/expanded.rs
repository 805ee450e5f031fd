use super::modification::RelationEndPointModification;
use crate::core::{RelationError, Result};
use crate::endpoint::listener::ClientTransactionListener;
use crate::endpoint::map::RelationEndPointMap;
use tracing::{Level, event};

/// A top-level edit together with every edit it implies on opposite end-points,
/// run phase by phase over the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpandedCommand {
    commands: Vec<RelationEndPointModification>,
}

impl ExpandedCommand {
    pub fn new(commands: Vec<RelationEndPointModification>) -> Self {
        Self { commands }
    }

    pub fn commands(&self) -> &[RelationEndPointModification] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Append the modifications of `other`
    pub fn combine(mut self, other: ExpandedCommand) -> Self {
        self.commands.extend(other.commands);
        self
    }

    pub fn notify_client_transaction_of_begin(
        &self,
        listener: &dyn ClientTransactionListener,
    ) -> Result<()> {
        for command in &self.commands {
            command
                .notify_client_transaction_of_begin(listener)
                .inspect_err(|err| log_veto(command, err))?;
        }
        Ok(())
    }

    /// Like [`notify_client_transaction_of_begin`](Self::notify_client_transaction_of_begin),
    /// last modification first
    pub fn notify_client_transaction_of_begin_reversed(
        &self,
        listener: &dyn ClientTransactionListener,
    ) -> Result<()> {
        for command in self.commands.iter().rev() {
            command
                .notify_client_transaction_of_begin(listener)
                .inspect_err(|err| log_veto(command, err))?;
        }
        Ok(())
    }

    pub fn begin(&self, listener: &dyn ClientTransactionListener) -> Result<()> {
        for command in &self.commands {
            command
                .begin(listener)
                .inspect_err(|err| log_veto(command, err))?;
        }
        Ok(())
    }

    /// Performs every modification, then touches each modified end-point.
    pub fn perform(&self, map: &mut RelationEndPointMap) -> Result<()> {
        for command in &self.commands {
            command.perform(map)?;
        }
        for command in &self.commands {
            command.touch(map)?;
        }
        Ok(())
    }

    pub fn end(&self, listener: &dyn ClientTransactionListener) {
        for command in &self.commands {
            command.end(listener);
        }
    }

    pub fn notify_client_transaction_of_end(&self, listener: &dyn ClientTransactionListener) {
        for command in &self.commands {
            command.notify_client_transaction_of_end(listener);
        }
    }

    /// Run all five phases in order
    pub fn notify_and_perform(
        &self,
        listener: &dyn ClientTransactionListener,
        map: &mut RelationEndPointMap,
    ) -> Result<()> {
        self.notify_client_transaction_of_begin(listener)?;
        self.begin(listener)?;
        self.perform(map)?;
        self.end(listener);
        self.notify_client_transaction_of_end(listener);
        Ok(())
    }

    /// Like [`notify_and_perform`](Self::notify_and_perform), with the notify-begin
    /// phase run last modification first. Used when one collection edit is split
    /// into many modifications, e.g. a clear.
    pub fn notify_and_perform_batch(
        &self,
        listener: &dyn ClientTransactionListener,
        map: &mut RelationEndPointMap,
    ) -> Result<()> {
        self.notify_client_transaction_of_begin_reversed(listener)?;
        self.begin(listener)?;
        self.perform(map)?;
        self.end(listener);
        self.notify_client_transaction_of_end(listener);
        Ok(())
    }
}

fn log_veto(command: &RelationEndPointModification, err: &RelationError) {
    event!(
        Level::WARN,
        end_point = %command.end_point_id(),
        error = %err,
        "relation change vetoed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RelationChange;
    use crate::core::{ObjectId, RelationEndPointId};
    use crate::endpoint::listener::{TransactionEvent, TransactionEventLog};
    use crate::endpoint::object_end_point::RealObjectEndPoint;
    use crate::mapping::RelationDefinition;
    use std::sync::Arc;

    fn order(name: &str) -> ObjectId {
        ObjectId::from_name("Order", name)
    }

    fn order_of(name: &str) -> RelationEndPointId {
        RelationEndPointId::new(ObjectId::from_name("OrderItem", name), "OrderItem.Order")
    }

    /// Items a and b, both pointing at o1
    fn map() -> RelationEndPointMap {
        let definition = Arc::new(RelationDefinition::one_to_many(
            "OrderToItems",
            "Order",
            "Order.OrderItems",
            "OrderItem",
            "OrderItem.Order",
        ));
        let mut map = RelationEndPointMap::new();
        for name in ["a", "b"] {
            map.insert_object(RealObjectEndPoint::new(
                order_of(name),
                Arc::clone(&definition),
                Some(order("o1")),
            ));
        }
        map
    }

    fn move_both_to_o2() -> ExpandedCommand {
        let set = |name: &str| RelationEndPointModification::ObjectSet {
            end_point_id: order_of(name),
            old: Some(order("o1")),
            new: Some(order("o2")),
        };
        ExpandedCommand::new(vec![set("a"), set("b")])
    }

    /// (phase, end-point) for each relation notification
    fn phases(log: &TransactionEventLog) -> Vec<(&'static str, RelationEndPointId)> {
        log.events()
            .unwrap()
            .into_iter()
            .filter_map(|event| match event {
                TransactionEvent::RelationChanging(change) => Some(("changing", change.end_point_id)),
                TransactionEvent::ObjectRelationChanging(change) => {
                    Some(("object_changing", change.end_point_id))
                }
                TransactionEvent::ObjectRelationChanged(change) => {
                    Some(("object_changed", change.end_point_id))
                }
                TransactionEvent::RelationChanged(change) => Some(("changed", change.end_point_id)),
                _ => None,
            })
            .collect()
    }

    struct VetoOnBegin;

    impl ClientTransactionListener for VetoOnBegin {
        fn object_relation_changing(&self, change: &RelationChange) -> Result<()> {
            Err(RelationError::Vetoed(change.end_point_id.to_string()))
        }
    }

    #[test]
    fn test_notify_and_perform_runs_phases_in_order() {
        let log = TransactionEventLog::new();
        let mut map = map();

        move_both_to_o2().notify_and_perform(&log, &mut map).unwrap();

        assert_eq!(
            phases(&log),
            vec![
                ("changing", order_of("a")),
                ("changing", order_of("b")),
                ("object_changing", order_of("a")),
                ("object_changing", order_of("b")),
                ("object_changed", order_of("a")),
                ("object_changed", order_of("b")),
                ("changed", order_of("a")),
                ("changed", order_of("b")),
            ]
        );
        for name in ["a", "b"] {
            let end_point = map.object(&order_of(name)).unwrap();
            assert_eq!(end_point.opposite_object_id(), Some(&order("o2")));
            assert!(end_point.has_been_touched());
        }
    }

    #[test]
    fn test_batch_notifies_begin_last_to_first() {
        let log = TransactionEventLog::new();
        let mut map = map();

        move_both_to_o2()
            .notify_and_perform_batch(&log, &mut map)
            .unwrap();

        let phases = phases(&log);
        assert_eq!(
            &phases[..4],
            &[
                ("changing", order_of("b")),
                ("changing", order_of("a")),
                ("object_changing", order_of("a")),
                ("object_changing", order_of("b")),
            ]
        );
        assert_eq!(
            &phases[4..],
            &[
                ("object_changed", order_of("a")),
                ("object_changed", order_of("b")),
                ("changed", order_of("a")),
                ("changed", order_of("b")),
            ]
        );
    }

    #[test]
    fn test_veto_on_begin_performs_nothing() {
        for batch in [false, true] {
            let mut map = map();
            let command = move_both_to_o2();
            let result = if batch {
                command.notify_and_perform_batch(&VetoOnBegin, &mut map)
            } else {
                command.notify_and_perform(&VetoOnBegin, &mut map)
            };

            assert!(matches!(result, Err(RelationError::Vetoed(_))));
            for name in ["a", "b"] {
                let end_point = map.object(&order_of(name)).unwrap();
                assert_eq!(end_point.opposite_object_id(), Some(&order("o1")));
                assert!(!end_point.has_been_touched());
            }
        }
    }

    #[test]
    fn test_combine_appends_modifications() {
        let combined = move_both_to_o2().combine(move_both_to_o2());
        assert_eq!(combined.len(), 4);
        assert!(ExpandedCommand::default().is_empty());
    }
}
