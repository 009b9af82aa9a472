//! Monotonic sequence for locally generated identifiers.
//!
//! Operation IDs, temporary entity IDs and conflict IDs all draw from the
//! same per-node counter, so identifiers never repeat for the lifetime of a
//! cache snapshot and operation IDs sort in creation order.

use crate::{EntityId, NodeId, OperationId, Timestamp, TEMP_ID_PREFIX};
use serde::{Deserialize, Serialize};

/// Per-node monotonic counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpSequence {
    /// Identifier of the device that owns the cache
    pub node_id: NodeId,
    /// Last value handed out
    pub counter: u64,
}

impl OpSequence {
    /// Create a new sequence for a node, starting at counter 0.
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            counter: 0,
        }
    }

    /// Create a sequence with a specific counter value.
    pub fn with_counter(node_id: impl Into<NodeId>, counter: u64) -> Self {
        Self {
            node_id: node_id.into(),
            counter,
        }
    }

    /// Advance the counter and return the new value.
    pub fn next(&mut self) -> u64 {
        self.counter = self.counter.saturating_add(1);
        self.counter
    }

    /// Next operation ID. The counter is zero-padded so lexical order
    /// matches creation order.
    pub fn next_op_id(&mut self) -> OperationId {
        let n = self.next();
        format!("op_{}_{:020}", self.node_id, n)
    }

    /// Next temporary entity ID.
    pub fn next_temp_id(&mut self, timestamp: Timestamp) -> EntityId {
        let n = self.next();
        format!("{TEMP_ID_PREFIX}{timestamp}_{n}")
    }

    /// Next conflict ID.
    pub fn next_conflict_id(&mut self) -> String {
        let n = self.next();
        format!("conflict_{}_{n}", self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sequence_starts_at_zero() {
        let seq = OpSequence::new("node-1");
        assert_eq!(seq.counter, 0);
        assert_eq!(seq.node_id, "node-1");
    }

    #[test]
    fn op_ids_sort_in_creation_order() {
        let mut seq = OpSequence::with_counter("node-1", 8);
        let a = seq.next_op_id();
        let b = seq.next_op_id();
        let c = seq.next_op_id();
        assert!(a < b && b < c);
        assert_eq!(a, "op_node-1_00000000000000000009");
    }

    #[test]
    fn temp_ids_are_prefixed_and_unique() {
        let mut seq = OpSequence::new("node-1");
        let a = seq.next_temp_id(1000);
        let b = seq.next_temp_id(1000);
        assert!(a.starts_with(TEMP_ID_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn counter_saturates() {
        let mut seq = OpSequence::with_counter("node", u64::MAX);
        assert_eq!(seq.next(), u64::MAX);
    }

    #[test]
    fn serialization_format() {
        let seq = OpSequence::with_counter("node-1", 10);
        let json = serde_json::to_string(&seq).unwrap();
        assert!(json.contains("nodeId"));
        assert!(json.contains("counter"));
    }
}
