//! Sequencer
//!
//! Gives every active node a stable 1-based ordinal, ordered by id. Runs once
//! per calculation reset and never mid-round: the number of sequenced rows is
//! the divisor basis of the estimate.

use alloc::vec::Vec;

use crate::table::NodeTable;
use crate::traits::NodeId;

/// Assign `sequence = rank + 1` to every row whose id is in `active`
///
/// Rows outside the active set get 0. Returns the number of sequenced rows.
pub fn sequence_nodes(table: &mut NodeTable, active: &[NodeId]) -> u32 {
    let mut ranked: Vec<NodeId> = active.to_vec();
    ranked.sort_unstable();
    ranked.dedup();

    for node in table.nodes_mut() {
        match ranked.binary_search(&node.id()) {
            Ok(rank) => node.set_sequence(rank as u32 + 1),
            Err(_) => node.set_sequence(0),
        }
    }

    let sequenced = table.sequenced_count();
    assert_eq!(
        sequenced as usize,
        ranked.len(),
        "active set names ids missing from the node table"
    );
    sequenced
}
