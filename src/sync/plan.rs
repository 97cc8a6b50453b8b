//! Reconciliation plan between the engine's moves and the desired moves.

use crate::game::Move;

/// Length of the longest shared leading run of `a` and `b`.
pub fn common_prefix_len(a: &[Move], b: &[Move]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Undo `undo_count` engine moves, then play `replay` in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<'a> {
    pub prefix_len: usize,
    pub undo_count: usize,
    pub replay: &'a [Move],
}

impl<'a> Plan<'a> {
    pub fn compute(peer: &[Move], desired: &'a [Move]) -> Self {
        let prefix_len = common_prefix_len(peer, desired);
        Self {
            prefix_len,
            undo_count: peer.len() - prefix_len,
            replay: &desired[prefix_len..],
        }
    }

    pub fn is_noop(&self) -> bool {
        self.undo_count == 0 && self.replay.is_empty()
    }
}
