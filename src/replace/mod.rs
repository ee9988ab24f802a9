pub mod fifo;
pub mod lru;

use crate::{
    config::ReplacementPolicy,
    set::{Block, Set},
};

pub trait Replace: Sized {
    const POLICY: ReplacementPolicy;

    /// Updates one set for an access to `tag`, inserting it on a miss.
    fn access(set: &mut Set, tag: u64) -> AccessResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Hit { way: usize },
    /// `evicted` is `None` for a cold miss.
    Miss { way: usize, evicted: Option<Block> },
}
