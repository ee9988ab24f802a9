use crate::{config::ReplacementPolicy, set::Set};

use super::{AccessResult, Replace};

#[derive(Debug, Default)]
pub struct Lru {}

impl Replace for Lru {
    const POLICY: ReplacementPolicy = ReplacementPolicy::Lru;

    fn access(set: &mut Set, tag: u64) -> AccessResult {
        // First, look for a hit
        if let Some(hit_way) = set.lookup(tag) {
            set.promote(hit_way);
            return AccessResult::Hit { way: hit_way };
        }

        // Its a miss, evict the least recently used block if there is no room
        let evicted = if set.is_full() {
            set.evict_oldest()
        } else {
            None
        };
        let way = set.insert(tag);
        AccessResult::Miss { way, evicted }
    }
}
