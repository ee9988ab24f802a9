use crate::{config::ReplacementPolicy, set::Set};

use super::{AccessResult, Replace};

#[derive(Debug, Default)]
pub struct Fifo {}

impl Replace for Fifo {
    const POLICY: ReplacementPolicy = ReplacementPolicy::Fifo;

    fn access(set: &mut Set, tag: u64) -> AccessResult {
        // Hits leave the insertion order alone
        if let Some(hit_way) = set.lookup(tag) {
            return AccessResult::Hit { way: hit_way };
        }

        let evicted = if set.is_full() {
            set.evict_oldest()
        } else {
            None
        };
        let way = set.insert(tag);
        AccessResult::Miss { way, evicted }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_do_not_reorder() {
        let mut set = Set::new(3);
        for tag in [1, 2, 3] {
            Fifo::access(&mut set, tag);
        }
        for tag in [3, 1, 2, 1] {
            assert!(matches!(Fifo::access(&mut set, tag), AccessResult::Hit { .. }));
        }
        assert_eq!(set.tags_oldest_first().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn evicts_in_insertion_order() {
        let mut set = Set::new(3);
        for tag in [1, 2, 3] {
            Fifo::access(&mut set, tag);
        }
        let mut victims = Vec::new();
        for tag in [4, 5, 6] {
            // hit the newest block first, it must not change the victim
            assert!(matches!(Fifo::access(&mut set, tag - 1), AccessResult::Hit { .. }));
            if let AccessResult::Miss {
                evicted: Some(victim),
                ..
            } = Fifo::access(&mut set, tag)
            {
                victims.push(victim.tag);
            }
        }
        assert_eq!(victims, vec![1, 2, 3]);
    }
}
