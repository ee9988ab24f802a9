use std::{collections::VecDeque, fmt};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub valid: bool,
    pub tag: u64,
    /// Only meaningful under write-back.
    pub dirty: bool,
}

/// One set of a set-associative cache.
///
/// Blocks live in a fixed arena of `capacity` ways. Their order is kept
/// separately as a queue of way indices: the front is the newest end, the
/// back is the oldest end and holds the eviction candidate.
#[derive(Debug)]
pub struct Set {
    blocks: Vec<Block>,
    order: VecDeque<u16>,
}

impl Set {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0 && capacity <= u16::MAX as usize);
        Set {
            blocks: vec![Block::default(); capacity],
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Finds the way holding `tag`.
    pub fn lookup(&self, tag: u64) -> Option<usize> {
        self.blocks.iter().position(|b| b.valid && b.tag == tag)
    }

    pub fn block(&self, way: usize) -> &Block {
        &self.blocks[way]
    }

    pub fn mark_dirty(&mut self, way: usize) {
        debug_assert!(self.blocks[way].valid);
        self.blocks[way].dirty = true;
    }

    /// Moves a resident way to the newest end.
    pub fn promote(&mut self, way: usize) {
        let pos = self
            .order
            .iter()
            .position(|&w| w as usize == way)
            .expect("promoted way is not resident");
        if pos != 0 {
            self.order.remove(pos);
            self.order.push_front(way as u16);
        }
    }

    /// Places a clean block for `tag` at the newest end.
    ///
    /// The set must have a free way and must not already hold `tag`.
    pub fn insert(&mut self, tag: u64) -> usize {
        debug_assert!(self.lookup(tag).is_none(), "duplicate tag {tag:#x}");
        let (way, block) = self
            .blocks
            .iter_mut()
            .enumerate()
            .find(|(_way, b)| !b.valid)
            .expect("insert into a full set");
        *block = Block {
            valid: true,
            tag,
            dirty: false,
        };
        self.order.push_front(way as u16);
        debug_assert!(self.len() <= self.capacity());
        way
    }

    /// Removes the block at the oldest end, leaving its way free.
    pub fn evict_oldest(&mut self) -> Option<Block> {
        let way = self.order.pop_back()? as usize;
        Some(std::mem::take(&mut self.blocks[way]))
    }

    /// Resident tags from the oldest end to the newest end.
    pub fn tags_oldest_first(&self) -> impl Iterator<Item = u64> + '_ {
        self.order
            .iter()
            .rev()
            .map(|&way| self.blocks[way as usize].tag)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.blocks.fill(Block::default());
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[size {}/{}] oldest ->", self.len(), self.capacity())?;
        for tag in self.tags_oldest_first() {
            write!(f, " {tag:x}")?;
        }
        for _ in self.len()..self.capacity() {
            write!(f, " -")?;
        }
        write!(f, " <- newest")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_fills_newest_end() {
        let mut set = Set::new(3);
        set.insert(7);
        set.insert(8);
        set.insert(9);
        assert!(set.is_full());
        assert_eq!(set.tags_oldest_first().collect::<Vec<_>>(), vec![7, 8, 9]);
    }

    #[test]
    fn promote_from_middle() {
        let mut set = Set::new(3);
        let middle = {
            set.insert(1);
            let way = set.insert(2);
            set.insert(3);
            way
        };
        set.promote(middle);
        assert_eq!(set.tags_oldest_first().collect::<Vec<_>>(), vec![1, 3, 2]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn evict_frees_way_for_reuse() {
        let mut set = Set::new(2);
        let first = set.insert(10);
        set.mark_dirty(first);
        set.insert(11);

        let victim = set.evict_oldest().unwrap();
        assert_eq!(victim.tag, 10);
        assert!(victim.dirty);
        assert_eq!(set.lookup(10), None);

        // reuses the freed way and starts clean
        let way = set.insert(12);
        assert_eq!(way, first);
        assert!(!set.block(way).dirty);
        assert_eq!(set.tags_oldest_first().collect::<Vec<_>>(), vec![11, 12]);
    }

    #[test]
    fn evict_empty_set() {
        let mut set = Set::new(4);
        assert_eq!(set.evict_oldest(), None);
    }

    #[test]
    fn lookup_ignores_invalid_ways() {
        // tag 0 matches the default block contents
        let set = Set::new(2);
        assert_eq!(set.lookup(0), None);
    }

    #[test]
    fn display_lists_oldest_first() {
        let mut set = Set::new(3);
        set.insert(0xa);
        set.insert(0xb);
        assert_eq!(set.to_string(), "[size 2/3] oldest -> a b - <- newest");
    }
}
