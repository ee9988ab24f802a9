use serde::Serialize;

/// Counters for a single run of one cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Stats {
    hits: u64,
    misses: u64,
    reads: u64,
    writes: u64,

    cold_misses: u64,
    evictions: u64,
    /// Dirty evictions. Each one is also counted in `writes`.
    write_backs: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub hits: u64,
    pub misses: u64,
    pub reads: u64,
    pub writes: u64,
    pub cold_misses: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

impl Snapshot {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// `None` before the first access.
    pub fn miss_ratio(&self) -> Option<f64> {
        match self.accesses() {
            0 => None,
            total => Some(self.misses as f64 / total as f64),
        }
    }
}

impl Stats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn cold_miss(&mut self) {
        self.cold_misses += 1;
    }

    pub fn eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn read(&mut self) {
        self.reads += 1;
    }

    pub fn write(&mut self) {
        self.writes += 1;
    }

    pub fn write_back(&mut self) {
        self.write_backs += 1;
        self.writes += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            hits: self.hits,
            misses: self.misses,
            reads: self.reads,
            writes: self.writes,
            cold_misses: self.cold_misses,
            evictions: self.evictions,
            write_backs: self.write_backs,
        }
    }

    pub fn miss_ratio(&self) -> Option<f64> {
        self.snapshot().miss_ratio()
    }

    pub fn reset(&mut self) {
        *self = Stats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_ratio_needs_accesses() {
        let mut stats = Stats::default();
        assert_eq!(stats.miss_ratio(), None);

        stats.hit();
        stats.miss();
        stats.miss();
        stats.miss();
        assert_eq!(stats.miss_ratio(), Some(0.75));
    }

    #[test]
    fn write_back_counts_as_write() {
        let mut stats = Stats::default();
        stats.write();
        stats.write_back();
        let snap = stats.snapshot();
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.write_backs, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = Stats::default();
        stats.hit();
        stats.read();
        stats.eviction();
        stats.reset();
        assert_eq!(stats.snapshot(), Snapshot::default());
    }
}
