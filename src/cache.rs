use std::{fmt, iter, marker::PhantomData};

use serde::Serialize;

use crate::{
    config::{CacheConfig, ConfigError, WritePolicy},
    replace::{AccessResult, Replace},
    set::Set,
    stats::{Snapshot, Stats},
    trace::Op,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub set: usize,
    pub tag: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    #[serde(flatten)]
    pub config: CacheConfig,
    pub n_sets: usize,
    #[serde(flatten)]
    pub counters: Snapshot,
    pub miss_rate: Option<f64>,
}

#[derive(Debug)]
pub struct Cache<R: Replace> {
    config: CacheConfig,
    pub sets: Vec<Set>,
    pub block_size: u64,
    pub n_ways: usize,
    pub n_sets: usize,
    stats: Stats,
    repl: PhantomData<R>,
}

impl<R: Replace> Cache<R> {
    pub fn new(config: CacheConfig) -> Result<Self, ConfigError> {
        debug_assert_eq!(config.repl, R::POLICY);
        let n_sets = config.n_sets()?;
        let n_ways = config.ways;
        log::debug!(
            "{}: {} sets x {} ways x {} byte blocks",
            config.name,
            n_sets,
            n_ways,
            config.block_size
        );

        Ok(Cache {
            sets: iter::repeat_with(|| Set::new(n_ways)).take(n_sets).collect(),
            block_size: config.block_size as u64,
            n_ways,
            n_sets,
            config,
            stats: Stats::default(),
            repl: PhantomData,
        })
    }
}

pub trait IsCache {
    fn access(&mut self, op: Op, address: u64) -> AccessResult;
    fn split_addr(&self, address: u64) -> Addr;
    fn config(&self) -> &CacheConfig;
    fn sets(&self) -> &[Set];
    fn stats(&self) -> Snapshot;
    fn clear_stats(&mut self);
    /// Empties every set and clears the counters.
    fn reset(&mut self);
    fn make_stats(&self) -> CacheStats;
}

impl<R: Replace> IsCache for Cache<R> {
    fn access(&mut self, op: Op, address: u64) -> AccessResult {
        let addr = self.split_addr(address);
        let set = &mut self.sets[addr.set];
        let result = R::access(set, addr.tag);

        match result {
            AccessResult::Hit { way } => {
                self.stats.hit();
                if op == Op::Write {
                    match self.config.write {
                        WritePolicy::WriteThrough => self.stats.write(),
                        WritePolicy::WriteBack => set.mark_dirty(way),
                    }
                }
            }
            AccessResult::Miss { evicted, .. } => {
                self.stats.miss();
                // write-allocate: the write goes to memory, then the block is read in
                if op == Op::Write {
                    self.stats.write();
                }
                self.stats.read();
                match evicted {
                    None => self.stats.cold_miss(),
                    Some(victim) => {
                        self.stats.eviction();
                        if self.config.write == WritePolicy::WriteBack && victim.dirty {
                            self.stats.write_back();
                        }
                    }
                }
            }
        }
        log::trace!("{op} {address:#x} -> set {} tag {:#x}: {result:?}", addr.set, addr.tag);
        result
    }

    fn split_addr(&self, address: u64) -> Addr {
        // the set index is folded from every bit above the block offset
        let tag = address / self.block_size;
        let set = (tag % self.n_sets as u64) as usize;
        Addr { set, tag }
    }

    fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn sets(&self) -> &[Set] {
        &self.sets
    }

    fn stats(&self) -> Snapshot {
        self.stats.snapshot()
    }

    fn clear_stats(&mut self) {
        self.stats.reset();
    }

    fn reset(&mut self) {
        self.sets.iter_mut().for_each(Set::clear);
        self.stats.reset();
    }

    fn make_stats(&self) -> CacheStats {
        let counters = self.stats.snapshot();
        CacheStats {
            config: self.config.clone(),
            n_sets: self.n_sets,
            miss_rate: counters.miss_ratio(),
            counters,
        }
    }
}

impl fmt::Display for dyn IsCache + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.config().name)?;
        for (idx, set) in self.sets().iter().enumerate() {
            writeln!(f, "\tset {idx}: {set}")?;
        }
        Ok(())
    }
}
