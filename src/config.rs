use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    cache::{Cache, IsCache},
    replace::{fifo::Fifo, lru::Lru},
};

pub const BLOCK_SIZE: usize = 64;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("associativity must be at least 1")]
    ZeroWays,
    #[error("associativity {0} exceeds the supported maximum of {}", u16::MAX)]
    TooManyWays(usize),
    #[error("block size must be at least 1 byte")]
    ZeroBlockSize,
    #[error("cache size {cache_size} is not a multiple of {ways} ways x {block_size} byte blocks")]
    UnevenSize {
        cache_size: usize,
        ways: usize,
        block_size: usize,
    },
    #[error(
        "cache size {cache_size} holds no complete set of {ways} ways x {block_size} byte blocks"
    )]
    NoSets {
        cache_size: usize,
        ways: usize,
        block_size: usize,
    },
    #[error("unknown replacement policy code {0} (expected 0 = LRU or 1 = FIFO)")]
    ReplacementCode(u32),
    #[error("unknown write policy code {0} (expected 0 = write-through or 1 = write-back)")]
    WriteCode(u32),
    #[error("unknown policy name {0:?}")]
    PolicyName(String),
}

/// A policy as written in a config file: a name or its numeric code.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum PolicyRepr {
    Code(u32),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PolicyRepr")]
pub enum ReplacementPolicy {
    Lru,
    Fifo,
}

impl TryFrom<PolicyRepr> for ReplacementPolicy {
    type Error = ConfigError;

    fn try_from(repr: PolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            PolicyRepr::Code(code) => Self::from_code(code),
            PolicyRepr::Name(name) => match name.as_str() {
                "Lru" | "lru" | "LRU" => Ok(Self::Lru),
                "Fifo" | "fifo" | "FIFO" => Ok(Self::Fifo),
                _ => Err(ConfigError::PolicyName(name)),
            },
        }
    }
}

impl ReplacementPolicy {
    pub fn from_code(code: u32) -> Result<Self, ConfigError> {
        match code {
            0 => Ok(Self::Lru),
            1 => Ok(Self::Fifo),
            other => Err(ConfigError::ReplacementCode(other)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Lru => 0,
            Self::Fifo => 1,
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => write!(f, "LRU"),
            Self::Fifo => write!(f, "FIFO"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PolicyRepr")]
pub enum WritePolicy {
    WriteThrough,
    WriteBack,
}

impl TryFrom<PolicyRepr> for WritePolicy {
    type Error = ConfigError;

    fn try_from(repr: PolicyRepr) -> Result<Self, Self::Error> {
        match repr {
            PolicyRepr::Code(code) => Self::from_code(code),
            PolicyRepr::Name(name) => match name.as_str() {
                "WriteThrough" | "wt" | "write-through" => Ok(Self::WriteThrough),
                "WriteBack" | "wb" | "write-back" => Ok(Self::WriteBack),
                _ => Err(ConfigError::PolicyName(name)),
            },
        }
    }
}

impl WritePolicy {
    pub fn from_code(code: u32) -> Result<Self, ConfigError> {
        match code {
            0 => Ok(Self::WriteThrough),
            1 => Ok(Self::WriteBack),
            other => Err(ConfigError::WriteCode(other)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::WriteThrough => 0,
            Self::WriteBack => 1,
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WriteThrough => write!(f, "write-through"),
            Self::WriteBack => write!(f, "write-back"),
        }
    }
}

fn default_block_size() -> usize {
    BLOCK_SIZE
}

/// Geometry and policies of one simulated cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub name: String,
    pub cache_size: usize,
    pub ways: usize,
    pub repl: ReplacementPolicy,
    pub write: WritePolicy,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Round the set count down instead of rejecting sizes that do not divide evenly.
    #[serde(default, skip_serializing)]
    pub truncate: bool,
}

impl CacheConfig {
    pub fn new(
        cache_size: usize,
        ways: usize,
        repl: ReplacementPolicy,
        write: WritePolicy,
    ) -> Self {
        CacheConfig {
            name: format!("{cache_size}B {ways}-way {repl} {write}"),
            cache_size,
            ways,
            repl,
            write,
            block_size: BLOCK_SIZE,
            truncate: false,
        }
    }

    /// Builds a config from the numeric policy codes used on the command line.
    pub fn from_codes(
        cache_size: usize,
        ways: usize,
        repl_code: u32,
        write_code: u32,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            cache_size,
            ways,
            ReplacementPolicy::from_code(repl_code)?,
            WritePolicy::from_code(write_code)?,
        ))
    }

    pub fn n_sets(&self) -> Result<usize, ConfigError> {
        if self.ways == 0 {
            return Err(ConfigError::ZeroWays);
        }
        if self.ways > u16::MAX as usize {
            return Err(ConfigError::TooManyWays(self.ways));
        }
        if self.block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        let set_bytes = self
            .ways
            .checked_mul(self.block_size)
            .ok_or(ConfigError::TooManyWays(self.ways))?;
        if !self.truncate && self.cache_size % set_bytes != 0 {
            return Err(ConfigError::UnevenSize {
                cache_size: self.cache_size,
                ways: self.ways,
                block_size: self.block_size,
            });
        }
        match self.cache_size / set_bytes {
            0 => Err(ConfigError::NoSets {
                cache_size: self.cache_size,
                ways: self.ways,
                block_size: self.block_size,
            }),
            n_sets => Ok(n_sets),
        }
    }

    pub fn to_cache(&self) -> Result<Box<dyn IsCache>, ConfigError> {
        Ok(match self.repl {
            ReplacementPolicy::Lru => {
                Box::new(Cache::<Lru>::new(self.clone())?) as Box<dyn IsCache>
            }
            ReplacementPolicy::Fifo => {
                Box::new(Cache::<Fifo>::new(self.clone())?) as Box<dyn IsCache>
            }
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(flatten)]
    pub cache: CacheConfig,
    pub trace: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub runs: Vec<RunConfig>,
}
