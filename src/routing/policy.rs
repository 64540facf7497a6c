//! 路径选择策略
//!
//! 策略在启动时选定一次；选择器自身持有轮询计数器与随机数发生器，
//! 不使用全局状态。

use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::ecmp::Path;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "String", into = "String")]
pub enum RoutingPolicy {
    RoundRobin,
    Random,
    #[default]
    Hashed,
}

impl RoutingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingPolicy::RoundRobin => "round-robin",
            RoutingPolicy::Random => "random",
            RoutingPolicy::Hashed => "hashed",
        }
    }
}

impl fmt::Display for RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" | "rr" => Ok(RoutingPolicy::RoundRobin),
            "random" => Ok(RoutingPolicy::Random),
            "hashed" => Ok(RoutingPolicy::Hashed),
            other => Err(Error::Configuration(format!(
                "unknown routing policy `{other}` (expected round-robin, random or hashed)"
            ))),
        }
    }
}

impl TryFrom<String> for RoutingPolicy {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RoutingPolicy> for String {
    fn from(p: RoutingPolicy) -> String {
        p.as_str().to_string()
    }
}

/// 带状态的路径选择器
#[derive(Debug)]
pub enum PathSelector {
    RoundRobin { next: usize },
    Random { rng: StdRng },
    Hashed,
}

impl PathSelector {
    pub fn new(policy: RoutingPolicy) -> Self {
        match policy {
            RoutingPolicy::RoundRobin => PathSelector::RoundRobin { next: 0 },
            RoutingPolicy::Random => PathSelector::Random {
                rng: StdRng::from_entropy(),
            },
            RoutingPolicy::Hashed => PathSelector::Hashed,
        }
    }

    /// 随机策略使用固定种子，便于复现实验
    pub fn with_seed(policy: RoutingPolicy, seed: u64) -> Self {
        match policy {
            RoutingPolicy::Random => PathSelector::Random {
                rng: StdRng::seed_from_u64(seed),
            },
            other => PathSelector::new(other),
        }
    }

    pub fn policy(&self) -> RoutingPolicy {
        match self {
            PathSelector::RoundRobin { .. } => RoutingPolicy::RoundRobin,
            PathSelector::Random { .. } => RoutingPolicy::Random,
            PathSelector::Hashed => RoutingPolicy::Hashed,
        }
    }

    /// 从等长路径集合中选出一条；集合为空时返回 `None`。
    pub fn select<'a>(&mut self, paths: &'a [Path], flow_hash: u32) -> Option<&'a Path> {
        if paths.is_empty() {
            return None;
        }
        let n = paths.len();
        match self {
            PathSelector::RoundRobin { next } => {
                let path = &paths[*next % n];
                *next = next.wrapping_add(1);
                Some(path)
            }
            PathSelector::Random { rng } => paths.choose(rng),
            PathSelector::Hashed => {
                // 按节点名序列排序，使选择与扩展顺序无关
                let mut sorted: Vec<&Path> = paths.iter().collect();
                sorted.sort_by_cached_key(|p| p.iter().map(|n| n.name()).collect::<Vec<_>>());
                Some(sorted[flow_hash as usize % n])
            }
        }
    }
}
