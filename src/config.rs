//! 配置
//!
//! 控制器启动参数与流量矩阵，均为 JSON。配置错误在启动阶段返回，
//! 控制器不会在错误配置下接受任何会话。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ctl::{IDLE_TIMEOUT, MISS_SEND_LEN};
use crate::error::{Error, Result};
use crate::routing::{PathSelector, RoutingPolicy};
use crate::topo::fat_tree::MAX_K;
use crate::topo::{FatTreeOpts, FatTreeTopology, NodeAddress};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_link_gbps")]
    pub link_gbps: f64,
    #[serde(default)]
    pub routing: RoutingPolicy,
    /// 随机策略的种子；缺省时取系统熵
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u16,
    #[serde(default = "default_miss_send_len")]
    pub miss_send_len: u16,
}

fn default_k() -> usize {
    4
}

fn default_link_gbps() -> f64 {
    1.0
}

fn default_idle_timeout() -> u16 {
    IDLE_TIMEOUT
}

fn default_miss_send_len() -> u16 {
    MISS_SEND_LEN
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            link_gbps: default_link_gbps(),
            routing: RoutingPolicy::default(),
            seed: None,
            idle_timeout: default_idle_timeout(),
            miss_send_len: default_miss_send_len(),
        }
    }
}

/// 命令行对配置文件的覆盖项，`None` 表示沿用文件或默认值
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub k: Option<usize>,
    pub routing: Option<String>,
    pub seed: Option<u64>,
}

impl ControllerConfig {
    /// 读取配置文件（缺省时用默认配置），应用覆盖项后统一校验。
    pub fn resolve(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        cfg.apply(overrides)?;
        Ok(cfg)
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(k) = overrides.k {
            self.k = k;
        }
        if let Some(routing) = &overrides.routing {
            self.routing = routing.parse()?;
        }
        if overrides.seed.is_some() {
            self.seed = overrides.seed;
        }
        self.validate()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(raw).map_err(|e| Error::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k < 2 || self.k % 2 != 0 || self.k > MAX_K {
            return Err(Error::Configuration(format!(
                "k must be even and within 2..={MAX_K}, got {}",
                self.k
            )));
        }
        if !(self.link_gbps > 0.0) {
            return Err(Error::Configuration(format!(
                "link_gbps must be positive, got {}",
                self.link_gbps
            )));
        }
        if self.idle_timeout == 0 {
            return Err(Error::Configuration(
                "idle_timeout of 0 would make entries permanent".to_string(),
            ));
        }
        Ok(())
    }

    pub fn topology_opts(&self) -> FatTreeOpts {
        FatTreeOpts {
            k: self.k,
            link_gbps: self.link_gbps,
        }
    }

    pub fn selector(&self) -> PathSelector {
        match self.seed {
            Some(seed) => PathSelector::with_seed(self.routing, seed),
            None => PathSelector::new(self.routing),
        }
    }
}

/// 流量矩阵：源主机下标（字符串）-> 仅含一个目的主机下标的列表。
///
/// 下标对应拓扑构建时的主机顺序。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FlowMatrix(pub BTreeMap<String, Vec<usize>>);

impl FlowMatrix {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// 按源下标升序返回 (源下标, 目的下标)
    pub fn flows(&self) -> Result<Vec<(usize, usize)>> {
        let mut flows = Vec::with_capacity(self.0.len());
        for (src, dsts) in &self.0 {
            let src_idx: usize = src.parse().map_err(|_| {
                Error::Configuration(format!("flow matrix key `{src}` is not a host index"))
            })?;
            let [dst_idx] = dsts.as_slice() else {
                return Err(Error::Configuration(format!(
                    "flow matrix entry `{src}` must list exactly one destination, got {}",
                    dsts.len()
                )));
            };
            flows.push((src_idx, *dst_idx));
        }
        flows.sort_unstable();
        Ok(flows)
    }

    /// 把下标映射为拓扑中的主机地址
    pub fn host_pairs(&self, topo: &FatTreeTopology) -> Result<Vec<(NodeAddress, NodeAddress)>> {
        let lookup = |idx: usize| {
            topo.host_at(idx).ok_or_else(|| {
                Error::Configuration(format!(
                    "host index {idx} out of range (topology has {} hosts)",
                    topo.hosts().len()
                ))
            })
        };
        self.flows()?
            .into_iter()
            .map(|(s, d)| Ok((lookup(s)?, lookup(d)?)))
            .collect()
    }
}
