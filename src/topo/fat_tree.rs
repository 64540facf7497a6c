//! Fat-tree 拓扑构建
//!
//! 拓扑由参数 k 一次性构建，之后只读，可被路由与控制器共享。

use std::collections::HashMap;

use tracing::debug;

use super::addr::{Layer, NodeAddress};
use super::port::{self, LinkPorts};
use crate::error::{Error, Result};

/// 地址每个字段只有一个字节，核心交换机的 pod 字段等于 k。
pub const MAX_K: usize = 254;

#[derive(Debug, Clone)]
pub struct FatTreeOpts {
    pub k: usize,
    pub link_gbps: f64,
}

impl Default for FatTreeOpts {
    fn default() -> Self {
        Self {
            k: 4,
            link_gbps: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FatTreeTopology {
    k: usize,
    link_gbps: f64,
    nodes: Vec<NodeAddress>,
    layers: Vec<Layer>,
    index: HashMap<NodeAddress, usize>,
    adj: Vec<Vec<usize>>,
    /// 每层节点，按构建顺序
    by_layer: [Vec<NodeAddress>; 4],
}

impl FatTreeTopology {
    pub fn build(opts: &FatTreeOpts) -> Result<Self> {
        let k = opts.k;
        if k < 2 || k % 2 != 0 || k > MAX_K {
            return Err(Error::Configuration(format!(
                "fat-tree k must be even and within 2..={MAX_K}, got {k}"
            )));
        }
        if !(opts.link_gbps > 0.0) {
            return Err(Error::Configuration(format!(
                "link speed must be positive, got {}",
                opts.link_gbps
            )));
        }

        let mut topo = Self {
            k,
            link_gbps: opts.link_gbps,
            nodes: Vec::new(),
            layers: Vec::new(),
            index: HashMap::new(),
            adj: Vec::new(),
            by_layer: Default::default(),
        };

        let pods = k as u8;
        let half = (k / 2) as u8;

        for pod in 0..pods {
            for edge in 0..half {
                let edge_id = NodeAddress::new(pod, edge, 1);
                topo.add_node(edge_id, Layer::Edge);

                for host in 2..half + 2 {
                    let host_id = NodeAddress::new(pod, edge, host);
                    topo.add_node(host_id, Layer::Host);
                    topo.connect(host_id, edge_id);
                }

                for agg in half..pods {
                    let agg_id = NodeAddress::new(pod, agg, 1);
                    topo.add_node(agg_id, Layer::Agg);
                    topo.connect(edge_id, agg_id);
                }
            }

            // 第 a 个汇聚交换机连接第 (a - k/2 + 1) 列的全部核心交换机
            for agg in half..pods {
                let agg_id = NodeAddress::new(pod, agg, 1);
                let column = agg - half + 1;
                for index in 1..=half {
                    let core_id = NodeAddress::new(pods, column, index);
                    topo.add_node(core_id, Layer::Core);
                    topo.connect(core_id, agg_id);
                }
            }
        }

        debug!(
            k,
            hosts = topo.hosts().len(),
            switches = topo.switch_count(),
            links = topo.links().count(),
            "fat-tree 构建完成"
        );
        Ok(topo)
    }

    fn add_node(&mut self, addr: NodeAddress, layer: Layer) -> usize {
        if let Some(&idx) = self.index.get(&addr) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(addr);
        self.layers.push(layer);
        self.adj.push(Vec::new());
        self.index.insert(addr, idx);
        self.by_layer[layer.index()].push(addr);
        idx
    }

    fn connect(&mut self, a: NodeAddress, b: NodeAddress) {
        let (ia, ib) = (self.index[&a], self.index[&b]);
        debug_assert_eq!(
            self.layers[ia].index().abs_diff(self.layers[ib].index()),
            1,
            "links must join adjacent layers: {a} - {b}"
        );
        self.adj[ia].push(ib);
        self.adj[ib].push(ia);
    }

    pub fn k(&self) -> usize {
        self.k
    }

    fn half(&self) -> usize {
        self.k / 2
    }

    pub fn link_gbps(&self) -> f64 {
        self.link_gbps
    }

    /// 第 `pod` 个 pod、第 `edge` 个边缘交换机下的第 `host` 台主机（均从 0 计）
    pub fn host(&self, pod: usize, edge: usize, host: usize) -> NodeAddress {
        NodeAddress::new(pod as u8, edge as u8, (host + 2) as u8)
    }

    pub fn edge(&self, pod: usize, edge: usize) -> NodeAddress {
        NodeAddress::new(pod as u8, edge as u8, 1)
    }

    pub fn agg(&self, pod: usize, agg: usize) -> NodeAddress {
        NodeAddress::new(pod as u8, (self.half() + agg) as u8, 1)
    }

    pub fn core(&self, group: usize, index: usize) -> NodeAddress {
        NodeAddress::new(self.k as u8, (group + 1) as u8, (index + 1) as u8)
    }

    pub fn contains(&self, node: NodeAddress) -> bool {
        self.index.contains_key(&node)
    }

    pub fn layer(&self, node: NodeAddress) -> Option<Layer> {
        self.index.get(&node).map(|&i| self.layers[i])
    }

    pub fn is_switch(&self, node: NodeAddress) -> bool {
        self.layer(node).is_some_and(|l| l != Layer::Host)
    }

    pub fn layer_nodes(&self, layer: Layer) -> &[NodeAddress] {
        &self.by_layer[layer.index()]
    }

    /// 全部主机，按构建顺序（即流量矩阵中的主机下标）
    pub fn hosts(&self) -> &[NodeAddress] {
        self.layer_nodes(Layer::Host)
    }

    pub fn host_at(&self, index: usize) -> Option<NodeAddress> {
        self.hosts().get(index).copied()
    }

    pub fn switches(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        [Layer::Core, Layer::Agg, Layer::Edge]
            .into_iter()
            .flat_map(move |l| self.layer_nodes(l).iter().copied())
    }

    pub fn switch_count(&self) -> usize {
        self.nodes.len() - self.hosts().len()
    }

    pub fn neighbors_up(&self, node: NodeAddress) -> impl Iterator<Item = NodeAddress> + '_ {
        self.neighbors_toward(node, Layer::up)
    }

    pub fn neighbors_down(&self, node: NodeAddress) -> impl Iterator<Item = NodeAddress> + '_ {
        self.neighbors_toward(node, Layer::down)
    }

    /// 所有相邻节点（不区分方向）
    pub fn neighbors(&self, node: NodeAddress) -> impl Iterator<Item = NodeAddress> + '_ {
        let adj: &[usize] = match self.index.get(&node) {
            Some(&i) => self.adj[i].as_slice(),
            None => &[],
        };
        adj.iter().map(move |&j| self.nodes[j])
    }

    fn neighbors_toward(
        &self,
        node: NodeAddress,
        step: fn(Layer) -> Option<Layer>,
    ) -> impl Iterator<Item = NodeAddress> + '_ {
        let (adj, want): (&[usize], Option<Layer>) = match self.index.get(&node) {
            Some(&i) => (self.adj[i].as_slice(), step(self.layers[i])),
            None => (&[], None),
        };
        adj.iter()
            .filter(move |&&j| Some(self.layers[j]) == want)
            .map(move |&j| self.nodes[j])
    }

    /// 无向链路列表，每条链路出现一次
    pub fn links(&self) -> impl Iterator<Item = (NodeAddress, NodeAddress)> + '_ {
        self.adj.iter().enumerate().flat_map(move |(i, nbrs)| {
            nbrs.iter()
                .filter(move |&&j| i < j)
                .map(move |&j| (self.nodes[i], self.nodes[j]))
        })
    }

    /// 主机所连的边缘交换机及其在交换机侧的端口
    pub fn attachment(&self, host: NodeAddress) -> Result<(NodeAddress, u16)> {
        if self.layer(host) != Some(Layer::Host) {
            return Err(Error::UnknownNode(host));
        }
        let edge = self
            .neighbors_up(host)
            .next()
            .ok_or(Error::UnknownNode(host))?;
        Ok((edge, self.port(edge, host)?.src))
    }

    /// `from -> to` 链路两端的端口
    pub fn port(&self, from: NodeAddress, to: NodeAddress) -> Result<LinkPorts> {
        let from_layer = self.layer(from).ok_or(Error::UnknownNode(from))?;
        let to_layer = self.layer(to).ok_or(Error::UnknownNode(to))?;
        port::link_ports(self.half() as u8, from_layer, from, to_layer, to)
    }
}
