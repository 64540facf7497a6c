//! 等价多路径（ECMP）路径发现
//!
//! 从 src 与 dst 两端同时逐层向上扩展前沿，两侧前沿第一次相遇的那一轮
//! 就是最近公共祖先所在层，此时得到的全部路径等长且最短，立即返回。

use std::collections::BTreeMap;

use tracing::trace;

use super::policy::PathSelector;
use crate::error::{Error, Result};
use crate::topo::{FatTreeTopology, NodeAddress};

/// 节点序列，首尾分别为 src 与 dst
pub type Path = Vec<NodeAddress>;

/// 前沿：节点 -> 从起点到该节点的部分路径
type Frontier = BTreeMap<NodeAddress, Vec<Path>>;

/// 返回 src 到 dst 的全部最短 valley-free 路径。
///
/// 路径顺序为扩展顺序，不保证规范排序。
pub fn find_all_paths(
    topo: &FatTreeTopology,
    src: NodeAddress,
    dst: NodeAddress,
) -> Result<Vec<Path>> {
    let src_layer = topo.layer(src).ok_or(Error::UnknownNode(src))?.index();
    let dst_layer = topo.layer(dst).ok_or(Error::UnknownNode(dst))?.index();

    if src == dst {
        return Ok(vec![vec![src]]);
    }

    let mut walk = Walk {
        from_src: Frontier::from([(src, vec![vec![src]])]),
        from_dst: Frontier::from([(dst, vec![vec![dst]])]),
        src_layer,
        dst_layer,
    };

    for depth in (0..src_layer.max(dst_layer)).rev() {
        let routes = walk.expand(topo, depth);
        if !routes.is_empty() {
            trace!(%src, %dst, depth, paths = routes.len(), "找到 ECMP 路径");
            return Ok(routes);
        }
    }

    Err(Error::NoPath { src, dst })
}

/// 找出全部最短路径后按 `selector` 的策略选出一条。
pub fn find_paths(
    topo: &FatTreeTopology,
    src: NodeAddress,
    dst: NodeAddress,
    selector: &mut PathSelector,
    flow_hash: u32,
) -> Result<Path> {
    let paths = find_all_paths(topo, src, dst)?;
    selector
        .select(&paths, flow_hash)
        .cloned()
        .ok_or(Error::NoPath { src, dst })
}

struct Walk {
    from_src: Frontier,
    from_dst: Frontier,
    src_layer: usize,
    dst_layer: usize,
}

impl Walk {
    /// 把仍低于 `depth` 的一侧前沿向上推进一层，返回本轮拼接出的完整路径。
    fn expand(&mut self, topo: &FatTreeTopology, depth: usize) -> Vec<Path> {
        let mut routes = Vec::new();

        if self.src_layer > depth {
            self.from_src = advance(topo, &self.from_src, &self.from_dst, Side::Src, &mut routes);
            self.src_layer -= 1;
        }
        if self.dst_layer > depth {
            self.from_dst = advance(topo, &self.from_dst, &self.from_src, Side::Dst, &mut routes);
            self.dst_layer -= 1;
        }

        routes
    }
}

#[derive(Clone, Copy)]
enum Side {
    Src,
    Dst,
}

fn advance(
    topo: &FatTreeTopology,
    frontier: &Frontier,
    other: &Frontier,
    side: Side,
    routes: &mut Vec<Path>,
) -> Frontier {
    let mut next = Frontier::new();

    for (&node, paths) in frontier {
        for up in topo.neighbors_up(node) {
            match other.get(&up) {
                Some(met) => {
                    for mine in paths {
                        for theirs in met {
                            let route = match side {
                                Side::Src => splice(mine, theirs),
                                Side::Dst => splice(theirs, mine),
                            };
                            routes.push(route);
                        }
                    }
                }
                None => {
                    let slot = next.entry(up).or_default();
                    for p in paths {
                        let mut extended = p.clone();
                        extended.push(up);
                        slot.push(extended);
                    }
                }
            }
        }
    }

    next
}

/// src 侧部分路径接上反转后的 dst 侧部分路径
fn splice(src_part: &[NodeAddress], dst_part: &[NodeAddress]) -> Path {
    src_part
        .iter()
        .chain(dst_part.iter().rev())
        .copied()
        .collect()
}
