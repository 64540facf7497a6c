//! 链路端口推导
//!
//! 端口号不存储，而是由 (层级对, 两端地址) 纯函数计算得到。
//! 两端各自按自己的公式计算，结果与拓扑构建方式一致。

use super::addr::{Layer, NodeAddress};
use crate::error::{Error, Result};

/// 主机侧网卡端口
pub const HOST_PORT: u16 = 0;

/// 一条有向链路两端的端口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkPorts {
    /// `from` 节点上通往 `to` 的端口
    pub src: u16,
    /// `to` 节点上接收该链路的端口
    pub dst: u16,
}

/// 交换机上朝上的端口为奇数，朝下的端口为偶数。
pub fn is_up_port(port: u16) -> bool {
    port % 2 == 1
}

/// 计算 `from -> to` 链路两端的端口号。
///
/// `half` 为 k/2。不在端口表中的层级对，或计算结果为负，返回 `Error::NoPort`。
pub fn link_ports(
    half: u8,
    from_layer: Layer,
    from: NodeAddress,
    to_layer: Layer,
    to: NodeAddress,
) -> Result<LinkPorts> {
    let half = i32::from(half);
    let (s, d) = (fields(from), fields(to));

    let raw = match (from_layer, to_layer) {
        (Layer::Host, Layer::Edge) => (0, (s.host - 2) * 2 + 1),
        (Layer::Edge, Layer::Core) => ((d.switch - 2) * 2, s.pod),
        (Layer::Edge, Layer::Agg) => ((d.switch - half) * 2, s.switch * 2 + 1),
        (Layer::Agg, Layer::Core) => ((d.host - 1) * 2, s.pod),
        (Layer::Core, Layer::Agg) => (d.pod, (s.host - 1) * 2),
        (Layer::Agg, Layer::Edge) => (d.switch * 2 + 1, (s.switch - half) * 2),
        (Layer::Core, Layer::Edge) => (d.pod, (s.switch - 2) * 2),
        (Layer::Edge, Layer::Host) => ((d.host - 2) * 2 + 1, 0),
        _ => return Err(Error::NoPort { from, to }),
    };

    let no_port = || Error::NoPort { from, to };
    Ok(LinkPorts {
        src: offset(from_layer, raw.0).ok_or_else(no_port)?,
        dst: offset(to_layer, raw.1).ok_or_else(no_port)?,
    })
}

struct Fields {
    pod: i32,
    switch: i32,
    host: i32,
}

fn fields(a: NodeAddress) -> Fields {
    Fields {
        pod: i32::from(a.pod),
        switch: i32::from(a.switch),
        host: i32::from(a.host),
    }
}

// 交换机端口从 1 开始编号，主机侧固定为 0
fn offset(layer: Layer, raw: i32) -> Option<u16> {
    if raw < 0 {
        return None;
    }
    let port = if layer == Layer::Host { raw } else { raw + 1 };
    u16::try_from(port).ok()
}
