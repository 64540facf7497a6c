//! 控制器下发给交换机的消息
//!
//! 这里只描述消息内容，线上编解码由会话适配层负责。

use std::net::Ipv4Addr;

use super::packet::PacketHeaders;
use crate::topo::MacAddr;

/// 交换机上送 packet-in 时携带的最大字节数
pub const MISS_SEND_LEN: u16 = 2000;
/// 流表项空闲超时（秒）
pub const IDLE_TIMEOUT: u16 = 10;
pub const DEFAULT_PRIORITY: u16 = 0x8000;

/// 流表匹配条件，`None` 表示通配
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FlowMatch {
    pub in_port: Option<u16>,
    pub dl_src: Option<MacAddr>,
    pub dl_dst: Option<MacAddr>,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub dl_type: Option<u16>,
    pub nw_tos: Option<u8>,
    pub nw_proto: Option<u8>,
    pub nw_src: Option<Ipv4Addr>,
    pub nw_dst: Option<Ipv4Addr>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl FlowMatch {
    /// 报文头的精确匹配投影。入端口保持通配，使同一匹配可用于路径上的每一跳。
    pub fn from_headers(hdr: &PacketHeaders) -> Self {
        FlowMatch {
            in_port: None,
            dl_src: Some(hdr.dl_src),
            dl_dst: Some(hdr.dl_dst),
            dl_vlan: hdr.dl_vlan,
            dl_vlan_pcp: hdr.dl_vlan_pcp,
            dl_type: Some(hdr.dl_type),
            nw_tos: hdr.nw_tos,
            nw_proto: hdr.nw_proto,
            nw_src: hdr.nw_src,
            nw_dst: hdr.nw_dst,
            tp_src: hdr.tp_src,
            tp_dst: hdr.tp_dst,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub r#match: FlowMatch,
    /// 动作列表只含一个 output(port)
    pub out_port: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    SetConfig { miss_send_len: u16 },
    /// 携带完整原始帧，不引用交换机缓冲区
    PacketOut { out_port: u16, data: Vec<u8> },
    FlowMod(FlowMod),
}

impl ControlMessage {
    pub fn packet_out(out_port: u16, data: &[u8]) -> Self {
        ControlMessage::PacketOut {
            out_port,
            data: data.to_vec(),
        }
    }
}
