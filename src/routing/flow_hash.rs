//! 五元组哈希
//!
//! 对 {srcIP, dstIP, 协议, 源端口, 目的端口} 按定长整数打包后计算 CRC-32。
//! 布局为 u64 u64 u16 u16 u16（小端，共 22 字节），与 64 位 Linux 上
//! 原生 `LLHHH` 打包一致，同一五元组在两套控制器上选出同一条路径。
//! 非 IPv4 或非 TCP/UDP 报文统一映射为 `UNHASHED`。

use std::net::Ipv4Addr;

use byteorder::{ByteOrder, LittleEndian};

/// 打包后的哈希输入长度
pub const FLOW_KEY_LEN: usize = 22;

/// 无法提取五元组时的固定哈希值，总是选中下标 0
pub const UNHASHED: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: Ipv4Addr,
    pub dst_ip: Ipv4Addr,
    pub protocol: u8,
    pub src_port: u16,
    pub dst_port: u16,
}

impl FlowKey {
    pub fn to_bytes(&self) -> [u8; FLOW_KEY_LEN] {
        let mut buf = [0u8; FLOW_KEY_LEN];
        LittleEndian::write_u64(&mut buf[0..8], u64::from(u32::from(self.src_ip)));
        LittleEndian::write_u64(&mut buf[8..16], u64::from(u32::from(self.dst_ip)));
        LittleEndian::write_u16(&mut buf[16..18], u16::from(self.protocol));
        LittleEndian::write_u16(&mut buf[18..20], self.src_port);
        LittleEndian::write_u16(&mut buf[20..22], self.dst_port);
        buf
    }

    pub fn hash(&self) -> u32 {
        crc32fast::hash(&self.to_bytes())
    }
}

pub fn flow_hash(key: Option<&FlowKey>) -> u32 {
    key.map_or(UNHASHED, FlowKey::hash)
}
