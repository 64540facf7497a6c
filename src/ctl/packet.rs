//! 报文头解析
//!
//! 从原始以太网帧中解析 Ethernet / 802.1Q / IPv4 / ARP / TCP / UDP / ICMP
//! 头部字段，供 MAC 学习、流表匹配与五元组哈希使用。

use std::net::Ipv4Addr;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, Result};
use crate::routing::FlowKey;
use crate::topo::{MacAddr, NodeAddress};

pub const ETH_TYPE_IPV4: u16 = 0x0800;
pub const ETH_TYPE_ARP: u16 = 0x0806;
pub const ETH_TYPE_VLAN: u16 = 0x8100;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const ARP_IPV4_LEN: usize = 28;
const UDP_HEADER_LEN: usize = 8;
const TCP_HEADER_LEN: usize = 20;

/// 解析后的报文头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeaders {
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_pcp: Option<u8>,
    pub dl_type: u16,
    pub nw_tos: Option<u8>,
    /// IPv4 为协议号，ARP 为 opcode 低 8 位
    pub nw_proto: Option<u8>,
    pub nw_src: Option<Ipv4Addr>,
    pub nw_dst: Option<Ipv4Addr>,
    /// TCP/UDP 为端口，ICMP 为 type/code
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl PacketHeaders {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < ETH_HEADER_LEN {
            return Err(Error::MalformedPacket("truncated ethernet header"));
        }

        let mut hdr = PacketHeaders {
            dl_dst: MacAddr::from_slice(&data[0..6]).ok_or(Error::MalformedPacket("bad dst mac"))?,
            dl_src: MacAddr::from_slice(&data[6..12]).ok_or(Error::MalformedPacket("bad src mac"))?,
            dl_vlan: None,
            dl_vlan_pcp: None,
            dl_type: BigEndian::read_u16(&data[12..14]),
            nw_tos: None,
            nw_proto: None,
            nw_src: None,
            nw_dst: None,
            tp_src: None,
            tp_dst: None,
        };

        let mut off = ETH_HEADER_LEN;
        if hdr.dl_type == ETH_TYPE_VLAN {
            if data.len() < off + VLAN_TAG_LEN {
                return Err(Error::MalformedPacket("truncated vlan tag"));
            }
            let tci = BigEndian::read_u16(&data[off..off + 2]);
            hdr.dl_vlan = Some(tci & 0x0fff);
            hdr.dl_vlan_pcp = Some((tci >> 13) as u8);
            hdr.dl_type = BigEndian::read_u16(&data[off + 2..off + 4]);
            off += VLAN_TAG_LEN;
        }

        match hdr.dl_type {
            ETH_TYPE_IPV4 => hdr.parse_ipv4(&data[off..])?,
            ETH_TYPE_ARP => hdr.parse_arp(&data[off..])?,
            _ => {}
        }
        Ok(hdr)
    }

    fn parse_ipv4(&mut self, ip: &[u8]) -> Result<()> {
        if ip.len() < IPV4_MIN_HEADER_LEN {
            return Err(Error::MalformedPacket("truncated ipv4 header"));
        }
        let ihl = usize::from(ip[0] & 0x0f) * 4;
        if ihl < IPV4_MIN_HEADER_LEN || ip.len() < ihl {
            return Err(Error::MalformedPacket("bad ipv4 header length"));
        }

        let proto = ip[9];
        self.nw_tos = Some(ip[1]);
        self.nw_proto = Some(proto);
        self.nw_src = Some(read_ipv4(&ip[12..16]));
        self.nw_dst = Some(read_ipv4(&ip[16..20]));

        // 非首个分片不含传输层头
        let frag_offset = BigEndian::read_u16(&ip[6..8]) & 0x1fff;
        if frag_offset != 0 {
            return Ok(());
        }

        let l4 = &ip[ihl..];
        match proto {
            IP_PROTO_TCP | IP_PROTO_UDP if l4.len() >= 4 => {
                self.tp_src = Some(BigEndian::read_u16(&l4[0..2]));
                self.tp_dst = Some(BigEndian::read_u16(&l4[2..4]));
            }
            IP_PROTO_ICMP if l4.len() >= 2 => {
                self.tp_src = Some(u16::from(l4[0]));
                self.tp_dst = Some(u16::from(l4[1]));
            }
            _ => {}
        }
        Ok(())
    }

    fn parse_arp(&mut self, arp: &[u8]) -> Result<()> {
        if arp.len() < ARP_IPV4_LEN {
            return Err(Error::MalformedPacket("truncated arp payload"));
        }
        self.nw_proto = Some((BigEndian::read_u16(&arp[6..8]) & 0xff) as u8);
        self.nw_src = Some(read_ipv4(&arp[14..18]));
        self.nw_dst = Some(read_ipv4(&arp[24..28]));
        Ok(())
    }

    /// IPv4 且为 TCP/UDP 时的五元组
    pub fn flow_key(&self) -> Option<FlowKey> {
        if self.dl_type != ETH_TYPE_IPV4 {
            return None;
        }
        let protocol = self.nw_proto?;
        if protocol != IP_PROTO_TCP && protocol != IP_PROTO_UDP {
            return None;
        }
        Some(FlowKey {
            src_ip: self.nw_src?,
            dst_ip: self.nw_dst?,
            protocol,
            src_port: self.tp_src?,
            dst_port: self.tp_dst?,
        })
    }
}

fn read_ipv4(b: &[u8]) -> Ipv4Addr {
    Ipv4Addr::from(BigEndian::read_u32(b))
}

/// 构造主机 `src` 发往主机 `dst` 的 UDP 帧
pub fn udp_frame(
    src: NodeAddress,
    dst: NodeAddress,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    ipv4_frame(src, dst, IP_PROTO_UDP, src_port, dst_port, payload)
}

/// 构造主机 `src` 发往主机 `dst` 的 TCP 帧（仅 SYN 头部）
pub fn tcp_frame(
    src: NodeAddress,
    dst: NodeAddress,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    ipv4_frame(src, dst, IP_PROTO_TCP, src_port, dst_port, payload)
}

fn ipv4_frame(
    src: NodeAddress,
    dst: NodeAddress,
    protocol: u8,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let l4_len = match protocol {
        IP_PROTO_TCP => TCP_HEADER_LEN,
        IP_PROTO_UDP => UDP_HEADER_LEN,
        _ => 0,
    };
    let ip_len = IPV4_MIN_HEADER_LEN + l4_len + payload.len();
    let mut buf = vec![0u8; ETH_HEADER_LEN + ip_len];

    write_eth(&mut buf, src.mac(), dst.mac(), ETH_TYPE_IPV4);

    let ip = &mut buf[ETH_HEADER_LEN..];
    ip[0] = 0x45;
    BigEndian::write_u16(&mut ip[2..4], ip_len as u16);
    ip[8] = 64;
    ip[9] = protocol;
    ip[12..16].copy_from_slice(&src.ip().octets());
    ip[16..20].copy_from_slice(&dst.ip().octets());
    let csum = ipv4_checksum(&ip[..IPV4_MIN_HEADER_LEN]);
    BigEndian::write_u16(&mut ip[10..12], csum);

    let l4 = &mut ip[IPV4_MIN_HEADER_LEN..];
    match protocol {
        IP_PROTO_UDP => {
            BigEndian::write_u16(&mut l4[0..2], src_port);
            BigEndian::write_u16(&mut l4[2..4], dst_port);
            BigEndian::write_u16(&mut l4[4..6], (UDP_HEADER_LEN + payload.len()) as u16);
        }
        IP_PROTO_TCP => {
            BigEndian::write_u16(&mut l4[0..2], src_port);
            BigEndian::write_u16(&mut l4[2..4], dst_port);
            l4[12] = 5 << 4;
            l4[13] = 0x02;
            BigEndian::write_u16(&mut l4[14..16], 0xffff);
        }
        _ => {}
    }
    l4[l4_len..].copy_from_slice(payload);
    buf
}

/// 主机 `src` 广播的 ARP 请求，查询 `target` 的 IP
pub fn arp_request(src: NodeAddress, target: NodeAddress) -> Vec<u8> {
    let mut buf = vec![0u8; ETH_HEADER_LEN + ARP_IPV4_LEN];
    write_eth(&mut buf, src.mac(), MacAddr::BROADCAST, ETH_TYPE_ARP);

    let arp = &mut buf[ETH_HEADER_LEN..];
    BigEndian::write_u16(&mut arp[0..2], 1);
    BigEndian::write_u16(&mut arp[2..4], ETH_TYPE_IPV4);
    arp[4] = 6;
    arp[5] = 4;
    BigEndian::write_u16(&mut arp[6..8], 1);
    arp[8..14].copy_from_slice(&src.mac().0);
    arp[14..18].copy_from_slice(&src.ip().octets());
    arp[24..28].copy_from_slice(&target.ip().octets());
    buf
}

fn write_eth(buf: &mut [u8], src: MacAddr, dst: MacAddr, eth_type: u16) {
    buf[0..6].copy_from_slice(&dst.0);
    buf[6..12].copy_from_slice(&src.0);
    BigEndian::write_u16(&mut buf[12..14], eth_type);
}

fn ipv4_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = header
        .chunks(2)
        .map(|w| u32::from(BigEndian::read_u16(w)))
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
