//! 节点地址
//!
//! `NodeAddress` 是节点的规范身份 `(pod, switch, host)`，与 dpid、名字、
//! MAC、IPv4 之间可以互相转换且往返无损。

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::{Error, Result};

/// 拓扑层级，数值越小越靠近核心层。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Core = 0,
    Agg = 1,
    Edge = 2,
    Host = 3,
}

impl Layer {
    pub const ALL: [Layer; 4] = [Layer::Core, Layer::Agg, Layer::Edge, Layer::Host];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(idx: usize) -> Option<Layer> {
        Layer::ALL.get(idx).copied()
    }

    /// 上一层（更靠近核心）
    pub fn up(self) -> Option<Layer> {
        self.index().checked_sub(1).and_then(Layer::from_index)
    }

    /// 下一层（更靠近主机）
    pub fn down(self) -> Option<Layer> {
        Layer::from_index(self.index() + 1)
    }
}

/// 节点的规范身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddress {
    pub pod: u8,
    pub switch: u8,
    pub host: u8,
}

impl NodeAddress {
    pub const fn new(pod: u8, switch: u8, host: u8) -> Self {
        Self { pod, switch, host }
    }

    /// 打包成 dpid：`pod<<16 | switch<<8 | host`
    pub fn dpid(self) -> u64 {
        (u64::from(self.pod) << 16) | (u64::from(self.switch) << 8) | u64::from(self.host)
    }

    pub fn from_dpid(dpid: u64) -> Result<Self> {
        if dpid > 0x00ff_ffff {
            return Err(Error::format(format!("{dpid:#x}"), "dpid wider than 24 bits"));
        }
        Ok(Self {
            pod: ((dpid >> 16) & 0xff) as u8,
            switch: ((dpid >> 8) & 0xff) as u8,
            host: (dpid & 0xff) as u8,
        })
    }

    /// 16 位十六进制的 dpid 文本
    pub fn dpid_str(self) -> String {
        format!("{:016x}", self.dpid())
    }

    pub fn from_dpid_str(s: &str) -> Result<Self> {
        if s.len() != 16 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::format(s, "dpid must be 16 hex digits"));
        }
        let dpid = u64::from_str_radix(s, 16).map_err(|_| Error::format(s, "dpid is not hex"))?;
        Self::from_dpid(dpid)
    }

    /// `"pod_switch_host"`
    pub fn name(self) -> String {
        self.to_string()
    }

    /// 仅对主机节点有意义。
    pub fn mac(self) -> MacAddr {
        MacAddr([0, 0, 0, self.pod, self.switch, self.host])
    }

    pub fn from_mac(mac: MacAddr) -> Option<Self> {
        match mac.0 {
            [0, 0, 0, pod, switch, host] => Some(Self::new(pod, switch, host)),
            _ => None,
        }
    }

    /// 仅对主机节点有意义。
    pub fn ip(self) -> Ipv4Addr {
        Ipv4Addr::new(10, self.pod, self.switch, self.host)
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.pod, self.switch, self.host)
    }
}

impl FromStr for NodeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut fields = [0u8; 3];
        let mut parts = s.split('_');
        for field in fields.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| Error::format(s, "expected `pod_switch_host`"))?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::format(s, "fields must be decimal"));
            }
            *field = part
                .parse()
                .map_err(|_| Error::format(s, "field out of range 0..=255"))?;
        }
        if parts.next().is_some() {
            return Err(Error::format(s, "expected `pod_switch_host`"));
        }
        Ok(Self::new(fields[0], fields[1], fields[2]))
    }
}

/// 以太网 MAC 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn from_slice(b: &[u8]) -> Option<Self> {
        <[u8; 6]>::try_from(b).ok().map(MacAddr)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut out = [0u8; 6];
        let mut parts = s.split(':');
        for byte in out.iter_mut() {
            let part = parts.next().ok_or_else(|| Error::format(s, "expected six octets"))?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::format(s, "octets must be two hex digits"));
            }
            *byte = u8::from_str_radix(part, 16)
                .map_err(|_| Error::format(s, "octets must be two hex digits"))?;
        }
        if parts.next().is_some() {
            return Err(Error::format(s, "expected six octets"));
        }
        Ok(MacAddr(out))
    }
}
