//! 反应式流控制器
//!
//! 按顺序处理会话上线、下线与 packet-in 事件：学习主机位置，目的已知时
//! 沿 ECMP 路径逐跳下发流表，目的未知时从全部边缘交换机泛洪。

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam::channel::Receiver;
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::event::ControllerEvent;
use super::message::{ControlMessage, DEFAULT_PRIORITY, FlowMatch, FlowMod, IDLE_TIMEOUT, MISS_SEND_LEN};
use super::packet::PacketHeaders;
use super::session::SwitchSession;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::routing::{Path, PathSelector, find_paths, flow_hash};
use crate::topo::{FatTreeTopology, Layer, MacAddr, NodeAddress};

/// 控制器统计信息
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    pub packet_ins: u64,
    pub dropped: u64,
    pub floods: u64,
    pub paths_installed: u64,
    pub flow_mods: u64,
    pub packet_outs: u64,
    /// 目标交换机没有存活会话而放弃的写
    pub unconnected_sends: u64,
}

/// 已学习到的主机位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacLocation {
    pub switch: NodeAddress,
    pub port: u16,
}

/// 单个 packet-in 的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketInOutcome {
    /// 尚有交换机从未连接，事件被丢弃
    NotReady,
    /// 逐跳下发了流表并在最后一跳送出报文
    Installed { path: Path },
    /// 目的未知，向这些 (边缘交换机, 端口) 泛洪
    Flooded { targets: Vec<(NodeAddress, u16)> },
    /// 两端没有公共祖先，丢弃
    NoPath,
}

#[derive(Debug)]
enum SwitchState {
    Connected(Arc<dyn SwitchSession>),
    Disconnected,
}

#[derive(Debug)]
struct SwitchEntry {
    state: SwitchState,
    ports: Vec<u16>,
}

#[derive(Debug)]
pub struct Controller {
    topo: Arc<FatTreeTopology>,
    selector: PathSelector,
    idle_timeout: u16,
    miss_send_len: u16,
    /// 至少连接过一次的交换机
    switches: HashMap<NodeAddress, SwitchEntry>,
    mac_table: HashMap<MacAddr, MacLocation>,
    ready: bool,
    pub stats: ControllerStats,
}

impl Controller {
    pub fn new(topo: Arc<FatTreeTopology>, selector: PathSelector) -> Self {
        Self {
            topo,
            selector,
            idle_timeout: IDLE_TIMEOUT,
            miss_send_len: MISS_SEND_LEN,
            switches: HashMap::new(),
            mac_table: HashMap::new(),
            ready: false,
            stats: ControllerStats::default(),
        }
    }

    pub fn from_config(topo: Arc<FatTreeTopology>, cfg: &ControllerConfig) -> Self {
        let mut ctl = Self::new(topo, cfg.selector());
        ctl.idle_timeout = cfg.idle_timeout;
        ctl.miss_send_len = cfg.miss_send_len;
        ctl
    }

    pub fn topology(&self) -> &FatTreeTopology {
        &self.topo
    }

    /// 拓扑中的每台交换机都至少连接过一次
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_connected(&self, switch: NodeAddress) -> bool {
        matches!(
            self.switches.get(&switch).map(|e| &e.state),
            Some(SwitchState::Connected(_))
        )
    }

    /// 交换机上线时上报的端口列表
    pub fn switch_ports(&self, switch: NodeAddress) -> Option<&[u16]> {
        self.switches.get(&switch).map(|e| e.ports.as_slice())
    }

    pub fn location(&self, mac: MacAddr) -> Option<MacLocation> {
        self.mac_table.get(&mac).copied()
    }

    pub fn known_hosts(&self) -> usize {
        self.mac_table.len()
    }

    /// 顺序处理事件队列，直到所有发送端都被丢弃。
    pub fn run(&mut self, events: &Receiver<ControllerEvent>) {
        info!("▶️  控制器事件循环启动");
        for ev in events.iter() {
            self.handle_event(ev);
        }
        info!(stats = ?self.stats, "控制器事件循环结束");
    }

    /// 处理单个事件；失败只影响该事件本身。
    pub fn handle_event(&mut self, ev: ControllerEvent) {
        let res = match ev {
            ControllerEvent::ConnectionUp {
                dpid,
                ports,
                session,
            } => self.connection_up(dpid, ports, session),
            ControllerEvent::ConnectionDown { dpid, session } => {
                self.connection_down(dpid, &session)
            }
            ControllerEvent::PacketIn {
                dpid,
                in_port,
                data,
            } => self.packet_in(dpid, in_port, &data).map(|_| ()),
        };
        if let Err(e) = res {
            warn!(error = %e, "事件处理失败，已丢弃");
            self.stats.dropped += 1;
        }
    }

    #[tracing::instrument(skip(self, ports, session), fields(switch = tracing::field::Empty))]
    pub fn connection_up(
        &mut self,
        dpid: u64,
        ports: Vec<u16>,
        session: Arc<dyn SwitchSession>,
    ) -> Result<()> {
        let addr = NodeAddress::from_dpid(dpid)?;
        tracing::Span::current().record("switch", tracing::field::display(addr));
        if !self.topo.is_switch(addr) {
            debug!("交换机不在拓扑中，忽略");
            return Ok(());
        }

        let entry = self.switches.entry(addr).or_insert(SwitchEntry {
            state: SwitchState::Disconnected,
            ports: Vec::new(),
        });
        if matches!(entry.state, SwitchState::Connected(_)) {
            debug!("替换现有会话");
        }
        // 整体替换，之后的写都落到新会话上
        entry.state = SwitchState::Connected(session);
        entry.ports = ports;
        info!("🔌 交换机已连接");

        let cfg = ControlMessage::SetConfig {
            miss_send_len: self.miss_send_len,
        };
        if let Err(e) = self.send(addr, cfg) {
            debug!(error = %e, "set-config 未送达");
        }

        if !self.ready && self.switches.len() == self.topo.switch_count() {
            self.ready = true;
            info!(switches = self.switches.len(), "✅ 全部交换机已连接");
        }
        Ok(())
    }

    /// 只解除会话绑定，已学习的主机位置保留。
    ///
    /// 只有 `session` 仍是当前绑定的会话时才解绑；旧连接迟到的断开事件
    /// 不影响重连后的新会话。
    #[tracing::instrument(skip(self, session))]
    pub fn connection_down(&mut self, dpid: u64, session: &Arc<dyn SwitchSession>) -> Result<()> {
        let addr = NodeAddress::from_dpid(dpid)?;
        let Some(entry) = self.switches.get_mut(&addr) else {
            return Ok(());
        };
        let is_live = match &entry.state {
            SwitchState::Connected(live) => Arc::ptr_eq(live, session),
            SwitchState::Disconnected => return Ok(()),
        };
        if is_live {
            entry.state = SwitchState::Disconnected;
            info!(switch = %addr, "交换机断开");
        } else {
            debug!(switch = %addr, "旧连接的断开事件，当前会话保持不变");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, data), fields(len = data.len()))]
    pub fn packet_in(&mut self, dpid: u64, in_port: u16, data: &[u8]) -> Result<PacketInOutcome> {
        self.stats.packet_ins += 1;
        if !self.ready {
            trace!("尚有交换机未连接，丢弃");
            self.stats.dropped += 1;
            return Ok(PacketInOutcome::NotReady);
        }

        let switch = NodeAddress::from_dpid(dpid)?;
        if !self.topo.is_switch(switch) {
            return Err(Error::UnknownNode(switch));
        }
        let hdr = PacketHeaders::parse(data)?;

        self.mac_table.insert(
            hdr.dl_src,
            MacLocation {
                switch,
                port: in_port,
            },
        );
        trace!(src = %hdr.dl_src, dst = %hdr.dl_dst, "学习源主机位置");
        self.check_attachment(hdr.dl_src, switch, in_port);

        match self.location(hdr.dl_dst) {
            Some(dst) => self.install_reactive_path(switch, dst, &hdr, data),
            None => Ok(self.flood(switch, in_port, data)),
        }
    }

    fn install_reactive_path(
        &mut self,
        from: NodeAddress,
        dst: MacLocation,
        hdr: &PacketHeaders,
        data: &[u8],
    ) -> Result<PacketInOutcome> {
        let hash = flow_hash(hdr.flow_key().as_ref());
        let path = match find_paths(&self.topo, from, dst.switch, &mut self.selector, hash) {
            Ok(path) => path,
            Err(Error::NoPath { .. }) => {
                debug!(%from, to = %dst.switch, "无可用路径，丢弃");
                self.stats.dropped += 1;
                return Ok(PacketInOutcome::NoPath);
            }
            Err(e) => return Err(e),
        };

        // 先算出每跳的出端口，再统一下发
        let mut hops = Vec::with_capacity(path.len());
        for (i, &node) in path.iter().enumerate() {
            let out_port = match path.get(i + 1) {
                Some(&next) => self.topo.port(node, next)?.src,
                None => dst.port,
            };
            hops.push((node, out_port));
        }

        let flow_match = FlowMatch::from_headers(hdr);
        for (node, out_port) in hops {
            let msg = ControlMessage::FlowMod(FlowMod {
                r#match: flow_match.clone(),
                out_port,
                idle_timeout: self.idle_timeout,
                hard_timeout: 0,
                priority: DEFAULT_PRIORITY,
                buffer_id: None,
            });
            self.fire(node, msg);
        }
        self.fire(dst.switch, ControlMessage::packet_out(dst.port, data));

        self.stats.paths_installed += 1;
        debug!(path = ?path, hash, "路径已下发");
        Ok(PacketInOutcome::Installed { path })
    }

    /// 只在边缘交换机的主机端口上泛洪，避免经汇聚/核心层成环。
    fn flood(&mut self, ingress: NodeAddress, in_port: u16, data: &[u8]) -> PacketInOutcome {
        let topo = Arc::clone(&self.topo);
        let mut targets = Vec::new();

        for &edge in topo.layer_nodes(Layer::Edge) {
            for host in topo.neighbors_down(edge) {
                let port = match topo.port(edge, host) {
                    Ok(p) => p.src,
                    Err(e) => {
                        debug!(error = %e, "跳过主机端口");
                        continue;
                    }
                };
                if edge == ingress && port == in_port {
                    continue;
                }
                self.fire(edge, ControlMessage::packet_out(port, data));
                targets.push((edge, port));
            }
        }

        self.stats.floods += 1;
        trace!(targets = targets.len(), "泛洪完成");
        PacketInOutcome::Flooded { targets }
    }

    /// MAC 对应拓扑主机时，核对其上报位置是否为该主机的接入端口
    fn check_attachment(&self, mac: MacAddr, switch: NodeAddress, port: u16) {
        let Some(host) = NodeAddress::from_mac(mac) else {
            return;
        };
        match self.topo.attachment(host) {
            Ok(expected) if expected == (switch, port) => {}
            Ok((edge, edge_port)) => {
                debug!(%host, %switch, port, %edge, edge_port, "主机出现在非接入端口");
            }
            Err(_) => trace!(%mac, "MAC 不属于拓扑中的主机"),
        }
    }

    /// 即发即忘：会话不存在或已关闭时仅跳过这一跳。
    fn fire(&mut self, switch: NodeAddress, msg: ControlMessage) {
        let is_flow_mod = matches!(msg, ControlMessage::FlowMod(_));
        match self.send(switch, msg) {
            Ok(()) if is_flow_mod => self.stats.flow_mods += 1,
            Ok(()) => self.stats.packet_outs += 1,
            Err(e) => {
                debug!(error = %e, "发送跳过");
                self.stats.unconnected_sends += 1;
            }
        }
    }

    fn send(&self, switch: NodeAddress, msg: ControlMessage) -> Result<()> {
        match self.switches.get(&switch).map(|e| &e.state) {
            Some(SwitchState::Connected(session)) => session
                .send(msg)
                .map_err(|_| Error::UnconnectedSwitch(switch)),
            _ => Err(Error::UnconnectedSwitch(switch)),
        }
    }
}
