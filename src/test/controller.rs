use crate::Error;
use crate::ctl::packet::{arp_request, udp_frame};
use crate::ctl::{
    ChannelSession, ControlMessage, Controller, ControllerEvent, IDLE_TIMEOUT, MISS_SEND_LEN,
    PacketInOutcome, SwitchSession, runner,
};
use crate::routing::{PathSelector, RoutingPolicy};
use crate::topo::{FatTreeOpts, FatTreeTopology, Layer, NodeAddress};
use crossbeam::channel::Receiver;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct Fabric {
    topo: Arc<FatTreeTopology>,
    ctl: Controller,
    rx: HashMap<NodeAddress, Receiver<ControlMessage>>,
    sessions: HashMap<NodeAddress, Arc<dyn SwitchSession>>,
}

impl Fabric {
    fn new(policy: RoutingPolicy) -> Self {
        let topo = Arc::new(FatTreeTopology::build(&FatTreeOpts::default()).unwrap());
        let ctl = Controller::new(Arc::clone(&topo), PathSelector::with_seed(policy, 1));
        Self {
            topo,
            ctl,
            rx: HashMap::new(),
            sessions: HashMap::new(),
        }
    }

    fn connected(policy: RoutingPolicy) -> Self {
        let mut f = Self::new(policy);
        let switches: Vec<_> = f.topo.switches().collect();
        for sw in switches {
            f.connect(sw);
        }
        assert!(f.ctl.is_ready());
        f.drain_all();
        f
    }

    fn connect(&mut self, sw: NodeAddress) {
        let (session, rx) = ChannelSession::pair();
        let session: Arc<dyn SwitchSession> = Arc::new(session);
        self.ctl
            .connection_up(sw.dpid(), vec![1, 2, 3, 4], Arc::clone(&session))
            .unwrap();
        self.rx.insert(sw, rx);
        self.sessions.insert(sw, session);
    }

    fn disconnect(&mut self, sw: NodeAddress) {
        let session = Arc::clone(&self.sessions[&sw]);
        self.ctl.connection_down(sw.dpid(), &session).unwrap();
    }

    fn drain(&self, sw: NodeAddress) -> Vec<ControlMessage> {
        self.rx[&sw].try_iter().collect()
    }

    fn drain_all(&self) -> HashMap<NodeAddress, Vec<ControlMessage>> {
        self.rx
            .keys()
            .map(|&sw| (sw, self.drain(sw)))
            .filter(|(_, msgs)| !msgs.is_empty())
            .collect()
    }

    fn attach(&self, host: NodeAddress) -> (NodeAddress, u16) {
        self.topo.attachment(host).unwrap()
    }

    fn send_from(&mut self, src: NodeAddress, frame: &[u8]) -> PacketInOutcome {
        let (edge, port) = self.attach(src);
        self.ctl.packet_in(edge.dpid(), port, frame).unwrap()
    }
}

fn all_host_ports(topo: &FatTreeTopology) -> HashSet<(NodeAddress, u16)> {
    topo.layer_nodes(Layer::Edge)
        .iter()
        .flat_map(|&e| topo.neighbors_down(e).map(move |h| (e, h)))
        .map(|(e, h)| (e, topo.port(e, h).unwrap().src))
        .collect()
}

#[test]
fn connection_up_pushes_miss_config() {
    let mut f = Fabric::new(RoutingPolicy::Hashed);
    let sw = f.topo.edge(0, 0);
    f.connect(sw);
    assert!(f.ctl.is_connected(sw));
    assert_eq!(f.ctl.switch_ports(sw), Some(&[1, 2, 3, 4][..]));
    assert_eq!(
        f.drain(sw),
        vec![ControlMessage::SetConfig {
            miss_send_len: MISS_SEND_LEN
        }]
    );
}

#[test]
fn packets_before_readiness_are_dropped() {
    let mut f = Fabric::new(RoutingPolicy::Hashed);
    let switches: Vec<_> = f.topo.switches().collect();
    let (last, rest) = switches.split_last().unwrap();
    for &sw in rest {
        f.connect(sw);
    }
    f.drain_all();
    assert!(!f.ctl.is_ready());

    let a = f.topo.host(0, 0, 0);
    let b = f.topo.host(1, 0, 0);
    let out = f.send_from(a, &udp_frame(a, b, 1, 2, &[]));
    assert_eq!(out, PacketInOutcome::NotReady);
    assert_eq!(f.ctl.known_hosts(), 0);
    assert!(f.drain_all().is_empty());

    f.connect(*last);
    assert!(f.ctl.is_ready());
}

#[test]
fn readiness_survives_disconnects() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let sw = f.topo.agg(2, 1);
    f.disconnect(sw);
    assert!(!f.ctl.is_connected(sw));
    assert!(f.ctl.is_ready());
}

#[test]
fn switches_outside_topology_are_ignored() {
    let mut f = Fabric::new(RoutingPolicy::Hashed);
    let (session, rx) = ChannelSession::pair();
    let host = f.topo.host(0, 0, 0);
    f.ctl.connection_up(host.dpid(), vec![], Arc::new(session.clone())).unwrap();
    f.ctl
        .connection_up(NodeAddress::new(9, 9, 9).dpid(), vec![], Arc::new(session.clone()))
        .unwrap();
    assert!(rx.try_recv().is_err());
    assert!(!f.ctl.is_connected(host));

    let res = f.ctl.connection_up(1 << 40, vec![], Arc::new(session));
    assert!(matches!(res, Err(Error::Format { .. })));
}

#[test]
fn unknown_destination_floods_host_ports_except_ingress() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let a = f.topo.host(0, 0, 0);
    let b = f.topo.host(2, 1, 1);
    let frame = udp_frame(a, b, 1000, 5001, b"x");
    let (ingress, in_port) = f.attach(a);

    let PacketInOutcome::Flooded { targets } = f.send_from(a, &frame) else {
        panic!("expected flood");
    };

    let mut expected = all_host_ports(&f.topo);
    assert!(expected.remove(&(ingress, in_port)));
    let got: HashSet<_> = targets.iter().copied().collect();
    assert_eq!(got.len(), targets.len());
    assert_eq!(got, expected);
    assert_eq!(targets.len(), 15);

    let sent = f.drain_all();
    for (sw, msgs) in &sent {
        assert_eq!(f.topo.layer(*sw), Some(Layer::Edge), "{sw} received a flood");
        for msg in msgs {
            let ControlMessage::PacketOut { out_port, data } = msg else {
                panic!("unexpected message {msg:?}");
            };
            assert!(expected.contains(&(*sw, *out_port)));
            assert_eq!(data, &frame);
        }
    }
    assert_eq!(sent.values().map(Vec::len).sum::<usize>(), 15);
    assert_eq!(f.ctl.location(a.mac()).unwrap().switch, ingress);
    assert_eq!(f.ctl.stats.floods, 1);
}

#[test]
fn broadcast_arp_floods() {
    let mut f = Fabric::connected(RoutingPolicy::RoundRobin);
    let a = f.topo.host(3, 1, 0);
    let out = f.send_from(a, &arp_request(a, f.topo.host(0, 0, 0)));
    assert!(matches!(out, PacketInOutcome::Flooded { ref targets } if targets.len() == 15));
}

#[test]
fn known_destination_installs_one_entry_per_hop() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let a = f.topo.host(0, 0, 0);
    let b = f.topo.host(1, 1, 1);
    let (a_edge, a_port) = f.attach(a);
    let (b_edge, _) = f.attach(b);

    f.send_from(a, &udp_frame(a, b, 5001, 40000, &[]));
    f.drain_all();

    let reply = udp_frame(b, a, 40000, 5001, b"ack");
    let PacketInOutcome::Installed { path } = f.send_from(b, &reply) else {
        panic!("expected install");
    };
    assert_eq!(path.first(), Some(&b_edge));
    assert_eq!(path.last(), Some(&a_edge));
    assert_eq!(path.len(), 5);

    let sent = f.drain_all();
    assert_eq!(sent.len(), path.len(), "only path switches receive messages");
    for (i, node) in path.iter().enumerate() {
        let msgs = &sent[node];
        let ControlMessage::FlowMod(fm) = &msgs[0] else {
            panic!("expected flow-mod at {node}, got {msgs:?}");
        };
        let expected_port = match path.get(i + 1) {
            Some(&next) => f.topo.port(*node, next).unwrap().src,
            None => a_port,
        };
        assert_eq!(fm.out_port, expected_port, "hop {i} ({node})");
        assert_eq!(fm.idle_timeout, IDLE_TIMEOUT);
        assert_eq!(fm.r#match.dl_src, Some(b.mac()));
        assert_eq!(fm.r#match.dl_dst, Some(a.mac()));
        assert_eq!(fm.r#match.tp_src, Some(40000));
        assert_eq!(fm.r#match.in_port, None);
    }

    let last = &sent[&a_edge];
    assert_eq!(last.len(), 2);
    assert_eq!(
        last[1],
        ControlMessage::PacketOut {
            out_port: a_port,
            data: reply
        }
    );
    assert_eq!(f.ctl.stats.paths_installed, 1);
    assert_eq!(f.ctl.stats.flow_mods, 5);
}

#[test]
fn same_edge_hosts_use_single_switch_path() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let a = f.topo.host(1, 0, 0);
    let b = f.topo.host(1, 0, 1);
    f.send_from(a, &udp_frame(a, b, 1, 2, &[]));
    f.drain_all();

    let out = f.send_from(b, &udp_frame(b, a, 2, 1, &[]));
    let (edge, a_port) = f.attach(a);
    assert_eq!(out, PacketInOutcome::Installed { path: vec![edge] });
    let sent = f.drain_all();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[&edge].len(), 2);
    assert!(matches!(&sent[&edge][0], ControlMessage::FlowMod(fm) if fm.out_port == a_port));
}

#[test]
fn hashed_policy_pins_a_flow_while_round_robin_rotates() {
    let a = NodeAddress::new(0, 0, 2);
    let b = NodeAddress::new(3, 1, 3);

    let paths_for = |policy| {
        let mut f = Fabric::connected(policy);
        f.send_from(a, &udp_frame(a, b, 7, 7, &[]));
        (0..4)
            .map(|_| match f.send_from(b, &udp_frame(b, a, 9000, 5001, &[])) {
                PacketInOutcome::Installed { path } => path,
                other => panic!("unexpected {other:?}"),
            })
            .collect::<Vec<_>>()
    };

    let hashed = paths_for(RoutingPolicy::Hashed);
    assert!(hashed.windows(2).all(|w| w[0] == w[1]));

    let rr = paths_for(RoutingPolicy::RoundRobin);
    let distinct: HashSet<_> = rr.iter().collect();
    assert_eq!(distinct.len(), 4);
}

#[test]
fn reconnect_replaces_session_atomically() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let edge = f.topo.edge(0, 0);
    let old_rx = f.rx[&edge].clone();

    f.connect(edge);
    assert!(old_rx.try_recv().is_err());
    assert_eq!(f.drain(edge).len(), 1, "set-config on the new session");

    let a = f.topo.host(1, 0, 0);
    let b = f.topo.host(3, 0, 0);
    f.send_from(a, &udp_frame(a, b, 1, 2, &[]));
    assert!(old_rx.try_recv().is_err(), "stale session received a write");
    assert!(!f.drain(edge).is_empty());
}

#[test]
fn late_disconnect_of_replaced_session_keeps_new_binding() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let edge = f.topo.edge(0, 0);
    let old = Arc::clone(&f.sessions[&edge]);

    f.connect(edge);
    f.drain(edge);
    f.ctl.connection_down(edge.dpid(), &old).unwrap();
    assert!(f.ctl.is_connected(edge));

    let a = f.topo.host(1, 0, 0);
    let b = f.topo.host(3, 0, 0);
    f.send_from(a, &udp_frame(a, b, 1, 2, &[]));
    assert_eq!(f.drain(edge).len(), 2, "both host ports flooded on the new session");
    assert_eq!(f.ctl.stats.unconnected_sends, 0);

    // 当前会话自身的断开仍然生效
    f.disconnect(edge);
    assert!(!f.ctl.is_connected(edge));
}

#[test]
fn stale_disconnect_event_is_ignored_by_event_loop() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let agg = f.topo.agg(1, 0);
    let old = Arc::clone(&f.sessions[&agg]);
    f.connect(agg);

    f.ctl.handle_event(ControllerEvent::ConnectionDown {
        dpid: agg.dpid(),
        session: old,
    });
    assert!(f.ctl.is_connected(agg));
    assert_eq!(f.ctl.stats.dropped, 0);

    let live = Arc::clone(&f.sessions[&agg]);
    f.ctl.handle_event(ControllerEvent::ConnectionDown {
        dpid: agg.dpid(),
        session: live,
    });
    assert!(!f.ctl.is_connected(agg));
}

#[test]
fn writes_to_dead_sessions_are_skipped() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let a = f.topo.host(0, 0, 0);
    let b = f.topo.host(1, 0, 0);

    // 一个交换机主动下线，另一个的连接被对端关闭
    let down = f.topo.edge(2, 0);
    f.disconnect(down);
    let closed = f.topo.edge(3, 1);
    f.rx.remove(&closed);

    let out = f.send_from(a, &udp_frame(a, b, 1, 2, &[]));
    let PacketInOutcome::Flooded { targets } = out else {
        panic!("expected flood");
    };
    assert_eq!(targets.len(), 15);
    assert_eq!(f.ctl.stats.unconnected_sends, 4);
    assert_eq!(f.ctl.stats.packet_outs, 11);
    assert!(f.drain(down).is_empty());
    assert!(f.ctl.location(a.mac()).is_some());
}

#[test]
fn learned_locations_survive_disconnect() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let a = f.topo.host(2, 1, 0);
    let b = f.topo.host(0, 0, 1);
    f.send_from(a, &udp_frame(a, b, 1, 2, &[]));
    let (edge, port) = f.attach(a);

    f.disconnect(edge);
    let loc = f.ctl.location(a.mac()).unwrap();
    assert_eq!((loc.switch, loc.port), (edge, port));
}

#[test]
fn failing_event_does_not_stop_processing() {
    let mut f = Fabric::connected(RoutingPolicy::Hashed);
    let (edge, port) = f.attach(f.topo.host(0, 0, 0));
    f.ctl.handle_event(ControllerEvent::PacketIn {
        dpid: edge.dpid(),
        in_port: port,
        data: vec![0; 5],
    });
    assert_eq!(f.ctl.stats.dropped, 1);

    let a = f.topo.host(0, 0, 0);
    let b = f.topo.host(0, 1, 0);
    f.ctl.handle_event(ControllerEvent::PacketIn {
        dpid: edge.dpid(),
        in_port: port,
        data: udp_frame(a, b, 1, 2, &[]),
    });
    assert_eq!(f.ctl.stats.floods, 1);
    assert_eq!(f.ctl.known_hosts(), 1);

    let err = f.ctl.packet_in(f.topo.host(0, 0, 0).dpid(), 0, &udp_frame(a, b, 1, 2, &[]));
    assert!(matches!(err, Err(Error::UnknownNode(_))));
}

#[test]
fn runner_drains_events_sequentially() {
    let topo = Arc::new(FatTreeTopology::build(&FatTreeOpts::default()).unwrap());
    let ctl = Controller::new(Arc::clone(&topo), PathSelector::new(RoutingPolicy::Hashed));
    let (tx, handle) = runner::spawn(ctl);

    let mut receivers = Vec::new();
    for sw in topo.switches() {
        let (session, rx) = ChannelSession::pair();
        tx.send(ControllerEvent::ConnectionUp {
            dpid: sw.dpid(),
            ports: vec![],
            session: Arc::new(session),
        })
        .unwrap();
        receivers.push(rx);
    }

    let a = topo.host(0, 0, 0);
    let b = topo.host(1, 0, 0);
    for (src, dst) in [(a, b), (b, a)] {
        let edge = topo.neighbors_up(src).next().unwrap();
        tx.send(ControllerEvent::PacketIn {
            dpid: edge.dpid(),
            in_port: topo.port(edge, src).unwrap().src,
            data: udp_frame(src, dst, 10, 20, &[]),
        })
        .unwrap();
    }
    drop(tx);

    let ctl = handle.join().expect("controller thread");
    assert!(ctl.is_ready());
    assert_eq!(ctl.known_hosts(), 2);
    assert_eq!(ctl.stats.packet_ins, 2);
    assert_eq!(ctl.stats.floods, 1);
    assert_eq!(ctl.stats.paths_installed, 1);
}
