use clap::Parser;
use crossbeam::channel::Receiver;
use fattree_ecmp::config::{ConfigOverrides, ControllerConfig, FlowMatrix};
use fattree_ecmp::ctl::packet::udp_frame;
use fattree_ecmp::ctl::{
    ChannelSession, ControlMessage, Controller, ControllerEvent, ControllerStats, runner,
};
use fattree_ecmp::topo::{FatTreeTopology, Layer, NodeAddress};
use fattree_ecmp::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "reactive-demo",
    about = "Replay host traffic through the reactive ECMP controller"
)]
struct Args {
    /// Controller config JSON; command line flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fat-tree arity (even)
    #[arg(long)]
    k: Option<usize>,

    /// Path selection: round-robin, random or hashed
    #[arg(long)]
    routing: Option<String>,

    /// Seed for the random policy
    #[arg(long)]
    seed: Option<u64>,

    /// Flow matrix JSON; defaults to every host sending to the host half the fabric away
    #[arg(long)]
    flow_matrix: Option<PathBuf>,

    /// Emit JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    k: usize,
    routing: String,
    flows: usize,
    ready: bool,
    known_hosts: usize,
    stats: ControllerStats,
    /// 每台核心交换机收到的流表数，反映 ECMP 的分散程度
    core_flow_mods: BTreeMap<String, usize>,
}

fn default_flows(topo: &FatTreeTopology) -> Vec<(NodeAddress, NodeAddress)> {
    let hosts = topo.hosts();
    let n = hosts.len();
    (0..n).map(|i| (hosts[i], hosts[(i + n / 2) % n])).collect()
}

fn switch_ports(topo: &FatTreeTopology, sw: NodeAddress) -> Result<Vec<u16>> {
    let mut ports = topo
        .neighbors(sw)
        .map(|n| topo.port(sw, n).map(|p| p.src))
        .collect::<Result<Vec<_>>>()?;
    ports.sort_unstable();
    Ok(ports)
}

fn packet_in(
    topo: &FatTreeTopology,
    src: NodeAddress,
    dst: NodeAddress,
    sport: u16,
    dport: u16,
) -> Result<ControllerEvent> {
    let (edge, in_port) = topo.attachment(src)?;
    Ok(ControllerEvent::PacketIn {
        dpid: edge.dpid(),
        in_port,
        data: udp_frame(src, dst, sport, dport, b"demo"),
    })
}

fn count_flow_mods(rx: &Receiver<ControlMessage>) -> usize {
    rx.try_iter()
        .filter(|msg| matches!(msg, ControlMessage::FlowMod(_)))
        .count()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();
    let overrides = ConfigOverrides {
        k: args.k,
        routing: args.routing.clone(),
        seed: args.seed,
    };
    let cfg = ControllerConfig::resolve(args.config.as_deref(), &overrides)?;
    let topo = Arc::new(FatTreeTopology::build(&cfg.topology_opts())?);
    let flows = match &args.flow_matrix {
        Some(path) => FlowMatrix::load(path)?.host_pairs(&topo)?,
        None => default_flows(&topo),
    };

    let controller = Controller::from_config(Arc::clone(&topo), &cfg);
    let (tx, handle) = runner::spawn(controller);
    let send = |ev: ControllerEvent| {
        tx.send(ev)
            .map_err(|_| Error::Configuration("controller thread exited early".to_string()))
    };

    let mut sessions = Vec::with_capacity(topo.switch_count());
    for sw in topo.switches() {
        let (session, rx) = ChannelSession::pair();
        send(ControllerEvent::ConnectionUp {
            dpid: sw.dpid(),
            ports: switch_ports(&topo, sw)?,
            session: Arc::new(session),
        })?;
        sessions.push((sw, rx));
    }
    info!(switches = sessions.len(), flows = flows.len(), "开始回放流量");

    // 正向报文让控制器学习源主机，反向报文触发路径下发
    for (i, &(src, dst)) in flows.iter().enumerate() {
        let sport = 10_000u16.wrapping_add(i as u16);
        send(packet_in(&topo, src, dst, sport, 5001)?)?;
    }
    for (i, &(src, dst)) in flows.iter().enumerate() {
        let sport = 10_000u16.wrapping_add(i as u16);
        send(packet_in(&topo, dst, src, 5001, sport)?)?;
    }
    drop(send);
    drop(tx);

    let controller = handle
        .join()
        .map_err(|_| Error::Configuration("controller thread panicked".to_string()))?;

    let mut core_flow_mods = BTreeMap::new();
    for (sw, rx) in &sessions {
        let flow_mods = count_flow_mods(rx);
        if topo.layer(*sw) == Some(Layer::Core) {
            core_flow_mods.insert(sw.name(), flow_mods);
        }
    }

    let summary = Summary {
        k: topo.k(),
        routing: cfg.routing.to_string(),
        flows: flows.len(),
        ready: controller.is_ready(),
        known_hosts: controller.known_hosts(),
        stats: controller.stats.clone(),
        core_flow_mods,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let s = &summary.stats;
    println!(
        "k={} routing={} flows={} ready={} known_hosts={}",
        summary.k, summary.routing, summary.flows, summary.ready, summary.known_hosts
    );
    println!(
        "packet_ins={} dropped={} floods={} paths_installed={} flow_mods={} packet_outs={}",
        s.packet_ins, s.dropped, s.floods, s.paths_installed, s.flow_mods, s.packet_outs
    );
    for (core, n) in &summary.core_flow_mods {
        println!("core {core}: {n} flow-mods");
    }
    Ok(())
}
