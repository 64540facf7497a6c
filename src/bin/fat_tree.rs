use clap::Parser;
use fattree_ecmp::config::{ConfigOverrides, ControllerConfig, FlowMatrix};
use fattree_ecmp::ctl::packet::IP_PROTO_UDP;
use fattree_ecmp::routing::{FlowKey, Path, PathSelector, find_all_paths, flow_hash};
use fattree_ecmp::topo::{FatTreeTopology, Layer, NodeAddress};
use fattree_ecmp::{Error, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "fat-tree",
    about = "Print ECMP paths between fat-tree nodes"
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

    /// Source node name, e.g. 0_0_2
    #[arg(long)]
    src: Option<String>,

    /// Destination node name, e.g. 1_0_2
    #[arg(long)]
    dst: Option<String>,

    /// Flow matrix JSON ({"<src host index>": [<dst host index>]})
    #[arg(long)]
    flow_matrix: Option<PathBuf>,

    /// UDP source port used for the flow hash between hosts
    #[arg(long, default_value_t = 5001)]
    sport: u16,

    /// UDP destination port used for the flow hash between hosts
    #[arg(long, default_value_t = 5001)]
    dport: u16,

    /// Print every shortest path instead of the selected one
    #[arg(long)]
    all: bool,

    /// Emit JSON on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct PairReport {
    src: String,
    dst: String,
    hash: u32,
    selected: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    all: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Serialize)]
struct Report {
    k: usize,
    routing: String,
    hosts: usize,
    switches: usize,
    pairs: Vec<PairReport>,
}

fn names(path: &Path) -> Vec<String> {
    path.iter().map(|n| n.name()).collect()
}

/// 主机之间按 UDP 五元组哈希，其余节点不参与哈希
fn pair_hash(topo: &FatTreeTopology, src: NodeAddress, dst: NodeAddress, args: &Args) -> u32 {
    let hosts = topo.layer(src) == Some(Layer::Host) && topo.layer(dst) == Some(Layer::Host);
    let key = hosts.then(|| FlowKey {
        src_ip: src.ip(),
        dst_ip: dst.ip(),
        protocol: IP_PROTO_UDP,
        src_port: args.sport,
        dst_port: args.dport,
    });
    flow_hash(key.as_ref())
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
    let topo = FatTreeTopology::build(&cfg.topology_opts())?;
    let mut selector: PathSelector = cfg.selector();

    let pairs = match (&args.flow_matrix, &args.src, &args.dst) {
        (Some(path), None, None) => FlowMatrix::load(path)?.host_pairs(&topo)?,
        (None, Some(src), Some(dst)) => vec![(src.parse()?, dst.parse()?)],
        _ => {
            return Err(Error::Configuration(
                "pass either --src and --dst, or --flow-matrix".to_string(),
            ));
        }
    };

    let mut reports = Vec::with_capacity(pairs.len());
    for (src, dst) in pairs {
        let hash = pair_hash(&topo, src, dst, &args);
        let (selected, all) = match find_all_paths(&topo, src, dst) {
            Ok(paths) => {
                let selected = selector.select(&paths, hash).map(names);
                let all = args.all.then(|| paths.iter().map(names).collect());
                (selected, all)
            }
            Err(Error::NoPath { .. }) => (None, args.all.then(Vec::new)),
            Err(e) => return Err(e),
        };
        reports.push(PairReport {
            src: src.name(),
            dst: dst.name(),
            hash,
            selected,
            all,
        });
    }

    if args.json {
        let report = Report {
            k: topo.k(),
            routing: cfg.routing.to_string(),
            hosts: topo.hosts().len(),
            switches: topo.switch_count(),
            pairs: reports,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "fat-tree k={} hosts={} switches={} routing={}",
        topo.k(),
        topo.hosts().len(),
        topo.switch_count(),
        cfg.routing
    );
    for r in &reports {
        match &r.selected {
            Some(path) => println!("{} -> {}: {}", r.src, r.dst, path.join(" ")),
            None => println!("{} -> {}: no path", r.src, r.dst),
        }
        for (i, path) in r.all.iter().flatten().enumerate() {
            println!("  [{i}] {}", path.join(" "));
        }
    }
    Ok(())
}
