use serde_json::Value;
use std::process::Command;

fn run_json(args: &[&str]) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_reactive_demo"))
        .args(args)
        .output()
        .expect("run reactive_demo");
    assert!(
        output.status.success(),
        "reactive_demo failed: stderr={}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("parse reactive_demo json")
}

#[test]
fn reactive_demo_installs_every_reverse_flow() {
    let v = run_json(&["--json"]);
    assert_eq!(v["ready"], true);
    assert_eq!(v["flows"], 16);
    assert_eq!(v["known_hosts"], 16);

    let stats = &v["stats"];
    assert_eq!(stats["packet_ins"], 32);
    assert_eq!(stats["dropped"], 0);
    assert_eq!(stats["floods"], 8);
    assert_eq!(stats["paths_installed"], 24);
    // 跨 pod 路径为 5 台交换机
    assert_eq!(stats["flow_mods"], 24 * 5);
    assert_eq!(stats["unconnected_sends"], 0);

    let cores = v["core_flow_mods"].as_object().expect("core loads");
    assert_eq!(cores.len(), 4);
    let total: u64 = cores.values().map(|n| n.as_u64().unwrap()).sum();
    assert_eq!(total, 24);
}

#[test]
fn reactive_demo_round_robin_spreads_over_cores() {
    let v = run_json(&["--routing", "round-robin", "--json"]);
    let cores = v["core_flow_mods"].as_object().expect("core loads");
    assert!(cores.values().all(|n| n.as_u64().unwrap() > 0), "{cores:?}");
}
