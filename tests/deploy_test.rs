// kvmdeploy
// Copyright (C) Riff Labs Limited <team@riff.cc>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

mod common;

use common::{cluster_yaml, deployer, first_nic_mac, RecordingRunner, Workspace};
use kvmdeploy::{ClusterSpec, DeployError, FailurePolicy};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

fn users(user_data: &str) -> Vec<serde_yaml::Value> {
    let doc: serde_yaml::Value = serde_yaml::from_str(user_data).unwrap();
    doc["users"].as_sequence().unwrap().clone()
}

fn keys(user: &serde_yaml::Value) -> Vec<String> {
    user["ssh-authorized-keys"].as_sequence().unwrap()
        .iter().map(|k| k.as_str().unwrap().to_string()).collect()
}

#[test]
fn test_two_node_ubuntu_cluster() {
    let ws = Workspace::new();
    let runner = Arc::new(RecordingRunner::new());
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1", "node2"])).unwrap();

    let report = deployer(ws.config(), runner.clone()).deploy(&spec).unwrap();
    assert!(report.is_success());
    assert_eq!(report.nodes.len(), 2);

    let cluster = ws.cluster_dir("demo");
    for node in ["node1", "node2"] {
        for file in ["system.qcow2", "data1.qcow2", "start.sh", "stop.sh",
                     "cloud-init/meta-data", "cloud-init/user-data", "cloud-init/network-config",
                     "cloud-init/cloud-init-provisioning.iso"] {
            assert!(cluster.join(node).join(file).exists(), "{}/{} missing", node, file);
        }
        assert!(!cluster.join(node).join("data2.qcow2").exists());

        let users = users(&ws.read(&format!("demo/{}/cloud-init/user-data", node)));
        assert_eq!(users.len(), 2);
        assert_eq!(users[0]["name"].as_str(), Some("ubuntu"));
        assert_eq!(users[1]["name"].as_str(), Some("root"));
        for user in users.iter() {
            assert_eq!(keys(user), vec!["keyA"]);
        }
    }

    let start = ws.read("demo/start_cluster.sh");
    let first = start.find("(cd node1 && ./start.sh)").unwrap();
    let second = start.find("(cd node2 && ./start.sh)").unwrap();
    assert!(first < second);

    let ports: HashSet<u16> = report.nodes.iter().map(|n| n.port.port()).collect();
    assert_eq!(ports.len(), 2);
    assert!(ws.read("demo/node1/start.sh").contains(&format!("-display vnc=:{} ", report.nodes[0].port.display)));

    // one ISO, one overlay and one data disk per node
    assert_eq!(runner.commands().len(), 6);
}

#[test]
fn test_network_config_matches_start_script() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1", "node2"])).unwrap();
    deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();

    for node in ["node1", "node2"] {
        let netconf: serde_yaml::Value =
            serde_yaml::from_str(&ws.read(&format!("demo/{}/cloud-init/network-config", node))).unwrap();
        let mac = netconf["ethernets"]["eth0"]["match"]["macaddress"].as_str().unwrap().to_string();
        assert_eq!(mac, first_nic_mac(&ws.read(&format!("demo/{}/start.sh", node))));
        assert!(mac.starts_with("52:54:00:"));
        assert_eq!(netconf["ethernets"]["eth0"]["nameservers"]["search"][0].as_str(), Some("lab.example.net"));
    }
}

#[test]
fn test_macs_unique_across_cluster() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["n1", "n2", "n3", "n4"])).unwrap();
    let report = deployer(ws.config().threads(4), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();

    let macs: Vec<_> = report.nodes.iter().flat_map(|n| n.macs.iter().copied()).collect();
    assert_eq!(macs.len(), 12);
    assert_eq!(macs.iter().collect::<HashSet<_>>().len(), 12);
    let names: Vec<&str> = report.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["n1", "n2", "n3", "n4"]);
}

#[test]
fn test_deploy_is_not_reentrant() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1"])).unwrap();
    deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();

    let user_data = ws.read("demo/node1/cloud-init/user-data");
    let start = ws.read("demo/start_cluster.sh");

    let runner = Arc::new(RecordingRunner::new());
    match deployer(ws.config(), runner.clone()).deploy(&spec) {
        Err(DeployError::ClusterExists(path)) => assert_eq!(path, ws.cluster_dir("demo")),
        other => panic!("expected ClusterExists, got {:?}", other.map(|r| r.cluster_dir)),
    }
    assert!(runner.commands().is_empty());
    assert_eq!(ws.read("demo/node1/cloud-init/user-data"), user_data);
    assert_eq!(ws.read("demo/start_cluster.sh"), start);
}

#[test]
fn test_rhel_family_nodes() {
    for guest in ["CentOS8", "Alma8", "Alma9"] {
        let ws = Workspace::new();
        let spec = ClusterSpec::from_yaml(&cluster_yaml(guest, &["db1"])).unwrap();
        deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();

        let meta = ws.read("demo/db1/cloud-init/meta-data");
        assert!(meta.contains("iface eth0 inet static"), "{}", guest);
        assert!(meta.contains("address 10.1.0.11\n"));
        assert!(meta.contains("netmask 255.255.255.0\n"));
        assert_eq!(ws.read("demo/db1/cloud-init/network-config"), "");

        let doc: serde_yaml::Value = serde_yaml::from_str(&ws.read("demo/db1/cloud-init/user-data")).unwrap();
        assert_eq!(doc["bootcmd"][0].as_str(), Some("nmcli device connect eth0"));
    }
}

#[test]
fn test_debian_alias_uses_netplan() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Debian GNU/Linux", &["deb1"])).unwrap();
    deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();
    assert_eq!(ws.read("demo/deb1/cloud-init/meta-data"), "");
    assert!(ws.read("demo/deb1/cloud-init/network-config").starts_with("version: 2"));
}

#[test]
fn test_unsupported_guest_fails_before_writing() {
    let ws = Workspace::new();
    let mut spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1", "node2"])).unwrap();
    spec.nodes[1].settings.guest_os = Some(String::from("FreeBSD"));
    let runner = Arc::new(RecordingRunner::new());

    match deployer(ws.config(), runner.clone()).deploy(&spec) {
        Err(DeployError::UnsupportedGuestOs { node, guest_os }) => {
            assert_eq!(node, "node2");
            assert_eq!(guest_os, "FreeBSD");
        }
        other => panic!("unexpected {:?}", other.map(|r| r.cluster_dir)),
    }
    assert!(!ws.cluster_dir("demo").exists());
    assert!(runner.commands().is_empty());
}

#[test]
fn test_missing_key_fails_before_writing() {
    let ws = Workspace::new();
    let yaml = cluster_yaml("Ubuntu", &["node1"]).replace("gateway: 10.1.0.1\n", "");
    let spec = ClusterSpec::from_yaml(&yaml).unwrap();
    match deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec) {
        Err(DeployError::MissingConfigKey { node, key }) => {
            assert_eq!(node, "node1");
            assert_eq!(key, "gateway");
        }
        other => panic!("unexpected {:?}", other.map(|r| r.cluster_dir)),
    }
    assert!(!ws.cluster_dir("demo").exists());
}

#[test]
fn test_abort_policy_stops_at_first_failure() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1", "node2", "node3"])).unwrap();
    let runner = Arc::new(RecordingRunner::failing_on("/node2/"));

    let result = deployer(ws.config().threads(1), runner).deploy(&spec);
    assert!(matches!(result, Err(DeployError::ExternalTool { .. })));

    let cluster = ws.cluster_dir("demo");
    assert!(cluster.join("node1/start.sh").exists());
    assert!(cluster.join("node2").exists());
    assert!(!cluster.join("node3").exists());
    assert!(!cluster.join("start_cluster.sh").exists());
}

#[test]
fn test_continue_policy_provisions_the_rest() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1", "node2", "node3"])).unwrap();
    let runner = Arc::new(RecordingRunner::failing_on("/node2/"));
    let config = ws.config().threads(2).failure_policy(FailurePolicy::Continue);

    let report = deployer(config, runner).deploy(&spec).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "node2");
    let names: Vec<&str> = report.nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["node1", "node3"]);

    let start = ws.read("demo/start_cluster.sh");
    assert!(start.contains("(cd node1 && ./start.sh)"));
    assert!(start.contains("(cd node3 && ./start.sh)"));
    assert!(!start.contains("node2"));
}

#[test]
fn test_node_override_of_data_disks() {
    let ws = Workspace::new();
    let yaml = cluster_yaml("Ubuntu", &["node1"]) + "    dataDiskSizes:\n      - 5G\n      - size: 7G\n        type: scsi-hd\n";
    let spec = ClusterSpec::from_yaml(&yaml).unwrap();
    let runner = Arc::new(RecordingRunner::new());
    deployer(ws.config(), runner.clone()).deploy(&spec).unwrap();

    let start = ws.read("demo/node1/start.sh");
    assert!(start.contains("-device virtio-blk-pci,drive=D1,serial=qemu_drive_1"));
    assert!(start.contains("-device scsi-hd,drive=D2,serial=qemu_drive_2"));
    let sizes: Vec<String> = runner.commands().iter()
        .filter(|c| c.program == "qemu-img")
        .filter_map(|c| c.args.last().cloned())
        .collect();
    assert_eq!(sizes, vec!["20G", "5G", "7G"]);
}

#[test]
fn test_scripts_are_executable() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["node1"])).unwrap();
    deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();
    let cluster = ws.cluster_dir("demo");
    for script in ["start_cluster.sh", "stop_cluster.sh", "node1/start.sh", "node1/stop.sh"] {
        assert!(kvmdeploy::util::io::is_executable(&cluster.join(script)), "{}", script);
    }
    assert!(fs::read_to_string(cluster.join("node1/stop.sh")).unwrap().contains("tapnode1-pri1"));
}

#[test]
fn test_long_node_names_deploy_with_short_taps() {
    let ws = Workspace::new();
    let spec = ClusterSpec::from_yaml(&cluster_yaml("Ubuntu", &["worker01", "worker02"])).unwrap();
    deployer(ws.config(), Arc::new(RecordingRunner::new())).deploy(&spec).unwrap();

    let mut taps = HashSet::new();
    for node in ["worker01", "worker02"] {
        let start = ws.read(&format!("demo/{}/start.sh", node));
        for line in start.lines().filter(|l| l.starts_with("create_tap ")) {
            let tap = line.split_whitespace().nth(1).unwrap().to_string();
            assert!(tap.len() <= 15, "{}", tap);
            assert!(ws.read(&format!("demo/{}/stop.sh", node)).contains(&tap));
            assert!(taps.insert(tap));
        }
    }
    assert_eq!(taps.len(), 6);
}
