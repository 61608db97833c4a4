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

// Common test utilities
#![allow(dead_code)]

use kvmdeploy::artifacts::{CommandRunner, ExternalCommand};
use kvmdeploy::{ClusterDeployer, DeployConfig, DeployError, HostPlatform, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Records every command and creates the file it promises, failing any
/// command with an argument containing `fail_on`.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<ExternalCommand>>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(fragment: &str) -> Self {
        Self { commands: Mutex::new(Vec::new()), fail_on: Some(fragment.to_string()) }
    }

    pub fn commands(&self) -> Vec<ExternalCommand> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, command: &ExternalCommand) -> Result<()> {
        self.commands.lock().unwrap().push(command.clone());
        if let Some(fragment) = &self.fail_on {
            if command.args.iter().any(|arg| arg.contains(fragment.as_str())) {
                return Err(DeployError::ExternalTool {
                    command: command.to_string(),
                    reason: String::from("exit status: 1"),
                });
            }
        }
        if let Some(path) = &command.creates {
            fs::write(path, b"").unwrap();
        }
        Ok(())
    }
}

/// A scratch directory with an image cache holding `base.img`
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("cache/base.img"), b"qcow").unwrap();
        Workspace { dir }
    }

    pub fn config(&self) -> DeployConfig {
        DeployConfig::default()
            .cloud_image_dir(self.dir.path().join("cache"))
            .clusters_dir(self.dir.path().join("clusters"))
            .allocator_seed(42)
    }

    pub fn cluster_dir(&self, name: &str) -> PathBuf {
        self.dir.path().join("clusters").join(name)
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.dir.path().join("clusters").join(relative)).unwrap()
    }
}

pub fn deployer(config: DeployConfig, runner: Arc<RecordingRunner>) -> ClusterDeployer {
    ClusterDeployer::new(config)
        .with_runner(runner)
        .with_platform(HostPlatform::Debian { id: String::from("ubuntu") })
}

/// Cluster `demo` with one 10G data disk and a single key, every node on `guest_os`
pub fn cluster_yaml(guest_os: &str, nodes: &[&str]) -> String {
    let mut yaml = format!(r#"
clusterName: demo
domainName: .lab.example.net.
imagePath: base.img
systemDiskSize: 20G
dataDiskSizes:
  - size: 10G
cpu: 2
mem: 2G
mtu: 1500
gateway: 10.1.0.1
nameserver: 10.1.0.2
guestOs: {}
authorized-keys:
  - keyA
nodes:
"#, guest_os);
    for (i, name) in nodes.iter().enumerate() {
        yaml.push_str(&format!("  - name: {}\n    ipAddress: 10.1.0.{}/24\n", name, 11 + i));
    }
    yaml
}

/// MAC on the first `-device virtio-net-pci` line of a start.sh
pub fn first_nic_mac(start_script: &str) -> String {
    let line = start_script.lines()
        .find(|line| line.contains("virtio-net-pci") && line.contains("mac="))
        .unwrap();
    let (_, rest) = line.split_once("mac=").unwrap();
    rest.split_whitespace().next().unwrap().to_string()
}
