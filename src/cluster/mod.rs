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

//! Cluster definitions - the YAML an operator writes to describe a cluster.
//!
//! Every key below `nodes` except `name` and `ipAddress` can also be given at
//! the top level, where it acts as the default for all nodes:
//!
//! ```yaml
//! clusterName: demo
//! domainName: lab.example.net.
//! imagePath: https://cloud-images.ubuntu.com/jammy/current/jammy-server-cloudimg-amd64.img
//! systemDiskSize: 20G
//! dataDiskSizes:
//!   - size: 10G
//!   - size: 50G
//!     type: scsi-hd
//! cpu: 2
//! mem: 4G
//! mtu: 1500
//! gateway: 10.1.0.1
//! nameserver: 10.1.0.1
//! guestOs: Ubuntu
//! authorized-keys:
//!   - ssh-ed25519 AAAAC3Nza... operator@host
//! nodes:
//!   - name: node1
//!     ipAddress: 10.1.0.11/24
//!   - name: node2
//!     ipAddress: 10.1.0.12/24
//!     guestOs: Alma9
//!     cpu: 4
//! ```

pub mod allocator;
pub mod net;
pub mod platform;
pub mod resolve;

use crate::error::{DeployError, Result};
use crate::util::io::read_local_file;
use crate::util::yaml::show_yaml_error_in_context;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Device model used for data disks that don't name one
pub const DEFAULT_DISK_DEVICE: &str = "virtio-blk-pci";

/// A size or amount that may be written as a bare number (`mem: 4096`) or
/// with a unit suffix (`mem: 4G`). Passed through verbatim to qemu.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawQuantity")]
pub struct Quantity(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(u64),
    Text(String),
}

impl From<RawQuantity> for Quantity {
    fn from(raw: RawQuantity) -> Self {
        match raw {
            RawQuantity::Number(n) => Quantity(n.to_string()),
            RawQuantity::Text(s) => Quantity(s),
        }
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity(s.to_string())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One extra disk attached to a node, `data<N>.qcow2` on disk.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawDataDisk")]
pub struct DataDisk {
    pub size: Quantity,
    /// qemu `-device` model, e.g. `virtio-blk-pci` or `scsi-hd`
    pub device: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDataDisk {
    Full {
        size: Quantity,
        #[serde(rename = "type")]
        device: Option<String>,
    },
    Size(Quantity),
}

impl From<RawDataDisk> for DataDisk {
    fn from(raw: RawDataDisk) -> Self {
        match raw {
            RawDataDisk::Full { size, device } => DataDisk {
                size,
                device: device.unwrap_or_else(|| DEFAULT_DISK_DEVICE.to_string()),
            },
            RawDataDisk::Size(size) => DataDisk { size, device: DEFAULT_DISK_DEVICE.to_string() },
        }
    }
}

impl DataDisk {
    pub fn new(size: &str) -> Self {
        DataDisk { size: Quantity::from(size), device: DEFAULT_DISK_DEVICE.to_string() }
    }
}

/// The keys a node inherits from the cluster when it doesn't set them itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefaults {
    pub cluster_name: Option<String>,
    pub domain_name: Option<String>,
    pub image_path: Option<String>,
    pub system_disk_size: Option<Quantity>,
    pub data_disk_sizes: Option<Vec<DataDisk>>,
    pub cpu: Option<u32>,
    pub mem: Option<Quantity>,
    pub mtu: Option<u32>,
    pub gateway: Option<String>,
    pub nameserver: Option<String>,
    pub guest_os: Option<String>,
    #[serde(rename = "authorized-keys", alias = "authorizedKeys")]
    pub authorized_keys: Option<Vec<String>>,
    /// Virtualization binary; the host platform supplies one when unset
    pub qemubin: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub name: String,
    /// Static address in CIDR form, e.g. `10.1.0.11/24`
    pub ip_address: String,
    #[serde(flatten)]
    pub settings: NodeDefaults,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ClusterSpec {
    #[serde(flatten)]
    pub defaults: NodeDefaults,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl ClusterSpec {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load a cluster file, printing the failing region of the file when it
    /// does not parse.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = read_local_file(path)?;
        match serde_yaml::from_str(&contents) {
            Ok(spec) => Ok(spec),
            Err(err) => {
                show_yaml_error_in_context(&err, path, &contents);
                Err(DeployError::Config(format!("{}: {}", path.display(), err)))
            }
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.defaults.cluster_name.as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| DeployError::Config("clusterName is required".into()))
    }
}

/// Names that end up in paths, interface names and generated scripts:
/// ASCII letters, digits, `-`, `_` and `.`, not starting with `.` or `-`.
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.starts_with('-')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid {
        return Err(DeployError::Config(format!(
            "{} '{}' may only use letters, digits, '-', '_' and '.'", what, name
        )));
    }
    Ok(())
}
