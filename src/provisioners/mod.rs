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

//! Provisioners - how each guest OS family is described to cloud-init and
//! launched.
//!
//! The defaults on [`Provisioner`] cover the Ubuntu-style guest: empty
//! meta-data, plain user-data, a netplan network-config and the standard
//! launch script. Guest families only override what they do differently.
//!
//! ```yaml
//! nodes:
//!   - name: db1
//!     ipAddress: 10.1.0.21/24
//!     guestOs: Alma9        # meta-data interfaces block + nmcli bootcmd
//! ```

pub mod cloud_init;
pub mod netplan;
pub mod pipeline;
pub mod rhel;

use crate::cluster::allocator::{MacAddress, ManagementPort};
use crate::cluster::validate_name;
use crate::cluster::net::Ipv4Cidr;
use crate::cluster::resolve::ResolvedNode;
use crate::config::DeployConfig;
use crate::error::{DeployError, Result};
use crate::templates;
use cloud_init::UserData;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const CLOUD_INIT_DIR: &str = "cloud-init";
pub const ISO_NAME: &str = "cloud-init-provisioning.iso";
pub const SYSTEM_DISK: &str = "system.qcow2";

/// Linux interface names are limited to 15 bytes
pub const MAX_IFNAME_LEN: usize = 15;

pub fn data_disk_name(n: usize) -> String {
    format!("data{}.qcow2", n)
}

/// Guest operating systems a node can run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GuestOs {
    Ubuntu,
    Debian,
    CentOS7,
    CentOS8,
    Alma8,
    Alma9,
}

impl GuestOs {
    pub const ALL: [GuestOs; 6] = [
        GuestOs::Ubuntu, GuestOs::Debian, GuestOs::CentOS7,
        GuestOs::CentOS8, GuestOs::Alma8, GuestOs::Alma9,
    ];

    /// Identifier as written in cluster files
    pub fn name(&self) -> &'static str {
        match self {
            GuestOs::Ubuntu => "Ubuntu",
            GuestOs::Debian => "Debian GNU/Linux",
            GuestOs::CentOS7 => "CentOS7",
            GuestOs::CentOS8 => "CentOS8",
            GuestOs::Alma8 => "Alma8",
            GuestOs::Alma9 => "Alma9",
        }
    }
}

impl FromStr for GuestOs {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim();
        if wanted.eq_ignore_ascii_case("debian") {
            return Ok(GuestOs::Debian);
        }
        GuestOs::ALL.iter()
            .find(|os| os.name().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| format!("Unknown guest OS: {}", s))
    }
}

impl fmt::Display for GuestOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tap device and bridge of one virtual NIC, before a MAC is assigned
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NicPlan {
    pub tap: String,
    pub bridge: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nic {
    pub tap: String,
    pub bridge: String,
    pub mac: MacAddress,
}

/// Everything the generators need to know about one node
pub struct NodeContext<'a> {
    pub node: &'a ResolvedNode,
    /// The sudo-capable account created next to root
    pub guest_user: &'a str,
    pub password_hash: Option<&'a str>,
    /// In machine order, the first one is the primary interface
    pub nics: Vec<Nic>,
    pub port: ManagementPort,
}

impl<'a> NodeContext<'a> {
    pub fn primary_mac(&self) -> Result<MacAddress> {
        self.nics.first()
            .map(|nic| nic.mac)
            .ok_or_else(|| DeployError::Config(format!("node '{}' has no network interface", self.node.name)))
    }
}

/// A node whose artifacts are all on disk
#[derive(Clone, Debug)]
pub struct ProvisionedNode {
    pub name: String,
    pub dir: PathBuf,
    pub guest_os: String,
    pub port: ManagementPort,
    pub macs: Vec<MacAddress>,
    /// System disk plus data disks
    pub disks: usize,
}

/// Trait for guest OS provisioners
pub trait Provisioner: Send + Sync {
    fn guest_os(&self) -> GuestOs;

    /// One public NIC on the public bridge, two private NICs on the private one
    fn nic_plan(&self, node: &ResolvedNode, config: &DeployConfig) -> Vec<NicPlan> {
        let stem = tap_stem(node);
        vec![
            NicPlan { tap: format!("{}-pub", stem), bridge: config.public_bridge.clone() },
            NicPlan { tap: format!("{}-pri", stem), bridge: config.private_bridge.clone() },
            NicPlan { tap: format!("{}-pri1", stem), bridge: config.private_bridge.clone() },
        ]
    }

    /// Checks run for every node before anything is written
    fn validate(&self, node: &ResolvedNode, _config: &DeployConfig) -> Result<()> {
        validate_node_name(&node.name)?;
        node.ip_address.parse::<Ipv4Cidr>()
            .map_err(|e| DeployError::Config(format!("node '{}': {}", node.name, e)))?;
        Ok(())
    }

    fn generate_meta(&self, _ctx: &NodeContext) -> Result<String> {
        Ok(String::new())
    }

    fn user_data(&self, ctx: &NodeContext) -> Result<UserData> {
        Ok(UserData::for_node(ctx))
    }

    fn generate_user_data(&self, ctx: &NodeContext) -> Result<String> {
        self.user_data(ctx)?.render()
    }

    fn generate_network_config(&self, ctx: &NodeContext) -> Result<String> {
        templates::netplan(ctx)
    }

    fn generate_startup_script(&self, ctx: &NodeContext) -> Result<String> {
        templates::start_script(ctx)
    }

    fn generate_stop_script(&self, ctx: &NodeContext) -> Result<String> {
        templates::stop_script(ctx)
    }
}

// longest suffix appended to the stem
const TAP_SUFFIX_LEN: usize = "-pri1".len();

/// `tap<node>` while that fits the interface name limit, otherwise
/// `t<index>_` plus as much of the node name as fits. The index keeps
/// truncated names apart within a cluster.
pub fn tap_stem(node: &ResolvedNode) -> String {
    let budget = MAX_IFNAME_LEN - TAP_SUFFIX_LEN;
    let full = format!("tap{}", node.name);
    if full.len() <= budget {
        return full;
    }
    let prefix = format!("t{}_", node.index);
    let name: String = node.name.chars().take(budget.saturating_sub(prefix.len())).collect();
    format!("{}{}", prefix, name.trim_end_matches(['-', '_', '.']))
}

/// Node names become directory and tap device names
pub fn validate_node_name(name: &str) -> Result<()> {
    validate_name("node name", name)
}

/// Get the provisioner for a guest OS identifier
pub fn get_provisioner(guest_os: &str) -> std::result::Result<Box<dyn Provisioner>, String> {
    let os: GuestOs = guest_os.parse()?;
    match os {
        GuestOs::Ubuntu | GuestOs::Debian | GuestOs::CentOS7 => Ok(Box::new(netplan::NetplanProvisioner::new(os))),
        GuestOs::CentOS8 | GuestOs::Alma8 | GuestOs::Alma9 => Ok(Box::new(rhel::RhelProvisioner::new(os))),
    }
}

/// The provisioner for a resolved node, checked against the node
pub fn provisioner_for(node: &ResolvedNode, config: &DeployConfig) -> Result<Box<dyn Provisioner>> {
    let provisioner = get_provisioner(&node.guest_os).map_err(|_| DeployError::UnsupportedGuestOs {
        node: node.name.clone(),
        guest_os: node.guest_os.clone(),
    })?;
    provisioner.validate(node, config)?;
    Ok(provisioner)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::cluster::{DataDisk, Quantity};

    pub fn node(name: &str, guest_os: &str) -> ResolvedNode {
        ResolvedNode {
            name: name.to_string(),
            index: 0,
            ip_address: String::from("10.1.0.11/24"),
            cluster_name: String::from("demo"),
            domain_name: String::from("lab.example.net."),
            image_path: String::from("/images/jammy.img"),
            system_disk_size: Quantity::from("20G"),
            data_disks: vec![DataDisk::new("10G")],
            cpu: 2,
            mem: Quantity::from("4G"),
            mtu: 1500,
            gateway: String::from("10.1.0.1"),
            nameserver: String::from("10.1.0.2"),
            guest_os: guest_os.to_string(),
            authorized_keys: vec![String::from("keyA"), String::from("keyB")],
            qemubin: String::from("qemu-system-x86_64"),
        }
    }

    pub fn context<'a>(node: &'a ResolvedNode, config: &'a DeployConfig, provisioner: &dyn Provisioner) -> NodeContext<'a> {
        let nics = provisioner.nic_plan(node, config).into_iter().enumerate().map(|(i, plan)| Nic {
            tap: plan.tap,
            bridge: plan.bridge,
            mac: MacAddress([0x52, 0x54, 0x00, 0x00, 0x00, i as u8 + 1]),
        }).collect();
        NodeContext {
            node,
            guest_user: &config.guest_user,
            password_hash: config.guest_password_hash.as_deref(),
            nics,
            port: ManagementPort { display: 1 },
        }
    }
}
