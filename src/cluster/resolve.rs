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

//! Pushes cluster-level defaults down onto every node.

use crate::cluster::{ClusterSpec, DataDisk, NodeDefaults, NodeSpec, Quantity};
use crate::error::{DeployError, Result};
use std::collections::HashSet;

/// A node with every inheritable key filled in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedNode {
    pub name: String,
    /// Position in the cluster file
    pub index: usize,
    pub ip_address: String,
    pub cluster_name: String,
    pub domain_name: String,
    pub image_path: String,
    pub system_disk_size: Quantity,
    pub data_disks: Vec<DataDisk>,
    pub cpu: u32,
    pub mem: Quantity,
    pub mtu: u32,
    pub gateway: String,
    pub nameserver: String,
    pub guest_os: String,
    pub authorized_keys: Vec<String>,
    pub qemubin: String,
}

impl ResolvedNode {
    /// Search domain / fqdn suffix: the domain name without leading or trailing dots
    pub fn search_domain(&self) -> &str {
        self.domain_name.trim_matches('.')
    }

    pub fn fqdn(&self) -> String {
        let domain = self.search_domain();
        if domain.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, domain)
        }
    }
}

// keep whatever the node set, take the cluster value otherwise
macro_rules! inherit {
    ($node:expr, $cluster:expr, $($field:ident),+ $(,)?) => {
        $(
            if $node.$field.is_none() {
                $node.$field = $cluster.$field.clone();
            }
        )+
    };
}

impl NodeDefaults {
    pub fn inherit_from(&mut self, cluster: &NodeDefaults) {
        inherit!(self, cluster,
            cluster_name, domain_name, image_path, system_disk_size, data_disk_sizes,
            cpu, mem, mtu, gateway, nameserver, guest_os, authorized_keys, qemubin,
        );
    }
}

/// Copy cluster defaults onto every node that doesn't set the key itself.
///
/// Pure and idempotent: `flatten(&flatten(spec)) == flatten(spec)`. Nodes are
/// handled independently, so their order does not matter.
pub fn flatten(spec: &ClusterSpec) -> ClusterSpec {
    let mut flat = spec.clone();
    for node in flat.nodes.iter_mut() {
        node.settings.inherit_from(&spec.defaults);
    }
    flat
}

fn required<T: Clone>(node: &NodeSpec, key: &'static str, value: &Option<T>) -> Result<T> {
    value.clone().ok_or_else(|| DeployError::MissingConfigKey { node: node.name.clone(), key })
}

fn require_text(node: &NodeSpec, key: &'static str, value: &Option<String>) -> Result<String> {
    let text = required(node, key, value)?;
    if text.trim().is_empty() {
        return Err(DeployError::MissingConfigKey { node: node.name.clone(), key });
    }
    Ok(text)
}

/// Turn a flattened node into a [`ResolvedNode`], failing on the first key
/// that is still unset.
pub fn resolve_node(node: &NodeSpec) -> Result<ResolvedNode> {
    let s = &node.settings;
    if node.name.trim().is_empty() {
        return Err(DeployError::Config("every node needs a name".into()));
    }
    Ok(ResolvedNode {
        name: node.name.clone(),
        index: 0,
        ip_address: require_text(node, "ipAddress", &Some(node.ip_address.clone()))?,
        cluster_name: require_text(node, "clusterName", &s.cluster_name)?,
        domain_name: required(node, "domainName", &s.domain_name)?,
        image_path: require_text(node, "imagePath", &s.image_path)?,
        system_disk_size: required(node, "systemDiskSize", &s.system_disk_size)?,
        data_disks: required(node, "dataDiskSizes", &s.data_disk_sizes)?,
        cpu: required(node, "cpu", &s.cpu)?,
        mem: required(node, "mem", &s.mem)?,
        mtu: required(node, "mtu", &s.mtu)?,
        gateway: require_text(node, "gateway", &s.gateway)?,
        nameserver: require_text(node, "nameserver", &s.nameserver)?,
        guest_os: require_text(node, "guestOs", &s.guest_os)?,
        authorized_keys: required(node, "authorized-keys", &s.authorized_keys)?,
        qemubin: require_text(node, "qemubin", &s.qemubin)?,
    })
}

/// Flatten the cluster and resolve every node, in specification order.
pub fn resolve_nodes(spec: &ClusterSpec) -> Result<Vec<ResolvedNode>> {
    if spec.nodes.is_empty() {
        return Err(DeployError::Config("the cluster defines no nodes".into()));
    }
    let mut seen = HashSet::new();
    for node in spec.nodes.iter() {
        if !seen.insert(node.name.as_str()) {
            return Err(DeployError::Config(format!("node '{}' is defined more than once", node.name)));
        }
    }
    flatten(spec).nodes.iter().enumerate()
        .map(|(index, node)| resolve_node(node).map(|resolved| ResolvedNode { index, ..resolved }))
        .collect()
}
