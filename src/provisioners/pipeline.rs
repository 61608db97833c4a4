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

//! The per-node provisioning steps, from base image to launch script.

use super::{data_disk_name, Nic, NodeContext, ProvisionedNode, Provisioner, CLOUD_INIT_DIR, ISO_NAME, SYSTEM_DISK};
use crate::artifacts::{self, CommandRunner, ExternalCommand, ImageCache};
use crate::cluster::allocator::ResourceAllocator;
use crate::cluster::resolve::ResolvedNode;
use crate::config::DeployConfig;
use crate::error::{DeployError, ErrorContext, Result};
use crate::output::OutputHandlerRef;
use crate::util::io::{write_executable, write_file};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Shared state every node of one deployment is provisioned against
pub struct NodePipeline<'a> {
    pub config: &'a DeployConfig,
    pub cluster_dir: &'a Path,
    pub images: &'a ImageCache,
    pub allocator: &'a ResourceAllocator,
    pub runner: &'a dyn CommandRunner,
    pub output: &'a OutputHandlerRef,
}

impl<'a> NodePipeline<'a> {
    pub fn provision(&self, node: &ResolvedNode, provisioner: &dyn Provisioner) -> Result<ProvisionedNode> {
        self.output.on_node_start(&node.name, provisioner.guest_os().name());

        let base = self.images.resolve(&node.image_path)?;
        // qemu-img resolves a relative backing file against the overlay's directory
        let base = fs::canonicalize(&base)
            .with_context(|| format!("resolving {}", base.display()))?;

        let node_dir = self.create_node_dir(&node.name)?;
        let cloud_init_dir = node_dir.join(CLOUD_INIT_DIR);

        let plan = provisioner.nic_plan(node, self.config);
        let macs = self.allocator.macs(plan.len())?;
        let port = self.allocator.management_port()?;
        let nics: Vec<Nic> = plan.into_iter().zip(macs.iter()).map(|(plan, mac)| Nic {
            tap: plan.tap,
            bridge: plan.bridge,
            mac: *mac,
        }).collect();
        let ctx = NodeContext {
            node,
            guest_user: &self.config.guest_user,
            password_hash: self.config.guest_password_hash.as_deref(),
            nics,
            port,
        };
        self.output.debug(&format!("{}: macs {:?}, vnc display :{}", node.name, ctx.nics.iter().map(|n| n.mac.to_string()).collect::<Vec<_>>(), port.display));

        write_file(&cloud_init_dir.join("meta-data"), &provisioner.generate_meta(&ctx)?)?;
        write_file(&cloud_init_dir.join("user-data"), &provisioner.generate_user_data(&ctx)?)?;
        write_file(&cloud_init_dir.join("network-config"), &provisioner.generate_network_config(&ctx)?)?;
        self.run(&node.name, &artifacts::cloud_init_iso(&cloud_init_dir, ISO_NAME))?;

        self.run(&node.name, &artifacts::overlay_disk(&base, &node_dir.join(SYSTEM_DISK), &node.system_disk_size))?;
        for (i, disk) in node.data_disks.iter().enumerate() {
            self.run(&node.name, &artifacts::blank_disk(&node_dir.join(data_disk_name(i + 1)), &disk.size))?;
        }

        write_executable(&node_dir.join("start.sh"), &provisioner.generate_startup_script(&ctx)?)?;
        write_executable(&node_dir.join("stop.sh"), &provisioner.generate_stop_script(&ctx)?)?;

        Ok(ProvisionedNode {
            name: node.name.clone(),
            dir: node_dir,
            guest_os: provisioner.guest_os().name().to_string(),
            port,
            macs,
            disks: 1 + node.data_disks.len(),
        })
    }

    fn create_node_dir(&self, name: &str) -> Result<PathBuf> {
        let node_dir = self.cluster_dir.join(name);
        match fs::create_dir(&node_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(DeployError::Config(format!("node directory {} already exists", node_dir.display())));
            }
            Err(e) => return Err(DeployError::Filesystem(format!("creating {}: {}", node_dir.display(), e))),
        }
        fs::create_dir(node_dir.join(CLOUD_INIT_DIR))
            .with_context(|| format!("creating {}/{}", node_dir.display(), CLOUD_INIT_DIR))?;
        Ok(node_dir)
    }

    // success also means the promised file is there
    fn run(&self, node: &str, command: &ExternalCommand) -> Result<()> {
        self.output.on_command(node, command);
        self.runner.run(command)?;
        if let Some(created) = &command.creates {
            if !created.exists() {
                return Err(DeployError::ExternalTool {
                    command: command.to_string(),
                    reason: format!("exited 0 but {} was not created", created.display()),
                });
            }
        }
        Ok(())
    }
}
