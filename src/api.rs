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

use crate::artifacts::{CommandRunner, HostCommandRunner, ImageCache};
use crate::cluster::allocator::ResourceAllocator;
use crate::cluster::platform::HostPlatform;
use crate::cluster::resolve::{resolve_nodes, ResolvedNode};
use crate::cluster::{validate_name, ClusterSpec};
use crate::config::{DeployConfig, FailurePolicy};
use crate::error::{DeployError, ErrorContext, Result};
use crate::output::{OutputHandler, OutputHandlerRef, NullOutputHandler};
use crate::provisioners::pipeline::NodePipeline;
use crate::provisioners::{provisioner_for, ProvisionedNode, Provisioner};
use crate::templates;
use crate::util::io::write_executable;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const START_CLUSTER_SCRIPT: &str = "start_cluster.sh";
pub const STOP_CLUSTER_SCRIPT: &str = "stop_cluster.sh";

/// Outcome of a deployment that got as far as creating the cluster directory
#[derive(Debug)]
pub struct DeployReport {
    pub cluster_dir: PathBuf,
    /// Provisioned nodes, in the order the cluster file lists them
    pub nodes: Vec<ProvisionedNode>,
    /// Nodes that failed while the failure policy was `continue`
    pub failed: Vec<(String, DeployError)>,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Main API for deploying clusters
pub struct ClusterDeployer {
    config: DeployConfig,
    output_handler: OutputHandlerRef,
    runner: Arc<dyn CommandRunner>,
    platform: Option<HostPlatform>,
}

impl ClusterDeployer {
    pub fn new(config: DeployConfig) -> Self {
        let runner = Arc::new(HostCommandRunner::new(config.tool_timeout()));
        Self {
            config,
            output_handler: Arc::new(NullOutputHandler),
            runner,
            platform: None,
        }
    }

    /// Set a custom output handler
    pub fn with_output_handler(mut self, handler: Arc<dyn OutputHandler>) -> Self {
        self.output_handler = handler;
        self
    }

    /// Replace the runner that executes qemu-img and cloud-localds
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Host platform supplying the default `qemubin`
    pub fn with_platform(mut self, platform: HostPlatform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Resolve every node and its provisioner without touching the disk.
    pub fn plan(&self, spec: &ClusterSpec) -> Result<Vec<(ResolvedNode, Box<dyn Provisioner>)>> {
        let cluster_name = spec.name()?;
        validate_name("clusterName", cluster_name)?;

        let mut spec = spec.clone();
        if spec.defaults.qemubin.is_none() {
            spec.defaults.qemubin = self.platform.as_ref().map(|p| p.default_qemubin().to_string());
        }

        let nodes = resolve_nodes(&spec)?;
        let mut planned = Vec::with_capacity(nodes.len());
        for node in nodes {
            if node.cluster_name != cluster_name {
                return Err(DeployError::Config(format!(
                    "node '{}' sets clusterName '{}' inside cluster '{}'",
                    node.name, node.cluster_name, cluster_name
                )));
            }
            let provisioner = provisioner_for(&node, &self.config)?;
            planned.push((node, provisioner));
        }
        Ok(planned)
    }

    /// Deploy a cluster into `<clusters-dir>/<clusterName>`.
    ///
    /// Refuses with [`DeployError::ClusterExists`] when that directory is
    /// already there. Nothing is rolled back after a failure.
    pub fn deploy(&self, spec: &ClusterSpec) -> Result<DeployReport> {
        let planned = self.plan(spec)?;
        let cluster_name = spec.name()?;
        let cluster_dir = self.create_cluster_dir(cluster_name)?;

        self.output_handler.on_deploy_start(cluster_name, planned.len());

        let images = ImageCache::new(&self.config.cloud_image_dir, self.config.download_timeout(), self.output_handler.clone());
        let allocator = ResourceAllocator::new(self.config.mac_vendor, self.config.first_vnc_display, self.config.allocator_seed);
        let pipeline = NodePipeline {
            config: &self.config,
            cluster_dir: &cluster_dir,
            images: &images,
            allocator: &allocator,
            runner: self.runner.as_ref(),
            output: &self.output_handler,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| DeployError::Config(format!("Failed to build thread pool: {}", e)))?;

        let abort = self.config.failure_policy == FailurePolicy::Abort;
        let stop = AtomicBool::new(false);
        let outcomes: Vec<Option<Result<ProvisionedNode>>> = pool.install(|| {
            planned.par_iter().map(|(node, provisioner)| {
                // nodes not started yet are skipped once one has failed
                if stop.load(Ordering::SeqCst) {
                    return None;
                }
                let outcome = pipeline.provision(node, provisioner.as_ref());
                match &outcome {
                    Ok(provisioned) => self.output_handler.on_node_ready(provisioned),
                    Err(e) => {
                        self.output_handler.on_node_failed(&node.name, e);
                        if abort {
                            stop.store(true, Ordering::SeqCst);
                        }
                    }
                }
                Some(outcome)
            }).collect()
        });

        let mut nodes = Vec::new();
        let mut failed = Vec::new();
        for ((node, _), outcome) in planned.iter().zip(outcomes) {
            match outcome {
                Some(Ok(provisioned)) => nodes.push(provisioned),
                Some(Err(e)) => failed.push((node.name.clone(), e)),
                None => self.output_handler.warning(&format!("{}: skipped", node.name)),
            }
        }
        if abort && !failed.is_empty() {
            let (_, error) = failed.remove(0);
            return Err(error);
        }

        write_cluster_scripts(&cluster_dir, cluster_name, &nodes)?;

        let report = DeployReport { cluster_dir, nodes, failed };
        self.output_handler.on_deploy_end(&report);
        Ok(report)
    }

    fn create_cluster_dir(&self, cluster_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.clusters_dir)
            .with_context(|| format!("creating {}", self.config.clusters_dir.display()))?;
        let cluster_dir = self.config.clusters_dir.join(cluster_name);
        match fs::create_dir(&cluster_dir) {
            Ok(()) => Ok(cluster_dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(DeployError::ClusterExists(cluster_dir)),
            Err(e) => Err(DeployError::Filesystem(format!("creating {}: {}", cluster_dir.display(), e))),
        }
    }
}

fn write_cluster_scripts(cluster_dir: &Path, cluster_name: &str, nodes: &[ProvisionedNode]) -> Result<()> {
    let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    write_executable(&cluster_dir.join(START_CLUSTER_SCRIPT), &templates::start_cluster_script(cluster_name, &names)?)?;
    write_executable(&cluster_dir.join(STOP_CLUSTER_SCRIPT), &templates::stop_cluster_script(cluster_name, &names)?)?;
    Ok(())
}
