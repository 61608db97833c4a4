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

use crate::api::DeployReport;
use crate::artifacts::ExternalCommand;
use crate::error::DeployError;
use crate::provisioners::ProvisionedNode;
use std::path::Path;
use std::sync::Arc;
use inline_colorization::{color_red, color_green, color_yellow, color_reset};

/// Trait for handling output from deployments
pub trait OutputHandler: Send + Sync {
    fn on_deploy_start(&self, cluster: &str, node_count: usize);
    fn on_deploy_end(&self, report: &DeployReport);

    fn on_node_start(&self, node: &str, guest_os: &str);
    fn on_node_ready(&self, node: &ProvisionedNode);
    fn on_node_failed(&self, node: &str, error: &DeployError);

    // Shared resources and external tools
    fn on_image_download(&self, _url: &str, _dest: &Path) {}
    fn on_image_cached(&self, _path: &Path) {}
    fn on_command(&self, _node: &str, _command: &ExternalCommand) {}

    fn log(&self, level: LogLevel, message: &str);
    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }
    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }
    fn warning(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }
    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A no-op output handler for when output is not needed
pub struct NullOutputHandler;

impl OutputHandler for NullOutputHandler {
    fn on_deploy_start(&self, _cluster: &str, _node_count: usize) {}
    fn on_deploy_end(&self, _report: &DeployReport) {}
    fn on_node_start(&self, _node: &str, _guest_os: &str) {}
    fn on_node_ready(&self, _node: &ProvisionedNode) {}
    fn on_node_failed(&self, _node: &str, _error: &DeployError) {}
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Terminal output: banners, a status line per node and a summary table
pub struct TerminalOutputHandler {
    pub verbosity: u32,
}

impl TerminalOutputHandler {
    pub fn new(verbosity: u32) -> Self {
        Self { verbosity }
    }
}

impl OutputHandler for TerminalOutputHandler {
    fn on_deploy_start(&self, cluster: &str, node_count: usize) {
        crate::util::terminal::banner(&format!("CLUSTER: {} ({} nodes)", cluster, node_count));
        println!();
    }

    fn on_deploy_end(&self, report: &DeployReport) {
        println!();
        crate::util::terminal::banner(&format!("DEPLOYED: {}", report.cluster_dir.display()));
        let rows: Vec<Vec<String>> = report.nodes.iter().map(|node| vec![
            node.name.clone(),
            node.guest_os.clone(),
            format!(":{} ({})", node.port.display, node.port.port()),
            node.macs.first().map(|m| m.to_string()).unwrap_or_default(),
            node.disks.to_string(),
        ]).collect();
        crate::util::terminal::table(&["node", "guest", "vnc", "mac", "disks"], &rows);

        if report.failed.is_empty() {
            println!("{color_green}start with {}/start_cluster.sh{color_reset}", report.cluster_dir.display());
        } else {
            let names: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
            println!("\n{color_red}FAILED NODES: {}{color_reset}", names.join(", "));
        }
    }

    fn on_node_start(&self, node: &str, guest_os: &str) {
        println!("{color_yellow}PROVISIONING{color_reset} => {} ({})", node, guest_os);
    }

    fn on_node_ready(&self, node: &ProvisionedNode) {
        println!("{color_green}OK{color_reset} => {}", node.name);
    }

    fn on_node_failed(&self, node: &str, error: &DeployError) {
        println!("{color_red}FAILED{color_reset} => {}", node);
        println!("  {}", error);
    }

    fn on_image_download(&self, url: &str, dest: &Path) {
        println!("  → downloading {} to {}", url, dest.display());
    }

    fn on_image_cached(&self, path: &Path) {
        if self.verbosity > 0 {
            println!("  → using cached image {}", path.display());
        }
    }

    fn on_command(&self, node: &str, command: &ExternalCommand) {
        if self.verbosity > 1 {
            println!("  [{}] {}", node, command);
        }
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug if self.verbosity >= 3 => println!("DEBUG: {}", message),
            LogLevel::Info if self.verbosity >= 1 => println!("INFO: {}", message),
            LogLevel::Warning => println!("WARNING: {}", message),
            LogLevel::Error => eprintln!("ERROR: {}", message),
            _ => {}
        }
    }
}

/// Thread-safe wrapper for output handlers
pub type OutputHandlerRef = Arc<dyn OutputHandler>;
