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

use crate::cluster::allocator::MacVendor;
use crate::error::{DeployError, Result};
use crate::util::io::read_local_file;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What to do with the remaining nodes once one node fails
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first failed node (nothing is rolled back)
    Abort,
    /// Keep provisioning the other nodes and report every failure at the end
    Continue,
}

/// Process-wide settings, normally read once from `settings.yaml`.
///
/// Built once and handed to the deployer; nothing mutates it afterwards.
///
/// ```yaml
/// cloud-image-dir: ~/cloud-images
/// threads: 4
/// failure-policy: continue
/// mac-vendor: qemu
/// first-vnc-display: 10
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct DeployConfig {
    /// Shared cache for downloaded base images
    pub cloud_image_dir: PathBuf,
    /// Where cluster directories are created
    pub clusters_dir: PathBuf,
    /// Nodes provisioned concurrently
    pub threads: usize,
    pub failure_policy: FailurePolicy,
    pub mac_vendor: MacVendor,
    /// First VNC display handed out; the TCP port is 5900 + display
    pub first_vnc_display: u16,
    /// Fixed seed for MAC generation, random when unset
    pub allocator_seed: Option<u64>,
    pub tool_timeout_secs: u64,
    pub download_timeout_secs: u64,
    /// Bridge for the first (public) NIC of every node
    pub public_bridge: String,
    /// Bridge for the remaining (private) NICs
    pub private_bridge: String,
    /// Name of the sudo-capable account created in every guest
    pub guest_user: String,
    /// crypt(3) hash for console logins; the password stays locked without it
    pub guest_password_hash: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            cloud_image_dir: PathBuf::from("./cloud-images"),
            clusters_dir: PathBuf::from("."),
            threads: 1,
            failure_policy: FailurePolicy::Abort,
            mac_vendor: MacVendor::Qemu,
            first_vnc_display: 1,
            allocator_seed: None,
            tool_timeout_secs: 600,
            download_timeout_secs: 3600,
            public_bridge: String::from("br0"),
            private_bridge: String::from("br1"),
            guest_user: String::from("ubuntu"),
            guest_password_hash: None,
        }
    }
}

impl DeployConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `settings.yaml`. `cloud-image-dir` must be present, everything
    /// else falls back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = read_local_file(path)?;
        Self::from_yaml(&contents)
            .map_err(|e| DeployError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let settings: serde_yaml::Value = serde_yaml::from_str(contents)?;
        if settings.get("cloud-image-dir").map_or(true, serde_yaml::Value::is_null) {
            return Err(DeployError::Config("cloud-image-dir is required".into()));
        }
        let mut config: DeployConfig = serde_yaml::from_value(settings)?;
        config.cloud_image_dir = expand_home(&config.cloud_image_dir)?;
        config.clusters_dir = expand_home(&config.clusters_dir)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(DeployError::Config("threads must be at least 1".into()));
        }
        if self.public_bridge.is_empty() || self.private_bridge.is_empty() {
            return Err(DeployError::Config("bridge names must not be empty".into()));
        }
        if self.guest_user.is_empty() || self.guest_user == "root" {
            return Err(DeployError::Config("guest-user must name a non-root account".into()));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn cloud_image_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cloud_image_dir = path.into();
        self
    }

    pub fn clusters_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.clusters_dir = path.into();
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn mac_vendor(mut self, vendor: MacVendor) -> Self {
        self.mac_vendor = vendor;
        self
    }

    pub fn first_vnc_display(mut self, display: u16) -> Self {
        self.first_vnc_display = display;
        self
    }

    pub fn allocator_seed(mut self, seed: u64) -> Self {
        self.allocator_seed = Some(seed);
        self
    }

    pub fn tool_timeout_secs(mut self, secs: u64) -> Self {
        self.tool_timeout_secs = secs;
        self
    }

    pub fn bridges(mut self, public: &str, private: &str) -> Self {
        self.public_bridge = public.to_string();
        self.private_bridge = private.to_string();
        self
    }

    pub fn guest_user(mut self, user: &str) -> Self {
        self.guest_user = user.to_string();
        self
    }

    pub fn guest_password_hash(mut self, hash: &str) -> Self {
        self.guest_password_hash = Some(hash.to_string());
        self
    }
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    let text = path.to_str()
        .ok_or_else(|| DeployError::Config(format!("non UTF-8 path: {}", path.display())))?;
    if !text.starts_with('~') {
        return Ok(path.to_path_buf());
    }
    expanduser::expanduser(text)
        .map_err(|e| DeployError::Config(format!("cannot expand {}: {}", text, e)))
}
