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

use crate::error::{DeployError, Result};
use crate::util::io::read_local_file;
use std::path::Path;

const OS_RELEASE: &str = "/etc/os-release";

/// Host distribution families we can launch VMs on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostPlatform {
    /// Ubuntu and Debian, qemu from the distro's qemu-system-x86 package
    Debian { id: String },
    /// CentOS Stream, Rocky, Alma, RHEL - qemu-kvm lives in libexec
    RedHat { id: String },
}

impl HostPlatform {
    pub fn detect() -> Result<Self> {
        Self::from_os_release_file(Path::new(OS_RELEASE))
    }

    pub fn from_os_release_file(path: &Path) -> Result<Self> {
        let contents = read_local_file(path)
            .map_err(|_| DeployError::UnsupportedPlatform(format!("unreadable {}", path.display())))?;
        Self::from_os_release(&contents)
    }

    pub fn from_os_release(contents: &str) -> Result<Self> {
        let id = os_release_value(contents, "ID")
            .ok_or_else(|| DeployError::UnsupportedPlatform(String::from("no ID in os-release")))?;
        match id.as_str() {
            "ubuntu" | "debian" => Ok(HostPlatform::Debian { id }),
            "centos" | "rocky" | "almalinux" | "rhel" => Ok(HostPlatform::RedHat { id }),
            _ => Err(DeployError::UnsupportedPlatform(id)),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            HostPlatform::Debian { id } | HostPlatform::RedHat { id } => id,
        }
    }

    /// Virtualization binary used when the cluster file doesn't name one
    pub fn default_qemubin(&self) -> &'static str {
        match self {
            HostPlatform::Debian { .. } => "qemu-system-x86_64",
            HostPlatform::RedHat { .. } => "/usr/libexec/qemu-kvm",
        }
    }
}

fn os_release_value(contents: &str, key: &str) -> Option<String> {
    contents
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.trim().trim_matches('"').trim_matches('\'').to_lowercase())
        .filter(|v| !v.is_empty())
}
