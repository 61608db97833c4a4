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

pub mod api;
pub mod artifacts;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod output;
pub mod provisioners;
pub mod templates;
pub mod util;

// Re-export commonly used types for library users
pub use api::{ClusterDeployer, DeployReport};
pub use artifacts::{CommandRunner, ExternalCommand, HostCommandRunner};
pub use cluster::platform::HostPlatform;
pub use cluster::ClusterSpec;
pub use config::{DeployConfig, FailurePolicy};
pub use error::{DeployError, Result};
pub use output::{OutputHandler, OutputHandlerRef, TerminalOutputHandler, NullOutputHandler, LogLevel};
pub use provisioners::{get_provisioner, GuestOs, ProvisionedNode, Provisioner};
