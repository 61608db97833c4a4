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

use std::fmt;
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

/// Main error type for cluster deployment
#[derive(Debug)]
pub enum DeployError {
    /// Invalid or inconsistent cluster/settings configuration
    Config(String),

    /// An inheritable key is set neither on the node nor on the cluster
    MissingConfigKey { node: String, key: &'static str },

    /// A resolved path (usually the base image) does not exist
    Path(PathBuf),

    /// A delegated process failed, timed out or could not be started
    ExternalTool { command: String, reason: String },

    /// The host distribution is not one we know how to drive
    UnsupportedPlatform(String),

    /// A node asks for a guest OS that no provisioner handles
    UnsupportedGuestOs { node: String, guest_os: String },

    /// The cluster directory is already there, deployment refused
    ClusterExists(PathBuf),

    /// MAC or port space exhausted
    Allocation(String),

    /// Template rendering errors
    Template(String),

    /// Filesystem operation failed, with the path or step it was doing
    Filesystem(String),

    /// IO errors
    Io(io::Error),

    /// YAML parsing errors
    Yaml(serde_yaml::Error),

    /// Other errors
    Other(String),
}

impl fmt::Display for DeployError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DeployError::MissingConfigKey { node, key } => {
                write!(f, "Configuration error: node '{}' has no '{}' and the cluster defines no default", node, key)
            }
            DeployError::Path(path) => write!(f, "Path error: {} does not exist", path.display()),
            DeployError::ExternalTool { command, reason } => {
                write!(f, "External tool error: {}\n  command: {}", reason, command)
            }
            DeployError::UnsupportedPlatform(name) => write!(f, "Unsupported host platform: '{}'", name),
            DeployError::UnsupportedGuestOs { node, guest_os } => {
                write!(f, "Unsupported guest OS '{}' for node '{}'", guest_os, node)
            }
            DeployError::ClusterExists(path) => {
                write!(f, "Cluster directory {} already exists, refusing to deploy over it", path.display())
            }
            DeployError::Allocation(msg) => write!(f, "Allocation error: {}", msg),
            DeployError::Template(msg) => write!(f, "Template error: {}", msg),
            DeployError::Filesystem(msg) => write!(f, "Filesystem error: {}", msg),
            DeployError::Io(err) => write!(f, "IO error: {}", err),
            DeployError::Yaml(err) => write!(f, "YAML error: {}", err),
            DeployError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl StdError for DeployError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            DeployError::Io(err) => Some(err),
            DeployError::Yaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for DeployError {
    fn from(err: io::Error) -> Self {
        DeployError::Io(err)
    }
}

impl From<serde_yaml::Error> for DeployError {
    fn from(err: serde_yaml::Error) -> Self {
        DeployError::Yaml(err)
    }
}

impl From<handlebars::RenderError> for DeployError {
    fn from(err: handlebars::RenderError) -> Self {
        DeployError::Template(err.to_string())
    }
}

impl From<String> for DeployError {
    fn from(err: String) -> Self {
        DeployError::Other(err)
    }
}

impl From<&str> for DeployError {
    fn from(err: &str) -> Self {
        DeployError::Other(err.to_string())
    }
}

/// Result type alias for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;

/// Attach the operation or path to a bare io failure
pub trait ErrorContext<T> {
    fn context(self, context: &str) -> Result<T>;
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for io::Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| DeployError::Filesystem(format!("{}: {}", context, e)))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| DeployError::Filesystem(format!("{}: {}", f(), e)))
    }
}
