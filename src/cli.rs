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

//! Command line interface.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_SETTINGS: &str = "settings.yaml";

#[derive(Parser, Debug)]
#[command(name = "kvmdeploy", version, about = "Declarative KVM test clusters on a single host", long_about = None)]
pub struct Cli {
    /// Process-wide settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS)]
    pub settings: PathBuf,

    /// More output; repeat for commands and debug messages
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create every node of a cluster and its start/stop scripts
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Cluster definition (YAML)
    #[arg(short, long)]
    pub file: PathBuf,
}
