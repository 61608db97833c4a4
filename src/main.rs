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

use clap::Parser;
use kvmdeploy::cli::{Cli, Commands, DeployArgs};
use kvmdeploy::{
    ClusterDeployer, ClusterSpec, DeployConfig, DeployError, HostPlatform,
    TerminalOutputHandler, Result,
};
use kvmdeploy::util::io::quit;
use std::process;
use std::sync::Arc;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version go to stdout and are not failures
            let _ = e.print();
            process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };
    if let Err(e) = liftoff(&cli) {
        quit(&e.to_string());
    }
}

fn liftoff(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Deploy(args) => deploy(cli, args),
    }
}

fn deploy(cli: &Cli, args: &DeployArgs) -> Result<()> {
    let config = DeployConfig::load(&cli.settings)?;
    let spec = ClusterSpec::from_file(&args.file)?;
    let platform = HostPlatform::detect()?;

    let output = Arc::new(TerminalOutputHandler::new(u32::from(cli.verbose)));
    let report = ClusterDeployer::new(config)
        .with_output_handler(output)
        .with_platform(platform)
        .deploy(&spec)?;

    if !report.is_success() {
        let names: Vec<&str> = report.failed.iter().map(|(name, _)| name.as_str()).collect();
        return Err(DeployError::Other(format!("{} node(s) failed: {}", names.len(), names.join(", "))));
    }
    Ok(())
}
