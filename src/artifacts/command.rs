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
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

// how much of a failing tool's stderr ends up in the error
const STDERR_TAIL_LINES: usize = 10;

/// A program and its arguments, never passed through a shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// File the command is expected to produce
    pub creates: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: &str) -> Self {
        Self { program: program.to_string(), args: Vec::new(), cwd: None, creates: None }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn creates<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.creates = Some(path.into());
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cwd = Some(path.into());
        self
    }

    fn failure(&self, reason: String) -> DeployError {
        DeployError::ExternalTool { command: self.to_string(), reason }
    }
}

impl fmt::Display for ExternalCommand {
    // shell-quoted, so the line can be pasted to reproduce a failure
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(line) => f.write_str(&line),
            Err(_) => write!(f, "{} {:?}", self.program, self.args),
        }
    }
}

/// Runs external commands; success means exit status 0.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &ExternalCommand) -> Result<()>;
}

/// Runs commands on this host, killing them once `timeout` expires.
pub struct HostCommandRunner {
    timeout: Duration,
}

impl HostCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for HostCommandRunner {
    fn run(&self, command: &ExternalCommand) -> Result<()> {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()
            .map_err(|e| command.failure(format!("runtime: {}", e)))?;

        rt.block_on(async {
            let mut cmd = tokio::process::Command::new(&command.program);
            cmd.args(&command.args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            if let Some(dir) = &command.cwd {
                cmd.current_dir(dir);
            }

            let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
                Err(_) => {
                    return Err(command.failure(format!("timed out after {:?}", self.timeout)))
                }
                Ok(Err(e)) => return Err(command.failure(format!("could not start: {}", e))),
                Ok(Ok(output)) => output,
            };

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let lines: Vec<&str> = stderr.lines().collect();
                let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
                return Err(command.failure(format!("{}\n{}", output.status, tail).trim_end().to_string()));
            }
            Ok(())
        })
    }
}
