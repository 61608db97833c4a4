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

use crate::error::{DeployError, ErrorContext, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process;

// read a whole file, naming the path when it fails
pub fn read_local_file(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(DeployError::Path(path.to_path_buf()));
    }
    fs::read_to_string(path).with_context(|| format!("unable to read file: {}", path.display()))
}

pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("unable to write file: {}", path.display()))
}

// scripts we generate are meant to be run by the operator (and root, for the taps)
pub fn write_executable(path: &Path, contents: &str) -> Result<()> {
    write_file(path, contents)?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("unable to chmod {}", path.display()))
}

pub fn is_executable(path: &Path) -> bool {
    let metadata = match fs::metadata(path) {
        Ok(x) => x, Err(_) => return false,
    };
    if !metadata.is_file() {
        return false;
    }
    metadata.permissions().mode() & 0o111 != 0
}

pub fn quit(s: &str) -> ! {
    // quit with a message - don't use this except in main.rs!
    eprintln!("{}", s);
    process::exit(0x01)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_read_local_file_success() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("cluster.yaml");
        fs::write(&file_path, "clusterName: demo\n").unwrap();

        let content = read_local_file(&file_path).unwrap();
        assert!(content.contains("clusterName: demo"));
    }

    #[test]
    fn test_read_local_file_missing() {
        let result = read_local_file(Path::new("/non/existent/cluster.yaml"));
        assert!(matches!(result, Err(DeployError::Path(_))));
    }

    #[test]
    fn test_write_executable() {
        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("start.sh");
        write_executable(&script, "#!/usr/bin/env bash\n").unwrap();

        assert!(is_executable(&script));
        assert_eq!(fs::read_to_string(&script).unwrap(), "#!/usr/bin/env bash\n");
    }

    #[test]
    fn test_write_file_into_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = write_file(&temp_dir.path().join("nope/meta-data"), "");
        assert!(matches!(result, Err(DeployError::Filesystem(_))));
    }

    #[test]
    fn test_is_executable_plain_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("user-data");
        let file = File::create(&file_path).unwrap();

        let mut perms = file.metadata().unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&file_path, perms).unwrap();

        assert!(!is_executable(&file_path));
    }

    #[test]
    fn test_is_executable_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_executable(temp_dir.path()));
    }

    #[test]
    fn test_is_executable_non_existent() {
        assert!(!is_executable(Path::new("/non/existent/file")));
    }
}
