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

//! Everything that leaves the process: disk images, the cloud-init ISO and
//! base image downloads.

pub mod command;
pub mod image;

pub use command::{CommandRunner, ExternalCommand, HostCommandRunner};
pub use image::{ImageCache, ImageSource};

use crate::cluster::Quantity;
use std::path::Path;

pub const QEMU_IMG: &str = "qemu-img";
pub const CLOUD_LOCALDS: &str = "cloud-localds";

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Copy-on-write system disk backed by `base`
pub fn overlay_disk(base: &Path, target: &Path, size: &Quantity) -> ExternalCommand {
    ExternalCommand::new(QEMU_IMG)
        .args(["create", "-f", "qcow2", "-F", "qcow2", "-b"])
        .arg(path_arg(base))
        .arg(path_arg(target))
        .arg(size.to_string())
        .creates(target)
}

/// Empty, independent qcow2 disk
pub fn blank_disk(target: &Path, size: &Quantity) -> ExternalCommand {
    ExternalCommand::new(QEMU_IMG)
        .args(["create", "-f", "qcow2"])
        .arg(path_arg(target))
        .arg(size.to_string())
        .creates(target)
}

/// NoCloud seed ISO from the three cloud-init documents in `cloud_init_dir`
pub fn cloud_init_iso(cloud_init_dir: &Path, iso_name: &str) -> ExternalCommand {
    let iso = cloud_init_dir.join(iso_name);
    ExternalCommand::new(CLOUD_LOCALDS)
        .arg("-v")
        .arg(format!("--network-config={}", path_arg(&cloud_init_dir.join("network-config"))))
        .arg(path_arg(&iso))
        .arg(path_arg(&cloud_init_dir.join("user-data")))
        .arg(path_arg(&cloud_init_dir.join("meta-data")))
        .creates(iso)
}
