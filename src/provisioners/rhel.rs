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

//! CentOS8, Alma8 and Alma9 guests.
//!
//! These bring eth0 up from the `network-interfaces` block in meta-data and
//! get no network-config; NetworkManager has to be told to connect the
//! device at boot.

use super::cloud_init::UserData;
use super::{GuestOs, NodeContext, Provisioner};
use crate::error::Result;
use crate::templates;

pub const CONNECT_PRIMARY: &str = "nmcli device connect eth0";

pub struct RhelProvisioner {
    guest_os: GuestOs,
}

impl RhelProvisioner {
    pub fn new(guest_os: GuestOs) -> Self {
        Self { guest_os }
    }
}

impl Provisioner for RhelProvisioner {
    fn guest_os(&self) -> GuestOs {
        self.guest_os
    }

    fn generate_meta(&self, ctx: &NodeContext) -> Result<String> {
        templates::interfaces_meta(ctx)
    }

    fn user_data(&self, ctx: &NodeContext) -> Result<UserData> {
        let mut user_data = UserData::for_node(ctx);
        user_data.bootcmd.push(CONNECT_PRIMARY.to_string());
        Ok(user_data)
    }

    fn generate_network_config(&self, _ctx: &NodeContext) -> Result<String> {
        Ok(String::new())
    }
}
