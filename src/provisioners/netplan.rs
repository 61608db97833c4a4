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

//! Guests configured through netplan: Ubuntu, Debian and CentOS7.
//!
//! Everything comes from the [`Provisioner`] defaults.

use super::{GuestOs, Provisioner};

pub struct NetplanProvisioner {
    guest_os: GuestOs,
}

impl NetplanProvisioner {
    pub fn new(guest_os: GuestOs) -> Self {
        Self { guest_os }
    }
}

impl Provisioner for NetplanProvisioner {
    fn guest_os(&self) -> GuestOs {
        self.guest_os
    }
}
