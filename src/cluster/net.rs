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

//! Static IPv4 addressing of a node's primary interface.

use crate::error::{DeployError, Result};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Prefix length assumed when `ipAddress` carries none
pub const DEFAULT_PREFIX: u8 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ipv4Cidr {
    pub address: Ipv4Addr,
    pub prefix: u8,
}

impl Ipv4Cidr {
    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DeployError::Config(format!("'{}' is not an IPv4 address", s));
        let (address, prefix) = match s.trim().split_once('/') {
            Some((address, prefix)) => (address, prefix.parse::<u8>().map_err(|_| invalid())?),
            None => (s.trim(), DEFAULT_PREFIX),
        };
        if prefix > 32 {
            return Err(invalid());
        }
        let address = address.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        Ok(Ipv4Cidr { address, prefix })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}
