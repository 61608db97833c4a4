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

//! Cluster-wide MAC address and VNC port allocation.
//!
//! Every node of a deployment draws from one [`ResourceAllocator`], so two
//! nodes can never end up with the same MAC or display, even when they are
//! provisioned on different threads.

use crate::error::{DeployError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Mutex;

/// Base TCP port of VNC display `:0`
pub const VNC_BASE_PORT: u16 = 5900;

// redraws before we decide the 2^23 space is exhausted
const MAX_MAC_ATTEMPTS: usize = 4096;

/// Vendor prefix (OUI) of generated MACs, per virtualization backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacVendor {
    /// 00:16:3e, allocated to XenSource
    Xen,
    /// 52:54:00, used by qemu/kvm
    Qemu,
}

impl MacVendor {
    pub fn oui(&self) -> [u8; 3] {
        match self {
            MacVendor::Xen => [0x00, 0x16, 0x3e],
            MacVendor::Qemu => [0x52, 0x54, 0x00],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub fn vendor_prefix(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

/// A VNC display number and the TCP port it listens on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManagementPort {
    pub display: u16,
}

impl ManagementPort {
    pub fn port(&self) -> u16 {
        VNC_BASE_PORT + self.display
    }
}

struct AllocationTable {
    rng: StdRng,
    macs: HashSet<MacAddress>,
    next_display: u32,
}

pub struct ResourceAllocator {
    vendor: MacVendor,
    table: Mutex<AllocationTable>,
}

impl ResourceAllocator {
    /// `seed` makes the MAC sequence reproducible; displays are handed out
    /// in increasing order starting at `first_display`.
    pub fn new(vendor: MacVendor, first_display: u16, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            vendor,
            table: Mutex::new(AllocationTable {
                rng,
                macs: HashSet::new(),
                next_display: u32::from(first_display),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, AllocationTable>> {
        self.table.lock().map_err(|_| DeployError::Allocation("allocation table poisoned".into()))
    }

    /// A MAC not handed out before by this allocator.
    pub fn mac(&self) -> Result<MacAddress> {
        let oui = self.vendor.oui();
        let mut table = self.lock()?;
        for _ in 0..MAX_MAC_ATTEMPTS {
            let candidate = MacAddress([
                oui[0], oui[1], oui[2],
                table.rng.gen::<u8>() & 0x7f,
                table.rng.gen::<u8>(),
                table.rng.gen::<u8>(),
            ]);
            if table.macs.insert(candidate) {
                return Ok(candidate);
            }
        }
        Err(DeployError::Allocation(format!(
            "no free MAC address left after {} attempts", MAX_MAC_ATTEMPTS
        )))
    }

    pub fn macs(&self, count: usize) -> Result<Vec<MacAddress>> {
        (0..count).map(|_| self.mac()).collect()
    }

    pub fn management_port(&self) -> Result<ManagementPort> {
        let mut table = self.lock()?;
        let display = table.next_display;
        if display > u32::from(u16::MAX - VNC_BASE_PORT) {
            return Err(DeployError::Allocation("VNC display numbers exhausted".into()));
        }
        table.next_display += 1;
        Ok(ManagementPort { display: display as u16 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mac_format_and_prefix() {
        let allocator = ResourceAllocator::new(MacVendor::Qemu, 1, Some(1));
        let mac = allocator.mac().unwrap();
        let text = mac.to_string();
        assert!(text.starts_with("52:54:00:"));
        assert_eq!(text.len(), 17);
        assert_eq!(text, text.to_lowercase());
        assert_eq!(mac.0[3] & 0x80, 0);
    }

    #[test]
    fn test_xen_prefix() {
        let allocator = ResourceAllocator::new(MacVendor::Xen, 1, Some(1));
        assert_eq!(allocator.mac().unwrap().vendor_prefix(), [0x00, 0x16, 0x3e]);
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = ResourceAllocator::new(MacVendor::Qemu, 1, Some(99));
        let b = ResourceAllocator::new(MacVendor::Qemu, 1, Some(99));
        assert_eq!(a.macs(6).unwrap(), b.macs(6).unwrap());
    }

    #[test]
    fn test_macs_are_unique() {
        let allocator = ResourceAllocator::new(MacVendor::Qemu, 1, Some(5));
        let macs = allocator.macs(2000).unwrap();
        let unique: HashSet<_> = macs.iter().collect();
        assert_eq!(unique.len(), macs.len());
    }

    #[test]
    fn test_ports_increase_from_base() {
        let allocator = ResourceAllocator::new(MacVendor::Qemu, 3, Some(1));
        let a = allocator.management_port().unwrap();
        let b = allocator.management_port().unwrap();
        assert_eq!(a.display, 3);
        assert_eq!(a.port(), 5903);
        assert_eq!(b.display, 4);
    }

    #[test]
    fn test_port_space_exhausted() {
        let last = u16::MAX - VNC_BASE_PORT;
        let allocator = ResourceAllocator::new(MacVendor::Qemu, last, Some(1));
        assert_eq!(allocator.management_port().unwrap().port(), u16::MAX);
        assert!(matches!(allocator.management_port(), Err(DeployError::Allocation(_))));
    }

    #[test]
    fn test_concurrent_allocation_never_collides() {
        let allocator = Arc::new(ResourceAllocator::new(MacVendor::Qemu, 1, None));
        let handles: Vec<_> = (0..8).map(|_| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                let macs = allocator.macs(3).unwrap();
                let port = allocator.management_port().unwrap();
                (macs, port)
            })
        }).collect();

        let mut macs = HashSet::new();
        let mut ports = HashSet::new();
        for handle in handles {
            let (m, p) = handle.join().unwrap();
            for mac in m {
                assert!(macs.insert(mac));
            }
            assert!(ports.insert(p));
        }
        assert_eq!(ports.len(), 8);
    }
}
