// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;

use parking_lot::Mutex;
use snafu::ResultExt;

use crate::hv::{GuestMem, IntrSender, MappedPages, PortIo, Result, error};
use crate::pci::{Bdf, ConfigAddress, NR_CONFIG_DATA_PORTS, PORT_CONFIG_ADDRESS, PORT_CONFIG_DATA};
use crate::utils::truncate_u32;

/// A host whose PCI configuration space is reached through the legacy
/// mechanism: an address latch plus per-device register files. Absent
/// registers read all-ones, like real hardware.
#[derive(Debug, Default)]
pub struct FakePortIo {
    latch: Mutex<u32>,
    regs: Mutex<HashMap<(Bdf, u8), u32>>,
}

impl FakePortIo {
    pub fn with_device(self, bdf: Bdf, regs: &[(u8, u32)]) -> FakePortIo {
        {
            let mut map = self.regs.lock();
            for (reg, val) in regs {
                map.insert((bdf, *reg), *val);
            }
        }
        self
    }

    pub fn reg(&self, bdf: Bdf, reg: u8) -> u32 {
        self.regs.lock().get(&(bdf, reg)).copied().unwrap_or(!0)
    }

    fn selected(&self) -> (Bdf, u8) {
        let addr = ConfigAddress::from(*self.latch.lock());
        (addr.bdf(), addr.reg())
    }
}

impl PortIo for FakePortIo {
    fn read(&self, port: u16, size: u8) -> u32 {
        match port {
            PORT_CONFIG_ADDRESS => *self.latch.lock(),
            p if (PORT_CONFIG_DATA..PORT_CONFIG_DATA + NR_CONFIG_DATA_PORTS).contains(&p) => {
                let (bdf, reg) = self.selected();
                let val = self.reg(bdf, reg);
                truncate_u32(val >> (8 * (p - PORT_CONFIG_DATA)), size)
            }
            _ => !0,
        }
    }

    fn write(&self, port: u16, size: u8, val: u32) {
        match port {
            PORT_CONFIG_ADDRESS => *self.latch.lock() = val,
            p if (PORT_CONFIG_DATA..PORT_CONFIG_DATA + NR_CONFIG_DATA_PORTS).contains(&p) => {
                let (bdf, reg) = self.selected();
                let mut regs = self.regs.lock();
                let Some(dword) = regs.get_mut(&(bdf, reg)) else {
                    return;
                };
                let shift = 8 * (p - PORT_CONFIG_DATA) as u32;
                let mask = truncate_u32(u32::MAX, size) << shift;
                *dword = (*dword & !mask) | ((val << shift) & mask);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeGuestMem {
    regions: Mutex<HashMap<u64, Vec<u8>>>,
}

impl FakeGuestMem {
    pub fn insert(&self, addr: u64, bytes: Vec<u8>) {
        self.regions.lock().insert(addr, bytes);
    }

    pub fn with_region(self, addr: u64, bytes: Vec<u8>) -> FakeGuestMem {
        self.insert(addr, bytes);
        self
    }

    fn map(&self, addr: u64, size: u64) -> Result<Box<dyn MappedPages>> {
        let regions = self.regions.lock();
        let bytes = regions
            .get(&addr)
            .filter(|bytes| bytes.len() >= size as usize)
            .map(|bytes| bytes[..size as usize].to_vec())
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
            .context(error::MapGuest { addr, size })?;
        Ok(Box::new(bytes.into_boxed_slice()))
    }
}

impl GuestMem for FakeGuestMem {
    fn map_gpa(&self, gpa: u64, size: u64) -> Result<Box<dyn MappedPages>> {
        self.map(gpa, size)
    }

    fn map_gva(&self, gva: u64, size: u64) -> Result<Box<dyn MappedPages>> {
        self.map(gva, size)
    }
}

#[derive(Debug, Default)]
pub struct FakeIntrSender {
    pub sent: Mutex<Vec<(u64, u8)>>,
}

impl IntrSender for FakeIntrSender {
    fn send(&self, vcpu: u64, vector: u8) -> Result<()> {
        self.sent.lock().push((vcpu, vector));
        Ok(())
    }
}
