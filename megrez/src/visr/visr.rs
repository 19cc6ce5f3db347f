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

#[cfg(test)]
#[path = "visr_test.rs"]
mod tests;

pub mod device;
pub mod intercept;
pub mod ops;
pub mod steer;

use std::collections::HashMap;
use std::mem::size_of;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde::Deserialize;
use snafu::Snafu;

use crate::acpi::{AcpiTableHeader, McfgTable};
use crate::errors::{DebugTrace, trace_error};
use crate::hv::{GuestMem, IntrSender, PortIo};
use crate::pci::host::HostConfig;
use crate::pci::{Bdf, ConfigAddress};
use crate::visr::device::EmulatedDev;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("No device present at {bdf}"))]
    Missing { bdf: Bdf },
    #[snafu(display("{bdf} is a PCI bridge (header type {header_type:#x})"))]
    Bridge { bdf: Bdf, header_type: u8 },
    #[snafu(display("{bdf} does not advertise a capability list"))]
    NoCapList { bdf: Bdf },
    #[snafu(display("{bdf} has no MSI capability"))]
    NoMsiCap { bdf: Bdf },
    #[snafu(display("{bdf} has no PCI Express capability"))]
    NoPcieCap { bdf: Bdf },
    #[snafu(display("No MCFG allocation covers bus {bus:#x}"))]
    NoMcfgAllocation { bus: u8 },
    #[snafu(display("No device is eligible for a physical vector"))]
    NoDeviceAvailable,
    #[snafu(display("Vector {vector:#x} is outside the deliverable range"))]
    VectorOutOfRange { vector: u64 },
    #[snafu(display("Vector {vector:#x} is not bound to any device"))]
    VectorNotBound { vector: u8 },
    #[snafu(display("{bdf} has no owning vcpu or virtual vector"))]
    NotBoundToVcpu { bdf: Bdf },
    #[snafu(display("Unknown request {op:#x}"))]
    UnknownOp { op: u64 },
    #[snafu(display("Failed to capture the MCFG table"), context(false))]
    Acpi { source: Box<crate::acpi::Error> },
    #[snafu(display("Hypervisor internal error"), context(false))]
    Hv { source: Box<crate::hv::Error> },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Result-register codes shared by the synthetic-request and control-plane
/// surfaces.
pub const VISR_SUCCESS: u64 = 0;
pub const VISR_FAILURE: u64 = u64::MAX;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisrConfig {
    /// Require a PCI Express capability and a decodable extended
    /// configuration window for every virtualized device.
    #[serde(default)]
    pub strict: bool,
    /// Devices to virtualize at construction time.
    #[serde(default)]
    pub devices: Vec<Bdf>,
}

#[derive(Debug, Default)]
struct DeviceTable {
    /// Devices in registration order; never removed.
    devs: Vec<EmulatedDev>,
    by_addr: HashMap<ConfigAddress, usize>,
    by_vector: HashMap<u8, usize>,
}

/// The interrupt-steering device registry.
///
/// One instance per host; shared by the trapped-I/O and synthetic-request
/// paths of every physical CPU.
#[derive(Debug)]
pub struct Visr {
    table: RwLock<DeviceTable>,
    mcfg: RwLock<Option<McfgTable>>,
    pio: Arc<dyn PortIo>,
    mem: Arc<dyn GuestMem>,
    intr: Arc<dyn IntrSender>,
    strict: bool,
    enabled: AtomicBool,
}

impl Visr {
    pub fn new(
        config: &VisrConfig,
        pio: Arc<dyn PortIo>,
        mem: Arc<dyn GuestMem>,
        intr: Arc<dyn IntrSender>,
    ) -> Result<Arc<Visr>> {
        let visr = Arc::new(Visr {
            table: RwLock::new(DeviceTable::default()),
            mcfg: RwLock::new(None),
            pio,
            mem,
            intr,
            strict: config.strict,
            enabled: AtomicBool::new(false),
        });
        for bdf in &config.devices {
            visr.emulate(*bdf)?;
        }
        Ok(visr)
    }

    /// Starts virtualizing the device at `bdf`. A second request for the
    /// same device is a no-op success.
    pub fn emulate(&self, bdf: Bdf) -> Result<()> {
        let key = ConfigAddress::from_bdf(bdf);
        let mut table = self.table.write();
        if table.by_addr.contains_key(&key) {
            return Ok(());
        }
        let host = HostConfig::new(self.pio.as_ref());
        let mcfg = self.mcfg.read();
        let dev = EmulatedDev::virtualize(bdf, host, mcfg.as_ref(), self.mem.as_ref(), self.strict)?;
        log::info!("{bdf}: virtualized, MSI capability at {:#x}", dev.msi_cap_offset());
        log::debug!("{bdf}: config space\n{}", dev.dump());
        let index = table.devs.len();
        table.devs.push(dev);
        table.by_addr.insert(key, index);
        Ok(())
    }

    /// Arms the trapped-access paths. Devices are never removed once
    /// emulation is enabled.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether the latch value addresses a virtualized device.
    pub fn is_emulating(&self, addr: u32) -> bool {
        let key = ConfigAddress::from(addr).normalized();
        self.table.read().by_addr.contains_key(&key)
    }

    pub fn with_device<T>(&self, bdf: Bdf, f: impl FnOnce(&EmulatedDev) -> T) -> Option<T> {
        let key = ConfigAddress::from_bdf(bdf);
        let table = self.table.read();
        let &index = table.by_addr.get(&key)?;
        Some(f(&table.devs[index]))
    }

    pub(crate) fn emulated_reg(&self, key: ConfigAddress, reg: usize) -> Option<u32> {
        let table = self.table.read();
        let &index = table.by_addr.get(&key)?;
        Some(table.devs[index].cfg().reg(reg))
    }

    pub(crate) fn pio(&self) -> &dyn PortIo {
        self.pio.as_ref()
    }

    /// Assigns `vector` to the first device that does not hold one yet,
    /// in registration order.
    pub fn bind_phys_vector(&self, vector: u8) -> Result<Bdf> {
        let mut table = self.table.write();
        if let Some(&index) = table.by_vector.get(&vector) {
            // A vector is never handed to two devices; repeating the
            // request keeps the existing binding.
            let bdf = table.devs[index].bdf();
            log::warn!("{bdf}: physical vector {vector:#x} already bound");
            return Ok(bdf);
        }
        let unbound = table
            .devs
            .iter_mut()
            .enumerate()
            .find(|(_, dev)| dev.phys_vector() == 0);
        let Some((index, dev)) = unbound else {
            return error::NoDeviceAvailable.fail();
        };
        dev.set_phys_vector(vector);
        let bdf = dev.bdf();
        table.by_vector.insert(vector, index);
        log::info!("{bdf}: bound physical vector {vector:#x}");
        Ok(bdf)
    }

    /// Binds the virtual half of the handshake: the first device holding a
    /// physical vector but no owning vcpu receives `vector` and is handed
    /// to `vcpu`.
    pub fn bind_virt_vector(&self, vcpu: u64, domain: u64, vector: u8) -> Result<Bdf> {
        let mut table = self.table.write();
        let eligible = table
            .devs
            .iter_mut()
            .find(|dev| dev.phys_vector() != 0 && !dev.is_bound());
        let Some(dev) = eligible else {
            return error::NoDeviceAvailable.fail();
        };
        dev.bind(vcpu, domain, vector);
        let bdf = dev.bdf();
        log::info!("{bdf}: virtual vector {vector:#x} owned by vcpu {vcpu:#x}");
        Ok(bdf)
    }

    /// Forwards a fired physical vector as the bound device's virtual
    /// vector, injected into its owning vcpu.
    pub fn post_virt_vector(&self, vector: u8) -> Result<()> {
        let (bdf, vcpu, virt) = {
            let table = self.table.read();
            let Some(&index) = table.by_vector.get(&vector) else {
                return error::VectorNotBound { vector }.fail();
            };
            let dev = &table.devs[index];
            (dev.bdf(), dev.vcpu(), dev.virt_vector())
        };
        let Some(vcpu) = vcpu else {
            return error::NotBoundToVcpu { bdf }.fail();
        };
        if virt == 0 {
            return error::NotBoundToVcpu { bdf }.fail();
        }
        log::trace!("{bdf}: vector {vector:#x} -> vcpu {vcpu:#x} vector {virt:#x}");
        self.intr.send(vcpu, virt)?;
        Ok(())
    }

    /// Captures the guest's MCFG allocation table, mapped by its
    /// guest-virtual address. The first capture wins.
    pub fn map_mcfg(&self, gva: u64) -> Result<()> {
        let header = self.mem.map_gva(gva, size_of::<AcpiTableHeader>() as u64)?;
        let length = McfgTable::table_len(header.bytes())?;
        let mapped = self.mem.map_gva(gva, length as u64)?;
        let table = McfgTable::parse(mapped.bytes())?;
        let mut mcfg = self.mcfg.write();
        if mcfg.is_some() {
            log::warn!("MCFG table already captured, ignoring");
            return Ok(());
        }
        log::info!("MCFG: captured {} allocation(s)", table.allocations().len());
        *mcfg = Some(table);
        Ok(())
    }
}
