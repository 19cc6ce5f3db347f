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

use std::fmt::Write;

use crate::acpi::McfgTable;
use crate::hv::{GuestMem, MappedPages};
use crate::pci::Bdf;
use crate::pci::cap::{CapWalker, MsiMsgCtrl, PciCapId};
use crate::pci::config::{
    ConfigSpace, DeviceHeader, HEADER_TYPE_MASK, HeaderType, INTX_PIN_MASK, NR_EXPRESS_REGS,
    NR_HEADER_REGS, NR_LEGACY_REGS, REG_CAP_POINTER, REG_CLASS_REVISION, REG_COMMAND_STATUS,
    REG_HEADER_TYPE, REG_INTX, REG_VENDOR_DEVICE, Status,
};
use crate::pci::host::HostConfig;
use crate::visr::{Result, error};

/// Identity the cooperating driver's PCI match table binds to.
pub const VISR_VENDOR: u16 = 0xf00d;
pub const VISR_DEVICE: u16 = 0xbeef;

pub const SZ_EXPRESS_CONFIG: u64 = 4096;

/// A mapped view of the device's extended configuration page.
#[derive(Debug)]
pub struct MmcfgPage {
    pub gpa: u64,
    pub pages: Box<dyn MappedPages>,
}

/// A real PCI device presented to the privileged domain under a synthetic
/// identity.
#[derive(Debug)]
pub struct EmulatedDev {
    bdf: Bdf,
    cfg: ConfigSpace,
    msi_cap: u8,
    phys_vector: u8,
    virt_vector: u8,
    vcpu: Option<u64>,
    domain: Option<u64>,
    mmcfg: Option<MmcfgPage>,
}

impl EmulatedDev {
    /// Builds the synthetic register file from the device's live
    /// configuration, leaving real hardware untouched.
    ///
    /// The device must be a normal function with a capability chain
    /// carrying MSI. In strict mode it must also carry PCI Express and its
    /// bus must be covered by a captured MCFG allocation.
    pub fn virtualize(
        bdf: Bdf,
        host: HostConfig,
        mcfg: Option<&McfgTable>,
        mem: &dyn GuestMem,
        strict: bool,
    ) -> Result<EmulatedDev> {
        let mut hw = [0u32; NR_LEGACY_REGS];
        for (index, reg) in hw.iter_mut().enumerate() {
            *reg = host.read_reg(bdf, index as u8);
        }
        if hw[REG_VENDOR_DEVICE] == !0 {
            return error::Missing { bdf }.fail();
        }
        let header = DeviceHeader::from_regs(&hw[..NR_HEADER_REGS]);

        let header_type = header.common.header_type & HEADER_TYPE_MASK;
        if header_type != HeaderType::Device as u8 {
            return error::Bridge { bdf, header_type }.fail();
        }
        if !header.common.status.contains(Status::CAP) {
            return error::NoCapList { bdf }.fail();
        }

        let caps: Vec<_> = CapWalker::new(host, bdf, header.capability_pointer).collect();
        let msi = caps.iter().find(|(_, id)| *id == PciCapId::Msi as u8);
        let Some(&(msi_cap, _)) = msi else {
            return error::NoMsiCap { bdf }.fail();
        };
        if strict && !caps.iter().any(|(_, id)| *id == PciCapId::Pcie as u8) {
            return error::NoPcieCap { bdf }.fail();
        }

        let mmcfg = if strict {
            let base = mcfg.and_then(|table| table.ecam_base(bdf.bus()));
            let Some(base) = base else {
                return error::NoMcfgAllocation { bus: bdf.bus() }.fail();
            };
            let gpa = base + (((bdf.dev() as u64) << 15) | ((bdf.func() as u64) << 12));
            let pages = mem.map_gpa(gpa, SZ_EXPRESS_CONFIG)?;
            Some(MmcfgPage { gpa, pages })
        } else {
            None
        };

        let mut cfg = ConfigSpace::new(NR_EXPRESS_REGS);
        cfg.set_reg(
            REG_VENDOR_DEVICE,
            ((VISR_DEVICE as u32) << 16) | VISR_VENDOR as u32,
        );
        // Status and command survive, with the capability list always
        // advertised.
        cfg.set_reg(
            REG_COMMAND_STATUS,
            hw[REG_COMMAND_STATUS] | ((Status::CAP.bits() as u32) << 16),
        );
        cfg.set_reg(REG_CLASS_REVISION, hw[REG_CLASS_REVISION]);
        cfg.set_reg(REG_HEADER_TYPE, hw[REG_HEADER_TYPE]);
        // BAR dwords stay clear: both directions reach real hardware.
        cfg.set_reg(REG_CAP_POINTER, msi_cap as u32);
        // The pin survives; line-based routing does not.
        cfg.set_reg(REG_INTX, hw[REG_INTX] & INTX_PIN_MASK);

        // MSI becomes the sole, terminal capability: next pointer cleared,
        // message control sanitized, address and data left for the guest's
        // programming to be discarded.
        let msi_reg = (msi_cap >> 2) as usize;
        let ctrl = MsiMsgCtrl::from((hw[msi_reg] >> 16) as u16).sanitized();
        cfg.set_reg(
            msi_reg,
            ((u16::from(ctrl) as u32) << 16) | PciCapId::Msi as u32,
        );

        Ok(EmulatedDev {
            bdf,
            cfg,
            msi_cap,
            phys_vector: 0,
            virt_vector: 0,
            vcpu: None,
            domain: None,
            mmcfg,
        })
    }

    pub fn bdf(&self) -> Bdf {
        self.bdf
    }

    pub fn cfg(&self) -> &ConfigSpace {
        &self.cfg
    }

    /// Byte offset of the MSI capability, shared with the real device.
    pub fn msi_cap_offset(&self) -> u8 {
        self.msi_cap
    }

    pub fn phys_vector(&self) -> u8 {
        self.phys_vector
    }

    pub(crate) fn set_phys_vector(&mut self, vector: u8) {
        self.phys_vector = vector;
    }

    pub fn virt_vector(&self) -> u8 {
        self.virt_vector
    }

    pub fn vcpu(&self) -> Option<u64> {
        self.vcpu
    }

    pub fn domain(&self) -> Option<u64> {
        self.domain
    }

    pub fn is_bound(&self) -> bool {
        self.vcpu.is_some()
    }

    pub(crate) fn bind(&mut self, vcpu: u64, domain: u64, vector: u8) {
        self.vcpu = Some(vcpu);
        self.domain = Some(domain);
        self.virt_vector = vector;
    }

    pub fn mmcfg(&self) -> Option<&MmcfgPage> {
        self.mmcfg.as_ref()
    }

    /// Renders the legacy window in the form of `lspci -x`.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for row in 0..NR_LEGACY_REGS / 4 {
            let _ = write!(out, "{:02x}:", row * 16);
            for col in 0..4 {
                let reg = self.cfg.reg(row * 4 + col);
                for byte in reg.to_le_bytes() {
                    let _ = write!(out, " {byte:02x}");
                }
            }
            let _ = writeln!(out);
        }
        out
    }
}
