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
#[path = "config_test.rs"]
mod tests;

use std::mem::size_of;

use bitflags::bitflags;
use macros::Layout;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

#[derive(Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct Command(u16);

bitflags! {
    impl Command: u16 {
        const INTX_DISABLE = 1 << 10;
        const BUS_MASTER = 1 << 2;
        const MEM = 1 << 1;
        const IO = 1 << 0;
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

#[derive(Clone, Copy, Default, IntoBytes, FromBytes, KnownLayout, Immutable)]
#[repr(transparent)]
pub struct Status(u16);

bitflags! {
    impl Status: u16 {
        const PARITY_ERR = 1 << 15;
        const SYSTEM_ERR = 1 << 14;
        const RECEIVED_MASTER_ABORT = 1 << 13;
        const RECEIVED_TARGET_ABORT = 1 << 12;
        const CAP = 1 << 4;
        const INTX = 1 << 3;
    }
}

impl std::fmt::Debug for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeaderType {
    Device = 0,
    Bridge = 1,
}

/// Bit 7 of the header-type byte flags a multi-function device.
pub const HEADER_TYPE_MASK: u8 = 0x7f;

#[derive(Debug, Clone, Default, FromBytes, Immutable, KnownLayout, IntoBytes, Layout)]
#[repr(C, align(8))]
pub struct CommonHeader {
    pub vendor: u16,
    pub device: u16,
    pub command: Command,
    pub status: Status,
    pub revision: u8,
    pub prog_if: u8,
    pub subclass: u8,
    pub class: u8,
    pub cache_line_size: u8,
    pub latency_timer: u8,
    pub header_type: u8,
    pub bist: u8,
}

#[derive(Debug, Clone, Default, FromBytes, Immutable, KnownLayout, IntoBytes, Layout)]
#[repr(C, align(8))]
pub struct DeviceHeader {
    pub common: CommonHeader,
    pub bars: [u32; 6],
    pub cardbus_cis_pointer: u32,
    pub subsystem_vendor: u16,
    pub subsystem: u16,
    pub expansion_rom: u32,
    pub capability_pointer: u8,
    pub reserved: [u8; 7],
    pub intx_line: u8,
    pub intx_pin: u8,
    pub min_gnt: u8,
    pub max_lat: u8,
}

/// Dword indices into a type-0 configuration header.
pub const REG_VENDOR_DEVICE: usize = CommonHeader::OFFSET_VENDOR >> 2;
pub const REG_COMMAND_STATUS: usize = CommonHeader::OFFSET_COMMAND >> 2;
pub const REG_CLASS_REVISION: usize = CommonHeader::OFFSET_REVISION >> 2;
pub const REG_HEADER_TYPE: usize = CommonHeader::OFFSET_CACHE_LINE_SIZE >> 2;
pub const REG_BAR0: usize = DeviceHeader::OFFSET_BARS >> 2;
pub const REG_BAR5: usize = REG_BAR0 + 5;
pub const REG_CAP_POINTER: usize = DeviceHeader::OFFSET_CAPABILITY_POINTER >> 2;
pub const REG_INTX: usize = DeviceHeader::OFFSET_INTX_LINE >> 2;

/// The interrupt-pin byte within the `REG_INTX` dword.
pub const INTX_PIN_MASK: u32 = 0x0000_ff00;

pub const fn is_bar_reg(reg: usize) -> bool {
    reg >= REG_BAR0 && reg <= REG_BAR5
}

pub const NR_LEGACY_REGS: usize = 256 / size_of::<u32>();
pub const NR_EXPRESS_REGS: usize = 4096 / size_of::<u32>();
pub const NR_HEADER_REGS: usize = size_of::<DeviceHeader>() / size_of::<u32>();

impl DeviceHeader {
    /// Reinterprets the first 16 dwords of a register file as a type-0
    /// header.
    pub fn from_regs(regs: &[u32]) -> DeviceHeader {
        DeviceHeader::read_from_prefix(regs.as_bytes())
            .map(|(header, _)| header)
            .unwrap_or_default()
    }
}

/// Backing storage for an emulated device's visible configuration
/// registers, one 32-bit word per configuration dword.
#[derive(Debug)]
pub struct ConfigSpace {
    regs: Box<[u32]>,
}

impl ConfigSpace {
    pub fn new(nr_regs: usize) -> ConfigSpace {
        ConfigSpace {
            regs: vec![0; nr_regs].into_boxed_slice(),
        }
    }

    pub fn reg(&self, index: usize) -> u32 {
        let Some(val) = self.regs.get(index) else {
            log::error!("config space: read of invalid register {index:#x}");
            return 0;
        };
        *val
    }

    pub fn set_reg(&mut self, index: usize, val: u32) {
        let Some(reg) = self.regs.get_mut(index) else {
            log::error!("config space: write of invalid register {index:#x}");
            return;
        };
        *reg = val;
    }
}
