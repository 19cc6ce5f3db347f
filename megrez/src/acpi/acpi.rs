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
#[path = "acpi_test.rs"]
mod tests;

use std::mem::size_of;

use snafu::Snafu;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{DebugTrace, trace_error};

pub const SIG_MCFG: [u8; 4] = *b"MCFG";

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("Expected table signature {expected:?}, got {got:?}"))]
    BadSignature { expected: [u8; 4], got: [u8; 4] },
    #[snafu(display("Table of {length} bytes cannot hold an allocation entry"))]
    TableTooShort { length: u32 },
    #[snafu(display("Table declares {declared} bytes but only {mapped} are mapped"))]
    Truncated { declared: u32, mapped: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[repr(C, align(4))]
#[derive(Debug, Clone, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
pub struct AcpiTableHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub asl_compiler_id: [u8; 4],
    pub asl_compiler_revision: u32,
}

#[repr(C, align(4))]
#[derive(Debug, Clone, Copy, Default, FromBytes, Immutable, IntoBytes, KnownLayout)]
pub struct AcpiMcfgAllocation {
    pub address: [u32; 2],
    pub pci_segment: u16,
    pub start_bus_number: u8,
    pub end_bus_number: u8,
    pub reserved: u32,
}

impl AcpiMcfgAllocation {
    pub fn base(&self) -> u64 {
        ((self.address[1] as u64) << 32) | self.address[0] as u64
    }

    pub fn contains_bus(&self, bus: u8) -> bool {
        (self.start_bus_number..=self.end_bus_number).contains(&bus)
    }
}

/// The allocation array starts after the header and 8 reserved bytes.
pub const MCFG_ALLOCATIONS_OFFSET: usize = size_of::<AcpiTableHeader>() + 8;

/// The extended-configuration regions declared by the guest's MCFG table,
/// captured once and immutable afterwards.
#[derive(Debug)]
pub struct McfgTable {
    allocations: Vec<AcpiMcfgAllocation>,
}

impl McfgTable {
    /// Validates the header of a mapped MCFG table and returns the declared
    /// table length. The table must hold at least one allocation entry.
    pub fn table_len(bytes: &[u8]) -> Result<u32> {
        let Ok((header, _)) = AcpiTableHeader::read_from_prefix(bytes) else {
            return error::Truncated {
                declared: size_of::<AcpiTableHeader>() as u32,
                mapped: bytes.len(),
            }
            .fail();
        };
        if header.signature != SIG_MCFG {
            return error::BadSignature {
                expected: SIG_MCFG,
                got: header.signature,
            }
            .fail();
        }
        let min = (MCFG_ALLOCATIONS_OFFSET + size_of::<AcpiMcfgAllocation>()) as u32;
        if header.length < min {
            return error::TableTooShort {
                length: header.length,
            }
            .fail();
        }
        Ok(header.length)
    }

    pub fn parse(bytes: &[u8]) -> Result<McfgTable> {
        let length = Self::table_len(bytes)? as usize;
        if bytes.len() < length {
            return error::Truncated {
                declared: length as u32,
                mapped: bytes.len(),
            }
            .fail();
        }
        let mut allocations = vec![];
        let mut entries = &bytes[MCFG_ALLOCATIONS_OFFSET..length];
        while let Ok((alloc, rest)) = AcpiMcfgAllocation::read_from_prefix(entries) {
            allocations.push(alloc);
            entries = rest;
        }
        Ok(McfgTable { allocations })
    }

    pub fn allocations(&self) -> &[AcpiMcfgAllocation] {
        &self.allocations
    }

    /// Base address of the 1-MiB extended-configuration window of `bus`,
    /// if some allocation covers it.
    pub fn ecam_base(&self, bus: u8) -> Option<u64> {
        let alloc = self.allocations.iter().find(|a| a.contains_bus(bus))?;
        Some(alloc.base() + (((bus - alloc.start_bus_number) as u64) << 20))
    }
}
