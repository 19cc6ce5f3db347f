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
pub(crate) mod test;

use std::fmt::Debug;

use snafu::Snafu;

use crate::errors::{DebugTrace, trace_error};

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, context(suffix(false)))]
pub enum Error {
    #[snafu(display("Failed to map guest memory at {addr:#x}, size {size:#x}"))]
    MapGuest {
        addr: u64,
        size: u64,
        error: std::io::Error,
    },
    #[snafu(display("Failed to inject vector {vector:#x} into vcpu {vcpu:#x}"))]
    Inject {
        vcpu: u64,
        vector: u8,
        error: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A trapped I/O instruction, as decoded by the exit-handling loop.
///
/// `write` is `Some(val)` for an OUT and `None` for an IN. For an OUT the
/// value has already been sent to real hardware unless the handler asks for
/// it to be discarded; for an IN the hardware-sourced value stands unless the
/// handler substitutes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoAccess {
    pub port: u16,
    pub write: Option<u32>,
    pub size: u8,
}

/// Raw port access to real hardware.
pub trait PortIo: Debug + Send + Sync + 'static {
    fn read(&self, port: u16, size: u8) -> u32;
    fn write(&self, port: u16, size: u8, val: u32);
}

/// A host view of mapped guest pages.
pub trait MappedPages: Debug + Send + Sync + 'static {
    fn bytes(&self) -> &[u8];
}

impl MappedPages for Box<[u8]> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

/// Maps guest memory into the hypervisor's address space.
pub trait GuestMem: Debug + Send + Sync + 'static {
    fn map_gpa(&self, gpa: u64, size: u64) -> Result<Box<dyn MappedPages>>;
    fn map_gva(&self, gva: u64, size: u64) -> Result<Box<dyn MappedPages>>;
}

/// Posts an external interrupt into a virtual CPU.
pub trait IntrSender: Debug + Send + Sync + 'static {
    fn send(&self, vcpu: u64, vector: u8) -> Result<()>;
}
