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
#[path = "intercept_test.rs"]
mod tests;

use crate::hv::IoAccess;
use crate::pci::config::is_bar_reg;
use crate::pci::{ConfigAddress, PORT_CONFIG_ADDRESS, PORT_CONFIG_DATA};
use crate::utils::truncate_u32;
use crate::visr::Visr;

/// What the exit-handling loop should do with a trapped access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoAction {
    /// The hardware-sourced value stands.
    Passthrough,
    /// Substitute this value for the hardware read.
    Emulate(u32),
    /// Suppress the guest write; real hardware never sees it.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    In,
    Out,
}

type Handler = fn(&Visr, &IoAccess) -> IoAction;

/// Only the 4 data ports carry emulation logic; the latch port and every
/// unmatched access pass through untouched.
static DATA_PORT_HANDLERS: [((u16, Dir), Handler); 8] = [
    ((PORT_CONFIG_DATA, Dir::In), data_in),
    ((PORT_CONFIG_DATA, Dir::Out), data_out),
    ((PORT_CONFIG_DATA + 1, Dir::In), data_in),
    ((PORT_CONFIG_DATA + 1, Dir::Out), data_out),
    ((PORT_CONFIG_DATA + 2, Dir::In), data_in),
    ((PORT_CONFIG_DATA + 2, Dir::Out), data_out),
    ((PORT_CONFIG_DATA + 3, Dir::In), data_in),
    ((PORT_CONFIG_DATA + 3, Dir::Out), data_out),
];

pub fn handle_io(visr: &Visr, access: &IoAccess) -> IoAction {
    if !visr.is_enabled() {
        return IoAction::Passthrough;
    }
    let dir = if access.write.is_some() {
        Dir::Out
    } else {
        Dir::In
    };
    let handler = DATA_PORT_HANDLERS
        .iter()
        .find(|(key, _)| *key == (access.port, dir));
    match handler {
        Some((_, handler)) => handler(visr, access),
        None => IoAction::Passthrough,
    }
}

fn latch(visr: &Visr) -> ConfigAddress {
    ConfigAddress::from(visr.pio().read(PORT_CONFIG_ADDRESS, 4))
}

fn data_in(visr: &Visr, access: &IoAccess) -> IoAction {
    let cf8 = latch(visr);
    let reg = cf8.reg() as usize;
    if is_bar_reg(reg) {
        // The device's real memory footprint stays visible; matched or
        // not, the hardware value stands.
        return IoAction::Passthrough;
    }
    let Some(val) = visr.emulated_reg(cf8.normalized(), reg) else {
        return IoAction::Passthrough;
    };
    let shift = 8 * (access.port - PORT_CONFIG_DATA) as u32;
    IoAction::Emulate(truncate_u32(val >> shift, access.size))
}

fn data_out(visr: &Visr, access: &IoAccess) -> IoAction {
    let cf8 = latch(visr);
    if is_bar_reg(cf8.reg() as usize) {
        return IoAction::Passthrough;
    }
    if visr.is_emulating(cf8.raw()) {
        log::trace!(
            "{}: dropped write of {:#x} to register {:#x}",
            cf8.bdf(),
            access.write.unwrap_or(0),
            cf8.reg()
        );
        IoAction::Discard
    } else {
        IoAction::Passthrough
    }
}
