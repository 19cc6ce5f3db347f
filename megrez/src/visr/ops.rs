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

use crate::pci::Bdf;
use crate::visr::{Result, VISR_SUCCESS, Visr, error};

/// Control-plane requests issued by the privileged domain before emulation
/// starts.
pub const OP_MAP_MCFG: u64 = 1;
/// Argument: a packed BDF (bus 15:8, device 7:3, function 2:0).
pub const OP_EMULATE: u64 = 2;
pub const OP_ENABLE: u64 = 3;

pub fn dispatch(visr: &Visr, op: u64, arg: u64) -> Result<u64> {
    match op {
        OP_MAP_MCFG => {
            visr.map_mcfg(arg)?;
            Ok(VISR_SUCCESS)
        }
        OP_EMULATE => {
            visr.emulate(Bdf::from(arg as u16))?;
            Ok(VISR_SUCCESS)
        }
        OP_ENABLE => {
            visr.enable();
            Ok(VISR_SUCCESS)
        }
        _ => error::UnknownOp { op }.fail(),
    }
}
