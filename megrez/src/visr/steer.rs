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
#[path = "steer_test.rs"]
mod tests;

use crate::visr::{Error, Result, VISR_FAILURE, VISR_SUCCESS, Visr, error};

/// CPU-identification leaves the privileged domain's driver uses to hand
/// vectors to the hypervisor. The opcode arrives in the leaf register, the
/// vector in the operand register.
pub const LEAF_SAVE_PHYS_VECTOR: u32 = 0xf00d_beef;
pub const LEAF_POST_VIRT_VECTOR: u32 = 0xcafe_babe;

/// Vectors below 32 are exceptions; nothing above 255 exists.
pub const VECTOR_MIN: u64 = 32;
pub const VECTOR_MAX: u64 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SteerRequest {
    pub op: u32,
    pub vector: u64,
}

/// Dispatches a trapped synthetic CPU-identification request.
///
/// Returns `None` when the leaf belongs to someone else, `Some(Ok(code))`
/// with the result-register value when handled, and `Some(Err(_))` on a
/// driver contract violation.
pub fn handle_request(visr: &Visr, req: &SteerRequest) -> Option<Result<u64>> {
    match req.op {
        LEAF_SAVE_PHYS_VECTOR => Some(save_phys_vector(visr, req.vector)),
        LEAF_POST_VIRT_VECTOR => Some(post_virt_vector(visr, req.vector)),
        _ => None,
    }
}

fn checked_vector(vector: u64) -> Result<u8> {
    if (VECTOR_MIN..=VECTOR_MAX).contains(&vector) {
        Ok(vector as u8)
    } else {
        error::VectorOutOfRange { vector }.fail()
    }
}

/// First half of the handshake: the driver received a physical vector from
/// its OS and parks it here for later remapping.
fn save_phys_vector(visr: &Visr, vector: u64) -> Result<u64> {
    let vector = checked_vector(vector)?;
    match visr.bind_phys_vector(vector) {
        Ok(_) => Ok(VISR_SUCCESS),
        Err(Error::NoDeviceAvailable { .. }) => {
            log::warn!("no device available for physical vector {vector:#x}");
            Ok(VISR_FAILURE)
        }
        Err(e) => Err(e),
    }
}

/// Second half, fired on every interrupt: the physical vector landed in the
/// privileged domain and is re-delivered as the bound device's virtual
/// vector.
fn post_virt_vector(visr: &Visr, vector: u64) -> Result<u64> {
    let vector = checked_vector(vector)?;
    visr.post_virt_vector(vector)?;
    Ok(VISR_SUCCESS)
}
