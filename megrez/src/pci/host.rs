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

use crate::hv::PortIo;
use crate::pci::{Bdf, ConfigAddress, PORT_CONFIG_ADDRESS, PORT_CONFIG_DATA};

/// Real hardware configuration space, reached through the legacy
/// CF8/CFC mechanism.
///
/// Reading clobbers the address latch; callers run before the guest is
/// released into the latched sequence or on the trapped path where the
/// latch is re-read anyway.
#[derive(Debug, Clone, Copy)]
pub struct HostConfig<'a> {
    pio: &'a dyn PortIo,
}

impl<'a> HostConfig<'a> {
    pub fn new(pio: &'a dyn PortIo) -> HostConfig<'a> {
        HostConfig { pio }
    }

    /// Reads one configuration dword of the device.
    pub fn read_reg(&self, bdf: Bdf, reg: u8) -> u32 {
        let addr = ConfigAddress::for_reg(bdf, reg);
        self.pio.write(PORT_CONFIG_ADDRESS, 4, addr.0);
        self.pio.read(PORT_CONFIG_DATA, 4)
    }
}
