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
#[path = "pci_test.rs"]
mod tests;

pub mod cap;
pub mod config;
pub mod host;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bitfield::bitfield;
use serde::{Deserialize, Deserializer};
use snafu::Snafu;

use crate::errors::{DebugTrace, trace_error};

/// Address latch port of the legacy configuration mechanism.
pub const PORT_CONFIG_ADDRESS: u16 = 0xcf8;
/// First of the 4 data ports windowing into the latched dword.
pub const PORT_CONFIG_DATA: u16 = 0xcfc;
pub const NR_CONFIG_DATA_PORTS: u16 = 4;

#[trace_error]
#[derive(Snafu, DebugTrace)]
#[snafu(module, visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    #[snafu(display("{s:?} is not a bus:device.function triple"))]
    ParseBdf { s: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

bitfield! {
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Bdf(u16);
    impl Debug;
    impl new;
    pub u8, bus, set_bus: 15, 8;
    pub u8, dev, set_dev: 7, 3;
    pub u8, func, set_func: 2, 0;
}

impl Display for Bdf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02x}:{:02x}.{:x}", self.bus(), self.dev(), self.func())
    }
}

impl From<u16> for Bdf {
    fn from(val: u16) -> Bdf {
        Bdf(val)
    }
}

impl FromStr for Bdf {
    type Err = Error;

    fn from_str(s: &str) -> Result<Bdf> {
        let parse = |part, limit| {
            u16::from_str_radix(part, 16)
                .ok()
                .filter(|v| *v < limit)
                .map(|v| v as u8)
        };
        let parts = s
            .split_once(':')
            .and_then(|(b, df)| df.split_once('.').map(|(d, f)| (b, d, f)));
        let Some((bus, dev, func)) = parts else {
            return error::ParseBdf { s }.fail();
        };
        match (parse(bus, 256), parse(dev, 32), parse(func, 8)) {
            (Some(b), Some(d), Some(f)) => Ok(Bdf::new(b, d, f)),
            _ => error::ParseBdf { s }.fail(),
        }
    }
}

impl<'de> Deserialize<'de> for Bdf {
    fn deserialize<D>(deserializer: D) -> Result<Bdf, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

bitfield! {
    /// The 32-bit value held by the 0xCF8 address latch.
    #[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
    pub struct ConfigAddress(u32);
    impl Debug;
    impl new;
    pub bool, enabled, set_enabled: 31;
    pub u8, bus, set_bus: 23, 16;
    pub u8, dev, set_dev: 15, 11;
    pub u8, func, set_func: 10, 8;
    pub u8, reg, set_reg: 7, 2;
}

impl From<u32> for ConfigAddress {
    fn from(val: u32) -> ConfigAddress {
        ConfigAddress(val)
    }
}

impl ConfigAddress {
    pub fn raw(self) -> u32 {
        self.0
    }

    /// The key form: enable bit set, register and reserved bits clear.
    pub fn from_bdf(bdf: Bdf) -> ConfigAddress {
        ConfigAddress::new(true, bdf.bus(), bdf.dev(), bdf.func(), 0)
    }

    pub fn for_reg(bdf: Bdf, reg: u8) -> ConfigAddress {
        ConfigAddress::new(true, bdf.bus(), bdf.dev(), bdf.func(), reg)
    }

    /// Drops the register selection, keeping device granularity.
    pub fn normalized(self) -> ConfigAddress {
        ConfigAddress(self.0 & !0xff)
    }

    pub fn bdf(self) -> Bdf {
        Bdf::new(self.bus(), self.dev(), self.func())
    }
}
