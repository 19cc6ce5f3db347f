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

use std::mem::size_of;

use crate::pci::config::{
    CommonHeader, ConfigSpace, DeviceHeader, NR_EXPRESS_REGS, NR_HEADER_REGS, NR_LEGACY_REGS,
    REG_BAR0, REG_BAR5, REG_CAP_POINTER, REG_HEADER_TYPE, REG_INTX, Status, is_bar_reg,
};

#[test]
fn test_header_layout() {
    assert_eq!(size_of::<CommonHeader>(), 16);
    assert_eq!(size_of::<DeviceHeader>(), 64);
    assert_eq!(NR_HEADER_REGS, 16);
    assert_eq!(REG_BAR0, 4);
    assert_eq!(REG_BAR5, 9);
    assert_eq!(REG_HEADER_TYPE, 3);
    assert_eq!(REG_CAP_POINTER, 13);
    assert_eq!(REG_INTX, 15);
    assert_eq!(NR_LEGACY_REGS, 64);
    assert_eq!(NR_EXPRESS_REGS, 1024);
}

#[test]
fn test_is_bar_reg() {
    for reg in 0..NR_LEGACY_REGS {
        assert_eq!(is_bar_reg(reg), (4..=9).contains(&reg));
    }
}

#[test]
fn test_header_from_regs() {
    let mut regs = [0u32; NR_HEADER_REGS];
    regs[0] = 0x1234_10de;
    regs[1] = 0x0010_0006;
    regs[3] = 0x0080_0010;
    regs[13] = 0x0000_0050;
    regs[15] = 0x0000_0109;
    let header = DeviceHeader::from_regs(&regs);
    assert_eq!(header.common.vendor, 0x10de);
    assert_eq!(header.common.device, 0x1234);
    assert!(header.common.status.contains(Status::CAP));
    assert_eq!(header.common.header_type, 0x80);
    assert_eq!(header.capability_pointer, 0x50);
    assert_eq!(header.intx_line, 0x09);
    assert_eq!(header.intx_pin, 0x01);
}

#[test]
fn test_config_space_bounds() {
    let mut cfg = ConfigSpace::new(NR_LEGACY_REGS);
    cfg.set_reg(0, 0xbeef_f00d);
    assert_eq!(cfg.reg(0), 0xbeef_f00d);
    assert_eq!(cfg.reg(NR_LEGACY_REGS - 1), 0);
    // Out-of-range accesses are absorbed.
    cfg.set_reg(NR_LEGACY_REGS, 1);
    assert_eq!(cfg.reg(NR_LEGACY_REGS), 0);
}
