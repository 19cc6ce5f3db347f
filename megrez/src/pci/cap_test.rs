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

use crate::hv::test::FakePortIo;
use crate::pci::Bdf;
use crate::pci::cap::{CapWalker, MsiMsgCtrl, NR_MAX_CAPS, PciCapId};
use crate::pci::host::HostConfig;

#[test]
fn test_msi_msg_ctrl() {
    let ctrl = MsiMsgCtrl::from(0x01ff);
    assert!(ctrl.enabled());
    assert_eq!(ctrl.multi_msg_capable(), 0x7);
    assert_eq!(ctrl.multi_msg_enabled(), 0x7);
    assert!(ctrl.addr64());
    assert!(ctrl.per_vector_masking());

    let clean = ctrl.sanitized();
    assert_eq!(u16::from(clean), 0x0080);
    assert!(!MsiMsgCtrl::from(0x017f).sanitized().addr64());
}

#[test]
fn test_cap_walker() {
    let bdf = Bdf::new(3, 0, 0);
    let pio = FakePortIo::default()
        .with_device(bdf, &[(0x50 >> 2, 0x0000_6005), (0x60 >> 2, 0x0000_0010)]);
    let host = HostConfig::new(&pio);

    let caps: Vec<_> = CapWalker::new(host, bdf, 0x50).collect();
    assert_eq!(
        caps,
        vec![(0x50, PciCapId::Msi as u8), (0x60, PciCapId::Pcie as u8)]
    );
}

#[test]
fn test_cap_walker_no_chain() {
    let bdf = Bdf::new(0, 1, 0);
    let pio = FakePortIo::default().with_device(bdf, &[]);
    let host = HostConfig::new(&pio);
    assert_eq!(CapWalker::new(host, bdf, 0).count(), 0);
    // Offsets inside the predefined header terminate the walk.
    assert_eq!(CapWalker::new(host, bdf, 0x3c).count(), 0);
}

#[test]
fn test_cap_walker_loop_guard() {
    let bdf = Bdf::new(0, 1, 0);
    // The entry at 0x40 points back at itself.
    let pio = FakePortIo::default().with_device(bdf, &[(0x40 >> 2, 0x0000_4009)]);
    let host = HostConfig::new(&pio);
    assert_eq!(CapWalker::new(host, bdf, 0x40).count(), NR_MAX_CAPS as usize);
}
