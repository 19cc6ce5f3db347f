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

use assert_matches::assert_matches;
use rstest::rstest;

use crate::visr::steer::{
    LEAF_POST_VIRT_VECTOR, LEAF_SAVE_PHYS_VECTOR, SteerRequest, handle_request,
};
use crate::visr::tests::{new_visr, nic_bdf};
use crate::visr::{Error, VISR_FAILURE, VISR_SUCCESS};

fn req(op: u32, vector: u64) -> SteerRequest {
    SteerRequest { op, vector }
}

#[test]
fn test_foreign_leaf_falls_through() {
    let (visr, _, _) = new_visr();
    assert_matches!(handle_request(&visr, &req(0x4000_0000, 0x30)), None);
    assert_matches!(handle_request(&visr, &req(0, 0)), None);
}

#[test]
fn test_save_then_post() {
    let (visr, _, intr) = new_visr();
    visr.emulate(nic_bdf()).unwrap();

    let saved = handle_request(&visr, &req(LEAF_SAVE_PHYS_VECTOR, 0x30));
    assert_matches!(saved, Some(Ok(VISR_SUCCESS)));
    visr.bind_virt_vector(7, 2, 0x66).unwrap();

    let posted = handle_request(&visr, &req(LEAF_POST_VIRT_VECTOR, 0x30));
    assert_matches!(posted, Some(Ok(VISR_SUCCESS)));
    assert_eq!(*intr.sent.lock(), vec![(7, 0x66)]);
}

#[test]
fn test_save_without_devices_reports_failure() {
    let (visr, _, _) = new_visr();
    let saved = handle_request(&visr, &req(LEAF_SAVE_PHYS_VECTOR, 0x30));
    assert_matches!(saved, Some(Ok(VISR_FAILURE)));
}

#[rstest]
#[case(LEAF_SAVE_PHYS_VECTOR, 0)]
#[case(LEAF_SAVE_PHYS_VECTOR, 31)]
#[case(LEAF_SAVE_PHYS_VECTOR, 256)]
#[case(LEAF_POST_VIRT_VECTOR, 31)]
#[case(LEAF_POST_VIRT_VECTOR, u64::MAX)]
fn test_vector_out_of_range(#[case] op: u32, #[case] vector: u64) {
    let (visr, _, _) = new_visr();
    visr.emulate(nic_bdf()).unwrap();
    assert_matches!(
        handle_request(&visr, &req(op, vector)),
        Some(Err(Error::VectorOutOfRange { .. }))
    );
}

#[test]
fn test_post_never_bound_vector() {
    let (visr, _, intr) = new_visr();
    visr.emulate(nic_bdf()).unwrap();
    assert_matches!(
        handle_request(&visr, &req(LEAF_POST_VIRT_VECTOR, 0x40)),
        Some(Err(Error::VectorNotBound { vector: 0x40, .. }))
    );
    assert!(intr.sent.lock().is_empty());
}
