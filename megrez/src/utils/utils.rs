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

pub fn truncate_u32(val: u32, size: u8) -> u32 {
    val & (u32::MAX >> (32 - ((size as u32) << 3)))
}

#[cfg(test)]
mod test {
    use super::truncate_u32;

    #[test]
    fn test_truncate_u32() {
        assert_eq!(truncate_u32(0x1234_5678, 1), 0x78);
        assert_eq!(truncate_u32(0x1234_5678, 2), 0x5678);
        assert_eq!(truncate_u32(0x1234_5678, 4), 0x1234_5678);
    }
}
