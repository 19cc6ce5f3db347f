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

mod errors;
mod layout;

use proc_macro::TokenStream;

/// Generates `OFFSET_<FIELD>`, `SIZE_<FIELD>`, and `LAYOUT_<FIELD>`
/// associated consts for every named field of a struct.
#[proc_macro_derive(Layout)]
pub fn derive_layout(input: TokenStream) -> TokenStream {
    layout::derive_layout(input)
}

/// Rewrites an error enum for use with Snafu: attaches an implicit
/// `::snafu::Location` to every variant and marks `source`/`error` fields,
/// unboxing `Box<E>` sources so `?` converts from `E` directly.
#[proc_macro_attribute]
pub fn trace_error(attr: TokenStream, item: TokenStream) -> TokenStream {
    errors::trace_error(attr, item)
}

/// Derives `DebugTrace` and a `Debug` impl that renders the full cause chain
/// with the location captured at each level.
#[proc_macro_derive(DebugTrace)]
pub fn derive_debug_trace(input: TokenStream) -> TokenStream {
    errors::derive_debug_trace(input)
}
