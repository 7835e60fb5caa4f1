// Copyright 2025 minirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # minirpc CLI
//!
//! Command-line interface for minirpc.
//!
//! - `minirpc serve`: start a server publishing the demo `Foo` service over
//!   TCP, a unix socket, or the HTTP front-end
//! - `minirpc call`: make one call and print the JSON reply (for scripting)
//!
//! The pieces the binary wires together live here so they can be tested
//! without spawning a process.

pub mod call;
pub mod demo;

#[cfg(test)]
mod tests;
