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

//! One-shot calls for `minirpc call`.

use std::time::Duration;

use anyhow::{Context, Result};
use minirpc_client::xdial;
use minirpc_common::protocol::{CodecType, Options};
use serde_json::Value;

/// Options used by the CLI: the JSON codec, so any JSON argument reaches
/// the server unchanged and any reply prints back as JSON.
pub fn call_options() -> Options {
    Options::default().with_codec(CodecType::Json)
}

/// Parses the `--args` value.
pub fn parse_args(args: &str) -> Result<Value> {
    serde_json::from_str(args).with_context(|| format!("Invalid JSON in args: {}", args))
}

/// Dials `rpc_addr` (`scheme@endpoint`), makes one call and closes the client.
pub async fn call_json(
    rpc_addr: &str,
    service_method: &str,
    args: &Value,
    timeout: Option<Duration>,
) -> Result<Value> {
    let client = xdial(rpc_addr, Some(call_options()))
        .await
        .with_context(|| format!("failed to connect to {}", rpc_addr))?;

    let reply = match timeout {
        Some(limit) => client.call_timeout(service_method, args, limit).await,
        None => client.call(service_method, args).await,
    };
    let _ = client.close();

    reply.with_context(|| format!("call {} failed", service_method))
}
