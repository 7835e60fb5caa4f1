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

//! Demo service published by `minirpc serve`.

use std::sync::Arc;
use std::time::Duration;

use minirpc_common::Result;
use minirpc_server::{Server, Service};
use serde::{Deserialize, Serialize};

/// Receiver of the demo service. Stateless.
pub struct Foo;

/// Argument of every `Foo` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Args {
    pub num1: i64,
    pub num2: i64,
}

/// Builds the `Foo` service:
///
/// - `Foo.Sum` returns `num1 + num2`
/// - `Foo.Sleep` waits `num1` seconds, then returns `num1 + num2`
pub fn foo_service() -> Result<Service> {
    Service::builder("Foo", Foo)
        .method("Sum", |_foo, args: Args| async move {
            Ok::<_, String>(args.num1 + args.num2)
        })
        .method("Sleep", |_foo, args: Args| async move {
            let Ok(secs) = u64::try_from(args.num1) else {
                return Err("num1 must not be negative".to_string());
            };
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok(args.num1 + args.num2)
        })
        .build()
}

/// A server with the demo service registered.
pub fn demo_server() -> Result<Arc<Server>> {
    let server = Arc::new(Server::new());
    server.register(foo_service()?)?;
    Ok(server)
}
