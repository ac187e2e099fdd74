/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Test support for Switchboard.
//!
//! The [`switchboard_test`](prelude::switchboard_test) attribute turns an `async fn` into a
//! regular `#[test]` that runs on a fresh multi-threaded Tokio runtime. Panics raised on any
//! worker task are recorded and re-raised on the test thread so a failing component callback
//! fails the test instead of being swallowed by the runtime.

/// Everything a test module needs.
pub mod prelude {
    pub use switchboard_test_macro::switchboard_test;
}

#[doc(hidden)]
pub mod __private {
    pub use parking_lot;
    pub use tokio;
    pub use tracing;
}
