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

use tokio_util::sync::CancellationToken;

use crate::common::{Broker, KernelConfig};

/// State shared by every clone of a [`KernelRuntime`](crate::common::KernelRuntime).
#[derive(Debug, Clone)]
pub struct KernelInner {
    /// Routes exchanges and owns the registry.
    pub(crate) broker: Broker,

    /// Parent of every flow's token; cancelled last during shutdown.
    pub(crate) cancellation_token: CancellationToken,

    /// The configuration this kernel was launched with.
    pub(crate) config: KernelConfig,
}
