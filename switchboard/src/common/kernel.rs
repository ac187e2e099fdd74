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

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::common::kernel_inner::KernelInner;
use crate::common::subscription_manager::{SubscriptionManager, SUBSCRIPTION_MANAGER};
use crate::common::{Broker, KernelConfig, KernelRuntime, CONFIG};
use crate::flow::{DurableTransport, FlowSet, LocalTransport, StagedFlow, TransactionalFlow};
use crate::registry::ActivationSpec;

/// Entry point for starting a kernel.
///
/// *   [`Switchboard::launch_async()`] from async code, with the configuration found in the
///     XDG config directory.
/// *   [`Switchboard::launch_async_with_config()`] to inject a configuration.
/// *   [`Switchboard::launch()`] from synchronous code (panics inside a Tokio runtime).
#[derive(Default, Debug, Clone)]
pub struct Switchboard;

impl Switchboard {
    /// Starts a kernel using the loaded [`CONFIG`].
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use switchboard::prelude::*;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut kernel = Switchboard::launch_async().await;
    ///     // activate components...
    ///     kernel.shutdown_all().await
    /// }
    /// ```
    pub async fn launch_async() -> KernelRuntime {
        Self::launch_async_with_config(CONFIG.clone()).await
    }

    /// Starts a kernel with an explicit configuration and an in-memory transport.
    pub async fn launch_async_with_config(config: KernelConfig) -> KernelRuntime {
        let transport = Arc::new(LocalTransport::new(config.limits.transport_capacity));
        Self::launch_async_with_transport(config, transport).await
    }

    /// Starts a kernel whose transactional flow publishes to `transport`.
    pub async fn launch_async_with_transport(
        config: KernelConfig,
        transport: Arc<dyn DurableTransport>,
    ) -> KernelRuntime {
        trace!("Starting kernel with configuration: {:?}", config);
        let cancellation_token = CancellationToken::new();
        let flows = FlowSet::new(
            StagedFlow::new(
                config.flow.capacity,
                config.flow.workers,
                cancellation_token.child_token(),
            ),
            TransactionalFlow::new(transport, cancellation_token.child_token()),
            config.flow.kind,
        );
        let broker = Broker::new(config.clone(), flows);

        let manager = ActivationSpec::new(SUBSCRIPTION_MANAGER)
            .component(SubscriptionManager)
            .fail_if_no_destination(false);
        if let Err(e) = broker.activate(manager).await {
            error!("Subscription manager failed to start, fan-out is disabled: {}", e);
        }

        trace!("Kernel started");
        KernelRuntime(KernelInner {
            broker,
            cancellation_token,
            config,
        })
    }

    /// Starts a kernel from synchronous code.
    ///
    /// Flow workers are spawned lazily, on the runtime that first dispatches through them.
    ///
    /// # Panics
    ///
    /// Panics if called from within a Tokio runtime, or if a runtime cannot be created.
    #[must_use]
    pub fn launch() -> KernelRuntime {
        assert!(
            tokio::runtime::Handle::try_current().is_err(),
            "Switchboard::launch() was called from within a Tokio runtime. \
             Use Switchboard::launch_async().await instead."
        );
        let runtime = tokio::runtime::Runtime::new()
            .expect("Failed to create Tokio runtime for kernel startup");
        runtime.block_on(Self::launch_async())
    }
}
