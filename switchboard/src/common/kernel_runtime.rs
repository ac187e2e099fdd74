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

use futures::future::join_all;
use tracing::{debug, error, trace};

use crate::common::kernel_inner::KernelInner;
use crate::common::subscription_manager::SUBSCRIPTION_MANAGER;
use crate::common::{Broker, DeliveryChannel, KernelConfig};
use crate::flow::{DurableTransport, Flow};
use crate::message::{KernelError, QualifiedName};
use crate::registry::{ActivationSpec, ComponentState, Endpoint, Registry, SubscriptionSpec};
use crate::resolver::{resolve, TargetDescriptor};
use crate::traits::ExchangeListener;

/// A running kernel.
///
/// Obtained from [`Switchboard`](crate::common::Switchboard). Clones share the same kernel.
/// Components are plugged in with [`activate`](Self::activate), which returns the channel they
/// exchange messages through; [`shutdown_all`](Self::shutdown_all) stops everything.
#[derive(Debug, Clone)]
pub struct KernelRuntime(pub(crate) KernelInner);

impl KernelRuntime {
    /// Registers a component and returns its delivery channel.
    ///
    /// The component's hosted endpoint and subscriptions become routable before its
    /// `on_activate` hook runs.
    ///
    /// # Errors
    ///
    /// *   [`KernelError::InvalidState`] if the name is empty or already active.
    /// *   [`KernelError::DuplicateEndpoint`] if its endpoint is already registered.
    /// *   [`KernelError::ComponentFailure`] if `on_activate` fails; the activation is rolled
    ///     back.
    pub async fn activate(&self, spec: ActivationSpec) -> Result<DeliveryChannel, KernelError> {
        self.0.broker.activate(spec).await
    }

    /// Deactivates a component. Its endpoints and subscriptions disappear immediately;
    /// exchanges still queued for it fail back to their senders.
    pub async fn deactivate(&self, name: &str) -> Result<(), KernelError> {
        self.0.broker.deactivate(name).await
    }

    pub fn register_external_endpoint(&self, endpoint: Endpoint) -> Result<(), KernelError> {
        self.registry().endpoints.register_external(endpoint)
    }

    pub fn unregister_external_endpoint(
        &self,
        service: &QualifiedName,
        name: &str,
    ) -> Option<Endpoint> {
        self.registry().endpoints.unregister_external(service, name)
    }

    /// Registers an alias that routes to an internal endpoint.
    pub fn register_linked_endpoint(&self, endpoint: Endpoint) -> Result<(), KernelError> {
        self.registry().endpoints.register_linked(endpoint)
    }

    pub fn unregister_linked_endpoint(
        &self,
        service: &QualifiedName,
        name: &str,
    ) -> Option<Endpoint> {
        self.registry().endpoints.unregister_linked(service, name)
    }

    /// Adds a subscription for an already active component.
    pub fn subscribe(&self, component: &str, spec: SubscriptionSpec) -> Result<(), KernelError> {
        let record = self
            .registry()
            .components
            .get(component)
            .filter(|record| record.is_started())
            .ok_or_else(|| KernelError::ComponentUnavailable(format!("{component} is not active")))?;
        self.registry()
            .subscriptions
            .add(component, spec, record.callback());
        Ok(())
    }

    pub fn component_state(&self, name: &str) -> Option<ComponentState> {
        self.registry().component_state(name)
    }

    /// Number of active components, not counting the kernel's own.
    pub fn component_count(&self) -> usize {
        self.registry()
            .components
            .started()
            .iter()
            .filter(|record| record.name() != SUBSCRIPTION_MANAGER)
            .count()
    }

    /// The endpoints a target currently resolves to, owners that are not active excluded.
    pub fn resolve(&self, target: &TargetDescriptor) -> Result<Vec<Endpoint>, KernelError> {
        resolve(self.registry(), target)
    }

    pub fn add_listener(&self, listener: impl ExchangeListener) {
        self.0.broker.add_listener(Arc::new(listener));
    }

    /// The transport the transactional flow publishes to.
    pub fn transport(&self) -> Arc<dyn DurableTransport> {
        self.0.broker.flows().transport()
    }

    pub fn broker(&self) -> Broker {
        self.0.broker.clone()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.0.config
    }

    fn registry(&self) -> &Registry {
        self.0.broker.registry()
    }

    /// Deactivates every component, stops the flows, then cancels all remaining kernel tasks.
    ///
    /// Components are deactivated concurrently within `timeouts.shutdown_timeout_ms`; the
    /// subscription manager goes last.
    ///
    /// # Errors
    ///
    /// Returns an error if the components did not all deactivate before the timeout. The kernel
    /// is cancelled regardless.
    pub async fn shutdown_all(&mut self) -> anyhow::Result<()> {
        let broker = self.0.broker.clone();
        let limit = self.0.config.shutdown_timeout();

        trace!("Deactivating all components");
        let records = self.registry().components.started();
        let (internal, components): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|record| record.name() == SUBSCRIPTION_MANAGER);
        let retirements: Vec<_> = components
            .iter()
            .map(|record| broker.retire(record))
            .collect();
        let timed_out = tokio::time::timeout(limit, join_all(retirements)).await.is_err();
        if timed_out {
            error!("Components did not deactivate within {:?}, cancelling the kernel", limit);
        }
        for record in &internal {
            broker.retire(record).await;
        }

        trace!("Stopping flows");
        for flow in broker.flows().all() {
            flow.shutdown().await;
        }
        self.0.cancellation_token.cancel();

        if timed_out {
            return Err(anyhow::anyhow!(
                "Timeout while deactivating components after {limit:?}"
            ));
        }
        debug!("Kernel shutdown complete");
        Ok(())
    }
}
