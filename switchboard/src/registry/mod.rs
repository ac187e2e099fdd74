//! Registries owned by the broker.
//!
//! *   [`EndpointRegistry`]: internal, external and linked endpoints.
//! *   [`SubscriptionIndex`]: subscriptions driving publish/subscribe fan-out.
//! *   [`ActivationSpec`]: the description of a component handed to the kernel on activation.
//! *   [`EndpointReference`]: the serialized form of an endpoint address.

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

// --- Public Re-exports ---
pub use activation::ActivationSpec;
pub use component_registry::ComponentState;
pub use endpoint::{Endpoint, EndpointKey, EndpointKind};
pub use endpoint_registry::EndpointRegistry;
pub use reference::EndpointReference;
pub use subscription::{
    subscriber_endpoint, ServicePattern, SubscriptionFilter, SubscriptionIndex, SubscriptionSpec,
    SUBSCRIBER_NAMESPACE,
};

// --- Crate-Internal Re-exports ---
pub(crate) use component_registry::{ComponentRecord, ComponentRegistry};

// --- Submodules ---

/// Defines [`ActivationSpec`].
mod activation;
/// Defines component records and [`ComponentState`].
mod component_registry;
/// Defines [`Endpoint`] and [`EndpointKind`].
mod endpoint;
/// Defines [`EndpointRegistry`].
mod endpoint_registry;
/// Defines [`EndpointReference`].
mod reference;
/// Defines [`SubscriptionIndex`] and [`SubscriptionSpec`].
mod subscription;

/// The state the broker routes against.
///
/// One instance is created per kernel and injected into the broker; it is dropped with the
/// kernel.
#[derive(Debug, Default)]
pub struct Registry {
    pub(crate) endpoints: EndpointRegistry,
    pub(crate) components: ComponentRegistry,
    pub(crate) subscriptions: SubscriptionIndex,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub fn subscriptions(&self) -> &SubscriptionIndex {
        &self.subscriptions
    }

    pub fn component_state(&self, name: &str) -> Option<ComponentState> {
        self.components.state(name)
    }

    /// Whether `endpoint`'s owner is active; inactive owners make an endpoint invisible.
    pub fn is_routable(&self, endpoint: &Endpoint) -> bool {
        self.components.is_started(endpoint.component())
    }
}
