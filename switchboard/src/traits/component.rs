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

use async_trait::async_trait;

use crate::common::DeliveryChannel;
use crate::message::MessageExchange;
use crate::registry::{Endpoint, EndpointReference, SubscriptionFilter};

/// A processing component plugged into the kernel.
///
/// The kernel calls [`on_exchange`](Self::on_exchange) for every exchange addressed to one of
/// the component's endpoints, from whichever flow dispatched it. The component must
/// eventually move the exchange to a terminal state, reply to it, or hand the work to another
/// exchange that will.
///
/// Returning an error does not unwind into the sender: the kernel records it on the exchange
/// as [`KernelError::ComponentFailure`](crate::message::KernelError::ComponentFailure), marks
/// the exchange `Error` and routes it back like any other reply.
///
/// Optional capabilities are exposed through the `as_*` accessors rather than through
/// additional supertraits, so a component opts into them by overriding the accessor.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Handles an exchange delivered to this component.
    ///
    /// # Arguments
    ///
    /// * `channel` - The component's own delivery channel, for replies and onward sends.
    /// * `exchange` - This component's view of the delivered exchange.
    async fn on_exchange(
        &self,
        channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()>;

    /// Called once the component is registered, before any exchange is delivered.
    async fn on_activate(&self, _channel: &DeliveryChannel) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the component's endpoints and subscriptions are gone.
    async fn on_deactivate(&self) {}

    /// Returns a filter when this component also decides which subscription duplicates it
    /// wants. Used for subscriptions registered without an explicit filter.
    fn as_subscription_filter(&self) -> Option<&dyn SubscriptionFilter> {
        None
    }

    /// Returns a resolver when this component can turn foreign reference documents into
    /// endpoints it serves.
    fn as_reference_resolver(&self) -> Option<&dyn ReferenceResolver> {
        None
    }
}

/// Resolves endpoint reference documents the kernel itself does not understand.
pub trait ReferenceResolver: Send + Sync {
    /// Returns the endpoint this component serves for `reference`, if any. The kernel marks
    /// the result as a dynamic endpoint owned by this component.
    fn resolve_reference(&self, reference: &EndpointReference) -> Option<Endpoint>;
}
