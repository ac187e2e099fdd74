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

use std::fmt;
use std::sync::Arc;

use acton_ern::Ern;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::subscription_manager::SUBSCRIPTION_MANAGER;
use crate::common::{ChannelCore, DeliveryChannel, KernelConfig};
use crate::flow::FlowSet;
use crate::message::{ExchangeStatus, KernelError, MessageExchange, Role, SyncState};
use crate::registry::{ActivationSpec, ComponentRecord, ComponentState, Endpoint, Registry};
use crate::resolver::{
    resolve_endpoint, resolve_interface, resolve_reference, resolve_service, resolve_uri,
    EndpointChooser,
};
use crate::traits::{Component, ExchangeListener};

/// Outcome of routing a sent exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    /// Handed to a flow for delivery.
    Dispatched,
    /// No destination was found and the activation tolerates that; the exchange was settled
    /// in place.
    Parked,
}

/// Resolves and dispatches exchanges, and owns the lifecycle of activated components.
///
/// The broker is a cheap handle: clones share the same registry, flows and listeners. Channels
/// and flow workers keep a clone; the registry itself never refers back to the broker.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    registry: Registry,
    flows: FlowSet,
    chooser: Arc<dyn EndpointChooser>,
    config: KernelConfig,
    listeners: RwLock<Vec<Arc<dyn ExchangeListener>>>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("registry", &self.inner.registry)
            .field("flows", &self.inner.flows)
            .field("chooser", &self.inner.chooser)
            .field("listeners", &self.inner.listeners.read().len())
            .finish()
    }
}

impl Broker {
    pub(crate) fn new(config: KernelConfig, flows: FlowSet) -> Self {
        let chooser = config.defaults.chooser.build();
        Self {
            inner: Arc::new(BrokerInner {
                registry: Registry::new(),
                flows,
                chooser,
                config,
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The registry this broker routes against.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn flows(&self) -> &FlowSet {
        &self.inner.flows
    }

    /// Whether `component` is activated and accepting exchanges.
    pub fn is_active(&self, component: &str) -> bool {
        self.inner.registry.components.is_started(component)
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn ExchangeListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub(crate) fn notify_sent(&self, component: &str, exchange: &MessageExchange) {
        for listener in self.listeners() {
            listener.on_sent(component, exchange);
        }
    }

    pub(crate) fn notify_accepted(&self, component: &str, exchange: &MessageExchange) {
        for listener in self.listeners() {
            listener.on_accepted(component, exchange);
        }
    }

    fn listeners(&self) -> Vec<Arc<dyn ExchangeListener>> {
        self.inner.listeners.read().clone()
    }

    /// The component the given view of an exchange is delivered to.
    pub(crate) fn delivery_target(&self, exchange: &MessageExchange) -> Result<String, KernelError> {
        match exchange.role() {
            Role::Provider => exchange
                .endpoint()
                .map(|endpoint| endpoint.component().to_string())
                .ok_or_else(|| {
                    KernelError::NoEndpointAvailable(format!(
                        "exchange {} has no endpoint",
                        exchange.id()
                    ))
                }),
            Role::Consumer => exchange.source().ok_or_else(|| {
                KernelError::ComponentUnavailable(format!(
                    "exchange {} has no consumer",
                    exchange.id()
                ))
            }),
        }
    }

    /// The component on the other side of `exchange` from its receiver.
    pub(crate) fn sending_component(&self, exchange: &MessageExchange) -> Option<String> {
        self.delivery_target(&exchange.mirror()).ok()
    }

    // --- Activation ---

    #[instrument(skip_all, fields(component = spec.name()))]
    pub(crate) async fn activate(&self, spec: ActivationSpec) -> Result<DeliveryChannel, KernelError> {
        let name = spec.name().to_string();
        if name.trim().is_empty() {
            return Err(KernelError::invalid_state("component names must not be empty"));
        }
        let id = Ern::with_root(name.as_str()).map_err(|e| {
            KernelError::invalid_state(format!("invalid component name {name}: {e:?}"))
        })?;
        let registry = &self.inner.registry;
        let spec = Arc::new(spec);
        let core = Arc::new(ChannelCore::new(
            &name,
            self.inner.config.limits.inbound_capacity,
        ));
        let record = Arc::new(ComponentRecord::new(id, Arc::clone(&spec), core));
        if !registry.components.insert(Arc::clone(&record)) {
            return Err(KernelError::invalid_state(format!(
                "component {name} is already active"
            )));
        }

        if let Some(endpoint) = spec.hosted_endpoint() {
            if let Err(e) = registry.endpoints.register_internal(endpoint) {
                record.set_state(ComponentState::Shutdown);
                record.core.close();
                registry.components.remove(&name);
                return Err(e);
            }
        }
        for subscription in spec.subscriptions() {
            registry
                .subscriptions
                .add(&name, subscription.clone(), spec.callback().cloned());
        }

        let channel = DeliveryChannel::attach(Arc::clone(&record), self.clone());
        if let Some(component) = spec.callback() {
            if let Err(e) = component.on_activate(&channel).await {
                error!("activation hook failed: {:#}", e);
                self.retire(&record).await;
                return Err(KernelError::ComponentFailure(format!("{e:#}")));
            }
        }
        debug!(id = %record.id, pull = spec.callback().is_none(), "component activated");
        Ok(channel)
    }

    /// Deactivates the component currently registered as `name`.
    pub(crate) async fn deactivate(&self, name: &str) -> Result<(), KernelError> {
        let record = self
            .inner
            .registry
            .components
            .get(name)
            .filter(|record| record.is_started())
            .ok_or_else(|| KernelError::ComponentUnavailable(format!("{name} is not active")))?;
        self.retire(&record).await;
        Ok(())
    }

    /// Removes one activation from routing, drains its flow state, then closes its channel.
    pub(crate) async fn retire(&self, record: &Arc<ComponentRecord>) {
        if record.core.is_closed() {
            return;
        }
        let name = record.name().to_string();
        let registry = &self.inner.registry;
        record.set_state(ComponentState::Shutdown);
        let endpoints = registry.endpoints.unregister_component(&name);
        let subscriptions = registry.subscriptions.remove_component(&name);
        for flow in self.inner.flows.all() {
            flow.on_component_shutdown(self, &name).await;
        }
        record.core.close();
        if let Some(component) = record.callback() {
            let limit = self.inner.config.deactivate_timeout();
            if tokio::time::timeout(limit, component.on_deactivate()).await.is_err() {
                warn!(component = %name, "deactivation hook did not finish within {:?}", limit);
            }
        }
        debug!(
            component = %name,
            endpoints = endpoints.len(),
            subscriptions,
            "component deactivated"
        );
    }

    // --- Routing ---

    /// Routes the receiver's view of a just-sent exchange.
    ///
    /// Requests are resolved to an endpoint and fanned out to matching subscriptions first;
    /// answers go straight back to the consumer. With `detach`, the flow dispatch runs on its
    /// own task and failures are reported to the sender as an `Error` answer.
    pub(crate) fn route<'a>(
        &'a self,
        exchange: MessageExchange,
        origin: &'a ActivationSpec,
        detach: bool,
    ) -> BoxFuture<'a, Result<Routed, KernelError>> {
        async move {
            if exchange.role() == Role::Consumer {
                self.dispatch(exchange, detach).await?;
                return Ok(Routed::Dispatched);
            }

            let target = self.resolve_target(&exchange, origin)?;
            if let Some(endpoint) = &target {
                exchange.assign_endpoint(endpoint.clone());
            }
            let fanned_out = if exchange.is_initial_request() && !exchange.is_from_subscription() {
                self.fan_out(&exchange).await
            } else {
                0
            };

            match target {
                Some(endpoint) => {
                    trace!(exchange = %exchange.id(), endpoint = %endpoint, "routing request");
                    self.dispatch(exchange, detach).await?;
                    Ok(Routed::Dispatched)
                }
                None if fanned_out > 0 || !self.fails_without_destination(origin) => {
                    debug!(exchange = %exchange.id(), fanned_out, "no destination, parking exchange");
                    exchange.park();
                    Ok(Routed::Parked)
                }
                None => Err(KernelError::NoEndpointAvailable(describe_target(&exchange))),
            }
        }
        .boxed()
    }

    fn fails_without_destination(&self, origin: &ActivationSpec) -> bool {
        origin
            .fail_if_no_destination_flag()
            .unwrap_or(self.inner.config.defaults.fail_if_no_destination)
    }

    /// Finds the endpoint a request goes to: its explicit endpoint, or the chosen candidate of
    /// the first descriptor that resolves to any.
    fn resolve_target(
        &self,
        exchange: &MessageExchange,
        origin: &ActivationSpec,
    ) -> Result<Option<Endpoint>, KernelError> {
        let registry = &self.inner.registry;
        if let Some(endpoint) = exchange.endpoint() {
            return resolve_endpoint(registry, &endpoint);
        }
        let mut candidates = Vec::new();
        if let Some(service) = exchange.service() {
            candidates = resolve_service(registry, &service);
        }
        if candidates.is_empty() {
            if let Some(interface) = exchange.interface() {
                candidates = resolve_interface(registry, &interface);
            }
        }
        if candidates.is_empty() {
            if let Some(uri) = exchange.target_uri() {
                candidates = resolve_uri(registry, &uri)?;
            }
        }
        if candidates.is_empty() {
            if let Some(reference) = exchange.target_reference() {
                candidates = resolve_reference(registry, &reference)?;
            }
        }
        let chooser = origin
            .endpoint_chooser()
            .unwrap_or(&self.inner.chooser);
        match chooser.choose(&candidates, exchange) {
            Some(chosen) => resolve_endpoint(registry, &chosen),
            None => Ok(None),
        }
    }

    /// Sends a one-way duplicate of the request to every matching subscription, returning how
    /// many were sent.
    async fn fan_out(&self, exchange: &MessageExchange) -> usize {
        let subscribers = self.inner.registry.subscriptions.matching(exchange);
        if subscribers.is_empty() {
            return 0;
        }
        let Some(manager) = self.subscription_manager() else {
            warn!(exchange = %exchange.id(), "subscription manager is not active, skipping fan-out");
            return 0;
        };
        let sends: Vec<_> = subscribers
            .into_iter()
            .map(|endpoint| {
                let manager = manager.clone();
                let duplicate = exchange.duplicate_for(manager.component_name(), endpoint);
                async move {
                    match manager.send(&duplicate).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(exchange = %duplicate.id(), "subscription delivery failed: {}", e);
                            false
                        }
                    }
                }
            })
            .collect();
        let sent = join_all(sends).await.into_iter().filter(|sent| *sent).count();
        trace!(exchange = %exchange.id(), sent, "fanned out to subscriptions");
        sent
    }

    fn subscription_manager(&self) -> Option<DeliveryChannel> {
        self.inner
            .registry
            .components
            .get(SUBSCRIPTION_MANAGER)
            .filter(|record| record.is_started())
            .map(|record| DeliveryChannel::attach(record, self.clone()))
    }

    async fn dispatch(&self, exchange: MessageExchange, detach: bool) -> Result<(), KernelError> {
        let flow = self.inner.flows.select(&exchange);
        trace!(exchange = %exchange.id(), flow = ?flow.kind(), detach, "dispatching");
        if !detach {
            return flow.send(self, exchange).await;
        }
        let broker = self.clone();
        tokio::spawn(async move {
            if let Err(e) = flow.send(&broker, exchange.clone()).await {
                broker.fail_back(exchange, e).await;
            }
        });
        Ok(())
    }

    // --- Delivery ---

    /// Hands the receiver's view of an exchange to its component.
    ///
    /// A synchronous sender waiting for this answer is woken instead. Push components are
    /// called inline; pull components get the exchange on their inbound queue.
    pub(crate) async fn deliver(&self, exchange: MessageExchange) -> Result<(), KernelError> {
        let target = self.delivery_target(&exchange)?;
        let record = self
            .inner
            .registry
            .components
            .get(&target)
            .filter(|record| record.is_started())
            .ok_or_else(|| KernelError::ComponentUnavailable(format!("{target} is not active")))?;

        if let Some(waker) = record.core.take_waiter(&exchange) {
            exchange.set_sync_state(SyncState::SyncReceived);
            if waker.send(()).is_err() {
                trace!(exchange = %exchange.id(), "synchronous sender stopped waiting");
            }
            return Ok(());
        }
        if exchange.is_aborted() {
            trace!(exchange = %exchange.id(), component = %target, "dropping aborted exchange");
            return Ok(());
        }

        match record.callback() {
            Some(component) => {
                self.notify_accepted(&target, &exchange);
                let channel = DeliveryChannel::attach(record, self.clone());
                self.invoke(component, &channel, exchange).await;
                Ok(())
            }
            None => record.core.enqueue(exchange).await,
        }
    }

    /// Calls a push component, turning a callback error into an `Error` answer.
    async fn invoke(
        &self,
        component: Arc<dyn Component>,
        channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) {
        let Err(failure) = component.on_exchange(channel, exchange.clone()).await else {
            return;
        };
        let name = channel.component_name();
        if !exchange.is_owner() || exchange.status() != ExchangeStatus::Active {
            error!(component = name, exchange = %exchange.id(), "component failed after answering: {:#}", failure);
            return;
        }
        warn!(component = name, exchange = %exchange.id(), "component failed: {:#}", failure);
        let answered = exchange
            .set_error(KernelError::ComponentFailure(format!("{failure:#}")));
        let sent = match answered {
            Ok(()) => channel.send(&exchange).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            error!(component = name, exchange = %exchange.id(), "could not report component failure: {}", e);
        }
    }

    /// Reports a delivery failure to the side that sent `exchange`.
    pub(crate) async fn fail_back(&self, exchange: MessageExchange, error: KernelError) {
        if exchange.status().is_terminal() {
            debug!(exchange = %exchange.id(), "dropping undeliverable {:?} exchange: {}", exchange.status(), error);
            return;
        }
        warn!(exchange = %exchange.id(), "delivery failed, returning exchange to sender: {}", error);
        exchange.fail_undelivered(error);
        let returned = exchange.mirror();
        if let Err(e) = self.deliver(returned).await {
            error!(exchange = %exchange.id(), "sender could not be told about the failure: {}", e);
        }
    }
}

fn describe_target(exchange: &MessageExchange) -> String {
    let mut parts = Vec::new();
    if let Some(service) = exchange.service() {
        parts.push(format!("service {service}"));
    }
    if let Some(interface) = exchange.interface() {
        parts.push(format!("interface {interface}"));
    }
    if let Some(uri) = exchange.target_uri() {
        parts.push(format!("uri {uri}"));
    }
    if exchange.target_reference().is_some() {
        parts.push("an endpoint reference".to_string());
    }
    if parts.is_empty() {
        format!("exchange {} names no target", exchange.id())
    } else {
        format!("nothing serves {} for exchange {}", parts.join(", "), exchange.id())
    }
}
