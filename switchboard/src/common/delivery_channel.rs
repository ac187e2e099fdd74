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
use std::time::Duration;

use acton_ern::Ern;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::common::broker::Routed;
use crate::common::Broker;
use crate::message::{ExchangeId, ExchangeStatus, KernelError, MessageExchange, Pattern, Role};
use crate::registry::{ComponentRecord, Endpoint, EndpointReference};
use crate::resolver::{resolve_endpoint, resolve_reference};

struct PendingReply {
    role: Role,
    waker: oneshot::Sender<()>,
}

/// The receiving half of a component's channel, owned by its registry record.
///
/// Holds the bounded inbound queue read by `accept` and the waiters of in-progress
/// synchronous sends. It never refers back to the broker.
pub(crate) struct ChannelCore {
    name: String,
    inbound_tx: mpsc::Sender<MessageExchange>,
    inbound_rx: Mutex<mpsc::Receiver<MessageExchange>>,
    pending: DashMap<ExchangeId, PendingReply>,
    closed: CancellationToken,
}

impl fmt::Debug for ChannelCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelCore")
            .field("name", &self.name)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChannelCore {
    pub(crate) fn new(name: &str, capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        Self {
            name: name.to_string(),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            pending: DashMap::new(),
            closed: CancellationToken::new(),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Stops accepting exchanges and releases every blocked synchronous sender.
    pub(crate) fn close(&self) {
        self.closed.cancel();
        self.pending.clear();
    }

    fn await_reply(&self, id: ExchangeId, role: Role, waker: oneshot::Sender<()>) {
        self.pending.insert(id, PendingReply { role, waker });
    }

    fn forget_reply(&self, id: &ExchangeId) {
        self.pending.remove(id);
    }

    /// Claims the waiter blocked on this exchange, if the delivered view is the one it waits
    /// for.
    pub(crate) fn take_waiter(&self, exchange: &MessageExchange) -> Option<oneshot::Sender<()>> {
        self.pending
            .remove_if(&exchange.id(), |_, pending| pending.role == exchange.role())
            .map(|(_, pending)| pending.waker)
    }

    /// Queues an exchange for `accept`, waiting while the queue is full.
    pub(crate) async fn enqueue(&self, exchange: MessageExchange) -> Result<(), KernelError> {
        tokio::select! {
            () = self.closed.cancelled() => Err(self.unavailable()),
            sent = self.inbound_tx.send(exchange) => Ok(sent?),
        }
    }

    async fn next_inbound(
        &self,
        inbound: &mut mpsc::Receiver<MessageExchange>,
    ) -> Result<MessageExchange, KernelError> {
        tokio::select! {
            () = self.closed.cancelled() => Err(self.unavailable()),
            next = inbound.recv() => next.ok_or_else(|| self.unavailable()),
        }
    }

    fn unavailable(&self) -> KernelError {
        KernelError::ComponentUnavailable(format!("{} is not active", self.name))
    }
}

/// A component's handle onto the kernel.
///
/// Components use their channel to create exchanges, send them, block on replies with
/// [`send_sync`](Self::send_sync), and, when they have no callback, pull inbound exchanges
/// with [`accept`](Self::accept). Clones share the same underlying channel.
#[derive(Clone)]
pub struct DeliveryChannel {
    record: Arc<ComponentRecord>,
    broker: Broker,
}

impl fmt::Debug for DeliveryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryChannel")
            .field("component", &self.component_name())
            .field("id", &self.record.id.to_string())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DeliveryChannel {
    pub(crate) fn attach(record: Arc<ComponentRecord>, broker: Broker) -> Self {
        Self { record, broker }
    }

    /// Name of the component that owns this channel.
    pub fn component_name(&self) -> &str {
        self.record.name()
    }

    /// Identity of this activation. A component activated again under the same name gets a
    /// new one.
    pub fn id(&self) -> &Ern {
        &self.record.id
    }

    pub fn is_closed(&self) -> bool {
        self.record.core.is_closed()
    }

    /// Creates a new exchange with this component as its consumer.
    pub fn create_exchange(&self, pattern: Pattern) -> MessageExchange {
        MessageExchange::originate(
            pattern,
            self.component_name(),
            self.record.spec.persistent_flag(),
        )
    }

    /// A factory whose exchanges carry this activation's destination defaults.
    pub fn exchange_factory(&self) -> ExchangeFactory {
        ExchangeFactory {
            channel: self.clone(),
        }
    }

    /// Sends an exchange without waiting for the other side.
    ///
    /// Ownership passes to the other side on success. On error the sender keeps the exchange
    /// untouched and may retry or abandon it.
    ///
    /// A closed channel still carries answers to exchanges the component received before it
    /// was deactivated, so in-flight work reaches its consumer. Everything else fails with
    /// [`KernelError::ComponentUnavailable`].
    #[instrument(skip_all, fields(component = self.component_name(), exchange = %exchange.id()))]
    pub async fn send(&self, exchange: &MessageExchange) -> Result<(), KernelError> {
        if !is_owned_answer(exchange) {
            self.ensure_open()?;
        }
        exchange.prepare_send(false)?;
        self.broker.notify_sent(self.component_name(), exchange);
        match self
            .broker
            .route(exchange.mirror(), &self.record.spec, false)
            .await
        {
            Ok(_) => Ok(()),
            Err(error) => {
                exchange.revert_send();
                Err(error)
            }
        }
    }

    /// Sends an active exchange and waits until the other side answers it.
    ///
    /// Returns `Ok(true)` once the answer arrives and `Ok(false)` when `timeout` elapses first.
    /// A timed-out exchange is aborted: it is marked `Error` with
    /// [`KernelError::Timeout`], and any late answer is dropped.
    #[instrument(skip_all, fields(component = self.component_name(), exchange = %exchange.id()))]
    pub async fn send_sync(
        &self,
        exchange: &MessageExchange,
        timeout: Option<Duration>,
    ) -> Result<bool, KernelError> {
        self.ensure_open()?;
        exchange.prepare_send(true)?;
        let id = exchange.id();
        let core = &self.record.core;
        let (waker, reply) = oneshot::channel();
        core.await_reply(id.clone(), exchange.role(), waker);
        self.broker.notify_sent(self.component_name(), exchange);

        let routed = self
            .broker
            .route(exchange.mirror(), &self.record.spec, timeout.is_some())
            .await;
        match routed {
            Err(error) => {
                core.forget_reply(&id);
                exchange.revert_send();
                return Err(error);
            }
            Ok(Routed::Parked) => {
                core.forget_reply(&id);
                return Ok(exchange.status() == ExchangeStatus::Done);
            }
            Ok(Routed::Dispatched) => {}
        }

        let answered = match timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(answer) => answer.is_ok(),
                Err(_) => {
                    core.forget_reply(&id);
                    warn!(timeout = ?limit, "no answer before the timeout, aborting exchange");
                    exchange.abort(KernelError::Timeout(format!(
                        "exchange {id} got no answer within {limit:?}"
                    )));
                    return Ok(false);
                }
            },
            None => reply.await.is_ok(),
        };
        if !answered {
            return Err(core.unavailable());
        }
        trace!("synchronous answer received");
        Ok(true)
    }

    /// Takes the next inbound exchange, waiting at most `timeout` when one is given.
    ///
    /// Returns `Ok(None)` on timeout. Exchanges aborted by a timed-out sender are skipped.
    pub async fn accept(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<MessageExchange>, KernelError> {
        self.ensure_open()?;
        let core = &self.record.core;
        let deadline = timeout.map(|limit| Instant::now() + limit);
        let mut inbound = core.inbound_rx.lock().await;
        loop {
            let exchange = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, core.next_inbound(&mut inbound)).await {
                        Ok(next) => next?,
                        Err(_) => return Ok(None),
                    }
                }
                None => core.next_inbound(&mut inbound).await?,
            };
            if exchange.is_aborted() {
                trace!(exchange = %exchange.id(), "skipping aborted exchange");
                continue;
            }
            self.broker.notify_accepted(self.component_name(), &exchange);
            return Ok(Some(exchange));
        }
    }

    /// Resolves a reference document to the endpoint it designates.
    pub fn resolve_reference(
        &self,
        reference: &EndpointReference,
    ) -> Result<Option<Endpoint>, KernelError> {
        let candidates = resolve_reference(self.broker.registry(), reference)?;
        match candidates.into_iter().next() {
            Some(endpoint) => resolve_endpoint(self.broker.registry(), &endpoint),
            None => Ok(None),
        }
    }

    /// Deactivates the owning component. Closing an already closed channel does nothing.
    pub async fn close(&self) -> Result<(), KernelError> {
        if self.is_closed() {
            return Ok(());
        }
        debug!(component = self.component_name(), "closing delivery channel");
        self.broker.retire(&self.record).await;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), KernelError> {
        if self.is_closed() {
            return Err(self.record.core.unavailable());
        }
        Ok(())
    }
}

/// An answer the provider side still owns. Only these may leave a closed channel.
fn is_owned_answer(exchange: &MessageExchange) -> bool {
    exchange.role() == Role::Provider && exchange.is_owner()
}

/// Creates exchanges pre-addressed with the destination defaults of an activation.
#[derive(Clone, Debug)]
pub struct ExchangeFactory {
    channel: DeliveryChannel,
}

impl ExchangeFactory {
    pub fn create_exchange(&self, pattern: Pattern) -> Result<MessageExchange, KernelError> {
        let spec = &self.channel.record.spec;
        let exchange = self.channel.create_exchange(pattern);
        if let Some(service) = spec.destination_service_name() {
            exchange.set_service(service.clone())?;
            if let Some(name) = spec.destination_endpoint_name() {
                let registry = self.channel.broker.registry();
                if let Some(endpoint) = registry.endpoints.endpoint(service, name) {
                    exchange.set_endpoint(endpoint)?;
                }
            }
        }
        if let Some(interface) = spec.destination_interface_name() {
            exchange.set_interface(interface.clone())?;
        }
        if let Some(operation) = spec.destination_operation_name() {
            exchange.set_operation(operation.clone())?;
        }
        if let Some(uri) = spec.destination_uri_value() {
            exchange.set_target_uri(uri)?;
        }
        Ok(exchange)
    }

    /// Shorthand for a [`RequestReply`](Pattern::RequestReply) exchange.
    pub fn create_request(&self) -> Result<MessageExchange, KernelError> {
        self.create_exchange(Pattern::RequestReply)
    }

    /// Shorthand for a [`OneWay`](Pattern::OneWay) exchange.
    pub fn create_one_way(&self) -> Result<MessageExchange, KernelError> {
        self.create_exchange(Pattern::OneWay)
    }
}
