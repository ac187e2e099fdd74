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

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::Broker;
use crate::flow::{Flow, FlowKind};
use crate::message::{ExchangeFrame, KernelError, MessageExchange};

/// A durable, addressable transport for serialized exchanges.
///
/// Destinations are component names. Implementations decide how frames survive a crash; the
/// kernel only needs ordered delivery per destination.
#[async_trait]
pub trait DurableTransport: Send + Sync + Debug {
    /// Appends a frame to `destination`'s stream.
    async fn publish(&self, destination: &str, frame: Vec<u8>) -> Result<(), KernelError>;

    /// Starts consuming `destination`'s stream. A second bind replaces the first.
    async fn bind(&self, destination: &str) -> Result<mpsc::Receiver<Vec<u8>>, KernelError>;

    /// Stops consuming `destination`'s stream.
    async fn unbind(&self, destination: &str);
}

/// In-memory transport, one bounded channel per bound destination.
#[derive(Debug)]
pub struct LocalTransport {
    bindings: DashMap<String, mpsc::Sender<Vec<u8>>>,
    capacity: usize,
}

impl LocalTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            bindings: DashMap::new(),
            capacity: capacity.max(1),
        }
    }
}

#[async_trait]
impl DurableTransport for LocalTransport {
    async fn publish(&self, destination: &str, frame: Vec<u8>) -> Result<(), KernelError> {
        let sender = self
            .bindings
            .get(destination)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                KernelError::DeliveryFailure(format!("nothing is bound to {destination}"))
            })?;
        sender
            .send(frame)
            .await
            .map_err(|_| KernelError::DeliveryFailure(format!("{destination} stopped consuming")))
    }

    async fn bind(&self, destination: &str) -> Result<mpsc::Receiver<Vec<u8>>, KernelError> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.bindings.insert(destination.to_string(), sender);
        Ok(receiver)
    }

    async fn unbind(&self, destination: &str) {
        self.bindings.remove(destination);
    }
}

/// A unit of work that sends can be enlisted in.
///
/// Enlisted frames are held back until the transaction commits and discarded if it rolls
/// back, so the send and the work that triggered it succeed or fail together.
pub trait Transaction: Send + Sync + Debug {
    fn enlist(&self, destination: String, frame: Vec<u8>) -> Result<(), KernelError>;
}

/// A [`Transaction`] that buffers frames in memory and publishes them on commit.
#[derive(Debug)]
pub struct LocalTransaction {
    transport: Arc<dyn DurableTransport>,
    pending: Mutex<Vec<(String, Vec<u8>)>>,
    completed: AtomicBool,
}

impl LocalTransaction {
    pub fn begin(transport: Arc<dyn DurableTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            pending: Mutex::new(Vec::new()),
            completed: AtomicBool::new(false),
        })
    }

    /// Frames enlisted so far.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Publishes every enlisted frame, in enlistment order.
    ///
    /// # Returns
    ///
    /// The number of frames published, or the first transport failure.
    pub async fn commit(&self) -> Result<usize, KernelError> {
        self.finish()?;
        let frames = std::mem::take(&mut *self.pending.lock());
        let count = frames.len();
        for (destination, frame) in frames {
            self.transport.publish(&destination, frame).await?;
        }
        debug!(count, "transaction committed");
        Ok(count)
    }

    /// Discards every enlisted frame.
    pub fn rollback(&self) -> Result<usize, KernelError> {
        self.finish()?;
        let discarded = std::mem::take(&mut *self.pending.lock()).len();
        debug!(discarded, "transaction rolled back");
        Ok(discarded)
    }

    fn finish(&self) -> Result<(), KernelError> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return Err(KernelError::invalid_state("transaction already completed"));
        }
        Ok(())
    }
}

impl Transaction for LocalTransaction {
    fn enlist(&self, destination: String, frame: Vec<u8>) -> Result<(), KernelError> {
        if self.completed.load(Ordering::SeqCst) {
            return Err(KernelError::invalid_state("transaction already completed"));
        }
        self.pending.lock().push((destination, frame));
        Ok(())
    }
}

/// Serializes exchanges onto a [`DurableTransport`] addressed by destination component.
///
/// A listener task per destination reads frames back, rebuilds the exchange and dispatches it
/// locally, one frame at a time.
#[derive(Debug)]
pub struct TransactionalFlow {
    transport: Arc<dyn DurableTransport>,
    listeners: DashMap<String, Arc<OnceCell<CancellationToken>>>,
    cancellation_token: CancellationToken,
}

impl TransactionalFlow {
    pub fn new(transport: Arc<dyn DurableTransport>, cancellation_token: CancellationToken) -> Self {
        Self {
            transport,
            listeners: DashMap::new(),
            cancellation_token,
        }
    }

    pub fn transport(&self) -> Arc<dyn DurableTransport> {
        Arc::clone(&self.transport)
    }

    /// Binds `destination` and starts its listener, exactly once per activation. Concurrent
    /// first sends wait on the same binding.
    async fn ensure_listener(&self, broker: &Broker, destination: &str) -> Result<(), KernelError> {
        let slot = Arc::clone(
            self.listeners
                .entry(destination.to_string())
                .or_default()
                .value(),
        );
        slot.get_or_try_init(|| async {
            let frames = self.transport.bind(destination).await?;
            let token = self.cancellation_token.child_token();
            tokio::spawn(listen(
                broker.clone(),
                destination.to_string(),
                frames,
                token.clone(),
            ));
            Ok::<_, KernelError>(token)
        })
        .await?;
        Ok(())
    }

    async fn stop_listener(&self, destination: &str) {
        if let Some((_, slot)) = self.listeners.remove(destination) {
            if let Some(token) = slot.get() {
                token.cancel();
            }
            self.transport.unbind(destination).await;
        }
    }
}

#[async_trait]
impl Flow for TransactionalFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Transactional
    }

    fn can_handle(&self, _exchange: &MessageExchange) -> bool {
        true
    }

    #[instrument(skip_all, fields(exchange = %exchange.id()))]
    async fn send(&self, broker: &Broker, exchange: MessageExchange) -> Result<(), KernelError> {
        let destination = broker.delivery_target(&exchange)?;
        if !broker.is_active(&destination) {
            return Err(KernelError::ComponentUnavailable(destination));
        }
        self.ensure_listener(broker, &destination).await?;
        if !broker.is_active(&destination) {
            self.stop_listener(&destination).await;
            return Err(KernelError::ComponentUnavailable(destination));
        }
        let frame = serde_json::to_vec(&exchange.to_frame())
            .map_err(|e| KernelError::DeliveryFailure(e.to_string()))?;
        match exchange.transaction() {
            Some(transaction) => {
                trace!(destination = %destination, "enlisting exchange in transaction");
                transaction.enlist(destination, frame)
            }
            None => self.transport.publish(&destination, frame).await,
        }
    }

    async fn on_component_shutdown(&self, _broker: &Broker, component: &str) {
        self.stop_listener(component).await;
    }

    async fn shutdown(&self) {
        let destinations: Vec<String> = self.listeners.iter().map(|e| e.key().clone()).collect();
        for destination in destinations {
            self.stop_listener(&destination).await;
        }
    }
}

async fn listen(
    broker: Broker,
    destination: String,
    mut frames: mpsc::Receiver<Vec<u8>>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancellation_token.cancelled() => {
                frames.close();
                let mut returned = 0usize;
                while let Ok(bytes) = frames.try_recv() {
                    let Some(exchange) = decode(&destination, &bytes) else {
                        continue;
                    };
                    returned += 1;
                    let error = KernelError::ComponentUnavailable(format!(
                        "{destination} was deactivated before dispatch"
                    ));
                    broker.fail_back(exchange, error).await;
                }
                if returned > 0 {
                    warn!(destination = %destination, returned, "listener stopped with frames pending");
                }
                break;
            }
            next = frames.recv() => {
                let Some(bytes) = next else {
                    break;
                };
                if let Some(exchange) = decode(&destination, &bytes) {
                    if let Err(error) = broker.deliver(exchange.clone()).await {
                        broker.fail_back(exchange, error).await;
                    }
                }
            }
        }
    }
}

fn decode(destination: &str, bytes: &[u8]) -> Option<MessageExchange> {
    match serde_json::from_slice::<ExchangeFrame>(bytes) {
        Ok(frame) => Some(MessageExchange::from_frame(frame)),
        Err(e) => {
            error!(destination, "discarding undecodable frame: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_without_binding_is_a_delivery_failure() {
        let transport = LocalTransport::new(4);
        let err = transport.publish("nobody", vec![1]).await.unwrap_err();
        assert!(matches!(err, KernelError::DeliveryFailure(_)));
    }

    #[tokio::test]
    async fn transaction_publishes_only_on_commit() {
        let transport: Arc<dyn DurableTransport> = Arc::new(LocalTransport::new(4));
        let mut frames = transport.bind("orders").await.unwrap();

        let tx = LocalTransaction::begin(Arc::clone(&transport));
        tx.enlist("orders".into(), b"first".to_vec()).unwrap();
        tx.enlist("orders".into(), b"second".to_vec()).unwrap();
        assert!(frames.try_recv().is_err());

        assert_eq!(tx.commit().await.unwrap(), 2);
        assert_eq!(frames.recv().await.unwrap(), b"first");
        assert_eq!(frames.recv().await.unwrap(), b"second");
        assert!(tx.enlist("orders".into(), vec![]).is_err());
    }

    #[tokio::test]
    async fn rollback_discards_enlisted_frames() {
        let transport: Arc<dyn DurableTransport> = Arc::new(LocalTransport::new(4));
        let mut frames = transport.bind("orders").await.unwrap();
        let tx = LocalTransaction::begin(Arc::clone(&transport));
        tx.enlist("orders".into(), b"never".to_vec()).unwrap();
        assert_eq!(tx.rollback().unwrap(), 1);
        assert!(tx.commit().await.is_err());
        assert!(frames.try_recv().is_err());
    }
}
