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

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::common::Broker;
use crate::flow::{Flow, FlowKind};
use crate::message::{KernelError, MessageExchange};

/// Queues exchanges per destination component and dispatches them from worker tasks.
///
/// Each destination gets its own [`StagedQueue`] the first time something is sent to it. A
/// queue holds at most `capacity` undispatched exchanges; senders beyond that wait for room.
/// Each worker owns one lane of the queue, and the lane is picked from the sending component,
/// so exchanges from one sender to one destination are dispatched in the order they were
/// sent.
#[derive(Debug)]
pub struct StagedFlow {
    queues: DashMap<String, Arc<StagedQueue>>,
    capacity: usize,
    workers: usize,
    cancellation_token: CancellationToken,
}

impl StagedFlow {
    pub fn new(capacity: usize, workers: usize, cancellation_token: CancellationToken) -> Self {
        Self {
            queues: DashMap::new(),
            capacity: capacity.max(1),
            workers: workers.max(1),
            cancellation_token,
        }
    }

    /// Number of destinations that currently have a queue.
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    fn queue_for(&self, broker: &Broker, destination: &str) -> Arc<StagedQueue> {
        Arc::clone(
            self.queues
                .entry(destination.to_string())
                .or_insert_with(|| {
                    Arc::new(StagedQueue::start(
                        broker,
                        destination,
                        self.capacity,
                        self.workers,
                        &self.cancellation_token,
                    ))
                })
                .value(),
        )
    }

    /// Closes `queue` when its destination was deactivated while the queue was being looked
    /// up, so a late send cannot leave workers behind for a retired component.
    fn discard_if_retired(
        &self,
        broker: &Broker,
        destination: &str,
        queue: &Arc<StagedQueue>,
    ) -> bool {
        if broker.is_active(destination) {
            return false;
        }
        let removed = self
            .queues
            .remove_if(destination, |_, current| Arc::ptr_eq(current, queue));
        if removed.is_some() {
            debug!(destination, "closing queue created for a retired component");
        }
        queue.close();
        true
    }
}

#[async_trait]
impl Flow for StagedFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Staged
    }

    fn can_handle(&self, exchange: &MessageExchange) -> bool {
        exchange.persistent() != Some(true) && !exchange.is_transacted()
    }

    #[instrument(skip_all, fields(exchange = %exchange.id()))]
    async fn send(&self, broker: &Broker, exchange: MessageExchange) -> Result<(), KernelError> {
        let destination = broker.delivery_target(&exchange)?;
        if !broker.is_active(&destination) {
            return Err(KernelError::ComponentUnavailable(destination));
        }
        let sender = broker.sending_component(&exchange).unwrap_or_default();
        let queue = self.queue_for(broker, &destination);
        if self.discard_if_retired(broker, &destination, &queue) {
            return Err(KernelError::ComponentUnavailable(destination));
        }
        queue.enqueue(exchange, &sender).await
    }

    async fn on_component_shutdown(&self, _broker: &Broker, component: &str) {
        if let Some((_, queue)) = self.queues.remove(component) {
            debug!(component, "closing staged queue");
            queue.close();
        }
    }

    async fn shutdown(&self) {
        for entry in self.queues.iter() {
            entry.value().close();
        }
        self.queues.clear();
    }
}

struct Staged {
    exchange: MessageExchange,
    permit: OwnedSemaphorePermit,
}

/// The bounded queue in front of one destination component.
#[derive(Debug)]
pub struct StagedQueue {
    destination: String,
    permits: Arc<Semaphore>,
    lanes: Vec<mpsc::UnboundedSender<Staged>>,
    cancellation_token: CancellationToken,
}

impl StagedQueue {
    fn start(
        broker: &Broker,
        destination: &str,
        capacity: usize,
        workers: usize,
        parent: &CancellationToken,
    ) -> Self {
        let cancellation_token = parent.child_token();
        let lanes = (0..workers)
            .map(|lane| {
                let (sender, receiver) = mpsc::unbounded_channel();
                tokio::spawn(run_lane(
                    broker.clone(),
                    destination.to_string(),
                    lane,
                    receiver,
                    cancellation_token.clone(),
                ));
                sender
            })
            .collect();
        trace!(destination, capacity, workers, "started staged queue");
        Self {
            destination: destination.to_string(),
            permits: Arc::new(Semaphore::new(capacity)),
            lanes,
            cancellation_token,
        }
    }

    /// Waits for room, then appends the exchange to the sender's lane.
    async fn enqueue(&self, exchange: MessageExchange, sender: &str) -> Result<(), KernelError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| self.unavailable())?;
        let lane = lane_for(sender, self.lanes.len());
        self.lanes[lane]
            .send(Staged { exchange, permit })
            .map_err(|_| self.unavailable())
    }

    /// Rejects new work and lets the workers fail whatever is still queued.
    fn close(&self) {
        self.permits.close();
        self.cancellation_token.cancel();
    }

    fn unavailable(&self) -> KernelError {
        KernelError::ComponentUnavailable(format!("{} is shutting down", self.destination))
    }
}

fn lane_for(sender: &str, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    sender.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}

async fn run_lane(
    broker: Broker,
    destination: String,
    lane: usize,
    mut receiver: mpsc::UnboundedReceiver<Staged>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancellation_token.cancelled() => {
                receiver.close();
                let mut discarded = 0usize;
                while let Ok(Staged { exchange, permit }) = receiver.try_recv() {
                    drop(permit);
                    discarded += 1;
                    let error = KernelError::ComponentUnavailable(format!(
                        "{destination} was deactivated before dispatch"
                    ));
                    broker.fail_back(exchange, error).await;
                }
                trace!(destination = %destination, lane, discarded, "staged lane stopped");
                break;
            }
            next = receiver.recv() => {
                let Some(Staged { exchange, permit }) = next else {
                    break;
                };
                drop(permit);
                trace!(destination = %destination, lane, exchange = %exchange.id(), "dispatching");
                if let Err(error) = broker.deliver(exchange.clone()).await {
                    broker.fail_back(exchange, error).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::KernelConfig;
    use crate::flow::{FlowSet, LocalTransport, TransactionalFlow};

    fn broker() -> Broker {
        let token = CancellationToken::new();
        let flows = FlowSet::new(
            StagedFlow::new(4, 2, token.child_token()),
            TransactionalFlow::new(Arc::new(LocalTransport::new(4)), token.child_token()),
            FlowKind::Staged,
        );
        Broker::new(KernelConfig::default(), flows)
    }

    #[tokio::test]
    async fn queue_for_a_retired_destination_is_discarded() {
        let broker = broker();
        let flow = StagedFlow::new(4, 2, CancellationToken::new());
        let queue = flow.queue_for(&broker, "gone");
        assert_eq!(flow.queue_count(), 1);

        assert!(flow.discard_if_retired(&broker, "gone", &queue));
        assert_eq!(flow.queue_count(), 0);
        assert!(queue.cancellation_token.is_cancelled());
        let exchange = MessageExchange::new(crate::message::Pattern::OneWay);
        assert!(matches!(
            queue.enqueue(exchange, "client").await,
            Err(KernelError::ComponentUnavailable(_))
        ));
    }

    #[test]
    fn lanes_are_stable_per_sender() {
        assert_eq!(lane_for("consumer", 4), lane_for("consumer", 4));
        assert!(lane_for("consumer", 4) < 4);
        assert_eq!(lane_for("anything", 1), 0);
    }
}
