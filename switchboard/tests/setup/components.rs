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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use switchboard::prelude::*;
use tokio::sync::mpsc;
use tracing::info;

/// Answers every request with `{"from": <component>, "echo": <request content>}`, and
/// completes one-way exchanges.
#[derive(Debug, Default)]
pub struct Echo;

#[async_trait]
impl Component for Echo {
    async fn on_exchange(
        &self,
        channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()> {
        if exchange.status() != ExchangeStatus::Active {
            return Ok(());
        }
        if exchange.pattern().has_reply() {
            let content = exchange
                .in_message()
                .map(|message| message.content().clone())
                .unwrap_or_default();
            exchange.set_out_message(NormalizedMessage::new(json!({
                "from": channel.component_name(),
                "echo": content,
            })))?;
        } else {
            exchange.set_status(ExchangeStatus::Done)?;
        }
        channel.send(&exchange).await?;
        Ok(())
    }
}

/// Completes every request it gets and reports it, after answering, on a channel.
#[derive(Debug)]
pub struct Recorder {
    seen: mpsc::UnboundedSender<MessageExchange>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MessageExchange>) {
        let (seen, receiver) = mpsc::unbounded_channel();
        (Self { seen }, receiver)
    }
}

#[async_trait]
impl Component for Recorder {
    async fn on_exchange(
        &self,
        channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()> {
        if exchange.status() != ExchangeStatus::Active {
            return Ok(());
        }
        if exchange.pattern().has_reply() {
            exchange.set_out_message(NormalizedMessage::new("recorded"))?;
        } else {
            exchange.set_status(ExchangeStatus::Done)?;
        }
        channel.send(&exchange).await?;
        self.seen.send(exchange)?;
        Ok(())
    }
}

/// Sleeps before answering, then reports whether the answer could still be given.
#[derive(Debug)]
pub struct Sleeper {
    delay: Duration,
    answered: mpsc::UnboundedSender<bool>,
}

impl Sleeper {
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<bool>) {
        let (answered, receiver) = mpsc::unbounded_channel();
        (Self { delay, answered }, receiver)
    }
}

#[async_trait]
impl Component for Sleeper {
    async fn on_exchange(
        &self,
        channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()> {
        if exchange.status() != ExchangeStatus::Active {
            return Ok(());
        }
        tokio::time::sleep(self.delay).await;
        let answered = match exchange.set_out_message(NormalizedMessage::new("late")) {
            Ok(()) => channel.send(&exchange).await.is_ok(),
            Err(e) => {
                info!("could not answer: {}", e);
                false
            }
        };
        self.answered.send(answered)?;
        Ok(())
    }
}

/// Fails every active exchange it receives.
#[derive(Debug, Default)]
pub struct Failing;

#[async_trait]
impl Component for Failing {
    async fn on_exchange(
        &self,
        _channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()> {
        if exchange.status() == ExchangeStatus::Active {
            anyhow::bail!("boom");
        }
        Ok(())
    }
}

/// Answers requests by calling `downstream` synchronously and forwarding its reply.
#[derive(Debug)]
pub struct Relay {
    downstream: QualifiedName,
}

impl Relay {
    pub fn new(downstream: QualifiedName) -> Self {
        Self { downstream }
    }
}

#[async_trait]
impl Component for Relay {
    async fn on_exchange(
        &self,
        channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()> {
        if exchange.status() != ExchangeStatus::Active {
            return Ok(());
        }
        let inner = channel.create_exchange(Pattern::RequestReply);
        inner.set_service(self.downstream.clone())?;
        inner.set_in_message(exchange.in_message().unwrap_or_else(|| NormalizedMessage::new("")))?;
        anyhow::ensure!(channel.send_sync(&inner, None).await?, "downstream did not answer");
        let reply = inner
            .out_message()
            .ok_or_else(|| anyhow::anyhow!("downstream answered without a reply"))?;
        inner.set_status(ExchangeStatus::Done)?;
        channel.send(&inner).await?;

        exchange.set_out_message(reply)?;
        channel.send(&exchange).await?;
        Ok(())
    }
}

/// Counts traffic seen by delivery channels.
#[derive(Debug, Default, Clone)]
pub struct CountingListener {
    pub sent: Arc<AtomicUsize>,
    pub accepted: Arc<AtomicUsize>,
}

impl ExchangeListener for CountingListener {
    fn on_sent(&self, _component: &str, _exchange: &MessageExchange) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }

    fn on_accepted(&self, _component: &str, _exchange: &MessageExchange) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
    }
}
