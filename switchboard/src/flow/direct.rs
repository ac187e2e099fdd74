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
use tracing::instrument;

use crate::common::Broker;
use crate::flow::{Flow, FlowKind};
use crate::message::{KernelError, MessageExchange};

/// Dispatches on the sender's own task.
///
/// Used for every exchange that is part of a synchronous call chain, whatever flow is
/// configured: a sender blocked in `send_sync` must never wait for a staged worker that may
/// itself be blocked behind it.
#[derive(Debug, Default)]
pub struct DirectFlow;

#[async_trait]
impl Flow for DirectFlow {
    fn kind(&self) -> FlowKind {
        FlowKind::Direct
    }

    fn can_handle(&self, _exchange: &MessageExchange) -> bool {
        true
    }

    #[instrument(skip_all, fields(exchange = %exchange.id()))]
    async fn send(&self, broker: &Broker, exchange: MessageExchange) -> Result<(), KernelError> {
        broker.deliver(exchange).await
    }
}
