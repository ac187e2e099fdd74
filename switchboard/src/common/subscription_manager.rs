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
use tracing::{debug, trace, warn};

use crate::common::DeliveryChannel;
use crate::message::{ExchangeStatus, MessageExchange};
use crate::traits::Component;

/// Name of the internal component that sends subscription duplicates.
pub const SUBSCRIPTION_MANAGER: &str = "subscription-manager";

/// Consumer of every subscription duplicate. It only absorbs the answers.
#[derive(Debug, Default)]
pub(crate) struct SubscriptionManager;

#[async_trait]
impl Component for SubscriptionManager {
    async fn on_exchange(
        &self,
        _channel: &DeliveryChannel,
        exchange: MessageExchange,
    ) -> anyhow::Result<()> {
        match exchange.status() {
            ExchangeStatus::Done => trace!(exchange = %exchange.id(), "subscriber completed duplicate"),
            ExchangeStatus::Error => warn!(
                exchange = %exchange.id(),
                error = ?exchange.error(),
                "subscriber failed duplicate"
            ),
            ExchangeStatus::Active => {
                debug!(exchange = %exchange.id(), "ignoring active answer to a one-way duplicate");
            }
        }
        Ok(())
    }
}
