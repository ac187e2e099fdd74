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

use crate::message::MessageExchange;

/// Observer notified as exchanges move through delivery channels.
///
/// Listeners run inline on the sending or receiving task, so they must be quick and must not
/// block.
pub trait ExchangeListener: Send + Sync + 'static {
    /// An exchange passed send validation on `component`'s channel.
    fn on_sent(&self, _component: &str, _exchange: &MessageExchange) {}

    /// An exchange was handed to `component`, by callback or through `accept`.
    fn on_accepted(&self, _component: &str, _exchange: &MessageExchange) {}
}
