//! Dispatch strategies.
//!
//! *   [`DirectFlow`]: dispatches on the sender's task.
//! *   [`StagedFlow`]: bounded per-destination queues drained by worker tasks.
//! *   [`TransactionalFlow`]: serialized dispatch over a [`DurableTransport`], with optional
//!     [`Transaction`] enlistment.
//!
//! The broker picks a flow per exchange: anything in a synchronous call chain goes
//! [`Direct`](FlowKind::Direct); persistent or transacted exchanges go
//! [`Transactional`](FlowKind::Transactional); everything else uses the configured kind.

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
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::Broker;
use crate::message::{KernelError, MessageExchange};

// --- Public Re-exports ---
pub use direct::DirectFlow;
pub use staged::{StagedFlow, StagedQueue};
pub use transactional::{
    DurableTransport, LocalTransaction, LocalTransport, Transaction, TransactionalFlow,
};

// --- Submodules ---

/// Defines [`DirectFlow`].
mod direct;
/// Defines [`StagedFlow`].
mod staged;
/// Defines [`TransactionalFlow`] and its transport and transaction traits.
mod transactional;

/// The configurable flow kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Direct,
    #[default]
    Staged,
    Transactional,
}

/// A dispatch strategy.
///
/// `send` receives the view of the exchange that the destination will see and must hand it
/// to [`Broker::deliver`] eventually. Errors returned from `send` mean the exchange never
/// reached the destination and are reported to the sender synchronously.
#[async_trait]
pub trait Flow: Send + Sync + Debug {
    fn kind(&self) -> FlowKind;

    /// Whether this flow may carry `exchange`.
    fn can_handle(&self, exchange: &MessageExchange) -> bool;

    async fn send(&self, broker: &Broker, exchange: MessageExchange) -> Result<(), KernelError>;

    /// Drops any per-component state once `component` is deactivated.
    async fn on_component_shutdown(&self, _broker: &Broker, _component: &str) {}

    /// Stops every background task the flow started.
    async fn shutdown(&self) {}
}

/// The flows a broker dispatches over.
#[derive(Debug, Clone)]
pub(crate) struct FlowSet {
    direct: Arc<DirectFlow>,
    staged: Arc<StagedFlow>,
    transactional: Arc<TransactionalFlow>,
    configured: FlowKind,
}

impl FlowSet {
    pub(crate) fn new(
        staged: StagedFlow,
        transactional: TransactionalFlow,
        configured: FlowKind,
    ) -> Self {
        Self {
            direct: Arc::new(DirectFlow),
            staged: Arc::new(staged),
            transactional: Arc::new(transactional),
            configured,
        }
    }

    /// Chooses the flow for an exchange about to be dispatched.
    pub(crate) fn select(&self, exchange: &MessageExchange) -> Arc<dyn Flow> {
        if exchange.in_sync_chain() {
            return self.direct.clone();
        }
        if exchange.persistent() == Some(true) || exchange.is_transacted() {
            return self.transactional.clone();
        }
        match self.configured {
            FlowKind::Direct => self.direct.clone(),
            FlowKind::Staged if self.staged.can_handle(exchange) => self.staged.clone(),
            FlowKind::Staged => self.direct.clone(),
            FlowKind::Transactional => self.transactional.clone(),
        }
    }

    pub(crate) fn all(&self) -> [Arc<dyn Flow>; 3] {
        [
            self.direct.clone(),
            self.staged.clone(),
            self.transactional.clone(),
        ]
    }

    pub(crate) fn transport(&self) -> Arc<dyn DurableTransport> {
        self.transactional.transport()
    }
}
