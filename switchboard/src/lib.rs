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

#![forbid(unsafe_code)]

//! # Switchboard
//!
//! An embeddable message-routing kernel. Independently written components exchange
//! correlated request/reply units, called exchanges, through the kernel, which resolves who
//! should handle each one and dispatches it through a pluggable flow.
//!
//! ## Key Concepts
//!
//! - **Exchanges (`MessageExchange`)**: one conversation between a consumer and a provider,
//!   following a [`Pattern`](prelude::Pattern). Ownership alternates between the two sides on
//!   every send, and only the owner may change it.
//! - **Components (`Component`)**: the code plugged into the kernel. Components either
//!   receive exchanges through a callback or pull them from their channel.
//! - **Delivery channels (`DeliveryChannel`)**: a component's handle for creating, sending,
//!   and accepting exchanges.
//! - **Endpoints and subscriptions**: services a component hosts, and patterns under which
//!   it receives one-way copies of other traffic.
//! - **Flows**: `Direct`, `Staged` and `Transactional` dispatch strategies.
//! - **Runtime (`KernelRuntime`)**: activates components and shuts the kernel down.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use switchboard::prelude::*;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Component for Echo {
//!     async fn on_exchange(&self, channel: &DeliveryChannel, exchange: MessageExchange) -> anyhow::Result<()> {
//!         if exchange.status() == ExchangeStatus::Active {
//!             exchange.set_out_message(NormalizedMessage::new("pong"))?;
//!             channel.send(&exchange).await?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut kernel = Switchboard::launch_async().await;
//!     let echo = QualifiedName::new("urn:demo", "echo");
//!     kernel.activate(ActivationSpec::new("echo").component(Echo).service(echo.clone())).await?;
//!     let client = kernel.activate(ActivationSpec::new("client")).await?;
//!
//!     let exchange = client.create_exchange(Pattern::RequestReply);
//!     exchange.set_service(echo)?;
//!     exchange.set_in_message(NormalizedMessage::new("hello"))?;
//!     assert!(client.send_sync(&exchange, None).await?);
//!     kernel.shutdown_all().await
//! }
//! ```

/// Runtime, broker, delivery channels and configuration.
pub(crate) mod common;

/// Dispatch strategies.
pub(crate) mod flow;

/// Exchanges and the values they carry.
pub(crate) mod message;

/// Endpoint, component and subscription registries.
pub(crate) mod registry;

/// Target resolution and endpoint choosers.
pub(crate) mod resolver;

/// Traits implemented by code plugged into the kernel.
pub(crate) mod traits;

/// Flow types, for embedders that supply their own transport or transactions.
pub mod flows {
    pub use crate::flow::{
        DirectFlow, DurableTransport, Flow, FlowKind, LocalTransaction, LocalTransport,
        StagedFlow, StagedQueue, Transaction, TransactionalFlow,
    };
}

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## External Crates
/// *   [`acton_ern::*`](https://docs.rs/acton-ern): component activation identities.
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait): needed to implement
///     [`Component`](crate::traits::Component).
///
/// ## Core Types
/// *   [`crate::common::Switchboard`]: Entry point for launching a kernel.
/// *   [`crate::common::KernelRuntime`]: A running kernel.
/// *   [`crate::common::DeliveryChannel`]: A component's channel.
/// *   [`crate::message::MessageExchange`]: One exchange, seen from one side.
/// *   [`crate::registry::ActivationSpec`]: Describes a component to activate.
/// *   [`crate::traits::Component`]: The callback interface of components.
pub mod prelude {
    pub use acton_ern::*;
    pub use async_trait::async_trait;

    pub use crate::common::{
        Broker, DefaultsConfig, DeliveryChannel, ExchangeFactory, FlowConfig, KernelConfig,
        KernelRuntime, LimitsConfig, Switchboard, TimeoutConfig, CONFIG, SUBSCRIPTION_MANAGER,
    };
    pub use crate::flow::{
        DurableTransport, FlowKind, LocalTransaction, LocalTransport, Transaction,
    };
    pub use crate::message::{
        ExchangeId, ExchangeStatus, KernelError, MessageExchange, NormalizedMessage, Pattern,
        QualifiedName, Role, SyncState, FROM_SUBSCRIPTION,
    };
    pub use crate::registry::{
        subscriber_endpoint, ActivationSpec, ComponentState, Endpoint, EndpointKey, EndpointKind,
        EndpointReference, EndpointRegistry, Registry, ServicePattern, SubscriptionFilter,
        SubscriptionIndex, SubscriptionSpec, SUBSCRIBER_NAMESPACE,
    };
    pub use crate::resolver::{
        ChooserKind, EndpointChooser, FirstChoiceChooser, RandomChooser, RoundRobinChooser,
        StructuredUri, TargetDescriptor,
    };
    pub use crate::traits::{Component, ExchangeListener, ReferenceResolver};
}
