//! The kernel runtime: startup, the broker, and delivery channels.
//!
//! *   [`Switchboard`]: entry point that launches a kernel.
//! *   [`KernelRuntime`]: handle to a running kernel, used to activate components and shut
//!     down.
//! *   [`DeliveryChannel`]: a component's handle for creating, sending and accepting
//!     exchanges.
//! *   [`Broker`]: resolves targets, fans out to subscriptions and hands exchanges to flows.
//! *   [`KernelConfig`]: configuration, loaded from the XDG config directory into [`CONFIG`].

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

// --- Public Re-exports ---
pub use broker::Broker;
pub use config::{
    DefaultsConfig, FlowConfig, KernelConfig, LimitsConfig, TimeoutConfig, CONFIG,
};
pub use delivery_channel::{DeliveryChannel, ExchangeFactory};
pub use kernel::Switchboard;
pub use kernel_runtime::KernelRuntime;
pub use subscription_manager::SUBSCRIPTION_MANAGER;

// --- Crate-Internal Re-exports ---
pub(crate) use delivery_channel::ChannelCore;

// --- Submodules ---

/// Defines the [`Broker`] that routes and delivers exchanges.
mod broker;
/// Defines [`KernelConfig`] and the loaded [`CONFIG`].
mod config;
/// Defines [`DeliveryChannel`] and the channel state kept in the registry.
mod delivery_channel;
/// Defines the [`Switchboard`] entry point.
mod kernel;
/// Defines the state shared by runtime handles.
mod kernel_inner;
/// Defines [`KernelRuntime`].
mod kernel_runtime;
/// Defines the internal component that sends subscription duplicates.
mod subscription_manager;
