//! Message types and the exchange state machine.
//!
//! *   [`NormalizedMessage`]: the payload envelope carried in an exchange's message slots.
//! *   [`MessageExchange`]: one side's view of a correlated request/reply unit, including the
//!     ownership and status rules every send is checked against.
//! *   [`KernelError`]: the kernel's error taxonomy, which also travels on failed exchanges.
//! *   [`QualifiedName`]: namespace-qualified service, interface and operation names.

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
pub use exchange::{
    ExchangeId, ExchangeStatus, MessageExchange, Pattern, Role, SyncState, FROM_SUBSCRIPTION,
};
pub use kernel_error::KernelError;
pub use normalized_message::NormalizedMessage;
pub use qualified_name::QualifiedName;

// --- Crate-Internal Re-exports ---
pub(crate) use exchange::ExchangeFrame;

// --- Submodules ---

/// Defines [`MessageExchange`] and its state machine.
mod exchange;
/// Defines [`KernelError`].
mod kernel_error;
/// Defines [`NormalizedMessage`].
mod normalized_message;
/// Defines [`QualifiedName`].
mod qualified_name;
