//! Traits implemented by code plugged into the kernel.
//!
//! *   [`Component`]: the single callback interface every processing component implements,
//!     with optional capabilities exposed through accessor methods.
//! *   [`ReferenceResolver`]: the capability of resolving foreign endpoint references.
//! *   [`ExchangeListener`]: a passive observer of exchange traffic.

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
pub use component::{Component, ReferenceResolver};
pub use exchange_listener::ExchangeListener;

// --- Submodules ---

/// Defines [`Component`] and [`ReferenceResolver`].
mod component;
/// Defines [`ExchangeListener`].
mod exchange_listener;
