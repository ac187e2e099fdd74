//! Endpoint resolution.
//!
//! Resolvers are plain functions over a [`Registry`](crate::registry::Registry): given a
//! [`TargetDescriptor`] they return the candidate endpoints, and an [`EndpointChooser`] then
//! picks one when there are several.

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
pub use chooser::{
    ChooserKind, EndpointChooser, FirstChoiceChooser, RandomChooser, RoundRobinChooser,
};
pub use resolve::{
    resolve, resolve_endpoint, resolve_interface, resolve_reference, resolve_service,
    resolve_uri, TargetDescriptor,
};
pub use uri::StructuredUri;

// --- Submodules ---

/// Defines [`EndpointChooser`] and its strategies.
mod chooser;
/// Defines the resolver functions and [`TargetDescriptor`].
mod resolve;
/// Defines [`StructuredUri`].
mod uri;
