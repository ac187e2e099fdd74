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

use serde::{Deserialize, Serialize};

/// Errors raised by the routing kernel.
///
/// Resolution and activation failures are returned directly to the caller. Once an exchange
/// has left its origin, failures travel on the exchange itself (see
/// [`MessageExchange::error`](crate::message::MessageExchange::error)), which is why the type is
/// `Clone` and serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KernelError {
    /// Resolution produced no candidate endpoint and the sender asked to fail in that case.
    NoEndpointAvailable(String),
    /// The target component was deactivated, or its queue is shutting down.
    ComponentUnavailable(String),
    /// Illegal mutation of a terminal or not-owned exchange.
    InvalidState(String),
    /// A synchronous wait exceeded its bound.
    Timeout(String),
    /// Transport-level failure in the transactional flow.
    DeliveryFailure(String),
    /// An internal endpoint with the same service and endpoint name is already active.
    DuplicateEndpoint(String),
    /// A reference document or structured URI could not be interpreted.
    InvalidReference(String),
    /// A component callback failed while handling an exchange.
    ComponentFailure(String),
}

impl KernelError {
    /// Shorthand used by the exchange state checks.
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        KernelError::InvalidState(msg.into())
    }
}

impl std::fmt::Display for KernelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::NoEndpointAvailable(msg) => write!(f, "No endpoint available: {msg}"),
            KernelError::ComponentUnavailable(msg) => write!(f, "Component unavailable: {msg}"),
            KernelError::InvalidState(msg) => write!(f, "Invalid exchange state: {msg}"),
            KernelError::Timeout(msg) => write!(f, "Timed out: {msg}"),
            KernelError::DeliveryFailure(msg) => write!(f, "Delivery failed: {msg}"),
            KernelError::DuplicateEndpoint(msg) => write!(f, "Endpoint already registered: {msg}"),
            KernelError::InvalidReference(msg) => write!(f, "Invalid endpoint reference: {msg}"),
            KernelError::ComponentFailure(msg) => write!(f, "Component failure: {msg}"),
        }
    }
}

impl std::error::Error for KernelError {}

/// A closed inbound queue means the owning component is gone.
impl<T> From<tokio::sync::mpsc::error::SendError<T>> for KernelError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        KernelError::ComponentUnavailable("inbound channel closed".into())
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(e: serde_json::Error) -> Self {
        KernelError::InvalidReference(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failure_kind() {
        let err = KernelError::NoEndpointAvailable("{urn:test}missing".into());
        assert_eq!(err.to_string(), "No endpoint available: {urn:test}missing");
    }

    #[tokio::test]
    async fn closed_channel_maps_to_component_unavailable() {
        let (tx, rx) = tokio::sync::mpsc::channel::<u8>(1);
        drop(rx);
        let err: KernelError = tx.send(1).await.unwrap_err().into();
        assert!(matches!(err, KernelError::ComponentUnavailable(_)));
    }
}
