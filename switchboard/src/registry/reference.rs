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
use serde_json::{json, Value};

use crate::message::{KernelError, QualifiedName};

const END_POINT_REFERENCE: &str = "end-point-reference";
const SERVICE_NAME: &str = "service-name";
const END_POINT_NAME: &str = "end-point-name";
const ADDRESS: &str = "address";

/// An opaque, self-describing document that identifies an endpoint across process boundaries.
///
/// The kernel understands two shapes:
///
/// ```json
/// {"end-point-reference": {"service-name": "{urn:test}orders", "end-point-name": "main"}}
/// {"address": "service:urn:test/orders"}
/// ```
///
/// Any other document is offered to components that can resolve references themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointReference(Value);

impl EndpointReference {
    /// The kernel's own reference shape for an internal endpoint.
    pub fn for_endpoint(service: &QualifiedName, endpoint: &str) -> Self {
        Self(json!({
            END_POINT_REFERENCE: {
                SERVICE_NAME: service.to_string(),
                END_POINT_NAME: endpoint,
            }
        }))
    }

    /// An addressing-style reference wrapping a URI.
    pub fn for_address(uri: impl Into<String>) -> Self {
        Self(json!({ ADDRESS: uri.into() }))
    }

    /// Wraps an arbitrary document.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn to_document(&self) -> String {
        self.0.to_string()
    }

    pub fn from_document(document: &str) -> Result<Self, KernelError> {
        Ok(Self(serde_json::from_str(document)?))
    }

    /// The `(service, endpoint)` pair of a kernel-shaped reference.
    ///
    /// Returns `Ok(None)` for other shapes and an error when the shape is recognized but broken.
    pub fn internal_target(&self) -> Result<Option<(QualifiedName, String)>, KernelError> {
        let Some(inner) = self.0.get(END_POINT_REFERENCE) else {
            return Ok(None);
        };
        let service = inner
            .get(SERVICE_NAME)
            .and_then(Value::as_str)
            .ok_or_else(|| KernelError::InvalidReference(format!("missing {SERVICE_NAME}")))?;
        let endpoint = inner
            .get(END_POINT_NAME)
            .and_then(Value::as_str)
            .ok_or_else(|| KernelError::InvalidReference(format!("missing {END_POINT_NAME}")))?;
        Ok(Some((service.parse()?, endpoint.to_string())))
    }

    /// The URI of an addressing-style reference.
    pub fn address(&self) -> Option<&str> {
        self.0.get(ADDRESS).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_shape_survives_a_document_trip() {
        let service = QualifiedName::new("urn:test", "myservice");
        let reference = EndpointReference::for_endpoint(&service, "ep1");
        let parsed = EndpointReference::from_document(&reference.to_document()).unwrap();
        assert_eq!(
            parsed.internal_target().unwrap(),
            Some((service, "ep1".to_string()))
        );
        assert_eq!(parsed.address(), None);
    }

    #[test]
    fn broken_internal_shape_is_rejected() {
        let reference = EndpointReference::from_value(json!({
            "end-point-reference": {"service-name": "{urn:test}svc"}
        }));
        assert!(matches!(
            reference.internal_target(),
            Err(KernelError::InvalidReference(_))
        ));
    }

    #[test]
    fn foreign_documents_are_opaque() {
        let reference = EndpointReference::from_document(r#"{"queue": "orders.in"}"#).unwrap();
        assert_eq!(reference.internal_target().unwrap(), None);
        assert_eq!(reference.address(), None);
        assert_eq!(reference.as_value()["queue"], "orders.in");
    }
}
