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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::message::QualifiedName;
use crate::registry::EndpointReference;

/// Registry key of an endpoint: service name plus endpoint name.
pub type EndpointKey = (QualifiedName, String);

/// How an endpoint is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    /// Hosted by a local component; the only kind exchanges are dispatched to.
    Internal,
    /// Advertised by a component for consumers outside the kernel. Never a routing target.
    External,
    /// Produced on demand by a component that resolved an endpoint reference.
    Dynamic,
    /// An alias for another service/endpoint pair, typically a peer container's endpoint.
    Linked {
        to_service: QualifiedName,
        to_endpoint: String,
    },
}

/// An addressable (service, endpoint) identity owned by a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    service: QualifiedName,
    name: String,
    component: String,
    kind: EndpointKind,
    #[serde(default)]
    interfaces: Vec<QualifiedName>,
}

impl Endpoint {
    fn with_kind(
        service: QualifiedName,
        name: impl Into<String>,
        component: impl Into<String>,
        kind: EndpointKind,
    ) -> Self {
        Self {
            service,
            name: name.into(),
            component: component.into(),
            kind,
            interfaces: Vec::new(),
        }
    }

    pub fn internal(
        service: QualifiedName,
        name: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self::with_kind(service, name, component, EndpointKind::Internal)
    }

    pub fn external(
        service: QualifiedName,
        name: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self::with_kind(service, name, component, EndpointKind::External)
    }

    pub fn dynamic(
        service: QualifiedName,
        name: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self::with_kind(service, name, component, EndpointKind::Dynamic)
    }

    /// An alias for `(to_service, to_endpoint)`.
    pub fn linked(
        service: QualifiedName,
        name: impl Into<String>,
        component: impl Into<String>,
        to_service: QualifiedName,
        to_endpoint: impl Into<String>,
    ) -> Self {
        let kind = EndpointKind::Linked {
            to_service,
            to_endpoint: to_endpoint.into(),
        };
        Self::with_kind(service, name, component, kind)
    }

    #[must_use]
    pub fn with_interfaces(mut self, interfaces: impl IntoIterator<Item = QualifiedName>) -> Self {
        self.interfaces.extend(interfaces);
        self
    }

    pub fn service(&self) -> &QualifiedName {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning component.
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn kind(&self) -> &EndpointKind {
        &self.kind
    }

    pub fn interfaces(&self) -> &[QualifiedName] {
        &self.interfaces
    }

    pub fn implements(&self, interface: &QualifiedName) -> bool {
        self.interfaces.contains(interface)
    }

    pub fn key(&self) -> EndpointKey {
        (self.service.clone(), self.name.clone())
    }

    /// The reference document other processes use to address this endpoint.
    pub fn reference(&self) -> EndpointReference {
        EndpointReference::for_endpoint(&self.service, &self.name)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.name)
    }
}
