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

use tracing::trace;

use crate::message::{KernelError, QualifiedName};
use crate::registry::{Endpoint, EndpointKind, EndpointReference, Registry};
use crate::resolver::StructuredUri;

/// What an exchange, or a caller, is trying to reach.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetDescriptor {
    /// A known endpoint; linked endpoints still go through their alias.
    Endpoint(Endpoint),
    Service(QualifiedName),
    Interface(QualifiedName),
    /// A structured URI, see [`StructuredUri`].
    Uri(String),
    Reference(EndpointReference),
}

/// Resolves any descriptor into its candidate endpoints.
pub fn resolve(registry: &Registry, target: &TargetDescriptor) -> Result<Vec<Endpoint>, KernelError> {
    match target {
        TargetDescriptor::Endpoint(endpoint) => Ok(resolve_endpoint(registry, endpoint)?
            .into_iter()
            .collect()),
        TargetDescriptor::Service(service) => Ok(resolve_service(registry, service)),
        TargetDescriptor::Interface(interface) => Ok(resolve_interface(registry, interface)),
        TargetDescriptor::Uri(uri) => resolve_uri(registry, uri),
        TargetDescriptor::Reference(reference) => resolve_reference(registry, reference),
    }
}

/// Normalizes an explicit endpoint into the internal endpoint that will be dispatched to.
///
/// External endpoints are never routing targets; asking to route to one is an error.
pub fn resolve_endpoint(
    registry: &Registry,
    endpoint: &Endpoint,
) -> Result<Option<Endpoint>, KernelError> {
    match endpoint.kind() {
        EndpointKind::External => Err(KernelError::invalid_state(format!(
            "external endpoint {endpoint} cannot be routed to"
        ))),
        EndpointKind::Linked {
            to_service,
            to_endpoint,
        } => Ok(registry
            .endpoints
            .internal_endpoint(to_service, to_endpoint)
            .filter(|target| registry.is_routable(target))),
        EndpointKind::Internal | EndpointKind::Dynamic => {
            Ok(Some(endpoint.clone()).filter(|target| registry.is_routable(target)))
        }
    }
}

/// Endpoints hosting `service`, linked aliases included.
pub fn resolve_service(registry: &Registry, service: &QualifiedName) -> Vec<Endpoint> {
    let candidates = routable(registry, registry.endpoints.endpoints_for_service(service));
    trace!(%service, candidates = candidates.len(), "resolved service");
    candidates
}

/// Endpoints implementing `interface`.
pub fn resolve_interface(registry: &Registry, interface: &QualifiedName) -> Vec<Endpoint> {
    let candidates = routable(registry, registry.endpoints.endpoints_for_interface(interface));
    trace!(%interface, candidates = candidates.len(), "resolved interface");
    candidates
}

/// Resolves a structured URI. Unrecognized schemes are treated as addressing references.
pub fn resolve_uri(registry: &Registry, uri: &str) -> Result<Vec<Endpoint>, KernelError> {
    match StructuredUri::parse(uri)? {
        StructuredUri::Interface(interface) => Ok(resolve_interface(registry, &interface)),
        StructuredUri::Operation { interface, .. } => Ok(resolve_interface(registry, &interface)),
        StructuredUri::Service(service) => Ok(resolve_service(registry, &service)),
        StructuredUri::Endpoint { service, endpoint } => Ok(registry
            .endpoints
            .endpoint(&service, &endpoint)
            .map(|found| routable(registry, vec![found]))
            .unwrap_or_default()),
        StructuredUri::Opaque(uri) => Ok(resolve_from_components(
            registry,
            &EndpointReference::for_address(uri),
        )
        .into_iter()
        .collect()),
    }
}

/// Resolves a reference document.
///
/// Components able to resolve references are asked first. Then the kernel's own internal
/// shape is tried, and finally an addressing reference carrying an `endpoint:` or `service:`
/// URI.
pub fn resolve_reference(
    registry: &Registry,
    reference: &EndpointReference,
) -> Result<Vec<Endpoint>, KernelError> {
    if let Some(found) = resolve_from_components(registry, reference) {
        return Ok(vec![found]);
    }
    if let Some((service, endpoint)) = reference.internal_target()? {
        return Ok(registry
            .endpoints
            .endpoint(&service, &endpoint)
            .map(|found| routable(registry, vec![found]))
            .unwrap_or_default());
    }
    match reference.address() {
        Some(uri) if uri.starts_with("endpoint:") || uri.starts_with("service:") => {
            resolve_uri(registry, uri)
        }
        _ => Ok(Vec::new()),
    }
}

fn resolve_from_components(registry: &Registry, reference: &EndpointReference) -> Option<Endpoint> {
    registry.components.started().into_iter().find_map(|record| {
        let component = record.callback()?;
        let resolver = component.as_reference_resolver()?;
        let found = resolver.resolve_reference(reference)?;
        trace!(component = record.name(), endpoint = %found, "component resolved reference");
        Some(
            Endpoint::dynamic(found.service().clone(), found.name(), record.name())
                .with_interfaces(found.interfaces().iter().cloned()),
        )
    })
}

/// Swaps linked aliases for their targets and drops endpoints of inactive components.
fn routable(registry: &Registry, endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut resolved: Vec<Endpoint> = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        if let Ok(Some(target)) = resolve_endpoint(registry, &endpoint) {
            if !resolved.contains(&target) {
                resolved.push(target);
            }
        }
    }
    resolved
}
