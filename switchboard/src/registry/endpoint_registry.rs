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

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::message::{KernelError, QualifiedName};
use crate::registry::{Endpoint, EndpointKey, EndpointKind};

/// Tracks every endpoint known to the kernel, split by how it is reachable.
///
/// Lookups go straight to the concurrent maps. Mutations only happen on activation and
/// deactivation and are serialized by a registry-wide guard so that check-then-insert
/// sequences cannot interleave.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    internal: DashMap<EndpointKey, Endpoint>,
    external: DashMap<EndpointKey, Endpoint>,
    linked: DashMap<EndpointKey, Endpoint>,
    write_guard: Mutex<()>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint hosted by a local component.
    pub fn register_internal(&self, endpoint: Endpoint) -> Result<(), KernelError> {
        Self::expect_kind(&endpoint, |k| matches!(k, EndpointKind::Internal))?;
        let _guard = self.write_guard.lock();
        Self::insert_unique(&self.internal, endpoint)
    }

    /// Registers an endpoint advertised to consumers outside the kernel.
    pub fn register_external(&self, endpoint: Endpoint) -> Result<(), KernelError> {
        Self::expect_kind(&endpoint, |k| matches!(k, EndpointKind::External))?;
        let _guard = self.write_guard.lock();
        Self::insert_unique(&self.external, endpoint)
    }

    /// Registers an alias pointing at another service/endpoint pair.
    pub fn register_linked(&self, endpoint: Endpoint) -> Result<(), KernelError> {
        Self::expect_kind(&endpoint, |k| matches!(k, EndpointKind::Linked { .. }))?;
        let _guard = self.write_guard.lock();
        Self::insert_unique(&self.linked, endpoint)
    }

    pub fn unregister_internal(&self, service: &QualifiedName, name: &str) -> Option<Endpoint> {
        let _guard = self.write_guard.lock();
        self.internal
            .remove(&(service.clone(), name.to_string()))
            .map(|(_, endpoint)| endpoint)
    }

    pub fn unregister_external(&self, service: &QualifiedName, name: &str) -> Option<Endpoint> {
        let _guard = self.write_guard.lock();
        self.external
            .remove(&(service.clone(), name.to_string()))
            .map(|(_, endpoint)| endpoint)
    }

    pub fn unregister_linked(&self, service: &QualifiedName, name: &str) -> Option<Endpoint> {
        let _guard = self.write_guard.lock();
        self.linked
            .remove(&(service.clone(), name.to_string()))
            .map(|(_, endpoint)| endpoint)
    }

    /// Removes every endpoint owned by `component`, whatever its kind.
    pub fn unregister_component(&self, component: &str) -> Vec<Endpoint> {
        let _guard = self.write_guard.lock();
        let mut removed = Vec::new();
        for map in [&self.internal, &self.external, &self.linked] {
            let keys: Vec<EndpointKey> = map
                .iter()
                .filter(|entry| entry.value().component() == component)
                .map(|entry| entry.key().clone())
                .collect();
            for key in keys {
                if let Some((_, endpoint)) = map.remove(&key) {
                    removed.push(endpoint);
                }
            }
        }
        trace!(component, removed = removed.len(), "unregistered component endpoints");
        removed
    }

    pub fn internal_endpoint(&self, service: &QualifiedName, name: &str) -> Option<Endpoint> {
        self.internal
            .get(&(service.clone(), name.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Looks up a routable endpoint by key. Linked endpoints shadow internal ones.
    pub fn endpoint(&self, service: &QualifiedName, name: &str) -> Option<Endpoint> {
        let key = (service.clone(), name.to_string());
        self.linked
            .get(&key)
            .or_else(|| self.internal.get(&key))
            .map(|entry| entry.value().clone())
    }

    /// Internal and linked endpoints of a service, in a stable order.
    pub fn endpoints_for_service(&self, service: &QualifiedName) -> Vec<Endpoint> {
        let mut found: Vec<Endpoint> = self
            .internal
            .iter()
            .chain(self.linked.iter())
            .filter(|entry| entry.value().service() == service)
            .map(|entry| entry.value().clone())
            .collect();
        sort_stable(&mut found);
        found
    }

    /// Internal endpoints implementing an interface, in a stable order.
    pub fn endpoints_for_interface(&self, interface: &QualifiedName) -> Vec<Endpoint> {
        let mut found: Vec<Endpoint> = self
            .internal
            .iter()
            .filter(|entry| entry.value().implements(interface))
            .map(|entry| entry.value().clone())
            .collect();
        sort_stable(&mut found);
        found
    }

    pub fn external_endpoints_for_service(&self, service: &QualifiedName) -> Vec<Endpoint> {
        let mut found: Vec<Endpoint> = self
            .external
            .iter()
            .filter(|entry| entry.value().service() == service)
            .map(|entry| entry.value().clone())
            .collect();
        sort_stable(&mut found);
        found
    }

    pub fn external_endpoints_for_interface(&self, interface: &QualifiedName) -> Vec<Endpoint> {
        let mut found: Vec<Endpoint> = self
            .external
            .iter()
            .filter(|entry| entry.value().implements(interface))
            .map(|entry| entry.value().clone())
            .collect();
        sort_stable(&mut found);
        found
    }

    /// All endpoints owned by a component.
    pub fn endpoints_for_component(&self, component: &str) -> Vec<Endpoint> {
        let mut found: Vec<Endpoint> = self
            .internal
            .iter()
            .chain(self.external.iter())
            .chain(self.linked.iter())
            .filter(|entry| entry.value().component() == component)
            .map(|entry| entry.value().clone())
            .collect();
        sort_stable(&mut found);
        found
    }

    pub fn internal_count(&self) -> usize {
        self.internal.len()
    }

    fn expect_kind(
        endpoint: &Endpoint,
        accepts: impl Fn(&EndpointKind) -> bool,
    ) -> Result<(), KernelError> {
        if accepts(endpoint.kind()) {
            Ok(())
        } else {
            Err(KernelError::invalid_state(format!(
                "endpoint {endpoint} has kind {:?}",
                endpoint.kind()
            )))
        }
    }

    fn insert_unique(
        map: &DashMap<EndpointKey, Endpoint>,
        endpoint: Endpoint,
    ) -> Result<(), KernelError> {
        let key = endpoint.key();
        if map.contains_key(&key) {
            return Err(KernelError::DuplicateEndpoint(endpoint.to_string()));
        }
        trace!(%endpoint, "registered endpoint");
        map.insert(key, endpoint);
        Ok(())
    }
}

fn sort_stable(endpoints: &mut [Endpoint]) {
    endpoints.sort_by(|a, b| (a.service(), a.name()).cmp(&(b.service(), b.name())));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svc(local: &str) -> QualifiedName {
        QualifiedName::new("urn:test", local)
    }

    #[test]
    fn duplicate_internal_endpoint_is_rejected() {
        let registry = EndpointRegistry::new();
        registry
            .register_internal(Endpoint::internal(svc("orders"), "main", "a"))
            .unwrap();
        let err = registry
            .register_internal(Endpoint::internal(svc("orders"), "main", "b"))
            .unwrap_err();
        assert!(matches!(err, KernelError::DuplicateEndpoint(_)));
    }

    #[test]
    fn kinds_are_kept_apart() {
        let registry = EndpointRegistry::new();
        assert!(registry
            .register_internal(Endpoint::external(svc("orders"), "main", "a"))
            .is_err());
        registry
            .register_external(Endpoint::external(svc("orders"), "public", "a"))
            .unwrap();
        assert!(registry.endpoints_for_service(&svc("orders")).is_empty());
        assert_eq!(registry.external_endpoints_for_service(&svc("orders")).len(), 1);
    }

    #[test]
    fn linked_endpoints_shadow_internal_ones() {
        let registry = EndpointRegistry::new();
        registry
            .register_internal(Endpoint::internal(svc("orders"), "main", "a"))
            .unwrap();
        registry
            .register_linked(Endpoint::linked(
                svc("orders"),
                "main",
                "bridge",
                svc("remote-orders"),
                "peer",
            ))
            .unwrap();
        let found = registry.endpoint(&svc("orders"), "main").unwrap();
        assert!(matches!(found.kind(), EndpointKind::Linked { .. }));
    }

    #[test]
    fn service_lookup_is_sorted() {
        let registry = EndpointRegistry::new();
        for name in ["c", "a", "b"] {
            registry
                .register_internal(Endpoint::internal(svc("orders"), name, name))
                .unwrap();
        }
        let names: Vec<String> = registry
            .endpoints_for_service(&svc("orders"))
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn unregister_component_removes_all_kinds() {
        let registry = EndpointRegistry::new();
        registry
            .register_internal(Endpoint::internal(svc("orders"), "main", "a"))
            .unwrap();
        registry
            .register_external(Endpoint::external(svc("orders"), "public", "a"))
            .unwrap();
        registry
            .register_internal(Endpoint::internal(svc("billing"), "main", "b"))
            .unwrap();
        assert_eq!(registry.unregister_component("a").len(), 2);
        assert_eq!(registry.endpoints_for_component("a").len(), 0);
        assert_eq!(registry.internal_count(), 1);
    }
}
