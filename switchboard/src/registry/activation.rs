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
use std::sync::Arc;

use crate::message::QualifiedName;
use crate::registry::{Endpoint, SubscriptionSpec};
use crate::resolver::EndpointChooser;
use crate::traits::Component;

/// Everything the kernel needs to know to activate a component.
///
/// An activation without a [`component`](Self::component) activates a pull-mode component: nothing
/// is called back, and the owner drains inbound exchanges with
/// [`DeliveryChannel::accept`](crate::common::DeliveryChannel::accept).
///
/// # Example
///
/// ```rust,ignore
/// let spec = ActivationSpec::new("orders")
///     .component(OrderService::default())
///     .service(QualifiedName::new("urn:shop", "orders"))
///     .endpoint("main")
///     .subscription(SubscriptionSpec::for_service(ServicePattern::Any));
/// ```
#[derive(Clone)]
pub struct ActivationSpec {
    name: String,
    component: Option<Arc<dyn Component>>,
    service: Option<QualifiedName>,
    endpoint: Option<String>,
    interfaces: Vec<QualifiedName>,
    destination_service: Option<QualifiedName>,
    destination_interface: Option<QualifiedName>,
    destination_operation: Option<QualifiedName>,
    destination_endpoint: Option<String>,
    destination_uri: Option<String>,
    fail_if_no_destination: Option<bool>,
    persistent: Option<bool>,
    subscriptions: Vec<SubscriptionSpec>,
    chooser: Option<Arc<dyn EndpointChooser>>,
}

impl fmt::Debug for ActivationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationSpec")
            .field("name", &self.name)
            .field("push", &self.component.is_some())
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("destination_service", &self.destination_service)
            .field("destination_endpoint", &self.destination_endpoint)
            .field("fail_if_no_destination", &self.fail_if_no_destination)
            .field("persistent", &self.persistent)
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl ActivationSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            component: None,
            service: None,
            endpoint: None,
            interfaces: Vec::new(),
            destination_service: None,
            destination_interface: None,
            destination_operation: None,
            destination_endpoint: None,
            destination_uri: None,
            fail_if_no_destination: None,
            persistent: None,
            subscriptions: Vec::new(),
            chooser: None,
        }
    }

    /// The callback invoked for every exchange delivered to this component.
    #[must_use]
    pub fn component(mut self, component: impl Component) -> Self {
        self.component = Some(Arc::new(component));
        self
    }

    #[must_use]
    pub fn shared_component(mut self, component: Arc<dyn Component>) -> Self {
        self.component = Some(component);
        self
    }

    /// Service this component hosts. Without an explicit endpoint name, the component name is
    /// used.
    #[must_use]
    pub fn service(mut self, service: QualifiedName) -> Self {
        self.service = Some(service);
        self
    }

    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn interface(mut self, interface: QualifiedName) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Default target service for exchanges created by this component.
    #[must_use]
    pub fn destination_service(mut self, service: QualifiedName) -> Self {
        self.destination_service = Some(service);
        self
    }

    #[must_use]
    pub fn destination_interface(mut self, interface: QualifiedName) -> Self {
        self.destination_interface = Some(interface);
        self
    }

    #[must_use]
    pub fn destination_operation(mut self, operation: QualifiedName) -> Self {
        self.destination_operation = Some(operation);
        self
    }

    /// Default target endpoint; only meaningful together with a destination service.
    #[must_use]
    pub fn destination_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.destination_endpoint = Some(endpoint.into());
        self
    }

    #[must_use]
    pub fn destination_uri(mut self, uri: impl Into<String>) -> Self {
        self.destination_uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn fail_if_no_destination(mut self, fail: bool) -> Self {
        self.fail_if_no_destination = Some(fail);
        self
    }

    /// Marks exchanges created by this component as persistent, steering them onto the
    /// transactional flow.
    #[must_use]
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    #[must_use]
    pub fn subscription(mut self, subscription: SubscriptionSpec) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    #[must_use]
    pub fn chooser(mut self, chooser: impl EndpointChooser + 'static) -> Self {
        self.chooser = Some(Arc::new(chooser));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn callback(&self) -> Option<&Arc<dyn Component>> {
        self.component.as_ref()
    }

    pub fn service_name(&self) -> Option<&QualifiedName> {
        self.service.as_ref()
    }

    pub fn endpoint_name(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn interfaces(&self) -> &[QualifiedName] {
        &self.interfaces
    }

    pub fn destination_service_name(&self) -> Option<&QualifiedName> {
        self.destination_service.as_ref()
    }

    pub fn destination_interface_name(&self) -> Option<&QualifiedName> {
        self.destination_interface.as_ref()
    }

    pub fn destination_operation_name(&self) -> Option<&QualifiedName> {
        self.destination_operation.as_ref()
    }

    pub fn destination_endpoint_name(&self) -> Option<&str> {
        self.destination_endpoint.as_deref()
    }

    pub fn destination_uri_value(&self) -> Option<&str> {
        self.destination_uri.as_deref()
    }

    /// `None` defers to the kernel configuration.
    pub fn fail_if_no_destination_flag(&self) -> Option<bool> {
        self.fail_if_no_destination
    }

    pub fn persistent_flag(&self) -> Option<bool> {
        self.persistent
    }

    pub fn subscriptions(&self) -> &[SubscriptionSpec] {
        &self.subscriptions
    }

    pub fn endpoint_chooser(&self) -> Option<&Arc<dyn EndpointChooser>> {
        self.chooser.as_ref()
    }

    /// The internal endpoint this activation registers, if it hosts a service.
    pub fn hosted_endpoint(&self) -> Option<Endpoint> {
        self.service.as_ref().map(|service| {
            let name = self.endpoint.clone().unwrap_or_else(|| self.name.clone());
            Endpoint::internal(service.clone(), name, self.name.clone())
                .with_interfaces(self.interfaces.iter().cloned())
        })
    }
}
