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
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::message::{KernelError, MessageExchange, QualifiedName};
use crate::registry::Endpoint;
use crate::traits::Component;

/// Namespace of the endpoints subscription duplicates are addressed to.
pub const SUBSCRIBER_NAMESPACE: &str = "urn:switchboard:subscriber";

/// Predicate deciding whether a subscriber receives a duplicate of an exchange.
pub trait SubscriptionFilter: Send + Sync {
    fn accepts(&self, exchange: &MessageExchange) -> bool;
}

impl<F> SubscriptionFilter for F
where
    F: Fn(&MessageExchange) -> bool + Send + Sync,
{
    fn accepts(&self, exchange: &MessageExchange) -> bool {
        self(exchange)
    }
}

/// Matches the target service of an exchange.
///
/// `*` matches everything, a trailing `*` matches by prefix on the `{namespace}local` form,
/// anything else must name the service exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServicePattern {
    Any,
    Prefix(String),
    Exact(QualifiedName),
}

impl ServicePattern {
    pub fn matches(&self, service: &QualifiedName) -> bool {
        match self {
            ServicePattern::Any => true,
            ServicePattern::Prefix(prefix) => service.to_string().starts_with(prefix.as_str()),
            ServicePattern::Exact(name) => name == service,
        }
    }
}

impl FromStr for ServicePattern {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            Ok(ServicePattern::Any)
        } else if let Some(prefix) = s.strip_suffix('*') {
            Ok(ServicePattern::Prefix(prefix.to_string()))
        } else {
            Ok(ServicePattern::Exact(s.parse()?))
        }
    }
}

impl From<QualifiedName> for ServicePattern {
    fn from(name: QualifiedName) -> Self {
        ServicePattern::Exact(name)
    }
}

/// What a component wants to see copies of.
///
/// A subscription with neither a service pattern nor an interface matches every exchange. The
/// optional filter runs last.
#[derive(Clone, Default)]
pub struct SubscriptionSpec {
    service: Option<ServicePattern>,
    interface: Option<QualifiedName>,
    operation: Option<QualifiedName>,
    filter: Option<Arc<dyn SubscriptionFilter>>,
}

impl fmt::Debug for SubscriptionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionSpec")
            .field("service", &self.service)
            .field("interface", &self.interface)
            .field("operation", &self.operation)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl SubscriptionSpec {
    /// A subscription to everything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_service(pattern: impl Into<ServicePattern>) -> Self {
        Self {
            service: Some(pattern.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn interface(mut self, interface: QualifiedName) -> Self {
        self.interface = Some(interface);
        self
    }

    #[must_use]
    pub fn operation(mut self, operation: QualifiedName) -> Self {
        self.operation = Some(operation);
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: impl SubscriptionFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Address-level match, without the filter.
    fn matches_target(&self, exchange: &MessageExchange) -> bool {
        if let Some(pattern) = &self.service {
            match exchange.service() {
                Some(service) if pattern.matches(&service) => {}
                _ => return false,
            }
        }
        if let Some(interface) = &self.interface {
            if exchange.interface().as_ref() != Some(interface) {
                return false;
            }
        }
        if let Some(operation) = &self.operation {
            if exchange.operation().as_ref() != Some(operation) {
                return false;
            }
        }
        true
    }
}

#[derive(Clone)]
struct Subscription {
    component: String,
    endpoint: Endpoint,
    spec: SubscriptionSpec,
    /// The subscriber itself, consulted when it also acts as a filter.
    subscriber: Option<Arc<dyn Component>>,
}

impl Subscription {
    fn accepts(&self, exchange: &MessageExchange) -> bool {
        if let Some(filter) = &self.spec.filter {
            return filter.accepts(exchange);
        }
        self.subscriber
            .as_ref()
            .and_then(|c| c.as_subscription_filter())
            .map_or(true, |filter| filter.accepts(exchange))
    }
}

/// Endpoint a component's subscription duplicates are delivered to.
pub fn subscriber_endpoint(component: &str) -> Endpoint {
    Endpoint::internal(
        QualifiedName::new(SUBSCRIBER_NAMESPACE, component),
        "subscriber",
        component,
    )
}

/// All active subscriptions.
///
/// Reads vastly outnumber writes, so the list sits behind a read-write lock. Filters run
/// outside the lock.
#[derive(Default)]
pub struct SubscriptionIndex {
    entries: RwLock<Vec<Subscription>>,
}

impl fmt::Debug for SubscriptionIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionIndex")
            .field("subscriptions", &self.len())
            .finish()
    }
}

impl SubscriptionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(
        &self,
        component: &str,
        spec: SubscriptionSpec,
        subscriber: Option<Arc<dyn Component>>,
    ) {
        trace!(component, ?spec, "adding subscription");
        self.entries.write().push(Subscription {
            component: component.to_string(),
            endpoint: subscriber_endpoint(component),
            spec,
            subscriber,
        });
    }

    /// Drops every subscription held by `component`, returning how many there were.
    pub fn remove_component(&self, component: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|s| s.component != component);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Endpoints of the subscribers that should receive a duplicate of `exchange`.
    pub fn matching(&self, exchange: &MessageExchange) -> Vec<Endpoint> {
        let candidates: Vec<Subscription> = self
            .entries
            .read()
            .iter()
            .filter(|s| s.spec.matches_target(exchange))
            .cloned()
            .collect();
        candidates
            .into_iter()
            .filter(|s| s.accepts(exchange))
            .map(|s| s.endpoint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{NormalizedMessage, Pattern};

    fn exchange_for(service: &str) -> MessageExchange {
        let exchange = MessageExchange::new(Pattern::OneWay);
        exchange.set_service(service.parse().unwrap()).unwrap();
        exchange.set_in_message(NormalizedMessage::default()).unwrap();
        exchange
    }

    #[test]
    fn patterns_parse_and_match() {
        let orders: QualifiedName = "{urn:test}orders".parse().unwrap();
        assert!("*".parse::<ServicePattern>().unwrap().matches(&orders));
        assert!("{urn:test}*".parse::<ServicePattern>().unwrap().matches(&orders));
        assert!(!"{urn:other}*".parse::<ServicePattern>().unwrap().matches(&orders));
        assert!("{urn:test}orders".parse::<ServicePattern>().unwrap().matches(&orders));
    }

    #[test]
    fn empty_spec_matches_everything() {
        let index = SubscriptionIndex::new();
        index.add("audit", SubscriptionSpec::new(), None);
        assert_eq!(index.matching(&exchange_for("{urn:any}thing")).len(), 1);
    }

    #[test]
    fn filter_runs_after_address_match() {
        let index = SubscriptionIndex::new();
        let spec = SubscriptionSpec::for_service(QualifiedName::new("urn:test", "orders"))
            .filter(|ex: &MessageExchange| ex.property("vip").is_some());
        index.add("audit", spec, None);

        let plain = exchange_for("{urn:test}orders");
        assert!(index.matching(&plain).is_empty());

        let vip = exchange_for("{urn:test}orders");
        vip.set_property("vip", true).unwrap();
        let matched = index.matching(&vip);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].component(), "audit");
        assert!(index.matching(&exchange_for("{urn:test}billing")).is_empty());
    }

    #[test]
    fn remove_component_drops_its_subscriptions() {
        let index = SubscriptionIndex::new();
        index.add("audit", SubscriptionSpec::new(), None);
        index.add("audit", SubscriptionSpec::for_service(ServicePattern::Any), None);
        index.add("metrics", SubscriptionSpec::new(), None);
        assert_eq!(index.remove_component("audit"), 2);
        assert_eq!(index.len(), 1);
    }
}
