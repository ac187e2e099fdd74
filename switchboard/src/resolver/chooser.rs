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

use std::fmt::Debug;
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::message::{MessageExchange, QualifiedName};
use crate::registry::Endpoint;

/// Picks one endpoint out of several equally valid candidates.
///
/// Candidates arrive in the registry's stable order.
pub trait EndpointChooser: Send + Sync + Debug {
    fn choose(&self, candidates: &[Endpoint], exchange: &MessageExchange) -> Option<Endpoint>;
}

/// Chooser strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChooserKind {
    #[default]
    RoundRobin,
    First,
    Random,
}

impl ChooserKind {
    pub fn build(self) -> Arc<dyn EndpointChooser> {
        match self {
            ChooserKind::RoundRobin => Arc::new(RoundRobinChooser::default()),
            ChooserKind::First => Arc::new(FirstChoiceChooser),
            ChooserKind::Random => Arc::new(RandomChooser),
        }
    }
}

/// Always the first candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstChoiceChooser;

impl EndpointChooser for FirstChoiceChooser {
    fn choose(&self, candidates: &[Endpoint], _exchange: &MessageExchange) -> Option<Endpoint> {
        candidates.first().cloned()
    }
}

/// A uniformly random candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomChooser;

impl EndpointChooser for RandomChooser {
    fn choose(&self, candidates: &[Endpoint], _exchange: &MessageExchange) -> Option<Endpoint> {
        if candidates.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..candidates.len());
        candidates.get(index).cloned()
    }
}

/// Cycles through the candidates, keeping one cursor per addressed target (service,
/// interface, URI or reference) so that traffic to different targets does not disturb each
/// other's rotation. Cursors survive changes in the candidate set of their target.
#[derive(Debug, Default)]
pub struct RoundRobinChooser {
    cursors: DashMap<RotationKey, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RotationKey {
    Service(QualifiedName),
    Interface(QualifiedName),
    Uri(String),
    Reference(String),
    Unaddressed,
}

impl RotationKey {
    fn of(exchange: &MessageExchange) -> Self {
        if let Some(service) = exchange.service() {
            RotationKey::Service(service)
        } else if let Some(interface) = exchange.interface() {
            RotationKey::Interface(interface)
        } else if let Some(uri) = exchange.target_uri() {
            RotationKey::Uri(uri)
        } else if let Some(reference) = exchange.target_reference() {
            RotationKey::Reference(reference.to_document())
        } else {
            RotationKey::Unaddressed
        }
    }
}

impl RoundRobinChooser {
    /// Number of targets with a cursor.
    pub fn rotations(&self) -> usize {
        self.cursors.len()
    }
}

impl EndpointChooser for RoundRobinChooser {
    fn choose(&self, candidates: &[Endpoint], exchange: &MessageExchange) -> Option<Endpoint> {
        if candidates.is_empty() {
            return None;
        }
        let mut cursor = self.cursors.entry(RotationKey::of(exchange)).or_insert(0);
        let index = *cursor % candidates.len();
        *cursor = cursor.wrapping_add(1);
        candidates.get(index).cloned()
    }
}
