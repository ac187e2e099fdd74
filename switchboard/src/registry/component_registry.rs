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

use acton_ern::Ern;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::common::ChannelCore;
use crate::registry::ActivationSpec;
use crate::traits::Component;

/// Lifecycle of an activated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// Registered and receiving exchanges.
    Started,
    /// Deactivated. Nothing is delivered to it any more.
    Shutdown,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentState::Started => f.write_str("started"),
            ComponentState::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Bookkeeping for one activation.
pub(crate) struct ComponentRecord {
    /// Identity of this particular activation; a re-activated name gets a new one.
    pub(crate) id: Ern,
    pub(crate) spec: Arc<ActivationSpec>,
    pub(crate) core: Arc<ChannelCore>,
    state: RwLock<ComponentState>,
}

impl fmt::Debug for ComponentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRecord")
            .field("id", &self.id.to_string())
            .field("name", &self.spec.name())
            .field("state", &*self.state.read())
            .finish()
    }
}

impl ComponentRecord {
    pub(crate) fn new(id: Ern, spec: Arc<ActivationSpec>, core: Arc<ChannelCore>) -> Self {
        Self {
            id,
            spec,
            core,
            state: RwLock::new(ComponentState::Started),
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.spec.name()
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn Component>> {
        self.spec.callback().cloned()
    }

    pub(crate) fn state(&self) -> ComponentState {
        *self.state.read()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.state() == ComponentState::Started
    }

    pub(crate) fn set_state(&self, state: ComponentState) {
        *self.state.write() = state;
    }
}

/// Activated components by name.
#[derive(Debug, Default)]
pub(crate) struct ComponentRegistry {
    components: DashMap<String, Arc<ComponentRecord>>,
}

impl ComponentRegistry {
    /// Inserts a record unless a started component already uses the name.
    pub(crate) fn insert(&self, record: Arc<ComponentRecord>) -> bool {
        match self.components.entry(record.name().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                if existing.get().is_started() {
                    return false;
                }
                existing.insert(record);
                true
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<ComponentRecord>> {
        self.components.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn remove(&self, name: &str) -> Option<Arc<ComponentRecord>> {
        self.components.remove(name).map(|(_, record)| record)
    }

    pub(crate) fn state(&self, name: &str) -> Option<ComponentState> {
        self.components.get(name).map(|entry| entry.value().state())
    }

    pub(crate) fn is_started(&self, name: &str) -> bool {
        self.state(name) == Some(ComponentState::Started)
    }

    /// Started components, for shutdown and reference resolution.
    pub(crate) fn started(&self) -> Vec<Arc<ComponentRecord>> {
        self.components
            .iter()
            .filter(|entry| entry.value().is_started())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
