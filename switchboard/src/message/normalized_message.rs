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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The envelope carried in an exchange's `in`, `out` and `fault` slots.
///
/// The kernel never interprets `content`; it is whatever the collaborating components agree
/// on. Properties are keyed uniquely, and attachments are named binary blobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    content: Value,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    attachments: HashMap<String, Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    security_context: Option<Value>,
}

impl NormalizedMessage {
    /// Creates a message wrapping the given payload.
    pub fn new(content: impl Into<Value>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<Value>) {
        self.content = content.into();
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_property(key, value);
        self
    }

    /// Sets a property, replacing any previous value under the same key.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn add_attachment(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.attachments.insert(name.into(), data);
    }

    pub fn attachment(&self, name: &str) -> Option<&[u8]> {
        self.attachments.get(name).map(Vec::as_slice)
    }

    pub fn remove_attachment(&mut self, name: &str) -> Option<Vec<u8>> {
        self.attachments.remove(name)
    }

    pub fn attachment_names(&self) -> impl Iterator<Item = &str> {
        self.attachments.keys().map(String::as_str)
    }

    pub fn security_context(&self) -> Option<&Value> {
        self.security_context.as_ref()
    }

    pub fn set_security_context(&mut self, context: Option<Value>) {
        self.security_context = context;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn properties_are_unique_by_key() {
        let mut msg = NormalizedMessage::new(json!({"order": 7}))
            .with_property("priority", "low");
        msg.set_property("priority", "high");
        assert_eq!(msg.properties().len(), 1);
        assert_eq!(msg.property("priority"), Some(&json!("high")));
    }

    #[test]
    fn attachments_are_named() {
        let mut msg = NormalizedMessage::default();
        msg.add_attachment("invoice.pdf", vec![1, 2, 3]);
        assert_eq!(msg.attachment("invoice.pdf"), Some(&[1u8, 2, 3][..]));
        assert_eq!(msg.remove_attachment("invoice.pdf"), Some(vec![1, 2, 3]));
        assert!(msg.attachment("invoice.pdf").is_none());
    }
}
