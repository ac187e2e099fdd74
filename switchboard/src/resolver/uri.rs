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

use crate::message::{KernelError, QualifiedName};

/// A parsed structured target URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredUri {
    /// `interface:<namespace>/<interface>`
    Interface(QualifiedName),
    /// `operation:<namespace>/<interface>/<operation>`; routing only uses the interface.
    Operation {
        interface: QualifiedName,
        operation: QualifiedName,
    },
    /// `service:<namespace>/<service>`
    Service(QualifiedName),
    /// `endpoint:<namespace>/<service>/<endpoint>`
    Endpoint {
        service: QualifiedName,
        endpoint: String,
    },
    /// Anything else; resolved as an addressing reference.
    Opaque(String),
}

impl StructuredUri {
    /// Parses a target URI.
    ///
    /// Segments are split on the last `/` when the remainder contains a `/` past its first
    /// character, otherwise on the last `:`, so both `service:urn:test/orders` and
    /// `service:urn:test:orders` name `{urn:test}orders`.
    pub fn parse(uri: &str) -> Result<Self, KernelError> {
        if let Some(rest) = uri.strip_prefix("interface:") {
            let (ns, local) = split2(rest)?;
            Ok(StructuredUri::Interface(QualifiedName::new(ns, local)))
        } else if let Some(rest) = uri.strip_prefix("operation:") {
            let (ns, interface, operation) = split3(rest)?;
            Ok(StructuredUri::Operation {
                interface: QualifiedName::new(ns, interface),
                operation: QualifiedName::new(ns, operation),
            })
        } else if let Some(rest) = uri.strip_prefix("service:") {
            let (ns, local) = split2(rest)?;
            Ok(StructuredUri::Service(QualifiedName::new(ns, local)))
        } else if let Some(rest) = uri.strip_prefix("endpoint:") {
            let (ns, service, endpoint) = split3(rest)?;
            Ok(StructuredUri::Endpoint {
                service: QualifiedName::new(ns, service),
                endpoint: endpoint.to_string(),
            })
        } else {
            Ok(StructuredUri::Opaque(uri.to_string()))
        }
    }
}

fn separator(s: &str) -> char {
    match s.find('/') {
        Some(index) if index > 0 => '/',
        _ => ':',
    }
}

fn split_last(s: &str) -> Option<(&str, &str)> {
    let index = s.rfind(separator(s))?;
    Some((&s[..index], &s[index + 1..]))
}

fn split2(s: &str) -> Result<(&str, &str), KernelError> {
    let (ns, local) = split_last(s).unwrap_or(("", s));
    if local.is_empty() {
        return Err(KernelError::InvalidReference(format!("no local name in '{s}'")));
    }
    Ok((ns, local))
}

fn split3(s: &str) -> Result<(&str, &str, &str), KernelError> {
    let malformed = || KernelError::InvalidReference(format!("expected three segments in '{s}'"));
    let (rest, last) = split_last(s).ok_or_else(malformed)?;
    let (ns, middle) = split_last(rest).ok_or_else(malformed)?;
    if middle.is_empty() || last.is_empty() {
        return Err(malformed());
    }
    Ok((ns, middle, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_uri_splits_on_last_slash() {
        assert_eq!(
            StructuredUri::parse("service:urn:test/myservice").unwrap(),
            StructuredUri::Service(QualifiedName::new("urn:test", "myservice"))
        );
    }

    #[test]
    fn colon_separated_uris_split_on_last_colon() {
        assert_eq!(
            StructuredUri::parse("endpoint:urn:test:myservice:ep1").unwrap(),
            StructuredUri::Endpoint {
                service: QualifiedName::new("urn:test", "myservice"),
                endpoint: "ep1".into(),
            }
        );
    }

    #[test]
    fn http_namespaces_keep_their_slashes() {
        assert_eq!(
            StructuredUri::parse("interface:http://example.org/shop/OrderPort").unwrap(),
            StructuredUri::Interface(QualifiedName::new("http://example.org/shop", "OrderPort"))
        );
    }

    #[test]
    fn operation_uri_carries_interface_and_operation() {
        let parsed = StructuredUri::parse("operation:urn:test/OrderPort/submit").unwrap();
        assert_eq!(
            parsed,
            StructuredUri::Operation {
                interface: QualifiedName::new("urn:test", "OrderPort"),
                operation: QualifiedName::new("urn:test", "submit"),
            }
        );
    }

    #[test]
    fn unknown_schemes_are_opaque() {
        assert_eq!(
            StructuredUri::parse("jms://queue/orders").unwrap(),
            StructuredUri::Opaque("jms://queue/orders".into())
        );
    }

    #[test]
    fn endpoint_uri_needs_three_segments() {
        assert!(StructuredUri::parse("endpoint:myservice").is_err());
    }
}
