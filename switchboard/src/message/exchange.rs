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

use mti::prelude::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::flow::Transaction;
use crate::message::{KernelError, NormalizedMessage, QualifiedName};
use crate::registry::{Endpoint, EndpointReference};

/// Property set on every duplicate produced by subscription fan-out.
pub const FROM_SUBSCRIPTION: &str = "switchboard.from_subscription";

/// Globally unique exchange identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub(crate) fn generate() -> Self {
        Self("exchange".create_type_id::<V7>().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The interaction pattern of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Request only; the provider answers with `Done` or `Error`.
    OneWay,
    /// Request only, but the provider may answer with a fault.
    RobustOneWay,
    /// Request followed by exactly one `out` or `fault`.
    RequestReply,
    /// Request followed by an `out` or `fault` the consumer may itself fault on.
    RequestOptionalReply,
}

impl Pattern {
    /// Whether the provider answers with an `out` message.
    pub const fn has_reply(self) -> bool {
        matches!(self, Pattern::RequestReply | Pattern::RequestOptionalReply)
    }
}

/// Exchange status. `Active` moves once to `Done` or `Error` and never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeStatus {
    Active,
    Done,
    Error,
}

impl ExchangeStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, ExchangeStatus::Active)
    }
}

/// The side of the conversation a view of an exchange belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Consumer,
    Provider,
}

impl Role {
    pub const fn opposite(self) -> Self {
        match self {
            Role::Consumer => Role::Provider,
            Role::Provider => Role::Consumer,
        }
    }
}

/// Whether a side of the exchange is blocked in `send_sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    Async,
    SyncSent,
    SyncReceived,
}

#[derive(Debug)]
pub(crate) struct ExchangePacket {
    id: ExchangeId,
    pattern: Pattern,
    status: ExchangeStatus,
    owner: Role,
    source: Option<String>,
    endpoint: Option<Endpoint>,
    service: Option<QualifiedName>,
    interface: Option<QualifiedName>,
    operation: Option<QualifiedName>,
    target_uri: Option<String>,
    target_reference: Option<EndpointReference>,
    in_msg: Option<NormalizedMessage>,
    out_msg: Option<NormalizedMessage>,
    fault_msg: Option<NormalizedMessage>,
    error: Option<KernelError>,
    properties: Map<String, Value>,
    consumer_sync: SyncState,
    provider_sync: SyncState,
    persistent: Option<bool>,
    sends: u32,
    terminal_sent: bool,
    aborted: bool,
    transaction: Option<Arc<dyn Transaction>>,
}

impl ExchangePacket {
    fn new(pattern: Pattern) -> Self {
        Self {
            id: ExchangeId::generate(),
            pattern,
            status: ExchangeStatus::Active,
            owner: Role::Consumer,
            source: None,
            endpoint: None,
            service: None,
            interface: None,
            operation: None,
            target_uri: None,
            target_reference: None,
            in_msg: None,
            out_msg: None,
            fault_msg: None,
            error: None,
            properties: Map::new(),
            consumer_sync: SyncState::Async,
            provider_sync: SyncState::Async,
            persistent: None,
            sends: 0,
            terminal_sent: false,
            aborted: false,
            transaction: None,
        }
    }

    fn sync_state(&self, role: Role) -> SyncState {
        match role {
            Role::Consumer => self.consumer_sync,
            Role::Provider => self.provider_sync,
        }
    }

    fn sync_state_mut(&mut self, role: Role) -> &mut SyncState {
        match role {
            Role::Consumer => &mut self.consumer_sync,
            Role::Provider => &mut self.provider_sync,
        }
    }
}

/// A view of an exchange from one side of the conversation.
///
/// Both views share the same underlying record; [`mirror`](Self::mirror) returns the other
/// side's view. The record tracks which side currently owns the exchange: every mutation made
/// through a view that does not own it fails with [`KernelError::InvalidState`], and each
/// successful send hands ownership to the other side.
#[derive(Clone)]
pub struct MessageExchange {
    packet: Arc<Mutex<ExchangePacket>>,
    role: Role,
}

impl fmt::Debug for MessageExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let packet = self.packet.lock();
        f.debug_struct("MessageExchange")
            .field("id", &packet.id)
            .field("role", &self.role)
            .field("pattern", &packet.pattern)
            .field("status", &packet.status)
            .field("owner", &packet.owner)
            .finish()
    }
}

impl MessageExchange {
    pub(crate) fn new(pattern: Pattern) -> Self {
        Self {
            packet: Arc::new(Mutex::new(ExchangePacket::new(pattern))),
            role: Role::Consumer,
        }
    }

    /// The opposite side's view of this exchange.
    #[must_use]
    pub fn mirror(&self) -> Self {
        Self {
            packet: Arc::clone(&self.packet),
            role: self.role.opposite(),
        }
    }

    pub fn id(&self) -> ExchangeId {
        self.packet.lock().id.clone()
    }

    pub fn pattern(&self) -> Pattern {
        self.packet.lock().pattern
    }

    pub fn status(&self) -> ExchangeStatus {
        self.packet.lock().status
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    /// Whether this view currently owns the exchange.
    pub fn is_owner(&self) -> bool {
        self.packet.lock().owner == self.role
    }

    /// Name of the component that created the exchange.
    pub fn source(&self) -> Option<String> {
        self.packet.lock().source.clone()
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.packet.lock().endpoint.clone()
    }

    pub fn service(&self) -> Option<QualifiedName> {
        self.packet.lock().service.clone()
    }

    pub fn interface(&self) -> Option<QualifiedName> {
        self.packet.lock().interface.clone()
    }

    pub fn operation(&self) -> Option<QualifiedName> {
        self.packet.lock().operation.clone()
    }

    pub fn target_uri(&self) -> Option<String> {
        self.packet.lock().target_uri.clone()
    }

    pub fn target_reference(&self) -> Option<EndpointReference> {
        self.packet.lock().target_reference.clone()
    }

    pub fn in_message(&self) -> Option<NormalizedMessage> {
        self.packet.lock().in_msg.clone()
    }

    pub fn out_message(&self) -> Option<NormalizedMessage> {
        self.packet.lock().out_msg.clone()
    }

    pub fn fault(&self) -> Option<NormalizedMessage> {
        self.packet.lock().fault_msg.clone()
    }

    pub fn error(&self) -> Option<KernelError> {
        self.packet.lock().error.clone()
    }

    pub fn property(&self, key: &str) -> Option<Value> {
        self.packet.lock().properties.get(key).cloned()
    }

    pub fn persistent(&self) -> Option<bool> {
        self.packet.lock().persistent
    }

    pub fn is_transacted(&self) -> bool {
        self.packet.lock().transaction.is_some()
    }

    /// Whether this exchange was produced by subscription fan-out.
    pub fn is_from_subscription(&self) -> bool {
        self.packet
            .lock()
            .properties
            .get(FROM_SUBSCRIPTION)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_endpoint(&self, endpoint: Endpoint) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.endpoint = Some(endpoint);
            Ok(())
        })
    }

    pub fn set_service(&self, service: QualifiedName) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.service = Some(service);
            Ok(())
        })
    }

    pub fn set_interface(&self, interface: QualifiedName) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.interface = Some(interface);
            Ok(())
        })
    }

    pub fn set_operation(&self, operation: QualifiedName) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.operation = Some(operation);
            Ok(())
        })
    }

    /// Targets the exchange with a structured URI such as `service:urn:test/orders`.
    pub fn set_target_uri(&self, uri: impl Into<String>) -> Result<(), KernelError> {
        let uri = uri.into();
        self.mutate(|p| {
            p.target_uri = Some(uri);
            Ok(())
        })
    }

    /// Targets the exchange with an opaque endpoint reference document.
    pub fn set_target_reference(&self, reference: EndpointReference) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.target_reference = Some(reference);
            Ok(())
        })
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), KernelError> {
        let (key, value) = (key.into(), value.into());
        self.mutate(|p| {
            p.properties.insert(key, value);
            Ok(())
        })
    }

    /// Hints the transactional flow that this exchange must survive a crash.
    pub fn set_persistent(&self, persistent: bool) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.persistent = Some(persistent);
            Ok(())
        })
    }

    /// Enlists the exchange's sends in a transaction; they are only published on commit.
    pub fn set_transaction(&self, transaction: Arc<dyn Transaction>) -> Result<(), KernelError> {
        self.mutate(|p| {
            p.transaction = Some(transaction);
            Ok(())
        })
    }

    /// Sets the request. Only the consumer sets it, once.
    pub fn set_in_message(&self, message: NormalizedMessage) -> Result<(), KernelError> {
        let role = self.role;
        self.mutate(|p| {
            if role != Role::Consumer {
                return Err(KernelError::invalid_state("only the consumer sets the in message"));
            }
            if p.in_msg.is_some() {
                return Err(KernelError::invalid_state("in message already set"));
            }
            p.in_msg = Some(message);
            Ok(())
        })
    }

    /// Sets the reply. Only the provider of a reply-capable exchange sets it, once.
    pub fn set_out_message(&self, message: NormalizedMessage) -> Result<(), KernelError> {
        let role = self.role;
        self.mutate(|p| {
            if role != Role::Provider {
                return Err(KernelError::invalid_state("only the provider sets the out message"));
            }
            if !p.pattern.has_reply() {
                return Err(KernelError::invalid_state(format!(
                    "{:?} exchanges carry no out message",
                    p.pattern
                )));
            }
            if p.out_msg.is_some() {
                return Err(KernelError::invalid_state("out message already set"));
            }
            if p.fault_msg.is_some() || p.error.is_some() {
                return Err(KernelError::invalid_state(
                    "out message excludes fault and error",
                ));
            }
            p.out_msg = Some(message);
            Ok(())
        })
    }

    /// Sets the fault, the negative outcome of a reply-capable or robust exchange.
    pub fn set_fault(&self, fault: NormalizedMessage) -> Result<(), KernelError> {
        let role = self.role;
        self.mutate(|p| {
            if p.pattern == Pattern::OneWay {
                return Err(KernelError::invalid_state("one-way exchanges carry no fault"));
            }
            if p.fault_msg.is_some() {
                return Err(KernelError::invalid_state("fault already set"));
            }
            let consumer_answer = role == Role::Consumer && p.pattern == Pattern::RequestOptionalReply;
            if p.out_msg.is_some() && !consumer_answer {
                return Err(KernelError::invalid_state("fault excludes an out message"));
            }
            p.fault_msg = Some(fault);
            Ok(())
        })
    }

    /// Fails the exchange: records `error` and moves the status to `Error`.
    pub fn set_error(&self, error: KernelError) -> Result<(), KernelError> {
        self.mutate(|p| {
            if p.out_msg.is_some() {
                return Err(KernelError::invalid_state("error excludes an out message"));
            }
            p.error = Some(error);
            p.status = ExchangeStatus::Error;
            Ok(())
        })
    }

    /// Moves the status forward. `Error` without a fault records a generic failure.
    pub fn set_status(&self, status: ExchangeStatus) -> Result<(), KernelError> {
        self.mutate(|p| {
            match status {
                ExchangeStatus::Active => {}
                ExchangeStatus::Done => p.status = ExchangeStatus::Done,
                ExchangeStatus::Error => {
                    if p.fault_msg.is_none() && p.error.is_none() {
                        p.error = Some(KernelError::ComponentFailure(
                            "exchange marked as failed".into(),
                        ));
                    }
                    p.status = ExchangeStatus::Error;
                }
            }
            Ok(())
        })
    }

    /// Runs `f` on the record if this view owns an active exchange.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut ExchangePacket) -> Result<T, KernelError>,
    ) -> Result<T, KernelError> {
        let mut packet = self.packet.lock();
        if packet.owner != self.role {
            return Err(KernelError::invalid_state(format!(
                "{:?} does not own exchange {}",
                self.role, packet.id
            )));
        }
        if packet.status.is_terminal() {
            return Err(KernelError::invalid_state(format!(
                "exchange {} is already {:?}",
                packet.id, packet.status
            )));
        }
        f(&mut packet)
    }

    pub(crate) fn sync_state(&self) -> SyncState {
        self.packet.lock().sync_state(self.role)
    }

    pub(crate) fn set_sync_state(&self, state: SyncState) {
        *self.packet.lock().sync_state_mut(self.role) = state;
    }

    /// True when either side is blocked in, or has just returned from, a synchronous send.
    pub(crate) fn in_sync_chain(&self) -> bool {
        let packet = self.packet.lock();
        packet.consumer_sync != SyncState::Async || packet.provider_sync != SyncState::Async
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.packet.lock().aborted
    }

    /// Gives up on the exchange after a timed-out synchronous send.
    pub(crate) fn abort(&self, error: KernelError) {
        let mut packet = self.packet.lock();
        packet.aborted = true;
        if packet.status == ExchangeStatus::Active {
            packet.error = Some(error);
            packet.status = ExchangeStatus::Error;
        }
    }

    pub(crate) fn transaction(&self) -> Option<Arc<dyn Transaction>> {
        self.packet.lock().transaction.clone()
    }

    /// Records the routing decision. The broker holds the exchange while routing, so no owner
    /// check applies.
    pub(crate) fn assign_endpoint(&self, endpoint: Endpoint) {
        let mut packet = self.packet.lock();
        if packet.service.is_none() {
            packet.service = Some(endpoint.service().clone());
        }
        if packet.interface.is_none() {
            packet.interface = endpoint.interfaces().first().cloned();
        }
        packet.endpoint = Some(endpoint);
    }

    /// Forces an error onto an exchange the kernel failed to deliver and hands it back to the
    /// sending side.
    pub(crate) fn fail_undelivered(&self, error: KernelError) {
        let mut packet = self.packet.lock();
        if packet.status == ExchangeStatus::Active {
            packet.error = Some(error);
            packet.status = ExchangeStatus::Error;
        }
        packet.owner = packet.owner.opposite();
        packet.terminal_sent = true;
    }

    /// Validates a send from this view and hands ownership to the other side.
    ///
    /// Returns whether this was the exchange's first send.
    pub(crate) fn prepare_send(&self, sync: bool) -> Result<bool, KernelError> {
        let mut p = self.packet.lock();
        if p.owner != self.role {
            return Err(KernelError::invalid_state(format!(
                "{:?} does not own exchange {}",
                self.role, p.id
            )));
        }
        if p.terminal_sent {
            return Err(KernelError::invalid_state(format!(
                "exchange {} has already completed",
                p.id
            )));
        }
        if sync && p.status != ExchangeStatus::Active {
            return Err(KernelError::invalid_state(
                "send_sync requires an active exchange",
            ));
        }
        let first = p.sends == 0;
        match (self.role, p.status) {
            (Role::Consumer, ExchangeStatus::Active) if first => {
                if p.in_msg.is_none() {
                    return Err(KernelError::invalid_state("the request has no in message"));
                }
            }
            (Role::Consumer, ExchangeStatus::Active) => {
                let consumer_fault = p.pattern == Pattern::RequestOptionalReply
                    && p.out_msg.is_some()
                    && p.fault_msg.is_some();
                if !consumer_fault {
                    return Err(KernelError::invalid_state(
                        "a consumer may only answer an optional reply with a fault",
                    ));
                }
            }
            (Role::Provider, ExchangeStatus::Active) => match p.pattern {
                Pattern::OneWay => {
                    return Err(KernelError::invalid_state(
                        "one-way exchanges are answered with Done or Error",
                    ));
                }
                Pattern::RobustOneWay if p.fault_msg.is_none() => {
                    return Err(KernelError::invalid_state(
                        "a robust one-way exchange is answered with a fault, Done or Error",
                    ));
                }
                Pattern::RequestReply | Pattern::RequestOptionalReply
                    if p.out_msg.is_none() && p.fault_msg.is_none() =>
                {
                    return Err(KernelError::invalid_state("the reply has no out or fault"));
                }
                _ => {}
            },
            (_, ExchangeStatus::Done) if first => {
                return Err(KernelError::invalid_state("a new exchange cannot start Done"));
            }
            (Role::Provider, ExchangeStatus::Done) => {
                if p.pattern.has_reply() && p.out_msg.is_none() && p.fault_msg.is_none() {
                    return Err(KernelError::invalid_state(
                        "reply-capable exchanges need an out or fault before Done",
                    ));
                }
            }
            _ => {}
        }
        if p.status.is_terminal() {
            p.terminal_sent = true;
        }
        if sync {
            *p.sync_state_mut(self.role) = SyncState::SyncSent;
        } else if p.sync_state(self.role) == SyncState::SyncSent {
            *p.sync_state_mut(self.role) = SyncState::Async;
        }
        p.sends += 1;
        p.owner = self.role.opposite();
        Ok(first)
    }

    /// Undoes [`prepare_send`](Self::prepare_send) when routing failed before delivery, so the
    /// sender keeps ownership.
    pub(crate) fn revert_send(&self) {
        let mut p = self.packet.lock();
        p.owner = self.role;
        p.sends = p.sends.saturating_sub(1);
        p.terminal_sent = false;
        *p.sync_state_mut(self.role) = SyncState::Async;
    }

    /// Builds the fan-out copy delivered to a subscriber.
    pub(crate) fn duplicate_for(&self, source: &str, endpoint: Endpoint) -> Self {
        let original = self.packet.lock();
        let mut copy = ExchangePacket::new(Pattern::OneWay);
        copy.source = Some(source.to_string());
        copy.service = original.service.clone();
        copy.interface = original.interface.clone();
        copy.operation = original.operation.clone();
        copy.in_msg = original.in_msg.clone();
        copy.properties = original.properties.clone();
        copy.properties.insert(FROM_SUBSCRIPTION.to_string(), Value::Bool(true));
        copy.endpoint = Some(endpoint);
        Self {
            packet: Arc::new(Mutex::new(copy)),
            role: Role::Consumer,
        }
    }

    /// Creates a consumer-owned exchange on behalf of `source`.
    pub(crate) fn originate(pattern: Pattern, source: &str, persistent: Option<bool>) -> Self {
        let exchange = Self::new(pattern);
        {
            let mut packet = exchange.packet.lock();
            packet.source = Some(source.to_string());
            packet.persistent = persistent;
        }
        exchange
    }

    /// True for the consumer's first send of a new request, the only send that fans out.
    pub(crate) fn is_initial_request(&self) -> bool {
        let p = self.packet.lock();
        p.sends == 1 && p.status == ExchangeStatus::Active && p.owner == Role::Provider
    }

    /// Settles a request nobody could be found for. One-way patterns complete as `Done`; the
    /// rest stay with the consumer.
    pub(crate) fn park(&self) {
        let mut p = self.packet.lock();
        p.owner = Role::Consumer;
        if matches!(p.pattern, Pattern::OneWay | Pattern::RobustOneWay) {
            p.status = ExchangeStatus::Done;
            p.terminal_sent = true;
        } else {
            p.sends = p.sends.saturating_sub(1);
        }
        p.consumer_sync = SyncState::Async;
    }

    /// Snapshot used by the transactional flow.
    pub(crate) fn to_frame(&self) -> ExchangeFrame {
        let p = self.packet.lock();
        ExchangeFrame {
            id: p.id.clone(),
            pattern: p.pattern,
            status: p.status,
            owner: p.owner,
            view: self.role,
            source: p.source.clone(),
            endpoint: p.endpoint.clone(),
            service: p.service.clone(),
            interface: p.interface.clone(),
            operation: p.operation.clone(),
            in_msg: p.in_msg.clone(),
            out_msg: p.out_msg.clone(),
            fault_msg: p.fault_msg.clone(),
            error: p.error.clone(),
            properties: p.properties.clone(),
            persistent: p.persistent,
            sends: p.sends,
            terminal_sent: p.terminal_sent,
        }
    }

    /// Rebuilds an exchange from a frame, viewed from the side it is being delivered to.
    pub(crate) fn from_frame(frame: ExchangeFrame) -> Self {
        let packet = ExchangePacket {
            id: frame.id,
            pattern: frame.pattern,
            status: frame.status,
            owner: frame.owner,
            source: frame.source,
            endpoint: frame.endpoint,
            service: frame.service,
            interface: frame.interface,
            operation: frame.operation,
            target_uri: None,
            target_reference: None,
            in_msg: frame.in_msg,
            out_msg: frame.out_msg,
            fault_msg: frame.fault_msg,
            error: frame.error,
            properties: frame.properties,
            consumer_sync: SyncState::Async,
            provider_sync: SyncState::Async,
            persistent: frame.persistent,
            sends: frame.sends,
            terminal_sent: frame.terminal_sent,
            aborted: false,
            transaction: None,
        };
        Self {
            packet: Arc::new(Mutex::new(packet)),
            role: frame.view,
        }
    }
}

/// Serialized form of an exchange on a durable transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ExchangeFrame {
    id: ExchangeId,
    pattern: Pattern,
    status: ExchangeStatus,
    owner: Role,
    /// The side the frame is delivered to.
    view: Role,
    source: Option<String>,
    endpoint: Option<Endpoint>,
    service: Option<QualifiedName>,
    interface: Option<QualifiedName>,
    operation: Option<QualifiedName>,
    in_msg: Option<NormalizedMessage>,
    out_msg: Option<NormalizedMessage>,
    fault_msg: Option<NormalizedMessage>,
    error: Option<KernelError>,
    properties: Map<String, Value>,
    persistent: Option<bool>,
    sends: u32,
    terminal_sent: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(pattern: Pattern) -> MessageExchange {
        let exchange = MessageExchange::new(pattern);
        exchange
            .set_in_message(NormalizedMessage::new(json!("ping")))
            .unwrap();
        exchange
    }

    #[test]
    fn send_hands_ownership_to_the_mirror() {
        let consumer = request(Pattern::RequestReply);
        assert!(consumer.prepare_send(false).unwrap());
        assert!(!consumer.is_owner());

        let provider = consumer.mirror();
        assert!(provider.is_owner());
        assert!(matches!(
            consumer.set_property("late", 1),
            Err(KernelError::InvalidState(_))
        ));
        provider
            .set_out_message(NormalizedMessage::new(json!("pong")))
            .unwrap();
        assert!(!provider.prepare_send(false).unwrap());
        assert!(consumer.is_owner());
        assert_eq!(consumer.out_message().unwrap().content(), &json!("pong"));
    }

    #[test]
    fn status_is_monotonic() {
        let consumer = request(Pattern::OneWay);
        consumer.prepare_send(false).unwrap();
        let provider = consumer.mirror();
        provider.set_status(ExchangeStatus::Done).unwrap();
        assert!(provider.set_status(ExchangeStatus::Active).is_err());
        assert!(provider
            .set_error(KernelError::ComponentFailure("late".into()))
            .is_err());
        assert_eq!(provider.status(), ExchangeStatus::Done);
    }

    #[test]
    fn out_and_fault_are_exclusive() {
        let consumer = request(Pattern::RequestReply);
        consumer.prepare_send(false).unwrap();
        let provider = consumer.mirror();
        provider
            .set_fault(NormalizedMessage::new(json!("bad input")))
            .unwrap();
        assert!(provider
            .set_out_message(NormalizedMessage::new(json!("pong")))
            .is_err());
        assert!(provider.out_message().is_none());
    }

    #[test]
    fn provider_must_reply_before_done() {
        let consumer = request(Pattern::RequestReply);
        consumer.prepare_send(false).unwrap();
        let provider = consumer.mirror();
        provider.set_status(ExchangeStatus::Done).unwrap();
        assert!(matches!(
            provider.prepare_send(false),
            Err(KernelError::InvalidState(_))
        ));
    }

    #[test]
    fn one_way_provider_cannot_send_active() {
        let consumer = request(Pattern::OneWay);
        consumer.prepare_send(false).unwrap();
        assert!(consumer.mirror().prepare_send(false).is_err());
    }

    #[test]
    fn initial_send_requires_in_message() {
        let consumer = MessageExchange::new(Pattern::OneWay);
        assert!(consumer.prepare_send(false).is_err());
        assert!(consumer.is_owner());
    }

    #[test]
    fn terminal_exchange_is_sent_once() {
        let consumer = request(Pattern::OneWay);
        consumer.prepare_send(false).unwrap();
        let provider = consumer.mirror();
        provider.set_status(ExchangeStatus::Done).unwrap();
        provider.prepare_send(false).unwrap();
        assert!(consumer.prepare_send(false).is_err());
    }

    #[test]
    fn abort_marks_active_exchange_failed() {
        let consumer = request(Pattern::RequestReply);
        consumer.prepare_send(true).unwrap();
        assert_eq!(consumer.sync_state(), SyncState::SyncSent);
        assert!(consumer.mirror().in_sync_chain());
        consumer.abort(KernelError::Timeout("100ms".into()));
        assert_eq!(consumer.status(), ExchangeStatus::Error);
        assert!(consumer.is_aborted());
        assert!(consumer
            .mirror()
            .set_out_message(NormalizedMessage::new(json!("late")))
            .is_err());
    }

    #[test]
    fn duplicates_get_a_fresh_identity() {
        let consumer = request(Pattern::RequestReply);
        consumer.set_property("trace", "abc").unwrap();
        let endpoint = Endpoint::internal(QualifiedName::new("urn:test", "audit"), "tap", "auditor");
        let copy = consumer.duplicate_for("subscription-manager", endpoint);
        assert_ne!(copy.id(), consumer.id());
        assert_eq!(copy.pattern(), Pattern::OneWay);
        assert!(copy.is_from_subscription());
        assert_eq!(copy.property("trace"), Some(json!("abc")));
        assert_eq!(copy.in_message(), consumer.in_message());
    }

    #[test]
    fn frames_rebuild_the_receiving_view() {
        let consumer = request(Pattern::RequestReply);
        consumer.prepare_send(false).unwrap();
        let frame = consumer.mirror().to_frame();
        let json = serde_json::to_vec(&frame).unwrap();
        let decoded: ExchangeFrame = serde_json::from_slice(&json).unwrap();
        let provider = MessageExchange::from_frame(decoded);
        assert_eq!(provider.role(), Role::Provider);
        assert_eq!(provider.id(), consumer.id());
        assert!(provider.is_owner());
    }
}
