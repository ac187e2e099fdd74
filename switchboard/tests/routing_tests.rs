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

use serde_json::json;
use switchboard::prelude::*;
use switchboard_test::prelude::*;

use crate::setup::components::Echo;
use crate::setup::*;

mod setup;

#[switchboard_test]
async fn test_request_reply_by_service() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Staged)).await;
    let echo = service("echo");
    kernel
        .activate(ActivationSpec::new("echo").component(Echo).service(echo.clone()))
        .await?;
    let client = kernel.activate(ActivationSpec::new("client")).await?;

    let exchange = request(&client, Pattern::RequestReply, &echo, "ping")?;
    assert!(client.send_sync(&exchange, None).await?);
    assert_eq!(exchange.status(), ExchangeStatus::Active);
    assert!(exchange.is_owner());
    let reply = exchange.out_message().expect("echo should reply");
    assert_eq!(reply.content(), &json!({"from": "echo", "echo": "ping"}));
    assert_eq!(exchange.endpoint().map(|e| e.component().to_string()), Some("echo".into()));

    exchange.set_status(ExchangeStatus::Done)?;
    client.send(&exchange).await?;
    assert!(!exchange.is_owner());
    assert!(exchange.set_property("late", true).is_err());

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_service_uri_resolution() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Direct)).await;
    let target = QualifiedName::new("urn:test", "myservice");
    kernel
        .activate(ActivationSpec::new("provider").component(Echo).service(target.clone()))
        .await?;
    let client = kernel.activate(ActivationSpec::new("client")).await?;

    let found = kernel.resolve(&TargetDescriptor::Uri("service:urn:test/myservice".into()))?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].service(), &target);

    let exchange = client.create_exchange(Pattern::RequestReply);
    exchange.set_target_uri("service:urn:test/myservice")?;
    exchange.set_in_message(NormalizedMessage::new("hello"))?;
    assert!(client.send_sync(&exchange, None).await?);
    assert_eq!(exchange.service(), Some(target));
    assert!(exchange.out_message().is_some());

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_interface_and_endpoint_uris() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Direct)).await;
    let orders = service("orders");
    let interface = QualifiedName::new("urn:switchboard:test", "OrderPortType");
    kernel
        .activate(
            ActivationSpec::new("orders")
                .component(Echo)
                .service(orders.clone())
                .endpoint("primary")
                .interface(interface.clone()),
        )
        .await?;

    for uri in [
        "interface:urn:switchboard:test:OrderPortType",
        "operation:urn:switchboard:test:OrderPortType:place",
        "endpoint:urn:switchboard:test:orders:primary",
    ] {
        let found = kernel.resolve(&TargetDescriptor::Uri(uri.into()))?;
        assert_eq!(found.len(), 1, "{uri} should resolve");
        assert_eq!(found[0].name(), "primary");
    }
    assert!(kernel
        .resolve(&TargetDescriptor::Interface(interface))?
        .iter()
        .all(|endpoint| endpoint.component() == "orders"));

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_round_robin_between_providers() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Staged)).await;
    let echo = service("echo");
    for name in ["echo-a", "echo-b"] {
        kernel
            .activate(ActivationSpec::new(name).component(Echo).service(echo.clone()))
            .await?;
    }
    let client = kernel.activate(ActivationSpec::new("client")).await?;

    let mut served: HashMap<String, usize> = HashMap::new();
    for i in 0..6 {
        let exchange = request(&client, Pattern::RequestReply, &echo, i)?;
        assert!(client.send_sync(&exchange, None).await?);
        let reply = exchange.out_message().expect("reply");
        let from = reply.content()["from"].as_str().unwrap_or_default().to_string();
        *served.entry(from).or_default() += 1;
    }
    assert_eq!(served.get("echo-a"), Some(&3));
    assert_eq!(served.get("echo-b"), Some(&3));

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_missing_destination() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Staged)).await;
    let nowhere = service("nowhere");
    let strict = kernel.activate(ActivationSpec::new("strict")).await?;
    let lenient = kernel
        .activate(ActivationSpec::new("lenient").fail_if_no_destination(false))
        .await?;

    let exchange = request(&strict, Pattern::OneWay, &nowhere, "lost")?;
    let err = strict.send(&exchange).await.unwrap_err();
    assert!(matches!(err, KernelError::NoEndpointAvailable(_)));
    assert!(exchange.is_owner(), "a failed send leaves the exchange with its sender");
    assert_eq!(exchange.status(), ExchangeStatus::Active);

    let parked = request(&lenient, Pattern::OneWay, &nowhere, "parked")?;
    lenient.send(&parked).await?;
    assert_eq!(parked.status(), ExchangeStatus::Done);

    let unanswered = request(&lenient, Pattern::RequestReply, &nowhere, "parked")?;
    lenient.send(&unanswered).await?;
    assert_eq!(unanswered.status(), ExchangeStatus::Active);
    assert!(unanswered.is_owner());

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_linked_and_external_endpoints() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Direct)).await;
    let echo = service("echo");
    let alias = service("alias");
    kernel
        .activate(ActivationSpec::new("echo").component(Echo).service(echo.clone()))
        .await?;
    kernel.register_linked_endpoint(Endpoint::linked(
        alias.clone(),
        "alias",
        "echo",
        echo.clone(),
        "echo",
    ))?;
    let external = Endpoint::external(echo.clone(), "public", "gateway");
    kernel.register_external_endpoint(external.clone())?;
    let client = kernel.activate(ActivationSpec::new("client")).await?;

    let via_alias = request(&client, Pattern::RequestReply, &alias, "aliased")?;
    assert!(client.send_sync(&via_alias, None).await?);
    assert_eq!(
        via_alias.endpoint().map(|e| e.key()),
        Some((echo.clone(), "echo".to_string()))
    );

    let candidates = kernel.resolve(&TargetDescriptor::Service(echo.clone()))?;
    assert_eq!(candidates.len(), 1, "external endpoints are not routing candidates");

    let to_external = client.create_exchange(Pattern::OneWay);
    to_external.set_endpoint(external)?;
    to_external.set_in_message(NormalizedMessage::new("out"))?;
    let err = client.send(&to_external).await.unwrap_err();
    assert!(matches!(err, KernelError::InvalidState(_)));

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_endpoint_reference_resolution() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Direct)).await;
    let echo = service("echo");
    kernel
        .activate(ActivationSpec::new("echo").component(Echo).service(echo.clone()))
        .await?;
    let client = kernel.activate(ActivationSpec::new("client")).await?;

    let reference = EndpointReference::for_endpoint(&echo, "echo");
    let document = reference.to_document();
    let parsed = EndpointReference::from_document(&document)?;
    let endpoint = client.resolve_reference(&parsed)?.expect("internal reference");
    assert_eq!(endpoint.component(), "echo");

    let by_address = EndpointReference::for_address("service:urn:switchboard:test:echo");
    assert!(client.resolve_reference(&by_address)?.is_some());

    let exchange = client.create_exchange(Pattern::RequestReply);
    exchange.set_target_reference(reference)?;
    exchange.set_in_message(NormalizedMessage::new("by reference"))?;
    assert!(client.send_sync(&exchange, None).await?);

    let unknown = EndpointReference::for_address("urn:nobody:home");
    assert!(client.resolve_reference(&unknown)?.is_none());

    kernel.shutdown_all().await?;
    Ok(())
}
