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

use std::time::Duration;

use switchboard::prelude::*;
use switchboard_test::prelude::*;
use tokio::time::timeout;

use crate::setup::components::Recorder;
use crate::setup::*;

mod setup;

#[switchboard_test]
async fn test_subscriber_gets_distinct_duplicate() -> anyhow::Result<()> {
    initialize_tracing();
    let mut config = config_with(FlowKind::Staged);
    config.flow.capacity = 1;
    let mut kernel = Switchboard::launch_async_with_config(config).await;
    let s = service("S");

    let (provider, mut provided) = Recorder::new();
    kernel
        .activate(
            ActivationSpec::new("A")
                .component(provider)
                .service(s.clone())
                .endpoint("E"),
        )
        .await?;
    let (subscriber, mut copies) = Recorder::new();
    kernel
        .activate(
            ActivationSpec::new("B")
                .component(subscriber)
                .subscription(
                    SubscriptionSpec::for_service(s.clone())
                        .filter(|_exchange: &MessageExchange| true),
                ),
        )
        .await?;
    let sender = kernel.activate(ActivationSpec::new("C")).await?;

    let exchange = request(&sender, Pattern::OneWay, &s, "hello")?;
    sender.send(&exchange).await?;

    let primary = timeout(WAIT, provided.recv()).await?.expect("A receives the exchange");
    assert_eq!(primary.id(), exchange.id());
    assert_eq!(primary.endpoint().map(|e| e.name().to_string()), Some("E".into()));
    assert_eq!(primary.status(), ExchangeStatus::Done);

    let duplicate = timeout(WAIT, copies.recv()).await?.expect("B receives a duplicate");
    assert_ne!(duplicate.id(), exchange.id());
    assert!(duplicate.is_from_subscription());
    assert_eq!(duplicate.pattern(), Pattern::OneWay);
    assert_eq!(duplicate.in_message(), exchange.in_message());
    assert_eq!(duplicate.status(), ExchangeStatus::Done);

    let answer = sender.accept(Some(WAIT)).await?.expect("C gets its exchange back");
    assert_eq!(answer.id(), exchange.id());
    assert_eq!(answer.status(), ExchangeStatus::Done);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(provided.try_recv().is_err(), "A receives exactly one exchange");
    assert!(copies.try_recv().is_err(), "B receives exactly one duplicate");

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_subscription_filters_and_patterns() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Staged)).await;
    let orders = service("orders");
    let invoices = service("invoices");

    let (provider, _provided) = Recorder::new();
    kernel
        .activate(ActivationSpec::new("orders").component(provider).service(orders.clone()))
        .await?;

    let (picky, mut picky_copies) = Recorder::new();
    kernel
        .activate(
            ActivationSpec::new("picky").component(picky).subscription(
                SubscriptionSpec::for_service(orders.clone()).filter(
                    |exchange: &MessageExchange| {
                        exchange
                            .in_message()
                            .is_some_and(|message| message.content() == "urgent")
                    },
                ),
            ),
        )
        .await?;
    let (wiretap, mut wiretap_copies) = Recorder::new();
    kernel
        .activate(
            ActivationSpec::new("wiretap")
                .component(wiretap)
                .subscription(SubscriptionSpec::for_service(
                    "{urn:switchboard:test}*".parse::<ServicePattern>()?,
                )),
        )
        .await?;
    let client = kernel
        .activate(ActivationSpec::new("client").fail_if_no_destination(false))
        .await?;

    client
        .send(&request(&client, Pattern::OneWay, &orders, "routine")?)
        .await?;
    client
        .send(&request(&client, Pattern::OneWay, &orders, "urgent")?)
        .await?;
    client
        .send(&request(&client, Pattern::OneWay, &invoices, "unserved")?)
        .await?;

    let picked = timeout(WAIT, picky_copies.recv()).await?.expect("urgent copy");
    assert_eq!(picked.in_message().map(|m| m.content().clone()), Some("urgent".into()));

    for _ in 0..3 {
        timeout(WAIT, wiretap_copies.recv()).await?.expect("wiretap copy");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(picky_copies.try_recv().is_err(), "the filter rejects routine orders");
    assert!(wiretap_copies.try_recv().is_err());

    kernel.shutdown_all().await?;
    Ok(())
}

#[switchboard_test]
async fn test_runtime_subscription_and_deactivation() -> anyhow::Result<()> {
    initialize_tracing();
    let mut kernel = Switchboard::launch_async_with_config(config_with(FlowKind::Direct)).await;
    let events = service("events");

    let (listener, mut copies) = Recorder::new();
    kernel.activate(ActivationSpec::new("listener").component(listener)).await?;
    kernel.subscribe("listener", SubscriptionSpec::for_service(events.clone()))?;
    assert!(matches!(
        kernel.subscribe("ghost", SubscriptionSpec::new()),
        Err(KernelError::ComponentUnavailable(_))
    ));

    let client = kernel
        .activate(ActivationSpec::new("client").fail_if_no_destination(false))
        .await?;
    let first = request(&client, Pattern::OneWay, &events, 1)?;
    client.send(&first).await?;
    assert_eq!(first.status(), ExchangeStatus::Done, "nobody hosts events, so it is parked");
    timeout(WAIT, copies.recv()).await?.expect("copy before deactivation");

    kernel.deactivate("listener").await?;
    client
        .send(&request(&client, Pattern::OneWay, &events, 2)?)
        .await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(copies.try_recv().is_err());

    kernel.shutdown_all().await?;
    Ok(())
}
