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

use std::sync::Once;
use std::time::Duration;

use switchboard::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod components;

static INIT: Once = Once::new();

/// Initializes the global tracing subscriber once per test binary, writing to
/// `logs/switchboard_tests.txt`.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender =
            RollingFileAppender::new(Rotation::NEVER, "logs", "switchboard_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        Box::leak(Box::new(guard));

        let filter = EnvFilter::new("debug")
            .add_directive("switchboard::common::broker=trace".parse().unwrap())
            .add_directive("switchboard::common::delivery_channel=trace".parse().unwrap())
            .add_directive("switchboard::flow=trace".parse().unwrap())
            .add_directive("tokio=info".parse().unwrap());

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

pub const WAIT: Duration = Duration::from_secs(2);

pub fn service(local: &str) -> QualifiedName {
    QualifiedName::new("urn:switchboard:test", local)
}

/// A configuration using `kind` with otherwise default settings.
pub fn config_with(kind: FlowKind) -> KernelConfig {
    let mut config = KernelConfig::default();
    config.flow.kind = kind;
    config
}

/// Creates an exchange from `channel` addressed to `target` with `content` as its request.
pub fn request(
    channel: &DeliveryChannel,
    pattern: Pattern,
    target: &QualifiedName,
    content: impl Into<serde_json::Value>,
) -> anyhow::Result<MessageExchange> {
    let exchange = channel.create_exchange(pattern);
    exchange.set_service(target.clone())?;
    exchange.set_in_message(NormalizedMessage::new(content))?;
    Ok(exchange)
}
