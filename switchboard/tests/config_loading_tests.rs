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

use std::io::Write;

use switchboard::prelude::*;
use switchboard_test::prelude::*;

use crate::setup::components::Echo;
use crate::setup::*;

mod setup;

fn write_config(contents: &str) -> anyhow::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

#[switchboard_test]
async fn test_loaded_config_drives_the_kernel() -> anyhow::Result<()> {
    initialize_tracing();
    let file = write_config(
        r#"
        [flow]
        kind = "direct"
        workers = 0

        [defaults]
        fail_if_no_destination = false
        chooser = "first"
        "#,
    )?;
    let config = KernelConfig::load_from(file.path())?;
    assert_eq!(config.flow.kind, FlowKind::Direct);
    assert_eq!(config.flow.workers, 1);
    assert_eq!(config.flow.capacity, FlowConfig::default().capacity);
    assert_eq!(config.defaults.chooser, ChooserKind::First);
    assert_eq!(config.timeouts, TimeoutConfig::default());

    let mut kernel = Switchboard::launch_async_with_config(config).await;
    let echo = service("echo");
    kernel
        .activate(ActivationSpec::new("echo").component(Echo).service(echo.clone()))
        .await?;
    let client = kernel.activate(ActivationSpec::new("client")).await?;

    let exchange = request(&client, Pattern::RequestReply, &echo, "configured")?;
    assert!(client.send_sync(&exchange, Some(WAIT)).await?);
    let reply = exchange.out_message().map(|message| message.content().clone());
    assert_eq!(reply.and_then(|content| content.get("echo").cloned()), Some(serde_json::json!("configured")));

    // Lenient default: a request nobody serves is parked instead of failing.
    let nowhere = request(&client, Pattern::OneWay, &service("nowhere"), 1)?;
    client.send(&nowhere).await?;
    assert_eq!(nowhere.status(), ExchangeStatus::Done);

    kernel.shutdown_all().await?;
    Ok(())
}

#[test]
fn test_malformed_config_is_rejected() -> anyhow::Result<()> {
    let file = write_config("[flow]\nkind = \"sideways\"\n")?;
    assert!(KernelConfig::load_from(file.path()).is_err());

    let missing = file.path().with_extension("absent");
    assert!(KernelConfig::load_from(&missing).is_err());
    Ok(())
}
