//! `mirrorcache demo`: walk two mirrors through the basic sync scenarios.
//!
//! Both mirrors live in this process but in separate registries, so they
//! behave like two independent clients of one in-process cache service.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::adapters::local::LocalTransport;
use crate::cli::output::{display_value, output, CommandOutput};
use crate::domain::models::{CacheRecord, Config, RecordSnapshot, RecordState};
use crate::domain::ports::Transport;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{CacheService, MirrorRegistry};

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Cache name to run the scenarios against
    #[arg(short, long, default_value = "settings")]
    pub cache: String,

    /// How long to wait for each propagated update, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,
}

#[derive(Debug, serde::Serialize)]
pub struct DemoStep {
    pub step: usize,
    pub description: String,
    pub mirror: String,
    pub record: RecordSnapshot,
    /// Whether a repeated `get` returned the very same record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_record: Option<bool>,
}

#[derive(Debug, serde::Serialize)]
pub struct DemoOutput {
    pub cache: String,
    pub channel: String,
    pub steps: Vec<DemoStep>,
}

impl CommandOutput for DemoOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Cache {} on channel {}\n", self.cache, self.channel)];

        for step in &self.steps {
            lines.push(format!("{}. {}", step.step, step.description));
            let mut detail = format!(
                "   [{}] key={} value={} requested={}",
                step.mirror,
                step.record.key,
                display_value(step.record.value.as_ref()),
                step.record.requested,
            );
            if let Some(same) = step.same_record {
                detail.push_str(&format!(" same_record={same}"));
            }
            lines.push(detail);
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn step(
    steps: &mut Vec<DemoStep>,
    description: &str,
    mirror: &str,
    record: &CacheRecord,
    same_record: Option<bool>,
) {
    steps.push(DemoStep {
        step: steps.len() + 1,
        description: description.to_string(),
        mirror: mirror.to_string(),
        record: record.snapshot(),
        same_record,
    });
}

async fn wait_for_value(
    rx: &mut watch::Receiver<RecordState>,
    expected: Option<Value>,
    settle: Duration,
) -> Result<()> {
    tokio::time::timeout(settle, rx.wait_for(|state| state.value == expected))
        .await
        .context("Timed out waiting for an update to propagate")?
        .context("Record stopped publishing updates")?;
    Ok(())
}

/// Run the scenarios and collect what each mirror saw.
pub async fn run(args: &DemoArgs, config: &Config) -> Result<DemoOutput> {
    let settle = Duration::from_millis(args.settle_ms);
    let (service, service_task) = CacheService::spawn(config.service.clone());
    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new(service.clone()));

    let local = MirrorRegistry::new(transport.clone(), config);
    let remote = MirrorRegistry::new(transport, config);
    let mirror = local.open(&args.cache).context("Failed to open local mirror")?;
    let other = remote.open(&args.cache).context("Failed to open remote mirror")?;
    let mut steps = Vec::new();

    let theme = mirror.get("theme");
    step(&mut steps, "get theme: fetch sent, value pending", "local", &theme, None);

    let mut theme_rx = theme.subscribe();
    other.set("theme", json!("dark"));
    wait_for_value(&mut theme_rx, Some(json!("dark")), settle).await?;
    let same = Arc::ptr_eq(&theme, &mirror.get("theme"));
    step(&mut steps, "entry from the other mirror updates the record in place", "local", &theme, Some(same));

    mirror.set("theme", json!("light"));
    step(&mut steps, "set theme light: visible before any round trip", "local", &theme, None);

    let other_theme = other
        .peek("theme")
        .context("Remote mirror lost its theme record")?;
    let mut other_rx = other_theme.subscribe();
    wait_for_value(&mut other_rx, Some(json!("light")), settle).await?;
    step(&mut steps, "the other mirror receives the rebroadcast", "remote", &other_theme, None);

    service
        .expire(mirror.channel(), "theme")
        .await
        .context("Failed to expire theme")?;
    wait_for_value(&mut theme_rx, None, settle).await?;
    step(&mut steps, "expiring clears the value, the record stays", "local", &theme, None);

    let first = mirror.get("volume");
    let second = mirror.get("volume");
    step(
        &mut steps,
        "two gets of volume before any reply: one fetch, one record",
        "local",
        &second,
        Some(Arc::ptr_eq(&first, &second)),
    );

    let demo = DemoOutput {
        cache: mirror.name().to_string(),
        channel: mirror.channel().to_string(),
        steps,
    };

    local.shutdown();
    remote.shutdown();
    service.shutdown();
    service_task.await.context("Cache service task failed")?;

    Ok(demo)
}

pub async fn execute(args: DemoArgs, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load()?;
    let demo = run(&args, &config).await?;
    output(&demo, json_mode);
    Ok(())
}
