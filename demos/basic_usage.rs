// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic group-sync usage example.
//!
//! Demonstrates:
//! 1. Building a coordinator over per-group SQLite files
//! 2. Two devices syncing the same group
//! 3. Retransmission being ignored
//! 4. Verifying the stored merkle trie against the log
//! 5. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```
//!
//! Set `GROUP_SYNC_DATABASE_TYPE=postgres` and `GROUP_SYNC_DATABASE_URL` to
//! run the same flow against a shared PostgreSQL database.

use group_sync::{
    MessageEnvelope, MinuteTrie, SyncCoordinator, SyncServerConfig, Timestamp, TrieAlgebra,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

fn stamp(minute: i64, counter: u16, node: &str) -> String {
    Timestamp::new(1_700_000_000_000 + minute * 60_000, counter, node)
        .map(|ts| ts.to_string())
        .unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              group-sync: Basic Usage Example                  ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure
    // ─────────────────────────────────────────────────────────────────────────
    let user_files = tempfile::tempdir()?;
    let config = SyncServerConfig {
        user_files: user_files.path().to_path_buf(),
        ..Default::default()
    }
    .with_env_overrides()?;

    let coordinator = SyncCoordinator::from_config(&config, MinuteTrie::new()).await?;
    println!("📦 Backend: {}", coordinator.backend_name());

    let group = "demo-budget";

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Device A pushes two changes
    // ─────────────────────────────────────────────────────────────────────────
    let from_a = vec![
        MessageEnvelope::plain(stamp(0, 0, "aaaaaaaaaaaaaaaa"), b"set budget=100".to_vec()),
        MessageEnvelope::plain(stamp(1, 0, "aaaaaaaaaaaaaaaa"), b"set budget=120".to_vec()),
    ];
    let result = coordinator.sync(&from_a, "", group).await?;
    println!("\n📱 Device A sent {} messages", from_a.len());
    println!("   └─ received {} (no echo)", result.new_messages.len());
    println!("   └─ trie hash: {}", result.trie.hash());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Device B pushes one change and pulls A's
    // ─────────────────────────────────────────────────────────────────────────
    let from_b = vec![MessageEnvelope::new(
        stamp(2, 0, "bbbbbbbbbbbbbbbb"),
        true,
        vec![0xde, 0xad, 0xbe, 0xef],
    )];
    let result = coordinator.sync(&from_b, "", group).await?;
    println!("\n📱 Device B sent {} message", from_b.len());
    for msg in &result.new_messages {
        println!("   └─ pulled {} ({} bytes)", msg.timestamp, msg.content.len());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Device A retransmits after a dropped response
    // ─────────────────────────────────────────────────────────────────────────
    let last_seen = from_a[1].timestamp.clone();
    let result = coordinator.sync(&from_a, &last_seen, group).await?;
    println!("\n🔁 Device A retransmitted {} messages", from_a.len());
    println!("   └─ pulled {} new since {}", result.new_messages.len(), last_seen);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Verify
    // ─────────────────────────────────────────────────────────────────────────
    let verification = coordinator.verify_group(group).await?;
    println!("\n🔐 Trie verification");
    println!("   └─ messages: {}", verification.message_count);
    println!("   └─ consistent: {}", verification.consistent);

    let stored = coordinator.merkle(group).await?;
    let json = serde_json::to_string(&stored)?;
    println!("   └─ stored trie: {} bytes of JSON", json.len());
    println!("   └─ empty trie would be: {}", serde_json::to_string(&coordinator.algebra().empty())?);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump captured counters and histograms
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();

    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{}", v),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={:.4}s", samples.len(), sum)
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }

    lines.sort();
    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
