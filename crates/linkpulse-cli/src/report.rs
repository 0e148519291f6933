use std::fmt::Write as _;

use anyhow::Result;
use linkpulse_core::StatusFrame;

use crate::OutputFormat;

const BAR_WIDTH: usize = 20;

pub fn print_frame(frame: &StatusFrame, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(frame)?),
        OutputFormat::Ndjson => println!("{}", serde_json::to_string(frame)?),
        OutputFormat::Human => print!("{}", format_human(frame)),
    }
    Ok(())
}

pub fn format_human(frame: &StatusFrame) -> String {
    let snapshot = &frame.snapshot;
    let health = &frame.health;
    let mut out = String::new();

    let mode = frame.mode.map_or_else(|| "-".to_string(), |mode| mode.to_string());
    let _ = writeln!(out, "=== linkpulse ===");
    let _ = writeln!(out, "Time:       {}", frame.ts.to_rfc3339());
    let _ = writeln!(out, "Target:     {} via {}", snapshot.target, snapshot.interface);
    let _ = writeln!(out, "Mode:       {mode} (screen {})", frame.screen);
    let _ = writeln!(
        out,
        "Health:     {} {} {}  {}",
        health.score,
        health.state.label(),
        hearts(health.state.hearts()),
        health.state.message()
    );

    match &snapshot.last_sample {
        Some(sample) => {
            let _ = writeln!(
                out,
                "Last:       latency={:.1}ms jitter={:.1}ms loss={:.0}% ({}/{} answered)",
                sample.latency_ms, sample.jitter_ms, sample.loss_pct, sample.answered, sample.sent
            );
        }
        None => {
            let _ = writeln!(out, "Last:       no sample yet");
        }
    }

    let _ = writeln!(out, "Bars:");
    let _ = writeln!(out, "  latency  {}", bar(frame.bars.latency));
    let _ = writeln!(out, "  jitter   {}", bar(frame.bars.jitter));
    let _ = writeln!(out, "  loss     {}", bar(frame.bars.loss));

    let throughput = &snapshot.throughput;
    let speed = if throughput.in_progress {
        "test running".to_string()
    } else if let Some(ts) = throughput.ts {
        format!(
            "down={:.1}Mbps up={:.1}Mbps at {}",
            throughput.download_mbps,
            throughput.upload_mbps,
            ts.to_rfc3339()
        )
    } else {
        "not measured yet".to_string()
    };
    let _ = writeln!(out, "Throughput: {speed}");
    let _ = writeln!(out, "Samples:    {}", snapshot.samples_taken);
    out
}

pub fn hearts(level: u8) -> String {
    let full = usize::from(level.min(5));
    format!("{}{}", "♥".repeat(full), "♡".repeat(5 - full))
}

pub fn bar(level: f64) -> String {
    let filled = (level.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3.0}%",
        "#".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
        level.clamp(0.0, 1.0) * 100.0
    )
}
