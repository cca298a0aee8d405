//! # figlink-demo
//!
//! Opens a figure in the browser, draws a line chart, and annotates every
//! clicked point until the page is closed.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use figlink::Figure;
use figlink_core::logging::{LogFormat, init_subscriber_with_format};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Plotly figure demo.
#[derive(Parser, Debug)]
#[command(name = "figlink-demo", about = "Plot a line chart in the browser")]
struct Cli {
    /// Render in headless Chromium instead of the desktop browser.
    #[arg(long)]
    headless: bool,

    /// Serve this webapp directory instead of the bundled page.
    #[arg(long)]
    webapp: Option<PathBuf>,

    /// Log level, overridden by `RUST_LOG`.
    #[arg(long)]
    log_level: Option<String>,

    /// Log line format: `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = figlink_settings::get_settings().clone();
    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    let format = cli.log_format.unwrap_or(settings.logging.format);
    init_subscriber_with_format(level, format);

    if let Some(dir) = cli.webapp {
        if !dir.is_dir() {
            bail!("webapp directory not found: {}", dir.display());
        }
        settings.http.webapp_dir = Some(dir.display().to_string());
    }

    let figure = Figure::with_settings(settings).context("failed to create figure")?;
    println!("Figure available at {}", figure.url());

    if !figure.open_browser(cli.headless) {
        warn!("no browser opened, open the URL above manually");
    }

    let x: Vec<f64> = (0..50).map(|i| f64::from(i) * 0.2).collect();
    let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();
    let trace = json!({ "x": x, "y": y, "type": "scatter", "mode": "lines+markers" });
    let layout = json!({ "title": { "text": "sin(x)" } });
    if !figure.new_plot(json!([trace]), layout, Value::Null) {
        bail!("the page did not draw the plot");
    }

    // Event callbacks share the executor thread that delivers call results,
    // so follow-up calls are made from this thread.
    let (clicks, clicked) = mpsc::channel::<Value>();
    let subscribed = figure.on("plotly_click", move |event| {
        let _ = clicks.send(event["points"][0].clone());
    });
    if !subscribed {
        warn!("click events are not available");
    }

    info!("close the browser tab to exit");
    while figure.is_open() {
        let Ok(point) = clicked.recv_timeout(Duration::from_millis(250)) else {
            continue;
        };
        println!("Point clicked: x={}, y={}", point["x"], point["y"]);
        let annotation = json!({
            "x": point["x"],
            "y": point["y"],
            "text": "click",
            "showarrow": false,
            "yshift": 30,
        });
        if !figure.relayout(json!({ "annotations": [annotation] })) {
            warn!("failed to annotate the clicked point");
        }
    }
    Ok(())
}
