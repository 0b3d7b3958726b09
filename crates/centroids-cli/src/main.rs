//! `centroidd` – object centroid extraction node.
//!
//! Reads rosbridge `publish` frames for `/transformed_points` and
//! `/cloud_obstacles` (one JSON object per line, from `--input` or stdin),
//! runs the centroid pipeline on every obstacle batch, and writes each
//! resulting `/centroids` frame to stdout as one JSON line.  Logs go to
//! stderr.

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use centroids_middleware::{EventBus, Ros2Adapter, Topic, TopicReceiver};
use centroids_runtime::{CentroidNode, NodeStats, PipelineCoordinator, init_tracing};
use centroids_types::EventPayload;

#[derive(Debug, Parser)]
#[command(name = "centroidd", version, about = "Object centroid extraction node")]
struct Cli {
    /// Config file (defaults to ~/.centroids/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Newline-delimited rosbridge frames (defaults to stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(config::config_path);
    let cfg = match config::load_from(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing("centroidd", &cfg.log_level);
    info!(path = %config_path.display(), frame_id = %cfg.frame_id, "config loaded");

    // One thread: each input frame is handled by the node before the next
    // one is read.
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Runtime error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, cli.input)) {
        Ok(stats) => {
            eprintln!(
                "{} {} published, {} skipped, {} failed",
                "✓".green().bold(),
                stats.published,
                stats.skipped,
                stats.failed
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: config::Config, input: Option<PathBuf>) -> Result<NodeStats, String> {
    let bus = Arc::new(EventBus::new(cfg.bus_capacity));
    let coordinator =
        PipelineCoordinator::from_params(&cfg.pipeline, &cfg.frame_id).map_err(|e| e.to_string())?;
    let mut output = bus.subscribe_to(Topic::Centroids);
    let node = CentroidNode::new(coordinator, Arc::clone(&bus));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let ctrlc_tx = Arc::clone(&shutdown_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = ctrlc_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let mut stop = shutdown_rx.clone();
    let node_handle = tokio::spawn(node.run(shutdown_rx));
    let adapter = Ros2Adapter::new(Arc::clone(&bus));

    let reader: Box<dyn AsyncBufRead + Unpin> = match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| format!("cannot open input {}: {e}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.map_err(|e| format!("read error: {e}"))?,
            _ = stop.changed() => break,
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        if let Err(e) = adapter.ingest_frame(&line) {
            warn!(line = line_no, error = %e, "frame rejected");
            continue;
        }
        // Give the node its turn before reading on.
        tokio::task::yield_now().await;
        print_frames(&mut output)?;
    }

    let _ = shutdown_tx.send(true);
    let stats = node_handle.await.map_err(|e| format!("node task failed: {e}"))?;
    print_frames(&mut output)?;
    Ok(stats)
}

/// Write every queued centroid batch to stdout as a rosbridge frame.
fn print_frames(output: &mut TopicReceiver) -> Result<(), String> {
    loop {
        match output.try_recv() {
            Ok(event) => {
                if let EventPayload::Centroids(batch) = event.payload {
                    let frame = Ros2Adapter::centroid_frame(&batch).map_err(|e| e.to_string())?;
                    println!("{frame}");
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                warn!(dropped = n, "output lagged; centroid frames lost");
            }
            Err(_) => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_paths() {
        let cli = Cli::parse_from(["centroidd", "--config", "/tmp/c.toml", "-i", "frames.ndjson"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(cli.input, Some(PathBuf::from("frames.ndjson")));
    }

    #[test]
    fn cli_defaults_to_stdin_and_home_config() {
        let cli = Cli::parse_from(["centroidd"]);
        assert!(cli.config.is_none());
        assert!(cli.input.is_none());
    }

    #[tokio::test]
    async fn replay_file_prints_reference_centroid() -> Result<(), Box<dyn std::error::Error>> {
        use centroids_middleware::point_cloud2;
        use centroids_middleware::ros2_adapter::RosbridgeFrame;
        use centroids_types::{LabeledPoint, Point3};
        use std::io::Write;

        let labeled = point_cloud2::create_labeled_cloud(
            "map",
            &[
                LabeledPoint::new(0.0, 0.0, 0.0, 1),
                LabeledPoint::new(0.05, 0.0, 0.0, 1),
                LabeledPoint::new(5.0, 5.0, 5.0, 2),
            ],
        );
        let obstacles = point_cloud2::create_xyz_cloud("map", &[Point3::new(0.0, 0.0, 0.0)]);

        let mut file = tempfile::NamedTempFile::new()?;
        let obstacle_frame =
            serde_json::to_string(&RosbridgeFrame::publish("/cloud_obstacles", &obstacles))?;
        let labeled_frame =
            serde_json::to_string(&RosbridgeFrame::publish("/transformed_points", &labeled))?;
        writeln!(file, "{obstacle_frame}")?;
        writeln!(file, "{labeled_frame}")?;
        writeln!(file)?;
        writeln!(file, "{{\"op\":\"publish\",\"topic\":\"/scan\",\"msg\":{{}}}}")?;
        writeln!(file, "{obstacle_frame}")?;

        let cfg: config::Config = toml::from_str(
            r#"
[pipeline]
distance_threshold = 0.2
eps = 0.3
min_samples = 1
merge_threshold = 0.5
obstacle_threshold = 0.2
"#,
        )?;

        let stats = run(cfg, Some(file.path().to_path_buf())).await?;
        assert_eq!(
            stats,
            NodeStats {
                published: 1,
                skipped: 1,
                failed: 0
            }
        );
        Ok(())
    }
}
