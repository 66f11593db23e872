//! Command-line grist worker.
//!
//! Connects to a grist server and serves one of the built-in objective
//! functions until interrupted or disconnected.

#![allow(clippy::print_stderr, clippy::missing_docs_in_private_items)]

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use grist::{Worker, shutdown};

#[derive(Parser)]
#[command(name = "grist", version, about = "Distributed compute worker")]
struct Cli {
    /// Server address, e.g. 127.0.0.1:5555.
    address: String,

    /// Objective function to serve.
    #[arg(long, value_enum, default_value_t = Objective::Sum)]
    objective: Objective,

    /// Milliseconds between heartbeat frames (0 disables them).
    #[arg(long, default_value_t = 1000)]
    heartbeat_ms: u64,

    /// Lowest job type to advertise (inclusive).
    #[arg(long, default_value_t = 0)]
    job_type_from: u32,

    /// Highest job type to advertise (inclusive).
    #[arg(long, default_value_t = 0)]
    job_type_to: u32,
}

/// Built-in objective functions.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Objective {
    /// Sum of the payload values.
    Sum,
    /// Standard-normal negative log-likelihood (squared norm).
    Gaussian,
    /// Negative log-density of a two-mode Gaussian mixture at ±3.
    Bimodal,
}

impl Objective {
    fn eval(self, _job_type: u32, xs: &[f64]) -> f64 {
        match self {
            Self::Sum => xs.iter().sum(),
            Self::Gaussian => xs.iter().map(|x| x * x).sum(),
            Self::Bimodal => {
                -(gaussian_density(xs, -3.0) + gaussian_density(xs, 3.0)).ln()
            }
        }
    }
}

/// Unnormalized Gaussian density of `xs` around a common `mean`.
fn gaussian_density(xs: &[f64], mean: f64) -> f64 {
    let norm_squared: f64 = xs.iter().map(|x| (x - mean) * (x - mean)).sum();
    (-norm_squared / 2.0).exp()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; shutting down");
            trigger.shutdown();
        }
    });

    let worker = Worker::builder(&cli.address)
        .heartbeat_interval(Duration::from_millis(cli.heartbeat_ms))
        .job_types(cli.job_type_from..=cli.job_type_to)
        .shutdown(signal)
        .build();

    let objective = cli.objective;
    worker
        .run(move |job_type, xs| objective.eval(job_type, xs))
        .await
        .context("worker session failed")?;

    tracing::info!("worker stopped");
    Ok(())
}
