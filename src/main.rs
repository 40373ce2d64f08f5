// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ray_bender::bender::{Bender, ProgressInfo, RayRequest};
use ray_bender::config::BenderConfig;
use ray_bender::geometry::GeoPoint;
use ray_bender::io;
use ray_bender::model::LayeredModel;
use ray_bender::ray_info::{RayInfoOptions, NA_VALUE};

#[derive(Parser)]
#[command(name = "ray-bender", about = "Two-point seismic ray bender")]
struct Cli {
    /// Source location: LAT,LON,DEPTH (degrees, km)
    #[arg(long, allow_hyphen_values = true)]
    source: String,

    /// Receiver location: LAT,LON[,DEPTH] (degrees, km)
    #[arg(long, allow_hyphen_values = true)]
    receiver: String,

    /// Phase name (repeatable)
    #[arg(short = 'p', long, default_value = "P")]
    phase: Vec<String>,

    /// Fixed bounce point of reflected and depth phases: LAT,LON
    #[arg(long, allow_hyphen_values = true)]
    bounce: Option<String>,

    /// Earth model JSON file (default: built-in reference Earth)
    #[arg(short = 'm', long)]
    model: Option<PathBuf>,

    /// Bender configuration JSON file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Binary ray result output file
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Save the fastest ray's resampled path (lat, lon, depth) to this .npy file
    #[arg(long)]
    path_npy: Option<PathBuf>,

    /// Compute model-node weights
    #[arg(long)]
    weights: bool,

    /// Compute travel-time derivatives at the source
    #[arg(long)]
    derivatives: bool,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,

    /// Print progress to stderr
    #[arg(long)]
    progress: bool,

    /// Log candidate rays
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn parse_floats(s: &str, what: &str) -> Result<Vec<f64>> {
    s.split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid --{}: expected comma-separated floats", what))
}

fn parse_location(s: &str, what: &str, depth_required: bool) -> Result<GeoPoint> {
    let parts = parse_floats(s, what)?;
    match (parts.len(), depth_required) {
        (3, _) => Ok(GeoPoint::new(parts[0], parts[1], parts[2])),
        (2, false) => Ok(GeoPoint::new(parts[0], parts[1], 0.0)),
        (n, true) => bail!("--{} has {} components, expected LAT,LON,DEPTH", what, n),
        (n, false) => bail!("--{} has {} components, expected LAT,LON[,DEPTH]", what, n),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn format_value(v: f64, precision: usize) -> String {
    if v == NA_VALUE {
        "-".to_string()
    } else {
        format!("{:.*}", precision, v)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = parse_location(&cli.source, "source", true)?;
    let receiver = parse_location(&cli.receiver, "receiver", false)?;
    let bounce = match &cli.bounce {
        Some(s) => {
            let parts = parse_floats(s, "bounce")?;
            if parts.len() != 2 {
                bail!("--bounce has {} components, expected LAT,LON", parts.len());
            }
            Some((parts[0], parts[1]))
        }
        None => None,
    };

    let model = match &cli.model {
        Some(path) => io::load_model(path)
            .with_context(|| format!("loading model {}", path.display()))?,
        None => LayeredModel::reference_earth()?,
    };
    let config = match &cli.config {
        Some(path) => BenderConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BenderConfig::default(),
    };

    let mut bender = Bender::new(Arc::new(model), config)?;
    if let Some(threads) = cli.threads {
        bender = bender.with_threads(threads);
    }
    if cli.progress {
        bender = bender.with_progress(Box::new(|info: ProgressInfo| {
            eprintln!(
                "[{:.1}s] rays_completed={} queued={} in_flight={}",
                info.elapsed.as_secs_f64(),
                info.rays_completed,
                info.queued,
                info.in_flight,
            );
        }));
    }

    let options = RayInfoOptions {
        path: cli.path_npy.is_some(),
        weights: cli.weights,
        derivatives: cli.derivatives,
    };
    let requests: Vec<RayRequest> = cli
        .phase
        .iter()
        .map(|phase| {
            let mut request = RayRequest::new(source, receiver, phase).with_options(options);
            request.fixed_bounce = bounce;
            request
        })
        .collect();

    let results = bender.compute_rays(&requests)?;

    println!(
        "{:<8} {:>12} {:>10} {:>9} {:>9} {:>10}  type",
        "phase", "tt (s)", "dist", "az", "baz", "slowness"
    );
    for info in &results {
        println!(
            "{:<8} {:>12} {:>10.4} {:>9.3} {:>9.3} {:>10}  {}",
            info.phase,
            format_value(info.travel_time, 3),
            info.distance,
            info.azimuth,
            info.back_azimuth,
            format_value(info.slowness, 4),
            info.ray_type,
        );
        if !info.ray_type.is_valid() {
            eprintln!("{}: {}", info.phase, info.status_message);
        }
    }

    if let Some(path) = &cli.output {
        io::write_ray_infos(path, &results)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    if let Some(path) = &cli.path_npy {
        let fastest = results
            .iter()
            .filter(|info| info.ray_type.is_valid())
            .min_by(|a, b| a.travel_time.total_cmp(&b.travel_time));
        match fastest.and_then(|info| info.ray_path.as_ref()) {
            Some(points) => io::save_ray_path_npy(path, points)
                .with_context(|| format!("writing {}", path.display()))?,
            None => bail!("no valid ray to write to {}", path.display()),
        }
    }

    Ok(())
}
