//! marker-measure CLI: replay recorded marker sessions through the pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use nalgebra::Point2;
use tracing::{info, warn};

use marker_measure::camera::{CameraIntrinsics, Frame, FrameSeq};
use marker_measure::config::{DetectionPolicy, MeasureConfig};
use marker_measure::detection::{FiducialBackend, ReplayBackend};
use marker_measure::io::{RecordedFrame, RecordedSession};
use marker_measure::render::{ImageOverlayRenderer, SceneRenderer};
use marker_measure::system::MeasurementSystem;

#[derive(Parser)]
#[command(name = "marker-measure")]
#[command(about = "Measure distances between fiducial markers and points on them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a recorded session through the measurement pipeline.
    Replay {
        /// Session CSV (one row per frame and marker).
        #[arg(long)]
        session: PathBuf,

        /// YAML configuration; defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Marker length the recorded poses were estimated with (mm).
        #[arg(long, default_value = "50.0")]
        recorded_length_mm: f64,

        /// Override the configured marker length (mm).
        #[arg(long)]
        marker_length_mm: Option<f64>,

        /// Override the configured detection policy.
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Where the observations come from.
        #[arg(long, value_enum, default_value = "replay")]
        backend: BackendArg,

        /// Place a point before frame N, optionally at a pixel: `N` or `N@X,Y`.
        #[arg(long = "place-at", value_parser = parse_placement)]
        place_at: Vec<Placement>,

        /// Write an overlay PNG per rendered frame into this directory.
        #[arg(long)]
        overlay_dir: Option<PathBuf>,
    },
    /// Print the intrinsics derived for a resolution.
    Intrinsics {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Sync,
    Async,
}

impl From<PolicyArg> for DetectionPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::Sync => DetectionPolicy::Synchronous,
            PolicyArg::Async => DetectionPolicy::Asynchronous,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// Use the observations and poses stored in the session.
    Replay,
    /// Run ArUco detection on the session images.
    Opencv,
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    frame: FrameSeq,
    pixel: Option<Point2<f64>>,
}

fn parse_placement(s: &str) -> Result<Placement, String> {
    let (frame, pixel) = match s.split_once('@') {
        Some((frame, xy)) => {
            let (x, y) = xy
                .split_once(',')
                .ok_or_else(|| format!("expected X,Y after '@' in {s:?}"))?;
            let x: f64 = x.trim().parse().map_err(|e| format!("bad x in {s:?}: {e}"))?;
            let y: f64 = y.trim().parse().map_err(|e| format!("bad y in {s:?}: {e}"))?;
            (frame, Some(Point2::new(x, y)))
        }
        None => (s, None),
    };
    let frame = frame
        .trim()
        .parse()
        .map_err(|e| format!("bad frame number in {s:?}: {e}"))?;
    Ok(Placement { frame, pixel })
}

fn load_config(path: Option<&Path>) -> Result<MeasureConfig> {
    match path {
        Some(p) => MeasureConfig::load(p),
        None => Ok(MeasureConfig::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            session,
            config,
            recorded_length_mm,
            marker_length_mm,
            policy,
            backend,
            place_at,
            overlay_dir,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(len) = marker_length_mm {
                config.marker_length_mm = len;
            }
            if let Some(p) = policy {
                config.policy = p.into();
            }
            run_replay(&session, config, recorded_length_mm, backend, &place_at, overlay_dir.as_deref())
        }
        Commands::Intrinsics { width, height, config } => {
            let config = load_config(config.as_deref())?;
            let k = CameraIntrinsics::from_resolution(width, height, &config.intrinsics)?;
            println!("{width}x{height}");
            println!("  fx = {:.4}", k.fx);
            println!("  fy = {:.4}", k.fy);
            println!("  cx = {:.4}", k.cx);
            println!("  cy = {:.4}", k.cy);
            println!("  distortion = {:?}", k.distortion);
            Ok(())
        }
    }
}

fn make_backend(kind: BackendArg, session: &RecordedSession, config: &MeasureConfig) -> Result<Box<dyn FiducialBackend>> {
    match kind {
        BackendArg::Replay => Ok(Box::new(ReplayBackend::new(session))),
        #[cfg(feature = "opencv")]
        BackendArg::Opencv => Ok(Box::new(marker_measure::detection::OpenCvBackend::new(&config.dictionary)?)),
        #[cfg(not(feature = "opencv"))]
        BackendArg::Opencv => {
            let _ = config;
            bail!("built without the `opencv` feature")
        }
    }
}

fn load_frame(recorded: &RecordedFrame) -> Result<Frame> {
    match &recorded.image {
        Some(path) => {
            let pixels = image::open(path)
                .with_context(|| format!("loading frame image {}", path.display()))?
                .to_rgba8();
            if pixels.dimensions() != (recorded.width, recorded.height) {
                bail!(
                    "frame {}: image is {:?}, session says {}x{}",
                    recorded.seq,
                    pixels.dimensions(),
                    recorded.width,
                    recorded.height
                );
            }
            Ok(Frame::new(recorded.seq, recorded.timestamp_ns, pixels))
        }
        None => Ok(Frame::blank(
            recorded.seq,
            recorded.timestamp_ns,
            recorded.width,
            recorded.height,
        )),
    }
}

fn run_replay(
    session_path: &Path,
    config: MeasureConfig,
    recorded_length_mm: f64,
    backend: BackendArg,
    placements: &[Placement],
    overlay_dir: Option<&Path>,
) -> Result<()> {
    let session = RecordedSession::load(session_path, recorded_length_mm)?;
    info!(frames = session.len(), path = %session_path.display(), "session loaded");
    if session.is_empty() {
        warn!("session has no frames");
        return Ok(());
    }

    if let Some(dir) = overlay_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut by_frame: BTreeMap<FrameSeq, Vec<Option<Point2<f64>>>> = BTreeMap::new();
    for p in placements {
        by_frame.entry(p.frame).or_default().push(p.pixel);
    }

    let mut system = MeasurementSystem::new(&config, make_backend(backend, &session, &config)?)?;
    let mut surface = system.render_surface();
    let mut renderer = ImageOverlayRenderer::new();

    for recorded in &session.frames {
        for pixel in by_frame.get(&recorded.seq).into_iter().flatten() {
            system.request_placement(*pixel);
        }

        let frame = load_frame(recorded)?;
        if let Err(e) = system.submit_frame(frame) {
            warn!(frame = recorded.seq, error = %e, "frame rejected");
            continue;
        }

        if let Some(dir) = overlay_dir {
            surface.latch();
            let rendered = renderer.draw(surface.current_frame().pixels(), surface.state())?;
            let out = dir.join(format!("frame_{:06}.png", surface.current_frame().seq));
            rendered
                .image
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
        }

        let state = system.snapshot();
        info!(
            frame = recorded.seq,
            analyzed = state.frame_seq(),
            markers = state.num_markers(),
            distance = %state.distance_label().unwrap_or_default(),
            points = state.point_track().points().len(),
            point_distance = %state.point_distance_label().unwrap_or_default(),
            "frame"
        );
    }

    if !system.wait_idle(Duration::from_secs(10)) {
        warn!("detection did not settle before timeout");
    }
    let state = system.snapshot();
    let counts = system.scheduler_stats();
    info!(
        submitted = counts.submitted,
        processed = counts.processed,
        evicted = counts.evicted,
        failed = counts.failed,
        last_frame = state.frame_seq(),
        distance = %state.distance_label().unwrap_or_default(),
        "replay finished"
    );
    system.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placement() {
        let p = parse_placement("12").unwrap();
        assert_eq!(p.frame, 12);
        assert!(p.pixel.is_none());

        let p = parse_placement("3@320.5, 240").unwrap();
        assert_eq!(p.frame, 3);
        assert_eq!(p.pixel, Some(Point2::new(320.5, 240.0)));

        assert!(parse_placement("x").is_err());
        assert!(parse_placement("3@12").is_err());
    }
}
