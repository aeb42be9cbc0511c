use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use marker_overlay_core::{
    glam::Vec3,
    sim::SimRig,
    FrameClock, OverlayCallbacks, OverlayConfig, OverlayPhase, OverlaySession, OverlaySource,
    PlaybackEvent, Pose, TrackingDescriptor, ViewerContext,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> marker_overlay_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            frames,
            lose_at,
            reacquire_at,
            handheld,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(handheld) = handheld {
                config.tracking.handheld = handheld;
            }
            run_simulation(config, frames, lose_at, reacquire_at).await
        }
        Commands::PrintConfig { config } => {
            let config = load_config(config.as_ref())?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> marker_overlay_core::Result<OverlayConfig> {
    match path {
        Some(path) => {
            tracing::info!(?path, "loading overlay config");
            OverlayConfig::load(path)
        }
        None => Ok(OverlayConfig::default()),
    }
}

async fn run_simulation(
    config: OverlayConfig,
    frames: u32,
    lose_at: Option<u32>,
    reacquire_at: Option<u32>,
) -> marker_overlay_core::Result<()> {
    tracing::info!(frames, ?lose_at, ?reacquire_at, "starting simulated session");

    let rig = SimRig::new();
    let source = OverlaySource {
        descriptor: Some(TrackingDescriptor::binary(vec![0x4d, 0x49, 0x4e, 0x44])),
        video_url: "sim://standee.mp4".to_string(),
        viewer: ViewerContext {
            viewer_id: "cli".to_string(),
            content_id: "demo".to_string(),
            source: "simulate".to_string(),
        },
    };
    let callbacks = OverlayCallbacks {
        on_error: Some(Arc::new(|message: &str| eprintln!("error: {message}"))),
        on_first_playback: Some(Arc::new(|event: &PlaybackEvent| {
            tracing::info!(source = %event.source, duration = ?event.video_duration, "first playback");
        })),
        ..OverlayCallbacks::default()
    };

    let session = OverlaySession::new(config, source, rig.backends(), callbacks);
    session.initialize().await?;
    session.start_scanning().await?;

    let marker = Pose::flat_marker(Vec3::ZERO);
    rig.tracker.show(marker);

    let mut clock = FrameClock::new(60);
    let mut last_phase = None;
    for frame in 0..frames {
        if Some(frame) == lose_at {
            rig.tracker.hide();
        }
        if Some(frame) == reacquire_at {
            rig.tracker.show(marker);
        }

        let now_ms = clock.tick();
        let camera = orbiting_camera(now_ms);
        rig.media.advance(1.0 / 60.0);

        let Some(snapshot) = session.render_frame(now_ms, &camera) else {
            continue;
        };
        if last_phase != Some(snapshot.phase) {
            println!(
                "frame {frame:>5} t={now_ms:>8.1}ms phase={:<8} scale={:.3} yaw={:+.3}",
                phase_name(snapshot.phase),
                snapshot.scale,
                snapshot.yaw
            );
            last_phase = Some(snapshot.phase);
        }
    }

    println!("{}", serde_json::to_string_pretty(&session.status())?);
    session.cleanup().await;
    Ok(())
}

/// Camera circling the marker at head height, one lap every ten seconds.
fn orbiting_camera(now_ms: f64) -> Pose {
    let angle = (now_ms / 10_000.0 * std::f64::consts::TAU) as f32;
    Pose::from_position(Vec3::new(1.5 * angle.sin(), 0.4, 1.5 * angle.cos()))
}

fn phase_name(phase: OverlayPhase) -> &'static str {
    match phase {
        OverlayPhase::Hidden => "hidden",
        OverlayPhase::Entering => "entering",
        OverlayPhase::Steady => "steady",
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Marker-anchored video overlay engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the overlay against simulated camera, tracker and media backends.
    Simulate {
        /// Optional JSON config file; defaults are used for missing fields.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of 60 fps frames to render.
        #[arg(short, long, default_value_t = 240)]
        frames: u32,
        /// Frame at which the marker leaves the view.
        #[arg(long)]
        lose_at: Option<u32>,
        /// Frame at which the marker comes back.
        #[arg(long)]
        reacquire_at: Option<u32>,
        /// Override the handheld device profile.
        #[arg(long)]
        handheld: Option<bool>,
    },
    /// Print the effective configuration as JSON.
    PrintConfig {
        /// Optional JSON config file to merge over the defaults.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}
