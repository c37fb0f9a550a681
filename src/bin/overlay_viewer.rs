//! Overlay Viewer
//!
//! Native window around the overlay runtime: the live dashboard on the left,
//! the active overlay on the right.
//!
//! Usage:
//!   cargo run --features viewer --bin overlay_viewer -- --base-url http://localhost:5001

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use eframe::egui;
use tracing::{info, warn};

use overlay_runtime::app::OverlayApp;
use overlay_runtime::{
    AppContext, HttpTransport, OverlayId, RuntimeConfig, SurfaceProbe, SurfaceStatus, TokioSpawner,
};

#[derive(Parser, Debug)]
#[command(name = "overlay_viewer")]
#[command(about = "Kernel visualization overlays on top of a live dashboard")]
struct Args {
    /// YAML runtime configuration; missing file means built-in defaults
    #[arg(long, env = "OVERLAY_CONFIG", default_value = "config/overlays.yaml")]
    config: PathBuf,

    /// Override the telemetry base URL from the config file
    #[arg(long, env = "OVERLAY_BASE_URL")]
    base_url: Option<String>,

    /// Overlay to open at startup
    /// (matrix, timeline, dna, dna_timeline, network, devices, filesystem)
    #[arg(long)]
    overlay: Option<String>,

    /// Process to select at startup, for the timeline overlays
    #[arg(long)]
    pid: Option<u32>,
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let mut config = if args.config.exists() {
        RuntimeConfig::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        info!(path = %args.config.display(), "no config file, using defaults");
        RuntimeConfig::default()
    };
    if let Some(base_url) = &args.base_url {
        config.telemetry.base_url = base_url.clone();
    }
    Ok(config)
}

fn parse_overlay(name: &str) -> Result<OverlayId> {
    OverlayId::ALL
        .into_iter()
        .find(|id| id.as_str() == name)
        .with_context(|| format!("unknown overlay '{name}'"))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "overlay_runtime=info,overlay_viewer=info".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let startup = args.overlay.as_deref().map(parse_overlay).transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .thread_name("overlay-telemetry")
        .build()
        .context("starting telemetry runtime")?;
    let spawner = Arc::new(TokioSpawner::new(runtime.handle().clone()));
    let transport =
        Arc::new(HttpTransport::new(&config.telemetry).context("building HTTP client")?);

    info!(base_url = %transport.base_url(), "starting overlay viewer");

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Overlay Viewer")
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([900.0, 600.0]),
        ..Default::default()
    };

    let pid = args.pid;
    eframe::run_native(
        "overlay_viewer",
        native_options,
        Box::new(move |cc| {
            cc.egui_ctx.set_theme(egui::Theme::Dark);

            let surface = if cc.gl.is_some() {
                SurfaceStatus::Available
            } else {
                warn!("no GL context; overlays will be unavailable");
                SurfaceStatus::Unavailable("hardware-accelerated rendering is not available".into())
            };

            let mut context = AppContext::builder(config, transport, spawner)
                .surface(Arc::new(surface) as Arc<dyn SurfaceProbe>)
                .build();
            if let Some(pid) = pid {
                context.select_process(pid);
            }
            let mut app = OverlayApp::new(context, Some(runtime));
            if let Some(id) = startup {
                app.open(id);
            }
            Ok(Box::new(app) as Box<dyn eframe::App>)
        }),
    )
    .map_err(|e| anyhow::anyhow!("viewer exited with error: {e}"))
}
