use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt};

use drape::{
    BackendKind, DesignFile, DesignImage, DrapeConfig, MockupSession, Placement,
    config::ProviderConfig,
    depth::{RawDepth, process::process_depth_map, provider::DepthProvider},
    lighting::extract_lighting_masks,
    session::DepthOutcome,
};

#[derive(Parser, Debug)]
#[command(name = "drape", version, about = "Depth-warped product mockups")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate and normalize the depth map of a photo.
    Depth(DepthArgs),
    /// Extract the shadow and highlight masks of a photo.
    Masks(MasksArgs),
    /// Composite one design onto a photo.
    Render(RenderArgs),
    /// Composite many designs onto a photo and write a manifest.
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Compositor backend (overrides the config).
    #[arg(long, value_enum)]
    backend: Option<BackendChoice>,

    /// Depth provider endpoint, tried in the order given (repeatable).
    #[arg(long = "provider", value_name = "URL")]
    providers: Vec<String>,
}

#[derive(Args, Debug)]
struct DepthArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Input photo.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct MasksArgs {
    /// Input photo.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path for the shadow mask.
    #[arg(long)]
    shadow: PathBuf,

    /// Output PNG path for the highlight mask.
    #[arg(long)]
    highlight: PathBuf,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Base product photo.
    #[arg(long)]
    base: PathBuf,

    /// Design image (raster or SVG).
    #[arg(long)]
    design: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Precomputed depth map; skips the provider chain.
    #[arg(long)]
    depth: Option<PathBuf>,

    #[arg(long)]
    x: Option<f64>,
    #[arg(long)]
    y: Option<f64>,
    #[arg(long)]
    width: Option<f64>,
    #[arg(long)]
    height: Option<f64>,

    /// Draw the base photo alone.
    #[arg(long)]
    no_filters: bool,
}

#[derive(Args, Debug)]
struct BatchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Base product photo.
    #[arg(long)]
    base: PathBuf,

    /// Design files, rendered in the order given.
    #[arg(long = "design", num_args = 1..)]
    designs: Vec<PathBuf>,

    /// Output directory for the PNGs and `manifest.json`.
    #[arg(long)]
    out_dir: PathBuf,

    /// Precomputed depth map; skips the provider chain.
    #[arg(long)]
    depth: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Auto,
    Gpu,
    Software,
}

impl From<BackendChoice> for BackendKind {
    fn from(c: BackendChoice) -> Self {
        match c {
            BackendChoice::Auto => BackendKind::Auto,
            BackendChoice::Gpu => BackendKind::Gpu,
            BackendChoice::Software => BackendKind::Software,
        }
    }
}

#[derive(serde::Serialize)]
struct ManifestEntry {
    name: String,
    file: String,
    failed: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Depth(args) => cmd_depth(args).await,
        Command::Masks(args) => cmd_masks(args),
        Command::Render(args) => cmd_render(args).await,
        Command::Batch(args) => cmd_batch(args).await,
    }
}

fn load_config(common: &CommonArgs) -> anyhow::Result<DrapeConfig> {
    let mut cfg = match &common.config {
        Some(path) => DrapeConfig::from_json_file(path)?,
        None => DrapeConfig::default(),
    };
    if let Some(b) = common.backend {
        cfg.backend = b.into();
    }
    for (i, endpoint) in common.providers.iter().enumerate() {
        cfg.providers.push(ProviderConfig {
            label: format!("cli-{i}"),
            endpoint: endpoint.clone(),
            timeout_ms: 30_000,
        });
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn read_bytes(path: &Path) -> anyhow::Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("read '{}'", path.display()))
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    ensure_parent(path)?;
    std::fs::write(path, bytes).with_context(|| format!("write '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn save_png(path: &Path, img: &image::RgbaImage) -> anyhow::Result<()> {
    ensure_parent(path)?;
    img.save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

async fn cmd_depth(args: DepthArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.common)?;
    let source = drape::SourceImage::from_bytes(read_bytes(&args.in_path).await?)?;
    let provider = DepthProvider::from_configs(&cfg.providers)?;

    let raw = provider.get_depth_map(&source).await;
    let depth = process_depth_map(&raw, &cfg.depth)?;
    tracing::info!(method = %depth.method, resolution = depth.resolution(), "depth ready");
    save_png(&args.out, &depth.image)
}

fn cmd_masks(args: MasksArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read '{}'", args.in_path.display()))?;
    let base = drape::assets::decode::decode_raster(&bytes)?;
    let masks = extract_lighting_masks(&base);
    save_png(&args.shadow, &masks.shadow)?;
    save_png(&args.highlight, &masks.highlight)
}

/// Load the base photo into a session and install depth, either from `depth_path` or from the
/// provider chain.
async fn prepare_session(
    cfg: DrapeConfig,
    base: &Path,
    depth_path: Option<&Path>,
) -> anyhow::Result<MockupSession> {
    let mut session = MockupSession::new(cfg.clone())?;
    let job = session.load_source(read_bytes(base).await?)?;

    let outcome = match depth_path {
        Some(path) => {
            let bytes = read_bytes(path).await?;
            let image = image::load_from_memory(&bytes)
                .with_context(|| format!("decode depth '{}'", path.display()))?;
            let raw = RawDepth {
                image,
                method: "file".to_string(),
            };
            DepthOutcome {
                version: job.version(),
                depth: process_depth_map(&raw, &cfg.depth),
            }
        }
        None => job.run().await,
    };
    session.apply_depth(outcome)?;

    if let Some(kind) = session.engine().kind() {
        tracing::info!(?kind, "compositor ready");
    }
    Ok(session)
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.common)?;
    let mut session = prepare_session(cfg, &args.base, args.depth.as_deref()).await?;

    let name = DesignFile::from_path(&args.design).name;
    let design = DesignImage::decode(name, &read_bytes(&args.design).await?)?;
    let default = session.set_design(design)?;

    let requested = Placement::new(
        args.x.unwrap_or(default.x),
        args.y.unwrap_or(default.y),
        args.width.unwrap_or(default.width),
        args.height.unwrap_or(default.height),
    );
    if requested != default
        && let Some(controller) = session.controller_mut()
    {
        controller.set_placement(requested);
    }
    session.set_filters(!args.no_filters);

    let png = session.snapshot_png()?;
    write_file(&args.out, &png)
}

async fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.common)?;
    let mut session = prepare_session(cfg, &args.base, args.depth.as_deref()).await?;

    let designs: Vec<DesignFile> = args.designs.iter().map(DesignFile::from_path).collect();
    let results = session.generate_results(&designs).await?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create output dir '{}'", args.out_dir.display()))?;

    let mut manifest = Vec::with_capacity(results.len());
    for (i, result) in results.iter().enumerate() {
        let file = format!("{i:03}-{}.png", sanitize(&result.name));
        write_file(&args.out_dir.join(&file), &result.png_bytes()?)?;
        manifest.push(ManifestEntry {
            name: result.name.clone(),
            file,
            failed: result.failed,
        });
    }

    let failed = manifest.iter().filter(|e| e.failed).count();
    let json = serde_json::to_vec_pretty(&manifest).context("serialize manifest")?;
    write_file(&args.out_dir.join("manifest.json"), &json)?;
    tracing::info!(results = manifest.len(), failed, "batch finished");
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
