use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use trackmatte::{
    Analysis, BoxSegmenter, ImageSequenceSource, MaskDirSegmenter, ModelContext, PassStatus,
    Pipeline, PipelineConfig, PipelineError, Progress, ReplayDetector, RunControl,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Pipeline configuration (JSON); absent fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect and track objects, writing the id list and track boxes
    Analyze(AnalyzeArgs),
    /// Write the RGBA matte sequence of one track id
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct Layout {
    /// Directory of decoded frame images, read in file-name order
    #[arg(long)]
    frames: PathBuf,

    /// Output directory [default: <frames>_outputs]
    #[arg(long)]
    out: Option<PathBuf>,

    /// Base name of the analysis files [default: name of the frames directory]
    #[arg(long)]
    stem: Option<String>,
}

impl Layout {
    fn stem(&self) -> String {
        self.stem.clone().unwrap_or_else(|| {
            self.frames
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "video".to_owned())
        })
    }

    fn out_dir(&self) -> PathBuf {
        self.out.clone().unwrap_or_else(|| {
            let mut name = self.frames.as_os_str().to_owned();
            name.push("_outputs");
            PathBuf::from(name)
        })
    }
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    #[command(flatten)]
    layout: Layout,

    /// Detections recorded by an external detector (JSON array)
    #[arg(long)]
    detections: PathBuf,

    /// Detections below this confidence are ignored
    #[arg(long, default_value_t = trackmatte::integration::DEFAULT_MIN_CONFIDENCE)]
    min_confidence: f32,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[command(flatten)]
    layout: Layout,

    /// Track id to export, as listed in <stem>_id_list.json
    #[arg(long)]
    id: u64,

    /// Per-frame masks from an external segmentation model; without it the
    /// track's box is used as the matte
    #[arg(long)]
    masks: Option<PathBuf>,

    /// Destination of the PNG sequence [default: <out>/rgba_id<id>]
    #[arg(long)]
    dest: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::from_json(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    match cli.command {
        Command::Analyze(args) => analyze(args, config),
        Command::Export(args) => export(args, config),
    }
}

/// Log roughly every tenth of the way through a pass.
fn progress_logger() -> impl FnMut(&Progress) + Send {
    let mut last_decile = 0;
    move |p: &Progress| {
        let Some(fraction) = p.fraction() else {
            return;
        };
        let decile = (fraction * 10.0) as u32;
        if decile > last_decile {
            last_decile = decile;
            tracing::info!(
                "{}: {}/{} frames, elapsed {:.1?}, remaining {:.1?}",
                p.pass,
                p.frames_done,
                p.total.unwrap_or(0),
                p.elapsed,
                p.remaining.unwrap_or_default()
            );
        }
    }
}

fn open_frames(dir: &Path) -> Result<ImageSequenceSource> {
    ImageSequenceSource::open(dir).with_context(|| format!("Failed to open frames {}", dir.display()))
}

fn analyze(args: AnalyzeArgs, config: PipelineConfig) -> Result<()> {
    let detector = ReplayDetector::from_json(&args.detections)
        .context("Failed to load detections")?
        .with_min_confidence(args.min_confidence);
    let context = ModelContext::builder().detector(detector).build();
    let pipeline = Pipeline::new(context, config);

    let source = open_frames(&args.layout.frames)?;
    let mut control = RunControl::new().on_progress(progress_logger());
    let analysis = pipeline
        .analyze(source, &mut control)
        .context("Analysis failed")?;

    let out_dir = args.layout.out_dir();
    let paths = analysis
        .save(&out_dir, &args.layout.stem())
        .context("Failed to save analysis")?;

    for (id, summary) in analysis.mapping.iter() {
        tracing::info!("id {id}: {} ({} frames)", summary.label, summary.frames);
    }
    if !analysis.diagnostics.is_empty() {
        tracing::warn!("{} frame diagnostic(s) recorded", analysis.diagnostics.len());
    }
    if analysis.status != PassStatus::Completed {
        tracing::warn!("analysis ended early: {:?}", analysis.status);
    }
    tracing::info!("id list written to {}", paths.mapping.display());
    Ok(())
}

fn export(args: ExportArgs, config: PipelineConfig) -> Result<()> {
    let out_dir = args.layout.out_dir();
    let stem = args.layout.stem();
    let analysis = Analysis::load(&out_dir, &stem)
        .with_context(|| format!("Failed to load analysis '{stem}' from {}", out_dir.display()))?;

    let context = match &args.masks {
        Some(dir) => {
            if !dir.is_dir() {
                bail!("mask directory {} does not exist", dir.display());
            }
            ModelContext::builder()
                .segmenter(MaskDirSegmenter::new(dir))
                .build()
        }
        None => ModelContext::builder().segmenter(BoxSegmenter).build(),
    };
    let pipeline = Pipeline::new(context, config);

    let dest = args
        .dest
        .clone()
        .unwrap_or_else(|| out_dir.join(format!("rgba_id{}", args.id)));
    let source = open_frames(&args.layout.frames)?;
    let mut control = RunControl::new().on_progress(progress_logger());

    match pipeline.export(source, &analysis, args.id, &dest, &mut control) {
        Ok(report) => {
            tracing::info!(
                "wrote {} frame(s) of id {} ({}) to {}",
                report.files_written(),
                report.track_id,
                report.label,
                report.out_dir.display()
            );
            if report.fallback_frames > 0 {
                tracing::warn!("{} frame(s) used the box matte", report.fallback_frames);
            }
            if !report.is_complete() {
                tracing::warn!("export ended early: {:?}", report.status);
            }
            Ok(())
        }
        Err(PipelineError::Export { partial, source }) => {
            tracing::error!(
                "export stopped after {} file(s) in {}",
                partial.files_written(),
                partial.out_dir.display()
            );
            Err(anyhow::Error::new(source).context("Export failed"))
        }
        Err(err) => Err(anyhow::Error::new(err).context("Export failed")),
    }
}
