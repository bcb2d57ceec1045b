//! Scanflow CLI - run the OCR stages on files
//!
//! Each stage can be driven on its own from JSON/NumPy inputs, which makes
//! thresholds easy to tune without re-running the models.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ndarray::ArrayD;
use scanflow_ocr::detection::heatmap_view;
use scanflow_ocr::engine::{EngineSupervisor, ModelLayout, OrtCapabilityProbe, OrtEngineFactory};
use scanflow_ocr::{
    merge_regions, postprocess_heatmap, region_mask, BackendPreference, CancelToken, MapScale,
    ModelVariant, OcrPipeline, OcrSettings, SeparatorLine, SymbolDictionary, TextRegion,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "scanflow",
    about = "Detect, read and lay out text in scanned pages",
    version
)]
struct Args {
    /// Show detailed processing information
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings JSON file; missing keys take their defaults
    #[arg(short, long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn a detection heatmap (.npy, [H,W] or [N,1,H,W]) into boxes
    Detect {
        #[arg(value_name = "HEATMAP")]
        heatmap: PathBuf,

        /// Original image size as WIDTHxHEIGHT; defaults to the heatmap size
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        image_size: Option<(u32, u32)>,

        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Merge recognized regions into blocks
    Layout {
        /// JSON array of regions
        #[arg(value_name = "REGIONS")]
        regions: PathBuf,

        /// JSON array of separator lines
        #[arg(long, value_name = "FILE")]
        separators: Option<PathBuf>,

        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Rasterize region polygons into a PNG mask
    Mask {
        /// JSON array of regions
        #[arg(value_name = "REGIONS")]
        regions: PathBuf,

        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        size: (u32, u32),

        /// Grow the mask by this many pixels with round corners
        #[arg(long, default_value_t = 0)]
        padding: u32,

        /// Also mask regions whose recognition failed
        #[arg(long)]
        include_failed: bool,

        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Run the full pipeline on an image
    Run {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Directory holding <variant>/det.onnx, rec.onnx and keys.txt
        #[arg(long, value_name = "DIR")]
        models: PathBuf,

        /// Override the settings' model variant (server, mobile)
        #[arg(long)]
        variant: Option<ModelVariant>,

        /// Override the settings' backend preference (auto, accelerated, portable)
        #[arg(long)]
        backend: Option<BackendPreference>,

        /// JSON array of separator lines
        #[arg(long, value_name = "FILE")]
        separators: Option<PathBuf>,

        /// Tesseract language for the fallback recognizer
        #[cfg(feature = "tesseract")]
        #[arg(long, default_value = "eng")]
        fallback_language: String,

        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
}

fn parse_size(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("width: {e}"))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("height: {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be non-zero, got {w}x{h}"));
    }
    Ok((w, h))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn load_separators(path: Option<&Path>) -> Result<Vec<SeparatorLine>> {
    path.map_or_else(|| Ok(Vec::new()), read_json)
}

fn load_settings(path: Option<&Path>) -> Result<OcrSettings> {
    match path {
        Some(path) => OcrSettings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(OcrSettings::default()),
    }
}

fn detect(heatmap: &Path, image_size: Option<(u32, u32)>, settings: &OcrSettings, output: Option<&Path>) -> Result<()> {
    let tensor: ArrayD<f32> = ndarray_npy::read_npy(heatmap)
        .with_context(|| format!("Failed to read heatmap {}", heatmap.display()))?;
    let map = heatmap_view(tensor.view())?;
    let (rows, cols) = map.dim();
    let map_size = (
        u32::try_from(cols).context("heatmap too wide")?,
        u32::try_from(rows).context("heatmap too tall")?,
    );
    let image_size = image_size.unwrap_or(map_size);
    let scale = MapScale::between((cols, rows), image_size);

    let boxes = postprocess_heatmap(map, scale, image_size, &settings.detection_params());
    log::info!("Detected {} boxes in {}x{} heatmap", boxes.len(), cols, rows);
    write_json(&boxes, output)
}

fn layout(regions: &Path, separators: Option<&Path>, settings: &OcrSettings, output: Option<&Path>) -> Result<()> {
    let regions: Vec<TextRegion> = read_json(regions)?;
    let separators = load_separators(separators)?;
    let blocks = merge_regions(&regions, &separators, &settings.layout_params());
    write_json(&blocks, output)
}

fn mask(regions: &Path, size: (u32, u32), padding: u32, include_failed: bool, output: &Path) -> Result<()> {
    let mut regions: Vec<TextRegion> = read_json(regions)?;
    if !include_failed {
        regions.retain(|r| !r.recognition_failed);
    }
    let mask = region_mask(&regions, size.0, size.1, padding);
    mask.save(output)
        .with_context(|| format!("Failed to write mask {}", output.display()))?;
    log::info!("Wrote {}x{} mask of {} regions to {}", size.0, size.1, regions.len(), output.display());
    Ok(())
}

fn build_pipeline(models: &Path, settings: &OcrSettings) -> Result<OcrPipeline> {
    if !models.is_dir() {
        bail!("Models directory not found: {}", models.display());
    }
    let layout = ModelLayout::new(models);
    let dictionary = SymbolDictionary::from_file(&layout.dictionary(settings.model_variant), true)?;
    let supervisor = EngineSupervisor::new(
        Box::new(OrtEngineFactory::new(layout)),
        Box::new(OrtCapabilityProbe::new()),
        settings.backend,
        settings.model_variant,
    );
    Ok(OcrPipeline::new(supervisor, dictionary))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let mut settings = load_settings(args.settings.as_deref())?;

    match args.command {
        Commands::Detect {
            heatmap,
            image_size,
            output,
        } => detect(&heatmap, image_size, &settings, output.as_deref()),
        Commands::Layout {
            regions,
            separators,
            output,
        } => layout(&regions, separators.as_deref(), &settings, output.as_deref()),
        Commands::Mask {
            regions,
            size,
            padding,
            include_failed,
            output,
        } => mask(&regions, size, padding, include_failed, &output),
        Commands::Run {
            image,
            models,
            variant,
            backend,
            separators,
            #[cfg(feature = "tesseract")]
            fallback_language,
            output,
        } => {
            if let Some(variant) = variant {
                settings.model_variant = variant;
            }
            if let Some(backend) = backend {
                settings.backend = backend;
            }
            settings.validate()?;

            let separators = load_separators(separators.as_deref())?;
            let image = image::open(&image)
                .with_context(|| format!("Failed to open image {}", image.display()))?;

            let pipeline = build_pipeline(&models, &settings)?;
            #[cfg(feature = "tesseract")]
            let pipeline = pipeline.with_fallback(Box::new(
                scanflow_ocr::fallback::TesseractFallback::new(&fallback_language)?,
            ));
            let mut pipeline = pipeline;

            let report = pipeline.recognize(&image, &separators, &settings, &CancelToken::new())?;
            if report.silent_fallback {
                log::warn!("Accelerated backend ran out of memory; finished on the portable backend");
            }
            log::info!(
                "Recognized {} blocks on {} backend in {:?}",
                report.output.merged_blocks.len(),
                report.backend,
                report.profiling.total()
            );
            write_json(&report.output, output.as_deref())
        }
    }
}
