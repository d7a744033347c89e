// ============================================================================
// TextInpaint CLI: headless text replacement via command-line arguments
// ============================================================================
//
// Usage examples:
//   TextInpaint -i poster.png --rect 10,20,30,8 --text "SALE" -o poster_sale.png
//   TextInpaint -i shot.jpg --rect 120,40,300,60 --pixels --text "v2.0"
//   TextInpaint -i shot.jpg --rect 10,10,50,20 --guide-only -o guide.png
//   TextInpaint -i shot.jpg --rect 10,10,50,20 --mode mask --guide-only -o mask.png
//
// No window is opened. The request runs on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Instant, SystemTime};

use clap::Parser;

use crate::gemini::{GeminiClient, ImageSize, InpaintError};
use crate::io::{LoadError, SourceImage, load_image_sync, result_file_name, write_png};
use crate::ops::guide::{GuideMode, build_guide};
use crate::selection::BoundingBox;
use crate::settings::AppSettings;
use crate::{log_err, log_info};

/// TextInpaint headless text replacement.
#[derive(Parser, Debug)]
#[command(
    name = "TextInpaint",
    about = "Replace text inside a region of an image using a hosted image model",
    long_about = "Select a rectangle, give the new text, get back the edited image.\n\
                  The rectangle is given in percent of the image unless --pixels is set.\n\n\
                  Example:\n  \
                  TextInpaint -i poster.png --rect 10,20,30,8 --text \"SALE\" -o out.png"
)]
pub struct CliArgs {
    /// Source image (PNG, JPEG, WEBP, GIF, BMP).
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Region to edit as X,Y,WIDTH,HEIGHT.
    #[arg(short, long, value_name = "X,Y,W,H")]
    pub rect: String,

    /// Interpret --rect in pixels instead of percent.
    #[arg(long)]
    pub pixels: bool,

    /// Replacement text. Required unless --guide-only.
    #[arg(short, long, value_name = "TEXT")]
    pub text: Option<String>,

    /// Output PNG path. Defaults to inpaint-result-<millis>.png.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Location guide flavour: guide or mask. Defaults to the saved setting.
    #[arg(short, long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Only write the location guide; no API call, no key needed.
    #[arg(long)]
    pub guide_only: bool,

    /// API key (overrides settings and GEMINI_API_KEY / API_KEY).
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Model name override.
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Output size requested from the model: 1K, 2K or 4K.
    #[arg(long, value_name = "SIZE")]
    pub image_size: Option<String>,

    /// Echo log lines and timing to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when `--input`/`-i` is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i" || a.starts_with("--input="))
    }
}

#[derive(Debug)]
pub enum CliError {
    Usage(String),
    Load(LoadError),
    Inpaint(InpaintError),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(m) => write!(f, "{}", m),
            CliError::Load(e) => write!(f, "{}", e),
            CliError::Inpaint(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<LoadError> for CliError {
    fn from(e: LoadError) -> Self {
        CliError::Load(e)
    }
}

impl From<InpaintError> for CliError {
    fn from(e: InpaintError) -> Self {
        CliError::Inpaint(e)
    }
}

/// Parse "X,Y,W,H" (commas or whitespace).
pub fn parse_rect(s: &str) -> Result<[f32; 4], CliError> {
    let values: Vec<f32> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| CliError::Usage(format!("invalid --rect '{}': {}", s, e)))?;
    match values.as_slice() {
        &[x, y, w, h] if w >= 0.0 && h >= 0.0 => Ok([x, y, w, h]),
        &[_, _, _, _] => Err(CliError::Usage(format!("--rect '{}' has a negative size", s))),
        _ => Err(CliError::Usage(format!("--rect expects X,Y,W,H, got '{}'", s))),
    }
}

/// Map the parsed rect onto the image as a percent box.
pub fn selection_for(rect: [f32; 4], pixels: bool, image: &SourceImage) -> Result<BoundingBox, CliError> {
    let [x, y, w, h] = rect;
    let sel = if pixels {
        BoundingBox::from_pixels(x, y, w, h, image.width(), image.height())
    } else {
        BoundingBox::new(x, y, w, h).clamped()
    };
    if sel.is_empty() {
        return Err(CliError::Usage("selection is empty after clipping to the image".to_string()));
    }
    Ok(sel)
}

/// Run CLI processing and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let started = Instant::now();
    match execute(&args, &AppSettings::load()) {
        Ok(path) => {
            println!("{}", path.display());
            if args.verbose {
                eprintln!("done in {:.2}s", started.elapsed().as_secs_f32());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log_err!("CLI run failed: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Do the work; returns the path written.
pub fn execute(args: &CliArgs, settings: &AppSettings) -> Result<PathBuf, CliError> {
    let mode = match args.mode.as_deref() {
        Some(m) => GuideMode::from_key(m)
            .ok_or_else(|| CliError::Usage(format!("unknown --mode '{}' (use guide or mask)", m)))?,
        None => settings.guide_mode,
    };
    let rect = parse_rect(&args.rect)?;
    let image = load_image_sync(&args.input)?;
    let selection = selection_for(rect, args.pixels, &image)?;
    log_info!(
        "CLI: {} ({}x{}) selection {:?} mode {}",
        image.name,
        image.width(),
        image.height(),
        selection,
        mode.key()
    );

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(result_file_name(SystemTime::now())));

    if args.guide_only {
        let guide = build_guide(mode, &image.rgba, &selection);
        save_result(&guide, &output)?;
        return Ok(output);
    }

    let text = args
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| CliError::Usage("--text is required unless --guide-only".to_string()))?;

    let mut config = settings.clone();
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(size) = &args.image_size {
        config.image_size = ImageSize::parse(size)
            .ok_or_else(|| CliError::Usage(format!("unknown --image-size '{}'", size)))?;
    }
    let api_key = config
        .resolve_api_key(args.api_key.as_deref())
        .ok_or(InpaintError::MissingApiKey)?;

    let client = GeminiClient::new(config.client_config(api_key))?;
    let generated = client.inpaint_text(&image, &selection, text, mode)?;
    save_result(&generated.decode()?, &output)?;
    Ok(output)
}

fn save_result(image: &image::RgbaImage, path: &Path) -> Result<(), LoadError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_png(image, path)
}
