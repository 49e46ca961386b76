use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framepack::{
    ArchivePart, EngineChoice, EngineSelection, ExtractionEvents, ExtractionOrchestrator,
    ExtractionSettings, FallbackPolicy, FfmpegLogLevel, MediaProbe, MediaSource,
    OrchestratorOptions, OutputFormat, Progress, RestartNotice, RuntimeCapabilityProbe,
    SamplingMode, probe_capability, select_engine,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  framepack probe clip.webm --json\n  framepack engine spinner.gif\n  framepack extract clip.mp4 --out frames --mode fps --fps 5 --split 250 --progress\n  framepack completions zsh > _framepack";

#[derive(Debug, Parser)]
#[command(
    name = "framepack",
    version,
    about = "Extract frames from animated media and pack them into zip archives",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing archives.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print header metadata for a file.
    #[command(
        about = "Print media metadata",
        visible_alias = "info",
        after_help = "Examples:\n  framepack probe clip.mp4\n  framepack probe clip.mp4 --json"
    )]
    Probe {
        /// Input file.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show which engine would handle a file, and why.
    #[command(
        about = "Show engine selection",
        after_help = "Examples:\n  framepack engine spinner.gif\n  framepack engine clip.webm --engine universal"
    )]
    Engine {
        /// Input file.
        input: PathBuf,

        /// Force an engine (auto, image, video, universal).
        #[arg(long, default_value = "auto")]
        engine: String,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract frames into zip archives.
    #[command(
        about = "Extract frames",
        after_help = "Examples:\n  framepack extract clip.mp4 --out frames --mode nth --nth 10\n  framepack extract clip.webm --out frames --mode range --start 0:10 --end 0:20 --format jpeg --quality 85\n  framepack extract spinner.gif --out frames --split 100 --auto-download"
    )]
    Extract(ExtractArgs),

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args, Clone)]
struct ExtractArgs {
    /// Input file.
    input: PathBuf,
    /// Output directory for archives.
    #[arg(long)]
    out: PathBuf,
    /// Sampling mode: every | fps | nth | range.
    #[arg(long, default_value = "every")]
    mode: String,
    /// Output frame rate for --mode fps.
    #[arg(long)]
    fps: Option<f64>,
    /// Keep every Nth frame for --mode nth.
    #[arg(long)]
    nth: Option<u32>,
    /// Range start for --mode range (seconds, MM:SS or HH:MM:SS).
    #[arg(long)]
    start: Option<String>,
    /// Range end for --mode range.
    #[arg(long)]
    end: Option<String>,
    /// Image format: png | png-compressed | jpeg.
    #[arg(long, default_value = "png")]
    format: String,
    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 90)]
    quality: u8,
    /// Maximum number of frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Output width.
    #[arg(long)]
    width: Option<u32>,
    /// Output height.
    #[arg(long)]
    height: Option<u32>,
    /// Entry naming template ({name}, {index}, {index:05}, {ms}, {ext}).
    #[arg(long)]
    template: Option<String>,
    /// Split into archives of this many frames.
    #[arg(long)]
    split: Option<u64>,
    /// Write each archive part as soon as it is ready.
    #[arg(long)]
    auto_download: bool,
    /// Engine: auto | image | video | universal.
    #[arg(long, default_value = "auto")]
    engine: String,
    /// Frame rate assumed for animations without timing.
    #[arg(long)]
    assumed_fps: Option<f64>,
    /// Fail instead of retrying with the universal engine.
    #[arg(long)]
    no_fallback: bool,
    /// Stall watchdog timeout in seconds.
    #[arg(long)]
    stall_timeout: Option<f64>,
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_engine(value: &str) -> Result<Option<EngineChoice>, Box<dyn std::error::Error>> {
    if value.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    EngineChoice::parse(value)
        .map(Some)
        .ok_or_else(|| format!("unsupported --engine: {value} (auto|image|video|universal)").into())
}

fn parse_output_format(value: &str, quality: u8) -> Option<OutputFormat> {
    match value.to_ascii_lowercase().as_str() {
        "png" => Some(OutputFormat::Png),
        "png-compressed" | "pngc" => Some(OutputFormat::PngCompressed),
        "jpeg" | "jpg" => Some(OutputFormat::Jpeg { quality }),
        _ => None,
    }
}

fn parse_sampling(args: &ExtractArgs) -> Result<SamplingMode, Box<dyn std::error::Error>> {
    match args.mode.to_ascii_lowercase().as_str() {
        "every" | "all" => Ok(SamplingMode::Every),
        "fps" => {
            let fps = args.fps.ok_or("--mode fps requires --fps")?;
            Ok(SamplingMode::Fps(fps))
        }
        "nth" => {
            let nth = args.nth.ok_or("--mode nth requires --nth")?;
            Ok(SamplingMode::Nth(nth))
        }
        "range" | "time-range" => {
            let start = args.start.as_deref().ok_or("--mode range requires --start")?;
            let end = args.end.as_deref().ok_or("--mode range requires --end")?;
            Ok(SamplingMode::TimeRange {
                start: parse_timecode(start)?,
                end: parse_timecode(end)?,
            })
        }
        other => Err(format!("unsupported --mode: {other} (every|fps|nth|range)").into()),
    }
}

fn build_settings(args: &ExtractArgs) -> Result<ExtractionSettings, Box<dyn std::error::Error>> {
    let format = parse_output_format(&args.format, args.quality)
        .ok_or(format!("unsupported --format: {}", args.format))?;

    let mut settings = ExtractionSettings::new()
        .with_sampling(parse_sampling(args)?)
        .with_output_format(format)
        .with_resolution(args.width, args.height)
        .with_auto_download(args.auto_download);

    if let Some(max_frames) = args.max_frames {
        settings = settings.with_max_frames(max_frames);
    }
    if let Some(template) = &args.template {
        settings = settings.with_naming_template(template.clone());
    }
    if let Some(frames_per_part) = args.split {
        settings = settings.with_split(frames_per_part);
    }
    if let Some(engine) = parse_engine(&args.engine)? {
        settings = settings.with_engine(engine);
    }
    if let Some(fps) = args.assumed_fps {
        settings = settings.with_assumed_fps(fps);
    }

    Ok(settings)
}

fn build_options(
    args: &ExtractArgs,
    global: &GlobalOptions,
) -> Result<OrchestratorOptions, Box<dyn std::error::Error>> {
    let mut options = OrchestratorOptions::new();
    if args.no_fallback {
        options = options.with_fallback_policy(FallbackPolicy::deny_all());
    }
    if let Some(seconds) = args.stall_timeout {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err("--stall-timeout must be positive".into());
        }
        options = options.with_stall_timeout(Duration::from_secs_f64(seconds));
    }
    if let Some(level) = &global.log_level {
        let parsed = FfmpegLogLevel::parse(level)
            .ok_or(format!("unsupported --log-level: {level}"))?;
        options = options.with_transcoder_log_level(parsed);
    }
    Ok(options)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed =
            FfmpegLogLevel::parse(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framepack::set_ffmpeg_log_level(parsed);
    }
    Ok(())
}

fn warn(message: impl AsRef<str>) {
    eprintln!("{} {}", "warning:".yellow().bold(), message.as_ref().yellow());
}

/// Writes archive parts to disk and drives the terminal output.
struct CliEvents {
    out: PathBuf,
    overwrite: bool,
    verbose: bool,
    progress_bar: Option<ProgressBar>,
    pending: Vec<ArchivePart>,
    written: Vec<PathBuf>,
    write_error: Option<String>,
}

impl CliEvents {
    fn new(out: PathBuf, global: &GlobalOptions) -> Result<Self, Box<dyn std::error::Error>> {
        let progress_bar = if global.progress {
            let progress_bar = ProgressBar::new(0);
            let style = ProgressStyle::with_template(
                "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}",
            )?;
            progress_bar.set_style(style.progress_chars("##-"));
            Some(progress_bar)
        } else {
            None
        };

        Ok(Self {
            out,
            overwrite: global.overwrite,
            verbose: global.verbose,
            progress_bar,
            pending: Vec::new(),
            written: Vec::new(),
            write_error: None,
        })
    }

    fn write_part(&mut self, part: &ArchivePart) {
        let path = self.out.join(&part.filename);
        if path.exists() && !self.overwrite {
            self.write_error.get_or_insert(format!(
                "output file already exists: {} (use --overwrite)",
                path.display()
            ));
            return;
        }

        match fs::write(&path, &part.archive_bytes) {
            Ok(()) => {
                if self.verbose {
                    let line = format!(
                        "saved {} (frames {}-{}, {} bytes)",
                        path.display(),
                        part.start_frame_index,
                        part.end_frame_index,
                        part.archive_bytes.len()
                    );
                    match &self.progress_bar {
                        Some(progress_bar) => progress_bar.println(line),
                        None => eprintln!("{line}"),
                    }
                }
                self.written.push(path);
            }
            Err(error) => {
                self.write_error
                    .get_or_insert(format!("failed to write {}: {error}", path.display()));
            }
        }
    }
}

impl ExtractionEvents for CliEvents {
    fn on_engine_selected(&mut self, selection: &EngineSelection) {
        if self.verbose {
            eprintln!(
                "{} {} ({})",
                "engine:".cyan().bold(),
                selection.engine,
                selection.reason
            );
        }
    }

    fn on_progress(&mut self, progress: &Progress) {
        if let Some(progress_bar) = &self.progress_bar {
            if let Some(total) = progress.estimated_total {
                progress_bar.set_length(total);
            }
            progress_bar.set_position(progress.frames_done);
        }
    }

    fn on_restart(&mut self, notice: &RestartNotice) {
        warn(format!(
            "{} failed ({}); restarting with the {}",
            notice.failed_engine, notice.reason, notice.next_engine
        ));
        for path in self.written.drain(..) {
            if let Err(error) = fs::remove_file(&path) {
                warn(format!("could not remove {}: {error}", path.display()));
            }
        }
        self.pending.clear();
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.reset();
        }
    }

    fn on_part_ready(&mut self, part: ArchivePart) {
        if part.auto_download {
            self.write_part(&part);
        } else {
            self.pending.push(part);
        }
    }

    fn on_complete(&mut self, _total_frames: u64) {
        let pending = std::mem::take(&mut self.pending);
        for part in &pending {
            self.write_part(part);
        }
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.finish_with_message("done");
        }
    }

    fn on_error(&mut self, _message: &str) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.abandon();
        }
    }

    fn on_cancelled(&mut self) {
        self.pending.clear();
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.abandon_with_message("cancelled");
        }
    }
}

fn print_metadata(input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = MediaSource::open(input)?;
    let metadata = MediaProbe::probe(&source)?;

    if json {
        let payload = json!({
            "name": metadata.name,
            "kind": metadata.media_kind.as_str(),
            "size_bytes": metadata.size_bytes,
            "duration_seconds": metadata.duration_seconds,
            "width": metadata.width,
            "height": metadata.height,
            "fps": metadata.fps,
            "codec": metadata.codec,
            "frame_count": metadata.frame_count,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Name: {}", metadata.name);
        println!("Kind: {}", metadata.media_kind);
        println!("Size: {} bytes", metadata.size_bytes);
        println!("Dimensions: {}x{}", metadata.width, metadata.height);
        if metadata.duration_seconds > 0.0 {
            println!("Duration: {:.3}s", metadata.duration_seconds);
        }
        if let Some(fps) = metadata.fps {
            println!("Frame rate: {fps:.2} fps");
        }
        if let Some(codec) = &metadata.codec {
            println!("Codec: {codec}");
        }
        if let Some(frames) = metadata.frame_count {
            println!("Frames: {frames}");
        }
    }
    Ok(())
}

fn print_engine(input: &Path, engine: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let source = MediaSource::open(input)?;
    let metadata = MediaProbe::probe(&source)?;
    let mut settings = ExtractionSettings::new();
    if let Some(engine) = parse_engine(engine)? {
        settings = settings.with_engine(engine);
    }

    let probe = RuntimeCapabilityProbe::new();
    let selection = select_engine(&source, &settings, &metadata, &probe);
    let kind = source.sniff();
    let capabilities: Vec<_> = EngineChoice::ALL
        .into_iter()
        .map(|engine| {
            let capability = probe_capability(&probe, engine, kind, metadata.codec.as_deref());
            (engine, capability)
        })
        .collect();

    if json {
        let payload = json!({
            "kind": kind.as_str(),
            "engine": selection.engine.as_str(),
            "reason": selection.reason,
            "capabilities": capabilities.iter().map(|(engine, capability)| json!({
                "engine": engine.as_str(),
                "supported": capability.supported,
                "reason": capability.reason,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("Kind: {kind}");
        println!(
            "{} {} ({})",
            "Engine:".bold(),
            selection.engine.to_string().green(),
            selection.reason
        );
        for (engine, capability) in &capabilities {
            let verdict = if capability.supported {
                "yes".green()
            } else {
                "no".red()
            };
            println!("  {:<24} {verdict}  {}", engine.to_string(), capability.reason);
        }
    }
    Ok(())
}

fn extract(args: ExtractArgs, global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_settings(&args)?;
    let options = build_options(&args, global)?;

    if args.out.exists() && !args.out.is_dir() {
        return Err(format!("--out is not a directory: {}", args.out.display()).into());
    }
    fs::create_dir_all(&args.out)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let mut orchestrator = ExtractionOrchestrator::new(options);
        let selection = orchestrator.open(&args.input, settings)?;
        if global.verbose {
            eprintln!(
                "{} {} ({})",
                "selected:".cyan().bold(),
                selection.engine,
                selection.reason
            );
        }

        let token = orchestrator.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        let mut events = CliEvents::new(args.out.clone(), global)?;
        let result = orchestrator.start(&mut events).await;
        if let Some(error) = events.write_error.take() {
            return Err(error.into());
        }

        let summary = result?;
        let fallback_note = if summary.fell_back { " after fallback" } else { "" };
        println!(
            "{} {}",
            "success:".green().bold(),
            format!(
                "Extracted {} frame(s) into {} archive(s) in {} with the {}{fallback_note}",
                summary.total_frames,
                summary.parts,
                args.out.display(),
                summary.engine
            )
            .green()
        );
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => print_metadata(&input, json)?,
        Commands::Engine {
            input,
            engine,
            json,
        } => print_engine(&input, &engine, json)?,
        Commands::Extract(args) => extract(args, &cli.global)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framepack", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
