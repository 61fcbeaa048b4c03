use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use layer_crop::{
    ComposeOptions, CropAction, CropEngine, CropOptions, DetectionCatalog, LayerComposer,
    ProcessResult,
};

#[derive(Parser)]
#[command(
    name = "layer-crop",
    about = "Crop soft-edged regions and merge them back as ordered layers",
    version,
    after_help = "Typical flow: run `crop` once per layer into <dir>/<layer>/, copy the base \
                  images to <dir>/origin/, then `merge -i <dir> --layers ...`."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crop detected regions out of an image or a directory of images
    Crop(CropArgs),
    /// Restore layer crops and composite them over the base images
    Merge(MergeArgs),
}

#[derive(Args, Clone, Copy)]
struct Verbosity {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct CropArgs {
    /// Input image file or directory
    input: PathBuf,

    /// JSON file mapping image names to detections
    #[arg(short, long)]
    detections: PathBuf,

    /// JSON settings file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Layer name used in output file names
    #[arg(short, long)]
    mode: Option<String>,

    /// Only use detections with this label
    #[arg(short, long)]
    filter: Option<String>,

    /// What to produce: mask, force-rect or adaptive
    #[arg(short, long)]
    action: Option<CropAction>,

    /// Width of the mask fade band in pixels
    #[arg(short, long)]
    blur_size: Option<u32>,

    /// Regions per image in mask mode
    #[arg(long)]
    top_n: Option<usize>,

    /// Target width for force-rect and adaptive crops
    #[arg(long)]
    width: Option<u32>,

    /// Target height for force-rect and adaptive crops
    #[arg(long)]
    height: Option<u32>,

    /// Resize force-rect crops to the target size
    #[arg(long)]
    resize: bool,

    /// Background image placed under transparent force-rect crops
    #[arg(long)]
    bg: Option<PathBuf>,

    /// Do not write the JSON metadata
    #[arg(long)]
    no_info: bool,

    /// List the files that would be written
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    verbosity: Verbosity,
}

impl CropArgs {
    fn options(&self) -> layer_crop::Result<CropOptions> {
        let mut opts = match &self.config {
            Some(path) => CropOptions::from_file(path)?,
            None => CropOptions::default(),
        };
        if let Some(o) = &self.output {
            opts.output_dir.clone_from(o);
        }
        if let Some(m) = &self.mode {
            opts.mode.clone_from(m);
        }
        if self.filter.is_some() {
            opts.filter.clone_from(&self.filter);
        }
        if let Some(a) = self.action {
            opts.action = a;
        }
        if let Some(b) = self.blur_size {
            opts.blur_size = b;
        }
        if let Some(n) = self.top_n {
            opts.top_n = n;
        }
        if let Some(w) = self.width {
            opts.crop_width = w;
        }
        if let Some(h) = self.height {
            opts.crop_height = h;
        }
        if self.bg.is_some() {
            opts.background.clone_from(&self.bg);
        }
        opts.resize |= self.resize;
        opts.save_info &= !self.no_info;
        opts.dry_run |= self.dry_run;
        Ok(opts)
    }
}

#[derive(Args)]
struct MergeArgs {
    /// Folder holding origin/ and one folder per layer
    #[arg(short, long, default_value = ".")]
    input: PathBuf,

    /// Layer names, bottom first
    #[arg(short, long, num_args = 1.., required = true)]
    layers: Vec<String>,

    /// Output folder
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Only restore the layers; skip merging
    #[arg(long)]
    no_merge: bool,

    /// Report layer coverage without writing anything
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    verbosity: Verbosity,
}

fn init_logging(level: LevelFilter) {
    // An already-installed logger stays in place.
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level.as_str()),
    )
    .try_init();
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Crop(args) => {
            init_logging(args.verbosity.level());
            run_crop(&args)
        }
        Command::Merge(args) => {
            init_logging(args.verbosity.level());
            run_merge(&args)
        }
    };
    process::exit(code);
}

fn run_crop(args: &CropArgs) -> i32 {
    let opts = match args.options() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: Invalid settings: {e}");
            return 1;
        }
    };

    if !args.input.exists() {
        eprintln!("Error: Input path does not exist: {}", args.input.display());
        return 1;
    }

    let catalog = match DetectionCatalog::from_file(&args.detections) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: Failed to load detections: {e}");
            return 1;
        }
    };

    let quiet = args.verbosity.quiet;
    let verbose = args.verbosity.verbose;
    if !quiet {
        eprintln!(
            "Action: {}, mode: {}, filter: {}, blur: {}{}",
            opts.action,
            opts.mode,
            opts.filter_label().unwrap_or("none"),
            opts.blur_size,
            if opts.dry_run { " (dry run)" } else { "" }
        );
        eprintln!();
    }

    let engine = match CropEngine::new(opts) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            return 1;
        }
    };

    let results = if args.input.is_dir() {
        engine.process_directory(&args.input, &catalog)
    } else {
        vec![engine.process_file(&args.input, &catalog)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, quiet, verbose || engine.options().dry_run);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    i32::from(fail_count > 0)
}

fn run_merge(args: &MergeArgs) -> i32 {
    let quiet = args.verbosity.quiet;
    let composer = match LayerComposer::new(ComposeOptions {
        input_dir: args.input.clone(),
        layers: args.layers.clone(),
        output_dir: args.output.clone(),
        merge: !args.no_merge,
    }) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    if args.dry_run {
        for c in composer.plan() {
            eprintln!(
                "[PLAN] {}: {}/{} images ({:.1}%)",
                c.layer,
                c.covered,
                c.total,
                c.percent()
            );
        }
        return 0;
    }

    let (processed, summary) = composer.run();
    if !quiet {
        for (layer, bases) in &processed {
            eprintln!("[OK] {layer}: {} restored", bases.len());
        }
    }

    let Some(summary) = summary else {
        return 0;
    };
    if !quiet {
        eprintln!();
        eprint!("[Summary] Merged: {}", summary.merged);
        if summary.skipped > 0 {
            eprint!(", Skipped: {}", summary.skipped);
        }
        if summary.failed > 0 {
            eprint!(", Failed: {}", summary.failed);
        }
        eprintln!(" (Total: {})", summary.total);
    }

    i32::from(summary.failed > 0)
}

fn print_result(result: &ProcessResult, quiet: bool, list_outputs: bool) {
    if quiet && result.success {
        return;
    }

    let filename = display_name(&result.path);

    if result.skipped {
        if !quiet {
            eprintln!("[SKIP] {filename}: {}", result.message);
        }
    } else if result.success {
        if !quiet {
            eprintln!("[OK] {filename}: {}", result.message);
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if list_outputs {
        for out in &result.outputs {
            eprintln!("  -> {}", out.display());
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
