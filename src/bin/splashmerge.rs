use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use splashmerge::{
    AreaModel, BatchSummary, CoverageThreshold, Redactor, Resolution, SplashConfig,
    batch::{self, UnmergeOptions},
    rank::LEGACY_SQ_MI_PER_PIXEL,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "splashmerge", version, about = "Merge, rank and clean up radio splash overlays")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Combine every container in a directory into one overlap map.
    Merge(MergeArgs),
    /// Print a CSV ranking of containers by covered area.
    Rank(RankArgs),
    /// Remove identifying metadata from containers in place.
    Strip(StripArgs),
    /// Split a combined container into one container per entry.
    Unmerge(UnmergeArgs),
    /// Pack the containers of a directory into one combined container.
    Bundle(BundleArgs),
}

#[derive(Args, Debug)]
struct Tuning {
    /// JSON settings file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Mask values above this count as covered (0-255).
    #[arg(long)]
    threshold: Option<u8>,

    /// Worker threads.
    #[arg(long)]
    threads: Option<usize>,
}

impl Tuning {
    fn load(&self) -> anyhow::Result<SplashConfig> {
        let mut cfg = match &self.config {
            Some(path) => SplashConfig::from_json_file(path)?,
            None => SplashConfig::default(),
        };
        if let Some(t) = self.threshold {
            cfg.coverage_threshold = CoverageThreshold(t);
        }
        if self.threads.is_some() {
            cfg.threads = self.threads;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Parser, Debug)]
struct MergeArgs {
    /// Directory holding the input containers.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Output container (default: CombinedSanitized.kmz inside --dir).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Document name of the output.
    #[arg(long, default_value = batch::DEFAULT_MERGE_TITLE)]
    title: String,

    /// Fixed grid density instead of the finest input resolution.
    #[arg(long)]
    pixels_per_degree: Option<f64>,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Parser, Debug)]
struct RankArgs {
    /// Directory holding the input containers.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// CSV output file (default: stdout).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Use the fixed per-pixel area of the old ranking scripts.
    #[arg(long)]
    legacy_area: bool,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Parser, Debug)]
struct StripArgs {
    /// Directory holding the containers to strip.
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

#[derive(Parser, Debug)]
struct UnmergeArgs {
    /// Combined container (.kmz or .kml).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Directory receiving one folder per group.
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Replace containers that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Drop identifying metadata from the written containers.
    #[arg(long)]
    redact: bool,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Parser, Debug)]
struct BundleArgs {
    /// Directory holding the input containers.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Output combined container.
    #[arg(long)]
    out: PathBuf,

    /// Group (folder) name the entries are nested under.
    #[arg(long, default_value = "Bundle")]
    group: String,

    #[command(flatten)]
    tuning: Tuning,
}

fn main() -> anyhow::Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let summary = match cli.cmd {
        Command::Merge(args) => cmd_merge(args)?,
        Command::Rank(args) => cmd_rank(args)?,
        Command::Strip(args) => cmd_strip(args)?,
        Command::Unmerge(args) => cmd_unmerge(args)?,
        Command::Bundle(args) => cmd_bundle(args)?,
    };

    if !summary.skipped.is_empty() {
        eprintln!("{}", summary.skipped.summary());
        for s in summary.skipped.entries() {
            eprintln!("  {}: {}", s.source, s.error);
        }
    }
    Ok(if summary.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn containers_in(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let found = batch::discover_containers(dir)?;
    if found.is_empty() {
        tracing::warn!(dir = %dir.display(), "no .kmz files found");
    }
    Ok(found)
}

fn cmd_merge(args: MergeArgs) -> anyhow::Result<BatchSummary> {
    let mut cfg = args.tuning.load()?;
    if let Some(ppd) = args.pixels_per_degree {
        cfg.resolution = Resolution::PixelsPerDegree { lat: ppd, lon: ppd };
        cfg.validate()?;
    }
    let out = args
        .out
        .unwrap_or_else(|| args.dir.join(batch::DEFAULT_MERGE_OUTPUT));
    let inputs = containers_in(&args.dir)?;
    let summary = batch::run_merge(&inputs, &out, &args.title, &cfg)?;
    eprintln!("merged {} containers into {}", summary.processed, out.display());
    Ok(summary)
}

fn cmd_rank(args: RankArgs) -> anyhow::Result<BatchSummary> {
    let mut cfg = args.tuning.load()?;
    if args.legacy_area {
        cfg.area = AreaModel::FixedPerPixel {
            sq_mi: LEGACY_SQ_MI_PER_PIXEL,
        };
    }
    let inputs = containers_in(&args.dir)?;
    match &args.out {
        Some(path) => {
            let f = File::create(path)
                .with_context(|| format!("create rank report '{}'", path.display()))?;
            Ok(batch::run_rank(&inputs, &cfg, BufWriter::new(f))?)
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            let summary = batch::run_rank(&inputs, &cfg, &mut lock)?;
            lock.flush().context("flush stdout")?;
            Ok(summary)
        }
    }
}

fn cmd_strip(args: StripArgs) -> anyhow::Result<BatchSummary> {
    let inputs = containers_in(&args.dir)?;
    Ok(batch::run_strip(&inputs, &Redactor::default())?)
}

fn cmd_unmerge(args: UnmergeArgs) -> anyhow::Result<BatchSummary> {
    let cfg = args.tuning.load()?;
    let opts = UnmergeOptions {
        overwrite: args.overwrite,
        redact: args.redact.then(Redactor::default),
        max_grid_cells: cfg.max_grid_cells,
    };
    let summary = batch::run_unmerge(&args.in_path, &args.out, &opts)?;
    eprintln!("wrote {} entries under {}", summary.processed, args.out.display());
    Ok(summary)
}

fn cmd_bundle(args: BundleArgs) -> anyhow::Result<BatchSummary> {
    let cfg = args.tuning.load()?;
    let inputs = containers_in(&args.dir)?;
    let summary = batch::run_bundle(&inputs, &args.group, &args.out, &cfg)?;
    eprintln!("bundled {} containers into {}", summary.processed, args.out.display());
    Ok(summary)
}
