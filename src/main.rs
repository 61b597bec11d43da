//! Thumbsizer CLI - batch thumbnails under a byte-size ceiling

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tracing::info;

use thumbsizer::audit::{find_duplicates, scan_truncated, OwnerRecords};
use thumbsizer::config::FilterType;
use thumbsizer::{
    init_with_config, BatchExecutor, Config, FinalArtifact, ImageSource, ProgressTracker,
    SearchStrategy,
};

/// Exit code when the batch completed but some images failed
const EXIT_TASK_FAILURES: i32 = 2;

/// Thumbsizer - batch thumbnails under a byte-size ceiling
#[derive(Parser)]
#[command(
    name = "thumbsizer",
    version,
    about = "Batch thumbnail generator that keeps every thumbnail under a byte-size ceiling",
    long_about = "Thumbsizer turns a directory of full-resolution images into same-named \
                  thumbnails. Each thumbnail is found by searching over a scale ratio until \
                  its encoded size sits just under the ceiling."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input directory
    #[arg(short, long, value_name = "DIR", global = true)]
    input: Option<PathBuf>,

    /// Output directory (created if missing)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Byte-size ceiling, e.g. 204800, 200KiB, 1MiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    ceiling: Option<u64>,

    /// Ratio bracket width at which the search stops (0-1)
    #[arg(long, value_name = "EPSILON")]
    precision: Option<f64>,

    /// Search strategy
    #[arg(long, value_enum, value_name = "STRATEGY")]
    strategy: Option<CliStrategy>,

    /// Shrink factor per step for the fixed-step strategy
    #[arg(long, value_name = "FACTOR")]
    step_factor: Option<f64>,

    /// Trial limit for the fixed-step strategy
    #[arg(long, value_name = "COUNT")]
    max_steps: Option<u32>,

    /// Leave the best under-ceiling trial on disk instead of the last trial
    #[arg(long)]
    keep_best: bool,

    /// Resampling filter
    #[arg(long, value_enum, value_name = "FILTER")]
    filter: Option<CliFilter>,

    /// JPEG quality (1-100)
    #[arg(short, long, value_name = "QUALITY")]
    quality: Option<u8>,

    /// Number of worker threads (default: one per logical CPU)
    #[arg(short, long, value_name = "COUNT", global = true)]
    threads: Option<usize>,

    /// Configuration file path (.toml or .yaml)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short = 'R', long, global = true)]
    recursive: bool,

    /// Fail on truncated images instead of decoding what is there
    #[arg(long, global = true)]
    strict: bool,

    /// Show what would be processed without actually processing
    #[arg(long)]
    dry_run: bool,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Report images that only decode with truncation tolerance
    Scan,
    /// Group images with identical average hashes
    Dupes {
        /// CSV with `file_name` and `name` columns naming each image's owner
        #[arg(long, value_name = "FILE")]
        records: Option<PathBuf>,
    },
    /// Validate configuration file
    Config {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path; the extension picks TOML or YAML
        #[arg(short, long, default_value = "thumbsizer.toml")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliStrategy {
    Binary,
    FixedStep,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<CliFilter> for FilterType {
    fn from(filter: CliFilter) -> Self {
        match filter {
            CliFilter::Nearest => FilterType::Nearest,
            CliFilter::Triangle => FilterType::Triangle,
            CliFilter::CatmullRom => FilterType::CatmullRom,
            CliFilter::Gaussian => FilterType::Gaussian,
            CliFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Parse a byte size with an optional binary suffix (e.g., "200KiB")
fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, suffix) = s.split_at(split);

    let value = digits
        .parse::<u64>()
        .map_err(|_| format!("Invalid size '{}'", s))?;
    let multiplier = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1024,
        "m" | "mb" | "mib" => 1024 * 1024,
        other => return Err(format!("Unknown size suffix '{}' (use B, KiB or MiB)", other)),
    };

    match value.checked_mul(multiplier) {
        Some(0) => Err("Size must be greater than 0".to_string()),
        Some(bytes) => Ok(bytes),
        None => Err(format!("Size '{}' is too large", s)),
    }
}

fn main() {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    // These work on config files and need no input directory
    match &cli.command {
        Some(Commands::Config { file }) => return validate_config_file(file).map(|()| 0),
        Some(Commands::ExampleConfig { output }) => {
            return generate_example_config(output).map(|()| 0)
        }
        _ => {}
    }

    let config = build_config(&cli)?;
    init_with_config(&config)?;

    let input_dir = config
        .batch
        .input_dir
        .clone()
        .context("An input directory is required (--input or batch.input_dir)")?;

    let source = ImageSource::new(config.decoder.clone());
    let inputs = source
        .enumerate(&input_dir, config.batch.recursive)
        .with_context(|| format!("Cannot list {}", input_dir.display()))?;
    info!("Found {} images in {:?}", inputs.len(), input_dir);

    match &cli.command {
        Some(Commands::Scan) => run_scan(&cli, &config, &source, &inputs),
        Some(Commands::Dupes { records }) => {
            run_dupes(&cli, &config, &source, &inputs, records.as_deref())
        }
        _ => run_batch(&cli, &config, &input_dir, inputs),
    }
}

/// Load the config file, if any, and apply command-line overrides
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(input) = &cli.input {
        config.batch.input_dir = Some(input.clone());
    }
    if let Some(output) = &cli.output {
        config.batch.output_dir = Some(output.clone());
    }
    if cli.threads.is_some() {
        config.batch.workers = cli.threads;
    }
    if cli.recursive {
        config.batch.recursive = true;
    }
    if cli.strict {
        config.decoder.tolerate_truncated = false;
    }

    let thumbs = &mut config.thumbnails;
    if let Some(ceiling) = cli.ceiling {
        thumbs.ceiling_bytes = ceiling;
    }
    if let Some(precision) = cli.precision {
        thumbs.precision = precision;
    }
    if let Some(quality) = cli.quality {
        thumbs.jpeg_quality = quality;
    }
    if let Some(filter) = cli.filter {
        thumbs.filter = filter.into();
    }
    if cli.keep_best {
        thumbs.final_artifact = FinalArtifact::BestAccepted;
    }

    match cli.strategy {
        Some(CliStrategy::Binary) => thumbs.strategy = SearchStrategy::BinarySearch,
        Some(CliStrategy::FixedStep) => {
            if !matches!(thumbs.strategy, SearchStrategy::FixedStep { .. }) {
                thumbs.strategy = SearchStrategy::fixed_step();
            }
        }
        None => {}
    }
    if let SearchStrategy::FixedStep {
        factor,
        max_iterations,
    } = &mut thumbs.strategy
    {
        if let Some(step_factor) = cli.step_factor {
            *factor = step_factor;
        }
        if let Some(max_steps) = cli.max_steps {
            *max_iterations = max_steps;
        }
    } else if cli.step_factor.is_some() || cli.max_steps.is_some() {
        bail!("--step-factor and --max-steps need --strategy fixed-step");
    }

    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

fn progress_for(cli: &Cli, total: usize) -> Arc<ProgressTracker> {
    if cli.json || cli.quiet {
        Arc::new(ProgressTracker::hidden(total as u64))
    } else {
        Arc::new(ProgressTracker::new(total as u64))
    }
}

/// Run the thumbnail batch
fn run_batch(
    cli: &Cli,
    config: &Config,
    input_dir: &Path,
    inputs: Vec<PathBuf>,
) -> anyhow::Result<i32> {
    let output_dir = config
        .batch
        .output_dir
        .clone()
        .context("An output directory is required (--output or batch.output_dir)")?;

    if inputs.is_empty() {
        bail!("No supported images found in {}", input_dir.display());
    }

    if cli.dry_run {
        println!("{} files would be processed:", style(inputs.len()).bold());
        for (input, output) in BatchExecutor::plan(input_dir, &inputs, &output_dir) {
            println!("  {} -> {}", input.display(), output.display());
        }
        return Ok(0);
    }

    let executor = BatchExecutor::from_config(config)?;
    let progress = progress_for(cli, inputs.len());
    let report = executor.run(input_dir, inputs, &output_dir, &progress)?;
    progress.finish();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_summary();
    }

    Ok(if report.failed > 0 { EXIT_TASK_FAILURES } else { 0 })
}

/// Strictly decode every input and list the failures
fn run_scan(
    cli: &Cli,
    config: &Config,
    source: &ImageSource,
    inputs: &[PathBuf],
) -> anyhow::Result<i32> {
    let progress = progress_for(cli, inputs.len());
    let findings = scan_truncated(source, inputs, config.batch.worker_count(), &progress)?;
    progress.finish();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&findings)?);
    } else if findings.is_empty() {
        println!("{}: no truncated images in {} files", style("Clean").green().bold(), inputs.len());
    } else {
        for finding in &findings {
            println!("Truncated image: {} ({})", finding.path.display(), finding.message);
        }
    }

    Ok(if findings.is_empty() { 0 } else { EXIT_TASK_FAILURES })
}

/// Hash every input and print the groups that collide
fn run_dupes(
    cli: &Cli,
    config: &Config,
    source: &ImageSource,
    inputs: &[PathBuf],
    records: Option<&Path>,
) -> anyhow::Result<i32> {
    let records = records.map(OwnerRecords::from_csv).transpose()?;
    let progress = progress_for(cli, inputs.len());
    let groups = find_duplicates(
        source,
        inputs,
        records.as_ref(),
        config.batch.worker_count(),
        &progress,
    )?;
    progress.finish();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&groups)?);
        return Ok(0);
    }

    if groups.is_empty() {
        println!("{}: no duplicate images", style("Clean").green().bold());
    }
    for group in &groups {
        println!("{} ({})", style("Duplicate images:").bold(), group.hash);
        for member in &group.members {
            let name = member.path.file_name().unwrap_or(member.path.as_os_str());
            println!(
                "  {} by {}",
                name.to_string_lossy(),
                member.owner.as_deref().unwrap_or("unknown")
            );
        }
    }

    Ok(0)
}

/// Validate configuration file
fn validate_config_file(file_path: &Path) -> anyhow::Result<()> {
    let config = Config::from_file(file_path)?;
    config.validate()?;

    println!("{}: Configuration file is valid", style("Success").green().bold());
    println!(
        "Ceiling: {} bytes, precision: {}, strategy: {:?}",
        config.thumbnails.ceiling_bytes, config.thumbnails.precision, config.thumbnails.strategy
    );

    Ok(())
}

/// Generate example configuration file
fn generate_example_config(output_path: &Path) -> anyhow::Result<()> {
    Config::default().to_file(output_path)?;

    println!(
        "{}: Generated example configuration: {}",
        style("Success").green().bold(),
        output_path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("204800"), Ok(204_800));
        assert_eq!(parse_size("200KiB"), Ok(204_800));
        assert_eq!(parse_size("200k"), Ok(204_800));
        assert_eq!(parse_size("1MiB"), Ok(1_048_576));
        assert_eq!(parse_size("512 B"), Ok(512));
        assert!(parse_size("0").is_err());
        assert!(parse_size("12GB").is_err());
        assert!(parse_size("KiB").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "thumbsizer",
            "-i",
            "fulls",
            "-o",
            "thumbs",
            "--ceiling",
            "100KiB",
            "--strategy",
            "fixed-step",
            "--step-factor",
            "0.5",
            "--keep-best",
            "-t",
            "2",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.batch.input_dir, Some(PathBuf::from("fulls")));
        assert_eq!(config.thumbnails.ceiling_bytes, 102_400);
        assert_eq!(
            config.thumbnails.strategy,
            SearchStrategy::FixedStep {
                factor: 0.5,
                max_iterations: 64
            }
        );
        assert_eq!(config.thumbnails.final_artifact, FinalArtifact::BestAccepted);
        assert_eq!(config.batch.workers, Some(2));
    }

    #[test]
    fn test_step_factor_needs_fixed_step() {
        let cli = Cli::parse_from(["thumbsizer", "-i", "fulls", "--step-factor", "0.5"]);
        assert!(build_config(&cli).is_err());
    }
}
