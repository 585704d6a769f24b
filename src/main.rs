use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;
use unipatch::{ApplyOptions, ApplySummary, CanPatch, PatchSet, DEFAULT_SEARCH_WINDOW};

const EXIT_NOT_APPLIED: u8 = 1;
const EXIT_NOT_A_PATCH: u8 = 2;
const EXIT_FAILURE: u8 = 3;

#[derive(Parser)]
#[command(name = "unipatch", about = "Unified diff parser and applier")]
struct Cli {
    /// More log output (-v info, -vv debug)
    #[arg(long, short, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only report errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct PatchInput {
    /// Path to the patch file, or `-` to read it from stdin
    #[arg(long, short = 'i')]
    patch: PathBuf,
}

#[derive(Args)]
struct TreeArgs {
    /// Directory the patch paths are relative to
    #[arg(long, short = 'd')]
    directory: Option<PathBuf>,
    /// Number of leading path components to strip from patch paths
    #[arg(long, short = 'p', default_value_t = 0)]
    strip: usize,
    /// Lines to search on each side of a hunk's stated position
    #[arg(long, default_value_t = DEFAULT_SEARCH_WINDOW)]
    window: usize,
}

impl TreeArgs {
    fn options(&self) -> ApplyOptions {
        let mut options = ApplyOptions::default()
            .with_strip(self.strip)
            .with_search_window(self.window);
        if let Some(dir) = &self.directory {
            options = options.with_root(dir);
        }
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a patch to a directory tree
    Apply {
        #[command(flatten)]
        input: PatchInput,
        #[command(flatten)]
        tree: TreeArgs,
    },
    /// Undo a previously applied patch
    Revert {
        #[command(flatten)]
        input: PatchInput,
        #[command(flatten)]
        tree: TreeArgs,
    },
    /// Check whether a file can be patched without touching it
    Check {
        #[command(flatten)]
        input: PatchInput,
        /// Only consider the patch entry at this position (0-based)
        #[arg(long)]
        index: Option<usize>,
        /// File to check, named as the patch names its source
        file: PathBuf,
    },
    /// Print a per-file summary of insertions and deletions
    Diffstat {
        #[command(flatten)]
        input: PatchInput,
    },
    /// Print the parsed patch
    Show {
        #[command(flatten)]
        input: PatchInput,
        /// Print the parsed structure as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli.command, cli.quiet).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, quiet: bool) -> Result<ExitCode> {
    match command {
        Commands::Apply { input, tree } => patch_tree(&input, &tree, false, quiet).await,
        Commands::Revert { input, tree } => patch_tree(&input, &tree, true, quiet).await,
        Commands::Check { input, index, file } => {
            let set = load(&input).await?;
            if let Some(code) = reject_unusable(&set) {
                return Ok(code);
            }
            let answer = set.can_patch(&file, index)?;
            let (message, code) = match answer {
                CanPatch::Yes => ("can be patched", ExitCode::SUCCESS),
                CanPatch::No => ("does not match the patch", EXIT_NOT_APPLIED.into()),
                CanPatch::NotFound => ("is not a source of this patch", EXIT_NOT_APPLIED.into()),
            };
            if !quiet {
                println!("{}: {}", file.display(), message);
            }
            Ok(code)
        }
        Commands::Diffstat { input } => {
            let set = load(&input).await?;
            if let Some(code) = reject_unusable(&set) {
                return Ok(code);
            }
            println!("{}", set.diffstat());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show { input, json } => {
            let set = load(&input).await?;
            if let Some(code) = reject_unusable(&set) {
                return Ok(code);
            }
            let mut stdout = std::io::stdout().lock();
            if json {
                serde_json::to_writer_pretty(&mut stdout, &set)
                    .context("Failed to serialize patch set")?;
                writeln!(stdout)?;
            } else {
                stdout.write_all(&set.to_bytes())?;
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn patch_tree(
    input: &PatchInput,
    tree: &TreeArgs,
    revert: bool,
    quiet: bool,
) -> Result<ExitCode> {
    let set = load(input).await?;
    if let Some(code) = reject_unusable(&set) {
        return Ok(code);
    }
    let options = tree.options();
    let verb = if revert { "Reverting" } else { "Applying" };

    if !quiet {
        println!("{verb} patch...");
        println!("  Patch: {}", input.patch.display());
        println!("  Dialect: {}", set.dialect);
        if let Some(dir) = &options.root {
            println!("  Directory: {}", dir.display());
        }
    }

    let start = Instant::now();
    let summary = tokio::task::spawn_blocking(move || {
        if revert {
            set.revert_with(&options)
        } else {
            set.apply_with(&options)
        }
    })
    .await??;
    let elapsed = start.elapsed();

    for (outcome, err) in summary.failures() {
        eprintln!("error: file {}: {err}", outcome.index + 1);
    }
    if !quiet {
        print_summary(&summary, revert, elapsed.as_secs_f64());
    }

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NOT_APPLIED)
    })
}

fn print_summary(summary: &ApplySummary, revert: bool, seconds: f64) {
    let done = if revert { "reverted" } else { "applied" };
    if summary.is_success() {
        println!("\nPatch {done} successfully!");
    } else {
        println!("\nPatch was not {done} cleanly.");
    }
    println!("  Files patched: {}", summary.files_patched);
    println!("  Files created: {}", summary.files_created);
    println!("  Files deleted: {}", summary.files_deleted);
    println!("  Already patched: {}", summary.already_patched);
    println!("  Files failed: {}", summary.files_failed);
    println!("  Time elapsed: {seconds:.3}s");
}

/// Read and parse the patch source. Parsing runs off the async runtime.
async fn load(input: &PatchInput) -> Result<PatchSet> {
    if input.patch.as_os_str() == "-" {
        let mut data = Vec::new();
        tokio::io::stdin()
            .read_to_end(&mut data)
            .await
            .context("Failed to read patch from stdin")?;
        return Ok(tokio::task::spawn_blocking(move || PatchSet::parse(data)).await?);
    }

    let path = input.patch.clone();
    let set = tokio::task::spawn_blocking(move || PatchSet::from_path(&path))
        .await?
        .with_context(|| format!("Failed to load patch: {}", input.patch.display()))?;
    Ok(set)
}

fn reject_unusable(set: &PatchSet) -> Option<ExitCode> {
    if set.is_empty() {
        eprintln!("error: not a patch (no diff content found)");
        return Some(ExitCode::from(EXIT_NOT_A_PATCH));
    }
    if set.errors > 0 {
        eprintln!("error: patch has {} parse error(s)", set.errors);
        return Some(ExitCode::from(EXIT_NOT_A_PATCH));
    }
    if set.warnings > 0 {
        tracing::warn!(warnings = set.warnings, "patch was corrected while parsing");
    }
    None
}
