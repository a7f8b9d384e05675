//! Command dispatch and exit-code mapping.
//!
//! Diff commands report through the exit code: 0 means the sides match,
//! 1 means differences were found and written. Merge commands persist the
//! target only on success; a conflict exits 3 with an `E_CONFLICT` line and
//! every other failure exits 2 with `E_OPERATION`.

use clap::{Parser, Subcommand};
use deltadb_core::{
    diff::{
        aligned, equal,
        merge::{MergeOptions, merge_aligned, merge_equal},
    },
    error::DiffError,
    store,
    workspace::Workspace,
};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

const EXIT_DIFFERENCES: u8 = 1;
const EXIT_OPERATION: u8 = 2;
const EXIT_CONFLICT: u8 = 3;

///
/// Cli
///

#[derive(Parser)]
#[command(name = "deltadb")]
#[command(version)]
#[command(about = "Structural diff, alignment and merge for typed-record workspaces")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operations on workspace instance data
    Instance {
        #[command(subcommand)]
        command: InstanceCommands,
    },
}

#[derive(Subcommand)]
enum InstanceCommands {
    /// Diff two workspaces on the same schema
    Diff {
        /// Workspace root of the left (base) side
        left: PathBuf,

        /// Workspace root of the right (changed) side
        right: PathBuf,

        /// Where to write the diff workspace (default: <right>.instance-diff)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Diff two workspaces on different schemas through an alignment catalog
    DiffAligned {
        /// Workspace root of the left (base) side
        left: PathBuf,

        /// Workspace root of the right (changed) side
        right: PathBuf,

        /// Workspace root of the alignment catalog
        alignment: PathBuf,

        /// Where to write the diff workspace (default: <right>.instance-diff-aligned)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Replay an equal-model diff onto a workspace
    Merge {
        /// Workspace root of the merge target
        target: PathBuf,

        /// Workspace root of the diff to replay
        diff: PathBuf,

        /// Treat validation warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// Replay an aligned diff onto a workspace carrying the left-side schema
    MergeAligned {
        /// Workspace root of the merge target
        target: PathBuf,

        /// Workspace root of the diff to replay
        diff: PathBuf,

        /// Treat validation warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Instance { command } => instance(command),
    }
}

fn instance(command: InstanceCommands) -> ExitCode {
    match command {
        InstanceCommands::Diff { left, right, out } => {
            let out = out.unwrap_or_else(|| suffixed(&right, "instance-diff"));
            report_diff(run_diff(&left, &right, None, &out))
        }
        InstanceCommands::DiffAligned {
            left,
            right,
            alignment,
            out,
        } => {
            let out = out.unwrap_or_else(|| suffixed(&right, "instance-diff-aligned"));
            report_diff(run_diff(&left, &right, Some(&alignment), &out))
        }
        InstanceCommands::Merge {
            target,
            diff,
            strict,
        } => report_merge(run_merge(&target, &diff, strict, false)),
        InstanceCommands::MergeAligned {
            target,
            diff,
            strict,
        } => report_merge(run_merge(&target, &diff, strict, true)),
    }
}

fn report_diff(result: Result<bool, DiffError>) -> ExitCode {
    match result {
        Ok(true) => ExitCode::from(EXIT_DIFFERENCES),
        Ok(false) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("E_OPERATION: {err}");
            ExitCode::from(EXIT_OPERATION)
        }
    }
}

fn report_merge(result: Result<(), DiffError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_conflict() => {
            eprintln!("E_CONFLICT: {err}");
            ExitCode::from(EXIT_CONFLICT)
        }
        Err(err) => {
            eprintln!("E_OPERATION: {err}");
            ExitCode::from(EXIT_OPERATION)
        }
    }
}

fn run_diff(
    left: &Path,
    right: &Path,
    alignment: Option<&Path>,
    out: &Path,
) -> Result<bool, DiffError> {
    log::debug!("diffing {} against {}", left.display(), right.display());
    let left_ws = load(left)?;
    let right_ws = load(right)?;

    let diff = match alignment {
        Some(path) => {
            let alignment_ws = load(path)?;
            let built = aligned::build(&left_ws, &right_ws, &alignment_ws)?;
            store::save(&built.workspace, out)?;
            built.has_differences
        }
        None => {
            let built = equal::build(&left_ws, &right_ws)?;
            store::save(&built.workspace, out)?;
            built.has_differences
        }
    };

    println!("wrote {}", out.display());

    Ok(diff)
}

fn run_merge(
    target: &Path,
    diff: &Path,
    strict: bool,
    is_aligned: bool,
) -> Result<(), DiffError> {
    let loaded = store::load(target, false)?;
    let mut workspace = loaded.workspace;
    let diff_ws = load(diff)?;

    let options = MergeOptions { strict };
    if is_aligned {
        merge_aligned(&mut workspace, &diff_ws, options)?;
    } else {
        merge_equal(&mut workspace, &diff_ws, options)?;
    }

    // Persist only once the merge has validated and passed its postcondition.
    store::save(&workspace, &loaded.root)?;
    println!("merged into {}", loaded.root.display());

    Ok(())
}

fn load(path: &Path) -> Result<Workspace, DiffError> {
    Ok(store::load(path, false)?.workspace)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);

    PathBuf::from(os)
}

///
/// TESTS
///
