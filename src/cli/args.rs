//! Command-line argument parsing for CellScope
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::api::Request;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// CellScope - blood cell classification with a local inference server
#[derive(Parser, Debug)]
#[command(name = "cellscope")]
#[command(version)]
#[command(about = "Locate, validate and run the blood cell classifier", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print raw API responses as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Search the standard locations for model.h5
    Locate,

    /// Pick a model file interactively
    Browse,

    /// Check a model file's format, signature and size
    Validate {
        path: PathBuf,
    },

    /// Load a model (located automatically when no path is given)
    Load {
        path: Option<PathBuf>,
    },

    /// Classify an image
    Analyze {
        /// Image file, data URL or base64
        image: String,

        /// Model to load first
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Show the inference runtime environment
    Env,

    /// Run system diagnostics and health checks
    Doctor,

    /// Display current configuration
    Config,
}

impl Commands {
    /// Direct API equivalent, for commands that map onto a single request
    pub fn request(&self) -> Option<Request> {
        match self {
            Commands::Locate => Some(Request::LocateModel),
            Commands::Browse => Some(Request::BrowseForModel),
            Commands::Validate { path } => Some(Request::ValidateModel { path: path.clone() }),
            Commands::Load { path } => Some(Request::LoadModel { path: path.clone() }),
            Commands::Env => Some(Request::GetEnvironmentInfo),
            Commands::Analyze { .. } | Commands::Doctor | Commands::Config => None,
        }
    }
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Default tracing filter for this level
    pub fn log_directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "cellscope=info",
            Verbosity::VeryVerbose => "cellscope=debug",
        }
    }

    /// Check if should show spinners
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should print the telemetry summary
    pub fn show_summary(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
