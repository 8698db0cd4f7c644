// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use edgefn::output::OutputMode;
use edgefn::types::FunctionSlug;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "edgefn")]
#[command(about = "Bundle and deploy edge functions")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new edgefn.yml configuration file
    Init {
        /// Project to deploy to
        #[arg(long)]
        project_ref: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Deploy functions to a project
    Deploy(DeployArgs),

    /// Bundle one function into a local file
    Bundle(BundleArgs),

    /// List the functions deployed to a project
    List {
        /// Project to list
        #[arg(long)]
        project_ref: Option<String>,
    },
}

#[derive(Args)]
pub struct DeployArgs {
    /// Functions to deploy (all known functions when omitted)
    #[arg(value_parser = parse_slug)]
    pub slugs: Vec<FunctionSlug>,

    /// Project to deploy to
    #[arg(long)]
    pub project_ref: Option<String>,

    /// Import map used by every deployed function
    #[arg(long)]
    pub import_map: Option<PathBuf>,

    /// Disable JWT verification for the deployed functions
    #[arg(long)]
    pub no_verify_jwt: bool,

    /// Number of uploads running at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Upload sources and let the control plane bundle them
    #[arg(long)]
    pub use_api: bool,
}

#[derive(Args)]
pub struct BundleArgs {
    /// Function to bundle
    #[arg(value_parser = parse_slug)]
    pub slug: FunctionSlug,

    /// Output file (defaults to <slug>.eszip or <slug>.form)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Import map to bundle with
    #[arg(long)]
    pub import_map: Option<PathBuf>,

    /// Write the source upload form instead of an eszip
    #[arg(long)]
    pub use_api: bool,
}

fn parse_slug(value: &str) -> Result<FunctionSlug, String> {
    FunctionSlug::new(value).map_err(|e| e.to_string())
}
