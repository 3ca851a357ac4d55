//! scriptpm command-line tool
//!
//! Finds modules and scripts across the repositories registered in
//! config.toml.

mod commands;
mod logging;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use commands::find::{self, FindArgs};
use output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scriptpm")]
#[command(about = "Script package manager", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/scriptpm/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Colored output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find modules and scripts by name
    Find {
        /// Names to find; `*` matches any run of characters
        #[arg(required = true)]
        names: Vec<String>,

        /// Version or range, e.g. "1.2.0", "[1.0, 2.0)", "3.*", "*"
        #[arg(long)]
        version: Option<String>,

        /// Include prerelease versions
        #[arg(long)]
        prerelease: bool,

        /// Only resources carrying one of these tags
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Resource type
        #[arg(long = "type", value_enum, default_value_t = TypeArg::Any)]
        kind: TypeArg,

        /// Only search these repositories (wildcards allowed)
        #[arg(long = "repository")]
        repositories: Vec<String>,

        /// Also resolve dependencies
        #[arg(long)]
        include_dependencies: bool,

        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TypeArg {
    Any,
    Module,
    Script,
}

impl From<TypeArg> for scriptpm_resolve::KindFilter {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::Any => scriptpm_resolve::KindFilter::Any,
            TypeArg::Module => scriptpm_resolve::KindFilter::Module,
            TypeArg::Script => scriptpm_resolve::KindFilter::Script,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    match cli.command {
        Commands::Find {
            names,
            version,
            prerelease,
            tags,
            kind,
            repositories,
            include_dependencies,
            json,
        } => {
            let args = FindArgs {
                names,
                version,
                prerelease,
                tags,
                kind: kind.into(),
                repositories,
                include_dependencies,
                json,
            };
            let found = find::execute(&args, cli.config.as_deref(), &mut out)?;
            if !found {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
