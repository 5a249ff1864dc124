//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// kcdshop local workshop server CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Workshop root directory (defaults to the current directory)
    #[arg(short, long, env = "KCDSHOP_CONTEXT_CWD")]
    pub root: Option<PathBuf>,

    /// Config file name, relative to the workshop root
    #[arg(short = 'C', long, default_value = "kcdshop.toml")]
    pub config: PathBuf,

    /// Print diagnostics for skipped directories and cache activity
    #[arg(short, long, env = "KCDSHOP_VERBOSE")]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print every discovered app in navigation order
    Apps,

    /// Print exercises with their problem/solution steps
    Exercises,

    /// Mirror an app into the playground directory
    Playground {
        /// Name of the source app (see `kcdshop apps`)
        app: String,

        /// Stop the playground and delete it before copying
        #[arg(long)]
        reset: bool,
    },

    /// Serve the workshop API and app previews
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_playground_command() {
        let cli = Cli::try_parse_from(["kcdshop", "playground", "examples__sep__counter", "--reset"])
            .unwrap();
        match cli.command {
            Commands::Playground { app, reset } => {
                assert_eq!(app, "examples__sep__counter");
                assert!(reset);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["kcdshop", "serve", "--port", "4100", "--watch", "false"])
            .unwrap();
        match cli.command {
            Commands::Serve { port, watch, interface } => {
                assert_eq!(port, Some(4100));
                assert_eq!(watch, Some(false));
                assert!(interface.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
