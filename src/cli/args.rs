//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and the Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Image archive deployment agent
#[derive(Parser)]
#[command(
    name = "dropship",
    version = env!("CARGO_PKG_VERSION"),
    about = "Redeploy compose services when image archives land in a watched directory",
    long_about = "Watch a directory tree for <name>-<version>.tar image archives. Each new \
                  archive is loaded into the container runtime, the compose file is pointed \
                  at the new tag, and the matching services are pulled and recreated.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to a custom dropship.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Command to run; `watch` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Watch the configured directory and redeploy on every new archive
    Watch,

    /// Display active settings
    Config,

    /// Run the pipeline once for an archive and exit
    Deploy {
        /// Path to a <name>-<version>.tar archive
        archive: PathBuf,
    },

    /// Show how a file name would be interpreted
    Identify {
        /// File name to test, e.g. alpine-3.16.tar
        file_name: String,
    },
}

impl Cli {
    /// The requested command, defaulting to `watch`.
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Watch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_is_default() {
        let cli = Cli::try_parse_from(["dropship"]).unwrap();
        assert_eq!(cli.command(), &Commands::Watch);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["dropship", "deploy", "/srv/web-1.0.tar", "-c", "ops.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("ops.toml")));
        assert_eq!(
            cli.command(),
            &Commands::Deploy {
                archive: PathBuf::from("/srv/web-1.0.tar")
            }
        );
    }

    #[test]
    fn test_identify_requires_name() {
        assert!(Cli::try_parse_from(["dropship", "identify"]).is_err());
    }
}
