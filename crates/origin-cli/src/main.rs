//! Origin package manager CLI
//!
//! Installs, removes and audits packages for an Origin project, and manages
//! the local `name@version -> url` registry.

mod commands;
mod logging;
mod output;

use clap::{ArgAction, Parser, Subcommand};
use output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "origin")]
#[command(about = "Origin package manager", long_about = None)]
#[command(version)]
struct Cli {
    /// Registry file (defaults to $ORIGIN_REGISTRY or ~/.origin/registry.json)
    #[arg(long, global = true, value_name = "PATH")]
    registry: Option<PathBuf>,

    /// When to use colored output
    #[arg(long, global = true, default_value = "auto", value_parser = ["auto", "always", "never"])]
    color: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package from a directory, archive, URL or registry spec
    Add {
        /// Local path, archive, URL, or name@range
        source: String,
        /// Expected SHA-256 of the archive or download
        #[arg(long)]
        checksum: Option<String>,
        /// Replace an existing installation
        #[arg(long)]
        update: bool,
    },

    /// Remove an installed package
    Remove {
        /// Installed package name
        name: String,
    },

    /// Check installed packages for conflicts and newer versions
    Audit {
        /// Emit a JSON report
        #[arg(long)]
        json: bool,
        /// Minimum severity to report
        #[arg(long, default_value = "warn", value_parser = ["info", "warn", "crit"])]
        level: String,
        /// Package names to skip
        #[arg(long, num_args = 1..)]
        ignore: Vec<String>,
    },

    /// Manage registry entries
    Registry {
        #[command(subcommand)]
        action: RegistryCommands,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Map name@version to a URL
    Add {
        /// Exact package spec, e.g. std/math@1.2.0
        spec: String,
        /// Location of the package archive
        url: String,
    },

    /// Show every registry entry
    List,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut out = StyledOutput::new(resolve_color_choice(Some(&cli.color)));

    let code = match run(cli, &mut out) {
        Ok(code) => code,
        Err(e) => {
            out.error(&format!("error: {:#}", e));
            1
        }
    };

    out.flush();
    std::process::exit(code);
}

fn run(cli: Cli, out: &mut StyledOutput) -> anyhow::Result<i32> {
    let registry = cli.registry;

    match cli.command {
        Commands::Add {
            source,
            checksum,
            update,
        } => commands::add::execute(&source, checksum, update, registry, out),

        Commands::Remove { name } => commands::remove::execute(&name, registry, out),

        Commands::Audit {
            json,
            level,
            ignore,
        } => commands::audit::execute(json, &level, &ignore, registry, out),

        Commands::Registry { action } => match action {
            RegistryCommands::Add { spec, url } => {
                commands::registry::add(&spec, &url, registry, out)
            }
            RegistryCommands::List => commands::registry::list(registry, out),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_audit_defaults() {
        let cli = Cli::try_parse_from(["origin", "audit"]).unwrap();
        match cli.command {
            Commands::Audit { json, level, ignore } => {
                assert!(!json);
                assert_eq!(level, "warn");
                assert!(ignore.is_empty());
            }
            _ => panic!("expected audit"),
        }
    }

    #[test]
    fn test_audit_ignore_list() {
        let cli =
            Cli::try_parse_from(["origin", "audit", "--level", "crit", "--ignore", "a", "b"]).unwrap();
        match cli.command {
            Commands::Audit { level, ignore, .. } => {
                assert_eq!(level, "crit");
                assert_eq!(ignore, vec!["a".to_string(), "b".to_string()]);
            }
            _ => panic!("expected audit"),
        }
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(Cli::try_parse_from(["origin", "audit", "--level", "fatal"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "origin", "add", "./lib", "--update", "--registry", "/tmp/r.json", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.registry, Some(PathBuf::from("/tmp/r.json")));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Add { update: true, .. }));
    }
}
