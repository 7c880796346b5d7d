//! Route JSON documents through a declarative rule tree.
//!
//! `ruletree map` loads `ruletree.toml` and a JSON rule file, then maps one
//! document file (or every `*.json` file of a directory) into the output.
//! `ruletree check` only builds the tree. `ruletree init` writes a default
//! config file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ruletree::io::config::CONFIG_FILE;
use ruletree::io::init::{InitOptions, init_config};
use ruletree::map::{CommandError, MapRequest, check_rules, map_documents};
use ruletree::{exit_codes, logging};

#[derive(Parser, Debug)]
#[command(
    name = "ruletree",
    version,
    about = "Route JSON documents through declarative rule trees"
)]
struct Cli {
    /// Config file with layout, variables, profiles and profile filters.
    #[arg(long, global = true, value_name = "PATH", default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config file at the `--config` path.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Map a document file or directory through a rule file.
    Map {
        /// JSON rule file; its root must be a single rule.
        rules: PathBuf,
        /// Document file, or directory of `*.json` documents.
        input: PathBuf,
        /// Output file, or directory receiving one file per input.
        output: PathBuf,
    },
    /// Build a rule file and report its node counts.
    Check {
        /// JSON rule file.
        rules: PathBuf,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Init { force } => init_config(&cli.config, &InitOptions { force })
            .map_err(CommandError::Invalid)
            .map(|_| println!("wrote {}", cli.config.display())),
        Command::Map {
            rules,
            input,
            output,
        } => map_documents(&MapRequest {
            config: cli.config,
            rules,
            input,
            output,
        })
        .map(|outcome| {
            println!(
                "mapped {} document(s), {} dropped",
                outcome.documents, outcome.dropped
            );
        }),
        Command::Check { rules } => check_rules(&cli.config, &rules).map(|outcome| {
            println!(
                "ok: {} node(s) ({} routing, {} leaf)",
                outcome.nodes(),
                outcome.routing,
                outcome.leaves
            );
        }),
    };
    let code = match result {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:#}", anyhow::Error::from(err));
            code
        }
    };
    std::process::exit(code);
}
