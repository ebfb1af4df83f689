//! trellis - manage stacks of dependent branches and submit them for
//! review.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use trellis_core::Cancel;

mod commands;
mod github;
mod prompt;

/// trellis - stacked branches with forge-backed review
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Never prompt for input
    #[arg(long)]
    no_prompt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize the branch store in this repository
    Init {
        /// Trunk branch name; detected from the remote when omitted
        #[arg(long)]
        trunk: Option<String>,

        /// Re-initialize, discarding existing branch state
        #[arg(long)]
        force: bool,
    },

    /// Manage stack branches
    Branch {
        #[command(subcommand)]
        command: BranchCommands,
    },
}

#[derive(Subcommand, Debug)]
enum BranchCommands {
    /// Create a new branch in the stack
    Create {
        /// Name of the new branch
        name: String,

        /// Restack the upstack of the current branch onto the new branch
        #[arg(long)]
        insert: bool,

        /// Place the branch below the current branch (implies --insert)
        #[arg(long, conflicts_with = "insert")]
        below: bool,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Merge a branch into its base and delete it
    Fold {
        /// Branch to fold (defaults to the current branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Rebase a branch (and everything above it) onto its base
    Restack {
        /// Branch to restack (defaults to the current branch)
        #[arg(long)]
        branch: Option<String>,
    },

    /// Push a branch and create or update its change request
    Submit {
        /// Branch to submit (defaults to the current branch)
        #[arg(long)]
        branch: Option<String>,

        /// Report what would happen without doing it
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Fill the change title and body from the commit messages
        #[arg(long)]
        fill: bool,

        /// Mark the change request as a draft
        #[arg(long, overrides_with = "no_draft")]
        draft: bool,

        /// Mark the change request as ready for review
        #[arg(long = "no-draft", overrides_with = "draft")]
        no_draft: bool,

        /// Push the branch but do not create a change request
        #[arg(long)]
        no_publish: bool,

        /// Force push, bypassing safety checks
        #[arg(long)]
        force: bool,

        /// Change title
        #[arg(long)]
        title: Option<String>,

        /// Change body
        #[arg(long)]
        body: Option<String>,

        /// Remote to push to (defaults to the only configured remote)
        #[arg(long)]
        remote: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();

    if let Err(err) = run(cli) {
        tracing::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cancel = Cancel::new();
    match cli.command {
        Commands::Init { trunk, force } => commands::init::run(&cancel, trunk.as_deref(), force),
        Commands::Branch { command } => match command {
            BranchCommands::Create {
                name,
                insert,
                below,
                message,
            } => commands::branch::create(&cancel, &name, insert, below, message),
            BranchCommands::Fold { branch } => commands::branch::fold(&cancel, branch.as_deref()),
            BranchCommands::Restack { branch } => {
                commands::branch::restack(&cancel, branch.as_deref())
            }
            BranchCommands::Submit {
                branch,
                dry_run,
                fill,
                draft,
                no_draft,
                no_publish,
                force,
                title,
                body,
                remote,
            } => {
                let draft = match (draft, no_draft) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                commands::branch::submit(
                    &cancel,
                    commands::branch::SubmitArgs {
                        branch,
                        dry_run,
                        fill,
                        draft,
                        no_publish,
                        force,
                        title,
                        body,
                        remote,
                        no_prompt: cli.no_prompt,
                    },
                )
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn draft_flags_are_mutually_overriding() {
        let cli = Cli::try_parse_from(["trellis", "branch", "submit", "--draft", "--no-draft"])
            .expect("later flag wins");
        let Commands::Branch {
            command: BranchCommands::Submit { draft, no_draft, .. },
        } = cli.command
        else {
            panic!("expected submit");
        };
        assert!(!draft);
        assert!(no_draft);
    }

    #[test]
    fn create_rejects_insert_with_below() {
        assert!(
            Cli::try_parse_from(["trellis", "branch", "create", "x", "--insert", "--below"])
                .is_err()
        );
    }
}
