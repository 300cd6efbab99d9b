//! Command line definitions for `govern`.

use clap::Parser;
use govern_core::RunMode;
use std::path::PathBuf;

/// Run requests through the governed pipeline and act on its verdicts.
#[derive(Parser, Debug)]
#[command(name = "govern")]
#[command(about = "Governed staged pipeline: run, audit and approve")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine configuration file (defaults to ./govern.yaml when present).
    #[arg(short, long, global = true, env = "GOVERN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Write Prometheus metrics in text format to this file on exit.
    #[arg(long, global = true)]
    pub metrics_out: Option<PathBuf>,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Execute one run and print its verdict and outcome.
    Run(RunArgs),

    /// Inspect stored run records.
    #[command(subcommand)]
    Records(RecordsCommand),

    /// Work the human approval queue.
    #[command(subcommand)]
    Approvals(ApprovalsCommand),

    /// Render the best-fit prompt template.
    Prompt(PromptArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// dry-run, validated or live.
    #[arg(short, long, default_value = "dry-run")]
    pub mode: RunMode,

    /// Request input as inline JSON.
    #[arg(short, long, conflicts_with = "input_file")]
    pub input: Option<String>,

    /// Read the request input from a JSON file.
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Run id of an earlier record this run corrects.
    #[arg(long)]
    pub supersedes: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
pub enum RecordsCommand {
    /// Print a record with its decayed effective confidence.
    Show {
        run_id: String,
    },
    /// List stored records, oldest first.
    List,
}

#[derive(clap::Subcommand, Debug)]
pub enum ApprovalsCommand {
    /// Show tickets awaiting a decision.
    List,
    /// Approve a REVIEW run.
    Approve(DecisionArgs),
    /// Reject a REVIEW run.
    Reject(DecisionArgs),
}

#[derive(Parser, Debug)]
pub struct DecisionArgs {
    pub run_id: String,

    /// Who decided.
    #[arg(long, env = "GOVERN_ACTOR")]
    pub actor: String,

    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Parser, Debug)]
pub struct PromptArgs {
    #[arg(long)]
    pub identity: String,

    #[arg(long)]
    pub action: Option<String>,

    /// Template variables as a JSON object.
    #[arg(long, default_value = "{}")]
    pub vars: String,

    /// Template set to use instead of the configured one.
    #[arg(long)]
    pub templates: Option<PathBuf>,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "govern", "run", "--mode", "live", "--input", r#"{"goal":"x"}"#, "--supersedes", "r0",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.mode, RunMode::Live);
                assert_eq!(args.input.as_deref(), Some(r#"{"goal":"x"}"#));
                assert_eq!(args.supersedes.as_deref(), Some("r0"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_input_sources_conflict() {
        assert!(Cli::try_parse_from([
            "govern", "run", "--input", "{}", "--input-file", "in.json"
        ])
        .is_err());
    }

    #[test]
    fn test_unknown_mode() {
        assert!(Cli::try_parse_from(["govern", "run", "--mode", "yolo"]).is_err());
    }

    #[test]
    fn test_approve_args() {
        let cli = Cli::try_parse_from([
            "govern", "--log-level", "debug", "approvals", "approve", "r1", "--actor", "ana",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Approvals(ApprovalsCommand::Approve(args)) => {
                assert_eq!(args.run_id, "r1");
                assert_eq!(args.actor, "ana");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
