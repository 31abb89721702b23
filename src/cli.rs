//! CLI argument parsing for claim triage.
use crate::config::{DEFAULT_CONFIG_PATH, LATEST};
use crate::rules::DEFAULT_KB_PATH;
use crate::table::OutputFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "claims",
    version,
    about = "Manipulate Jenkins claims with grace",
    after_help = "Examples:\n  claims show-unclaimed --job-group latest\n  claims show-claimable --grep-rules '^BZ'\n  claims claim --dry-run\n  claims stats --output csv",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Modifiers shared by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Group of jobs to work with
    #[arg(long, global = true, value_name = "NAME", default_value = LATEST)]
    pub job_group: String,

    /// Only work with tests whose "className.name" matches the regexp
    #[arg(long, global = true, value_name = "REGEXP")]
    pub grep_results: Option<String>,

    /// Only work with rules whose reason matches the regexp
    #[arg(long, global = true, value_name = "REGEXP")]
    pub grep_rules: Option<String>,

    /// Table format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Simple)]
    pub output: OutputFormat,

    /// Server credentials and job groups
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Knowledge base of claim rules
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_KB_PATH)]
    pub kb: PathBuf,

    /// Show also debug messages
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show all failed tests
    ShowFailed,
    /// Show claimed tests
    ShowClaimed,
    /// Show failed and not yet claimed tests
    ShowUnclaimed,
    /// Show failed, not yet claimed but claimable tests
    ShowClaimable,
    /// Show detailed info about matching test cases
    Show(ShowArgs),
    /// Claim claimable tests
    Claim(ClaimArgs),
    /// Show stats for the job group
    Stats,
    /// Remove cached reports and logs of the job group
    CleanCache,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Regexp matched against "className.name"
    #[arg(value_name = "TEST_NAME_REGEXP")]
    pub test_name: String,
}

#[derive(Parser, Debug)]
pub struct ClaimArgs {
    /// Report what would be claimed without submitting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep the claim on following failures of the same test
    #[arg(long)]
    pub sticky: bool,

    /// Propagate the claim to following builds
    #[arg(long)]
    pub propagate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        RootArgs::command().debug_assert();
    }

    #[test]
    fn global_modifiers_follow_subcommand() {
        let args = RootArgs::try_parse_from([
            "claims",
            "claim",
            "--dry-run",
            "--job-group",
            "older",
            "--output",
            "csv",
            "-d",
        ])
        .expect("parse");
        assert_eq!(args.global.job_group, "older");
        assert_eq!(args.global.output, OutputFormat::Csv);
        assert!(args.global.debug);
        match args.command {
            Command::Claim(claim) => assert!(claim.dry_run && !claim.sticky),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn defaults_point_at_working_directory_files() {
        let args = RootArgs::try_parse_from(["claims", "stats"]).expect("parse");
        assert_eq!(args.global.job_group, LATEST);
        assert_eq!(args.global.config, PathBuf::from("config.yaml"));
        assert_eq!(args.global.kb, PathBuf::from("kb.json"));
        assert!(args.global.grep_results.is_none());
    }
}
