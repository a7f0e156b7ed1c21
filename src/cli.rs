use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Directory the toolkit reads the cloud assembly from
pub const DEFAULT_OUT_DIR: &str = "cdk.out";

#[derive(Parser)]
#[command(name = "starwars-fargate")]
#[command(version)]
#[command(
    about = "Synthesize the Star Wars GraphQL service (Fargate + ALB) as a CloudFormation stack",
    long_about = "Synthesize the Star Wars GraphQL service (Fargate + ALB) as a CloudFormation stack.\n\n\
                  Run without a subcommand to synthesize, which is how `cdk synth`, `cdk diff` and \
                  `cdk deploy` invoke this app (see cdk.json)."
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Stack config file (default: ./stack.toml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Values that take precedence over the config file
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// How to pick the target account and region
    #[arg(long = "env", value_enum, global = true)]
    pub env: Option<EnvArg>,

    /// Account for `--env fixed`
    #[arg(long, global = true, requires = "env")]
    pub account: Option<String>,

    /// Region for `--env fixed`
    #[arg(long, global = true, requires = "env")]
    pub region: Option<String>,

    /// Override the stack name
    #[arg(long, global = true)]
    pub stack_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EnvArg {
    /// Deployable to any account and region
    Agnostic,
    /// Use --account and --region
    Fixed,
    /// Read CDK_DEFAULT_ACCOUNT and CDK_DEFAULT_REGION
    FromEnvironment,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write the cloud assembly (default)
    Synth(OutArgs),

    /// Print the synthesized template to stdout
    Template,

    /// Compare the synthesized template with the one in the assembly directory
    Diff(DiffArgs),

    /// List declared constructs in synthesis order
    List {
        /// Show a description of each construct
        #[arg(short, long)]
        long: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct OutArgs {
    /// Cloud assembly directory
    #[arg(short, long, env = "CDK_OUTDIR", default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,
}

impl OutArgs {
    /// What `synth` would parse with no flags: the toolkit passes the
    /// assembly directory through `CDK_OUTDIR` when it runs the app.
    pub fn from_env() -> Self {
        let out = std::env::var_os("CDK_OUTDIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUT_DIR));
        Self { out }
    }
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub out: OutArgs,

    /// Exit with an error when the templates differ
    #[arg(long)]
    pub fail: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::try_parse_from(["starwars-fargate"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_fixed_environment_flags() {
        let cli = Cli::try_parse_from([
            "starwars-fargate",
            "--env",
            "fixed",
            "--account",
            "123456789012",
            "--region",
            "us-east-1",
            "template",
        ])
        .unwrap();
        assert_eq!(cli.overrides.env, Some(EnvArg::Fixed));
        assert_eq!(cli.overrides.account.as_deref(), Some("123456789012"));
        assert!(matches!(cli.command, Some(Command::Template)));
    }

    #[test]
    fn test_account_requires_env() {
        assert!(Cli::try_parse_from(["starwars-fargate", "--account", "123456789012"]).is_err());
    }

    #[test]
    fn test_diff_args() {
        let cli = Cli::try_parse_from(["starwars-fargate", "diff", "--out", "/tmp/asm", "--fail"])
            .unwrap();
        match cli.command {
            Some(Command::Diff(args)) => {
                assert!(args.fail);
                assert_eq!(args.out.out, PathBuf::from("/tmp/asm"));
            }
            _ => panic!("expected diff"),
        }
    }
}
