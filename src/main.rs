mod app;
mod cli;
mod commands;
mod config;
mod environment;
mod stack;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, OutArgs};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    if let Some(Command::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "starwars-fargate", &mut io::stdout());
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;

    match cli.command {
        // The toolkit runs the app without arguments
        None => commands::synth::run(&ctx, &config, &OutArgs::from_env()),
        Some(Command::Synth(args)) => commands::synth::run(&ctx, &config, &args),
        Some(Command::Template) => commands::template::run(&config),
        Some(Command::Diff(args)) => commands::diff::run(&ctx, &config, &args),
        Some(Command::List { long }) => commands::list::run(&ctx, &config, long),
        Some(Command::Completions { .. }) => Ok(()),
    }
}
