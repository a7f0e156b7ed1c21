//! Command implementations
//!
//! Every command except `completions` starts from the same place: the stack
//! config with CLI overrides applied, resolved into a graph.

pub mod diff;
pub mod list;
pub mod synth;
pub mod template;

use anyhow::{Context as _, Result, bail};
use cfnkit::StackArtifact;
use std::path::Path;

use crate::app;
use crate::cli::{EnvArg, Overrides};
use crate::config::StackConfig;
use crate::environment::EnvironmentMode;
use crate::stack::{self, StackGraph};

/// Load the stack config and apply command-line overrides.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<StackConfig> {
    let mut config = StackConfig::load(path)?;
    apply_overrides(&mut config, overrides)?;
    config.validate().context("Invalid stack configuration")?;
    Ok(config)
}

fn apply_overrides(config: &mut StackConfig, overrides: &Overrides) -> Result<()> {
    if let Some(name) = &overrides.stack_name {
        config.stack.name = name.clone();
    }

    match overrides.env {
        None => {
            if overrides.account.is_some() || overrides.region.is_some() {
                bail!("--account and --region require --env fixed");
            }
        }
        Some(EnvArg::Agnostic) => config.environment = EnvironmentMode::Agnostic,
        Some(EnvArg::FromEnvironment) => config.environment = EnvironmentMode::FromEnvironment,
        Some(EnvArg::Fixed) => {
            // Fall back to the file's fixed pair when a flag is omitted
            let (file_account, file_region) = match &config.environment {
                EnvironmentMode::Fixed { account, region } => {
                    (Some(account.clone()), Some(region.clone()))
                }
                _ => (None, None),
            };
            let account = overrides.account.clone().or(file_account);
            let region = overrides.region.clone().or(file_region);
            let (Some(account), Some(region)) = (account, region) else {
                bail!("--env fixed needs both --account and --region");
            };
            config.environment = EnvironmentMode::Fixed { account, region };
        }
    }

    if overrides.env.is_some_and(|env| env != EnvArg::Fixed)
        && (overrides.account.is_some() || overrides.region.is_some())
    {
        bail!("--account and --region only apply to --env fixed");
    }
    Ok(())
}

/// Resolve the environment and declare the stack.
pub fn build_graph(config: &StackConfig) -> Result<StackGraph> {
    let environment = config
        .environment
        .resolve()
        .with_context(|| format!("Could not resolve {} environment", config.environment.name()))?;
    app::build(config, environment)
}

/// Declare and synthesize the stack.
pub fn synthesize(config: &StackConfig) -> Result<StackArtifact> {
    let graph = build_graph(config)?;
    stack::synthesize(&graph)
}
