//! Deployment environment selection
//!
//! A stack is either environment-agnostic (one template deployable to any
//! account/region, but account- and region-dependent lookups are unavailable)
//! or pinned to an account/region pair. The pair can be written down in the
//! config or taken from the variables the toolkit exports when it runs the app.

use cfnkit::Environment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Variable the toolkit sets to the account of the current CLI profile
pub const ACCOUNT_VAR: &str = "CDK_DEFAULT_ACCOUNT";

/// Variable the toolkit sets to the region of the current CLI profile
pub const REGION_VAR: &str = "CDK_DEFAULT_REGION";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("invalid account id '{0}': expected 12 digits")]
    InvalidAccount(String),

    #[error("invalid region '{0}'")]
    InvalidRegion(String),
}

/// How the stack's target environment is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum EnvironmentMode {
    /// Leave account and region unresolved
    #[default]
    Agnostic,
    /// A fixed account and region, recommended for production stacks
    Fixed { account: String, region: String },
    /// Account and region of the current CLI configuration, for dev stacks
    FromEnvironment,
}

impl EnvironmentMode {
    /// Short name, as accepted by `--env`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Agnostic => "agnostic",
            Self::Fixed { .. } => "fixed",
            Self::FromEnvironment => "from-environment",
        }
    }

    /// Resolve against the process environment.
    pub fn resolve(&self) -> Result<Option<Environment>, ResolveError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` for environment variables.
    pub fn resolve_with<F>(&self, lookup: F) -> Result<Option<Environment>, ResolveError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (account, region) = match self {
            Self::Agnostic => return Ok(None),
            Self::Fixed { account, region } => (account.clone(), region.clone()),
            Self::FromEnvironment => {
                let account = lookup(ACCOUNT_VAR)
                    .filter(|v| !v.is_empty())
                    .ok_or(ResolveError::MissingVariable(ACCOUNT_VAR))?;
                let region = lookup(REGION_VAR)
                    .filter(|v| !v.is_empty())
                    .ok_or(ResolveError::MissingVariable(REGION_VAR))?;
                (account, region)
            }
        };

        validate_account(&account)?;
        validate_region(&region)?;
        log::debug!("Resolved environment aws://{account}/{region}");
        Ok(Some(Environment::new(account, region)))
    }
}

fn validate_account(account: &str) -> Result<(), ResolveError> {
    if account.len() == 12 && account.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ResolveError::InvalidAccount(account.to_string()))
    }
}

/// Regions look like `us-east-1` or `us-gov-west-1`.
fn validate_region(region: &str) -> Result<(), ResolveError> {
    let parts: Vec<&str> = region.split('-').collect();
    let well_formed = parts.len() >= 3
        && parts[0].len() == 2
        && parts[..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts[parts.len() - 1].parse::<u8>().is_ok();

    if well_formed {
        Ok(())
    } else {
        Err(ResolveError::InvalidRegion(region.to_string()))
    }
}
