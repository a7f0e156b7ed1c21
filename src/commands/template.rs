use anyhow::Result;

use crate::config::StackConfig;

/// Print the synthesized template to stdout, and nothing else.
pub fn run(config: &StackConfig) -> Result<()> {
    let artifact = super::synthesize(config)?;
    println!("{}", artifact.template.to_json_pretty()?);
    Ok(())
}
