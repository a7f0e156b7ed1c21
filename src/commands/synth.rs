use anyhow::{Context as _, Result};
use cfnkit::{CloudAssembly, environment_uri};

use crate::Context;
use crate::cli::OutArgs;
use crate::config::StackConfig;
use crate::ui;

/// Synthesize the stack and write the cloud assembly.
pub fn run(ctx: &Context, config: &StackConfig, args: &OutArgs) -> Result<()> {
    let artifact = super::synthesize(config)?;

    let stack_name = artifact.stack_name.clone();
    let environment = environment_uri(artifact.environment.as_ref());
    let resources = artifact.template.resources.len();
    let fingerprint = artifact.template.fingerprint()?;

    let mut assembly = CloudAssembly::new();
    assembly.add_stack(artifact);
    let written = assembly
        .write(&args.out)
        .with_context(|| format!("Failed to write cloud assembly to {}", args.out.display()))?;

    log::info!("Wrote {} files to {}", written.len(), args.out.display());

    if ctx.quiet {
        return Ok(());
    }

    ui::success(&format!("Synthesized {stack_name}"));
    ui::report(&[
        ("Environment", environment),
        ("Resources", resources.to_string()),
        ("Fingerprint", fingerprint[..16].to_string()),
        ("Assembly", args.out.display().to_string()),
    ]);
    if ctx.verbose > 0 {
        ui::written_files(&written);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    #[test]
    fn test_writes_assembly() {
        let dir = TempDir::new().unwrap();
        let args = OutArgs {
            out: dir.path().join("cdk.out"),
        };
        run(&quiet(), &StackConfig::default(), &args).unwrap();

        assert!(args.out.join("manifest.json").exists());
        assert!(args.out.join("cdk.out").exists());
        assert!(args.out.join("InigoStarwarsExample.template.json").exists());

        let manifest = cfnkit::assembly::read_manifest(&args.out).unwrap();
        let artifact = &manifest.artifacts["InigoStarwarsExample"];
        assert_eq!(artifact.environment, "aws://unknown-account/unknown-region");
    }

    #[test]
    fn test_second_run_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let args = OutArgs {
            out: dir.path().to_path_buf(),
        };
        let template = args.out.join("InigoStarwarsExample.template.json");

        run(&quiet(), &StackConfig::default(), &args).unwrap();
        let first = std::fs::read(&template).unwrap();
        run(&quiet(), &StackConfig::default(), &args).unwrap();
        let second = std::fs::read(&template).unwrap();
        assert_eq!(first, second);
    }
}
