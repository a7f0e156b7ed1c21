use anyhow::{Context as _, Result, bail};
use cfnkit::{ChangeKind, DiffSummary, Error as TemplateError, ResourceDiff, Template, TemplateDiff};
use colored::Colorize;

use crate::Context;
use crate::cli::DiffArgs;
use crate::config::StackConfig;
use crate::ui;

/// Compare a fresh synthesis with the template last written to the
/// assembly directory.
pub fn run(ctx: &Context, config: &StackConfig, args: &DiffArgs) -> Result<()> {
    let artifact = super::synthesize(config)?;
    let dir = &args.out.out;

    let previous = match cfnkit::assembly::read_template(dir, &artifact.stack_name) {
        Ok(template) => template,
        Err(TemplateError::TemplateNotFound(path)) => {
            if !ctx.quiet {
                ui::info(&format!(
                    "No previous template at {}, every resource is new",
                    path.display()
                ));
            }
            Template::new()
        }
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Could not read previous template from {}", dir.display())
            });
        }
    };

    let diff = TemplateDiff::between(&previous, &artifact.template);
    let summary = diff.summary();

    if !ctx.quiet {
        print_diff(&artifact.stack_name, &diff, ctx.verbose > 0);
        print_summary(&summary);
    }

    if args.fail && summary.has_changes() {
        bail!("{} change(s) pending for {}", summary.total(), artifact.stack_name);
    }
    Ok(())
}

fn print_diff(stack_name: &str, diff: &TemplateDiff, show_bodies: bool) {
    ui::stack_header(stack_name);

    if diff.is_empty() {
        return;
    }

    if !diff.resources.is_empty() {
        ui::section("Resources");
        for resource in &diff.resources {
            println!("  {}", resource_line(resource));
            if show_bodies && resource.is_modification() {
                for (tag, line) in resource.changed_lines() {
                    let line = format!("{tag} {line}");
                    let colored = if tag == '+' { line.green() } else { line.red() };
                    println!("      {colored}");
                }
            }
        }
    }

    if !diff.outputs.is_empty() {
        ui::section("Outputs");
        for (name, kind) in &diff.outputs {
            println!("  {} {}", ui::change_marker(kind), name);
        }
    }
}

fn resource_line(resource: &ResourceDiff) -> String {
    let detail = match &resource.kind {
        ChangeKind::Replacement { from, to } => format!(" (replaces {from} with {to})"),
        _ => String::new(),
    };
    format!(
        "{} {} {}{}",
        ui::change_marker(&resource.kind),
        resource.resource_type.dimmed(),
        resource.logical_id,
        detail
    )
}

fn print_summary(summary: &DiffSummary) {
    println!();
    if !summary.has_changes() {
        ui::success("No differences");
        return;
    }
    ui::info(&format!(
        "{} to add, {} to change, {} to remove, {} output change(s)",
        summary.additions, summary.modifications, summary.removals, summary.outputs
    ));
}
