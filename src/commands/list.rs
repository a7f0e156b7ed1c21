use anyhow::Result;
use colored::Colorize;

use crate::Context;
use crate::config::StackConfig;
use crate::stack::StackGraph;
use crate::ui;

/// List declared constructs in synthesis order.
pub fn run(ctx: &Context, config: &StackConfig, long: bool) -> Result<()> {
    let graph = super::build_graph(config)?;

    if !ctx.quiet {
        ui::stack_header(&graph.stack_name);
    }
    for line in lines(&graph, long) {
        println!("{line}");
    }
    Ok(())
}

fn lines(graph: &StackGraph, long: bool) -> Vec<String> {
    graph
        .constructs()
        .into_iter()
        .map(|(id, construct)| {
            let kind = format!("{:<14}", construct.construct_type());
            if long {
                format!(
                    "  {} {}\n      {}",
                    kind.cyan(),
                    id.bold(),
                    construct.description().dimmed()
                )
            } else {
                format!("  {} {}", kind.cyan(), id)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_in_dependency_order() {
        colored::control::set_override(false);
        let graph = super::super::build_graph(&StackConfig::default()).unwrap();
        let ids: Vec<String> = lines(&graph, false)
            .iter()
            .map(|l| l.split_whitespace().last().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            ids,
            [
                "VPC",
                "Cluster",
                "LogGroup",
                "Secret",
                "Task",
                "Service",
                "LoadBalancer",
                "Address"
            ]
        );
    }

    #[test]
    fn test_long_listing_has_descriptions() {
        colored::control::set_override(false);
        let graph = super::super::build_graph(&StackConfig::default()).unwrap();
        let listing = lines(&graph, true).join("\n");
        assert!(listing.contains("containers [Starwars:8888, Sidecar:80]"));
        assert!(listing.contains("Reference to Secrets Manager secret 'InigoServiceToken'"));
    }
}
