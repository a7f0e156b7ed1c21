//! Container cluster

use super::{ClusterAttrs, Construct, NetworkRef, SynthContext};
use anyhow::Result;
use cfnkit::ResourceEntry;

/// Logical grouping of compute capacity inside a network.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub network: NetworkRef,
}

impl Construct for ClusterSpec {
    fn construct_type(&self) -> &'static str {
        "cluster"
    }

    fn description(&self) -> String {
        format!("ECS cluster in network {}", self.network)
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        // Fail early if the network was never rendered
        ctx.network(&self.network)?;

        let logical_id = ctx.add(&[id, "Resource"], ResourceEntry::new("AWS::ECS::Cluster"))?;
        ctx.register_cluster(
            id,
            ClusterAttrs {
                logical_id,
                network: self.network.clone(),
            },
        );
        Ok(())
    }
}
