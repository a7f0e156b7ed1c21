//! Stack outputs

use super::{Construct, LoadBalancerRef, StackGraph, SynthContext};
use anyhow::{Result, bail};
use cfnkit::{Output, intrinsic};

/// Values a stack can publish once deployed.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    /// Public DNS name of a load balancer
    LoadBalancerDnsName(LoadBalancerRef),
}

/// A named stack output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub value: OutputValue,
}

impl OutputSpec {
    pub fn load_balancer_dns(lb: &LoadBalancerRef) -> Self {
        Self {
            value: OutputValue::LoadBalancerDnsName(lb.clone()),
        }
    }

    pub(super) fn validate(&self, graph: &StackGraph) -> Result<()> {
        match &self.value {
            OutputValue::LoadBalancerDnsName(lb) => {
                if graph.load_balancer(lb).is_none() {
                    bail!("unknown load balancer '{lb}'");
                }
            }
        }
        Ok(())
    }
}

impl Construct for OutputSpec {
    fn construct_type(&self) -> &'static str {
        "output"
    }

    fn description(&self) -> String {
        match &self.value {
            OutputValue::LoadBalancerDnsName(lb) => format!("DNS name of load balancer {lb}"),
        }
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let value = match &self.value {
            OutputValue::LoadBalancerDnsName(lb) => {
                let attrs = ctx.load_balancer(lb)?;
                intrinsic::get_att(&attrs.logical_id, "DNSName")
            }
        };

        ctx.template.add_output(id, Output::new(value))?;
        Ok(())
    }
}
