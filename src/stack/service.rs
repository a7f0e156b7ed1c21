//! Fargate service running a task template on a cluster

use super::{ClusterRef, Construct, ServiceAttrs, SynthContext, TaskRef};
use anyhow::Result;
use cfnkit::{ResourceEntry, intrinsic};
use serde_json::json;

/// A managed, running instance of a task template.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSpec {
    pub cluster: ClusterRef,
    pub task: TaskRef,
    pub desired_count: u32,
}

impl ServiceSpec {
    /// One copy of `task` on `cluster`
    pub fn new(cluster: &ClusterRef, task: &TaskRef) -> Self {
        Self {
            cluster: cluster.clone(),
            task: task.clone(),
            desired_count: 1,
        }
    }
}

impl Construct for ServiceSpec {
    fn construct_type(&self) -> &'static str {
        "service"
    }

    fn description(&self) -> String {
        format!(
            "Fargate service running {} x task {} on cluster {}",
            self.desired_count, self.task, self.cluster
        )
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let cluster = ctx.cluster(&self.cluster)?.clone();
        let network = ctx.network(&cluster.network)?.clone();
        let task = ctx.task(&self.task)?.clone();

        let group_name = ctx.path_name(&[id, "SecurityGroup"]);
        let security_group = ctx.add(
            &[id, "SecurityGroup", "Resource"],
            ResourceEntry::new("AWS::EC2::SecurityGroup").with_properties(json!({
                "GroupDescription": group_name,
                "SecurityGroupEgress": [{
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1",
                }],
                "VpcId": intrinsic::reference(&network.vpc),
            })),
        )?;

        let subnets: Vec<_> = network
            .private_subnets
            .iter()
            .map(|s| intrinsic::reference(s))
            .collect();

        let logical_id = ctx.add(
            &[id, "Service"],
            ResourceEntry::new("AWS::ECS::Service")
                .with_properties(json!({
                    "Cluster": intrinsic::reference(&cluster.logical_id),
                    "DeploymentConfiguration": {
                        "MaximumPercent": 200,
                        "MinimumHealthyPercent": 50,
                    },
                    "DesiredCount": self.desired_count,
                    "EnableECSManagedTags": false,
                    "LaunchType": "FARGATE",
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "SecurityGroups": [intrinsic::get_att(&security_group, "GroupId")],
                            "Subnets": subnets,
                        },
                    },
                    "TaskDefinition": intrinsic::reference(&task.logical_id),
                }))
                .with_dependency(task.task_role.clone()),
        )?;

        ctx.register_service(
            id,
            ServiceAttrs {
                logical_id,
                security_group,
            },
        );
        Ok(())
    }
}
