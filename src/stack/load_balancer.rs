//! Application load balancer, listeners and their service targets

use super::{
    Construct, LoadBalancerAttrs, NetworkRef, ServiceRef, StackGraph, SynthContext,
};
use anyhow::{Result, bail};
use cfnkit::{ResourceEntry, intrinsic};
use serde_json::json;

/// A (service, container, port) triple a listener forwards to.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerTarget {
    pub service: ServiceRef,
    pub container_name: String,
    pub container_port: u16,
}

/// Forwarding rule on one port.
///
/// All targets share one target group named `target_group_id`, which
/// receives traffic on `target_port`.
#[derive(Debug, Clone, PartialEq)]
pub struct ListenerSpec {
    pub id: String,
    pub port: u16,
    /// Allow ingress from anywhere on `port`
    pub open: bool,
    pub target_group_id: String,
    pub target_port: u16,
    pub targets: Vec<ListenerTarget>,
}

/// Public (or internal) entry point into the network.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerSpec {
    pub network: NetworkRef,
    pub internet_facing: bool,
    pub listeners: Vec<ListenerSpec>,
}

impl LoadBalancerSpec {
    pub fn new(network: &NetworkRef, internet_facing: bool) -> Self {
        Self {
            network: network.clone(),
            internet_facing,
            listeners: Vec::new(),
        }
    }

    pub(super) fn push_listener(&mut self, listener: ListenerSpec) -> Result<()> {
        if self.listeners.iter().any(|l| l.id == listener.id) {
            bail!("listener '{}' is already defined", listener.id);
        }
        if self.listeners.iter().any(|l| l.port == listener.port) {
            bail!("a listener on port {} is already defined", listener.port);
        }
        self.listeners.push(listener);
        Ok(())
    }

    /// Every target must name a container and port the service's task
    /// actually declares.
    pub(super) fn validate(&self, graph: &StackGraph) -> Result<()> {
        if graph.network(&self.network).is_none() {
            bail!("unknown network '{}'", self.network);
        }

        for listener in &self.listeners {
            if listener.targets.is_empty() {
                bail!("listener '{}' has no targets", listener.id);
            }
            for target in &listener.targets {
                let Some(service) = graph.service(&target.service) else {
                    bail!(
                        "listener '{}' targets unknown service '{}'",
                        listener.id,
                        target.service
                    );
                };
                let Some(task) = graph.task(&service.task) else {
                    bail!("service '{}' uses unknown task '{}'", target.service, service.task);
                };
                let Some(container) = task.container(&target.container_name) else {
                    bail!(
                        "listener '{}' targets container '{}', which task '{}' does not define",
                        listener.id,
                        target.container_name,
                        service.task
                    );
                };
                if container.container_port != target.container_port {
                    bail!(
                        "listener '{}' targets {}:{}, but container '{}' exposes port {}",
                        listener.id,
                        target.container_name,
                        target.container_port,
                        container.name,
                        container.container_port
                    );
                }

                let cluster_network = graph.cluster(&service.cluster).map(|c| &c.network);
                if cluster_network != Some(&self.network) {
                    bail!(
                        "listener '{}' targets service '{}' outside network '{}'",
                        listener.id,
                        target.service,
                        self.network
                    );
                }
            }
        }
        Ok(())
    }
}

impl Construct for LoadBalancerSpec {
    fn construct_type(&self) -> &'static str {
        "load-balancer"
    }

    fn description(&self) -> String {
        let scheme = if self.internet_facing {
            "internet-facing"
        } else {
            "internal"
        };
        let listeners: Vec<String> = self
            .listeners
            .iter()
            .map(|l| {
                let targets: Vec<String> = l
                    .targets
                    .iter()
                    .map(|t| format!("{}/{}:{}", t.service, t.container_name, t.container_port))
                    .collect();
                format!(":{} -> {}", l.port, targets.join(", "))
            })
            .collect();
        format!(
            "Application load balancer ({scheme}) in network {}, listeners [{}]",
            self.network,
            listeners.join("; ")
        )
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let network = ctx.network(&self.network)?.clone();

        let group_name = ctx.path_name(&[id]);
        let security_group = ctx.add(
            &[id, "SecurityGroup", "Resource"],
            ResourceEntry::new("AWS::EC2::SecurityGroup").with_properties(json!({
                "GroupDescription": format!("Automatically created Security Group for ELB {group_name}"),
                // Egress is opened per target below
                "SecurityGroupEgress": [{
                    "CidrIp": "255.255.255.255/32",
                    "Description": "Disallow all traffic",
                    "FromPort": 252,
                    "IpProtocol": "icmp",
                    "ToPort": 86,
                }],
                "VpcId": intrinsic::reference(&network.vpc),
            })),
        )?;

        let (scheme, subnets) = if self.internet_facing {
            ("internet-facing", &network.public_subnets)
        } else {
            ("internal", &network.private_subnets)
        };

        let mut entry = ResourceEntry::new("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .with_properties(json!({
                "LoadBalancerAttributes": [
                    { "Key": "deletion_protection.enabled", "Value": "false" },
                ],
                "Scheme": scheme,
                "SecurityGroups": [intrinsic::get_att(&security_group, "GroupId")],
                "Subnets": subnets.iter().map(|s| intrinsic::reference(s)).collect::<Vec<_>>(),
                "Type": "application",
            }));
        // Internet-facing balancers need the internet routes in place first
        if self.internet_facing {
            for route in &network.public_routes {
                entry.add_dependency(route.clone());
            }
        }
        let logical_id = ctx.add(&[id, "Resource"], entry)?;

        let attrs = LoadBalancerAttrs {
            logical_id,
            security_group,
        };
        for listener in &self.listeners {
            synthesize_listener(id, listener, &attrs, &network.vpc, ctx)?;
        }

        ctx.register_load_balancer(id, attrs);
        Ok(())
    }
}

fn synthesize_listener(
    lb_id: &str,
    listener: &ListenerSpec,
    lb: &LoadBalancerAttrs,
    vpc: &str,
    ctx: &mut SynthContext,
) -> Result<()> {
    let group_id = format!("{}Group", listener.target_group_id);
    let target_group = ctx.add(
        &[lb_id, &listener.id, &group_id, "Resource"],
        ResourceEntry::new("AWS::ElasticLoadBalancingV2::TargetGroup").with_properties(json!({
            "Port": listener.target_port,
            "Protocol": "HTTP",
            "TargetGroupAttributes": [{ "Key": "stickiness.enabled", "Value": "false" }],
            "TargetType": "ip",
            "VpcId": intrinsic::reference(vpc),
        })),
    )?;

    let listener_id = ctx.add(
        &[lb_id, &listener.id, "Resource"],
        ResourceEntry::new("AWS::ElasticLoadBalancingV2::Listener").with_properties(json!({
            "DefaultActions": [{
                "TargetGroupArn": intrinsic::reference(&target_group),
                "Type": "forward",
            }],
            "LoadBalancerArn": intrinsic::reference(&lb.logical_id),
            "Port": listener.port,
            "Protocol": "HTTP",
        })),
    )?;

    if listener.open {
        ctx.template
            .resource_mut(&lb.security_group)?
            .push_property(
                "SecurityGroupIngress",
                json!({
                    "CidrIp": "0.0.0.0/0",
                    "Description": format!("Allow from anyone on port {}", listener.port),
                    "FromPort": listener.port,
                    "IpProtocol": "tcp",
                    "ToPort": listener.port,
                }),
            );
    }

    for target in &listener.targets {
        let service = ctx.service(&target.service)?.clone();
        let port = target.container_port;

        // Load balancer may reach the service, and the service accepts it.
        // Listeners sharing a target share these rules.
        ctx.add_once(
            &[lb_id, "SecurityGroup", &format!("to{}:{port}", service.security_group)],
            ResourceEntry::new("AWS::EC2::SecurityGroupEgress").with_properties(json!({
                "Description": "Load balancer to target",
                "DestinationSecurityGroupId": intrinsic::get_att(&service.security_group, "GroupId"),
                "FromPort": port,
                "GroupId": intrinsic::get_att(&lb.security_group, "GroupId"),
                "IpProtocol": "tcp",
                "ToPort": port,
            })),
        )?;
        ctx.add_once(
            &[
                target.service.id(),
                "SecurityGroup",
                &format!("from{}:{port}", lb.security_group),
            ],
            ResourceEntry::new("AWS::EC2::SecurityGroupIngress").with_properties(json!({
                "Description": "Load balancer to target",
                "FromPort": port,
                "GroupId": intrinsic::get_att(&service.security_group, "GroupId"),
                "IpProtocol": "tcp",
                "SourceSecurityGroupId": intrinsic::get_att(&lb.security_group, "GroupId"),
                "ToPort": port,
            })),
        )?;

        let service_entry = ctx.template.resource_mut(&service.logical_id)?;
        service_entry.push_property(
            "LoadBalancers",
            json!({
                "ContainerName": target.container_name,
                "ContainerPort": port,
                "TargetGroupArn": intrinsic::reference(&target_group),
            }),
        );
        service_entry
            .properties
            .insert("HealthCheckGracePeriodSeconds".to_string(), json!(60));
        // Registering targets fails until the target group is attached
        service_entry.add_dependency(listener_id.clone());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{
        ClusterSpec, ContainerSpec, LogSinkSpec, NetworkSpec, ServiceSpec, StackBuilder, TaskSpec,
    };

    /// Network, cluster and a one-container service exposing port 80
    fn builder_with_service() -> (StackBuilder, NetworkRef, ServiceRef) {
        let mut builder = StackBuilder::new("Demo", None).unwrap();
        let vpc = builder.add_network("VPC", NetworkSpec::new(2)).unwrap();
        let cluster = builder
            .add_cluster("Cluster", ClusterSpec { network: vpc.clone() })
            .unwrap();
        let logs = builder.add_log_sink("Logs", LogSinkSpec::default()).unwrap();
        let task = builder.add_task("Task", TaskSpec::new(512, 256)).unwrap();
        builder
            .add_container(&task, ContainerSpec::new("Web", "nginx:latest", 80, "Web", logs))
            .unwrap();
        let service = builder
            .add_service("Service", ServiceSpec::new(&cluster, &task))
            .unwrap();
        (builder, vpc, service)
    }

    fn listener(service: &ServiceRef, container: &str, port: u16) -> ListenerSpec {
        ListenerSpec {
            id: "Public".to_string(),
            port: 80,
            open: true,
            target_group_id: "Web".to_string(),
            target_port: 80,
            targets: vec![ListenerTarget {
                service: service.clone(),
                container_name: container.to_string(),
                container_port: port,
            }],
        }
    }

    #[test]
    fn test_valid_target_passes() {
        let (mut builder, vpc, service) = builder_with_service();
        let lb = builder
            .add_load_balancer("LB", LoadBalancerSpec::new(&vpc, true))
            .unwrap();
        builder.add_listener(&lb, listener(&service, "Web", 80)).unwrap();
        assert!(builder.finish().is_ok());
    }

    #[test]
    fn test_unknown_container_is_rejected() {
        let (mut builder, vpc, service) = builder_with_service();
        let lb = builder
            .add_load_balancer("LB", LoadBalancerSpec::new(&vpc, true))
            .unwrap();
        builder.add_listener(&lb, listener(&service, "Api", 80)).unwrap();
        let err = format!("{:#}", builder.finish().unwrap_err());
        assert!(err.contains("targets container 'Api'"), "{err}");
    }

    #[test]
    fn test_wrong_port_is_rejected() {
        let (mut builder, vpc, service) = builder_with_service();
        let lb = builder
            .add_load_balancer("LB", LoadBalancerSpec::new(&vpc, true))
            .unwrap();
        builder.add_listener(&lb, listener(&service, "Web", 8080)).unwrap();
        let err = format!("{:#}", builder.finish().unwrap_err());
        assert!(err.contains("exposes port 80"), "{err}");
    }

    #[test]
    fn test_duplicate_listener_port_is_rejected() {
        let (mut builder, vpc, service) = builder_with_service();
        let lb = builder
            .add_load_balancer("LB", LoadBalancerSpec::new(&vpc, true))
            .unwrap();
        builder.add_listener(&lb, listener(&service, "Web", 80)).unwrap();
        let mut second = listener(&service, "Web", 80);
        second.id = "Other".to_string();
        assert!(builder.add_listener(&lb, second).is_err());
    }

    #[test]
    fn test_internal_balancer_uses_private_subnets() {
        let (mut builder, vpc, service) = builder_with_service();
        let lb = builder
            .add_load_balancer("LB", LoadBalancerSpec::new(&vpc, false))
            .unwrap();
        builder.add_listener(&lb, listener(&service, "Web", 80)).unwrap();
        let graph = builder.finish().unwrap();
        let template = crate::stack::synthesize(&graph).unwrap().template;

        let (_, balancer) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .next()
            .unwrap();
        assert_eq!(balancer.property("Scheme"), Some(&json!("internal")));
        assert!(balancer.depends_on.is_empty());
    }

    #[test]
    fn test_two_listeners_share_one_target() {
        let (mut builder, vpc, service) = builder_with_service();
        let lb = builder
            .add_load_balancer("LB", LoadBalancerSpec::new(&vpc, true))
            .unwrap();
        builder.add_listener(&lb, listener(&service, "Web", 80)).unwrap();
        let mut alternate = listener(&service, "Web", 80);
        alternate.id = "Alternate".to_string();
        alternate.port = 8080;
        builder.add_listener(&lb, alternate).unwrap();

        let graph = builder.finish().unwrap();
        let template = crate::stack::synthesize(&graph).unwrap().template;

        assert_eq!(template.count_of_type("AWS::ElasticLoadBalancingV2::Listener"), 2);
        assert_eq!(template.count_of_type("AWS::ElasticLoadBalancingV2::TargetGroup"), 2);
        assert_eq!(template.count_of_type("AWS::EC2::SecurityGroupEgress"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::SecurityGroupIngress"), 1);

        let (_, ecs_service) = template.resources_of_type("AWS::ECS::Service").next().unwrap();
        let attachments = ecs_service.property("LoadBalancers").unwrap();
        assert_eq!(attachments.as_array().unwrap().len(), 2);
        assert!(template.validate_references().is_ok());
    }
}
