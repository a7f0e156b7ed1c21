//! The Star Wars API behind an Inigo sidecar, on Fargate behind an ALB
//!
//! The sidecar receives all public traffic on port 80, and forwards GraphQL
//! requests to the service container over localhost. The service token it
//! needs to register with Inigo is injected from Secrets Manager.

use crate::config::StackConfig;
use crate::stack::{
    ClusterSpec, ContainerSpec, ListenerSpec, ListenerTarget, LoadBalancerSpec, LogSinkSpec,
    NetworkSpec, OutputSpec, SecretField, SecretReference, ServiceSpec, StackBuilder, StackGraph,
    TaskSpec,
};
use anyhow::{Context, Result};
use cfnkit::{Environment, RemovalPolicy};

/// Port the Star Wars GraphQL service listens on
pub const SERVICE_PORT: u16 = 8888;

/// Port the sidecar listens on, and the one exposed through the load balancer
pub const SIDECAR_PORT: u16 = 80;

/// Declare the whole stack. No I/O happens here.
pub fn build(config: &StackConfig, environment: Option<Environment>) -> Result<StackGraph> {
    let mut stack = StackBuilder::new(&config.stack.name, environment)?;

    let vpc = stack.add_network(
        "VPC",
        NetworkSpec::new(config.network.max_availability_zones)
            .with_cidr(config.network.cidr()?),
    )?;
    let cluster = stack.add_cluster("Cluster", ClusterSpec { network: vpc.clone() })?;

    let task = stack.add_task(
        "Task",
        TaskSpec::new(config.task.memory_limit_mib, config.task.cpu_units),
    )?;

    let logs = stack.add_log_sink(
        "LogGroup",
        LogSinkSpec {
            retention: config.logs.retention()?,
            removal: RemovalPolicy::Destroy,
        },
    )?;

    stack.add_container(
        &task,
        ContainerSpec::new(
            "Starwars",
            &config.images.starwars,
            SERVICE_PORT,
            "Starwars",
            logs.clone(),
        )
        .with_env("SERVICE_LISTEN_PORT", SERVICE_PORT.to_string()),
    )?;

    // Create it with:
    // aws secretsmanager create-secret --name InigoServiceToken --secret-string '{"SERVICE_TOKEN":"..."}'
    let secret = stack.add_secret("Secret", SecretReference::from_name(&config.secret.name))?;

    stack.add_container(
        &task,
        ContainerSpec::new(
            "Sidecar",
            &config.images.sidecar,
            SIDECAR_PORT,
            "Sidecar",
            logs,
        )
        .with_env("INIGO_ENABLE", "true")
        .with_env("INIGO_LISTEN_PORT", SIDECAR_PORT.to_string())
        .with_env(
            "INIGO_EGRESS_URL",
            format!("http://localhost:{SERVICE_PORT}/query"),
        )
        .with_secret(
            "INIGO_SERVICE_TOKEN",
            SecretField::new(&secret, &config.secret.field),
        ),
    )?;

    let service = stack.add_service("Service", ServiceSpec::new(&cluster, &task))?;

    let lb = stack.add_load_balancer("LoadBalancer", LoadBalancerSpec::new(&vpc, true))?;
    stack.add_listener(
        &lb,
        ListenerSpec {
            id: "PublicListener".to_string(),
            port: 80,
            open: true,
            target_group_id: "StarwarsSidecar".to_string(),
            target_port: SIDECAR_PORT,
            targets: vec![ListenerTarget {
                service,
                container_name: "Sidecar".to_string(),
                container_port: SIDECAR_PORT,
            }],
        },
    )?;

    stack.add_output("Address", OutputSpec::load_balancer_dns(&lb))?;

    stack
        .finish()
        .with_context(|| format!("Invalid stack '{}'", config.stack.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{self, RetentionDays};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn default_graph() -> StackGraph {
        build(&StackConfig::default(), None).unwrap()
    }

    fn default_template() -> cfnkit::Template {
        stack::synthesize(&default_graph()).unwrap().template
    }

    #[test]
    fn test_declares_one_of_each() {
        let graph = default_graph();
        assert_eq!(graph.networks.len(), 1);
        assert_eq!(graph.clusters.len(), 1);
        assert_eq!(graph.tasks.len(), 1);
        assert_eq!(graph.tasks[0].spec.containers.len(), 2);
        assert_eq!(graph.services.len(), 1);
        assert_eq!(graph.load_balancers.len(), 1);
        assert_eq!(graph.load_balancers[0].spec.listeners.len(), 1);
        assert_eq!(graph.outputs.len(), 1);
    }

    #[test]
    fn test_template_resource_counts() {
        let template = default_template();
        for (resource_type, expected) in [
            ("AWS::EC2::VPC", 1),
            ("AWS::ECS::Cluster", 1),
            ("AWS::ECS::TaskDefinition", 1),
            ("AWS::ECS::Service", 1),
            ("AWS::ElasticLoadBalancingV2::LoadBalancer", 1),
            ("AWS::ElasticLoadBalancingV2::Listener", 1),
            ("AWS::ElasticLoadBalancingV2::TargetGroup", 1),
            ("AWS::Logs::LogGroup", 1),
            ("AWS::EC2::Subnet", 4),
            ("AWS::EC2::NatGateway", 2),
        ] {
            assert_eq!(template.count_of_type(resource_type), expected, "{resource_type}");
        }
        assert_eq!(template.outputs.len(), 1);
        assert!(template.outputs.contains_key("Address"));
    }

    #[test]
    fn test_container_ports() {
        let graph = default_graph();
        let containers = &graph.tasks[0].spec.containers;
        assert_eq!(containers[0].name, "Starwars");
        assert_eq!(containers[0].container_port, 8888);
        assert_eq!(containers[1].name, "Sidecar");
        assert_eq!(containers[1].container_port, 80);
    }

    #[test]
    fn test_listener_targets_sidecar() {
        let graph = default_graph();
        let listener = &graph.load_balancers[0].spec.listeners[0];
        assert_eq!(listener.port, 80);
        assert!(listener.open);
        assert_eq!(listener.targets.len(), 1);
        assert_eq!(listener.targets[0].container_name, "Sidecar");
        assert_eq!(listener.targets[0].container_port, 80);

        let template = default_template();
        let (_, service) = template.resources_of_type("AWS::ECS::Service").next().unwrap();
        let attachments = service.property("LoadBalancers").unwrap();
        assert_eq!(attachments[0]["ContainerName"], json!("Sidecar"));
        assert_eq!(attachments[0]["ContainerPort"], json!(80));
        assert_eq!(
            service.property("HealthCheckGracePeriodSeconds"),
            Some(&json!(60))
        );
    }

    #[test]
    fn test_log_group_retention_and_removal() {
        let graph = default_graph();
        assert_eq!(graph.log_sinks[0].spec.retention, RetentionDays::OneDay);
        assert_eq!(graph.log_sinks[0].spec.removal, RemovalPolicy::Destroy);

        let template = default_template();
        let (_, group) = template.resources_of_type("AWS::Logs::LogGroup").next().unwrap();
        assert_eq!(group.property("RetentionInDays"), Some(&json!(1)));
        let body = serde_json::to_value(group).unwrap();
        assert_eq!(body["DeletionPolicy"], json!("Delete"));
        assert_eq!(body["UpdateReplacePolicy"], json!("Delete"));
    }

    #[test]
    fn test_secret_is_a_reference_not_a_literal() {
        let template = default_template();
        let (_, task) = template
            .resources_of_type("AWS::ECS::TaskDefinition")
            .next()
            .unwrap();
        let definitions = task.property("ContainerDefinitions").unwrap();
        let sidecar = &definitions[1];
        assert_eq!(sidecar["Name"], json!("Sidecar"));

        let secrets = sidecar["Secrets"].as_array().unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0]["Name"], json!("INIGO_SERVICE_TOKEN"));
        let value_from = &secrets[0]["ValueFrom"];
        assert!(value_from.get("Fn::Join").is_some());
        let rendered = value_from.to_string();
        assert!(rendered.contains(":secret:InigoServiceToken"));
        assert!(rendered.contains(":SERVICE_TOKEN::"));

        // Never among the plain environment variables
        let environment = sidecar["Environment"].as_array().unwrap();
        assert!(
            environment
                .iter()
                .all(|e| e["Name"] != json!("INIGO_SERVICE_TOKEN"))
        );
    }

    #[test]
    fn test_sidecar_environment() {
        let graph = default_graph();
        let sidecar = &graph.tasks[0].spec.containers[1];
        assert_eq!(sidecar.environment["INIGO_ENABLE"], "true");
        assert_eq!(sidecar.environment["INIGO_LISTEN_PORT"], "80");
        assert_eq!(
            sidecar.environment["INIGO_EGRESS_URL"],
            "http://localhost:8888/query"
        );
        let starwars = &graph.tasks[0].spec.containers[0];
        assert_eq!(starwars.environment["SERVICE_LISTEN_PORT"], "8888");
    }

    #[test]
    fn test_output_is_load_balancer_dns_name() {
        let template = default_template();
        let (lb_id, _) = template
            .resources_of_type("AWS::ElasticLoadBalancingV2::LoadBalancer")
            .next()
            .unwrap();
        let address = &template.outputs["Address"];
        assert_eq!(address.value, json!({ "Fn::GetAtt": [lb_id, "DNSName"] }));
    }

    #[test]
    fn test_rebuild_is_identical() {
        let config = StackConfig::default();
        let first = build(&config, None).unwrap();
        let second = build(&config, None).unwrap();
        assert_eq!(first, second);

        let a = stack::synthesize(&first).unwrap().template;
        let b = stack::synthesize(&second).unwrap().template;
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.to_json_pretty().unwrap(), b.to_json_pretty().unwrap());
    }

    #[test]
    fn test_environment_is_carried_to_artifact() {
        let env = Environment::new("123456789012", "us-east-1");
        let graph = build(&StackConfig::default(), Some(env.clone())).unwrap();
        let artifact = stack::synthesize(&graph).unwrap();
        assert_eq!(artifact.environment, Some(env));
    }

    #[test]
    fn test_references_all_resolve() {
        let template = default_template();
        assert!(template.validate_references().is_ok());
        let json: Value = serde_json::from_str(&template.to_json_pretty().unwrap()).unwrap();
        assert!(json["Resources"].as_object().unwrap().len() > 20);
    }

    #[test]
    fn test_invalid_retention_in_config_fails() {
        let mut config = StackConfig::default();
        config.logs.retention_days = 2;
        assert!(build(&config, None).is_err());
    }

    #[test]
    fn test_unsupported_task_size_fails() {
        let mut config = StackConfig::default();
        config.task.memory_limit_mib = 100;
        assert!(build(&config, None).is_err());
    }
}
