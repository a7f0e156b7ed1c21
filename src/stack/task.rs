//! Task template: resource limits plus container definitions

use super::{Construct, LogSinkRef, SecretField, StackGraph, SynthContext, TaskAttrs};
use anyhow::{Result, bail};
use cfnkit::{ResourceEntry, intrinsic};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// One container of a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub container_port: u16,
    pub log_stream_prefix: String,
    pub log_sink: LogSinkRef,
    pub environment: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, SecretField>,
}

impl ContainerSpec {
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        container_port: u16,
        log_stream_prefix: impl Into<String>,
        log_sink: LogSinkRef,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            container_port,
            log_stream_prefix: log_stream_prefix.into(),
            log_sink,
            environment: BTreeMap::new(),
            secrets: BTreeMap::new(),
        }
    }

    /// Add a plain environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Inject a secret field as an environment variable at task start.
    pub fn with_secret(mut self, key: impl Into<String>, field: SecretField) -> Self {
        self.secrets.insert(key.into(), field);
        self
    }

    fn definition(&self, ctx: &SynthContext) -> Result<Value> {
        let log_group = ctx.log_sink(&self.log_sink)?;

        let mut definition = json!({
            "Essential": true,
            "Image": self.image,
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": intrinsic::reference(log_group),
                    "awslogs-stream-prefix": self.log_stream_prefix,
                    "awslogs-region": intrinsic::reference(intrinsic::REGION),
                },
            },
            "Name": self.name,
            "PortMappings": [{ "ContainerPort": self.container_port, "Protocol": "tcp" }],
        });

        if !self.environment.is_empty() {
            let environment: Vec<Value> = self
                .environment
                .iter()
                .map(|(name, value)| json!({ "Name": name, "Value": value }))
                .collect();
            definition["Environment"] = Value::Array(environment);
        }

        if !self.secrets.is_empty() {
            let mut secrets = Vec::with_capacity(self.secrets.len());
            for (name, field) in &self.secrets {
                let attrs = ctx.secret(&field.secret)?;
                secrets.push(json!({ "Name": name, "ValueFrom": field.value_from(attrs) }));
            }
            definition["Secrets"] = Value::Array(secrets);
        }

        Ok(definition)
    }
}

/// Fargate CPU units and the memory sizes (MiB) each supports.
fn fargate_memory_options(cpu_units: u32) -> Option<Vec<u32>> {
    let range = |from: u32, to: u32| (from..=to).step_by(1024).collect::<Vec<_>>();
    match cpu_units {
        256 => Some(vec![512, 1024, 2048]),
        512 => Some(range(1024, 4096)),
        1024 => Some(range(2048, 8192)),
        2048 => Some(range(4096, 16384)),
        4096 => Some(range(8192, 30720)),
        _ => None,
    }
}

/// A unit of deployable work.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub memory_limit_mib: u32,
    pub cpu_units: u32,
    pub containers: Vec<ContainerSpec>,
}

impl TaskSpec {
    /// Task with no containers yet
    pub fn new(memory_limit_mib: u32, cpu_units: u32) -> Self {
        Self {
            memory_limit_mib,
            cpu_units,
            containers: Vec::new(),
        }
    }

    /// Check the CPU/memory pair is one Fargate can run.
    pub fn validate_size(&self) -> Result<()> {
        let Some(options) = fargate_memory_options(self.cpu_units) else {
            bail!(
                "unsupported CPU value {} (use 256, 512, 1024, 2048 or 4096)",
                self.cpu_units
            );
        };
        if !options.contains(&self.memory_limit_mib) {
            bail!(
                "{} MiB is not a valid memory size for {} CPU units",
                self.memory_limit_mib,
                self.cpu_units
            );
        }
        Ok(())
    }

    pub(super) fn push_container(&mut self, container: ContainerSpec) -> Result<()> {
        if self.containers.iter().any(|c| c.name == container.name) {
            bail!("container '{}' is already defined", container.name);
        }
        self.containers.push(container);
        Ok(())
    }

    /// Find a container by name.
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub(super) fn validate(&self, graph: &StackGraph) -> Result<()> {
        if self.containers.is_empty() {
            bail!("task has no containers");
        }
        for container in &self.containers {
            if graph.log_sink(&container.log_sink).is_none() {
                bail!(
                    "container '{}' logs to unknown log sink '{}'",
                    container.name,
                    container.log_sink
                );
            }
            for (key, field) in &container.secrets {
                if graph.secret(&field.secret).is_none() {
                    bail!(
                        "secret {key} of container '{}' uses unknown secret '{}'",
                        container.name,
                        field.secret
                    );
                }
            }
        }
        Ok(())
    }
}

fn assume_role_policy() -> Value {
    json!({
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Principal": { "Service": "ecs-tasks.amazonaws.com" },
        }],
        "Version": "2012-10-17",
    })
}

impl Construct for TaskSpec {
    fn construct_type(&self) -> &'static str {
        "task"
    }

    fn description(&self) -> String {
        let names: Vec<String> = self
            .containers
            .iter()
            .map(|c| format!("{}:{}", c.name, c.container_port))
            .collect();
        format!(
            "Fargate task, {} CPU units / {} MiB, containers [{}]",
            self.cpu_units,
            self.memory_limit_mib,
            names.join(", ")
        )
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let task_role = ctx.add(
            &[id, "TaskRole"],
            ResourceEntry::new("AWS::IAM::Role")
                .with_property("AssumeRolePolicyDocument", assume_role_policy()),
        )?;

        let execution_role = ctx.add(
            &[id, "ExecutionRole"],
            ResourceEntry::new("AWS::IAM::Role")
                .with_property("AssumeRolePolicyDocument", assume_role_policy()),
        )?;

        let definitions = self
            .containers
            .iter()
            .map(|c| c.definition(ctx))
            .collect::<Result<Vec<_>>>()?;

        // The execution role pulls secrets and writes logs on the task's behalf
        let mut statements = Vec::new();
        let mut seen_sinks = Vec::new();
        let mut seen_secrets = Vec::new();
        for container in &self.containers {
            if !seen_sinks.contains(&container.log_sink) {
                let log_group = ctx.log_sink(&container.log_sink)?;
                statements.push(json!({
                    "Action": ["logs:CreateLogStream", "logs:PutLogEvents"],
                    "Effect": "Allow",
                    "Resource": intrinsic::get_att(log_group, "Arn"),
                }));
                seen_sinks.push(container.log_sink.clone());
            }
            for field in container.secrets.values() {
                if !seen_secrets.contains(&field.secret) {
                    let attrs = ctx.secret(&field.secret)?;
                    statements.push(json!({
                        "Action": ["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                        "Effect": "Allow",
                        "Resource": attrs.arn_pattern,
                    }));
                    seen_secrets.push(field.secret.clone());
                }
            }
        }

        if !statements.is_empty() {
            let policy_path = [id, "ExecutionRole", "DefaultPolicy"];
            let policy_name = cfnkit::logical_id::from_path(&policy_path)?;
            ctx.add(
                &policy_path,
                ResourceEntry::new("AWS::IAM::Policy").with_properties(json!({
                    "PolicyDocument": { "Statement": statements, "Version": "2012-10-17" },
                    "PolicyName": policy_name,
                    "Roles": [intrinsic::reference(&execution_role)],
                })),
            )?;
        }

        let family = format!("{}{}", ctx.graph.stack_name.replace('-', ""), id);
        let logical_id = ctx.add(
            &[id, "Resource"],
            ResourceEntry::new("AWS::ECS::TaskDefinition").with_properties(json!({
                "ContainerDefinitions": definitions,
                "Cpu": self.cpu_units.to_string(),
                "ExecutionRoleArn": intrinsic::get_att(&execution_role, "Arn"),
                "Family": family,
                "Memory": self.memory_limit_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "TaskRoleArn": intrinsic::get_att(&task_role, "Arn"),
            })),
        )?;

        ctx.register_task(
            id,
            TaskAttrs {
                logical_id,
                task_role,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fargate_sizes() {
        assert!(TaskSpec::new(512, 256).validate_size().is_ok());
        assert!(TaskSpec::new(3072, 512).validate_size().is_ok());
        assert!(TaskSpec::new(30720, 4096).validate_size().is_ok());
        assert!(TaskSpec::new(4096, 256).validate_size().is_err());
        assert!(TaskSpec::new(512, 300).validate_size().is_err());
    }

    #[test]
    fn test_duplicate_container_name() {
        let sink = LogSinkRef("Logs".to_string());
        let mut task = TaskSpec::new(512, 256);
        task.push_container(ContainerSpec::new("App", "a", 80, "App", sink.clone()))
            .unwrap();
        let err = task
            .push_container(ContainerSpec::new("App", "b", 81, "App", sink))
            .unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn test_container_lookup() {
        let sink = LogSinkRef("Logs".to_string());
        let mut task = TaskSpec::new(512, 256);
        task.push_container(ContainerSpec::new("Web", "nginx", 80, "Web", sink))
            .unwrap();
        assert_eq!(task.container("Web").map(|c| c.container_port), Some(80));
        assert!(task.container("Db").is_none());
    }
}
