//! Declarative stack model
//!
//! A stack is assembled once through a [`StackBuilder`], which hands out
//! typed handles (`NetworkRef`, `ClusterRef`, ...) for every construct it
//! declares. Later constructs receive those handles explicitly, so the whole
//! dependency graph is visible in the builder calls. [`StackBuilder::finish`]
//! checks that every handle resolves and freezes the result into an
//! immutable [`StackGraph`].
//!
//! Synthesis walks the graph in dependency order and lets each construct
//! emit its CloudFormation resources into a shared [`SynthContext`].

pub mod cluster;
pub mod load_balancer;
pub mod logs;
pub mod network;
pub mod output;
pub mod secret;
pub mod service;
pub mod task;

use anyhow::{Context as _, Result, bail};
use cfnkit::{Environment, ResourceEntry, StackArtifact, Template, logical_id};
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

pub use cluster::ClusterSpec;
pub use load_balancer::{ListenerSpec, ListenerTarget, LoadBalancerSpec};
pub use logs::{LogSinkSpec, RetentionDays};
pub use network::NetworkSpec;
pub use output::{OutputSpec, OutputValue};
pub use secret::{SecretField, SecretReference};
pub use service::ServiceSpec;
pub use task::{ContainerSpec, TaskSpec};

/// CloudFormation stack name rules
const STACK_NAME_RE: &str = r"^[A-Za-z][A-Za-z0-9-]{0,127}$";

/// Construct ids end up in logical ids, so they are kept alphanumeric
const CONSTRUCT_ID_RE: &str = r"^[A-Za-z][A-Za-z0-9]*$";

/// ECS container name rules
const CONTAINER_NAME_RE: &str = r"^[A-Za-z0-9_-]{1,255}$";

// ============================================================================
// Handles
// ============================================================================

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            /// Construct id this handle points at
            pub fn id(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

handle!(
    /// Handle to a declared network
    NetworkRef
);
handle!(
    /// Handle to a declared cluster
    ClusterRef
);
handle!(
    /// Handle to a declared log sink
    LogSinkRef
);
handle!(
    /// Handle to a declared secret reference
    SecretRef
);
handle!(
    /// Handle to a declared task template
    TaskRef
);
handle!(
    /// Handle to a declared service
    ServiceRef
);
handle!(
    /// Handle to a declared load balancer
    LoadBalancerRef
);

// ============================================================================
// Construct trait
// ============================================================================

/// A declared piece of infrastructure that can render itself as
/// CloudFormation resources.
pub trait Construct: fmt::Debug {
    /// Construct category, e.g. "network" or "service"
    fn construct_type(&self) -> &'static str;

    /// Human-readable summary of what gets declared
    fn description(&self) -> String;

    /// Emit resources for the construct declared under `id`
    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()>;
}

/// A construct together with the id it was declared under
#[derive(Debug, Clone, PartialEq)]
pub struct Declared<T> {
    pub id: String,
    pub spec: T,
}

// ============================================================================
// Graph
// ============================================================================

/// The complete, validated declaration of one stack.
#[derive(Debug, Clone, PartialEq)]
pub struct StackGraph {
    pub stack_name: String,
    pub environment: Option<Environment>,
    pub networks: Vec<Declared<NetworkSpec>>,
    pub clusters: Vec<Declared<ClusterSpec>>,
    pub log_sinks: Vec<Declared<LogSinkSpec>>,
    pub secrets: Vec<Declared<SecretReference>>,
    pub tasks: Vec<Declared<TaskSpec>>,
    pub services: Vec<Declared<ServiceSpec>>,
    pub load_balancers: Vec<Declared<LoadBalancerSpec>>,
    pub outputs: Vec<Declared<OutputSpec>>,
}

impl StackGraph {
    fn empty(stack_name: &str, environment: Option<Environment>) -> Self {
        Self {
            stack_name: stack_name.to_string(),
            environment,
            networks: Vec::new(),
            clusters: Vec::new(),
            log_sinks: Vec::new(),
            secrets: Vec::new(),
            tasks: Vec::new(),
            services: Vec::new(),
            load_balancers: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// All constructs in the order they must be synthesized.
    pub fn constructs(&self) -> Vec<(&str, &dyn Construct)> {
        fn entries<T: Construct>(items: &[Declared<T>]) -> impl Iterator<Item = (&str, &dyn Construct)> {
            items.iter().map(|d| (d.id.as_str(), &d.spec as &dyn Construct))
        }

        entries(&self.networks)
            .chain(entries(&self.clusters))
            .chain(entries(&self.log_sinks))
            .chain(entries(&self.secrets))
            .chain(entries(&self.tasks))
            .chain(entries(&self.services))
            .chain(entries(&self.load_balancers))
            .chain(entries(&self.outputs))
            .collect()
    }

    pub fn network(&self, handle: &NetworkRef) -> Option<&NetworkSpec> {
        find(&self.networks, handle.id())
    }

    pub fn cluster(&self, handle: &ClusterRef) -> Option<&ClusterSpec> {
        find(&self.clusters, handle.id())
    }

    pub fn log_sink(&self, handle: &LogSinkRef) -> Option<&LogSinkSpec> {
        find(&self.log_sinks, handle.id())
    }

    pub fn secret(&self, handle: &SecretRef) -> Option<&SecretReference> {
        find(&self.secrets, handle.id())
    }

    pub fn task(&self, handle: &TaskRef) -> Option<&TaskSpec> {
        find(&self.tasks, handle.id())
    }

    pub fn service(&self, handle: &ServiceRef) -> Option<&ServiceSpec> {
        find(&self.services, handle.id())
    }

    pub fn load_balancer(&self, handle: &LoadBalancerRef) -> Option<&LoadBalancerSpec> {
        find(&self.load_balancers, handle.id())
    }

    /// Check that every handle resolves and every listener target exists.
    pub fn validate(&self) -> Result<()> {
        for cluster in &self.clusters {
            if self.network(&cluster.spec.network).is_none() {
                bail!(
                    "cluster '{}' uses unknown network '{}'",
                    cluster.id,
                    cluster.spec.network
                );
            }
        }

        for task in &self.tasks {
            task.spec
                .validate(self)
                .with_context(|| format!("Invalid task '{}'", task.id))?;
        }

        for service in &self.services {
            if self.cluster(&service.spec.cluster).is_none() {
                bail!(
                    "service '{}' uses unknown cluster '{}'",
                    service.id,
                    service.spec.cluster
                );
            }
            if self.task(&service.spec.task).is_none() {
                bail!(
                    "service '{}' uses unknown task '{}'",
                    service.id,
                    service.spec.task
                );
            }
        }

        for lb in &self.load_balancers {
            lb.spec
                .validate(self)
                .with_context(|| format!("Invalid load balancer '{}'", lb.id))?;
        }

        for output in &self.outputs {
            output
                .spec
                .validate(self)
                .with_context(|| format!("Invalid output '{}'", output.id))?;
        }

        Ok(())
    }
}

fn find<'a, T>(items: &'a [Declared<T>], id: &str) -> Option<&'a T> {
    items.iter().find(|d| d.id == id).map(|d| &d.spec)
}

// ============================================================================
// Builder
// ============================================================================

/// Declares constructs and hands out handles to them.
pub struct StackBuilder {
    graph: StackGraph,
    ids: HashSet<String>,
    id_pattern: Regex,
    container_pattern: Regex,
}

impl StackBuilder {
    /// Start a new stack. Fails if `stack_name` is not a valid CloudFormation
    /// stack name.
    pub fn new(stack_name: &str, environment: Option<Environment>) -> Result<Self> {
        let stack_name_pattern = Regex::new(STACK_NAME_RE)?;
        if !stack_name_pattern.is_match(stack_name) {
            bail!(
                "invalid stack name '{stack_name}': must start with a letter and contain only letters, digits and hyphens (max 128)"
            );
        }

        Ok(Self {
            graph: StackGraph::empty(stack_name, environment),
            ids: HashSet::new(),
            id_pattern: Regex::new(CONSTRUCT_ID_RE)?,
            container_pattern: Regex::new(CONTAINER_NAME_RE)?,
        })
    }

    /// Check a construct id for shape, without reserving it.
    pub fn check_id(&self, id: &str) -> Result<()> {
        if !self.id_pattern.is_match(id) {
            bail!("invalid construct id '{id}': use letters and digits, starting with a letter");
        }
        Ok(())
    }

    fn claim(&mut self, id: &str) -> Result<()> {
        self.check_id(id)?;
        if !self.ids.insert(id.to_string()) {
            bail!("construct id '{id}' is already used in this stack");
        }
        Ok(())
    }

    pub fn add_network(&mut self, id: &str, spec: NetworkSpec) -> Result<NetworkRef> {
        spec.validate_for(self.graph.environment.as_ref())?;
        self.claim(id)?;
        self.graph.networks.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(NetworkRef(id.to_string()))
    }

    pub fn add_cluster(&mut self, id: &str, spec: ClusterSpec) -> Result<ClusterRef> {
        self.claim(id)?;
        self.graph.clusters.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(ClusterRef(id.to_string()))
    }

    pub fn add_log_sink(&mut self, id: &str, spec: LogSinkSpec) -> Result<LogSinkRef> {
        self.claim(id)?;
        self.graph.log_sinks.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(LogSinkRef(id.to_string()))
    }

    pub fn add_secret(&mut self, id: &str, spec: SecretReference) -> Result<SecretRef> {
        spec.validate()?;
        self.claim(id)?;
        self.graph.secrets.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(SecretRef(id.to_string()))
    }

    pub fn add_task(&mut self, id: &str, spec: TaskSpec) -> Result<TaskRef> {
        spec.validate_size()?;
        self.claim(id)?;
        self.graph.tasks.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(TaskRef(id.to_string()))
    }

    /// Append a container to a task. Container names are unique per task.
    pub fn add_container(&mut self, task: &TaskRef, container: ContainerSpec) -> Result<()> {
        if !self.container_pattern.is_match(&container.name) {
            bail!(
                "invalid container name '{}': use up to 255 letters, digits, hyphens and underscores",
                container.name
            );
        }
        let spec = self
            .graph
            .tasks
            .iter_mut()
            .find(|d| d.id == task.id())
            .map(|d| &mut d.spec)
            .with_context(|| format!("unknown task '{task}'"))?;
        spec.push_container(container)
    }

    pub fn add_service(&mut self, id: &str, spec: ServiceSpec) -> Result<ServiceRef> {
        self.claim(id)?;
        self.graph.services.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(ServiceRef(id.to_string()))
    }

    pub fn add_load_balancer(&mut self, id: &str, spec: LoadBalancerSpec) -> Result<LoadBalancerRef> {
        self.claim(id)?;
        self.graph.load_balancers.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(LoadBalancerRef(id.to_string()))
    }

    /// Attach a listener to a load balancer.
    pub fn add_listener(&mut self, lb: &LoadBalancerRef, listener: ListenerSpec) -> Result<()> {
        self.check_id(&listener.id)?;
        self.check_id(&listener.target_group_id)?;
        let spec = self
            .graph
            .load_balancers
            .iter_mut()
            .find(|d| d.id == lb.id())
            .map(|d| &mut d.spec)
            .with_context(|| format!("unknown load balancer '{lb}'"))?;
        spec.push_listener(listener)
    }

    pub fn add_output(&mut self, id: &str, spec: OutputSpec) -> Result<()> {
        self.claim(id)?;
        self.graph.outputs.push(Declared {
            id: id.to_string(),
            spec,
        });
        Ok(())
    }

    /// Validate all cross references and return the frozen graph.
    pub fn finish(self) -> Result<StackGraph> {
        self.graph.validate()?;
        Ok(self.graph)
    }
}

// ============================================================================
// Synthesis
// ============================================================================

/// Logical ids and attributes of the network resources
#[derive(Debug, Clone)]
pub struct NetworkAttrs {
    pub vpc: String,
    pub public_subnets: Vec<String>,
    pub private_subnets: Vec<String>,
    /// Internet routes of the public subnets; internet-facing resources
    /// must wait for them
    pub public_routes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ClusterAttrs {
    pub logical_id: String,
    pub network: NetworkRef,
}

#[derive(Debug, Clone)]
pub struct SecretAttrs {
    /// Partial ARN (no random suffix) for container `valueFrom`
    pub arn: Value,
    /// ARN with wildcard suffix for IAM statements
    pub arn_pattern: Value,
}

#[derive(Debug, Clone)]
pub struct TaskAttrs {
    pub logical_id: String,
    pub task_role: String,
}

#[derive(Debug, Clone)]
pub struct ServiceAttrs {
    pub logical_id: String,
    pub security_group: String,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerAttrs {
    pub logical_id: String,
    pub security_group: String,
}

/// Shared state while rendering a graph into a template.
pub struct SynthContext<'g> {
    pub graph: &'g StackGraph,
    pub template: Template,
    networks: HashMap<String, NetworkAttrs>,
    clusters: HashMap<String, ClusterAttrs>,
    log_sinks: HashMap<String, String>,
    secrets: HashMap<String, SecretAttrs>,
    tasks: HashMap<String, TaskAttrs>,
    services: HashMap<String, ServiceAttrs>,
    load_balancers: HashMap<String, LoadBalancerAttrs>,
}

macro_rules! lookup {
    ($fn:ident, $field:ident, $handle:ty, $attrs:ty, $kind:literal) => {
        pub fn $fn(&self, handle: &$handle) -> Result<&$attrs> {
            self.$field.get(handle.id()).with_context(|| {
                format!(concat!($kind, " '{}' has not been synthesized"), handle)
            })
        }
    };
}

impl<'g> SynthContext<'g> {
    pub fn new(graph: &'g StackGraph) -> Self {
        Self {
            graph,
            template: Template::new(),
            networks: HashMap::new(),
            clusters: HashMap::new(),
            log_sinks: HashMap::new(),
            secrets: HashMap::new(),
            tasks: HashMap::new(),
            services: HashMap::new(),
            load_balancers: HashMap::new(),
        }
    }

    /// Add a resource at a construct path and return its logical id.
    pub fn add(&mut self, path: &[&str], entry: ResourceEntry) -> Result<String> {
        let id = logical_id::from_path(path)?;
        log::trace!("{} -> {} ({})", path.join("/"), id, entry.resource_type);
        self.template.add_resource(&id, entry)?;
        Ok(id)
    }

    /// Like [`SynthContext::add`], but a resource already present at `path`
    /// is kept and its logical id returned.
    pub fn add_once(&mut self, path: &[&str], entry: ResourceEntry) -> Result<String> {
        let id = logical_id::from_path(path)?;
        if self.template.resource(&id).is_some() {
            log::trace!("{} already synthesized as {}", path.join("/"), id);
            return Ok(id);
        }
        self.add(path, entry)
    }

    /// Full construct path including the stack name, used for `Name` tags
    pub fn path_name(&self, path: &[&str]) -> String {
        format!("{}/{}", self.graph.stack_name, path.join("/"))
    }

    pub fn register_network(&mut self, id: &str, attrs: NetworkAttrs) {
        self.networks.insert(id.to_string(), attrs);
    }

    pub fn register_cluster(&mut self, id: &str, attrs: ClusterAttrs) {
        self.clusters.insert(id.to_string(), attrs);
    }

    pub fn register_log_sink(&mut self, id: &str, logical_id: String) {
        self.log_sinks.insert(id.to_string(), logical_id);
    }

    pub fn register_secret(&mut self, id: &str, attrs: SecretAttrs) {
        self.secrets.insert(id.to_string(), attrs);
    }

    pub fn register_task(&mut self, id: &str, attrs: TaskAttrs) {
        self.tasks.insert(id.to_string(), attrs);
    }

    pub fn register_service(&mut self, id: &str, attrs: ServiceAttrs) {
        self.services.insert(id.to_string(), attrs);
    }

    pub fn register_load_balancer(&mut self, id: &str, attrs: LoadBalancerAttrs) {
        self.load_balancers.insert(id.to_string(), attrs);
    }

    lookup!(network, networks, NetworkRef, NetworkAttrs, "network");
    lookup!(cluster, clusters, ClusterRef, ClusterAttrs, "cluster");
    lookup!(log_sink, log_sinks, LogSinkRef, String, "log sink");
    lookup!(secret, secrets, SecretRef, SecretAttrs, "secret");
    lookup!(task, tasks, TaskRef, TaskAttrs, "task");
    lookup!(service, services, ServiceRef, ServiceAttrs, "service");
    lookup!(
        load_balancer,
        load_balancers,
        LoadBalancerRef,
        LoadBalancerAttrs,
        "load balancer"
    );
}

/// Render a graph into a stack artifact ready to be written.
pub fn synthesize(graph: &StackGraph) -> Result<StackArtifact> {
    let mut ctx = SynthContext::new(graph);

    for (id, construct) in graph.constructs() {
        log::debug!("Synthesizing {} '{}'", construct.construct_type(), id);
        construct
            .synthesize(id, &mut ctx)
            .with_context(|| format!("Failed to synthesize {} '{}'", construct.construct_type(), id))?;
    }

    ctx.template
        .validate_references()
        .context("Synthesized template has dangling references")?;

    log::info!(
        "Synthesized {} resources and {} outputs for stack {}",
        ctx.template.resources.len(),
        ctx.template.outputs.len(),
        graph.stack_name
    );

    Ok(StackArtifact {
        stack_name: graph.stack_name.clone(),
        environment: graph.environment.clone(),
        template: ctx.template,
    })
}

/// `[{Key: "Name", Value: <path>}]`
pub(crate) fn name_tag(name: String) -> Value {
    serde_json::json!([{ "Key": "Name", "Value": name }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_name_rules() {
        assert!(StackBuilder::new("InigoStarwarsExample", None).is_ok());
        assert!(StackBuilder::new("dev-stack-2", None).is_ok());
        assert!(StackBuilder::new("", None).is_err());
        assert!(StackBuilder::new("2fast", None).is_err());
        assert!(StackBuilder::new("has_underscore", None).is_err());
        assert!(StackBuilder::new(&"a".repeat(129), None).is_err());
    }

    #[test]
    fn test_duplicate_construct_id_is_rejected() {
        let mut builder = StackBuilder::new("Demo", None).unwrap();
        builder.add_network("VPC", NetworkSpec::new(2)).unwrap();
        let err = builder.add_network("VPC", NetworkSpec::new(2)).unwrap_err();
        assert!(err.to_string().contains("already used"));
    }

    #[test]
    fn test_invalid_construct_id_is_rejected() {
        let mut builder = StackBuilder::new("Demo", None).unwrap();
        assert!(builder.add_network("my-vpc", NetworkSpec::new(2)).is_err());
        assert!(builder.add_network("", NetworkSpec::new(2)).is_err());
    }

    #[test]
    fn test_foreign_handle_fails_validation() {
        let mut other = StackBuilder::new("Other", None).unwrap();
        let foreign = other.add_network("Elsewhere", NetworkSpec::new(2)).unwrap();

        let mut builder = StackBuilder::new("Demo", None).unwrap();
        builder
            .add_cluster("Cluster", ClusterSpec { network: foreign })
            .unwrap();
        let err = builder.finish().unwrap_err();
        assert!(err.to_string().contains("unknown network 'Elsewhere'"));
    }

    #[test]
    fn test_container_on_unknown_task() {
        let mut builder = StackBuilder::new("Demo", None).unwrap();
        let sink = builder
            .add_log_sink("Logs", LogSinkSpec::default())
            .unwrap();
        let err = builder
            .add_container(
                &TaskRef("Missing".to_string()),
                ContainerSpec::new("App", "nginx:latest", 80, "App", sink),
            )
            .unwrap_err();
        assert!(err.to_string().contains("unknown task 'Missing'"));
    }

    #[test]
    fn test_container_name_rules() {
        let mut builder = StackBuilder::new("Demo", None).unwrap();
        let sink = builder
            .add_log_sink("Logs", LogSinkSpec::default())
            .unwrap();
        let task = builder.add_task("Task", TaskSpec::new(512, 256)).unwrap();

        for name in ["web-proxy", "api_v2", "2nd"] {
            builder
                .add_container(&task, ContainerSpec::new(name, "nginx:latest", 80, "App", sink.clone()))
                .unwrap();
        }
        let too_long = "a".repeat(256);
        for name in ["", "has space", "dot.ted", too_long.as_str()] {
            let err = builder
                .add_container(&task, ContainerSpec::new(name, "nginx:latest", 80, "App", sink.clone()))
                .unwrap_err();
            assert!(err.to_string().contains("invalid container name"), "{err}");
        }
    }

    #[test]
    fn test_empty_graph_synthesizes_empty_template() {
        let graph = StackBuilder::new("Empty", None).unwrap().finish().unwrap();
        let artifact = synthesize(&graph).unwrap();
        assert!(artifact.template.resources.is_empty());
        assert_eq!(artifact.stack_name, "Empty");
    }
}
