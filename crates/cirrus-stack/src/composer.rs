//! Composition of the serverless web stack.
//!
//! Declares, in dependency order: the network and its three subnets, the
//! database with its subnet group, parameter group, generated password and
//! security groups, the artifact bucket and object, the execution role and
//! its policy attachments, the compute function, the HTTP gateway with its
//! invoke permission, and the public `url` output.
//!
//! Composition either returns a fully resolved [`Synthesis`] or an error;
//! no partial graph ever leaves this module, and the caller's
//! [`StackState`] is only updated on success.

use std::collections::BTreeMap;
use std::path::Path;

use cirrus_artifact::{Artifact, Packager};
use cirrus_common::config::StackConfig;
use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::ResourceId;
use cirrus_graph::blocks::{Protocol, SecurityRule, VpcConfig, rules_value};
use cirrus_graph::graph::StackGraph;
use cirrus_graph::node::{Attributes, ResourceKind, ResourceNode};
use cirrus_graph::synth::{Document, Metadata, Provider};
use cirrus_graph::value::{Reference, Segment, Value};

use crate::naming::NameAllocator;
use crate::secret::{SecretGenerator, SecretPolicy};
use crate::state::StackState;

const PROVIDER_NAME: &str = "aws";
const NETWORK_CIDR: &str = "10.0.0.0/16";
const SUBNETS: [(&str, &str, char); 3] = [
    ("subnet1", "10.0.0.0/24", 'a'),
    ("subnet2", "10.0.1.0/24", 'b'),
    ("subnet3", "10.0.2.0/24", 'c'),
];
const DB_ENGINE: &str = "postgres";
const DB_ENGINE_VERSION: &str = "14.6";
const DB_PARAMETER_FAMILY: &str = "postgres14";
const DB_INSTANCE_CLASS: &str = "db.t4g.micro";
const DB_ALLOCATED_STORAGE_GIB: u32 = 10;
const DB_BACKUP_RETENTION_DAYS: u32 = 7;
const DB_NAME: &str = "postgres";
const DB_USERNAME: &str = "postgres";
const FUNCTION_TIMEOUT_SECS: u32 = 600;
const FUNCTION_SERVICE: &str = "lambda.amazonaws.com";
const GATEWAY_SERVICE: &str = "apigateway.amazonaws.com";
const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
const VPC_ACCESS_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaVPCAccessExecutionRole";

/// Node ids of the composed stack.
pub mod ids {
    /// Private network.
    pub const NETWORK: &str = "vpc";
    /// Database subnet group.
    pub const DB_SUBNET_GROUP: &str = "db-subnet-group";
    /// Database parameter group.
    pub const DB_PARAMETER_GROUP: &str = "db-parameter";
    /// Generated database password.
    pub const DB_PASSWORD: &str = "db-password";
    /// Security group of the compute function.
    pub const FUNCTION_SECURITY_GROUP: &str = "lambda-sg";
    /// Security group of the database.
    pub const DB_SECURITY_GROUP: &str = "db-sg";
    /// Database instance.
    pub const DATABASE: &str = "db";
    /// Artifact bucket.
    pub const BUCKET: &str = "bucket";
    /// Uploaded artifact object.
    pub const ARCHIVE: &str = "lambda-archive";
    /// Execution role.
    pub const ROLE: &str = "lambda-exec";
    /// Basic execution policy attachment.
    pub const BASIC_POLICY: &str = "lambda-managed-policy";
    /// Network-interface policy attachment.
    pub const VPC_POLICY: &str = "lambda-vpc-policy";
    /// Compute function.
    pub const FUNCTION: &str = "function";
    /// HTTP gateway.
    pub const GATEWAY: &str = "api-gw";
    /// Gateway invoke permission.
    pub const PERMISSION: &str = "apigw-lambda";
    /// Public endpoint output.
    pub const URL: &str = "url";
}

/// Result of composing one stack.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// Stack name.
    pub stack: String,
    /// Resolved resource graph.
    pub graph: StackGraph,
    /// Resolution order.
    pub order: Vec<ResourceId>,
    /// Packaged compute artifact.
    pub artifact: Artifact,
    /// Document for the provisioning engine.
    pub document: Document,
}

impl Synthesis {
    /// Expression of a declared output.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&Value> {
        self.document.body.outputs.get(name).map(|o| &o.value)
    }
}

/// Configuration after required fields have been checked.
#[derive(Debug)]
struct Settings<'a> {
    path: &'a Path,
    handler: &'a str,
    runtime: &'a str,
    stage_name: &'a str,
    version: &'a str,
    region: &'a str,
    db_port: u16,
}

impl<'a> Settings<'a> {
    fn from_config(config: &'a StackConfig) -> Result<Self> {
        let path = config
            .artifact_path()
            .ok_or_else(|| missing(ids::ARCHIVE, "path"))?;
        let handler = StackConfig::non_blank(config.handler.as_deref())
            .ok_or_else(|| missing(ids::FUNCTION, "handler"))?;
        let runtime = StackConfig::non_blank(config.runtime.as_deref())
            .ok_or_else(|| missing(ids::FUNCTION, "runtime"))?;
        let stage_name = StackConfig::non_blank(config.stage_name.as_deref())
            .ok_or_else(|| missing(ids::GATEWAY, "stage_name"))?;
        let version = StackConfig::non_blank(config.version.as_deref())
            .ok_or_else(|| missing(ids::ARCHIVE, "version"))?;
        let region = StackConfig::non_blank(Some(config.region.as_str()))
            .ok_or_else(|| missing(ids::NETWORK, "region"))?;
        if config.db_port == 0 {
            return Err(CirrusError::validation(
                ids::DATABASE,
                "db_port",
                "port must be between 1 and 65535",
            ));
        }
        Ok(Self {
            path,
            handler,
            runtime,
            stage_name,
            version,
            region,
            db_port: config.db_port,
        })
    }
}

fn missing(resource: &str, field: &str) -> CirrusError {
    CirrusError::validation(resource, field, "required configuration field is missing")
}

fn id(raw: &str) -> Result<ResourceId> {
    ResourceId::new(raw)
}

/// Composes stack `name` from `config`.
///
/// Configuration is validated before anything touches the filesystem. On
/// success `state` holds the identity token and secret handles the
/// synthesis used and must be persisted by the caller; on failure it is
/// left untouched.
///
/// # Errors
///
/// Returns `CirrusError::Validation` for missing or malformed
/// configuration, `CirrusError::Packaging` if the artifact cannot be
/// packaged, and `CirrusError::Cycle` if the declaration is cyclic.
pub fn compose(
    name: &str,
    config: &StackConfig,
    state: &mut StackState,
    packager: &Packager,
) -> Result<Synthesis> {
    tracing::info!(stack = name, "composing stack");
    let settings = Settings::from_config(config)?;
    if state.stack != name {
        return Err(CirrusError::validation(
            name,
            "state",
            format!("state belongs to stack \"{}\"", state.stack),
        ));
    }

    let mut next = state.clone();
    let names = NameAllocator::new(name, &mut next)?;
    let artifact = packager.package(settings.path, settings.version)?;

    let mut composer = Composer {
        graph: StackGraph::new(name),
        names: &names,
        settings: &settings,
        state: &mut next,
    };
    composer.declare_all(&artifact)?;
    let mut graph = composer.graph;

    let order = graph.resolve()?;
    let document = Document::build(
        &graph,
        &order,
        Provider {
            name: PROVIDER_NAME.to_owned(),
            region: settings.region.to_owned(),
        },
        Metadata::new(name, names.token().as_str()),
    );

    *state = next;
    tracing::info!(
        stack = name,
        resources = order.len(),
        token = %names.token(),
        "stack synthesized"
    );
    Ok(Synthesis {
        stack: name.to_owned(),
        graph,
        order,
        artifact,
        document,
    })
}

/// Ids of the database tier the function connects to.
struct Database {
    instance: ResourceId,
    password: ResourceId,
    client_security_group: ResourceId,
}

struct Composer<'a> {
    graph: StackGraph,
    names: &'a NameAllocator,
    settings: &'a Settings<'a>,
    state: &'a mut StackState,
}

impl Composer<'_> {
    fn declare_all(&mut self, artifact: &Artifact) -> Result<()> {
        let network = self.network()?;
        let subnets = self.subnets(&network)?;
        let database = self.database(&network, &subnets)?;
        let (bucket, archive) = self.storage(artifact)?;
        let role = self.execution_role()?;
        let function = self.function(&subnets, &database, &bucket, &archive, &role)?;
        self.gateway(&function)
    }

    fn add(&mut self, raw_id: &str, kind: ResourceKind, attributes: Attributes) -> Result<ResourceId> {
        let attributes = if kind.is_taggable() {
            attributes.with("tags", self.tags())
        } else {
            attributes
        };
        let node = ResourceNode::new(id(raw_id)?, kind, attributes)?;
        Ok(self.graph.add(node)?.id().clone())
    }

    fn tags(&self) -> Value {
        let mut tags = BTreeMap::new();
        let _ = tags.insert("Stack".to_owned(), Value::from(self.names.stack()));
        let _ = tags.insert("Stage".to_owned(), Value::from(self.settings.stage_name));
        Value::Map(tags)
    }

    fn network(&mut self) -> Result<ResourceId> {
        self.add(
            ids::NETWORK,
            ResourceKind::Network,
            Attributes::new()
                .with("cidr_block", NETWORK_CIDR)
                .with("enable_dns_support", true)
                .with("enable_dns_hostnames", true),
        )
    }

    fn subnets(&mut self, network: &ResourceId) -> Result<Vec<ResourceId>> {
        SUBNETS
            .iter()
            .map(|&(subnet_id, cidr, zone)| {
                let availability_zone = format!("{}{zone}", self.settings.region);
                self.add(
                    subnet_id,
                    ResourceKind::Subnet,
                    Attributes::new()
                        .with("vpc_id", Reference::new(network, "id"))
                        .with("cidr_block", cidr)
                        .with("availability_zone", availability_zone)
                        .with("map_public_ip_on_launch", false),
                )
            })
            .collect()
    }

    /// Declares the database and everything it binds.
    fn database(&mut self, network: &ResourceId, subnets: &[ResourceId]) -> Result<Database> {
        let subnet_ids: Vec<Reference> = subnets.iter().map(|s| Reference::new(s, "id")).collect();

        let subnet_group = self.add(
            ids::DB_SUBNET_GROUP,
            ResourceKind::DbSubnetGroup,
            Attributes::new()
                .with("name", self.names.allocate("db-group")?)
                .with("subnet_ids", subnet_ids),
        )?;
        let parameter_group = self.add(
            ids::DB_PARAMETER_GROUP,
            ResourceKind::DbParameterGroup,
            Attributes::new()
                .with("name", self.names.allocate("parameter")?)
                .with("family", DB_PARAMETER_FAMILY),
        )?;

        let handle = SecretGenerator::new(self.names.stack(), self.state)
            .generate(ids::DB_PASSWORD, &SecretPolicy::database_password())?;
        let password = self.graph.add(handle.to_node()?)?.id().clone();

        let function_sg = self.add(
            ids::FUNCTION_SECURITY_GROUP,
            ResourceKind::SecurityGroup,
            Attributes::new()
                .with("name", self.names.allocate("lambda-sg")?)
                .with("vpc_id", Reference::new(network, "id"))
                .with("egress", rules_value(&[SecurityRule::allow_all()])),
        )?;

        let db_sg_id = id(ids::DB_SECURITY_GROUP)?;
        let ingress = SecurityRule::builder(Protocol::Tcp)
            .port(self.settings.db_port)
            .security_group(Reference::new(&function_sg, "id"))
            .build(&db_sg_id, "ingress")?;
        let db_sg = self.add(
            ids::DB_SECURITY_GROUP,
            ResourceKind::SecurityGroup,
            Attributes::new()
                .with("name", self.names.allocate("db-sg")?)
                .with("vpc_id", Reference::new(network, "id"))
                .with("ingress", rules_value(&[ingress]))
                .with("egress", rules_value(&[SecurityRule::allow_all()])),
        )?;

        let database_id = id(ids::DATABASE)?;
        self.graph.grant(&password, &database_id);
        let instance = self.add(
            ids::DATABASE,
            ResourceKind::DbInstance,
            Attributes::new()
                .with("identifier", self.names.allocate("db")?)
                .with("engine", DB_ENGINE)
                .with("engine_version", DB_ENGINE_VERSION)
                .with("instance_class", DB_INSTANCE_CLASS)
                .with("allocated_storage", DB_ALLOCATED_STORAGE_GIB)
                .with("storage_encrypted", true)
                .with("multi_az", false)
                .with("db_subnet_group_name", Reference::new(&subnet_group, "name"))
                .with("vpc_security_group_ids", vec![Reference::new(&db_sg, "id")])
                .with("db_name", DB_NAME)
                .with("username", DB_USERNAME)
                .with("password", handle.result())
                .with("port", self.settings.db_port)
                .with("parameter_group_name", Reference::new(&parameter_group, "name"))
                .with("backup_retention_period", DB_BACKUP_RETENTION_DAYS)
                .with("skip_final_snapshot", true)
                .with("apply_immediately", true),
        )?;
        Ok(Database {
            instance,
            password,
            client_security_group: function_sg,
        })
    }

    fn storage(&mut self, artifact: &Artifact) -> Result<(ResourceId, ResourceId)> {
        let bucket_name = self.names.allocate_global("bucket")?;
        let bucket = self.add(
            ids::BUCKET,
            ResourceKind::Bucket,
            Attributes::new().with("bucket", bucket_name),
        )?;
        let archive = self.add(
            ids::ARCHIVE,
            ResourceKind::Artifact,
            Attributes::new()
                .with("bucket", Reference::new(&bucket, "bucket"))
                .with("key", artifact.storage_key())
                .with("source", artifact.relative_archive_path())
                .with("etag", artifact.content_hash.as_hex()),
        )?;
        Ok((bucket, archive))
    }

    fn execution_role(&mut self) -> Result<ResourceId> {
        let trust_policy = serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Principal": { "Service": FUNCTION_SERVICE },
                "Effect": "Allow",
                "Sid": "",
            }],
        });
        let role = self.add(
            ids::ROLE,
            ResourceKind::Role,
            Attributes::new()
                .with("name", self.names.allocate_global("lambda-exec")?)
                .with("assume_role_policy", serde_json::to_string(&trust_policy)?),
        )?;
        for (attachment, policy_arn) in [
            (ids::BASIC_POLICY, BASIC_EXECUTION_POLICY),
            (ids::VPC_POLICY, VPC_ACCESS_POLICY),
        ] {
            let _ = self.add(
                attachment,
                ResourceKind::RolePolicyAttachment,
                Attributes::new()
                    .with("role", Reference::new(&role, "name"))
                    .with("policy_arn", policy_arn),
            )?;
        }
        Ok(role)
    }

    fn function(
        &mut self,
        subnets: &[ResourceId],
        database: &Database,
        bucket: &ResourceId,
        archive: &ResourceId,
        role: &ResourceId,
    ) -> Result<ResourceId> {
        let function_id = id(ids::FUNCTION)?;
        let vpc_config = VpcConfig::new(
            &function_id,
            subnets.iter().map(|s| Reference::new(s, "id")).collect(),
            vec![Reference::new(&database.client_security_group, "id")],
        )?;

        let mut variables = BTreeMap::new();
        let _ = variables.insert("DB_URL".to_owned(), Value::Ref(Reference::new(&database.instance, "address")));
        let _ = variables.insert("DB_PORT".to_owned(), Value::Ref(Reference::new(&database.instance, "port")));
        let _ = variables.insert(
            "DB_PASSWORD".to_owned(),
            Value::Ref(Reference::new(&database.password, "result")),
        );
        let mut environment = BTreeMap::new();
        let _ = environment.insert("variables".to_owned(), Value::Map(variables));

        self.graph.grant(&database.password, &function_id);
        self.add(
            ids::FUNCTION,
            ResourceKind::ComputeFunction,
            Attributes::new()
                .with("function_name", self.names.allocate_global("function")?)
                .with("timeout", FUNCTION_TIMEOUT_SECS)
                .with("s3_bucket", Reference::new(bucket, "bucket"))
                .with("s3_key", Reference::new(archive, "key"))
                .with("handler", self.settings.handler)
                .with("runtime", self.settings.runtime)
                .with("role", Reference::new(role, "arn"))
                .with("vpc_config", vpc_config)
                .with("environment", Value::Map(environment)),
        )
    }

    fn gateway(&mut self, function: &ResourceId) -> Result<()> {
        let gateway = self.add(
            ids::GATEWAY,
            ResourceKind::GatewayApi,
            Attributes::new()
                .with("name", self.names.stack())
                .with("protocol_type", "HTTP")
                .with("target", Reference::new(function, "arn")),
        )?;
        let _ = self.add(
            ids::PERMISSION,
            ResourceKind::Permission,
            Attributes::new()
                .with("function_name", Reference::new(function, "function_name"))
                .with("action", "lambda:InvokeFunction")
                .with("principal", GATEWAY_SERVICE)
                .with(
                    "source_arn",
                    Value::Template(vec![
                        Segment::Ref(Reference::new(&gateway, "execution_arn")),
                        Segment::Literal("/*/*".to_owned()),
                    ]),
                ),
        )?;
        let _ = self.add(
            ids::URL,
            ResourceKind::Output,
            Attributes::new().with("value", Reference::new(&gateway, "api_endpoint")),
        )?;
        Ok(())
    }
}
