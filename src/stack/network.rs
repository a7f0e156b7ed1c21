//! Virtual network: VPC with one public and one private subnet per zone

use super::{Construct, NetworkAttrs, SynthContext, name_tag};
use anyhow::{Context as _, Result, bail};
use cfnkit::{Environment, ResourceEntry, intrinsic};
use serde_json::json;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Address range of the VPC unless configured otherwise
pub const DEFAULT_CIDR: &str = "10.0.0.0/16";

/// VPCs may be anywhere from a /16 down to a /28
const VPC_PREFIX_RANGE: std::ops::RangeInclusive<u8> = 16..=28;

/// Upper bound on zones a network may span
pub const MAX_SUPPORTED_AZS: u8 = 6;

/// Zones an environment-agnostic network may span. Subnets pick zones by
/// index from `Fn::GetAZs`, and every region offers at least two.
pub const AGNOSTIC_MAX_AZS: u8 = 2;

/// An IPv4 block in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            bail!("prefix length {prefix} exceeds 32");
        }
        let bits = u32::from(addr);
        if bits & !mask(prefix) != 0 {
            bail!("{addr}/{prefix} has host bits set");
        }
        Ok(Self { addr, prefix })
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Split into `count` equally sized consecutive blocks, the smallest
    /// power of two that fits.
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let extra_bits = usize::BITS - (count - 1).leading_zeros();
        let new_prefix = u32::from(self.prefix) + extra_bits;
        if new_prefix > 28 {
            bail!("{self} is too small for {count} subnets");
        }

        let step = 1u64 << (32 - new_prefix);
        let base = u64::from(u32::from(self.addr));
        (0..count as u64)
            .map(|i| {
                let addr = Ipv4Addr::from((base + i * step) as u32);
                Self::new(addr, new_prefix as u8)
            })
            .collect()
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .with_context(|| format!("'{s}' is not in CIDR notation"))?;
        let addr: Ipv4Addr = addr
            .parse()
            .with_context(|| format!("invalid address in '{s}'"))?;
        let prefix: u8 = prefix
            .parse()
            .with_context(|| format!("invalid prefix length in '{s}'"))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Isolated network spanning up to `max_availability_zones` zones.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    pub max_availability_zones: u8,
    pub cidr: Ipv4Cidr,
}

impl NetworkSpec {
    /// Network over the default address range
    pub fn new(max_availability_zones: u8) -> Self {
        Self {
            max_availability_zones,
            cidr: Ipv4Cidr {
                addr: Ipv4Addr::new(10, 0, 0, 0),
                prefix: 16,
            },
        }
    }

    /// Use a different VPC address range.
    pub fn with_cidr(mut self, cidr: Ipv4Cidr) -> Self {
        self.cidr = cidr;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !VPC_PREFIX_RANGE.contains(&self.cidr.prefix()) {
            bail!("VPC range {} must be between a /16 and a /28", self.cidr);
        }
        if self.max_availability_zones == 0 || self.max_availability_zones > MAX_SUPPORTED_AZS {
            bail!(
                "max availability zones must be between 1 and {MAX_SUPPORTED_AZS}, got {}",
                self.max_availability_zones
            );
        }
        self.subnet_blocks()?;
        Ok(())
    }

    /// Zone count checks that depend on whether the target region is known.
    pub fn validate_for(&self, environment: Option<&Environment>) -> Result<()> {
        self.validate()?;
        if environment.is_none() && self.max_availability_zones > AGNOSTIC_MAX_AZS {
            bail!(
                "an environment-agnostic stack can span at most {AGNOSTIC_MAX_AZS} availability zones, got {}; set an account and region to use more",
                self.max_availability_zones
            );
        }
        Ok(())
    }

    /// (public, private) blocks; all public subnets are allocated first.
    fn subnet_blocks(&self) -> Result<(Vec<Ipv4Cidr>, Vec<Ipv4Cidr>)> {
        let zones = usize::from(self.max_availability_zones);
        let mut blocks = self.cidr.split(zones * 2)?;
        let private = blocks.split_off(zones);
        Ok((blocks, private))
    }
}

impl Construct for NetworkSpec {
    fn construct_type(&self) -> &'static str {
        "network"
    }

    fn description(&self) -> String {
        format!(
            "VPC {} across {} availability zone(s), public and private subnets",
            self.cidr, self.max_availability_zones
        )
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let (public_blocks, private_blocks) = self.subnet_blocks()?;

        let vpc = ctx.add(
            &[id, "Resource"],
            ResourceEntry::new("AWS::EC2::VPC").with_properties(json!({
                "CidrBlock": self.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(ctx.path_name(&[id])),
            })),
        )?;

        let igw = ctx.add(
            &[id, "IGW"],
            ResourceEntry::new("AWS::EC2::InternetGateway")
                .with_property("Tags", name_tag(ctx.path_name(&[id]))),
        )?;

        let attachment = ctx.add(
            &[id, "VPCGW"],
            ResourceEntry::new("AWS::EC2::VPCGatewayAttachment").with_properties(json!({
                "InternetGatewayId": intrinsic::reference(&igw),
                "VpcId": intrinsic::reference(&vpc),
            })),
        )?;

        let mut attrs = NetworkAttrs {
            vpc: vpc.clone(),
            public_subnets: Vec::new(),
            private_subnets: Vec::new(),
            public_routes: Vec::new(),
        };
        let mut nat_gateways = Vec::new();

        for (index, block) in public_blocks.iter().enumerate() {
            let name = format!("PublicSubnet{}", index + 1);
            let subnet = Subnet {
                network_id: id,
                name: &name,
                vpc: &vpc,
                zone_index: index,
                block: *block,
                public: true,
            }
            .synthesize(ctx)?;

            let route = ctx.add(
                &[id, &name, "DefaultRoute"],
                ResourceEntry::new("AWS::EC2::Route")
                    .with_properties(json!({
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": intrinsic::reference(&igw),
                        "RouteTableId": intrinsic::reference(&subnet.route_table),
                    }))
                    .with_dependency(attachment.clone()),
            )?;

            let eip = ctx.add(
                &[id, &name, "EIP"],
                ResourceEntry::new("AWS::EC2::EIP").with_properties(json!({
                    "Domain": "vpc",
                    "Tags": name_tag(ctx.path_name(&[id, &name])),
                })),
            )?;

            let nat = ctx.add(
                &[id, &name, "NATGateway"],
                ResourceEntry::new("AWS::EC2::NatGateway")
                    .with_properties(json!({
                        "AllocationId": intrinsic::get_att(&eip, "AllocationId"),
                        "SubnetId": intrinsic::reference(&subnet.subnet),
                        "Tags": name_tag(ctx.path_name(&[id, &name])),
                    }))
                    .with_dependency(route.clone())
                    .with_dependency(subnet.association.clone()),
            )?;

            attrs.public_subnets.push(subnet.subnet);
            attrs.public_routes.push(route);
            nat_gateways.push(nat);
        }

        for (index, block) in private_blocks.iter().enumerate() {
            let name = format!("PrivateSubnet{}", index + 1);
            let subnet = Subnet {
                network_id: id,
                name: &name,
                vpc: &vpc,
                zone_index: index,
                block: *block,
                public: false,
            }
            .synthesize(ctx)?;

            // Each private subnet egresses through the NAT gateway in its zone
            let nat = nat_gateways
                .get(index)
                .with_context(|| format!("no NAT gateway for {name}"))?;
            ctx.add(
                &[id, &name, "DefaultRoute"],
                ResourceEntry::new("AWS::EC2::Route").with_properties(json!({
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": intrinsic::reference(nat),
                    "RouteTableId": intrinsic::reference(&subnet.route_table),
                })),
            )?;

            attrs.private_subnets.push(subnet.subnet);
        }

        ctx.register_network(id, attrs);
        Ok(())
    }
}

struct Subnet<'a> {
    network_id: &'a str,
    name: &'a str,
    vpc: &'a str,
    zone_index: usize,
    block: Ipv4Cidr,
    public: bool,
}

struct SubnetIds {
    subnet: String,
    route_table: String,
    association: String,
}

impl Subnet<'_> {
    fn synthesize(&self, ctx: &mut SynthContext) -> Result<SubnetIds> {
        let kind = if self.public { "Public" } else { "Private" };
        let path_name = ctx.path_name(&[self.network_id, self.name]);

        let subnet = ctx.add(
            &[self.network_id, self.name, "Subnet"],
            ResourceEntry::new("AWS::EC2::Subnet").with_properties(json!({
                "AvailabilityZone": intrinsic::select(self.zone_index, intrinsic::get_azs("")),
                "CidrBlock": self.block.to_string(),
                "MapPublicIpOnLaunch": self.public,
                "Tags": [
                    { "Key": "aws-cdk:subnet-name", "Value": kind },
                    { "Key": "aws-cdk:subnet-type", "Value": kind },
                    { "Key": "Name", "Value": path_name },
                ],
                "VpcId": intrinsic::reference(self.vpc),
            })),
        )?;

        let route_table = ctx.add(
            &[self.network_id, self.name, "RouteTable"],
            ResourceEntry::new("AWS::EC2::RouteTable").with_properties(json!({
                "Tags": name_tag(path_name),
                "VpcId": intrinsic::reference(self.vpc),
            })),
        )?;

        let association = ctx.add(
            &[self.network_id, self.name, "RouteTableAssociation"],
            ResourceEntry::new("AWS::EC2::SubnetRouteTableAssociation").with_properties(json!({
                "RouteTableId": intrinsic::reference(&route_table),
                "SubnetId": intrinsic::reference(&subnet),
            })),
        )?;

        Ok(SubnetIds {
            subnet,
            route_table,
            association,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::{StackBuilder, synthesize};

    fn cidrs(blocks: &[Ipv4Cidr]) -> Vec<String> {
        blocks.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_cidr() {
        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        assert_eq!(cidr.prefix(), 16);
        assert_eq!(cidr.to_string(), "10.0.0.0/16");

        assert!("10.0.0.1/16".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_split_two_zones() {
        let spec = NetworkSpec::new(2);
        let (public, private) = spec.subnet_blocks().unwrap();
        assert_eq!(cidrs(&public), vec!["10.0.0.0/18", "10.0.64.0/18"]);
        assert_eq!(cidrs(&private), vec!["10.0.128.0/18", "10.0.192.0/18"]);
    }

    #[test]
    fn test_split_three_zones_rounds_up() {
        let spec = NetworkSpec::new(3);
        let (public, private) = spec.subnet_blocks().unwrap();
        assert_eq!(
            cidrs(&public),
            vec!["10.0.0.0/19", "10.0.32.0/19", "10.0.64.0/19"]
        );
        assert_eq!(private[0].to_string(), "10.0.96.0/19");
    }

    #[test]
    fn test_custom_cidr() {
        let spec = NetworkSpec::new(2).with_cidr("172.16.0.0/20".parse().unwrap());
        let (public, _) = spec.subnet_blocks().unwrap();
        assert_eq!(cidrs(&public), vec!["172.16.0.0/22", "172.16.4.0/22"]);

        let too_large = NetworkSpec::new(2).with_cidr("10.0.0.0/8".parse().unwrap());
        assert!(too_large.validate().is_err());
        assert_eq!(DEFAULT_CIDR.parse::<Ipv4Cidr>().unwrap(), NetworkSpec::new(2).cidr);
    }

    #[test]
    fn test_zone_bounds() {
        assert!(NetworkSpec::new(0).validate().is_err());
        assert!(NetworkSpec::new(MAX_SUPPORTED_AZS + 1).validate().is_err());
        assert!(NetworkSpec::new(1).validate().is_ok());
    }

    #[test]
    fn test_agnostic_stack_caps_zones() {
        let spec = NetworkSpec::new(3);
        let err = spec.validate_for(None).unwrap_err();
        assert!(err.to_string().contains("at most 2 availability zones"), "{err}");
        assert!(NetworkSpec::new(2).validate_for(None).is_ok());

        let env = Environment::new("123456789012", "us-east-1");
        assert!(spec.validate_for(Some(&env)).is_ok());

        let mut agnostic = StackBuilder::new("Demo", None).unwrap();
        assert!(agnostic.add_network("VPC", NetworkSpec::new(3)).is_err());
        let mut pinned = StackBuilder::new("Demo", Some(env)).unwrap();
        assert!(pinned.add_network("VPC", NetworkSpec::new(3)).is_ok());
    }

    #[test]
    fn test_synthesized_resources() {
        let mut builder = StackBuilder::new("Demo", None).unwrap();
        builder.add_network("VPC", NetworkSpec::new(2)).unwrap();
        let graph = builder.finish().unwrap();
        let template = synthesize(&graph).unwrap().template;

        assert_eq!(template.count_of_type("AWS::EC2::VPC"), 1);
        assert_eq!(template.count_of_type("AWS::EC2::Subnet"), 4);
        assert_eq!(template.count_of_type("AWS::EC2::NatGateway"), 2);
        assert_eq!(template.count_of_type("AWS::EC2::Route"), 4);
        assert_eq!(template.count_of_type("AWS::EC2::InternetGateway"), 1);

        let public_subnets: Vec<_> = template
            .resources_of_type("AWS::EC2::Subnet")
            .filter(|(_, e)| e.property("MapPublicIpOnLaunch") == Some(&json!(true)))
            .collect();
        assert_eq!(public_subnets.len(), 2);
    }
}
