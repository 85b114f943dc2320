//! VPC v1 networks, subnets and elastic IPs; Neutron security groups.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{Call, OtcSession, wait};
use crate::managed::{IpAddress, SecurityGroupId, SubnetId, VpcId};
use crate::provider::{ElasticIpOpts, FloatingIp, PortRange, ProviderError};

const VPC_CIDR: &str = "192.168.0.0/16";
const SUBNET_CIDR: &str = "192.168.0.0/16";
const SUBNET_GATEWAY: &str = "192.168.0.1";
const SUBNET_DNS: [&str; 2] = ["100.125.4.25", "8.8.8.8"];
const INGRESS_SOURCE: &str = "0.0.0.0/0";
const BANDWIDTH_NAME: &str = "otc-machine-bandwidth";
/// Elastic IP statuses meaning "allocated and usable".
const EIP_READY: [&str; 2] = ["DOWN", "ACTIVE"];

#[derive(Debug, Deserialize)]
struct Named {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct VpcList {
    vpcs: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct VpcBody {
    vpc: Named,
}

#[derive(Debug, Deserialize)]
struct SubnetList {
    subnets: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct SubnetBody {
    subnet: Named,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupList {
    security_groups: Vec<Named>,
}

#[derive(Debug, Deserialize)]
struct SecurityGroupBody {
    security_group: Named,
}

#[derive(Debug, Deserialize)]
struct PublicIp {
    id: String,
    #[serde(default)]
    public_ip_address: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct PublicIpBody {
    publicip: PublicIp,
}

#[derive(Debug, Deserialize)]
struct PublicIpList {
    publicips: Vec<PublicIp>,
}

#[derive(Debug, Serialize)]
struct SecurityGroupRule<'a> {
    security_group_id: &'a str,
    direction: &'static str,
    ethertype: &'static str,
    protocol: &'static str,
    port_range_min: u16,
    port_range_max: u16,
    remote_ip_prefix: &'static str,
}

impl<'a> SecurityGroupRule<'a> {
    const fn tcp_ingress(security_group_id: &'a str, ports: PortRange) -> Self {
        let (from, to) = ports.bounds();
        Self {
            security_group_id,
            direction: "ingress",
            ethertype: "IPv4",
            protocol: "tcp",
            port_range_min: from,
            port_range_max: to,
            remote_ip_prefix: INGRESS_SOURCE,
        }
    }
}

/// Request body for a new subnet.
fn subnet_request(vpc: &str, name: &str) -> serde_json::Value {
    json!({
        "subnet": {
            "name": name,
            "cidr": SUBNET_CIDR,
            "gateway_ip": SUBNET_GATEWAY,
            "vpc_id": vpc,
            "primary_dns": SUBNET_DNS[0],
            "secondary_dns": SUBNET_DNS[1],
            "dnsList": SUBNET_DNS,
        }
    })
}

/// Request body for a new elastic IP with dedicated bandwidth.
fn public_ip_request(opts: &ElasticIpOpts) -> serde_json::Value {
    json!({
        "publicip": { "type": opts.ip_type },
        "bandwidth": {
            "name": BANDWIDTH_NAME,
            "size": opts.bandwidth_size,
            "share_type": opts.bandwidth_type,
        }
    })
}

fn is_eip_ready(status: &str) -> bool {
    EIP_READY
        .iter()
        .any(|ready| ready.eq_ignore_ascii_case(status))
}

impl OtcSession {
    fn vpc_url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoints.vpc)
    }

    fn neutron_url(&self, path: &str) -> String {
        format!("{}/v2.0/{path}", self.endpoints.network)
    }

    pub(super) async fn vpc_by_name(&self, name: &str) -> Result<Option<VpcId>, ProviderError> {
        let call = Call::new("list VPCs", "vpc", name);
        let list: VpcList = self
            .send_json(call, self.request(Method::GET, &self.vpc_url("vpcs")))
            .await?;
        Ok(list
            .vpcs
            .into_iter()
            .find(|vpc| vpc.name == name)
            .map(|vpc| VpcId::new(vpc.id)))
    }

    pub(super) async fn post_vpc(&self, name: &str) -> Result<VpcId, ProviderError> {
        let call = Call::new("create VPC", "vpc", name);
        let body = json!({ "vpc": { "name": name, "cidr": VPC_CIDR } });
        let created: VpcBody = self
            .send_json(
                call,
                self.request(Method::POST, &self.vpc_url("vpcs")).json(&body),
            )
            .await?;
        Ok(VpcId::new(created.vpc.id))
    }

    pub(super) async fn vpc_status(&self, id: &VpcId) -> Result<String, ProviderError> {
        let call = Call::new("get VPC", "vpc", id);
        let url = self.vpc_url(&format!("vpcs/{id}"));
        let body: VpcBody = self
            .send_json(call, self.request(Method::GET, &url))
            .await?;
        Ok(body.vpc.status)
    }

    pub(super) async fn remove_vpc(&self, id: &VpcId) -> Result<(), ProviderError> {
        let call = Call::new("delete VPC", "vpc", id);
        let url = self.vpc_url(&format!("vpcs/{id}"));
        self.send(call, self.request(Method::DELETE, &url))
            .await
            .map(drop)
    }

    pub(super) async fn subnet_by_name(
        &self,
        vpc: &VpcId,
        name: &str,
    ) -> Result<Option<SubnetId>, ProviderError> {
        let call = Call::new("list subnets", "subnet", name);
        let request = self
            .request(Method::GET, &self.vpc_url("subnets"))
            .query(&[("vpc_id", vpc.as_str())]);
        let list: SubnetList = self.send_json(call, request).await?;
        Ok(list
            .subnets
            .into_iter()
            .find(|subnet| subnet.name == name)
            .map(|subnet| SubnetId::new(subnet.id)))
    }

    pub(super) async fn post_subnet(&self, vpc: &VpcId, name: &str) -> Result<SubnetId, ProviderError> {
        let call = Call::new("create subnet", "subnet", name);
        let request = self
            .request(Method::POST, &self.vpc_url("subnets"))
            .json(&subnet_request(vpc, name));
        let created: SubnetBody = self.send_json(call, request).await?;
        Ok(SubnetId::new(created.subnet.id))
    }

    pub(super) async fn subnet_status(&self, id: &SubnetId) -> Result<String, ProviderError> {
        let call = Call::new("get subnet", "subnet", id);
        let url = self.vpc_url(&format!("subnets/{id}"));
        let body: SubnetBody = self
            .send_json(call, self.request(Method::GET, &url))
            .await?;
        Ok(body.subnet.status)
    }

    pub(super) async fn remove_subnet(&self, vpc: &VpcId, id: &SubnetId) -> Result<(), ProviderError> {
        let call = Call::new("delete subnet", "subnet", id);
        let url = self.vpc_url(&format!("vpcs/{vpc}/subnets/{id}"));
        self.send(call, self.request(Method::DELETE, &url))
            .await
            .map(drop)
    }

    pub(super) async fn security_groups_by_name(
        &self,
        names: &[String],
    ) -> Result<Vec<SecurityGroupId>, ProviderError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let call = Call::new("list security groups", "security group", name);
            let request = self
                .request(Method::GET, &self.neutron_url("security-groups"))
                .query(&[("name", name.as_str())]);
            let list: SecurityGroupList = self.send_json(call, request).await?;
            match list.security_groups.into_iter().find(|group| &group.name == name) {
                Some(group) => ids.push(SecurityGroupId::new(group.id)),
                None => warn!(%name, "security group not found; skipping"),
            }
        }
        Ok(ids)
    }

    pub(super) async fn post_security_group(
        &self,
        name: &str,
        ports: &[PortRange],
    ) -> Result<SecurityGroupId, ProviderError> {
        let call = Call::new("create security group", "security group", name);
        let body = json!({ "security_group": { "name": name } });
        let created: SecurityGroupBody = self
            .send_json(
                call,
                self.request(Method::POST, &self.neutron_url("security-groups"))
                    .json(&body),
            )
            .await?;
        let id = SecurityGroupId::new(created.security_group.id);
        for range in ports {
            if let Err(err) = self.post_ingress_rule(&id, *range).await {
                warn!(security_group_id = %id, error = %err, "rule creation failed; deleting group");
                if let Err(cleanup) = self.remove_security_group(&id).await {
                    warn!(security_group_id = %id, error = %cleanup, "failed to delete partial group");
                }
                return Err(err);
            }
        }
        Ok(id)
    }

    async fn post_ingress_rule(&self, group: &SecurityGroupId, ports: PortRange) -> Result<(), ProviderError> {
        let call = Call::new("create security group rule", "security group", group);
        let body = json!({ "security_group_rule": SecurityGroupRule::tcp_ingress(group, ports) });
        let request = self
            .request(Method::POST, &self.neutron_url("security-group-rules"))
            .json(&body);
        self.send(call, request).await?;
        debug!(security_group_id = %group, from = ports.bounds().0, to = ports.bounds().1, "added ingress rule");
        Ok(())
    }

    pub(super) async fn remove_security_group(&self, id: &SecurityGroupId) -> Result<(), ProviderError> {
        let call = Call::new("delete security group", "security group", id);
        let url = self.neutron_url(&format!("security-groups/{id}"));
        self.send(call, self.request(Method::DELETE, &url))
            .await
            .map(drop)
    }

    /// Reports `ACTIVE` while the group exists; 404 once it is gone.
    pub(super) async fn security_group_presence(
        &self,
        id: &SecurityGroupId,
    ) -> Result<String, ProviderError> {
        let call = Call::new("get security group", "security group", id);
        let url = self.neutron_url(&format!("security-groups/{id}"));
        self.send(call, self.request(Method::GET, &url)).await?;
        Ok(String::from("ACTIVE"))
    }

    pub(super) async fn post_public_ip(&self, opts: &ElasticIpOpts) -> Result<FloatingIp, ProviderError> {
        let call = Call::new("create elastic IP", "elastic ip", &opts.ip_type);
        let request = self
            .request(Method::POST, &self.vpc_url("publicips"))
            .json(&public_ip_request(opts));
        let created: PublicIpBody = self.send_json(call, request).await?;
        Ok(FloatingIp {
            id: created.publicip.id,
            address: IpAddress::new(created.publicip.public_ip_address),
        })
    }

    async fn public_ip_status(&self, id: &str) -> Result<String, ProviderError> {
        let call = Call::new("get elastic IP", "elastic ip", id);
        let url = self.vpc_url(&format!("publicips/{id}"));
        let body: PublicIpBody = self
            .send_json(call, self.request(Method::GET, &url))
            .await?;
        Ok(body.publicip.status)
    }

    pub(super) async fn wait_for_public_ip(&self, id: &str) -> Result<(), ProviderError> {
        // Either ready status ends the wait; the poller only knows one target.
        wait::poll_status(self.wait, "elastic ip", id, EIP_READY[1], move || async move {
            let status = self.public_ip_status(id).await?;
            Ok(if is_eip_ready(&status) {
                EIP_READY[1].to_owned()
            } else {
                status
            })
        })
        .await
    }

    pub(super) async fn remove_public_ip(&self, address: &IpAddress) -> Result<(), ProviderError> {
        let call = Call::new("list elastic IPs", "elastic ip", address);
        let list: PublicIpList = self
            .send_json(call, self.request(Method::GET, &self.vpc_url("publicips")))
            .await?;
        let allocation = list
            .publicips
            .into_iter()
            .find(|ip| ip.public_ip_address == address.as_str())
            .ok_or_else(|| ProviderError::not_found("elastic ip", address))?;
        let call = Call::new("delete elastic IP", "elastic ip", address);
        let url = self.vpc_url(&format!("publicips/{}", allocation.id));
        self.send(call, self.request(Method::DELETE, &url))
            .await
            .map(drop)
    }
}
