//! Nova servers, flavors, key pairs and server groups; IMS image lookup.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{Call, OtcSession};
use crate::managed::{InstanceId, IpAddress, KeyPairName};
use crate::provider::{InstanceDetails, InstanceSpec, ProviderError, address};

/// Microversion that accepts `PUT /servers/{id}/tags`.
const TAGS_MICROVERSION: &str = "2.26";
const MICROVERSION_HEADER: &str = "X-OpenStack-Nova-API-Version";

/// Power actions sent to `/servers/{id}/action`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum ServerAction {
    Start,
    Stop,
}

impl ServerAction {
    const fn key(self) -> &'static str {
        match self {
            Self::Start => "os-start",
            Self::Stop => "os-stop",
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdName {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FlavorList {
    flavors: Vec<IdName>,
}

#[derive(Debug, Deserialize)]
struct ImageList {
    images: Vec<IdName>,
}

#[derive(Debug, Deserialize)]
struct ServerGroupList {
    server_groups: Vec<IdName>,
}

#[derive(Debug, Deserialize)]
struct KeyPairBody {
    keypair: KeyPair,
}

#[derive(Debug, Deserialize)]
struct KeyPair {
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct ServerBody {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct Server {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    addresses: Value,
    #[serde(default)]
    security_groups: Vec<GroupName>,
}

#[derive(Debug, Deserialize)]
struct GroupName {
    name: String,
}

/// Builds the `POST /servers` body. The root disk is a volume created from
/// the image.
fn server_request(spec: &InstanceSpec) -> Value {
    let mut server = json!({
        "name": spec.name,
        "flavorRef": spec.flavor_id,
        "availability_zone": spec.availability_zone,
        "key_name": spec.key_pair.as_str(),
        "networks": [{ "uuid": spec.subnet_id.as_str() }],
        "security_groups": spec
            .security_groups
            .iter()
            .map(|group| json!({ "name": group.as_str() }))
            .collect::<Vec<_>>(),
        "block_device_mapping_v2": [{
            "boot_index": 0,
            "uuid": spec.root_volume.source_id,
            "source_type": "image",
            "destination_type": "volume",
            "volume_size": spec.root_volume.size,
            "volume_type": spec.root_volume.volume_type,
            "delete_on_termination": true,
        }],
    });
    if let (Some(map), Some(payload)) = (server.as_object_mut(), &spec.user_data) {
        map.insert(
            String::from("user_data"),
            Value::String(STANDARD.encode(payload)),
        );
    }
    let mut request = json!({ "server": server });
    if let (Some(map), Some(group)) = (request.as_object_mut(), &spec.server_group_id) {
        map.insert(
            String::from("os:scheduler_hints"),
            json!({ "group": group }),
        );
    }
    request
}

fn find_id(items: Vec<IdName>, name: &str) -> Option<String> {
    items
        .into_iter()
        .find(|item| item.name == name)
        .map(|item| item.id)
}

impl OtcSession {
    fn compute_url(&self, path: &str) -> String {
        format!("{}/{path}", self.endpoints.compute)
    }

    pub(super) async fn flavor_by_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let call = Call::new("list flavors", "flavor", name);
        let list: FlavorList = self
            .send_json(call, self.request(Method::GET, &self.compute_url("flavors")))
            .await?;
        Ok(find_id(list.flavors, name))
    }

    pub(super) async fn image_by_name(&self, name: &str) -> Result<Option<String>, ProviderError> {
        let call = Call::new("list images", "image", name);
        let url = format!("{}/v2/images", self.endpoints.image);
        let request = self
            .request(Method::GET, &url)
            .query(&[("name", name)]);
        let list: ImageList = self.send_json(call, request).await?;
        Ok(find_id(list.images, name))
    }

    pub(super) async fn server_group_by_name(
        &self,
        name: &str,
    ) -> Result<Option<String>, ProviderError> {
        let call = Call::new("list server groups", "server group", name);
        let list: ServerGroupList = self
            .send_json(
                call,
                self.request(Method::GET, &self.compute_url("os-server-groups")),
            )
            .await?;
        Ok(find_id(list.server_groups, name))
    }

    pub(super) async fn post_key_pair(
        &self,
        name: &KeyPairName,
        public_key: &str,
    ) -> Result<(), ProviderError> {
        let call = Call::new("create key pair", "key pair", name);
        let body = json!({ "keypair": { "name": name.as_str(), "public_key": public_key } });
        self.send(
            call,
            self.request(Method::POST, &self.compute_url("os-keypairs"))
                .json(&body),
        )
        .await
        .map(drop)
    }

    pub(super) async fn key_pair_public_key(&self, name: &KeyPairName) -> Result<String, ProviderError> {
        let call = Call::new("get key pair", "key pair", name);
        let url = self.compute_url(&format!("os-keypairs/{name}"));
        let body: KeyPairBody = self
            .send_json(call, self.request(Method::GET, &url))
            .await?;
        Ok(body.keypair.public_key)
    }

    pub(super) async fn remove_key_pair(&self, name: &KeyPairName) -> Result<(), ProviderError> {
        let call = Call::new("delete key pair", "key pair", name);
        let url = self.compute_url(&format!("os-keypairs/{name}"));
        self.send(call, self.request(Method::DELETE, &url))
            .await
            .map(drop)
    }

    pub(super) async fn post_server(&self, spec: &InstanceSpec) -> Result<InstanceId, ProviderError> {
        let call = Call::new("create instance", "instance", &spec.name);
        let request = self
            .request(Method::POST, &self.compute_url("servers"))
            .json(&server_request(spec));
        let created: ServerBody = self.send_json(call, request).await?;
        Ok(InstanceId::new(created.server.id))
    }

    pub(super) async fn put_server_tags(
        &self,
        id: &InstanceId,
        tags: &[String],
    ) -> Result<(), ProviderError> {
        let call = Call::new("tag instance", "instance", id);
        let url = self.compute_url(&format!("servers/{id}/tags"));
        let request = self
            .request(Method::PUT, &url)
            .header(MICROVERSION_HEADER, TAGS_MICROVERSION)
            .json(&json!({ "tags": tags }));
        self.send(call, request).await.map(drop)
    }

    pub(super) async fn server_details(&self, id: &InstanceId) -> Result<InstanceDetails, ProviderError> {
        let call = Call::new("get instance", "instance", id);
        let url = self.compute_url(&format!("servers/{id}"));
        let body: ServerBody = self
            .send_json(call, self.request(Method::GET, &url))
            .await?;
        Ok(InstanceDetails {
            id: InstanceId::new(body.server.id),
            status: body.server.status,
            addresses: body.server.addresses,
            security_groups: body
                .server
                .security_groups
                .into_iter()
                .map(|group| group.name)
                .collect(),
        })
    }

    pub(super) async fn server_action(
        &self,
        id: &InstanceId,
        action: ServerAction,
    ) -> Result<(), ProviderError> {
        let call = Call::new(action.key(), "instance", id);
        let url = self.compute_url(&format!("servers/{id}/action"));
        let mut body = serde_json::Map::new();
        body.insert(action.key().to_owned(), Value::Null);
        self.send(call, self.request(Method::POST, &url).json(&body))
            .await
            .map(drop)
    }

    pub(super) async fn remove_server(&self, id: &InstanceId) -> Result<(), ProviderError> {
        let call = Call::new("delete instance", "instance", id);
        let url = self.compute_url(&format!("servers/{id}"));
        self.send(call, self.request(Method::DELETE, &url))
            .await
            .map(drop)
    }

    /// Binds `address` unless the instance already reports it.
    pub(super) async fn add_floating_ip(
        &self,
        address: &IpAddress,
        id: &InstanceId,
    ) -> Result<(), ProviderError> {
        let details = self.server_details(id).await?;
        if address::contains_address(&details.addresses, address)? {
            debug!(instance_id = %id, %address, "floating IP already bound");
            return Ok(());
        }
        let call = Call::new("bind floating IP", "instance", id);
        let url = self.compute_url(&format!("servers/{id}/action"));
        let body = json!({ "addFloatingIp": { "address": address.as_str() } });
        self.send(call, self.request(Method::POST, &url).json(&body))
            .await
            .map(drop)
    }
}
