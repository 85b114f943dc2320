//! Open Telekom Cloud implementation of the provider traits.
//!
//! [`OtcConnector`] exchanges credentials for a Keystone v3 token and reads
//! the service catalog. [`OtcSession`] then talks JSON over HTTPS to the
//! compute (Nova), network (Neutron), VPC v1 and image services, sending the
//! token in the `X-Auth-Token` header. Every wait polls with the configured
//! [`WaitPolicy`].

mod auth;
mod compute;
mod network;
mod wait;

use std::time::Duration;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::AuthOptions;
use crate::managed::{InstanceId, IpAddress, KeyPairName, SecurityGroupId, SubnetId, VpcId};
use crate::provider::{
    CloudConnector, CloudSession, ElasticIpOpts, FloatingIp, InstanceDetails, InstanceSpec,
    PortRange, ProviderError, ProviderFuture, WaitPolicy,
};
use auth::{Endpoints, SUBJECT_TOKEN_HEADER, TokenResponse};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Context attached to a single API call for error reporting.
#[derive(Clone, Copy, Debug)]
struct Call<'a> {
    operation: &'a str,
    kind: &'a str,
    id: &'a str,
}

impl<'a> Call<'a> {
    const fn new(operation: &'a str, kind: &'a str, id: &'a str) -> Self {
        Self {
            operation,
            kind,
            id,
        }
    }

    fn transport(self, err: &reqwest::Error) -> ProviderError {
        ProviderError::Transport {
            operation: self.operation.to_owned(),
            message: err.to_string(),
        }
    }

    fn decode<T: DeserializeOwned>(self, body: &[u8]) -> Result<T, ProviderError> {
        serde_json::from_slice(body).map_err(|err| ProviderError::Decode {
            operation: self.operation.to_owned(),
            message: err.to_string(),
        })
    }
}

fn read_ca_bundle(path: &str) -> Result<Vec<u8>, ProviderError> {
    let failure = |message: String| ProviderError::Authentication {
        message: format!("failed to read CA bundle {path}: {message}"),
    };
    let file = Utf8Path::new(path);
    let file_name = file
        .file_name()
        .ok_or_else(|| failure(String::from("path has no file name")))?;
    let parent = file
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| failure(err.to_string()))?;
    dir.read(file_name).map_err(|err| failure(err.to_string()))
}

fn http_client(auth: &AuthOptions) -> Result<reqwest::Client, ProviderError> {
    let mut builder = reqwest::Client::builder().timeout(HTTP_TIMEOUT);
    if !auth.ca_cert.is_empty() {
        let pem = read_ca_bundle(&auth.ca_cert)?;
        let certificate =
            reqwest::Certificate::from_pem(&pem).map_err(|err| ProviderError::Authentication {
                message: format!("invalid CA bundle {}: {err}", auth.ca_cert),
            })?;
        builder = builder.add_root_certificate(certificate);
    }
    builder.build().map_err(|err| ProviderError::Transport {
        operation: String::from("build HTTP client"),
        message: err.to_string(),
    })
}

/// Authenticates against OTC Identity (Keystone v3).
#[derive(Clone, Copy, Debug, Default)]
pub struct OtcConnector {
    wait: WaitPolicy,
}

impl OtcConnector {
    /// Creates a connector whose sessions poll with `wait`.
    #[must_use]
    pub const fn new(wait: WaitPolicy) -> Self {
        Self { wait }
    }

    async fn issue_token(&self, auth: &AuthOptions) -> Result<OtcSession, ProviderError> {
        let body = auth::token_request(auth)?;
        let http = http_client(auth)?;
        let url = format!("{}/auth/tokens", auth.auth_url.trim_end_matches('/'));
        let call = Call::new("authenticate", "token", &auth.auth_url);
        let response = http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|err| call.transport(&err))?;
        let status = response.status();
        let subject_token = response
            .headers()
            .get(SUBJECT_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let payload = response.bytes().await.map_err(|err| call.transport(&err))?;
        if !status.is_success() {
            return Err(ProviderError::Authentication {
                message: format!("{status}: {}", String::from_utf8_lossy(&payload)),
            });
        }
        let token = subject_token.ok_or_else(|| ProviderError::Authentication {
            message: format!("identity response carried no {SUBJECT_TOKEN_HEADER} header"),
        })?;
        let catalog: TokenResponse = call.decode(&payload)?;
        let endpoints = catalog.endpoints(auth)?;
        info!(region = %auth.region, compute = %endpoints.compute, "authenticated");
        Ok(OtcSession {
            http,
            token,
            endpoints,
            wait: self.wait,
        })
    }
}

impl CloudConnector for OtcConnector {
    type Session = OtcSession;

    fn authenticate<'a>(&'a self, auth: &'a AuthOptions) -> ProviderFuture<'a, Self::Session> {
        Box::pin(self.issue_token(auth))
    }
}

/// Authenticated OTC client.
#[derive(Clone, Debug)]
pub struct OtcSession {
    http: reqwest::Client,
    token: String,
    endpoints: Endpoints,
    wait: WaitPolicy,
}

impl OtcSession {
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTH_TOKEN_HEADER, &self.token)
    }

    /// Sends `request`; 404 becomes [`ProviderError::NotFound`] for the
    /// call's resource and other failures become [`ProviderError::Api`].
    async fn send(&self, call: Call<'_>, request: RequestBuilder) -> Result<Vec<u8>, ProviderError> {
        debug!(operation = call.operation, kind = call.kind, id = call.id, "sending request");
        let response = request.send().await.map_err(|err| call.transport(&err))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|err| call.transport(&err))?;
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::not_found(call.kind, call.id));
        }
        if !status.is_success() {
            return Err(ProviderError::Api {
                operation: call.operation.to_owned(),
                status: status.as_u16(),
                message: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        call: Call<'_>,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let body = self.send(call, request).await?;
        call.decode(&body)
    }
}

impl CloudSession for OtcSession {
    fn find_vpc<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<VpcId>> {
        Box::pin(self.vpc_by_name(name))
    }

    fn create_vpc<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, VpcId> {
        Box::pin(self.post_vpc(name))
    }

    fn wait_for_vpc_status<'a>(&'a self, id: &'a VpcId, status: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(wait::poll_status(self.wait, "vpc", id, status, move || {
            self.vpc_status(id)
        }))
    }

    fn delete_vpc<'a>(&'a self, id: &'a VpcId) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove_vpc(id))
    }

    fn find_subnet<'a>(&'a self, vpc: &'a VpcId, name: &'a str) -> ProviderFuture<'a, Option<SubnetId>> {
        Box::pin(self.subnet_by_name(vpc, name))
    }

    fn create_subnet<'a>(&'a self, vpc: &'a VpcId, name: &'a str) -> ProviderFuture<'a, SubnetId> {
        Box::pin(self.post_subnet(vpc, name))
    }

    fn wait_for_subnet_status<'a>(
        &'a self,
        id: &'a SubnetId,
        status: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(wait::poll_status(self.wait, "subnet", id, status, move || {
            self.subnet_status(id)
        }))
    }

    fn delete_subnet<'a>(&'a self, vpc: &'a VpcId, id: &'a SubnetId) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove_subnet(vpc, id))
    }

    fn find_security_groups<'a>(
        &'a self,
        names: &'a [String],
    ) -> ProviderFuture<'a, Vec<SecurityGroupId>> {
        Box::pin(self.security_groups_by_name(names))
    }

    fn create_security_group<'a>(
        &'a self,
        name: &'a str,
        ports: &'a [PortRange],
    ) -> ProviderFuture<'a, SecurityGroupId> {
        Box::pin(self.post_security_group(name, ports))
    }

    fn delete_security_group<'a>(&'a self, id: &'a SecurityGroupId) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove_security_group(id))
    }

    fn wait_for_security_group_deleted<'a>(
        &'a self,
        id: &'a SecurityGroupId,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(async move {
            let result = wait::poll_status(
                self.wait,
                "security group",
                id,
                crate::provider::status::DELETED,
                move || self.security_group_presence(id),
            )
            .await;
            match result {
                Err(err) if err.is_not_found() => Ok(()),
                other => other,
            }
        })
    }

    fn find_flavor<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>> {
        Box::pin(self.flavor_by_name(name))
    }

    fn find_image<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>> {
        Box::pin(self.image_by_name(name))
    }

    fn find_server_group<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, Option<String>> {
        Box::pin(self.server_group_by_name(name))
    }

    fn create_key_pair<'a>(
        &'a self,
        name: &'a KeyPairName,
        public_key: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(self.post_key_pair(name, public_key))
    }

    fn get_public_key<'a>(&'a self, name: &'a KeyPairName) -> ProviderFuture<'a, String> {
        Box::pin(self.key_pair_public_key(name))
    }

    fn delete_key_pair<'a>(&'a self, name: &'a KeyPairName) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove_key_pair(name))
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ProviderFuture<'a, InstanceId> {
        Box::pin(self.post_server(spec))
    }

    fn add_tags<'a>(&'a self, id: &'a InstanceId, tags: &'a [String]) -> ProviderFuture<'a, ()> {
        Box::pin(self.put_server_tags(id, tags))
    }

    fn get_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, InstanceDetails> {
        Box::pin(self.server_details(id))
    }

    fn wait_for_instance_status<'a>(
        &'a self,
        id: &'a InstanceId,
        status: &'a str,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(wait::poll_status(self.wait, "instance", id, status, move || async move {
            self.server_details(id).await.map(|details| details.status)
        }))
    }

    fn start_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()> {
        Box::pin(self.server_action(id, compute::ServerAction::Start))
    }

    fn stop_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()> {
        Box::pin(self.server_action(id, compute::ServerAction::Stop))
    }

    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove_server(id))
    }

    fn create_floating_ip<'a>(&'a self, opts: &'a ElasticIpOpts) -> ProviderFuture<'a, FloatingIp> {
        Box::pin(self.post_public_ip(opts))
    }

    fn wait_for_floating_ip_active<'a>(&'a self, id: &'a str) -> ProviderFuture<'a, ()> {
        Box::pin(self.wait_for_public_ip(id))
    }

    fn bind_floating_ip<'a>(
        &'a self,
        address: &'a IpAddress,
        instance: &'a InstanceId,
    ) -> ProviderFuture<'a, ()> {
        Box::pin(self.add_floating_ip(address, instance))
    }

    fn release_floating_ip<'a>(&'a self, address: &'a IpAddress) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove_public_ip(address))
    }
}
