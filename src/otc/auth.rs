//! Keystone v3 token requests and service catalog parsing.

use serde::Deserialize;
use serde_json::{Value, json};

use crate::config::{AuthMethod, AuthOptions};
use crate::provider::ProviderError;

/// Header carrying the issued token.
pub(super) const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

const DEFAULT_INTERFACE: &str = "public";

/// Service endpoints taken from the token's catalog.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct Endpoints {
    pub(super) compute: String,
    pub(super) network: String,
    pub(super) vpc: String,
    pub(super) image: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
    #[serde(default)]
    project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    region_id: String,
    url: String,
}

fn unsupported(method: &str) -> ProviderError {
    ProviderError::UnsupportedAuth {
        method: method.to_owned(),
    }
}

fn domain(auth: &AuthOptions) -> Option<Value> {
    if !auth.domain_id.is_empty() {
        Some(json!({ "id": auth.domain_id }))
    } else if !auth.domain_name.is_empty() {
        Some(json!({ "name": auth.domain_name }))
    } else {
        None
    }
}

fn scope(auth: &AuthOptions) -> Option<Value> {
    if !auth.project_id.is_empty() {
        return Some(json!({ "project": { "id": auth.project_id } }));
    }
    let domain = domain(auth);
    if !auth.project_name.is_empty() {
        let mut project = json!({ "name": auth.project_name });
        if let (Some(map), Some(domain)) = (project.as_object_mut(), domain) {
            map.insert(String::from("domain"), domain);
        }
        return Some(json!({ "project": project }));
    }
    domain.map(|domain| json!({ "domain": domain }))
}

/// Builds the `POST /auth/tokens` body for the configured method.
pub(super) fn token_request(auth: &AuthOptions) -> Result<Value, ProviderError> {
    let identity = match auth.method() {
        Some(AuthMethod::Token) => json!({
            "methods": ["token"],
            "token": { "id": auth.token },
        }),
        Some(AuthMethod::Password) => {
            let mut user = json!({ "name": auth.username, "password": auth.password });
            if let (Some(map), Some(domain)) = (user.as_object_mut(), domain(auth)) {
                map.insert(String::from("domain"), domain);
            }
            json!({
                "methods": ["password"],
                "password": { "user": user },
            })
        }
        Some(AuthMethod::AccessKey) => return Err(unsupported("access key")),
        Some(AuthMethod::Cloud) => return Err(unsupported("clouds.yaml")),
        None => {
            return Err(ProviderError::Authentication {
                message: String::from("no credentials configured"),
            });
        }
    };

    let mut request = json!({ "auth": { "identity": identity } });
    if let (Some(body), Some(scope)) = (request.get_mut("auth").and_then(Value::as_object_mut), scope(auth)) {
        body.insert(String::from("scope"), scope);
    }
    Ok(request)
}

fn substitute_project(url: &str, project_id: &str) -> String {
    url.replace("$(tenant_id)s", project_id)
        .replace("$(project_id)s", project_id)
        .trim_end_matches('/')
        .to_owned()
}

impl TokenResponse {
    fn endpoint(
        &self,
        service_type: &str,
        region: &str,
        interface: &str,
    ) -> Result<String, ProviderError> {
        let project_id = self
            .token
            .project
            .as_ref()
            .map_or("", |project| project.id.as_str());
        self.token
            .catalog
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| &entry.endpoints)
            .find(|endpoint| {
                endpoint.interface.eq_ignore_ascii_case(interface)
                    && (region.is_empty() || endpoint.region == region || endpoint.region_id == region)
            })
            .map(|endpoint| substitute_project(&endpoint.url, project_id))
            .ok_or_else(|| ProviderError::Authentication {
                message: format!(
                    "catalog has no {interface} {service_type} endpoint in region {region}"
                ),
            })
    }

    /// Picks the endpoints the driver needs.
    pub(super) fn endpoints(&self, auth: &AuthOptions) -> Result<Endpoints, ProviderError> {
        let interface = if auth.endpoint_type.is_empty() {
            DEFAULT_INTERFACE
        } else {
            auth.endpoint_type.as_str()
        };
        let region = auth.region.as_str();
        Ok(Endpoints {
            compute: self.endpoint("compute", region, interface)?,
            network: self.endpoint("network", region, interface)?,
            vpc: self.endpoint("vpc", region, interface)?,
            image: self.endpoint("image", region, interface)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn catalog() -> TokenResponse {
        let endpoint = |service: &str, url: &str| {
            json!({
                "type": service,
                "endpoints": [
                    { "interface": "public", "region": "eu-nl", "region_id": "eu-nl", "url": "https://other.example" },
                    { "interface": "public", "region": "eu-de", "region_id": "eu-de", "url": url },
                    { "interface": "internal", "region": "eu-de", "region_id": "eu-de", "url": "https://internal.example" },
                ]
            })
        };
        serde_json::from_value(json!({
            "token": {
                "project": { "id": "p-123" },
                "catalog": [
                    endpoint("compute", "https://ecs.example/v2.1/$(tenant_id)s"),
                    endpoint("network", "https://vpc.example/"),
                    endpoint("vpc", "https://vpc.example/v1/$(project_id)s"),
                    endpoint("image", "https://ims.example"),
                ]
            }
        }))
        .expect("catalog fixture should decode")
    }

    fn auth() -> AuthOptions {
        AuthOptions {
            region: String::from("eu-de"),
            ..AuthOptions::default()
        }
    }

    #[rstest]
    fn picks_regional_public_endpoints(catalog: TokenResponse) {
        let endpoints = catalog.endpoints(&auth()).expect("endpoints should resolve");
        assert_eq!(
            endpoints,
            Endpoints {
                compute: String::from("https://ecs.example/v2.1/p-123"),
                network: String::from("https://vpc.example"),
                vpc: String::from("https://vpc.example/v1/p-123"),
                image: String::from("https://ims.example"),
            }
        );
    }

    #[rstest]
    fn honours_endpoint_interface(catalog: TokenResponse) {
        let options = AuthOptions {
            endpoint_type: String::from("internal"),
            ..auth()
        };
        let endpoints = catalog.endpoints(&options).expect("endpoints should resolve");
        assert_eq!(endpoints.compute, "https://internal.example");
    }

    #[rstest]
    fn missing_region_is_an_authentication_error(catalog: TokenResponse) {
        let options = AuthOptions {
            region: String::from("ap-sg"),
            ..auth()
        };
        assert!(matches!(
            catalog.endpoints(&options),
            Err(ProviderError::Authentication { .. })
        ));
    }

    #[test]
    fn password_request_scopes_to_project_name_in_domain() {
        let options = AuthOptions {
            username: String::from("alice"),
            password: String::from("secret"),
            domain_name: String::from("OTC-EU-DE-0001"),
            project_name: String::from("eu-de_demo"),
            ..auth()
        };
        let body = token_request(&options).expect("password auth should build");
        assert_eq!(
            body,
            json!({
                "auth": {
                    "identity": {
                        "methods": ["password"],
                        "password": { "user": {
                            "name": "alice",
                            "password": "secret",
                            "domain": { "name": "OTC-EU-DE-0001" }
                        } }
                    },
                    "scope": { "project": {
                        "name": "eu-de_demo",
                        "domain": { "name": "OTC-EU-DE-0001" }
                    } }
                }
            })
        );
    }

    #[test]
    fn token_request_prefers_project_id_scope() {
        let options = AuthOptions {
            token: String::from("tok"),
            project_id: String::from("p-123"),
            project_name: String::from("ignored"),
            ..auth()
        };
        let body = token_request(&options).expect("token auth should build");
        assert_eq!(body["auth"]["identity"]["token"]["id"], "tok");
        assert_eq!(body["auth"]["scope"], json!({ "project": { "id": "p-123" } }));
    }

    #[rstest]
    #[case::access_key(AuthOptions { access_key: String::from("ak"), secret_key: String::from("sk"), ..AuthOptions::default() })]
    #[case::cloud(AuthOptions { cloud: String::from("otc"), ..AuthOptions::default() })]
    fn unsupported_methods_are_rejected(#[case] options: AuthOptions) {
        assert!(matches!(
            token_request(&options),
            Err(ProviderError::UnsupportedAuth { .. })
        ));
    }
}
