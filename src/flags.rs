//! Driver flag table shared by the CLI, the build script and option binding.
//!
//! Each entry names a `--otc-*` flag, the environment variable that can supply
//! it, the value kind and the default used when neither is given. The module
//! depends on the standard library only so `build.rs` can include it.

/// Value kind accepted by a flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlagKind {
    /// Free-form string.
    Text,
    /// Signed integer.
    Int,
    /// Presence toggle.
    Bool,
}

/// Static description of one driver flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FlagSpec {
    /// Flag name without the leading dashes.
    pub name: &'static str,
    /// Environment variable consulted when the flag is absent.
    pub env_var: Option<&'static str>,
    /// Help text.
    pub usage: &'static str,
    /// Value kind.
    pub kind: FlagKind,
    /// Default value rendered as text; empty means "unset".
    pub default: &'static str,
}

impl FlagSpec {
    const fn text(
        name: &'static str,
        env_var: Option<&'static str>,
        usage: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            env_var,
            usage,
            kind: FlagKind::Text,
            default,
        }
    }

    const fn int(
        name: &'static str,
        env_var: Option<&'static str>,
        usage: &'static str,
        default: &'static str,
    ) -> Self {
        Self {
            name,
            env_var,
            usage,
            kind: FlagKind::Int,
            default,
        }
    }

    const fn toggle(name: &'static str, usage: &'static str) -> Self {
        Self {
            name,
            env_var: None,
            usage,
            kind: FlagKind::Bool,
            default: "",
        }
    }
}

/// Default Identity endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://iam.eu-de.otc.t-systems.com/v3";
/// Default region.
pub const DEFAULT_REGION: &str = "eu-de";
/// Default availability zone.
pub const DEFAULT_AVAILABILITY_ZONE: &str = "eu-de-01";
/// Default flavor name.
pub const DEFAULT_FLAVOR_NAME: &str = "s2.large.4";
/// Default image name.
pub const DEFAULT_IMAGE_NAME: &str = "Standard_Ubuntu_18.04_latest";
/// Default VPC name.
pub const DEFAULT_VPC_NAME: &str = "vpc-docker-machine";
/// Default subnet name.
pub const DEFAULT_SUBNET_NAME: &str = "subnet-docker-machine";
/// Default SSH login.
pub const DEFAULT_SSH_USER: &str = "ubuntu";
/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

macro_rules! flag_names {
    ($($name:ident => $value:literal,)*) => {
        $(
            #[doc = concat!("Name of the `--", $value, "` flag.")]
            pub const $name: &str = $value;
        )*
    };
}

flag_names! {
    CLOUD => "otc-cloud",
    AUTH_URL => "otc-auth-url",
    CA_CERT => "otc-cacert",
    DOMAIN_ID => "otc-domain-id",
    DOMAIN_NAME => "otc-domain-name",
    USERNAME => "otc-username",
    PASSWORD => "otc-password",
    PROJECT_NAME => "otc-project-name",
    PROJECT_ID => "otc-project-id",
    TENANT_ID => "otc-tenant-id",
    REGION => "otc-region",
    ACCESS_KEY_ID => "otc-access-key-id",
    ACCESS_KEY_SECRET => "otc-access-key-key",
    AVAILABILITY_ZONE => "otc-availability-zone",
    AVAILABLE_ZONE => "otc-available-zone",
    FLAVOR_ID => "otc-flavor-id",
    FLAVOR_NAME => "otc-flavor-name",
    IMAGE_ID => "otc-image-id",
    IMAGE_NAME => "otc-image-name",
    KEYPAIR_NAME => "otc-keypair-name",
    VPC_ID => "otc-vpc-id",
    VPC_NAME => "otc-vpc-name",
    SUBNET_ID => "otc-subnet-id",
    SUBNET_NAME => "otc-subnet-name",
    PRIVATE_KEY_FILE => "otc-private-key-file",
    USER_DATA_FILE => "otc-user-data-file",
    USER_DATA_RAW => "otc-user-data-raw",
    TOKEN => "otc-token",
    SECURITY_GROUPS => "otc-sec-groups",
    FLOATING_IP => "otc-floating-ip",
    FLOATING_IP_TYPE => "otc-floating-ip-type",
    ELASTIC_IP_TYPE => "otc-elastic-ip-type",
    BANDWIDTH_SIZE => "otc-bandwidth-size",
    BANDWIDTH_TYPE => "otc-bandwidth-type",
    ELASTIC_IP => "otc-elastic-ip",
    SKIP_IP => "otc-skip-ip",
    IP_VERSION => "otc-ip-version",
    SSH_USER => "otc-ssh-user",
    SSH_PORT => "otc-ssh-port",
    ENDPOINT_TYPE => "otc-endpoint-type",
    SKIP_DEFAULT_SG => "otc-skip-default-sg",
    K8S_GROUP => "otc-k8s-group",
    SERVER_GROUP => "otc-server-group",
    SERVER_GROUP_ID => "otc-server-group-id",
    ROOT_VOLUME_SIZE => "otc-root-volume-size",
    TAGS => "otc-tags",
    ROOT_VOLUME_TYPE => "otc-root-volume-type",
}

/// Every flag accepted by `create`, in help-output order.
pub const CREATE_FLAGS: &[FlagSpec] = &[
    FlagSpec::text(CLOUD, Some("OS_CLOUD"), "Name of cloud in `clouds.yaml` file", ""),
    FlagSpec::text(AUTH_URL, Some("OS_AUTH_URL"), "OpenTelekomCloud authentication URL", DEFAULT_AUTH_URL),
    FlagSpec::text(CA_CERT, Some("OS_CACERT"), "CA certificate bundle to verify against", ""),
    FlagSpec::text(DOMAIN_ID, Some("OS_DOMAIN_ID"), "OpenTelekomCloud Domain ID", ""),
    FlagSpec::text(DOMAIN_NAME, Some("OS_DOMAIN_NAME"), "OpenTelekomCloud Domain name", ""),
    FlagSpec::text(USERNAME, Some("OS_USERNAME"), "OpenTelekomCloud username", ""),
    FlagSpec::text(PASSWORD, Some("OS_PASSWORD"), "OpenTelekomCloud password", ""),
    FlagSpec::text(PROJECT_NAME, Some("OS_PROJECT_NAME"), "OpenTelekomCloud project name", ""),
    FlagSpec::text(PROJECT_ID, Some("OS_PROJECT_ID"), "OpenTelekomCloud project ID", ""),
    FlagSpec::text(TENANT_ID, Some("TENANT_ID"), "OpenTelekomCloud project ID (legacy)", ""),
    FlagSpec::text(REGION, Some("REGION"), "OpenTelekomCloud region name", DEFAULT_REGION),
    FlagSpec::text(ACCESS_KEY_ID, Some("ACCESS_KEY_ID"), "OpenTelekomCloud access key ID for AK/SK auth", ""),
    FlagSpec::text(ACCESS_KEY_SECRET, Some("ACCESS_KEY_SECRET"), "OpenTelekomCloud secret access key for AK/SK auth", ""),
    FlagSpec::text(AVAILABILITY_ZONE, Some("OS_AVAILABILITY_ZONE"), "OpenTelekomCloud availability zone", DEFAULT_AVAILABILITY_ZONE),
    FlagSpec::text(AVAILABLE_ZONE, Some("AVAILABLE_ZONE"), "OpenTelekomCloud availability zone (legacy)", ""),
    FlagSpec::text(FLAVOR_ID, Some("FLAVOR_ID"), "OpenTelekomCloud flavor id to use for the instance", ""),
    FlagSpec::text(FLAVOR_NAME, Some("OS_FLAVOR_NAME"), "OpenTelekomCloud flavor name to use for the instance", DEFAULT_FLAVOR_NAME),
    FlagSpec::text(IMAGE_ID, Some("IMAGE_ID"), "OpenTelekomCloud image id to use for the instance", ""),
    FlagSpec::text(IMAGE_NAME, Some("OS_IMAGE_NAME"), "OpenTelekomCloud image name to use for the instance", DEFAULT_IMAGE_NAME),
    FlagSpec::text(KEYPAIR_NAME, Some("OS_KEYPAIR_NAME"), "OpenTelekomCloud keypair to use to SSH to the instance", ""),
    FlagSpec::text(VPC_ID, Some("VPC_ID"), "OpenTelekomCloud VPC id the machine will be connected on", ""),
    FlagSpec::text(VPC_NAME, Some("OS_VPC_NAME"), "OpenTelekomCloud VPC name the machine will be connected on", DEFAULT_VPC_NAME),
    FlagSpec::text(SUBNET_ID, Some("SUBNET_ID"), "OpenTelekomCloud subnet id the machine will be connected on", ""),
    FlagSpec::text(SUBNET_NAME, Some("OS_SUBNET_NAME"), "OpenTelekomCloud subnet name the machine will be connected on", DEFAULT_SUBNET_NAME),
    FlagSpec::text(PRIVATE_KEY_FILE, Some("OS_PRIVATE_KEY_FILE"), "Private key file to use for SSH (absolute path)", ""),
    FlagSpec::text(USER_DATA_FILE, Some("OS_USER_DATA_FILE"), "File containing an user data script", ""),
    FlagSpec::text(USER_DATA_RAW, None, "Contents of user data file as a string", ""),
    FlagSpec::text(TOKEN, Some("OS_TOKEN"), "OpenTelekomCloud authorization token", ""),
    FlagSpec::text(SECURITY_GROUPS, Some("OS_SECURITY_GROUP"), "Existing security groups to use, separated by comma", ""),
    FlagSpec::text(FLOATING_IP, Some("OS_FLOATING_IP"), "OpenTelekomCloud floating IP to use", ""),
    FlagSpec::text(FLOATING_IP_TYPE, Some("OS_FLOATING_IP_TYPE"), "OpenTelekomCloud bandwidth type", "5_bgp"),
    FlagSpec::text(ELASTIC_IP_TYPE, Some("ELASTICIP_TYPE"), "OpenTelekomCloud bandwidth type (legacy)", ""),
    FlagSpec::int(BANDWIDTH_SIZE, Some("BANDWIDTH_SIZE"), "OpenTelekomCloud bandwidth size", "100"),
    FlagSpec::text(BANDWIDTH_TYPE, Some("BANDWIDTH_TYPE"), "OpenTelekomCloud bandwidth share type", "PER"),
    FlagSpec::int(ELASTIC_IP, Some("ELASTIC_IP"), "If set to 0, elastic IP won't be created (legacy)", "1"),
    FlagSpec::toggle(SKIP_IP, "If set, elastic IP won't be created"),
    FlagSpec::int(IP_VERSION, Some("OS_IP_VERSION"), "OpenTelekomCloud version of IP address assigned for the machine", "4"),
    FlagSpec::text(SSH_USER, Some("SSH_USER"), "Machine SSH username", DEFAULT_SSH_USER),
    FlagSpec::int(SSH_PORT, Some("OS_SSH_PORT"), "Machine SSH port", "22"),
    FlagSpec::text(ENDPOINT_TYPE, Some("OS_INTERFACE"), "OpenTelekomCloud interface (endpoint) type", "public"),
    FlagSpec::toggle(SKIP_DEFAULT_SG, "Don't create default security group"),
    FlagSpec::toggle(K8S_GROUP, "Create security group with k8s ports allowed"),
    FlagSpec::text(SERVER_GROUP, Some("OS_SERVER_GROUP"), "Define server group where server will be created", ""),
    FlagSpec::text(SERVER_GROUP_ID, Some("OS_SERVER_GROUP_ID"), "Define server group where server will be created by ID", ""),
    FlagSpec::int(ROOT_VOLUME_SIZE, Some("ROOT_VOLUME_SIZE"), "Set volume size", "200"),
    FlagSpec::text(TAGS, Some("OS_TAGS"), "Comma-separated list of instance tags", ""),
    FlagSpec::text(ROOT_VOLUME_TYPE, Some("ROOT_VOLUME_TYPE"), "Set volume type", "SSD"),
];

/// Looks up a flag by name.
#[must_use]
pub fn find(name: &str) -> Option<&'static FlagSpec> {
    CREATE_FLAGS.iter().find(|spec| spec.name == name)
}
