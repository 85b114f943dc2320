//! Ownership bookkeeping for cloud resources the driver may have created.
//!
//! Every provider-side identifier the driver persists travels inside a
//! [`ManagedResource`], which pairs the value with a flag recording whether
//! this driver created it. Teardown consults that flag so caller-supplied
//! resources are never deleted.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Values that can be empty, meaning "no resource recorded".
pub trait ResourceValue {
    /// Returns `true` when the value does not reference a resource.
    fn is_blank(&self) -> bool;
}

macro_rules! resource_value {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw provider value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl ResourceValue for $name {
            fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

resource_value!(
    /// Identifier of a virtual private cloud.
    VpcId
);
resource_value!(
    /// Identifier of a subnet inside a VPC.
    SubnetId
);
resource_value!(
    /// Identifier of a security group.
    SecurityGroupId
);
resource_value!(
    /// Name of a provider-side SSH key pair.
    KeyPairName
);
resource_value!(
    /// Identifier of a compute instance.
    InstanceId
);
resource_value!(
    /// Textual IPv4 or IPv6 address.
    IpAddress
);

/// A persisted resource reference plus the "created by this driver" flag.
///
/// Serialises as `{"value": ..., "managed": bool}` so machine records stay
/// readable by hand.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ManagedResource<T> {
    value: T,
    #[serde(rename = "managed")]
    driver_managed: bool,
}

impl<T: ResourceValue + Default> ManagedResource<T> {
    /// Returns an empty, unmanaged reference.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }

    /// Wraps a resource that exists independently of this driver.
    #[must_use]
    pub const fn existing(value: T) -> Self {
        Self {
            value,
            driver_managed: false,
        }
    }

    /// Wraps a resource this driver has just created.
    #[must_use]
    pub const fn created(value: T) -> Self {
        Self {
            value,
            driver_managed: true,
        }
    }

    /// Returns the recorded value, which may be blank.
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// Returns `true` when a non-empty value is recorded.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.value.is_blank()
    }

    /// Returns `true` when this driver created the resource.
    #[must_use]
    pub const fn is_driver_managed(&self) -> bool {
        self.driver_managed
    }

    /// Returns `true` when teardown must delete the resource.
    #[must_use]
    pub fn needs_teardown(&self) -> bool {
        self.driver_managed && self.is_present()
    }

    /// Forgets the resource after it has been deleted.
    pub fn clear(&mut self) {
        *self = Self::absent();
    }
}

impl<T: ResourceValue + Default> From<T> for ManagedResource<T> {
    fn from(value: T) -> Self {
        Self::existing(value)
    }
}
