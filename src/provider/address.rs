//! Typed decoding of instance address payloads.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::ProviderError;
use crate::managed::IpAddress;

/// One address entry within a pool.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct AddressEntry {
    /// Textual address.
    pub addr: String,
    /// IP version, when reported.
    #[serde(default)]
    pub version: Option<u8>,
}

/// Decodes `{"pool": [{"addr": ...}, ...], ...}` into pools ordered by name.
///
/// A `null` payload means no pools.
///
/// # Errors
///
/// Returns [`ProviderError::UnexpectedAddressShape`] when the payload is not
/// an object of arrays of address objects.
pub fn decode_pools(
    raw: &serde_json::Value,
) -> Result<BTreeMap<String, Vec<AddressEntry>>, ProviderError> {
    if raw.is_null() {
        return Ok(BTreeMap::new());
    }
    BTreeMap::<String, Vec<AddressEntry>>::deserialize(raw).map_err(|err| {
        ProviderError::UnexpectedAddressShape {
            message: err.to_string(),
        }
    })
}

/// Returns the first address of the first non-empty pool.
///
/// # Errors
///
/// Propagates [`decode_pools`] failures.
pub fn first_address(raw: &serde_json::Value) -> Result<Option<IpAddress>, ProviderError> {
    let pools = decode_pools(raw)?;
    Ok(pools
        .into_values()
        .find_map(|entries| entries.into_iter().next())
        .map(|entry| IpAddress::from(entry.addr)))
}

/// Returns `true` when any pool lists `address`.
///
/// # Errors
///
/// Propagates [`decode_pools`] failures.
pub fn contains_address(raw: &serde_json::Value, address: &str) -> Result<bool, ProviderError> {
    Ok(decode_pools(raw)?
        .values()
        .flatten()
        .any(|entry| entry.addr == address))
}
