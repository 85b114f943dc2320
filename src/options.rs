//! Typed access to driver options by flag name.

use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::flags::{self, FlagKind, FlagSpec};

/// Source of driver option values, looked up by flag name.
///
/// Implementations fall back to the flag table default when a value was not
/// supplied.
pub trait DriverOptions {
    /// Returns a string option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the flag is unknown or holds another kind.
    fn string(&self, name: &str) -> Result<String, ConfigError>;

    /// Returns an integer option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the flag is unknown or the value is not
    /// an integer.
    fn int(&self, name: &str) -> Result<i64, ConfigError>;

    /// Returns a boolean option.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the flag is unknown or holds another kind.
    fn boolean(&self, name: &str) -> Result<bool, ConfigError>;
}

/// A single supplied option value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FlagValue {
    /// String value.
    Text(String),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// In-memory option set keyed by flag name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FlagValues {
    values: BTreeMap<String, FlagValue>,
}

impl FlagValues {
    /// Creates an empty set; every lookup yields the table default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set with `name` bound to `value`.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<FlagValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Binds `name` to `value`, replacing any earlier value.
    pub fn set(&mut self, name: &str, value: impl Into<FlagValue>) {
        self.values.insert(name.to_owned(), value.into());
    }

    fn spec(name: &str) -> Result<&'static FlagSpec, ConfigError> {
        flags::find(name).ok_or_else(|| ConfigError::UnknownOption(name.to_owned()))
    }

    fn mismatch(spec: &FlagSpec, expected: &str, value: &FlagValue) -> ConfigError {
        ConfigError::InvalidValue {
            name: spec.name.to_owned(),
            expected: expected.to_owned(),
            value: match value {
                FlagValue::Text(text) => text.clone(),
                FlagValue::Int(number) => number.to_string(),
                FlagValue::Bool(flag) => flag.to_string(),
            },
        }
    }
}

impl DriverOptions for FlagValues {
    fn string(&self, name: &str) -> Result<String, ConfigError> {
        let spec = Self::spec(name)?;
        match self.values.get(name) {
            None => Ok(spec.default.to_owned()),
            Some(FlagValue::Text(text)) => Ok(text.clone()),
            Some(other) => Err(Self::mismatch(spec, "a string", other)),
        }
    }

    fn int(&self, name: &str) -> Result<i64, ConfigError> {
        let spec = Self::spec(name)?;
        let parse = |text: &str| {
            if text.trim().is_empty() {
                return Ok(0);
            }
            text.trim().parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                name: spec.name.to_owned(),
                expected: "an integer".to_owned(),
                value: text.to_owned(),
            })
        };
        match self.values.get(name) {
            None => parse(spec.default),
            Some(FlagValue::Int(number)) => Ok(*number),
            Some(FlagValue::Text(text)) if spec.kind == FlagKind::Int => parse(text),
            Some(other) => Err(Self::mismatch(spec, "an integer", other)),
        }
    }

    fn boolean(&self, name: &str) -> Result<bool, ConfigError> {
        let spec = Self::spec(name)?;
        match self.values.get(name) {
            None => Ok(false),
            Some(FlagValue::Bool(flag)) => Ok(*flag),
            Some(other) => Err(Self::mismatch(spec, "a boolean", other)),
        }
    }
}
