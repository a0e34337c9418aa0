//! Validation for stack, resource and export names
//!
//! Names are validated once, when they enter the model, and carried around as
//! newtypes afterwards so that nothing downstream has to re-check them.

use crate::error::{Result, StackError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

fn validate(kind: &str, value: &str, re: &Regex, max_length: usize) -> Result<()> {
    if value.is_empty() {
        return Err(StackError::InvalidName(format!("{} cannot be empty", kind)));
    }

    if value.len() > max_length {
        return Err(StackError::InvalidName(format!(
            "{} '{}' too long (max {} characters)",
            kind, value, max_length
        )));
    }

    if !re.is_match(value) {
        return Err(StackError::InvalidName(format!(
            "{} '{}' must match {}",
            kind,
            value,
            re.as_str()
        )));
    }

    Ok(())
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $pattern:literal, $max:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Pattern every value must match
            pub const PATTERN: &'static str = $pattern;

            /// Maximum length in bytes
            pub const MAX_LENGTH: usize = $max;

            /// Create a new validated name
            pub fn new(value: impl Into<String>) -> Result<Self> {
                static RE: OnceLock<Regex> = OnceLock::new();
                let value = value.into();
                let re = RE.get_or_init(|| Regex::new($pattern).expect("static name pattern"));
                validate($kind, &value, re, $max)?;
                Ok($name(value))
            }

            /// Get the name as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = StackError;

            fn try_from(value: String) -> Result<Self> {
                $name::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = StackError;

            fn try_from(value: &str) -> Result<Self> {
                $name::new(value)
            }
        }

        impl TryFrom<&$name> for $name {
            type Error = StackError;

            fn try_from(value: &$name) -> Result<Self> {
                Ok(value.clone())
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> String {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

validated_name!(
    /// Name of a stack, unique within an app
    ///
    /// Starts with a letter; letters, digits and hyphens afterwards.
    StackName,
    "stack name",
    r"^[A-Za-z][A-Za-z0-9-]*$",
    128
);

validated_name!(
    /// Logical name of a resource, unique within its stack
    ///
    /// Alphanumeric, starting with a letter (e.g. "OriginBucket").
    LogicalName,
    "logical name",
    r"^[A-Za-z][A-Za-z0-9]*$",
    255
);

validated_name!(
    /// Name under which a stack publishes a value for other stacks
    ExportName,
    "export name",
    r"^[A-Za-z0-9:-]+$",
    255
);
