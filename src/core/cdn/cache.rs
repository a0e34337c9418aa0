//! Cache and origin-request policies
//!
//! The cache key and the data forwarded to the origin are configured separately.
//! Adding a header to the cache key fragments the cache; forwarding it to the
//! origin does not. Both policies start out empty, which keeps the hit ratio high.

use crate::core::resource::{ResourceDescriptor, ResourceKind};
use crate::core::validation::LogicalName;
use crate::core::value::Value;
use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Part of a viewer request that can vary the cache key or reach the origin
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum RequestComponent {
    Header(String),
    Cookie(String),
    #[serde(rename = "querystring")]
    QueryString(String),
}

/// Time-to-live bounds of cached objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlBounds {
    pub min: Duration,
    pub default: Duration,
    pub max: Duration,
}

impl TtlBounds {
    pub fn from_secs(min: u64, default: u64, max: u64) -> Self {
        TtlBounds {
            min: Duration::from_secs(min),
            default: Duration::from_secs(default),
            max: Duration::from_secs(max),
        }
    }

    /// Check `min <= default <= max`, each representable as whole signed seconds
    pub fn validate(&self) -> Result<()> {
        if self.min <= self.default && self.default <= self.max {
            self.signed_secs().map(|_| ())
        } else {
            Err(self.invalid())
        }
    }

    /// `(min, default, max)` in seconds as rendered into the policy
    fn signed_secs(&self) -> Result<(i64, i64, i64)> {
        let secs = |d: Duration| i64::try_from(d.as_secs()).map_err(|_| self.invalid());
        Ok((secs(self.min)?, secs(self.default)?, secs(self.max)?))
    }

    fn invalid(&self) -> StackError {
        StackError::InvalidTtlBounds {
            min: self.min.as_secs(),
            default: self.default.as_secs(),
            max: self.max.as_secs(),
        }
    }
}

impl Default for TtlBounds {
    /// One second minimum, one day default, one year maximum
    fn default() -> Self {
        TtlBounds::from_secs(1, 86_400, 31_536_000)
    }
}

/// Names of each component type in a set, sorted
#[derive(Debug, Default)]
struct Partitioned {
    headers: Vec<String>,
    cookies: Vec<String>,
    query_strings: Vec<String>,
}

fn partition(components: &BTreeSet<RequestComponent>) -> Partitioned {
    let mut parts = Partitioned::default();
    for component in components {
        match component {
            RequestComponent::Header(name) => parts.headers.push(name.clone()),
            RequestComponent::Cookie(name) => parts.cookies.push(name.clone()),
            RequestComponent::QueryString(name) => parts.query_strings.push(name.clone()),
        }
    }
    parts
}

/// `{"<Kind>Behavior": "none"}` or a whitelist of names
fn behavior(kind: &str, names: &[String]) -> Value {
    if names.is_empty() {
        Value::map([(format!("{}Behavior", kind), Value::from("none"))])
    } else {
        Value::map([
            (format!("{}Behavior", kind), Value::from("whitelist")),
            (format!("{}s", kind), Value::list(names.iter().cloned())),
        ])
    }
}

fn components_config(components: &BTreeSet<RequestComponent>) -> Vec<(&'static str, Value)> {
    let parts = partition(components);
    vec![
        ("HeadersConfig", behavior("Header", &parts.headers)),
        ("CookiesConfig", behavior("Cookie", &parts.cookies)),
        ("QueryStringsConfig", behavior("QueryString", &parts.query_strings)),
    ]
}

/// Controls what varies the cache key and how long entries live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    ttl: TtlBounds,
    cache_key: BTreeSet<RequestComponent>,
    enable_accept_encoding_gzip: bool,
    enable_accept_encoding_brotli: bool,
    comment: Option<String>,
}

impl CachePolicy {
    /// Build a cache policy, validating the TTL bounds
    pub fn build(
        ttl: TtlBounds,
        cache_key: impl IntoIterator<Item = RequestComponent>,
    ) -> Result<Self> {
        ttl.validate()?;
        Ok(CachePolicy {
            ttl,
            cache_key: cache_key.into_iter().collect(),
            enable_accept_encoding_gzip: true,
            enable_accept_encoding_brotli: true,
            comment: None,
        })
    }

    /// Normalise the Accept-Encoding header for gzip and brotli
    pub fn with_accept_encoding(mut self, gzip: bool, brotli: bool) -> Self {
        self.enable_accept_encoding_gzip = gzip;
        self.enable_accept_encoding_brotli = brotli;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn ttl(&self) -> TtlBounds {
        self.ttl
    }

    pub fn cache_key(&self) -> &BTreeSet<RequestComponent> {
        &self.cache_key
    }

    /// Nothing beyond the URL path varies the cache key
    pub fn is_baseline(&self) -> bool {
        self.cache_key.is_empty()
    }

    pub fn to_descriptor<N>(&self, logical_name: N) -> Result<ResourceDescriptor>
    where
        N: TryInto<LogicalName, Error = StackError>,
    {
        let mut parameters = components_config(&self.cache_key);
        parameters.push((
            "EnableAcceptEncodingGzip",
            Value::from(self.enable_accept_encoding_gzip),
        ));
        parameters.push((
            "EnableAcceptEncodingBrotli",
            Value::from(self.enable_accept_encoding_brotli),
        ));

        let (min, default, max) = self.ttl.signed_secs()?;
        Ok(ResourceDescriptor::new(ResourceKind::CachePolicy, logical_name)?
            .with_optional("Comment", self.comment.clone())
            .with("MinTTL", Value::Int(min))
            .with("DefaultTTL", Value::Int(default))
            .with("MaxTTL", Value::Int(max))
            .with(
                "ParametersInCacheKeyAndForwardedToOrigin",
                Value::map(parameters),
            ))
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy {
            ttl: TtlBounds::default(),
            cache_key: BTreeSet::new(),
            enable_accept_encoding_gzip: true,
            enable_accept_encoding_brotli: true,
            comment: None,
        }
    }
}

/// Controls which request data reaches the origin, independent of the cache key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRequestPolicy {
    forwarded: BTreeSet<RequestComponent>,
    comment: Option<String>,
}

impl OriginRequestPolicy {
    pub fn build(forwarded: impl IntoIterator<Item = RequestComponent>) -> Self {
        OriginRequestPolicy {
            forwarded: forwarded.into_iter().collect(),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn forwarded(&self) -> &BTreeSet<RequestComponent> {
        &self.forwarded
    }

    /// Nothing is forwarded to the origin
    pub fn is_baseline(&self) -> bool {
        self.forwarded.is_empty()
    }

    pub fn to_descriptor<N>(&self, logical_name: N) -> Result<ResourceDescriptor>
    where
        N: TryInto<LogicalName, Error = StackError>,
    {
        let mut descriptor = ResourceDescriptor::new(ResourceKind::OriginRequestPolicy, logical_name)?
            .with_optional("Comment", self.comment.clone());
        for (key, value) in components_config(&self.forwarded) {
            descriptor = descriptor.with(key, value);
        }
        Ok(descriptor)
    }
}
