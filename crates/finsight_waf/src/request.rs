//! Request facets a rule can inspect.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Part of a request a leaf statement reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldToMatch {
    Body,
    QueryString,
    /// Header by name, compared case-insensitively
    SingleHeader(String),
}

/// The observable facets of one incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Header names are stored lowercase
    #[serde(default, deserialize_with = "lowercase_keys")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub client_ip: String,
    /// ISO 3166 alpha-2 code resolved from the client address
    #[serde(default)]
    pub country: String,
    /// Requests seen from `client_ip` in the current rate window
    #[serde(default)]
    pub recent_requests: u64,
}

fn lowercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let headers = BTreeMap::<String, String>::deserialize(deserializer)?;
    Ok(headers
        .into_iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value))
        .collect())
}

impl Request {
    pub fn new(client_ip: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            country: country.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_recent_requests(mut self, count: u64) -> Self {
        self.recent_requests = count;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Raw text of a field. A missing header reads as `None`.
    pub fn field(&self, field: &FieldToMatch) -> Option<&str> {
        match field {
            FieldToMatch::Body => Some(&self.body),
            FieldToMatch::QueryString => Some(&self.query),
            FieldToMatch::SingleHeader(name) => self.header(name),
        }
    }
}
