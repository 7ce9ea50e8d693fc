//! Route entries and the routed endpoint's dispatch table.
//!
//! Paths are stored relative to the API prefix without leading or trailing
//! slashes (`accounts/{id}`). A `{name}` segment matches any single
//! concrete segment, so two templates that differ only in parameter names
//! are the same route.

use std::collections::BTreeMap;

use finsight_plan::{PlanError, PlanResult};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// Prefix every route is mounted under.
pub const API_PREFIX: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "PATCH" => Some(HttpMethod::Patch),
            "DELETE" => Some(HttpMethod::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One `(method, path)` served by a compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub method: HttpMethod,
    #[serde(deserialize_with = "normalized_path")]
    pub path: String,
    /// Whether the authorization gate runs before the unit
    pub auth_required: bool,
}

impl RouteEntry {
    pub fn new(method: HttpMethod, path: &str, auth_required: bool) -> Self {
        Self {
            method,
            path: normalize(path),
            auth_required,
        }
    }

    pub fn protected(method: HttpMethod, path: &str) -> Self {
        Self::new(method, path, true)
    }

    pub fn public(method: HttpMethod, path: &str) -> Self {
        Self::new(method, path, false)
    }

    /// The path with every parameter name erased: `accounts/{}`.
    pub fn shape(&self) -> String {
        self.path
            .split('/')
            .map(|segment| if is_parameter(segment) { "{}" } else { segment })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Absolute resource path, e.g. `/v1/accounts/{id}`.
    pub fn full_path(&self) -> String {
        format!("/{}/{}", API_PREFIX, self.path)
    }
}

/// The usual collection/item route shape: list, create, get, update, delete.
pub fn crud_routes(collection: &str) -> Vec<RouteEntry> {
    let item = format!("{}/{{id}}", collection);
    vec![
        RouteEntry::protected(HttpMethod::Get, collection),
        RouteEntry::protected(HttpMethod::Post, collection),
        RouteEntry::protected(HttpMethod::Get, &item),
        RouteEntry::protected(HttpMethod::Put, &item),
        RouteEntry::protected(HttpMethod::Delete, &item),
    ]
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn normalized_path<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|path| normalize(&path))
}

fn is_parameter(segment: &str) -> bool {
    segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}')
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub unit: String,
    pub auth_required: bool,
    /// Parameter name -> concrete segment
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct RouteSlot {
    entry: RouteEntry,
    unit: String,
}

/// All routes of the endpoint, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    slots: Vec<RouteSlot>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit's routes. A method and path shape already present, in this
    /// unit or any other, is a route conflict.
    pub fn mount(&mut self, unit: &str, routes: &[RouteEntry]) -> PlanResult<()> {
        for entry in routes {
            let shape = entry.shape();
            if let Some(existing) = self
                .slots
                .iter()
                .find(|slot| slot.entry.method == entry.method && slot.entry.shape() == shape)
            {
                return Err(PlanError::RouteConflict {
                    method: entry.method.to_string(),
                    path: entry.full_path(),
                    first: existing.unit.clone(),
                    second: unit.to_string(),
                });
            }
            debug!("Route {} {} -> {}", entry.method, entry.full_path(), unit);
            self.slots.push(RouteSlot {
                entry: entry.clone(),
                unit: unit.to_string(),
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `(unit, entry)` pairs in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &RouteEntry)> {
        self.slots.iter().map(|s| (s.unit.as_str(), &s.entry))
    }

    /// Resolve a concrete request path such as `/v1/accounts/42`.
    ///
    /// When several templates match, the one with the fewest parameters wins.
    pub fn lookup(&self, method: HttpMethod, path: &str) -> Option<RouteMatch> {
        let normalized = normalize(path);
        let mut segments = normalized.split('/');
        if segments.next() != Some(API_PREFIX) {
            return None;
        }
        let segments: Vec<&str> = segments.collect();

        self.slots
            .iter()
            .filter(|slot| slot.entry.method == method)
            .filter_map(|slot| match_template(&slot.entry.path, &segments).map(|params| (slot, params)))
            .min_by_key(|(_, params)| params.len())
            .map(|(slot, params)| RouteMatch {
                unit: slot.unit.clone(),
                auth_required: slot.entry.auth_required,
                params,
            })
    }
}

fn match_template(template: &str, segments: &[&str]) -> Option<BTreeMap<String, String>> {
    let parts: Vec<&str> = template.split('/').collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (part, segment) in parts.iter().zip(segments) {
        if segment.is_empty() {
            return None;
        }
        if is_parameter(part) {
            params.insert(part[1..part.len() - 1].to_string(), segment.to_string());
        } else if part != segment {
            return None;
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut table = RouteTable::new();
        table.mount("accounts", &crud_routes("accounts")).unwrap();
        table
            .mount(
                "reports",
                &[
                    RouteEntry::protected(HttpMethod::Get, "reports/{id}"),
                    RouteEntry::protected(HttpMethod::Get, "reports/summary"),
                ],
            )
            .unwrap();
        table
            .mount("auth", &[RouteEntry::public(HttpMethod::Get, "/health/")])
            .unwrap();
        table
    }

    #[test]
    fn test_lookup_with_parameter() {
        let found = table().lookup(HttpMethod::Delete, "/v1/accounts/acc-42").unwrap();
        assert_eq!(found.unit, "accounts");
        assert!(found.auth_required);
        assert_eq!(found.params["id"], "acc-42");
    }

    #[test]
    fn test_literal_beats_parameter() {
        let found = table().lookup(HttpMethod::Get, "/v1/reports/summary").unwrap();
        assert!(found.params.is_empty());
    }

    #[test]
    fn test_public_route_skips_gate() {
        let found = table().lookup(HttpMethod::Get, "/v1/health").unwrap();
        assert_eq!(found.unit, "auth");
        assert!(!found.auth_required);
    }

    #[test]
    fn test_lookup_misses() {
        let table = table();
        assert!(table.lookup(HttpMethod::Patch, "/v1/accounts/1").is_none());
        assert!(table.lookup(HttpMethod::Get, "/v2/accounts").is_none());
        assert!(table.lookup(HttpMethod::Get, "/v1/accounts/1/extra").is_none());
    }

    #[test]
    fn test_duplicate_within_unit() {
        let mut table = RouteTable::new();
        let err = table
            .mount(
                "users",
                &[
                    RouteEntry::protected(HttpMethod::Get, "users/me"),
                    RouteEntry::protected(HttpMethod::Get, "/users/me"),
                ],
            )
            .unwrap_err();
        match err {
            PlanError::RouteConflict { method, path, first, second } => {
                assert_eq!(method, "GET");
                assert_eq!(path, "/v1/users/me");
                assert_eq!(first, "users");
                assert_eq!(second, "users");
            }
            other => panic!("expected route conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_across_units() {
        let mut table = table();
        let err = table
            .mount("reports2", &[RouteEntry::protected(HttpMethod::Get, "accounts")])
            .unwrap_err();
        assert!(matches!(err, PlanError::RouteConflict { ref first, .. } if first == "accounts"));
    }

    #[test]
    fn test_parameter_names_do_not_distinguish_routes() {
        let mut table = table();
        let err = table
            .mount("ledger", &[RouteEntry::protected(HttpMethod::Get, "accounts/{acctId}")])
            .unwrap_err();
        match err {
            PlanError::RouteConflict { path, first, second, .. } => {
                assert_eq!(path, "/v1/accounts/{acctId}");
                assert_eq!(first, "accounts");
                assert_eq!(second, "ledger");
            }
            other => panic!("expected route conflict, got {:?}", other),
        }

        // A literal segment is a different shape from a parameter
        table
            .mount("ledger", &[RouteEntry::protected(HttpMethod::Get, "accounts/summary")])
            .unwrap();
    }

    #[test]
    fn test_shape() {
        let entry = RouteEntry::protected(HttpMethod::Get, "accounts/{id}/entries/{entryId}");
        assert_eq!(entry.shape(), "accounts/{}/entries/{}");
    }

    #[test]
    fn test_deserialized_path_is_normalized() {
        let entry: RouteEntry =
            serde_json::from_str(r#"{"method": "GET", "path": "/accounts/", "authRequired": true}"#).unwrap();
        assert_eq!(entry.path, "accounts");
        assert_eq!(entry.full_path(), "/v1/accounts");

        let mut table = table();
        let err = table.mount("ledger", &[entry]).unwrap_err();
        assert!(matches!(err, PlanError::RouteConflict { .. }));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(HttpMethod::parse("delete"), Some(HttpMethod::Delete));
        assert_eq!(HttpMethod::parse("TRACE"), None);
    }
}
