//! Cache key generation.
//!
//! A key is the canonical JSON rendering of `[endpoint, params, tenant]`. Params live in a
//! `BTreeMap` and are rendered key-sorted, tenant fields are rendered positionally with absent
//! fields as `null`, so construction order never leaks into the key.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

/// A single query parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    /// Query-string rendering; `None` for `Null` (null params are never sent).
    pub fn to_query_value(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(b) => Some(b.to_string()),
            Scalar::Int(i) => Some(i.to_string()),
            Scalar::Float(f) => Some(match integral(*f) {
                Some(i) => i.to_string(),
                None => f.to_string(),
            }),
            Scalar::Str(s) => Some(s.clone()),
        }
    }

    fn canonical(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::from(*i),
            Scalar::Float(f) => match integral(*f) {
                Some(i) => Value::from(i),
                None => serde_json::Number::from_f64(*f)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(f.to_string())),
            },
            Scalar::Str(s) => Value::String(s.clone()),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

// 1.0 and 1 are the same request on the wire.
fn integral(f: f64) -> Option<i64> {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_SAFE {
        Some(f as i64)
    } else {
        None
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}
impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::Int(i64::from(v))
    }
}
impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}
impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Int(i64::from(v))
    }
}
impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}
impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}
impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Str(v)
    }
}
impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Query parameters of a GET request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Scalar>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.0.get(name)
    }

    /// Wire value of the first non-null param whose name matches `name` ignoring ASCII case.
    fn value_named(&self, name: &str) -> Option<String> {
        self.0
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .find_map(|(_, v)| v.to_query_value())
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|v| matches!(v, Scalar::Null))
    }

    /// Build from a JSON object whose values are all scalars.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            Error::validation(
                "query params must be a JSON object",
                ErrorContext::new().with_source("params"),
            )
        })?;
        let mut params = Params::new();
        for (name, v) in obj {
            let scalar = Scalar::from_json(v).ok_or_else(|| {
                Error::validation(
                    format!("query param '{}' is not a scalar", name),
                    ErrorContext::new().with_source("params"),
                )
            })?;
            params.insert(name.clone(), scalar);
        }
        Ok(params)
    }

    /// Name/value pairs to put on the wire, null values skipped, in key order.
    pub fn query_pairs(&self) -> impl Iterator<Item = (&str, String)> + '_ {
        self.0
            .iter()
            .filter_map(|(k, v)| v.to_query_value().map(|s| (k.as_str(), s)))
    }

    fn canonical(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in &self.0 {
            if !matches!(v, Scalar::Null) {
                map.insert(k.clone(), v.canonical());
            }
        }
        Value::Object(map)
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// Wire names of the tenant fields, in key order.
const TENANT_FIELDS: [&str; 5] = ["userId", "role", "instituteId", "classId", "subjectId"];

/// The tenant a request is issued on behalf of. Unset fields are a distinct "no value".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TenantContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institute_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

impl TenantContext {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn user(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
    pub fn institute(mut self, id: impl Into<String>) -> Self {
        self.institute_id = Some(id.into());
        self
    }
    pub fn class(mut self, id: impl Into<String>) -> Self {
        self.class_id = Some(id.into());
        self
    }
    pub fn subject(mut self, id: impl Into<String>) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields().into_iter().all(|f| f.is_none())
    }

    /// True when every field set in `scope` has the same value here. Unset scope fields are
    /// wildcards, so an empty scope matches every context.
    pub fn within(&self, scope: &TenantContext) -> bool {
        self.fields()
            .into_iter()
            .zip(scope.fields())
            .all(|(mine, wanted)| wanted.is_none() || mine == wanted)
    }

    /// This context with unset fields taken from same-named query params, so a read issued as
    /// `?instituteId=I` falls inside institute `I`'s scope.
    pub fn or_params(&self, params: Option<&Params>) -> TenantContext {
        let mut merged = self.clone();
        let Some(params) = params else {
            return merged;
        };
        let slots = [
            &mut merged.user_id,
            &mut merged.role,
            &mut merged.institute_id,
            &mut merged.class_id,
            &mut merged.subject_id,
        ];
        for (slot, name) in slots.into_iter().zip(TENANT_FIELDS) {
            if slot.is_none() {
                *slot = params.value_named(name);
            }
        }
        merged
    }

    fn fields(&self) -> [&Option<String>; 5] {
        [
            &self.user_id,
            &self.role,
            &self.institute_id,
            &self.class_id,
            &self.subject_id,
        ]
    }

    fn canonical(&self) -> Value {
        Value::Array(
            self.fields()
                .into_iter()
                .map(|f| f.as_ref().map_or(Value::Null, |s| Value::String(s.clone())))
                .collect(),
        )
    }
}

/// Identity of a cacheable request.
///
/// Equality and hashing use only the canonical string; `endpoint`, `tenant` and `scope` are
/// kept alongside for invalidation.
#[derive(Debug, Clone)]
pub struct CacheKey {
    canonical: String,
    endpoint: String,
    tenant: TenantContext,
    scope: TenantContext,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tenant(&self) -> &TenantContext {
        &self.tenant
    }

    /// Tenant the read belongs to for invalidation: context fields first, then tenant-named
    /// params.
    pub fn scope(&self) -> &TenantContext {
        &self.scope
    }

    /// First path segment of the endpoint, e.g. `"homework"` for `/homework/12/submissions`.
    pub fn family(&self) -> &str {
        endpoint_family(&self.endpoint)
    }

    /// Short SHA-256 digest for log lines.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical.as_bytes());
        hasher
            .finalize()
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

/// First non-empty path segment, ignoring any query suffix.
pub fn endpoint_family(endpoint: &str) -> &str {
    let path = endpoint.split('?').next().unwrap_or(endpoint);
    path.split('/').find(|s| !s.is_empty()).unwrap_or("")
}

/// Derive the cache identity of a request. Pure: no clock, no I/O.
pub fn build_key(endpoint: &str, params: Option<&Params>, tenant: &TenantContext) -> CacheKey {
    let canonical = Value::Array(vec![
        Value::String(endpoint.to_string()),
        params.map_or_else(|| Value::Object(Map::new()), Params::canonical),
        tenant.canonical(),
    ])
    .to_string();
    CacheKey {
        canonical,
        endpoint: endpoint.to_string(),
        tenant: tenant.clone(),
        scope: tenant.or_params(params),
    }
}
