//! Domain Ports - The WBEM collaborator boundary
//!
//! The array is reached through an external WBEM/CIM client library that owns
//! the wire protocol. This module defines the value types crossing that
//! boundary and the [`WbemClient`] trait adapters implement.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Object Paths
// =============================================================================

/// Class-typed, key-qualified reference to one array-side object
///
/// Two paths are equal when their class names and every key binding compare
/// equal. Paths are produced by a resolution call and consumed by the next
/// one; the client never caches them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectPath {
    #[serde(rename = "class")]
    class_name: String,
    #[serde(default)]
    keys: BTreeMap<String, String>,
}

impl ObjectPath {
    /// Create a path with no key bindings
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            keys: BTreeMap::new(),
        }
    }

    /// Add a key binding
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), value.into());
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// CIM class names compare case-insensitively
    pub fn is_class(&self, class_name: &str) -> bool {
        self.class_name.eq_ignore_ascii_case(class_name)
    }

    /// Look up a key binding by name (GetKeyFromName)
    pub fn key(&self, name: &str) -> Result<&str> {
        self.keys
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::Format(format!("{} has no key {}", self.class_name, name)))
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.class_name)?;
        for (i, (name, value)) in self.keys.iter().enumerate() {
            let sep = if i == 0 { '.' } else { ',' };
            write!(f, "{}{}=\"{}\"", sep, name, value)?;
        }
        Ok(())
    }
}

// =============================================================================
// Values
// =============================================================================

/// A CIM property or parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CimValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Reference(ObjectPath),
    Array(Vec<CimValue>),
}

impl CimValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CimValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integers travel as strings on some transports, so numeric strings
    /// are accepted too
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CimValue::Integer(i) => Some(*i),
            CimValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CimValue::Real(r) => Some(*r),
            CimValue::Integer(i) => Some(*i as f64),
            CimValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CimValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ObjectPath> {
        match self {
            CimValue::Reference(path) => Some(path),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CimValue]> {
        match self {
            CimValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for CimValue {
    fn from(s: &str) -> Self {
        CimValue::String(s.to_string())
    }
}

impl From<String> for CimValue {
    fn from(s: String) -> Self {
        CimValue::String(s)
    }
}

impl From<i64> for CimValue {
    fn from(i: i64) -> Self {
        CimValue::Integer(i)
    }
}

impl From<u16> for CimValue {
    fn from(i: u16) -> Self {
        CimValue::Integer(i64::from(i))
    }
}

impl From<bool> for CimValue {
    fn from(b: bool) -> Self {
        CimValue::Boolean(b)
    }
}

impl From<ObjectPath> for CimValue {
    fn from(path: ObjectPath) -> Self {
        CimValue::Reference(path)
    }
}

impl From<Vec<ObjectPath>> for CimValue {
    fn from(paths: Vec<ObjectPath>) -> Self {
        CimValue::Array(paths.into_iter().map(CimValue::Reference).collect())
    }
}

// =============================================================================
// Instances
// =============================================================================

/// Full property bag of one object, as returned by GetInstance
///
/// The bag stays untyped to match the live schema; callers go through the
/// typed accessors, which fail with [`Error::Format`] on absence or type
/// mismatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub path: ObjectPath,
    #[serde(default)]
    pub properties: BTreeMap<String, CimValue>,
}

impl Instance {
    pub fn new(path: ObjectPath) -> Self {
        Self {
            path,
            properties: BTreeMap::new(),
        }
    }

    /// Look up a property by name (GetProperty)
    pub fn property(&self, name: &str) -> Result<&CimValue> {
        match self.properties.get(name) {
            Some(CimValue::Null) | None => Err(Error::Format(format!(
                "{} has no property {}",
                self.path.class_name(),
                name
            ))),
            Some(value) => Ok(value),
        }
    }

    pub fn str_property(&self, name: &str) -> Result<&str> {
        self.property(name)?
            .as_str()
            .ok_or_else(|| self.mismatch(name, "a string"))
    }

    pub fn int_property(&self, name: &str) -> Result<i64> {
        self.property(name)?
            .as_i64()
            .ok_or_else(|| self.mismatch(name, "an integer"))
    }

    pub fn f64_property(&self, name: &str) -> Result<f64> {
        self.property(name)?
            .as_f64()
            .ok_or_else(|| self.mismatch(name, "a number"))
    }

    /// Optional string property; absent and null both map to `None`
    pub fn opt_str_property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(CimValue::as_str)
    }

    fn mismatch(&self, name: &str, expected: &str) -> Error {
        Error::Format(format!(
            "{}.{} is not {}",
            self.path.class_name(),
            name,
            expected
        ))
    }
}

// =============================================================================
// Method Invocation
// =============================================================================

/// A named method parameter, in or out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamValue {
    pub name: String,
    pub value: CimValue,
}

impl ParamValue {
    pub fn new(name: impl Into<String>, value: impl Into<CimValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Result of InvokeMethod
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeOutput {
    /// `0` means completed synchronously; nonzero means a job was started
    pub return_code: u32,
    pub out_params: Vec<ParamValue>,
}

impl InvokeOutput {
    pub fn param(&self, name: &str) -> Option<&CimValue> {
        self.out_params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }

    pub fn reference(&self, name: &str) -> Option<&ObjectPath> {
        self.param(name).and_then(CimValue::as_reference)
    }

    /// Every reference-valued out parameter, in order
    pub fn references(&self) -> impl Iterator<Item = &ObjectPath> {
        self.out_params.iter().filter_map(|p| p.value.as_reference())
    }
}

// =============================================================================
// Association Queries
// =============================================================================

/// Filters for an AssociatorNames traversal; `None` means unrestricted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationQuery {
    pub assoc_class: Option<String>,
    pub result_class: Option<String>,
    pub role: Option<String>,
    pub result_role: Option<String>,
}

impl AssociationQuery {
    /// Traverse any association, keeping only results of `class_name`
    pub fn result(class_name: impl Into<String>) -> Self {
        Self {
            result_class: Some(class_name.into()),
            ..Default::default()
        }
    }

    pub fn via(mut self, assoc_class: impl Into<String>) -> Self {
        self.assoc_class = Some(assoc_class.into());
        self
    }

    pub fn roles(mut self, role: impl Into<String>, result_role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self.result_role = Some(result_role.into());
        self
    }
}

// =============================================================================
// WBEM Client Port
// =============================================================================

/// Port for the WBEM object-graph collaborator
///
/// Implementations own the wire protocol (CIM-XML over HTTP, the ECOM REST
/// variant, or an in-memory graph). None of these calls retry.
#[async_trait]
pub trait WbemClient: Send + Sync {
    /// EnumerateInstanceNames: all instances of a class, unfiltered
    async fn enumerate_instance_names(&self, class_name: &str) -> Result<Vec<ObjectPath>>;

    /// AssociatorNames: objects related to `from` through an association
    async fn associator_names(
        &self,
        from: &ObjectPath,
        query: &AssociationQuery,
    ) -> Result<Vec<ObjectPath>>;

    /// GetInstance: full property bag of one object
    async fn get_instance(&self, path: &ObjectPath) -> Result<Instance>;

    /// InvokeMethod: call an extrinsic method on `target`
    async fn invoke_method(
        &self,
        target: &ObjectPath,
        method: &str,
        params: Vec<ParamValue>,
    ) -> Result<InvokeOutput>;

    /// Human-readable endpoint for logging
    fn endpoint(&self) -> &str;
}

pub type WbemClientRef = Arc<dyn WbemClient>;
