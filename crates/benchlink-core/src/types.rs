/*!
 * Core data types for BenchLink.
 *
 * This module defines the resource identifier, the identifying tuple
 * used to match drivers to instruments, and the property value type
 * carried by resource snapshots.
 */
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A process-lifetime-stable identifier for a discovered instrument.
///
/// Allocated by the registry when an adapter first reports a native
/// resource id; independent of the transport that owns the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Allocate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ResourceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for ResourceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The identifying tuple reported by an adapter for one native
/// resource id.
///
/// Two tuples are the same device only if every field matches; a
/// native id reappearing with a different tuple is a new device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Instrument vendor
    pub vendor: String,
    /// Instrument model
    pub model: String,
    /// Serial number, when the transport can report one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    /// Firmware revision, when the transport can report one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}

impl Identity {
    /// Create an identity from vendor and model
    pub fn new<V: Into<String>, M: Into<String>>(vendor: V, model: M) -> Self {
        Self {
            vendor: vendor.into(),
            model: model.into(),
            serial: None,
            firmware: None,
        }
    }

    /// Set the serial number
    pub fn with_serial<S: Into<String>>(mut self, serial: S) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Set the firmware revision
    pub fn with_firmware<S: Into<String>>(mut self, firmware: S) -> Self {
        self.firmware = Some(firmware.into());
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.vendor, self.model)?;
        if let Some(serial) = &self.serial {
            write!(f, " sn={}", serial)?;
        }
        if let Some(firmware) = &self.firmware {
            write!(f, " fw={}", firmware)?;
        }
        Ok(())
    }
}

/// A property value carried by resource snapshots and RPC payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Array of values
    Array(Vec<Value>),
    /// Map of string keys to values
    Object(HashMap<String, Value>),
    /// Timestamp
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get a boolean value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if *f == (*f as i64) as f64 => Some(*f as i64),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get an array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Try to get an object value
    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Try to get a timestamp value
    pub fn as_timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(o: HashMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

/// A flattened set of resource or driver properties
pub type PropertyMap = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_roundtrip() {
        let id = ResourceId::new();
        let parsed: ResourceId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_resource_ids_are_unique() {
        let a = ResourceId::new();
        let b = ResourceId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_equality() {
        let a = Identity::new("VendorX", "Model1").with_serial("123");
        let b = Identity::new("VendorX", "Model1").with_serial("123");
        let c = Identity::new("VendorX", "Model1").with_serial("456");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // serial present vs absent is a different device
        let d = Identity::new("VendorX", "Model1");
        assert_ne!(a, d);
    }

    #[test]
    fn test_identity_display() {
        let id = Identity::new("VendorX", "Model1")
            .with_serial("S42")
            .with_firmware("1.0.3");
        assert_eq!(format!("{}", id), "VendorX Model1 sn=S42 fw=1.0.3");
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = true.into();
        assert_eq!(v.as_bool(), Some(true));

        let v: Value = 42i64.into();
        assert_eq!(v.as_integer(), Some(42));
        assert_eq!(v.as_float(), Some(42.0));

        let v: Value = 3.14f64.into();
        assert_eq!(v.as_float(), Some(3.14));
        assert_eq!(v.as_integer(), None);

        let v: Value = "hello".into();
        assert_eq!(v.as_str(), Some("hello"));

        let now = Utc::now();
        let v: Value = now.into();
        assert_eq!(v.as_timestamp().unwrap(), &now);
    }

    #[test]
    fn test_value_object_access() {
        let mut map = HashMap::new();
        map.insert("state".to_string(), Value::String("ready".to_string()));
        let v: Value = map.clone().into();
        assert_eq!(v.as_object().unwrap(), &map);
        assert!(Value::Null.is_null());
    }
}
