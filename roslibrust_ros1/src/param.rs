//! The parameter tree: the value type used both as xmlrpc call arguments and
//! as the deliverable payload of `paramUpdate` callbacks.
//!
//! `Struct` is an ordered `Vec<(String, XmlrpcParam)>` so that this crate's
//! own in-memory values (e.g. a `paramUpdate` callback payload, which never
//! passes through `serde_xmlrpc::Value`) keep insertion order. Once a value
//! crosses into `serde_xmlrpc::Value::Struct` — a `BTreeMap<String, Value>`
//! in the external codec this crate treats as out of scope — field order is
//! necessarily re-sorted by key; see the `TryFrom` impl below.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// A single value in the ROS parameter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlrpcParam {
    Int(i32),
    Double(f64),
    Bool(bool),
    String(String),
    /// xmlrpc `dateTime.iso8601`, carried as `serde_xmlrpc` itself represents
    /// it: a naive (no-offset) timestamp.
    DateTime(chrono::NaiveDateTime),
    Binary(Vec<u8>),
    Array(Vec<XmlrpcParam>),
    Struct(Vec<(String, XmlrpcParam)>),
}

impl XmlrpcParam {
    /// Mirrors `cRosApiParseResponse`'s `checkResponseValue`: a status code in
    /// a `[code, message, value]` triple may be a bare int, or (per some
    /// master implementations) a one-element array containing an int.
    pub fn as_status_code(&self) -> Option<i32> {
        match self {
            XmlrpcParam::Int(i) => Some(*i),
            XmlrpcParam::Array(items) => match items.first() {
                Some(XmlrpcParam::Int(i)) => Some(*i),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            XmlrpcParam::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[XmlrpcParam]> {
        match self {
            XmlrpcParam::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            XmlrpcParam::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<serde_xmlrpc::Value> for XmlrpcParam {
    fn from(value: serde_xmlrpc::Value) -> Self {
        match value {
            serde_xmlrpc::Value::Int(i) => XmlrpcParam::Int(i),
            serde_xmlrpc::Value::Bool(b) => XmlrpcParam::Bool(b),
            serde_xmlrpc::Value::String(s) => XmlrpcParam::String(s),
            serde_xmlrpc::Value::Double(d) => XmlrpcParam::Double(d),
            serde_xmlrpc::Value::DateTime(dt) => XmlrpcParam::DateTime(dt),
            serde_xmlrpc::Value::Base64(b) => XmlrpcParam::Binary(b),
            serde_xmlrpc::Value::Struct(s) => XmlrpcParam::Struct(
                s.into_iter()
                    .map(|(k, v)| (k, XmlrpcParam::from(v)))
                    .collect(),
            ),
            serde_xmlrpc::Value::Array(a) => {
                XmlrpcParam::Array(a.into_iter().map(XmlrpcParam::from).collect())
            }
        }
    }
}

impl TryFrom<XmlrpcParam> for serde_xmlrpc::Value {
    type Error = Error;

    fn try_from(value: XmlrpcParam) -> Result<Self> {
        Ok(match value {
            XmlrpcParam::Int(i) => serde_xmlrpc::Value::Int(i),
            XmlrpcParam::Double(d) => serde_xmlrpc::Value::Double(d),
            XmlrpcParam::Bool(b) => serde_xmlrpc::Value::Bool(b),
            XmlrpcParam::String(s) => serde_xmlrpc::Value::String(s),
            XmlrpcParam::DateTime(dt) => serde_xmlrpc::Value::DateTime(dt),
            XmlrpcParam::Binary(b) => serde_xmlrpc::Value::Base64(b),
            XmlrpcParam::Array(items) => serde_xmlrpc::Value::Array(
                items
                    .into_iter()
                    .map(serde_xmlrpc::Value::try_from)
                    .collect::<Result<Vec<_>>>()?,
            ),
            XmlrpcParam::Struct(fields) => {
                // serde_xmlrpc::Value::Struct is a BTreeMap; this reorders
                // fields by key. XmlrpcParam::Struct itself stays
                // insertion-ordered for values that never cross this
                // boundary (e.g. a local paramUpdate dispatch).
                let mut map = BTreeMap::new();
                for (k, v) in fields {
                    map.insert(k, serde_xmlrpc::Value::try_from(v)?);
                }
                serde_xmlrpc::Value::Struct(map)
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_code_accepts_bare_int() {
        assert_eq!(XmlrpcParam::Int(1).as_status_code(), Some(1));
    }

    #[test]
    fn status_code_accepts_single_element_array() {
        let p = XmlrpcParam::Array(vec![XmlrpcParam::Int(1)]);
        assert_eq!(p.as_status_code(), Some(1));
    }

    #[test]
    fn struct_round_trips_through_xmlrpc_value_when_already_key_ordered() {
        // serde_xmlrpc::Value::Struct is a BTreeMap, so a round trip through
        // it always comes back key-sorted. Picking fields already in key
        // order lets this assert full equality honestly, rather than only
        // checking the field count and hiding the reordering.
        let tree = XmlrpcParam::Struct(vec![
            ("x".to_string(), XmlrpcParam::Int(3)),
            ("y".to_string(), XmlrpcParam::String("ciao".to_string())),
        ]);
        let value: serde_xmlrpc::Value = tree.clone().try_into().unwrap();
        let back: XmlrpcParam = value.into();
        assert_eq!(back, tree);
    }

    #[test]
    fn struct_round_trip_through_xmlrpc_value_reorders_by_key() {
        let tree = XmlrpcParam::Struct(vec![
            ("y".to_string(), XmlrpcParam::String("ciao".to_string())),
            ("x".to_string(), XmlrpcParam::Int(3)),
        ]);
        let value: serde_xmlrpc::Value = tree.try_into().unwrap();
        let back: XmlrpcParam = value.into();
        assert_eq!(
            back,
            XmlrpcParam::Struct(vec![
                ("x".to_string(), XmlrpcParam::Int(3)),
                ("y".to_string(), XmlrpcParam::String("ciao".to_string())),
            ])
        );
    }

    #[test]
    fn date_time_round_trips_through_xmlrpc_value() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap();
        let tree = XmlrpcParam::DateTime(dt);
        let value: serde_xmlrpc::Value = tree.clone().try_into().unwrap();
        let back: XmlrpcParam = value.into();
        assert_eq!(back, tree);
    }

    #[test]
    fn array_round_trips_through_xmlrpc_value() {
        let tree = XmlrpcParam::Array(vec![
            XmlrpcParam::Int(1),
            XmlrpcParam::Int(2),
            XmlrpcParam::Int(3),
        ]);
        let value: serde_xmlrpc::Value = tree.clone().try_into().unwrap();
        let back: XmlrpcParam = value.into();
        assert_eq!(back, tree);
    }
}
