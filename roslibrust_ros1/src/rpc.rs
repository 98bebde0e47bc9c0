//! The single seam where this crate's XML-RPC calls cross into the external
//! text codec (`serde_xmlrpc`, out of scope per the runtime spec) and onto
//! the wire (`reqwest`, an ordinary single-shot HTTP/1.0-ish POST).
//!
//! Shared by the master client fleet (calls to roscore) and by individual
//! peer calls (`requestTopic` issued directly against another node's
//! xmlrpc server).

use crate::error::{Error, Result};
use crate::param::XmlrpcParam;
use crate::xmlrpc::ApiMethod;

/// Issues a single XML-RPC call to `url` and returns the parsed response
/// value (the third element of the `[code, message, value]` triple).
///
/// `code != 1` is treated as [`Error::ServerFault`], matching the
/// `checkResponseValue` convention of the original node: a status may be a
/// bare int or a one-element array containing one.
pub async fn call(
    client: &reqwest::Client,
    url: &str,
    method: ApiMethod,
    params: Vec<XmlrpcParam>,
) -> Result<XmlrpcParam> {
    let values = params
        .into_iter()
        .map(serde_xmlrpc::Value::try_from)
        .collect::<Result<Vec<_>>>()?;
    let body = serde_xmlrpc::request_to_string(method.name(), values)?;

    let response = client
        .post(url)
        .header("Content-Type", "text/xml")
        .body(body)
        .send()
        .await?;
    let text = response.text().await?;
    // `response_from_str` deserializes the `[code, message, value]` triple
    // directly into a tuple rather than handing back a raw `Value` array.
    // The status slot is deserialized as `Value` rather than a bare `i32` so
    // the bare-int-or-single-element-array convention (`checkResponseValue`)
    // still applies on masters that send the latter.
    let (code, message, value) = serde_xmlrpc::response_from_str::<(
        serde_xmlrpc::Value,
        String,
        serde_xmlrpc::Value,
    )>(&text)?;
    match XmlrpcParam::from(code).as_status_code() {
        Some(1) => Ok(XmlrpcParam::from(value)),
        _ => Err(Error::ServerFault(format!(
            "{} on {url} failed: {message}",
            method.name(),
        ))),
    }
}

/// The `[code, message, value]` response triple a slave-API handler sends
/// back, in the shape `serde_xmlrpc::response_to_string` expects.
pub type ResponseTriple = (i32, String, XmlrpcParam);

/// A success (`code == 1`) response triple with an empty status message.
pub fn ok_triple(value: XmlrpcParam) -> ResponseTriple {
    (1, String::new(), value)
}

/// A failure response triple (`code == -1`, matching rospy/roscpp's
/// convention for slave-API faults), carrying the fault message and an
/// unused placeholder value.
pub fn fault(message: &str) -> ResponseTriple {
    (-1, message.to_string(), XmlrpcParam::Int(0))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ok_triple_carries_success_code() {
        let (code, message, value) = ok_triple(XmlrpcParam::Int(42));
        assert_eq!(code, 1);
        assert!(message.is_empty());
        assert_eq!(value, XmlrpcParam::Int(42));
    }

    #[test]
    fn fault_carries_failure_code_and_message() {
        let (code, message, _) = fault("topic not found");
        assert_eq!(code, -1);
        assert_eq!(message, "topic not found");
    }
}
