//! The XML-RPC server (spec §4.3): a bounded-effort hyper service that
//! accepts inbound slave-API calls from peers and from the master, and
//! dispatches them by method name.
//!
//! One process serves every inbound connection (spec §2 "one per inbound
//! connection, bounded pool" is satisfied here by hyper's own connection
//! pool rather than a hand-rolled slot array).

use crate::error::Result;
use crate::net::resolve_host;
use crate::node::actor::NodeServerHandle;
use crate::param::XmlrpcParam;
use crate::rpc;
use crate::xmlrpc::ApiMethod;
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Binds an ephemeral TCP listener on `bind_ip`, without yet starting the
/// hyper server (the caller needs the bound port to build the node's
/// `xmlrpc_uri` before the [`NodeServerHandle`] used by [`serve`] exists).
pub(crate) fn bind(bind_ip: std::net::IpAddr) -> std::io::Result<std::net::TcpListener> {
    let listener = std::net::TcpListener::bind(SocketAddr::from((bind_ip, 0)))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Spawns the hyper server task on an already-bound `listener`. Returns the
/// bound port and a join handle the caller should abort on node shutdown.
pub(crate) fn serve(
    listener: std::net::TcpListener,
    handle: NodeServerHandle,
) -> std::io::Result<(u16, tokio::task::JoinHandle<()>)> {
    let port = listener.local_addr()?.port();

    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let handle = handle.clone();
        let remote_addr = conn.remote_addr();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handle = handle.clone();
                async move { Ok::<_, Infallible>(handle_request(req, handle, remote_addr).await) }
            }))
        }
    });

    let server = Server::from_tcp(listener)
        .expect("tcp listener already bound for the xmlrpc slave server")
        .serve(make_svc);
    let task = tokio::spawn(async move {
        if let Err(e) = server.await {
            log::error!("xmlrpc slave server exited: {e}");
        }
    });
    Ok((port, task))
}

async fn handle_request(
    req: Request<Body>,
    handle: NodeServerHandle,
    remote_addr: SocketAddr,
) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(b) => b,
        Err(e) => return text_response(500, format!("failed to read request body: {e}")),
    };
    let text = match std::str::from_utf8(&body) {
        Ok(t) => t,
        Err(e) => return text_response(400, format!("request body was not utf8: {e}")),
    };
    let (method_name, params) =
        match serde_xmlrpc::request_from_str::<Vec<serde_xmlrpc::Value>>(text) {
            Ok(parsed) => parsed,
            Err(e) => return text_response(400, format!("malformed xmlrpc request: {e}")),
        };
    let params: Vec<XmlrpcParam> = params.into_iter().map(XmlrpcParam::from).collect();

    let (code, message, value) = dispatch(&method_name, params, &handle, remote_addr).await;
    let value = match serde_xmlrpc::Value::try_from(value) {
        Ok(v) => v,
        Err(e) => return text_response(500, format!("failed to encode xmlrpc response: {e}")),
    };
    match serde_xmlrpc::response_to_string((code, message, value)) {
        Ok(body) => Response::builder()
            .status(200)
            .header("Content-Type", "text/xml")
            .body(Body::from(body))
            .unwrap(),
        Err(e) => text_response(500, format!("failed to encode xmlrpc response: {e}")),
    }
}

fn text_response(status: u16, message: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(message))
        .unwrap()
}

/// Dispatches one parsed xmlrpc call to its slave-API handler, returning the
/// `[code, message, value]` response triple (spec §4.3).
async fn dispatch(
    method_name: &str,
    mut params: Vec<XmlrpcParam>,
    handle: &NodeServerHandle,
    remote_addr: SocketAddr,
) -> rpc::ResponseTriple {
    let Some(method) = ApiMethod::from_name(method_name) else {
        return rpc::fault(&format!("Unknown method {method_name}"));
    };
    if !method.is_slave_api() {
        return rpc::fault(&format!("{method_name} is not served by a node's slave API"));
    }
    match method {
        ApiMethod::GetPid => rpc::ok_triple(XmlrpcParam::Int(std::process::id() as i32)),
        ApiMethod::PublisherUpdate => handle_publisher_update(params, handle).await,
        ApiMethod::RequestTopic => handle_request_topic(params, handle, remote_addr).await,
        ApiMethod::GetSubscriptions => {
            let subs = handle.get_subscriptions().await;
            rpc::ok_triple(topic_list(subs))
        }
        ApiMethod::GetPublications => {
            let pubs = handle.get_publications().await;
            rpc::ok_triple(topic_list(pubs))
        }
        ApiMethod::GetMasterUri => rpc::ok_triple(XmlrpcParam::String(handle.get_master_uri().await)),
        ApiMethod::GetBusStats | ApiMethod::GetBusInfo => {
            rpc::ok_triple(XmlrpcParam::Array(Vec::new()))
        }
        ApiMethod::Shutdown => {
            let reason = params
                .pop()
                .and_then(|p| p.as_str().map(str::to_string))
                .unwrap_or_default();
            let handle = handle.clone();
            tokio::spawn(async move { handle.shutdown(&reason).await });
            rpc::ok_triple(XmlrpcParam::Int(0))
        }
        ApiMethod::ParamUpdate => {
            if params.len() < 2 {
                return rpc::fault("paramUpdate requires [caller_id, key, value]");
            }
            let value = params.pop().unwrap();
            let key = params
                .pop()
                .and_then(|p| p.as_str().map(str::to_string))
                .unwrap_or_default();
            handle.param_update(key, value).await;
            rpc::ok_triple(XmlrpcParam::Int(0))
        }
        _ => rpc::fault(&format!("{method_name} is a master-API method")),
    }
}

fn topic_list(entries: Vec<(String, String)>) -> XmlrpcParam {
    XmlrpcParam::Array(
        entries
            .into_iter()
            .map(|(name, ty)| {
                XmlrpcParam::Array(vec![XmlrpcParam::String(name), XmlrpcParam::String(ty)])
            })
            .collect(),
    )
}

/// spec §4.3 `publisherUpdate(caller, topic, publishers[])`: forwards the
/// new publisher list to the matching subscriber; resolved open question
/// (spec §9) means we always return a well-formed response, found or not.
async fn handle_publisher_update(
    mut params: Vec<XmlrpcParam>,
    handle: &NodeServerHandle,
) -> rpc::ResponseTriple {
    if params.len() < 3 {
        return rpc::fault("publisherUpdate requires [caller_id, topic, publishers[]]");
    }
    let publishers = params
        .pop()
        .and_then(|p| match p {
            XmlrpcParam::Array(items) => Some(
                items
                    .into_iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        })
        .unwrap_or_default();
    let topic = params
        .pop()
        .and_then(|p| p.as_str().map(str::to_string))
        .unwrap_or_default();
    let found = handle.publisher_update(topic.clone(), publishers).await;
    if found {
        rpc::ok_triple(XmlrpcParam::Int(0))
    } else {
        rpc::fault(&format!("Topic {topic} not available"))
    }
}

/// spec §4.3 `requestTopic(node, topic, protocols[])`: verifies `TCPROS` is
/// an acceptable protocol, invokes the publisher's configured
/// slave-notification callback (if any) with `remote_addr`, and replies
/// with our TCPROS host/port for it.
async fn handle_request_topic(
    mut params: Vec<XmlrpcParam>,
    handle: &NodeServerHandle,
    remote_addr: SocketAddr,
) -> rpc::ResponseTriple {
    if params.len() < 3 {
        return rpc::fault("requestTopic requires [caller_id, topic, protocols[]]");
    }
    let protocols = params.pop();
    let topic = params
        .pop()
        .and_then(|p| p.as_str().map(str::to_string))
        .unwrap_or_default();
    let supports_tcpros = protocols
        .and_then(|p| p.as_array().map(|items| items.to_vec()))
        .unwrap_or_default()
        .iter()
        .any(|entry| {
            entry
                .as_array()
                .map(|inner| inner.iter().any(|v| v.as_str() == Some("TCPROS")))
                .unwrap_or(false)
        });
    if !supports_tcpros {
        return rpc::fault("only TCPROS is supported");
    }
    match handle
        .request_topic(&topic, remote_addr.ip().to_string(), remote_addr.port())
        .await
    {
        Some((host, port)) => rpc::ok_triple(XmlrpcParam::Array(vec![
            XmlrpcParam::String("TCPROS".to_string()),
            XmlrpcParam::String(host),
            XmlrpcParam::Int(port as i32),
        ])),
        None => rpc::fault(&format!("Topic {topic} is not being published")),
    }
}

/// Issues `requestTopic` to a peer's xmlrpc server directly (spec §4.2
/// "peer calls"), used by the subscriber's connection-establishment path
/// once a publisher URI is known. Returns the peer's chosen TCPROS host and
/// port.
pub(crate) async fn request_topic_from_peer(
    client: &reqwest::Client,
    caller_id: &str,
    peer_xmlrpc_uri: &str,
    topic: &str,
) -> Result<(String, u16)> {
    let value = rpc::call(
        client,
        peer_xmlrpc_uri,
        ApiMethod::RequestTopic,
        vec![
            XmlrpcParam::String(caller_id.to_string()),
            XmlrpcParam::String(topic.to_string()),
            XmlrpcParam::Array(vec![XmlrpcParam::Array(vec![XmlrpcParam::String(
                "TCPROS".to_string(),
            )])]),
        ],
    )
    .await?;
    let items = value.as_array().unwrap_or(&[]);
    let host = items
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| crate::error::Error::Protocol("requestTopic response missing host".into()))?;
    let port = items
        .get(2)
        .and_then(|v| v.as_int())
        .ok_or_else(|| crate::error::Error::Protocol("requestTopic response missing port".into()))?;
    Ok((resolve_host(host).await?, port as u16))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn topic_list_builds_name_type_pairs() {
        let list = topic_list(vec![("/chatter".to_string(), "std_msgs/String".to_string())]);
        assert_eq!(
            list,
            XmlrpcParam::Array(vec![XmlrpcParam::Array(vec![
                XmlrpcParam::String("/chatter".to_string()),
                XmlrpcParam::String("std_msgs/String".to_string()),
            ])])
        );
    }
}
