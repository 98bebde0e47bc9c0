//! The publisher side of the peer transport (spec §4.5): a TCP listener
//! that accepts one connection per subscriber, performs the TCPROS header
//! handshake, and streams serialized messages to every connected peer.
//!
//! Adapted from the teacher's `roslibrust/src/ros1/publisher.rs`
//! (`tcp_accept_task`/`publish_task` split, `abort-on-drop` task handles);
//! generalized onto this crate's own [`ConnectionHeader`]/[`NodeServerHandle`]
//! instead of the old in-crate equivalents.

use crate::names::Name;
use crate::node::actor::NodeServerHandle;
use crate::tcpros::{self, ConnectionHeader};
use abort_on_drop::ChildTask;
use roslibrust_common::RosMessageType;
use std::marker::PhantomData;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};

/// A typed handle returned by [`crate::node::client::NodeHandle::advertise`].
pub struct Publisher<T> {
    topic_name: String,
    sender: mpsc::Sender<Vec<u8>>,
    _phantom: PhantomData<T>,
}

impl<T: RosMessageType> Publisher<T> {
    pub(crate) fn new(topic_name: &str, sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            sender,
            _phantom: PhantomData,
        }
    }

    /// Queues `msg` to be sent to every connected subscriber. Returns once
    /// the message is queued, not once it is on the wire (spec §4.5:
    /// "there is no application-level acknowledgement").
    pub async fn publish(&self, msg: &T) -> crate::error::Result<()> {
        let bytes = roslibrust_serde_rosmsg::to_vec(msg)?;
        self.sender
            .send(bytes)
            .await
            .map_err(|_| crate::error::Error::Disconnected(self.topic_name.clone()))
    }
}

impl<T: RosMessageType> roslibrust_common::TopicPublisher<T> for Publisher<T> {
    async fn publish(&self, msg: &T) -> roslibrust_common::Result<()> {
        Publisher::publish(self, msg)
            .await
            .map_err(Into::into)
    }
}

/// A publisher that accepts already-serialized message bytes, for use when
/// the message type isn't known at compile time (e.g. bag playback).
pub struct PublisherAny {
    topic_name: String,
    sender: mpsc::Sender<Vec<u8>>,
}

impl PublisherAny {
    pub(crate) fn new(topic_name: &str, sender: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            sender,
        }
    }

    /// `data` must be the raw serialized message body, without the outer
    /// TCPROS frame length (this module adds that).
    pub async fn publish(&self, data: Vec<u8>) -> crate::error::Result<()> {
        self.sender
            .send(data)
            .await
            .map_err(|_| crate::error::Error::Disconnected(self.topic_name.clone()))
    }
}

/// Owns the publisher-side TCP listener and fan-out task for one topic.
/// Dropping the last [`Publisher`]/[`PublisherAny`] sender drains the
/// publish task and triggers `unregisterPublisher` (spec: "The
/// publisher-side simply frees its server slot for reuse").
pub(crate) struct Publication {
    port: u16,
    _accept_task: ChildTask<()>,
    _publish_task: ChildTask<()>,
}

impl Publication {
    pub(crate) async fn new(
        caller_id: &Name,
        topic_name: &str,
        topic_type: &str,
        md5sum: &str,
        message_definition: &str,
        latching: bool,
        queue_size: usize,
        bind_ip: IpAddr,
        node_handle: NodeServerHandle,
    ) -> std::io::Result<(Self, mpsc::Sender<Vec<u8>>)> {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from((bind_ip, 0))).await?;
        let port = listener.local_addr()?.port();

        let (sender, receiver) = mpsc::channel::<Vec<u8>>(queue_size.max(1));

        let response_header = ConnectionHeader {
            caller_id: caller_id.to_string(),
            topic: Some(topic_name.to_string()),
            topic_type: topic_type.to_string(),
            md5sum: Some(md5sum.to_string()),
            message_definition: Some(message_definition.to_string()),
            latching,
            tcp_nodelay: false,
            ..Default::default()
        };

        let streams = Arc::new(RwLock::new(Vec::<TcpStream>::new()));
        let last_message = Arc::new(RwLock::new(None::<Vec<u8>>));

        let accept_task = {
            let streams = streams.clone();
            let last_message = last_message.clone();
            let topic_name = topic_name.to_string();
            let node_handle = node_handle.clone();
            let response_header = response_header.clone();
            tokio::spawn(async move {
                Self::accept_task(
                    listener,
                    streams,
                    last_message,
                    topic_name,
                    response_header,
                    node_handle,
                )
                .await
            })
        };

        let publish_task = {
            let topic_name = topic_name.to_string();
            tokio::spawn(async move {
                Self::publish_task(receiver, streams, last_message, node_handle, topic_name).await
            })
        };

        let sender_clone = sender.clone();
        Ok((
            Self {
                port,
                _accept_task: accept_task.into(),
                _publish_task: publish_task.into(),
            },
            sender_clone,
        ))
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    async fn publish_task(
        mut receiver: mpsc::Receiver<Vec<u8>>,
        streams: Arc<RwLock<Vec<TcpStream>>>,
        last_message: Arc<RwLock<Option<Vec<u8>>>>,
        node_handle: NodeServerHandle,
        topic: String,
    ) {
        log::debug!("publish task started for {topic}");
        while let Some(msg) = receiver.recv().await {
            let framed = match tcpros::frame(&msg) {
                Ok(f) => f,
                Err(e) => {
                    log::error!("failed to frame outgoing message on {topic}: {e}");
                    continue;
                }
            };
            let mut guard = streams.write().await;
            let mut dead = Vec::new();
            for (idx, stream) in guard.iter_mut().enumerate() {
                if let Err(e) = stream.write_all(&framed).await {
                    log::debug!("subscriber stream on {topic} failed ({e}), dropping");
                    dead.push(idx);
                }
            }
            for (removed, idx) in dead.into_iter().enumerate() {
                guard.remove(idx - removed);
            }
            *last_message.write().await = Some(framed);
        }
        log::debug!("publish task exiting for {topic}; unregistering");
        let _ = node_handle.unregister_publisher(&topic).await;
    }

    async fn accept_task(
        listener: tokio::net::TcpListener,
        streams: Arc<RwLock<Vec<TcpStream>>>,
        last_message: Arc<RwLock<Option<Vec<u8>>>>,
        topic_name: String,
        response_header: ConnectionHeader,
        node_handle: NodeServerHandle,
    ) {
        log::debug!("tcp accept task started for {topic_name}");
        loop {
            let (mut stream, peer_addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    log::warn!("accept failed on publication for {topic_name}: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            };
            let request_header = match tcpros::receive_header(&mut stream).await {
                Ok(h) => h,
                Err(e) => {
                    log::warn!("malformed subscriber handshake on {topic_name}: {e}");
                    let _ = stream.shutdown().await;
                    continue;
                }
            };
            if let Some(md5) = &request_header.md5sum {
                let local_md5 = response_header.md5sum.as_deref().unwrap_or("");
                if md5 != "*" && local_md5 != "*" && md5 != local_md5 {
                    log::warn!(
                        "md5sum mismatch on {topic_name}: local {local_md5}, peer {md5}"
                    );
                    let error_header = ConnectionHeader {
                        error: Some(format!(
                            "md5sums do not match: expected {local_md5}, got {md5}"
                        )),
                        ..Default::default()
                    };
                    if let Ok(bytes) = error_header.to_bytes() {
                        let _ = stream.write_all(&bytes).await;
                    }
                    let _ = stream.shutdown().await;
                    continue;
                }
            }
            let bytes = match response_header.to_bytes() {
                Ok(b) => b,
                Err(e) => {
                    log::error!("failed to encode response header for {topic_name}: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.write_all(&bytes).await {
                log::debug!("failed to write response header to {peer_addr}: {e}");
                continue;
            }
            if response_header.latching {
                if let Some(last) = last_message.read().await.as_ref() {
                    let _ = stream.write_all(last).await;
                }
            }
            node_handle
                .note_subscriber_connected(topic_name.clone(), peer_addr.to_string())
                .await;
            streams.write().await.push(stream);
            log::info!("subscriber {peer_addr} connected to {topic_name}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::actor::NodeServer;
    use tokio::io::AsyncReadExt;

    fn test_caller_id() -> Name {
        Name::new("/test_publisher").unwrap()
    }

    #[tokio::test]
    async fn rejects_subscriber_with_mismatched_md5sum() {
        let node = NodeServer::spawn("http://localhost:1", "/test_publisher", "http://localhost:0/");
        let (publication, _sender) = Publication::new(
            &test_caller_id(),
            "/chatter",
            "std_msgs/String",
            "992ce8a1687cec8c8bd883ec73ca41d1",
            "string data",
            false,
            1,
            std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            node.clone(),
        )
        .await
        .unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", publication.port()))
            .await
            .unwrap();
        let request = ConnectionHeader {
            caller_id: "/listener".to_string(),
            topic: Some("/chatter".to_string()),
            topic_type: "std_msgs/String".to_string(),
            md5sum: Some("deadbeef".to_string()),
            ..Default::default()
        };
        tcpros::send_header(&mut stream, &request).await.unwrap();
        let response = tcpros::receive_header(&mut stream).await.unwrap();
        assert!(response.error.unwrap().contains("md5sums do not match"));

        node.shutdown("test complete").await;
    }

    #[tokio::test]
    async fn accepts_matching_subscriber_and_streams_published_bytes() {
        let node = NodeServer::spawn("http://localhost:1", "/test_publisher", "http://localhost:0/");
        let (publication, sender) = Publication::new(
            &test_caller_id(),
            "/chatter",
            "std_msgs/String",
            "992ce8a1687cec8c8bd883ec73ca41d1",
            "string data",
            false,
            1,
            std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            node.clone(),
        )
        .await
        .unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", publication.port()))
            .await
            .unwrap();
        let request = ConnectionHeader {
            caller_id: "/listener".to_string(),
            topic: Some("/chatter".to_string()),
            topic_type: "std_msgs/String".to_string(),
            md5sum: Some("992ce8a1687cec8c8bd883ec73ca41d1".to_string()),
            ..Default::default()
        };
        tcpros::send_header(&mut stream, &request).await.unwrap();
        let response = tcpros::receive_header(&mut stream).await.unwrap();
        assert!(response.error.is_none());
        assert_eq!(response.md5sum.as_deref(), Some("992ce8a1687cec8c8bd883ec73ca41d1"));

        sender.send(b"hello".to_vec()).await.unwrap();
        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await.unwrap();
        assert_eq!(u32::from_le_bytes(len_buf), 5);
        let mut body = [0u8; 5];
        stream.read_exact(&mut body).await.unwrap();
        assert_eq!(&body, b"hello");

        node.shutdown("test complete").await;
    }
}
