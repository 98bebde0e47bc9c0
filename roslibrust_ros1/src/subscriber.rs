//! The subscriber side of the peer transport (spec §4.5): resolves a
//! topic's publishers through `requestTopic`, performs the TCPROS client
//! handshake, and pumps incoming frames into an `mpsc` channel that
//! [`Subscriber::next`] drains.
//!
//! Mirrors `publisher.rs`'s task split but drives the opposite direction of
//! the same header/frame protocol in `tcpros.rs`. Reconnection (spec §4.5
//! "Reconnection... driver will re-resolve on the next publisherUpdate") is
//! implemented by watching the actor's `watch::Receiver<Vec<String>>` for
//! the topic: a changed value (even one that repeats the same URIs, since
//! `watch::Sender::send` always marks the channel changed) wakes the
//! connect loop back up.

use crate::names::Name;
use crate::node::actor::NodeServerHandle;
use crate::slave_server;
use crate::tcpros::{self, ConnectionHeader};
use abort_on_drop::ChildTask;
use roslibrust_common::RosMessageType;
use std::marker::PhantomData;
use tokio::sync::{mpsc, watch};

/// A typed handle returned by [`crate::node::client::NodeHandle::subscribe`].
pub struct Subscriber<T> {
    receiver: mpsc::Receiver<Vec<u8>>,
    _phantom: PhantomData<T>,
}

impl<T: RosMessageType> Subscriber<T> {
    pub(crate) fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            receiver,
            _phantom: PhantomData,
        }
    }

    /// Waits for and deserializes the next message (spec §4.5 "Message
    /// phase"). Returns [`crate::error::Error::Disconnected`] once the
    /// subscription has been torn down and no more messages will arrive.
    pub async fn next(&mut self) -> crate::error::Result<T> {
        let bytes = self
            .receiver
            .recv()
            .await
            .ok_or(crate::error::Error::Disconnected("subscription closed".into()))?;
        Ok(roslibrust_serde_rosmsg::from_slice(&bytes)?)
    }
}

impl<T: RosMessageType> roslibrust_common::TopicSubscriber<T> for Subscriber<T> {
    async fn next(&mut self) -> roslibrust_common::Result<T> {
        Subscriber::next(self).await.map_err(Into::into)
    }
}

/// An untyped subscriber yielding raw deserialized message bytes.
pub struct SubscriberAny {
    receiver: mpsc::Receiver<Vec<u8>>,
}

impl SubscriberAny {
    pub(crate) fn new(receiver: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { receiver }
    }

    pub async fn next(&mut self) -> crate::error::Result<Vec<u8>> {
        self.receiver
            .recv()
            .await
            .ok_or(crate::error::Error::Disconnected("subscription closed".into()))
    }
}

/// Owns the connect/reconnect task for one subscribed topic.
pub(crate) struct Subscription {
    _task: ChildTask<()>,
}

impl Subscription {
    pub(crate) fn new(
        caller_id: Name,
        topic_name: String,
        topic_type: String,
        md5sum: String,
        tcp_nodelay: bool,
        publishers: watch::Receiver<Vec<String>>,
        node_handle: NodeServerHandle,
        sender: mpsc::Sender<Vec<u8>>,
    ) -> Self {
        let task = tokio::spawn(Self::run(
            caller_id,
            topic_name,
            topic_type,
            md5sum,
            tcp_nodelay,
            publishers,
            node_handle,
            sender,
        ));
        Self { _task: task.into() }
    }

    /// Tracks the publisher list for this topic and keeps exactly one live
    /// connection to the first reachable publisher. Real ROS nodes connect
    /// to every publisher of a topic; this node follows the same "first
    /// available" simplification the teacher's publisher-fanout model
    /// mirrors on the other side of the wire (one stream per peer, no
    /// cross-peer merge logic needed beyond what `mpsc` already gives us).
    async fn run(
        caller_id: Name,
        topic_name: String,
        topic_type: String,
        md5sum: String,
        tcp_nodelay: bool,
        mut publishers: watch::Receiver<Vec<String>>,
        node_handle: NodeServerHandle,
        sender: mpsc::Sender<Vec<u8>>,
    ) {
        let client = reqwest::Client::new();
        loop {
            let candidates = publishers.borrow_and_update().clone();
            let mut connected = false;
            for peer_uri in &candidates {
                if sender.is_closed() {
                    return;
                }
                match Self::connect_and_pump(
                    &client,
                    &caller_id,
                    &topic_name,
                    &topic_type,
                    &md5sum,
                    tcp_nodelay,
                    peer_uri,
                    &sender,
                )
                .await
                {
                    Ok(()) => {
                        connected = true;
                        node_handle
                            .note_publisher_disconnected(topic_name.clone())
                            .await;
                        break;
                    }
                    Err(e) => {
                        log::warn!(
                            "failed to connect to publisher {peer_uri} for {topic_name}: {e}"
                        );
                    }
                }
            }
            if sender.is_closed() {
                return;
            }
            if !connected {
                // No publisher reachable right now; wait for the next
                // publisherUpdate before retrying.
                tokio::select! {
                    changed = publishers.changed() => if changed.is_err() { return; },
                    _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {},
                }
            } else if publishers.changed().await.is_err() {
                return;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn connect_and_pump(
        client: &reqwest::Client,
        caller_id: &Name,
        topic_name: &str,
        topic_type: &str,
        md5sum: &str,
        tcp_nodelay: bool,
        peer_xmlrpc_uri: &str,
        sender: &mpsc::Sender<Vec<u8>>,
    ) -> crate::error::Result<()> {
        let (host, port) = slave_server::request_topic_from_peer(
            client,
            caller_id.as_str(),
            peer_xmlrpc_uri,
            topic_name,
        )
        .await?;

        let mut stream = tokio::net::TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(tcp_nodelay).ok();

        let request_header = ConnectionHeader {
            caller_id: caller_id.to_string(),
            topic: Some(topic_name.to_string()),
            topic_type: topic_type.to_string(),
            md5sum: Some(md5sum.to_string()),
            tcp_nodelay,
            ..Default::default()
        };
        tcpros::send_header(&mut stream, &request_header).await?;
        let response_header = tcpros::receive_header(&mut stream).await?;
        if let Some(error) = response_header.error {
            return Err(crate::error::Error::Protocol(format!(
                "publisher rejected connection: {error}"
            )));
        }
        let peer_md5 = response_header.md5sum.as_deref().unwrap_or("");
        if md5sum != "*" && peer_md5 != "*" && peer_md5 != md5sum {
            return Err(crate::error::Error::Protocol(format!(
                "md5sum mismatch on {topic_name}: expected {md5sum}, got {peer_md5}"
            )));
        }

        log::info!("subscriber for {topic_name} connected to {peer_xmlrpc_uri}");
        loop {
            let frame = tcpros::read_frame(&mut stream).await?;
            if sender.send(frame).await.is_err() {
                return Ok(());
            }
        }
    }
}
