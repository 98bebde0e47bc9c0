//! The node driver (spec §4.7): a single `tokio::task` that owns every
//! registry and is the sole mutator of node state, reached only through a
//! [`NodeServerHandle`]. This is the actor-based reading of spec §5's "no
//! lock is needed because there is exactly one mutator" — enforced here by
//! construction (one task, one `mpsc::Receiver<Command>`) rather than by
//! the original's single-threaded event loop.

use crate::error::{Error, Result};
use crate::master_client::MasterClient;
use crate::param::XmlrpcParam;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// The cadence at which the master slot is pinged with `getPid` when
/// otherwise idle (spec §4.6: "default 5s").
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// spec §7 "Capacity": registries are not literally fixed-size arrays here,
/// but a declared limit is still enforced and surfaced synchronously from
/// the register call that would exceed it.
const DEFAULT_MAX_REGISTRY_ENTRIES: usize = 4096;

/// A node status event (spec §6 "subscribe to node status events (state
/// changes and parameter updates)"). Broadcast to every `subscribe_events`
/// caller; lagging receivers simply miss old events rather than blocking
/// the actor (spec §5: callbacks must not block the driver thread).
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// The master's PID changed or a keep-alive ping failed; every
    /// registration is being re-sent (spec §4.6 `restartAdvertising`).
    MasterRestarted,
    /// A `paramUpdate` call matched a subscribed key (spec §4.4).
    ParamUpdate { key: String, value: XmlrpcParam },
    /// A peer connected to one of our publications.
    SubscriberConnected { topic: String, peer: String },
    /// A subscription's peer connection was lost; it will be re-resolved on
    /// the next `publisherUpdate` (spec §4.5 "Reconnection").
    PublisherDisconnected { topic: String },
}

/// spec §3 PublisherNode's "optional slave-notification callback": invoked
/// with a requesting subscriber's host and port when its `requestTopic`
/// call is dispatched (spec §4.3), not at TCP-accept time. Runs inline on
/// the actor task, so it must not block (spec §5).
pub type SlaveNotifyFn = std::sync::Arc<dyn Fn(&str, u16) + Send + Sync>;

#[derive(Clone)]
pub(crate) struct PublicationRecord {
    pub topic_type: String,
    pub host: String,
    pub port: u16,
    pub notify: Option<SlaveNotifyFn>,
}

#[derive(Clone)]
pub(crate) struct SubscriptionRecord {
    pub topic_type: String,
    /// xmlrpc URIs of publishers currently known for this topic, as last
    /// reported by `registerSubscriber`'s response or a `publisherUpdate`
    /// call. A `watch` channel so publisher.rs/subscriber.rs tasks can
    /// observe changes without round-tripping through the actor.
    pub publishers: watch::Sender<Vec<String>>,
}

#[derive(Debug, Clone)]
pub(crate) struct ServiceRecord {
    pub service_type: String,
    pub uri: String,
}

/// A pending operation delivered to the [`NodeServer`] actor.
pub(crate) enum Command {
    RegisterPublisher {
        topic: String,
        topic_type: String,
        host: String,
        port: u16,
        notify: Option<SlaveNotifyFn>,
        reply: oneshot::Sender<Result<()>>,
    },
    UnregisterPublisher {
        topic: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RegisterSubscriber {
        topic: String,
        topic_type: String,
        reply: oneshot::Sender<Result<watch::Receiver<Vec<String>>>>,
    },
    UnregisterSubscriber {
        topic: String,
        reply: oneshot::Sender<Result<()>>,
    },
    RegisterService {
        service: String,
        service_type: String,
        uri: String,
        reply: oneshot::Sender<Result<()>>,
    },
    UnregisterService {
        service: String,
        reply: oneshot::Sender<Result<()>>,
    },
    GetParam {
        key: String,
        reply: oneshot::Sender<Result<XmlrpcParam>>,
    },
    SetParam {
        key: String,
        value: XmlrpcParam,
        reply: oneshot::Sender<Result<()>>,
    },
    HasParam {
        key: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    DeleteParam {
        key: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SearchParam {
        key: String,
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    SubscribeParam {
        key: String,
        reply: oneshot::Sender<Result<watch::Receiver<XmlrpcParam>>>,
    },
    UnsubscribeParam {
        key: String,
        reply: oneshot::Sender<Result<()>>,
    },
    GetParamNames {
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    GetPublishedTopics {
        subgraph: String,
        reply: oneshot::Sender<Result<Vec<crate::master_client::TopicInfo>>>,
    },
    GetTopicTypes {
        reply: oneshot::Sender<Result<Vec<crate::master_client::TopicInfo>>>,
    },
    GetSystemState {
        reply: oneshot::Sender<Result<XmlrpcParam>>,
    },
    LookupNode {
        node_name: String,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Inbound `paramUpdate` from the master (spec §4.4): fan out to any
    /// locally-subscribed key whose prefix matches.
    ParamUpdate { key: String, value: XmlrpcParam },
    /// Inbound `publisherUpdate` from the master (spec §4.3). Replies
    /// whether `topic` matched a known subscriber, so the slave server can
    /// send the right response triple (spec §9: always emit the fault
    /// response rather than the original's null-pointer dereference).
    PublisherUpdate {
        topic: String,
        publishers: Vec<String>,
        reply: oneshot::Sender<bool>,
    },
    /// A subscriber's TCPROS connection was lost (spec §4.5 Reconnection).
    NotePublisherDisconnected { topic: String },
    /// A publisher's TCP server accepted a new subscriber connection.
    NoteSubscriberConnected { topic: String, peer: String },
    SubscribeEvents {
        reply: oneshot::Sender<broadcast::Receiver<NodeEvent>>,
    },
    /// Inbound `requestTopic` from a peer subscriber (spec §4.3).
    /// `caller_host`/`caller_port` are the xmlrpc connection's remote
    /// address, passed through so the matching publisher's slave-notification
    /// callback can be invoked with them.
    RequestTopic {
        topic: String,
        caller_host: String,
        caller_port: u16,
        reply: oneshot::Sender<Option<(String, u16)>>,
    },
    GetSubscriptions {
        reply: oneshot::Sender<Vec<(String, String)>>,
    },
    GetPublications {
        reply: oneshot::Sender<Vec<(String, String)>>,
    },
    GetMasterUri {
        reply: oneshot::Sender<String>,
    },
    Shutdown {
        reason: String,
        reply: oneshot::Sender<()>,
    },
}

/// A cheaply-cloned handle to a running [`NodeServer`] actor.
#[derive(Clone)]
pub struct NodeServerHandle {
    commands: mpsc::Sender<Command>,
    pub(crate) caller_id: String,
    pub(crate) xmlrpc_uri: String,
    pub(crate) master_uri: String,
}

impl NodeServerHandle {
    async fn send<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| Error::ShuttingDown)?;
        rx.await.map_err(|_| Error::ShuttingDown)
    }

    pub(crate) async fn register_publisher(
        &self,
        topic: &str,
        topic_type: &str,
        host: &str,
        port: u16,
        notify: Option<SlaveNotifyFn>,
    ) -> Result<()> {
        self.send(|reply| Command::RegisterPublisher {
            topic: topic.to_string(),
            topic_type: topic_type.to_string(),
            host: host.to_string(),
            port,
            notify,
            reply,
        })
        .await?
    }

    pub(crate) async fn unregister_publisher(&self, topic: &str) -> Result<()> {
        self.send(|reply| Command::UnregisterPublisher {
            topic: topic.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn register_subscriber(
        &self,
        topic: &str,
        topic_type: &str,
    ) -> Result<watch::Receiver<Vec<String>>> {
        self.send(|reply| Command::RegisterSubscriber {
            topic: topic.to_string(),
            topic_type: topic_type.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn unregister_subscriber(&self, topic: &str) -> Result<()> {
        self.send(|reply| Command::UnregisterSubscriber {
            topic: topic.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn register_service(
        &self,
        service: &str,
        service_type: &str,
        uri: &str,
    ) -> Result<()> {
        self.send(|reply| Command::RegisterService {
            service: service.to_string(),
            service_type: service_type.to_string(),
            uri: uri.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn unregister_service(&self, service: &str) -> Result<()> {
        self.send(|reply| Command::UnregisterService {
            service: service.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn get_param(&self, key: &str) -> Result<XmlrpcParam> {
        self.send(|reply| Command::GetParam {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn set_param(&self, key: &str, value: XmlrpcParam) -> Result<()> {
        self.send(|reply| Command::SetParam {
            key: key.to_string(),
            value,
            reply,
        })
        .await?
    }

    pub(crate) async fn has_param(&self, key: &str) -> Result<bool> {
        self.send(|reply| Command::HasParam {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn delete_param(&self, key: &str) -> Result<()> {
        self.send(|reply| Command::DeleteParam {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn search_param(&self, key: &str) -> Result<Option<String>> {
        self.send(|reply| Command::SearchParam {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn subscribe_param(
        &self,
        key: &str,
    ) -> Result<watch::Receiver<XmlrpcParam>> {
        self.send(|reply| Command::SubscribeParam {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn unsubscribe_param(&self, key: &str) -> Result<()> {
        self.send(|reply| Command::UnsubscribeParam {
            key: key.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn get_param_names(&self) -> Result<Vec<String>> {
        self.send(|reply| Command::GetParamNames { reply }).await?
    }

    pub(crate) async fn get_published_topics(
        &self,
        subgraph: &str,
    ) -> Result<Vec<crate::master_client::TopicInfo>> {
        self.send(|reply| Command::GetPublishedTopics {
            subgraph: subgraph.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn get_topic_types(&self) -> Result<Vec<crate::master_client::TopicInfo>> {
        self.send(|reply| Command::GetTopicTypes { reply }).await?
    }

    pub(crate) async fn get_system_state(&self) -> Result<XmlrpcParam> {
        self.send(|reply| Command::GetSystemState { reply }).await?
    }

    pub(crate) async fn lookup_node(&self, node_name: &str) -> Result<String> {
        self.send(|reply| Command::LookupNode {
            node_name: node_name.to_string(),
            reply,
        })
        .await?
    }

    pub(crate) async fn param_update(&self, key: String, value: XmlrpcParam) {
        let _ = self.commands.send(Command::ParamUpdate { key, value }).await;
    }

    /// Returns whether `topic` matched a known subscriber (spec §4.3
    /// `publisherUpdate` handler: "Respond `[1,"",0]` on success; `["…"]`
    /// on topic/uri not recognized").
    pub(crate) async fn publisher_update(&self, topic: String, publishers: Vec<String>) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::PublisherUpdate {
                topic,
                publishers,
                reply: tx,
            })
            .await
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub(crate) async fn note_publisher_disconnected(&self, topic: String) {
        let _ = self
            .commands
            .send(Command::NotePublisherDisconnected { topic })
            .await;
    }

    pub(crate) async fn note_subscriber_connected(&self, topic: String, peer: String) {
        let _ = self
            .commands
            .send(Command::NoteSubscriberConnected { topic, peer })
            .await;
    }

    pub(crate) async fn subscribe_events(&self) -> Result<broadcast::Receiver<NodeEvent>> {
        self.send(|reply| Command::SubscribeEvents { reply }).await
    }

    pub(crate) async fn request_topic(
        &self,
        topic: &str,
        caller_host: String,
        caller_port: u16,
    ) -> Option<(String, u16)> {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::RequestTopic {
                topic: topic.to_string(),
                caller_host,
                caller_port,
                reply: tx,
            })
            .await
            .is_err()
        {
            return None;
        }
        rx.await.ok().flatten()
    }

    pub(crate) async fn get_subscriptions(&self) -> Vec<(String, String)> {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::GetSubscriptions { reply: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub(crate) async fn get_publications(&self) -> Vec<(String, String)> {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::GetPublications { reply: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub(crate) async fn get_master_uri(&self) -> String {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::GetMasterUri { reply: tx })
            .await
            .is_err()
        {
            return self.master_uri.clone();
        }
        rx.await.unwrap_or_else(|_| self.master_uri.clone())
    }

    pub(crate) async fn shutdown(&self, reason: &str) {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Shutdown {
                reason: reason.to_string(),
                reply: tx,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

/// Owns every registry and drives keep-alive/re-advertise. See module docs.
pub(crate) struct NodeServer {
    commands: mpsc::Receiver<Command>,
    master: MasterClient,
    caller_id: String,
    xmlrpc_uri: String,
    publications: HashMap<String, PublicationRecord>,
    subscriptions: HashMap<String, SubscriptionRecord>,
    services: HashMap<String, ServiceRecord>,
    params: HashMap<String, watch::Sender<XmlrpcParam>>,
    last_master_pid: Option<i32>,
    events: broadcast::Sender<NodeEvent>,
}

impl NodeServer {
    pub(crate) fn spawn(
        master_uri: &str,
        caller_id: &str,
        xmlrpc_uri: &str,
    ) -> NodeServerHandle {
        let (tx, rx) = mpsc::channel(256);
        let server = NodeServer {
            commands: rx,
            master: MasterClient::new(master_uri, caller_id),
            caller_id: caller_id.to_string(),
            xmlrpc_uri: xmlrpc_uri.to_string(),
            publications: HashMap::new(),
            subscriptions: HashMap::new(),
            services: HashMap::new(),
            params: HashMap::new(),
            last_master_pid: None,
            events: broadcast::channel(256).0,
        };
        tokio::spawn(server.run());
        NodeServerHandle {
            commands: tx,
            caller_id: caller_id.to_string(),
            xmlrpc_uri: xmlrpc_uri.to_string(),
            master_uri: master_uri.to_string(),
        }
    }

    async fn run(mut self) {
        let mut keep_alive = tokio::time::interval(KEEP_ALIVE_INTERVAL);
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            if self.handle(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = keep_alive.tick() => {
                    self.ping_master().await;
                }
            }
        }
        log::debug!("node actor for {} exiting", self.caller_id);
    }

    /// Returns `true` when the actor should stop running.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::RegisterPublisher {
                topic,
                topic_type,
                host,
                port,
                notify,
                reply,
            } => {
                let result = if self.publications.len() >= DEFAULT_MAX_REGISTRY_ENTRIES
                    && !self.publications.contains_key(&topic)
                {
                    Err(Error::Capacity(
                        "publisher registry is at capacity".to_string(),
                    ))
                } else {
                    self.master
                        .register_publisher(&topic, &topic_type, &self.xmlrpc_uri)
                        .await
                        .map(|_| {
                            self.publications.insert(
                                topic,
                                PublicationRecord {
                                    topic_type,
                                    host,
                                    port,
                                    notify,
                                },
                            );
                        })
                };
                let _ = reply.send(result);
            }
            Command::UnregisterPublisher { topic, reply } => {
                let result = self
                    .master
                    .unregister_publisher(&topic, &self.xmlrpc_uri)
                    .await
                    .map(|_| {
                        self.publications.remove(&topic);
                    });
                let _ = reply.send(result);
            }
            Command::RegisterSubscriber {
                topic,
                topic_type,
                reply,
            } => {
                if self.subscriptions.len() >= DEFAULT_MAX_REGISTRY_ENTRIES
                    && !self.subscriptions.contains_key(&topic)
                {
                    let _ = reply.send(Err(Error::Capacity(
                        "subscriber registry is at capacity".to_string(),
                    )));
                    return false;
                }
                let result = self
                    .master
                    .register_subscriber(&topic, &topic_type, &self.xmlrpc_uri)
                    .await;
                match result {
                    Ok(publishers) => {
                        let (tx, rx) = watch::channel(publishers);
                        self.subscriptions.insert(
                            topic,
                            SubscriptionRecord {
                                topic_type,
                                publishers: tx,
                            },
                        );
                        let _ = reply.send(Ok(rx));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::UnregisterSubscriber { topic, reply } => {
                let result = self
                    .master
                    .unregister_subscriber(&topic, &self.xmlrpc_uri)
                    .await
                    .map(|_| {
                        self.subscriptions.remove(&topic);
                    });
                let _ = reply.send(result);
            }
            Command::RegisterService {
                service,
                service_type,
                uri,
                reply,
            } => {
                let result = if self.services.len() >= DEFAULT_MAX_REGISTRY_ENTRIES
                    && !self.services.contains_key(&service)
                {
                    Err(Error::Capacity(
                        "service registry is at capacity".to_string(),
                    ))
                } else {
                    self.master
                        .register_service(&service, &uri, &self.xmlrpc_uri)
                        .await
                        .map(|_| {
                            self.services.insert(
                                service,
                                ServiceRecord { service_type, uri },
                            );
                        })
                };
                let _ = reply.send(result);
            }
            Command::UnregisterService { service, reply } => {
                let uri = self.services.get(&service).map(|s| s.uri.clone());
                let result = match uri {
                    Some(uri) => self
                        .master
                        .unregister_service(&service, &uri)
                        .await
                        .map(|_| {
                            self.services.remove(&service);
                        }),
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            Command::GetParam { key, reply } => {
                let _ = reply.send(self.master.get_param(&key).await);
            }
            Command::SetParam { key, value, reply } => {
                let _ = reply.send(self.master.set_param(&key, value).await);
            }
            Command::HasParam { key, reply } => {
                let _ = reply.send(self.master.has_param(&key).await);
            }
            Command::DeleteParam { key, reply } => {
                let _ = reply.send(self.master.delete_param(&key).await);
            }
            Command::SearchParam { key, reply } => {
                let _ = reply.send(self.master.search_param(&key).await);
            }
            Command::SubscribeParam { key, reply } => {
                let result = self
                    .master
                    .subscribe_param(&self.xmlrpc_uri, &key)
                    .await;
                match result {
                    Ok(value) => {
                        let (tx, rx) = watch::channel(value);
                        self.params.insert(key, tx);
                        let _ = reply.send(Ok(rx));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::UnsubscribeParam { key, reply } => {
                let result = self
                    .master
                    .unsubscribe_param(&self.xmlrpc_uri, &key)
                    .await
                    .map(|_| {
                        self.params.remove(&key);
                    });
                let _ = reply.send(result);
            }
            Command::GetParamNames { reply } => {
                let _ = reply.send(self.master.get_param_names().await);
            }
            Command::GetPublishedTopics { subgraph, reply } => {
                let _ = reply.send(self.master.get_published_topics(&subgraph).await);
            }
            Command::GetTopicTypes { reply } => {
                let _ = reply.send(self.master.get_topic_types().await);
            }
            Command::GetSystemState { reply } => {
                let _ = reply.send(self.master.get_system_state().await);
            }
            Command::LookupNode { node_name, reply } => {
                let _ = reply.send(self.master.lookup_node(&node_name).await);
            }
            Command::ParamUpdate { key, value } => {
                // spec §4.4: match against registered prefixes, not just exact keys.
                for (registered, sender) in self.params.iter() {
                    if key == *registered || key.starts_with(&format!("{registered}/")) {
                        let _ = sender.send(value.clone());
                    }
                }
                let _ = self.events.send(NodeEvent::ParamUpdate { key, value });
            }
            Command::PublisherUpdate {
                topic,
                publishers,
                reply,
            } => {
                let found = if let Some(subscription) = self.subscriptions.get(&topic) {
                    let _ = subscription.publishers.send(publishers);
                    true
                } else {
                    false
                };
                let _ = reply.send(found);
            }
            Command::NotePublisherDisconnected { topic } => {
                let _ = self.events.send(NodeEvent::PublisherDisconnected { topic });
            }
            Command::NoteSubscriberConnected { topic, peer } => {
                let _ = self
                    .events
                    .send(NodeEvent::SubscriberConnected { topic, peer });
            }
            Command::SubscribeEvents { reply } => {
                let _ = reply.send(self.events.subscribe());
            }
            Command::RequestTopic {
                topic,
                caller_host,
                caller_port,
                reply,
            } => {
                let address = self.publications.get(&topic).map(|record| {
                    if let Some(notify) = &record.notify {
                        notify(&caller_host, caller_port);
                    }
                    (record.host.clone(), record.port)
                });
                let _ = reply.send(address);
            }
            Command::GetSubscriptions { reply } => {
                let _ = reply.send(
                    self.subscriptions
                        .iter()
                        .map(|(topic, record)| (topic.clone(), record.topic_type.clone()))
                        .collect(),
                );
            }
            Command::GetPublications { reply } => {
                let _ = reply.send(
                    self.publications
                        .iter()
                        .map(|(topic, record)| (topic.clone(), record.topic_type.clone()))
                        .collect(),
                );
            }
            Command::GetMasterUri { reply } => {
                let _ = reply.send(self.master.get_uri().await.unwrap_or_default());
            }
            Command::Shutdown { reason, reply } => {
                log::info!("node {} shutting down: {reason}", self.caller_id);
                self.drain_on_shutdown();
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    /// Cancels any calls still queued behind the actor's mailbox, matching
    /// spec §5's cancellation semantics: every outstanding call completes
    /// with a "cancelled" status rather than hanging forever.
    fn drain_on_shutdown(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            fail_pending(command);
        }
    }

    /// spec §4.6: ping the master with `getPid`; a failure or an observed
    /// PID change both trigger re-advertising everything this node has
    /// registered, in stable (publishers, subscribers, services) order.
    async fn ping_master(&mut self) {
        match self.master.get_pid().await {
            Ok(pid) => {
                let restarted = self
                    .last_master_pid
                    .is_some_and(|previous| previous != pid);
                self.last_master_pid = Some(pid);
                if restarted {
                    log::warn!("master PID changed, assuming restart; re-advertising");
                    let _ = self.events.send(NodeEvent::MasterRestarted);
                    self.restart_advertising().await;
                }
            }
            Err(e) => {
                log::warn!("keep-alive getPid failed ({e}); re-advertising");
                let _ = self.events.send(NodeEvent::MasterRestarted);
                self.restart_advertising().await;
            }
        }
    }

    async fn restart_advertising(&mut self) {
        for (topic, record) in self.publications.clone() {
            if let Err(e) = self
                .master
                .register_publisher(&topic, &record.topic_type, &self.xmlrpc_uri)
                .await
            {
                log::warn!("re-advertise of publisher {topic} failed: {e}");
            }
        }
        for (topic, record) in self.subscriptions.clone().into_iter().collect::<Vec<_>>() {
            match self
                .master
                .register_subscriber(&topic, &record.topic_type, &self.xmlrpc_uri)
                .await
            {
                Ok(publishers) => {
                    let _ = record.publishers.send(publishers);
                }
                Err(e) => log::warn!("re-advertise of subscriber {topic} failed: {e}"),
            }
        }
        for (service, record) in self.services.clone() {
            if let Err(e) = self
                .master
                .register_service(&service, &record.uri, &self.xmlrpc_uri)
                .await
            {
                log::warn!("re-advertise of service {service} failed: {e}");
            }
        }
    }
}

fn fail_pending(command: Command) {
    match command {
        Command::RegisterPublisher { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::UnregisterPublisher { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::RegisterSubscriber { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::UnregisterSubscriber { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::RegisterService { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::UnregisterService { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::GetParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::SetParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::HasParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::DeleteParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::SearchParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::SubscribeParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::UnsubscribeParam { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::GetParamNames { reply } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::GetPublishedTopics { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::GetTopicTypes { reply } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::GetSystemState { reply } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::LookupNode { reply, .. } => {
            let _ = reply.send(Err(Error::Disconnected("node is shutting down".into())));
        }
        Command::ParamUpdate { .. } => {}
        Command::PublisherUpdate { reply, .. } => {
            let _ = reply.send(false);
        }
        Command::NotePublisherDisconnected { .. } => {}
        Command::NoteSubscriberConnected { .. } => {}
        Command::SubscribeEvents { reply } => {
            let (tx, _) = broadcast::channel(1);
            let _ = reply.send(tx.subscribe());
        }
        Command::RequestTopic { reply, .. } => {
            let _ = reply.send(None);
        }
        Command::GetSubscriptions { reply } => {
            let _ = reply.send(Vec::new());
        }
        Command::GetPublications { reply } => {
            let _ = reply.send(Vec::new());
        }
        Command::GetMasterUri { reply } => {
            let _ = reply.send(String::new());
        }
        Command::Shutdown { reply, .. } => {
            let _ = reply.send(());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test_log::test(tokio::test)]
    async fn request_topic_on_unknown_topic_is_none() {
        let handle = NodeServer::spawn("http://localhost:11311", "/test_node", "http://localhost:0/");
        assert_eq!(
            handle
                .request_topic("/nope", "127.0.0.1".to_string(), 0)
                .await,
            None
        );
        handle.shutdown("test complete").await;
    }

    #[test_log::test(tokio::test)]
    async fn get_subscriptions_starts_empty() {
        let handle = NodeServer::spawn("http://localhost:11311", "/test_node", "http://localhost:0/");
        assert!(handle.get_subscriptions().await.is_empty());
        handle.shutdown("test complete").await;
    }
}
