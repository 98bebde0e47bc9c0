//! The application-facing facade over the node actor (spec §2.7, §3 Node).
//!
//! `NodeHandle` is the type application code actually holds: it wraps a
//! [`NodeServerHandle`], the bound xmlrpc slave server task, and the live
//! publication/subscription/service tables needed to keep their background
//! tasks alive for as long as the returned `Publisher`/`Subscriber`/
//! `ServiceClient`/advertised service handle is held.

use crate::names::Name;
use crate::node::actor::{NodeEvent, NodeServer, NodeServerHandle, SlaveNotifyFn};
use crate::publisher::{Publication, Publisher, PublisherAny};
use crate::service_client::ServiceClient;
use crate::service_server::ServiceServer;
use crate::slave_server;
use crate::subscriber::{Subscriber, SubscriberAny, Subscription};
use roslibrust_common::{RosMessageType, RosServiceType, ServiceFn};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Construction options mirroring real ROS1 node command-line remapping
/// (`__ns`, `__ip`, `__hostname`, arbitrary name remaps). The core never
/// reads environment variables itself (spec §6 "Environment"); the
/// embedding binary is expected to have already parsed `__ip=`/`__hostname=`
/// style arguments and pass them in here.
#[derive(Debug, Clone, Default)]
pub struct NodeHandleOptions {
    namespace: Option<String>,
    remaps: HashMap<String, String>,
    ip: Option<String>,
    hostname: Option<String>,
    xmlrpc_server_port: Option<u16>,
}

impl NodeHandleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the node's namespace (default `/`). Relative topic/service/
    /// param names passed to `NodeHandle` methods resolve under this.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Remaps `from` to `to` before name resolution, as `rosrun` does with
    /// `from:=to` command-line arguments.
    pub fn remap(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.remaps.insert(from.into(), to.into());
        self
    }

    /// `__ip`: advertise this literal address instead of resolving a
    /// hostname. Also used as the bind address for the TCPROS/xmlrpc
    /// listeners when it parses as a local-bindable address.
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// `__hostname`: advertise this hostname instead of `gethostname()`'s
    /// default. Resolved to a numeric address for peers via `net::resolve_host`.
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Overrides the xmlrpc slave server's bound port (default: ephemeral,
    /// port 0). Mainly useful for tests wanting a stable, repeatable URI.
    pub fn xmlrpc_server_port(mut self, port: u16) -> Self {
        self.xmlrpc_server_port = Some(port);
        self
    }

    fn resolve_remap<'a>(&'a self, name: &'a str) -> &'a str {
        self.remaps.get(name).map(String::as_str).unwrap_or(name)
    }

    pub async fn build(self, master_uri: &str, name: &str) -> crate::error::Result<NodeHandle> {
        let namespace = self.namespace.clone().unwrap_or_else(|| "/".to_string());
        let resolved_name = self.resolve_remap(name).to_string();
        let caller_id = Name::resolve(&namespace, &resolved_name)?;

        let bind_ip: IpAddr = self
            .ip
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));

        let advertise_host = if let Some(ip) = &self.ip {
            ip.clone()
        } else if let Some(hostname) = &self.hostname {
            hostname.clone()
        } else {
            gethostname::gethostname().to_string_lossy().into_owned()
        };

        let listener = match self.xmlrpc_server_port {
            Some(port) => {
                let listener =
                    std::net::TcpListener::bind((bind_ip, port)).map_err(crate::error::Error::Io)?;
                listener
                    .set_nonblocking(true)
                    .map_err(crate::error::Error::Io)?;
                listener
            }
            None => slave_server::bind(bind_ip).map_err(crate::error::Error::Io)?,
        };
        let xmlrpc_port = listener.local_addr().map_err(crate::error::Error::Io)?.port();
        let xmlrpc_uri = format!("http://{advertise_host}:{xmlrpc_port}/");

        let handle = NodeServer::spawn(master_uri, caller_id.as_str(), &xmlrpc_uri);
        let (_, xmlrpc_task) = slave_server::serve(listener, handle.clone())
            .map_err(crate::error::Error::Io)?;

        Ok(NodeHandle {
            inner: Arc::new(Inner {
                caller_id,
                namespace,
                remaps: self.remaps,
                bind_ip,
                handle,
                _xmlrpc_task: xmlrpc_task,
                publications: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(HashMap::new()),
                services: Mutex::new(HashMap::new()),
            }),
        })
    }
}

struct Inner {
    caller_id: Name,
    namespace: String,
    remaps: HashMap<String, String>,
    bind_ip: IpAddr,
    handle: NodeServerHandle,
    _xmlrpc_task: tokio::task::JoinHandle<()>,
    publications: Mutex<HashMap<String, Arc<Publication>>>,
    subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
    services: Mutex<HashMap<String, Arc<ServiceServer>>>,
}

/// The handle application code holds for the lifetime of a ROS1 node.
/// Cheaply `Clone`-able; every clone shares the same underlying actor,
/// xmlrpc server, and registries.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<Inner>,
}

impl NodeHandle {
    /// Connects to the master at `master_uri` and registers a node named
    /// `name` (absolute, or resolved under `/` if relative).
    pub async fn new(master_uri: &str, name: &str) -> crate::error::Result<Self> {
        NodeHandleOptions::new().build(master_uri, name).await
    }

    /// Starts a builder for constructing a node with non-default namespace,
    /// remaps, or network overrides.
    pub fn new_with_options() -> NodeHandleOptions {
        NodeHandleOptions::new()
    }

    fn resolve(&self, name: &str) -> crate::error::Result<Name> {
        let remapped = self
            .inner
            .remaps
            .get(name)
            .map(String::as_str)
            .unwrap_or(name);
        Name::resolve(&self.inner.namespace, remapped)
    }

    /// Advertises `topic`, returning a [`Publisher`] that serializes and
    /// sends `T` to every connected subscriber. `latching` matches ROS1's
    /// latched-topic semantics: newly connecting subscribers immediately
    /// receive the last published message.
    pub async fn advertise<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
        latching: bool,
    ) -> crate::error::Result<Publisher<T>> {
        self.advertise_inner(topic, queue_size, latching, None)
            .await
    }

    /// Like [`NodeHandle::advertise`], additionally registering a
    /// slave-notification callback (spec §3 PublisherNode): invoked with a
    /// subscriber's host and port every time that subscriber's
    /// `requestTopic` call is served (spec §4.3), before it opens its
    /// TCPROS connection.
    pub async fn advertise_with_notify<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
        latching: bool,
        notify: SlaveNotifyFn,
    ) -> crate::error::Result<Publisher<T>> {
        self.advertise_inner(topic, queue_size, latching, Some(notify))
            .await
    }

    async fn advertise_inner<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
        latching: bool,
        notify: Option<SlaveNotifyFn>,
    ) -> crate::error::Result<Publisher<T>> {
        let name = self.resolve(topic)?;
        let (publication, sender) = Publication::new(
            &self.inner.caller_id,
            name.as_str(),
            T::ROS_TYPE_NAME,
            T::MD5SUM,
            T::DEFINITION,
            latching,
            queue_size,
            self.inner.bind_ip,
            self.inner.handle.clone(),
        )
        .await
        .map_err(crate::error::Error::Io)?;

        let host = self.advertised_host().await;
        self.inner
            .handle
            .register_publisher(
                name.as_str(),
                T::ROS_TYPE_NAME,
                &host,
                publication.port(),
                notify,
            )
            .await?;
        self.inner
            .publications
            .lock()
            .await
            .insert(name.as_str().to_string(), Arc::new(publication));

        Ok(Publisher::new(name.as_str(), sender))
    }

    /// Like [`NodeHandle::advertise`] but accepting already-serialized
    /// message bytes, for callers without a compile-time message type.
    pub async fn advertise_any(
        &self,
        topic: &str,
        topic_type: &str,
        md5sum: &str,
        message_definition: &str,
        queue_size: usize,
        latching: bool,
    ) -> crate::error::Result<PublisherAny> {
        self.advertise_any_inner(
            topic,
            topic_type,
            md5sum,
            message_definition,
            queue_size,
            latching,
            None,
        )
        .await
    }

    /// Like [`NodeHandle::advertise_with_notify`] but for [`PublisherAny`].
    pub async fn advertise_any_with_notify(
        &self,
        topic: &str,
        topic_type: &str,
        md5sum: &str,
        message_definition: &str,
        queue_size: usize,
        latching: bool,
        notify: SlaveNotifyFn,
    ) -> crate::error::Result<PublisherAny> {
        self.advertise_any_inner(
            topic,
            topic_type,
            md5sum,
            message_definition,
            queue_size,
            latching,
            Some(notify),
        )
        .await
    }

    async fn advertise_any_inner(
        &self,
        topic: &str,
        topic_type: &str,
        md5sum: &str,
        message_definition: &str,
        queue_size: usize,
        latching: bool,
        notify: Option<SlaveNotifyFn>,
    ) -> crate::error::Result<PublisherAny> {
        let name = self.resolve(topic)?;
        let (publication, sender) = Publication::new(
            &self.inner.caller_id,
            name.as_str(),
            topic_type,
            md5sum,
            message_definition,
            latching,
            queue_size,
            self.inner.bind_ip,
            self.inner.handle.clone(),
        )
        .await
        .map_err(crate::error::Error::Io)?;

        let host = self.advertised_host().await;
        self.inner
            .handle
            .register_publisher(name.as_str(), topic_type, &host, publication.port(), notify)
            .await?;
        self.inner
            .publications
            .lock()
            .await
            .insert(name.as_str().to_string(), Arc::new(publication));

        Ok(PublisherAny::new(name.as_str(), sender))
    }

    /// Subscribes to `topic`, returning a [`Subscriber`] that yields
    /// deserialized `T` values as they arrive.
    pub async fn subscribe<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
    ) -> crate::error::Result<Subscriber<T>> {
        let name = self.resolve(topic)?;
        let publishers = self
            .inner
            .handle
            .register_subscriber(name.as_str(), T::ROS_TYPE_NAME)
            .await?;
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let subscription = Subscription::new(
            self.inner.caller_id.clone(),
            name.as_str().to_string(),
            T::ROS_TYPE_NAME.to_string(),
            T::MD5SUM.to_string(),
            false,
            publishers,
            self.inner.handle.clone(),
            sender,
        );
        self.inner
            .subscriptions
            .lock()
            .await
            .insert(name.as_str().to_string(), Arc::new(subscription));
        Ok(Subscriber::new(receiver))
    }

    /// Like [`NodeHandle::subscribe`] but yielding raw deserialized bytes
    /// for any message type (ROS's `AnyMsg`/`ShapeShifter` equivalent).
    pub async fn subscribe_any(
        &self,
        topic: &str,
        topic_type: &str,
        queue_size: usize,
    ) -> crate::error::Result<SubscriberAny> {
        let name = self.resolve(topic)?;
        let publishers = self
            .inner
            .handle
            .register_subscriber(name.as_str(), topic_type)
            .await?;
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let subscription = Subscription::new(
            self.inner.caller_id.clone(),
            name.as_str().to_string(),
            topic_type.to_string(),
            "*".to_string(),
            false,
            publishers,
            self.inner.handle.clone(),
            sender,
        );
        self.inner
            .subscriptions
            .lock()
            .await
            .insert(name.as_str().to_string(), Arc::new(subscription));
        Ok(SubscriberAny::new(receiver))
    }

    /// Advertises `service`, dispatching each inbound request on a fresh
    /// tokio task to `server`.
    pub async fn advertise_service<T, F>(
        &self,
        service: &str,
        server: F,
    ) -> crate::error::Result<()>
    where
        T: RosServiceType,
        F: ServiceFn<T>,
    {
        let name = self.resolve(service)?;
        let server_task = ServiceServer::new::<T, F>(
            self.inner.caller_id.clone(),
            name.as_str().to_string(),
            self.inner.bind_ip,
            server,
        )
        .await
        .map_err(crate::error::Error::Io)?;

        let uri = format!(
            "rosrpc://{}:{}",
            self.advertised_host().await,
            server_task.port()
        );
        self.inner
            .handle
            .register_service(name.as_str(), T::ROS_SERVICE_NAME, &uri)
            .await?;
        self.inner
            .services
            .lock()
            .await
            .insert(name.as_str().to_string(), Arc::new(server_task));
        Ok(())
    }

    /// Returns a client handle for calling an already-advertised service.
    /// `persistent` keeps the TCP connection open across calls instead of
    /// reconnecting each time.
    pub fn service_client<T: RosServiceType>(
        &self,
        service: &str,
        persistent: bool,
    ) -> crate::error::Result<ServiceClient<T>> {
        let name = self.resolve(service)?;
        Ok(ServiceClient::new(
            self.inner.caller_id.clone(),
            name.as_str().to_string(),
            persistent,
            self.inner.handle.clone(),
        ))
    }

    async fn advertised_host(&self) -> String {
        // The xmlrpc_uri the actor was constructed with already carries the
        // advertised host; reuse it so publisher/service URIs stay consistent.
        let uri = self.inner.handle.xmlrpc_uri.clone();
        crate::net::parse_xmlrpc_uri(&uri)
            .map(|(host, _)| host)
            .unwrap_or(uri)
    }

    pub async fn get_param(&self, key: &str) -> crate::error::Result<crate::param::XmlrpcParam> {
        self.inner.handle.get_param(key).await
    }

    pub async fn set_param(
        &self,
        key: &str,
        value: crate::param::XmlrpcParam,
    ) -> crate::error::Result<()> {
        self.inner.handle.set_param(key, value).await
    }

    pub async fn has_param(&self, key: &str) -> crate::error::Result<bool> {
        self.inner.handle.has_param(key).await
    }

    pub async fn delete_param(&self, key: &str) -> crate::error::Result<()> {
        self.inner.handle.delete_param(key).await
    }

    pub async fn search_param(&self, key: &str) -> crate::error::Result<Option<String>> {
        self.inner.handle.search_param(key).await
    }

    /// Subscribes to updates for `key`, returning a `watch::Receiver` that
    /// observes the master's `paramUpdate` calls for it (spec §4.4).
    pub async fn subscribe_param(
        &self,
        key: &str,
    ) -> crate::error::Result<tokio::sync::watch::Receiver<crate::param::XmlrpcParam>> {
        self.inner.handle.subscribe_param(key).await
    }

    pub async fn unsubscribe_param(&self, key: &str) -> crate::error::Result<()> {
        self.inner.handle.unsubscribe_param(key).await
    }

    pub async fn get_param_names(&self) -> crate::error::Result<Vec<String>> {
        self.inner.handle.get_param_names().await
    }

    /// `getPublishedTopics` (spec §4.2): every currently-published
    /// topic/type pair known to the master, optionally restricted to
    /// `subgraph` (an empty string matches everything).
    pub async fn get_published_topics(
        &self,
        subgraph: &str,
    ) -> crate::error::Result<Vec<crate::master_client::TopicInfo>> {
        self.inner.handle.get_published_topics(subgraph).await
    }

    /// `getTopicTypes` (spec §9/SPEC_FULL supplement): every topic name/type
    /// pair the master has ever seen, published or not.
    pub async fn get_topic_types(
        &self,
    ) -> crate::error::Result<Vec<crate::master_client::TopicInfo>> {
        self.inner.handle.get_topic_types().await
    }

    /// `getSystemState` (SPEC_FULL supplement): the master's full
    /// publisher/subscriber/service graph, as a nested parameter tree.
    pub async fn get_system_state(&self) -> crate::error::Result<crate::param::XmlrpcParam> {
        self.inner.handle.get_system_state().await
    }

    /// `lookupNode` (SPEC_FULL supplement): the xmlrpc URI of another node
    /// registered with the master.
    pub async fn lookup_node(&self, node_name: &str) -> crate::error::Result<String> {
        self.inner.handle.lookup_node(node_name).await
    }

    /// Subscribes to node status events (spec §6): master restarts,
    /// parameter updates, and peer connect/disconnect notices.
    pub async fn subscribe_events(&self) -> crate::error::Result<broadcast::Receiver<NodeEvent>> {
        self.inner.handle.subscribe_events().await
    }

    /// This node's fully-resolved caller id, e.g. `/talker_rs`.
    pub fn name(&self) -> &str {
        self.inner.caller_id.as_str()
    }

    /// Shuts the node down: deregisters every publisher/subscriber/service
    /// from the master and stops the actor and xmlrpc server tasks.
    pub async fn shutdown(&self, reason: &str) {
        self.inner.publications.lock().await.clear();
        self.inner.subscriptions.lock().await.clear();
        self.inner.services.lock().await.clear();
        self.inner.handle.shutdown(reason).await;
    }
}

impl roslibrust_common::TopicProvider for NodeHandle {
    type Publisher<T: RosMessageType> = Publisher<T>;
    type Subscriber<T: RosMessageType> = Subscriber<T>;

    async fn advertise<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
    ) -> roslibrust_common::Result<Self::Publisher<T>> {
        NodeHandle::advertise(self, topic, queue_size, false)
            .await
            .map_err(Into::into)
    }

    async fn subscribe<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
    ) -> roslibrust_common::Result<Self::Subscriber<T>> {
        NodeHandle::subscribe(self, topic, queue_size)
            .await
            .map_err(Into::into)
    }
}

impl roslibrust_common::ServiceProvider for NodeHandle {
    type ServiceClient<T: RosServiceType> = ServiceClient<T>;

    async fn service_client<T: RosServiceType>(
        &self,
        service: &str,
    ) -> roslibrust_common::Result<Self::ServiceClient<T>> {
        NodeHandle::service_client(self, service, false).map_err(Into::into)
    }

    async fn advertise_service<T, F>(&self, service: &str, server: F) -> roslibrust_common::Result<()>
    where
        T: RosServiceType,
        F: ServiceFn<T>,
    {
        NodeHandle::advertise_service(self, service, server)
            .await
            .map_err(Into::into)
    }
}
