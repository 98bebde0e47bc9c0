//! Generic pub/sub and service traits implemented by each roslibrust backend.
//!
//! These let application code that only needs "ROS like" behavior (advertise,
//! subscribe, call a service) stay generic over which backend (rosbridge,
//! native ros1, ...) it is actually talking to.

use crate::{Result, RosMessageType, RosServiceType, ServiceFn};
use std::future::Future;

/// A backend capable of creating publishers and subscribers for topics.
pub trait TopicProvider: Send + Sync {
    /// Concrete publisher handle type produced by this backend.
    type Publisher<T: RosMessageType>: TopicPublisher<T>;
    /// Concrete subscriber handle type produced by this backend.
    type Subscriber<T: RosMessageType>: TopicSubscriber<T>;

    /// Advertises a new topic, returning a handle that can be used to publish to it.
    fn advertise<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
    ) -> impl Future<Output = Result<Self::Publisher<T>>> + Send;

    /// Subscribes to a topic, returning a handle that yields incoming messages.
    fn subscribe<T: RosMessageType>(
        &self,
        topic: &str,
        queue_size: usize,
    ) -> impl Future<Output = Result<Self::Subscriber<T>>> + Send;
}

/// A handle that can publish messages of type `T` to a single topic.
pub trait TopicPublisher<T: RosMessageType>: Send + Sync {
    /// Queues `msg` to be sent on the topic this handle was created for.
    fn publish(&self, msg: &T) -> impl Future<Output = Result<()>> + Send;
}

/// A handle that yields incoming messages of type `T` from a single topic.
pub trait TopicSubscriber<T: RosMessageType>: Send {
    /// Waits for and returns the next message delivered on this subscription.
    fn next(&mut self) -> impl Future<Output = Result<T>> + Send;
}

/// A backend capable of calling and advertising services.
pub trait ServiceProvider: Send + Sync {
    /// Concrete service client handle type produced by this backend.
    type ServiceClient<T: RosServiceType>: ServiceClientHandle<T>;

    /// Creates a client handle for calling an already-advertised service.
    fn service_client<T: RosServiceType>(
        &self,
        service: &str,
    ) -> impl Future<Output = Result<Self::ServiceClient<T>>> + Send;

    /// Advertises a service, dispatching incoming requests to `server`.
    fn advertise_service<T, F>(
        &self,
        service: &str,
        server: F,
    ) -> impl Future<Output = Result<()>> + Send
    where
        T: RosServiceType,
        F: ServiceFn<T>;
}

/// A handle that can call a single remote service.
pub trait ServiceClientHandle<T: RosServiceType>: Send + Sync {
    /// Sends `request` and waits for the response.
    fn call(&self, request: &T::Request) -> impl Future<Output = Result<T::Response>> + Send;
}
