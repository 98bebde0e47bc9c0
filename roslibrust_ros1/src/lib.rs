//! A native ROS1 client: registers with a ROS master over XML-RPC, and
//! exchanges messages with peers over the TCPROS binary wire protocol.
//!
//! The entry point is [`NodeHandle`]; see `roslibrust/examples/ros1_talker.rs`
//! and `ros1_listener.rs` for minimal publisher/subscriber programs.

pub mod error;
pub mod names;
pub mod param;
pub mod publisher;
pub mod service_client;
pub mod service_server;
pub mod subscriber;

pub mod master_client;
pub(crate) mod net;
pub(crate) mod rpc;
pub(crate) mod slave_server;
pub(crate) mod tcpros;
pub(crate) mod xmlrpc;

pub mod node;

pub use error::{Error, Result};
pub use master_client::TopicInfo;
pub use names::Name;
pub use node::actor::{NodeEvent, SlaveNotifyFn};
pub use node::client::{NodeHandle, NodeHandleOptions};
pub use param::XmlrpcParam;
pub use publisher::{Publisher, PublisherAny};
pub use service_client::ServiceClient;
pub use subscriber::{Subscriber, SubscriberAny};
