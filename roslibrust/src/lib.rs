//! # roslibrust
//!
//! A library for talking to ROS1 nodes without requiring a ROS installation.
//!
//! Enable the `ros1` feature to get a native XML-RPC / TCPROS client
//! ([`ros1::NodeHandle`]) that registers with a roscore master, discovers
//! peers, and exchanges messages directly over TCP.

pub use roslibrust_common::*;

#[cfg(feature = "ros1")]
pub use roslibrust_ros1 as ros1;
