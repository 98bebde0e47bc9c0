//! The node driver (spec §2.7, §3 Node, §4.7, §5).
//!
//! Split into the actor that owns all state ([`actor`]) and the
//! application-facing facade over it ([`client`]).

pub(crate) mod actor;
pub mod client;
