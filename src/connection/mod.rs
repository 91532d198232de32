//! Connection resolution.
//!
//! Maps a logical source type to the connector for its backend family and
//! opens a [`ConnectionHandle`](crate::db::ConnectionHandle).

pub mod descriptor;
pub mod resolver;

pub use descriptor::{HostList, SourceDescriptor};
pub use resolver::{BackendConnector, ConnectionResolver, ConnectorSettings, WideColumnConnector};
