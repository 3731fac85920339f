//! Outbound connection to the remote endpoint

mod connector;

pub use connector::{Connection, TunnelConnector};
