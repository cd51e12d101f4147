//! Call-routing layer interface
//!
//! The routing layer renders connections and conferences to the user and to
//! accessories. Conference policies register what they create here and tell
//! it which calls may be merged with which.

use std::collections::HashSet;
use std::sync::Arc;

use crate::conference::Conference;
use crate::connection::Connection;
use crate::types::{ConferenceId, ConnectionId};

/// Something the user can merge with something else
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conferenceable {
    Connection(ConnectionId),
    Conference(ConferenceId),
}

/// Registration primitives exposed by the call-routing layer
pub trait CallRouting: Send + Sync {
    /// Register a connection, optionally as a child of a conference
    fn add_connection(&self, connection: Arc<Connection>, parent: Option<ConferenceId>);

    fn remove_connection(&self, id: ConnectionId);

    fn add_conference(&self, conference: Arc<Conference>);

    fn remove_conference(&self, id: ConferenceId);

    /// Replace the set of calls `target` may be merged with
    fn set_conferenceable(&self, target: Conferenceable, with: Vec<Conferenceable>);

    /// Connections the routing layer already knows about
    fn existing_connections(&self) -> HashSet<ConnectionId>;
}
