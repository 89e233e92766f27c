//! Game core for gridmud: per-connection sessions, the shared session
//! registry and the room graph.

use std::sync::Arc;

pub mod conn;
pub mod dispatch;
pub mod graph;
pub mod outbox;
pub mod registry;
pub mod session;

pub use conn::{ConnOptions, serve};
pub use graph::{Coord, Direction, Room, RoomGraph, RoomGraphBuilder};
pub use registry::{Registry, SessionId, SessionKey};
pub use session::{Session, State};

/// Everything sessions share. Cheap to clone.
#[derive(Debug, Clone)]
pub struct World {
    pub rooms: Arc<RoomGraph>,
    pub registry: Registry,
}

impl World {
    pub fn new(rooms: RoomGraph) -> Self {
        Self {
            rooms: Arc::new(rooms),
            registry: Registry::new(),
        }
    }

    pub fn starter() -> Self {
        Self::new(RoomGraph::starter())
    }
}
