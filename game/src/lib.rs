//! Core simulation engine for the loot-gathering game.
//!
//! Everything in this crate is pure world state plus the tick logic that
//! advances it: road geometry, loot spawning, collision detection, avatar
//! kinematics, per-map sessions and the world registry. No networking, no
//! database, no clocks - those live in the server crate and drive the world
//! through [`World::advance`].

pub mod avatar;
pub mod collision;
pub mod geom;
pub mod loot;
pub mod map;
pub mod session;
pub mod snapshot;
pub mod world;

pub use avatar::{Avatar, TickOutcome};
pub use geom::{Direction, Offset, Point, Position, Size, Velocity};
pub use loot::{DroppedLoot, LootGenerator, LootGeneratorConfig, LootItem};
pub use map::{Building, Map, MapError, Office, Road};
pub use session::{GameSession, MoveResult};
pub use snapshot::{restore_from_file, save_to_file, SnapshotError};
pub use world::{JoinInfo, RetiredPlayer, World, WorldError};
