//! Application facade between the HTTP layer and the world.
//!
//! All world mutation funnels through the mutex held here, which is the
//! single logical executor of the simulation: API handlers and the tick
//! driver take it for short synchronous critical sections, so commands and
//! ticks apply in submission order. JSON payloads are built from state read
//! under the lock and released before any I/O.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{json, Value};
use tracing::{error, info};

use game::{save_to_file, Direction, JoinInfo, World, WorldError};

/// Direction letter used on the wire.
pub fn direction_letter(direction: Direction) -> &'static str {
    match direction {
        Direction::North => "U",
        Direction::South => "D",
        Direction::West => "L",
        Direction::East => "R",
    }
}

/// Parse a wire movement command. Empty string means stop; anything other
/// than the four letters is rejected.
pub fn parse_move(letter: &str) -> Option<Option<Direction>> {
    match letter {
        "" => Some(None),
        "U" => Some(Some(Direction::North)),
        "D" => Some(Some(Direction::South)),
        "L" => Some(Some(Direction::West)),
        "R" => Some(Some(Direction::East)),
        _ => None,
    }
}

pub struct Application {
    world: Mutex<World>,
    loot_catalog: HashMap<String, Value>,
    manual_tick: bool,
    state_file: Option<PathBuf>,
    save_due: Arc<AtomicBool>,
}

impl Application {
    pub fn new(
        mut world: World,
        loot_catalog: HashMap<String, Value>,
        manual_tick: bool,
        state_file: Option<PathBuf>,
        save_period_ms: Option<f64>,
    ) -> Self {
        let save_due = Arc::new(AtomicBool::new(false));
        if state_file.is_some() {
            match save_period_ms {
                Some(period_ms) => {
                    let due = save_due.clone();
                    let mut since_save_ms = 0.0;
                    world.add_tick_observer(move |delta_ms| {
                        since_save_ms += delta_ms;
                        if since_save_ms > period_ms {
                            due.store(true, Ordering::Relaxed);
                            since_save_ms = 0.0;
                        }
                    });
                }
                None => {
                    let due = save_due.clone();
                    world.add_tick_observer(move |_| due.store(true, Ordering::Relaxed));
                }
            }
        }

        Self {
            world: Mutex::new(world),
            loot_catalog,
            manual_tick,
            state_file,
            save_due,
        }
    }

    pub fn manual_tick(&self) -> bool {
        self.manual_tick
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().expect("world mutex poisoned")
    }

    pub fn join(&self, name: &str, map_id: &str) -> Result<JoinInfo, WorldError> {
        self.world().join(name, map_id)
    }

    pub fn move_player(
        &self,
        token: &str,
        command: Option<Direction>,
    ) -> Result<(), WorldError> {
        self.world().move_player(token, command)
    }

    /// Advance the world and write the state file when a save came due.
    pub fn tick(&self, delta_ms: f64) {
        let world = {
            let mut world = self.world();
            world.advance(delta_ms);
            world
        };
        if self.save_due.swap(false, Ordering::Relaxed) {
            if let Some(path) = &self.state_file {
                if let Err(err) = save_to_file(&world, path) {
                    error!(%err, path = %path.display(), "state save failed");
                }
            }
        }
    }

    /// Unconditional save, used on shutdown.
    pub fn save_state(&self) {
        let Some(path) = &self.state_file else {
            return;
        };
        let world = self.world();
        match save_to_file(&world, path) {
            Ok(()) => info!(path = %path.display(), "game state saved"),
            Err(err) => error!(%err, path = %path.display(), "state save failed"),
        }
    }

    /// `[{id, name}]` for every map, in registration order.
    pub fn maps_json(&self) -> Value {
        let world = self.world();
        Value::Array(
            world
                .maps()
                .iter()
                .map(|map| json!({ "id": map.id(), "name": map.name() }))
                .collect(),
        )
    }

    /// The full map object, or None for an unknown id.
    pub fn map_json(&self, map_id: &str) -> Option<Value> {
        let world = self.world();
        let map = world.find_map(map_id)?;

        let roads: Vec<Value> = map
            .roads()
            .iter()
            .map(|road| {
                let start = road.start();
                if road.is_horizontal() {
                    json!({ "x0": start.x, "y0": start.y, "x1": road.end().x })
                } else {
                    json!({ "x0": start.x, "y0": start.y, "y1": road.end().y })
                }
            })
            .collect();

        let mut object = json!({
            "id": map.id(),
            "name": map.name(),
            "roads": roads,
        });

        if !map.buildings().is_empty() {
            let buildings: Vec<Value> = map
                .buildings()
                .iter()
                .map(|b| {
                    json!({
                        "x": b.position.x,
                        "y": b.position.y,
                        "w": b.size.width,
                        "h": b.size.height,
                    })
                })
                .collect();
            object["buildings"] = Value::Array(buildings);
        }

        if !map.offices().is_empty() {
            let offices: Vec<Value> = map
                .offices()
                .iter()
                .map(|office| {
                    json!({
                        "id": office.id,
                        "x": office.position.x,
                        "y": office.position.y,
                        "offsetX": office.offset.dx,
                        "offsetY": office.offset.dy,
                    })
                })
                .collect();
            object["offices"] = Value::Array(offices);
        }

        if let Some(loot_types) = self.loot_catalog.get(map_id) {
            object["lootTypes"] = loot_types.clone();
        }

        Some(object)
    }

    /// `{playerId: {name}}` for every player in the requester's session, or
    /// None when the token is unknown.
    pub fn players_json(&self, token: &str) -> Option<Value> {
        let world = self.world();
        let session = world.session_for_token(token)?;
        let mut players = serde_json::Map::new();
        for avatar in session.avatars() {
            players.insert(avatar.id().to_string(), json!({ "name": avatar.name() }));
        }
        Some(Value::Object(players))
    }

    /// Dynamic session state for the requester: avatars and ground loot.
    /// Speeds go out in units per second.
    pub fn state_json(&self, token: &str) -> Option<Value> {
        let world = self.world();
        let session = world.session_for_token(token)?;

        let mut players = serde_json::Map::new();
        for avatar in session.avatars() {
            let position = avatar.position();
            let velocity = avatar.velocity();
            let bag: Vec<Value> = avatar
                .bag()
                .iter()
                .map(|item| json!({ "id": item.id, "type": item.kind }))
                .collect();
            players.insert(
                avatar.id().to_string(),
                json!({
                    "pos": [position.x, position.y],
                    "speed": [velocity.x * 1000.0, velocity.y * 1000.0],
                    "dir": direction_letter(avatar.facing()),
                    "bag": bag,
                    "score": avatar.score(),
                }),
            );
        }

        let mut lost_objects = serde_json::Map::new();
        for (id, dropped) in session.loot() {
            lost_objects.insert(
                id.to_string(),
                json!({
                    "type": dropped.item.kind,
                    "pos": [dropped.position.x, dropped.position.y],
                }),
            );
        }

        Some(json!({ "players": players, "lostObjects": lost_objects }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_letters_round_trip() {
        for direction in [
            Direction::North,
            Direction::South,
            Direction::West,
            Direction::East,
        ] {
            let letter = direction_letter(direction);
            assert_eq!(parse_move(letter), Some(Some(direction)));
        }
        assert_eq!(parse_move(""), Some(None));
        assert_eq!(parse_move("X"), None);
        assert_eq!(parse_move("u"), None);
    }
}
