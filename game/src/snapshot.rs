//! Snapshot codec: full world state to and from a byte stream.
//!
//! The stream is a bincode-encoded [`SnapshotData`]: the player table
//! followed by the per-session loot, both in `BTreeMap`s so the encoding is
//! deterministic. Restore rebuilds sessions under their original ids and
//! bumps every id counter past the highest id seen, so allocations after a
//! restore never collide with restored state.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::avatar::Avatar;
use crate::geom::{Direction, Position, Velocity};
use crate::loot::{DroppedLoot, LootItem};
use crate::session::GameSession;
use crate::world::{PlayerEntry, World};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct PlayerRepr {
    name: String,
    token: String,
    map_id: String,
    score: i32,
    idle_time_ms: f64,
    total_time_ms: f64,
    position: Position,
    velocity: Velocity,
    facing: Direction,
    bag: Vec<LootItem>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRepr {
    map_id: String,
    loot: BTreeMap<i64, DroppedLoot>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotData {
    players: BTreeMap<i32, PlayerRepr>,
    sessions: BTreeMap<i32, SessionRepr>,
}

impl World {
    /// Serialize all dynamic state (players, loot) into `writer`. Static map
    /// data is not included; it is rebuilt from the configuration on load.
    pub fn snapshot<W: Write>(&self, writer: &mut W) -> Result<(), SnapshotError> {
        let mut data = SnapshotData::default();

        for (&player_id, entry) in &self.players {
            let avatar = self
                .sessions
                .get(&entry.session_id)
                .and_then(|session| session.avatar(player_id))
                .ok_or_else(|| {
                    SnapshotError::Corrupt(format!("player {player_id} has no avatar"))
                })?;
            data.players.insert(
                player_id,
                PlayerRepr {
                    name: avatar.name().to_string(),
                    token: avatar.token().to_string(),
                    map_id: avatar.map_id().to_string(),
                    score: avatar.score(),
                    idle_time_ms: avatar.idle_time_ms(),
                    total_time_ms: avatar.total_time_ms(),
                    position: avatar.position(),
                    velocity: avatar.velocity(),
                    facing: avatar.facing(),
                    bag: avatar.bag().to_vec(),
                },
            );
        }

        for (&session_id, session) in &self.sessions {
            data.sessions.insert(
                session_id,
                SessionRepr {
                    map_id: session.map_id().to_string(),
                    loot: session.loot().clone(),
                },
            );
        }

        bincode::serialize_into(writer, &data)
            .map_err(|err| SnapshotError::Corrupt(err.to_string()))
    }

    /// Load a snapshot previously written by [`World::snapshot`] into this
    /// world. The world must already carry the maps the snapshot refers to.
    pub fn restore<R: Read>(&mut self, reader: R) -> Result<(), SnapshotError> {
        let data: SnapshotData = bincode::deserialize_from(reader)
            .map_err(|err| SnapshotError::Corrupt(err.to_string()))?;
        self.apply_snapshot(data)
    }

    fn apply_snapshot(&mut self, data: SnapshotData) -> Result<(), SnapshotError> {
        for (&session_id, repr) in &data.sessions {
            let &map_index = self.map_index.get(&repr.map_id).ok_or_else(|| {
                SnapshotError::Corrupt(format!("snapshot references unknown map {}", repr.map_id))
            })?;
            let mut session = GameSession::new(
                session_id,
                repr.map_id.clone(),
                map_index,
                self.randomize_spawn,
            );
            for (&loot_id, dropped) in &repr.loot {
                session.loot.insert(loot_id, *dropped);
                self.next_loot_id = self.next_loot_id.max(loot_id + 1);
            }
            self.sessions.insert(session_id, session);
            self.session_by_map.insert(repr.map_id.clone(), session_id);
            self.next_session_id = self.next_session_id.max(session_id + 1);
        }

        for (&player_id, repr) in &data.players {
            if !self.map_index.contains_key(&repr.map_id) {
                return Err(SnapshotError::Corrupt(format!(
                    "snapshot references unknown map {}",
                    repr.map_id
                )));
            }
            let session_id = self.get_or_create_session(&repr.map_id);
            let mut avatar = Avatar::new(
                player_id,
                repr.name.clone(),
                repr.token.clone(),
                repr.map_id.clone(),
                repr.position,
            );
            avatar.velocity = repr.velocity;
            avatar.facing = repr.facing;
            avatar.score = repr.score;
            avatar.idle_time_ms = repr.idle_time_ms;
            avatar.total_time_ms = repr.total_time_ms;
            avatar.bag = repr.bag.clone();
            for item in &avatar.bag {
                self.next_loot_id = self.next_loot_id.max(item.id + 1);
            }

            let session = self
                .sessions
                .get_mut(&session_id)
                .expect("session was just created");
            session.insert_avatar(avatar);
            self.players_by_token
                .insert(repr.token.clone(), player_id);
            self.players.insert(
                player_id,
                PlayerEntry {
                    token: repr.token.clone(),
                    session_id,
                },
            );
            self.next_player_id = self.next_player_id.max(player_id + 1);
        }

        info!(
            players = data.players.len(),
            sessions = data.sessions.len(),
            "game state restored"
        );
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write a snapshot next to `path` and atomically rename it into place, so a
/// crash mid-write leaves the previous snapshot intact.
pub fn save_to_file(world: &World, path: &Path) -> Result<(), SnapshotError> {
    let temp = temp_path(path);
    let mut writer = BufWriter::new(File::create(&temp)?);
    world.snapshot(&mut writer)?;
    writer.flush()?;
    drop(writer);
    fs::rename(&temp, path)?;
    Ok(())
}

/// Restore world state from `path`. A missing file is not an error: the
/// server simply starts with a fresh world.
pub fn restore_from_file(world: &mut World, path: &Path) -> Result<(), SnapshotError> {
    if !path.exists() {
        return Ok(());
    }
    let file = File::open(path)?;
    world.restore(BufReader::new(file))
}
