//! The world: map registry, sessions, players and the top-level tick.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::avatar::Avatar;
use crate::geom::Direction;
use crate::loot::{LootGenerator, LootGeneratorConfig};
use crate::map::Map;
use crate::session::GameSession;

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("map {0} already exists")]
    DuplicateMap(String),
    #[error("unknown map {0}")]
    UnknownMap(String),
    #[error("unknown token")]
    UnknownToken,
}

/// Leaderboard record emitted exactly once when an avatar retires.
#[derive(Debug, Clone, PartialEq)]
pub struct RetiredPlayer {
    pub name: String,
    /// Total time in game, seconds.
    pub play_time: f64,
    pub score: i32,
}

/// Credentials handed back to a freshly joined player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinInfo {
    pub player_id: i32,
    pub token: String,
}

#[derive(Debug, Clone)]
pub(crate) struct PlayerEntry {
    pub(crate) token: String,
    pub(crate) session_id: i32,
}

type RetirementHook = Box<dyn FnMut(RetiredPlayer) + Send>;
type TickObserver = Box<dyn FnMut(f64) + Send>;

/// The collection of sessions plus the registries binding players to them.
///
/// The world exclusively owns its sessions; each session owns its avatars
/// and loot. The player registries hold ids only and resolve avatars through
/// the owning session, so there is a single owner for every piece of state.
pub struct World {
    pub(crate) maps: Vec<Map>,
    pub(crate) map_index: HashMap<String, usize>,
    pub(crate) sessions: BTreeMap<i32, GameSession>,
    pub(crate) session_by_map: HashMap<String, i32>,
    pub(crate) players_by_token: HashMap<String, i32>,
    pub(crate) players: BTreeMap<i32, PlayerEntry>,
    pub(crate) next_player_id: i32,
    pub(crate) next_session_id: i32,
    pub(crate) next_loot_id: i64,
    loot_generator: LootGenerator,
    pub(crate) randomize_spawn: bool,
    retirement_hook: Option<RetirementHook>,
    tick_observers: Vec<TickObserver>,
    token_rng: StdRng,
}

impl World {
    pub fn new(loot_config: LootGeneratorConfig) -> Self {
        Self {
            maps: Vec::new(),
            map_index: HashMap::new(),
            sessions: BTreeMap::new(),
            session_by_map: HashMap::new(),
            players_by_token: HashMap::new(),
            players: BTreeMap::new(),
            next_player_id: 1,
            next_session_id: 1,
            next_loot_id: 0,
            loot_generator: LootGenerator::new(loot_config),
            randomize_spawn: false,
            retirement_hook: None,
            tick_observers: Vec::new(),
            token_rng: StdRng::from_entropy(),
        }
    }

    pub fn set_randomize_spawn(&mut self, randomize: bool) {
        self.randomize_spawn = randomize;
    }

    /// Replace the loot generator's random source, e.g. to add jitter.
    pub fn set_loot_random(
        &mut self,
        config: LootGeneratorConfig,
        random: impl FnMut() -> f64 + Send + 'static,
    ) {
        self.loot_generator = LootGenerator::with_random(config, random);
    }

    /// Install the sink that receives one record per retired player.
    pub fn set_retirement_hook(&mut self, hook: impl FnMut(RetiredPlayer) + Send + 'static) {
        self.retirement_hook = Some(Box::new(hook));
    }

    /// Observers run after every tick, in registration order.
    pub fn add_tick_observer(&mut self, observer: impl FnMut(f64) + Send + 'static) {
        self.tick_observers.push(Box::new(observer));
    }

    pub fn add_map(&mut self, map: Map) -> Result<(), WorldError> {
        if self.map_index.contains_key(map.id()) {
            return Err(WorldError::DuplicateMap(map.id().to_string()));
        }
        self.map_index.insert(map.id().to_string(), self.maps.len());
        self.maps.push(map);
        Ok(())
    }

    pub fn maps(&self) -> &[Map] {
        &self.maps
    }

    pub fn find_map(&self, id: &str) -> Option<&Map> {
        self.map_index.get(id).map(|&index| &self.maps[index])
    }

    /// Add a player to the map's session, creating the session on first
    /// join. Returns the player id and its freshly minted 32-hex token.
    pub fn join(&mut self, name: &str, map_id: &str) -> Result<JoinInfo, WorldError> {
        if !self.map_index.contains_key(map_id) {
            return Err(WorldError::UnknownMap(map_id.to_string()));
        }
        let session_id = self.get_or_create_session(map_id);
        let player_id = self.next_player_id;
        self.next_player_id += 1;
        let token = self.generate_token();

        let session = self
            .sessions
            .get_mut(&session_id)
            .expect("session was just created");
        let map = &self.maps[session.map_index()];
        let spawn = session.spawn_position(map);
        session.insert_avatar(Avatar::new(player_id, name, token.clone(), map_id, spawn));

        self.players_by_token.insert(token.clone(), player_id);
        self.players
            .insert(player_id, PlayerEntry { token: token.clone(), session_id });

        info!(player_id, map_id, name, "player joined");
        Ok(JoinInfo { player_id, token })
    }

    pub(crate) fn get_or_create_session(&mut self, map_id: &str) -> i32 {
        if let Some(&session_id) = self.session_by_map.get(map_id) {
            return session_id;
        }
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        let map_index = self.map_index[map_id];
        self.sessions.insert(
            session_id,
            GameSession::new(session_id, map_id.to_string(), map_index, self.randomize_spawn),
        );
        self.session_by_map.insert(map_id.to_string(), session_id);
        session_id
    }

    pub fn session_for_token(&self, token: &str) -> Option<&GameSession> {
        let player_id = self.players_by_token.get(token)?;
        let entry = self.players.get(player_id)?;
        self.sessions.get(&entry.session_id)
    }

    pub fn player_by_token(&self, token: &str) -> Option<&Avatar> {
        let &player_id = self.players_by_token.get(token)?;
        self.session_for_token(token)?.avatar(player_id)
    }

    /// Apply a movement command to the avatar behind `token`.
    pub fn move_player(
        &mut self,
        token: &str,
        command: Option<Direction>,
    ) -> Result<(), WorldError> {
        let &player_id = self
            .players_by_token
            .get(token)
            .ok_or(WorldError::UnknownToken)?;
        let entry = self.players.get(&player_id).ok_or(WorldError::UnknownToken)?;
        let session = self
            .sessions
            .get_mut(&entry.session_id)
            .ok_or(WorldError::UnknownToken)?;
        let speed = self.maps[session.map_index()].speed();
        let avatar = session.avatar_mut(player_id).ok_or(WorldError::UnknownToken)?;
        avatar.set_direction(command, speed);
        Ok(())
    }

    /// Advance every session by `delta_ms`, in session-id order, then fire
    /// retirement records and tick observers.
    pub fn advance(&mut self, delta_ms: f64) {
        let mut retired = Vec::new();
        for session in self.sessions.values_mut() {
            let map = &self.maps[session.map_index()];
            retired.extend(session.advance(
                delta_ms,
                map,
                &mut self.loot_generator,
                &mut self.next_loot_id,
            ));
        }

        for avatar in retired {
            self.players_by_token.remove(avatar.token());
            self.players.remove(&avatar.id());
            let record = RetiredPlayer {
                name: avatar.name().to_string(),
                play_time: avatar.total_time_ms() / 1000.0,
                score: avatar.score(),
            };
            debug!(name = %record.name, score = record.score, "player retired");
            if let Some(hook) = &mut self.retirement_hook {
                hook(record);
            }
        }

        for observer in &mut self.tick_observers {
            observer(delta_ms);
        }
    }

    fn generate_token(&mut self) -> String {
        format!(
            "{:016x}{:016x}",
            self.token_rng.gen::<u64>(),
            self.token_rng.gen::<u64>()
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::geom::Point;
    use crate::map::Road;

    fn test_world(idle_limit_ms: f64) -> World {
        let mut world = World::new(LootGeneratorConfig {
            period_ms: 5_000.0,
            probability: 0.0,
        });
        let mut map = Map::new("town", "Town");
        map.add_road(Road::horizontal(Point { x: 0, y: 0 }, 10));
        map.set_speed(0.001);
        map.set_idle_limit_ms(idle_limit_ms);
        map.set_loot_values(vec![5]);
        world.add_map(map).unwrap();
        world
    }

    #[test]
    fn test_duplicate_map_rejected() {
        let mut world = test_world(60_000.0);
        let map = Map::new("town", "Town again");
        assert!(matches!(world.add_map(map), Err(WorldError::DuplicateMap(_))));
    }

    #[test]
    fn test_join_issues_unique_hex_tokens() {
        let mut world = test_world(60_000.0);
        let first = world.join("A", "town").unwrap();
        let second = world.join("B", "town").unwrap();

        assert_eq!(first.player_id, 1);
        assert_eq!(second.player_id, 2);
        assert_ne!(first.token, second.token);
        for info in [&first, &second] {
            assert_eq!(info.token.len(), 32);
            assert!(info.token.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_join_unknown_map_fails() {
        let mut world = test_world(60_000.0);
        assert!(matches!(
            world.join("A", "nowhere"),
            Err(WorldError::UnknownMap(_))
        ));
    }

    #[test]
    fn test_one_session_per_map() {
        let mut world = test_world(60_000.0);
        world.join("A", "town").unwrap();
        world.join("B", "town").unwrap();
        assert_eq!(world.sessions.len(), 1);
        assert_eq!(world.sessions[&1].avatars().count(), 2);
    }

    #[test]
    fn test_token_resolves_to_its_avatar() {
        let mut world = test_world(60_000.0);
        let info = world.join("A", "town").unwrap();

        let avatar = world.player_by_token(&info.token).unwrap();
        assert_eq!(avatar.id(), info.player_id);
        assert_eq!(avatar.token(), info.token);
        assert!(world.player_by_token("ffffffffffffffffffffffffffffffff").is_none());
    }

    #[test]
    fn test_spawn_at_first_road_start() {
        let mut world = test_world(60_000.0);
        let info = world.join("A", "town").unwrap();
        let avatar = world.player_by_token(&info.token).unwrap();
        assert_eq!(avatar.position(), crate::geom::Position { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_move_and_advance_updates_position() {
        let mut world = test_world(60_000.0);
        let info = world.join("A", "town").unwrap();
        world.move_player(&info.token, Some(Direction::East)).unwrap();
        world.advance(3_000.0);

        let avatar = world.player_by_token(&info.token).unwrap();
        assert!((avatar.position().x - 3.0).abs() < crate::geom::EPSILON);
    }

    #[test]
    fn test_idle_player_retires_through_hook() {
        let mut world = test_world(1_000.0);
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        world.set_retirement_hook(move |record| sink.lock().unwrap().push(record));

        let info = world.join("A", "town").unwrap();
        world.advance(1_500.0);

        assert!(world.player_by_token(&info.token).is_none());
        assert!(world.players.is_empty());
        let records = records.lock().unwrap();
        assert_eq!(
            *records,
            vec![RetiredPlayer {
                name: "A".to_string(),
                play_time: 1.0,
                score: 0
            }]
        );
    }

    #[test]
    fn test_tick_observers_run_in_registration_order() {
        let mut world = test_world(60_000.0);
        let calls = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let calls = calls.clone();
            world.add_tick_observer(move |delta| calls.lock().unwrap().push((tag, delta)));
        }
        world.advance(250.0);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("first", 250.0), ("second", 250.0)]
        );
    }
}
