//! Per-map simulation container and the tick algorithm.
//!
//! One session exists per map. Advancing a session by a time delta moves
//! every avatar along its road (clamped at road ends), resolves pickups and
//! office drop-offs in the order the avatars sweep over them, removes
//! retired avatars and finally spawns new loot.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::avatar::{Avatar, TickOutcome};
use crate::collision::{find_gather_events, GatherField, Gatherer, Item};
use crate::geom::{Position, EPSILON};
use crate::loot::{DroppedLoot, LootGenerator, LootItem};
use crate::map::Map;

/// Sweep width of a moving avatar.
const GATHER_WIDTH: f64 = 0.3;
/// Pickup radius of an office.
const OFFICE_WIDTH: f64 = 0.25;

/// One avatar's planned motion for a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveResult {
    pub start: Position,
    pub end: Position,
    /// Time actually spent moving, <= the tick delta when clamped at a road
    /// end.
    pub duration_ms: f64,
    pub reached_boundary: bool,
}

/// All live state of one map's simulation.
pub struct GameSession {
    pub(crate) id: i32,
    pub(crate) map_id: String,
    pub(crate) map_index: usize,
    pub(crate) avatars: BTreeMap<i32, Avatar>,
    pub(crate) loot: BTreeMap<i64, DroppedLoot>,
    randomize_spawn: bool,
    rng: StdRng,
}

impl GameSession {
    pub(crate) fn new(id: i32, map_id: String, map_index: usize, randomize_spawn: bool) -> Self {
        Self {
            id,
            map_id,
            map_index,
            avatars: BTreeMap::new(),
            loot: BTreeMap::new(),
            randomize_spawn,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub(crate) fn map_index(&self) -> usize {
        self.map_index
    }

    /// Avatars in ascending player-id order.
    pub fn avatars(&self) -> impl Iterator<Item = &Avatar> {
        self.avatars.values()
    }

    pub fn loot(&self) -> &BTreeMap<i64, DroppedLoot> {
        &self.loot
    }

    pub(crate) fn avatar(&self, id: i32) -> Option<&Avatar> {
        self.avatars.get(&id)
    }

    pub(crate) fn avatar_mut(&mut self, id: i32) -> Option<&mut Avatar> {
        self.avatars.get_mut(&id)
    }

    pub(crate) fn insert_avatar(&mut self, avatar: Avatar) {
        self.avatars.insert(avatar.id(), avatar);
    }

    /// Where a freshly joined avatar appears.
    pub(crate) fn spawn_position(&mut self, map: &Map) -> Position {
        if self.randomize_spawn {
            self.random_road_position(map)
        } else {
            Position::from(map.roads()[0].start())
        }
    }

    fn random_road_position(&mut self, map: &Map) -> Position {
        let roads = map.roads();
        let road = roads[self.rng.gen_range(0..roads.len())];
        let t: f64 = self.rng.gen();
        let start = Position::from(road.start());
        let end = Position::from(road.end());
        if road.is_vertical() {
            Position { x: start.x, y: start.y + t * (end.y - start.y) }
        } else {
            Position { x: start.x + t * (end.x - start.x), y: start.y }
        }
    }

    /// Advance the session by `delta_ms` of simulated time.
    ///
    /// Phases run in a fixed order: motion planning, collision resolution in
    /// ascending time-along-path order, retirement, loot generation. Loot
    /// spawned this tick is therefore never consumed by it. Returns the
    /// avatars that retired, already removed from the session.
    pub(crate) fn advance(
        &mut self,
        delta_ms: f64,
        map: &Map,
        loot_generator: &mut LootGenerator,
        next_loot_id: &mut i64,
    ) -> Vec<Avatar> {
        let mut field = GatherField::default();
        let mut gatherer_to_avatar = Vec::with_capacity(self.avatars.len());
        let mut retiring = Vec::new();

        for (&id, avatar) in self.avatars.iter_mut() {
            let mv = plan_move(map, avatar, delta_ms);
            let outcome = avatar.apply_move(delta_ms, &mv, map.idle_limit_ms());
            field.add_gatherer(Gatherer { start: mv.start, end: mv.end, width: GATHER_WIDTH });
            gatherer_to_avatar.push(id);
            if outcome == TickOutcome::Retire {
                retiring.push(id);
            }
        }

        // Loot first, offices after; office entries carry no loot id.
        let mut item_to_loot = Vec::with_capacity(self.loot.len() + map.offices().len());
        for (&loot_id, dropped) in self.loot.iter() {
            field.add_item(Item { position: dropped.position, width: 0.0 });
            item_to_loot.push(Some(loot_id));
        }
        for office in map.offices() {
            field.add_item(Item {
                position: Position::from(office.position),
                width: OFFICE_WIDTH,
            });
            item_to_loot.push(None);
        }

        for event in find_gather_events(&field) {
            let avatar_id = gatherer_to_avatar[event.gatherer];
            let Some(avatar) = self.avatars.get_mut(&avatar_id) else {
                continue;
            };
            match item_to_loot[event.item] {
                None => avatar.empty_bag(),
                Some(loot_id) => {
                    if avatar.bag().len() < map.bag_capacity() {
                        // First gatherer past the item wins; later events for
                        // the same item find it gone.
                        if let Some(dropped) = self.loot.remove(&loot_id) {
                            avatar.collect(dropped.item);
                        }
                    }
                }
            }
        }

        let retired: Vec<Avatar> = retiring
            .iter()
            .filter_map(|id| self.avatars.remove(id))
            .collect();

        let spawned = loot_generator.generate(delta_ms, self.loot.len(), self.avatars.len());
        for _ in 0..spawned {
            let kind = self.rng.gen_range(0..map.loot_values().len());
            let item = LootItem { id: *next_loot_id, kind, value: map.loot_value(kind) };
            *next_loot_id += 1;
            let position = self.random_road_position(map);
            self.loot.insert(item.id, DroppedLoot { item, position });
        }

        retired
    }
}

/// Pick the avatar's road and compute its clamped endpoint for this tick.
///
/// The road aligned with the velocity axis wins; a stopped avatar falls back
/// to its facing axis, and either way the other road is used when the
/// preferred one is absent, so an avatar parked at an intersection can set
/// off along either axis.
fn plan_move(map: &Map, avatar: &Avatar, delta_ms: f64) -> MoveResult {
    let start = avatar.position();
    let v = avatar.velocity();
    let roads = map.roads_at(start);

    let prefer_horizontal = if v.x != 0.0 {
        true
    } else if v.y != 0.0 {
        false
    } else {
        avatar.facing().is_horizontal()
    };
    let road = if prefer_horizontal {
        roads.horizontal.or(roads.vertical)
    } else {
        roads.vertical.or(roads.horizontal)
    };
    let road = road.expect("avatar position lies on at least one road");

    let naive = Position {
        x: start.x + v.x * delta_ms,
        y: start.y + v.y * delta_ms,
    };
    let end = road.drivable_zone().clamp(naive);
    let reached_boundary =
        (end.x - naive.x).abs() > EPSILON || (end.y - naive.y).abs() > EPSILON;

    let duration_ms = if reached_boundary {
        let traveled = ((end.x - start.x).powi(2) + (end.y - start.y).powi(2)).sqrt();
        let speed = v.magnitude();
        if speed > 0.0 {
            traveled / speed
        } else {
            0.0
        }
    } else if v.is_zero() {
        0.0
    } else {
        delta_ms
    };

    MoveResult { start, end, duration_ms, reached_boundary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Direction, Point};
    use crate::loot::LootGeneratorConfig;
    use crate::map::Road;

    const SPEED: f64 = 0.001; // one unit per second

    fn straight_map(bag_capacity: usize) -> Map {
        let mut map = Map::new("town", "Town");
        map.add_road(Road::horizontal(Point { x: 0, y: 0 }, 10));
        map.set_speed(SPEED);
        map.set_bag_capacity(bag_capacity);
        map.set_idle_limit_ms(60_000.0);
        map.set_loot_values(vec![5, 10]);
        map
    }

    fn quiet_generator() -> LootGenerator {
        LootGenerator::new(LootGeneratorConfig { period_ms: 5_000.0, probability: 0.0 })
    }

    fn session_with_avatar(direction: Option<Direction>, map: &Map) -> GameSession {
        let mut session = GameSession::new(1, map.id().to_string(), 0, false);
        let mut avatar = Avatar::new(1, "A", "token", map.id(), Position { x: 0.0, y: 0.0 });
        if let Some(direction) = direction {
            avatar.set_direction(Some(direction), map.speed());
        }
        session.insert_avatar(avatar);
        session
    }

    fn drop_item(session: &mut GameSession, id: i64, value: i32, x: f64) {
        session.loot.insert(
            id,
            DroppedLoot {
                item: LootItem { id, kind: 0, value },
                position: Position { x, y: 0.0 },
            },
        );
    }

    #[test]
    fn test_moving_avatar_picks_up_loot() {
        let map = straight_map(3);
        let mut session = session_with_avatar(Some(Direction::East), &map);
        drop_item(&mut session, 0, 5, 5.0);
        let mut gen = quiet_generator();
        let mut next_loot_id = 1;

        let retired = session.advance(6_000.0, &map, &mut gen, &mut next_loot_id);

        assert!(retired.is_empty());
        let avatar = session.avatar(1).unwrap();
        assert!((avatar.position().x - 6.0).abs() < EPSILON);
        assert_eq!(avatar.bag().len(), 1);
        assert_eq!(avatar.bag()[0].id, 0);
        assert!(session.loot().is_empty());
    }

    #[test]
    fn test_office_dropoff_at_road_end() {
        let mut map = straight_map(3);
        map.add_office(crate::map::Office {
            id: "o1".to_string(),
            position: Point { x: 10, y: 0 },
            offset: crate::geom::Offset { dx: 0, dy: 0 },
        })
        .unwrap();

        let mut session = session_with_avatar(Some(Direction::East), &map);
        drop_item(&mut session, 0, 5, 5.0);
        let mut gen = quiet_generator();
        let mut next_loot_id = 1;

        session.advance(6_000.0, &map, &mut gen, &mut next_loot_id);
        session.advance(5_000.0, &map, &mut gen, &mut next_loot_id);

        let avatar = session.avatar(1).unwrap();
        // Clamped at the inflated end of the road and stopped there.
        assert!((avatar.position().x - 10.4).abs() < EPSILON);
        assert!(avatar.velocity().is_zero());
        assert!(avatar.bag().is_empty());
        assert_eq!(avatar.score(), 5);
    }

    #[test]
    fn test_pickups_resolve_in_path_order() {
        let map = straight_map(3);
        let mut session = session_with_avatar(Some(Direction::East), &map);
        drop_item(&mut session, 0, 5, 7.0);
        drop_item(&mut session, 1, 10, 3.0);
        let mut gen = quiet_generator();
        let mut next_loot_id = 2;

        session.advance(8_000.0, &map, &mut gen, &mut next_loot_id);

        let avatar = session.avatar(1).unwrap();
        let bag_ids: Vec<i64> = avatar.bag().iter().map(|item| item.id).collect();
        // The item at x=3 is swept first.
        assert_eq!(bag_ids, vec![1, 0]);
    }

    #[test]
    fn test_full_bag_leaves_loot_on_ground() {
        let map = straight_map(1);
        let mut session = session_with_avatar(Some(Direction::East), &map);
        drop_item(&mut session, 0, 5, 3.0);
        drop_item(&mut session, 1, 10, 7.0);
        let mut gen = quiet_generator();
        let mut next_loot_id = 2;

        session.advance(8_000.0, &map, &mut gen, &mut next_loot_id);

        let avatar = session.avatar(1).unwrap();
        assert_eq!(avatar.bag().len(), 1);
        assert_eq!(avatar.bag()[0].id, 0);
        assert!(session.loot().contains_key(&1));
    }

    #[test]
    fn test_stationary_avatar_gathers_nothing() {
        let map = straight_map(3);
        let mut session = session_with_avatar(None, &map);
        drop_item(&mut session, 0, 5, 0.0);
        let mut gen = quiet_generator();
        let mut next_loot_id = 1;

        session.advance(1_000.0, &map, &mut gen, &mut next_loot_id);

        assert!(session.avatar(1).unwrap().bag().is_empty());
        assert_eq!(session.loot().len(), 1);
    }

    #[test]
    fn test_idle_avatar_retires_and_leaves_session() {
        let mut map = straight_map(3);
        map.set_idle_limit_ms(1_000.0);
        let mut session = session_with_avatar(None, &map);
        let mut gen = quiet_generator();
        let mut next_loot_id = 0;

        let retired = session.advance(1_500.0, &map, &mut gen, &mut next_loot_id);

        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].name(), "A");
        assert_eq!(retired[0].total_time_ms(), 1_000.0);
        assert!(session.avatar(1).is_none());
    }

    #[test]
    fn test_loot_spawns_on_roads_with_fresh_ids() {
        let map = straight_map(3);
        let mut session = session_with_avatar(Some(Direction::East), &map);
        let mut gen = LootGenerator::new(LootGeneratorConfig {
            period_ms: 1_000.0,
            probability: 1.0,
        });
        let mut next_loot_id = 42;

        session.advance(10_000.0, &map, &mut gen, &mut next_loot_id);

        assert_eq!(session.loot().len(), 1);
        assert_eq!(next_loot_id, 43);
        let dropped = session.loot().get(&42).unwrap();
        let zone = map.roads()[0].drivable_zone();
        assert!(dropped.position.x >= zone.min_x && dropped.position.x <= zone.max_x);
        assert_eq!(dropped.position.y, 0.0);
        assert_eq!(dropped.item.value, map.loot_value(dropped.item.kind));
    }

    #[test]
    fn test_two_avatars_race_for_one_item() {
        let map = straight_map(3);
        let mut session = GameSession::new(1, map.id().to_string(), 0, false);
        let mut near = Avatar::new(1, "Near", "t1", map.id(), Position { x: 4.0, y: 0.0 });
        near.set_direction(Some(Direction::East), map.speed());
        let mut far = Avatar::new(2, "Far", "t2", map.id(), Position { x: 0.0, y: 0.0 });
        far.set_direction(Some(Direction::East), map.speed());
        session.insert_avatar(near);
        session.insert_avatar(far);
        drop_item(&mut session, 0, 5, 5.0);
        let mut gen = quiet_generator();
        let mut next_loot_id = 1;

        session.advance(6_000.0, &map, &mut gen, &mut next_loot_id);

        // Both sweep over x=5; exactly one ends up with the item.
        let bags: usize = session.avatars().map(|a| a.bag().len()).sum();
        assert_eq!(bags, 1);
        assert!(session.loot().is_empty());
    }
}
