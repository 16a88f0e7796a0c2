//! Per-player kinematic state and its transitions.

use crate::geom::{Direction, Position, Velocity};
use crate::loot::LootItem;
use crate::session::MoveResult;

/// What an avatar did with the tick it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Retire,
}

/// A player's in-world entity.
///
/// Position always lies inside the drivable zone of at least one road of the
/// avatar's map; the session guarantees this by clamping every move. Velocity
/// is either zero or the map speed along one axis.
#[derive(Debug, Clone)]
pub struct Avatar {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) token: String,
    pub(crate) map_id: String,
    pub(crate) position: Position,
    pub(crate) velocity: Velocity,
    pub(crate) facing: Direction,
    pub(crate) bag: Vec<LootItem>,
    pub(crate) score: i32,
    pub(crate) idle_time_ms: f64,
    pub(crate) total_time_ms: f64,
}

impl Avatar {
    pub(crate) fn new(
        id: i32,
        name: impl Into<String>,
        token: impl Into<String>,
        map_id: impl Into<String>,
        position: Position,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            token: token.into(),
            map_id: map_id.into(),
            position,
            velocity: Velocity::ZERO,
            facing: Direction::North,
            bag: Vec::new(),
            score: 0,
            idle_time_ms: 0.0,
            total_time_ms: 0.0,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn velocity(&self) -> Velocity {
        self.velocity
    }

    pub fn facing(&self) -> Direction {
        self.facing
    }

    pub fn bag(&self) -> &[LootItem] {
        &self.bag
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn idle_time_ms(&self) -> f64 {
        self.idle_time_ms
    }

    pub fn total_time_ms(&self) -> f64 {
        self.total_time_ms
    }

    /// Apply a movement command. `None` stops the avatar but keeps it facing
    /// the way it was; any direction also resets the idle timer.
    pub fn set_direction(&mut self, command: Option<Direction>, speed: f64) {
        match command {
            None => self.velocity = Velocity::ZERO,
            Some(direction) => {
                self.facing = direction;
                self.velocity = match direction {
                    Direction::North => Velocity { x: 0.0, y: -speed },
                    Direction::South => Velocity { x: 0.0, y: speed },
                    Direction::West => Velocity { x: -speed, y: 0.0 },
                    Direction::East => Velocity { x: speed, y: 0.0 },
                };
                self.idle_time_ms = 0.0;
            }
        }
    }

    /// Absorb the session's planned move for this tick.
    ///
    /// Time not spent moving counts as idle time. Hitting a road boundary
    /// stops the avatar. Once the idle timer reaches the map's limit the
    /// avatar retires, and only the time up to that limit counts toward its
    /// total play time.
    pub(crate) fn apply_move(
        &mut self,
        delta_ms: f64,
        mv: &MoveResult,
        idle_limit_ms: f64,
    ) -> TickOutcome {
        let until_retirement = idle_limit_ms - self.idle_time_ms;
        self.idle_time_ms += delta_ms - mv.duration_ms;

        if mv.reached_boundary {
            self.velocity = Velocity::ZERO;
        }
        self.position = mv.end;

        if self.idle_time_ms >= idle_limit_ms {
            self.total_time_ms += until_retirement;
            TickOutcome::Retire
        } else {
            self.total_time_ms += delta_ms;
            TickOutcome::Continue
        }
    }

    pub(crate) fn collect(&mut self, item: LootItem) {
        self.bag.push(item);
    }

    /// Deliver the bag: credit every carried item's value and clear it.
    pub(crate) fn empty_bag(&mut self) {
        self.score += self.bag.iter().map(|item| item.value).sum::<i32>();
        self.bag.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avatar_at(x: f64, y: f64) -> Avatar {
        Avatar::new(1, "Rex", "deadbeef", "town", Position { x, y })
    }

    #[test]
    fn test_set_direction_updates_velocity_and_facing() {
        let mut avatar = avatar_at(0.0, 0.0);
        avatar.set_direction(Some(Direction::East), 0.002);
        assert_eq!(avatar.velocity(), Velocity { x: 0.002, y: 0.0 });
        assert_eq!(avatar.facing(), Direction::East);
    }

    #[test]
    fn test_stop_preserves_facing() {
        let mut avatar = avatar_at(0.0, 0.0);
        avatar.set_direction(Some(Direction::South), 0.001);
        avatar.set_direction(None, 0.001);
        assert!(avatar.velocity().is_zero());
        assert_eq!(avatar.facing(), Direction::South);
    }

    #[test]
    fn test_direction_command_resets_idle_timer() {
        let mut avatar = avatar_at(0.0, 0.0);
        avatar.idle_time_ms = 500.0;
        avatar.set_direction(Some(Direction::North), 0.001);
        assert_eq!(avatar.idle_time_ms(), 0.0);

        avatar.idle_time_ms = 500.0;
        avatar.set_direction(None, 0.001);
        assert_eq!(avatar.idle_time_ms(), 500.0);
    }

    #[test]
    fn test_apply_move_accrues_idle_when_stationary() {
        let mut avatar = avatar_at(2.0, 0.0);
        let mv = MoveResult {
            start: avatar.position(),
            end: avatar.position(),
            duration_ms: 0.0,
            reached_boundary: false,
        };
        let outcome = avatar.apply_move(400.0, &mv, 1_000.0);
        assert_eq!(outcome, TickOutcome::Continue);
        assert_eq!(avatar.idle_time_ms(), 400.0);
        assert_eq!(avatar.total_time_ms(), 400.0);
    }

    #[test]
    fn test_boundary_stop_zeroes_velocity() {
        let mut avatar = avatar_at(9.0, 0.0);
        avatar.set_direction(Some(Direction::East), 0.001);
        let mv = MoveResult {
            start: avatar.position(),
            end: Position { x: 10.4, y: 0.0 },
            duration_ms: 1_400.0,
            reached_boundary: true,
        };
        avatar.apply_move(2_000.0, &mv, 60_000.0);
        assert!(avatar.velocity().is_zero());
        assert_eq!(avatar.position(), Position { x: 10.4, y: 0.0 });
        // The 600ms not spent moving went into the idle timer.
        assert!((avatar.idle_time_ms() - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_limit_retires_with_capped_play_time() {
        let mut avatar = avatar_at(0.0, 0.0);
        let mv = MoveResult {
            start: avatar.position(),
            end: avatar.position(),
            duration_ms: 0.0,
            reached_boundary: false,
        };
        let outcome = avatar.apply_move(1_500.0, &mv, 1_000.0);
        assert_eq!(outcome, TickOutcome::Retire);
        // Only the time up to the idle limit is credited.
        assert_eq!(avatar.total_time_ms(), 1_000.0);
    }

    #[test]
    fn test_empty_bag_credits_score() {
        let mut avatar = avatar_at(0.0, 0.0);
        avatar.collect(LootItem { id: 0, kind: 0, value: 5 });
        avatar.collect(LootItem { id: 1, kind: 1, value: 7 });
        avatar.empty_bag();
        assert_eq!(avatar.score(), 12);
        assert!(avatar.bag().is_empty());

        // Delivering an empty bag changes nothing.
        avatar.empty_bag();
        assert_eq!(avatar.score(), 12);
    }
}
