//! Geometry primitives shared by the whole engine.
//!
//! Maps are authored on an integer grid ([`Point`], [`Size`], [`Offset`])
//! while avatars and loot live in continuous space ([`Position`],
//! [`Velocity`]). Keeping the two apart makes it impossible to feed a raw
//! grid coordinate where a simulated coordinate is expected.

use serde::{Deserialize, Serialize};

/// Comparison tolerance for continuous coordinates.
pub const EPSILON: f64 = 1e-6;

/// A point on the integer map grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Width/height of a building footprint, in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Visual offset of an office sprite relative to its grid position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

/// A position in continuous world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl From<Point> for Position {
    fn from(p: Point) -> Self {
        Self {
            x: f64::from(p.x),
            y: f64::from(p.y),
        }
    }
}

/// Velocity in world units per millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f64,
    pub y: f64,
}

impl Velocity {
    pub const ZERO: Velocity = Velocity { x: 0.0, y: 0.0 };

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Scalar speed, units per millisecond.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

/// The four directions an avatar can face.
///
/// North is negative y, matching the screen-space convention of the maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::West | Direction::East)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_to_position() {
        let pos = Position::from(Point { x: 3, y: -2 });
        assert_eq!(pos, Position { x: 3.0, y: -2.0 });
    }

    #[test]
    fn test_velocity_magnitude() {
        let v = Velocity { x: 3.0, y: 4.0 };
        assert!((v.magnitude() - 5.0).abs() < EPSILON);
        assert!(Velocity::ZERO.is_zero());
    }

    #[test]
    fn test_direction_axis() {
        assert!(Direction::East.is_horizontal());
        assert!(Direction::West.is_horizontal());
        assert!(!Direction::North.is_horizontal());
        assert!(!Direction::South.is_horizontal());
    }
}
