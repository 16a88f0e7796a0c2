//! Static map geometry: roads, buildings, offices and the per-map settings.
//!
//! Roads are axis-aligned segments on the integer grid. Each road owns a
//! *drivable zone* - the segment inflated by [`ROAD_HALF_WIDTH`] on every
//! side - which is the only area avatars on that road may occupy. The map
//! indexes its roads by row and by column so that looking up the roads under
//! a continuous position is O(log) in the number of occupied rows/columns.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::geom::{Offset, Point, Position, Size, EPSILON};

/// Half-width of the drivable corridor around a road's center line.
pub const ROAD_HALF_WIDTH: f64 = 0.4;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("office {0} already exists")]
    DuplicateOffice(String),
}

/// An oriented axis-aligned road segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Road {
    start: Point,
    end: Point,
}

impl Road {
    pub fn horizontal(start: Point, end_x: i32) -> Self {
        Self {
            start,
            end: Point { x: end_x, y: start.y },
        }
    }

    pub fn vertical(start: Point, end_y: i32) -> Self {
        Self {
            start,
            end: Point { x: start.x, y: end_y },
        }
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn end(&self) -> Point {
        self.end
    }

    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }

    /// The legal area for avatars on this road.
    pub fn drivable_zone(&self) -> DrivableZone {
        DrivableZone {
            min_x: f64::from(self.start.x.min(self.end.x)) - ROAD_HALF_WIDTH,
            max_x: f64::from(self.start.x.max(self.end.x)) + ROAD_HALF_WIDTH,
            min_y: f64::from(self.start.y.min(self.end.y)) - ROAD_HALF_WIDTH,
            max_y: f64::from(self.start.y.max(self.end.y)) + ROAD_HALF_WIDTH,
        }
    }
}

/// Rectangle an avatar on a road is clamped into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivableZone {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl DrivableZone {
    pub fn clamp(&self, pos: Position) -> Position {
        Position {
            x: pos.x.clamp(self.min_x, self.max_x),
            y: pos.y.clamp(self.min_y, self.max_y),
        }
    }
}

/// A building footprint. Informational only: avatars never collide with
/// buildings directly, road clamping keeps them out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Building {
    pub position: Point,
    pub size: Size,
}

/// A loot drop-off point. Touching one empties the avatar's bag into its
/// score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Office {
    pub id: String,
    pub position: Point,
    pub offset: Offset,
}

/// Up to one road per axis found under a position.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoadsAt {
    pub horizontal: Option<Road>,
    pub vertical: Option<Road>,
}

/// True when the fractional part of a coordinate sits strictly inside the
/// (0.4, 0.6) band. An avatar there is crossing the middle of a perpendicular
/// road, so the lookup on the other axis is suppressed until it commits to an
/// intersection.
fn mid_cell(coord: f64) -> bool {
    let frac = coord.fract();
    frac > ROAD_HALF_WIDTH + EPSILON && frac < (1.0 - ROAD_HALF_WIDTH) - EPSILON
}

/// A named game map with its road graph and gameplay settings.
///
/// Speed is stored in units per millisecond and the idle limit in
/// milliseconds; the configuration loader converts from the per-second units
/// of the world file.
#[derive(Debug, Clone)]
pub struct Map {
    id: String,
    name: String,
    roads: Vec<Road>,
    buildings: Vec<Building>,
    offices: Vec<Office>,
    office_index: HashMap<String, usize>,
    horizontal_by_y: BTreeMap<i32, Vec<usize>>,
    vertical_by_x: BTreeMap<i32, Vec<usize>>,
    speed: f64,
    bag_capacity: usize,
    idle_limit_ms: f64,
    loot_values: Vec<i32>,
}

impl Map {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roads: Vec::new(),
            buildings: Vec::new(),
            offices: Vec::new(),
            office_index: HashMap::new(),
            horizontal_by_y: BTreeMap::new(),
            vertical_by_x: BTreeMap::new(),
            speed: 0.001,
            bag_capacity: 3,
            idle_limit_ms: 60_000.0,
            loot_values: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roads(&self) -> &[Road] {
        &self.roads
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn offices(&self) -> &[Office] {
        &self.offices
    }

    /// Avatar speed in units per millisecond.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn bag_capacity(&self) -> usize {
        self.bag_capacity
    }

    pub fn idle_limit_ms(&self) -> f64 {
        self.idle_limit_ms
    }

    pub fn loot_values(&self) -> &[i32] {
        &self.loot_values
    }

    /// Point value of the given loot kind.
    pub fn loot_value(&self, kind: usize) -> i32 {
        self.loot_values.get(kind).copied().unwrap_or(0)
    }

    pub fn set_speed(&mut self, units_per_ms: f64) {
        self.speed = units_per_ms;
    }

    pub fn set_bag_capacity(&mut self, capacity: usize) {
        self.bag_capacity = capacity;
    }

    pub fn set_idle_limit_ms(&mut self, limit_ms: f64) {
        self.idle_limit_ms = limit_ms;
    }

    pub fn set_loot_values(&mut self, values: Vec<i32>) {
        self.loot_values = values;
    }

    pub fn add_road(&mut self, road: Road) {
        let index = self.roads.len();
        if road.is_horizontal() {
            self.horizontal_by_y
                .entry(road.start().y)
                .or_default()
                .push(index);
        } else {
            self.vertical_by_x
                .entry(road.start().x)
                .or_default()
                .push(index);
        }
        self.roads.push(road);
    }

    pub fn add_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    pub fn add_office(&mut self, office: Office) -> Result<(), MapError> {
        if self.office_index.contains_key(&office.id) {
            return Err(MapError::DuplicateOffice(office.id));
        }
        self.office_index
            .insert(office.id.clone(), self.offices.len());
        self.offices.push(office);
        Ok(())
    }

    /// Roads whose drivable zone contains `pos`, at most one per axis.
    ///
    /// A coordinate in the mid-cell band suppresses the lookup on the other
    /// axis, keeping an avatar that is traversing the middle of a road
    /// committed to it until the next intersection.
    pub fn roads_at(&self, pos: Position) -> RoadsAt {
        let mut found = RoadsAt::default();
        let col = pos.x.round() as i32;
        let row = pos.y.round() as i32;

        if !mid_cell(pos.x) {
            if let Some(indices) = self.vertical_by_x.get(&col) {
                for &i in indices {
                    let zone = self.roads[i].drivable_zone();
                    if f64::from(row) >= zone.min_y && f64::from(row) <= zone.max_y {
                        found.vertical = Some(self.roads[i]);
                        break;
                    }
                }
            }
        }
        if !mid_cell(pos.y) {
            if let Some(indices) = self.horizontal_by_y.get(&row) {
                for &i in indices {
                    let zone = self.roads[i].drivable_zone();
                    if f64::from(col) >= zone.min_x && f64::from(col) <= zone.max_x {
                        found.horizontal = Some(self.roads[i]);
                        break;
                    }
                }
            }
        }
        found
    }
}
