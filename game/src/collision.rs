//! Sweep collision detection between moving gatherers and stationary items.
//!
//! A gatherer is the segment an avatar travels during one tick; an item is a
//! point with a pickup radius (loot, offices). For every pair whose minimum
//! distance is within the combined widths we emit an event stamped with the
//! projection ratio of the item onto the segment, so sorting by `time` yields
//! the order in which the gatherer passes the items.

use crate::geom::Position;

/// A stationary pickup target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Item {
    pub position: Position,
    pub width: f64,
}

/// The path swept by a moving avatar during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gatherer {
    pub start: Position,
    pub end: Position,
    pub width: f64,
}

impl Gatherer {
    fn is_stationary(&self) -> bool {
        self.start.x == self.end.x && self.start.y == self.end.y
    }
}

/// Result of projecting an item onto a gatherer's path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionResult {
    pub sq_distance: f64,
    pub proj_ratio: f64,
}

impl CollectionResult {
    pub fn is_collected(&self, collect_radius: f64) -> bool {
        self.proj_ratio >= 0.0
            && self.proj_ratio <= 1.0
            && self.sq_distance <= collect_radius * collect_radius
    }
}

/// A single (gatherer, item) interaction, ordered by `time` along the path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatheringEvent {
    pub gatherer: usize,
    pub item: usize,
    pub sq_distance: f64,
    pub time: f64,
}

/// Source of gatherers and items for one collision pass.
pub trait GatherProvider {
    fn items(&self) -> &[Item];
    fn gatherers(&self) -> &[Gatherer];
}

/// Plain Vec-backed provider assembled per tick.
#[derive(Debug, Default)]
pub struct GatherField {
    items: Vec<Item>,
    gatherers: Vec<Gatherer>,
}

impl GatherField {
    pub fn add_item(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn add_gatherer(&mut self, gatherer: Gatherer) {
        self.gatherers.push(gatherer);
    }
}

impl GatherProvider for GatherField {
    fn items(&self) -> &[Item] {
        &self.items
    }

    fn gatherers(&self) -> &[Gatherer] {
        &self.gatherers
    }
}

/// Project point `c` onto segment `a -> b`.
///
/// Precondition: the segment must have nonzero length.
pub fn try_collect_point(a: Position, b: Position, c: Position) -> CollectionResult {
    debug_assert!(a.x != b.x || a.y != b.y, "zero-length gatherer segment");
    let u_x = c.x - a.x;
    let u_y = c.y - a.y;
    let v_x = b.x - a.x;
    let v_y = b.y - a.y;
    let u_dot_v = u_x * v_x + u_y * v_y;
    let u_len2 = u_x * u_x + u_y * u_y;
    let v_len2 = v_x * v_x + v_y * v_y;

    CollectionResult {
        sq_distance: u_len2 - (u_dot_v * u_dot_v) / v_len2,
        proj_ratio: u_dot_v / v_len2,
    }
}

/// All (gatherer, item) interactions, sorted ascending by time-along-path.
///
/// Stationary gatherers are skipped: an avatar that did not move this tick
/// gathers nothing. Ties in `time` keep their relative order; the consumer
/// processes items exclusively so either ordering is acceptable.
pub fn find_gather_events(provider: &impl GatherProvider) -> Vec<GatheringEvent> {
    let mut events = Vec::new();
    for (g_idx, gatherer) in provider.gatherers().iter().enumerate() {
        if gatherer.is_stationary() {
            continue;
        }
        for (i_idx, item) in provider.items().iter().enumerate() {
            let result = try_collect_point(gatherer.start, gatherer.end, item.position);
            if result.is_collected(item.width + gatherer.width) {
                events.push(GatheringEvent {
                    gatherer: g_idx,
                    item: i_idx,
                    sq_distance: result.sq_distance,
                    time: result.proj_ratio,
                });
            }
        }
    }
    events.sort_by(|lhs, rhs| lhs.time.total_cmp(&rhs.time));
    events
}
