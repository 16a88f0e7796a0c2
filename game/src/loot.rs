//! Loot items and the stochastic generator that spawns them.

use serde::{Deserialize, Serialize};

use crate::geom::Position;

/// A collectible item. `id` is globally unique and monotonically increasing
/// across the whole world; `kind` indexes the map's loot-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootItem {
    pub id: i64,
    pub kind: usize,
    pub value: i32,
}

/// A loot item lying on a road, waiting to be picked up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DroppedLoot {
    pub item: LootItem,
    pub position: Position,
}

/// Loot generator parameters, already converted to milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LootGeneratorConfig {
    pub period_ms: f64,
    pub probability: f64,
}

/// Decides how many loot items to spawn per tick.
///
/// The spawn probability compounds over the time elapsed since the last
/// spawn: `1 - (1 - p)^(elapsed / period)`, so for small probabilities the
/// expected arrival rate grows linearly with the elapsed fraction of the
/// period. Output is capped by the current loot shortage - there is never
/// more loot on the ground than there are players to carry it.
///
/// The random multiplier defaults to the constant 1.0, which makes the
/// generator fully deterministic; deployments that want jitter can inject
/// their own source with [`LootGenerator::with_random`].
pub struct LootGenerator {
    period_ms: f64,
    probability: f64,
    time_without_loot_ms: f64,
    random: Box<dyn FnMut() -> f64 + Send>,
}

impl LootGenerator {
    pub fn new(config: LootGeneratorConfig) -> Self {
        Self::with_random(config, || 1.0)
    }

    pub fn with_random(
        config: LootGeneratorConfig,
        random: impl FnMut() -> f64 + Send + 'static,
    ) -> Self {
        Self {
            period_ms: config.period_ms,
            probability: config.probability,
            time_without_loot_ms: 0.0,
            random: Box::new(random),
        }
    }

    /// Number of items to spawn after `delta_ms` of simulated time, given the
    /// current loot count and the number of players in the session.
    pub fn generate(&mut self, delta_ms: f64, loot_count: usize, looter_count: usize) -> usize {
        self.time_without_loot_ms += delta_ms;

        let shortage = looter_count.saturating_sub(loot_count);
        let ratio = self.time_without_loot_ms / self.period_ms;
        let probability = (1.0 - (1.0 - self.probability).powf(ratio)).clamp(0.0, 1.0);
        let spawned = (shortage as f64 * probability * (self.random)()).round();
        let spawned = if spawned > 0.0 { spawned as usize } else { 0 };

        if spawned > 0 {
            self.time_without_loot_ms = 0.0;
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(period_ms: f64, probability: f64) -> LootGenerator {
        LootGenerator::new(LootGeneratorConfig { period_ms, probability })
    }

    #[test]
    fn test_full_period_spawns_expected_share() {
        let mut gen = generator(5_000.0, 0.5);
        // One full period, shortage of one: 1 * 0.5 rounds up to a spawn.
        assert_eq!(gen.generate(5_000.0, 0, 1), 1);
    }

    #[test]
    fn test_probability_compounds_across_ticks() {
        let mut gen = generator(5_000.0, 0.5);
        // Half a period: p = 1 - 0.5^0.5 ~= 0.293, shortage 4 -> ~1.17 -> 1.
        assert_eq!(gen.generate(2_500.0, 0, 4), 1);
        // Timer reset after a spawn; same delta again with shortage 3 -> ~0.88 -> 1.
        assert_eq!(gen.generate(2_500.0, 1, 4), 1);
    }

    #[test]
    fn test_no_spawn_keeps_accumulating_time() {
        let mut gen = generator(10_000.0, 0.1);
        // Tiny elapsed fraction: rounds to zero, timer must keep growing.
        assert_eq!(gen.generate(100.0, 0, 1), 0);
        assert_eq!(gen.generate(100.0, 0, 1), 0);
        assert!((gen.time_without_loot_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_never_spawns_beyond_shortage() {
        let mut gen = generator(1_000.0, 1.0);
        // Certain spawn over many periods is still capped by the shortage.
        assert_eq!(gen.generate(100_000.0, 2, 5), 3);
        assert_eq!(gen.generate(100_000.0, 5, 5), 0);
        assert_eq!(gen.generate(100_000.0, 7, 5), 0);
    }

    #[test]
    fn test_zero_probability_never_spawns() {
        let mut gen = generator(1_000.0, 0.0);
        assert_eq!(gen.generate(1_000_000.0, 0, 10), 0);
    }

    #[test]
    fn test_injected_random_scales_output() {
        let mut gen = LootGenerator::with_random(
            LootGeneratorConfig { period_ms: 1_000.0, probability: 1.0 },
            || 0.5,
        );
        assert_eq!(gen.generate(1_000.0, 0, 4), 2);
    }
}
