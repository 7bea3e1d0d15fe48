//! Crash Point Generation
//!
//! Samples the multiplier at which a round will crash. One draw per round,
//! taken before growth begins and independent of any betting activity.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;

/// A band of the tiered distribution: draws below `threshold` land
/// uniformly in `[low, high)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrashTier {
    /// Upper bound (exclusive) on the tier-selector draw.
    pub threshold: f64,
    /// Lowest multiplier in the band.
    pub low: f64,
    /// Highest multiplier in the band (exclusive).
    pub high: f64,
}

/// Canonical tiers: 60% / 20% / 17% / 3%.
pub const CRASH_TIERS: [CrashTier; 4] = [
    CrashTier { threshold: 0.60, low: 1.00, high: 2.00 },
    CrashTier { threshold: 0.80, low: 2.00, high: 10.00 },
    CrashTier { threshold: 0.97, low: 10.00, high: 30.00 },
    CrashTier { threshold: 1.00, low: 30.00, high: 100.00 },
];

/// Lowest multiplier any distribution can produce.
pub const MIN_CRASH_POINT: f64 = 1.00;

/// Truncate to two decimal places.
///
/// Truncation (not rounding) keeps every value inside the `[low, high)`
/// band it was drawn from.
#[inline]
pub fn to_cents(value: f64) -> f64 {
    (value * 100.0).floor() / 100.0
}

/// Map a tier-selector draw and an in-tier draw (both in `[0, 1)`) to a
/// crash point.
pub fn tiered_crash_point(tier_draw: f64, value_draw: f64) -> f64 {
    let tier = CRASH_TIERS
        .iter()
        .find(|tier| tier_draw < tier.threshold)
        .unwrap_or(&CRASH_TIERS[CRASH_TIERS.len() - 1]);

    let value = tier.low + value_draw * (tier.high - tier.low);
    // Clamp guards the float edge where value * 100 rounds up to `high`.
    to_cents(value).clamp(tier.low, tier.high - 0.01)
}

// =============================================================================
// WEIGHTED TABLE
// =============================================================================

/// One entry of a discrete weighted-chance table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedEntry {
    /// Crash multiplier produced by this entry.
    pub value: f64,
    /// Relative weight. Weights need not sum to anything in particular.
    pub chance: f64,
}

/// Discrete weighted-chance distribution.
///
/// Sampled by drawing uniformly over the summed weight and walking the
/// table in order until the cumulative weight meets or exceeds the draw.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedTable {
    entries: Vec<WeightedEntry>,
}

impl Default for WeightedTable {
    fn default() -> Self {
        Self::new(vec![
            WeightedEntry { value: 2.5, chance: 40.0 },
            WeightedEntry { value: 5.0, chance: 25.0 },
            WeightedEntry { value: 10.0, chance: 15.0 },
            WeightedEntry { value: 25.0, chance: 9.0 },
            WeightedEntry { value: 50.0, chance: 5.0 },
            WeightedEntry { value: 100.0, chance: 3.0 },
            WeightedEntry { value: 500.0, chance: 1.5 },
            WeightedEntry { value: 1000.0, chance: 1.0 },
            WeightedEntry { value: 5000.0, chance: 0.5 },
        ])
    }
}

impl WeightedTable {
    /// Build a table. Entries with non-positive weight or a value below
    /// 1.00x are dropped.
    pub fn new(entries: Vec<WeightedEntry>) -> Self {
        let entries = entries
            .into_iter()
            .filter(|e| e.chance > 0.0 && e.value >= MIN_CRASH_POINT)
            .collect();
        Self { entries }
    }

    /// Table entries in walk order.
    pub fn entries(&self) -> &[WeightedEntry] {
        &self.entries
    }

    /// Sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.chance).sum()
    }

    /// Pick the entry for a unit draw in `[0, 1)`.
    ///
    /// An empty table yields the minimum crash point.
    pub fn pick(&self, unit_draw: f64) -> f64 {
        let target = unit_draw * self.total_weight();
        let mut cumulative = 0.0;

        for entry in &self.entries {
            cumulative += entry.chance;
            if cumulative >= target {
                return entry.value;
            }
        }

        self.entries
            .last()
            .map(|e| e.value)
            .unwrap_or(MIN_CRASH_POINT)
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Which distribution a generator samples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrashDistribution {
    /// Four uniform bands selected by a single draw.
    #[default]
    Tiered,
    /// Discrete weighted-chance table.
    Weighted(WeightedTable),
}

/// Produces one crash multiplier per round.
#[derive(Clone, Debug, Default)]
pub struct CrashPointGenerator {
    distribution: CrashDistribution,
}

impl CrashPointGenerator {
    /// Create a generator for the given distribution.
    pub fn new(distribution: CrashDistribution) -> Self {
        Self { distribution }
    }

    /// Active distribution.
    pub fn distribution(&self) -> &CrashDistribution {
        &self.distribution
    }

    /// Sample a crash point. Always a positive multiplier with two decimals.
    pub fn generate(&self, rng: &mut DeterministicRng) -> f64 {
        match &self.distribution {
            CrashDistribution::Tiered => {
                let tier_draw = rng.next_unit();
                let value_draw = rng.next_unit();
                tiered_crash_point(tier_draw, value_draw)
            }
            CrashDistribution::Weighted(table) => table.pick(rng.next_unit()),
        }
    }
}
