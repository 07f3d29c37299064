//! Random draws.
//!
//! Every random decision in the engine goes through [`Dice`]. Production uses
//! [`SeededDice`]; tests script exact outcomes with [`ScriptedDice`].

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::config::{AmountRange, JitterRange, PhRange};

/// Source of random draws.
pub trait Dice: Send + Sync {
    /// Uniform draw in `[0, 1)`.
    fn unit(&self) -> f64;

    /// Uniform integer in `range.min..=range.max`.
    fn between(&self, range: AmountRange) -> u64;

    /// Uniform signed integer in `range.min..=range.max`.
    fn jitter(&self, range: JitterRange) -> i64;

    /// Uniform float in `range.min..=range.max`.
    fn span(&self, range: PhRange) -> f64;

    /// Uniform index in `0..len`. Returns 0 for an empty set.
    fn pick(&self, len: usize) -> usize;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Dice`] backed by a [`SmallRng`].
#[derive(Debug)]
pub struct SeededDice {
    rng: Mutex<SmallRng>,
}

impl SeededDice {
    /// Deterministic dice for a given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }

    /// Dice seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    /// Seeded when `seed` is given, entropy otherwise.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::new)
    }
}

impl Dice for SeededDice {
    fn unit(&self) -> f64 {
        lock(&self.rng).random::<f64>()
    }

    fn between(&self, range: AmountRange) -> u64 {
        let (lo, hi) = (range.min.min(range.max), range.min.max(range.max));
        lock(&self.rng).random_range(lo..=hi)
    }

    fn jitter(&self, range: JitterRange) -> i64 {
        let (lo, hi) = (range.min.min(range.max), range.min.max(range.max));
        lock(&self.rng).random_range(lo..=hi)
    }

    fn span(&self, range: PhRange) -> f64 {
        let (lo, hi) = (range.min.min(range.max), range.min.max(range.max));
        if hi - lo <= f64::EPSILON {
            return lo;
        }
        lock(&self.rng).random_range(lo..=hi)
    }

    fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        lock(&self.rng).random_range(0..len)
    }
}

#[derive(Debug, Default)]
struct Script {
    units: VecDeque<f64>,
    amounts: VecDeque<u64>,
    jitters: VecDeque<i64>,
    spans: VecDeque<f64>,
    picks: VecDeque<usize>,
}

/// [`Dice`] that replays queued outcomes, then falls back to a seeded source.
///
/// Scripted values are clamped into the requested range, so a script can
/// never produce an outcome the real dice could not.
#[derive(Debug)]
pub struct ScriptedDice {
    script: Mutex<Script>,
    fallback: SeededDice,
}

impl ScriptedDice {
    /// Empty script with a seeded fallback.
    pub fn new(seed: u64) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            fallback: SeededDice::new(seed),
        }
    }

    /// Queue results for [`Dice::unit`].
    pub fn push_units(&self, values: impl IntoIterator<Item = f64>) {
        lock(&self.script).units.extend(values);
    }

    /// Queue results for [`Dice::between`].
    pub fn push_amounts(&self, values: impl IntoIterator<Item = u64>) {
        lock(&self.script).amounts.extend(values);
    }

    /// Queue results for [`Dice::jitter`].
    pub fn push_jitters(&self, values: impl IntoIterator<Item = i64>) {
        lock(&self.script).jitters.extend(values);
    }

    /// Queue results for [`Dice::span`].
    pub fn push_spans(&self, values: impl IntoIterator<Item = f64>) {
        lock(&self.script).spans.extend(values);
    }

    /// Queue results for [`Dice::pick`].
    pub fn push_picks(&self, values: impl IntoIterator<Item = usize>) {
        lock(&self.script).picks.extend(values);
    }
}

impl Dice for ScriptedDice {
    fn unit(&self) -> f64 {
        let next = lock(&self.script).units.pop_front();
        next.map_or_else(|| self.fallback.unit(), |v| v.clamp(0.0, 1.0))
    }

    fn between(&self, range: AmountRange) -> u64 {
        let next = lock(&self.script).amounts.pop_front();
        next.map_or_else(
            || self.fallback.between(range),
            |v| v.clamp(range.min.min(range.max), range.max.max(range.min)),
        )
    }

    fn jitter(&self, range: JitterRange) -> i64 {
        let next = lock(&self.script).jitters.pop_front();
        next.map_or_else(
            || self.fallback.jitter(range),
            |v| v.clamp(range.min.min(range.max), range.max.max(range.min)),
        )
    }

    fn span(&self, range: PhRange) -> f64 {
        let next = lock(&self.script).spans.pop_front();
        next.map_or_else(
            || self.fallback.span(range),
            |v| v.clamp(range.min.min(range.max), range.max.max(range.min)),
        )
    }

    fn pick(&self, len: usize) -> usize {
        let next = lock(&self.script).picks.pop_front();
        next.map_or_else(
            || self.fallback.pick(len),
            |v| v.min(len.saturating_sub(1)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_dice_stay_in_range() {
        let dice = SeededDice::new(42);
        for _ in 0..1000 {
            let unit = dice.unit();
            assert!((0.0..1.0).contains(&unit));
            assert!((5..=15).contains(&dice.between(AmountRange::new(5, 15))));
            assert!((-1..=2).contains(&dice.jitter(JitterRange { min: -1, max: 2 })));
            let ph = dice.span(PhRange::new(0.3, 0.8));
            assert!((0.3..=0.8).contains(&ph));
            assert!(dice.pick(3) < 3);
        }
        assert_eq!(dice.pick(0), 0);
    }

    #[test]
    fn same_seed_same_draws() {
        let a = SeededDice::new(7);
        let b = SeededDice::new(7);
        for _ in 0..20 {
            assert_eq!(
                a.between(AmountRange::new(0, 1000)),
                b.between(AmountRange::new(0, 1000))
            );
        }
    }

    #[test]
    fn scripted_values_replay_then_fall_back() {
        let dice = ScriptedDice::new(1);
        dice.push_units([0.05]);
        dice.push_amounts([12, 99]);
        dice.push_picks([2]);

        assert!((dice.unit() - 0.05).abs() < f64::EPSILON);
        assert_eq!(dice.between(AmountRange::new(10, 50)), 12);
        assert_eq!(dice.between(AmountRange::new(10, 50)), 50);
        assert_eq!(dice.pick(3), 2);
        assert!(dice.pick(3) < 3);
    }
}
