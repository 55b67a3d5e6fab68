//! Injectable randomness.
//!
//! Greeting choice, reply delay, and tie-breaking between equally good
//! templates all draw from a [`RandomSource`], so tests can script the
//! sequence instead of depending on ambient entropy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of uniformly distributed values in `[0, 1)`.
pub trait RandomSource: Send {
    fn next(&mut self) -> f64;
}

/// Entropy-seeded source for production use.
pub struct ThreadRandom {
    rng: StdRng,
}

impl ThreadRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible source, handy for demos and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for ThreadRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for ThreadRandom {
    fn next(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Replays a fixed list of values, wrapping around at the end.
///
/// Values outside `[0, 1)` are clamped into range.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }

    /// Always yields the same value.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for SequenceRandom {
    fn next(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor = self.cursor.wrapping_add(1);
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

/// Map the next random value onto an index in `0..len`.
///
/// `len` must be non-zero.
pub fn pick_index(rng: &mut dyn RandomSource, len: usize) -> usize {
    debug_assert!(len > 0, "pick_index called with an empty range");
    let idx = (rng.next() * len as f64).floor() as usize;
    idx.min(len.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_random_in_unit_interval() {
        let mut rng = ThreadRandom::new();
        for _ in 0..1_000 {
            let v = rng.next();
            assert!((0.0..1.0).contains(&v), "value out of range: {}", v);
        }
    }

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = ThreadRandom::seeded(7);
        let mut b = ThreadRandom::seeded(7);
        for _ in 0..10 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_sequence_wraps() {
        let mut rng = SequenceRandom::new(vec![0.1, 0.5]);
        assert_eq!(rng.next(), 0.1);
        assert_eq!(rng.next(), 0.5);
        assert_eq!(rng.next(), 0.1);
    }

    #[test]
    fn test_sequence_clamps_out_of_range() {
        let mut rng = SequenceRandom::new(vec![1.5, -0.2]);
        assert!(rng.next() < 1.0);
        assert_eq!(rng.next(), 0.0);
    }

    #[test]
    fn test_empty_sequence_yields_zero() {
        let mut rng = SequenceRandom::new(vec![]);
        assert_eq!(rng.next(), 0.0);
    }

    #[test]
    fn test_pick_index_bounds() {
        let mut low = SequenceRandom::constant(0.0);
        assert_eq!(pick_index(&mut low, 4), 0);

        let mut high = SequenceRandom::constant(0.999_999);
        assert_eq!(pick_index(&mut high, 4), 3);

        let mut mid = SequenceRandom::constant(0.5);
        assert_eq!(pick_index(&mut mid, 4), 2);
        assert_eq!(pick_index(&mut mid, 1), 0);
    }
}
