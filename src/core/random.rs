/// Random sources — the only place the engine draws randomness from.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Supplies uniform draws to the rewriter.
///
/// Production code uses [`StdRandom`]; tests can script exact draws with
/// [`SequenceRandom`].
pub trait RandomSource {
    /// A uniform draw in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// A uniform index in `0..len`. `len` is never zero.
    fn next_index(&mut self, len: usize) -> usize;
}

/// Pick one element of a slice uniformly, or `None` if it is empty.
pub fn choose<'a, T>(rng: &mut dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.next_index(items.len()))
}

/// `StdRng`-backed source.
#[derive(Debug, Clone)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }
}

/// Deterministic source replaying a fixed script of draws.
///
/// Draws cycle through `values`; index selection maps the same draw onto
/// `0..len`. An empty script always draws `0.0`.
#[derive(Debug, Clone, Default)]
pub struct SequenceRandom {
    values: Vec<f64>,
    cursor: usize,
}

impl SequenceRandom {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            cursor: 0,
        }
    }

    /// A source that always draws the same value.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }

    fn next_index(&mut self, len: usize) -> usize {
        let index = (self.next_f64() * len as f64) as usize;
        index.min(len.saturating_sub(1))
    }
}
