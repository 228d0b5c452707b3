//! Deterministic random stream.
//!
//! Every random decision in a run draws from one [`RandomStream`]. The stream
//! wraps a ChaCha8 generator, so a seed yields the same sequence on every
//! platform, and it serializes with the run so a reloaded save continues the
//! exact same sequence. Stages consume draws in a fixed order per tick; see
//! [`crate::engine`] for the full contract.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::TAU;

/// Source of uniform values in `[0, 1)`.
///
/// All helpers consume a fixed number of draws regardless of their inputs.
pub trait RandomSource {
    /// Next uniform value in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform value in `[min, max)`. One draw.
    fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }

    /// True with probability `p`. One draw.
    fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Uniform index into a collection of `len` items. One draw, even when `len == 0`.
    fn index(&mut self, len: usize) -> Option<usize> {
        let u = self.next_f64();
        if len == 0 {
            return None;
        }
        Some(((u * len as f64) as usize).min(len - 1))
    }

    /// Standard normal sample via Box–Muller. Exactly two draws.
    fn gaussian(&mut self) -> f64 {
        let u1 = self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * (1.0 - u1).ln()).sqrt() * (TAU * u2).cos()
    }

    /// Weighted choice by cumulative-threshold walk. One draw.
    ///
    /// Non-positive or non-finite weights never win. The last eligible
    /// candidate absorbs floating-point remainder. `None` when nothing is eligible.
    fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let u = self.next_f64();
        let eligible = |w: f64| w.is_finite() && w > 0.0;
        let total: f64 = weights.iter().copied().filter(|w| eligible(*w)).sum();
        if total <= 0.0 {
            return None;
        }
        let threshold = u * total;
        let mut cumulative = 0.0;
        let mut last = None;
        for (i, w) in weights.iter().copied().enumerate() {
            if !eligible(w) {
                continue;
            }
            cumulative += w;
            last = Some(i);
            if threshold < cumulative {
                return Some(i);
            }
        }
        last
    }
}

/// Seeded, serializable stream owned by one run.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RandomStream {
    seed: u64,
    draws: u64,
    rng: ChaCha8Rng,
}

impl RandomStream {
    /// Same seed ⇒ same sequence.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of values drawn since construction.
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl RandomSource for RandomStream {
    fn next_f64(&mut self) -> f64 {
        self.draws += 1;
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed script of values, cycling when exhausted. Intended for tests
/// that need known noise and jitter.
#[derive(Clone, Debug)]
pub struct ScriptedSource {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, cursor: 0 }
    }

    /// Values consumed so far.
    pub fn consumed(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedSource {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            self.cursor += 1;
            return 0.0;
        }
        let v = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        v
    }
}
