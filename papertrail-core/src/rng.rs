//! Deterministic randomness for one engine instance.
//!
//! Every slippage draw comes from a single `StdRng` seeded once at engine
//! construction. Order ids are derived by hashing `(seed, sequence)` with
//! BLAKE3 rather than drawn from the generator, so id allocation never shifts
//! the slippage stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SeededSource {
    seed: u64,
    rng: StdRng,
    sequence: u64,
}

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
            sequence: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform draw in `[0, upper)`. A zero upper bound yields zero and still
    /// consumes one draw.
    pub fn uniform(&mut self, upper: f64) -> f64 {
        self.rng.gen::<f64>() * upper
    }

    /// Next order id: `<prefix>-<12 hex chars>`.
    pub fn next_order_id(&mut self, prefix: &str) -> String {
        let digest = order_digest(self.seed, self.sequence);
        self.sequence += 1;
        format!("{prefix}-{digest}")
    }
}

fn order_digest(seed: u64, sequence: u64) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(&sequence.to_le_bytes());
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..12].to_string()
}
