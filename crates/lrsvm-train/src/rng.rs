use lrsvm_la::DMat;

/// Seeded 64-bit LCG shared by all ranks.
///
/// Every rank seeds one with the shared seed and draws the same random
/// projection, so the projection itself never crosses the wire. Output is a
/// pure function of the seed on every platform.
#[derive(Clone, Debug)]
pub struct Rng {
    state: u64,
}

/// Knuth's MMIX constants.
const A: u64 = 6364136223846793005;
const C: u64 = 1442695040888963407;

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_mul(A).wrapping_add(C);
        self.state
    }

    /// Uniform in [0, 1), top 53 bits of the state.
    pub fn next_f64(&mut self) -> f64 {
        const SCALE: f64 = 1.0 / (1u64 << 53) as f64;
        (self.next_u64() >> 11) as f64 * SCALE
    }

    /// Standard normal, Box-Muller (cosine branch only).
    pub fn normal(&mut self) -> f64 {
        let radius = (-2.0 * self.next_f64().max(1e-15).ln()).sqrt();
        let angle = std::f64::consts::TAU * self.next_f64();
        radius * angle.cos()
    }

    /// `nrows × ncols` matrix of uniform [0, 1) draws, filled column by column.
    pub fn uniform_matrix(&mut self, nrows: usize, ncols: usize) -> DMat {
        let data = (0..nrows * ncols).map(|_| self.next_f64()).collect();
        DMat::from_raw(nrows, ncols, data)
    }
}
