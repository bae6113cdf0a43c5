/// Tunables shared by every store and call site an engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// A write more than this many slots past the physical end of a dense
    /// store switches it to dictionary mode instead of materializing holes.
    pub sparse_gap: u32,
    /// First allocation for packed storage. Growth after that doubles.
    pub min_capacity: usize,
    /// Relinks a call site tolerates before it stops speculating.
    pub max_relinks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sparse_gap: 1024,
            min_capacity: 4,
            max_relinks: 8,
        }
    }
}

impl EngineConfig {
    /// Capacity to reserve so that `needed` elements fit, doubling from
    /// `current` and never going below `min_capacity` (or 1, so a zero
    /// `min_capacity` still grows).
    pub fn grown_capacity(&self, current: usize, needed: usize) -> usize {
        let mut cap = current.max(self.min_capacity).max(1);
        while cap < needed {
            cap = cap.saturating_mul(2);
        }
        cap
    }
}
