/// Drops a configurable share of outbound state updates so the ack-based
/// recovery path gets exercised without a real lossy link.
#[derive(Debug, Clone, Default)]
pub struct LossSimulation {
    pub enabled: bool,
    pub loss_percent: f32,
}

impl LossSimulation {
    pub fn new(loss_percent: f32) -> Self {
        Self {
            enabled: loss_percent > 0.0,
            loss_percent,
        }
    }

    pub fn should_drop(&self) -> bool {
        if !self.enabled || self.loss_percent <= 0.0 {
            return false;
        }
        rand_percent() < self.loss_percent
    }
}

pub fn rand_percent() -> f32 {
    rand_u64() as f32 / u64::MAX as f32 * 100.0
}

pub fn rand_u64() -> u64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::time::Instant;

    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    hasher.finish()
}
