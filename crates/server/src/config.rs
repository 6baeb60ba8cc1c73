#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub tick_rate: u32,
    pub ticks: u32,
    pub loss_percent: f32,
    pub ping_interval: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            ticks: 200,
            loss_percent: 0.0,
            ping_interval: 40,
        }
    }
}
