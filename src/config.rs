use crate::{si7021::SI7021_ADDRESS, sleep::EnergyMode, Resolution};

/// Ring buffer capacity of the serial transmitter. Power of two.
pub const RING_CAPACITY: usize = 64;

/// Largest single message the transmitter accepts.
pub const MAX_MESSAGE_LEN: usize = 64;

/// The sample timer counts in every mode down to EM2.
pub const TIMER_SLEEP_BLOCK: EnergyMode = EnergyMode::Em3;

#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    pub sensor_address: u8,
    /// The alert LED turns on above this temperature.
    pub temperature_alert_f: f32,
    /// Lines sent once after boot.
    pub banner: &'static [&'static str],
    pub resolution: Option<Resolution>,
}

impl NodeConfig {
    pub const DEFAULT: Self = Self {
        sensor_address: SI7021_ADDRESS,
        temperature_alert_f: 80.0,
        banner: &["\nHello World\n", "Sensor node up\n"],
        resolution: None,
    };
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
