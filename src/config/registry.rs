use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_DRIVER_SLOTS;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Driver slots allocated up front; the table doubles when full
    #[serde(default = "default_initial_driver_slots")]
    pub initial_driver_slots: usize,

    /// Ceiling for table growth
    #[serde(default = "default_max_driver_slots")]
    pub max_driver_slots: usize,

    /// Whether software drivers count for feature discovery and for
    /// unassigned asymmetric operations
    #[serde(default = "default_allow_software")]
    pub allow_software: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            initial_driver_slots: default_initial_driver_slots(),
            max_driver_slots: default_max_driver_slots(),
            allow_software: default_allow_software(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.initial_driver_slots == 0 {
            return Err(Error::Config(ConfigError::Message(
                "initial_driver_slots must be greater than 0".into(),
            )));
        }
        if self.max_driver_slots < self.initial_driver_slots {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_driver_slots ({}) must be >= initial_driver_slots ({})",
                self.max_driver_slots, self.initial_driver_slots
            ))));
        }
        if self.max_driver_slots > u32::MAX as usize {
            return Err(Error::Config(ConfigError::Message(
                "max_driver_slots must fit a 32-bit driver id".into(),
            )));
        }
        Ok(())
    }
}

fn default_initial_driver_slots() -> usize {
    DEFAULT_DRIVER_SLOTS
}
fn default_max_driver_slots() -> usize {
    u32::MAX as usize
}
fn default_allow_software() -> bool {
    true
}
