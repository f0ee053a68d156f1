use std::fmt;

use tracing::debug;
use tracing::warn;

use super::DriverRegistry;
use super::SlotState;
use crate::is_valid_algorithm;
use crate::AlgorithmId;
use crate::DriverFlags;
use crate::DriverId;
use crate::Error;
use crate::Result;

/// Session handle: owning driver plus the driver's own session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub driver_id: DriverId,
    pub local_id: u32,
}

impl SessionId {
    pub fn new(
        driver_id: DriverId,
        local_id: u32,
    ) -> Self {
        Self { driver_id, local_id }
    }
}

impl From<SessionId> for u64 {
    fn from(sid: SessionId) -> Self {
        ((sid.driver_id as u64) << 32) | sid.local_id as u64
    }
}

impl From<u64> for SessionId {
    fn from(raw: u64) -> Self {
        SessionId {
            driver_id: (raw >> 32) as u32,
            local_id: (raw & 0xffff_ffff) as u32,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}:{}", self.driver_id, self.local_id)
    }
}

/// One element of a requested algorithm chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInit {
    pub alg: AlgorithmId,
    pub key: Vec<u8>,
    pub mac_len: u16,
}

impl SessionInit {
    pub fn new(alg: AlgorithmId) -> Self {
        Self {
            alg,
            key: Vec::new(),
            mac_len: 0,
        }
    }

    pub fn key(
        mut self,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        self.key = key.into();
        self
    }
}

/// Which kind of driver a new session may land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HardwarePolicy {
    HardwareOnly,
    SoftwareOnly,
    #[default]
    Any,
}

impl HardwarePolicy {
    pub(crate) fn accepts(
        &self,
        flags: DriverFlags,
    ) -> bool {
        let software = flags.contains(DriverFlags::SOFTWARE);
        match self {
            HardwarePolicy::HardwareOnly => !software,
            HardwarePolicy::SoftwareOnly => software,
            HardwarePolicy::Any => true,
        }
    }
}

impl DriverRegistry {
    /// Opens a session on the lowest-numbered active driver that supports
    /// every algorithm of `chain` and matches `policy`.
    ///
    /// The chosen slot is pinned (its session count bumped) before the
    /// driver callback runs, so it cannot be released underneath it.
    pub fn new_session(
        &self,
        chain: &[SessionInit],
        policy: HardwarePolicy,
    ) -> Result<SessionId> {
        if chain.is_empty() {
            return Err(Error::invalid("empty algorithm chain"));
        }
        if let Some(bad) = chain.iter().find(|init| !is_valid_algorithm(init.alg)) {
            return Err(Error::invalid(format!("algorithm {} out of range", bad.alg)));
        }

        let (driver_id, driver) = {
            let mut slots = self.slots.write();
            let candidate = slots.iter_mut().enumerate().find(|(_, slot)| {
                slot.state == SlotState::Active
                    && slot.symmetric_driver.is_some()
                    && policy.accepts(slot.flags)
                    && chain.iter().all(|init| slot.supports(init.alg))
            });
            let Some((index, slot)) = candidate else {
                return Err(Error::not_found(format!(
                    "no driver supports chain {:?} under {:?}",
                    chain.iter().map(|init| init.alg).collect::<Vec<_>>(),
                    policy
                )));
            };
            let Some(driver) = slot.symmetric_driver.clone() else {
                return Err(Error::Unexpected(format!("driver {} lost its handler", index)));
            };
            slot.open_sessions += 1;
            (index as DriverId, driver)
        };

        match driver.new_session(chain) {
            Ok(local_id) => {
                let sid = SessionId::new(driver_id, local_id);
                debug!(%sid, "session opened");
                Ok(sid)
            }
            Err(e) => {
                warn!(driver_id, error = %e, "driver refused new session");
                self.release_session_ref(driver_id);
                Err(e.into())
            }
        }
    }

    /// Releases a session. The slot's session count drops even when the
    /// driver reports an error, so a tombstoned slot can still drain.
    pub fn free_session(
        &self,
        sid: SessionId,
    ) -> Result<()> {
        let driver = {
            let slots = self.slots.read();
            let slot = slots
                .get(sid.driver_id as usize)
                .ok_or_else(|| Error::not_found(format!("driver {} for session {}", sid.driver_id, sid)))?;
            slot.symmetric_driver.clone()
        };

        let result = match driver {
            Some(driver) => driver.free_session(sid.local_id),
            None => Ok(()),
        };
        self.release_session_ref(sid.driver_id);
        debug!(%sid, "session freed");

        result.map_err(Error::from)
    }

    pub(crate) fn release_session_ref(
        &self,
        driver_id: DriverId,
    ) {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(driver_id as usize) else {
            return;
        };
        if slot.open_sessions == 0 {
            warn!(driver_id, "session count already zero");
            return;
        }
        slot.open_sessions -= 1;
        if slot.state == SlotState::Tombstoned && slot.open_sessions == 0 {
            debug!(driver_id, "last session gone, releasing tombstoned slot");
            slot.reset();
        }
    }
}
