use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use tracing::info;
use tracing::trace;

use super::AsymmetricDriver;
use super::SymmetricDriver;
use crate::is_valid_algorithm;
use crate::AlgorithmId;
use crate::AsymmetricKind;
use crate::DriverId;
use crate::Error;
use crate::FeatureBitmap;
use crate::QueueMask;
use crate::RegistryConfig;
use crate::Result;
use crate::ALGORITHM_MAX;
use crate::KALGORITHM_MAX;

bitflags::bitflags! {
    /// Driver-wide capability flags given at `get_driver_id` time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DriverFlags: u32 {
        /// Software implementation, not backed by hardware.
        const SOFTWARE = 0x01;
        /// Completes operations synchronously inside `process`.
        const SYNC = 0x02;
    }
}

/// Lifecycle of one driver slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Unused, may be handed out by `get_driver_id`.
    Free,
    /// Handed out by `get_driver_id`, no algorithm registered yet.
    Reserved,
    /// At least one algorithm registered.
    Active,
    /// Unregistered while sessions remain open. Existing sessions keep
    /// working; no new session may pick this slot.
    Tombstoned,
}

/// Per-algorithm capability entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlgorithmSupport {
    pub supported: bool,
    pub max_operand_len: u32,
    pub flags: u32,
}

pub(crate) struct DriverSlot {
    pub(crate) state: SlotState,
    pub(crate) flags: DriverFlags,
    pub(crate) symmetric: Vec<AlgorithmSupport>,
    pub(crate) asymmetric: Vec<AlgorithmSupport>,
    pub(crate) symmetric_driver: Option<Arc<dyn SymmetricDriver>>,
    pub(crate) asymmetric_driver: Option<Arc<dyn AsymmetricDriver>>,
    pub(crate) open_sessions: u32,
    pub(crate) symmetric_blocked: bool,
    pub(crate) asymmetric_blocked: bool,
    /// Bumped on every `unblock`, lets the dispatcher detect an unblock that
    /// raced with a `Retry` answer.
    pub(crate) unblock_seq: u64,
}

impl DriverSlot {
    fn free() -> Self {
        Self {
            state: SlotState::Free,
            flags: DriverFlags::empty(),
            symmetric: vec![AlgorithmSupport::default(); ALGORITHM_MAX as usize + 1],
            asymmetric: vec![AlgorithmSupport::default(); KALGORITHM_MAX as usize + 1],
            symmetric_driver: None,
            asymmetric_driver: None,
            open_sessions: 0,
            symmetric_blocked: false,
            asymmetric_blocked: false,
            unblock_seq: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        let unblock_seq = self.unblock_seq;
        *self = DriverSlot::free();
        // Keep the sequence moving so a stale snapshot never matches.
        self.unblock_seq = unblock_seq.wrapping_add(1);
    }

    pub(crate) fn supports(
        &self,
        alg: AlgorithmId,
    ) -> bool {
        self.symmetric.get(alg as usize).is_some_and(|s| s.supported)
    }

    pub(crate) fn features(&self) -> FeatureBitmap {
        let mut bitmap = FeatureBitmap::default();
        for (kalg, support) in self.asymmetric.iter().enumerate() {
            if support.supported {
                bitmap.insert(kalg as u32);
            }
        }
        bitmap
    }

    fn has_any_algorithm(&self) -> bool {
        self.symmetric.iter().any(|s| s.supported) || self.asymmetric.iter().any(|s| s.supported)
    }

    fn is_registered(&self) -> bool {
        matches!(self.state, SlotState::Reserved | SlotState::Active)
    }
}

/// Read-only view of one slot, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub driver_id: DriverId,
    pub state: SlotState,
    pub flags: DriverFlags,
    pub open_sessions: u32,
    pub symmetric_blocked: bool,
    pub asymmetric_blocked: bool,
    pub algorithms: Vec<(AlgorithmId, AlgorithmSupport)>,
    pub features: FeatureBitmap,
}

/// Process-wide table of registered back-ends.
pub struct DriverRegistry {
    pub(crate) slots: RwLock<Vec<DriverSlot>>,
    max_slots: usize,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("slots", &self.slots.read().len())
            .field("max_slots", &self.max_slots)
            .finish()
    }
}

impl DriverRegistry {
    pub fn new(config: &RegistryConfig) -> Self {
        let slots = (0..config.initial_driver_slots).map(|_| DriverSlot::free()).collect();
        Self {
            slots: RwLock::new(slots),
            max_slots: config.max_driver_slots,
        }
    }

    /// Reserves a free slot, doubling the table when none is left.
    pub fn get_driver_id(
        &self,
        flags: DriverFlags,
    ) -> Result<DriverId> {
        let mut slots = self.slots.write();

        let index = match slots.iter().position(|slot| slot.state == SlotState::Free) {
            Some(index) => index,
            None => {
                let old_len = slots.len();
                let new_len = old_len
                    .max(1)
                    .checked_mul(2)
                    .filter(|len| *len <= self.max_slots)
                    .ok_or_else(|| Error::Unexpected(format!("driver table cannot grow beyond {} slots", old_len)))?;
                slots.resize_with(new_len, DriverSlot::free);
                debug!(old_len, new_len, "driver table grown");
                old_len
            }
        };

        let slot = &mut slots[index];
        slot.state = SlotState::Reserved;
        slot.flags = flags;
        info!(driver_id = index, ?flags, "driver id reserved");
        Ok(index as DriverId)
    }

    /// Declares symmetric support for `alg`. The first symmetric registration
    /// installs `driver`; later ones only add capability entries.
    pub fn register_symmetric(
        &self,
        driver_id: DriverId,
        alg: AlgorithmId,
        max_operand_len: u32,
        flags: u32,
        driver: Arc<dyn SymmetricDriver>,
    ) -> Result<()> {
        if !is_valid_algorithm(alg) {
            return Err(Error::invalid(format!("algorithm {} out of range", alg)));
        }
        let mut slots = self.slots.write();
        let slot = Self::registered_slot_mut(&mut slots, driver_id)?;

        if slot.symmetric_driver.is_none() {
            slot.symmetric_driver = Some(driver);
        }
        slot.symmetric[alg as usize] = AlgorithmSupport {
            supported: true,
            max_operand_len,
            flags,
        };
        slot.state = SlotState::Active;
        debug!(driver_id, alg, max_operand_len, "symmetric algorithm registered");
        Ok(())
    }

    /// Declares asymmetric support for class `kalg`; first registration
    /// installs `driver`.
    pub fn register_asymmetric(
        &self,
        driver_id: DriverId,
        kalg: u32,
        flags: u32,
        driver: Arc<dyn AsymmetricDriver>,
    ) -> Result<()> {
        let kind = AsymmetricKind::try_from(kalg)?;
        let mut slots = self.slots.write();
        let slot = Self::registered_slot_mut(&mut slots, driver_id)?;

        if slot.asymmetric_driver.is_none() {
            slot.asymmetric_driver = Some(driver);
        }
        slot.asymmetric[kind as usize] = AlgorithmSupport {
            supported: true,
            max_operand_len: 0,
            flags,
        };
        slot.state = SlotState::Active;
        debug!(driver_id, ?kind, "asymmetric algorithm registered");
        Ok(())
    }

    /// Withdraws one symmetric algorithm.
    pub fn unregister(
        &self,
        driver_id: DriverId,
        alg: AlgorithmId,
    ) -> Result<()> {
        if !is_valid_algorithm(alg) {
            return Err(Error::invalid(format!("algorithm {} out of range", alg)));
        }
        let mut slots = self.slots.write();
        let slot = Self::registered_slot_mut(&mut slots, driver_id)?;
        if !slot.symmetric[alg as usize].supported {
            return Err(Error::invalid(format!("driver {} never registered algorithm {}", driver_id, alg)));
        }

        slot.symmetric[alg as usize] = AlgorithmSupport::default();
        debug!(driver_id, alg, "symmetric algorithm unregistered");
        Self::retire_if_empty(driver_id, slot);
        Ok(())
    }

    /// Withdraws one asymmetric class.
    pub fn unregister_asymmetric(
        &self,
        driver_id: DriverId,
        kalg: u32,
    ) -> Result<()> {
        let kind = AsymmetricKind::try_from(kalg)?;
        let mut slots = self.slots.write();
        let slot = Self::registered_slot_mut(&mut slots, driver_id)?;
        if !slot.asymmetric[kind as usize].supported {
            return Err(Error::invalid(format!("driver {} never registered {:?}", driver_id, kind)));
        }

        slot.asymmetric[kind as usize] = AlgorithmSupport::default();
        debug!(driver_id, ?kind, "asymmetric algorithm unregistered");
        Self::retire_if_empty(driver_id, slot);
        Ok(())
    }

    /// Withdraws every algorithm of the driver at once.
    pub fn unregister_all(
        &self,
        driver_id: DriverId,
    ) -> Result<()> {
        let mut slots = self.slots.write();
        let slot = Self::registered_slot_mut(&mut slots, driver_id)?;

        slot.symmetric.fill(AlgorithmSupport::default());
        slot.asymmetric.fill(AlgorithmSupport::default());
        Self::retire_if_empty(driver_id, slot);
        Ok(())
    }

    /// Clears the blocked flags selected by `mask`.
    ///
    /// Returns the queue kinds that actually went from blocked to ready, so a
    /// redundant unblock produces no dispatcher wakeup.
    pub fn unblock(
        &self,
        driver_id: DriverId,
        mask: QueueMask,
    ) -> Result<QueueMask> {
        let mut slots = self.slots.write();
        let slot = slots
            .get_mut(driver_id as usize)
            .filter(|slot| slot.state != SlotState::Free)
            .ok_or_else(|| Error::invalid(format!("unknown driver {}", driver_id)))?;

        slot.unblock_seq = slot.unblock_seq.wrapping_add(1);
        let mut released = QueueMask::empty();
        if mask.contains(QueueMask::SYMMETRIC) && slot.symmetric_blocked {
            slot.symmetric_blocked = false;
            released |= QueueMask::SYMMETRIC;
        }
        if mask.contains(QueueMask::ASYMMETRIC) && slot.asymmetric_blocked {
            slot.asymmetric_blocked = false;
            released |= QueueMask::ASYMMETRIC;
        }
        trace!(driver_id, ?released, "unblock");
        Ok(released)
    }

    /// Marks one queue kind of the driver blocked, unless an unblock happened
    /// since `seq` was observed. Returns whether the flag was set.
    pub(crate) fn mark_blocked(
        &self,
        driver_id: DriverId,
        kind: QueueMask,
        seq: u64,
    ) -> bool {
        let mut slots = self.slots.write();
        let Some(slot) = slots.get_mut(driver_id as usize) else {
            return false;
        };
        if slot.unblock_seq != seq {
            debug!(driver_id, "unblocked while processing, not marking blocked");
            return false;
        }
        if kind.contains(QueueMask::SYMMETRIC) {
            slot.symmetric_blocked = true;
        }
        if kind.contains(QueueMask::ASYMMETRIC) {
            slot.asymmetric_blocked = true;
        }
        debug!(driver_id, ?kind, "driver queue blocked");
        true
    }

    /// Union of asymmetric classes over all live drivers. Software drivers
    /// count only when `allow_software` is set.
    pub fn query_features(
        &self,
        allow_software: bool,
    ) -> FeatureBitmap {
        let slots = self.slots.read();
        let mut bitmap = FeatureBitmap::default();
        for slot in slots.iter().filter(|slot| slot.state == SlotState::Active) {
            if !allow_software && slot.flags.contains(DriverFlags::SOFTWARE) {
                continue;
            }
            for (kalg, support) in slot.asymmetric.iter().enumerate() {
                if support.supported {
                    bitmap.insert(kalg as u32);
                }
            }
        }
        bitmap
    }

    pub fn driver_info(
        &self,
        driver_id: DriverId,
    ) -> Option<DriverInfo> {
        let slots = self.slots.read();
        let slot = slots.get(driver_id as usize)?;
        Some(DriverInfo {
            driver_id,
            state: slot.state,
            flags: slot.flags,
            open_sessions: slot.open_sessions,
            symmetric_blocked: slot.symmetric_blocked,
            asymmetric_blocked: slot.asymmetric_blocked,
            algorithms: slot
                .symmetric
                .iter()
                .enumerate()
                .filter(|(_, s)| s.supported)
                .map(|(alg, s)| (alg as AlgorithmId, *s))
                .collect(),
            features: slot.features(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.read().len()
    }

    fn registered_slot_mut(
        slots: &mut [DriverSlot],
        driver_id: DriverId,
    ) -> Result<&mut DriverSlot> {
        slots
            .get_mut(driver_id as usize)
            .filter(|slot| slot.is_registered())
            .ok_or_else(|| Error::invalid(format!("unknown driver {}", driver_id)))
    }

    /// Frees or tombstones a slot that no longer supports any algorithm.
    fn retire_if_empty(
        driver_id: DriverId,
        slot: &mut DriverSlot,
    ) {
        if slot.has_any_algorithm() {
            return;
        }
        if slot.open_sessions == 0 {
            slot.reset();
            info!(driver_id, "driver unregistered, slot released");
        } else {
            slot.state = SlotState::Tombstoned;
            info!(driver_id, open_sessions = slot.open_sessions, "driver unregistered, slot tombstoned");
        }
    }
}
