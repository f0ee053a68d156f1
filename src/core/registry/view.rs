use std::sync::Arc;

use super::AsymmetricDriver;
use super::DriverRegistry;
use super::SlotState;
use super::SymmetricDriver;
use crate::AsymmetricKind;
use crate::DriverFlags;
use crate::DriverId;
use crate::FeatureBitmap;

/// Where an operation can go right now.
pub(crate) enum Route<D: ?Sized> {
    Ready {
        driver_id: DriverId,
        driver: Arc<D>,
        seq: u64,
    },
    /// A capable driver exists but its queue kind is blocked.
    Blocked,
    /// No live handler exists for the operation.
    Gone,
}

struct DriverView {
    state: SlotState,
    flags: DriverFlags,
    symmetric: Option<Arc<dyn SymmetricDriver>>,
    asymmetric: Option<Arc<dyn AsymmetricDriver>>,
    symmetric_blocked: bool,
    asymmetric_blocked: bool,
    features: FeatureBitmap,
    seq: u64,
}

/// Lock-free copy of the routing state of every slot.
///
/// Taken under the registry lock and released before any queue lock is
/// acquired or any driver is invoked. Decisions made from a stale view are
/// safe: a driver that blocked since answers `Retry`, and an unblock since
/// the view was taken kicks the dispatcher again.
pub(crate) struct DispatchView {
    drivers: Vec<DriverView>,
}

impl DriverRegistry {
    pub(crate) fn dispatch_view(&self) -> DispatchView {
        let slots = self.slots.read();
        DispatchView {
            drivers: slots
                .iter()
                .map(|slot| DriverView {
                    state: slot.state,
                    flags: slot.flags,
                    symmetric: slot.symmetric_driver.clone(),
                    asymmetric: slot.asymmetric_driver.clone(),
                    symmetric_blocked: slot.symmetric_blocked,
                    asymmetric_blocked: slot.asymmetric_blocked,
                    features: slot.features(),
                    seq: slot.unblock_seq,
                })
                .collect(),
        }
    }
}

impl DispatchView {
    /// Route for a symmetric operation owned by `driver_id`. Tombstoned
    /// slots still route, a released or reused-but-unregistered slot does not.
    pub(crate) fn symmetric(
        &self,
        driver_id: DriverId,
    ) -> Route<dyn SymmetricDriver> {
        let Some(view) = self.drivers.get(driver_id as usize) else {
            return Route::Gone;
        };
        if !matches!(view.state, SlotState::Active | SlotState::Tombstoned) {
            return Route::Gone;
        }
        match &view.symmetric {
            None => Route::Gone,
            Some(_) if view.symmetric_blocked => Route::Blocked,
            Some(driver) => Route::Ready {
                driver_id,
                driver: Arc::clone(driver),
                seq: view.seq,
            },
        }
    }

    /// Route for an asymmetric operation. A targeted op goes to its driver;
    /// an unassigned one goes to the first ready live driver supporting
    /// `kind`, waits if every such driver is blocked, and is `Gone` when none
    /// exists.
    pub(crate) fn asymmetric(
        &self,
        target: Option<DriverId>,
        kind: AsymmetricKind,
        allow_software: bool,
    ) -> Route<dyn AsymmetricDriver> {
        if let Some(driver_id) = target {
            let Some(view) = self.drivers.get(driver_id as usize) else {
                return Route::Gone;
            };
            if !matches!(view.state, SlotState::Active | SlotState::Tombstoned) {
                return Route::Gone;
            }
            return match &view.asymmetric {
                None => Route::Gone,
                Some(_) if view.asymmetric_blocked => Route::Blocked,
                Some(driver) => Route::Ready {
                    driver_id,
                    driver: Arc::clone(driver),
                    seq: view.seq,
                },
            };
        }

        let mut saw_blocked = false;
        for (index, view) in self.drivers.iter().enumerate() {
            if view.state != SlotState::Active || !view.features.contains(kind) {
                continue;
            }
            if !allow_software && view.flags.contains(DriverFlags::SOFTWARE) {
                continue;
            }
            let Some(driver) = &view.asymmetric else {
                continue;
            };
            if view.asymmetric_blocked {
                saw_blocked = true;
                continue;
            }
            return Route::Ready {
                driver_id: index as DriverId,
                driver: Arc::clone(driver),
                seq: view.seq,
            };
        }

        if saw_blocked {
            Route::Blocked
        } else {
            Route::Gone
        }
    }

    /// Whether the symmetric queue of `driver_id` can take work, used to
    /// compute the "more work follows" hint.
    pub(crate) fn symmetric_ready(
        &self,
        driver_id: DriverId,
    ) -> bool {
        matches!(self.symmetric(driver_id), Route::Ready { .. })
    }
}
