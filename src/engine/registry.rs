use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::engine::fixtures::seed_driver;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, OnlineDriver};

/// Drivers that are online right now, keyed by driver id.
///
/// Mutations take the per-key write lock of the underlying map and never do
/// I/O while holding it. Reads hand out clones.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: DashMap<String, OnlineDriver>,
    next_seq: AtomicU64,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, driver_id: &str, package_slug: &str) -> Result<Driver, AppError> {
        self.register_session(driver_id, package_slug)
            .map(|(driver, _)| driver)
    }

    /// Registers like [`register`](Self::register) and also returns the
    /// session number that [`unregister_session`](Self::unregister_session)
    /// needs to take this registration, and only this one, offline again.
    pub fn register_session(
        &self,
        driver_id: &str,
        package_slug: &str,
    ) -> Result<(Driver, u64), AppError> {
        match self.drivers.entry(driver_id.to_string()) {
            Entry::Occupied(_) => Err(AppError::AlreadyOnline(driver_id.to_string())),
            Entry::Vacant(slot) => {
                let driver = seed_driver(driver_id, package_slug);
                let session = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(OnlineDriver {
                    driver: driver.clone(),
                    status: DriverStatus::Available,
                    current_trip: None,
                    online_since: Utc::now(),
                    registration_seq: session,
                });

                info!(driver_id, package_slug, session, "driver online");
                Ok((driver, session))
            }
        }
    }

    /// Takes the driver offline whatever their status.
    pub fn unregister(&self, driver_id: &str) -> Result<OnlineDriver, AppError> {
        let (_, removed) = self
            .drivers
            .remove(driver_id)
            .ok_or_else(|| AppError::NotOnline(driver_id.to_string()))?;

        info!(driver_id, status = ?removed.status, "driver offline");
        Ok(removed)
    }

    /// Removes the driver only while `session` still owns the registration.
    /// Returns `false` when a newer session has registered the same id since.
    pub fn unregister_session(&self, driver_id: &str, session: u64) -> Result<bool, AppError> {
        if let Some((_, removed)) = self
            .drivers
            .remove_if(driver_id, |_, online| online.registration_seq == session)
        {
            info!(driver_id, session, status = ?removed.status, "driver offline");
            return Ok(true);
        }

        if self.drivers.contains_key(driver_id) {
            Ok(false)
        } else {
            Err(AppError::NotOnline(driver_id.to_string()))
        }
    }

    /// Ids of every available driver serving `package_slug`, oldest
    /// registration first.
    pub fn find_available(&self, package_slug: &str) -> Vec<String> {
        let mut candidates: Vec<(u64, String)> = self
            .drivers
            .iter()
            .filter(|entry| {
                let online = entry.value();
                online.status == DriverStatus::Available
                    && online.driver.package_slug == package_slug
            })
            .map(|entry| (entry.value().registration_seq, entry.key().clone()))
            .collect();
        candidates.sort_unstable_by_key(|(seq, _)| *seq);

        debug!(
            package_slug,
            found = candidates.len(),
            "available drivers looked up"
        );
        candidates.into_iter().map(|(_, id)| id).collect()
    }

    /// Overwrites the status. Any transition is allowed; going back to
    /// available drops the held trip.
    pub fn set_status(&self, driver_id: &str, status: DriverStatus) -> Result<(), AppError> {
        let mut online = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotOnline(driver_id.to_string()))?;

        online.status = status;
        if status == DriverStatus::Available {
            online.current_trip = None;
        }

        info!(driver_id, status = ?status, "driver status updated");
        Ok(())
    }

    /// Marks an available driver busy with `trip_id` and returns the driver
    /// record read under the same lock. Returns `None` when the driver is busy
    /// with something else. Reserving again for the trip the driver already
    /// holds succeeds.
    pub fn reserve(&self, driver_id: &str, trip_id: &str) -> Result<Option<Driver>, AppError> {
        let mut online = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotOnline(driver_id.to_string()))?;

        if online.status == DriverStatus::Available {
            online.status = DriverStatus::Busy;
            online.current_trip = Some(trip_id.to_string());
            debug!(driver_id, trip_id, "driver reserved");
            return Ok(Some(online.driver.clone()));
        }

        if online.current_trip.as_deref() == Some(trip_id) {
            return Ok(Some(online.driver.clone()));
        }
        Ok(None)
    }

    /// Undoes [`reserve`](Self::reserve) if the driver still holds `trip_id`.
    pub fn release(&self, driver_id: &str, trip_id: &str) -> Result<bool, AppError> {
        let mut online = self
            .drivers
            .get_mut(driver_id)
            .ok_or_else(|| AppError::NotOnline(driver_id.to_string()))?;

        if online.current_trip.as_deref() != Some(trip_id) {
            return Ok(false);
        }

        online.status = DriverStatus::Available;
        online.current_trip = None;
        debug!(driver_id, trip_id, "driver reservation released");
        Ok(true)
    }

    /// Driver currently holding `trip_id`, if any.
    pub fn assigned_driver(&self, trip_id: &str) -> Option<OnlineDriver> {
        self.drivers
            .iter()
            .find(|entry| entry.value().current_trip.as_deref() == Some(trip_id))
            .map(|entry| entry.value().clone())
    }

    pub fn get(&self, driver_id: &str) -> Result<OnlineDriver, AppError> {
        self.drivers
            .get(driver_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotOnline(driver_id.to_string()))
    }

    pub fn count(&self) -> usize {
        self.drivers.len()
    }
}
