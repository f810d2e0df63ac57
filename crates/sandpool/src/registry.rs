//! Named driver and dial registrations.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::dial::SandboxDialer;
use crate::driver::Driver;
use crate::error::{Error, Result};

/// Maps driver names to drivers and to the sandbox dial registered for them.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
    dials: RwLock<HashMap<String, SandboxDialer>>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers())
            .finish_non_exhaustive()
    }
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a driver under `name`.
    pub fn register_driver(&self, name: &str, driver: Arc<dyn Driver>) {
        let replaced = self
            .drivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), driver)
            .is_some();
        tracing::debug!(driver = %name, replaced, "registered driver");
    }

    /// Register the sandbox dial for `name`.
    ///
    /// A later registration replaces the dialer for pools created afterwards;
    /// a pool that already exists keeps the capacity it was built with.
    pub fn register_dial(&self, name: &str, dialer: SandboxDialer) {
        let previous = self
            .dials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), dialer);
        if previous.is_some() {
            tracing::warn!(driver = %name, "sandbox dial re-registered");
        }
    }

    pub fn driver(&self, name: &str) -> Result<Arc<dyn Driver>> {
        self.drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownDriver(name.to_string()))
    }

    pub fn dialer(&self, name: &str) -> Result<SandboxDialer> {
        self.dials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoDialRegistered(name.to_string()))
    }

    /// Sorted names of registered drivers.
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
