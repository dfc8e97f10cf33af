//! Lifecycle management for kernel-mode driver services on Windows.
//!
//! The crate registers a driver's persistent service record, loads the
//! binary into the running kernel (resolving conflicts with an instance that
//! is already resident), opens a communication handle to the resulting
//! device object, probes the object namespace for residency, and tears
//! everything down again, including recursive removal of the service's
//! configuration subtree.
//!
//! The core algorithms are written against capability traits
//! ([`store::KeyStore`], [`loader::DriverRuntime`],
//! [`device::ObjectNamespace`], [`probe::ObjectDirectory`]); the
//! Windows-native implementations live behind `#[cfg(windows)]`. On the
//! native path, `sys::enable_load_driver_privilege` must succeed once per
//! process before loading or unloading.
//!
//! All calls are synchronous and take no locks: the registry and the
//! kernel's loaded-driver set are shared mutable state, and races are
//! tolerated rather than prevented. Callers wanting exactly-once semantics
//! must serialize `load`/`unload` per driver name.

pub use error::{Error, Result};

pub use device::{open_device, ObjectNamespace, OpenError, NAMESPACE_CONVENTIONS};
pub use loader::{load_driver, unload_driver, DriverRuntime, LoadOutcome};
pub use probe::{object_exists, NamespaceEntry, ObjectDirectory, QueryStep};
pub use record::{nt_service_key_path, service_key_path, write_service_record};
pub use store::{erase_subtree, EraseOutcome, KeyStore};

#[cfg(windows)]
pub use device::{DeviceHandle, NtObjectNamespace};
#[cfg(windows)]
pub use loader::NtDriverRuntime;
#[cfg(windows)]
pub use probe::NtObjectDirectory;
#[cfg(windows)]
pub use store::RegistryStore;

pub mod device;
pub mod error;
pub mod loader;
pub mod probe;
pub mod record;
pub mod store;
pub mod sysinfo;

#[cfg(windows)]
pub mod sys;

#[cfg(test)]
mod testutil;

#[cfg(windows)]
mod native {
    use std::path::Path;

    use crate::device::{DeviceHandle, NtObjectNamespace};
    use crate::loader::NtDriverRuntime;
    use crate::probe::NtObjectDirectory;
    use crate::store::RegistryStore;
    use crate::Result;

    /// Loads the driver at `image_path` under the service name `name`.
    ///
    /// See [`load_driver`](crate::load_driver) for conflict handling.
    pub fn load(name: &str, image_path: &Path, replace_existing: bool) -> Result<()> {
        crate::load_driver(
            &RegistryStore::local_machine(),
            &NtDriverRuntime,
            name,
            image_path,
            replace_existing,
        )
    }

    /// Unloads the driver registered under `name`, erasing its service key
    /// when `remove_entry` is set.
    pub fn unload(name: &str, remove_entry: bool) -> Result<()> {
        crate::unload_driver(
            &RegistryStore::local_machine(),
            &NtDriverRuntime,
            name,
            remove_entry,
        )
    }

    /// Opens a handle to the device object `name`, trying each namespace
    /// convention in turn.
    pub fn open(name: &str, desired_access: u32) -> Result<DeviceHandle> {
        crate::open_device(&NtObjectNamespace, name, desired_access)
    }

    /// Whether the object directory at `directory_path` contains an object
    /// named `object_name`. A read-only residency check that needs no handle
    /// to the driver itself.
    #[must_use]
    pub fn object_present(directory_path: &str, object_name: &str) -> bool {
        crate::object_exists(&NtObjectDirectory, directory_path, object_name)
    }
}

#[cfg(windows)]
pub use native::{load, object_present, open, unload};
