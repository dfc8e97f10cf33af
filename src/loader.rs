use std::path::Path;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::record::{nt_service_key_path, service_key_path, write_service_record};
use crate::store::{erase_subtree, KeyStore};

/// Classified outcome of the kernel's load primitive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    /// The driver is now resident.
    Loaded,
    /// An image for this service is already resident.
    AlreadyLoaded,
    /// The service's object name already exists in the kernel namespace.
    NameExists,
    /// Any other failure, carrying the raw status.
    Failed(i32),
}

/// The kernel's load/unload primitive, keyed by the fully-qualified service
/// key path.
pub trait DriverRuntime {
    fn load(&self, service_key: &str) -> LoadOutcome;

    /// `Err` carries the raw status of the refusal (driver not resident,
    /// unload rejected by the driver itself, ...).
    fn unload(&self, service_key: &str) -> std::result::Result<(), i32>;
}

/// Registers the service record for `name` and loads the driver into the
/// kernel.
///
/// If an instance is already resident and `replace_existing` is set, the
/// prior instance is unloaded and the load retried once; both the unload and
/// the retry must succeed. Without `replace_existing` a resident prior
/// instance is a [`Error::LoadConflict`], with no retry. The kernel offers
/// no load-or-reuse primitive, so this unload-then-retry is inherently racy
/// against other processes; callers wanting exactly-once semantics must
/// serialize per driver name.
pub fn load_driver<S, R>(
    store: &S,
    runtime: &R,
    name: &str,
    image_path: &Path,
    replace_existing: bool,
) -> Result<()>
where
    S: KeyStore,
    R: DriverRuntime,
{
    write_service_record(store, name, Some(image_path))?;

    let service_key = nt_service_key_path(name);

    match runtime.load(&service_key) {
        LoadOutcome::Loaded => {
            debug!("driver {name} loaded");

            Ok(())
        }
        LoadOutcome::AlreadyLoaded | LoadOutcome::NameExists => {
            if !replace_existing {
                return Err(Error::LoadConflict);
            }

            debug!("driver {name} already resident, replacing");

            if runtime.unload(&service_key).is_err() {
                return Err(Error::LoadConflict);
            }

            match runtime.load(&service_key) {
                LoadOutcome::Loaded => Ok(()),
                _ => Err(Error::LoadConflict),
            }
        }
        LoadOutcome::Failed(status) => Err(Error::Nt(status)),
    }
}

/// Unloads the driver registered under `name`, optionally erasing its
/// persistent service key.
///
/// The service record's fixed fields are rebuilt first so the kernel has an
/// entry to reference even when the record was removed while the driver
/// stayed resident; the rebuild is idempotent because the field values are
/// constants. Erasure failure is reported in the log but does not revert the
/// already-successful unload: residency and persistent state are independent
/// outcomes.
pub fn unload_driver<S, R>(store: &S, runtime: &R, name: &str, remove_entry: bool) -> Result<()>
where
    S: KeyStore,
    R: DriverRuntime,
{
    write_service_record(store, name, None)?;

    runtime
        .unload(&nt_service_key_path(name))
        .map_err(Error::Unload)?;

    debug!("driver {name} unloaded");

    if remove_entry {
        let key_path = service_key_path(name);

        if !erase_subtree(store, &key_path).is_removed() {
            warn!(r"service key {key_path} could not be fully removed");
        }
    }

    Ok(())
}

#[cfg(windows)]
pub use nt::NtDriverRuntime;

#[cfg(windows)]
mod nt {
    use ntapi::ntioapi::{NtLoadDriver, NtUnloadDriver};
    use winapi::shared::ntstatus::{
        STATUS_IMAGE_ALREADY_LOADED, STATUS_OBJECT_NAME_COLLISION, STATUS_OBJECT_NAME_EXISTS,
    };

    use crate::sys::{nt_success, to_wide, unicode_string};

    use super::{DriverRuntime, LoadOutcome};

    /// [`DriverRuntime`] backed by `NtLoadDriver`/`NtUnloadDriver`.
    ///
    /// Both calls require `SeLoadDriverPrivilege`; see
    /// [`enable_load_driver_privilege`](crate::sys::enable_load_driver_privilege).
    pub struct NtDriverRuntime;

    impl DriverRuntime for NtDriverRuntime {
        fn load(&self, service_key: &str) -> LoadOutcome {
            let wide = to_wide(service_key);
            let mut name = unicode_string(&wide);

            let status = unsafe { NtLoadDriver(&mut name) };

            match status {
                STATUS_IMAGE_ALREADY_LOADED => LoadOutcome::AlreadyLoaded,
                // NAME_EXISTS is a success-class status but still means the
                // name is taken; classify it before the success check.
                STATUS_OBJECT_NAME_COLLISION | STATUS_OBJECT_NAME_EXISTS => LoadOutcome::NameExists,
                s if nt_success(s) => LoadOutcome::Loaded,
                s => LoadOutcome::Failed(s),
            }
        }

        fn unload(&self, service_key: &str) -> Result<(), i32> {
            let wide = to_wide(service_key);
            let mut name = unicode_string(&wide);

            let status = unsafe { NtUnloadDriver(&mut name) };

            if nt_success(status) {
                Ok(())
            } else {
                Err(status)
            }
        }
    }
}
