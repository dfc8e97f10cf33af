use log::debug;

use crate::error::{Error, Result};

/// Namespace conventions a driver may expose its device object under, in the
/// order they are tried. Adding a convention is a data change.
pub const NAMESPACE_CONVENTIONS: &[&str] = &[r"\DosDevices", r"\Device"];

/// Uniform classification of a single open attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpenError {
    /// The object does not exist under this path.
    NotFound,
    /// Any other failure (access denied, sharing violation, ...), carrying
    /// the raw status.
    Status(i32),
}

/// The kernel object namespace, as far as opening device endpoints goes.
pub trait ObjectNamespace {
    /// An owned, scoped handle to an opened endpoint.
    type Handle;

    fn open(&self, object_path: &str, desired_access: u32)
        -> std::result::Result<Self::Handle, OpenError>;
}

/// Opens a communication handle to the device object `name`.
///
/// Drivers register their endpoint under either the legacy DOS-device or the
/// native-device convention depending on how they set themselves up, so both
/// are tried in [`NAMESPACE_CONVENTIONS`] order. Only a not-found outcome
/// moves on to the next convention; any other failure is returned as-is,
/// since retrying a different path cannot fix an access problem.
pub fn open_device<N: ObjectNamespace>(
    ns: &N,
    name: &str,
    desired_access: u32,
) -> Result<N::Handle> {
    for prefix in NAMESPACE_CONVENTIONS {
        let path = format!(r"{prefix}\{name}");

        match ns.open(&path, desired_access) {
            Ok(handle) => {
                debug!("device opened at {path}");

                return Ok(handle);
            }
            Err(OpenError::NotFound) => continue,
            Err(OpenError::Status(status)) => return Err(Error::Nt(status)),
        }
    }

    Err(Error::NotFound)
}

#[cfg(windows)]
pub use nt::{DeviceHandle, NtObjectNamespace};

#[cfg(windows)]
mod nt {
    use std::ptr;

    use ntapi::ntioapi::{
        NtCreateFile, FILE_NON_DIRECTORY_FILE, FILE_OPEN, FILE_SYNCHRONOUS_IO_NONALERT,
        IO_STATUS_BLOCK,
    };
    use winapi::shared::ntdef::HANDLE;
    use winapi::shared::ntstatus::{
        STATUS_NO_SUCH_DEVICE, STATUS_OBJECT_NAME_NOT_FOUND, STATUS_OBJECT_PATH_NOT_FOUND,
    };
    use winapi::um::handleapi::CloseHandle;

    use crate::sys::{nt_success, object_attributes, to_wide, unicode_string};

    use super::{ObjectNamespace, OpenError};

    /// Owned handle to a driver's communication endpoint, closed on drop.
    pub struct DeviceHandle(HANDLE);

    impl DeviceHandle {
        #[must_use]
        pub fn as_raw(&self) -> HANDLE {
            self.0
        }

        /// Releases ownership; the caller becomes responsible for closing.
        #[must_use]
        pub fn into_raw(self) -> HANDLE {
            let handle = self.0;
            std::mem::forget(self);
            handle
        }
    }

    impl Drop for DeviceHandle {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.0);
            }
        }
    }

    // SAFETY: the handle is an owned kernel handle, valid process-wide.
    unsafe impl Send for DeviceHandle {}

    /// [`ObjectNamespace`] backed by `NtCreateFile` against the live object
    /// manager namespace.
    pub struct NtObjectNamespace;

    impl ObjectNamespace for NtObjectNamespace {
        type Handle = DeviceHandle;

        fn open(&self, object_path: &str, desired_access: u32)
            -> Result<DeviceHandle, OpenError>
        {
            let wide = to_wide(object_path);
            let mut name = unicode_string(&wide);
            let mut attributes = object_attributes(&mut name);

            let mut handle: HANDLE = ptr::null_mut();
            let mut iosb: IO_STATUS_BLOCK = unsafe { std::mem::zeroed() };

            let status = unsafe {
                NtCreateFile(
                    &mut handle,
                    desired_access,
                    &mut attributes,
                    &mut iosb,
                    ptr::null_mut(),
                    0,
                    0,
                    FILE_OPEN,
                    FILE_NON_DIRECTORY_FILE | FILE_SYNCHRONOUS_IO_NONALERT,
                    ptr::null_mut(),
                    0,
                )
            };

            match status {
                s if nt_success(s) => Ok(DeviceHandle(handle)),
                STATUS_OBJECT_NAME_NOT_FOUND | STATUS_OBJECT_PATH_NOT_FOUND
                | STATUS_NO_SUCH_DEVICE => Err(OpenError::NotFound),
                s => Err(OpenError::Status(s)),
            }
        }
    }
}
