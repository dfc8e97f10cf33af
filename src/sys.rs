//! Shared NT-native glue: UTF-16 conversion, object attribute construction
//! and the driver-load privilege.

use ntapi::ntrtl::RtlAdjustPrivilege;
use winapi::shared::ntdef::{
    NTSTATUS, OBJECT_ATTRIBUTES, OBJ_CASE_INSENSITIVE, UNICODE_STRING,
};

/// `SeLoadDriverPrivilege` (winnt.h).
const SE_LOAD_DRIVER_PRIVILEGE: u32 = 10;

pub fn nt_success(status: NTSTATUS) -> bool {
    status >= 0
}

/// NUL-terminated UTF-16 form of `s`.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// `UNICODE_STRING` over a NUL-terminated UTF-16 buffer. The buffer must
/// outlive every use of the returned value.
pub fn unicode_string(wide: &[u16]) -> UNICODE_STRING {
    let chars = wide.len().saturating_sub(1);

    UNICODE_STRING {
        Length: (chars * 2) as u16,
        MaximumLength: (wide.len() * 2) as u16,
        Buffer: wide.as_ptr() as *mut u16,
    }
}

/// Case-insensitive `OBJECT_ATTRIBUTES` naming `name`, with no root
/// directory or security descriptor. `name` must outlive every use of the
/// returned value.
pub fn object_attributes(name: &mut UNICODE_STRING) -> OBJECT_ATTRIBUTES {
    OBJECT_ATTRIBUTES {
        Length: std::mem::size_of::<OBJECT_ATTRIBUTES>() as u32,
        RootDirectory: std::ptr::null_mut(),
        ObjectName: name,
        Attributes: OBJ_CASE_INSENSITIVE,
        SecurityDescriptor: std::ptr::null_mut(),
        SecurityQualityOfService: std::ptr::null_mut(),
    }
}

/// Enables `SeLoadDriverPrivilege` on the current process token.
///
/// The kernel load/unload primitives fail with `STATUS_PRIVILEGE_NOT_HELD`
/// without it. Returns `false` when the token does not hold the privilege at
/// all (not elevated).
pub fn enable_load_driver_privilege() -> bool {
    let mut was_enabled = 0u8;

    let status =
        unsafe { RtlAdjustPrivilege(SE_LOAD_DRIVER_PRIVILEGE, 1, 0, &mut was_enabled) };

    nt_success(status)
}
