//! Single-call system-information probes used alongside the lifecycle core:
//! code-integrity posture, firmware type and hypervisor presence.

use std::fmt;

/// Virtualization-based code-integrity posture.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CodeIntegrityStatus {
    /// Hypervisor-enforced kernel-mode code integrity is active.
    pub hvci_enabled: bool,
    /// HVCI is enforcing strict mode.
    pub strict_mode: bool,
    /// Isolated user mode is enabled.
    pub ium_enabled: bool,
}

/// Boot firmware flavor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FirmwareType {
    Bios,
    Uefi,
    #[default]
    Unknown,
}

impl fmt::Display for FirmwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FirmwareType::Bios => "BIOS",
            FirmwareType::Uefi => "UEFI",
            FirmwareType::Unknown => "Unknown",
        })
    }
}

/// Reports the hypervisor vendor string when the current machine runs under
/// one, from cpuid leaf `0x4000_0000`.
#[cfg(target_arch = "x86_64")]
#[must_use]
pub fn hypervisor_vendor() -> Option<String> {
    use std::arch::x86_64::__cpuid;

    // Leaf 1, ECX bit 31: hypervisor present.
    let features = unsafe { __cpuid(1) };

    if features.ecx & (1 << 31) == 0 {
        return None;
    }

    let leaf = unsafe { __cpuid(0x4000_0000) };

    let mut bytes = Vec::with_capacity(12);
    for register in [leaf.ebx, leaf.ecx, leaf.edx] {
        bytes.extend_from_slice(&register.to_le_bytes());
    }

    Some(String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_owned())
}

#[cfg(windows)]
pub use nt::{code_integrity_status, firmware_type};

#[cfg(windows)]
mod nt {
    use std::mem;
    use std::ptr;

    use ntapi::ntexapi::{
        NtQuerySystemInformation, SystemBootEnvironmentInformation,
        SystemCodeIntegrityInformation, SYSTEM_BOOT_ENVIRONMENT_INFORMATION,
        SYSTEM_CODEINTEGRITY_INFORMATION,
    };

    use crate::error::{Error, Result};
    use crate::sys::nt_success;

    use super::{CodeIntegrityStatus, FirmwareType};

    // winnt.h code-integrity option bits.
    const OPTION_ENABLED: u32 = 0x01;
    const OPTION_HVCI_KMCI_ENABLED: u32 = 0x400;
    const OPTION_HVCI_KMCI_STRICTMODE_ENABLED: u32 = 0x1000;
    const OPTION_HVCI_IUM_ENABLED: u32 = 0x2000;

    /// Queries the kernel's code-integrity options.
    pub fn code_integrity_status() -> Result<CodeIntegrityStatus> {
        let mut info = SYSTEM_CODEINTEGRITY_INFORMATION {
            Length: mem::size_of::<SYSTEM_CODEINTEGRITY_INFORMATION>() as u32,
            CodeIntegrityOptions: 0,
        };

        let mut returned = 0u32;

        let status = unsafe {
            NtQuerySystemInformation(
                SystemCodeIntegrityInformation,
                ptr::addr_of_mut!(info).cast(),
                mem::size_of::<SYSTEM_CODEINTEGRITY_INFORMATION>() as u32,
                &mut returned,
            )
        };

        if !nt_success(status) {
            return Err(Error::Nt(status));
        }

        let options = info.CodeIntegrityOptions;
        let hvci = options & OPTION_ENABLED != 0 && options & OPTION_HVCI_KMCI_ENABLED != 0;

        Ok(CodeIntegrityStatus {
            hvci_enabled: hvci,
            strict_mode: hvci && options & OPTION_HVCI_KMCI_STRICTMODE_ENABLED != 0,
            ium_enabled: options & OPTION_HVCI_IUM_ENABLED != 0,
        })
    }

    /// Reports the firmware the machine booted from, `Unknown` when the
    /// query fails.
    #[must_use]
    pub fn firmware_type() -> FirmwareType {
        let mut info: SYSTEM_BOOT_ENVIRONMENT_INFORMATION = unsafe { mem::zeroed() };
        let mut returned = 0u32;

        let status = unsafe {
            NtQuerySystemInformation(
                SystemBootEnvironmentInformation,
                ptr::addr_of_mut!(info).cast(),
                mem::size_of::<SYSTEM_BOOT_ENVIRONMENT_INFORMATION>() as u32,
                &mut returned,
            )
        };

        if !nt_success(status) {
            return FirmwareType::Unknown;
        }

        match info.FirmwareType {
            1 => FirmwareType::Bios,
            2 => FirmwareType::Uefi,
            _ => FirmwareType::Unknown,
        }
    }
}
