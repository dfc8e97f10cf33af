use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::store::KeyStore;

/// `ErrorControl`: load failures are reported but do not abort dependent
/// processing.
pub const SERVICE_ERROR_NORMAL: u32 = 1;

/// `Type`: kernel-mode driver.
pub const SERVICE_KERNEL_DRIVER: u32 = 1;

/// `Start`: loaded on demand, never auto-started by the platform.
pub const SERVICE_DEMAND_START: u32 = 3;

/// Store-relative path of the service key for `name`.
#[must_use]
pub fn service_key_path(name: &str) -> String {
    format!(r"SYSTEM\CurrentControlSet\Services\{name}")
}

/// Fully-qualified kernel-namespace path of the service key for `name`, the
/// form the kernel load/unload primitive takes.
#[must_use]
pub fn nt_service_key_path(name: &str) -> String {
    format!(r"\Registry\Machine\SYSTEM\CurrentControlSet\Services\{name}")
}

/// Writes the persistent service record for a kernel driver under
/// `Services\<name>`.
///
/// With `image_path` absent only the three fixed fields are written; that
/// partial form is meant for callers referencing an entry they expect to
/// exist already (the unload path) and is not an error. A failed write of a
/// later field does not roll back earlier ones: a `build` failure leaves the
/// entry in an unknown, possibly partial state, and re-invocation is the
/// recovery mechanism. The key handle is released on every exit path.
pub fn write_service_record<S: KeyStore>(
    store: &S,
    name: &str,
    image_path: Option<&Path>,
) -> Result<()> {
    if name.is_empty() || name.contains('\\') {
        return Err(Error::PathResolution(name.to_owned()));
    }

    // Resolve the image path before touching the store so a bad path cannot
    // leave a partial record behind.
    let image = image_path.map(nt_image_path).transpose()?;

    let key = store
        .create(&service_key_path(name))
        .map_err(Error::StoreAccess)?;

    store.set_u32(&key, "ErrorControl", SERVICE_ERROR_NORMAL)?;
    store.set_u32(&key, "Type", SERVICE_KERNEL_DRIVER)?;
    store.set_u32(&key, "Start", SERVICE_DEMAND_START)?;

    if let Some(image) = image {
        store.set_expand_sz(&key, "ImagePath", &image)?;
    }

    debug!(
        "service record written for {name} (image: {})",
        image_path.map_or_else(|| "<absent>".into(), |p| p.display().to_string())
    );

    Ok(())
}

/// Translates a driver image path to its kernel-namespace (`\??\`) form.
///
/// Paths already in NT form pass through untouched. Relative paths are
/// rejected: a demand-start driver service resolves its image against the
/// system root, not the caller's working directory, so a relative path in
/// the record is never what the caller meant.
fn nt_image_path(path: &Path) -> Result<String> {
    let bad = || Error::PathResolution(path.display().to_string());

    let s = path.to_str().ok_or_else(bad)?;

    if s.is_empty() {
        return Err(bad());
    }

    if s.starts_with(r"\??\") || s.starts_with(r"\Device\") || s.starts_with(r"\SystemRoot\") {
        return Ok(s.to_owned());
    }

    let drive_absolute = {
        let b = s.as_bytes();
        b.len() >= 3 && b[0].is_ascii_alphabetic() && b[1] == b':' && b[2] == b'\\'
    };

    if drive_absolute || s.starts_with(r"\\") {
        Ok(format!(r"\??\{s}"))
    } else {
        Err(bad())
    }
}
