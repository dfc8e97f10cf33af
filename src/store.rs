use std::io;

use log::debug;

/// Abstract hierarchical key-value store the service configuration lives in.
///
/// Paths are backslash-separated and relative to the store's root. A [`Key`]
/// is a scoped handle to one opened key; dropping it releases the handle, so
/// every acquisition is bounded by its call frame.
///
/// [`Key`]: KeyStore::Key
pub trait KeyStore {
    type Key;

    /// Opens `path` with read/write access, creating it if it does not exist.
    fn create(&self, path: &str) -> io::Result<Self::Key>;

    /// Opens an existing `path` for enumeration.
    fn open(&self, path: &str) -> io::Result<Self::Key>;

    /// Writes a numeric value under `key`.
    fn set_u32(&self, key: &Self::Key, name: &str, value: u32) -> io::Result<()>;

    /// Writes an expandable-string value under `key`.
    fn set_expand_sz(&self, key: &Self::Key, name: &str, value: &str) -> io::Result<()>;

    /// Deletes the key at `path`. Fails if the key still has child keys.
    fn delete(&self, path: &str) -> io::Result<()>;

    /// Name of the first child key of `key`, if any.
    ///
    /// The store is shared mutable state, so this must re-query the live key
    /// on every call rather than walk a cached snapshot; after a child is
    /// deleted, the next call yields whichever child now comes first.
    fn first_child(&self, key: &Self::Key) -> io::Result<Option<String>>;
}

/// Outcome of a subtree erasure.
///
/// The public contract collapses to "removed or not" via [`is_removed`], but
/// the three cases stay distinguishable for callers that care whether the
/// key was there at all.
///
/// [`is_removed`]: EraseOutcome::is_removed
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EraseOutcome {
    /// The key and all of its descendants were deleted.
    Deleted,
    /// The key did not exist (or vanished mid-erase).
    NotFound,
    /// A key in the subtree could not be removed.
    Blocked,
}

impl EraseOutcome {
    /// `true` when the subtree is gone, whether it was deleted or never there.
    #[must_use]
    pub fn is_removed(self) -> bool {
        self != EraseOutcome::Blocked
    }
}

pub(crate) fn is_not_found(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound
}

/// Recursively deletes the key at `path` and every key beneath it.
///
/// Depth-first and bottom-up: a key is only deleted once its children are
/// gone. Another process may mutate the subtree concurrently; a child that
/// vanishes between enumeration and its own deletion counts as already
/// erased. The first blocked descendant aborts the traversal, leaving its
/// remaining siblings and every ancestor in place (children erased earlier
/// stay erased).
pub fn erase_subtree<S: KeyStore>(store: &S, path: &str) -> EraseOutcome {
    // Childless keys (and stores that allow non-empty deletion) go in one shot.
    if store.delete(path).is_ok() {
        return EraseOutcome::Deleted;
    }

    let key = match store.open(path) {
        Ok(key) => key,
        Err(ref e) if is_not_found(e) => return EraseOutcome::NotFound,
        Err(_) => return EraseOutcome::Blocked,
    };

    // Always take the first child: each successful deletion shifts the
    // remaining children down, so an advancing index would skip entries.
    loop {
        match store.first_child(&key) {
            Ok(Some(child)) => {
                let child_path = format!(r"{path}\{child}");

                if erase_subtree(store, &child_path) == EraseOutcome::Blocked {
                    debug!(r"subtree erase blocked at {child_path}");

                    return EraseOutcome::Blocked;
                }
            }
            Ok(None) => break,
            Err(ref e) if is_not_found(e) => break,
            Err(_) => return EraseOutcome::Blocked,
        }
    }

    drop(key);

    match store.delete(path) {
        Ok(()) => EraseOutcome::Deleted,
        Err(ref e) if is_not_found(e) => EraseOutcome::NotFound,
        Err(_) => EraseOutcome::Blocked,
    }
}

#[cfg(windows)]
pub use registry::RegistryStore;

#[cfg(windows)]
mod registry {
    use std::io;

    use winreg::enums::{HKEY_LOCAL_MACHINE, KEY_ALL_ACCESS, KEY_READ, REG_EXPAND_SZ};
    use winreg::{RegKey, RegValue};

    use super::KeyStore;

    /// [`KeyStore`] backed by the Windows registry.
    pub struct RegistryStore {
        root: RegKey,
    }

    impl RegistryStore {
        /// Store rooted at `HKEY_LOCAL_MACHINE`, where the service model lives.
        #[must_use]
        pub fn local_machine() -> Self {
            RegistryStore {
                root: RegKey::predef(HKEY_LOCAL_MACHINE),
            }
        }
    }

    impl KeyStore for RegistryStore {
        type Key = RegKey;

        fn create(&self, path: &str) -> io::Result<RegKey> {
            let (key, _disposition) = self.root.create_subkey_with_flags(path, KEY_ALL_ACCESS)?;

            Ok(key)
        }

        fn open(&self, path: &str) -> io::Result<RegKey> {
            self.root.open_subkey_with_flags(path, KEY_READ)
        }

        fn set_u32(&self, key: &RegKey, name: &str, value: u32) -> io::Result<()> {
            key.set_value(name, &value)
        }

        fn set_expand_sz(&self, key: &RegKey, name: &str, value: &str) -> io::Result<()> {
            let bytes = value
                .encode_utf16()
                .chain(std::iter::once(0))
                .flat_map(u16::to_le_bytes)
                .collect();

            key.set_raw_value(
                name,
                &RegValue {
                    bytes,
                    vtype: REG_EXPAND_SZ,
                },
            )
        }

        fn delete(&self, path: &str) -> io::Result<()> {
            self.root.delete_subkey(path)
        }

        fn first_child(&self, key: &RegKey) -> io::Result<Option<String>> {
            key.enum_keys().next().transpose()
        }
    }
}
