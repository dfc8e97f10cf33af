/// One entry of a kernel object-namespace directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamespaceEntry {
    pub name: String,
    /// Object type name (`Device`, `SymbolicLink`, ...).
    pub kind: String,
}

/// One step of the directory's single-entry query protocol.
#[derive(Clone, Debug)]
pub enum QueryStep {
    /// The next entry, decoded from the caller's buffer.
    Entry(NamespaceEntry),
    /// The buffer is too small; retry with at least this many bytes.
    NeedBuffer(usize),
    /// No more entries.
    Done,
    /// The query failed irrecoverably.
    Failed,
}

/// A kernel object-namespace directory that can be enumerated one entry at a
/// time into a caller-provided buffer.
pub trait ObjectDirectory {
    type Cursor;

    /// Opens `directory_path` for query access. `None` covers both an absent
    /// and an inaccessible directory; the probe cannot tell them apart and
    /// does not need to.
    fn open(&self, directory_path: &str) -> Option<Self::Cursor>;

    fn next(&self, cursor: &mut Self::Cursor, buf: &mut [u8]) -> QueryStep;
}

/// Consecutive buffer-grow retries tolerated before the store is considered
/// to be misbehaving.
const MAX_GROW_RETRIES: u32 = 8;

/// Reports whether `directory_path` contains an object named `object_name`,
/// compared with ASCII-range case folding.
///
/// This is a boolean existence check, not a diagnostic query: a directory
/// that cannot be opened, an allocation that cannot be satisfied and a query
/// that fails mid-enumeration all come out as `false`.
pub fn object_exists<D: ObjectDirectory>(
    dir: &D,
    directory_path: &str,
    object_name: &str,
) -> bool {
    let Some(mut cursor) = dir.open(directory_path) else {
        return false;
    };

    let mut buf = Vec::new();
    let mut grows = 0;

    loop {
        match dir.next(&mut cursor, &mut buf) {
            QueryStep::Entry(entry) => {
                grows = 0;

                if entry.name.eq_ignore_ascii_case(object_name) {
                    return true;
                }
            }
            QueryStep::NeedBuffer(size) => {
                grows += 1;

                // A store that keeps asking for more without ever yielding
                // an entry would otherwise spin here forever.
                if grows > MAX_GROW_RETRIES {
                    return false;
                }

                buf.resize(size, 0);
            }
            QueryStep::Done | QueryStep::Failed => return false,
        }
    }
}

#[cfg(windows)]
pub use nt::NtObjectDirectory;

#[cfg(windows)]
mod nt {
    use std::ptr;
    use std::slice;

    use ntapi::ntobapi::{
        NtOpenDirectoryObject, NtQueryDirectoryObject, DIRECTORY_QUERY,
        OBJECT_DIRECTORY_INFORMATION,
    };
    use winapi::shared::ntdef::{HANDLE, UNICODE_STRING};
    use winapi::shared::ntstatus::{STATUS_BUFFER_TOO_SMALL, STATUS_NO_MORE_ENTRIES};
    use winapi::um::handleapi::CloseHandle;

    use crate::sys::{nt_success, object_attributes, to_wide, unicode_string};

    use super::{NamespaceEntry, ObjectDirectory, QueryStep};

    /// Open query handle plus the kernel's enumeration context.
    pub struct NtDirectoryCursor {
        handle: HANDLE,
        context: u32,
    }

    impl Drop for NtDirectoryCursor {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }

    /// [`ObjectDirectory`] backed by the NT object manager.
    pub struct NtObjectDirectory;

    impl ObjectDirectory for NtObjectDirectory {
        type Cursor = NtDirectoryCursor;

        fn open(&self, directory_path: &str) -> Option<NtDirectoryCursor> {
            let wide = to_wide(directory_path);
            let mut name = unicode_string(&wide);
            let mut attributes = object_attributes(&mut name);

            let mut handle: HANDLE = ptr::null_mut();

            let status =
                unsafe { NtOpenDirectoryObject(&mut handle, DIRECTORY_QUERY, &mut attributes) };

            if nt_success(status) {
                Some(NtDirectoryCursor { handle, context: 0 })
            } else {
                None
            }
        }

        fn next(&self, cursor: &mut NtDirectoryCursor, buf: &mut [u8]) -> QueryStep {
            let mut required = 0u32;

            let status = unsafe {
                NtQueryDirectoryObject(
                    cursor.handle,
                    if buf.is_empty() {
                        ptr::null_mut()
                    } else {
                        buf.as_mut_ptr().cast()
                    },
                    buf.len() as u32,
                    1, // one entry per call; the context survives regrows
                    0,
                    &mut cursor.context,
                    &mut required,
                )
            };

            match status {
                STATUS_BUFFER_TOO_SMALL => QueryStep::NeedBuffer(required as usize),
                STATUS_NO_MORE_ENTRIES => QueryStep::Done,
                s if nt_success(s) => unsafe {
                    // The byte buffer has no alignment guarantee for the
                    // info struct; its string buffers point back into `buf`.
                    let info = buf
                        .as_ptr()
                        .cast::<OBJECT_DIRECTORY_INFORMATION>()
                        .read_unaligned();

                    QueryStep::Entry(NamespaceEntry {
                        name: decode(&info.Name),
                        kind: decode(&info.TypeName),
                    })
                },
                _ => QueryStep::Failed,
            }
        }
    }

    unsafe fn decode(s: &UNICODE_STRING) -> String {
        if s.Buffer.is_null() {
            return String::new();
        }

        let chars = unsafe { slice::from_raw_parts(s.Buffer, usize::from(s.Length) / 2) };

        String::from_utf16_lossy(chars)
    }
}
