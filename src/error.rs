use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("`{0}` cannot be resolved to a kernel-namespace path")]
    PathResolution(String),

    #[error("unable to open or create the service key")]
    StoreAccess(#[source] io::Error),

    #[error("a driver with this service name is already resident")]
    LoadConflict,

    #[error("driver unload refused (status {0:#010x})")]
    Unload(i32),

    #[error("no device object found under any namespace convention")]
    NotFound,

    #[error("namespace enumeration failed")]
    Enumeration,

    #[error("kernel call failed (status {0:#010x})")]
    Nt(i32),

    #[error(transparent)]
    Io(#[from] io::Error),
}
