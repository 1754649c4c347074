//! Dynamically loaded vendor libraries.
//!
//! Nothing in this crate links against ROCm or MPI at build time. Each
//! backend is resolved from its shared library on first use, so the crate
//! builds everywhere and host-side tests run on machines without a GPU
//! runtime installed.

pub mod hip;
pub(crate) mod hipblas;
pub(crate) mod miopen;
pub(crate) mod mpi;
pub(crate) mod rtc;

use libloading::Library;

use crate::error::{Error, Result};

/// Opens the first loadable soname from `candidates`.
pub(crate) fn open_library(candidates: &'static [&'static str]) -> Result<Library> {
    for candidate in candidates {
        if let Ok(lib) = unsafe { Library::new(candidate) } {
            return Ok(lib);
        }
    }
    Err(Error::backend(
        "dlopen",
        format!("none of {candidates:?} could be loaded"),
    ))
}

/// Resolves a function symbol into a bare fn pointer.
pub(crate) fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T> {
    let sym = unsafe { lib.get::<T>(name) }.map_err(|err| {
        Error::backend(
            "dlsym",
            format!(
                "missing symbol {}: {err}",
                String::from_utf8_lossy(&name[..name.len().saturating_sub(1)])
            ),
        )
    })?;
    Ok(*sym)
}
