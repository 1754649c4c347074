//! Per-device execution context.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{Error, Result};
use crate::ffi::hip::{hip, HipLib};
use crate::ffi::hipblas::{hipblas, HipblasLib};
use crate::ffi::miopen::{miopen, MiopenLib};
use crate::kernels::KernelSet;

/// One device's stream plus the MIOpen and hipBLAS handles bound to it.
///
/// Everything issued through a context is ordered on its stream. Vendor
/// handles are not internally synchronized, so a context is `!Send`/`!Sync`
/// and stays on the thread that created it: one context per rank.
pub struct DeviceContext {
    // Pins the context to its creating thread.
    _not_send: std::marker::PhantomData<*const ()>,
    device_id: i32,
    stream: usize,
    miopen: usize,
    blas: usize,
    hip: Arc<HipLib>,
    miopen_lib: Arc<MiopenLib>,
    blas_lib: Arc<HipblasLib>,
    kernels: OnceCell<Result<Arc<KernelSet>, String>>,
}

impl DeviceContext {
    /// Binds `device_id`, creates a stream and attaches both vendor handles
    /// to it. Acquisition is ordered; on failure everything already acquired
    /// is released.
    pub fn new(device_id: i32) -> Result<Self> {
        let hip = hip()?;
        let miopen_lib = miopen()?;
        let blas_lib = hipblas()?;

        hip.set_device(device_id)?;
        let stream = hip.stream_create()?;
        let miopen_handle = match miopen_lib.create_with_stream(stream) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = hip.stream_destroy(stream);
                return Err(err);
            }
        };
        let blas_handle = match Self::create_blas_handle(&blas_lib, stream) {
            Ok(handle) => handle,
            Err(err) => {
                let _ = miopen_lib.destroy(miopen_handle);
                let _ = hip.stream_destroy(stream);
                return Err(err);
            }
        };

        Ok(DeviceContext {
            _not_send: std::marker::PhantomData,
            device_id,
            stream,
            miopen: miopen_handle,
            blas: blas_handle,
            hip,
            miopen_lib,
            blas_lib,
            kernels: OnceCell::new(),
        })
    }

    fn create_blas_handle(lib: &Arc<HipblasLib>, stream: usize) -> Result<usize> {
        let handle = lib.create()?;
        if let Err(err) = lib.set_stream(handle, stream) {
            let _ = lib.destroy(handle);
            return Err(err);
        }
        Ok(handle)
    }

    pub fn device_id(&self) -> i32 {
        self.device_id
    }

    /// Re-selects this context's device on the calling thread. Every entry
    /// point that touches device memory calls this first.
    pub fn bind(&self) -> Result<()> {
        self.hip.set_device(self.device_id)
    }

    /// Blocks until all work queued on the stream has drained.
    pub fn synchronize(&self) -> Result<()> {
        self.hip.stream_synchronize(self.stream)
    }

    pub(crate) fn stream(&self) -> usize {
        self.stream
    }

    pub(crate) fn miopen_handle(&self) -> usize {
        self.miopen
    }

    pub(crate) fn blas_handle(&self) -> usize {
        self.blas
    }

    pub(crate) fn hip(&self) -> &Arc<HipLib> {
        &self.hip
    }

    pub(crate) fn miopen_lib(&self) -> &Arc<MiopenLib> {
        &self.miopen_lib
    }

    pub(crate) fn blas_lib(&self) -> &Arc<HipblasLib> {
        &self.blas_lib
    }

    /// The context's kernel module, compiled on first use and cached for the
    /// context's lifetime. A failed compile is cached too.
    pub(crate) fn kernels(&self) -> Result<Arc<KernelSet>> {
        let state = self.kernels.get_or_init(|| match KernelSet::compile(&self.hip) {
            Ok(set) => Ok(Arc::new(set)),
            Err(err) => Err(err.to_string()),
        });
        match state {
            Ok(set) => Ok(Arc::clone(set)),
            Err(msg) => Err(Error::backend("hiprtc", msg.clone())),
        }
    }
}

impl Drop for DeviceContext {
    // Release in reverse acquisition order; zero means never acquired.
    fn drop(&mut self) {
        if self.blas != 0 {
            let _ = self.blas_lib.destroy(self.blas);
            self.blas = 0;
        }
        if self.miopen != 0 {
            let _ = self.miopen_lib.destroy(self.miopen);
            self.miopen = 0;
        }
        if self.stream != 0 {
            let _ = self.hip.stream_destroy(self.stream);
            self.stream = 0;
        }
    }
}
