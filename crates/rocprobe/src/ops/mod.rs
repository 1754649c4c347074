//! Device tensor operators.
//!
//! Each operator is a free function over `DeviceTensor`s; shapes and modes
//! are validated up front, backend objects are guarded so they are released
//! on every path, and the context's stream is drained before returning.

pub mod blas;
pub mod convolution;
pub mod deconvolution;
pub mod fully_connected;
pub mod pooling;

use std::sync::Arc;

use crate::context::DeviceContext;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::ffi::miopen::MiopenLib;
use crate::shape::Shape;
use crate::tensor::DeviceTensor;

/// Only the f32 specialization of the backend entry points is wired up;
/// every other element type fails fast.
pub(crate) fn require_f32<T: Element>(op: &str) -> Result<()> {
    if T::DTYPE == DType::F32 {
        Ok(())
    } else {
        Err(Error::argument(format!(
            "{op} supports f32 elements only, got {}",
            T::DTYPE
        )))
    }
}

/// Scratch tensor holding at least `bytes` of device memory, sized in
/// elements. Zero bytes means no allocation and a null pointer.
pub(crate) fn workspace<T: Element>(ctx: &DeviceContext, bytes: usize) -> Result<DeviceTensor<T>> {
    let count = bytes.div_ceil(std::mem::size_of::<T>());
    DeviceTensor::zeros(ctx, Shape::new([count])?)
}

pub(crate) struct TensorDescGuard {
    lib: Arc<MiopenLib>,
    raw: usize,
}

impl TensorDescGuard {
    pub(crate) fn new_4d(lib: &Arc<MiopenLib>, shape: &Shape) -> Result<Self> {
        let raw = lib.tensor_descriptor_4d(shape.extents_4d()?)?;
        Ok(TensorDescGuard {
            lib: Arc::clone(lib),
            raw,
        })
    }

    /// Bias operands are described as 1 x c x 1 x 1 regardless of the bias
    /// tensor's own rank.
    pub(crate) fn new_bias(lib: &Arc<MiopenLib>, channels: i32) -> Result<Self> {
        let raw = lib.tensor_descriptor_4d([1, channels, 1, 1])?;
        Ok(TensorDescGuard {
            lib: Arc::clone(lib),
            raw,
        })
    }

    pub(crate) fn raw(&self) -> usize {
        self.raw
    }
}

impl Drop for TensorDescGuard {
    fn drop(&mut self) {
        let _ = self.lib.destroy_tensor_descriptor(self.raw);
    }
}

pub(crate) struct ConvDescGuard {
    lib: Arc<MiopenLib>,
    raw: usize,
}

impl ConvDescGuard {
    pub(crate) fn new(
        lib: &Arc<MiopenLib>,
        mode: i32,
        padding: [i32; 2],
        stride: [i32; 2],
        dilation: [i32; 2],
    ) -> Result<Self> {
        let raw = lib.convolution_descriptor(mode, padding, stride, dilation)?;
        Ok(ConvDescGuard {
            lib: Arc::clone(lib),
            raw,
        })
    }

    pub(crate) fn raw(&self) -> usize {
        self.raw
    }
}

impl Drop for ConvDescGuard {
    fn drop(&mut self) {
        let _ = self.lib.destroy_convolution_descriptor(self.raw);
    }
}

pub(crate) struct PoolDescGuard {
    lib: Arc<MiopenLib>,
    raw: usize,
}

impl PoolDescGuard {
    pub(crate) fn new(
        lib: &Arc<MiopenLib>,
        mode: i32,
        kernel: [i32; 2],
        padding: [i32; 2],
        stride: [i32; 2],
    ) -> Result<Self> {
        let raw = lib.pooling_descriptor(mode, kernel, padding, stride)?;
        Ok(PoolDescGuard {
            lib: Arc::clone(lib),
            raw,
        })
    }

    pub(crate) fn raw(&self) -> usize {
        self.raw
    }
}

impl Drop for PoolDescGuard {
    fn drop(&mut self) {
        let _ = self.lib.destroy_pooling_descriptor(self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_gate_rejects_other_elements() {
        assert!(require_f32::<f32>("convolution").is_ok());
        assert!(matches!(
            require_f32::<i32>("convolution"),
            Err(Error::Argument(_))
        ));
        assert!(require_f32::<f64>("pooling").is_err());
    }
}
