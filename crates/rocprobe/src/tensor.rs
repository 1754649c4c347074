//! Device-resident tensors and the tolerance comparison.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::DeviceContext;
use crate::dtype::{DType, Element};
use crate::error::{ensure_arg, Error, Result};
use crate::ffi::hip::HipLib;
use crate::kernels::{grid_size, scalar_kernel_name, ScalarOp};
use crate::shape::Shape;

/// Absolute tolerance of the equivalence check.
pub const FLOAT_TOLERANCE: f64 = 1e-2;

fn as_bytes<T: Element>(values: &[T]) -> &[u8] {
    // Element impls are plain scalars without padding.
    unsafe {
        std::slice::from_raw_parts(values.as_ptr() as *const u8, std::mem::size_of_val(values))
    }
}

/// Exclusively owned span of device memory, freed exactly once on drop.
pub(crate) struct DeviceBuffer {
    hip: Arc<HipLib>,
    ptr: usize,
    bytes: usize,
}

impl DeviceBuffer {
    pub(crate) fn alloc(hip: &Arc<HipLib>, bytes: usize) -> Result<Self> {
        let ptr = hip.malloc(bytes)?;
        Ok(DeviceBuffer {
            hip: Arc::clone(hip),
            ptr,
            bytes,
        })
    }

    pub(crate) fn alloc_zeroed(hip: &Arc<HipLib>, bytes: usize) -> Result<Self> {
        let buffer = Self::alloc(hip, bytes)?;
        buffer.hip.memset_zero(buffer.ptr, buffer.bytes)?;
        Ok(buffer)
    }

    pub(crate) fn from_host(hip: &Arc<HipLib>, data: &[u8]) -> Result<Self> {
        let buffer = Self::alloc(hip, data.len())?;
        buffer.upload(data)?;
        Ok(buffer)
    }

    pub(crate) fn upload(&self, data: &[u8]) -> Result<()> {
        ensure_arg!(
            data.len() == self.bytes,
            "upload of {} bytes into a {}-byte buffer",
            data.len(),
            self.bytes
        );
        self.hip
            .memcpy_h2d(self.ptr, data.as_ptr() as *const c_void, data.len())
    }

    pub(crate) fn device_ptr(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    pub(crate) fn copy_from(&self, other: &DeviceBuffer) -> Result<()> {
        ensure_arg!(
            self.bytes == other.bytes,
            "device copy between buffers of {} and {} bytes",
            other.bytes,
            self.bytes
        );
        self.hip.memcpy_d2d(self.ptr, other.ptr, self.bytes)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if self.ptr != 0 {
            let _ = self.hip.free(self.ptr);
            self.ptr = 0;
        }
    }
}

/// Outcome of a tolerance comparison.
///
/// `detail` carries the per-element report when the comparison ran verbose;
/// it is empty otherwise.
pub struct Comparison {
    pub matches: bool,
    pub detail: String,
}

impl Comparison {
    fn mismatch(verbose: bool, reason: &str) -> Self {
        Comparison {
            matches: false,
            detail: if verbose {
                reason.to_string()
            } else {
                String::new()
            },
        }
    }
}

/// Element-by-element tolerance check over two host slices of equal length.
fn compare_values<L: Element, R: Element>(lhs: &[L], rhs: &[R], verbose: bool) -> Comparison {
    let mut matches = true;
    let mut detail = String::new();
    for (index, (left, right)) in lhs.iter().zip(rhs.iter()).enumerate() {
        let within = (left.to_f64() - right.to_f64()).abs() <= FLOAT_TOLERANCE;
        if !within {
            matches = false;
            if !verbose {
                break;
            }
        }
        if verbose {
            use std::fmt::Write as _;
            let marker = if within { "" } else { "  <- mismatch" };
            let _ = writeln!(detail, "[{index}] left {left} | right {right}{marker}");
        }
    }
    Comparison { matches, detail }
}

/// A typed tensor whose elements live in device memory.
///
/// Zero-element shapes are legal and hold no buffer. There is no `Clone`;
/// duplicating device memory is explicit through [`DeviceTensor::try_clone`].
pub struct DeviceTensor<T: Element> {
    hip: Arc<HipLib>,
    shape: Shape,
    buffer: Option<DeviceBuffer>,
    _element: PhantomData<T>,
}

impl<T: Element> DeviceTensor<T> {
    /// Bufferless placeholder with no shape; `reshape` gives it storage.
    pub fn unallocated(ctx: &DeviceContext) -> Self {
        DeviceTensor {
            hip: Arc::clone(ctx.hip()),
            shape: Shape::unset(),
            buffer: None,
            _element: PhantomData,
        }
    }

    /// Zero-filled tensor of the given shape.
    pub fn zeros(ctx: &DeviceContext, shape: Shape) -> Result<Self> {
        ctx.bind()?;
        let count = shape.element_count();
        let buffer = if count == 0 {
            None
        } else {
            Some(DeviceBuffer::alloc_zeroed(
                ctx.hip(),
                count * std::mem::size_of::<T>(),
            )?)
        };
        Ok(DeviceTensor {
            hip: Arc::clone(ctx.hip()),
            shape,
            buffer,
            _element: PhantomData,
        })
    }

    /// Tensor with every element set to `value`.
    pub fn filled(ctx: &DeviceContext, value: T, shape: Shape) -> Result<Self> {
        let mut tensor = Self::zeros(ctx, shape)?;
        if tensor.buffer.is_some() {
            tensor.fill(value)?;
        }
        Ok(tensor)
    }

    /// Tensor initialized from host data; the slice length must match the
    /// shape's element count exactly.
    pub fn from_slice(ctx: &DeviceContext, data: &[T], shape: Shape) -> Result<Self> {
        ctx.bind()?;
        let count = shape.element_count();
        ensure_arg!(
            data.len() == count,
            "source slice has {} elements but shape {:?} holds {count}",
            data.len(),
            shape.dims()
        );
        let buffer = if count == 0 {
            None
        } else {
            Some(DeviceBuffer::from_host(ctx.hip(), as_bytes(data))?)
        };
        Ok(DeviceTensor {
            hip: Arc::clone(ctx.hip()),
            shape,
            buffer,
            _element: PhantomData,
        })
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn size(&self) -> usize {
        self.shape.element_count()
    }

    pub fn dim(&self, index: usize) -> Result<usize> {
        self.shape.dim(index)
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn device_ptr(&self) -> *mut c_void {
        match &self.buffer {
            Some(buffer) => buffer.device_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    pub(crate) fn buffer(&self) -> Result<&DeviceBuffer> {
        self.buffer
            .as_ref()
            .ok_or_else(|| Error::argument("tensor holds no device buffer"))
    }

    /// Drops the current contents and reallocates zero-filled storage for
    /// the tensor's element count.
    pub fn reset(&mut self) -> Result<()> {
        let count = self.size();
        self.buffer = None;
        if count > 0 {
            self.buffer = Some(DeviceBuffer::alloc_zeroed(
                &self.hip,
                count * std::mem::size_of::<T>(),
            )?);
        }
        Ok(())
    }

    /// Overwrites every element in place through a host staging buffer.
    pub fn fill(&mut self, value: T) -> Result<()> {
        let count = self.size();
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| Error::argument("cannot fill an unallocated tensor"))?;
        let staged = vec![value; count];
        buffer.upload(as_bytes(&staged))
    }

    /// Adopts a new shape and reallocates zero-filled storage sized from it.
    pub fn reshape(&mut self, shape: Shape) -> Result<()> {
        self.shape = shape;
        self.reset()
    }

    /// Deep copy into freshly allocated device memory.
    pub fn try_clone(&self) -> Result<Self> {
        let buffer = match &self.buffer {
            None => None,
            Some(src) => {
                let dst = DeviceBuffer::alloc(&self.hip, src.bytes())?;
                dst.copy_from(src)?;
                Some(dst)
            }
        };
        Ok(DeviceTensor {
            hip: Arc::clone(&self.hip),
            shape: self.shape.clone(),
            buffer,
            _element: PhantomData,
        })
    }

    /// Downloads the full contents to the host.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let count = self.size();
        let mut out = vec![T::default(); count];
        if let Some(buffer) = &self.buffer {
            self.hip.memcpy_d2h(
                out.as_mut_ptr() as *mut c_void,
                buffer.device_ptr() as usize,
                count * std::mem::size_of::<T>(),
            )?;
        }
        Ok(out)
    }

    pub fn scalar_add(&mut self, ctx: &DeviceContext, value: T) -> Result<()> {
        self.apply_scalar(ctx, ScalarOp::Add, value)
    }

    pub fn scalar_sub(&mut self, ctx: &DeviceContext, value: T) -> Result<()> {
        self.apply_scalar(ctx, ScalarOp::Sub, value)
    }

    pub fn scalar_mul(&mut self, ctx: &DeviceContext, value: T) -> Result<()> {
        self.apply_scalar(ctx, ScalarOp::Mul, value)
    }

    pub fn scalar_div(&mut self, ctx: &DeviceContext, value: T) -> Result<()> {
        self.apply_scalar(ctx, ScalarOp::Div, value)
    }

    fn apply_scalar(&mut self, ctx: &DeviceContext, op: ScalarOp, mut value: T) -> Result<()> {
        let buffer = self
            .buffer
            .as_ref()
            .ok_or_else(|| Error::argument("scalar arithmetic on an unallocated tensor"))?;
        ctx.bind()?;
        let kernels = ctx.kernels()?;
        let mut data = buffer.device_ptr();
        let mut count = self.size() as u64;
        let mut params = [
            &mut data as *mut *mut c_void as *mut c_void,
            &mut value as *mut T as *mut c_void,
            &mut count as *mut u64 as *mut c_void,
        ];
        kernels.launch(
            &scalar_kernel_name(op, T::DTYPE),
            grid_size(self.size()),
            ctx.stream(),
            &mut params,
        )?;
        ctx.synchronize()
    }

    /// Tolerance comparison against another device tensor.
    ///
    /// Element types, buffer presence and shapes are checked before any data
    /// moves; a mismatch in any of them is a non-equal outcome, not an
    /// error. With `verbose` the result carries a line per element.
    pub fn compare<R: Element>(&self, other: &DeviceTensor<R>, verbose: bool) -> Result<Comparison> {
        if T::DTYPE != R::DTYPE {
            return Ok(Comparison::mismatch(
                verbose,
                &format!("element types differ: {} vs {}", T::DTYPE, R::DTYPE),
            ));
        }
        if self.buffer.is_none() || other.buffer.is_none() {
            return Ok(Comparison::mismatch(
                verbose,
                "one or both tensors hold no device buffer",
            ));
        }
        if self.shape.dims() != other.shape.dims() {
            return Ok(Comparison::mismatch(
                verbose,
                &format!(
                    "shapes differ: {:?} vs {:?}",
                    self.shape.dims(),
                    other.shape.dims()
                ),
            ));
        }
        let lhs = self.to_vec()?;
        let rhs = other.to_vec()?;
        Ok(compare_values(&lhs, &rhs, verbose))
    }

    /// Tolerance comparison against host reference data.
    pub fn compare_host<R: Element>(&self, expected: &[R], verbose: bool) -> Result<Comparison> {
        if T::DTYPE != R::DTYPE {
            return Ok(Comparison::mismatch(
                verbose,
                &format!("element types differ: {} vs {}", T::DTYPE, R::DTYPE),
            ));
        }
        if self.buffer.is_none() {
            return Ok(Comparison::mismatch(verbose, "tensor holds no device buffer"));
        }
        if self.size() != expected.len() {
            return Ok(Comparison::mismatch(
                verbose,
                &format!(
                    "element counts differ: {} vs {}",
                    self.size(),
                    expected.len()
                ),
            ));
        }
        let lhs = self.to_vec()?;
        Ok(compare_values(&lhs, expected, verbose))
    }

    pub fn approx_eq<R: Element>(&self, other: &DeviceTensor<R>) -> Result<bool> {
        Ok(self.compare(other, false)?.matches)
    }

    pub fn approx_eq_host<R: Element>(&self, expected: &[R]) -> Result<bool> {
        Ok(self.compare_host(expected, false)?.matches)
    }
}

impl<T: Element> fmt::Debug for DeviceTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTensor")
            .field("dtype", &T::DTYPE)
            .field("shape", &self.shape.dims())
            .field("allocated", &self.buffer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_within_tolerance_match() {
        let left = [1.0f32, 2.0, 3.0];
        let right = [1.009f32, 1.991, 3.0];
        assert!(compare_values(&left, &right, false).matches);
    }

    #[test]
    fn values_outside_tolerance_do_not_match() {
        let left = [1.0f32, 2.0];
        let right = [1.0f32, 2.011];
        assert!(!compare_values(&left, &right, false).matches);
    }

    #[test]
    fn integer_comparison_uses_the_same_tolerance() {
        assert!(compare_values(&[5i32, 6], &[5i32, 6], false).matches);
        assert!(!compare_values(&[5i32], &[6i32], false).matches);
    }

    #[test]
    fn verbose_report_covers_every_element() {
        let outcome = compare_values(&[1.0f32, 2.0, 3.0], &[1.0f32, 9.0, 3.0], true);
        assert!(!outcome.matches);
        assert_eq!(outcome.detail.lines().count(), 3);
        assert!(outcome.detail.contains("<- mismatch"));
    }

    #[test]
    fn terse_report_is_empty() {
        let outcome = compare_values(&[1.0f32], &[9.0f32], false);
        assert!(!outcome.matches);
        assert!(outcome.detail.is_empty());
    }

    #[test]
    fn empty_slices_match() {
        let empty: [f32; 0] = [];
        assert!(compare_values(&empty, &empty, true).matches);
    }
}
