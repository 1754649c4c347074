//! Generic BLAS passthroughs over hipBLAS.
//!
//! Extents follow BLAS column-major conventions. Inputs are f32-only at
//! runtime, matching the resolved entry points.

use crate::context::DeviceContext;
use crate::dtype::Element;
use crate::error::{ensure_arg, Result};
use crate::ffi::hipblas;
use crate::tensor::{DeviceBuffer, DeviceTensor};

use super::require_f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlasOp {
    None,
    Transpose,
}

impl BlasOp {
    pub(crate) fn backend_op(self) -> i32 {
        match self {
            BlasOp::None => hipblas::OP_N,
            BlasOp::Transpose => hipblas::OP_T,
        }
    }
}

/// Leading dimensions of the A and B operands for one (transa, transb)
/// layout; C always has leading dimension m.
pub(crate) fn gemm_leading_dims(transa: BlasOp, transb: BlasOp, m: usize, n: usize, k: usize) -> (i32, i32) {
    let lda = if transa == BlasOp::Transpose { k } else { m };
    let ldb = if transb == BlasOp::Transpose { n } else { k };
    (lda as i32, ldb as i32)
}

/// Narrows an extent to the i32 the BLAS entry points take.
pub(crate) fn extent(value: usize, what: &str) -> Result<i32> {
    ensure_arg!(
        value <= i32::MAX as usize,
        "{what} of {value} overflows the BLAS extent"
    );
    Ok(value as i32)
}

/// result[0] = x[..n] . y[..n], written directly into device memory.
pub fn dot<T: Element>(
    ctx: &DeviceContext,
    n: usize,
    x: &DeviceTensor<T>,
    y: &DeviceTensor<T>,
    result: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("dot")?;
    ensure_arg!(
        n <= x.size() && n <= y.size(),
        "dot over {n} elements exceeds operand sizes {} and {}",
        x.size(),
        y.size()
    );
    ensure_arg!(result.is_allocated(), "dot needs an allocated result tensor");
    let n = extent(n, "dot length")?;
    ctx.bind()?;
    let lib = ctx.blas_lib();
    // The output pointer is device memory, so the scalar pointer mode is
    // switched around the call and restored after.
    lib.set_pointer_mode_device(ctx.blas_handle())?;
    lib.sdot(
        ctx.blas_handle(),
        n,
        x.device_ptr(),
        y.device_ptr(),
        result.device_ptr(),
    )?;
    lib.set_pointer_mode_host(ctx.blas_handle())?;
    ctx.synchronize()
}

/// y = alpha * op(A) x + beta * y with A an m x n column-major matrix.
#[allow(clippy::too_many_arguments)]
pub fn gemv<T: Element>(
    ctx: &DeviceContext,
    trans: BlasOp,
    m: usize,
    n: usize,
    alpha: f32,
    a: &DeviceTensor<T>,
    x: &DeviceTensor<T>,
    beta: f32,
    y: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("gemv")?;
    let m = extent(m, "gemv rows")?;
    let n = extent(n, "gemv columns")?;
    ctx.bind()?;
    ctx.blas_lib().sgemv(
        ctx.blas_handle(),
        trans.backend_op(),
        m,
        n,
        alpha,
        a.device_ptr(),
        m,
        x.device_ptr(),
        beta,
        y.device_ptr(),
    )?;
    ctx.synchronize()
}

/// A += alpha * x y^T with A an m x n column-major matrix.
pub fn ger<T: Element>(
    ctx: &DeviceContext,
    m: usize,
    n: usize,
    alpha: f32,
    x: &DeviceTensor<T>,
    y: &DeviceTensor<T>,
    a: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("ger")?;
    let m = extent(m, "ger rows")?;
    let n = extent(n, "ger columns")?;
    ctx.bind()?;
    ctx.blas_lib().sger(
        ctx.blas_handle(),
        m,
        n,
        alpha,
        x.device_ptr(),
        y.device_ptr(),
        a.device_ptr(),
        m,
    )?;
    ctx.synchronize()
}

/// C = alpha * op(A) op(B) + beta * C, all column-major, C being m x n.
#[allow(clippy::too_many_arguments)]
pub fn gemm<T: Element>(
    ctx: &DeviceContext,
    transa: BlasOp,
    transb: BlasOp,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &DeviceTensor<T>,
    b: &DeviceTensor<T>,
    beta: f32,
    c: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("gemm")?;
    let (lda, ldb) = gemm_leading_dims(transa, transb, m, n, k);
    let m = extent(m, "gemm rows")?;
    let n = extent(n, "gemm columns")?;
    let k = extent(k, "gemm depth")?;
    ctx.bind()?;
    ctx.blas_lib().sgemm(
        ctx.blas_handle(),
        transa.backend_op(),
        transb.backend_op(),
        m,
        n,
        k,
        alpha,
        a.device_ptr(),
        lda,
        b.device_ptr(),
        ldb,
        beta,
        c.device_ptr(),
        m,
    )?;
    ctx.synchronize()
}

/// Batched gemm over contiguous batches: batch i uses A + i*m*k, B + i*k*n
/// and C + i*m*n. The per-batch pointers are staged into a device-resident
/// pointer table, A pointers first, then B, then C.
#[allow(clippy::too_many_arguments)]
pub fn batched_gemm<T: Element>(
    ctx: &DeviceContext,
    transa: BlasOp,
    transb: BlasOp,
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &DeviceTensor<T>,
    b: &DeviceTensor<T>,
    beta: f32,
    c: &mut DeviceTensor<T>,
    batch_count: usize,
) -> Result<()> {
    require_f32::<T>("batched gemm")?;
    ensure_arg!(batch_count > 0, "batched gemm needs at least one batch");
    ensure_arg!(
        a.size() >= batch_count * m * k
            && b.size() >= batch_count * k * n
            && c.size() >= batch_count * m * n,
        "batched gemm operands are smaller than {batch_count} batches of {m}x{n}x{k}"
    );
    let m_arg = extent(m, "batched gemm rows")?;
    let n_arg = extent(n, "batched gemm columns")?;
    let k_arg = extent(k, "batched gemm depth")?;
    let batch_arg = extent(batch_count, "batched gemm batch count")?;
    ctx.bind()?;

    let elem = std::mem::size_of::<T>();
    let a_base = a.device_ptr() as usize;
    let b_base = b.device_ptr() as usize;
    let c_base = c.device_ptr() as usize;
    let mut table: Vec<usize> = Vec::with_capacity(3 * batch_count);
    for i in 0..batch_count {
        table.push(a_base + i * m * k * elem);
    }
    for i in 0..batch_count {
        table.push(b_base + i * k * n * elem);
    }
    for i in 0..batch_count {
        table.push(c_base + i * m * n * elem);
    }
    // Stream-ordered upload; `table` stays alive until the trailing drain.
    let table_len = table.len() * std::mem::size_of::<usize>();
    let staged = DeviceBuffer::alloc(ctx.hip(), table_len)?;
    ctx.hip().memcpy_h2d_async(
        staged.device_ptr() as usize,
        table.as_ptr() as *const std::ffi::c_void,
        table_len,
        ctx.stream(),
    )?;

    let ptr_bytes = std::mem::size_of::<usize>();
    let a_array = staged.device_ptr() as usize;
    let b_array = a_array + batch_count * ptr_bytes;
    let c_array = b_array + batch_count * ptr_bytes;
    let (lda, ldb) = gemm_leading_dims(transa, transb, m, n, k);
    ctx.blas_lib().sgemm_batched(
        ctx.blas_handle(),
        transa.backend_op(),
        transb.backend_op(),
        m_arg,
        n_arg,
        k_arg,
        alpha,
        a_array,
        lda,
        b_array,
        ldb,
        beta,
        c_array,
        m_arg,
        batch_arg,
    )?;
    ctx.synchronize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn extents_beyond_i32_are_rejected() {
        assert_eq!(extent(0, "dot length").unwrap(), 0);
        assert_eq!(extent(i32::MAX as usize, "dot length").unwrap(), i32::MAX);
        let err = extent(i32::MAX as usize + 1, "gemm rows").unwrap_err();
        assert!(matches!(err, Error::Argument(_)));
        assert!(err.to_string().contains("gemm rows"));
    }

    #[test]
    fn untransposed_operands_lead_with_their_rows() {
        assert_eq!(gemm_leading_dims(BlasOp::None, BlasOp::None, 3, 5, 7), (3, 7));
    }

    #[test]
    fn transposed_operands_lead_with_their_stored_rows() {
        assert_eq!(
            gemm_leading_dims(BlasOp::Transpose, BlasOp::None, 3, 5, 7),
            (7, 7)
        );
        assert_eq!(
            gemm_leading_dims(BlasOp::None, BlasOp::Transpose, 3, 5, 7),
            (3, 5)
        );
        assert_eq!(
            gemm_leading_dims(BlasOp::Transpose, BlasOp::Transpose, 3, 5, 7),
            (7, 5)
        );
    }
}
