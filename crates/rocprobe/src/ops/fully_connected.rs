//! Fully-connected layer as gemm reductions plus bias kernels.
//!
//! The input collapses to a batch x features matrix: the leading dimension
//! is the batch, everything after it flattens into the feature axis. Weights
//! are stored out_features x in_features, activations row-major, which under
//! hipBLAS's column-major view gives the (T,N), (N,T) and (N,N) layouts
//! below.

use std::ffi::c_void;

use crate::context::DeviceContext;
use crate::dtype::Element;
use crate::error::{ensure_arg, Result};
use crate::kernels::{grid_size, FC_BACKWARD_BIAS, FC_FORWARD_BIAS};
use crate::tensor::DeviceTensor;

use super::blas::{self, BlasOp};
use super::require_f32;

/// Splits an element count into (batch, features) around the leading
/// dimension.
pub(crate) fn collapse_leading(size: usize, leading: usize) -> Result<(usize, usize)> {
    ensure_arg!(leading > 0, "fully-connected operand has an empty leading dimension");
    ensure_arg!(
        size % leading == 0,
        "element count {size} is not divisible by the leading dimension {leading}"
    );
    Ok((leading, size / leading))
}

/// y = x W^T (+ bias), with x collapsed to batch x in_features and W stored
/// out_features x in_features. y is overwritten.
pub fn forward<T: Element>(
    ctx: &DeviceContext,
    x: &DeviceTensor<T>,
    w: &DeviceTensor<T>,
    bias: Option<&DeviceTensor<T>>,
    y: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("fully-connected forward")?;
    let (batch, in_features) = collapse_leading(x.size(), x.dim(0)?)?;
    let out_features = w.dim(0)?;
    ensure_arg!(
        w.size() == out_features * in_features,
        "weight of {} elements does not match {out_features}x{in_features}",
        w.size()
    );
    ensure_arg!(
        y.size() == batch * out_features,
        "output of {} elements does not match {batch}x{out_features}",
        y.size()
    );

    // Row-major y[batch][out] seen column-major is out x batch: W^T x^T.
    blas::gemm(
        ctx,
        BlasOp::Transpose,
        BlasOp::None,
        out_features,
        batch,
        in_features,
        1.0,
        w,
        x,
        0.0,
        y,
    )?;

    if let Some(bias) = bias {
        ensure_arg!(
            bias.size() == out_features,
            "bias of {} elements does not match {out_features} output features",
            bias.size()
        );
        launch_bias_kernel(ctx, FC_FORWARD_BIAS, batch, out_features, bias.device_ptr(), y.device_ptr())?;
    }
    ctx.synchronize()
}

/// dW = dy^T x and dbias = column sums of dy. Both outputs are overwritten.
pub fn backward_weights<T: Element>(
    ctx: &DeviceContext,
    dy: &DeviceTensor<T>,
    x: &DeviceTensor<T>,
    dw: &mut DeviceTensor<T>,
    dbias: Option<&mut DeviceTensor<T>>,
) -> Result<()> {
    require_f32::<T>("fully-connected backward weights")?;
    let (batch, in_features) = collapse_leading(x.size(), x.dim(0)?)?;
    let out_features = dw.dim(0)?;
    ensure_arg!(
        dy.size() == batch * out_features,
        "gradient of {} elements does not match {batch}x{out_features}",
        dy.size()
    );

    blas::gemm(
        ctx,
        BlasOp::None,
        BlasOp::Transpose,
        in_features,
        out_features,
        batch,
        1.0,
        x,
        dy,
        0.0,
        dw,
    )?;

    if let Some(dbias) = dbias {
        ensure_arg!(
            dbias.size() == out_features,
            "bias gradient of {} elements does not match {out_features} output features",
            dbias.size()
        );
        launch_bias_kernel(
            ctx,
            FC_BACKWARD_BIAS,
            batch,
            out_features,
            dy.device_ptr(),
            dbias.device_ptr(),
        )?;
    }
    ctx.synchronize()
}

/// dx = dy W, overwriting dx.
pub fn backward_data<T: Element>(
    ctx: &DeviceContext,
    dy: &DeviceTensor<T>,
    w: &DeviceTensor<T>,
    dx: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("fully-connected backward data")?;
    let (batch, in_features) = collapse_leading(dx.size(), dx.dim(0)?)?;
    let out_features = w.dim(0)?;
    ensure_arg!(
        dy.size() == batch * out_features,
        "gradient of {} elements does not match {batch}x{out_features}",
        dy.size()
    );

    blas::gemm(
        ctx,
        BlasOp::None,
        BlasOp::None,
        in_features,
        batch,
        out_features,
        1.0,
        w,
        dy,
        0.0,
        dx,
    )?;
    ctx.synchronize()
}

fn launch_bias_kernel(
    ctx: &DeviceContext,
    name: &str,
    rows: usize,
    cols: usize,
    input: *mut c_void,
    output: *mut c_void,
) -> Result<()> {
    let kernels = ctx.kernels()?;
    let mut rows_arg = rows as u32;
    let mut cols_arg = cols as u32;
    let mut input_ptr = input;
    let mut output_ptr = output;
    let mut params = [
        &mut rows_arg as *mut u32 as *mut c_void,
        &mut cols_arg as *mut u32 as *mut c_void,
        &mut input_ptr as *mut *mut c_void as *mut c_void,
        &mut output_ptr as *mut *mut c_void as *mut c_void,
    ];
    kernels.launch(name, grid_size(cols), ctx.stream(), &mut params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn trailing_dims_collapse_into_features() -> Result<()> {
        // A {2, 3, 4, 4} activation is 2 rows of 48 features.
        assert_eq!(collapse_leading(96, 2)?, (2, 48));
        assert_eq!(collapse_leading(10, 10)?, (10, 1));
        Ok(())
    }

    #[test]
    fn empty_leading_dimension_is_rejected() {
        assert!(matches!(collapse_leading(0, 0), Err(Error::Argument(_))));
    }

    #[test]
    fn indivisible_counts_are_rejected() {
        assert!(matches!(collapse_leading(7, 2), Err(Error::Argument(_))));
    }
}
