//! Convolution operators over MIOpen.
//!
//! Every direction follows the same protocol: query the workspace bound,
//! benchmark algorithms against a scratch tensor of that size, shrink the
//! scratch to what the chosen algorithm actually needs, execute, then drain
//! the stream.

use crate::context::DeviceContext;
use crate::descriptor::ConvDescriptor;
use crate::dtype::Element;
use crate::error::Result;
use crate::shape::Shape;
use crate::tensor::DeviceTensor;

use super::{require_f32, workspace, ConvDescGuard, TensorDescGuard};

/// y = conv(x, w), plus a per-channel bias when given. y is overwritten.
pub fn forward<T: Element>(
    ctx: &DeviceContext,
    desc: &ConvDescriptor,
    x: &DeviceTensor<T>,
    w: &DeviceTensor<T>,
    bias: Option<&DeviceTensor<T>>,
    y: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("convolution forward")?;
    let mode = desc.mode()?;
    let dilation = desc.effective_dilation()?;
    ctx.bind()?;

    let lib = ctx.miopen_lib();
    let x_desc = TensorDescGuard::new_4d(lib, x.shape())?;
    let w_desc = TensorDescGuard::new_4d(lib, w.shape())?;
    let y_desc = TensorDescGuard::new_4d(lib, y.shape())?;
    let conv_desc = ConvDescGuard::new(lib, mode.backend_mode(), desc.padding, desc.stride, dilation)?;

    let bound = lib.conv_forward_workspace_size(
        ctx.miopen_handle(),
        w_desc.raw(),
        x_desc.raw(),
        conv_desc.raw(),
        y_desc.raw(),
    )?;
    let mut scratch = workspace::<T>(ctx, bound)?;
    let perf = lib.find_conv_forward_algorithm(
        ctx.miopen_handle(),
        (x_desc.raw(), x.device_ptr()),
        (w_desc.raw(), w.device_ptr()),
        conv_desc.raw(),
        (y_desc.raw(), y.device_ptr()),
        scratch.device_ptr(),
        bound,
    )?;
    scratch.reshape(Shape::new([perf.memory.div_ceil(std::mem::size_of::<T>())])?)?;
    lib.convolution_forward(
        ctx.miopen_handle(),
        (x_desc.raw(), x.device_ptr()),
        (w_desc.raw(), w.device_ptr()),
        conv_desc.raw(),
        perf.algo,
        (y_desc.raw(), y.device_ptr()),
        scratch.device_ptr(),
        perf.memory,
    )?;

    if let Some(bias) = bias {
        let b_desc = TensorDescGuard::new_bias(lib, bias.dim(0)? as i32)?;
        lib.convolution_forward_bias(
            ctx.miopen_handle(),
            (b_desc.raw(), bias.device_ptr()),
            (y_desc.raw(), y.device_ptr()),
        )?;
    }
    ctx.synchronize()
}

/// dw = conv-weight-gradient(dy, x); db (when given) sums dy per channel.
/// Both outputs are overwritten.
pub fn backward_weights<T: Element>(
    ctx: &DeviceContext,
    desc: &ConvDescriptor,
    dy: &DeviceTensor<T>,
    x: &DeviceTensor<T>,
    dw: &mut DeviceTensor<T>,
    dbias: Option<&mut DeviceTensor<T>>,
) -> Result<()> {
    require_f32::<T>("convolution backward weights")?;
    let mode = desc.mode()?;
    let dilation = desc.effective_dilation()?;
    ctx.bind()?;

    let lib = ctx.miopen_lib();
    let dy_desc = TensorDescGuard::new_4d(lib, dy.shape())?;
    let x_desc = TensorDescGuard::new_4d(lib, x.shape())?;
    let dw_desc = TensorDescGuard::new_4d(lib, dw.shape())?;
    let conv_desc = ConvDescGuard::new(lib, mode.backend_mode(), desc.padding, desc.stride, dilation)?;

    let bound = lib.conv_backward_weights_workspace_size(
        ctx.miopen_handle(),
        dy_desc.raw(),
        x_desc.raw(),
        conv_desc.raw(),
        dw_desc.raw(),
    )?;
    let mut scratch = workspace::<T>(ctx, bound)?;
    let perf = lib.find_conv_backward_weights_algorithm(
        ctx.miopen_handle(),
        (dy_desc.raw(), dy.device_ptr()),
        (x_desc.raw(), x.device_ptr()),
        conv_desc.raw(),
        (dw_desc.raw(), dw.device_ptr()),
        scratch.device_ptr(),
        bound,
    )?;
    scratch.reshape(Shape::new([perf.memory.div_ceil(std::mem::size_of::<T>())])?)?;
    lib.convolution_backward_weights(
        ctx.miopen_handle(),
        (dy_desc.raw(), dy.device_ptr()),
        (x_desc.raw(), x.device_ptr()),
        conv_desc.raw(),
        perf.algo,
        (dw_desc.raw(), dw.device_ptr()),
        scratch.device_ptr(),
        perf.memory,
    )?;

    if let Some(dbias) = dbias {
        let db_desc = TensorDescGuard::new_bias(lib, dbias.dim(0)? as i32)?;
        lib.convolution_backward_bias(
            ctx.miopen_handle(),
            (dy_desc.raw(), dy.device_ptr()),
            (db_desc.raw(), dbias.device_ptr()),
        )?;
    }
    ctx.synchronize()
}

/// dx = conv-data-gradient(dy, w), overwriting dx.
pub fn backward_data<T: Element>(
    ctx: &DeviceContext,
    desc: &ConvDescriptor,
    dy: &DeviceTensor<T>,
    w: &DeviceTensor<T>,
    dx: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("convolution backward data")?;
    let mode = desc.mode()?;
    let dilation = desc.effective_dilation()?;
    ctx.bind()?;

    let lib = ctx.miopen_lib();
    let dy_desc = TensorDescGuard::new_4d(lib, dy.shape())?;
    let w_desc = TensorDescGuard::new_4d(lib, w.shape())?;
    let dx_desc = TensorDescGuard::new_4d(lib, dx.shape())?;
    let conv_desc = ConvDescGuard::new(lib, mode.backend_mode(), desc.padding, desc.stride, dilation)?;

    let bound = lib.conv_backward_data_workspace_size(
        ctx.miopen_handle(),
        dy_desc.raw(),
        w_desc.raw(),
        conv_desc.raw(),
        dx_desc.raw(),
    )?;
    let mut scratch = workspace::<T>(ctx, bound)?;
    let perf = lib.find_conv_backward_data_algorithm(
        ctx.miopen_handle(),
        (dy_desc.raw(), dy.device_ptr()),
        (w_desc.raw(), w.device_ptr()),
        conv_desc.raw(),
        (dx_desc.raw(), dx.device_ptr()),
        scratch.device_ptr(),
        bound,
    )?;
    scratch.reshape(Shape::new([perf.memory.div_ceil(std::mem::size_of::<T>())])?)?;
    lib.convolution_backward_data(
        ctx.miopen_handle(),
        (dy_desc.raw(), dy.device_ptr()),
        (w_desc.raw(), w.device_ptr()),
        conv_desc.raw(),
        perf.algo,
        (dx_desc.raw(), dx.device_ptr()),
        scratch.device_ptr(),
        perf.memory,
    )?;
    ctx.synchronize()
}
