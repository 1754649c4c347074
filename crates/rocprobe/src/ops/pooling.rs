//! 2-d pooling over MIOpen.

use crate::context::DeviceContext;
use crate::descriptor::PoolingDescriptor;
use crate::dtype::Element;
use crate::error::Result;
use crate::tensor::DeviceTensor;

use super::{require_f32, workspace, PoolDescGuard, TensorDescGuard};

/// y = pool(x), overwriting y. The index workspace is sized from the output
/// descriptor and lives only for this call; `backward` allocates its own.
pub fn forward<T: Element>(
    ctx: &DeviceContext,
    desc: &PoolingDescriptor,
    x: &DeviceTensor<T>,
    y: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("pooling forward")?;
    let mode = desc.mode()?;
    ctx.bind()?;

    let lib = ctx.miopen_lib();
    let x_desc = TensorDescGuard::new_4d(lib, x.shape())?;
    let y_desc = TensorDescGuard::new_4d(lib, y.shape())?;
    let pool_desc = PoolDescGuard::new(lib, mode.backend_mode(), desc.kernel, desc.padding, desc.stride)?;

    let bytes = lib.pooling_workspace_size(y_desc.raw())?;
    let scratch = workspace::<T>(ctx, bytes)?;
    lib.pooling_forward(
        ctx.miopen_handle(),
        pool_desc.raw(),
        (x_desc.raw(), x.device_ptr()),
        (y_desc.raw(), y.device_ptr()),
        scratch.device_ptr(),
        bytes,
    )?;
    ctx.synchronize()
}

/// dx = pool-gradient(y, dy, x), overwriting dx.
pub fn backward<T: Element>(
    ctx: &DeviceContext,
    desc: &PoolingDescriptor,
    y: &DeviceTensor<T>,
    dy: &DeviceTensor<T>,
    x: &DeviceTensor<T>,
    dx: &mut DeviceTensor<T>,
) -> Result<()> {
    require_f32::<T>("pooling backward")?;
    let mode = desc.mode()?;
    ctx.bind()?;

    let lib = ctx.miopen_lib();
    let y_desc = TensorDescGuard::new_4d(lib, y.shape())?;
    let dy_desc = TensorDescGuard::new_4d(lib, dy.shape())?;
    let x_desc = TensorDescGuard::new_4d(lib, x.shape())?;
    let dx_desc = TensorDescGuard::new_4d(lib, dx.shape())?;
    let pool_desc = PoolDescGuard::new(lib, mode.backend_mode(), desc.kernel, desc.padding, desc.stride)?;

    let bytes = lib.pooling_workspace_size(y_desc.raw())?;
    let scratch = workspace::<T>(ctx, bytes)?;
    lib.pooling_backward(
        ctx.miopen_handle(),
        pool_desc.raw(),
        (y_desc.raw(), y.device_ptr()),
        (dy_desc.raw(), dy.device_ptr()),
        (x_desc.raw(), x.device_ptr()),
        (dx_desc.raw(), dx.device_ptr()),
        scratch.device_ptr(),
    )?;
    ctx.synchronize()
}
