//! Transposed convolution.
//!
//! Same backend calls as plain convolution with the transpose mode set; the
//! extra validation here is that the descriptor really is transposed and
//! carries an explicit dilation.

use crate::context::DeviceContext;
use crate::descriptor::{ConvDescriptor, ConvMode};
use crate::dtype::Element;
use crate::error::{ensure_arg, Result};
use crate::tensor::DeviceTensor;

use super::convolution;

fn validate(desc: &ConvDescriptor) -> Result<()> {
    ensure_arg!(
        desc.mode()? == ConvMode::Transpose,
        "deconvolution requires the \"deconv\" mode, got {:?}",
        desc.mode
    );
    ensure_arg!(
        desc.dilation.len() == 2,
        "deconvolution requires an explicit two-axis dilation"
    );
    Ok(())
}

pub fn forward<T: Element>(
    ctx: &DeviceContext,
    desc: &ConvDescriptor,
    x: &DeviceTensor<T>,
    w: &DeviceTensor<T>,
    bias: Option<&DeviceTensor<T>>,
    y: &mut DeviceTensor<T>,
) -> Result<()> {
    validate(desc)?;
    convolution::forward(ctx, desc, x, w, bias, y)
}

pub fn backward_weights<T: Element>(
    ctx: &DeviceContext,
    desc: &ConvDescriptor,
    dy: &DeviceTensor<T>,
    x: &DeviceTensor<T>,
    dw: &mut DeviceTensor<T>,
    dbias: Option<&mut DeviceTensor<T>>,
) -> Result<()> {
    validate(desc)?;
    convolution::backward_weights(ctx, desc, dy, x, dw, dbias)
}

pub fn backward_data<T: Element>(
    ctx: &DeviceContext,
    desc: &ConvDescriptor,
    dy: &DeviceTensor<T>,
    w: &DeviceTensor<T>,
    dx: &mut DeviceTensor<T>,
) -> Result<()> {
    validate(desc)?;
    convolution::backward_data(ctx, desc, dy, w, dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn plain_conv_descriptors_are_rejected() {
        let desc = ConvDescriptor::with_dilation("conv", [0, 0], [1, 1], [1, 1]);
        assert!(matches!(validate(&desc), Err(Error::Argument(_))));
    }

    #[test]
    fn missing_dilation_is_rejected() {
        let desc = ConvDescriptor::new("deconv", [0, 0], [1, 1]);
        assert!(matches!(validate(&desc), Err(Error::Argument(_))));
    }

    #[test]
    fn transposed_descriptor_with_dilation_passes() {
        let desc = ConvDescriptor::with_dilation("deconv", [0, 0], [1, 1], [1, 1]);
        assert!(validate(&desc).is_ok());
    }
}
