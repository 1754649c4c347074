//! Operation descriptors.
//!
//! Descriptors are plain host-side configuration. Mode tags stay as strings
//! until an operator needs the backend enum, so building a descriptor never
//! fails; an unknown tag surfaces as an `Argument` error at execution time.

use crate::error::{ensure_arg, Error, Result};
use crate::ffi::miopen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvMode {
    Convolution,
    Transpose,
}

impl ConvMode {
    pub(crate) fn backend_mode(self) -> i32 {
        match self {
            ConvMode::Convolution => miopen::CONV_MODE_CONVOLUTION,
            ConvMode::Transpose => miopen::CONV_MODE_TRANSPOSE,
        }
    }
}

/// Configuration shared by the convolution and deconvolution operators.
#[derive(Debug, Clone)]
pub struct ConvDescriptor {
    pub mode: String,
    pub padding: [i32; 2],
    pub stride: [i32; 2],
    /// Empty means "unspecified"; plain convolution defaults it to ones,
    /// transposed convolution requires it.
    pub dilation: Vec<i32>,
}

impl ConvDescriptor {
    pub fn new(mode: &str, padding: [i32; 2], stride: [i32; 2]) -> Self {
        ConvDescriptor {
            mode: mode.to_string(),
            padding,
            stride,
            dilation: Vec::new(),
        }
    }

    pub fn with_dilation(
        mode: &str,
        padding: [i32; 2],
        stride: [i32; 2],
        dilation: [i32; 2],
    ) -> Self {
        ConvDescriptor {
            mode: mode.to_string(),
            padding,
            stride,
            dilation: dilation.to_vec(),
        }
    }

    pub fn mode(&self) -> Result<ConvMode> {
        match self.mode.as_str() {
            "conv" => Ok(ConvMode::Convolution),
            "deconv" => Ok(ConvMode::Transpose),
            other => Err(Error::argument(format!(
                "unknown convolution mode {other:?}"
            ))),
        }
    }

    /// Dilation actually handed to the backend.
    ///
    /// Plain convolution only supports unit dilation: an unspecified
    /// dilation is defaulted to ones and an explicit non-unit one is
    /// rejected. Transposed mode forwards the caller's dilation verbatim and
    /// requires it to be present.
    pub fn effective_dilation(&self) -> Result<[i32; 2]> {
        match self.mode()? {
            ConvMode::Convolution => {
                if self.dilation.is_empty() {
                    return Ok([1, 1]);
                }
                ensure_arg!(
                    self.dilation.len() == 2 && self.dilation.iter().all(|&d| d == 1),
                    "plain convolution requires unit dilation, got {:?}",
                    self.dilation
                );
                Ok([1, 1])
            }
            ConvMode::Transpose => {
                ensure_arg!(
                    self.dilation.len() == 2,
                    "transposed convolution requires an explicit two-axis dilation, got {:?}",
                    self.dilation
                );
                Ok([self.dilation[0], self.dilation[1]])
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMode {
    Max,
    /// Average over the in-bounds window only.
    Average,
    /// Average counting padded positions in the divisor.
    AverageInclusive,
}

impl PoolingMode {
    pub(crate) fn backend_mode(self) -> i32 {
        match self {
            PoolingMode::Max => miopen::POOLING_MAX,
            PoolingMode::Average => miopen::POOLING_AVERAGE,
            PoolingMode::AverageInclusive => miopen::POOLING_AVERAGE_INCLUSIVE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolingDescriptor {
    pub mode: String,
    pub kernel: [i32; 2],
    pub padding: [i32; 2],
    pub stride: [i32; 2],
}

impl PoolingDescriptor {
    pub fn new(mode: &str, kernel: [i32; 2], padding: [i32; 2], stride: [i32; 2]) -> Self {
        PoolingDescriptor {
            mode: mode.to_string(),
            kernel,
            padding,
            stride,
        }
    }

    pub fn mode(&self) -> Result<PoolingMode> {
        match self.mode.as_str() {
            "max" => Ok(PoolingMode::Max),
            "avg" => Ok(PoolingMode::Average),
            "avg_include_pad" => Ok(PoolingMode::AverageInclusive),
            other => Err(Error::argument(format!("unknown pooling mode {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv_mode_tags_resolve_lazily() -> Result<()> {
        assert_eq!(
            ConvDescriptor::new("conv", [0, 0], [1, 1]).mode()?,
            ConvMode::Convolution
        );
        assert_eq!(
            ConvDescriptor::new("deconv", [0, 0], [1, 1]).mode()?,
            ConvMode::Transpose
        );
        Ok(())
    }

    #[test]
    fn unknown_conv_mode_is_an_argument_error() {
        let desc = ConvDescriptor::new("dilated", [0, 0], [1, 1]);
        assert!(matches!(desc.mode(), Err(Error::Argument(_))));
    }

    #[test]
    fn plain_conv_defaults_missing_dilation_to_ones() -> Result<()> {
        let desc = ConvDescriptor::new("conv", [1, 1], [3, 3]);
        assert_eq!(desc.effective_dilation()?, [1, 1]);
        Ok(())
    }

    #[test]
    fn plain_conv_accepts_explicit_unit_dilation() -> Result<()> {
        let desc = ConvDescriptor::with_dilation("conv", [0, 0], [1, 1], [1, 1]);
        assert_eq!(desc.effective_dilation()?, [1, 1]);
        Ok(())
    }

    #[test]
    fn plain_conv_rejects_non_unit_dilation() {
        let desc = ConvDescriptor::with_dilation("conv", [0, 0], [1, 1], [2, 2]);
        assert!(matches!(
            desc.effective_dilation(),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn transposed_conv_requires_explicit_dilation() {
        let desc = ConvDescriptor::new("deconv", [0, 0], [1, 1]);
        assert!(matches!(
            desc.effective_dilation(),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn transposed_conv_forwards_its_dilation() -> Result<()> {
        let desc = ConvDescriptor::with_dilation("deconv", [0, 0], [1, 1], [2, 3]);
        assert_eq!(desc.effective_dilation()?, [2, 3]);
        Ok(())
    }

    #[test]
    fn pooling_mode_tags_resolve_lazily() -> Result<()> {
        let max = PoolingDescriptor::new("max", [2, 2], [0, 0], [2, 2]);
        assert_eq!(max.mode()?, PoolingMode::Max);
        let avg = PoolingDescriptor::new("avg", [2, 2], [1, 1], [2, 2]);
        assert_eq!(avg.mode()?, PoolingMode::Average);
        let inclusive = PoolingDescriptor::new("avg_include_pad", [2, 2], [1, 1], [2, 2]);
        assert_eq!(inclusive.mode()?, PoolingMode::AverageInclusive);
        Ok(())
    }

    #[test]
    fn unknown_pooling_mode_is_an_argument_error() {
        let desc = PoolingDescriptor::new("stochastic", [2, 2], [0, 0], [2, 2]);
        assert!(matches!(desc.mode(), Err(Error::Argument(_))));
    }
}
