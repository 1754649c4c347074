use crate::error::{ensure_arg, Result};

/// Ordered dimension sizes of a device tensor.
///
/// A shape always has at least one dimension; individual dimensions may be
/// zero, in which case the element count is zero and no device allocation
/// backs the tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self> {
        let dims = dims.into();
        ensure_arg!(!dims.is_empty(), "a shape needs at least one dimension");
        Ok(Shape { dims })
    }

    /// Shape of a default-constructed, bufferless tensor.
    pub(crate) fn unset() -> Self {
        Shape { dims: Vec::new() }
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dim(&self, index: usize) -> Result<usize> {
        ensure_arg!(
            index < self.dims.len(),
            "dimension {index} out of range for rank-{} shape",
            self.dims.len()
        );
        Ok(self.dims[index])
    }

    pub fn element_count(&self) -> usize {
        if self.dims.is_empty() {
            0
        } else {
            self.dims.iter().product()
        }
    }

    /// The four extents handed to NCHW tensor descriptors.
    pub(crate) fn extents_4d(&self) -> Result<[i32; 4]> {
        ensure_arg!(
            self.dims.len() == 4,
            "operator tensors must be rank 4, got rank {}",
            self.dims.len()
        );
        let mut out = [0i32; 4];
        for (slot, &dim) in out.iter_mut().zip(&self.dims) {
            ensure_arg!(dim <= i32::MAX as usize, "dimension {dim} overflows the descriptor");
            *slot = dim as i32;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_count_is_the_product_of_dims() -> Result<()> {
        assert_eq!(Shape::new([2, 3, 4, 4])?.element_count(), 96);
        assert_eq!(Shape::new([7])?.element_count(), 7);
        Ok(())
    }

    #[test]
    fn zero_dimension_means_zero_elements() -> Result<()> {
        assert_eq!(Shape::new([4, 0, 2])?.element_count(), 0);
        Ok(())
    }

    #[test]
    fn unset_shape_is_empty() {
        let shape = Shape::unset();
        assert_eq!(shape.rank(), 0);
        assert_eq!(shape.element_count(), 0);
    }

    #[test]
    fn empty_dims_are_rejected() {
        assert!(Shape::new(Vec::new()).is_err());
    }

    #[test]
    fn out_of_range_dim_is_an_error() -> Result<()> {
        let shape = Shape::new([2, 3])?;
        assert_eq!(shape.dim(1)?, 3);
        assert!(shape.dim(2).is_err());
        Ok(())
    }

    #[test]
    fn extents_require_rank_four() -> Result<()> {
        assert_eq!(Shape::new([1, 2, 3, 4])?.extents_4d()?, [1, 2, 3, 4]);
        assert!(Shape::new([1, 2, 3])?.extents_4d().is_err());
        Ok(())
    }
}
