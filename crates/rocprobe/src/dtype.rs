use std::fmt;

/// Scalar element tag carried alongside every generic tensor.
///
/// Tensors of different element types never compare equal, so each `Element`
/// implementation binds its tag here and comparisons check tags before
/// touching any data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    U8,
    U16,
    U32,
    I32,
    F32,
    F64,
}

impl DType {
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::U16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Type name used when instantiating device kernels for this element.
    pub(crate) fn device_type_name(self) -> &'static str {
        match self {
            DType::U8 => "unsigned char",
            DType::U16 => "unsigned short",
            DType::U32 => "unsigned int",
            DType::I32 => "int",
            DType::F32 => "float",
            DType::F64 => "double",
        }
    }

    /// Suffix appended to generated kernel symbols.
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::I32 => "i32",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Host scalar usable as a device tensor element.
pub trait Element:
    Copy + Default + PartialOrd + fmt::Display + fmt::Debug + Send + Sync + 'static
{
    const DTYPE: DType;

    /// Widened view used by the tolerance comparison.
    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    };
}

impl_element!(u8, DType::U8);
impl_element!(u16, DType::U16);
impl_element!(u32, DType::U32);
impl_element!(i32, DType::I32);
impl_element!(f32, DType::F32);
impl_element!(f64, DType::F64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_host_types() {
        assert_eq!(DType::U8.size_in_bytes(), std::mem::size_of::<u8>());
        assert_eq!(DType::U16.size_in_bytes(), std::mem::size_of::<u16>());
        assert_eq!(DType::U32.size_in_bytes(), std::mem::size_of::<u32>());
        assert_eq!(DType::I32.size_in_bytes(), std::mem::size_of::<i32>());
        assert_eq!(DType::F32.size_in_bytes(), std::mem::size_of::<f32>());
        assert_eq!(DType::F64.size_in_bytes(), std::mem::size_of::<f64>());
    }

    #[test]
    fn element_tags_are_distinct() {
        assert_ne!(<u32 as Element>::DTYPE, <i32 as Element>::DTYPE);
        assert_ne!(<f32 as Element>::DTYPE, <f64 as Element>::DTYPE);
        assert!(<f32 as Element>::DTYPE.is_float());
        assert!(!<i32 as Element>::DTYPE.is_float());
    }

    #[test]
    fn display_matches_kernel_suffix() {
        assert_eq!(DType::F32.to_string(), "f32");
        assert_eq!(DType::U16.to_string(), "u16");
    }
}
