//! Correctness-harness primitives for GPU-resident tensor operators.
//!
//! The crate wraps the HIP runtime, MIOpen, hipBLAS and MPI behind typed
//! device tensors, operation descriptors and free-function operators so
//! regression scenarios can run real device code and compare the results
//! against known-good reference data at a fixed tolerance.
//!
//! All vendor libraries are resolved at runtime through `dlopen`; nothing
//! links against ROCm at build time and host-side logic stays testable on
//! machines without a GPU.

pub mod comm;
mod context;
mod descriptor;
mod dtype;
mod error;
pub mod ffi;
mod kernels;
pub mod ops;
mod shape;
mod tensor;

pub use context::DeviceContext;
pub use descriptor::{ConvDescriptor, ConvMode, PoolingDescriptor, PoolingMode};
pub use dtype::{DType, Element};
pub use error::{Error, Result};
pub use kernels::ScalarOp;
pub use shape::Shape;
pub use tensor::{Comparison, DeviceTensor, FLOAT_TOLERANCE};
