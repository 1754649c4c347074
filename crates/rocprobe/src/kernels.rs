//! Device kernels compiled at runtime.
//!
//! The elementwise scalar operators and the fully-connected bias kernels are
//! embedded as HIP C++ source and compiled once per context through hipRTC,
//! so no device compiler is needed at build time.

use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::ffi::hip::HipLib;
use crate::ffi::rtc::RtcLib;

pub(crate) const BLOCK_SIZE: u32 = 256;

/// In-place elementwise operations applying one scalar to every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ScalarOp {
    const ALL: [ScalarOp; 4] = [ScalarOp::Add, ScalarOp::Sub, ScalarOp::Mul, ScalarOp::Div];

    fn name(self) -> &'static str {
        match self {
            ScalarOp::Add => "add",
            ScalarOp::Sub => "sub",
            ScalarOp::Mul => "mul",
            ScalarOp::Div => "div",
        }
    }

    fn token(self) -> &'static str {
        match self {
            ScalarOp::Add => "+=",
            ScalarOp::Sub => "-=",
            ScalarOp::Mul => "*=",
            ScalarOp::Div => "/=",
        }
    }
}

const SCALAR_DTYPES: [DType; 6] = [
    DType::U8,
    DType::U16,
    DType::U32,
    DType::I32,
    DType::F32,
    DType::F64,
];

pub(crate) const FC_FORWARD_BIAS: &str = "fc_forward_bias_f32";
pub(crate) const FC_BACKWARD_BIAS: &str = "fc_backward_bias_f32";

pub(crate) fn scalar_kernel_name(op: ScalarOp, dtype: DType) -> String {
    format!("scalar_{}_{}", op.name(), dtype.suffix())
}

/// One thread per element in full blocks; a zero-element launch still gets
/// one block.
pub(crate) fn grid_size(count: usize) -> u32 {
    count.div_ceil(BLOCK_SIZE as usize).max(1) as u32
}

fn kernel_source() -> String {
    let mut src = String::with_capacity(8 * 1024);
    for dtype in SCALAR_DTYPES {
        let ty = dtype.device_type_name();
        for op in ScalarOp::ALL {
            let name = scalar_kernel_name(op, dtype);
            let token = op.token();
            let _ = write!(
                src,
                "extern \"C\" __global__ void {name}({ty}* data, {ty} value, unsigned long long count) {{\n\
                 \x20   unsigned long long i = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;\n\
                 \x20   if (i < count) {{\n\
                 \x20       data[i] {token} value;\n\
                 \x20   }}\n\
                 }}\n\n"
            );
        }
    }
    let _ = write!(
        src,
        "extern \"C\" __global__ void {FC_FORWARD_BIAS}(unsigned int rows, unsigned int cols, const float* bias, float* y) {{\n\
         \x20   unsigned long long col = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;\n\
         \x20   if (col >= cols) {{\n\
         \x20       return;\n\
         \x20   }}\n\
         \x20   for (unsigned int row = 0; row < rows; ++row) {{\n\
         \x20       y[(unsigned long long)row * cols + col] += bias[col];\n\
         \x20   }}\n\
         }}\n\n\
         extern \"C\" __global__ void {FC_BACKWARD_BIAS}(unsigned int rows, unsigned int cols, const float* dy, float* dbias) {{\n\
         \x20   unsigned long long col = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;\n\
         \x20   if (col >= cols) {{\n\
         \x20       return;\n\
         \x20   }}\n\
         \x20   float acc = 0.0f;\n\
         \x20   for (unsigned int row = 0; row < rows; ++row) {{\n\
         \x20       acc += dy[(unsigned long long)row * cols + col];\n\
         \x20   }}\n\
         \x20   dbias[col] = acc;\n\
         }}\n"
    );
    src
}

fn kernel_names() -> Vec<String> {
    let mut names = Vec::with_capacity(SCALAR_DTYPES.len() * ScalarOp::ALL.len() + 2);
    for dtype in SCALAR_DTYPES {
        for op in ScalarOp::ALL {
            names.push(scalar_kernel_name(op, dtype));
        }
    }
    names.push(FC_FORWARD_BIAS.to_string());
    names.push(FC_BACKWARD_BIAS.to_string());
    names
}

/// One loaded module plus its resolved function handles; unloaded on drop.
pub(crate) struct KernelSet {
    hip: Arc<HipLib>,
    module: usize,
    functions: HashMap<String, usize>,
}

impl KernelSet {
    pub(crate) fn compile(hip: &Arc<HipLib>) -> Result<Self> {
        let rtc = RtcLib::load()?;
        let code = rtc.compile(&kernel_source(), "rocprobe_kernels.hip")?;
        let module = hip.module_load_data(&code)?;
        let mut functions = HashMap::new();
        for name in kernel_names() {
            let cname = CString::new(name.as_str())
                .map_err(|_| Error::argument("kernel name contains a NUL byte"))?;
            match hip.module_get_function(module, &cname) {
                Ok(func) => {
                    functions.insert(name, func);
                }
                Err(err) => {
                    let _ = hip.module_unload(module);
                    return Err(err);
                }
            }
        }
        Ok(KernelSet {
            hip: Arc::clone(hip),
            module,
            functions,
        })
    }

    pub(crate) fn launch(
        &self,
        name: &str,
        grid: u32,
        stream: usize,
        params: &mut [*mut c_void],
    ) -> Result<()> {
        let func = self
            .functions
            .get(name)
            .copied()
            .ok_or_else(|| Error::argument(format!("unknown kernel {name}")))?;
        self.hip.launch_kernel(func, grid, BLOCK_SIZE, stream, params)
    }
}

impl Drop for KernelSet {
    fn drop(&mut self) {
        if self.module != 0 {
            let _ = self.hip.module_unload(self.module);
            self.module = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_covers_every_element() {
        assert_eq!(grid_size(1), 1);
        assert_eq!(grid_size(256), 1);
        assert_eq!(grid_size(257), 2);
        assert_eq!(grid_size(8192), 32);
    }

    #[test]
    fn empty_launches_still_get_one_block() {
        assert_eq!(grid_size(0), 1);
    }

    #[test]
    fn kernel_names_are_unique_and_present_in_source() {
        let names = kernel_names();
        let source = kernel_source();
        let mut seen = std::collections::HashSet::new();
        for name in &names {
            assert!(seen.insert(name.clone()), "duplicate kernel {name}");
            assert!(source.contains(name.as_str()), "missing kernel {name}");
        }
        assert_eq!(names.len(), 26);
    }

    #[test]
    fn scalar_names_encode_op_and_element() {
        assert_eq!(
            scalar_kernel_name(ScalarOp::Mul, DType::I32),
            "scalar_mul_i32"
        );
        assert_eq!(
            scalar_kernel_name(ScalarOp::Div, DType::F64),
            "scalar_div_f64"
        );
    }
}
