//! Function table over MIOpen (`libMIOpen`).
//!
//! Execution entry points fix the blend to alpha = 1, beta = 0: operator
//! outputs always overwrite their destination tensor.

use std::ffi::{c_char, c_void, CStr};
use std::sync::{Arc, OnceLock};

use libloading::Library;

use super::{load_symbol, open_library};
use crate::error::{Error, Result};

type MiopenStatus = i32;

const STATUS_SUCCESS: MiopenStatus = 0;

pub(crate) const DATATYPE_FLOAT: i32 = 1;

pub(crate) const CONV_MODE_CONVOLUTION: i32 = 0;
pub(crate) const CONV_MODE_TRANSPOSE: i32 = 1;

pub(crate) const POOLING_MAX: i32 = 0;
/// Average excluding padding from the divisor.
pub(crate) const POOLING_AVERAGE: i32 = 1;
/// Average counting padded positions in the divisor.
pub(crate) const POOLING_AVERAGE_INCLUSIVE: i32 = 2;

const ALPHA_ONE: f32 = 1.0;
const BETA_ZERO: f32 = 0.0;

/// Layout shared by the forward, backward-weights and backward-data
/// performance records; `algo` is the union of the per-direction enums.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConvAlgoPerf {
    pub algo: i32,
    pub time: f32,
    pub memory: usize,
}

/// (descriptor, device pointer) pair for one operand.
pub(crate) type Operand = (usize, *mut c_void);

type CreateWithStreamFn =
    unsafe extern "C" fn(handle: *mut *mut c_void, stream: *mut c_void) -> MiopenStatus;
type DestroyFn = unsafe extern "C" fn(handle: *mut c_void) -> MiopenStatus;
type GetErrorStringFn = unsafe extern "C" fn(status: MiopenStatus) -> *const c_char;

type CreateTensorDescriptorFn = unsafe extern "C" fn(desc: *mut *mut c_void) -> MiopenStatus;
type Set4dTensorDescriptorFn = unsafe extern "C" fn(
    desc: *mut c_void,
    data_type: i32,
    n: i32,
    c: i32,
    h: i32,
    w: i32,
) -> MiopenStatus;
type DestroyTensorDescriptorFn = unsafe extern "C" fn(desc: *mut c_void) -> MiopenStatus;

type CreateConvolutionDescriptorFn = unsafe extern "C" fn(desc: *mut *mut c_void) -> MiopenStatus;
type InitConvolutionDescriptorFn = unsafe extern "C" fn(
    desc: *mut c_void,
    mode: i32,
    pad_h: i32,
    pad_w: i32,
    stride_h: i32,
    stride_w: i32,
    dilation_h: i32,
    dilation_w: i32,
) -> MiopenStatus;
type DestroyConvolutionDescriptorFn = unsafe extern "C" fn(desc: *mut c_void) -> MiopenStatus;

type CreatePoolingDescriptorFn = unsafe extern "C" fn(desc: *mut *mut c_void) -> MiopenStatus;
type Set2dPoolingDescriptorFn = unsafe extern "C" fn(
    desc: *mut c_void,
    mode: i32,
    window_h: i32,
    window_w: i32,
    pad_h: i32,
    pad_w: i32,
    stride_h: i32,
    stride_w: i32,
) -> MiopenStatus;
type DestroyPoolingDescriptorFn = unsafe extern "C" fn(desc: *mut c_void) -> MiopenStatus;

type ConvForwardWorkspaceFn = unsafe extern "C" fn(
    handle: *mut c_void,
    w_desc: *mut c_void,
    x_desc: *mut c_void,
    conv_desc: *mut c_void,
    y_desc: *mut c_void,
    size: *mut usize,
) -> MiopenStatus;
type ConvBackwardWeightsWorkspaceFn = unsafe extern "C" fn(
    handle: *mut c_void,
    dy_desc: *mut c_void,
    x_desc: *mut c_void,
    conv_desc: *mut c_void,
    dw_desc: *mut c_void,
    size: *mut usize,
) -> MiopenStatus;
type ConvBackwardDataWorkspaceFn = unsafe extern "C" fn(
    handle: *mut c_void,
    dy_desc: *mut c_void,
    w_desc: *mut c_void,
    conv_desc: *mut c_void,
    dx_desc: *mut c_void,
    size: *mut usize,
) -> MiopenStatus;

type FindConvForwardAlgorithmFn = unsafe extern "C" fn(
    handle: *mut c_void,
    x_desc: *mut c_void,
    x: *const c_void,
    w_desc: *mut c_void,
    w: *const c_void,
    conv_desc: *mut c_void,
    y_desc: *mut c_void,
    y: *mut c_void,
    request_algo_count: i32,
    returned_algo_count: *mut i32,
    perf_results: *mut ConvAlgoPerf,
    workspace: *mut c_void,
    workspace_size: usize,
    exhaustive_search: bool,
) -> MiopenStatus;
type FindConvBackwardWeightsAlgorithmFn = unsafe extern "C" fn(
    handle: *mut c_void,
    dy_desc: *mut c_void,
    dy: *const c_void,
    x_desc: *mut c_void,
    x: *const c_void,
    conv_desc: *mut c_void,
    dw_desc: *mut c_void,
    dw: *mut c_void,
    request_algo_count: i32,
    returned_algo_count: *mut i32,
    perf_results: *mut ConvAlgoPerf,
    workspace: *mut c_void,
    workspace_size: usize,
    exhaustive_search: bool,
) -> MiopenStatus;
type FindConvBackwardDataAlgorithmFn = unsafe extern "C" fn(
    handle: *mut c_void,
    dy_desc: *mut c_void,
    dy: *const c_void,
    w_desc: *mut c_void,
    w: *const c_void,
    conv_desc: *mut c_void,
    dx_desc: *mut c_void,
    dx: *mut c_void,
    request_algo_count: i32,
    returned_algo_count: *mut i32,
    perf_results: *mut ConvAlgoPerf,
    workspace: *mut c_void,
    workspace_size: usize,
    exhaustive_search: bool,
) -> MiopenStatus;

type ConvForwardFn = unsafe extern "C" fn(
    handle: *mut c_void,
    alpha: *const c_void,
    x_desc: *mut c_void,
    x: *const c_void,
    w_desc: *mut c_void,
    w: *const c_void,
    conv_desc: *mut c_void,
    algo: i32,
    beta: *const c_void,
    y_desc: *mut c_void,
    y: *mut c_void,
    workspace: *mut c_void,
    workspace_size: usize,
) -> MiopenStatus;
type ConvForwardBiasFn = unsafe extern "C" fn(
    handle: *mut c_void,
    alpha: *const c_void,
    b_desc: *mut c_void,
    b: *const c_void,
    beta: *const c_void,
    y_desc: *mut c_void,
    y: *mut c_void,
) -> MiopenStatus;
type ConvBackwardWeightsFn = unsafe extern "C" fn(
    handle: *mut c_void,
    alpha: *const c_void,
    dy_desc: *mut c_void,
    dy: *const c_void,
    x_desc: *mut c_void,
    x: *const c_void,
    conv_desc: *mut c_void,
    algo: i32,
    beta: *const c_void,
    dw_desc: *mut c_void,
    dw: *mut c_void,
    workspace: *mut c_void,
    workspace_size: usize,
) -> MiopenStatus;
type ConvBackwardDataFn = unsafe extern "C" fn(
    handle: *mut c_void,
    alpha: *const c_void,
    dy_desc: *mut c_void,
    dy: *const c_void,
    w_desc: *mut c_void,
    w: *const c_void,
    conv_desc: *mut c_void,
    algo: i32,
    beta: *const c_void,
    dx_desc: *mut c_void,
    dx: *mut c_void,
    workspace: *mut c_void,
    workspace_size: usize,
) -> MiopenStatus;
type ConvBackwardBiasFn = unsafe extern "C" fn(
    handle: *mut c_void,
    alpha: *const c_void,
    dy_desc: *mut c_void,
    dy: *const c_void,
    beta: *const c_void,
    db_desc: *mut c_void,
    db: *mut c_void,
) -> MiopenStatus;

type PoolingWorkspaceFn =
    unsafe extern "C" fn(y_desc: *mut c_void, size: *mut usize) -> MiopenStatus;
type PoolingForwardFn = unsafe extern "C" fn(
    handle: *mut c_void,
    pool_desc: *mut c_void,
    alpha: *const c_void,
    x_desc: *mut c_void,
    x: *const c_void,
    beta: *const c_void,
    y_desc: *mut c_void,
    y: *mut c_void,
    save_indices: bool,
    workspace: *mut c_void,
    workspace_size: usize,
) -> MiopenStatus;
type PoolingBackwardFn = unsafe extern "C" fn(
    handle: *mut c_void,
    pool_desc: *mut c_void,
    alpha: *const c_void,
    y_desc: *mut c_void,
    y: *const c_void,
    dy_desc: *mut c_void,
    dy: *const c_void,
    x_desc: *mut c_void,
    x: *const c_void,
    beta: *const c_void,
    dx_desc: *mut c_void,
    dx: *mut c_void,
    workspace: *mut c_void,
) -> MiopenStatus;

struct MiopenFns {
    create_with_stream: CreateWithStreamFn,
    destroy: DestroyFn,
    get_error_string: GetErrorStringFn,
    create_tensor_descriptor: CreateTensorDescriptorFn,
    set_4d_tensor_descriptor: Set4dTensorDescriptorFn,
    destroy_tensor_descriptor: DestroyTensorDescriptorFn,
    create_convolution_descriptor: CreateConvolutionDescriptorFn,
    init_convolution_descriptor: InitConvolutionDescriptorFn,
    destroy_convolution_descriptor: DestroyConvolutionDescriptorFn,
    create_pooling_descriptor: CreatePoolingDescriptorFn,
    set_2d_pooling_descriptor: Set2dPoolingDescriptorFn,
    destroy_pooling_descriptor: DestroyPoolingDescriptorFn,
    conv_forward_workspace: ConvForwardWorkspaceFn,
    conv_backward_weights_workspace: ConvBackwardWeightsWorkspaceFn,
    conv_backward_data_workspace: ConvBackwardDataWorkspaceFn,
    find_conv_forward_algorithm: FindConvForwardAlgorithmFn,
    find_conv_backward_weights_algorithm: FindConvBackwardWeightsAlgorithmFn,
    find_conv_backward_data_algorithm: FindConvBackwardDataAlgorithmFn,
    conv_forward: ConvForwardFn,
    conv_forward_bias: ConvForwardBiasFn,
    conv_backward_weights: ConvBackwardWeightsFn,
    conv_backward_data: ConvBackwardDataFn,
    conv_backward_bias: ConvBackwardBiasFn,
    pooling_workspace: PoolingWorkspaceFn,
    pooling_forward: PoolingForwardFn,
    pooling_backward: PoolingBackwardFn,
}

pub(crate) struct MiopenLib {
    _lib: Library,
    fns: MiopenFns,
}

unsafe impl Send for MiopenLib {}
unsafe impl Sync for MiopenLib {}

static MIOPEN_LIB: OnceLock<Result<Arc<MiopenLib>, String>> = OnceLock::new();

pub(crate) fn miopen() -> Result<Arc<MiopenLib>> {
    let state = MIOPEN_LIB.get_or_init(|| match MiopenLib::load() {
        Ok(lib) => Ok(Arc::new(lib)),
        Err(err) => Err(err.to_string()),
    });
    match state {
        Ok(lib) => Ok(Arc::clone(lib)),
        Err(msg) => Err(Error::backend("miopen", msg.clone())),
    }
}

impl MiopenLib {
    fn load() -> Result<Self> {
        let lib = open_library(&["libMIOpen.so.1", "libMIOpen.so"])?;
        let fns = MiopenFns {
            create_with_stream: load_symbol(&lib, b"miopenCreateWithStream\0")?,
            destroy: load_symbol(&lib, b"miopenDestroy\0")?,
            get_error_string: load_symbol(&lib, b"miopenGetErrorString\0")?,
            create_tensor_descriptor: load_symbol(&lib, b"miopenCreateTensorDescriptor\0")?,
            set_4d_tensor_descriptor: load_symbol(&lib, b"miopenSet4dTensorDescriptor\0")?,
            destroy_tensor_descriptor: load_symbol(&lib, b"miopenDestroyTensorDescriptor\0")?,
            create_convolution_descriptor: load_symbol(
                &lib,
                b"miopenCreateConvolutionDescriptor\0",
            )?,
            init_convolution_descriptor: load_symbol(&lib, b"miopenInitConvolutionDescriptor\0")?,
            destroy_convolution_descriptor: load_symbol(
                &lib,
                b"miopenDestroyConvolutionDescriptor\0",
            )?,
            create_pooling_descriptor: load_symbol(&lib, b"miopenCreatePoolingDescriptor\0")?,
            set_2d_pooling_descriptor: load_symbol(&lib, b"miopenSet2dPoolingDescriptor\0")?,
            destroy_pooling_descriptor: load_symbol(&lib, b"miopenDestroyPoolingDescriptor\0")?,
            conv_forward_workspace: load_symbol(
                &lib,
                b"miopenConvolutionForwardGetWorkSpaceSize\0",
            )?,
            conv_backward_weights_workspace: load_symbol(
                &lib,
                b"miopenConvolutionBackwardWeightsGetWorkSpaceSize\0",
            )?,
            conv_backward_data_workspace: load_symbol(
                &lib,
                b"miopenConvolutionBackwardDataGetWorkSpaceSize\0",
            )?,
            find_conv_forward_algorithm: load_symbol(
                &lib,
                b"miopenFindConvolutionForwardAlgorithm\0",
            )?,
            find_conv_backward_weights_algorithm: load_symbol(
                &lib,
                b"miopenFindConvolutionBackwardWeightsAlgorithm\0",
            )?,
            find_conv_backward_data_algorithm: load_symbol(
                &lib,
                b"miopenFindConvolutionBackwardDataAlgorithm\0",
            )?,
            conv_forward: load_symbol(&lib, b"miopenConvolutionForward\0")?,
            conv_forward_bias: load_symbol(&lib, b"miopenConvolutionForwardBias\0")?,
            conv_backward_weights: load_symbol(&lib, b"miopenConvolutionBackwardWeights\0")?,
            conv_backward_data: load_symbol(&lib, b"miopenConvolutionBackwardData\0")?,
            conv_backward_bias: load_symbol(&lib, b"miopenConvolutionBackwardBias\0")?,
            pooling_workspace: load_symbol(&lib, b"miopenPoolingGetWorkSpaceSize\0")?,
            pooling_forward: load_symbol(&lib, b"miopenPoolingForward\0")?,
            pooling_backward: load_symbol(&lib, b"miopenPoolingBackward\0")?,
        };
        Ok(MiopenLib { _lib: lib, fns })
    }

    fn check(&self, status: MiopenStatus, call: &'static str) -> Result<()> {
        if status == STATUS_SUCCESS {
            return Ok(());
        }
        let detail = unsafe { CStr::from_ptr((self.fns.get_error_string)(status)) }
            .to_string_lossy()
            .into_owned();
        Err(Error::backend(call, detail))
    }

    pub(crate) fn create_with_stream(&self, stream: usize) -> Result<usize> {
        let mut handle: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe { (self.fns.create_with_stream)(&mut handle, stream as *mut c_void) },
            "miopenCreateWithStream",
        )?;
        Ok(handle as usize)
    }

    pub(crate) fn destroy(&self, handle: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.destroy)(handle as *mut c_void) },
            "miopenDestroy",
        )
    }

    pub(crate) fn tensor_descriptor_4d(&self, extents: [i32; 4]) -> Result<usize> {
        let mut desc: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe { (self.fns.create_tensor_descriptor)(&mut desc) },
            "miopenCreateTensorDescriptor",
        )?;
        let status = unsafe {
            (self.fns.set_4d_tensor_descriptor)(
                desc,
                DATATYPE_FLOAT,
                extents[0],
                extents[1],
                extents[2],
                extents[3],
            )
        };
        if let Err(err) = self.check(status, "miopenSet4dTensorDescriptor") {
            let _ = self.destroy_tensor_descriptor(desc as usize);
            return Err(err);
        }
        Ok(desc as usize)
    }

    pub(crate) fn destroy_tensor_descriptor(&self, desc: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.destroy_tensor_descriptor)(desc as *mut c_void) },
            "miopenDestroyTensorDescriptor",
        )
    }

    pub(crate) fn convolution_descriptor(
        &self,
        mode: i32,
        padding: [i32; 2],
        stride: [i32; 2],
        dilation: [i32; 2],
    ) -> Result<usize> {
        let mut desc: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe { (self.fns.create_convolution_descriptor)(&mut desc) },
            "miopenCreateConvolutionDescriptor",
        )?;
        let status = unsafe {
            (self.fns.init_convolution_descriptor)(
                desc,
                mode,
                padding[0],
                padding[1],
                stride[0],
                stride[1],
                dilation[0],
                dilation[1],
            )
        };
        if let Err(err) = self.check(status, "miopenInitConvolutionDescriptor") {
            let _ = self.destroy_convolution_descriptor(desc as usize);
            return Err(err);
        }
        Ok(desc as usize)
    }

    pub(crate) fn destroy_convolution_descriptor(&self, desc: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.destroy_convolution_descriptor)(desc as *mut c_void) },
            "miopenDestroyConvolutionDescriptor",
        )
    }

    pub(crate) fn pooling_descriptor(
        &self,
        mode: i32,
        kernel: [i32; 2],
        padding: [i32; 2],
        stride: [i32; 2],
    ) -> Result<usize> {
        let mut desc: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe { (self.fns.create_pooling_descriptor)(&mut desc) },
            "miopenCreatePoolingDescriptor",
        )?;
        let status = unsafe {
            (self.fns.set_2d_pooling_descriptor)(
                desc,
                mode,
                kernel[0],
                kernel[1],
                padding[0],
                padding[1],
                stride[0],
                stride[1],
            )
        };
        if let Err(err) = self.check(status, "miopenSet2dPoolingDescriptor") {
            let _ = self.destroy_pooling_descriptor(desc as usize);
            return Err(err);
        }
        Ok(desc as usize)
    }

    pub(crate) fn destroy_pooling_descriptor(&self, desc: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.destroy_pooling_descriptor)(desc as *mut c_void) },
            "miopenDestroyPoolingDescriptor",
        )
    }

    pub(crate) fn conv_forward_workspace_size(
        &self,
        handle: usize,
        w_desc: usize,
        x_desc: usize,
        conv_desc: usize,
        y_desc: usize,
    ) -> Result<usize> {
        let mut size = 0usize;
        self.check(
            unsafe {
                (self.fns.conv_forward_workspace)(
                    handle as *mut c_void,
                    w_desc as *mut c_void,
                    x_desc as *mut c_void,
                    conv_desc as *mut c_void,
                    y_desc as *mut c_void,
                    &mut size,
                )
            },
            "miopenConvolutionForwardGetWorkSpaceSize",
        )?;
        Ok(size)
    }

    pub(crate) fn conv_backward_weights_workspace_size(
        &self,
        handle: usize,
        dy_desc: usize,
        x_desc: usize,
        conv_desc: usize,
        dw_desc: usize,
    ) -> Result<usize> {
        let mut size = 0usize;
        self.check(
            unsafe {
                (self.fns.conv_backward_weights_workspace)(
                    handle as *mut c_void,
                    dy_desc as *mut c_void,
                    x_desc as *mut c_void,
                    conv_desc as *mut c_void,
                    dw_desc as *mut c_void,
                    &mut size,
                )
            },
            "miopenConvolutionBackwardWeightsGetWorkSpaceSize",
        )?;
        Ok(size)
    }

    pub(crate) fn conv_backward_data_workspace_size(
        &self,
        handle: usize,
        dy_desc: usize,
        w_desc: usize,
        conv_desc: usize,
        dx_desc: usize,
    ) -> Result<usize> {
        let mut size = 0usize;
        self.check(
            unsafe {
                (self.fns.conv_backward_data_workspace)(
                    handle as *mut c_void,
                    dy_desc as *mut c_void,
                    w_desc as *mut c_void,
                    conv_desc as *mut c_void,
                    dx_desc as *mut c_void,
                    &mut size,
                )
            },
            "miopenConvolutionBackwardDataGetWorkSpaceSize",
        )?;
        Ok(size)
    }

    /// Benchmarks candidate algorithms and returns the fastest record.
    pub(crate) fn find_conv_forward_algorithm(
        &self,
        handle: usize,
        x: Operand,
        w: Operand,
        conv_desc: usize,
        y: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<ConvAlgoPerf> {
        let mut returned = 0i32;
        let mut perf = ConvAlgoPerf {
            algo: 0,
            time: 0.0,
            memory: 0,
        };
        self.check(
            unsafe {
                (self.fns.find_conv_forward_algorithm)(
                    handle as *mut c_void,
                    x.0 as *mut c_void,
                    x.1,
                    w.0 as *mut c_void,
                    w.1,
                    conv_desc as *mut c_void,
                    y.0 as *mut c_void,
                    y.1,
                    1,
                    &mut returned,
                    &mut perf,
                    workspace,
                    workspace_size,
                    false,
                )
            },
            "miopenFindConvolutionForwardAlgorithm",
        )?;
        if returned < 1 {
            return Err(Error::backend(
                "miopenFindConvolutionForwardAlgorithm",
                "no applicable algorithm returned",
            ));
        }
        Ok(perf)
    }

    pub(crate) fn find_conv_backward_weights_algorithm(
        &self,
        handle: usize,
        dy: Operand,
        x: Operand,
        conv_desc: usize,
        dw: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<ConvAlgoPerf> {
        let mut returned = 0i32;
        let mut perf = ConvAlgoPerf {
            algo: 0,
            time: 0.0,
            memory: 0,
        };
        self.check(
            unsafe {
                (self.fns.find_conv_backward_weights_algorithm)(
                    handle as *mut c_void,
                    dy.0 as *mut c_void,
                    dy.1,
                    x.0 as *mut c_void,
                    x.1,
                    conv_desc as *mut c_void,
                    dw.0 as *mut c_void,
                    dw.1,
                    1,
                    &mut returned,
                    &mut perf,
                    workspace,
                    workspace_size,
                    false,
                )
            },
            "miopenFindConvolutionBackwardWeightsAlgorithm",
        )?;
        if returned < 1 {
            return Err(Error::backend(
                "miopenFindConvolutionBackwardWeightsAlgorithm",
                "no applicable algorithm returned",
            ));
        }
        Ok(perf)
    }

    pub(crate) fn find_conv_backward_data_algorithm(
        &self,
        handle: usize,
        dy: Operand,
        w: Operand,
        conv_desc: usize,
        dx: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<ConvAlgoPerf> {
        let mut returned = 0i32;
        let mut perf = ConvAlgoPerf {
            algo: 0,
            time: 0.0,
            memory: 0,
        };
        self.check(
            unsafe {
                (self.fns.find_conv_backward_data_algorithm)(
                    handle as *mut c_void,
                    dy.0 as *mut c_void,
                    dy.1,
                    w.0 as *mut c_void,
                    w.1,
                    conv_desc as *mut c_void,
                    dx.0 as *mut c_void,
                    dx.1,
                    1,
                    &mut returned,
                    &mut perf,
                    workspace,
                    workspace_size,
                    false,
                )
            },
            "miopenFindConvolutionBackwardDataAlgorithm",
        )?;
        if returned < 1 {
            return Err(Error::backend(
                "miopenFindConvolutionBackwardDataAlgorithm",
                "no applicable algorithm returned",
            ));
        }
        Ok(perf)
    }

    pub(crate) fn convolution_forward(
        &self,
        handle: usize,
        x: Operand,
        w: Operand,
        conv_desc: usize,
        algo: i32,
        y: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.conv_forward)(
                    handle as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    x.0 as *mut c_void,
                    x.1,
                    w.0 as *mut c_void,
                    w.1,
                    conv_desc as *mut c_void,
                    algo,
                    &BETA_ZERO as *const f32 as *const c_void,
                    y.0 as *mut c_void,
                    y.1,
                    workspace,
                    workspace_size,
                )
            },
            "miopenConvolutionForward",
        )
    }

    /// Adds the per-channel bias into y (beta = 1 semantics are internal to
    /// the entry point).
    pub(crate) fn convolution_forward_bias(
        &self,
        handle: usize,
        b: Operand,
        y: Operand,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.conv_forward_bias)(
                    handle as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    b.0 as *mut c_void,
                    b.1,
                    &BETA_ZERO as *const f32 as *const c_void,
                    y.0 as *mut c_void,
                    y.1,
                )
            },
            "miopenConvolutionForwardBias",
        )
    }

    pub(crate) fn convolution_backward_weights(
        &self,
        handle: usize,
        dy: Operand,
        x: Operand,
        conv_desc: usize,
        algo: i32,
        dw: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.conv_backward_weights)(
                    handle as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    dy.0 as *mut c_void,
                    dy.1,
                    x.0 as *mut c_void,
                    x.1,
                    conv_desc as *mut c_void,
                    algo,
                    &BETA_ZERO as *const f32 as *const c_void,
                    dw.0 as *mut c_void,
                    dw.1,
                    workspace,
                    workspace_size,
                )
            },
            "miopenConvolutionBackwardWeights",
        )
    }

    pub(crate) fn convolution_backward_data(
        &self,
        handle: usize,
        dy: Operand,
        w: Operand,
        conv_desc: usize,
        algo: i32,
        dx: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.conv_backward_data)(
                    handle as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    dy.0 as *mut c_void,
                    dy.1,
                    w.0 as *mut c_void,
                    w.1,
                    conv_desc as *mut c_void,
                    algo,
                    &BETA_ZERO as *const f32 as *const c_void,
                    dx.0 as *mut c_void,
                    dx.1,
                    workspace,
                    workspace_size,
                )
            },
            "miopenConvolutionBackwardData",
        )
    }

    pub(crate) fn convolution_backward_bias(
        &self,
        handle: usize,
        dy: Operand,
        db: Operand,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.conv_backward_bias)(
                    handle as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    dy.0 as *mut c_void,
                    dy.1,
                    &BETA_ZERO as *const f32 as *const c_void,
                    db.0 as *mut c_void,
                    db.1,
                )
            },
            "miopenConvolutionBackwardBias",
        )
    }

    /// Sized from the output descriptor alone.
    pub(crate) fn pooling_workspace_size(&self, y_desc: usize) -> Result<usize> {
        let mut size = 0usize;
        self.check(
            unsafe { (self.fns.pooling_workspace)(y_desc as *mut c_void, &mut size) },
            "miopenPoolingGetWorkSpaceSize",
        )?;
        Ok(size)
    }

    pub(crate) fn pooling_forward(
        &self,
        handle: usize,
        pool_desc: usize,
        x: Operand,
        y: Operand,
        workspace: *mut c_void,
        workspace_size: usize,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.pooling_forward)(
                    handle as *mut c_void,
                    pool_desc as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    x.0 as *mut c_void,
                    x.1,
                    &BETA_ZERO as *const f32 as *const c_void,
                    y.0 as *mut c_void,
                    y.1,
                    // Always save indices so a backward pass can follow.
                    true,
                    workspace,
                    workspace_size,
                )
            },
            "miopenPoolingForward",
        )
    }

    pub(crate) fn pooling_backward(
        &self,
        handle: usize,
        pool_desc: usize,
        y: Operand,
        dy: Operand,
        x: Operand,
        dx: Operand,
        workspace: *mut c_void,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.pooling_backward)(
                    handle as *mut c_void,
                    pool_desc as *mut c_void,
                    &ALPHA_ONE as *const f32 as *const c_void,
                    y.0 as *mut c_void,
                    y.1,
                    dy.0 as *mut c_void,
                    dy.1,
                    x.0 as *mut c_void,
                    x.1,
                    &BETA_ZERO as *const f32 as *const c_void,
                    dx.0 as *mut c_void,
                    dx.1,
                    workspace,
                )
            },
            "miopenPoolingBackward",
        )
    }
}
