//! Function table over the HIP runtime (`libamdhip64`).

use std::ffi::{c_char, c_void, CStr};
use std::sync::{Arc, OnceLock};

use libloading::Library;

use super::{load_symbol, open_library};
use crate::error::{Error, Result};

type HipStatus = i32;

const HIP_SUCCESS: HipStatus = 0;

const MEMCPY_HOST_TO_DEVICE: i32 = 1;
const MEMCPY_DEVICE_TO_HOST: i32 = 2;
const MEMCPY_DEVICE_TO_DEVICE: i32 = 3;

type SetDeviceFn = unsafe extern "C" fn(device: i32) -> HipStatus;
type StreamCreateFn = unsafe extern "C" fn(stream: *mut *mut c_void) -> HipStatus;
type StreamDestroyFn = unsafe extern "C" fn(stream: *mut c_void) -> HipStatus;
type StreamSynchronizeFn = unsafe extern "C" fn(stream: *mut c_void) -> HipStatus;
type MallocFn = unsafe extern "C" fn(ptr: *mut *mut c_void, size: usize) -> HipStatus;
type FreeFn = unsafe extern "C" fn(ptr: *mut c_void) -> HipStatus;
type MemsetFn = unsafe extern "C" fn(dst: *mut c_void, value: i32, size: usize) -> HipStatus;
type MemcpyFn =
    unsafe extern "C" fn(dst: *mut c_void, src: *const c_void, size: usize, kind: i32) -> HipStatus;
type MemcpyAsyncFn = unsafe extern "C" fn(
    dst: *mut c_void,
    src: *const c_void,
    size: usize,
    kind: i32,
    stream: *mut c_void,
) -> HipStatus;
type GetErrorStringFn = unsafe extern "C" fn(status: HipStatus) -> *const c_char;
type ModuleLoadDataFn =
    unsafe extern "C" fn(module: *mut *mut c_void, image: *const c_void) -> HipStatus;
type ModuleUnloadFn = unsafe extern "C" fn(module: *mut c_void) -> HipStatus;
type ModuleGetFunctionFn = unsafe extern "C" fn(
    func: *mut *mut c_void,
    module: *mut c_void,
    name: *const c_char,
) -> HipStatus;
type ModuleLaunchKernelFn = unsafe extern "C" fn(
    func: *mut c_void,
    grid_x: u32,
    grid_y: u32,
    grid_z: u32,
    block_x: u32,
    block_y: u32,
    block_z: u32,
    shared_mem_bytes: u32,
    stream: *mut c_void,
    params: *mut *mut c_void,
    extra: *mut *mut c_void,
) -> HipStatus;

struct HipFns {
    set_device: SetDeviceFn,
    stream_create: StreamCreateFn,
    stream_destroy: StreamDestroyFn,
    stream_synchronize: StreamSynchronizeFn,
    malloc: MallocFn,
    free: FreeFn,
    memset: MemsetFn,
    memcpy: MemcpyFn,
    memcpy_async: MemcpyAsyncFn,
    get_error_string: GetErrorStringFn,
    module_load_data: ModuleLoadDataFn,
    module_unload: ModuleUnloadFn,
    module_get_function: ModuleGetFunctionFn,
    module_launch_kernel: ModuleLaunchKernelFn,
}

pub struct HipLib {
    _lib: Library,
    fns: HipFns,
}

// Device pointers and handles cross this boundary as plain usize, so the
// table itself is freely shareable.
unsafe impl Send for HipLib {}
unsafe impl Sync for HipLib {}

static HIP_LIB: OnceLock<Result<Arc<HipLib>, String>> = OnceLock::new();

/// Process-wide HIP runtime table, loaded on first use.
pub fn hip() -> Result<Arc<HipLib>> {
    let state = HIP_LIB.get_or_init(|| match HipLib::load() {
        Ok(lib) => Ok(Arc::new(lib)),
        Err(err) => Err(err.to_string()),
    });
    match state {
        Ok(lib) => Ok(Arc::clone(lib)),
        Err(msg) => Err(Error::backend("hip", msg.clone())),
    }
}

/// True when the HIP runtime could be loaded; device tests bail out early
/// when it cannot.
pub fn is_available() -> bool {
    hip().is_ok()
}

impl HipLib {
    fn load() -> Result<Self> {
        let lib = open_library(&["libamdhip64.so.6", "libamdhip64.so.5", "libamdhip64.so"])?;
        let fns = HipFns {
            set_device: load_symbol(&lib, b"hipSetDevice\0")?,
            stream_create: load_symbol(&lib, b"hipStreamCreate\0")?,
            stream_destroy: load_symbol(&lib, b"hipStreamDestroy\0")?,
            stream_synchronize: load_symbol(&lib, b"hipStreamSynchronize\0")?,
            malloc: load_symbol(&lib, b"hipMalloc\0")?,
            free: load_symbol(&lib, b"hipFree\0")?,
            memset: load_symbol(&lib, b"hipMemset\0")?,
            memcpy: load_symbol(&lib, b"hipMemcpy\0")?,
            memcpy_async: load_symbol(&lib, b"hipMemcpyAsync\0")?,
            get_error_string: load_symbol(&lib, b"hipGetErrorString\0")?,
            module_load_data: load_symbol(&lib, b"hipModuleLoadData\0")?,
            module_unload: load_symbol(&lib, b"hipModuleUnload\0")?,
            module_get_function: load_symbol(&lib, b"hipModuleGetFunction\0")?,
            module_launch_kernel: load_symbol(&lib, b"hipModuleLaunchKernel\0")?,
        };
        Ok(HipLib { _lib: lib, fns })
    }

    fn check(&self, status: HipStatus, call: &'static str) -> Result<()> {
        if status == HIP_SUCCESS {
            return Ok(());
        }
        // hipGetErrorString is total over status codes.
        let detail = unsafe { CStr::from_ptr((self.fns.get_error_string)(status)) }
            .to_string_lossy()
            .into_owned();
        Err(Error::backend(call, detail))
    }

    pub(crate) fn set_device(&self, device: i32) -> Result<()> {
        self.check(unsafe { (self.fns.set_device)(device) }, "hipSetDevice")
    }

    pub(crate) fn stream_create(&self) -> Result<usize> {
        let mut stream: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe { (self.fns.stream_create)(&mut stream) },
            "hipStreamCreate",
        )?;
        Ok(stream as usize)
    }

    pub(crate) fn stream_destroy(&self, stream: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.stream_destroy)(stream as *mut c_void) },
            "hipStreamDestroy",
        )
    }

    pub(crate) fn stream_synchronize(&self, stream: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.stream_synchronize)(stream as *mut c_void) },
            "hipStreamSynchronize",
        )
    }

    pub(crate) fn malloc(&self, bytes: usize) -> Result<usize> {
        let mut ptr: *mut c_void = std::ptr::null_mut();
        self.check(unsafe { (self.fns.malloc)(&mut ptr, bytes) }, "hipMalloc")?;
        Ok(ptr as usize)
    }

    pub(crate) fn free(&self, ptr: usize) -> Result<()> {
        self.check(unsafe { (self.fns.free)(ptr as *mut c_void) }, "hipFree")
    }

    pub(crate) fn memset_zero(&self, ptr: usize, bytes: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.memset)(ptr as *mut c_void, 0, bytes) },
            "hipMemset",
        )
    }

    pub(crate) fn memcpy_h2d(&self, dst: usize, src: *const c_void, bytes: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.memcpy)(dst as *mut c_void, src, bytes, MEMCPY_HOST_TO_DEVICE) },
            "hipMemcpy",
        )
    }

    /// Stream-ordered upload; the host source must outlive the stream work.
    pub(crate) fn memcpy_h2d_async(
        &self,
        dst: usize,
        src: *const c_void,
        bytes: usize,
        stream: usize,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.memcpy_async)(
                    dst as *mut c_void,
                    src,
                    bytes,
                    MEMCPY_HOST_TO_DEVICE,
                    stream as *mut c_void,
                )
            },
            "hipMemcpyAsync",
        )
    }

    pub(crate) fn memcpy_d2h(&self, dst: *mut c_void, src: usize, bytes: usize) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.memcpy)(dst, src as *const c_void, bytes, MEMCPY_DEVICE_TO_HOST)
            },
            "hipMemcpy",
        )
    }

    pub(crate) fn memcpy_d2d(&self, dst: usize, src: usize, bytes: usize) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.memcpy)(
                    dst as *mut c_void,
                    src as *const c_void,
                    bytes,
                    MEMCPY_DEVICE_TO_DEVICE,
                )
            },
            "hipMemcpy",
        )
    }

    pub(crate) fn module_load_data(&self, image: &[u8]) -> Result<usize> {
        let mut module: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe { (self.fns.module_load_data)(&mut module, image.as_ptr() as *const c_void) },
            "hipModuleLoadData",
        )?;
        Ok(module as usize)
    }

    pub(crate) fn module_unload(&self, module: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.module_unload)(module as *mut c_void) },
            "hipModuleUnload",
        )
    }

    pub(crate) fn module_get_function(&self, module: usize, name: &CStr) -> Result<usize> {
        let mut func: *mut c_void = std::ptr::null_mut();
        self.check(
            unsafe {
                (self.fns.module_get_function)(&mut func, module as *mut c_void, name.as_ptr())
            },
            "hipModuleGetFunction",
        )?;
        Ok(func as usize)
    }

    pub(crate) fn launch_kernel(
        &self,
        func: usize,
        grid: u32,
        block: u32,
        stream: usize,
        params: &mut [*mut c_void],
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.module_launch_kernel)(
                    func as *mut c_void,
                    grid,
                    1,
                    1,
                    block,
                    1,
                    1,
                    0,
                    stream as *mut c_void,
                    params.as_mut_ptr(),
                    std::ptr::null_mut(),
                )
            },
            "hipModuleLaunchKernel",
        )
    }
}
