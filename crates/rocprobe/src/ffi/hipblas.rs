//! Function table over hipBLAS (`libhipblas`).
//!
//! Only the single-precision entry points are resolved; the operator layer
//! gates element types before reaching this module.

use std::ffi::c_void;
use std::sync::{Arc, OnceLock};

use libloading::Library;

use super::{load_symbol, open_library};
use crate::error::{Error, Result};

type BlasStatus = i32;

const STATUS_SUCCESS: BlasStatus = 0;

pub(crate) const OP_N: i32 = 111;
pub(crate) const OP_T: i32 = 112;

const POINTER_MODE_HOST: i32 = 0;
const POINTER_MODE_DEVICE: i32 = 1;

type CreateFn = unsafe extern "C" fn(handle: *mut *mut c_void) -> BlasStatus;
type DestroyFn = unsafe extern "C" fn(handle: *mut c_void) -> BlasStatus;
type SetStreamFn = unsafe extern "C" fn(handle: *mut c_void, stream: *mut c_void) -> BlasStatus;
type SetPointerModeFn = unsafe extern "C" fn(handle: *mut c_void, mode: i32) -> BlasStatus;
type SdotFn = unsafe extern "C" fn(
    handle: *mut c_void,
    n: i32,
    x: *const f32,
    incx: i32,
    y: *const f32,
    incy: i32,
    result: *mut f32,
) -> BlasStatus;
type SgemvFn = unsafe extern "C" fn(
    handle: *mut c_void,
    trans: i32,
    m: i32,
    n: i32,
    alpha: *const f32,
    a: *const f32,
    lda: i32,
    x: *const f32,
    incx: i32,
    beta: *const f32,
    y: *mut f32,
    incy: i32,
) -> BlasStatus;
type SgerFn = unsafe extern "C" fn(
    handle: *mut c_void,
    m: i32,
    n: i32,
    alpha: *const f32,
    x: *const f32,
    incx: i32,
    y: *const f32,
    incy: i32,
    a: *mut f32,
    lda: i32,
) -> BlasStatus;
type SgemmFn = unsafe extern "C" fn(
    handle: *mut c_void,
    transa: i32,
    transb: i32,
    m: i32,
    n: i32,
    k: i32,
    alpha: *const f32,
    a: *const f32,
    lda: i32,
    b: *const f32,
    ldb: i32,
    beta: *const f32,
    c: *mut f32,
    ldc: i32,
) -> BlasStatus;
type SgemmBatchedFn = unsafe extern "C" fn(
    handle: *mut c_void,
    transa: i32,
    transb: i32,
    m: i32,
    n: i32,
    k: i32,
    alpha: *const f32,
    a: *const *const f32,
    lda: i32,
    b: *const *const f32,
    ldb: i32,
    beta: *const f32,
    c: *const *mut f32,
    ldc: i32,
    batch_count: i32,
) -> BlasStatus;

struct HipblasFns {
    create: CreateFn,
    destroy: DestroyFn,
    set_stream: SetStreamFn,
    set_pointer_mode: SetPointerModeFn,
    sdot: SdotFn,
    sgemv: SgemvFn,
    sger: SgerFn,
    sgemm: SgemmFn,
    sgemm_batched: SgemmBatchedFn,
}

pub(crate) struct HipblasLib {
    _lib: Library,
    fns: HipblasFns,
}

unsafe impl Send for HipblasLib {}
unsafe impl Sync for HipblasLib {}

static HIPBLAS_LIB: OnceLock<Result<Arc<HipblasLib>, String>> = OnceLock::new();

pub(crate) fn hipblas() -> Result<Arc<HipblasLib>> {
    let state = HIPBLAS_LIB.get_or_init(|| match HipblasLib::load() {
        Ok(lib) => Ok(Arc::new(lib)),
        Err(err) => Err(err.to_string()),
    });
    match state {
        Ok(lib) => Ok(Arc::clone(lib)),
        Err(msg) => Err(Error::backend("hipblas", msg.clone())),
    }
}

impl HipblasLib {
    fn load() -> Result<Self> {
        let lib = open_library(&["libhipblas.so.2", "libhipblas.so.1", "libhipblas.so"])?;
        let fns = HipblasFns {
            create: load_symbol(&lib, b"hipblasCreate\0")?,
            destroy: load_symbol(&lib, b"hipblasDestroy\0")?,
            set_stream: load_symbol(&lib, b"hipblasSetStream\0")?,
            set_pointer_mode: load_symbol(&lib, b"hipblasSetPointerMode\0")?,
            sdot: load_symbol(&lib, b"hipblasSdot\0")?,
            sgemv: load_symbol(&lib, b"hipblasSgemv\0")?,
            sger: load_symbol(&lib, b"hipblasSger\0")?,
            sgemm: load_symbol(&lib, b"hipblasSgemm\0")?,
            sgemm_batched: load_symbol(&lib, b"hipblasSgemmBatched\0")?,
        };
        Ok(HipblasLib { _lib: lib, fns })
    }

    // hipBLAS has no error-string entry point; the numeric status is the
    // diagnostic.
    fn check(&self, status: BlasStatus, call: &'static str) -> Result<()> {
        if status == STATUS_SUCCESS {
            return Ok(());
        }
        Err(Error::backend(call, format!("status {status}")))
    }

    pub(crate) fn create(&self) -> Result<usize> {
        let mut handle: *mut c_void = std::ptr::null_mut();
        self.check(unsafe { (self.fns.create)(&mut handle) }, "hipblasCreate")?;
        Ok(handle as usize)
    }

    pub(crate) fn destroy(&self, handle: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.destroy)(handle as *mut c_void) },
            "hipblasDestroy",
        )
    }

    pub(crate) fn set_stream(&self, handle: usize, stream: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.set_stream)(handle as *mut c_void, stream as *mut c_void) },
            "hipblasSetStream",
        )
    }

    pub(crate) fn set_pointer_mode_device(&self, handle: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.set_pointer_mode)(handle as *mut c_void, POINTER_MODE_DEVICE) },
            "hipblasSetPointerMode",
        )
    }

    pub(crate) fn set_pointer_mode_host(&self, handle: usize) -> Result<()> {
        self.check(
            unsafe { (self.fns.set_pointer_mode)(handle as *mut c_void, POINTER_MODE_HOST) },
            "hipblasSetPointerMode",
        )
    }

    /// Caller is responsible for the pointer mode matching where `result`
    /// lives.
    pub(crate) fn sdot(
        &self,
        handle: usize,
        n: i32,
        x: *const c_void,
        y: *const c_void,
        result: *mut c_void,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.sdot)(
                    handle as *mut c_void,
                    n,
                    x as *const f32,
                    1,
                    y as *const f32,
                    1,
                    result as *mut f32,
                )
            },
            "hipblasSdot",
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn sgemv(
        &self,
        handle: usize,
        trans: i32,
        m: i32,
        n: i32,
        alpha: f32,
        a: *const c_void,
        lda: i32,
        x: *const c_void,
        beta: f32,
        y: *mut c_void,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.sgemv)(
                    handle as *mut c_void,
                    trans,
                    m,
                    n,
                    &alpha,
                    a as *const f32,
                    lda,
                    x as *const f32,
                    1,
                    &beta,
                    y as *mut f32,
                    1,
                )
            },
            "hipblasSgemv",
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn sger(
        &self,
        handle: usize,
        m: i32,
        n: i32,
        alpha: f32,
        x: *const c_void,
        y: *const c_void,
        a: *mut c_void,
        lda: i32,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.sger)(
                    handle as *mut c_void,
                    m,
                    n,
                    &alpha,
                    x as *const f32,
                    1,
                    y as *const f32,
                    1,
                    a as *mut f32,
                    lda,
                )
            },
            "hipblasSger",
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn sgemm(
        &self,
        handle: usize,
        transa: i32,
        transb: i32,
        m: i32,
        n: i32,
        k: i32,
        alpha: f32,
        a: *const c_void,
        lda: i32,
        b: *const c_void,
        ldb: i32,
        beta: f32,
        c: *mut c_void,
        ldc: i32,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.sgemm)(
                    handle as *mut c_void,
                    transa,
                    transb,
                    m,
                    n,
                    k,
                    &alpha,
                    a as *const f32,
                    lda,
                    b as *const f32,
                    ldb,
                    &beta,
                    c as *mut f32,
                    ldc,
                )
            },
            "hipblasSgemm",
        )
    }

    /// Pointer arrays live in device memory.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn sgemm_batched(
        &self,
        handle: usize,
        transa: i32,
        transb: i32,
        m: i32,
        n: i32,
        k: i32,
        alpha: f32,
        a_array: usize,
        lda: i32,
        b_array: usize,
        ldb: i32,
        beta: f32,
        c_array: usize,
        ldc: i32,
        batch_count: i32,
    ) -> Result<()> {
        self.check(
            unsafe {
                (self.fns.sgemm_batched)(
                    handle as *mut c_void,
                    transa,
                    transb,
                    m,
                    n,
                    k,
                    &alpha,
                    a_array as *const *const f32,
                    lda,
                    b_array as *const *const f32,
                    ldb,
                    &beta,
                    c_array as *const *mut f32,
                    ldc,
                    batch_count,
                )
            },
            "hipblasSgemmBatched",
        )
    }
}
