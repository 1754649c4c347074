//! Runtime kernel compilation through hipRTC.

use std::ffi::{c_char, c_void, CString};
use std::ptr;

use libloading::Library;

use super::{load_symbol, open_library};
use crate::error::{Error, Result};

type RtcStatus = i32;

const RTC_SUCCESS: RtcStatus = 0;

type Program = *mut c_void;

type CreateProgramFn = unsafe extern "C" fn(
    prog: *mut Program,
    src: *const c_char,
    name: *const c_char,
    num_headers: i32,
    headers: *const *const c_char,
    include_names: *const *const c_char,
) -> RtcStatus;
type CompileProgramFn =
    unsafe extern "C" fn(prog: Program, num_options: i32, options: *const *const c_char) -> RtcStatus;
type GetCodeSizeFn = unsafe extern "C" fn(prog: Program, size: *mut usize) -> RtcStatus;
type GetCodeFn = unsafe extern "C" fn(prog: Program, code: *mut c_char) -> RtcStatus;
type GetLogSizeFn = unsafe extern "C" fn(prog: Program, size: *mut usize) -> RtcStatus;
type GetLogFn = unsafe extern "C" fn(prog: Program, log: *mut c_char) -> RtcStatus;
type DestroyProgramFn = unsafe extern "C" fn(prog: *mut Program) -> RtcStatus;

struct RtcFns {
    create_program: CreateProgramFn,
    compile_program: CompileProgramFn,
    get_code_size: GetCodeSizeFn,
    get_code: GetCodeFn,
    get_log_size: GetLogSizeFn,
    get_log: GetLogFn,
    destroy_program: DestroyProgramFn,
}

pub(crate) struct RtcLib {
    _lib: Library,
    fns: RtcFns,
}

impl RtcLib {
    pub(crate) fn load() -> Result<Self> {
        // hipRTC ships standalone on recent ROCm and inside the runtime
        // library on older installs.
        let lib = open_library(&[
            "libhiprtc.so.6",
            "libhiprtc.so.5",
            "libhiprtc.so",
            "libamdhip64.so",
        ])?;
        let fns = RtcFns {
            create_program: load_symbol(&lib, b"hiprtcCreateProgram\0")?,
            compile_program: load_symbol(&lib, b"hiprtcCompileProgram\0")?,
            get_code_size: load_symbol(&lib, b"hiprtcGetCodeSize\0")?,
            get_code: load_symbol(&lib, b"hiprtcGetCode\0")?,
            get_log_size: load_symbol(&lib, b"hiprtcGetProgramLogSize\0")?,
            get_log: load_symbol(&lib, b"hiprtcGetProgramLog\0")?,
            destroy_program: load_symbol(&lib, b"hiprtcDestroyProgram\0")?,
        };
        Ok(RtcLib { _lib: lib, fns })
    }

    /// Compiles HIP C++ source into a loadable code object.
    pub(crate) fn compile(&self, source: &str, name: &str) -> Result<Vec<u8>> {
        let source = CString::new(source)
            .map_err(|_| Error::argument("kernel source contains a NUL byte"))?;
        let name = CString::new(name)
            .map_err(|_| Error::argument("kernel program name contains a NUL byte"))?;

        let mut prog: Program = ptr::null_mut();
        let status = unsafe {
            (self.fns.create_program)(
                &mut prog,
                source.as_ptr(),
                name.as_ptr(),
                0,
                ptr::null(),
                ptr::null(),
            )
        };
        if status != RTC_SUCCESS {
            return Err(Error::backend(
                "hiprtcCreateProgram",
                format!("status {status}"),
            ));
        }

        let status = unsafe { (self.fns.compile_program)(prog, 0, ptr::null()) };
        if status != RTC_SUCCESS {
            let log = self.program_log(prog);
            unsafe { (self.fns.destroy_program)(&mut prog) };
            return Err(Error::backend("hiprtcCompileProgram", log));
        }

        let result = self.extract_code(prog);
        unsafe { (self.fns.destroy_program)(&mut prog) };
        result
    }

    fn extract_code(&self, prog: Program) -> Result<Vec<u8>> {
        let mut size = 0usize;
        let status = unsafe { (self.fns.get_code_size)(prog, &mut size) };
        if status != RTC_SUCCESS {
            return Err(Error::backend(
                "hiprtcGetCodeSize",
                format!("status {status}"),
            ));
        }
        let mut code = vec![0u8; size];
        let status = unsafe { (self.fns.get_code)(prog, code.as_mut_ptr() as *mut c_char) };
        if status != RTC_SUCCESS {
            return Err(Error::backend("hiprtcGetCode", format!("status {status}")));
        }
        Ok(code)
    }

    /// Best-effort compile log for diagnostics.
    fn program_log(&self, prog: Program) -> String {
        let mut size = 0usize;
        if unsafe { (self.fns.get_log_size)(prog, &mut size) } != RTC_SUCCESS || size <= 1 {
            return "no compile log available".to_string();
        }
        let mut log = vec![0u8; size];
        if unsafe { (self.fns.get_log)(prog, log.as_mut_ptr() as *mut c_char) } != RTC_SUCCESS {
            return "no compile log available".to_string();
        }
        while log.last() == Some(&0) {
            log.pop();
        }
        String::from_utf8_lossy(&log).into_owned()
    }
}
