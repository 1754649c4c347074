//! Function table over MPI (`libmpi`), resolved without generated bindings.
//!
//! The two dominant ABIs differ in how predefined objects are spelled:
//! OpenMPI exports them as global structs whose addresses are the handles,
//! while MPICH-family libraries bake them in as integer constants. Both
//! fit in a pointer, so every handle crosses this module as `usize` and the
//! flavor is resolved once at load time by probing for an OpenMPI symbol.

use std::ffi::{c_char, c_void};
use std::sync::{Arc, OnceLock};

use libloading::Library;

use super::{load_symbol, open_library};
use crate::dtype::DType;
use crate::error::{Error, Result};

const MPI_SUCCESS: i32 = 0;

// MPICH predefined handles, as laid out in its mpi.h.
mod mpich {
    pub const COMM_WORLD: usize = 0x4400_0000;
    pub const OP_MAX: usize = 0x5800_0001;
    pub const OP_MIN: usize = 0x5800_0002;
    pub const OP_SUM: usize = 0x5800_0003;
    pub const OP_PROD: usize = 0x5800_0004;
    pub const UINT8_T: usize = 0x4c00_013b;
    pub const UINT16_T: usize = 0x4c00_023c;
    pub const UINT32_T: usize = 0x4c00_043d;
    pub const INT32_T: usize = 0x4c00_0439;
    pub const FLOAT: usize = 0x4c00_040a;
    pub const DOUBLE: usize = 0x4c00_080b;
    pub const IN_PLACE: usize = usize::MAX; // (void *) -1
    pub const STATUSES_IGNORE: usize = 1;
}

type InitFn = unsafe extern "C" fn(argc: *mut i32, argv: *mut *mut *mut c_char) -> i32;
type FinalizeFn = unsafe extern "C" fn() -> i32;
type CommRankFn = unsafe extern "C" fn(comm: usize, rank: *mut i32) -> i32;
type CommSizeFn = unsafe extern "C" fn(comm: usize, size: *mut i32) -> i32;
type IallreduceFn = unsafe extern "C" fn(
    sendbuf: *const c_void,
    recvbuf: *mut c_void,
    count: i32,
    datatype: usize,
    op: usize,
    comm: usize,
    request: *mut usize,
) -> i32;
type WaitallFn = unsafe extern "C" fn(count: i32, requests: *mut usize, statuses: usize) -> i32;

struct MpiFns {
    init: InitFn,
    finalize: FinalizeFn,
    comm_rank: CommRankFn,
    comm_size: CommSizeFn,
    iallreduce: IallreduceFn,
    waitall: WaitallFn,
}

/// Predefined handles resolved for whichever ABI was loaded.
struct MpiHandles {
    comm_world: usize,
    op_sum: usize,
    op_prod: usize,
    op_min: usize,
    op_max: usize,
    dt_u8: usize,
    dt_u16: usize,
    dt_u32: usize,
    dt_i32: usize,
    dt_f32: usize,
    dt_f64: usize,
    in_place: usize,
    statuses_ignore: usize,
}

pub(crate) struct MpiLib {
    _lib: Library,
    fns: MpiFns,
    handles: MpiHandles,
}

unsafe impl Send for MpiLib {}
unsafe impl Sync for MpiLib {}

static MPI_LIB: OnceLock<Result<Arc<MpiLib>, String>> = OnceLock::new();

pub(crate) fn mpi() -> Result<Arc<MpiLib>> {
    let state = MPI_LIB.get_or_init(|| match MpiLib::load() {
        Ok(lib) => Ok(Arc::new(lib)),
        Err(err) => Err(err.to_string()),
    });
    match state {
        Ok(lib) => Ok(Arc::clone(lib)),
        Err(msg) => Err(Error::backend("mpi", msg.clone())),
    }
}

fn object_address(lib: &Library, name: &'static [u8]) -> Result<usize> {
    let sym = unsafe { lib.get::<u8>(name) }.map_err(|err| {
        Error::backend(
            "dlsym",
            format!(
                "missing MPI object {}: {err}",
                String::from_utf8_lossy(&name[..name.len().saturating_sub(1)])
            ),
        )
    })?;
    Ok(&*sym as *const u8 as usize)
}

impl MpiLib {
    fn load() -> Result<Self> {
        let lib = open_library(&["libmpi.so.40", "libmpi.so.12", "libmpi.so"])?;
        let fns = MpiFns {
            init: load_symbol(&lib, b"MPI_Init\0")?,
            finalize: load_symbol(&lib, b"MPI_Finalize\0")?,
            comm_rank: load_symbol(&lib, b"MPI_Comm_rank\0")?,
            comm_size: load_symbol(&lib, b"MPI_Comm_size\0")?,
            iallreduce: load_symbol(&lib, b"MPI_Iallreduce\0")?,
            waitall: load_symbol(&lib, b"MPI_Waitall\0")?,
        };
        let open_mpi = unsafe { lib.get::<u8>(b"ompi_mpi_comm_world\0") }.is_ok();
        let handles = if open_mpi {
            MpiHandles {
                comm_world: object_address(&lib, b"ompi_mpi_comm_world\0")?,
                op_sum: object_address(&lib, b"ompi_mpi_op_sum\0")?,
                op_prod: object_address(&lib, b"ompi_mpi_op_prod\0")?,
                op_min: object_address(&lib, b"ompi_mpi_op_min\0")?,
                op_max: object_address(&lib, b"ompi_mpi_op_max\0")?,
                dt_u8: object_address(&lib, b"ompi_mpi_uint8_t\0")?,
                dt_u16: object_address(&lib, b"ompi_mpi_uint16_t\0")?,
                dt_u32: object_address(&lib, b"ompi_mpi_uint32_t\0")?,
                dt_i32: object_address(&lib, b"ompi_mpi_int32_t\0")?,
                dt_f32: object_address(&lib, b"ompi_mpi_float\0")?,
                dt_f64: object_address(&lib, b"ompi_mpi_double\0")?,
                in_place: 1, // (void *) 1
                statuses_ignore: 0,
            }
        } else {
            MpiHandles {
                comm_world: mpich::COMM_WORLD,
                op_sum: mpich::OP_SUM,
                op_prod: mpich::OP_PROD,
                op_min: mpich::OP_MIN,
                op_max: mpich::OP_MAX,
                dt_u8: mpich::UINT8_T,
                dt_u16: mpich::UINT16_T,
                dt_u32: mpich::UINT32_T,
                dt_i32: mpich::INT32_T,
                dt_f32: mpich::FLOAT,
                dt_f64: mpich::DOUBLE,
                in_place: mpich::IN_PLACE,
                statuses_ignore: mpich::STATUSES_IGNORE,
            }
        };
        Ok(MpiLib {
            _lib: lib,
            fns,
            handles,
        })
    }

    fn check(status: i32, call: &'static str) -> Result<()> {
        if status == MPI_SUCCESS {
            return Ok(());
        }
        Err(Error::backend(call, format!("status {status}")))
    }

    pub(crate) fn datatype(&self, dtype: DType) -> usize {
        match dtype {
            DType::U8 => self.handles.dt_u8,
            DType::U16 => self.handles.dt_u16,
            DType::U32 => self.handles.dt_u32,
            DType::I32 => self.handles.dt_i32,
            DType::F32 => self.handles.dt_f32,
            DType::F64 => self.handles.dt_f64,
        }
    }

    pub(crate) fn in_place(&self) -> usize {
        self.handles.in_place
    }

    pub(crate) fn init(&self) -> Result<()> {
        Self::check(
            unsafe { (self.fns.init)(std::ptr::null_mut(), std::ptr::null_mut()) },
            "MPI_Init",
        )
    }

    pub(crate) fn finalize(&self) -> Result<()> {
        Self::check(unsafe { (self.fns.finalize)() }, "MPI_Finalize")
    }

    pub(crate) fn comm_rank(&self) -> Result<i32> {
        let mut rank = 0i32;
        Self::check(
            unsafe { (self.fns.comm_rank)(self.handles.comm_world, &mut rank) },
            "MPI_Comm_rank",
        )?;
        Ok(rank)
    }

    pub(crate) fn comm_size(&self) -> Result<i32> {
        let mut size = 0i32;
        Self::check(
            unsafe { (self.fns.comm_size)(self.handles.comm_world, &mut size) },
            "MPI_Comm_size",
        )?;
        Ok(size)
    }

    /// Posts a non-blocking all-reduce on the world communicator and waits
    /// for it to complete.
    pub(crate) fn allreduce_world(
        &self,
        sendbuf: usize,
        recvbuf: *mut c_void,
        count: i32,
        datatype: usize,
        op: usize,
    ) -> Result<()> {
        // MPICH requests are 4 bytes; a zeroed usize slot holds either
        // representation.
        let mut request = 0usize;
        Self::check(
            unsafe {
                (self.fns.iallreduce)(
                    sendbuf as *const c_void,
                    recvbuf,
                    count,
                    datatype,
                    op,
                    self.handles.comm_world,
                    &mut request,
                )
            },
            "MPI_Iallreduce",
        )?;
        Self::check(
            unsafe { (self.fns.waitall)(1, &mut request, self.handles.statuses_ignore) },
            "MPI_Waitall",
        )
    }

    pub(crate) fn reduce_op(&self, op: crate::comm::ReduceOp) -> usize {
        match op {
            crate::comm::ReduceOp::Sum => self.handles.op_sum,
            crate::comm::ReduceOp::Prod => self.handles.op_prod,
            crate::comm::ReduceOp::Min => self.handles.op_min,
            crate::comm::ReduceOp::Max => self.handles.op_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // MPICH datatype handles carry the element width in their second byte.
    #[test]
    fn mpich_handles_encode_element_widths() {
        let pairs = [
            (mpich::UINT8_T, DType::U8),
            (mpich::UINT16_T, DType::U16),
            (mpich::UINT32_T, DType::U32),
            (mpich::INT32_T, DType::I32),
            (mpich::FLOAT, DType::F32),
            (mpich::DOUBLE, DType::F64),
        ];
        for (handle, dtype) in pairs {
            assert_eq!((handle >> 8) & 0xff, dtype.size_in_bytes(), "{dtype}");
        }
    }

    #[test]
    fn mpich_sentinels_are_distinct() {
        assert_ne!(mpich::IN_PLACE, mpich::STATUSES_IGNORE);
        assert_ne!(mpich::OP_SUM, mpich::OP_PROD);
    }
}
