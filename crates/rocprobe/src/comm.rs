//! MPI collectives over device tensors.

use std::ffi::c_void;

use std::sync::Arc;

use crate::dtype::Element;
use crate::error::{ensure_arg, Result};
use crate::ffi::mpi::{mpi, MpiLib};
use crate::tensor::DeviceTensor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Prod,
    Min,
    Max,
}

/// World-communicator membership for one process.
///
/// `init` attaches the process to MPI; dropping the communicator finalizes
/// it. One communicator per process.
pub struct Communicator {
    mpi: Arc<MpiLib>,
    rank: i32,
    world_size: i32,
}

impl Communicator {
    pub fn init() -> Result<Self> {
        let mpi = mpi()?;
        mpi.init()?;
        let rank = mpi.comm_rank()?;
        let world_size = mpi.comm_size()?;
        eprintln!("rank {rank} of {world_size} up");
        Ok(Communicator {
            mpi,
            rank,
            world_size,
        })
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn world_size(&self) -> i32 {
        self.world_size
    }

    /// All-reduces `recv` across the world communicator.
    ///
    /// With `send` absent the reduction is in place over `recv`. The direct
    /// path hands device pointers straight to MPI and needs a GPU-aware
    /// library; `staged` routes the data through a host copy instead and is
    /// in-place only.
    pub fn all_reduce<T: Element>(
        &self,
        op: ReduceOp,
        send: Option<&DeviceTensor<T>>,
        recv: &mut DeviceTensor<T>,
        staged: bool,
    ) -> Result<()> {
        let count = recv.size();
        if count == 0 {
            return Ok(());
        }
        ensure_arg!(
            recv.is_allocated(),
            "all-reduce needs an allocated receive tensor"
        );
        ensure_arg!(
            count <= i32::MAX as usize,
            "all-reduce of {count} elements exceeds the MPI count range"
        );
        if let Some(send) = send {
            ensure_arg!(
                send.size() == count,
                "send tensor has {} elements, receive tensor {count}",
                send.size()
            );
        }
        let datatype = self.mpi.datatype(T::DTYPE);
        let mpi_op = self.mpi.reduce_op(op);

        if staged {
            ensure_arg!(
                send.is_none(),
                "staged all-reduce supports in-place reduction only"
            );
            let mut host = recv.to_vec()?;
            self.mpi.allreduce_world(
                self.mpi.in_place(),
                host.as_mut_ptr() as *mut c_void,
                count as i32,
                datatype,
                mpi_op,
            )?;
            recv.buffer()?.upload(unsafe {
                std::slice::from_raw_parts(
                    host.as_ptr() as *const u8,
                    std::mem::size_of_val(host.as_slice()),
                )
            })
        } else {
            let sendbuf = match send {
                Some(tensor) => tensor.device_ptr() as usize,
                None => self.mpi.in_place(),
            };
            self.mpi.allreduce_world(
                sendbuf,
                recv.device_ptr(),
                count as i32,
                datatype,
                mpi_op,
            )
        }
    }
}

impl Drop for Communicator {
    fn drop(&mut self) {
        let _ = self.mpi.finalize();
    }
}
