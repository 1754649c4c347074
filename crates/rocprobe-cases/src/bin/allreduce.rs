//! In-place sum all-reduce over device memory, interleaved with elementwise
//! device arithmetic. Run under mpirun; every rank checks the closed-form
//! expectation derived from the world size.

use anyhow::Result;
use rocprobe::comm::{Communicator, ReduceOp};
use rocprobe::{DeviceContext, DeviceTensor, Shape};
use rocprobe_cases::{check, Stopwatch};

const TEST_SIZE: usize = 8192;

fn run() -> Result<()> {
    let comm = Communicator::init()?;
    let ctx = DeviceContext::new(comm.rank())?;

    let mut data = DeviceTensor::filled(&ctx, 1i32, Shape::new([TEST_SIZE])?)?;
    let mut watch = Stopwatch::start();
    let mut reduce_micros = 0u128;

    comm.all_reduce(ReduceOp::Sum, None, &mut data, false)?;
    reduce_micros += watch.lap_micros();

    data.scalar_add(&ctx, 80)?;

    watch.lap_micros();
    comm.all_reduce(ReduceOp::Sum, None, &mut data, false)?;
    reduce_micros += watch.lap_micros();

    data.scalar_mul(&ctx, 32)?;

    let world = comm.world_size();
    let expected = vec![(world + 80) * world * 32; TEST_SIZE];
    let name = format!("allreduce-sum-rank-{}", comm.rank());
    check(&name, &data, &expected)?;
    eprintln!("{name}: reduces took {reduce_micros} us");

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
