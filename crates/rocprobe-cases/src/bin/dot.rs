//! Dot product with the result written straight into device memory, which
//! exercises the scalar-pointer-mode switch around the BLAS call.

use anyhow::Result;
use rocprobe::ops::blas;
use rocprobe::{DeviceContext, DeviceTensor, Shape};
use rocprobe_cases::check;

fn run() -> Result<()> {
    let ctx = DeviceContext::new(0)?;

    let x = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([4])?)?;
    let y = DeviceTensor::filled(&ctx, 2.0f32, Shape::new([4])?)?;
    let mut result = DeviceTensor::zeros(&ctx, Shape::new([1])?)?;

    // Restricted to the first element pair: 1 * 2.
    blas::dot(&ctx, 1, &x, &y, &mut result)?;
    check("dot-first-element", &result, &[2.0f32])?;

    let mut full = DeviceTensor::zeros(&ctx, Shape::new([1])?)?;
    blas::dot(&ctx, 4, &x, &y, &mut full)?;
    check("dot-full-length", &full, &[8.0f32])?;

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
