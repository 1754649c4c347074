//! Average-pooling divisor semantics: a padded window must be averaged over
//! the in-bounds elements or the full window depending on the mode, and an
//! unpadded stride-2 pass reduces each full window exactly.

use anyhow::Result;
use rocprobe::ops::pooling;
use rocprobe::{DeviceContext, DeviceTensor, PoolingDescriptor, Shape};
use rocprobe_cases::check;

/// 4x4 frame of 2s around a 2x2 block of 1s.
const INPUT: [f32; 16] = [
    2.0, 2.0, 2.0, 2.0, //
    2.0, 1.0, 1.0, 2.0, //
    2.0, 1.0, 1.0, 2.0, //
    2.0, 2.0, 2.0, 2.0,
];

fn run_case(
    ctx: &DeviceContext,
    name: &str,
    desc: &PoolingDescriptor,
    out_dims: [usize; 4],
    expected: &[f32],
) -> Result<()> {
    let x = DeviceTensor::from_slice(ctx, &INPUT, Shape::new([1, 1, 4, 4])?)?;
    let mut y = DeviceTensor::zeros(ctx, Shape::new(out_dims.to_vec())?)?;
    pooling::forward(ctx, desc, &x, &mut y)?;
    check(name, &y, expected)?;
    Ok(())
}

fn run() -> Result<()> {
    let ctx = DeviceContext::new(0)?;

    run_case(
        &ctx,
        "avgpool-padded-exclude-pad",
        &PoolingDescriptor::new("avg", [2, 2], [1, 1], [2, 2]),
        [1, 1, 3, 3],
        &[2.0, 2.0, 2.0, 2.0, 1.0, 2.0, 2.0, 2.0, 2.0],
    )?;

    run_case(
        &ctx,
        "avgpool-padded-include-pad",
        &PoolingDescriptor::new("avg_include_pad", [2, 2], [1, 1], [2, 2]),
        [1, 1, 3, 3],
        &[0.5, 1.0, 0.5, 1.0, 1.0, 1.0, 0.5, 1.0, 0.5],
    )?;

    run_case(
        &ctx,
        "avgpool-unpadded",
        &PoolingDescriptor::new("avg", [2, 2], [0, 0], [2, 2]),
        [1, 1, 2, 2],
        &[1.75, 1.75, 1.75, 1.75],
    )?;

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
