//! Soak loop over VGG-sized convolution backward passes. Workspace sizing
//! and algorithm selection run fresh on every iteration; instability shows
//! up as a backend error or a device fault long before the loop ends.

use anyhow::Result;
use rocprobe::ops::convolution;
use rocprobe::{ConvDescriptor, DeviceContext, DeviceTensor, Shape};
use rocprobe_cases::Stopwatch;

const ITERATIONS: usize = 50;

fn run() -> Result<()> {
    let ctx = DeviceContext::new(0)?;
    let desc = ConvDescriptor::new("conv", [1, 1], [3, 3]);

    let dy = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([32, 64, 75, 75])?)?;
    let x = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([32, 3, 224, 224])?)?;
    let w = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([64, 3, 3, 3])?)?;
    let mut dw = DeviceTensor::<f32>::zeros(&ctx, Shape::new([64, 3, 3, 3])?)?;
    let mut dx = DeviceTensor::<f32>::zeros(&ctx, Shape::new([32, 3, 224, 224])?)?;

    let mut watch = Stopwatch::start();
    for iteration in 1..=ITERATIONS {
        convolution::backward_weights(&ctx, &desc, &dy, &x, &mut dw, None)?;
        convolution::backward_data(&ctx, &desc, &dy, &w, &mut dx)?;
        if iteration % 10 == 0 {
            eprintln!(
                "iteration {iteration}/{ITERATIONS}: {} us",
                watch.lap_micros()
            );
        }
    }
    eprintln!("conv-soak: PASS");

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
