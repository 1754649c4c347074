//! Transposed-convolution backward passes with a deliberately dirty weight
//! gradient: dw starts at 0.5 everywhere, so a pass that blends instead of
//! overwriting (beta != 0) fails the weight-gradient check.

use anyhow::Result;
use rocprobe::ops::deconvolution;
use rocprobe::{ConvDescriptor, DeviceContext, DeviceTensor, Shape};
use rocprobe_cases::check;

const DIRTY_SEED: f32 = 0.5;

const X: [f32; 96] = [
    -0.6671, 1.7192, -1.2086, 1.2454, //
    -0.6652, -0.9885, 0.0499, 0.1964, //
    -0.1973, 1.2310, 0.1152, 0.7395, //
    -0.8608, 2.1752, -1.3127, 0.7532, //
    -0.4895, 1.8831, 0.6865, -0.9189, //
    1.2049, -1.6723, -0.4515, -1.2286, //
    -0.9865, -0.9323, -0.4145, -0.5130, //
    -0.1131, 0.2655, -2.4192, -1.3803, //
    0.3083, 1.2565, -0.9073, 0.2407, //
    -1.9617, -0.0832, 1.1119, -0.6040, //
    0.2878, 2.2395, 0.3418, -1.4211, //
    -0.2965, -0.8339, 1.7215, -0.7722, //
    -0.4381, -0.2254, 0.6824, 1.8916, //
    0.3967, -2.1019, 0.6397, 1.5591, //
    -0.5058, 2.0684, -0.6783, 1.2788, //
    1.0566, -2.0563, 0.0228, 0.1780, //
    1.6386, 1.6733, 0.8226, -0.5406, //
    1.8118, -1.6473, -0.1764, 0.8936, //
    -0.9256, 0.4544, 0.5450, 0.4780, //
    0.9971, -0.2033, 0.6492, -0.4356, //
    0.5565, 1.7077, 1.9988, 0.2595, //
    -0.3809, -1.1851, 0.2242, -0.4854, //
    1.7408, 0.6216, 0.9197, 0.4270, //
    -0.2480, 0.0658, 0.0719, -0.0754,
];

const W: [f32; 6] = [-0.1821, 0.5005, 0.4823, -0.5078, 0.0187, 0.4072];

const W_GRAD: [f32; 6] = [6.0931, 6.0931, -1.4449, -1.4449, 6.8468, 6.8468];

const B_GRAD: [f32; 2] = [32.0, 32.0];

/// With dy all ones, each input channel's gradient is the sum of its weight
/// column, broadcast over the spatial extent.
const X_GRAD_PER_CHANNEL: [f32; 3] = [0.3184, -0.0255, 0.4259];

fn run() -> Result<()> {
    let ctx = DeviceContext::new(0)?;
    let desc = ConvDescriptor::with_dilation("deconv", [0, 0], [1, 1], [1, 1]);

    let dy = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([2, 2, 4, 4])?)?;
    let x = DeviceTensor::from_slice(&ctx, &X, Shape::new([2, 3, 4, 4])?)?;
    let w = DeviceTensor::from_slice(&ctx, &W, Shape::new([3, 2, 1, 1])?)?;

    let mut dw = DeviceTensor::filled(&ctx, DIRTY_SEED, Shape::new([3, 2, 1, 1])?)?;
    let mut db = DeviceTensor::zeros(&ctx, Shape::new([2])?)?;
    deconvolution::backward_weights(&ctx, &desc, &dy, &x, &mut dw, Some(&mut db))?;
    check("deconv-backward-weights", &dw, &W_GRAD)?;
    check("deconv-backward-bias", &db, &B_GRAD)?;

    let mut dx = DeviceTensor::zeros(&ctx, Shape::new([2, 3, 4, 4])?)?;
    deconvolution::backward_data(&ctx, &desc, &dy, &w, &mut dx)?;
    let mut x_grad = Vec::with_capacity(96);
    for _ in 0..2 {
        for value in X_GRAD_PER_CHANNEL {
            x_grad.extend(std::iter::repeat(value).take(16));
        }
    }
    check("deconv-backward-data", &dx, &x_grad)?;

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
