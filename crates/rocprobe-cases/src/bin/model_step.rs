//! Full training-step soak: conv -> five max pools -> fully-connected
//! forward, then the whole gradient chain back down to the input. Shapes
//! follow VGG's first block. Run under mpirun; each rank drives the device
//! matching its rank, and the fully-connected gradients are checked against
//! their closed forms for all-ones data.

use anyhow::Result;
use rocprobe::comm::Communicator;
use rocprobe::ops::{convolution, fully_connected, pooling};
use rocprobe::{ConvDescriptor, DeviceContext, DeviceTensor, PoolingDescriptor, Shape};
use rocprobe_cases::{check, Stopwatch};

const ITERATIONS: usize = 10;
const BATCH: usize = 32;
const CHANNELS: usize = 64;
const FC_IN: usize = CHANNELS * 7 * 7;
const FC_OUT: usize = 1000;

// Spatial extents going into each of the five 2x2/stride-2 pools.
const POOL_EXTENTS: [usize; 6] = [224, 112, 56, 28, 14, 7];

fn activation(ctx: &DeviceContext, extent: usize) -> Result<DeviceTensor<f32>> {
    Ok(DeviceTensor::zeros(
        ctx,
        Shape::new([BATCH, CHANNELS, extent, extent])?,
    )?)
}

fn run() -> Result<()> {
    let comm = Communicator::init()?;
    let rank = comm.rank();
    let ctx = DeviceContext::new(rank)?;

    let conv_desc = ConvDescriptor::new("conv", [1, 1], [1, 1]);
    let pool_desc = PoolingDescriptor::new("max", [2, 2], [0, 0], [2, 2]);

    let input = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([BATCH, 3, 224, 224])?)?;
    let conv_w = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([CHANNELS, 3, 3, 3])?)?;
    let conv_b = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([CHANNELS])?)?;
    let fc_w = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([FC_OUT, FC_IN])?)?;
    let fc_b = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([FC_OUT])?)?;

    let mut conv_out = activation(&ctx, POOL_EXTENTS[0])?;
    let mut pool_outs = Vec::with_capacity(5);
    for extent in &POOL_EXTENTS[1..] {
        pool_outs.push(activation(&ctx, *extent)?);
    }
    let mut output = DeviceTensor::<f32>::zeros(&ctx, Shape::new([BATCH, FC_OUT])?)?;

    let output_grad = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([BATCH, FC_OUT])?)?;
    let mut fc_w_grad = DeviceTensor::<f32>::zeros(&ctx, Shape::new([FC_OUT, FC_IN])?)?;
    let mut fc_b_grad = DeviceTensor::<f32>::zeros(&ctx, Shape::new([FC_OUT])?)?;
    let mut pool_grads = Vec::with_capacity(5);
    for extent in &POOL_EXTENTS[1..] {
        pool_grads.push(activation(&ctx, *extent)?);
    }
    let mut conv_out_grad = activation(&ctx, POOL_EXTENTS[0])?;
    let mut conv_w_grad = DeviceTensor::<f32>::zeros(&ctx, Shape::new([CHANNELS, 3, 3, 3])?)?;
    let mut conv_b_grad = DeviceTensor::<f32>::zeros(&ctx, Shape::new([CHANNELS])?)?;
    let mut input_grad = DeviceTensor::<f32>::zeros(&ctx, Shape::new([BATCH, 3, 224, 224])?)?;

    let mut watch = Stopwatch::start();
    for iteration in 1..=ITERATIONS {
        convolution::forward(&ctx, &conv_desc, &input, &conv_w, Some(&conv_b), &mut conv_out)?;
        pooling::forward(&ctx, &pool_desc, &conv_out, &mut pool_outs[0])?;
        for i in 1..pool_outs.len() {
            let (upstream, rest) = pool_outs.split_at_mut(i);
            pooling::forward(&ctx, &pool_desc, &upstream[i - 1], &mut rest[0])?;
        }
        fully_connected::forward(&ctx, &pool_outs[4], &fc_w, Some(&fc_b), &mut output)?;

        fully_connected::backward_data(&ctx, &output_grad, &fc_w, &mut pool_grads[4])?;
        fully_connected::backward_weights(
            &ctx,
            &output_grad,
            &pool_outs[4],
            &mut fc_w_grad,
            Some(&mut fc_b_grad),
        )?;
        for i in (1..pool_outs.len()).rev() {
            let (upstream, rest) = pool_grads.split_at_mut(i);
            pooling::backward(
                &ctx,
                &pool_desc,
                &pool_outs[i],
                &rest[0],
                &pool_outs[i - 1],
                &mut upstream[i - 1],
            )?;
        }
        pooling::backward(
            &ctx,
            &pool_desc,
            &pool_outs[0],
            &pool_grads[0],
            &conv_out,
            &mut conv_out_grad,
        )?;
        convolution::backward_weights(
            &ctx,
            &conv_desc,
            &conv_out_grad,
            &input,
            &mut conv_w_grad,
            Some(&mut conv_b_grad),
        )?;
        convolution::backward_data(&ctx, &conv_desc, &conv_out_grad, &conv_w, &mut input_grad)?;

        eprintln!(
            "rank {rank}: iteration {iteration}/{ITERATIONS} ({} us)",
            watch.lap_micros()
        );
    }

    // With dy all ones the bias gradient is the batch count and, with unit
    // weights, each collapsed input feature's gradient is the output width.
    check(
        &format!("model-step-fc-bias-grad-rank-{rank}"),
        &fc_b_grad,
        &vec![BATCH as f32; FC_OUT],
    )?;
    check(
        &format!("model-step-fc-data-grad-rank-{rank}"),
        &pool_grads[4],
        &vec![FC_OUT as f32; BATCH * FC_IN],
    )?;

    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}
