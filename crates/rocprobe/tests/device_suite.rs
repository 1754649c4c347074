//! End-to-end scenarios against a real device.
//!
//! Every test bails out cleanly when no HIP runtime is installed, so the
//! suite is safe to run on CPU-only machines.

use anyhow::Result;
use rocprobe::ffi::hip;
use rocprobe::ops::{blas, convolution, fully_connected, pooling};
use rocprobe::{ConvDescriptor, DeviceContext, DeviceTensor, Error, PoolingDescriptor, Shape};

fn context() -> Option<DeviceContext> {
    if !hip::is_available() {
        return None;
    }
    DeviceContext::new(0).ok()
}

#[test]
fn zero_count_shapes_hold_no_buffer() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let tensor = DeviceTensor::<f32>::zeros(&ctx, Shape::new([4, 0, 2])?)?;
    assert_eq!(tensor.size(), 0);
    assert!(!tensor.is_allocated());
    assert!(tensor.to_vec()?.is_empty());
    Ok(())
}

#[test]
fn broadcast_fill_reads_back() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let tensor = DeviceTensor::filled(&ctx, 3.5f32, Shape::new([2, 3])?)?;
    assert_eq!(tensor.to_vec()?, vec![3.5f32; 6]);
    Ok(())
}

#[test]
fn fill_overwrites_without_changing_shape() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let mut tensor = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([3, 4])?)?;
    tensor.fill(7.0)?;
    assert_eq!(tensor.shape().dims(), &[3, 4]);
    assert_eq!(tensor.to_vec()?, vec![7.0f32; 12]);
    Ok(())
}

#[test]
fn reshape_reallocates_zero_filled() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let mut tensor = DeviceTensor::filled(&ctx, 5.0f32, Shape::new([4])?)?;
    tensor.reshape(Shape::new([2, 3])?)?;
    assert_eq!(tensor.size(), 6);
    assert_eq!(tensor.to_vec()?, vec![0.0f32; 6]);
    Ok(())
}

#[test]
fn scalar_ops_apply_elementwise() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let mut tensor = DeviceTensor::filled(&ctx, 2.0f32, Shape::new([8])?)?;
    tensor.scalar_add(&ctx, 3.0)?;
    assert_eq!(tensor.to_vec()?, vec![5.0f32; 8]);
    tensor.scalar_mul(&ctx, 2.0)?;
    assert_eq!(tensor.to_vec()?, vec![10.0f32; 8]);
    tensor.scalar_sub(&ctx, 4.0)?;
    assert_eq!(tensor.to_vec()?, vec![6.0f32; 8]);
    tensor.scalar_div(&ctx, 3.0)?;
    assert_eq!(tensor.to_vec()?, vec![2.0f32; 8]);
    Ok(())
}

#[test]
fn scalar_ops_cover_integer_elements() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let mut tensor = DeviceTensor::filled(&ctx, 1i32, Shape::new([8192])?)?;
    tensor.scalar_add(&ctx, 80)?;
    tensor.scalar_mul(&ctx, 32)?;
    assert_eq!(tensor.to_vec()?, vec![(1 + 80) * 32; 8192]);
    Ok(())
}

#[test]
fn unallocated_tensors_reject_scalar_ops() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let mut tensor = DeviceTensor::<f32>::unallocated(&ctx);
    assert!(matches!(
        tensor.scalar_add(&ctx, 1.0),
        Err(Error::Argument(_))
    ));
    Ok(())
}

#[test]
fn clones_are_independent() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let mut original = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([16])?)?;
    let copy = original.try_clone()?;
    original.fill(9.0)?;
    assert_eq!(copy.to_vec()?, vec![1.0f32; 16]);
    assert_eq!(original.to_vec()?, vec![9.0f32; 16]);
    Ok(())
}

#[test]
fn comparison_checks_types_buffers_and_shapes_first() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let floats = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([4])?)?;
    let ints = DeviceTensor::filled(&ctx, 1i32, Shape::new([4])?)?;
    assert!(!floats.approx_eq(&ints)?);

    let empty = DeviceTensor::<f32>::zeros(&ctx, Shape::new([0])?)?;
    assert!(!floats.approx_eq(&empty)?);

    let wider = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([2, 2])?)?;
    assert!(!floats.approx_eq(&wider)?);

    let same = DeviceTensor::filled(&ctx, 1.004f32, Shape::new([4])?)?;
    assert!(floats.approx_eq(&same)?);
    Ok(())
}

#[test]
fn host_comparison_checks_counts() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let tensor = DeviceTensor::filled(&ctx, 2.0f32, Shape::new([3])?)?;
    assert!(tensor.approx_eq_host(&[2.0f32, 2.0, 2.0])?);
    assert!(!tensor.approx_eq_host(&[2.0f32, 2.0])?);
    assert!(!tensor.approx_eq_host(&[2.0f32, 2.0, 2.5])?);
    Ok(())
}

/// 4x4 frame of 2s around a 2x2 block of 1s.
const POOL_INPUT: [f32; 16] = [
    2.0, 2.0, 2.0, 2.0, //
    2.0, 1.0, 1.0, 2.0, //
    2.0, 1.0, 1.0, 2.0, //
    2.0, 2.0, 2.0, 2.0,
];

fn run_pooling(
    ctx: &DeviceContext,
    desc: &PoolingDescriptor,
    out_dims: [usize; 4],
) -> Result<Vec<f32>> {
    let x = DeviceTensor::from_slice(ctx, &POOL_INPUT, Shape::new([1, 1, 4, 4])?)?;
    let mut y = DeviceTensor::zeros(ctx, Shape::new(out_dims.to_vec())?)?;
    pooling::forward(ctx, desc, &x, &mut y)?;
    Ok(y.to_vec()?)
}

#[test]
fn padded_average_pooling_excludes_padding() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let desc = PoolingDescriptor::new("avg", [2, 2], [1, 1], [2, 2]);
    let y = run_pooling(&ctx, &desc, [1, 1, 3, 3])?;
    let expected = [2.0f32, 2.0, 2.0, 2.0, 1.0, 2.0, 2.0, 2.0, 2.0];
    assert_eq!(y.len(), expected.len());
    for (a, b) in y.iter().zip(expected.iter()) {
        assert!((a - b).abs() <= 1e-2, "{y:?}");
    }
    Ok(())
}

#[test]
fn padded_average_pooling_can_include_padding() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let desc = PoolingDescriptor::new("avg_include_pad", [2, 2], [1, 1], [2, 2]);
    let y = run_pooling(&ctx, &desc, [1, 1, 3, 3])?;
    let expected = [0.5f32, 1.0, 0.5, 1.0, 1.0, 1.0, 0.5, 1.0, 0.5];
    for (a, b) in y.iter().zip(expected.iter()) {
        assert!((a - b).abs() <= 1e-2, "{y:?}");
    }
    Ok(())
}

#[test]
fn unpadded_average_pooling_averages_full_windows() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let desc = PoolingDescriptor::new("avg", [2, 2], [0, 0], [2, 2]);
    let y = run_pooling(&ctx, &desc, [1, 1, 2, 2])?;
    for value in &y {
        assert!((value - 1.75).abs() <= 1e-2, "{y:?}");
    }
    Ok(())
}

#[test]
fn average_pooling_backward_spreads_gradients_evenly() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let desc = PoolingDescriptor::new("avg", [2, 2], [0, 0], [2, 2]);
    let x = DeviceTensor::from_slice(&ctx, &[1.0f32, 2.0, 3.0, 4.0], Shape::new([1, 1, 2, 2])?)?;
    let mut y = DeviceTensor::zeros(&ctx, Shape::new([1, 1, 1, 1])?)?;
    pooling::forward(&ctx, &desc, &x, &mut y)?;
    assert!(y.approx_eq_host(&[2.5f32])?);

    // One window of four, so dy = 4 hands each input element exactly 1.
    let dy = DeviceTensor::from_slice(&ctx, &[4.0f32], Shape::new([1, 1, 1, 1])?)?;
    let mut dx = DeviceTensor::zeros(&ctx, Shape::new([1, 1, 2, 2])?)?;
    pooling::backward(&ctx, &desc, &y, &dy, &x, &mut dx)?;
    assert!(dx.approx_eq_host(&[1.0f32; 4])?);
    Ok(())
}

/// Two batches of three features against a 2x3 weight.
const FC_X: [f32; 6] = [1.0, 1.0, 1.0, 2.0, 2.0, 2.0];
const FC_W: [f32; 6] = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

#[test]
fn fully_connected_forward_applies_weights_and_bias() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let x = DeviceTensor::from_slice(&ctx, &FC_X, Shape::new([2, 3])?)?;
    let w = DeviceTensor::from_slice(&ctx, &FC_W, Shape::new([2, 3])?)?;
    let bias = DeviceTensor::from_slice(&ctx, &[10.0f32, 20.0], Shape::new([2])?)?;
    let mut y = DeviceTensor::zeros(&ctx, Shape::new([2, 2])?)?;
    fully_connected::forward(&ctx, &x, &w, Some(&bias), &mut y)?;
    assert!(y.approx_eq_host(&[16.0f32, 35.0, 22.0, 50.0])?);
    Ok(())
}

#[test]
fn fully_connected_backward_produces_both_gradients() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let x = DeviceTensor::from_slice(&ctx, &FC_X, Shape::new([2, 3])?)?;
    let w = DeviceTensor::from_slice(&ctx, &FC_W, Shape::new([2, 3])?)?;
    let dy = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([2, 2])?)?;

    // dx sums each weight column over the output features.
    let mut dx = DeviceTensor::zeros(&ctx, Shape::new([2, 3])?)?;
    fully_connected::backward_data(&ctx, &dy, &w, &mut dx)?;
    assert!(dx.approx_eq_host(&[5.0f32, 7.0, 9.0, 5.0, 7.0, 9.0])?);

    // dw sums the activations over the batch, db the gradient rows.
    let mut dw = DeviceTensor::zeros(&ctx, Shape::new([2, 3])?)?;
    let mut db = DeviceTensor::zeros(&ctx, Shape::new([2])?)?;
    fully_connected::backward_weights(&ctx, &dy, &x, &mut dw, Some(&mut db))?;
    assert!(dw.approx_eq_host(&[3.0f32; 6])?);
    assert!(db.approx_eq_host(&[2.0f32, 2.0])?);
    Ok(())
}

#[test]
fn dot_restricted_to_the_first_element() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let x = DeviceTensor::filled(&ctx, 1.0f32, Shape::new([4])?)?;
    let y = DeviceTensor::filled(&ctx, 2.0f32, Shape::new([4])?)?;
    let mut result = DeviceTensor::zeros(&ctx, Shape::new([1])?)?;
    blas::dot(&ctx, 1, &x, &y, &mut result)?;
    assert!(result.approx_eq_host(&[2.0f32])?);
    Ok(())
}

#[test]
fn plain_convolution_rejects_non_unit_dilation() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let desc = ConvDescriptor::with_dilation("conv", [0, 0], [1, 1], [2, 2]);
    let x = DeviceTensor::<f32>::zeros(&ctx, Shape::new([1, 1, 4, 4])?)?;
    let w = DeviceTensor::<f32>::zeros(&ctx, Shape::new([1, 1, 3, 3])?)?;
    let mut y = DeviceTensor::<f32>::zeros(&ctx, Shape::new([1, 1, 2, 2])?)?;
    let err = convolution::forward(&ctx, &desc, &x, &w, None, &mut y).unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    Ok(())
}

#[test]
fn non_f32_operators_fail_fast() -> Result<()> {
    let Some(ctx) = context() else { return Ok(()) };
    let desc = PoolingDescriptor::new("max", [2, 2], [0, 0], [2, 2]);
    let x = DeviceTensor::<f64>::zeros(&ctx, Shape::new([1, 1, 4, 4])?)?;
    let mut y = DeviceTensor::<f64>::zeros(&ctx, Shape::new([1, 1, 2, 2])?)?;
    let err = pooling::forward(&ctx, &desc, &x, &mut y).unwrap_err();
    assert!(matches!(err, Error::Argument(_)));
    Ok(())
}
