// SPDX-License-Identifier: MIT

//! Integration tests for gpu-array-bridge.
//!
//! These exercise the public API as a cohesive system: array construction
//! and arithmetic, the strided tensor bridge in both directions, gradient
//! tracking, and staging-buffer lifetime.

use gpu_array_bridge::{
    backward, contiguous_strides, export_array, gather_array, scatter_array, BridgeArray,
    BridgeError, DeviceConfig, DiffVector, ElemType, ExternalDescriptor, LogConfig,
    ManagedBuffer, MappedSlice, VecN, Vector, Vector3f,
};
use std::sync::Arc;

fn force_cpu() {
    std::env::set_var("GPU_ARRAY_FORCE_CPU", "1");
}

// ============================================================================
// Device / configuration
// ============================================================================

#[test]
fn test_device_config_from_env_respects_force_cpu() {
    std::env::set_var("GPU_ARRAY_FORCE_CPU", "1");
    let config = DeviceConfig::from_env();
    assert!(config.force_cpu);
}

#[test]
fn test_logging_init_is_idempotent() {
    let config = LogConfig::testing();
    gpu_array_bridge::init_logging(&config);
    gpu_array_bridge::init_logging(&config);
}

// ============================================================================
// Round-trip laws (depth 1-4, several element types)
// ============================================================================

fn round_trip<A: BridgeArray + Clone>(array: &A) -> A {
    let host = export_array(array).unwrap();
    // SAFETY: the descriptor points into `host`'s buffer, which stays
    // alive for the whole call.
    unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap()
}

#[test]
fn test_round_trip_depth1_f32() {
    force_cpu();
    let v = Vector::<f32>::linspace(-4.0, 4.0, 33).unwrap();
    assert_eq!(round_trip(&v).to_vec().unwrap(), v.to_vec().unwrap());
}

#[test]
fn test_round_trip_depth1_preserves_bits() {
    force_cpu();
    // verbatim memory moves: exact values survive, including extremes
    let v = Vector::<f64>::from_slice(&[f64::MIN, -0.0, f64::EPSILON, f64::MAX]).unwrap();
    let back = round_trip(&v);
    let (a, b) = (v.to_vec().unwrap(), back.to_vec().unwrap());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.to_bits(), y.to_bits());
    }
}

#[test]
fn test_round_trip_depth1_integers() {
    force_cpu();
    let v = Vector::<u32>::from_slice(&[0, 1, u32::MAX, 42]).unwrap();
    assert_eq!(round_trip(&v).to_vec().unwrap(), v.to_vec().unwrap());

    let v = Vector::<i64>::from_slice(&[i64::MIN, 0, i64::MAX]).unwrap();
    assert_eq!(round_trip(&v).to_vec().unwrap(), v.to_vec().unwrap());

    let v = Vector::<u8>::from_slice(&[0, 1, 255]).unwrap();
    assert_eq!(round_trip(&v).to_vec().unwrap(), v.to_vec().unwrap());
}

#[test]
fn test_round_trip_depth2() {
    force_cpu();
    let v = VecN::<Vector<f32>, 2>::from_components(vec![
        Vector::from_slice(&[1.0, 2.0, 3.0]).unwrap(),
        Vector::from_slice(&[4.0, 5.0, 6.0]).unwrap(),
    ])
    .unwrap();
    let back = round_trip(&v);
    for (a, b) in v.components().iter().zip(back.components()) {
        assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
    }
}

#[test]
fn test_round_trip_depth4() {
    force_cpu();
    type A4 = VecN<VecN<VecN<Vector<f32>, 3>, 2>, 4>;

    let mut counter = 0.0f32;
    let mut outer = Vec::new();
    for _ in 0..4 {
        let mut mid = Vec::new();
        for _ in 0..2 {
            let mut inner = Vec::new();
            for _ in 0..3 {
                let data: Vec<f32> = (0..7)
                    .map(|_| {
                        counter += 0.5;
                        counter
                    })
                    .collect();
                inner.push(Vector::from_slice(&data).unwrap());
            }
            mid.push(VecN::from_components(inner).unwrap());
        }
        outer.push(VecN::from_components(mid).unwrap());
    }
    let v: A4 = VecN::from_components(outer).unwrap();

    let host = export_array(&v).unwrap();
    assert_eq!(host.shape(), &[7, 3, 2, 4]);

    let back: A4 = unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();
    for (a, b) in v.components().iter().zip(back.components()) {
        for (c, d) in a.components().iter().zip(b.components()) {
            for (x, y) in c.components().iter().zip(d.components()) {
                assert_eq!(x.to_vec().unwrap(), y.to_vec().unwrap());
            }
        }
    }
}

// ============================================================================
// Dimension-order convention
// ============================================================================

#[test]
fn test_non_square_transposition_mapping() {
    force_cpu();
    // logical shape (2, 3)
    let v = VecN::<Vector<f32>, 2>::from_components(vec![
        Vector::from_slice(&[1.0, 2.0, 3.0]).unwrap(),
        Vector::from_slice(&[4.0, 5.0, 6.0]).unwrap(),
    ])
    .unwrap();

    let host = export_array(&v).unwrap();
    // external convention lists the fastest-varying dimension last
    assert_eq!(host.shape(), &[3, 2]);
    assert_eq!(host.strides(), &[2, 1]);

    // logical (row, col) maps to flat row + 2 * col; a double or missing
    // reversal would yield [1, 2, 3, 4, 5, 6] instead
    assert_eq!(
        host.to_vec::<f32>().unwrap(),
        vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
    );
}

#[test]
fn test_adopt_external_buffer_with_reversed_order() {
    force_cpu();
    // a dense external buffer of shape [3, 2]: rows are the external
    // fastest-varying pairs
    let backing: Vec<f32> = vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
    let desc = ExternalDescriptor::contiguous(
        vec![3, 2],
        ElemType::F32,
        backing.as_ptr() as usize,
    )
    .unwrap();

    let v: VecN<Vector<f32>, 2> = unsafe { gather_array(&desc) }.unwrap();
    assert_eq!(v.components()[0].to_vec().unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(v.components()[1].to_vec().unwrap(), vec![4.0, 5.0, 6.0]);
}

#[test]
fn test_scatter_into_strided_external_buffer() {
    force_cpu();
    // write a length-3 vector into every second slot of a 6-element buffer
    let mut backing = vec![0.0f32; 6];
    let v = Vector::<f32>::from_slice(&[7.0, 8.0, 9.0]).unwrap();
    let desc = ExternalDescriptor::new(
        vec![3],
        vec![2],
        ElemType::F32,
        backing.as_mut_ptr() as usize,
    )
    .unwrap();

    unsafe { scatter_array(&v, &desc) }.unwrap();
    assert_eq!(backing, vec![7.0, 0.0, 8.0, 0.0, 9.0, 0.0]);
}

// ============================================================================
// Rejection before any memory is read
// ============================================================================

#[test]
fn test_dtype_mismatch_rejected_before_copy() {
    force_cpu();
    let backing = vec![0.0f64; 4];
    let desc = ExternalDescriptor::contiguous(
        vec![4],
        ElemType::F64,
        backing.as_ptr() as usize,
    )
    .unwrap();

    let err = unsafe { gather_array::<Vector<f32>>(&desc) }.unwrap_err();
    assert!(matches!(err, BridgeError::DTypeMismatch { .. }));
}

#[test]
fn test_rank_mismatch_rejected_before_copy() {
    force_cpu();
    let backing = vec![0.0f32; 6];
    let desc = ExternalDescriptor::contiguous(
        vec![3, 2],
        ElemType::F32,
        backing.as_ptr() as usize,
    )
    .unwrap();

    let err = unsafe { gather_array::<Vector<f32>>(&desc) }.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::RankMismatch {
            expected: 1,
            actual: 2
        }
    ));

    let err = unsafe { gather_array::<VecN<VecN<Vector<f32>, 2>, 3>>(&desc) }.unwrap_err();
    assert!(matches!(err, BridgeError::RankMismatch { .. }));
}

#[test]
fn test_scatter_shape_mismatch_rejected() {
    force_cpu();
    let mut backing = vec![0.0f32; 4];
    let v = Vector::<f32>::from_slice(&[1.0, 2.0, 3.0]).unwrap();
    let desc = ExternalDescriptor::contiguous(
        vec![4],
        ElemType::F32,
        backing.as_mut_ptr() as usize,
    )
    .unwrap();

    let err = unsafe { scatter_array(&v, &desc) }.unwrap_err();
    assert!(matches!(err, BridgeError::ShapeMismatch { .. }));
    // nothing was written
    assert_eq!(backing, vec![0.0; 4]);
}

#[test]
fn test_element_access_bounds_checked() {
    force_cpu();
    let v = Vector::<u32>::arange(4).unwrap();
    assert_eq!(v.get(3).unwrap(), 3);
    assert!(matches!(
        v.get(4).unwrap_err(),
        BridgeError::IndexOutOfRange { index: 4, len: 4 }
    ));
}

// ============================================================================
// Buffer lifetime
// ============================================================================

#[test]
fn test_staging_buffer_released_exactly_once_under_repeated_conversion() {
    force_cpu();
    let v = Vector::<f32>::linspace(0.0, 1.0, 4096).unwrap();
    for _ in 0..100 {
        let host = export_array(&v).unwrap();
        let wrapper = Arc::clone(host.buffer());
        let witness = Arc::downgrade(host.buffer());

        drop(host);
        assert!(witness.upgrade().is_some());
        // the data stays readable through the surviving wrapper
        assert_eq!(wrapper.numel(), 4096);

        drop(wrapper);
        assert!(witness.upgrade().is_none());
    }
}

#[test]
fn test_managed_buffer_rejects_wrong_element_view() {
    let buf = ManagedBuffer::allocate(8, ElemType::F32).unwrap();
    assert!(buf.mapped::<f32>().is_ok());
    assert!(matches!(
        buf.mapped::<u32>().unwrap_err(),
        BridgeError::DTypeMismatch { .. }
    ));
}

// ============================================================================
// End to end: adopt, compute, export
// ============================================================================

#[test]
fn test_adopt_compute_export_pipeline() {
    force_cpu();
    let backing: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let desc = ExternalDescriptor::contiguous(
        vec![16],
        ElemType::F32,
        backing.as_ptr() as usize,
    )
    .unwrap();

    let v: Vector<f32> = unsafe { gather_array(&desc) }.unwrap();
    let doubled = v.add(&v).unwrap();
    doubled.eval().unwrap();

    let host = export_array(&doubled).unwrap();
    let out = host.to_vec::<f32>().unwrap();
    for (i, value) in out.iter().enumerate() {
        assert_eq!(*value, 2.0 * i as f32);
    }
}

#[test]
fn test_gradients_flow_through_bridge_exported_values() {
    force_cpu();
    let mut x = DiffVector::<f32>::from_slice(&[1.0, 2.0, 3.0]).unwrap();
    x.set_requires_grad(true).unwrap();

    // loss = sum(x^2), dloss/dx = 2x
    let loss = x.mul(&x).unwrap().hsum().unwrap();
    backward(&loss).unwrap();

    let grad = x.grad().unwrap().unwrap();
    let host = export_array(&grad).unwrap();
    assert_eq!(host.to_vec::<f32>().unwrap(), vec![2.0, 4.0, 6.0]);
}

#[test]
fn test_vector_bundle_geometry() {
    force_cpu();
    let a = Vector3f::from_components(vec![
        Vector::from_slice(&[1.0, 0.0]).unwrap(),
        Vector::from_slice(&[0.0, 1.0]).unwrap(),
        Vector::from_slice(&[0.0, 0.0]).unwrap(),
    ])
    .unwrap();
    let b = Vector3f::from_components(vec![
        Vector::from_slice(&[0.0, 0.0]).unwrap(),
        Vector::from_slice(&[1.0, 0.0]).unwrap(),
        Vector::from_slice(&[0.0, 1.0]).unwrap(),
    ])
    .unwrap();

    let d = Vector3f::dot(&a, &b).unwrap();
    assert_eq!(d.to_vec().unwrap(), vec![0.0, 0.0]);

    let c = Vector3f::cross(&a, &b).unwrap();
    // x cross y = z in slot 0; y cross z = x in slot 1
    assert_eq!(c.z().to_vec().unwrap(), vec![1.0, 0.0]);
    assert_eq!(c.x().to_vec().unwrap(), vec![0.0, 1.0]);
}

// ============================================================================
// Descriptor plumbing
// ============================================================================

#[test]
fn test_contiguous_strides_match_manual_layout() {
    assert_eq!(contiguous_strides(&[4, 3, 2]), vec![6, 2, 1]);

    let desc = ExternalDescriptor::contiguous(vec![4, 3, 2], ElemType::F32, 0).unwrap();
    assert_eq!(desc.numel(), 24);
    let (shape, strides) = desc.library_order();
    assert_eq!(shape, vec![2, 3, 4]);
    assert_eq!(strides, vec![1, 2, 6]);
}

#[test]
fn test_mapped_slice_gather_with_offset() {
    force_cpu();
    let backing: Vec<u32> = (0..12).collect();
    let view = MappedSlice::from_slice(&backing);
    let v = Vector::<u32>::gather_from(&view, &[4], &[3], 2).unwrap();
    assert_eq!(v.to_vec().unwrap(), vec![2, 5, 8, 11]);
}
