// SPDX-License-Identifier: MIT

//! The strided tensor bridge.
//!
//! Converts between a [Logical Array](BridgeArray) (library-native nested
//! layout, dimension 0 outermost) and flat external memory described by an
//! [`ExternalDescriptor`] (foreign shape/stride/pointer metadata, dimension
//! order reversed relative to the Logical Array).
//!
//! Both directions walk the dimensions recursively. Outer dimensions only
//! accumulate a flat offset (`offset + i * stride[d]` per component); the
//! innermost dimension performs one bulk element transfer per run along the
//! affine index sequence `offset + arange(extent) * stride`. Copies are
//! verbatim memory moves: no numeric conversion, no partial results. A
//! gather builds the whole nested structure bottom-up before returning, and
//! a scatter mutates only the strided range the descriptor covers.
//!
//! The reversal between the two dimension conventions happens exactly once,
//! at the entry points, before recursion begins. Reversing twice (or not at
//! all) silently transposes the data with no error signal, which is why the
//! tests below use non-square shapes throughout.

use crate::array::{VecN, Vector};
use crate::dtype::{Element, ElemType};
use crate::error::{BridgeError, Result};
use crate::logging::log_bridge_copy;
use crate::memory::{ManagedBuffer, MappedSlice, MappedSliceMut};
use std::sync::Arc;

/// Foreign tensor metadata: shape, element strides, dtype and raw address.
///
/// Shape and strides are in the external library's own dimension order
/// (fastest-varying dimension listed last). Strides are in elements, not
/// bytes; use [`ExternalDescriptor::from_byte_strides`] for libraries that
/// report byte strides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDescriptor {
    shape: Vec<usize>,
    strides: Vec<usize>,
    elem: ElemType,
    ptr: usize,
}

impl ExternalDescriptor {
    /// Describe external memory at `ptr` with the given shape and element
    /// strides.
    ///
    /// # Errors
    ///
    /// Rejected when shape and stride lengths disagree; such a descriptor
    /// cannot describe any buffer.
    pub fn new(shape: Vec<usize>, strides: Vec<usize>, elem: ElemType, ptr: usize) -> Result<Self> {
        if shape.len() != strides.len() {
            return Err(BridgeError::rejected(format!(
                "descriptor has {} extents but {} strides",
                shape.len(),
                strides.len()
            )));
        }
        Ok(Self {
            shape,
            strides,
            elem,
            ptr,
        })
    }

    /// As [`ExternalDescriptor::new`], with strides in bytes.
    ///
    /// # Errors
    ///
    /// Rejected when a byte stride is not a multiple of the element size
    /// (the buffer would not be element-addressable).
    pub fn from_byte_strides(
        shape: Vec<usize>,
        byte_strides: Vec<usize>,
        elem: ElemType,
        ptr: usize,
    ) -> Result<Self> {
        let size = elem.size_bytes();
        let strides = byte_strides
            .iter()
            .map(|&b| {
                if b % size == 0 {
                    Ok(b / size)
                } else {
                    Err(BridgeError::rejected(format!(
                        "byte stride {b} is not a multiple of the {size}-byte element"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(shape, strides, elem, ptr)
    }

    /// A densely packed (C-contiguous) descriptor for the given shape.
    pub fn contiguous(shape: Vec<usize>, elem: ElemType, ptr: usize) -> Result<Self> {
        let strides = contiguous_strides(&shape);
        Self::new(shape, strides, elem, ptr)
    }

    /// Number of dimensions.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Extents in external dimension order.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element strides in external dimension order.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// External element type.
    #[must_use]
    pub fn elem(&self) -> ElemType {
        self.elem
    }

    /// Raw memory address of the buffer.
    #[must_use]
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    /// Total element count.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Rank and dtype validation against a target array type.
    ///
    /// Runs before any memory is read; a mismatched descriptor never causes
    /// a partial copy.
    pub fn validate_for<A: BridgeArray>(&self) -> Result<()> {
        if self.rank() != A::DEPTH {
            return Err(BridgeError::rank_mismatch(A::DEPTH, self.rank()));
        }
        if self.elem != A::Elem::ELEM {
            return Err(BridgeError::dtype_mismatch(
                A::Elem::ELEM.name(),
                self.elem.name(),
            ));
        }
        Ok(())
    }

    /// Shape and strides reversed into Logical Array dimension order.
    ///
    /// This is the single reversal of the bridge: index 0 of the returned
    /// vectors corresponds to the array's outermost dimension, and the last
    /// index to the external buffer's fastest-varying dimension.
    #[must_use]
    pub fn library_order(&self) -> (Vec<usize>, Vec<usize>) {
        let shape: Vec<usize> = self.shape.iter().rev().copied().collect();
        let strides: Vec<usize> = self.strides.iter().rev().copied().collect();
        (shape, strides)
    }

    /// Number of elements between the base pointer and one past the furthest
    /// element the shape/strides can address.
    #[must_use]
    fn required_span(&self) -> usize {
        if self.shape.iter().any(|&extent| extent == 0) {
            return 0;
        }
        1 + self
            .shape
            .iter()
            .zip(&self.strides)
            .map(|(&extent, &stride)| (extent - 1) * stride)
            .sum::<usize>()
    }
}

/// C-contiguous element strides for a shape (fastest-varying dimension last).
#[must_use]
pub fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// A Logical Array the bridge can copy in and out of.
///
/// Implemented by [`Vector`] (depth 1) and [`VecN`] nestings of it. The
/// shape/stride slices passed to the recursive methods are already in
/// library dimension order and cover exactly the remaining dimensions.
pub trait BridgeArray: Sized {
    /// Scalar element type; fixed per instantiation.
    type Elem: Element;

    /// Number of nested dimension levels.
    const DEPTH: usize;

    /// Extents, outermost dimension first.
    fn shape(&self) -> Vec<usize>;

    /// Recursively build this level from strided external memory.
    fn gather_from(
        view: &MappedSlice<'_, Self::Elem>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<Self>;

    /// Recursively write this level into strided external memory.
    fn scatter_into(
        &self,
        view: &mut MappedSliceMut<'_, Self::Elem>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<()>;
}

impl<T: Element> BridgeArray for Vector<T> {
    type Elem = T;
    const DEPTH: usize = 1;

    fn shape(&self) -> Vec<usize> {
        vec![self.len()]
    }

    fn gather_from(
        view: &MappedSlice<'_, T>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<Self> {
        let (extent, stride) = (shape[0], strides[0]);
        let src = view.as_slice();

        // affine index run: offset + i * stride, one host pass then a
        // single bulk upload
        let mut staged = Vec::with_capacity(extent);
        for i in 0..extent {
            let index = offset + i * stride;
            let value = src
                .get(index)
                .copied()
                .ok_or_else(|| BridgeError::index_out_of_range(index, src.len()))?;
            staged.push(value);
        }
        Vector::from_slice(&staged)
    }

    fn scatter_into(
        &self,
        view: &mut MappedSliceMut<'_, T>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<()> {
        let (extent, stride) = (shape[0], strides[0]);
        if extent != self.len() {
            return Err(BridgeError::shape_mismatch(vec![self.len()], vec![extent]));
        }

        // one bulk download, then the strided write
        let staged = self.to_vec()?;
        let dst = view.as_mut_slice();
        let len = dst.len();
        for (i, value) in staged.into_iter().enumerate() {
            let index = offset + i * stride;
            *dst.get_mut(index)
                .ok_or_else(|| BridgeError::index_out_of_range(index, len))? = value;
        }
        Ok(())
    }
}

impl<A: BridgeArray, const N: usize> BridgeArray for VecN<A, N> {
    type Elem = A::Elem;
    const DEPTH: usize = A::DEPTH + 1;

    fn shape(&self) -> Vec<usize> {
        let mut shape = vec![N];
        shape.extend(self.components()[0].shape());
        shape
    }

    fn gather_from(
        view: &MappedSlice<'_, Self::Elem>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<Self> {
        if shape[0] != N {
            return Err(BridgeError::shape_mismatch(vec![N], vec![shape[0]]));
        }
        let mut components = Vec::with_capacity(N);
        for i in 0..N {
            components.push(A::gather_from(
                view,
                &shape[1..],
                &strides[1..],
                offset + i * strides[0],
            )?);
        }
        VecN::from_components(components)
    }

    fn scatter_into(
        &self,
        view: &mut MappedSliceMut<'_, Self::Elem>,
        shape: &[usize],
        strides: &[usize],
        offset: usize,
    ) -> Result<()> {
        if shape[0] != N {
            return Err(BridgeError::shape_mismatch(vec![N], vec![shape[0]]));
        }
        for (i, component) in self.components().iter().enumerate() {
            component.scatter_into(view, &shape[1..], &strides[1..], offset + i * strides[0])?;
        }
        Ok(())
    }
}

/// Adopt external memory: build a new Logical Array from the descriptor.
///
/// Rank and dtype are validated before the pointer is touched. The
/// descriptor's shape and strides are reversed once into library order, and
/// the recursion fills the array bottom-up.
///
/// # Safety
///
/// `desc.ptr()` must point to readable, element-aligned, host-visible
/// memory that stays live and unwritten for the duration of the call, and
/// the shape/stride combination must stay within the foreign allocation.
pub unsafe fn gather_array<A: BridgeArray>(desc: &ExternalDescriptor) -> Result<A> {
    desc.validate_for::<A>()?;
    let (shape, strides) = desc.library_order();
    let view = MappedSlice::from_raw(desc.ptr(), desc.required_span());
    log_bridge_copy("gather", A::Elem::ELEM.name(), desc.numel(), A::DEPTH);
    A::gather_from(&view, &shape, &strides, 0)
}

/// Write a Logical Array into externally owned memory.
///
/// Mutates only the strided range the descriptor covers; never resizes or
/// reallocates the foreign buffer.
///
/// # Safety
///
/// As [`gather_array`], plus exclusive write access to the covered range
/// for the duration of the call.
pub unsafe fn scatter_array<A: BridgeArray>(array: &A, desc: &ExternalDescriptor) -> Result<()> {
    desc.validate_for::<A>()?;
    let (shape, strides) = desc.library_order();
    if array.shape() != shape {
        return Err(BridgeError::shape_mismatch(array.shape(), shape));
    }
    let mut view = MappedSliceMut::from_raw(desc.ptr(), desc.required_span());
    log_bridge_copy("scatter", A::Elem::ELEM.name(), desc.numel(), A::DEPTH);
    array.scatter_into(&mut view, &shape, &strides, 0)
}

/// A freshly populated host-visible copy of a Logical Array, laid out
/// densely in external (reversed) dimension order.
///
/// The backing [`ManagedBuffer`] is shared by `Arc`: external wrappers hold
/// clones, and the block is released exactly once when the last clone drops.
#[derive(Debug, Clone)]
pub struct HostTensor {
    buffer: Arc<ManagedBuffer>,
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl HostTensor {
    /// Extents in external dimension order.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element strides in external dimension order.
    #[must_use]
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Strides in bytes, for libraries that expect them.
    #[must_use]
    pub fn byte_strides(&self) -> Vec<usize> {
        let size = self.buffer.elem().size_bytes();
        self.strides.iter().map(|&s| s * size).collect()
    }

    /// Element type of the backing buffer.
    #[must_use]
    pub fn elem(&self) -> ElemType {
        self.buffer.elem()
    }

    /// The shared backing buffer.
    #[must_use]
    pub fn buffer(&self) -> &Arc<ManagedBuffer> {
        &self.buffer
    }

    /// Raw address of the backing buffer.
    #[must_use]
    pub fn data_ptr(&self) -> usize {
        self.buffer.as_ptr() as usize
    }

    /// Descriptor for the buffer, e.g. to gather it back.
    pub fn descriptor(&self) -> Result<ExternalDescriptor> {
        ExternalDescriptor::new(
            self.shape.clone(),
            self.strides.clone(),
            self.elem(),
            self.data_ptr(),
        )
    }

    /// The buffer contents in layout order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        Ok(self.buffer.mapped::<T>()?.as_slice().to_vec())
    }
}

/// Copy a Logical Array into a new dense host-visible buffer.
///
/// The result's shape is the array's shape reversed into external
/// convention, with C-contiguous strides. The buffer is populated while
/// still exclusively owned, then shared; the caller-visible wrapper keeps
/// it alive from there.
pub fn export_array<A: BridgeArray>(array: &A) -> Result<HostTensor> {
    let logical = array.shape();
    let shape: Vec<usize> = logical.iter().rev().copied().collect();
    let strides = contiguous_strides(&shape);

    let mut buffer = ManagedBuffer::allocate(shape.iter().product(), A::Elem::ELEM)?;
    log_bridge_copy("export", A::Elem::ELEM.name(), buffer.numel(), A::DEPTH);
    {
        let mut view = buffer.mapped_mut::<A::Elem>()?;
        // the same single reversal as the adopt path, seen from the other
        // side: recursion runs in library order
        let lib_shape: Vec<usize> = shape.iter().rev().copied().collect();
        let lib_strides: Vec<usize> = strides.iter().rev().copied().collect();
        array.scatter_into(&mut view, &lib_shape, &lib_strides, 0)?;
    }

    Ok(HostTensor {
        buffer: Arc::new(buffer),
        shape,
        strides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn force_cpu() {
        std::env::set_var("GPU_ARRAY_FORCE_CPU", "1");
    }

    fn vec2(rows: [&[f32]; 2]) -> VecN<Vector<f32>, 2> {
        VecN::new([
            Vector::from_slice(rows[0]).unwrap(),
            Vector::from_slice(rows[1]).unwrap(),
        ])
    }

    #[test]
    fn test_contiguous_strides() {
        assert_eq!(contiguous_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides(&[5]), vec![1]);
        assert_eq!(contiguous_strides(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_descriptor_validation() {
        let desc = ExternalDescriptor::contiguous(vec![4], ElemType::F64, 0).unwrap();
        assert!(matches!(
            desc.validate_for::<Vector<f32>>().unwrap_err(),
            BridgeError::DTypeMismatch { .. }
        ));

        let desc = ExternalDescriptor::contiguous(vec![2, 2], ElemType::F32, 0).unwrap();
        assert!(matches!(
            desc.validate_for::<Vector<f32>>().unwrap_err(),
            BridgeError::RankMismatch {
                expected: 1,
                actual: 2
            }
        ));

        assert!(ExternalDescriptor::new(vec![2, 3], vec![1], ElemType::F32, 0).is_err());
    }

    #[test]
    fn test_byte_stride_conversion() {
        let desc =
            ExternalDescriptor::from_byte_strides(vec![2, 3], vec![12, 4], ElemType::F32, 0)
                .unwrap();
        assert_eq!(desc.strides(), &[3, 1]);

        // 6 is not a multiple of 4
        assert!(
            ExternalDescriptor::from_byte_strides(vec![2], vec![6], ElemType::F32, 0).is_err()
        );
    }

    #[test]
    fn test_depth1_round_trip() {
        force_cpu();
        let v = Vector::<f32>::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let host = export_array(&v).unwrap();
        assert_eq!(host.shape(), &[5]);
        assert_eq!(host.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        let back: Vector<f32> =
            unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();
        assert_eq!(back.to_vec().unwrap(), v.to_vec().unwrap());
    }

    #[test]
    fn test_non_square_element_mapping() {
        force_cpu();
        // logical shape (2, 3): two components of three elements each
        let v = vec2([&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]]);
        let host = export_array(&v).unwrap();

        // external shape is reversed, densely packed
        assert_eq!(host.shape(), &[3, 2]);
        assert_eq!(host.strides(), &[2, 1]);

        // logical (r, c) lands at flat index r + 2 * c, not c + 3 * r: the
        // outermost logical dimension is the fastest-varying one externally
        assert_eq!(
            host.to_vec::<f32>().unwrap(),
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
    }

    #[test]
    fn test_depth2_round_trip() {
        force_cpu();
        let v = vec2([&[1.5, -2.0, 3.25], &[0.0, 7.0, -8.5]]);
        let host = export_array(&v).unwrap();
        let back: VecN<Vector<f32>, 2> =
            unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();

        for (a, b) in v.components().iter().zip(back.components()) {
            assert_eq!(a.to_vec().unwrap(), b.to_vec().unwrap());
        }
    }

    #[test]
    fn test_depth3_round_trip_non_square() {
        force_cpu();
        // logical shape (3, 2, 4)
        let mut outer = Vec::new();
        for block in 0..3 {
            let mut rows = Vec::new();
            for row in 0..2 {
                let base = (block * 100 + row * 10) as f32;
                rows.push(
                    Vector::from_slice(&[base, base + 1.0, base + 2.0, base + 3.0]).unwrap(),
                );
            }
            outer.push(VecN::<Vector<f32>, 2>::from_components(rows).unwrap());
        }
        let v = VecN::<VecN<Vector<f32>, 2>, 3>::from_components(outer).unwrap();

        let host = export_array(&v).unwrap();
        assert_eq!(host.shape(), &[4, 2, 3]);

        let back: VecN<VecN<Vector<f32>, 2>, 3> =
            unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();

        for (a, b) in v.components().iter().zip(back.components()) {
            for (x, y) in a.components().iter().zip(b.components()) {
                assert_eq!(x.to_vec().unwrap(), y.to_vec().unwrap());
            }
        }
    }

    #[test]
    fn test_depth4_round_trip() {
        force_cpu();
        type A4 = VecN<VecN<VecN<Vector<f32>, 2>, 3>, 2>;

        let mut value = 0.0f32;
        let mut l1 = Vec::new();
        for _ in 0..2 {
            let mut l2 = Vec::new();
            for _ in 0..3 {
                let mut l3 = Vec::new();
                for _ in 0..2 {
                    let data: Vec<f32> = (0..5)
                        .map(|_| {
                            value += 1.0;
                            value
                        })
                        .collect();
                    l3.push(Vector::from_slice(&data).unwrap());
                }
                l2.push(VecN::from_components(l3).unwrap());
            }
            l1.push(VecN::from_components(l2).unwrap());
        }
        let v: A4 = VecN::from_components(l1).unwrap();

        let host = export_array(&v).unwrap();
        assert_eq!(host.shape(), &[5, 2, 3, 2]);

        let back: A4 = unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();
        let a = v.components()[1].components()[2].components()[0].to_vec().unwrap();
        let b = back.components()[1].components()[2].components()[0]
            .to_vec()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_integer_round_trip() {
        force_cpu();
        let v = Vector::<i64>::from_slice(&[i64::MIN, -1, 0, 1, i64::MAX]).unwrap();
        let host = export_array(&v).unwrap();
        let back: Vector<i64> =
            unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();
        assert_eq!(back.to_vec().unwrap(), v.to_vec().unwrap());
    }

    #[test]
    fn test_gather_strided_view() {
        force_cpu();
        // every second element of a host buffer
        let backing: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let view = MappedSlice::from_slice(&backing);
        let v = Vector::<f32>::gather_from(&view, &[5], &[2], 0).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![0.0, 2.0, 4.0, 6.0, 8.0]);

        // offset start
        let v = Vector::<f32>::gather_from(&view, &[3], &[3], 1).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![1.0, 4.0, 7.0]);
    }

    #[test]
    fn test_scatter_shape_checked() {
        force_cpu();
        let v = Vector::<f32>::from_slice(&[1.0, 2.0, 3.0]).unwrap();
        let mut backing = vec![0.0f32; 2];
        let mut view = MappedSliceMut::from_slice(&mut backing);
        let err = v.scatter_into(&mut view, &[2], &[1], 0).unwrap_err();
        assert!(matches!(err, BridgeError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_empty_array_round_trip() {
        force_cpu();
        let v = Vector::<f32>::zeros(0).unwrap();
        let host = export_array(&v).unwrap();
        assert_eq!(host.shape(), &[0]);
        let back: Vector<f32> =
            unsafe { gather_array(&host.descriptor().unwrap()) }.unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_repeated_export_releases_buffers() {
        force_cpu();
        let v = Vector::<f32>::from_slice(&[1.0; 1024]).unwrap();
        for _ in 0..50 {
            let host = export_array(&v).unwrap();
            let wrapper = Arc::clone(host.buffer());
            let witness = Arc::downgrade(host.buffer());
            drop(host);
            // still alive through the wrapper
            assert!(witness.upgrade().is_some());
            drop(wrapper);
            assert!(witness.upgrade().is_none());
        }
    }
}
