// SPDX-License-Identifier: MIT

//! GPU-resident array values.
//!
//! [`Vector`] is the depth-1 building block: a flat, typed vector whose
//! storage and arithmetic live entirely in the array library (candle).
//! Nothing here computes on the host — every operation delegates to a
//! vectorized library call, so a `Vector` stays on-device between
//! operations and is only materialized on the host by an explicit transfer
//! ([`Vector::to_vec`]) or by the strided bridge.
//!
//! [`VecN`] nests a fixed number of component arrays to form depth-2..4
//! values (`Vector3f` is three `Vector<f32>` components of equal length,
//! matching the library's structure-of-arrays convention).

use crate::device::default_device;
use crate::dtype::{Element, ElemType};
use crate::error::{BridgeError, Result};
use candle_core::{Device, Tensor};
use std::marker::PhantomData;

/// Floating-point array elements; the only tags that admit transcendental
/// functions and gradient tracking.
pub trait FloatElement: Element {}
impl FloatElement for half::f16 {}
impl FloatElement for half::bf16 {}
impl FloatElement for f32 {}
impl FloatElement for f64 {}

/// A GPU-resident flat vector of scalars (depth-1 Logical Array).
#[derive(Debug, Clone)]
pub struct Vector<T: Element> {
    tensor: Tensor,
    _elem: PhantomData<T>,
}

impl<T: Element> Vector<T> {
    /// Wrap a 1-D library tensor of the matching dtype.
    ///
    /// # Errors
    ///
    /// Fails if the tensor is not 1-D or its dtype does not match `T`.
    pub fn from_tensor(tensor: Tensor) -> Result<Self> {
        if tensor.rank() != 1 {
            return Err(BridgeError::rank_mismatch(1, tensor.rank()));
        }
        if tensor.dtype() != T::DTYPE {
            return Err(BridgeError::dtype_mismatch(
                T::ELEM.name(),
                format!("{:?}", tensor.dtype()),
            ));
        }
        Ok(Self {
            tensor,
            _elem: PhantomData,
        })
    }

    fn wrap(tensor: Tensor) -> Self {
        Self {
            tensor,
            _elem: PhantomData,
        }
    }

    /// A zero-filled vector of length `size`.
    pub fn zeros(size: usize) -> Result<Self> {
        let tensor = Tensor::zeros(size, T::DTYPE, default_device())?;
        Ok(Self::wrap(tensor))
    }

    /// A vector of length `size` filled with `value`.
    pub fn full(value: T, size: usize) -> Result<Self> {
        Self::from_slice(&vec![value; size])
    }

    /// Upload host data as a new vector (one bulk transfer).
    pub fn from_slice(data: &[T]) -> Result<Self> {
        let tensor = Tensor::from_vec(data.to_vec(), data.len(), default_device())?;
        Ok(Self::wrap(tensor))
    }

    /// The sequence `0, 1, .., size-1`.
    pub fn arange(size: usize) -> Result<Self> {
        let data: Vec<T> = (0..size).map(|i| T::from_f64(i as f64)).collect();
        Self::from_slice(&data)
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tensor.dim(0).unwrap_or(0)
    }

    /// Whether the vector is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element-type tag of this vector.
    #[must_use]
    pub fn elem(&self) -> ElemType {
        T::ELEM
    }

    /// The device the vector lives on.
    #[must_use]
    pub fn device(&self) -> &Device {
        self.tensor.device()
    }

    /// The underlying library tensor.
    #[must_use]
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    /// Download to a host vector (one bulk transfer).
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.tensor.to_vec1()?)
    }

    /// Bounds-checked element read.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::IndexOutOfRange`] rather than reading
    /// adjacent memory.
    pub fn get(&self, index: usize) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(BridgeError::index_out_of_range(index, len));
        }
        Ok(self.tensor.get(index)?.to_scalar::<T>()?)
    }

    /// Resize to `size`, truncating or zero-extending.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        let len = self.len();
        if size < len {
            self.tensor = self.tensor.narrow(0, 0, size)?;
        } else if size > len {
            let pad = Tensor::zeros(size - len, T::DTYPE, self.tensor.device())?;
            self.tensor = Tensor::cat(&[&self.tensor, &pad], 0)?;
        }
        Ok(())
    }

    /// Force completion of all pending device work touching this vector.
    pub fn eval(&self) -> Result<()> {
        self.tensor.device().synchronize()?;
        Ok(())
    }

    // --- elementwise arithmetic -------------------------------------------

    /// Elementwise sum.
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor + &rhs.tensor)?))
    }

    /// Elementwise difference.
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor - &rhs.tensor)?))
    }

    /// Elementwise product.
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor * &rhs.tensor)?))
    }

    /// Elementwise quotient.
    pub fn div(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor / &rhs.tensor)?))
    }

    /// Elementwise negation.
    pub fn neg(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.neg()?))
    }

    /// Elementwise absolute value.
    pub fn abs(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.abs()?))
    }

    /// Elementwise maximum of two vectors.
    pub fn maximum(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.maximum(&rhs.tensor)?))
    }

    /// Elementwise minimum of two vectors.
    pub fn minimum(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.minimum(&rhs.tensor)?))
    }

    /// Fused multiply-add: `a * b + c`.
    pub fn fmadd(a: &Self, b: &Self, c: &Self) -> Result<Self> {
        Ok(Self::wrap(((&a.tensor * &b.tensor)? + &c.tensor)?))
    }

    /// Fused multiply-subtract: `a * b - c`.
    pub fn fmsub(a: &Self, b: &Self, c: &Self) -> Result<Self> {
        Ok(Self::wrap(((&a.tensor * &b.tensor)? - &c.tensor)?))
    }

    /// Fused negated multiply-add: `c - a * b`.
    pub fn fnmadd(a: &Self, b: &Self, c: &Self) -> Result<Self> {
        Ok(Self::wrap((&c.tensor - (&a.tensor * &b.tensor)?)?))
    }

    /// Fused negated multiply-subtract: `-(a * b) - c`.
    pub fn fnmsub(a: &Self, b: &Self, c: &Self) -> Result<Self> {
        Ok(Self::wrap(((&a.tensor * &b.tensor)? + &c.tensor)?.neg()?))
    }

    // --- comparisons (produce mask vectors) -------------------------------

    /// Elementwise equality mask.
    pub fn eq(&self, rhs: &Self) -> Result<Vector<u8>> {
        Ok(Vector::wrap(self.tensor.eq(&rhs.tensor)?))
    }

    /// Elementwise inequality mask.
    pub fn ne(&self, rhs: &Self) -> Result<Vector<u8>> {
        Ok(Vector::wrap(self.tensor.ne(&rhs.tensor)?))
    }

    /// Elementwise less-than mask.
    pub fn lt(&self, rhs: &Self) -> Result<Vector<u8>> {
        Ok(Vector::wrap(self.tensor.lt(&rhs.tensor)?))
    }

    /// Elementwise less-or-equal mask.
    pub fn le(&self, rhs: &Self) -> Result<Vector<u8>> {
        Ok(Vector::wrap(self.tensor.le(&rhs.tensor)?))
    }

    /// Elementwise greater-than mask.
    pub fn gt(&self, rhs: &Self) -> Result<Vector<u8>> {
        Ok(Vector::wrap(self.tensor.gt(&rhs.tensor)?))
    }

    /// Elementwise greater-or-equal mask.
    pub fn ge(&self, rhs: &Self) -> Result<Vector<u8>> {
        Ok(Vector::wrap(self.tensor.ge(&rhs.tensor)?))
    }

    /// Blend: `mask ? a : b` per element.
    pub fn select(mask: &Vector<u8>, a: &Self, b: &Self) -> Result<Self> {
        Ok(Self::wrap(mask.tensor.where_cond(&a.tensor, &b.tensor)?))
    }

    // --- reductions --------------------------------------------------------

    /// Horizontal sum of all elements.
    pub fn hsum(&self) -> Result<T> {
        Ok(self.tensor.sum_all()?.to_scalar::<T>()?)
    }

    /// Largest element.
    pub fn hmax(&self) -> Result<T> {
        Ok(self.tensor.max(0)?.to_scalar::<T>()?)
    }

    /// Smallest element.
    pub fn hmin(&self) -> Result<T> {
        Ok(self.tensor.min(0)?.to_scalar::<T>()?)
    }

    // --- indexed access ----------------------------------------------------

    /// Vectorized gather: `result[i] = source[index[i]]`.
    pub fn gather(source: &Self, index: &Vector<u32>) -> Result<Self> {
        Ok(Self::wrap(source.tensor.index_select(&index.tensor, 0)?))
    }

    /// Vectorized scatter-add: `target[index[i]] += source[i]`.
    pub fn scatter_add(target: &mut Self, source: &Self, index: &Vector<u32>) -> Result<()> {
        target.tensor = target
            .tensor
            .index_add(&index.tensor, &source.tensor, 0)?;
        Ok(())
    }

    /// Scatter-assign: `target[index[i]] = source[i]`.
    ///
    /// Duplicate indices take the last write. Staged through one bulk
    /// download and one bulk upload.
    pub fn scatter(target: &mut Self, source: &Self, index: &Vector<u32>) -> Result<()> {
        let mut host = target.to_vec()?;
        let src = source.to_vec()?;
        let idx = index.to_vec()?;
        let len = host.len();
        for (value, i) in src.into_iter().zip(idx) {
            let i = i as usize;
            if i >= len {
                return Err(BridgeError::index_out_of_range(i, len));
            }
            host[i] = value;
        }
        target.tensor = Tensor::from_vec(host, len, target.tensor.device())?;
        Ok(())
    }
}

impl<T: FloatElement> Vector<T> {
    /// `size` evenly spaced values from `min` to `max` inclusive.
    pub fn linspace(min: T, max: T, size: usize) -> Result<Self> {
        let (lo, hi) = (min.to_f64(), max.to_f64());
        let step = if size > 1 {
            (hi - lo) / (size - 1) as f64
        } else {
            0.0
        };
        let data: Vec<T> = (0..size)
            .map(|i| T::from_f64(lo + step * i as f64))
            .collect();
        Self::from_slice(&data)
    }

    /// Elementwise square root.
    pub fn sqrt(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sqrt()?))
    }

    /// Elementwise reciprocal.
    pub fn rcp(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.recip()?))
    }

    /// Elementwise reciprocal square root.
    pub fn rsqrt(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sqrt()?.recip()?))
    }

    /// Elementwise natural exponential.
    pub fn exp(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.exp()?))
    }

    /// Elementwise natural logarithm.
    pub fn log(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.log()?))
    }

    /// Elementwise sine.
    pub fn sin(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.sin()?))
    }

    /// Elementwise cosine.
    pub fn cos(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.cos()?))
    }

    /// Elementwise tangent.
    pub fn tan(&self) -> Result<Self> {
        Ok(Self::wrap((self.tensor.sin()? / self.tensor.cos()?)?))
    }

    /// Elementwise hyperbolic tangent.
    pub fn tanh(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.tanh()?))
    }

    /// Elementwise error function.
    pub fn erf(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.erf()?))
    }

    /// Elementwise power with a scalar exponent.
    pub fn powf(&self, exponent: f64) -> Result<Self> {
        Ok(Self::wrap(self.tensor.powf(exponent)?))
    }

    /// Elementwise ceiling.
    pub fn ceil(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.ceil()?))
    }

    /// Elementwise floor.
    pub fn floor(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.floor()?))
    }

    /// Elementwise round-to-nearest.
    pub fn round(&self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.round()?))
    }
}

// Mask operations on u8 vectors (0 = false, nonzero = true).
impl Vector<u8> {
    /// Logical AND of two masks.
    pub fn and(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap((&self.tensor * &rhs.tensor)?))
    }

    /// Logical OR of two masks.
    pub fn or(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.maximum(&rhs.tensor)?))
    }

    /// Logical XOR of two masks.
    pub fn xor(&self, rhs: &Self) -> Result<Self> {
        Ok(Self::wrap(self.tensor.ne(&rhs.tensor)?))
    }

    /// Logical NOT of a mask.
    pub fn not(&self) -> Result<Self> {
        let ones = self.tensor.ones_like()?;
        Ok(Self::wrap((ones - &self.tensor)?))
    }

    fn count_set(&self) -> Result<u32> {
        // widen before summing: a u8 accumulator overflows past 255 elements
        Ok(self
            .tensor
            .to_dtype(candle_core::DType::U32)?
            .sum_all()?
            .to_scalar::<u32>()?)
    }

    /// Whether any element is set.
    pub fn any(&self) -> Result<bool> {
        Ok(self.count_set()? > 0)
    }

    /// Whether all elements are set.
    pub fn all(&self) -> Result<bool> {
        Ok(self.count_set()? as usize == self.len())
    }

    /// Whether no element is set.
    pub fn none(&self) -> Result<bool> {
        Ok(self.count_set()? == 0)
    }
}

/// A fixed-size nesting of component arrays (depth-2..4 Logical Arrays).
///
/// Components are stored structure-of-arrays: `Vector3f` holds three
/// equal-length `Vector<f32>`s, one per coordinate.
#[derive(Debug, Clone)]
pub struct VecN<A, const N: usize> {
    components: [A; N],
}

/// Depth-2 pair of f32 vectors.
pub type Vector2f = VecN<Vector<f32>, 2>;
/// Depth-2 triple of f32 vectors.
pub type Vector3f = VecN<Vector<f32>, 3>;
/// Depth-2 quadruple of f32 vectors.
pub type Vector4f = VecN<Vector<f32>, 4>;

impl<A, const N: usize> VecN<A, N> {
    /// Build from exactly `N` components.
    #[must_use]
    pub fn new(components: [A; N]) -> Self {
        Self { components }
    }

    /// Build from a component list of the right length.
    ///
    /// # Errors
    ///
    /// Fails with a shape mismatch when the list length differs from `N`.
    pub fn from_components(components: Vec<A>) -> Result<Self> {
        let actual = components.len();
        let components: [A; N] = components
            .try_into()
            .map_err(|_| BridgeError::shape_mismatch(vec![N], vec![actual]))?;
        Ok(Self { components })
    }

    /// The components, outermost dimension first.
    #[must_use]
    pub fn components(&self) -> &[A; N] {
        &self.components
    }

    /// Borrow the `index`-th component.
    ///
    /// # Errors
    ///
    /// Out-of-range indices fail; the outer dimension has exactly `N` slots.
    pub fn component(&self, index: usize) -> Result<&A> {
        self.components
            .get(index)
            .ok_or_else(|| BridgeError::index_out_of_range(index, N))
    }

    /// Replace the `index`-th component.
    pub fn set_component(&mut self, index: usize, value: A) -> Result<()> {
        if index >= N {
            return Err(BridgeError::index_out_of_range(index, N));
        }
        self.components[index] = value;
        Ok(())
    }

    /// Outer extent (always `N`).
    #[must_use]
    pub fn size(&self) -> usize {
        N
    }

    /// First component.
    #[must_use]
    pub fn x(&self) -> &A {
        &self.components[0]
    }
}

impl<A> VecN<A, 2> {
    /// Second component.
    #[must_use]
    pub fn y(&self) -> &A {
        &self.components[1]
    }
}

impl<A> VecN<A, 3> {
    /// Second component.
    #[must_use]
    pub fn y(&self) -> &A {
        &self.components[1]
    }

    /// Third component.
    #[must_use]
    pub fn z(&self) -> &A {
        &self.components[2]
    }
}

impl<A> VecN<A, 4> {
    /// Second component.
    #[must_use]
    pub fn y(&self) -> &A {
        &self.components[1]
    }

    /// Third component.
    #[must_use]
    pub fn z(&self) -> &A {
        &self.components[2]
    }

    /// Fourth component.
    #[must_use]
    pub fn w(&self) -> &A {
        &self.components[3]
    }
}

impl<T: Element, const N: usize> VecN<Vector<T>, N> {
    /// Zero-filled components, each of length `size`.
    pub fn zeros(size: usize) -> Result<Self> {
        let mut components = Vec::with_capacity(N);
        for _ in 0..N {
            components.push(Vector::zeros(size)?);
        }
        Self::from_components(components)
    }

    /// Per-component length (components are equal length by construction).
    #[must_use]
    pub fn len(&self) -> usize {
        self.components[0].len()
    }

    /// Whether the component vectors are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize every component.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        for c in &mut self.components {
            c.resize(size)?;
        }
        Ok(())
    }

    fn zip_map(
        &self,
        rhs: &Self,
        f: impl Fn(&Vector<T>, &Vector<T>) -> Result<Vector<T>>,
    ) -> Result<Self> {
        let mut components = Vec::with_capacity(N);
        for (a, b) in self.components.iter().zip(rhs.components.iter()) {
            components.push(f(a, b)?);
        }
        Self::from_components(components)
    }

    /// Componentwise sum.
    pub fn add(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, Vector::add)
    }

    /// Componentwise difference.
    pub fn sub(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, Vector::sub)
    }

    /// Componentwise product.
    pub fn mul(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, Vector::mul)
    }

    /// Componentwise quotient.
    pub fn div(&self, rhs: &Self) -> Result<Self> {
        self.zip_map(rhs, Vector::div)
    }

    /// Componentwise negation.
    pub fn neg(&self) -> Result<Self> {
        let mut components = Vec::with_capacity(N);
        for c in &self.components {
            components.push(c.neg()?);
        }
        Self::from_components(components)
    }
}

impl<T: FloatElement, const N: usize> VecN<Vector<T>, N> {
    /// Per-slot dot product of two vector bundles.
    pub fn dot(a: &Self, b: &Self) -> Result<Vector<T>> {
        let mut acc = a.components[0].mul(&b.components[0])?;
        for i in 1..N {
            acc = Vector::fmadd(&a.components[i], &b.components[i], &acc)?;
        }
        Ok(acc)
    }

    /// Per-slot absolute value of the dot product.
    pub fn abs_dot(a: &Self, b: &Self) -> Result<Vector<T>> {
        Self::dot(a, b)?.abs()
    }

    /// Per-slot vector normalization.
    pub fn normalize(&self) -> Result<Self> {
        let inv_norm = Self::dot(self, self)?.rsqrt()?;
        let mut components = Vec::with_capacity(N);
        for c in &self.components {
            components.push(c.mul(&inv_norm)?);
        }
        Self::from_components(components)
    }
}

impl<T: FloatElement> VecN<Vector<T>, 3> {
    /// Per-slot cross product.
    pub fn cross(a: &Self, b: &Self) -> Result<Self> {
        let [ax, ay, az] = &a.components;
        let [bx, by, bz] = &b.components;
        Ok(Self::new([
            ay.mul(bz)?.sub(&az.mul(by)?)?,
            az.mul(bx)?.sub(&ax.mul(bz)?)?,
            ax.mul(by)?.sub(&ay.mul(bx)?)?,
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn force_cpu() {
        std::env::set_var("GPU_ARRAY_FORCE_CPU", "1");
    }

    #[test]
    fn test_construction() {
        force_cpu();
        let v = Vector::<f32>::zeros(4).unwrap();
        assert_eq!(v.len(), 4);
        assert_eq!(v.to_vec().unwrap(), vec![0.0; 4]);

        let v = Vector::<f32>::full(2.5, 3).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![2.5, 2.5, 2.5]);

        let v = Vector::<u32>::arange(5).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![0, 1, 2, 3, 4]);

        let v = Vector::<f32>::linspace(0.0, 1.0, 5).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_arithmetic_and_reductions() {
        force_cpu();
        let a = Vector::<f32>::from_slice(&[1.0, 2.0, 3.0]).unwrap();
        let b = Vector::<f32>::from_slice(&[4.0, 5.0, 6.0]).unwrap();

        assert_eq!(a.add(&b).unwrap().to_vec().unwrap(), vec![5.0, 7.0, 9.0]);
        assert_eq!(b.sub(&a).unwrap().to_vec().unwrap(), vec![3.0, 3.0, 3.0]);
        assert_eq!(a.mul(&b).unwrap().to_vec().unwrap(), vec![4.0, 10.0, 18.0]);
        assert_eq!(a.neg().unwrap().to_vec().unwrap(), vec![-1.0, -2.0, -3.0]);

        assert_eq!(a.hsum().unwrap(), 6.0);
        assert_eq!(a.hmax().unwrap(), 3.0);
        assert_eq!(a.hmin().unwrap(), 1.0);

        let fma = Vector::fmadd(&a, &b, &a).unwrap();
        assert_eq!(fma.to_vec().unwrap(), vec![5.0, 12.0, 21.0]);
        let fms = Vector::fmsub(&a, &b, &a).unwrap();
        assert_eq!(fms.to_vec().unwrap(), vec![3.0, 8.0, 15.0]);
        let fnma = Vector::fnmadd(&a, &b, &a).unwrap();
        assert_eq!(fnma.to_vec().unwrap(), vec![-3.0, -8.0, -15.0]);
        let fnms = Vector::fnmsub(&a, &b, &a).unwrap();
        assert_eq!(fnms.to_vec().unwrap(), vec![-5.0, -12.0, -21.0]);
    }

    #[test]
    fn test_get_bounds_checked() {
        force_cpu();
        let v = Vector::<f32>::from_slice(&[1.0, 2.0]).unwrap();
        assert_eq!(v.get(1).unwrap(), 2.0);
        let err = v.get(2).unwrap_err();
        assert!(matches!(err, BridgeError::IndexOutOfRange { index: 2, len: 2 }));
    }

    #[test]
    fn test_resize() {
        force_cpu();
        let mut v = Vector::<f32>::from_slice(&[1.0, 2.0, 3.0]).unwrap();
        v.resize(5).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![1.0, 2.0, 3.0, 0.0, 0.0]);
        v.resize(2).unwrap();
        assert_eq!(v.to_vec().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_comparisons_and_masks() {
        force_cpu();
        let a = Vector::<f32>::from_slice(&[1.0, 5.0, 3.0]).unwrap();
        let b = Vector::<f32>::from_slice(&[2.0, 5.0, 1.0]).unwrap();

        let lt = a.lt(&b).unwrap();
        assert_eq!(lt.to_vec().unwrap(), vec![1, 0, 0]);
        let eq = a.eq(&b).unwrap();
        assert_eq!(eq.to_vec().unwrap(), vec![0, 1, 0]);

        assert!(lt.any().unwrap());
        assert!(!lt.all().unwrap());
        assert!(!lt.none().unwrap());

        let or = lt.or(&eq).unwrap();
        assert_eq!(or.to_vec().unwrap(), vec![1, 1, 0]);
        let not = or.not().unwrap();
        assert_eq!(not.to_vec().unwrap(), vec![0, 0, 1]);

        let blended = Vector::select(&lt, &a, &b).unwrap();
        assert_eq!(blended.to_vec().unwrap(), vec![1.0, 5.0, 1.0]);
    }

    #[test]
    fn test_gather_scatter_ops() {
        force_cpu();
        let source = Vector::<f32>::from_slice(&[10.0, 20.0, 30.0, 40.0]).unwrap();
        let index = Vector::<u32>::from_slice(&[3, 0, 2]).unwrap();

        let gathered = Vector::gather(&source, &index).unwrap();
        assert_eq!(gathered.to_vec().unwrap(), vec![40.0, 10.0, 30.0]);

        let mut target = Vector::<f32>::zeros(4).unwrap();
        Vector::scatter(&mut target, &gathered, &index).unwrap();
        assert_eq!(target.to_vec().unwrap(), vec![10.0, 0.0, 30.0, 40.0]);

        let mut acc = Vector::<f32>::zeros(4).unwrap();
        let ones = Vector::<f32>::full(1.0, 3).unwrap();
        let dup = Vector::<u32>::from_slice(&[1, 1, 2]).unwrap();
        Vector::scatter_add(&mut acc, &ones, &dup).unwrap();
        assert_eq!(acc.to_vec().unwrap(), vec![0.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn test_transcendental() {
        force_cpu();
        let v = Vector::<f32>::from_slice(&[1.0, 4.0, 9.0]).unwrap();
        assert_eq!(v.sqrt().unwrap().to_vec().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(v.rcp().unwrap().to_vec().unwrap(), vec![1.0, 0.25, 1.0 / 9.0]);

        let z = Vector::<f32>::zeros(3).unwrap();
        assert_eq!(z.exp().unwrap().to_vec().unwrap(), vec![1.0, 1.0, 1.0]);
        assert_eq!(z.sin().unwrap().to_vec().unwrap(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vecn_components() {
        force_cpu();
        let v = Vector3f::zeros(4).unwrap();
        assert_eq!(v.size(), 3);
        assert_eq!(v.len(), 4);
        assert!(v.component(3).is_err());

        let mut v = v;
        let replacement = Vector::<f32>::full(7.0, 4).unwrap();
        v.set_component(1, replacement).unwrap();
        assert_eq!(v.y().to_vec().unwrap(), vec![7.0; 4]);
    }

    #[test]
    fn test_vecn_dot_and_cross() {
        force_cpu();
        let ex = Vector3f::new([
            Vector::from_slice(&[1.0]).unwrap(),
            Vector::from_slice(&[0.0]).unwrap(),
            Vector::from_slice(&[0.0]).unwrap(),
        ]);
        let ey = Vector3f::new([
            Vector::from_slice(&[0.0]).unwrap(),
            Vector::from_slice(&[1.0]).unwrap(),
            Vector::from_slice(&[0.0]).unwrap(),
        ]);

        assert_eq!(Vector3f::dot(&ex, &ey).unwrap().to_vec().unwrap(), vec![0.0]);
        assert_eq!(Vector3f::dot(&ex, &ex).unwrap().to_vec().unwrap(), vec![1.0]);

        let neg_ex = ex.neg().unwrap();
        assert_eq!(
            Vector3f::dot(&neg_ex, &ex).unwrap().to_vec().unwrap(),
            vec![-1.0]
        );
        assert_eq!(
            Vector3f::abs_dot(&neg_ex, &ex).unwrap().to_vec().unwrap(),
            vec![1.0]
        );

        let ez = Vector3f::cross(&ex, &ey).unwrap();
        assert_eq!(ez.x().to_vec().unwrap(), vec![0.0]);
        assert_eq!(ez.y().to_vec().unwrap(), vec![0.0]);
        assert_eq!(ez.z().to_vec().unwrap(), vec![1.0]);
    }

    #[test]
    fn test_normalize() {
        force_cpu();
        let v = Vector2f::new([
            Vector::from_slice(&[3.0, 0.0]).unwrap(),
            Vector::from_slice(&[4.0, 2.0]).unwrap(),
        ]);
        let n = v.normalize().unwrap();
        let x = n.x().to_vec().unwrap();
        let y = n.y().to_vec().unwrap();
        assert!((x[0] - 0.6).abs() < 1e-6);
        assert!((y[0] - 0.8).abs() < 1e-6);
        assert!((y[1] - 1.0).abs() < 1e-6);
    }
}
