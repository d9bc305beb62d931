// SPDX-License-Identifier: MIT

//! Python bindings.
//!
//! Exposes the GPU vector types to Python and wires the strided tensor
//! bridge to PyTorch and NumPy. Conversions follow the adapter pattern: a
//! foreign tensor is probed once at the boundary for its structured
//! descriptor (shape, strides, dtype, data pointer), validated, and only
//! then handed to the bridge. On mismatch the conversion is rejected
//! outright; nothing is coerced and no memory is touched.
//!
//! Build with the `python` feature:
//!
//! ```bash
//! maturin develop --features python
//! ```

use crate::array::{Vector, Vector2f, Vector3f, Vector4f};
use crate::bridge::{export_array, gather_array, scatter_array, BridgeArray, ExternalDescriptor};
use crate::diff::{self, DiffVector};
use crate::dtype::ElemType;
use crate::error::BridgeError;
use crate::logging::{init_logging, LogConfig};
use numpy::ndarray::{ArrayD, IxDyn};
use numpy::{IntoPyArray, PyReadonlyArrayDyn, PyUntypedArrayMethods};
use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{IntoPyDict, PyDict};

impl From<BridgeError> for PyErr {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::IndexOutOfRange { .. } => PyIndexError::new_err(err.to_string()),
            BridgeError::RankMismatch { .. }
            | BridgeError::DTypeMismatch { .. }
            | BridgeError::ForeignTensorRejected(_) => PyTypeError::new_err(err.to_string()),
            BridgeError::ShapeMismatch { .. } | BridgeError::UnsupportedDType(_) => {
                PyValueError::new_err(err.to_string())
            }
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

/// Probe a foreign torch tensor for its structured descriptor.
///
/// Checks the type name first, then rank/dtype via the descriptor it
/// returns; the data pointer is read last, after everything else checked
/// out. GPU-resident tensors are hosted with `.cpu()` before probing.
fn torch_descriptor(obj: &Bound<'_, PyAny>) -> PyResult<(ExternalDescriptor, PyObject)> {
    let type_name: String = obj.get_type().getattr("__name__")?.extract()?;
    if type_name != "Tensor" {
        return Err(BridgeError::rejected(format!(
            "expected a torch.Tensor, got {type_name}"
        ))
        .into());
    }

    let mut hosted = obj.clone();
    if hosted.getattr("requires_grad")?.extract::<bool>()? {
        hosted = hosted.call_method0("detach")?;
    }
    if hosted.getattr("is_cuda")?.extract::<bool>()? {
        hosted = hosted.call_method0("cpu")?;
    }

    let dtype_name: String = hosted.getattr("dtype")?.str()?.extract()?;
    let elem = ElemType::from_torch_name(&dtype_name)?;

    let shape: Vec<usize> = hosted.getattr("shape")?.extract()?;
    let signed_strides: Vec<i64> = hosted.call_method0("stride")?.extract()?;
    let strides = signed_strides
        .iter()
        .map(|&s| {
            usize::try_from(s).map_err(|_| {
                PyErr::from(BridgeError::rejected(format!("negative stride {s}")))
            })
        })
        .collect::<PyResult<Vec<_>>>()?;

    let ptr: usize = hosted.call_method0("data_ptr")?.extract()?;
    let desc = ExternalDescriptor::new(shape, strides, elem, ptr)?;
    // keep the (possibly rehosted) tensor alive alongside the descriptor
    Ok((desc, hosted.unbind()))
}

/// Allocate a torch tensor of the given external shape and scatter into it.
fn scatter_to_torch<A: BridgeArray>(py: Python<'_>, array: &A) -> PyResult<PyObject> {
    let torch = py.import_bound("torch")?;
    let elem = A::Elem::ELEM;
    let dtype = torch.getattr(elem.torch_name()?)?;

    let shape: Vec<usize> = array.shape().iter().rev().copied().collect();
    let kwargs: Bound<'_, PyDict> = [("dtype", dtype)].into_py_dict_bound(py);
    let tensor = torch.call_method("empty", (shape,), Some(&kwargs))?;

    let signed_strides: Vec<i64> = tensor.call_method0("stride")?.extract()?;
    let strides: Vec<usize> = signed_strides.iter().map(|&s| s as usize).collect();
    let tensor_shape: Vec<usize> = tensor.getattr("shape")?.extract()?;
    let ptr: usize = tensor.call_method0("data_ptr")?.extract()?;

    let desc = ExternalDescriptor::new(tensor_shape, strides, elem, ptr)?;
    // SAFETY: the tensor was just allocated by torch for this shape/dtype
    // and is exclusively ours until returned.
    unsafe { scatter_array(array, &desc)? };
    Ok(tensor.unbind())
}

/// Copy a dense host tensor out as a NumPy array.
fn export_to_numpy<A>(py: Python<'_>, array: &A) -> PyResult<PyObject>
where
    A: BridgeArray,
    A::Elem: numpy::Element,
{
    let host = export_array(array)?;
    let data = host.to_vec::<A::Elem>()?;
    let nd = ArrayD::from_shape_vec(IxDyn(host.shape()), data)
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    Ok(nd.into_pyarray_bound(py).into_any().unbind())
}

/// Adopt a NumPy array through its byte-stride descriptor.
fn gather_from_numpy<A>(arr: &PyReadonlyArrayDyn<'_, A::Elem>) -> PyResult<A>
where
    A: BridgeArray,
    A::Elem: numpy::Element,
{
    let shape = arr.shape().to_vec();
    let byte_strides = arr
        .strides()
        .iter()
        .map(|&s| {
            usize::try_from(s).map_err(|_| {
                PyErr::from(BridgeError::rejected(format!("negative stride {s}")))
            })
        })
        .collect::<PyResult<Vec<_>>>()?;

    let ptr = arr.as_array().as_ptr() as usize;
    let desc = ExternalDescriptor::from_byte_strides(shape, byte_strides, A::Elem::ELEM, ptr)?;
    // SAFETY: the readonly borrow keeps the array alive and unwritten for
    // the duration of the gather; strides are non-negative so `ptr` is the
    // lowest address the descriptor can reach.
    Ok(unsafe { gather_array(&desc)? })
}

fn preview<T: std::fmt::Debug>(values: &[T]) -> String {
    const LIMIT: usize = 8;
    if values.len() <= LIMIT {
        format!("{values:?}")
    } else {
        let head: Vec<String> = values[..LIMIT].iter().map(|v| format!("{v:?}")).collect();
        format!("[{}, ..] ({} elements)", head.join(", "), values.len())
    }
}

/// Flat f32 GPU vector.
#[pyclass(name = "FloatC")]
#[derive(Clone)]
pub struct PyFloatC {
    inner: Vector<f32>,
}

#[pymethods]
impl PyFloatC {
    #[new]
    fn new(values: Vec<f32>) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::from_slice(&values)?,
        })
    }

    #[staticmethod]
    fn zeros(size: usize) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::zeros(size)?,
        })
    }

    #[staticmethod]
    fn full(value: f32, size: usize) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::full(value, size)?,
        })
    }

    #[staticmethod]
    fn linspace(min: f32, max: f32, size: usize) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::linspace(min, max, size)?,
        })
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __getitem__(&self, index: usize) -> PyResult<f32> {
        Ok(self.inner.get(index)?)
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!("FloatC({})", preview(&self.inner.to_vec()?)))
    }

    fn __add__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.add(&rhs.inner)?,
        })
    }

    fn __sub__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sub(&rhs.inner)?,
        })
    }

    fn __mul__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.mul(&rhs.inner)?,
        })
    }

    fn __truediv__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.div(&rhs.inner)?,
        })
    }

    fn __neg__(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.neg()?,
        })
    }

    fn __eq__(&self, rhs: &Self) -> PyResult<PyBoolC> {
        Ok(PyBoolC {
            inner: self.inner.eq(&rhs.inner)?,
        })
    }

    fn __lt__(&self, rhs: &Self) -> PyResult<PyBoolC> {
        Ok(PyBoolC {
            inner: self.inner.lt(&rhs.inner)?,
        })
    }

    fn __le__(&self, rhs: &Self) -> PyResult<PyBoolC> {
        Ok(PyBoolC {
            inner: self.inner.le(&rhs.inner)?,
        })
    }

    fn __gt__(&self, rhs: &Self) -> PyResult<PyBoolC> {
        Ok(PyBoolC {
            inner: self.inner.gt(&rhs.inner)?,
        })
    }

    fn __ge__(&self, rhs: &Self) -> PyResult<PyBoolC> {
        Ok(PyBoolC {
            inner: self.inner.ge(&rhs.inner)?,
        })
    }

    fn sqrt(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sqrt()?,
        })
    }

    fn rsqrt(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.rsqrt()?,
        })
    }

    fn rcp(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.rcp()?,
        })
    }

    fn exp(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.exp()?,
        })
    }

    fn log(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.log()?,
        })
    }

    fn sin(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sin()?,
        })
    }

    fn cos(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.cos()?,
        })
    }

    fn tan(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.tan()?,
        })
    }

    fn tanh(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.tanh()?,
        })
    }

    fn erf(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.erf()?,
        })
    }

    fn abs(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.abs()?,
        })
    }

    fn pow(&self, exponent: f64) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.powf(exponent)?,
        })
    }

    fn ceil(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.ceil()?,
        })
    }

    fn floor(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.floor()?,
        })
    }

    fn round(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.round()?,
        })
    }

    fn hsum(&self) -> PyResult<f32> {
        Ok(self.inner.hsum()?)
    }

    fn hmax(&self) -> PyResult<f32> {
        Ok(self.inner.hmax()?)
    }

    fn hmin(&self) -> PyResult<f32> {
        Ok(self.inner.hmin()?)
    }

    fn fmadd(&self, b: &Self, c: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::fmadd(&self.inner, &b.inner, &c.inner)?,
        })
    }

    fn fmsub(&self, b: &Self, c: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::fmsub(&self.inner, &b.inner, &c.inner)?,
        })
    }

    fn fnmadd(&self, b: &Self, c: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::fnmadd(&self.inner, &b.inner, &c.inner)?,
        })
    }

    fn fnmsub(&self, b: &Self, c: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::fnmsub(&self.inner, &b.inner, &c.inner)?,
        })
    }

    #[staticmethod]
    fn gather(source: &Self, index: &PyUInt32C) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::gather(&source.inner, &index.inner)?,
        })
    }

    fn scatter(&mut self, source: &Self, index: &PyUInt32C) -> PyResult<()> {
        Vector::scatter(&mut self.inner, &source.inner, &index.inner)?;
        Ok(())
    }

    fn scatter_add(&mut self, source: &Self, index: &PyUInt32C) -> PyResult<()> {
        Vector::scatter_add(&mut self.inner, &source.inner, &index.inner)?;
        Ok(())
    }

    #[staticmethod]
    fn select(mask: &PyBoolC, a: &Self, b: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::select(&mask.inner, &a.inner, &b.inner)?,
        })
    }

    fn resize(&mut self, size: usize) -> PyResult<()> {
        self.inner.resize(size)?;
        Ok(())
    }

    /// Force completion of pending device work on this vector.
    fn eval(&self) -> PyResult<()> {
        self.inner.eval()?;
        Ok(())
    }

    fn to_list(&self) -> PyResult<Vec<f32>> {
        Ok(self.inner.to_vec()?)
    }

    /// Copy out as a `torch.Tensor` (reversed dimension order).
    #[pyo3(signature = (eval = true))]
    fn torch(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
        if eval {
            self.inner.eval()?;
        }
        scatter_to_torch(py, &self.inner)
    }

    /// Adopt a `torch.Tensor` (must be 1-D float32).
    #[staticmethod]
    fn from_torch(obj: &Bound<'_, PyAny>) -> PyResult<Self> {
        let (desc, _keepalive) = torch_descriptor(obj)?;
        // SAFETY: the descriptor was probed from a live tensor we hold a
        // reference to for the duration of the copy.
        let inner = unsafe { gather_array(&desc)? };
        Ok(Self { inner })
    }

    /// Copy out as a `numpy.ndarray`.
    #[pyo3(signature = (eval = true))]
    fn numpy(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
        if eval {
            self.inner.eval()?;
        }
        export_to_numpy(py, &self.inner)
    }

    /// Adopt a `numpy.ndarray` (must be 1-D float32).
    #[staticmethod]
    fn from_numpy(arr: PyReadonlyArrayDyn<'_, f32>) -> PyResult<Self> {
        Ok(Self {
            inner: gather_from_numpy(&arr)?,
        })
    }
}

/// Flat u32 GPU vector, mostly used as gather/scatter indices.
#[pyclass(name = "UInt32C")]
#[derive(Clone)]
pub struct PyUInt32C {
    inner: Vector<u32>,
}

#[pymethods]
impl PyUInt32C {
    #[new]
    fn new(values: Vec<u32>) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::from_slice(&values)?,
        })
    }

    #[staticmethod]
    fn zeros(size: usize) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::zeros(size)?,
        })
    }

    #[staticmethod]
    fn arange(size: usize) -> PyResult<Self> {
        Ok(Self {
            inner: Vector::arange(size)?,
        })
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __getitem__(&self, index: usize) -> PyResult<u32> {
        Ok(self.inner.get(index)?)
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!("UInt32C({})", preview(&self.inner.to_vec()?)))
    }

    fn __add__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.add(&rhs.inner)?,
        })
    }

    fn __sub__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sub(&rhs.inner)?,
        })
    }

    fn __mul__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.mul(&rhs.inner)?,
        })
    }

    fn __eq__(&self, rhs: &Self) -> PyResult<PyBoolC> {
        Ok(PyBoolC {
            inner: self.inner.eq(&rhs.inner)?,
        })
    }

    fn hsum(&self) -> PyResult<u32> {
        Ok(self.inner.hsum()?)
    }

    fn hmax(&self) -> PyResult<u32> {
        Ok(self.inner.hmax()?)
    }

    fn hmin(&self) -> PyResult<u32> {
        Ok(self.inner.hmin()?)
    }

    fn resize(&mut self, size: usize) -> PyResult<()> {
        self.inner.resize(size)?;
        Ok(())
    }

    fn to_list(&self) -> PyResult<Vec<u32>> {
        Ok(self.inner.to_vec()?)
    }

    /// Copy out as a `numpy.ndarray`.
    #[pyo3(signature = (eval = true))]
    fn numpy(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
        if eval {
            self.inner.eval()?;
        }
        export_to_numpy(py, &self.inner)
    }

    #[staticmethod]
    fn from_numpy(arr: PyReadonlyArrayDyn<'_, u32>) -> PyResult<Self> {
        Ok(Self {
            inner: gather_from_numpy(&arr)?,
        })
    }
}

/// Flat boolean mask (stored as u8, 0 = false).
#[pyclass(name = "BoolC")]
#[derive(Clone)]
pub struct PyBoolC {
    inner: Vector<u8>,
}

#[pymethods]
impl PyBoolC {
    #[new]
    fn new(values: Vec<bool>) -> PyResult<Self> {
        let raw: Vec<u8> = values.into_iter().map(u8::from).collect();
        Ok(Self {
            inner: Vector::from_slice(&raw)?,
        })
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __getitem__(&self, index: usize) -> PyResult<bool> {
        Ok(self.inner.get(index)? != 0)
    }

    fn __repr__(&self) -> PyResult<String> {
        let raw: Vec<bool> = self.inner.to_vec()?.into_iter().map(|v| v != 0).collect();
        Ok(format!("BoolC({})", preview(&raw)))
    }

    fn __and__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.and(&rhs.inner)?,
        })
    }

    fn __or__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.or(&rhs.inner)?,
        })
    }

    fn __xor__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.xor(&rhs.inner)?,
        })
    }

    fn __invert__(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.not()?,
        })
    }

    fn any(&self) -> PyResult<bool> {
        Ok(self.inner.any()?)
    }

    fn all(&self) -> PyResult<bool> {
        Ok(self.inner.all()?)
    }

    fn none(&self) -> PyResult<bool> {
        Ok(self.inner.none()?)
    }

    fn to_list(&self) -> PyResult<Vec<bool>> {
        Ok(self.inner.to_vec()?.into_iter().map(|v| v != 0).collect())
    }
}

/// Differentiable f32 GPU vector.
#[pyclass(name = "FloatD")]
#[derive(Clone)]
pub struct PyFloatD {
    inner: DiffVector<f32>,
}

#[pymethods]
impl PyFloatD {
    #[new]
    fn new(values: Vec<f32>) -> PyResult<Self> {
        Ok(Self {
            inner: DiffVector::from_slice(&values)?,
        })
    }

    #[staticmethod]
    fn zeros(size: usize) -> PyResult<Self> {
        Ok(Self {
            inner: DiffVector::zeros(size)?,
        })
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!(
            "FloatD({}, requires_grad={})",
            preview(&self.inner.to_vec()?),
            self.inner.requires_grad()
        ))
    }

    fn __add__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.add(&rhs.inner)?,
        })
    }

    fn __sub__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sub(&rhs.inner)?,
        })
    }

    fn __mul__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.mul(&rhs.inner)?,
        })
    }

    fn __truediv__(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.div(&rhs.inner)?,
        })
    }

    fn __neg__(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.neg()?,
        })
    }

    fn sqrt(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sqrt()?,
        })
    }

    fn exp(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.exp()?,
        })
    }

    fn log(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.log()?,
        })
    }

    fn sin(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.sin()?,
        })
    }

    fn cos(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.cos()?,
        })
    }

    fn tanh(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.tanh()?,
        })
    }

    fn pow(&self, exponent: f64) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.powf(exponent)?,
        })
    }

    /// Horizontal sum as a length-1 differentiable vector.
    fn hsum(&self) -> PyResult<Self> {
        Ok(Self {
            inner: self.inner.hsum()?,
        })
    }

    /// Enable or disable gradient tracking on this vector.
    #[pyo3(signature = (enabled = true))]
    fn requires_grad_(&mut self, enabled: bool) -> PyResult<()> {
        self.inner.set_requires_grad(enabled)?;
        Ok(())
    }

    #[getter]
    fn requires_grad(&self) -> bool {
        self.inner.requires_grad()
    }

    /// The accumulated gradient, or None before any backward pass.
    #[getter]
    fn grad(&self) -> PyResult<Option<PyFloatC>> {
        Ok(self.inner.grad()?.map(|inner| PyFloatC { inner }))
    }

    /// Clear the gradient slot.
    fn zero_grad(&self) {
        self.inner.set_grad(None);
    }

    /// Run reverse-mode differentiation from this vector.
    fn backward(&self) -> PyResult<()> {
        diff::backward(&self.inner)?;
        Ok(())
    }

    /// The current value, cut loose from the autodiff graph.
    fn detach(&self) -> PyResult<PyFloatC> {
        Ok(PyFloatC {
            inner: self.inner.detach()?,
        })
    }

    fn to_list(&self) -> PyResult<Vec<f32>> {
        Ok(self.inner.to_vec()?)
    }

    /// Copy the detached value out as a `torch.Tensor`.
    #[pyo3(signature = (eval = true))]
    fn torch(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
        let value = self.inner.detach()?;
        if eval {
            value.eval()?;
        }
        scatter_to_torch(py, &value)
    }

    /// Adopt a `torch.Tensor` as an untracked differentiable vector.
    #[staticmethod]
    fn from_torch(obj: &Bound<'_, PyAny>) -> PyResult<Self> {
        let plain = PyFloatC::from_torch(obj)?;
        Ok(Self {
            inner: DiffVector::from_vector(&plain.inner),
        })
    }

    /// Copy the detached value out as a `numpy.ndarray`.
    #[pyo3(signature = (eval = true))]
    fn numpy(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
        let value = self.inner.detach()?;
        if eval {
            value.eval()?;
        }
        export_to_numpy(py, &value)
    }
}

macro_rules! bundle_class {
    ($py_name:ident, $class_name:literal, $rust_ty:ty, $n:literal, { $($extra:item)* }) => {
        #[doc = concat!("Bundle of ", stringify!($n), " equal-length f32 vectors.")]
        #[pyclass(name = $class_name)]
        #[derive(Clone)]
        pub struct $py_name {
            inner: $rust_ty,
        }

        #[pymethods]
        impl $py_name {
            #[new]
            fn new(components: Vec<PyFloatC>) -> PyResult<Self> {
                let inner = <$rust_ty>::from_components(
                    components.into_iter().map(|c| c.inner).collect(),
                )?;
                Ok(Self { inner })
            }

            #[staticmethod]
            fn zeros(size: usize) -> PyResult<Self> {
                Ok(Self {
                    inner: <$rust_ty>::zeros(size)?,
                })
            }

            fn __len__(&self) -> usize {
                self.inner.len()
            }

            fn __getitem__(&self, index: usize) -> PyResult<PyFloatC> {
                Ok(PyFloatC {
                    inner: self.inner.component(index)?.clone(),
                })
            }

            fn __setitem__(&mut self, index: usize, value: PyFloatC) -> PyResult<()> {
                self.inner.set_component(index, value.inner)?;
                Ok(())
            }

            fn __repr__(&self) -> PyResult<String> {
                Ok(format!(
                    concat!($class_name, "(size={}, len={})"),
                    $n,
                    self.inner.len()
                ))
            }

            fn __add__(&self, rhs: &Self) -> PyResult<Self> {
                Ok(Self {
                    inner: self.inner.add(&rhs.inner)?,
                })
            }

            fn __sub__(&self, rhs: &Self) -> PyResult<Self> {
                Ok(Self {
                    inner: self.inner.sub(&rhs.inner)?,
                })
            }

            fn __mul__(&self, rhs: &Self) -> PyResult<Self> {
                Ok(Self {
                    inner: self.inner.mul(&rhs.inner)?,
                })
            }

            fn __neg__(&self) -> PyResult<Self> {
                Ok(Self {
                    inner: self.inner.neg()?,
                })
            }

            #[getter]
            fn x(&self) -> PyFloatC {
                PyFloatC {
                    inner: self.inner.x().clone(),
                }
            }

            #[getter]
            fn y(&self) -> PyFloatC {
                PyFloatC {
                    inner: self.inner.y().clone(),
                }
            }

            fn dot(&self, rhs: &Self) -> PyResult<PyFloatC> {
                Ok(PyFloatC {
                    inner: <$rust_ty>::dot(&self.inner, &rhs.inner)?,
                })
            }

            fn abs_dot(&self, rhs: &Self) -> PyResult<PyFloatC> {
                Ok(PyFloatC {
                    inner: <$rust_ty>::abs_dot(&self.inner, &rhs.inner)?,
                })
            }

            fn normalize(&self) -> PyResult<Self> {
                Ok(Self {
                    inner: self.inner.normalize()?,
                })
            }

            fn resize(&mut self, size: usize) -> PyResult<()> {
                self.inner.resize(size)?;
                Ok(())
            }

            /// Copy out as a 2-D `torch.Tensor` (reversed dimension order).
            #[pyo3(signature = (eval = true))]
            fn torch(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
                if eval {
                    self.inner.components()[0].eval()?;
                }
                scatter_to_torch(py, &self.inner)
            }

            /// Adopt a 2-D `torch.Tensor` with trailing extent matching.
            #[staticmethod]
            fn from_torch(obj: &Bound<'_, PyAny>) -> PyResult<Self> {
                let (desc, _keepalive) = torch_descriptor(obj)?;
                // SAFETY: descriptor probed from a tensor held live above.
                let inner = unsafe { gather_array(&desc)? };
                Ok(Self { inner })
            }

            /// Copy out as a 2-D `numpy.ndarray`.
            #[pyo3(signature = (eval = true))]
            fn numpy(&self, py: Python<'_>, eval: bool) -> PyResult<PyObject> {
                if eval {
                    self.inner.components()[0].eval()?;
                }
                export_to_numpy(py, &self.inner)
            }

            /// Adopt a 2-D `numpy.ndarray`.
            #[staticmethod]
            fn from_numpy(arr: PyReadonlyArrayDyn<'_, f32>) -> PyResult<Self> {
                Ok(Self {
                    inner: gather_from_numpy(&arr)?,
                })
            }

            $($extra)*
        }
    };
}

bundle_class!(PyVector2fC, "Vector2fC", Vector2f, 2, {});

bundle_class!(PyVector3fC, "Vector3fC", Vector3f, 3, {
    #[getter]
    fn z(&self) -> PyFloatC {
        PyFloatC {
            inner: self.inner.z().clone(),
        }
    }

    fn cross(&self, rhs: &Self) -> PyResult<Self> {
        Ok(Self {
            inner: Vector3f::cross(&self.inner, &rhs.inner)?,
        })
    }
});

bundle_class!(PyVector4fC, "Vector4fC", Vector4f, 4, {
    #[getter]
    fn z(&self) -> PyFloatC {
        PyFloatC {
            inner: self.inner.z().clone(),
        }
    }

    #[getter]
    fn w(&self) -> PyFloatC {
        PyFloatC {
            inner: self.inner.w().clone(),
        }
    }
});

/// Copy any array class out as a `torch.Tensor`.
#[pyfunction]
#[pyo3(signature = (array, eval = true))]
fn to_torch(py: Python<'_>, array: &Bound<'_, PyAny>, eval: bool) -> PyResult<PyObject> {
    if let Ok(v) = array.extract::<PyRef<'_, PyFloatC>>() {
        return v.torch(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyFloatD>>() {
        return v.torch(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyVector2fC>>() {
        return v.torch(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyVector3fC>>() {
        return v.torch(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyVector4fC>>() {
        return v.torch(py, eval);
    }
    Err(BridgeError::rejected(format!(
        "no torch conversion for {}",
        array.get_type().getattr("__name__")?.extract::<String>()?
    ))
    .into())
}

/// Copy any array class out as a `numpy.ndarray`.
#[pyfunction]
#[pyo3(signature = (array, eval = true))]
fn to_numpy(py: Python<'_>, array: &Bound<'_, PyAny>, eval: bool) -> PyResult<PyObject> {
    if let Ok(v) = array.extract::<PyRef<'_, PyFloatC>>() {
        return v.numpy(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyUInt32C>>() {
        return v.numpy(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyFloatD>>() {
        return v.numpy(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyVector2fC>>() {
        return v.numpy(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyVector3fC>>() {
        return v.numpy(py, eval);
    }
    if let Ok(v) = array.extract::<PyRef<'_, PyVector4fC>>() {
        return v.numpy(py, eval);
    }
    Err(BridgeError::rejected(format!(
        "no numpy conversion for {}",
        array.get_type().getattr("__name__")?.extract::<String>()?
    ))
    .into())
}

/// Number of live gradient-tracked leaves.
#[pyfunction]
fn tape_len() -> usize {
    diff::tape_len()
}

/// Drop all gradient-tracked leaves.
#[pyfunction]
fn clear_tape() {
    diff::clear_tape()
}

/// Run reverse-mode differentiation from `result`.
#[pyfunction]
fn backward(result: &PyFloatD) -> PyResult<()> {
    result.backward()
}

/// Whether a CUDA device is available to the array library.
#[pyfunction]
fn cuda_available() -> bool {
    crate::device::cuda_available()
}

/// Initialize structured logging (no-op on repeat calls).
#[pyfunction]
#[pyo3(signature = (level = "info"))]
fn enable_logging(level: &str) -> PyResult<()> {
    let config = LogConfig::new().with_level(level.parse()?);
    init_logging(&config);
    Ok(())
}

#[pymodule]
fn gpu_array_bridge(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyFloatC>()?;
    m.add_class::<PyUInt32C>()?;
    m.add_class::<PyBoolC>()?;
    m.add_class::<PyFloatD>()?;
    m.add_class::<PyVector2fC>()?;
    m.add_class::<PyVector3fC>()?;
    m.add_class::<PyVector4fC>()?;
    m.add_function(wrap_pyfunction!(to_torch, m)?)?;
    m.add_function(wrap_pyfunction!(to_numpy, m)?)?;
    m.add_function(wrap_pyfunction!(tape_len, m)?)?;
    m.add_function(wrap_pyfunction!(clear_tape, m)?)?;
    m.add_function(wrap_pyfunction!(backward, m)?)?;
    m.add_function(wrap_pyfunction!(cuda_available, m)?)?;
    m.add_function(wrap_pyfunction!(enable_logging, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
