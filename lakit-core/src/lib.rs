//! `lakit` core module.
//!
//! This module contains:
//! - the scalar traits [`ComplexField`] and [`RealField`], tagged by [`ScalarKind`],
//! - definitions of matrix structures ([`MatRef`], [`MatMut`], etc.),
//! - plane rotations ([`jacobi`]), norms ([`norm`]),
//! - small BLAS kernels ([`mul`]) and block reflector application ([`householder`]).

#![warn(rust_2018_idioms)]
#![allow(clippy::too_many_arguments)]

use assert2::assert as fancy_assert;
use core::{
    fmt::Debug,
    marker::PhantomData,
    ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub},
    ptr::NonNull,
};
use dyn_stack::{SizeOverflow, StackReq};
use num_complex::Complex;
use reborrow::*;

pub use dyn_stack;
pub use reborrow;

pub mod householder;
pub mod jacobi;
pub mod mul;
pub mod norm;
pub mod set;

/// Complex floating point number type, where the real and imaginary parts each occupy 32 bits.
#[allow(non_camel_case_types)]
pub type c32 = Complex<f32>;
/// Complex floating point number type, where the real and imaginary parts each occupy 64 bits.
#[allow(non_camel_case_types)]
pub type c64 = Complex<f64>;

/// Indicates whether the corresponding operand should be conjugated or not.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conj {
    /// Do not conjugate
    No,
    /// Do conjugate
    Yes,
}

impl Conj {
    #[inline]
    pub fn compose(self, other: Conj) -> Conj {
        if self == other {
            Conj::No
        } else {
            Conj::Yes
        }
    }
}

/// Side from which an operator is applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    /// Apply from the left: `op(A) * B`.
    Left,
    /// Apply from the right: `B * op(A)`.
    Right,
}

/// Form of `op(A)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    /// `op(A) = A`
    NoTrans,
    /// `op(A) = A^T`
    Trans,
    /// `op(A) = A^H`
    ConjTrans,
}

/// Distinguishes real scalar types from complex ones.
///
/// Algorithms whose control flow depends on the field (block sizes in a real Schur form,
/// normalization of diagonal entries, ...) branch on [`ComplexField::KIND`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Real,
    Complex,
}

/// Trait that describes a complex number field.
///
/// Real numbers can also be seen as complex numbers, where the imaginary part is always zero.
pub trait ComplexField:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + PartialEq
    + Send
    + Sync
    + Debug
    + 'static
{
    type Real: RealField;
    /// Complex type with the same real part type. Equal to `Self` for complex types.
    type Complex: ComplexField<Real = Self::Real>;

    const KIND: ScalarKind;

    /// Returns a complex number whose real part is equal to `real`, and a zero imaginary part.
    fn from_real(real: Self::Real) -> Self;
    /// Returns a number from its real and imaginary parts.
    ///
    /// For real types, the imaginary part is discarded.
    fn from_real_imag(re: Self::Real, im: Self::Real) -> Self;
    /// Converts an `f64` constant into the field.
    fn from_f64(value: f64) -> Self;
    /// Returns the real and imaginary part.
    fn into_real_imag(self) -> (Self::Real, Self::Real);
    /// Returns the real part.
    #[inline(always)]
    fn real(self) -> Self::Real {
        self.into_real_imag().0
    }
    /// Returns the imaginary part.
    #[inline(always)]
    fn imag(self) -> Self::Real {
        self.into_real_imag().1
    }

    /// Embeds the value in the associated complex type.
    #[inline(always)]
    fn into_complex(self) -> Self::Complex {
        let (re, im) = self.into_real_imag();
        Self::Complex::from_real_imag(re, im)
    }
    /// Projects a value of the associated complex type onto `Self`.
    ///
    /// For real types, the imaginary part is discarded.
    #[inline(always)]
    fn from_complex(value: Self::Complex) -> Self {
        let (re, im) = value.into_real_imag();
        Self::from_real_imag(re, im)
    }

    /// Returns the value representing `0.0`.
    fn zero() -> Self;
    /// Returns the value representing `1.0`.
    fn one() -> Self;

    /// Returns the inverse of the number.
    fn inv(self) -> Self;
    /// Returns the conjugate of the number.
    fn conj(self) -> Self;
    /// Returns the square root of the number.
    fn sqrt(self) -> Self;
    /// Returns the modulus of the number.
    fn abs(self) -> Self::Real;

    /// Returns the input, scaled by `factor`.
    #[inline(always)]
    fn scale(self, factor: Self::Real) -> Self {
        self * Self::from_real(factor)
    }
    /// Returns the squared modulus.
    #[inline(always)]
    fn abs2(self) -> Self::Real {
        let (re, im) = self.into_real_imag();
        re * re + im * im
    }
    /// Returns `|re| + |im|`, the cheap magnitude used by deflation criteria.
    #[inline(always)]
    fn abs1(self) -> Self::Real {
        let (re, im) = self.into_real_imag();
        re.abs() + im.abs()
    }

    #[inline(always)]
    fn is_real() -> bool {
        Self::KIND == ScalarKind::Real
    }
}

/// Trait that describes a real number field.
pub trait RealField: ComplexField<Real = Self> + PartialOrd {
    /// Machine epsilon: distance between `1.0` and the next representable number.
    fn epsilon() -> Self;
    /// Smallest positive normalized number.
    fn zero_threshold() -> Self;
    /// Returns `sqrt(self^2 + other^2)` without undue overflow.
    fn hypot(self, other: Self) -> Self;
}

macro_rules! impl_real {
    ($ty: ty, $cplx: ty) => {
        impl ComplexField for $ty {
            type Real = $ty;
            type Complex = $cplx;

            const KIND: ScalarKind = ScalarKind::Real;

            #[inline(always)]
            fn from_real(real: Self::Real) -> Self {
                real
            }
            #[inline(always)]
            fn from_real_imag(re: Self::Real, _im: Self::Real) -> Self {
                re
            }
            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                value as $ty
            }
            #[inline(always)]
            fn into_real_imag(self) -> (Self::Real, Self::Real) {
                (self, 0.0)
            }
            #[inline(always)]
            fn zero() -> Self {
                0.0
            }
            #[inline(always)]
            fn one() -> Self {
                1.0
            }
            #[inline(always)]
            fn inv(self) -> Self {
                1.0 / self
            }
            #[inline(always)]
            fn conj(self) -> Self {
                self
            }
            #[inline(always)]
            fn sqrt(self) -> Self {
                <$ty>::sqrt(self)
            }
            #[inline(always)]
            fn abs(self) -> Self::Real {
                <$ty>::abs(self)
            }
            #[inline(always)]
            fn abs2(self) -> Self::Real {
                self * self
            }
            #[inline(always)]
            fn abs1(self) -> Self::Real {
                <$ty>::abs(self)
            }
        }

        impl RealField for $ty {
            #[inline(always)]
            fn epsilon() -> Self {
                <$ty>::EPSILON
            }
            #[inline(always)]
            fn zero_threshold() -> Self {
                <$ty>::MIN_POSITIVE
            }
            #[inline(always)]
            fn hypot(self, other: Self) -> Self {
                <$ty>::hypot(self, other)
            }
        }
    };
}

macro_rules! impl_complex {
    ($real: ty) => {
        impl ComplexField for Complex<$real> {
            type Real = $real;
            type Complex = Complex<$real>;

            const KIND: ScalarKind = ScalarKind::Complex;

            #[inline(always)]
            fn from_real(real: Self::Real) -> Self {
                Complex::new(real, 0.0)
            }
            #[inline(always)]
            fn from_real_imag(re: Self::Real, im: Self::Real) -> Self {
                Complex::new(re, im)
            }
            #[inline(always)]
            fn from_f64(value: f64) -> Self {
                Complex::new(value as $real, 0.0)
            }
            #[inline(always)]
            fn into_real_imag(self) -> (Self::Real, Self::Real) {
                (self.re, self.im)
            }
            #[inline(always)]
            fn zero() -> Self {
                Complex::new(0.0, 0.0)
            }
            #[inline(always)]
            fn one() -> Self {
                Complex::new(1.0, 0.0)
            }
            #[inline(always)]
            fn inv(self) -> Self {
                Complex::<$real>::inv(&self)
            }
            #[inline(always)]
            fn conj(self) -> Self {
                Complex::<$real>::conj(&self)
            }
            #[inline(always)]
            fn sqrt(self) -> Self {
                Complex::<$real>::sqrt(self)
            }
            #[inline(always)]
            fn abs(self) -> Self::Real {
                <$real>::hypot(self.re, self.im)
            }
        }
    };
}

impl_real!(f32, c32);
impl_real!(f64, c64);
impl_complex!(f32);
impl_complex!(f64);

/// Returns the larger of two values.
#[inline(always)]
pub fn max<T: PartialOrd>(a: T, b: T) -> T {
    if a > b {
        a
    } else {
        b
    }
}

/// Returns the smaller of two values.
#[inline(always)]
pub fn min<T: PartialOrd>(a: T, b: T) -> T {
    if a < b {
        a
    } else {
        b
    }
}

struct MatrixSliceBase<T> {
    ptr: NonNull<T>,
    nrows: usize,
    ncols: usize,
    row_stride: isize,
    col_stride: isize,
}
struct VecSliceBase<T> {
    ptr: NonNull<T>,
    len: usize,
    stride: isize,
}
impl<T> Copy for MatrixSliceBase<T> {}
impl<T> Clone for MatrixSliceBase<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for VecSliceBase<T> {}
impl<T> Clone for VecSliceBase<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

/// Matrix view with general row and column strides.
pub struct MatRef<'a, T> {
    base: MatrixSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable matrix view with general row and column strides.
///
/// Only one mutable view of a given region may be live at a time; sub-views are obtained by
/// reborrowing (`rb_mut`) or by splitting into disjoint parts ([`MatMut::two_rows_mut`],
/// [`MatMut::two_cols_mut`]).
pub struct MatMut<'a, T> {
    base: MatrixSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

/// Row vector view with general column stride.
pub struct RowRef<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable row vector view with general column stride.
pub struct RowMut<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

/// Column vector view with general row stride.
pub struct ColRef<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a T>,
}

/// Mutable column vector view with general row stride.
pub struct ColMut<'a, T> {
    base: VecSliceBase<T>,
    _marker: PhantomData<&'a mut T>,
}

unsafe impl<'a, T: Sync> Sync for MatRef<'a, T> {}
unsafe impl<'a, T: Sync> Send for MatRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for MatMut<'a, T> {}
unsafe impl<'a, T: Send> Send for MatMut<'a, T> {}

unsafe impl<'a, T: Sync> Sync for RowRef<'a, T> {}
unsafe impl<'a, T: Sync> Send for RowRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for RowMut<'a, T> {}
unsafe impl<'a, T: Send> Send for RowMut<'a, T> {}

unsafe impl<'a, T: Sync> Sync for ColRef<'a, T> {}
unsafe impl<'a, T: Sync> Send for ColRef<'a, T> {}
unsafe impl<'a, T: Sync> Sync for ColMut<'a, T> {}
unsafe impl<'a, T: Send> Send for ColMut<'a, T> {}

impl<'a, T> Copy for MatRef<'a, T> {}
impl<'a, T> Copy for RowRef<'a, T> {}
impl<'a, T> Copy for ColRef<'a, T> {}

impl<'a, T> Clone for MatRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Clone for RowRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<'a, T> Clone for ColRef<'a, T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<'b, 'a, T> Reborrow<'b> for MatRef<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for MatRef<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> Reborrow<'b> for MatMut<'a, T> {
    type Target = MatRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        MatRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for MatMut<'a, T> {
    type Target = MatMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        MatMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'b, 'a, T> Reborrow<'b> for RowRef<'a, T> {
    type Target = RowRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> Reborrow<'b> for RowMut<'a, T> {
    type Target = RowRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        RowRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for RowMut<'a, T> {
    type Target = RowMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        RowMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'b, 'a, T> Reborrow<'b> for ColRef<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        *self
    }
}
impl<'b, 'a, T> Reborrow<'b> for ColMut<'a, T> {
    type Target = ColRef<'b, T>;
    #[inline]
    fn rb(&'b self) -> Self::Target {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'b, 'a, T> ReborrowMut<'b> for ColMut<'a, T> {
    type Target = ColMut<'b, T>;
    #[inline]
    fn rb_mut(&'b mut self) -> Self::Target {
        ColMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> IntoConst for MatMut<'a, T> {
    type Target = MatRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        MatRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'a, T> IntoConst for RowMut<'a, T> {
    type Target = RowRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        RowRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}
impl<'a, T> IntoConst for ColMut<'a, T> {
    type Target = ColRef<'a, T>;
    #[inline]
    fn into_const(self) -> Self::Target {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

#[inline(always)]
unsafe fn offset<T>(ptr: NonNull<T>, i: usize, stride: isize) -> *mut T {
    ptr.as_ptr().wrapping_offset(i as isize * stride)
}

impl<'a, T> MatRef<'a, T> {
    /// Returns a matrix slice from the given arguments.
    /// `ptr`: pointer to the first element of the matrix.
    /// `nrows`: number of rows of the matrix.
    /// `ncols`: number of columns of the matrix.
    /// `row_stride`: offset between the first elements of two successive rows in the matrix.
    /// `col_stride`: offset between the first elements of two successive columns in the matrix.
    ///
    /// # Safety
    ///
    /// `ptr` must be non null and properly aligned for type `T`.
    /// For each `i < nrows` and `j < ncols`,
    /// `ptr.offset(i as isize * row_stride + j as isize * col_stride)` must point to a valid
    /// initialized object of type `T`, unless memory pointing to that address is never accessed.
    /// The referenced memory must not be mutated during the lifetime `'a`.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *const T,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: NonNull::new_unchecked(ptr as *mut T),
                nrows,
                ncols,
                row_stride,
                col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Views a column-major slice as an `nrows × ncols` matrix.
    ///
    /// # Example
    ///
    /// ```
    /// use lakit_core::MatRef;
    ///
    /// let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    /// let m = MatRef::from_column_major_slice(&data, 2, 3);
    ///
    /// assert_eq!(m[(1, 0)], 2.0);
    /// assert_eq!(m[(0, 2)], 5.0);
    /// ```
    #[track_caller]
    #[inline]
    pub fn from_column_major_slice(data: &'a [T], nrows: usize, ncols: usize) -> Self {
        fancy_assert!(nrows.checked_mul(ncols) == Some(data.len()));
        unsafe {
            Self::from_raw_parts(
                data.as_ptr(),
                nrows,
                ncols,
                1,
                nrows as isize,
            )
        }
    }

    #[inline]
    pub fn as_ptr(self) -> *const T {
        self.base.ptr.as_ptr()
    }

    /// Returns the number of rows of the matrix.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.nrows
    }

    /// Returns the number of columns of the matrix.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.ncols
    }

    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.row_stride
    }

    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.col_stride
    }

    /// Returns a pointer to the element at position (i, j), without bound checks.
    ///
    /// # Safety
    ///
    /// Requires `i < self.nrows()` and `j < self.ncols()` for the pointer to be dereferenceable.
    #[inline]
    pub unsafe fn ptr_at(self, i: usize, j: usize) -> *const T {
        offset(self.base.ptr, i, self.base.row_stride)
            .wrapping_offset(j as isize * self.base.col_stride)
    }

    /// Returns a reference to the element at position (i, j).
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize, j: usize) -> &'a T {
        fancy_assert!(i < self.nrows());
        fancy_assert!(j < self.ncols());
        unsafe { &*self.ptr_at(i, j) }
    }

    /// Reads the element at position (i, j).
    #[track_caller]
    #[inline]
    pub fn read(&self, i: usize, j: usize) -> T
    where
        T: Copy,
    {
        *(*self).get(i, j)
    }

    /// Returns a view over a submatrix of `self`, starting at position (i, j) with dimensions
    /// `(nrows, ncols)`.
    ///
    /// # Example
    ///
    /// ```
    /// use lakit_core::mat;
    ///
    /// let m = mat![
    ///     [0.0, 3.0, 6.0, 9.0],
    ///     [1.0, 4.0, 7.0, 10.0],
    ///     [2.0, 5.0, 8.0, 11.0],
    /// ];
    /// let sub = m.as_ref().submatrix(1, 2, 2, 2);
    ///
    /// assert_eq!(sub[(0, 0)], 7.0);
    /// assert_eq!(sub[(1, 1)], 11.0);
    /// ```
    #[track_caller]
    #[inline]
    pub fn submatrix(self, i: usize, j: usize, nrows: usize, ncols: usize) -> Self {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(j <= self.ncols());
        fancy_assert!(nrows <= self.nrows() - i);
        fancy_assert!(ncols <= self.ncols() - j);
        unsafe {
            Self::from_raw_parts(
                offset(self.base.ptr, i, self.base.row_stride)
                    .wrapping_offset(j as isize * self.base.col_stride),
                nrows,
                ncols,
                self.base.row_stride,
                self.base.col_stride,
            )
        }
    }

    /// Returns the rows `i..i + nrows`.
    #[track_caller]
    #[inline]
    pub fn subrows(self, i: usize, nrows: usize) -> Self {
        let ncols = self.ncols();
        self.submatrix(i, 0, nrows, ncols)
    }

    /// Returns the columns `j..j + ncols`.
    #[track_caller]
    #[inline]
    pub fn subcols(self, j: usize, ncols: usize) -> Self {
        let nrows = self.nrows();
        self.submatrix(0, j, nrows, ncols)
    }

    #[track_caller]
    #[inline]
    pub fn row(self, i: usize) -> RowRef<'a, T> {
        fancy_assert!(i < self.nrows());
        RowRef {
            base: VecSliceBase {
                ptr: unsafe { NonNull::new_unchecked(offset(self.base.ptr, i, self.base.row_stride)) },
                len: self.ncols(),
                stride: self.col_stride(),
            },
            _marker: PhantomData,
        }
    }

    #[track_caller]
    #[inline]
    pub fn col(self, j: usize) -> ColRef<'a, T> {
        fancy_assert!(j < self.ncols());
        ColRef {
            base: VecSliceBase {
                ptr: unsafe { NonNull::new_unchecked(offset(self.base.ptr, j, self.base.col_stride)) },
                len: self.nrows(),
                stride: self.row_stride(),
            },
            _marker: PhantomData,
        }
    }

    /// Returns the transpose of `self`.
    #[inline]
    pub fn transpose(self) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: self.base.ptr,
                nrows: self.base.ncols,
                ncols: self.base.nrows,
                row_stride: self.base.col_stride,
                col_stride: self.base.row_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Returns an owned copy of the view.
    #[inline]
    pub fn to_owned(self) -> Mat<T>
    where
        T: Copy,
    {
        Mat::with_dims(self.nrows(), self.ncols(), |i, j| self.read(i, j))
    }

    /// Returns an owned copy of the conjugate transpose of the view.
    #[inline]
    pub fn adjoint_to_owned(self) -> Mat<T>
    where
        T: ComplexField,
    {
        Mat::with_dims(self.ncols(), self.nrows(), |i, j| self.read(j, i).conj())
    }

    #[doc(hidden)]
    #[inline]
    pub unsafe fn const_cast(self) -> MatMut<'a, T> {
        MatMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> MatMut<'a, T> {
    /// Returns a mutable matrix slice from the given arguments.
    ///
    /// # Safety
    ///
    /// Same as [`MatRef::from_raw_parts`], and additionally the referenced memory must not be
    /// accessed through any other pointer during the lifetime `'a`, and two distinct
    /// positions `(i, j)` must never refer to the same address.
    #[inline]
    pub unsafe fn from_raw_parts(
        ptr: *mut T,
        nrows: usize,
        ncols: usize,
        row_stride: isize,
        col_stride: isize,
    ) -> Self {
        Self {
            base: MatrixSliceBase {
                ptr: NonNull::new_unchecked(ptr),
                nrows,
                ncols,
                row_stride,
                col_stride,
            },
            _marker: PhantomData,
        }
    }

    /// Views a mutable column-major slice as an `nrows × ncols` matrix.
    #[track_caller]
    #[inline]
    pub fn from_column_major_slice_mut(data: &'a mut [T], nrows: usize, ncols: usize) -> Self {
        fancy_assert!(nrows.checked_mul(ncols) == Some(data.len()));
        unsafe {
            Self::from_raw_parts(
                data.as_mut_ptr(),
                nrows,
                ncols,
                1,
                nrows as isize,
            )
        }
    }

    #[inline]
    pub fn as_ptr(self) -> *mut T {
        self.base.ptr.as_ptr()
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.ncols
    }

    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.row_stride
    }

    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.col_stride
    }

    /// Returns a mutable reference to the element at position (i, j).
    #[track_caller]
    #[inline]
    pub fn get(self, i: usize, j: usize) -> &'a mut T {
        fancy_assert!(i < self.nrows());
        fancy_assert!(j < self.ncols());
        unsafe { &mut *(self.into_const().ptr_at(i, j) as *mut T) }
    }

    /// Reads the element at position (i, j).
    #[track_caller]
    #[inline]
    pub fn read(&self, i: usize, j: usize) -> T
    where
        T: Copy,
    {
        self.rb().read(i, j)
    }

    /// Writes `value` to the position (i, j).
    #[track_caller]
    #[inline]
    pub fn write(&mut self, i: usize, j: usize, value: T) {
        *self.rb_mut().get(i, j) = value;
    }

    #[track_caller]
    #[inline]
    pub fn submatrix(self, i: usize, j: usize, nrows: usize, ncols: usize) -> Self {
        unsafe { self.into_const().submatrix(i, j, nrows, ncols).const_cast() }
    }

    #[track_caller]
    #[inline]
    pub fn subrows(self, i: usize, nrows: usize) -> Self {
        unsafe { self.into_const().subrows(i, nrows).const_cast() }
    }

    #[track_caller]
    #[inline]
    pub fn subcols(self, j: usize, ncols: usize) -> Self {
        unsafe { self.into_const().subcols(j, ncols).const_cast() }
    }

    #[track_caller]
    #[inline]
    pub fn row(self, i: usize) -> RowMut<'a, T> {
        let row = self.into_const().row(i);
        RowMut {
            base: row.base,
            _marker: PhantomData,
        }
    }

    #[track_caller]
    #[inline]
    pub fn col(self, j: usize) -> ColMut<'a, T> {
        let col = self.into_const().col(j);
        ColMut {
            base: col.base,
            _marker: PhantomData,
        }
    }

    /// Splits two distinct rows into independent mutable views.
    #[track_caller]
    #[inline]
    pub fn two_rows_mut(self, i0: usize, i1: usize) -> (RowMut<'a, T>, RowMut<'a, T>) {
        fancy_assert!(i0 != i1);
        let this = self.into_const();
        unsafe { (this.row(i0).const_cast(), this.row(i1).const_cast()) }
    }

    /// Splits two distinct columns into independent mutable views.
    #[track_caller]
    #[inline]
    pub fn two_cols_mut(self, j0: usize, j1: usize) -> (ColMut<'a, T>, ColMut<'a, T>) {
        fancy_assert!(j0 != j1);
        let this = self.into_const();
        unsafe { (this.col(j0).const_cast(), this.col(j1).const_cast()) }
    }

    #[inline]
    pub fn transpose(self) -> Self {
        unsafe { self.into_const().transpose().const_cast() }
    }

    /// Copies the values of `src` into `self`.
    #[track_caller]
    pub fn copy_from(&mut self, src: MatRef<'_, T>)
    where
        T: Copy,
    {
        fancy_assert!(self.nrows() == src.nrows());
        fancy_assert!(self.ncols() == src.ncols());
        for j in 0..self.ncols() {
            for i in 0..self.nrows() {
                self.write(i, j, src.read(i, j));
            }
        }
    }
}

impl<'a, T> RowRef<'a, T> {
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.len
    }

    #[inline]
    pub fn col_stride(&self) -> isize {
        self.base.stride
    }

    #[track_caller]
    #[inline]
    pub fn get(self, j: usize) -> &'a T {
        fancy_assert!(j < self.ncols());
        unsafe { &*offset(self.base.ptr, j, self.base.stride) }
    }

    #[track_caller]
    #[inline]
    pub fn read(&self, j: usize) -> T
    where
        T: Copy,
    {
        *(*self).get(j)
    }

    #[track_caller]
    #[inline]
    pub fn subcols(self, j: usize, ncols: usize) -> Self {
        fancy_assert!(j <= self.ncols());
        fancy_assert!(ncols <= self.ncols() - j);
        Self {
            base: VecSliceBase {
                ptr: unsafe { NonNull::new_unchecked(offset(self.base.ptr, j, self.base.stride)) },
                len: ncols,
                stride: self.base.stride,
            },
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn transpose(self) -> ColRef<'a, T> {
        ColRef {
            base: self.base,
            _marker: PhantomData,
        }
    }

    #[doc(hidden)]
    #[inline]
    pub unsafe fn const_cast(self) -> RowMut<'a, T> {
        RowMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> RowMut<'a, T> {
    #[inline]
    pub fn ncols(&self) -> usize {
        self.base.len
    }

    #[track_caller]
    #[inline]
    pub fn get(self, j: usize) -> &'a mut T {
        fancy_assert!(j < self.ncols());
        unsafe { &mut *offset(self.base.ptr, j, self.base.stride) }
    }

    #[track_caller]
    #[inline]
    pub fn read(&self, j: usize) -> T
    where
        T: Copy,
    {
        self.rb().read(j)
    }

    #[track_caller]
    #[inline]
    pub fn write(&mut self, j: usize, value: T) {
        *self.rb_mut().get(j) = value;
    }

    #[track_caller]
    #[inline]
    pub fn subcols(self, j: usize, ncols: usize) -> Self {
        unsafe { self.into_const().subcols(j, ncols).const_cast() }
    }

    #[inline]
    pub fn transpose(self) -> ColMut<'a, T> {
        ColMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> ColRef<'a, T> {
    /// Views a slice as a column vector.
    #[inline]
    pub fn from_slice(data: &'a [T]) -> Self {
        Self {
            base: VecSliceBase {
                ptr: unsafe { NonNull::new_unchecked(data.as_ptr() as *mut T) },
                len: data.len(),
                stride: 1,
            },
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    #[inline]
    pub fn row_stride(&self) -> isize {
        self.base.stride
    }

    #[track_caller]
    #[inline]
    pub fn get(self, i: usize) -> &'a T {
        fancy_assert!(i < self.nrows());
        unsafe { &*offset(self.base.ptr, i, self.base.stride) }
    }

    #[track_caller]
    #[inline]
    pub fn read(&self, i: usize) -> T
    where
        T: Copy,
    {
        *(*self).get(i)
    }

    #[track_caller]
    #[inline]
    pub fn subrows(self, i: usize, nrows: usize) -> Self {
        fancy_assert!(i <= self.nrows());
        fancy_assert!(nrows <= self.nrows() - i);
        Self {
            base: VecSliceBase {
                ptr: unsafe { NonNull::new_unchecked(offset(self.base.ptr, i, self.base.stride)) },
                len: nrows,
                stride: self.base.stride,
            },
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn transpose(self) -> RowRef<'a, T> {
        RowRef {
            base: self.base,
            _marker: PhantomData,
        }
    }

    #[doc(hidden)]
    #[inline]
    pub unsafe fn const_cast(self) -> ColMut<'a, T> {
        ColMut {
            base: self.base,
            _marker: PhantomData,
        }
    }
}

impl<'a, T> ColMut<'a, T> {
    /// Views a mutable slice as a column vector.
    #[inline]
    pub fn from_slice_mut(data: &'a mut [T]) -> Self {
        Self {
            base: VecSliceBase {
                ptr: unsafe { NonNull::new_unchecked(data.as_mut_ptr()) },
                len: data.len(),
                stride: 1,
            },
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.base.len
    }

    #[track_caller]
    #[inline]
    pub fn get(self, i: usize) -> &'a mut T {
        fancy_assert!(i < self.nrows());
        unsafe { &mut *offset(self.base.ptr, i, self.base.stride) }
    }

    #[track_caller]
    #[inline]
    pub fn read(&self, i: usize) -> T
    where
        T: Copy,
    {
        self.rb().read(i)
    }

    #[track_caller]
    #[inline]
    pub fn write(&mut self, i: usize, value: T) {
        *self.rb_mut().get(i) = value;
    }

    #[track_caller]
    #[inline]
    pub fn subrows(self, i: usize, nrows: usize) -> Self {
        unsafe { self.into_const().subrows(i, nrows).const_cast() }
    }

    #[inline]
    pub fn transpose(self) -> RowMut<'a, T> {
        RowMut {
            base: self.base,
            _marker: PhantomData,
        }
    }

    /// Copies the values of `src` into `self`.
    #[track_caller]
    pub fn copy_from(&mut self, src: ColRef<'_, T>)
    where
        T: Copy,
    {
        fancy_assert!(self.nrows() == src.nrows());
        for i in 0..self.nrows() {
            self.write(i, src.read(i));
        }
    }
}

impl<'a, T> Index<(usize, usize)> for MatRef<'a, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        self.rb().get(i, j)
    }
}
impl<'a, T> Index<(usize, usize)> for MatMut<'a, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        self.rb().get(i, j)
    }
}
impl<'a, T> IndexMut<(usize, usize)> for MatMut<'a, T> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        self.rb_mut().get(i, j)
    }
}
impl<'a, T> Index<usize> for ColRef<'a, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, i: usize) -> &Self::Output {
        self.rb().get(i)
    }
}
impl<'a, T> Index<usize> for ColMut<'a, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, i: usize) -> &Self::Output {
        self.rb().get(i)
    }
}
impl<'a, T> IndexMut<usize> for ColMut<'a, T> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        self.rb_mut().get(i)
    }
}
impl<'a, T> Index<usize> for RowRef<'a, T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, j: usize) -> &Self::Output {
        self.rb().get(j)
    }
}

impl<'a, T: Debug> Debug for MatRef<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        struct DebugRow<'a, T>(RowRef<'a, T>);
        impl<'a, T: Debug> Debug for DebugRow<'a, T> {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.debug_list()
                    .entries((0..self.0.ncols()).map(|j| self.0.get(j)))
                    .finish()
            }
        }
        f.debug_list()
            .entries((0..self.nrows()).map(|i| DebugRow(self.row(i))))
            .finish()
    }
}
impl<'a, T: Debug> Debug for MatMut<'a, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.rb().fmt(f)
    }
}

/// Heap allocated column-major matrix.
#[derive(Clone, PartialEq)]
pub struct Mat<T> {
    data: Vec<T>,
    nrows: usize,
    ncols: usize,
}

impl<T> Mat<T> {
    /// Returns a new matrix with dimensions `(nrows, ncols)`, filled with the provided function.
    ///
    /// # Example
    ///
    /// ```
    /// use lakit_core::Mat;
    ///
    /// let m = Mat::with_dims(3, 4, |i, j| i as f64 + j as f64);
    ///
    /// assert_eq!(m.read(0, 0), 0.0);
    /// assert_eq!(m.read(2, 3), 5.0);
    /// ```
    pub fn with_dims(nrows: usize, ncols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for j in 0..ncols {
            for i in 0..nrows {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, T> {
        MatRef::from_column_major_slice(&self.data, self.nrows, self.ncols)
    }

    #[inline]
    pub fn as_mut(&mut self) -> MatMut<'_, T> {
        MatMut::from_column_major_slice_mut(&mut self.data, self.nrows, self.ncols)
    }

    #[inline]
    pub fn transpose(&self) -> MatRef<'_, T> {
        self.as_ref().transpose()
    }

    #[track_caller]
    #[inline]
    pub fn read(&self, i: usize, j: usize) -> T
    where
        T: Copy,
    {
        self.as_ref().read(i, j)
    }

    #[track_caller]
    #[inline]
    pub fn write(&mut self, i: usize, j: usize, value: T) {
        self.as_mut().write(i, j, value)
    }
}

impl<T: ComplexField> Mat<T> {
    /// Returns a new matrix with dimensions `(nrows, ncols)`, filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self::with_dims(nrows, ncols, |_, _| T::zero())
    }

    /// Returns the `n × n` identity matrix.
    pub fn identity(n: usize) -> Self {
        Self::with_dims(n, n, |i, j| if i == j { T::one() } else { T::zero() })
    }

    #[inline]
    pub fn adjoint(&self) -> Self {
        self.as_ref().adjoint_to_owned()
    }
}

impl<T> Index<(usize, usize)> for Mat<T> {
    type Output = T;

    #[track_caller]
    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &Self::Output {
        self.as_ref().get(i, j)
    }
}
impl<T> IndexMut<(usize, usize)> for Mat<T> {
    #[track_caller]
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Self::Output {
        self.as_mut().get(i, j)
    }
}

impl<T: Debug> Debug for Mat<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl<'a, 'b, T: ComplexField> Mul<MatRef<'b, T>> for MatRef<'a, T> {
    type Output = Mat<T>;

    #[track_caller]
    fn mul(self, rhs: MatRef<'b, T>) -> Self::Output {
        let mut out = Mat::zeros(self.nrows(), rhs.ncols());
        mul::matmul(out.as_mut(), self, Conj::No, rhs, Conj::No, None, T::one());
        out
    }
}
impl<'a, 'b, T: ComplexField> Mul<&'b Mat<T>> for &'a Mat<T> {
    type Output = Mat<T>;

    #[track_caller]
    fn mul(self, rhs: &'b Mat<T>) -> Self::Output {
        self.as_ref() * rhs.as_ref()
    }
}
impl<'b, T: ComplexField> Mul<&'b Mat<T>> for Mat<T> {
    type Output = Mat<T>;

    #[track_caller]
    fn mul(self, rhs: &'b Mat<T>) -> Self::Output {
        self.as_ref() * rhs.as_ref()
    }
}
impl<'b, T: ComplexField> Mul<MatRef<'b, T>> for Mat<T> {
    type Output = Mat<T>;

    #[track_caller]
    fn mul(self, rhs: MatRef<'b, T>) -> Self::Output {
        self.as_ref() * rhs
    }
}
impl<'a, 'b, T: ComplexField> Mul<MatRef<'b, T>> for &'a Mat<T> {
    type Output = Mat<T>;

    #[track_caller]
    fn mul(self, rhs: MatRef<'b, T>) -> Self::Output {
        self.as_ref() * rhs
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __perf_warn {
    ($name: ident) => {{
        #[inline(always)]
        #[allow(non_snake_case)]
        fn $name() -> &'static ::core::sync::atomic::AtomicBool {
            static $name: ::core::sync::atomic::AtomicBool =
                ::core::sync::atomic::AtomicBool::new(false);
            &$name
        }
        ::core::matches!(
            $name().compare_exchange(
                false,
                true,
                ::core::sync::atomic::Ordering::Relaxed,
                ::core::sync::atomic::Ordering::Relaxed,
            ),
            Ok(_)
        )
    }};
}

/// Returns a [`Mat`] containing the arguments, given row by row.
///
/// # Example
///
/// ```
/// use lakit_core::mat;
///
/// let m = mat![
///     [0.0, 3.0, 6.0],
///     [1.0, 4.0, 7.0],
/// ];
///
/// assert_eq!(m[(0, 0)], 0.0);
/// assert_eq!(m[(1, 0)], 1.0);
/// assert_eq!(m[(1, 2)], 7.0);
/// ```
#[macro_export]
macro_rules! mat {
    () => {
        {
            compile_error!("number of columns in the matrix is ambiguous");
        }
    };

    ($([$($v:expr),* $(,)?] ),* $(,)?) => {
        {
            let rows = [$([$($v),*]),*];
            let nrows = rows.len();
            let ncols = rows[0].len();
            $crate::Mat::with_dims(nrows, ncols, |i, j| rows[i][j])
        }
    };
}

/// Creates a temporary matrix of zeroed values, from the given memory stack.
#[macro_export]
macro_rules! temp_mat_zeroed {
    {
        $(
            let ($id: pat, $stack_id: pat) = temp_mat_zeroed::<$ty: ty>(
                $nrows: expr,
                $ncols: expr,
                $stack: expr$(,)?
            );
        )*
    } => {
        $(
            let nrows: usize = $nrows;
            let ncols: usize = $ncols;
            let (mut temp_data, $stack_id) = $stack.make_with(
                nrows * ncols,
                |_| <$ty as $crate::ComplexField>::zero(),
            );
            let $id = $crate::MatMut::<'_, $ty>::from_column_major_slice_mut(
                &mut temp_data[..],
                nrows,
                ncols,
            );
        )*
    };
}

/// Returns the stack requirements for creating a temporary matrix with the given dimensions.
#[inline]
pub fn temp_mat_req<T: 'static>(nrows: usize, ncols: usize) -> Result<StackReq, SizeOverflow> {
    StackReq::try_new::<T>(nrows.checked_mul(ncols).ok_or(SizeOverflow)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;

    #[test]
    fn basic_views() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = MatRef::from_column_major_slice(&data, 2, 3);

        assert!(m.read(0, 0) == 1.0);
        assert!(m.read(1, 0) == 2.0);
        assert!(m.read(0, 1) == 3.0);
        assert!(m.read(1, 2) == 6.0);

        let t = m.transpose();
        assert!(t.nrows() == 3);
        assert!(t.read(2, 1) == 6.0);

        let sub = m.submatrix(0, 1, 2, 2);
        assert!(sub.read(1, 1) == 6.0);
        assert!(sub.col(0).read(1) == 4.0);
        assert!(sub.row(0).read(1) == 5.0);
    }

    #[test]
    fn two_rows_and_cols() {
        let mut m = mat![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];

        {
            let (mut x, mut y) = m.as_mut().two_rows_mut(0, 2);
            let tmp = x.read(1);
            x.write(1, y.read(1));
            y.write(1, tmp);
        }
        assert!(m.read(0, 1) == 8.0);
        assert!(m.read(2, 1) == 2.0);

        {
            let (x, y) = m.as_mut().subrows(1, 2).two_cols_mut(2, 0);
            *x.get(0) += *y.get(0);
        }
        assert!(m.read(1, 2) == 10.0);
        assert!(m.read(0, 2) == 3.0);
    }

    #[test]
    fn complex_scalar_kind() {
        let z = c64::new(3.0, -4.0);
        assert!(z.abs() == 5.0);
        assert!(z.abs1() == 7.0);
        assert!(z.conj() == c64::new(3.0, 4.0));
        assert!(<c64 as ComplexField>::KIND == ScalarKind::Complex);
        assert!(<f64 as ComplexField>::KIND == ScalarKind::Real);
        assert!(<f64 as ComplexField>::from_complex(z) == 3.0);
        assert!(2.0f64.into_complex() == c64::new(2.0, 0.0));
    }

    #[test]
    fn product_and_adjoint() {
        let a = mat![[1.0f64, 2.0], [3.0, 4.0]];
        let b = mat![[0.0f64, 1.0], [1.0, 0.0]];
        let c = &a * &b;
        assert!(c == mat![[2.0f64, 1.0], [4.0, 3.0]]);

        let z = mat![[c64::new(1.0, 1.0), c64::new(0.0, 2.0)]];
        let zh = z.adjoint();
        assert!(zh.nrows() == 2);
        assert!(zh.read(1, 0) == c64::new(0.0, -2.0));
    }
}
