//! The unpivoted LU decomposition is such that:
//! $$A = LU,$$
//! where $L$ is a unit lower triangular matrix, and $U$ is an upper triangular matrix.
//!
//! Both factors are stored packed in a single matrix: $U$ in the upper triangle including the
//! diagonal, and the strictly lower part of $L$ below it.

#![warn(rust_2018_idioms)]

use assert2::assert as fancy_assert;
use lakit_core::{ComplexField, MatMut};

/// Reconstructing the inverse of the original matrix from the decomposition.
pub mod inverse;

/// This error signifies that a zero pivot was encountered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LuError {
    /// `U(index, index)` is exactly zero.
    SingularPivot { index: usize },
}

impl core::fmt::Display for LuError {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LuError {}

/// Computes the LU factors of `matrix` without pivoting, and stores them packed in `matrix`.
///
/// # Panics
///
/// Panics if `matrix` is not square.
///
/// # Errors
///
/// Returns [`LuError::SingularPivot`] with the index of the first exactly zero pivot. The
/// columns before that index hold valid factors.
#[track_caller]
pub fn lu_in_place_unpivoted<E: ComplexField>(matrix: MatMut<'_, E>) -> Result<(), LuError> {
    fancy_assert!(matrix.nrows() == matrix.ncols());

    let mut matrix = matrix;
    let n = matrix.nrows();

    for k in 0..n {
        let pivot = matrix.read(k, k);
        if pivot == E::zero() {
            log::debug!(target: "lakit_lu", "zero pivot at index {k}");
            return Err(LuError::SingularPivot { index: k });
        }
        let inv = pivot.inv();
        for i in k + 1..n {
            let l = matrix.read(i, k) * inv;
            matrix.write(i, k, l);
        }
        for j in k + 1..n {
            let u = matrix.read(k, j);
            if u == E::zero() {
                continue;
            }
            for i in k + 1..n {
                let value = matrix.read(i, j) - matrix.read(i, k) * u;
                matrix.write(i, j, value);
            }
        }
    }
    Ok(())
}
