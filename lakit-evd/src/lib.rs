//! The generalized Schur decomposition of a square matrix pencil $(A, B)$ of shape $(n, n)$ is a
//! decomposition into four components $Q$, $S$, $T$, $Z$:
//!
//! - $Q$ and $Z$ have shape $(n, n)$ and are unitary,
//! - $S$ is upper triangular (complex data), or quasi upper triangular with 2×2 diagonal blocks
//!   for complex conjugate pairs of eigenvalues (real data),
//! - $T$ is upper triangular,
//! - and finally:
//!
//! $$A = Q S Z^H,\quad B = Q T Z^H.$$
//!
//! The generalized eigenvalues are the ratios of the diagonal blocks of $S$ and $T$. They are
//! returned as pairs $(\alpha, \beta)$, where $\beta = 0$ denotes an infinite eigenvalue.

#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![warn(rust_2018_idioms)]

use assert2::assert;
use lakit_core::{
    set::{laset, MatrixStructure},
    ColMut, ComplexField, MatMut,
};
use reborrow::*;

pub mod gen_hessenberg;
pub mod qz;
pub mod schur;

/// Failures of the generalized Schur algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchurError {
    /// The QZ iteration exhausted its iteration budget. The eigenvalues with indices in
    /// `last_valid_index..ihi` have been computed.
    NonConverged { last_valid_index: usize },
    /// Two adjacent diagonal blocks were too close to be swapped stably. `stopped_at` is the row
    /// where the moved block starts.
    SwapFailed { stopped_at: usize },
}

impl core::fmt::Display for SchurError {
    #[inline]
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self, f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchurError {}

/// Tuning parameters of the QZ iteration.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct QzParams {
    /// Number of sweeps without deflation after which an exceptional shift is used.
    pub non_convergence_limit: usize,
    /// The iteration budget is this value times `max(10, ihi - ilo)`.
    pub iterations_per_eigenvalue: usize,
}

impl Default for QzParams {
    fn default() -> Self {
        Self {
            non_convergence_limit: 10,
            iterations_per_eigenvalue: 30,
        }
    }
}

/// Computes the generalized Schur decomposition of the pencil `(a, b)`.
///
/// On output, `a` and `b` are overwritten by $S$ and $T$. If `q` (resp. `z`) is provided, it is
/// overwritten by $Q$ (resp. $Z$). The generalized eigenvalues are stored as
/// `alpha[i] / beta[i]`.
///
/// # Panics
///
/// Panics if the dimensions of the matrices and vectors do not match.
///
/// # Errors
///
/// Returns [`SchurError::NonConverged`] if the QZ iteration did not converge, see [`qz::lahqz`].
#[track_caller]
pub fn compute_generalized_schur<E: ComplexField>(
    a: MatMut<'_, E>,
    b: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
    z: Option<MatMut<'_, E>>,
    alpha: ColMut<'_, E::Complex>,
    beta: ColMut<'_, E>,
    epsilon: E::Real,
    zero_threshold: E::Real,
    params: QzParams,
) -> Result<(), SchurError> {
    let n = a.nrows();
    assert!(a.ncols() == n);
    assert!(b.nrows() == n);
    assert!(b.ncols() == n);

    if a.row_stride().unsigned_abs() != 1 && lakit_core::__perf_warn!(QZ_WARN) {
        if a.col_stride().unsigned_abs() == 1 {
            log::warn!(target: "lakit_perf", "QZ prefers column-major matrix. Found row-major matrix.");
        } else {
            log::warn!(target: "lakit_perf", "QZ prefers column-major matrix. Found matrix with generic strides.");
        }
    }

    let mut a = a;
    let mut b = b;
    let mut q = q;
    let mut z = z;

    if let Some(q) = q.rb_mut() {
        laset(MatrixStructure::General, E::zero(), E::one(), q);
    }
    if let Some(z) = z.rb_mut() {
        laset(MatrixStructure::General, E::zero(), E::one(), z);
    }

    gen_hessenberg::triangularize_b(a.rb_mut(), b.rb_mut(), q.rb_mut());
    gen_hessenberg::generalized_hessenberg(a.rb_mut(), b.rb_mut(), q.rb_mut(), z.rb_mut());

    log::trace!(target: "lakit_evd", "pencil of dimension {n} reduced to hessenberg-triangular form");

    qz::lahqz(
        true,
        a,
        b,
        q,
        z,
        alpha,
        beta,
        0,
        n,
        epsilon,
        zero_threshold,
        params,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use lakit_core::{c64, Mat, RealField};
    use rand::random;

    fn assert_close<E: ComplexField>(lhs: &Mat<E>, rhs: &Mat<E>, tol: f64) {
        for j in 0..lhs.ncols() {
            for i in 0..lhs.nrows() {
                assert!((lhs.read(i, j) - rhs.read(i, j)).abs() < E::Real::from_f64(tol));
            }
        }
    }

    fn schur<E: ComplexField>(
        a0: &Mat<E>,
        b0: &Mat<E>,
    ) -> (Mat<E>, Mat<E>, Mat<E>, Mat<E>, Vec<E::Complex>, Vec<E>) {
        let n = a0.nrows();
        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut q = Mat::zeros(n, n);
        let mut z = Mat::zeros(n, n);
        let mut alpha = vec![E::Complex::zero(); n];
        let mut beta = vec![E::zero(); n];

        compute_generalized_schur(
            a.as_mut(),
            b.as_mut(),
            Some(q.as_mut()),
            Some(z.as_mut()),
            ColMut::from_slice_mut(&mut alpha),
            ColMut::from_slice_mut(&mut beta),
            E::Real::epsilon(),
            E::Real::zero_threshold(),
            QzParams::default(),
        )
        .unwrap();

        (a, b, q, z, alpha, beta)
    }

    fn eigenvalues(alpha: &[c64], beta: &[f64]) -> Vec<c64> {
        alpha.iter().zip(beta.iter()).map(|(a, b)| a / b).collect()
    }

    fn assert_same_set(lhs: &[c64], rhs: &[c64]) {
        assert!(lhs.len() == rhs.len());
        let mut used = vec![false; rhs.len()];
        for x in lhs {
            let mut best = None;
            for (k, y) in rhs.iter().enumerate() {
                if used[k] {
                    continue;
                }
                let dist = (x - y).norm() / (1.0 + x.norm());
                if best.map_or(true, |(_, d)| dist < d) {
                    best = Some((k, dist));
                }
            }
            let (k, dist) = best.unwrap();
            assert!(dist < 1e-6);
            used[k] = true;
        }
    }

    #[test]
    fn test_driver_real() {
        for n in [1, 2, 3, 6, 15, 30] {
            let a0 = Mat::with_dims(n, n, |_, _| random::<f64>() - 0.5);
            let b0 = Mat::with_dims(n, n, |_, _| random::<f64>() - 0.5);
            let (s, t, q, z, _, beta) = schur(&a0, &b0);

            assert_close(&(&q * &s * &z.adjoint()), &a0, 1e-10);
            assert_close(&(&q * &t * &z.adjoint()), &b0, 1e-10);
            assert_close(&(q.adjoint() * &q), &Mat::identity(n), 1e-10);
            assert_close(&(z.adjoint() * &z), &Mat::identity(n), 1e-10);

            for j in 0..n {
                for i in j + 1..n {
                    assert!(t.read(i, j) == 0.0);
                }
                for i in j + 2..n {
                    assert!(s.read(i, j) == 0.0);
                }
            }
            for i in 0..n {
                assert!(beta[i] >= 0.0);
            }
        }
    }

    #[test]
    fn test_driver_similarity_invariance() {
        let n = 10;
        let a0 = Mat::with_dims(n, n, |_, _| random::<f64>() - 0.5);
        let b0 = Mat::with_dims(n, n, |_, _| random::<f64>() - 0.5);

        // random orthogonal matrices from the schur vectors of an unrelated pencil
        let (_, _, u, v, _, _) = schur(
            &Mat::with_dims(n, n, |_, _| random::<f64>()),
            &Mat::with_dims(n, n, |_, _| random::<f64>()),
        );

        let a1 = &u * &a0 * v.as_ref();
        let b1 = &u * &b0 * v.as_ref();

        let (_, _, _, _, alpha0, beta0) = schur(&a0, &b0);
        let (_, _, _, _, alpha1, beta1) = schur(&a1, &b1);

        assert_same_set(
            &eigenvalues(&alpha0, &beta0),
            &eigenvalues(&alpha1, &beta1),
        );
    }

    #[test]
    fn test_driver_cplx() {
        let n = 12;
        let a0 = Mat::with_dims(n, n, |_, _| c64::new(random(), random()));
        let b0 = Mat::with_dims(n, n, |_, _| c64::new(random(), random()));
        let (s, t, q, z, alpha, beta) = schur(&a0, &b0);

        assert_close(&(&q * &s * &z.adjoint()), &a0, 1e-10);
        assert_close(&(&q * &t * &z.adjoint()), &b0, 1e-10);

        for j in 0..n {
            for i in j + 1..n {
                assert!(s.read(i, j) == c64::new(0.0, 0.0));
                assert!(t.read(i, j) == c64::new(0.0, 0.0));
            }
            assert!(t.read(j, j).im == 0.0);
            assert!(alpha[j] == s.read(j, j));
            assert!(beta[j] == t.read(j, j));
        }
    }

    #[test]
    fn test_driver_singular_b() {
        // B has rank n - 2, so the pencil has two infinite eigenvalues
        let n = 5;
        let a0 = Mat::with_dims(n, n, |_, _| random::<f64>() - 0.5);
        let mut b0 = Mat::with_dims(n, n, |_, _| random::<f64>() - 0.5);
        for i in 0..n {
            b0.write(i, 3, b0.read(i, 0) + b0.read(i, 1));
            b0.write(i, 4, b0.read(i, 2) - b0.read(i, 0));
        }
        let (_, t, _, _, alpha, beta) = schur(&a0, &b0);

        // infinite, or huge because of rounding
        let infinite = (0..n)
            .filter(|&i| alpha[i].norm() > 1e8 * beta[i].abs())
            .count();
        assert!(infinite == 2);
        for i in 0..n {
            if beta[i] == 0.0 {
                assert!(alpha[i].norm() > 0.0);
                assert!(t.read(i, i) == 0.0);
            }
        }
    }

    #[test]
    fn test_error_display() {
        let err = SchurError::SwapFailed { stopped_at: 3 };
        assert!(format!("{err}") == "SwapFailed { stopped_at: 3 }");
        let params = QzParams::default();
        assert!(params.non_convergence_limit == 10);
        assert!(params.iterations_per_eigenvalue == 30);
    }
}
