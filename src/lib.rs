//! `lakit` provides dense kernels for the generalized eigenvalue problem
//! $$A x = \lambda B x,$$
//! centered on the QZ iteration, together with the low-level building blocks it relies on.
//!
//! The functionality is split across the member crates, which are re-exported here:
//! - [`lakit_core`]: scalar traits, strided matrix views, plane rotations, norms, and small BLAS
//! kernels (matrix products, triangular products, block Householder application),
//! - [`lakit_lu`]: unpivoted LU factorization, and matrix inversion from the LU factors,
//! - [`lakit_evd`]: Hessenberg-triangular reduction, the QZ iteration, and reordering of Schur
//! forms.
//!
//! # Generalized Schur decomposition
//! [`compute_generalized_schur`] decomposes a square pencil $(A, B)$ such that
//! $$A = Q S Z^H,\quad B = Q T Z^H,$$
//! where $Q$ and $Z$ are unitary, $T$ is upper triangular, and $S$ is upper triangular for
//! complex data, or quasi upper triangular for real data.
//!
//! ## Example
//! ```
//! use lakit::{c64, compute_generalized_schur, mat, ColMut, Mat, QzParams};
//!
//! let mut a = mat![[1.0f64, 2.0], [3.0, 4.0f64]];
//! let mut b = mat![[2.0f64, 0.0], [0.0, 1.0f64]];
//! let mut q = Mat::<f64>::zeros(2, 2);
//! let mut z = Mat::<f64>::zeros(2, 2);
//! let mut alpha = vec![c64::new(0.0, 0.0); 2];
//! let mut beta = vec![0.0; 2];
//!
//! compute_generalized_schur(
//!     a.as_mut(),
//!     b.as_mut(),
//!     Some(q.as_mut()),
//!     Some(z.as_mut()),
//!     ColMut::from_slice_mut(&mut alpha),
//!     ColMut::from_slice_mut(&mut beta),
//!     f64::EPSILON,
//!     f64::MIN_POSITIVE,
//!     QzParams::default(),
//! )
//! .unwrap();
//!
//! // det(A - lambda B) = 2 lambda^2 - 9 lambda - 2
//! for (alpha, beta) in alpha.iter().zip(beta.iter()) {
//!     let lambda = alpha.re / beta;
//!     assert!((2.0 * lambda * lambda - 9.0 * lambda - 2.0).abs() < 1e-10);
//! }
//! ```
//!
//! # Reordering
//! [`schur::schur_move`] moves a diagonal block of a (standard) Schur form to another position,
//! with a sequence of swaps of adjacent blocks.

#![warn(rust_2018_idioms)]

pub use lakit_core;
pub use lakit_evd;
pub use lakit_lu;

pub use lakit_core::{
    c32, c64, mat, ColMut, ColRef, ComplexField, Mat, MatMut, MatRef, RealField, RowMut, RowRef,
};
pub use lakit_evd::{compute_generalized_schur, gen_hessenberg, qz, schur, QzParams, SchurError};
