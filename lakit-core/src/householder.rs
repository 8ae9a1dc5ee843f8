//! Block Householder reflectors.
//!
//! A block reflector is `H = I - V T V^H`, where `V` holds `k` elementary reflectors and `T` is
//! the `k × k` triangular factor. `V` is stored either columnwise (`dim × k`) or rowwise
//! (`k × dim`), and the reflectors are numbered forward (`H = H_1 ... H_k`, `T` upper
//! triangular) or backward (`H = H_k ... H_1`, `T` lower triangular).

use crate::{
    mul::{
        matmul,
        triangular::{self, BlockStructure},
    },
    temp_mat_req, temp_mat_zeroed, ComplexField, Conj, MatMut, MatRef, Op, Side,
};

use assert2::assert as fancy_assert;
use dyn_stack::{DynStack, SizeOverflow, StackReq};
use reborrow::*;

/// Order in which the elementary reflectors are multiplied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// `H = H_1 H_2 ... H_k`. Reflector `i` has a unit at position `i` and zeros above.
    Forward,
    /// `H = H_k ... H_2 H_1`. Reflector `i` has a unit at position `dim - k + i` and zeros below.
    Backward,
}

/// Storage layout of the reflector basis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StoreV {
    /// The reflectors are the columns of `V`.
    Columnwise,
    /// The reflectors are the rows of `V`.
    Rowwise,
}

/// Computes the memory requirements of [`apply_block_householder`].
pub fn apply_block_householder_req<E: ComplexField>(
    side: Side,
    matrix_nrows: usize,
    matrix_ncols: usize,
    block_size: usize,
) -> Result<StackReq, SizeOverflow> {
    let (dim, tmp_nrows, tmp_ncols) = match side {
        Side::Left => (matrix_nrows, block_size, matrix_ncols),
        Side::Right => (matrix_ncols, matrix_nrows, block_size),
    };
    StackReq::try_all_of([
        temp_mat_req::<E>(dim, block_size)?,
        temp_mat_req::<E>(tmp_nrows, tmp_ncols)?,
    ])
}

/// Applies `op(H)` from the given side to `matrix`, where `H = I - V T V^H` is a block reflector.
///
/// - `op` is [`Op::NoTrans`] for `H`, [`Op::ConjTrans`] for `H^H`. [`Op::Trans`] is only
/// accepted for real scalars, where it is equivalent to [`Op::ConjTrans`].
/// - Only the triangle of `householder_factor` selected by `direction` is accessed.
/// - The unit and zero entries of the basis implied by `direction` are not accessed.
///
/// # Panics
///
/// Panics if the dimensions of the basis and factor do not match `matrix`, or if
/// [`Op::Trans`] is requested for complex scalars.
#[track_caller]
pub fn apply_block_householder<E: ComplexField>(
    side: Side,
    op: Op,
    direction: Direction,
    storev: StoreV,
    basis: MatRef<'_, E>,
    householder_factor: MatRef<'_, E>,
    matrix: MatMut<'_, E>,
    stack: DynStack<'_>,
) {
    let m = matrix.nrows();
    let n = matrix.ncols();
    let k = householder_factor.nrows();
    let dim = match side {
        Side::Left => m,
        Side::Right => n,
    };

    fancy_assert!(householder_factor.ncols() == k);
    fancy_assert!(k <= dim);
    match storev {
        StoreV::Columnwise => {
            fancy_assert!(basis.nrows() == dim);
            fancy_assert!(basis.ncols() == k);
        }
        StoreV::Rowwise => {
            fancy_assert!(basis.nrows() == k);
            fancy_assert!(basis.ncols() == dim);
        }
    }
    if op == Op::Trans {
        fancy_assert!(E::is_real());
    }

    if m == 0 || n == 0 || k == 0 {
        return;
    }

    let mut matrix = matrix;
    let (tmp_nrows, tmp_ncols) = match side {
        Side::Left => (k, n),
        Side::Right => (m, k),
    };

    temp_mat_zeroed! {
        let (mut w, stack) = temp_mat_zeroed::<E>(dim, k, stack);
        let (mut tmp, _) = temp_mat_zeroed::<E>(tmp_nrows, tmp_ncols, stack);
    }

    // explicit basis with its implicit unit and zero entries
    for t in 0..k {
        let unit = match direction {
            Direction::Forward => t,
            Direction::Backward => dim - k + t,
        };
        let stored = match direction {
            Direction::Forward => unit + 1..dim,
            Direction::Backward => 0..unit,
        };
        w.write(unit, t, E::one());
        for r in stored {
            let value = match storev {
                StoreV::Columnwise => basis.read(r, t),
                StoreV::Rowwise => basis.read(t, r).conj(),
            };
            w.write(r, t, value);
        }
    }

    let factor_structure = match direction {
        Direction::Forward => BlockStructure::TriangularUpper,
        Direction::Backward => BlockStructure::TriangularLower,
    };

    match side {
        Side::Left => {
            // tmp = W^H C
            matmul(
                tmp.rb_mut(),
                w.rb().transpose(),
                Conj::Yes,
                matrix.rb(),
                Conj::No,
                None,
                E::one(),
            );
            // tmp = op(T) tmp
            triangular::matmul_in_place(
                Side::Left,
                householder_factor,
                factor_structure,
                op,
                tmp.rb_mut(),
                E::one(),
            );
            // C = C - W tmp
            matmul(
                matrix.rb_mut(),
                w.rb(),
                Conj::No,
                tmp.rb(),
                Conj::No,
                Some(E::one()),
                -E::one(),
            );
        }
        Side::Right => {
            // tmp = C W
            matmul(
                tmp.rb_mut(),
                matrix.rb(),
                Conj::No,
                w.rb(),
                Conj::No,
                None,
                E::one(),
            );
            // tmp = tmp op(T)
            triangular::matmul_in_place(
                Side::Right,
                householder_factor,
                factor_structure,
                op,
                tmp.rb_mut(),
                E::one(),
            );
            // C = C - tmp W^H
            matmul(
                matrix.rb_mut(),
                tmp.rb(),
                Conj::No,
                w.rb().transpose(),
                Conj::Yes,
                Some(E::one()),
                -E::one(),
            );
        }
    }
}
