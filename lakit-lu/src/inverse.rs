use crate::LuError;
use assert2::assert as fancy_assert;
use dyn_stack::{DynStack, SizeOverflow, StackReq};
use lakit_core::{
    mul::{inner_prod, matvec},
    temp_mat_req, temp_mat_zeroed, ComplexField, Conj, MatMut,
};
use reborrow::*;

/// Computes the size and alignment of required workspace for computing the inverse of a
/// matrix in place from its packed LU factors.
pub fn invert_in_place_req<E: ComplexField>(dim: usize) -> Result<StackReq, SizeOverflow> {
    temp_mat_req::<E>(dim, 1)
}

/// Overwrites the packed LU factors in `lu_factors` with the inverse of `L * U`, by solving
/// `U X L = I` one column and row at a time, from the bottom right corner.
///
/// # Panics
///
/// Panics if the matrix is not square, or if the provided memory in `stack` is insufficient.
///
/// # Errors
///
/// Returns [`LuError::SingularPivot`] if a diagonal entry of `U` is exactly zero. The rows and
/// columns after that index have already been overwritten.
#[track_caller]
pub fn invert_in_place<E: ComplexField>(
    lu_factors: MatMut<'_, E>,
    stack: DynStack<'_>,
) -> Result<(), LuError> {
    fancy_assert!(lu_factors.nrows() == lu_factors.ncols());

    let mut a = lu_factors;
    let n = a.nrows();
    if n == 0 {
        return Ok(());
    }

    temp_mat_zeroed! {
        let (mut work, _) = temp_mat_zeroed::<E>(n, 1, stack);
    }

    for j in (0..n).rev() {
        let ajj = a.read(j, j);
        if ajj == E::zero() {
            log::debug!(target: "lakit_lu", "singular pivot at index {j}");
            return Err(LuError::SingularPivot { index: j });
        }
        if j + 1 == n {
            a.write(j, j, ajj.inv());
            continue;
        }

        let tail = n - j - 1;
        let mut w = work.rb_mut().col(0).subrows(0, tail);

        {
            let a = a.rb();
            let x22 = a.submatrix(j + 1, j + 1, tail, tail);
            let u12 = a.row(j).subcols(j + 1, tail).transpose();

            // w = -X22^T u12 / U(j, j)
            matvec(w.rb_mut(), x22.transpose(), u12, None, -ajj.inv());
        }

        let l21_dot_w = inner_prod(a.rb().col(j).subrows(j + 1, tail), Conj::No, w.rb());
        a.write(j, j, ajj.inv() - l21_dot_w);
        for k in 0..tail {
            a.write(j, j + 1 + k, w.read(k));
        }

        {
            let a = a.rb();
            let x22 = a.submatrix(j + 1, j + 1, tail, tail);
            let l21 = a.col(j).subrows(j + 1, tail);
            // w = -X22 l21
            matvec(w.rb_mut(), x22, l21, None, -E::one());
        }
        for k in 0..tail {
            a.write(j + 1 + k, j, w.read(k));
        }
    }

    Ok(())
}
