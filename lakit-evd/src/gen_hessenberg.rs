//! Reduction of a matrix pencil `(A, B)` to Hessenberg-triangular form, with plane rotations.
//!
//! Both reductions apply unitary transformations from the left (accumulated into `Q`) and from
//! the right (accumulated into `Z`), so that `Q A Z^H` and `Q B Z^H` are preserved.

use assert2::assert;
use lakit_core::{jacobi::JacobiRotation, ComplexField, MatMut};
use reborrow::*;

/// Reduces `b` to upper triangular form with rotations applied from the left, and applies them
/// to `a` as well. The transformations are accumulated into `q` from the right, if provided.
#[track_caller]
pub fn triangularize_b<E: ComplexField>(
    a: MatMut<'_, E>,
    b: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
) {
    let n = a.nrows();
    assert!(a.ncols() == n);
    assert!(b.nrows() == n);
    assert!(b.ncols() == n);
    if let Some(q) = q.rb() {
        assert!(q.nrows() == n);
        assert!(q.ncols() == n);
    }

    let mut a = a;
    let mut b = b;
    let mut q = q;

    for j in 0..n {
        for i in (j + 1..n).rev() {
            let (rot, r) = JacobiRotation::make_givens(b.read(i - 1, j), b.read(i, j));
            b.write(i - 1, j, r);
            b.write(i, j, E::zero());

            let (x, y) = b.rb_mut().subcols(j + 1, n - j - 1).two_rows_mut(i - 1, i);
            rot.apply_on_the_left_in_place(x, y);
            let (x, y) = a.rb_mut().two_rows_mut(i - 1, i);
            rot.apply_on_the_left_in_place(x, y);
            if let Some(q) = q.rb_mut() {
                let (x, y) = q.two_cols_mut(i - 1, i);
                rot.apply_on_the_right_in_place(x, y);
            }
        }
    }
}

/// Reduces `a` to upper Hessenberg form while keeping the upper triangular `b` triangular.
///
/// Each entry of `a` below the subdiagonal is annihilated with a rotation of two adjacent rows,
/// and the resulting fill-in of `b` is chased away with a rotation of two adjacent columns.
///
/// # Panics
///
/// Panics if the dimensions do not match. `b` is assumed to be upper triangular on entry.
#[track_caller]
pub fn generalized_hessenberg<E: ComplexField>(
    a: MatMut<'_, E>,
    b: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
    z: Option<MatMut<'_, E>>,
) {
    let n = a.nrows();
    assert!(a.ncols() == n);
    assert!(b.nrows() == n);
    assert!(b.ncols() == n);
    if let Some(q) = q.rb() {
        assert!(q.nrows() == n);
        assert!(q.ncols() == n);
    }
    if let Some(z) = z.rb() {
        assert!(z.nrows() == n);
        assert!(z.ncols() == n);
    }

    let mut a = a;
    let mut b = b;
    let mut q = q;
    let mut z = z;

    for jcol in 0..n.saturating_sub(2) {
        for jrow in (jcol + 2..n).rev() {
            // annihilate A(jrow, jcol)
            let (rot, r) = JacobiRotation::make_givens(a.read(jrow - 1, jcol), a.read(jrow, jcol));
            a.write(jrow - 1, jcol, r);
            a.write(jrow, jcol, E::zero());

            let (x, y) = a
                .rb_mut()
                .subcols(jcol + 1, n - jcol - 1)
                .two_rows_mut(jrow - 1, jrow);
            rot.apply_on_the_left_in_place(x, y);
            let (x, y) = b
                .rb_mut()
                .subcols(jrow - 1, n - jrow + 1)
                .two_rows_mut(jrow - 1, jrow);
            rot.apply_on_the_left_in_place(x, y);
            if let Some(q) = q.rb_mut() {
                let (x, y) = q.two_cols_mut(jrow - 1, jrow);
                rot.apply_on_the_right_in_place(x, y);
            }

            // annihilate the fill-in B(jrow, jrow - 1)
            let (rot, r) = JacobiRotation::make_givens(b.read(jrow, jrow), b.read(jrow, jrow - 1));
            b.write(jrow, jrow, r);
            b.write(jrow, jrow - 1, E::zero());
            let rot = rot.conj();

            let (x, y) = a.rb_mut().two_cols_mut(jrow, jrow - 1);
            rot.apply_on_the_right_in_place(x, y);
            let (x, y) = b.rb_mut().subrows(0, jrow).two_cols_mut(jrow, jrow - 1);
            rot.apply_on_the_right_in_place(x, y);
            if let Some(z) = z.rb_mut() {
                let (x, y) = z.two_cols_mut(jrow, jrow - 1);
                rot.apply_on_the_right_in_place(x, y);
            }
        }
    }
}
