use crate::{ComplexField, MatMut};
use reborrow::*;

/// Part of a matrix an operation acts on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatrixStructure {
    /// The whole matrix.
    General,
    /// The diagonal and the strictly upper triangle.
    Upper,
    /// The diagonal and the strictly lower triangle.
    Lower,
}

/// Sets the off-diagonal entries of the selected part to `offdiag`, and the diagonal entries to
/// `diag`. Entries outside the selected part are left untouched.
///
/// # Example
///
/// ```
/// use lakit_core::{mat, set::{laset, MatrixStructure}};
///
/// let mut m = mat![[9.0f64, 9.0, 9.0], [9.0, 9.0, 9.0]];
/// laset(MatrixStructure::Upper, 0.0, 1.0, m.as_mut());
///
/// assert!(m == mat![[1.0f64, 0.0, 0.0], [9.0, 1.0, 0.0]]);
/// ```
pub fn laset<E: ComplexField>(structure: MatrixStructure, offdiag: E, diag: E, matrix: MatMut<'_, E>) {
    let mut matrix = matrix;
    let m = matrix.nrows();
    let n = matrix.ncols();

    for j in 0..n {
        let rows = match structure {
            MatrixStructure::General => 0..m,
            MatrixStructure::Upper => 0..Ord::min(j + 1, m),
            MatrixStructure::Lower => Ord::min(j, m)..m,
        };
        for i in rows {
            let value = if i == j { diag } else { offdiag };
            matrix.rb_mut().write(i, j, value);
        }
    }
}
