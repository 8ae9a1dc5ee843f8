use crate::{ComplexField, MatRef, RealField};

/// Returns the Frobenius norm of the matrix, scaled to avoid overflow.
pub fn norm_frobenius<E: ComplexField>(matrix: MatRef<'_, E>) -> E::Real {
    let zero = E::Real::zero();
    let one = E::Real::one();

    // sum of squares of (|x| / scale), lapack `lassq` style
    let mut scale = zero;
    let mut sumsq = one;
    for j in 0..matrix.ncols() {
        for i in 0..matrix.nrows() {
            let (re, im) = matrix.read(i, j).into_real_imag();
            for part in [re, im] {
                let abs = part.abs();
                if abs != zero {
                    if scale < abs {
                        let ratio = scale / abs;
                        sumsq = one + sumsq * ratio * ratio;
                        scale = abs;
                    } else {
                        let ratio = abs / scale;
                        sumsq = sumsq + ratio * ratio;
                    }
                }
            }
        }
    }
    scale * sumsq.sqrt()
}

/// Returns the largest absolute value of the entries of the matrix.
pub fn norm_max<E: ComplexField>(matrix: MatRef<'_, E>) -> E::Real {
    let mut max = E::Real::zero();
    for j in 0..matrix.ncols() {
        for i in 0..matrix.nrows() {
            max = crate::max(max, matrix.read(i, j).abs());
        }
    }
    max
}

/// Returns `max(eps * norm, small)`, the usual negligibility threshold.
#[inline]
pub fn threshold<R: RealField>(norm: R, epsilon: R, small: R) -> R {
    crate::max(epsilon * norm, small)
}
