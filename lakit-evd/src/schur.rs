//! Reordering of the diagonal blocks of a Schur form.
//!
//! A matrix in Schur form is upper triangular (complex data), or quasi upper triangular with
//! standardized 2×2 diagonal blocks holding complex conjugate pairs of eigenvalues (real data).
//! The reordering is performed with unitary similarity transformations, which can optionally be
//! accumulated into a matrix `Q` from the right.

use crate::SchurError;
use assert2::assert;
use lakit_core::{
    jacobi::JacobiRotation, max, min, norm::norm_max, ComplexField, MatMut, MatRef, RealField,
    ScalarKind,
};
use reborrow::*;

fn sign<E: RealField>(a: E) -> E {
    let zero = E::zero();
    if a == zero {
        zero
    } else if a > zero {
        E::one()
    } else {
        -E::one()
    }
}

/// Computes the standardized Schur factorization of the real 2×2 matrix `[a b; c d]`.
///
/// On output, either `c == 0` (real eigenvalues), or `a == d` and `b * c < 0` (complex conjugate
/// eigenvalues `a ± sqrt(|b c|) i`).
///
/// Returns the new block `(a, b, c, d)`, the eigenvalues `(re1, im1)`, `(re2, im2)`, and the
/// rotation `(cs, sn)` such that
/// ```text
/// [ a b ] = [  cs sn ] [ a0 b0 ] [ cs -sn ]
/// [ c d ]   [ -sn cs ] [ c0 d0 ] [ sn  cs ]
/// ```
pub fn schur22<E: RealField>(
    a: E,
    b: E,
    c: E,
    d: E,
    epsilon: E,
    zero_threshold: E,
) -> ((E, E, E, E), (E, E), (E, E), (E, E)) {
    let zero = E::zero();
    let one = E::one();
    let half = E::from_f64(0.5);
    let multpl = E::from_f64(4.0);

    let eps = epsilon;
    let safmn2 = (zero_threshold / eps).sqrt();
    let safmx2 = safmn2.inv();

    let (mut a, mut b, mut c, mut d) = (a, b, c, d);
    let mut cs = one;
    let mut sn = zero;

    if c == zero {
        // already upper triangular
    } else if b == zero {
        // swap rows and columns
        cs = zero;
        sn = one;
        (a, d) = (d, a);
        b = -c;
        c = zero;
    } else if a - d == zero && sign(b) != sign(c) {
        // already standardized
    } else {
        let mut temp = a - d;
        let mut p = temp * half;

        let bcmax = max(b.abs(), c.abs());
        let bcmin = min(b.abs(), c.abs()) * (sign(b) * sign(c));
        let scale = max(p.abs(), bcmax);
        let z = (p / scale) * p + (bcmax / scale) * bcmin;

        if z >= multpl * eps {
            // real eigenvalues. postponed if z is tiny but positive
            let z = p + sign(p) * (scale.sqrt() * z.sqrt());
            a = d + z;
            d = d - (bcmax / z) * bcmin;

            let tau = (c * c + z * z).sqrt();
            cs = z / tau;
            sn = c / tau;
            b = b - c;
            c = zero;
        } else {
            // complex or nearly equal real eigenvalues: make the diagonal entries equal
            let mut sigma = b + c;
            for _ in 0..20 {
                let scale = max(temp.abs(), sigma.abs());
                if scale >= safmx2 {
                    sigma = sigma * safmn2;
                    temp = temp * safmn2;
                } else if scale <= safmn2 {
                    sigma = sigma * safmx2;
                    temp = temp * safmx2;
                } else {
                    break;
                }
            }

            p = temp * half;
            let tau = (sigma * sigma + temp * temp).sqrt();
            cs = ((one + sigma.abs() / tau) * half).sqrt();
            sn = -(p / (tau * cs)) * sign(sigma);

            // [aa bb] = [a b] [cs -sn]
            // [cc dd]   [c d] [sn  cs]
            let aa = a * cs + b * sn;
            let bb = -a * sn + b * cs;
            let cc = c * cs + d * sn;
            let dd = -c * sn + d * cs;

            // [a b] = [ cs sn] [aa bb]
            // [c d]   [-sn cs] [cc dd]
            b = bb * cs + dd * sn;
            c = -aa * sn + cc * cs;
            let mid = (aa * cs + cc * sn + (-bb * sn + dd * cs)) * half;
            a = mid;
            d = mid;

            if c != zero && b != zero && sign(b) == sign(c) {
                // real eigenvalues after all: reduce to upper triangular form
                let sab = b.abs().sqrt();
                let sac = c.abs().sqrt();
                let p = if c > zero { sab * sac } else { -sab * sac };
                let tau = (b + c).abs().sqrt().inv();
                a = mid + p;
                d = mid - p;
                b = b - c;
                c = zero;

                let cs1 = sab * tau;
                let sn1 = sac * tau;
                (cs, sn) = (cs * cs1 - sn * sn1, cs * sn1 + sn * cs1);
            }
        }
    }

    let (s1, s2) = if c != zero {
        let im = b.abs().sqrt() * c.abs().sqrt();
        ((a, im), (d, -im))
    } else {
        ((a, zero), (d, zero))
    };

    ((a, b, c, d), s1, s2, (cs, sn))
}

/// Standardizes the real 2×2 diagonal block starting at `k`, and applies the rotation to the rest
/// of `a` and to `q`.
fn standardize_block<E: ComplexField>(
    a: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
    k: usize,
    epsilon: E::Real,
    zero_threshold: E::Real,
) {
    let mut a = a;
    let n = a.nrows();

    let ((a00, a01, a10, a11), _, _, (cs, sn)) = schur22(
        a.read(k, k).real(),
        a.read(k, k + 1).real(),
        a.read(k + 1, k).real(),
        a.read(k + 1, k + 1).real(),
        epsilon,
        zero_threshold,
    );
    a.write(k, k, E::from_real(a00));
    a.write(k, k + 1, E::from_real(a01));
    a.write(k + 1, k, E::from_real(a10));
    a.write(k + 1, k + 1, E::from_real(a11));

    let rot = JacobiRotation::<E> {
        c: cs,
        s: E::from_real(sn),
    };
    if k + 2 < n {
        let (x, y) = a
            .rb_mut()
            .subcols(k + 2, n - k - 2)
            .two_rows_mut(k, k + 1);
        rot.apply_on_the_left_in_place(x, y);
    }
    let (x, y) = a.rb_mut().subrows(0, k).two_cols_mut(k, k + 1);
    rot.apply_on_the_right_in_place(x, y);
    if let Some(q) = q {
        let (x, y) = q.two_cols_mut(k, k + 1);
        rot.apply_on_the_right_in_place(x, y);
    }
}

/// Solves `T11 X - X T22 = T12` for the small matrix `X`, with complete pivoting.
///
/// Pivots smaller than `smin` are replaced by `smin`, so that the solution is always finite.
fn solve_sylvester<E: ComplexField>(
    t11: MatRef<'_, E>,
    t22: MatRef<'_, E>,
    t12: MatRef<'_, E>,
    x: MatMut<'_, E>,
    smin: E::Real,
) {
    let n1 = t11.nrows();
    let n2 = t22.nrows();
    let m = n1 * n2;
    let mut x = x;

    // kronecker form, acting on the column-major vectorization of X
    let mut k = [[E::zero(); 4]; 4];
    let mut rhs = [E::zero(); 4];
    for j in 0..n2 {
        for i in 0..n1 {
            let row = i + n1 * j;
            rhs[row] = t12.read(i, j);
            for p in 0..n1 {
                k[row][p + n1 * j] = k[row][p + n1 * j] + t11.read(i, p);
            }
            for l in 0..n2 {
                k[row][i + n1 * l] = k[row][i + n1 * l] - t22.read(l, j);
            }
        }
    }

    let mut perm = [0usize, 1, 2, 3];
    for p in 0..m {
        let mut best = E::Real::zero();
        let (mut ip, mut jp) = (p, p);
        for i in p..m {
            for j in p..m {
                let abs = k[i][j].abs();
                if abs > best {
                    best = abs;
                    (ip, jp) = (i, j);
                }
            }
        }
        k.swap(p, ip);
        rhs.swap(p, ip);
        for row in k.iter_mut() {
            row.swap(p, jp);
        }
        perm.swap(p, jp);

        if k[p][p].abs() < smin {
            k[p][p] = E::from_real(smin);
        }
        let pivot_inv = k[p][p].inv();
        for i in p + 1..m {
            let l = k[i][p] * pivot_inv;
            k[i][p] = E::zero();
            for j in p + 1..m {
                k[i][j] = k[i][j] - l * k[p][j];
            }
            rhs[i] = rhs[i] - l * rhs[p];
        }
    }

    let mut y = [E::zero(); 4];
    for i in (0..m).rev() {
        let mut acc = rhs[i];
        for j in i + 1..m {
            acc = acc - k[i][j] * y[j];
        }
        y[i] = acc / k[i][i];
    }

    for (pos, &col) in perm[..m].iter().enumerate() {
        x.write(col % n1, col / n1, y[pos]);
    }
}

/// Swaps the two adjacent diagonal blocks of sizes `n1` and `n2` starting at row `j0` of the
/// Schur form `a`, and accumulates the transformation into `q` if provided.
///
/// Blocks of size 2 are only allowed for real data. The 1×1 case never fails.
///
/// # Errors
///
/// Returns [`SchurError::SwapFailed`] with `stopped_at == j0` if the blocks are too close to be
/// swapped stably. In that case `a` and `q` are left unchanged.
#[track_caller]
pub fn schur_swap<E: ComplexField>(
    a: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
    j0: usize,
    n1: usize,
    n2: usize,
    epsilon: E::Real,
    zero_threshold: E::Real,
) -> Result<(), SchurError> {
    let n = a.nrows();
    assert!(a.ncols() == n);
    assert!(n1 == 1 || n1 == 2);
    assert!(n2 == 1 || n2 == 2);
    assert!(j0 + n1 + n2 <= n);
    if let Some(q) = q.rb() {
        assert!(q.nrows() == n);
        assert!(q.ncols() == n);
    }

    let mut a = a;
    let mut q = q;
    let eps = epsilon;
    let small_num = zero_threshold;

    if n1 == 1 && n2 == 1 {
        let j1 = j0 + 1;
        let t11 = a.read(j0, j0);
        let t22 = a.read(j1, j1);

        // rotation taking e1 to the eigenvector of t22
        let (rot, _) = JacobiRotation::make_givens(a.read(j0, j1), t22 - t11);

        if j1 + 1 < n {
            let (x, y) = a
                .rb_mut()
                .subcols(j1 + 1, n - j1 - 1)
                .two_rows_mut(j0, j1);
            rot.apply_on_the_left_in_place(x, y);
        }
        let (x, y) = a.rb_mut().subrows(0, j0).two_cols_mut(j0, j1);
        rot.apply_on_the_right_in_place(x, y);

        a.write(j0, j0, t22);
        a.write(j1, j1, t11);

        if let Some(q) = q.rb_mut() {
            let (x, y) = q.two_cols_mut(j0, j1);
            rot.apply_on_the_right_in_place(x, y);
        }
        return Ok(());
    }

    assert!(E::KIND == ScalarKind::Real);

    let nd = n1 + n2;
    let mut d_data = [E::zero(); 16];
    let mut d = MatMut::from_column_major_slice_mut(&mut d_data[..nd * nd], nd, nd);
    d.copy_from(a.rb().submatrix(j0, j0, nd, nd));

    let dnorm = norm_max(d.rb());
    let thresh = max(E::Real::from_f64(10.0) * eps * dnorm, small_num / eps);

    // T11 X - X T22 = T12
    let mut x_data = [E::zero(); 4];
    let mut x = MatMut::from_column_major_slice_mut(&mut x_data[..n1 * n2], n1, n2);
    {
        let d = d.rb();
        let t11 = d.submatrix(0, 0, n1, n1);
        let t22 = d.submatrix(n1, n1, n2, n2);
        let smin = max(eps * max(norm_max(t11), norm_max(t22)), small_num);
        solve_sylvester(t11, t22, d.submatrix(0, n1, n1, n2), x.rb_mut(), smin);
    }

    // [-X; I] spans the invariant subspace of T22. compute its QR factorization with givens
    // rotations, the first n2 columns of the orthogonal factor span the same subspace
    let mut w_data = [E::zero(); 8];
    let mut w = MatMut::from_column_major_slice_mut(&mut w_data[..nd * n2], nd, n2);
    for j in 0..n2 {
        for i in 0..n1 {
            w.write(i, j, -x.read(i, j));
        }
        w.write(n1 + j, j, E::one());
    }

    let mut rots = [(0usize, JacobiRotation::<E>::identity()); 5];
    let mut nrot = 0;
    for j in 0..n2 {
        for i in (j + 1..nd).rev() {
            let (rot, r) = JacobiRotation::make_givens(w.read(i - 1, j), w.read(i, j));
            w.write(i - 1, j, r);
            w.write(i, j, E::zero());
            if j + 1 < n2 {
                let (x, y) = w
                    .rb_mut()
                    .subcols(j + 1, n2 - j - 1)
                    .two_rows_mut(i - 1, i);
                rot.apply_on_the_left_in_place(x, y);
            }
            rots[nrot] = (i - 1, rot);
            nrot += 1;
        }
    }
    let rots = &rots[..nrot];

    // perform the swap provisionally on the copy
    for &(i, rot) in rots {
        let (x, y) = d.rb_mut().two_rows_mut(i, i + 1);
        rot.apply_on_the_left_in_place(x, y);
        let (x, y) = d.rb_mut().two_cols_mut(i, i + 1);
        rot.apply_on_the_right_in_place(x, y);
    }

    // weak stability test: the new lower left block must be negligible
    let weak = norm_max(d.rb().submatrix(n2, 0, n1, n2));
    if weak > thresh {
        return Err(SchurError::SwapFailed { stopped_at: j0 });
    }

    // strong stability test: undoing the swap with the lower left block set to zero must give
    // back the original blocks
    for j in 0..n2 {
        for i in n2..nd {
            d.write(i, j, E::zero());
        }
    }
    for &(i, rot) in rots.iter().rev() {
        let rot = rot.adjoint();
        let (x, y) = d.rb_mut().two_rows_mut(i, i + 1);
        rot.apply_on_the_left_in_place(x, y);
        let (x, y) = d.rb_mut().two_cols_mut(i, i + 1);
        rot.apply_on_the_right_in_place(x, y);
    }
    let mut strong = E::Real::zero();
    for j in 0..nd {
        for i in 0..nd {
            strong = max(strong, (d.read(i, j) - a.read(j0 + i, j0 + j)).abs());
        }
    }
    if strong > thresh {
        return Err(SchurError::SwapFailed { stopped_at: j0 });
    }

    // accept the swap
    for &(i, rot) in rots {
        let g = j0 + i;
        let (x, y) = a.rb_mut().subcols(j0, n - j0).two_rows_mut(g, g + 1);
        rot.apply_on_the_left_in_place(x, y);
        let (x, y) = a.rb_mut().subrows(0, j0 + nd).two_cols_mut(g, g + 1);
        rot.apply_on_the_right_in_place(x, y);
        if let Some(q) = q.rb_mut() {
            let (x, y) = q.two_cols_mut(g, g + 1);
            rot.apply_on_the_right_in_place(x, y);
        }
    }
    for j in 0..n2 {
        for i in n2..nd {
            a.write(j0 + i, j0 + j, E::zero());
        }
    }

    if n2 == 2 {
        standardize_block(a.rb_mut(), q.rb_mut(), j0, eps, small_num);
    }
    if n1 == 2 {
        standardize_block(a.rb_mut(), q.rb_mut(), j0 + n2, eps, small_num);
    }

    Ok(())
}

/// Moves the diagonal block of the Schur form `a` starting at row `ifst` to row `ilst`, by a
/// sequence of adjacent block swaps, and accumulates the transformations into `q` if provided.
///
/// For real data, an index pointing to the second row of a 2×2 block designates that block.
/// When moving down past blocks of a different size, the destination is adjusted so that the
/// moved block ends where the block at `ilst` ended.
///
/// Returns the row where the moved block starts on exit.
///
/// # Panics
///
/// Panics if `a` is not square, or `ifst`/`ilst` are out of bounds.
///
/// # Errors
///
/// Returns [`SchurError::SwapFailed`] if two adjacent blocks could not be swapped. `stopped_at`
/// is the row where the moved block starts, and `a` is left partially reordered.
#[track_caller]
pub fn schur_move<E: ComplexField>(
    a: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
    ifst: usize,
    ilst: usize,
    epsilon: E::Real,
    zero_threshold: E::Real,
) -> Result<usize, SchurError> {
    let n = a.nrows();
    assert!(a.ncols() == n);
    if n == 0 {
        return Ok(0);
    }
    assert!(ifst < n);
    assert!(ilst < n);

    let mut a = a;
    let mut q = q;
    let real = E::KIND == ScalarKind::Real;
    let zero = E::zero();

    let mut ifst = ifst;
    let mut ilst = ilst;
    if real && ifst > 0 && a.read(ifst, ifst - 1) != zero {
        ifst -= 1;
    }
    if real && ilst > 0 && a.read(ilst, ilst - 1) != zero {
        ilst -= 1;
    }

    let block_size = |a: MatRef<'_, E>, k: usize| {
        if real && k + 1 < n && a.read(k + 1, k) != zero {
            2
        } else {
            1
        }
    };

    let nbf = block_size(a.rb(), ifst);
    let mut here = ifst;

    if ifst < ilst {
        let nbl = block_size(a.rb(), ilst);
        if nbf == 2 && nbl == 1 {
            ilst -= 1;
        }
        if nbf == 1 && nbl == 2 {
            ilst += 1;
        }

        while here < ilst {
            let nbnext = block_size(a.rb(), here + nbf);
            if let Err(err) = schur_swap(
                a.rb_mut(),
                q.rb_mut(),
                here,
                nbf,
                nbnext,
                epsilon,
                zero_threshold,
            ) {
                log::debug!(target: "lakit_evd", "{err}: block at {here} could not be moved down");
                return Err(SchurError::SwapFailed { stopped_at: here });
            }
            here += nbnext;
        }
    } else {
        while here > ilst {
            let nbnext = if real && here >= 2 && a.read(here - 1, here - 2) != zero {
                2
            } else {
                1
            };
            if let Err(err) = schur_swap(
                a.rb_mut(),
                q.rb_mut(),
                here - nbnext,
                nbnext,
                nbf,
                epsilon,
                zero_threshold,
            ) {
                log::debug!(target: "lakit_evd", "{err}: block at {here} could not be moved up");
                return Err(SchurError::SwapFailed { stopped_at: here });
            }
            here -= nbnext;
        }
    }

    Ok(here)
}
