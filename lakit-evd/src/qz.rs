// QZ iteration for a Hessenberg-triangular pencil, following the structure of LAPACK's xHGEQZ
// with the two-level deflation test of Steel, Vandebril and Langou (2023).
//
// https://github.com/Reference-LAPACK/lapack/blob/master/SRC/dhgeqz.f

use crate::{QzParams, SchurError};
use assert2::assert;
use core::ops::Range;
use lakit_core::{
    jacobi::JacobiRotation,
    max, min,
    norm::{norm_frobenius, threshold},
    ColMut, ComplexField, MatMut, MatRef, RealField, ScalarKind,
};
use reborrow::*;

/// Computes the generalized eigenvalues of the 2×2 pencil `(a, b)`, where `b` is upper
/// triangular.
///
/// Returns two `(alpha, beta)` pairs such that the eigenvalues are `alpha / beta`. `beta` is real
/// and non-negative. For real data, the eigenvalues are either both real (exactly zero imaginary
/// part), or a complex conjugate pair.
///
/// Diagonal entries of `b` that are too small relative to the rest of `b` are perturbed, so that
/// the result stays finite.
pub fn eig22<E: ComplexField>(
    a: MatRef<'_, E>,
    b: MatRef<'_, E>,
) -> ((E::Complex, E), (E::Complex, E)) {
    assert!(a.nrows() == 2);
    assert!(a.ncols() == 2);
    assert!(b.nrows() == 2);
    assert!(b.ncols() == 2);

    let zero = E::Real::zero();
    let half = E::Real::from_f64(0.5);
    let safmin = E::Real::zero_threshold();
    let rtmin = safmin.sqrt();

    let c = |x: E| x.into_complex();

    let mut a00 = c(a.read(0, 0));
    let mut a01 = c(a.read(0, 1));
    let mut a10 = c(a.read(1, 0));
    let mut a11 = c(a.read(1, 1));
    let mut b00 = c(b.read(0, 0));
    let mut b01 = c(b.read(0, 1));
    let mut b11 = c(b.read(1, 1));

    // scale a
    let anorm = max(
        max(a00.abs1() + a10.abs1(), a01.abs1() + a11.abs1()),
        safmin,
    );
    let ascale = anorm.inv();
    a00 = a00.scale(ascale);
    a01 = a01.scale(ascale);
    a10 = a10.scale(ascale);
    a11 = a11.scale(ascale);

    // perturb b if necessary to ensure non-singularity
    let bmin = rtmin * max(max(b00.abs1(), b01.abs1()), max(b11.abs1(), rtmin));
    if b00.abs1() < bmin {
        b00 = E::Complex::from_real(bmin);
    }
    if b11.abs1() < bmin {
        b11 = E::Complex::from_real(bmin);
    }

    // scale b
    let bsize = max(max(b00.abs1(), b01.abs1()), b11.abs1());
    let bscale = bsize.inv();
    b00 = b00.scale(bscale);
    b01 = b01.scale(bscale);
    b11 = b11.scale(bscale);

    // shift by the diagonal ratio of smaller magnitude, so that one of the diagonal entries of
    // the shifted pencil vanishes. the remaining eigenvalue offsets `mu` solve
    // mu^2 - 2 pp mu - qq = 0
    let s1 = a00 / b00;
    let s2 = a11 / b11;
    let ss = a10 / (b00 * b11);
    let (shift, pp, qq) = if s1.abs1() <= s2.abs1() {
        let as01 = a01 - s1 * b01;
        let as11 = a11 - s1 * b11;
        let abi = as11 / b11 - ss * b01;
        (s1, abi.scale(half), ss * as01)
    } else {
        let as01 = a01 - s2 * b01;
        let as00 = a00 - s2 * b00;
        let abi = as00 / b00 - ss * b01;
        (s2, abi.scale(half), ss * as01)
    };
    let disc = pp * pp + qq;

    let (l1, l2) = match E::KIND {
        ScalarKind::Real => {
            let (shift, pp, qq, disc) = (shift.real(), pp.real(), qq.real(), disc.real());
            if disc < zero {
                let re = shift + pp;
                let im = (-disc).sqrt();
                (
                    E::Complex::from_real_imag(re, im),
                    E::Complex::from_real_imag(re, -im),
                )
            } else {
                let r = disc.sqrt();
                let mu1 = if pp >= zero { pp + r } else { pp - r };
                let mu2 = if mu1 == zero { zero } else { -qq / mu1 };
                (
                    E::Complex::from_real(shift + mu1),
                    E::Complex::from_real(shift + mu2),
                )
            }
        }
        ScalarKind::Complex => {
            let r = disc.sqrt();
            let plus = pp + r;
            let minus = pp - r;
            let mu1 = if plus.abs1() >= minus.abs1() { plus } else { minus };
            let mu2 = if mu1 == E::Complex::zero() {
                E::Complex::zero()
            } else {
                -qq / mu1
            };
            (shift + mu1, shift + mu2)
        }
    };

    let beta = E::from_real(bsize);
    ((l1.scale(anorm), beta), (l2.scale(anorm), beta))
}

/// Computes a vector proportional to
/// `(beta1 * A - s1 * B) * B^-1 * (beta2 * A - s2 * B) * e1`
/// for the 2×2 or 3×3 leading block of a Hessenberg-triangular pencil, and stores it in `v`.
///
/// The vector is scaled to avoid overflow. For real data with complex conjugate shifts, the
/// result is real up to rounding, and only its real part is stored.
pub fn shiftcolumn<E: ComplexField>(
    a: MatRef<'_, E>,
    b: MatRef<'_, E>,
    v: ColMut<'_, E>,
    s1: E::Complex,
    s2: E::Complex,
    beta1: E,
    beta2: E,
) {
    let n = a.nrows();
    assert!(n == 2 || n == 3);
    assert!(a.ncols() == n);
    assert!(b.nrows() == n);
    assert!(b.ncols() == n);
    assert!(v.nrows() == n);

    let mut v = v;
    let zero = E::Real::zero();
    let c = |x: E| x.into_complex();

    let beta1 = c(beta1);
    let beta2 = c(beta2);
    let a00 = c(a.read(0, 0));
    let a01 = c(a.read(0, 1));
    let a10 = c(a.read(1, 0));
    let a11 = c(a.read(1, 1));
    let b00 = c(b.read(0, 0));
    let b01 = c(b.read(0, 1));
    let b11 = c(b.read(1, 1));

    // w = (beta2 A - s2 B) e1
    let mut w0 = beta2 * a00 - s2 * b00;
    let mut w1 = beta2 * a10;
    let scale = w0.abs1() + w1.abs1();
    if scale == zero {
        for i in 0..n {
            v.write(i, E::zero());
        }
        return;
    }
    w0 = w0.scale(scale.inv());
    w1 = w1.scale(scale.inv());

    // y = B^-1 w
    let mut y1 = w1 / b11;
    let mut y0 = (w0 - b01 * y1) / b00;
    let scale = y0.abs1() + y1.abs1();
    if scale == zero {
        for i in 0..n {
            v.write(i, E::zero());
        }
        return;
    }
    y0 = y0.scale(scale.inv());
    y1 = y1.scale(scale.inv());

    // v = (beta1 A - s1 B) y
    let v0 = beta1 * (a00 * y0 + a01 * y1) - s1 * (b00 * y0 + b01 * y1);
    let v1 = beta1 * (a10 * y0 + a11 * y1) - s1 * (b11 * y1);
    v.write(0, E::from_complex(v0));
    v.write(1, E::from_complex(v1));
    if n == 3 {
        let v2 = beta1 * c(a.read(2, 1)) * y1;
        v.write(2, E::from_complex(v2));
    }
}

struct QzCtx<'a, E: ComplexField> {
    a: MatMut<'a, E>,
    b: MatMut<'a, E>,
    q: Option<MatMut<'a, E>>,
    z: Option<MatMut<'a, E>>,
    alpha: ColMut<'a, E::Complex>,
    beta: ColMut<'a, E>,

    n: usize,
    ilo: usize,
    ihi: usize,
    want_s: bool,

    // active window
    istart: usize,
    istop: usize,
    // range rotations are applied to
    istart_m: usize,
    istop_m: usize,
}

impl<'a, E: ComplexField> QzCtx<'a, E> {
    fn update_rotation_range(&mut self) {
        (self.istart_m, self.istop_m) = if self.want_s {
            (0, self.n)
        } else {
            (self.istart, self.istop)
        };
    }

    /// Applies `G` to rows `i0` and `i1` of `A` (restricted to `a_cols`) and of `B` (restricted
    /// to `b_cols`), and `G^H` to columns `i0` and `i1` of `Q` from the right.
    fn rotate_rows(
        &mut self,
        rot: JacobiRotation<E>,
        i0: usize,
        i1: usize,
        a_cols: Range<usize>,
        b_cols: Range<usize>,
    ) {
        let (x, y) = self
            .a
            .rb_mut()
            .subcols(a_cols.start, a_cols.len())
            .two_rows_mut(i0, i1);
        rot.apply_on_the_left_in_place(x, y);
        let (x, y) = self
            .b
            .rb_mut()
            .subcols(b_cols.start, b_cols.len())
            .two_rows_mut(i0, i1);
        rot.apply_on_the_left_in_place(x, y);
        if let Some(q) = self.q.rb_mut() {
            let (x, y) = q.two_cols_mut(i0, i1);
            rot.apply_on_the_right_in_place(x, y);
        }
    }

    /// Applies `G^H` from the right to columns `j0` and `j1` of `A` (restricted to `a_rows`),
    /// of `B` (restricted to `b_rows`), and of `Z`.
    fn rotate_cols(
        &mut self,
        rot: JacobiRotation<E>,
        j0: usize,
        j1: usize,
        a_rows: Range<usize>,
        b_rows: Range<usize>,
    ) {
        let (x, y) = self
            .a
            .rb_mut()
            .subrows(a_rows.start, a_rows.len())
            .two_cols_mut(j0, j1);
        rot.apply_on_the_right_in_place(x, y);
        let (x, y) = self
            .b
            .rb_mut()
            .subrows(b_rows.start, b_rows.len())
            .two_cols_mut(j0, j1);
        rot.apply_on_the_right_in_place(x, y);
        if let Some(z) = self.z.rb_mut() {
            let (x, y) = z.two_cols_mut(j0, j1);
            rot.apply_on_the_right_in_place(x, y);
        }
    }

    /// Looks for a negligible subdiagonal entry in the active window, from the bottom up. If one
    /// is found, it is set to zero and the window is restricted to the rows below it.
    fn check_split(&mut self, eps: E::Real, small_num: E::Real) {
        let zero = E::Real::zero();
        for i in (self.istart + 1..self.istop).rev() {
            let a = self.a.rb();
            let b = self.b.rb();

            let sub = a.read(i, i - 1).abs1();
            if sub <= small_num {
                self.a.write(i, i - 1, E::zero());
                self.istart = i;
                break;
            }

            let mut tst = a.read(i - 1, i - 1).abs1() + a.read(i, i).abs1();
            if tst == zero {
                if i >= self.ilo + 2 {
                    tst = tst + a.read(i - 1, i - 2).abs();
                }
                if i + 1 < self.ihi {
                    tst = tst + a.read(i + 1, i).abs();
                }
            }

            if sub <= eps * tst {
                // second test:
                // |A(i,i-1)| |A(i-1,i) B(i,i) - A(i,i) B(i-1,i)|
                //     <= eps |A(i,i)| |A(i-1,i-1) B(i,i) - A(i,i) B(i-1,i-1)|
                // scaled to avoid overflow
                let tst1 = (b.read(i, i) * a.read(i - 1, i) - a.read(i, i) * b.read(i - 1, i)).abs1();
                let tst2 = (b.read(i, i) * a.read(i - 1, i - 1)
                    - a.read(i, i) * b.read(i - 1, i - 1))
                .abs1();
                let aii = a.read(i, i).abs1();

                let ab = max(sub, tst1);
                let ba = min(sub, tst1);
                let aa = max(aii, tst2);
                let bb = min(aii, tst2);
                let s = aa + ab;
                if ba * (ab / s) <= max(small_num, eps * (bb * (aa / s))) {
                    self.a.write(i, i - 1, E::zero());
                    self.istart = i;
                    break;
                }
            }
        }
    }

    /// Deflates every diagonal entry of `B` in the active window whose magnitude is at most
    /// `tol`, by chasing the zero to the top of the window and splitting it off as an infinite
    /// eigenvalue.
    fn deflate_infinite(&mut self, tol: E::Real) {
        for i in self.istart..self.istop {
            if self.b.read(i, i).abs1() > tol {
                continue;
            }
            self.b.write(i, i, E::zero());

            let istart = self.istart;
            for j in (istart + 1..=i).rev() {
                // move the zero from B(j, j) to B(j-1, j-1)
                let (rot, r) =
                    JacobiRotation::make_givens(self.b.read(j - 1, j), self.b.read(j - 1, j - 1));
                self.b.write(j - 1, j, r);
                self.b.write(j - 1, j - 1, E::zero());
                let a_rows = self.istart_m..Ord::min(j + 2, self.n);
                let b_rows = self.istart_m..j - 1;
                self.rotate_cols(rot.conj(), j, j - 1, a_rows, b_rows);

                // remove fill-in in A
                if j + 1 < self.istop {
                    let (rot, r) =
                        JacobiRotation::make_givens(self.a.read(j, j - 1), self.a.read(j + 1, j - 1));
                    self.a.write(j, j - 1, r);
                    self.a.write(j + 1, j - 1, E::zero());
                    let istop_m = self.istop_m;
                    self.rotate_rows(rot, j, j + 1, j..istop_m, j + 1..istop_m);
                }
            }

            if istart + 1 < self.istop {
                let (rot, r) = JacobiRotation::make_givens(
                    self.a.read(istart, istart),
                    self.a.read(istart + 1, istart),
                );
                self.a.write(istart, istart, r);
                self.a.write(istart + 1, istart, E::zero());
                let istop_m = self.istop_m;
                self.rotate_rows(
                    rot,
                    istart,
                    istart + 1,
                    istart + 1..istop_m,
                    istart + 1..istop_m,
                );
            }

            log::trace!(target: "lakit_evd", "infinite eigenvalue deflated at {istart}");
            self.alpha
                .write(istart, self.a.read(istart, istart).into_complex());
            self.beta.write(istart, E::zero());
            self.istart = istart + 1;
        }
    }

    /// Normalizes the 1×1 block at `istart` so that `B(istart, istart)` is real and non-negative,
    /// then stores its eigenvalue.
    fn deflate_1x1(&mut self, small_num: E::Real) {
        let zero = E::Real::zero();
        let i = self.istart;
        let rows = self.istart_m..i + 1;

        let bii = self.b.read(i, i);
        let scal = match E::KIND {
            ScalarKind::Real => {
                if bii.real() < zero {
                    Some(-E::one())
                } else {
                    None
                }
            }
            ScalarKind::Complex => {
                let abs_b = bii.abs();
                if abs_b > small_num && (bii.imag() != zero || bii.real() < zero) {
                    Some(bii.scale(abs_b.inv()).conj())
                } else {
                    if abs_b <= small_num {
                        self.b.write(i, i, E::zero());
                    }
                    None
                }
            }
        };

        if let Some(scal) = scal {
            for k in rows {
                self.a.write(k, i, scal * self.a.read(k, i));
                self.b.write(k, i, scal * self.b.read(k, i));
            }
            if let Some(mut z) = self.z.rb_mut() {
                for k in 0..z.nrows() {
                    let value = scal * z.read(k, i);
                    z.write(k, i, value);
                }
            }
            if E::KIND == ScalarKind::Complex {
                self.b.write(i, i, E::from_real(bii.abs()));
            }
        }

        log::trace!(target: "lakit_evd", "1x1 block deflated at {i}");
        self.alpha.write(i, self.a.read(i, i).into_complex());
        self.beta.write(i, self.b.read(i, i));
    }

    /// Computes the eigenvalues of the real 2×2 block at `istart`, and stores them. Returns
    /// `true` if they are a complex conjugate pair, in which case the block can be split off.
    fn deflate_2x2(&mut self) -> bool {
        let i = self.istart;
        let ((alpha1, beta1), (alpha2, beta2)) = eig22(
            self.a.rb().submatrix(i, i, 2, 2),
            self.b.rb().submatrix(i, i, 2, 2),
        );
        self.alpha.write(i, alpha1);
        self.alpha.write(i + 1, alpha2);
        self.beta.write(i, beta1);
        self.beta.write(i + 1, beta2);

        // the block is left unstandardized
        let split = alpha1.imag() != E::Real::zero();
        if split {
            log::trace!(target: "lakit_evd", "2x2 block deflated at {i}");
        }
        split
    }

    /// Performs one implicit double-shift QZ sweep over the active window.
    fn sweep(
        &mut self,
        shift1: E::Complex,
        shift2: E::Complex,
        beta1: E,
        beta2: E,
        eps: E::Real,
    ) {
        let istart = self.istart;
        let istop = self.istop;
        let mut v_data = [E::zero(); 3];

        // check whether the shifts can be introduced lower in the window, without disturbing
        // a small subdiagonal entry
        let mut istart2 = istart;
        if istart + 3 < istop {
            for i in (istart + 1..=istop - 3).rev() {
                let mut v = ColMut::from_slice_mut(&mut v_data);
                shiftcolumn(
                    self.a.rb().submatrix(i, i, 3, 3),
                    self.b.rb().submatrix(i, i, 3, 3),
                    v.rb_mut(),
                    shift1,
                    shift2,
                    beta1,
                    beta2,
                );
                let (_, r) = JacobiRotation::make_givens(v.read(1), v.read(2));
                let (rot2, _) = JacobiRotation::make_givens(v.read(0), r);

                let a = self.a.rb();
                let refsum = (-rot2.s.conj() * a.read(i, i - 1)).abs1();
                let tst = a.read(i, i - 1).abs1()
                    + a.read(i, i + 1).abs1()
                    + a.read(i + 1, i + 2).abs1();
                if refsum < eps * tst {
                    istart2 = i;
                    break;
                }
            }
        }

        for i in istart2..istop - 1 {
            let nr = Ord::min(3, istop - i);
            let mut rot1 = JacobiRotation::<E>::identity();
            let rot2;

            // rotations from the left
            if i == istart2 {
                let mut v = ColMut::from_slice_mut(&mut v_data[..nr]);
                shiftcolumn(
                    self.a.rb().submatrix(i, i, nr, nr),
                    self.b.rb().submatrix(i, i, nr, nr),
                    v.rb_mut(),
                    shift1,
                    shift2,
                    beta1,
                    beta2,
                );
                let mut v1 = v.read(1);
                if nr == 3 {
                    (rot1, v1) = JacobiRotation::make_givens(v1, v.read(2));
                }
                (rot2, _) = JacobiRotation::make_givens(v.read(0), v1);

                if i > istart {
                    let value = self.a.read(i, i - 1).scale(rot2.c);
                    self.a.write(i, i - 1, value);
                }
            } else {
                if nr == 3 {
                    let r;
                    (rot1, r) = JacobiRotation::make_givens(
                        self.a.read(i + 1, i - 1),
                        self.a.read(i + 2, i - 1),
                    );
                    self.a.write(i + 1, i - 1, r);
                    self.a.write(i + 2, i - 1, E::zero());
                }
                let r;
                (rot2, r) =
                    JacobiRotation::make_givens(self.a.read(i, i - 1), self.a.read(i + 1, i - 1));
                self.a.write(i, i - 1, r);
                self.a.write(i + 1, i - 1, E::zero());
            }

            let istop_m = self.istop_m;
            if nr == 3 {
                self.rotate_rows(rot1, i + 1, i + 2, i..istop_m, i..istop_m);
            }
            self.rotate_rows(rot2, i, i + 1, i..istop_m, i..istop_m);

            // remove fill-in from B
            if nr == 3 {
                let (rot, r) =
                    JacobiRotation::make_givens(self.b.read(i + 2, i + 2), self.b.read(i + 2, i + 1));
                rot1 = rot.adjoint();
                self.b.write(i + 2, i + 2, r);
                self.b.write(i + 2, i + 1, E::zero());

                // also apply it to the row above, to compute the next rotation
                let (x, y) = self
                    .b
                    .rb_mut()
                    .subrows(i + 1, 1)
                    .two_cols_mut(i + 1, i + 2);
                rot1.apply_on_the_right_in_place(x, y);
            }
            let (rot, r) =
                JacobiRotation::make_givens(self.b.read(i + 1, i + 1), self.b.read(i + 1, i));
            let rot2 = rot.adjoint();
            self.b.write(i + 1, i + 1, r);
            self.b.write(i + 1, i, E::zero());

            // rotations from the right
            let istart_m = self.istart_m;
            let a_rows = istart_m..Ord::min(i + 4, self.ihi);
            if nr == 3 {
                self.rotate_cols(rot1, i + 1, i + 2, a_rows.clone(), istart_m..i + 1);
            }
            self.rotate_cols(rot2, i, i + 1, a_rows, istart_m..i + 1);
        }
    }
}

/// Computes the generalized Schur form of the pencil `(a, b)`, where `a` is upper Hessenberg and
/// `b` is upper triangular on the rows and columns `ilo..ihi`, using the implicit single/double
/// shift QZ algorithm.
///
/// - If `want_s` is true, the full Schur form is computed: `a` is reduced to quasi upper
/// triangular form (1×1 blocks, and 2×2 blocks for complex conjugate pairs of a real pencil), and
/// `b` to upper triangular form, with a non-negative real diagonal on 1×1 blocks. Otherwise, only
/// the eigenvalues are computed, and the rest of the matrices is left in an unspecified state.
/// - If `q` (resp. `z`) is provided, it is multiplied from the right by the left (resp. right)
/// transformations, so that `Q A Z^H` and `Q B Z^H` are preserved.
/// - The eigenvalues are stored as `alpha[i] / beta[i]`, for `i` in `ilo..ihi`. `beta[i] = 0`
/// denotes an infinite eigenvalue.
///
/// `epsilon` and `zero_threshold` are usually [`RealField::epsilon`] and
/// [`RealField::zero_threshold`].
///
/// # Panics
///
/// Panics if the dimensions of the matrices and vectors do not match, or if `ilo..ihi` is not a
/// valid range.
///
/// # Errors
///
/// Returns [`SchurError::NonConverged`] if the iteration budget is exhausted. The eigenvalues
/// with indices in `last_valid_index..ihi` have been computed.
#[track_caller]
pub fn lahqz<E: ComplexField>(
    want_s: bool,
    a: MatMut<'_, E>,
    b: MatMut<'_, E>,
    q: Option<MatMut<'_, E>>,
    z: Option<MatMut<'_, E>>,
    alpha: ColMut<'_, E::Complex>,
    beta: ColMut<'_, E>,
    ilo: usize,
    ihi: usize,
    epsilon: E::Real,
    zero_threshold: E::Real,
    params: QzParams,
) -> Result<(), SchurError> {
    let n = a.nrows();
    assert!(a.ncols() == n);
    assert!(b.nrows() == n);
    assert!(b.ncols() == n);
    assert!(alpha.nrows() == n);
    assert!(beta.nrows() == n);
    assert!(ilo <= ihi);
    assert!(ihi <= n);
    assert!(params.non_convergence_limit > 0);
    if let Some(q) = q.rb() {
        assert!(q.nrows() == n);
        assert!(q.ncols() == n);
    }
    if let Some(z) = z.rb() {
        assert!(z.nrows() == n);
        assert!(z.ncols() == n);
    }

    let nh = ihi - ilo;
    if nh == 0 {
        return Ok(());
    }

    let eps = epsilon;
    let small_num = zero_threshold;

    // iteration budget
    let itmax = params.iterations_per_eigenvalue * Ord::max(10, nh);
    // number of sweeps since the last deflation
    let mut k_defl = 0usize;

    let bnorm = norm_frobenius(b.rb().submatrix(ilo, ilo, nh, nh));
    let infinite_tol = threshold(bnorm, eps, small_num);

    // accumulated exceptional shift
    let mut eshift = E::zero();

    let mut ctx = QzCtx {
        a,
        b,
        q,
        z,
        alpha,
        beta,
        n,
        ilo,
        ihi,
        want_s,
        istart: ilo,
        istop: ihi,
        istart_m: ilo,
        istop_m: ihi,
    };

    for iter in 0..=itmax {
        if iter == itmax {
            log::warn!(
                target: "lakit_evd",
                "QZ iteration did not converge after {itmax} sweeps, only eigenvalues {}..{ihi} are valid",
                ctx.istop,
            );
            return Err(SchurError::NonConverged {
                last_valid_index: ctx.istop,
            });
        }

        ctx.update_rotation_range();

        if ctx.istart + 1 >= ctx.istop {
            if ctx.istart + 1 == ctx.istop {
                ctx.deflate_1x1(small_num);
            }
            break;
        }

        ctx.check_split(eps, small_num);
        ctx.deflate_infinite(infinite_tol);

        if ctx.istart == ctx.istop {
            ctx.istop -= 1;
            ctx.istart = ilo;
            continue;
        }

        if ctx.istart + 1 == ctx.istop {
            k_defl = 0;
            ctx.deflate_1x1(small_num);
            ctx.istop = ctx.istart;
            ctx.istart = ilo;
            continue;
        }

        if E::KIND == ScalarKind::Real && ctx.istart + 2 == ctx.istop && ctx.deflate_2x2() {
            k_defl = 0;
            ctx.istop = ctx.istart;
            ctx.istart = ilo;
            continue;
        }

        k_defl += 1;
        let istop = ctx.istop;
        let limit = params.non_convergence_limit;

        let (shift1, shift2, beta1, beta2) = if k_defl % limit == 0 {
            // exceptional shift
            // (k_defl % 2) * limit is zero whenever k_defl is even
            let k = if (k_defl % 2) * limit == 0 || istop < 2 {
                istop - 1
            } else {
                istop - 2
            };
            eshift = eshift + ctx.a.read(k, k) / ctx.b.read(k, k);
            log::trace!(target: "lakit_evd", "exceptional shift after {k_defl} sweeps without deflation");
            (
                eshift.into_complex(),
                eshift.into_complex(),
                E::one(),
                E::one(),
            )
        } else {
            // wilkinson shift
            let ((s1, b1), (s2, b2)) = eig22(
                ctx.a.rb().submatrix(istop - 2, istop - 2, 2, 2),
                ctx.b.rb().submatrix(istop - 2, istop - 2, 2, 2),
            );
            let zero = E::Real::zero();
            if E::KIND == ScalarKind::Complex || (s1.imag() == zero && s2.imag() == zero) {
                // the shifts are not a complex conjugate pair, keep only the one closest to the
                // trailing eigenvalue estimate, as lahqr does. xHGEQZ uses both shifts unchanged
                let target = (ctx.a.read(istop - 1, istop - 1) / ctx.b.read(istop - 1, istop - 1))
                    .into_complex();
                let d1 = (s1 / b1.into_complex() - target).abs();
                let d2 = (s2 / b2.into_complex() - target).abs();
                if d1 <= d2 {
                    (s1, s1, b1, b1)
                } else {
                    (s2, s2, b2, b2)
                }
            } else {
                (s1, s2, b1, b2)
            }
        };

        ctx.sweep(shift1, shift2, beta1, beta2, eps);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::assert;
    use assert_approx_eq::assert_approx_eq;
    use lakit_core::{c64, mat, Mat};
    use rand::random;

    fn run_lahqz<E: ComplexField>(
        a: &mut Mat<E>,
        b: &mut Mat<E>,
        q: &mut Mat<E>,
        z: &mut Mat<E>,
    ) -> (Result<(), SchurError>, Vec<E::Complex>, Vec<E>) {
        let n = a.nrows();
        let mut alpha = vec![E::Complex::zero(); n];
        let mut beta = vec![E::zero(); n];
        let result = lahqz(
            true,
            a.as_mut(),
            b.as_mut(),
            Some(q.as_mut()),
            Some(z.as_mut()),
            ColMut::from_slice_mut(&mut alpha),
            ColMut::from_slice_mut(&mut beta),
            0,
            n,
            E::Real::epsilon(),
            E::Real::zero_threshold(),
            QzParams::default(),
        );
        (result, alpha, beta)
    }

    fn random_hessenberg(n: usize) -> Mat<f64> {
        Mat::with_dims(n, n, |i, j| {
            if i <= j + 1 {
                2.0 * random::<f64>() - 1.0
            } else {
                0.0
            }
        })
    }

    fn random_triangular(n: usize) -> Mat<f64> {
        Mat::with_dims(n, n, |i, j| {
            if i == j {
                let x = 0.5 + random::<f64>();
                if random::<bool>() {
                    x
                } else {
                    -x
                }
            } else if i < j {
                2.0 * random::<f64>() - 1.0
            } else {
                0.0
            }
        })
    }

    fn assert_orthogonal<E: ComplexField>(q: &Mat<E>) {
        let n = q.nrows();
        let qhq = q.adjoint() * q;
        for j in 0..n {
            for i in 0..n {
                let target = if i == j { 1.0 } else { 0.0 };
                assert!((qhq.read(i, j) - E::from_f64(target)).abs() < E::Real::from_f64(1e-10));
            }
        }
    }

    fn assert_reconstructs<E: ComplexField>(q: &Mat<E>, s: &Mat<E>, z: &Mat<E>, orig: &Mat<E>) {
        let n = orig.nrows();
        let rec = q * s * &z.adjoint();
        for j in 0..n {
            for i in 0..n {
                assert!((rec.read(i, j) - orig.read(i, j)).abs() < E::Real::from_f64(1e-10));
            }
        }
    }

    #[test]
    fn test_eig22_diagonal() {
        let a = mat![[2.0f64, 0.0], [0.0, 3.0]];
        let b = mat![[1.0f64, 0.0], [0.0, 1.0]];
        let ((a1, b1), (a2, b2)) = eig22(a.as_ref(), b.as_ref());

        assert!(a1.im == 0.0);
        assert!(a2.im == 0.0);
        let mut eigs = [a1.re / b1, a2.re / b2];
        eigs.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_approx_eq!(eigs[0], 2.0);
        assert_approx_eq!(eigs[1], 3.0);
    }

    #[test]
    fn test_eig22_scaled_b() {
        let a = mat![[1.0f64, 2.0], [3.0, 4.0]];
        let b = mat![[2.0f64, 1.0], [0.0, 0.5]];
        let ((a1, b1), (a2, b2)) = eig22(a.as_ref(), b.as_ref());
        assert!(b1 >= 0.0);
        assert!(b2 >= 0.0);

        // det(A - lambda B) = 0
        for (alpha, beta) in [(a1, b1), (a2, b2)] {
            let lambda = alpha / beta;
            let det = (c64::new(1.0, 0.0) - lambda * 2.0) * (c64::new(4.0, 0.0) - lambda * 0.5)
                - (c64::new(2.0, 0.0) - lambda) * 3.0;
            assert!(det.norm() < 1e-12);
        }
    }

    #[test]
    fn test_eig22_complex_pair() {
        let a = mat![[0.0f64, 1.0], [-1.0, 0.0]];
        let b = mat![[1.0f64, 0.0], [0.0, 1.0]];
        let ((a1, b1), (a2, b2)) = eig22(a.as_ref(), b.as_ref());

        assert!(a2 == a1.conj());
        assert!(b1 == b2);
        assert_approx_eq!(a1.re / b1, 0.0);
        assert_approx_eq!(a1.im.abs() / b1, 1.0);
    }

    #[test]
    fn test_eig22_cplx() {
        let a = mat![
            [c64::new(1.0, 1.0), c64::new(0.5, -2.0)],
            [c64::new(-1.0, 0.25), c64::new(0.0, 3.0)],
        ];
        let b = mat![
            [c64::new(0.0, 2.0), c64::new(1.0, 1.0)],
            [c64::new(0.0, 0.0), c64::new(-1.0, 0.0)],
        ];
        let ((a1, b1), (a2, b2)) = eig22(a.as_ref(), b.as_ref());
        assert!(b1.im == 0.0);
        assert!(b1.re >= 0.0);
        for (alpha, beta) in [(a1, b1), (a2, b2)] {
            let lambda = alpha / beta;
            let det = (a.read(0, 0) - lambda * b.read(0, 0)) * (a.read(1, 1) - lambda * b.read(1, 1))
                - (a.read(0, 1) - lambda * b.read(0, 1)) * a.read(1, 0);
            assert!(det.norm() < 1e-12);
        }
    }

    #[test]
    fn test_shiftcolumn_exact_shifts_vanish() {
        // with both exact eigenvalues as shifts, the 2x2 shift column is zero
        let a = mat![[1.0f64, 2.0], [0.5, -1.0]];
        let b = mat![[2.0f64, 0.5], [0.0, 1.0]];
        let ((s1, b1), (s2, b2)) = eig22(a.as_ref(), b.as_ref());
        let mut v = [1.0, 1.0];
        shiftcolumn(
            a.as_ref(),
            b.as_ref(),
            ColMut::from_slice_mut(&mut v),
            s1,
            s2,
            b1,
            b2,
        );
        assert!(v[0].abs() < 1e-12);
        assert!(v[1].abs() < 1e-12);
    }

    #[test]
    fn test_shiftcolumn_direction() {
        let a = mat![[1.0f64, 2.0, 0.5], [0.5, -1.0, 1.0], [0.0, 0.25, 3.0]];
        let b = mat![[2.0f64, 0.5, 1.0], [0.0, 1.0, -1.0], [0.0, 0.0, 0.5]];
        let s1 = c64::new(0.5, 0.0);
        let s2 = c64::new(-1.0, 0.0);
        let mut v = [0.0; 3];
        shiftcolumn(
            a.as_ref(),
            b.as_ref(),
            ColMut::from_slice_mut(&mut v),
            s1,
            s2,
            1.0,
            1.0,
        );

        // explicit (A - s1 B) B^-1 (A - s2 B) e1
        let w = [a.read(0, 0) + b.read(0, 0), a.read(1, 0)];
        let y1 = w[1] / b.read(1, 1);
        let y0 = (w[0] - b.read(0, 1) * y1) / b.read(0, 0);
        let expected = [
            a.read(0, 0) * y0 + a.read(0, 1) * y1 - 0.5 * (b.read(0, 0) * y0 + b.read(0, 1) * y1),
            a.read(1, 0) * y0 + a.read(1, 1) * y1 - 0.5 * (b.read(1, 1) * y1),
            a.read(2, 1) * y1,
        ];

        // parallel vectors
        let k = if expected[0].abs() > expected[1].abs() { 0 } else { 1 };
        let ratio = v[k] / expected[k];
        for i in 0..3 {
            assert_approx_eq!(v[i], ratio * expected[i]);
        }
    }

    #[test]
    fn test_diagonal_pencil() {
        let mut a = mat![[2.0f64, 0.0], [0.0, 3.0]];
        let mut b = Mat::<f64>::identity(2);
        let mut q = Mat::<f64>::identity(2);
        let mut z = Mat::<f64>::identity(2);
        let (result, alpha, beta) = run_lahqz(&mut a, &mut b, &mut q, &mut z);

        assert!(result == Ok(()));
        assert!(alpha[0] == c64::new(2.0, 0.0));
        assert!(alpha[1] == c64::new(3.0, 0.0));
        assert!(beta == vec![1.0, 1.0]);
        assert!(q == Mat::identity(2));
        assert!(z == Mat::identity(2));
    }

    #[test]
    fn test_complex_pair_block() {
        let mut a = mat![[0.0f64, 1.0], [-1.0, 0.0]];
        let mut b = Mat::<f64>::identity(2);
        let mut q = Mat::<f64>::identity(2);
        let mut z = Mat::<f64>::identity(2);
        let (result, alpha, beta) = run_lahqz(&mut a, &mut b, &mut q, &mut z);

        assert!(result == Ok(()));
        // the 2x2 block is not split
        assert!(a.read(1, 0) != 0.0);
        assert!(alpha[1] == alpha[0].conj());
        for i in 0..2 {
            assert_approx_eq!(alpha[i].re / beta[i], 0.0);
            assert_approx_eq!(alpha[i].im.abs() / beta[i], 1.0);
        }
    }

    #[test]
    fn test_infinite_eigenvalue() {
        let a0 = mat![[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0], [0.0, 7.0, 8.0]];
        let b0 = mat![[1.0f64, 1.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0, 1.0]];
        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut q = Mat::<f64>::identity(3);
        let mut z = Mat::<f64>::identity(3);
        let (result, alpha, beta) = run_lahqz(&mut a, &mut b, &mut q, &mut z);

        assert!(result == Ok(()));
        let infinite: Vec<usize> = (0..3).filter(|&i| beta[i] == 0.0).collect();
        assert!(infinite.len() == 1);
        let i = infinite[0];
        assert!(alpha[i].norm() > 1e-3);
        for k in 0..3 {
            if k != i {
                assert!(beta[k] > 0.0);
                assert!(alpha[k].re.is_finite());
            }
        }

        assert_orthogonal(&q);
        assert_orthogonal(&z);
        assert_reconstructs(&q, &a, &z, &a0);
        assert_reconstructs(&q, &b, &z, &b0);
    }

    #[test]
    fn test_n() {
        for n in [1, 2, 3, 4, 5, 8, 16, 32] {
            for _ in 0..10 {
                let a0 = random_hessenberg(n);
                let b0 = random_triangular(n);
                let mut a = a0.clone();
                let mut b = b0.clone();
                let mut q = Mat::<f64>::identity(n);
                let mut z = Mat::<f64>::identity(n);
                let (result, alpha, beta) = run_lahqz(&mut a, &mut b, &mut q, &mut z);
                assert!(result == Ok(()));

                assert_orthogonal(&q);
                assert_orthogonal(&z);
                assert_reconstructs(&q, &a, &z, &a0);
                assert_reconstructs(&q, &b, &z, &b0);

                for j in 0..n {
                    for i in j + 1..n {
                        assert!(b.read(i, j) == 0.0);
                    }
                    for i in j + 2..n {
                        assert!(a.read(i, j) == 0.0);
                    }
                }

                let mut i = 0;
                while i < n {
                    if i + 1 < n && a.read(i + 1, i) != 0.0 {
                        // complex conjugate pair
                        assert!(alpha[i].im != 0.0);
                        assert!(alpha[i + 1] == alpha[i].conj());
                        assert!(i + 2 == n || a.read(i + 2, i + 1) == 0.0);
                        i += 2;
                    } else {
                        assert!(alpha[i].im == 0.0);
                        assert!(alpha[i].re == a.read(i, i));
                        assert!(beta[i] == b.read(i, i));
                        assert!(beta[i] >= 0.0);
                        i += 1;
                    }
                }
            }
        }
    }

    #[test]
    fn test_eigenvalues_only() {
        let n = 12;
        let a0 = random_hessenberg(n);
        let b0 = random_triangular(n);

        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut q = Mat::<f64>::identity(n);
        let mut z = Mat::<f64>::identity(n);
        let (_, alpha_full, beta_full) = run_lahqz(&mut a, &mut b, &mut q, &mut z);

        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut alpha = vec![c64::new(0.0, 0.0); n];
        let mut beta = vec![0.0; n];
        let result = lahqz(
            false,
            a.as_mut(),
            b.as_mut(),
            None,
            None,
            ColMut::from_slice_mut(&mut alpha),
            ColMut::from_slice_mut(&mut beta),
            0,
            n,
            f64::EPSILON,
            f64::MIN_POSITIVE,
            QzParams::default(),
        );
        assert!(result == Ok(()));

        let full: Vec<c64> = (0..n).map(|i| alpha_full[i] / beta_full[i]).collect();
        let partial: Vec<c64> = (0..n).map(|i| alpha[i] / beta[i]).collect();
        assert_same_eigenvalues(&full, &partial);
    }

    pub(crate) fn assert_same_eigenvalues(lhs: &[c64], rhs: &[c64]) {
        assert!(lhs.len() == rhs.len());
        let mut used = vec![false; rhs.len()];
        for x in lhs {
            let (best, dist) = rhs
                .iter()
                .enumerate()
                .filter(|(k, _)| !used[*k])
                .map(|(k, y)| (k, (x - y).norm() / (1.0 + x.norm())))
                .fold((usize::MAX, f64::INFINITY), |acc, cur| {
                    if cur.1 < acc.1 {
                        cur
                    } else {
                        acc
                    }
                });
            assert!(dist < 1e-6);
            used[best] = true;
        }
    }

    #[test]
    fn test_cplx_n() {
        for n in [1, 2, 3, 5, 10, 24] {
            let a0 = Mat::with_dims(n, n, |i, j| {
                if i <= j + 1 {
                    c64::new(random(), random())
                } else {
                    c64::new(0.0, 0.0)
                }
            });
            let b0 = Mat::with_dims(n, n, |i, j| {
                if i == j {
                    c64::new(random::<f64>() - 0.5, random::<f64>() - 0.5)
                        + c64::new(0.5, 0.5)
                } else if i < j {
                    c64::new(random(), random())
                } else {
                    c64::new(0.0, 0.0)
                }
            });
            let mut a = a0.clone();
            let mut b = b0.clone();
            let mut q = Mat::<c64>::identity(n);
            let mut z = Mat::<c64>::identity(n);
            let (result, alpha, beta) = run_lahqz(&mut a, &mut b, &mut q, &mut z);
            assert!(result == Ok(()));

            assert_orthogonal(&q);
            assert_orthogonal(&z);
            assert_reconstructs(&q, &a, &z, &a0);
            assert_reconstructs(&q, &b, &z, &b0);

            for j in 0..n {
                for i in j + 1..n {
                    assert!(a.read(i, j) == c64::new(0.0, 0.0));
                    assert!(b.read(i, j) == c64::new(0.0, 0.0));
                }
                assert!(b.read(j, j).im == 0.0);
                assert!(b.read(j, j).re >= 0.0);
                assert!(alpha[j] == a.read(j, j));
                assert!(beta[j] == b.read(j, j));
            }
        }
    }

    #[test]
    fn test_non_convergence() {
        let n = 6;
        let a0 = random_hessenberg(n);
        let b0 = random_triangular(n);
        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut alpha = vec![c64::new(0.0, 0.0); n];
        let mut beta = vec![0.0; n];

        let mut params = QzParams::default();
        params.iterations_per_eigenvalue = 0;

        let result = lahqz(
            true,
            a.as_mut(),
            b.as_mut(),
            None,
            None,
            ColMut::from_slice_mut(&mut alpha),
            ColMut::from_slice_mut(&mut beta),
            0,
            n,
            f64::EPSILON,
            f64::MIN_POSITIVE,
            params,
        );
        assert!(result == Err(SchurError::NonConverged { last_valid_index: n }));
    }

    #[test]
    fn test_badly_scaled_pencil() {
        for scale in [1e-150, 1e150] {
            for n in [3, 10] {
                let a0 = random_hessenberg(n);
                let b0 = random_triangular(n);

                let mut a = a0.clone();
                let mut b = b0.clone();
                let mut q = Mat::<f64>::identity(n);
                let mut z = Mat::<f64>::identity(n);
                let (result, alpha_ref, beta_ref) = run_lahqz(&mut a, &mut b, &mut q, &mut z);
                assert!(result == Ok(()));

                let mut a = Mat::with_dims(n, n, |i, j| scale * a0.read(i, j));
                let mut b = b0.clone();
                let mut q = Mat::<f64>::identity(n);
                let mut z = Mat::<f64>::identity(n);
                let (result, alpha, beta) = run_lahqz(&mut a, &mut b, &mut q, &mut z);
                assert!(result == Ok(()));

                for i in 0..n {
                    assert!(alpha[i].re.is_finite());
                    assert!(alpha[i].im.is_finite());
                    assert!(beta[i] > 0.0);
                }
                assert_orthogonal(&q);
                assert_orthogonal(&z);

                let expected: Vec<c64> =
                    (0..n).map(|i| alpha_ref[i] / beta_ref[i]).collect();
                let unscaled: Vec<c64> =
                    (0..n).map(|i| (alpha[i] / beta[i]).unscale(scale)).collect();
                assert_same_eigenvalues(&expected, &unscaled);
            }
        }
    }

    #[test]
    fn test_partial_convergence() {
        let n = 30;
        let a0 = random_hessenberg(n);
        let b0 = random_triangular(n);

        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut q = Mat::<f64>::identity(n);
        let mut z = Mat::<f64>::identity(n);
        let (result, alpha_full, beta_full) = run_lahqz(&mut a, &mut b, &mut q, &mut z);
        assert!(result == Ok(()));
        let full: Vec<c64> = (0..n).map(|i| alpha_full[i] / beta_full[i]).collect();

        let mut a = a0.clone();
        let mut b = b0.clone();
        let mut q = Mat::<f64>::identity(n);
        let mut z = Mat::<f64>::identity(n);
        let mut alpha = vec![c64::new(0.0, 0.0); n];
        let mut beta = vec![0.0; n];

        let mut params = QzParams::default();
        params.iterations_per_eigenvalue = 1;

        let result = lahqz(
            true,
            a.as_mut(),
            b.as_mut(),
            Some(q.as_mut()),
            Some(z.as_mut()),
            ColMut::from_slice_mut(&mut alpha),
            ColMut::from_slice_mut(&mut beta),
            0,
            n,
            f64::EPSILON,
            f64::MIN_POSITIVE,
            params,
        );

        let k = match result {
            Err(SchurError::NonConverged { last_valid_index }) => last_valid_index,
            other => panic!("expected a non-converged result, got {other:?}"),
        };
        assert!(0 < k);
        assert!(k < n);

        // the pencil is still an equivalence transformation of the input
        assert_orthogonal(&q);
        assert_orthogonal(&z);
        assert_reconstructs(&q, &a, &z, &a0);
        assert_reconstructs(&q, &b, &z, &b0);

        for i in k..n {
            let lambda = alpha[i] / beta[i];
            let dist = full
                .iter()
                .map(|mu| (lambda - mu).norm() / (1.0 + lambda.norm()))
                .fold(f64::INFINITY, f64::min);
            assert!(dist < 1e-6);
        }
    }
}
