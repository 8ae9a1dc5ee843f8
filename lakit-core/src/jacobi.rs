use crate::{ColMut, ComplexField, RealField, RowMut};
use assert2::assert as fancy_assert;

/// `x / |x|`, dividing each part by the modulus so that no intermediate under- or overflows.
#[inline(always)]
fn unit<E: ComplexField>(x: E, abs: E::Real) -> E {
    let (re, im) = x.into_real_imag();
    E::from_real_imag(re / abs, im / abs)
}

/// Plane rotation
/// ```text
/// G = [     c    s ]
///     [ -conj(s) c ]
/// ```
/// with `c` real and `c^2 + |s|^2 = 1`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct JacobiRotation<E: ComplexField> {
    pub c: E::Real,
    pub s: E,
}

impl<E: ComplexField> JacobiRotation<E> {
    #[inline]
    pub fn identity() -> Self {
        Self {
            c: E::Real::one(),
            s: E::zero(),
        }
    }

    /// Returns the rotation `G` and the value `r` such that `G * [f; g] = [r; 0]`.
    ///
    /// `c` is always non-negative. If `g` is zero, `G` is the identity. No squares of `f` or `g`
    /// are formed, so the result is accurate over the whole exponent range.
    #[inline]
    pub fn make_givens(f: E, g: E) -> (Self, E) {
        let zero = E::Real::zero();
        if g == E::zero() {
            (Self::identity(), f)
        } else if f == E::zero() {
            let g1 = g.abs();
            (
                Self {
                    c: zero,
                    s: unit(g, g1).conj(),
                },
                E::from_real(g1),
            )
        } else {
            let f1 = f.abs();
            let g1 = g.abs();
            let h1 = f1.hypot(g1);
            let f_unit = unit(f, f1);
            let c = f1 / h1;
            let r = f_unit.scale(h1);
            let s = (unit(g, g1).conj() * f_unit).scale(g1 / h1);
            (Self { c, s }, r)
        }
    }

    /// Returns the rotation with conjugated `s`.
    #[inline]
    pub fn conj(&self) -> Self {
        Self {
            c: self.c,
            s: self.s.conj(),
        }
    }

    /// Returns `G^H`.
    #[inline]
    pub fn adjoint(&self) -> Self {
        Self {
            c: self.c,
            s: -self.s,
        }
    }

    /// Applies `G` to the pair `(x, y)`.
    #[inline]
    pub fn apply_on_the_left_2x1(&self, x: E, y: E) -> (E, E) {
        let Self { c, s } = *self;
        (x.scale(c) + s * y, y.scale(c) - s.conj() * x)
    }

    /// `[x; y] <- G * [x; y]`.
    #[track_caller]
    #[inline]
    pub fn apply_on_the_left_in_place(&self, mut x: RowMut<'_, E>, mut y: RowMut<'_, E>) {
        fancy_assert!(x.ncols() == y.ncols());
        if self.c == E::Real::one() && self.s == E::zero() {
            return;
        }
        for j in 0..x.ncols() {
            let (x_, y_) = self.apply_on_the_left_2x1(x.read(j), y.read(j));
            x.write(j, x_);
            y.write(j, y_);
        }
    }

    /// `[x, y] <- [x, y] * G^H`.
    #[track_caller]
    #[inline]
    pub fn apply_on_the_right_in_place(&self, mut x: ColMut<'_, E>, mut y: ColMut<'_, E>) {
        fancy_assert!(x.nrows() == y.nrows());
        if self.c == E::Real::one() && self.s == E::zero() {
            return;
        }
        let this = self.conj();
        for i in 0..x.nrows() {
            let (x_, y_) = this.apply_on_the_left_2x1(x.read(i), y.read(i));
            x.write(i, x_);
            y.write(i, y_);
        }
    }
}
