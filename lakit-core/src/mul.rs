use crate::{ColMut, ColRef, ComplexField, Conj, MatMut, MatRef};

use assert2::assert as fancy_assert;
use reborrow::*;

#[inline(always)]
fn conj_if<E: ComplexField>(conj: Conj, value: E) -> E {
    match conj {
        Conj::No => value,
        Conj::Yes => value.conj(),
    }
}

/// Computes the inner product `sum_i op(lhs_i) * rhs_i`, where `op` conjugates the left operand
/// if `conj_lhs` is [`Conj::Yes`].
#[track_caller]
#[inline]
pub fn inner_prod<E: ComplexField>(lhs: ColRef<'_, E>, conj_lhs: Conj, rhs: ColRef<'_, E>) -> E {
    fancy_assert!(lhs.nrows() == rhs.nrows());
    let mut acc = E::zero();
    for i in 0..lhs.nrows() {
        acc = acc + conj_if(conj_lhs, lhs.read(i)) * rhs.read(i);
    }
    acc
}

/// Computes the matrix product `[alpha * dst] + beta * op(lhs) * op(rhs)` and stores the result
/// in `dst`, where `op` conjugates the corresponding operand when requested.
///
/// If `alpha` is not provided, the preexisting values in `dst` are not read.
///
/// # Panics
///
/// Panics if the matrix dimensions are not compatible for matrix multiplication.
/// i.e.
///  - `dst.nrows() == lhs.nrows()`
///  - `dst.ncols() == rhs.ncols()`
///  - `lhs.ncols() == rhs.nrows()`
#[track_caller]
pub fn matmul<E: ComplexField>(
    dst: MatMut<'_, E>,
    lhs: MatRef<'_, E>,
    conj_lhs: Conj,
    rhs: MatRef<'_, E>,
    conj_rhs: Conj,
    alpha: Option<E>,
    beta: E,
) {
    fancy_assert!(dst.nrows() == lhs.nrows());
    fancy_assert!(dst.ncols() == rhs.ncols());
    fancy_assert!(lhs.ncols() == rhs.nrows());

    if dst.nrows() > 1
        && dst.ncols() > 1
        && dst.row_stride().unsigned_abs() != 1
        && crate::__perf_warn!(MATMUL_WARN)
    {
        if dst.col_stride().unsigned_abs() == 1 {
            log::warn!(target: "lakit_perf", "matmul prefers column-major destination. Found row-major matrix.");
        } else {
            log::warn!(target: "lakit_perf", "matmul prefers column-major destination. Found matrix with generic strides.");
        }
    }

    let mut dst = dst;
    let k = lhs.ncols();
    for j in 0..dst.ncols() {
        for i in 0..dst.nrows() {
            let mut acc = E::zero();
            for depth in 0..k {
                acc = acc + conj_if(conj_lhs, lhs.read(i, depth)) * conj_if(conj_rhs, rhs.read(depth, j));
            }
            let value = match alpha {
                Some(alpha) => alpha * dst.read(i, j) + beta * acc,
                None => beta * acc,
            };
            dst.write(i, j, value);
        }
    }
}

/// Computes the matrix-vector product `[alpha * dst] + beta * lhs * rhs` and stores the result
/// in `dst`.
///
/// If `alpha` is not provided, the preexisting values in `dst` are not read.
#[track_caller]
pub fn matvec<E: ComplexField>(
    dst: ColMut<'_, E>,
    lhs: MatRef<'_, E>,
    rhs: ColRef<'_, E>,
    alpha: Option<E>,
    beta: E,
) {
    fancy_assert!(dst.nrows() == lhs.nrows());
    fancy_assert!(lhs.ncols() == rhs.nrows());

    let mut dst = dst;
    for i in 0..dst.nrows() {
        let acc = inner_prod(lhs.row(i).transpose(), Conj::No, rhs);
        let value = match alpha {
            Some(alpha) => alpha * dst.read(i) + beta * acc,
            None => beta * acc,
        };
        dst.write(i, value);
    }
}

pub mod triangular {
    //! Triangular matrix products.

    use super::*;
    use crate::{Op, Side};

    /// Structure of the triangular operand.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BlockStructure {
        TriangularLower,
        UnitTriangularLower,
        TriangularUpper,
        UnitTriangularUpper,
    }

    impl BlockStructure {
        #[inline]
        pub fn is_lower(self) -> bool {
            matches!(
                self,
                BlockStructure::TriangularLower | BlockStructure::UnitTriangularLower
            )
        }

        #[inline]
        pub fn is_upper(self) -> bool {
            !self.is_lower()
        }

        #[inline]
        pub fn is_unit(self) -> bool {
            matches!(
                self,
                BlockStructure::UnitTriangularLower | BlockStructure::UnitTriangularUpper
            )
        }

        #[inline]
        pub fn transpose(self) -> Self {
            use BlockStructure::*;
            match self {
                TriangularLower => TriangularUpper,
                UnitTriangularLower => UnitTriangularUpper,
                TriangularUpper => TriangularLower,
                UnitTriangularUpper => UnitTriangularLower,
            }
        }
    }

    /// `op(A)(i, k)`, reading only the stored triangle of `A`.
    #[inline(always)]
    fn read_op<E: ComplexField>(
        a: MatRef<'_, E>,
        structure: BlockStructure,
        op: Op,
        i: usize,
        k: usize,
    ) -> E {
        if i == k && structure.is_unit() {
            return E::one();
        }
        match op {
            Op::NoTrans => a.read(i, k),
            Op::Trans => a.read(k, i),
            Op::ConjTrans => a.read(k, i).conj(),
        }
    }

    /// Computes `B <- alpha * op(A) * B` if `side` is [`Side::Left`], or
    /// `B <- alpha * B * op(A)` if `side` is [`Side::Right`], where `A` is triangular with the
    /// given structure.
    ///
    /// Only the triangular half of `A` named by `a_structure` is accessed, and its diagonal is not
    /// accessed if the structure has a unit diagonal.
    ///
    /// # Panics
    ///
    /// Panics if `A` is not square, or if its dimension does not match `B.nrows()` (left side) or
    /// `B.ncols()` (right side).
    #[track_caller]
    pub fn matmul_in_place<E: ComplexField>(
        side: Side,
        a: MatRef<'_, E>,
        a_structure: BlockStructure,
        op: Op,
        b: MatMut<'_, E>,
        alpha: E,
    ) {
        fancy_assert!(a.nrows() == a.ncols());
        match side {
            Side::Left => fancy_assert!(a.nrows() == b.nrows()),
            Side::Right => fancy_assert!(a.ncols() == b.ncols()),
        }

        let mut b = b;
        let n = a.nrows();
        let op_structure = if op == Op::NoTrans {
            a_structure
        } else {
            a_structure.transpose()
        };

        match side {
            Side::Left => {
                for j in 0..b.ncols() {
                    let mut col = b.rb_mut().col(j);
                    if op_structure.is_upper() {
                        // row i only depends on the rows below it
                        for i in 0..n {
                            let mut acc = E::zero();
                            for k in i..n {
                                acc = acc + read_op(a, a_structure, op, i, k) * col.read(k);
                            }
                            col.write(i, alpha * acc);
                        }
                    } else {
                        for i in (0..n).rev() {
                            let mut acc = E::zero();
                            for k in 0..i + 1 {
                                acc = acc + read_op(a, a_structure, op, i, k) * col.read(k);
                            }
                            col.write(i, alpha * acc);
                        }
                    }
                }
            }
            Side::Right => {
                for i in 0..b.nrows() {
                    let mut row = b.rb_mut().row(i);
                    if op_structure.is_upper() {
                        for j in (0..n).rev() {
                            let mut acc = E::zero();
                            for k in 0..j + 1 {
                                acc = acc + row.read(k) * read_op(a, a_structure, op, k, j);
                            }
                            row.write(j, alpha * acc);
                        }
                    } else {
                        for j in 0..n {
                            let mut acc = E::zero();
                            for k in j..n {
                                acc = acc + row.read(k) * read_op(a, a_structure, op, k, j);
                            }
                            row.write(j, alpha * acc);
                        }
                    }
                }
            }
        }
    }
}
