//! Linear arithmetic over exact rationals
//!
//! Pure terms are linear polynomials `q0 + q1*x1 + ... + qn*xn`. The
//! canonizer flattens sums, folds constants and orders monomials by
//! variable, so two equal polynomials have identical term
//! representations. The solver isolates one variable, preferring
//! external over engine-generated and non-slack over slack, and divides
//! through by its coefficient; linear equations therefore always solve
//! or refute, never fall back.

use crate::cnstrnt::Cnstrnt;
use crate::term::{Sym, Term, Var, VarKind};
use crate::theory::{SolveFailure, Solved, Theory, TheoryId};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::collections::BTreeMap;

/// A linear polynomial in canonical form: constant plus monomials with
/// nonzero coefficients, keyed by variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Poly {
    constant: BigRational,
    monomials: BTreeMap<Var, BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly {
            constant: BigRational::zero(),
            monomials: BTreeMap::new(),
        }
    }

    pub fn constant(q: BigRational) -> Self {
        Poly {
            constant: q,
            monomials: BTreeMap::new(),
        }
    }

    pub fn var(x: Var) -> Self {
        let mut monomials = BTreeMap::new();
        monomials.insert(x, BigRational::one());
        Poly {
            constant: BigRational::zero(),
            monomials,
        }
    }

    /// Parse a pure linear term; `None` when a foreign application occurs
    pub fn of_term(t: &Term) -> Option<Poly> {
        match t {
            Term::Var(x) => Some(Poly::var(*x)),
            Term::App(Sym::Num(q), _) => Some(Poly::constant(q.clone())),
            Term::App(Sym::Add, args) => {
                let mut acc = Poly::zero();
                for a in args {
                    acc.add_assign(&Poly::of_term(a)?);
                }
                Some(acc)
            }
            Term::App(Sym::Multq(q), args) => {
                let mut p = Poly::of_term(args.first()?)?;
                p.scale_assign(q);
                Some(p)
            }
            _ => None,
        }
    }

    /// The canonical term for this polynomial
    pub fn to_term(&self) -> Term {
        let mut parts: Vec<Term> = Vec::new();
        if !self.constant.is_zero() {
            parts.push(Term::num(self.constant.clone()));
        }
        for (x, q) in &self.monomials {
            if q.is_one() {
                parts.push(Term::Var(*x));
            } else {
                parts.push(Term::multq(q.clone(), Term::Var(*x)));
            }
        }
        match parts.len() {
            0 => Term::num(BigRational::zero()),
            1 => parts.pop().unwrap(),
            _ => Term::add(parts),
        }
    }

    pub fn add_assign(&mut self, other: &Poly) {
        self.constant += &other.constant;
        for (x, q) in &other.monomials {
            let entry = self
                .monomials
                .entry(*x)
                .or_insert_with(BigRational::zero);
            *entry += q;
            if entry.is_zero() {
                self.monomials.remove(x);
            }
        }
    }

    pub fn sub_assign(&mut self, other: &Poly) {
        let mut neg = other.clone();
        neg.scale_assign(&-BigRational::one());
        self.add_assign(&neg);
    }

    pub fn scale_assign(&mut self, q: &BigRational) {
        if q.is_zero() {
            *self = Poly::zero();
            return;
        }
        self.constant *= q;
        for c in self.monomials.values_mut() {
            *c *= q;
        }
    }

    pub fn is_constant(&self) -> bool {
        self.monomials.is_empty()
    }

    pub fn constant_part(&self) -> &BigRational {
        &self.constant
    }

    pub fn monomials(&self) -> impl Iterator<Item = (Var, &BigRational)> + '_ {
        self.monomials.iter().map(|(x, q)| (*x, q))
    }

    /// The preferred pivot: smallest variable in the kind-then-id order
    pub fn pivot(&self) -> Option<Var> {
        self.monomials.keys().next().copied()
    }

    /// Evaluate under a total assignment; `None` when a variable is
    /// unassigned
    pub fn eval(&self, assign: &mut impl FnMut(Var) -> Option<BigRational>) -> Option<BigRational> {
        let mut acc = self.constant.clone();
        for (x, q) in &self.monomials {
            acc += q * assign(*x)?;
        }
        Some(acc)
    }

    /// Interval evaluation under per-variable constraints
    pub fn interval(&self, lookup: &mut impl FnMut(Var) -> Option<Cnstrnt>) -> Cnstrnt {
        let mut acc = Cnstrnt::point(self.constant.clone());
        for (x, q) in &self.monomials {
            let c = lookup(*x).unwrap_or_else(Cnstrnt::full);
            acc = acc.add(&c.scale(q));
        }
        acc
    }
}

fn gcd(a: BigInt, b: BigInt) -> BigInt {
    let mut a = if a.is_negative() { -a } else { a };
    let mut b = if b.is_negative() { -b } else { b };
    while !b.is_zero() {
        let r = &a % &b;
        a = b;
        b = r;
    }
    a
}

fn lcm(a: BigInt, b: BigInt) -> BigInt {
    if a.is_zero() || b.is_zero() {
        return BigInt::from(0);
    }
    let g = gcd(a.clone(), b.clone());
    (a / g) * b
}

/// The Diophantine gcd test: an equation `p = 0` whose variables all
/// range over the integers is unsolvable when the gcd of the (integer
/// normalized) coefficients does not divide the constant term.
pub fn diophantine_unsolvable(p: &Poly, is_int: &mut impl FnMut(Var) -> bool) -> bool {
    if p.is_constant() || !p.monomials.keys().all(|x| is_int(*x)) {
        return false;
    }
    let mut denom_lcm = BigInt::from(1);
    for q in p
        .monomials
        .values()
        .chain(std::iter::once(&p.constant))
    {
        denom_lcm = lcm(denom_lcm, q.denom().clone());
    }
    let mut g = BigInt::from(0);
    for q in p.monomials.values() {
        let scaled = q * BigRational::from_integer(denom_lcm.clone());
        g = gcd(g, scaled.to_integer());
    }
    if g.is_zero() {
        return false;
    }
    let c = &p.constant * BigRational::from_integer(denom_lcm);
    !(c.to_integer() % g).is_zero()
}

/// The linear-arithmetic theory
pub struct Arith;

impl Theory for Arith {
    fn id(&self) -> TheoryId {
        TheoryId::Arith
    }

    fn sigma(&self, sym: &Sym, args: Vec<Term>) -> Term {
        let app = Term::App(sym.clone(), args);
        match Poly::of_term(&app) {
            Some(p) => p.to_term(),
            None => app,
        }
    }

    fn solve(
        &self,
        lhs: &Term,
        rhs: &Term,
        _fresh: &mut dyn FnMut(VarKind) -> Var,
    ) -> Result<Solved, SolveFailure> {
        let (Some(pl), Some(pr)) = (Poly::of_term(lhs), Poly::of_term(rhs)) else {
            return Err(SolveFailure::Unsolvable);
        };
        let mut p = pl;
        p.sub_assign(&pr);
        if p.is_constant() {
            return if p.constant_part().is_zero() {
                Ok(vec![])
            } else {
                Err(SolveFailure::Inconsistent)
            };
        }
        // isolate the simplest variable: external before engine-generated,
        // non-slack before slack
        let x = p.pivot().expect("non-constant polynomial has a pivot");
        let q = p.monomials.remove(&x).expect("pivot has a coefficient");
        p.scale_assign(&(-BigRational::one() / q));
        Ok(vec![(x, p.to_term())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::VarTable;
    use crate::theory::theory;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    #[test]
    fn sigma_flattens_and_orders() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Arith);
        // (y + 1) + (x + 2) == 3 + x + y
        let t = th.sigma(
            &Sym::Add,
            vec![
                Term::add(vec![Term::var(y), Term::num_int(1)]),
                Term::add(vec![Term::var(x), Term::num_int(2)]),
            ],
        );
        let expect = Term::add(vec![Term::num_int(3), Term::var(x), Term::var(y)]);
        assert_eq!(t, expect);
    }

    #[test]
    fn sigma_is_idempotent() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Arith);
        let t = th.sigma(
            &Sym::Add,
            vec![
                Term::multq(q(2), Term::var(x)),
                Term::multq(q(-2), Term::var(x)),
                Term::num_int(5),
            ],
        );
        assert_eq!(t, Term::num_int(5));
        let again = match &t {
            Term::App(sym, args) => th.sigma(sym, args.clone()),
            other => other.clone(),
        };
        assert_eq!(again, t);
    }

    #[test]
    fn cancellation_drops_monomials() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let mut p = Poly::var(x);
        p.sub_assign(&Poly::var(x));
        assert!(p.is_constant());
        assert!(p.constant_part().is_zero());
    }

    #[test]
    fn solve_isolates_external_variable() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Arith);
        let mut fresh = |_k| unreachable!("linear solve needs no fresh variables");
        // x + y = 3  ==>  x = 3 - y
        let lhs = Term::add(vec![Term::var(x), Term::var(y)]);
        let solved = th.solve(&lhs, &Term::num_int(3), &mut fresh).unwrap();
        assert_eq!(solved.len(), 1);
        assert_eq!(solved[0].0, x);
        let expect = Term::add(vec![Term::num_int(3), Term::multq(q(-1), Term::var(y))]);
        assert_eq!(solved[0].1, expect);
    }

    #[test]
    fn solve_refutes_unequal_constants() {
        let th = theory(TheoryId::Arith);
        let mut fresh = |_k| unreachable!();
        assert_eq!(
            th.solve(&Term::num_int(2), &Term::num_int(3), &mut fresh),
            Err(SolveFailure::Inconsistent)
        );
        assert_eq!(
            th.solve(&Term::num_int(2), &Term::num_int(2), &mut fresh),
            Ok(vec![])
        );
    }

    #[test]
    fn diophantine_gcd_test() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        // 2x + 4y = 1 has no integer solutions
        let mut p = Poly::var(x);
        p.scale_assign(&q(2));
        let mut p4y = Poly::var(y);
        p4y.scale_assign(&q(4));
        p.add_assign(&p4y);
        p.add_assign(&Poly::constant(q(-1)));
        assert!(diophantine_unsolvable(&p, &mut |_| true));
        // 2x + 4y = 6 is fine
        let mut p2 = p.clone();
        p2.add_assign(&Poly::constant(q(7)));
        assert!(!diophantine_unsolvable(&p2, &mut |_| true));
        // reals escape the test
        assert!(!diophantine_unsolvable(&p, &mut |_| false));
    }

    #[test]
    fn interval_evaluation() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        // 1 + 2x with x in [0, 3] lies in [1, 7]
        let mut p = Poly::var(x);
        p.scale_assign(&q(2));
        p.add_assign(&Poly::constant(q(1)));
        let c = p.interval(&mut |_| {
            Some(Cnstrnt::new(
                crate::cnstrnt::Dom::Real,
                crate::cnstrnt::Interval::new(
                    crate::cnstrnt::Bound::Closed(q(0)),
                    crate::cnstrnt::Bound::Closed(q(3)),
                ),
            ))
        });
        assert!(c.member(&q(1)) && c.member(&q(7)));
        assert!(!c.member(&q(0)) && !c.member(&q(8)));
    }
}
