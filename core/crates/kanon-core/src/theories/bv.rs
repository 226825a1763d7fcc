//! Fixed-width bitvectors
//!
//! Constants, concatenation and extraction. Widths are carried on the
//! symbols, so canonization never needs a typing context: the canonizer
//! folds constants, pushes extractions through concatenations and
//! composes nested extractions. The solver decomposes aligned
//! concatenations and splits constants; anything that would require
//! slicing a variable of unknown internal structure is left to the
//! engine's naming fallback.

use crate::term::{Bitv, Sym, Term, Var, VarKind};
use crate::theory::{SolveFailure, Solved, Theory, TheoryId};
use std::collections::VecDeque;

/// The width of a pure bitvector term, when the head determines it
pub fn width(t: &Term) -> Option<usize> {
    match t {
        Term::App(Sym::BvConst(b), _) => Some(b.width()),
        Term::App(Sym::Concat(n, m), _) => Some(n + m),
        Term::App(Sym::Extract(lo, hi, _), _) => Some(hi - lo + 1),
        _ => None,
    }
}

pub struct Bv;

impl Bv {
    fn canon_extract(&self, lo: usize, hi: usize, n: usize, inner: Term) -> Term {
        // full-range extraction is the identity
        if lo == 0 && hi + 1 == n {
            return inner;
        }
        match inner {
            Term::App(Sym::BvConst(b), _) if b.width() == n => Term::bv_const(b.extract(lo, hi)),
            Term::App(Sym::Extract(lo2, _hi2, m), args2) => {
                // ext[lo,hi] of ext[lo2,hi2] reads bits lo2+lo .. lo2+hi
                let inner2 = args2.into_iter().next().unwrap_or(Term::bv_const(Bitv::new(vec![])));
                self.canon_extract(lo2 + lo, lo2 + hi, m, inner2)
            }
            Term::App(Sym::Concat(a, b), mut args2) if a + b == n && args2.len() == 2 => {
                let low = args2.pop().unwrap_or_else(|| Term::bv_const(Bitv::new(vec![])));
                let high = args2.pop().unwrap_or_else(|| Term::bv_const(Bitv::new(vec![])));
                if hi < a {
                    self.canon_extract(lo, hi, a, high)
                } else if lo >= a {
                    self.canon_extract(lo - a, hi - a, b, low)
                } else {
                    let hpart = self.canon_extract(lo, a - 1, a, high);
                    let lpart = self.canon_extract(0, hi - a, b, low);
                    self.canon_concat(a - lo, hi - a + 1, hpart, lpart)
                }
            }
            other => Term::App(Sym::Extract(lo, hi, n), vec![other]),
        }
    }

    fn canon_concat(&self, n: usize, m: usize, high: Term, low: Term) -> Term {
        // adjacent constants fold
        if let (Term::App(Sym::BvConst(a), _), Term::App(Sym::BvConst(b), _)) = (&high, &low) {
            return Term::bv_const(a.concat(b));
        }
        // adjacent extractions of the same source fuse
        if let (
            Term::App(Sym::Extract(lo1, hi1, w1), in1),
            Term::App(Sym::Extract(lo2, hi2, w2), in2),
        ) = (&high, &low)
        {
            if w1 == w2 && hi1 + 1 == *lo2 && in1 == in2 {
                let inner = in1.first().cloned();
                if let Some(inner) = inner {
                    return self.canon_extract(*lo1, *hi2, *w1, inner);
                }
            }
        }
        Term::App(Sym::Concat(n, m), vec![high, low])
    }
}

impl Theory for Bv {
    fn id(&self) -> TheoryId {
        TheoryId::Bv
    }

    fn sigma(&self, sym: &Sym, mut args: Vec<Term>) -> Term {
        match sym {
            Sym::BvConst(_) => Term::App(sym.clone(), args),
            Sym::Extract(lo, hi, n) => {
                let inner = args.pop().unwrap_or(Term::bv_const(Bitv::new(vec![])));
                self.canon_extract(*lo, *hi, *n, inner)
            }
            Sym::Concat(n, m) => {
                let low = args.pop();
                let high = args.pop();
                match (high, low) {
                    (Some(high), Some(low)) => self.canon_concat(*n, *m, high, low),
                    _ => Term::App(sym.clone(), args),
                }
            }
            _ => Term::App(sym.clone(), args),
        }
    }

    fn solve(
        &self,
        lhs: &Term,
        rhs: &Term,
        _fresh: &mut dyn FnMut(VarKind) -> Var,
    ) -> Result<Solved, SolveFailure> {
        let mut queue: VecDeque<(Term, Term)> = VecDeque::new();
        queue.push_back((lhs.clone(), rhs.clone()));
        let mut solved: Solved = Vec::new();

        while let Some((a, b)) = queue.pop_front() {
            let a = substitute(&a, &solved);
            let b = substitute(&b, &solved);
            if a == b {
                continue;
            }
            match (a, b) {
                (Term::App(Sym::BvConst(p), _), Term::App(Sym::BvConst(q), _)) => {
                    if p != q {
                        return Err(SolveFailure::Inconsistent);
                    }
                }
                (Term::Var(x), Term::Var(y)) => {
                    let (l, r) = if x < y { (x, y) } else { (y, x) };
                    bind(&mut solved, &mut queue, l, Term::Var(r));
                }
                (Term::Var(x), t) | (t, Term::Var(x)) => {
                    if t.occurs(x) {
                        // widths would have to differ
                        return Err(SolveFailure::Inconsistent);
                    }
                    bind(&mut solved, &mut queue, x, t);
                }
                (Term::App(Sym::Concat(n1, m1), xs), Term::App(Sym::Concat(n2, m2), ys)) => {
                    if n1 == n2 && m1 == m2 {
                        for (x, y) in xs.into_iter().zip(ys.into_iter()) {
                            queue.push_back((x, y));
                        }
                    } else {
                        // misaligned concatenations need variable slicing
                        return Err(SolveFailure::Unsolvable);
                    }
                }
                (Term::App(Sym::BvConst(k), _), Term::App(Sym::Concat(n, m), ys))
                | (Term::App(Sym::Concat(n, m), ys), Term::App(Sym::BvConst(k), _)) => {
                    if k.width() != n + m {
                        return Err(SolveFailure::Inconsistent);
                    }
                    let mut parts = ys.into_iter();
                    let (high, low) = match (parts.next(), parts.next()) {
                        (Some(h), Some(l)) => (h, l),
                        _ => return Err(SolveFailure::Unsolvable),
                    };
                    queue.push_back((high, Term::bv_const(k.extract(0, n - 1))));
                    queue.push_back((low, Term::bv_const(k.extract(n, n + m - 1))));
                }
                _ => return Err(SolveFailure::Unsolvable),
            }
        }
        Ok(solved)
    }
}

fn substitute(t: &Term, solved: &Solved) -> Term {
    let mut out = t.clone();
    for (x, s) in solved {
        out = out.subst_vars(&mut |v| if v == *x { Some(s.clone()) } else { None });
    }
    out
}

fn bind(solved: &mut Solved, queue: &mut VecDeque<(Term, Term)>, x: Var, t: Term) {
    for (_, rhs) in solved.iter_mut() {
        *rhs = rhs.subst_vars(&mut |v| if v == x { Some(t.clone()) } else { None });
    }
    for (a, b) in queue.iter_mut() {
        *a = a.subst_vars(&mut |v| if v == x { Some(t.clone()) } else { None });
        *b = b.subst_vars(&mut |v| if v == x { Some(t.clone()) } else { None });
    }
    solved.push((x, t));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::VarTable;
    use crate::theory::theory;

    fn bits(s: &str) -> Bitv {
        Bitv::new(s.chars().map(|c| c == '1').collect())
    }

    #[test]
    fn constants_fold_through_concat() {
        let th = theory(TheoryId::Bv);
        let t = th.sigma(
            &Sym::Concat(2, 2),
            vec![Term::bv_const(bits("10")), Term::bv_const(bits("01"))],
        );
        assert_eq!(t, Term::bv_const(bits("1001")));
    }

    #[test]
    fn extraction_of_constant() {
        let th = theory(TheoryId::Bv);
        let t = th.sigma(&Sym::Extract(1, 2, 4), vec![Term::bv_const(bits("1011"))]);
        assert_eq!(t, Term::bv_const(bits("01")));
    }

    #[test]
    fn full_extraction_is_identity() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Bv);
        let t = th.sigma(&Sym::Extract(0, 7, 8), vec![Term::var(x)]);
        assert_eq!(t, Term::var(x));
    }

    #[test]
    fn extraction_pushes_through_concat() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Bv);
        // bits 4..6 of x:4 ++ y:4 live entirely in y
        let cat = Term::concat(4, 4, Term::var(x), Term::var(y)).unwrap();
        let t = th.sigma(&Sym::Extract(4, 6, 8), vec![cat]);
        assert_eq!(t, Term::extract(0, 2, 4, Term::var(y)).unwrap());
    }

    #[test]
    fn adjacent_extractions_fuse() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Bv);
        let hi = Term::extract(0, 3, 8, Term::var(x)).unwrap();
        let lo = Term::extract(4, 7, 8, Term::var(x)).unwrap();
        let t = th.sigma(&Sym::Concat(4, 4), vec![hi, lo]);
        assert_eq!(t, Term::var(x));
    }

    #[test]
    fn aligned_concats_decompose() {
        let mut vt = VarTable::new();
        let (x, y, u, v) = (
            vt.intern("x"),
            vt.intern("y"),
            vt.intern("u"),
            vt.intern("v"),
        );
        let th = theory(TheoryId::Bv);
        let mut fresh = |k| vt.fresh(k);
        let lhs = Term::concat(4, 4, Term::var(x), Term::var(y)).unwrap();
        let rhs = Term::concat(4, 4, Term::var(u), Term::var(v)).unwrap();
        let solved = th.solve(&lhs, &rhs, &mut fresh).unwrap();
        assert_eq!(solved, vec![(x, Term::var(u)), (y, Term::var(v))]);
    }

    #[test]
    fn constant_splits_across_concat() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Bv);
        let mut fresh = |k| vt.fresh(k);
        let cat = Term::concat(2, 2, Term::var(x), Term::var(y)).unwrap();
        let solved = th
            .solve(&cat, &Term::bv_const(bits("1001")), &mut fresh)
            .unwrap();
        assert_eq!(
            solved,
            vec![
                (x, Term::bv_const(bits("10"))),
                (y, Term::bv_const(bits("01"))),
            ]
        );
    }

    #[test]
    fn misaligned_concats_are_unsolvable() {
        let mut vt = VarTable::new();
        let (x, y, u, v) = (
            vt.intern("x"),
            vt.intern("y"),
            vt.intern("u"),
            vt.intern("v"),
        );
        let th = theory(TheoryId::Bv);
        let mut fresh = |k| vt.fresh(k);
        let lhs = Term::concat(2, 6, Term::var(x), Term::var(y)).unwrap();
        let rhs = Term::concat(4, 4, Term::var(u), Term::var(v)).unwrap();
        assert_eq!(
            th.solve(&lhs, &rhs, &mut fresh),
            Err(SolveFailure::Unsolvable)
        );
    }

    #[test]
    fn unequal_constants_refute() {
        let th = theory(TheoryId::Bv);
        let mut fresh = |k: VarKind| -> Var { panic!("no fresh variables expected: {:?}", k) };
        assert_eq!(
            th.solve(
                &Term::bv_const(bits("10")),
                &Term::bv_const(bits("11")),
                &mut fresh
            ),
            Err(SolveFailure::Inconsistent)
        );
    }
}
