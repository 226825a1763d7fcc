//! Coproducts: direct-sum injections and projections
//!
//! `inl`/`inr` inject into the two summands, `outl`/`outr` project back.
//! The theory treats each injection/projection pair as mutually inverse
//! bijections, so the canonizer cancels both compositions and the solver
//! can peel projections by moving them to the other side as injections.
//! Injections with different tags never meet: such an equation refutes.

use crate::term::{Sym, Term, Var, VarKind};
use crate::theory::{SolveFailure, Solved, Theory, TheoryId};
use std::collections::VecDeque;

pub struct Coproduct;

fn inverse(sym: &Sym) -> Option<Sym> {
    match sym {
        Sym::InL => Some(Sym::OutL),
        Sym::InR => Some(Sym::OutR),
        Sym::OutL => Some(Sym::InL),
        Sym::OutR => Some(Sym::InR),
        _ => None,
    }
}

fn is_injection(sym: &Sym) -> bool {
    matches!(sym, Sym::InL | Sym::InR)
}

impl Theory for Coproduct {
    fn id(&self) -> TheoryId {
        TheoryId::Coproduct
    }

    fn sigma(&self, sym: &Sym, args: Vec<Term>) -> Term {
        if let Some(inv) = inverse(sym) {
            if let Some(Term::App(inner_sym, inner_args)) = args.first() {
                if *inner_sym == inv {
                    if let Some(t) = inner_args.first() {
                        return t.clone();
                    }
                }
            }
        }
        Term::App(sym.clone(), args)
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
                // peel projections: outl(s) = t  ==>  s = inl(t)
                (Term::App(sym @ (Sym::OutL | Sym::OutR), mut inner), t)
                | (t, Term::App(sym @ (Sym::OutL | Sym::OutR), mut inner)) => {
                    let s = inner.pop().ok_or(SolveFailure::Unsolvable)?;
                    let wrapped = match sym {
                        Sym::OutL => Term::inl(t),
                        _ => Term::inr(t),
                    };
                    queue.push_back((s, wrapped));
                }
                (Term::Var(x), Term::Var(y)) => {
                    let (l, r) = if x < y { (x, y) } else { (y, x) };
                    bind(&mut solved, &mut queue, l, Term::Var(r));
                }
                (Term::Var(x), t) | (t, Term::Var(x)) => {
                    if t.occurs(x) {
                        // injections build strictly larger values
                        return Err(SolveFailure::Inconsistent);
                    }
                    bind(&mut solved, &mut queue, x, t);
                }
                (Term::App(s1, xs), Term::App(s2, ys))
                    if is_injection(&s1) && is_injection(&s2) =>
                {
                    if s1 != s2 {
                        // inl and inr have disjoint ranges
                        return Err(SolveFailure::Inconsistent);
                    }
                    for (x, y) in xs.into_iter().zip(ys.into_iter()) {
                        queue.push_back((x, y));
                    }
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

    #[test]
    fn projections_cancel_injections() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Coproduct);
        assert_eq!(th.sigma(&Sym::OutL, vec![Term::inl(Term::var(x))]), Term::var(x));
        assert_eq!(th.sigma(&Sym::InR, vec![Term::outr(Term::var(x))]), Term::var(x));
        // mismatched tags stay put
        let stuck = th.sigma(&Sym::OutL, vec![Term::inr(Term::var(x))]);
        assert_eq!(stuck, Term::outl(Term::inr(Term::var(x))));
    }

    #[test]
    fn equal_injections_decompose() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Coproduct);
        let mut fresh = |k| vt.fresh(k);
        let solved = th
            .solve(&Term::inl(Term::var(x)), &Term::inl(Term::var(y)), &mut fresh)
            .unwrap();
        assert_eq!(solved, vec![(x, Term::var(y))]);
    }

    #[test]
    fn clashing_injections_refute() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Coproduct);
        let mut fresh = |k| vt.fresh(k);
        assert_eq!(
            th.solve(&Term::inl(Term::var(x)), &Term::inr(Term::var(y)), &mut fresh),
            Err(SolveFailure::Inconsistent)
        );
    }

    #[test]
    fn projection_peels_to_the_other_side() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Coproduct);
        let mut fresh = |k| vt.fresh(k);
        let solved = th
            .solve(&Term::outl(Term::var(x)), &Term::var(y), &mut fresh)
            .unwrap();
        assert_eq!(solved, vec![(x, Term::inl(Term::var(y)))]);
    }

    #[test]
    fn occurs_check_refutes() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Coproduct);
        let mut fresh = |k| vt.fresh(k);
        assert_eq!(
            th.solve(&Term::var(x), &Term::inl(Term::var(x)), &mut fresh),
            Err(SolveFailure::Inconsistent)
        );
    }
}
