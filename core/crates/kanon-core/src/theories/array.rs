//! Arrays: select and update
//!
//! The canonizer performs the read-over-write simplifications that hold
//! without any disequality knowledge: a select on an update at the
//! syntactically same (canonical) index returns the written element, and
//! an update overwriting an update at the same index collapses. Since
//! the combination engine canonizes index variables through the
//! partition before calling `sigma`, asserting `i = j` first makes
//! `select(update(a, i, e), j)` reduce to `e`.
//!
//! Equations between array terms rarely have a triangular solved form;
//! everything beyond orienting a variable is left to the naming
//! fallback. The occurs-check is deliberately no refutation here:
//! `a = update(a, i, e)` just says the array already holds `e` at `i`.

use crate::term::{Sym, Term, Var, VarKind};
use crate::theory::{SolveFailure, Solved, Theory, TheoryId};

pub struct Array;

impl Theory for Array {
    fn id(&self) -> TheoryId {
        TheoryId::Array
    }

    fn sigma(&self, sym: &Sym, mut args: Vec<Term>) -> Term {
        match sym {
            Sym::Select if args.len() == 2 => {
                let j = args.pop().unwrap_or_else(|| Term::num_int(0));
                let a = args.pop().unwrap_or_else(|| Term::num_int(0));
                if let Term::App(Sym::Update, upd) = &a {
                    if let [_, i, e] = &upd[..] {
                        if *i == j {
                            return e.clone();
                        }
                    }
                }
                Term::select(a, j)
            }
            Sym::Update if args.len() == 3 => {
                let e = args.pop().unwrap_or_else(|| Term::num_int(0));
                let i = args.pop().unwrap_or_else(|| Term::num_int(0));
                let a = args.pop().unwrap_or_else(|| Term::num_int(0));
                if let Term::App(Sym::Update, upd) = &a {
                    if let [base, i2, _] = &upd[..] {
                        if *i2 == i {
                            return Term::update(base.clone(), i, e);
                        }
                    }
                }
                Term::update(a, i, e)
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
        if lhs == rhs {
            return Ok(vec![]);
        }
        match (lhs, rhs) {
            (Term::Var(x), Term::Var(y)) => {
                let (l, r) = if x < y { (x, y) } else { (y, x) };
                Ok(vec![(*l, Term::Var(*r))])
            }
            (Term::Var(x), t) | (t, Term::Var(x)) => {
                if t.occurs(*x) {
                    Err(SolveFailure::Unsolvable)
                } else {
                    Ok(vec![(*x, t.clone())])
                }
            }
            _ => Err(SolveFailure::Unsolvable),
        }
    }
}
