//! Tuples and projections
//!
//! An n-ary constructor `tuple/n` with projections `proj[i,n]`; pairs
//! are the width-2 case. The canonizer cancels projections of tuples
//! and re-tuples a complete family of projections of one variable. The
//! solver is a unification over the constructor: componentwise
//! decomposition, occurs-check refutation, and inversion of projections
//! through fresh label components.

use crate::term::{Sym, Term, Var, VarKind};
use crate::theory::{SolveFailure, Solved, Theory, TheoryId};
use std::collections::VecDeque;

pub struct Tuple;

impl Theory for Tuple {
    fn id(&self) -> TheoryId {
        TheoryId::Tuple
    }

    fn sigma(&self, sym: &Sym, args: Vec<Term>) -> Term {
        match sym {
            Sym::Proj(i, n) => {
                if let Some(Term::App(Sym::Tuple(m), elems)) = args.first() {
                    if m == n && *i < elems.len() {
                        return elems[*i].clone();
                    }
                }
                Term::App(sym.clone(), args)
            }
            Sym::Tuple(n) => {
                // tuple(proj[0,n](x), .., proj[n-1,n](x)) == x
                let mut source: Option<Var> = None;
                let mut complete = *n > 0;
                for (i, a) in args.iter().enumerate() {
                    let component = match a {
                        Term::App(Sym::Proj(j, m), inner) if *j == i && m == n => {
                            inner.first().and_then(Term::as_var)
                        }
                        _ => None,
                    };
                    match component {
                        Some(x) if *source.get_or_insert(x) == x => {}
                        _ => {
                            complete = false;
                            break;
                        }
                    }
                }
                if complete {
                    if let Some(x) = source {
                        return Term::Var(x);
                    }
                }
                Term::App(sym.clone(), args)
            }
            _ => Term::App(sym.clone(), args),
        }
    }

    fn solve(
        &self,
        lhs: &Term,
        rhs: &Term,
        fresh: &mut dyn FnMut(VarKind) -> Var,
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
                // invert projections first: proj[i,n](s) = t rewrites to
                // s = tuple(l0, .., t@i, .., l_{n-1}) with fresh labels
                (Term::App(Sym::Proj(i, n), mut inner), t)
                | (t, Term::App(Sym::Proj(i, n), mut inner)) => {
                    let s = inner.pop().ok_or(SolveFailure::Unsolvable)?;
                    let elems: Vec<Term> = (0..n)
                        .map(|j| {
                            if j == i {
                                t.clone()
                            } else {
                                Term::Var(fresh(VarKind::Label))
                            }
                        })
                        .collect();
                    queue.push_back((s, Term::tuple(elems)));
                }
                (Term::Var(x), Term::Var(y)) => {
                    // simpler side as left-hand side
                    let (l, r) = if x < y { (x, y) } else { (y, x) };
                    bind(&mut solved, &mut queue, l, Term::Var(r))?;
                }
                (Term::Var(x), t) | (t, Term::Var(x)) => {
                    if t.occurs(x) {
                        // no finite tuple satisfies x = tuple(..x..)
                        return Err(SolveFailure::Inconsistent);
                    }
                    bind(&mut solved, &mut queue, x, t)?;
                }
                (Term::App(Sym::Tuple(n), xs), Term::App(Sym::Tuple(m), ys)) => {
                    if n != m {
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

/// Apply the bindings accumulated so far
fn substitute(t: &Term, solved: &Solved) -> Term {
    let mut out = t.clone();
    for (x, s) in solved {
        out = out.subst_vars(&mut |v| if v == *x { Some(s.clone()) } else { None });
    }
    out
}

/// Record `x = t`, eliminating `x` from earlier bindings and the queue
fn bind(
    solved: &mut Solved,
    queue: &mut VecDeque<(Term, Term)>,
    x: Var,
    t: Term,
) -> Result<(), SolveFailure> {
    for (_, rhs) in solved.iter_mut() {
        *rhs = rhs.subst_vars(&mut |v| if v == x { Some(t.clone()) } else { None });
    }
    for (a, b) in queue.iter_mut() {
        *a = a.subst_vars(&mut |v| if v == x { Some(t.clone()) } else { None });
        *b = b.subst_vars(&mut |v| if v == x { Some(t.clone()) } else { None });
    }
    solved.push((x, t));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::VarTable;
    use crate::theory::theory;

    #[test]
    fn proj_of_tuple_cancels() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Tuple);
        let pair = Term::tuple(vec![Term::var(x), Term::var(y)]);
        let t = th.sigma(&Sym::Proj(1, 2), vec![pair]);
        assert_eq!(t, Term::var(y));
    }

    #[test]
    fn retupling_projections_cancels() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Tuple);
        let args = vec![
            Term::proj(0, 2, Term::var(x)).unwrap(),
            Term::proj(1, 2, Term::var(x)).unwrap(),
        ];
        assert_eq!(th.sigma(&Sym::Tuple(2), args), Term::var(x));
    }

    #[test]
    fn pairs_decompose_componentwise() {
        let mut vt = VarTable::new();
        let (x, y, u, v) = (
            vt.intern("x"),
            vt.intern("y"),
            vt.intern("u"),
            vt.intern("v"),
        );
        let th = theory(TheoryId::Tuple);
        let mut fresh = |k| vt.fresh(k);
        let lhs = Term::tuple(vec![Term::var(x), Term::var(y)]);
        let rhs = Term::tuple(vec![Term::var(u), Term::var(v)]);
        let solved = th.solve(&lhs, &rhs, &mut fresh).unwrap();
        assert_eq!(solved.len(), 2);
        assert_eq!(solved[0], (x, Term::var(u)));
        assert_eq!(solved[1], (y, Term::var(v)));
    }

    #[test]
    fn arity_clash_refutes() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Tuple);
        let mut fresh = |k| vt.fresh(k);
        let two = Term::tuple(vec![Term::var(x), Term::var(x)]);
        let three = Term::tuple(vec![Term::var(x), Term::var(x), Term::var(x)]);
        assert_eq!(
            th.solve(&two, &three, &mut fresh),
            Err(SolveFailure::Inconsistent)
        );
    }

    #[test]
    fn occurs_check_refutes() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Tuple);
        let mut fresh = |k| vt.fresh(k);
        let nested = Term::tuple(vec![Term::var(x), Term::var(y)]);
        assert_eq!(
            th.solve(&Term::var(x), &nested, &mut fresh),
            Err(SolveFailure::Inconsistent)
        );
    }

    #[test]
    fn projection_inverts_with_labels() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Tuple);
        let mut fresh = |k| vt.fresh(k);
        let lhs = Term::proj(0, 2, Term::var(x)).unwrap();
        let solved = th.solve(&lhs, &Term::var(y), &mut fresh).unwrap();
        assert_eq!(solved.len(), 1);
        let (l, r) = &solved[0];
        assert_eq!(*l, x);
        match r {
            Term::App(Sym::Tuple(2), elems) => {
                assert_eq!(elems[0], Term::var(y));
                assert!(matches!(elems[1], Term::Var(v) if v.kind() == VarKind::Label));
            }
            other => panic!("expected a tuple, got {}", other),
        }
    }

    #[test]
    fn repeated_variable_chains() {
        let mut vt = VarTable::new();
        let (x, u, v) = (vt.intern("x"), vt.intern("u"), vt.intern("v"));
        let th = theory(TheoryId::Tuple);
        let mut fresh = |k| vt.fresh(k);
        // tuple(x, x) = tuple(u, v) forces u = v
        let lhs = Term::tuple(vec![Term::var(x), Term::var(x)]);
        let rhs = Term::tuple(vec![Term::var(u), Term::var(v)]);
        let solved = th.solve(&lhs, &rhs, &mut fresh).unwrap();
        // x = u, then u = v (or an equivalent chain)
        assert_eq!(solved.len(), 2);
    }
}
