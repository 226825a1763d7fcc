//! Nonlinear arithmetic: power products
//!
//! Pure terms are products of variable powers; rational coefficients
//! stay in the linear theory via `multq`, so a monomial here is fully
//! described by its exponent map. The canonizer flattens products,
//! merges repeated factors into powers and orders factors by variable.
//! Only equations with a variable isolated on one side solve; everything
//! else is handed back to the engine's naming fallback, which loses no
//! soundness.

use crate::term::{Sym, Term, Var, VarKind};
use crate::theory::{SolveFailure, Solved, Theory, TheoryId};
use std::collections::BTreeMap;

/// A power product: variable -> positive exponent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerProduct {
    exps: BTreeMap<Var, u32>,
}

impl PowerProduct {
    /// Parse a pure nonlinear term; `None` on foreign applications
    pub fn of_term(t: &Term) -> Option<PowerProduct> {
        let mut pp = PowerProduct::default();
        pp.accumulate(t, 1)?;
        Some(pp)
    }

    fn accumulate(&mut self, t: &Term, power: u32) -> Option<()> {
        match t {
            Term::Var(x) => {
                *self.exps.entry(*x).or_insert(0) += power;
                Some(())
            }
            Term::App(Sym::Mult, args) => {
                for a in args {
                    self.accumulate(a, power)?;
                }
                Some(())
            }
            Term::App(Sym::Expt(n), args) => {
                self.accumulate(args.first()?, power.checked_mul(*n)?)
            }
            _ => None,
        }
    }

    /// The canonical term: factors in variable order
    pub fn to_term(&self) -> Option<Term> {
        let mut factors: Vec<Term> = Vec::new();
        for (x, n) in &self.exps {
            match n {
                0 => continue,
                1 => factors.push(Term::Var(*x)),
                _ => factors.push(Term::expt(*n, Term::Var(*x))),
            }
        }
        match factors.len() {
            0 => None,
            1 => Some(factors.pop().unwrap()),
            _ => Some(Term::mult(factors)),
        }
    }

    pub fn occurs(&self, x: Var) -> bool {
        self.exps.get(&x).copied().unwrap_or(0) > 0
    }

    pub fn is_single_var(&self) -> Option<Var> {
        let mut it = self.exps.iter().filter(|(_, n)| **n > 0);
        match (it.next(), it.next()) {
            (Some((x, &1)), None) => Some(*x),
            _ => None,
        }
    }
}

pub struct Nonlin;

impl Theory for Nonlin {
    fn id(&self) -> TheoryId {
        TheoryId::Nonlin
    }

    fn sigma(&self, sym: &Sym, args: Vec<Term>) -> Term {
        let app = Term::App(sym.clone(), args);
        match PowerProduct::of_term(&app).and_then(|pp| pp.to_term()) {
            Some(t) => t,
            None => app,
        }
    }

    fn solve(
        &self,
        lhs: &Term,
        rhs: &Term,
        _fresh: &mut dyn FnMut(VarKind) -> Var,
    ) -> Result<Solved, SolveFailure> {
        let (Some(pl), Some(pr)) = (PowerProduct::of_term(lhs), PowerProduct::of_term(rhs))
        else {
            return Err(SolveFailure::Unsolvable);
        };
        if pl == pr {
            return Ok(vec![]);
        }
        // only a variable against a product free of it is oriented;
        // x = x*y and friends go through the naming fallback
        if let Some(x) = pl.is_single_var() {
            if !pr.occurs(x) {
                if let Some(t) = pr.to_term() {
                    return Ok(vec![(x, t)]);
                }
            }
        }
        if let Some(y) = pr.is_single_var() {
            if !pl.occurs(y) {
                if let Some(t) = pl.to_term() {
                    return Ok(vec![(y, t)]);
                }
            }
        }
        Err(SolveFailure::Unsolvable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::VarTable;
    use crate::theory::theory;

    #[test]
    fn sigma_merges_repeated_factors() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Nonlin);
        // y * x * x  ==  x^2 * y
        let t = th.sigma(&Sym::Mult, vec![Term::var(y), Term::var(x), Term::var(x)]);
        assert_eq!(
            t,
            Term::mult(vec![Term::expt(2, Term::var(x)), Term::var(y)])
        );
    }

    #[test]
    fn sigma_collapses_nested_powers() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let th = theory(TheoryId::Nonlin);
        let t = th.sigma(&Sym::Expt(3), vec![Term::expt(2, Term::var(x))]);
        assert_eq!(t, Term::expt(6, Term::var(x)));
    }

    #[test]
    fn solve_orients_variable_against_product() {
        let mut vt = VarTable::new();
        let (x, y, z) = (vt.intern("x"), vt.intern("y"), vt.intern("z"));
        let th = theory(TheoryId::Nonlin);
        let mut fresh = |k| vt.fresh(k);
        let prod = Term::mult(vec![Term::var(y), Term::var(z)]);
        let solved = th.solve(&Term::var(x), &prod, &mut fresh).unwrap();
        assert_eq!(solved, vec![(x, Term::mult(vec![Term::var(y), Term::var(z)]))]);
    }

    #[test]
    fn occurs_makes_unsolvable() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let th = theory(TheoryId::Nonlin);
        let mut fresh = |k| vt.fresh(k);
        // x = x*y is satisfiable (x = 0), just not solvable here
        let prod = Term::mult(vec![Term::var(x), Term::var(y)]);
        assert_eq!(
            th.solve(&Term::var(x), &prod, &mut fresh),
            Err(SolveFailure::Unsolvable)
        );
    }
}
