//! Theory solution sets
//!
//! A solution set is a triangular solved form for one theory: oriented
//! bindings `x -> t` with pairwise distinct variable left-hand sides, no
//! left-hand side occurring in any right-hand side, and right-hand sides
//! canonical under the current partition. A reverse index supports
//! naming a term back to its variable, and a use-index tracks which
//! bindings mention a variable so that `compose` and `fuse` touch only
//! the affected entries.
//!
//! Callers must normalize terms through `find` (and the partition)
//! before handing them to `compose`; the triangular invariants depend on
//! it.

use crate::jst::Jst;
use crate::term::{Term, Var};
use crate::theory::{map_term, Theory};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Variable equalities discovered while composing, to be merged into the
/// partition by the engine
pub type PendingEqs = Vec<(Var, Var, Jst)>;

/// Equations that stopped being solved forms under substitution (the
/// left-hand side reappeared on the right); the engine re-solves them
pub type Requeue = Vec<(Var, Term, Jst)>;

/// A solved form `S_i` for a single theory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Solution {
    map: BTreeMap<Var, (Term, Jst)>,
    inv: BTreeMap<Term, Var>,
    /// rhs variable -> left-hand sides whose binding mentions it
    uses: BTreeMap<Var, BTreeSet<Var>>,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// The right-hand side bound to `x`, if any
    pub fn apply(&self, x: Var) -> Option<(&Term, &Jst)> {
        self.map.get(&x).map(|(t, j)| (t, j))
    }

    /// The right-hand side of `x`, or `x` itself
    pub fn find(&self, x: Var) -> (Term, Jst) {
        match self.map.get(&x) {
            Some((t, j)) => (t.clone(), j.clone()),
            None => (Term::Var(x), Jst::empty()),
        }
    }

    /// The left-hand side whose binding is exactly `t`
    pub fn inv(&self, t: &Term) -> Option<Var> {
        self.inv.get(t).copied()
    }

    pub fn is_bound(&self, x: Var) -> bool {
        self.map.contains_key(&x)
    }

    /// The left-hand sides whose right-hand side mentions `x`
    pub fn users(&self, x: Var) -> Vec<Var> {
        self.uses
            .get(&x)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Install `x -> t`, replacing any existing binding for `x`
    pub fn union(&mut self, x: Var, t: Term, j: Jst) {
        self.drop_binding(x);
        trace!(lhs = %x, rhs = %t, "bind");
        for v in t.vars() {
            self.uses.entry(v).or_default().insert(x);
        }
        self.inv.insert(t.clone(), x);
        self.map.insert(x, (t, j));
    }

    /// Remove the binding for `x`, returning it
    pub fn restrict(&mut self, x: Var) -> Option<(Term, Jst)> {
        let out = self.drop_binding(x);
        if out.is_some() {
            trace!(lhs = %x, "restrict");
        }
        out
    }

    fn drop_binding(&mut self, x: Var) -> Option<(Term, Jst)> {
        let (t, j) = self.map.remove(&x)?;
        if self.inv.get(&t) == Some(&x) {
            self.inv.remove(&t);
        }
        for v in t.vars() {
            if let Some(s) = self.uses.get_mut(&v) {
                s.remove(&x);
                if s.is_empty() {
                    self.uses.remove(&v);
                }
            }
        }
        Some((t, j))
    }

    /// Apply a solved form `E` to this solution set
    ///
    /// Each equation dispatches three ways: a variable right-hand side is
    /// a partition-level equality; a right-hand side already named by the
    /// reverse index yields an equality with that name; anything else is
    /// installed as a binding. Affected bindings are re-normalized
    /// through the use-index until a fixpoint. Newly installed left-hand
    /// sides are reported through `installed` for constraint
    /// propagation.
    pub fn compose(
        &mut self,
        th: &dyn Theory,
        eqs: Vec<(Var, Term, Jst)>,
        pending: &mut PendingEqs,
        installed: &mut Vec<Var>,
        requeue: &mut Requeue,
    ) {
        for (x, t, j) in eqs {
            self.dispatch(th, x, t, j, pending, installed, requeue);
        }
    }

    /// Propagate the variable equality `x = y` into right-hand sides
    /// (`x` is being eliminated in favor of `y`)
    pub fn fuse(
        &mut self,
        th: &dyn Theory,
        x: Var,
        y: Var,
        j: &Jst,
        pending: &mut PendingEqs,
        installed: &mut Vec<Var>,
        requeue: &mut Requeue,
    ) {
        self.substitute_into_users(th, x, &Term::Var(y), j, pending, installed, requeue);
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &mut self,
        th: &dyn Theory,
        x: Var,
        t: Term,
        j: Jst,
        pending: &mut PendingEqs,
        installed: &mut Vec<Var>,
        requeue: &mut Requeue,
    ) {
        if t == Term::Var(x) {
            return;
        }
        if let Term::Var(y) = t {
            // external: goes to the partition, not the solved form
            pending.push((x, y, j));
            return;
        }
        if t.occurs(x) {
            // substitution re-introduced the left-hand side; this is an
            // equation again, not a solved form
            requeue.push((x, t, j));
            return;
        }
        if let Some(y) = self.inv(&t) {
            if y != x {
                let jy = self.map.get(&y).map(|(_, j)| j.clone()).unwrap_or_default();
                pending.push((x, y, Jst::dep2(&j, &jy)));
                return;
            }
            return;
        }
        self.union(x, t.clone(), j.clone());
        installed.push(x);
        self.substitute_into_users(th, x, &t, &j, pending, installed, requeue);
    }

    #[allow(clippy::too_many_arguments)]
    fn substitute_into_users(
        &mut self,
        th: &dyn Theory,
        x: Var,
        replacement: &Term,
        j: &Jst,
        pending: &mut PendingEqs,
        installed: &mut Vec<Var>,
        requeue: &mut Requeue,
    ) {
        for y in self.users(x) {
            if y == x {
                continue;
            }
            let Some((rhs, jy)) = self.restrict(y) else {
                continue;
            };
            let new_rhs = map_term(th, &rhs, &mut |v| {
                if v == x {
                    Some(replacement.clone())
                } else {
                    None
                }
            });
            let jn = Jst::dep2(&jy, j);
            self.dispatch(th, y, new_rhs, jn, pending, installed, requeue);
        }
    }

    /// All bindings, in left-hand-side order
    pub fn bindings(&self) -> impl Iterator<Item = (Var, &Term, &Jst)> + '_ {
        self.map.iter().map(|(x, (t, j))| (*x, t, j))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::VarTable;
    use crate::theory::{theory, TheoryId};
    use num_rational::BigRational;

    #[test]
    fn find_defaults_to_the_variable() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let s = Solution::new();
        assert_eq!(s.find(x).0, Term::Var(x));
    }

    #[test]
    fn union_updates_indices() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let mut s = Solution::new();
        let t = Term::add(vec![Term::num_int(1), Term::var(y)]);
        s.union(x, t.clone(), Jst::axiom(0));
        assert_eq!(s.inv(&t), Some(x));
        assert_eq!(s.users(y), vec![x]);
        s.restrict(x);
        assert!(s.inv(&t).is_none());
        assert!(s.users(y).is_empty());
    }

    #[test]
    fn compose_var_rhs_goes_to_partition() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let mut s = Solution::new();
        let mut pending = Vec::new();
        let mut installed = Vec::new();
        let mut requeue = Vec::new();
        s.compose(
            theory(TheoryId::Arith),
            vec![(x, Term::var(y), Jst::axiom(1))],
            &mut pending,
            &mut installed,
            &mut requeue,
        );
        assert!(s.is_empty());
        assert_eq!(pending.len(), 1);
        assert_eq!((pending[0].0, pending[0].1), (x, y));
    }

    #[test]
    fn compose_equal_rhs_names_coincide() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let z = vt.intern("z");
        let mut s = Solution::new();
        let mut pending = Vec::new();
        let mut installed = Vec::new();
        let mut requeue = Vec::new();
        let t = Term::add(vec![Term::num_int(2), Term::var(z)]);
        s.compose(
            theory(TheoryId::Arith),
            vec![(x, t.clone(), Jst::axiom(0))],
            &mut pending,
            &mut installed,
            &mut requeue,
        );
        s.compose(
            theory(TheoryId::Arith),
            vec![(y, t.clone(), Jst::axiom(1))],
            &mut pending,
            &mut installed,
            &mut requeue,
        );
        // second binding resolves to the first one's name
        assert_eq!(s.len(), 1);
        assert_eq!(pending.len(), 1);
        assert_eq!((pending[0].0, pending[0].1), (y, x));
        let j = &pending[0].2;
        assert!(j.contains(0) && j.contains(1));
    }

    #[test]
    fn compose_substitutes_into_users() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let mut s = Solution::new();
        let mut pending = Vec::new();
        let mut installed = Vec::new();
        let mut requeue = Vec::new();
        // x -> 3 - y  (as 3 + (-1)*y)
        let rhs = Term::add(vec![
            Term::num_int(3),
            Term::multq(BigRational::from_integer((-1).into()), Term::var(y)),
        ]);
        s.compose(
            theory(TheoryId::Arith),
            vec![(x, rhs, Jst::axiom(0))],
            &mut pending,
            &mut installed,
            &mut requeue,
        );
        // y -> 2 eliminates y from x's binding
        s.compose(
            theory(TheoryId::Arith),
            vec![(y, Term::num_int(2), Jst::axiom(1))],
            &mut pending,
            &mut installed,
            &mut requeue,
        );
        let (tx, jx) = s.find(x);
        assert_eq!(tx.as_num().map(|q| q.to_string()), Some("1".into()));
        assert!(jx.contains(0) && jx.contains(1));
        assert!(pending.is_empty());
        // triangularity: no lhs occurs in any rhs
        for (_, t, _) in s.bindings() {
            for v in t.vars() {
                assert!(!s.is_bound(v));
            }
        }
    }
}
