//! Renaming layer: propositional aliases for predicates and equalities
//!
//! Monadic predicate applications `p(x)` and variable equalities `x = y`
//! are named by propositional variables for an external Boolean engine.
//! A dependency index keyed by canonical variables makes alias lookup
//! linear in the degree of the variable. When the partition merges or
//! separates classes, the layer deduces propositional facts (equivalence,
//! implication, disjointness, entailment) and emits them as `Deduction`
//! values into an output buffer the host drains. In the other direction,
//! propositional verdicts (`valid0`/`unsat0`) assert predicate literals
//! or equalities back into the theory layer.
//!
//! Predicate symbols can be related by subsumption (`sub`) and
//! disjointness declarations; the literal store is closed under these
//! relations lazily, at query time.

use crate::error::{KanonError, KanonResult};
use crate::jst::Jst;
use crate::partition::Partition;
use crate::term::Var;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use tracing::trace;

/// A propositional variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropVar(u32);

impl fmt::Display for PropVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// What a propositional variable stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `u` iff `p(x)`
    Monadic(String, Var),
    /// `u` iff `x = y`
    Equal(Var, Var),
}

/// A propositional fact deduced for the Boolean collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deduction {
    Equiv(PropVar, PropVar),
    Implies(PropVar, PropVar),
    Disjoint(PropVar, PropVar),
    Valid0(PropVar),
    Unsat0(PropVar),
}

/// The renaming state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rename {
    next: u32,
    monadic: BTreeMap<PropVar, (String, Var)>,
    equal: BTreeMap<PropVar, (Var, Var)>,
    /// Canonical variable -> propvars whose payload mentions its class
    deps: BTreeMap<Var, BTreeSet<PropVar>>,
    /// Declared subsumptions `p -> q`
    sub: BTreeMap<String, BTreeSet<String>>,
    /// Declared disjointness, stored in both directions
    disjoint: BTreeMap<String, BTreeSet<String>>,
    /// Asserted monadic literals on canonical variables
    pos: BTreeMap<Var, BTreeMap<String, Jst>>,
    neg: BTreeMap<Var, BTreeMap<String, Jst>>,
    deductions: Vec<Deduction>,
}

impl Rename {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self) -> PropVar {
        let u = PropVar(self.next);
        self.next += 1;
        u
    }

    /// Declare `p` subsumed by `q` (every `p` is a `q`)
    pub fn declare_sub(&mut self, p: &str, q: &str) {
        self.sub
            .entry(p.to_string())
            .or_default()
            .insert(q.to_string());
    }

    /// Declare `p` and `q` disjoint
    pub fn declare_disjoint(&mut self, p: &str, q: &str) {
        self.disjoint
            .entry(p.to_string())
            .or_default()
            .insert(q.to_string());
        self.disjoint
            .entry(q.to_string())
            .or_default()
            .insert(p.to_string());
    }

    /// Reflexive-transitive subsumption
    fn is_sub(&self, p: &str, q: &str) -> bool {
        if p == q {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(p);
        while let Some(r) = queue.pop_front() {
            if r == q {
                return true;
            }
            if let Some(supers) = self.sub.get(r) {
                for s in supers {
                    if seen.insert(s.as_str()) {
                        queue.push_back(s);
                    }
                }
            }
        }
        false
    }

    /// Disjointness, inherited downward through subsumption
    fn is_disjoint(&self, p: &str, q: &str) -> bool {
        for (a, bs) in &self.disjoint {
            for b in bs {
                if (self.is_sub(p, a) && self.is_sub(q, b))
                    || (self.is_sub(p, b) && self.is_sub(q, a))
                {
                    return true;
                }
            }
        }
        false
    }

    /// The propvar for `p(x)`, allocating one if no semantically equal
    /// binding exists
    pub fn alias_monadic(&mut self, partition: &Partition, p: &str, x: Var) -> PropVar {
        let xr = partition.find_var(x);
        if let Some(us) = self.deps.get(&xr) {
            for u in us {
                if let Some((q, y)) = self.monadic.get(u) {
                    if q == p && partition.find_var(*y) == xr {
                        return *u;
                    }
                }
            }
        }
        let u = self.fresh();
        trace!(propvar = %u, pred = p, var = %xr, "alias monadic");
        self.monadic.insert(u, (p.to_string(), x));
        self.deps.entry(xr).or_default().insert(u);
        u
    }

    /// The propvar for `x = y`, allocating one if none exists up to `V`
    pub fn alias_equal(&mut self, partition: &Partition, x: Var, y: Var) -> PropVar {
        let xr = partition.find_var(x);
        let yr = partition.find_var(y);
        if let Some(us) = self.deps.get(&xr) {
            for u in us {
                if let Some((a, b)) = self.equal.get(u) {
                    let (ar, br) = (partition.find_var(*a), partition.find_var(*b));
                    if (ar, br) == (xr, yr) || (ar, br) == (yr, xr) {
                        return *u;
                    }
                }
            }
        }
        let u = self.fresh();
        trace!(propvar = %u, x = %xr, y = %yr, "alias equal");
        self.equal.insert(u, (x, y));
        self.deps.entry(xr).or_default().insert(u);
        self.deps.entry(yr).or_default().insert(u);
        u
    }

    /// The payload of a propvar
    pub fn payload(&self, u: PropVar) -> Option<Payload> {
        if let Some((p, x)) = self.monadic.get(&u) {
            return Some(Payload::Monadic(p.clone(), *x));
        }
        self.equal.get(&u).map(|(x, y)| Payload::Equal(*x, *y))
    }

    /// Called after `union(x, y)` demoted `x`; deduces propositional
    /// relations between the dependents of the two classes and merges
    /// the literal stores
    pub fn propagate_eq(&mut self, partition: &Partition, x: Var, y: Var) -> KanonResult<()> {
        let yr = partition.find_var(y);
        let dx = self.deps.remove(&x).unwrap_or_default();
        let dy = self.deps.get(&yr).cloned().unwrap_or_default();

        for u in &dx {
            // an encoded equality may have become entailed
            if let Some((a, b)) = self.equal.get(u) {
                if partition.find_var(*a) == partition.find_var(*b) {
                    self.deductions.push(Deduction::Valid0(*u));
                }
            }
            for v in &dy {
                if u == v {
                    continue;
                }
                match (self.monadic.get(u), self.monadic.get(v)) {
                    (Some((p, _)), Some((q, _))) => {
                        if p == q {
                            self.deductions.push(Deduction::Equiv(*u, *v));
                        } else if self.is_sub(p, q) {
                            self.deductions.push(Deduction::Implies(*u, *v));
                        } else if self.is_sub(q, p) {
                            self.deductions.push(Deduction::Implies(*v, *u));
                        } else if self.is_disjoint(p, q) {
                            self.deductions.push(Deduction::Disjoint(*u, *v));
                        }
                    }
                    _ => {
                        if let (Some((a, b)), Some((c, d))) =
                            (self.equal.get(u), self.equal.get(v))
                        {
                            let mut s1 = [partition.find_var(*a), partition.find_var(*b)];
                            let mut s2 = [partition.find_var(*c), partition.find_var(*d)];
                            s1.sort();
                            s2.sort();
                            if s1 == s2 {
                                self.deductions.push(Deduction::Equiv(*u, *v));
                            }
                        }
                    }
                }
            }
        }
        self.deps.entry(yr).or_default().extend(dx);

        // merge asserted literals of the demoted class
        let px = self.pos.remove(&x).unwrap_or_default();
        let nx = self.neg.remove(&x).unwrap_or_default();
        for (p, j) in px {
            self.insert_literal(yr, &p, true, &j)?;
        }
        for (p, j) in nx {
            self.insert_literal(yr, &p, false, &j)?;
        }
        Ok(())
    }

    /// Called after `separate(x, y)`: propvars encoding `x = y` are now
    /// refuted
    pub fn propagate_deq(&mut self, partition: &Partition, x: Var, y: Var) {
        let xr = partition.find_var(x);
        let yr = partition.find_var(y);
        let us = self.deps.get(&xr).cloned().unwrap_or_default();
        for u in us {
            if let Some((a, b)) = self.equal.get(&u) {
                let mut s = [partition.find_var(*a), partition.find_var(*b)];
                s.sort();
                let mut t = [xr, yr];
                t.sort();
                if s == t {
                    self.deductions.push(Deduction::Unsat0(u));
                }
            }
        }
    }

    /// Assert the literal `p(x)` / `~p(x)`; returns the entailment
    /// justification when it was already known
    pub fn assert_monadic(
        &mut self,
        partition: &Partition,
        p: &str,
        x: Var,
        positive: bool,
        j: &Jst,
    ) -> KanonResult<Option<Jst>> {
        let xr = partition.find_var(x);
        if let Some(known) = self.status_monadic(partition, p, xr) {
            let (value, jk) = known;
            if value == positive {
                return Ok(Some(jk));
            }
            return Err(KanonError::inconsistent(Jst::dep2(&jk, j)));
        }
        self.insert_literal(xr, p, positive, j)?;
        Ok(None)
    }

    /// Whether `p(x)` is entailed true or false by the literal store
    pub fn status_monadic(&self, partition: &Partition, p: &str, x: Var) -> Option<(bool, Jst)> {
        let xr = partition.find_var(x);
        if let Some(ps) = self.pos.get(&xr) {
            // r true and r -> p entails p
            for (r, jr) in ps {
                if self.is_sub(r, p) {
                    return Some((true, jr.clone()));
                }
            }
            // r true and r # p entails ~p
            for (r, jr) in ps {
                if self.is_disjoint(r, p) {
                    return Some((false, jr.clone()));
                }
            }
        }
        if let Some(ns) = self.neg.get(&xr) {
            // ~q and p -> q entails ~p
            for (q, jq) in ns {
                if self.is_sub(p, q) {
                    return Some((false, jq.clone()));
                }
            }
        }
        None
    }

    fn insert_literal(&mut self, xr: Var, p: &str, positive: bool, j: &Jst) -> KanonResult<()> {
        if positive {
            if let Some(ns) = self.neg.get(&xr) {
                for (q, jq) in ns {
                    if self.is_sub(p, q) {
                        return Err(KanonError::inconsistent(Jst::dep2(j, jq)));
                    }
                }
            }
            if let Some(ps) = self.pos.get(&xr) {
                for (r, jr) in ps {
                    if self.is_disjoint(p, r) {
                        return Err(KanonError::inconsistent(Jst::dep2(j, jr)));
                    }
                    if self.is_sub(r, p) {
                        // already entailed
                        return Ok(());
                    }
                }
            }
            trace!(pred = p, var = %xr, "assert literal");
            self.pos.entry(xr).or_default().insert(p.to_string(), j.clone());
        } else {
            if let Some(ps) = self.pos.get(&xr) {
                for (r, jr) in ps {
                    if self.is_sub(r, p) {
                        return Err(KanonError::inconsistent(Jst::dep2(j, jr)));
                    }
                }
            }
            trace!(pred = p, var = %xr, "assert negated literal");
            self.neg.entry(xr).or_default().insert(p.to_string(), j.clone());
        }
        Ok(())
    }

    /// Emit `valid0` for the alias of `p(x)`, if one exists
    pub fn propagate_valid1(&mut self, partition: &Partition, p: &str, x: Var) {
        if let Some(u) = self.find_monadic(partition, p, x) {
            self.deductions.push(Deduction::Valid0(u));
        }
    }

    /// Emit `unsat0` for the alias of `p(x)`, if one exists
    pub fn propagate_unsat1(&mut self, partition: &Partition, p: &str, x: Var) {
        if let Some(u) = self.find_monadic(partition, p, x) {
            self.deductions.push(Deduction::Unsat0(u));
        }
    }

    fn find_monadic(&self, partition: &Partition, p: &str, x: Var) -> Option<PropVar> {
        let xr = partition.find_var(x);
        let us = self.deps.get(&xr)?;
        for u in us {
            if let Some((q, y)) = self.monadic.get(u) {
                if q == p && partition.find_var(*y) == xr {
                    return Some(*u);
                }
            }
        }
        None
    }

    /// Drain the deduction buffer
    pub fn take_deductions(&mut self) -> Vec<Deduction> {
        std::mem::take(&mut self.deductions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::VarTable;

    #[test]
    fn alias_is_stable_up_to_v() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut r = Rename::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let u1 = r.alias_monadic(&p, "even", x);
        assert_eq!(r.alias_monadic(&p, "even", x), u1);
        let u2 = r.alias_monadic(&p, "even", y);
        assert_ne!(u1, u2);
        // after x = y the aliases refer to the same class but stay distinct
        p.union(x, y, &Jst::axiom(0)).unwrap();
        r.propagate_eq(&p, y, x).unwrap();
        let deds = r.take_deductions();
        assert!(deds.contains(&Deduction::Equiv(u2, u1)) || deds.contains(&Deduction::Equiv(u1, u2)));
    }

    #[test]
    fn equal_alias_becomes_valid_on_union() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut r = Rename::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let u = r.alias_equal(&p, x, y);
        p.union(x, y, &Jst::axiom(0)).unwrap();
        let (demoted, _) = p.take_v_changes()[0];
        r.propagate_eq(&p, demoted, p.find_var(demoted)).unwrap();
        assert!(r.take_deductions().contains(&Deduction::Valid0(u)));
    }

    #[test]
    fn equal_alias_becomes_unsat_on_separation() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut r = Rename::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let u = r.alias_equal(&p, x, y);
        p.separate(x, y, &Jst::axiom(0)).unwrap();
        r.propagate_deq(&p, x, y);
        assert_eq!(r.take_deductions(), vec![Deduction::Unsat0(u)]);
    }

    #[test]
    fn subsumption_drives_implications() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut r = Rename::new();
        r.declare_sub("square", "rect");
        let x = vt.intern("x");
        let y = vt.intern("y");
        let us = r.alias_monadic(&p, "square", x);
        let ur = r.alias_monadic(&p, "rect", y);
        p.union(x, y, &Jst::axiom(0)).unwrap();
        let (demoted, _) = p.take_v_changes()[0];
        r.propagate_eq(&p, demoted, p.find_var(demoted)).unwrap();
        assert!(r.take_deductions().contains(&Deduction::Implies(us, ur)));
    }

    #[test]
    fn disjoint_literals_clash() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut r = Rename::new();
        r.declare_disjoint("red", "blue");
        let x = vt.intern("x");
        r.assert_monadic(&p, "red", x, true, &Jst::axiom(0)).unwrap();
        let err = r
            .assert_monadic(&p, "blue", x, true, &Jst::axiom(1))
            .unwrap_err();
        let j = err.jst().unwrap();
        assert!(j.contains(0) && j.contains(1));
    }

    #[test]
    fn literal_entailment_through_sub() {
        let mut vt = VarTable::new();
        let p = Partition::new();
        let mut r = Rename::new();
        r.declare_sub("square", "rect");
        let x = vt.intern("x");
        r.assert_monadic(&p, "square", x, true, &Jst::axiom(0)).unwrap();
        let (value, j) = r.status_monadic(&p, "rect", x).unwrap();
        assert!(value);
        assert!(j.contains(0));
        // and asserting ~rect(x) now contradicts
        assert!(r.assert_monadic(&p, "rect", x, false, &Jst::axiom(1)).is_err());
    }

    #[test]
    fn literal_stores_merge_on_union() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut r = Rename::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        r.assert_monadic(&p, "even", x, true, &Jst::axiom(0)).unwrap();
        r.assert_monadic(&p, "even", y, false, &Jst::axiom(1)).unwrap();
        p.union(x, y, &Jst::axiom(2)).unwrap();
        let (demoted, _) = p.take_v_changes()[0];
        let err = r.propagate_eq(&p, demoted, p.find_var(demoted)).unwrap_err();
        assert!(err.jst().is_some());
    }
}
