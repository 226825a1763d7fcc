//! Congruence closure for uninterpreted applications
//!
//! Every uninterpreted (or apply/abstract) application is flattened to an
//! alias variable `u` with a binding `u -> f(xs)` over canonical argument
//! variables. The congruence table is keyed on `(f, canonical args)`, so
//! two applications of the same symbol to equal arguments share one
//! alias. When a union demotes a variable, `close` rekeys the bindings
//! that mention it; a key collision means two aliases became congruent
//! and their union is queued for the partition.

use crate::jst::Jst;
use crate::partition::Partition;
use crate::term::{Sym, Var, VarKind, VarTable};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// An application shape: symbol plus canonical argument variables
pub type AppKey = (Sym, Vec<Var>);

/// The congruence-closure configuration `U`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cc {
    /// `(f, xs) -> (alias, jst)`; the justification relates the alias to
    /// the application over these exact arguments
    table: BTreeMap<AppKey, (Var, Jst)>,
    /// Argument variable -> keys that mention it
    uses: BTreeMap<Var, BTreeSet<AppKey>>,
    /// Canonical class -> applications known equal to it
    members: BTreeMap<Var, BTreeSet<AppKey>>,
}

impl Cc {
    pub fn new() -> Self {
        Self::default()
    }

    /// The alias for `f(xs)` up to `V`, creating a fresh rename variable
    /// if none exists
    ///
    /// Must be called in a congruence-closed state. Returns the alias
    /// (canonicalized) and the justification that it equals the
    /// application over the original arguments.
    pub fn alias(
        &mut self,
        partition: &Partition,
        vars: &mut VarTable,
        sym: Sym,
        args: Vec<Var>,
    ) -> (Var, Jst) {
        let mut jst = Jst::empty();
        let canon_args: Vec<Var> = args
            .into_iter()
            .map(|a| {
                let (r, j) = partition.find(a);
                jst.merge(&j);
                r
            })
            .collect();
        let key = (sym, canon_args);
        if let Some((u, ju)) = self.table.get(&key) {
            let (ur, jr) = partition.find(*u);
            return (ur, Jst::dep(&[jst, ju.clone(), jr]));
        }
        let u = vars.fresh(VarKind::Rename);
        trace!(alias = %u, sym = %key.0, "new alias");
        for a in &key.1 {
            self.uses.entry(*a).or_default().insert(key.clone());
        }
        self.members.entry(u).or_default().insert(key.clone());
        self.table.insert(key, (u, jst.clone()));
        (u, jst)
    }

    /// The canonical alias of `f(xs)` up to `V`, if one exists
    pub fn inv(&self, partition: &Partition, sym: &Sym, args: &[Var]) -> Option<(Var, Jst)> {
        let mut jst = Jst::empty();
        let canon_args: Vec<Var> = args
            .iter()
            .map(|a| {
                let (r, j) = partition.find(*a);
                jst.merge(&j);
                r
            })
            .collect();
        let (u, ju) = self.table.get(&(sym.clone(), canon_args))?;
        let (ur, jr) = partition.find(*u);
        Some((ur, Jst::dep(&[jst, ju.clone(), jr])))
    }

    /// The applications known equal to the class of `x`
    pub fn lookup<'a>(&'a self, partition: &Partition, x: Var) -> Vec<&'a AppKey> {
        let xr = partition.find_var(x);
        self.members
            .get(&xr)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }

    /// Re-establish congruence closure after the union demoting `x` to
    /// `y`
    ///
    /// Rekeys every binding whose key or alias class mentions `x`.
    /// Aliases that become congruent are pushed onto `pending` for the
    /// engine to union; the engine then calls `close` again for the
    /// unions that result, until the V change set drains.
    pub fn close(
        &mut self,
        partition: &Partition,
        x: Var,
        y: Var,
        pending: &mut Vec<(Var, Var, Jst)>,
    ) {
        let (yr, j_edge) = partition.find(x);
        debug_assert_eq!(yr, partition.find_var(y));

        // rekey bindings applying to x
        if let Some(keys) = self.uses.remove(&x) {
            for key in keys {
                let Some((u, ju)) = self.table.remove(&key) else {
                    continue;
                };
                if let Some(ms) = self.members.get_mut(&partition.find_var(u)) {
                    ms.remove(&key);
                }
                let mut jst = Jst::dep2(&ju, &j_edge);
                let new_args: Vec<Var> = key
                    .1
                    .iter()
                    .map(|a| {
                        let (r, j) = partition.find(*a);
                        jst.merge(&j);
                        r
                    })
                    .collect();
                let new_key = (key.0.clone(), new_args);
                match self.table.get(&new_key) {
                    Some((v, jv)) => {
                        // congruence: u = f(..x..), v = f(..y..), x = y
                        trace!(u = %u, v = %v, "congruent aliases");
                        pending.push((u, *v, Jst::dep2(&jst, jv)));
                    }
                    None => {
                        for a in &new_key.1 {
                            self.uses.entry(*a).or_default().insert(new_key.clone());
                        }
                        self.members
                            .entry(partition.find_var(u))
                            .or_default()
                            .insert(new_key.clone());
                        self.table.insert(new_key, (u, jst));
                    }
                }
            }
        }

        // migrate the member set of the demoted class
        if let Some(apps) = self.members.remove(&x) {
            self.members.entry(yr).or_default().extend(apps);
        }
    }

    /// All bindings, canonicalized: `(alias class, application)`
    pub fn bindings<'a>(
        &'a self,
        partition: &'a Partition,
    ) -> impl Iterator<Item = (Var, &'a AppKey)> + 'a {
        self.table
            .iter()
            .map(move |(key, (u, _))| (partition.find_var(*u), key))
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f() -> Sym {
        Sym::Uninterp("f".into())
    }

    #[test]
    fn alias_is_shared_for_equal_args() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut cc = Cc::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        p.union(x, y, &Jst::axiom(0)).unwrap();
        let (u1, _) = cc.alias(&p, &mut vt, f(), vec![x]);
        let (u2, j2) = cc.alias(&p, &mut vt, f(), vec![y]);
        assert_eq!(u1, u2);
        assert!(j2.contains(0), "sharing depends on x = y");
    }

    #[test]
    fn close_unions_congruent_aliases() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut cc = Cc::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let (u, _) = cc.alias(&p, &mut vt, f(), vec![x]);
        let (v, _) = cc.alias(&p, &mut vt, f(), vec![y]);
        assert_ne!(u, v);
        p.union(x, y, &Jst::axiom(1)).unwrap();
        let mut pending = Vec::new();
        for (demoted, canon) in p.take_v_changes() {
            cc.close(&p, demoted, canon, &mut pending);
        }
        assert_eq!(pending.len(), 1);
        let (a, b, j) = &pending[0];
        assert!((*a == u && *b == v) || (*a == v && *b == u));
        assert!(j.contains(1));
    }

    #[test]
    fn inv_finds_up_to_v() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut cc = Cc::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let (u, _) = cc.alias(&p, &mut vt, f(), vec![x]);
        assert!(cc.inv(&p, &f(), &[y]).is_none());
        p.union(x, y, &Jst::axiom(0)).unwrap();
        let mut pending = Vec::new();
        for (d, c) in p.take_v_changes() {
            cc.close(&p, d, c, &mut pending);
        }
        let (w, j) = cc.inv(&p, &f(), &[y]).expect("f(y) resolves via x = y");
        assert_eq!(w, p.find_var(u));
        assert!(j.contains(0));
    }

    #[test]
    fn lookup_returns_member_applications() {
        let mut vt = VarTable::new();
        let mut p = Partition::new();
        let mut cc = Cc::new();
        let x = vt.intern("x");
        let (u, _) = cc.alias(&p, &mut vt, f(), vec![x]);
        let apps = cc.lookup(&p, u);
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].0, f());
    }
}
