//! Justification sets
//!
//! A justification is an opaque set of input-atom indices witnessing a
//! derived fact. Union is the only combinator; no proof terms are built.
//! Sets are shared behind an `Arc` so that threading them through the
//! partition, the congruence table and the solution sets stays cheap.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Index of an input atom in the context's assertion list
pub type AtomId = u32;

/// A set of input atoms witnessing a derived fact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jst(Arc<BTreeSet<AtomId>>);

impl Jst {
    /// The empty justification: facts that hold by canonization alone
    pub fn empty() -> Self {
        Jst(Arc::new(BTreeSet::new()))
    }

    /// Wrap a single input atom
    pub fn axiom(id: AtomId) -> Self {
        let mut set = BTreeSet::new();
        set.insert(id);
        Jst(Arc::new(set))
    }

    /// Union of two justifications
    pub fn dep2(a: &Jst, b: &Jst) -> Self {
        if a.0.is_empty() || Arc::ptr_eq(&a.0, &b.0) {
            return b.clone();
        }
        if b.0.is_empty() {
            return a.clone();
        }
        if b.0.is_subset(&a.0) {
            return a.clone();
        }
        let mut set = (*a.0).clone();
        set.extend(b.0.iter().copied());
        Jst(Arc::new(set))
    }

    /// Union of arbitrarily many justifications
    pub fn dep<'a>(parts: impl IntoIterator<Item = &'a Jst>) -> Self {
        let mut out = Jst::empty();
        for j in parts {
            out = Jst::dep2(&out, j);
        }
        out
    }

    /// Extend this justification in place
    pub fn merge(&mut self, other: &Jst) {
        *self = Jst::dep2(self, other);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// The input atoms implicated, in ascending order
    pub fn atoms(&self) -> impl Iterator<Item = AtomId> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, id: AtomId) -> bool {
        self.0.contains(&id)
    }
}

impl Default for Jst {
    fn default() -> Self {
        Jst::empty()
    }
}

impl fmt::Display for Jst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.atoms().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "#{}", id)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axiom_contains_only_itself() {
        let j = Jst::axiom(3);
        assert!(j.contains(3));
        assert!(!j.contains(4));
        assert_eq!(j.len(), 1);
    }

    #[test]
    fn dep2_unions() {
        let a = Jst::axiom(1);
        let b = Jst::axiom(2);
        let ab = Jst::dep2(&a, &b);
        assert!(ab.contains(1) && ab.contains(2));
        assert_eq!(ab.len(), 2);
    }

    #[test]
    fn dep2_with_empty_shares() {
        let a = Jst::axiom(7);
        let e = Jst::empty();
        assert_eq!(Jst::dep2(&a, &e), a);
        assert_eq!(Jst::dep2(&e, &a), a);
    }

    #[test]
    fn dep_many() {
        let parts = [Jst::axiom(0), Jst::axiom(5), Jst::axiom(0)];
        let j = Jst::dep(parts.iter());
        assert_eq!(j.atoms().collect::<Vec<_>>(), vec![0, 5]);
    }
}
