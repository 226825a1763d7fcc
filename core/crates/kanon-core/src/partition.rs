//! Variable partition: equivalences, disequalities, constraints
//!
//! Three coupled stores over variables. `V` is a union-find whose edges
//! carry justifications; `D` is a symmetric disequality relation on
//! canonical variables; `C` maps canonical variables to arithmetic
//! domains. Every mutation is recorded in an ordered change set, which
//! the combination engine drains deterministically.
//!
//! The canonical representative of a merged class is the smallest
//! variable under the kind-then-id order, so external variables win over
//! engine-generated ones.

use crate::cnstrnt::Cnstrnt;
use crate::error::{KanonError, KanonResult};
use crate::jst::Jst;
use crate::term::Var;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Change sets, append-only within one `add`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changed {
    /// `(demoted, canonical)` pairs from unions, in merge order
    pub v: Vec<(Var, Var)>,
    /// Canonical pairs that gained a disequality
    pub d: Vec<(Var, Var)>,
    /// Canonical variables whose constraint narrowed
    pub c: Vec<Var>,
}

impl Changed {
    pub fn is_empty(&self) -> bool {
        self.v.is_empty() && self.d.is_empty() && self.c.is_empty()
    }
}

/// The partition `P = (V, D, C)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Union-find: absent variables are their own root
    parent: BTreeMap<Var, (Var, Jst)>,
    /// Symmetric disequality store, both directions present
    diseqs: BTreeMap<Var, BTreeMap<Var, Jst>>,
    /// Arithmetic domains on canonical variables
    cnstrnts: BTreeMap<Var, (Cnstrnt, Jst)>,
    changed: Changed,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical representative together with the justification of the
    /// path from `x` to it
    pub fn find(&self, x: Var) -> (Var, Jst) {
        let mut cur = x;
        let mut jst = Jst::empty();
        while let Some((p, j)) = self.parent.get(&cur) {
            jst.merge(j);
            cur = *p;
        }
        (cur, jst)
    }

    /// Canonical representative, justification dropped
    pub fn find_var(&self, x: Var) -> Var {
        self.find(x).0
    }

    pub fn equal(&self, x: Var, y: Var) -> bool {
        self.find_var(x) == self.find_var(y)
    }

    /// Justification that `x = y`, when they are in the same class
    pub fn equal_jst(&self, x: Var, y: Var) -> Option<Jst> {
        let (xr, jx) = self.find(x);
        let (yr, jy) = self.find(y);
        if xr == yr {
            Some(Jst::dep2(&jx, &jy))
        } else {
            None
        }
    }

    pub fn diseq(&self, x: Var, y: Var) -> bool {
        self.diseq_jst(x, y).is_some()
    }

    /// Justification of a stored disequality between the classes of `x`
    /// and `y`, if any
    pub fn diseq_jst(&self, x: Var, y: Var) -> Option<Jst> {
        let (xr, jx) = self.find(x);
        let (yr, jy) = self.find(y);
        let jd = self.diseqs.get(&xr)?.get(&yr)?;
        Some(Jst::dep(&[jd.clone(), jx, jy]))
    }

    /// The constraint on the class of `x`, if any
    pub fn cnstrnt(&self, x: Var) -> Option<(Cnstrnt, Jst)> {
        let (xr, jx) = self.find(x);
        let (c, jc) = self.cnstrnts.get(&xr)?;
        Some((c.clone(), Jst::dep2(jc, &jx)))
    }

    /// Merge the classes of `x` and `y`
    ///
    /// Raises an inconsistency when a disequality separates the classes
    /// or when the met constraint empties. The demoted variable is
    /// recorded in the V change set.
    pub fn union(&mut self, x: Var, y: Var, j: &Jst) -> KanonResult<()> {
        let (xr, jx) = self.find(x);
        let (yr, jy) = self.find(y);
        if xr == yr {
            return Ok(());
        }
        let edge = Jst::dep(&[j.clone(), jx, jy]);
        if let Some(jd) = self.diseqs.get(&xr).and_then(|m| m.get(&yr)) {
            return Err(KanonError::inconsistent(Jst::dep2(&edge, jd)));
        }
        // smaller variable becomes the representative
        let (canon, demoted) = if xr < yr { (xr, yr) } else { (yr, xr) };
        trace!(demoted = %demoted, canon = %canon, "union");
        self.parent.insert(demoted, (canon, edge.clone()));

        // migrate disequalities of the demoted class
        if let Some(partners) = self.diseqs.remove(&demoted) {
            for (z, jd) in partners {
                let jd = Jst::dep2(&jd, &edge);
                if let Some(m) = self.diseqs.get_mut(&z) {
                    m.remove(&demoted);
                    m.insert(canon, jd.clone());
                }
                self.diseqs.entry(canon).or_default().insert(z, jd);
            }
        }

        // meet the constraints of the two classes
        let dc = self.cnstrnts.remove(&demoted);
        let cc = self.cnstrnts.get(&canon).cloned();
        match (dc, cc) {
            (Some((c1, j1)), Some((c2, j2))) => {
                let met = c1.meet(&c2);
                let jm = Jst::dep(&[j1, j2, edge.clone()]);
                if met.is_empty() {
                    return Err(KanonError::inconsistent(jm));
                }
                if met != c2 {
                    self.changed.c.push(canon);
                }
                self.cnstrnts.insert(canon, (met, jm));
            }
            (Some((c1, j1)), None) => {
                self.cnstrnts
                    .insert(canon, (c1, Jst::dep2(&j1, &edge)));
                self.changed.c.push(canon);
            }
            _ => {}
        }

        self.changed.v.push((demoted, canon));
        Ok(())
    }

    /// Assert `x <> y`
    ///
    /// Raises an inconsistency when the classes already coincide.
    pub fn separate(&mut self, x: Var, y: Var, j: &Jst) -> KanonResult<()> {
        let (xr, jx) = self.find(x);
        let (yr, jy) = self.find(y);
        let full = Jst::dep(&[j.clone(), jx, jy]);
        if xr == yr {
            return Err(KanonError::inconsistent(full));
        }
        if self.diseqs.get(&xr).map_or(false, |m| m.contains_key(&yr)) {
            return Ok(());
        }
        trace!(x = %xr, y = %yr, "separate");
        self.diseqs.entry(xr).or_default().insert(yr, full.clone());
        self.diseqs.entry(yr).or_default().insert(xr, full);
        self.changed.d.push((xr, yr));
        Ok(())
    }

    /// Meet the constraint of the class of `x` with `c`
    pub fn refine(&mut self, x: Var, c: &Cnstrnt, j: &Jst) -> KanonResult<()> {
        let (xr, jx) = self.find(x);
        let j = Jst::dep2(j, &jx);
        match self.cnstrnts.get(&xr) {
            Some((old, jo)) => {
                let met = old.meet(c);
                let jm = Jst::dep2(&j, jo);
                if met.is_empty() {
                    return Err(KanonError::inconsistent(jm));
                }
                if &met == old {
                    return Ok(());
                }
                trace!(x = %xr, cnstrnt = %met, "refine");
                self.cnstrnts.insert(xr, (met, jm));
            }
            None => {
                if c.is_empty() {
                    return Err(KanonError::inconsistent(j));
                }
                if c.is_full() {
                    return Ok(());
                }
                trace!(x = %xr, cnstrnt = %c, "constrain");
                self.cnstrnts.insert(xr, (c.clone(), j));
            }
        }
        self.changed.c.push(xr);
        Ok(())
    }

    /// Take the pending V changes, oldest first
    pub fn take_v_changes(&mut self) -> Vec<(Var, Var)> {
        std::mem::take(&mut self.changed.v)
    }

    pub fn take_d_changes(&mut self) -> Vec<(Var, Var)> {
        std::mem::take(&mut self.changed.d)
    }

    pub fn take_c_changes(&mut self) -> Vec<Var> {
        std::mem::take(&mut self.changed.c)
    }

    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// All non-canonical variables with their direct parents
    pub fn edges(&self) -> impl Iterator<Item = (Var, Var)> + '_ {
        self.parent.iter().map(|(x, (p, _))| (*x, *p))
    }

    /// Stored disequalities as canonical pairs, each pair once
    pub fn diseq_pairs(&self) -> Vec<(Var, Var)> {
        let mut out = BTreeSet::new();
        for (x, m) in &self.diseqs {
            for y in m.keys() {
                let (a, b) = if x < y { (*x, *y) } else { (*y, *x) };
                out.insert((a, b));
            }
        }
        out.into_iter().collect()
    }

    /// Constraints on canonical variables
    pub fn cnstrnt_entries(&self) -> impl Iterator<Item = (Var, &Cnstrnt)> + '_ {
        self.cnstrnts.iter().map(|(x, (c, _))| (*x, c))
    }
}
