//! The combination engine
//!
//! A `Context` is a canonical logical state: the asserted atoms, the
//! variable partition, the congruence-closure configuration, one
//! solution set per theory and the renaming layer. `add` is the entry
//! point: it abstracts the atom over alias variables, solves and
//! composes in the relevant theory, then drains the change sets to a
//! fixpoint in a fixed deterministic order: congruence closure for
//! merged classes, fusion into every solution set, constraint
//! propagation, renaming-layer deductions.
//!
//! `add` never mutates its receiver: it works on a clone and either
//! returns it (`Ok`) or drops it (`Valid` / `Inconsistent`), so failed
//! assertions roll back wholesale, fresh-variable counter included.

use crate::atom::Atom;
use crate::cc::Cc;
use crate::cnstrnt::Cnstrnt;
use crate::error::{KanonError, KanonResult};
use crate::jst::{AtomId, Jst};
use crate::partition::Partition;
use crate::rename::{Deduction, Payload, PropVar, Rename};
use crate::solution::Solution;
use crate::term::{Sym, Term, Var, VarKind, VarTable};
use crate::theories::arith::{diophantine_unsolvable, Poly};
use crate::theory::{map_term, theory, SolveFailure, TheoryId};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::{debug, trace, warn};

/// Per-run switches
///
/// Both flags are observed from the first `add` on; reconfiguring an
/// existing context is not supported; build a fresh one with
/// `Context::with_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Reject linear equations over integer-constrained variables that
    /// fail the gcd divisibility test
    pub integer_solve: bool,
    /// Emit a diagnostic when extracting unsat cores, reminding that the
    /// reduction may be incomplete
    pub cone_of_influence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            integer_solve: true,
            cone_of_influence: false,
        }
    }
}

/// Verdict of `add`
#[derive(Debug)]
pub enum Status {
    /// Already entailed by the context
    Valid(Jst),
    /// Contradicts the context; carries the implicated input atoms
    Inconsistent(Jst),
    /// Consistently added
    Ok(Box<Context>),
}

impl Status {
    pub fn is_valid(&self) -> bool {
        matches!(self, Status::Valid(_))
    }

    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Status::Inconsistent(_))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok(_))
    }
}

/// A logical context over the combined theories
#[derive(Debug, Clone)]
pub struct Context {
    atoms: Vec<Atom>,
    vars: VarTable,
    partition: Partition,
    cc: Cc,
    solutions: BTreeMap<TheoryId, Solution>,
    rename: Rename,
    config: Config,
    // work queues, empty between `add` calls
    pending: Vec<(Var, Var, Jst)>,
    installed: Vec<(TheoryId, Var)>,
    requeued: Vec<(TheoryId, Var, Term, Jst)>,
}

impl Context {
    /// The initial context, asserting nothing
    pub fn empty() -> Context {
        Context::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Context {
        let mut solutions = BTreeMap::new();
        for th in TheoryId::ALL {
            solutions.insert(th, Solution::new());
        }
        Context {
            atoms: Vec::new(),
            vars: VarTable::new(),
            partition: Partition::new(),
            cc: Cc::new(),
            solutions,
            rename: Rename::new(),
            config,
            pending: Vec::new(),
            installed: Vec::new(),
            requeued: Vec::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The asserted atoms, in assertion order
    pub fn ctxt(&self) -> &[Atom] {
        &self.atoms
    }

    /// Intern an external variable by name
    pub fn var(&mut self, name: &str) -> Var {
        self.vars.intern(name)
    }

    /// Deep copy for branching
    pub fn copy(&self) -> Context {
        self.clone()
    }

    /// A consistent context is its own satisfying witness; no case
    /// splitting is attempted
    pub fn is_sat(&self) -> bool {
        true
    }

    /// Map a justification back to the input atoms it implicates
    pub fn unsat_core(&self, jst: &Jst) -> Vec<&Atom> {
        if self.config.cone_of_influence {
            warn!("cone-of-influence reduction may drop atoms needed for unsatisfiability");
        }
        jst.atoms()
            .filter_map(|id| self.atoms.get(id as usize))
            .collect()
    }

    /// Assert an atom
    pub fn add(&self, atom: &Atom) -> Status {
        debug!(atom = %atom, "add");
        if let Some(status) = self.verdict(atom) {
            return status;
        }
        let mut next = self.clone();
        let id = next.atoms.len() as AtomId;
        next.atoms.push(atom.clone());
        let j = Jst::axiom(id);
        match next.process(atom, &j) {
            Ok(()) => Status::Ok(Box::new(next)),
            Err(KanonError::Inconsistent { jst }) => Status::Inconsistent(jst),
            Err(other) => unreachable!("engine error escaped processing: {other}"),
        }
    }

    /// Assert a sequence of atoms, stopping at the first inconsistency
    pub fn addl(&self, atoms: &[Atom]) -> Status {
        let mut cur = Box::new(self.clone());
        for atom in atoms {
            match cur.add(atom) {
                Status::Ok(next) => cur = next,
                Status::Valid(_) => {}
                inconsistent @ Status::Inconsistent(_) => return inconsistent,
            }
        }
        Status::Ok(cur)
    }

    /// Whether `atom` is entailed
    pub fn is_valid(&self, atom: &Atom) -> bool {
        self.add(atom).is_valid()
    }

    /// Whether `atom` contradicts the context
    pub fn is_inconsistent(&self, atom: &Atom) -> bool {
        self.add(atom).is_inconsistent()
    }

    // ------------------------------------------------------------------
    // canonization and entailment checks
    // ------------------------------------------------------------------

    /// The canonical form of a variable: its class representative,
    /// expanded through the solution set that binds it
    fn can_var(&self, x: Var) -> (Term, Jst) {
        let (xr, mut jst) = self.partition.find(x);
        for th in TheoryId::ALL {
            if let Some((t, jb)) = self.solutions[&th].apply(xr) {
                jst.merge(jb);
                return (t.clone(), jst);
            }
        }
        (Term::Var(xr), jst)
    }

    /// Name a canonical term back to a variable, when one is known
    fn name_of(&self, t: &Term) -> Option<(Var, Jst)> {
        match t {
            Term::Var(v) => Some(self.partition.find(*v)),
            Term::App(sym, _) => {
                let th = sym.theory()?;
                let x = self.solutions[&th].inv(t)?;
                let (_, jb) = self.solutions[&th].apply(x)?;
                let (xr, jr) = self.partition.find(x);
                Some((xr, Jst::dep2(jb, &jr)))
            }
        }
    }

    /// The canonical form of a term under the current context
    pub fn can(&self, t: &Term) -> (Term, Jst) {
        match t {
            Term::Var(x) => self.can_var(*x),
            Term::App(sym, args) => {
                let mut jst = Jst::empty();
                let cargs: Vec<Term> = args
                    .iter()
                    .map(|a| {
                        let (c, ja) = self.can(a);
                        jst.merge(&ja);
                        c
                    })
                    .collect();
                match sym.theory() {
                    Some(th_id) => {
                        let t1 = theory(th_id).sigma(sym, cargs);
                        if let Term::Var(v) = t1 {
                            let (tv, jv) = self.can_var(v);
                            jst.merge(&jv);
                            return (tv, jst);
                        }
                        // a named term canonizes to its name's class form
                        if let Some(x) = self.solutions[&th_id].inv(&t1) {
                            if let Some((_, jb)) = self.solutions[&th_id].apply(x) {
                                jst.merge(jb);
                            }
                            let (tx, jx) = self.can_var(x);
                            jst.merge(&jx);
                            return (tx, jst);
                        }
                        (t1, jst)
                    }
                    None => {
                        // congruence-closed symbols resolve through U
                        let names: Option<Vec<Var>> = cargs
                            .iter()
                            .map(|c| {
                                self.name_of(c).map(|(v, jn)| {
                                    jst.merge(&jn);
                                    v
                                })
                            })
                            .collect();
                        if let Some(names) = names {
                            if let Some((u, ju)) = self.cc.inv(&self.partition, sym, &names) {
                                jst.merge(&ju);
                                let (tu, ju2) = self.can_var(u);
                                jst.merge(&ju2);
                                return (tu, jst);
                            }
                            return (
                                Term::App(sym.clone(), names.into_iter().map(Term::Var).collect()),
                                jst,
                            );
                        }
                        (Term::App(sym.clone(), cargs), jst)
                    }
                }
            }
        }
    }

    /// Entailment verdict for an atom, when canonization decides it
    fn verdict(&self, atom: &Atom) -> Option<Status> {
        match atom {
            Atom::True => Some(Status::Valid(Jst::empty())),
            Atom::False => Some(Status::Inconsistent(Jst::empty())),
            Atom::Eq(a, b) => {
                let (ca, ja) = self.can(a);
                let (cb, jb) = self.can(b);
                let jst = Jst::dep2(&ja, &jb);
                if ca == cb {
                    return Some(Status::Valid(jst));
                }
                if definitely_distinct(&ca, &cb) {
                    return Some(Status::Inconsistent(jst));
                }
                if let (Some(x), Some(y)) = (ca.as_var(), cb.as_var()) {
                    if let Some(jd) = self.partition.diseq_jst(x, y) {
                        return Some(Status::Inconsistent(Jst::dep2(&jst, &jd)));
                    }
                }
                if let Some(status) = self.num_vs_var_verdict(&ca, &cb, &jst, true) {
                    return Some(status);
                }
                None
            }
            Atom::Diseq(a, b) => {
                let (ca, ja) = self.can(a);
                let (cb, jb) = self.can(b);
                let jst = Jst::dep2(&ja, &jb);
                if ca == cb {
                    return Some(Status::Inconsistent(jst));
                }
                if definitely_distinct(&ca, &cb) {
                    return Some(Status::Valid(jst));
                }
                if let (Some(x), Some(y)) = (ca.as_var(), cb.as_var()) {
                    if let Some(jd) = self.partition.diseq_jst(x, y) {
                        return Some(Status::Valid(Jst::dep2(&jst, &jd)));
                    }
                }
                if let Some(status) = self.num_vs_var_verdict(&ca, &cb, &jst, false) {
                    return Some(status);
                }
                // a disequality holds exactly when assuming the equality
                // refutes
                if let Some(jp) = self.probe_inconsistent(&Atom::Eq(a.clone(), b.clone())) {
                    return Some(Status::Valid(Jst::dep2(&jst, &jp)));
                }
                None
            }
            Atom::In(t, c) => {
                let (ct, jt) = self.can(t);
                if let Some(q) = ct.as_num() {
                    return if c.member(q) {
                        Some(Status::Valid(jt))
                    } else {
                        Some(Status::Inconsistent(jt))
                    };
                }
                let current = match ct.as_var() {
                    Some(x) => self.partition.cnstrnt(x),
                    None => Poly::of_term(&ct).map(|p| {
                        let mut jst = jt.clone();
                        let iv = p.interval(&mut |v| {
                            self.partition.cnstrnt(v).map(|(cv, jv)| {
                                jst.merge(&jv);
                                cv
                            })
                        });
                        (iv, jst)
                    }),
                };
                if let Some((cv, jc)) = current {
                    let jst = Jst::dep2(&jt, &jc);
                    if cv.subset(c) {
                        return Some(Status::Valid(jst));
                    }
                    if cv.meet(c).is_empty() {
                        return Some(Status::Inconsistent(jst));
                    }
                }
                None
            }
            Atom::Pred(p, t) | Atom::NegPred(p, t) => {
                let positive = matches!(atom, Atom::Pred(_, _));
                let (ct, jt) = self.can(t);
                let x = ct.as_var()?;
                let (value, jk) = self.rename.status_monadic(&self.partition, p, x)?;
                let jst = Jst::dep2(&jt, &jk);
                if value == positive {
                    Some(Status::Valid(jst))
                } else {
                    Some(Status::Inconsistent(jst))
                }
            }
        }
    }

    /// Whether assuming `atom` (as a hypothesis, not an input) refutes
    /// the context; the returned justification mentions context atoms
    /// only
    fn probe_inconsistent(&self, atom: &Atom) -> Option<Jst> {
        let mut probe = self.clone();
        match probe.process(atom, &Jst::empty()) {
            Err(KanonError::Inconsistent { jst }) => Some(jst),
            _ => None,
        }
    }

    /// Equality between a numeral and a constrained variable decides
    /// when the constraint pins or excludes the value
    fn num_vs_var_verdict(
        &self,
        ca: &Term,
        cb: &Term,
        jst: &Jst,
        eq: bool,
    ) -> Option<Status> {
        let (x, q) = match (ca.as_var(), ca.as_num(), cb.as_var(), cb.as_num()) {
            (Some(x), _, _, Some(q)) => (x, q),
            (_, Some(q), Some(x), _) => (x, q),
            _ => return None,
        };
        let (c, jc) = self.partition.cnstrnt(x)?;
        let jst = Jst::dep2(jst, &jc);
        if c.as_point() == Some(q) {
            return Some(if eq {
                Status::Valid(jst)
            } else {
                Status::Inconsistent(jst)
            });
        }
        if !c.member(q) {
            return Some(if eq {
                Status::Inconsistent(jst)
            } else {
                Status::Valid(jst)
            });
        }
        None
    }

    // ------------------------------------------------------------------
    // assertion pipeline
    // ------------------------------------------------------------------

    fn process(&mut self, atom: &Atom, j: &Jst) -> KanonResult<()> {
        match atom {
            Atom::True => Ok(()),
            Atom::False => Err(KanonError::inconsistent(j.clone())),
            Atom::Eq(a, b) => {
                let (va, ja) = self.name_term(a)?;
                let (vb, jb) = self.name_term(b)?;
                let jst = Jst::dep(&[j.clone(), ja, jb]);
                self.partition.union(va, vb, &jst)?;
                self.drain()
            }
            Atom::Diseq(a, b) => {
                let (va, ja) = self.name_term(a)?;
                let (vb, jb) = self.name_term(b)?;
                let jst = Jst::dep(&[j.clone(), ja, jb]);
                self.partition.separate(va, vb, &jst)?;
                self.drain()
            }
            Atom::In(t, c) => {
                match t {
                    Term::Var(x) => {
                        self.partition.refine(*x, c, j)?;
                    }
                    _ if t.theory() == Some(TheoryId::Arith) => {
                        // slack path: name the polynomial by a fresh
                        // non-negative-style slack carrying the constraint
                        let (pure, jp) = self.purify(t, TheoryId::Arith)?;
                        let (norm, jn) = self.normalize(TheoryId::Arith, &pure);
                        let jst = Jst::dep(&[j.clone(), jp, jn]);
                        if let Some(q) = norm.as_num() {
                            if c.member(q) {
                                return Ok(());
                            }
                            return Err(KanonError::inconsistent(jst));
                        }
                        let s = self.vars.fresh(VarKind::Slack);
                        self.partition.refine(s, c, j)?;
                        self.solve_compose(TheoryId::Arith, Term::Var(s), norm, &jst)?;
                    }
                    _ => {
                        let (v, jv) = self.name_term(t)?;
                        self.partition.refine(v, c, &Jst::dep2(j, &jv))?;
                    }
                }
                self.drain()
            }
            Atom::Pred(p, t) | Atom::NegPred(p, t) => {
                let positive = matches!(atom, Atom::Pred(_, _));
                let (v, jv) = self.name_term(t)?;
                let jst = Jst::dep2(j, &jv);
                self.rename
                    .assert_monadic(&self.partition, p, v, positive, &jst)?;
                self.drain()
            }
        }
    }

    /// Name a term by a variable, introducing alias variables and
    /// definitional bindings as needed
    fn name_term(&mut self, t: &Term) -> KanonResult<(Var, Jst)> {
        match t {
            Term::Var(x) => Ok((*x, Jst::empty())),
            Term::App(sym, args) => match sym.theory() {
                None => {
                    let mut jst = Jst::empty();
                    let mut vargs = Vec::with_capacity(args.len());
                    for a in args {
                        let (v, ja) = self.name_term(a)?;
                        jst.merge(&ja);
                        vargs.push(v);
                    }
                    let (u, ju) = self
                        .cc
                        .alias(&self.partition, &mut self.vars, sym.clone(), vargs);
                    jst.merge(&ju);
                    Ok((u, jst))
                }
                Some(th_id) => {
                    let (pure, jp) = self.purify(t, th_id)?;
                    let (norm, jn) = self.normalize(th_id, &pure);
                    let mut jst = Jst::dep2(&jp, &jn);
                    if let Term::Var(v) = norm {
                        return Ok((v, jst));
                    }
                    if let Some(x) = self.solutions[&th_id].inv(&norm) {
                        if let Some((_, jb)) = self.solutions[&th_id].apply(x) {
                            jst.merge(jb);
                        }
                        let (xr, jr) = self.partition.find(x);
                        jst.merge(&jr);
                        return Ok((xr, jst));
                    }
                    let v = self.vars.fresh(VarKind::Rename);
                    trace!(var = %v, term = %norm, theory = %th_id, "definitional binding");
                    self.solve_compose(th_id, Term::Var(v), norm, &jst)?;
                    Ok((v, jst))
                }
            },
        }
    }

    /// Replace maximal foreign subterms by their names, leaving a pure
    /// term of theory `th_id`
    fn purify(&mut self, t: &Term, th_id: TheoryId) -> KanonResult<(Term, Jst)> {
        match t {
            Term::Var(x) => Ok((Term::Var(*x), Jst::empty())),
            Term::App(sym, args) if sym.theory() == Some(th_id) => {
                let mut jst = Jst::empty();
                let mut pure_args = Vec::with_capacity(args.len());
                for a in args {
                    let (p, ja) = self.purify(a, th_id)?;
                    jst.merge(&ja);
                    pure_args.push(p);
                }
                Ok((Term::App(sym.clone(), pure_args), jst))
            }
            _ => {
                let (v, jv) = self.name_term(t)?;
                Ok((Term::Var(v), jv))
            }
        }
    }

    /// Normalize a pure term: canonicalize variables through the
    /// partition, substitute through the theory's solution set, and
    /// re-canonize
    fn normalize(&self, th_id: TheoryId, t: &Term) -> (Term, Jst) {
        let mut jst = Jst::empty();
        let sol = &self.solutions[&th_id];
        let out = map_term(theory(th_id), t, &mut |v| {
            let (vr, jv) = self.partition.find(v);
            jst.merge(&jv);
            let (tv, jb) = sol.find(vr);
            jst.merge(&jb);
            if tv == Term::Var(v) {
                None
            } else {
                Some(tv)
            }
        });
        (out, jst)
    }

    /// Solve `a = b` in theory `th_id` and compose the result; both
    /// sides must be normalized. Unsolvable equations fall back to
    /// naming both sides and equating the names.
    fn solve_compose(&mut self, th_id: TheoryId, a: Term, b: Term, j: &Jst) -> KanonResult<()> {
        let th = theory(th_id);
        if th_id == TheoryId::Arith && self.config.integer_solve {
            self.check_diophantine(&a, &b, j)?;
        }
        let solved = {
            let vars = &mut self.vars;
            let mut fresh = |k: VarKind| vars.fresh(k);
            th.solve(&a, &b, &mut fresh)
        };
        match solved {
            Ok(eqs) => {
                trace!(theory = %th_id, count = eqs.len(), "solved");
                let eqs: Vec<(Var, Term, Jst)> =
                    eqs.into_iter().map(|(x, t)| (x, t, j.clone())).collect();
                let mut pending = Vec::new();
                let mut installed = Vec::new();
                let mut requeue = Vec::new();
                if let Some(sol) = self.solutions.get_mut(&th_id) {
                    sol.compose(th, eqs, &mut pending, &mut installed, &mut requeue);
                }
                self.pending.extend(pending);
                self.installed
                    .extend(installed.into_iter().map(|x| (th_id, x)));
                self.requeued
                    .extend(requeue.into_iter().map(|(x, t, j)| (th_id, x, t, j)));
                Ok(())
            }
            Err(SolveFailure::Inconsistent) => Err(KanonError::inconsistent(j.clone())),
            Err(SolveFailure::Unsolvable) => {
                trace!(theory = %th_id, "unsolvable, naming both sides");
                let va = self.name_pure(th_id, a, j);
                let vb = self.name_pure(th_id, b, j);
                self.pending.push((va, vb, j.clone()));
                Ok(())
            }
        }
    }

    /// Name a normalized pure term without solving
    fn name_pure(&mut self, th_id: TheoryId, t: Term, j: &Jst) -> Var {
        if let Term::Var(v) = t {
            return v;
        }
        if let Some(x) = self.solutions[&th_id].inv(&t) {
            return self.partition.find_var(x);
        }
        let v = self.vars.fresh(VarKind::Rename);
        if let Some(sol) = self.solutions.get_mut(&th_id) {
            sol.union(v, t, j.clone());
        }
        self.installed.push((th_id, v));
        v
    }

    /// The Diophantine gcd test on a normalized arithmetic equation
    fn check_diophantine(&self, a: &Term, b: &Term, j: &Jst) -> KanonResult<()> {
        let (Some(pa), Some(pb)) = (Poly::of_term(a), Poly::of_term(b)) else {
            return Ok(());
        };
        let mut p = pa;
        p.sub_assign(&pb);
        let mut jst = j.clone();
        let unsolvable = diophantine_unsolvable(&p, &mut |v| {
            match self.partition.cnstrnt(v) {
                Some((c, jc)) if c.is_int() => {
                    jst.merge(&jc);
                    true
                }
                _ => false,
            }
        });
        if unsolvable {
            return Err(KanonError::inconsistent(jst));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // fixpoint loop
    // ------------------------------------------------------------------

    /// Drain all change sets in the fixed order: pending equalities,
    /// V-changes (congruence closure, renaming, solution-set fusion),
    /// D-changes, freshly installed bindings, C-changes
    fn drain(&mut self) -> KanonResult<()> {
        loop {
            let mut progressed = false;

            while !self.pending.is_empty() {
                progressed = true;
                for (x, y, j) in std::mem::take(&mut self.pending) {
                    self.partition.union(x, y, &j)?;
                }
                self.close_v_changes()?;
            }

            if self.partition.has_changes() {
                progressed = true;
                self.close_v_changes()?;

                for (x, y) in self.partition.take_d_changes() {
                    self.rename.propagate_deq(&self.partition, x, y);
                }

                for x in self.partition.take_c_changes() {
                    self.propagate_cnstrnt(x)?;
                }
            }

            if !self.requeued.is_empty() {
                progressed = true;
                for (th_id, x, t, j) in std::mem::take(&mut self.requeued) {
                    let (a, ja) = self.normalize(th_id, &Term::Var(x));
                    let (b, jb) = self.normalize(th_id, &t);
                    let jst = Jst::dep(&[j, ja, jb]);
                    self.solve_compose(th_id, a, b, &jst)?;
                }
            }

            if !self.installed.is_empty() {
                progressed = true;
                for (th_id, x) in std::mem::take(&mut self.installed) {
                    if th_id == TheoryId::Arith {
                        self.refine_from_binding(x)?;
                    }
                }
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    /// Process every pending union: congruence closure, renaming-layer
    /// propagation, and solution-set maintenance, per demoted variable
    fn close_v_changes(&mut self) -> KanonResult<()> {
        loop {
            let changes = self.partition.take_v_changes();
            if changes.is_empty() {
                return Ok(());
            }
            for (demoted, _) in changes {
                let (canon, j_edge) = self.partition.find(demoted);
                trace!(demoted = %demoted, canon = %canon, "closing");

                let mut congruent = Vec::new();
                self.cc
                    .close(&self.partition, demoted, canon, &mut congruent);
                self.pending.extend(congruent);

                self.rename
                    .propagate_eq(&self.partition, demoted, canon)?;

                for th_id in TheoryId::ALL {
                    let th = theory(th_id);
                    let mut pending = Vec::new();
                    let mut installed = Vec::new();
                    let mut requeue = Vec::new();
                    if let Some(sol) = self.solutions.get_mut(&th_id) {
                        sol.fuse(
                            th,
                            demoted,
                            canon,
                            &j_edge,
                            &mut pending,
                            &mut installed,
                            &mut requeue,
                        );
                    }
                    self.pending.extend(pending);
                    self.installed
                        .extend(installed.into_iter().map(|x| (th_id, x)));
                    self.requeued
                        .extend(requeue.into_iter().map(|(x, t, j)| (th_id, x, t, j)));
                    self.merge_bindings(th_id, demoted, canon, &j_edge)?;
                }
            }
            // unions queued by congruence or composition
            for (x, y, j) in std::mem::take(&mut self.pending) {
                self.partition.union(x, y, &j)?;
            }
        }
    }

    /// When a demoted variable carried a binding, rebind or re-solve it
    /// against the canonical representative's binding
    ///
    /// When the theory's solver cannot reconcile the two right-hand
    /// sides (or re-keying would put the canonical variable inside its
    /// own right-hand side), the demoted binding is parked under its old
    /// name: the partition already records the class equality, and the
    /// reverse index keeps naming idempotent.
    fn merge_bindings(
        &mut self,
        th_id: TheoryId,
        demoted: Var,
        canon: Var,
        j_edge: &Jst,
    ) -> KanonResult<()> {
        let Some((t_d, j_d)) = self
            .solutions
            .get_mut(&th_id)
            .and_then(|sol| sol.restrict(demoted))
        else {
            return Ok(());
        };
        let jst = Jst::dep2(&j_d, j_edge);
        let (t_d, jn) = self.normalize(th_id, &t_d);
        let jst = Jst::dep2(&jst, &jn);
        let canon_binding = self.solutions[&th_id]
            .apply(canon)
            .map(|(t, j)| (t.clone(), j.clone()));
        match canon_binding {
            Some((t_c, j_c)) => {
                if t_d == t_c {
                    return Ok(());
                }
                let th = theory(th_id);
                let j_eq = Jst::dep2(&jst, &j_c);
                let solved = {
                    let vars = &mut self.vars;
                    let mut fresh = |k: VarKind| vars.fresh(k);
                    th.solve(&t_d, &t_c, &mut fresh)
                };
                match solved {
                    Ok(eqs) => {
                        let eqs: Vec<(Var, Term, Jst)> =
                            eqs.into_iter().map(|(x, t)| (x, t, j_eq.clone())).collect();
                        let mut pending = Vec::new();
                        let mut installed = Vec::new();
                        let mut requeue = Vec::new();
                        if let Some(sol) = self.solutions.get_mut(&th_id) {
                            sol.compose(th, eqs, &mut pending, &mut installed, &mut requeue);
                        }
                        self.pending.extend(pending);
                        self.installed
                            .extend(installed.into_iter().map(|x| (th_id, x)));
                        self.requeued
                            .extend(requeue.into_iter().map(|(x, t, j)| (th_id, x, t, j)));
                        Ok(())
                    }
                    Err(SolveFailure::Inconsistent) => Err(KanonError::inconsistent(j_eq)),
                    Err(SolveFailure::Unsolvable) => {
                        trace!(theory = %th_id, var = %demoted, "parking unreconciled binding");
                        if let Some(sol) = self.solutions.get_mut(&th_id) {
                            sol.union(demoted, t_d, jst);
                        }
                        Ok(())
                    }
                }
            }
            None => {
                if let Term::Var(v) = t_d {
                    self.pending.push((canon, v, jst));
                    return Ok(());
                }
                if t_d.occurs(canon) {
                    // a = update(a, i, e) style recursion: keep the old key
                    if let Some(sol) = self.solutions.get_mut(&th_id) {
                        sol.union(demoted, t_d, jst);
                    }
                    return Ok(());
                }
                let mut pending = Vec::new();
                let mut installed = Vec::new();
                let mut requeue = Vec::new();
                if let Some(sol) = self.solutions.get_mut(&th_id) {
                    sol.compose(
                        theory(th_id),
                        vec![(canon, t_d, jst)],
                        &mut pending,
                        &mut installed,
                        &mut requeue,
                    );
                }
                self.pending.extend(pending);
                self.installed
                    .extend(installed.into_iter().map(|x| (th_id, x)));
                self.requeued
                    .extend(requeue.into_iter().map(|(x, t, j)| (th_id, x, t, j)));
                Ok(())
            }
        }
    }

    /// Refine the constraint of a freshly bound variable by interval
    /// evaluation of its right-hand side
    fn refine_from_binding(&mut self, x: Var) -> KanonResult<()> {
        let xr = self.partition.find_var(x);
        let Some((t, jb)) = self.solutions[&TheoryId::Arith]
            .apply(xr)
            .map(|(t, j)| (t.clone(), j.clone()))
        else {
            return Ok(());
        };
        let Some(p) = Poly::of_term(&t) else {
            return Ok(());
        };
        // a binding on an integer variable is itself a Diophantine
        // equation
        if self.config.integer_solve {
            let mut eq = Poly::var(xr);
            eq.sub_assign(&p);
            let mut jd = jb.clone();
            let unsolvable = diophantine_unsolvable(&eq, &mut |v| {
                match self.partition.cnstrnt(v) {
                    Some((c, jc)) if c.is_int() => {
                        jd.merge(&jc);
                        true
                    }
                    _ => false,
                }
            });
            if unsolvable {
                return Err(KanonError::inconsistent(jd));
            }
        }
        let mut jst = jb;
        let iv = p.interval(&mut |v| {
            self.partition.cnstrnt(v).map(|(c, jc)| {
                jst.merge(&jc);
                c
            })
        });
        self.partition.refine(xr, &iv, &jst)
    }

    /// React to a narrowed constraint: re-evaluate dependent bindings
    /// and materialize point values as bindings
    fn propagate_cnstrnt(&mut self, x: Var) -> KanonResult<()> {
        let xr = self.partition.find_var(x);

        // bindings whose right-hand side mentions x tighten
        for lhs in self.solutions[&TheoryId::Arith].users(xr) {
            self.refine_from_binding(lhs)?;
        }

        // a point constraint becomes an arithmetic binding
        let Some((c, jc)) = self.partition.cnstrnt(xr) else {
            return Ok(());
        };
        if let Some(q) = c.as_point() {
            let q = q.clone();
            let (norm, jn) = self.normalize(TheoryId::Arith, &Term::Var(xr));
            if norm.as_num() == Some(&q) {
                return Ok(());
            }
            let jst = Jst::dep2(&jc, &jn);
            self.solve_compose(TheoryId::Arith, norm, Term::num(q), &jst)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // renaming-layer surface
    // ------------------------------------------------------------------

    /// The propositional alias of `p(x)`
    pub fn alias_monadic(&mut self, p: &str, x: Var) -> PropVar {
        self.rename.alias_monadic(&self.partition, p, x)
    }

    /// The propositional alias of `x = y`
    pub fn alias_equal(&mut self, x: Var, y: Var) -> PropVar {
        self.rename.alias_equal(&self.partition, x, y)
    }

    /// Declare every `p` to also be a `q`
    pub fn declare_sub(&mut self, p: &str, q: &str) {
        self.rename.declare_sub(p, q);
    }

    /// Declare `p` and `q` disjoint
    pub fn declare_disjoint(&mut self, p: &str, q: &str) {
        self.rename.declare_disjoint(p, q);
    }

    /// Accept a propositional `valid0` verdict on `u`, asserting its
    /// payload into the theory layer
    pub fn process_valid0(&self, u: PropVar) -> KanonResult<Status> {
        match self.rename.payload(u) {
            Some(Payload::Monadic(p, x)) => Ok(self.add(&Atom::Pred(p, Term::Var(x)))),
            Some(Payload::Equal(x, y)) => Ok(self.add(&Atom::Eq(Term::Var(x), Term::Var(y)))),
            None => Err(KanonError::invalid(format!("unknown propvar {}", u))),
        }
    }

    /// Accept a propositional `unsat0` verdict on `u`
    pub fn process_unsat0(&self, u: PropVar) -> KanonResult<Status> {
        match self.rename.payload(u) {
            Some(Payload::Monadic(p, x)) => Ok(self.add(&Atom::NegPred(p, Term::Var(x)))),
            Some(Payload::Equal(x, y)) => Ok(self.add(&Atom::Diseq(Term::Var(x), Term::Var(y)))),
            None => Err(KanonError::invalid(format!("unknown propvar {}", u))),
        }
    }

    /// Emit `valid0` for the alias of `p(x)`, if aliased
    pub fn propagate_valid1(&mut self, p: &str, x: Var) {
        self.rename.propagate_valid1(&self.partition, p, x);
    }

    /// Emit `unsat0` for the alias of `p(x)`, if aliased
    pub fn propagate_unsat1(&mut self, p: &str, x: Var) {
        self.rename.propagate_unsat1(&self.partition, p, x);
    }

    /// Drain the deductions accumulated for the Boolean collaborator
    pub fn take_deductions(&mut self) -> Vec<Deduction> {
        self.rename.take_deductions()
    }

    // ------------------------------------------------------------------
    // semantic identity and introspection
    // ------------------------------------------------------------------

    /// Semantic identity of the partition and the solved forms over the
    /// external variables, ignoring the atom list and engine-generated
    /// names
    pub fn eq(&self, other: &Context) -> bool {
        self.signature() == other.signature()
    }

    fn signature(&self) -> Signature {
        let externals: Vec<(String, Var)> = self
            .vars
            .externals()
            .map(|(n, v)| (n.to_string(), v))
            .collect();
        let mut eqs = Vec::new();
        let mut diseqs = Vec::new();
        for (i, (n1, v1)) in externals.iter().enumerate() {
            for (n2, v2) in externals.iter().skip(i + 1) {
                if self.partition.equal(*v1, *v2) {
                    eqs.push((n1.clone(), n2.clone()));
                }
                if self.partition.diseq(*v1, *v2) {
                    diseqs.push((n1.clone(), n2.clone()));
                }
            }
        }
        let mut cnstrnts = BTreeMap::new();
        let mut canforms = BTreeMap::new();
        for (n, v) in &externals {
            if let Some((c, _)) = self.partition.cnstrnt(*v) {
                cnstrnts.insert(n.clone(), c);
            }
            let (t, _) = self.can(&Term::Var(*v));
            let mut anon = BTreeMap::new();
            canforms.insert(n.clone(), self.anon_term(&t, &mut anon));
        }
        Signature {
            eqs,
            diseqs,
            cnstrnts,
            canforms,
        }
    }

    /// Render a term with engine-generated variables numbered by first
    /// occurrence, so that two contexts built differently can compare
    fn anon_term(&self, t: &Term, anon: &mut BTreeMap<Var, usize>) -> String {
        match t {
            Term::Var(v) if v.is_external() => self.vars.name(*v),
            Term::Var(v) => {
                let n = anon.len();
                let idx = *anon.entry(*v).or_insert(n);
                format!("?{}", idx)
            }
            Term::App(sym, args) => {
                let mut out = format!("{}(", sym);
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&self.anon_term(a, anon));
                }
                out.push(')');
                out
            }
        }
    }

    /// The display name of a variable
    pub fn var_name(&self, v: Var) -> String {
        self.vars.name(v)
    }

    /// A human-readable dump of the context state
    pub fn show(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "atoms:");
        for (i, a) in self.atoms.iter().enumerate() {
            let _ = writeln!(out, "  #{} {}", i, a);
        }
        let _ = writeln!(out, "partition:");
        for (x, p) in self.partition.edges() {
            let _ = writeln!(out, "  {} = {}", self.vars.name(x), self.vars.name(p));
        }
        for (x, y) in self.partition.diseq_pairs() {
            let _ = writeln!(out, "  {} <> {}", self.vars.name(x), self.vars.name(y));
        }
        for (x, c) in self.partition.cnstrnt_entries() {
            let _ = writeln!(out, "  {} in {}", self.vars.name(x), c);
        }
        for th in TheoryId::ALL {
            let sol = &self.solutions[&th];
            if sol.is_empty() {
                continue;
            }
            let _ = writeln!(out, "{}:", th);
            for (x, t, _) in sol.bindings() {
                let _ = writeln!(out, "  {} = {}", self.vars.name(x), t);
            }
        }
        if !self.cc.is_empty() {
            let _ = writeln!(out, "u:");
            for (u, (sym, args)) in self.cc.bindings(&self.partition) {
                let rendered: Vec<String> =
                    args.iter().map(|a| self.vars.name(*a)).collect();
                let _ = writeln!(
                    out,
                    "  {} = {}({})",
                    self.vars.name(u),
                    sym,
                    rendered.join(", ")
                );
            }
        }
        out
    }

    /// The solution set of a theory, for inspection
    pub fn solution(&self, th: TheoryId) -> impl Iterator<Item = (Var, &Term)> + '_ {
        self.solutions[&th].bindings().map(|(x, t, _)| (x, t))
    }

    /// Whether the congruence table is closed under the partition:
    /// applications of one symbol to pairwise equal arguments share a
    /// class. Holds after every `add`; exposed for checking.
    pub fn congruence_closed(&self) -> bool {
        let binds: Vec<(Var, &crate::cc::AppKey)> = self.cc.bindings(&self.partition).collect();
        for (i, (u, (f, xs))) in binds.iter().enumerate() {
            for (v, (g, ys)) in binds.iter().skip(i + 1) {
                let congruent = f == g
                    && xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys.iter())
                        .all(|(x, y)| self.partition.equal(*x, *y));
                if congruent && !self.partition.equal(*u, *v) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether every solution set is triangular: no left-hand side
    /// occurs in any right-hand side of the same set
    pub fn triangular(&self) -> bool {
        for th in TheoryId::ALL {
            let lhs: std::collections::BTreeSet<Var> =
                self.solutions[&th].bindings().map(|(x, _, _)| x).collect();
            for (_, t, _) in self.solutions[&th].bindings() {
                if t.vars().iter().any(|v| lhs.contains(v)) {
                    return false;
                }
            }
        }
        true
    }
}

/// Whether two canonical forms denote provably different values
fn definitely_distinct(a: &Term, b: &Term) -> bool {
    match (a, b) {
        (Term::App(Sym::Num(p), _), Term::App(Sym::Num(q), _)) => p != q,
        (Term::App(Sym::BvConst(p), _), Term::App(Sym::BvConst(q), _)) => p != q,
        (Term::App(Sym::InL, _), Term::App(Sym::InR, _))
        | (Term::App(Sym::InR, _), Term::App(Sym::InL, _)) => true,
        (Term::App(Sym::InL, xs), Term::App(Sym::InL, ys))
        | (Term::App(Sym::InR, xs), Term::App(Sym::InR, ys)) => match (xs.first(), ys.first()) {
            (Some(x), Some(y)) => definitely_distinct(x, y),
            _ => false,
        },
        (Term::App(Sym::Tuple(n), xs), Term::App(Sym::Tuple(m), ys)) => {
            n != m
                || xs
                    .iter()
                    .zip(ys.iter())
                    .any(|(x, y)| definitely_distinct(x, y))
        }
        _ => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Signature {
    eqs: Vec<(String, String)>,
    diseqs: Vec<(String, String)>,
    cnstrnts: BTreeMap<String, Cnstrnt>,
    canforms: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::BigRational;

    fn num(n: i64) -> Term {
        Term::num_int(n)
    }

    #[test]
    fn empty_context_accepts_trivia() {
        let s = Context::empty();
        assert!(s.add(&Atom::True).is_valid());
        assert!(s.add(&Atom::False).is_inconsistent());
    }

    #[test]
    fn reflexive_equality_is_valid() {
        let mut s = Context::empty();
        let x = s.var("x");
        assert!(s.is_valid(&Atom::eq(Term::var(x), Term::var(x))));
    }

    #[test]
    fn union_then_separate_is_inconsistent() {
        let mut s = Context::empty();
        let x = s.var("x");
        let y = s.var("y");
        let s = match s.add(&Atom::eq(Term::var(x), Term::var(y))) {
            Status::Ok(next) => next,
            other => panic!("expected Ok, got {:?}", other),
        };
        let status = s.add(&Atom::diseq(Term::var(x), Term::var(y)));
        assert!(status.is_inconsistent());
        if let Status::Inconsistent(j) = status {
            let core = s.unsat_core(&j);
            assert!(!core.is_empty());
        }
    }

    #[test]
    fn positive_then_zero_is_inconsistent() {
        let mut s = Context::empty();
        let x = s.var("x");
        let s = match s.add(&Atom::member(Term::var(x), Cnstrnt::pos())) {
            Status::Ok(next) => next,
            other => panic!("expected Ok, got {:?}", other),
        };
        assert!(s.is_inconsistent(&Atom::eq(Term::var(x), num(0))));
    }

    #[test]
    fn integer_variable_rejects_fraction() {
        let mut s = Context::empty();
        let x = s.var("x");
        let s = match s.add(&Atom::member(Term::var(x), Cnstrnt::int())) {
            Status::Ok(next) => next,
            other => panic!("expected Ok, got {:?}", other),
        };
        let half = Term::num(BigRational::new(1.into(), 2.into()));
        assert!(s.add(&Atom::eq(Term::var(x), half)).is_inconsistent());
    }

    #[test]
    fn add_order_does_not_matter_semantically() {
        let mut s = Context::empty();
        let x = s.var("x");
        let y = s.var("y");
        let a1 = Atom::eq(Term::var(x), Term::var(y));
        let a2 = Atom::member(Term::var(x), Cnstrnt::nonneg());
        let s12 = match s.addl(&[a1.clone(), a2.clone()]) {
            Status::Ok(next) => next,
            other => panic!("expected Ok, got {:?}", other),
        };
        let s21 = match s.addl(&[a2, a1]) {
            Status::Ok(next) => next,
            other => panic!("expected Ok, got {:?}", other),
        };
        assert!(s12.eq(&s21));
    }

    #[test]
    fn propositional_round_trip() {
        let mut s = Context::empty();
        let x = s.var("x");
        let y = s.var("y");
        let u = s.alias_equal(x, y);
        let status = s.process_valid0(u).unwrap();
        let s2 = match status {
            Status::Ok(next) => next,
            other => panic!("expected Ok, got {:?}", other),
        };
        assert!(s2.is_valid(&Atom::eq(Term::var(x), Term::var(y))));
    }
}
