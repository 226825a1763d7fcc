//! Term representation
//!
//! Terms are immutable values: either a variable or the application of an
//! interpreted or uninterpreted symbol to an ordered list of arguments.
//! All cross-component references inside the engine are variable ids; the
//! terms stored in solved forms are flat (interpreted symbols over
//! variables), so the derived structural equality and ordering are cheap.
//!
//! Variables come in four kinds. External variables are interned by name
//! in the context's variable table (same name, same id); the other kinds
//! are generated by the engine. The kind order drives representative
//! choice in the partition and orientation tie-breaks in the solvers.

use crate::error::{KanonError, KanonResult};
use crate::theory::TheoryId;
use num_rational::BigRational;
use std::collections::BTreeMap;
use std::fmt;

/// Variable kinds, ordered by "simplicity": external variables are
/// preferred as canonical representatives, labels least of all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarKind {
    /// User-introduced, named
    External,
    /// Introduced by flattening/abstraction
    Rename,
    /// Introduced by the arithmetic solver
    Slack,
    /// Anonymous extension (e.g. unknown tuple components)
    Label,
}

/// A variable: stable id plus kind
///
/// Ordering is by kind first, then id, which is exactly the canonical
/// representative preference (external < rename < slack < label, ties by
/// id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    kind: VarKind,
    id: u32,
}

impl Var {
    pub fn kind(&self) -> VarKind {
        self.kind
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_external(&self) -> bool {
        self.kind == VarKind::External
    }

    pub fn is_slack(&self) -> bool {
        self.kind == VarKind::Slack
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VarKind::External => write!(f, "x{}", self.id),
            VarKind::Rename => write!(f, "v!{}", self.id),
            VarKind::Slack => write!(f, "k!{}", self.id),
            VarKind::Label => write!(f, "l!{}", self.id),
        }
    }
}

/// Allocation and interning of variables
///
/// External variables are interned on their name; engine-generated
/// variables draw fresh ids from the same counter. The table lives on the
/// context, so fresh ids roll back together with everything else when an
/// `add` is abandoned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarTable {
    kinds: Vec<VarKind>,
    names: Vec<Option<String>>,
    by_name: BTreeMap<String, Var>,
}

impl VarTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern an external variable by name
    pub fn intern(&mut self, name: &str) -> Var {
        if let Some(v) = self.by_name.get(name) {
            return *v;
        }
        let v = self.alloc(VarKind::External, Some(name.to_string()));
        self.by_name.insert(name.to_string(), v);
        v
    }

    /// Allocate a fresh engine variable of the given kind
    pub fn fresh(&mut self, kind: VarKind) -> Var {
        debug_assert!(kind != VarKind::External, "external variables are interned");
        self.alloc(kind, None)
    }

    fn alloc(&mut self, kind: VarKind, name: Option<String>) -> Var {
        let id = self.kinds.len() as u32;
        self.kinds.push(kind);
        self.names.push(name);
        Var { kind, id }
    }

    /// The display name of a variable (interned name for externals)
    pub fn name(&self, v: Var) -> String {
        match self.names.get(v.id as usize).and_then(|n| n.as_ref()) {
            Some(n) => n.clone(),
            None => v.to_string(),
        }
    }

    /// Look up an already-interned external variable
    pub fn lookup(&self, name: &str) -> Option<Var> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// All interned external variables with their names, in name order
    pub fn externals(&self) -> impl Iterator<Item = (&str, Var)> + '_ {
        self.by_name.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

/// A bitvector constant, most significant bit first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bitv {
    bits: Vec<bool>,
}

impl Bitv {
    pub fn new(bits: Vec<bool>) -> Self {
        Bitv { bits }
    }

    pub fn width(&self) -> usize {
        self.bits.len()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Concatenation, `self` as the high part
    pub fn concat(&self, other: &Bitv) -> Bitv {
        let mut bits = self.bits.clone();
        bits.extend_from_slice(&other.bits);
        Bitv { bits }
    }

    /// Bits `lo..=hi`, counted from the most significant end
    pub fn extract(&self, lo: usize, hi: usize) -> Bitv {
        Bitv {
            bits: self.bits[lo..=hi].to_vec(),
        }
    }
}

impl fmt::Display for Bitv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b")?;
        for b in &self.bits {
            write!(f, "{}", if *b { '1' } else { '0' })?;
        }
        Ok(())
    }
}

/// Interpreted and uninterpreted function symbols
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sym {
    /// Rational numeral (nullary)
    Num(BigRational),
    /// n-ary addition
    Add,
    /// Multiplication by a rational constant (unary)
    Multq(BigRational),
    /// n-ary tuple constructor
    Tuple(usize),
    /// Projection `i` out of a width-`n` tuple
    Proj(usize, usize),
    /// Bitvector constant (nullary)
    BvConst(Bitv),
    /// Concatenation of a width-`n` high part and width-`m` low part
    Concat(usize, usize),
    /// Bits `lo..=hi` of a width-`n` bitvector
    Extract(usize, usize, usize),
    /// Nonlinear n-ary product of non-constant factors
    Mult,
    /// Integer power (unary)
    Expt(u32),
    /// Left/right coproduct injections (unary)
    InL,
    InR,
    /// Left/right coproduct projections (unary)
    OutL,
    OutR,
    /// Array read: `select(a, i)`
    Select,
    /// Array write: `update(a, i, e)`
    Update,
    /// Function application: `apply(f, x)`
    Apply,
    /// Function abstraction over an opaque body
    Abstract,
    /// Uninterpreted function symbol
    Uninterp(String),
}

impl Sym {
    /// The Shostak theory this symbol belongs to, if any
    ///
    /// `Apply`, `Abstract` and uninterpreted symbols have no
    /// canonizer/solver pair; they are handled by congruence closure.
    pub fn theory(&self) -> Option<TheoryId> {
        match self {
            Sym::Num(_) | Sym::Add | Sym::Multq(_) => Some(TheoryId::Arith),
            Sym::Tuple(_) | Sym::Proj(_, _) => Some(TheoryId::Tuple),
            Sym::BvConst(_) | Sym::Concat(_, _) | Sym::Extract(_, _, _) => Some(TheoryId::Bv),
            Sym::Mult | Sym::Expt(_) => Some(TheoryId::Nonlin),
            Sym::InL | Sym::InR | Sym::OutL | Sym::OutR => Some(TheoryId::Coproduct),
            Sym::Select | Sym::Update => Some(TheoryId::Array),
            Sym::Apply | Sym::Abstract | Sym::Uninterp(_) => None,
        }
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sym::Num(q) => write!(f, "{}", q),
            Sym::Add => write!(f, "+"),
            Sym::Multq(q) => write!(f, "{}*", q),
            Sym::Tuple(n) => write!(f, "tuple/{}", n),
            Sym::Proj(i, n) => write!(f, "proj[{},{}]", i, n),
            Sym::BvConst(b) => write!(f, "{}", b),
            Sym::Concat(n, m) => write!(f, "++[{},{}]", n, m),
            Sym::Extract(lo, hi, n) => write!(f, "ext[{},{},{}]", lo, hi, n),
            Sym::Mult => write!(f, "."),
            Sym::Expt(n) => write!(f, "^{}", n),
            Sym::InL => write!(f, "inl"),
            Sym::InR => write!(f, "inr"),
            Sym::OutL => write!(f, "outl"),
            Sym::OutR => write!(f, "outr"),
            Sym::Select => write!(f, "select"),
            Sym::Update => write!(f, "update"),
            Sym::Apply => write!(f, "apply"),
            Sym::Abstract => write!(f, "abstract"),
            Sym::Uninterp(name) => write!(f, "{}", name),
        }
    }
}

/// A term: a variable or a symbol application
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Var(Var),
    App(Sym, Vec<Term>),
}

impl Term {
    pub fn var(v: Var) -> Term {
        Term::Var(v)
    }

    pub fn num(q: BigRational) -> Term {
        Term::App(Sym::Num(q), vec![])
    }

    pub fn num_int(n: i64) -> Term {
        Term::num(BigRational::from_integer(n.into()))
    }

    pub fn add(args: Vec<Term>) -> Term {
        Term::App(Sym::Add, args)
    }

    pub fn multq(q: BigRational, t: Term) -> Term {
        Term::App(Sym::Multq(q), vec![t])
    }

    pub fn tuple(args: Vec<Term>) -> Term {
        let n = args.len();
        Term::App(Sym::Tuple(n), args)
    }

    /// Checked projection constructor: requires `i < n` and `n >= 1`
    pub fn proj(i: usize, n: usize, t: Term) -> KanonResult<Term> {
        if n == 0 || i >= n {
            return Err(KanonError::invalid(format!(
                "projection index {} out of range for width {}",
                i, n
            )));
        }
        Ok(Term::App(Sym::Proj(i, n), vec![t]))
    }

    pub fn bv_const(b: Bitv) -> Term {
        Term::App(Sym::BvConst(b), vec![])
    }

    /// Checked concatenation: widths must be positive
    pub fn concat(n: usize, m: usize, hi: Term, lo: Term) -> KanonResult<Term> {
        if n == 0 || m == 0 {
            return Err(KanonError::invalid("zero-width bitvector concatenation"));
        }
        Ok(Term::App(Sym::Concat(n, m), vec![hi, lo]))
    }

    /// Checked extraction: requires `lo <= hi < n`
    pub fn extract(lo: usize, hi: usize, n: usize, t: Term) -> KanonResult<Term> {
        if lo > hi || hi >= n {
            return Err(KanonError::invalid(format!(
                "extraction [{},{}] out of range for width {}",
                lo, hi, n
            )));
        }
        Ok(Term::App(Sym::Extract(lo, hi, n), vec![t]))
    }

    pub fn mult(args: Vec<Term>) -> Term {
        Term::App(Sym::Mult, args)
    }

    pub fn expt(n: u32, t: Term) -> Term {
        Term::App(Sym::Expt(n), vec![t])
    }

    pub fn inl(t: Term) -> Term {
        Term::App(Sym::InL, vec![t])
    }

    pub fn inr(t: Term) -> Term {
        Term::App(Sym::InR, vec![t])
    }

    pub fn outl(t: Term) -> Term {
        Term::App(Sym::OutL, vec![t])
    }

    pub fn outr(t: Term) -> Term {
        Term::App(Sym::OutR, vec![t])
    }

    pub fn select(a: Term, i: Term) -> Term {
        Term::App(Sym::Select, vec![a, i])
    }

    pub fn update(a: Term, i: Term, e: Term) -> Term {
        Term::App(Sym::Update, vec![a, i, e])
    }

    pub fn apply(f: Term, x: Term) -> Term {
        Term::App(Sym::Apply, vec![f, x])
    }

    pub fn uninterp(name: impl Into<String>, args: Vec<Term>) -> Term {
        Term::App(Sym::Uninterp(name.into()), args)
    }

    /// The variable inside, if this term is one
    pub fn as_var(&self) -> Option<Var> {
        match self {
            Term::Var(v) => Some(*v),
            _ => None,
        }
    }

    /// The rational inside, if this term is a numeral
    pub fn as_num(&self) -> Option<&BigRational> {
        match self {
            Term::App(Sym::Num(q), _) => Some(q),
            _ => None,
        }
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    /// The theory of the head symbol (`None` for variables and
    /// congruence-closure symbols)
    pub fn theory(&self) -> Option<TheoryId> {
        match self {
            Term::Var(_) => None,
            Term::App(sym, _) => sym.theory(),
        }
    }

    /// Whether every symbol in this term belongs to theory `th`
    /// (variables are allowed anywhere)
    pub fn is_pure(&self, th: TheoryId) -> bool {
        match self {
            Term::Var(_) => true,
            Term::App(sym, args) => {
                sym.theory() == Some(th) && args.iter().all(|a| a.is_pure(th))
            }
        }
    }

    /// Collect the variables of this term, ascending, deduplicated
    pub fn vars(&self) -> Vec<Var> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out.sort();
        out.dedup();
        out
    }

    fn collect_vars(&self, out: &mut Vec<Var>) {
        match self {
            Term::Var(v) => out.push(*v),
            Term::App(_, args) => {
                for a in args {
                    a.collect_vars(out);
                }
            }
        }
    }

    /// Whether variable `v` occurs in this term
    pub fn occurs(&self, v: Var) -> bool {
        match self {
            Term::Var(w) => *w == v,
            Term::App(_, args) => args.iter().any(|a| a.occurs(v)),
        }
    }

    /// Replace variables according to `subst`, without re-canonizing
    pub fn subst_vars(&self, subst: &mut impl FnMut(Var) -> Option<Term>) -> Term {
        match self {
            Term::Var(v) => subst(*v).unwrap_or(Term::Var(*v)),
            Term::App(sym, args) => Term::App(
                sym.clone(),
                args.iter().map(|a| a.subst_vars(subst)).collect(),
            ),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Var(v) => write!(f, "{}", v),
            Term::App(sym, args) if args.is_empty() => write!(f, "{}", sym),
            Term::App(Sym::Add, args) => {
                write!(f, "(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
            Term::App(Sym::Multq(q), args) => write!(f, "{}*{}", q, args[0]),
            Term::App(sym, args) => {
                write!(f, "{}(", sym)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let mut vt = VarTable::new();
        let x1 = vt.intern("x");
        let x2 = vt.intern("x");
        let y = vt.intern("y");
        assert_eq!(x1, x2);
        assert_ne!(x1, y);
        assert_eq!(vt.name(x1), "x");
    }

    #[test]
    fn variable_order_prefers_external() {
        let mut vt = VarTable::new();
        let v = vt.fresh(VarKind::Rename);
        let x = vt.intern("x");
        let k = vt.fresh(VarKind::Slack);
        assert!(x < v, "external before rename regardless of id");
        assert!(v < k, "rename before slack");
    }

    #[test]
    fn purity() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let lin = Term::add(vec![Term::num_int(1), Term::var(x)]);
        assert!(lin.is_pure(TheoryId::Arith));
        assert!(!lin.is_pure(TheoryId::Tuple));
        let mixed = Term::tuple(vec![lin.clone(), Term::var(x)]);
        assert!(!mixed.is_pure(TheoryId::Tuple));
    }

    #[test]
    fn occurs_and_vars() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        let y = vt.intern("y");
        let t = Term::tuple(vec![Term::var(x), Term::var(x), Term::var(y)]);
        assert!(t.occurs(x));
        assert_eq!(t.vars(), vec![x, y]);
    }

    #[test]
    fn checked_builders_reject_bad_indices() {
        let mut vt = VarTable::new();
        let x = vt.intern("x");
        assert!(Term::proj(2, 2, Term::var(x)).is_err());
        assert!(Term::extract(3, 1, 8, Term::var(x)).is_err());
    }
}
