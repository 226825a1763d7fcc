//! Atoms: the assertion language of the engine
//!
//! An atom is an equality, a disequality, an arithmetic membership
//! constraint, a monadic predicate literal, or one of the trivial
//! constants. Predicate literals exist for the renaming layer: they are
//! what a propositional `valid0`/`unsat0` verdict on a monadic propvar
//! asserts back into the theory layer.

use crate::cnstrnt::Cnstrnt;
use crate::term::Term;
use std::fmt;

/// An atomic assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Atom {
    /// `a = b`
    Eq(Term, Term),
    /// `a <> b`
    Diseq(Term, Term),
    /// `a in C`
    In(Term, Cnstrnt),
    /// `p(a)` for a monadic predicate symbol `p`
    Pred(String, Term),
    /// `~p(a)`
    NegPred(String, Term),
    /// Trivially true
    True,
    /// Trivially false
    False,
}

impl Atom {
    pub fn eq(a: Term, b: Term) -> Atom {
        Atom::Eq(a, b)
    }

    pub fn diseq(a: Term, b: Term) -> Atom {
        Atom::Diseq(a, b)
    }

    pub fn member(t: Term, c: Cnstrnt) -> Atom {
        Atom::In(t, c)
    }

    pub fn pred(p: impl Into<String>, t: Term) -> Atom {
        Atom::Pred(p.into(), t)
    }

    /// The negation, when it is expressible as a single atom
    ///
    /// Membership constraints negate only when the complement is again a
    /// single interval (sign-shaped constraints over the reals).
    pub fn negate(&self) -> Option<Atom> {
        match self {
            Atom::Eq(a, b) => Some(Atom::Diseq(a.clone(), b.clone())),
            Atom::Diseq(a, b) => Some(Atom::Eq(a.clone(), b.clone())),
            Atom::Pred(p, t) => Some(Atom::NegPred(p.clone(), t.clone())),
            Atom::NegPred(p, t) => Some(Atom::Pred(p.clone(), t.clone())),
            Atom::True => Some(Atom::False),
            Atom::False => Some(Atom::True),
            Atom::In(t, c) => {
                use crate::cnstrnt::Sign;
                if c.is_int() {
                    return None;
                }
                let complement = match c.sign_exact()? {
                    Sign::Pos => Cnstrnt::nonpos(),
                    Sign::Neg => Cnstrnt::nonneg(),
                    Sign::Nonneg => Cnstrnt::neg(),
                    Sign::Nonpos => Cnstrnt::pos(),
                    _ => return None,
                };
                Some(Atom::In(t.clone(), complement))
            }
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Eq(a, b) => write!(f, "{} = {}", a, b),
            Atom::Diseq(a, b) => write!(f, "{} <> {}", a, b),
            Atom::In(t, c) => write!(f, "{} in {}", t, c),
            Atom::Pred(p, t) => write!(f, "{}({})", p, t),
            Atom::NegPred(p, t) => write!(f, "~{}({})", p, t),
            Atom::True => write!(f, "true"),
            Atom::False => write!(f, "false"),
        }
    }
}
