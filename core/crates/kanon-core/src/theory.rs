//! Theory interface and dispatch
//!
//! Each Shostak theory supplies a canonizer `sigma` and a solver `solve`
//! behind the `Theory` trait; normalization (`map_term`) is derived from
//! `sigma`. The combination engine holds the theories in a fixed order,
//! which makes the drain order of the fixpoint loop deterministic.

use crate::term::{Term, Var, VarKind};
use std::fmt;

/// Identifiers for the built-in Shostak theories, in engine order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TheoryId {
    Arith,
    Tuple,
    Bv,
    Nonlin,
    Coproduct,
    Array,
}

impl TheoryId {
    /// All theories in the fixed processing order
    pub const ALL: [TheoryId; 6] = [
        TheoryId::Arith,
        TheoryId::Tuple,
        TheoryId::Bv,
        TheoryId::Nonlin,
        TheoryId::Coproduct,
        TheoryId::Array,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TheoryId::Arith => "arith",
            TheoryId::Tuple => "tuple",
            TheoryId::Bv => "bv",
            TheoryId::Nonlin => "nonlin",
            TheoryId::Coproduct => "coproduct",
            TheoryId::Array => "array",
        }
    }
}

impl fmt::Display for TheoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a solver declined an equality
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveFailure {
    /// The equality has no solution in the theory
    Inconsistent,
    /// The solver cannot express the solutions; the engine falls back to
    /// naming both sides
    Unsolvable,
}

/// A solved form: oriented equalities `x = t`, triangular
pub type Solved = Vec<(Var, Term)>;

/// A Shostak theory: canonizer plus solver
///
/// `sigma` receives an application of one of the theory's own symbols to
/// already-canonized arguments and returns the theory-canonical form. It
/// is total: applications it cannot interpret (e.g. with foreign
/// arguments) are returned as they are. `solve` turns `lhs = rhs` into a
/// triangular solved form whose left-hand sides are variables of the
/// equation, or fails.
pub trait Theory {
    fn id(&self) -> TheoryId;

    /// Canonize an application of a theory symbol
    fn sigma(&self, sym: &crate::term::Sym, args: Vec<Term>) -> Term;

    /// Solve an equality between pure terms
    fn solve(
        &self,
        lhs: &Term,
        rhs: &Term,
        fresh: &mut dyn FnMut(VarKind) -> Var,
    ) -> Result<Solved, SolveFailure>;
}

/// Substitute variables in a pure term and re-canonize bottom-up
pub fn map_term(th: &dyn Theory, t: &Term, subst: &mut dyn FnMut(Var) -> Option<Term>) -> Term {
    match t {
        Term::Var(v) => subst(*v).unwrap_or(Term::Var(*v)),
        Term::App(sym, args) => {
            let mut mapped = Vec::with_capacity(args.len());
            for a in args {
                mapped.push(map_term(th, a, &mut *subst));
            }
            if sym.theory() == Some(th.id()) {
                th.sigma(sym, mapped)
            } else {
                Term::App(sym.clone(), mapped)
            }
        }
    }
}

/// The dispatch table, in engine order
pub fn theory(id: TheoryId) -> &'static dyn Theory {
    match id {
        TheoryId::Arith => &crate::theories::arith::Arith,
        TheoryId::Tuple => &crate::theories::tuple::Tuple,
        TheoryId::Bv => &crate::theories::bv::Bv,
        TheoryId::Nonlin => &crate::theories::nonlin::Nonlin,
        TheoryId::Coproduct => &crate::theories::coproduct::Coproduct,
        TheoryId::Array => &crate::theories::array::Array,
    }
}
