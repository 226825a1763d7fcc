//! Kanon Core - a decision procedure for quantifier-free combined theories
//!
//! This crate implements a Shostak-style combination of canonizable,
//! solvable equational theories with congruence closure for
//! uninterpreted function symbols. A [`Context`] holds a conjunction of
//! atoms in canonical form; [`Context::add`] reports for each new atom
//! whether it is already entailed, contradicts the context, or extends
//! it. Derived facts carry justification sets of input atoms, sufficient
//! for unsat-core extraction.
//!
//! The built-in theories, in their fixed processing order: linear
//! arithmetic over exact rationals, tuples, fixed-width bitvectors,
//! nonlinear power products, coproducts and arrays. A renaming layer
//! bridges monadic predicates and variable equalities to propositional
//! variables for an external Boolean engine.

pub mod atom;
pub mod cc;
pub mod cnstrnt;
pub mod context;
pub mod error;
pub mod jst;
pub mod partition;
pub mod rename;
pub mod solution;
pub mod term;
pub mod theories;
pub mod theory;

pub use atom::Atom;
pub use cnstrnt::{Bound, Cnstrnt, Dom, Interval, Sign};
pub use context::{Config, Context, Status};
pub use error::{KanonError, KanonResult};
pub use jst::{AtomId, Jst};
pub use rename::{Deduction, Payload, PropVar};
pub use term::{Bitv, Sym, Term, Var, VarKind};
pub use theory::TheoryId;
