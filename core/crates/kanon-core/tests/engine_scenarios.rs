//! End-to-end scenarios for the combination engine
//!
//! Each test asserts a short sequence of atoms and checks the verdicts,
//! covering uninterpreted congruence, arrays, linear arithmetic, tuples,
//! cross-theory combination and the sign lattice, plus the boundary
//! behaviors and the idempotence/negation round-trips.

use kanon_core::{Atom, Cnstrnt, Context, Status, Term};

fn ok(status: Status) -> Box<Context> {
    match status {
        Status::Ok(next) => next,
        other => panic!("expected Ok, got {:?}", other),
    }
}

fn num(n: i64) -> Term {
    Term::num_int(n)
}

#[test]
fn congruence_after_the_fact() {
    // f(x) = f(y), then x = y: re-adding f(x) = f(y) is entailed
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let fx = Term::uninterp("f", vec![Term::var(x)]);
    let fy = Term::uninterp("f", vec![Term::var(y)]);
    let s = ok(s.add(&Atom::eq(fx.clone(), fy.clone())));
    let s = ok(s.add(&Atom::eq(Term::var(x), Term::var(y))));
    assert!(s.is_valid(&Atom::eq(fx, fy)));
    assert!(s.congruence_closed());
}

#[test]
fn congruence_up_front() {
    // x = y first makes f(x) = f(y) valid immediately
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let s = ok(s.add(&Atom::eq(Term::var(x), Term::var(y))));
    let fx = Term::uninterp("f", vec![Term::var(x)]);
    let fy = Term::uninterp("f", vec![Term::var(y)]);
    assert!(s.is_valid(&Atom::eq(fx, fy)));
}

#[test]
fn array_read_over_write() {
    // i = j, then select(update(a, i, e), j) = e is entailed
    let mut s = Context::empty();
    let a = s.var("a");
    let i = s.var("i");
    let j = s.var("j");
    let e = s.var("e");
    let s = ok(s.add(&Atom::eq(Term::var(i), Term::var(j))));
    let read = Term::select(
        Term::update(Term::var(a), Term::var(i), Term::var(e)),
        Term::var(j),
    );
    assert!(s.is_valid(&Atom::eq(read, Term::var(e))));
}

#[test]
fn linear_arithmetic_propagates() {
    // x + y = 3 and x = 1 entail y = 2 and refute y = 3
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let sum = Term::add(vec![Term::var(x), Term::var(y)]);
    let s = ok(s.add(&Atom::eq(sum, num(3))));
    let s = ok(s.add(&Atom::eq(Term::var(x), num(1))));
    assert!(s.is_valid(&Atom::eq(Term::var(y), num(2))));
    assert!(s.is_inconsistent(&Atom::eq(Term::var(y), num(3))));
    assert!(s.triangular());
}

#[test]
fn tuples_decompose() {
    // pair(x, y) = pair(u, v) entails both component equalities
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let u = s.var("u");
    let v = s.var("v");
    let lhs = Term::tuple(vec![Term::var(x), Term::var(y)]);
    let rhs = Term::tuple(vec![Term::var(u), Term::var(v)]);
    let s = ok(s.add(&Atom::eq(lhs, rhs)));
    assert!(s.is_valid(&Atom::eq(Term::var(x), Term::var(u))));
    assert!(s.is_valid(&Atom::eq(Term::var(y), Term::var(v))));
    assert!(s.is_inconsistent(&Atom::diseq(Term::var(y), Term::var(v))));
}

#[test]
fn combination_of_congruence_and_equality() {
    // f(x) = x and f(f(x)) = y entail y = x
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let fx = Term::uninterp("f", vec![Term::var(x)]);
    let ffx = Term::uninterp("f", vec![fx.clone()]);
    let s = ok(s.add(&Atom::eq(fx, Term::var(x))));
    let s = ok(s.add(&Atom::eq(ffx, Term::var(y))));
    assert!(s.is_valid(&Atom::eq(Term::var(y), Term::var(x))));
}

#[test]
fn sign_lattice_meets_to_zero() {
    // x >= 0, y <= 0, x = y is fine; x > 0 then contradicts
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let s = ok(s.add(&Atom::member(Term::var(x), Cnstrnt::nonneg())));
    let s = ok(s.add(&Atom::member(Term::var(y), Cnstrnt::nonpos())));
    let s = ok(s.add(&Atom::eq(Term::var(x), Term::var(y))));
    assert!(s.is_inconsistent(&Atom::member(Term::var(x), Cnstrnt::pos())));
}

#[test]
fn reflexivity_is_valid() {
    let mut s = Context::empty();
    let x = s.var("x");
    assert!(s.is_valid(&Atom::eq(Term::var(x), Term::var(x))));
}

#[test]
fn equality_then_disequality_refutes() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let s = ok(s.add(&Atom::eq(Term::var(x), Term::var(y))));
    assert!(s.is_inconsistent(&Atom::diseq(Term::var(x), Term::var(y))));
}

#[test]
fn positive_then_zero_refutes() {
    let mut s = Context::empty();
    let x = s.var("x");
    let s = ok(s.add(&Atom::member(Term::var(x), Cnstrnt::pos())));
    assert!(s.is_inconsistent(&Atom::eq(Term::var(x), num(0))));
}

#[test]
fn unsat_core_names_the_culprits() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let z = s.var("z");
    let s = ok(s.add(&Atom::eq(Term::var(x), Term::var(y))));
    let s = ok(s.add(&Atom::member(Term::var(z), Cnstrnt::pos())));
    let s = ok(s.add(&Atom::eq(Term::var(y), Term::var(z))));
    let status = s.add(&Atom::eq(Term::var(x), num(0)));
    let j = match status {
        Status::Inconsistent(j) => j,
        other => panic!("expected Inconsistent, got {:?}", other),
    };
    let core = s.unsat_core(&j);
    // the core mentions the sign constraint on z, and never the
    // irrelevant number of atoms beyond what was asserted
    assert!(!core.is_empty());
    assert!(core.len() <= 4);
    assert!(core
        .iter()
        .any(|a| matches!(a, Atom::In(_, c) if *c == Cnstrnt::pos())));
}

#[test]
fn ok_then_valid_idempotence() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let z = s.var("z");
    let atoms = vec![
        Atom::eq(
            Term::add(vec![Term::var(x), Term::var(y)]),
            num(3),
        ),
        Atom::diseq(Term::var(y), Term::var(z)),
        Atom::member(Term::var(z), Cnstrnt::nonneg()),
        Atom::eq(
            Term::uninterp("g", vec![Term::var(x)]),
            Term::var(z),
        ),
    ];
    let mut cur = Box::new(s);
    for atom in &atoms {
        match cur.add(atom) {
            Status::Ok(next) => {
                assert!(
                    next.is_valid(atom),
                    "freshly added atom must be entailed: {}",
                    atom
                );
                cur = next;
            }
            Status::Valid(_) => {}
            other => panic!("unexpected verdict for {}: {:?}", atom, other),
        }
    }
}

#[test]
fn inconsistent_implies_negation_valid() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let s = ok(s.add(&Atom::eq(Term::var(x), Term::var(y))));
    let bad = Atom::diseq(Term::var(x), Term::var(y));
    assert!(s.is_inconsistent(&bad));
    let negated = bad.negate().expect("disequality negates to an equality");
    assert!(s.is_valid(&negated));
}

#[test]
fn bitvector_concat_decomposition() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let bits = |sdesc: &str| {
        Term::bv_const(kanon_core::Bitv::new(
            sdesc.chars().map(|c| c == '1').collect(),
        ))
    };
    let cat = Term::concat(2, 2, Term::var(x), Term::var(y)).unwrap();
    let s = ok(s.add(&Atom::eq(cat, bits("1001"))));
    assert!(s.is_valid(&Atom::eq(Term::var(x), bits("10"))));
    assert!(s.is_valid(&Atom::eq(Term::var(y), bits("01"))));
    assert!(s.is_inconsistent(&Atom::eq(Term::var(y), bits("11"))));
}

#[test]
fn coproduct_injections_clash() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    assert!(s.is_inconsistent(&Atom::eq(Term::inl(Term::var(x)), Term::inr(Term::var(y)))));
    let s = ok(s.add(&Atom::eq(Term::inl(Term::var(x)), Term::inl(Term::var(y)))));
    assert!(s.is_valid(&Atom::eq(Term::var(x), Term::var(y))));
}

#[test]
fn nonlinear_products_share_names() {
    // x*y = z and then x*y again resolves to z
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let z = s.var("z");
    let prod = Term::mult(vec![Term::var(x), Term::var(y)]);
    let s = ok(s.add(&Atom::eq(prod.clone(), Term::var(z))));
    assert!(s.is_valid(&Atom::eq(prod, Term::var(z))));
}

#[test]
fn diophantine_equation_refuted_for_integers() {
    use num_rational::BigRational;
    // 2x + 4y = 1 with integer x and y has no solution
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let s = ok(s.add(&Atom::member(Term::var(x), Cnstrnt::int())));
    let s = ok(s.add(&Atom::member(Term::var(y), Cnstrnt::int())));
    let two_x = Term::multq(BigRational::from_integer(2.into()), Term::var(x));
    let four_y = Term::multq(BigRational::from_integer(4.into()), Term::var(y));
    let status = s.add(&Atom::eq(Term::add(vec![two_x, four_y]), num(1)));
    assert!(status.is_inconsistent(), "got {:?}", status);
}

#[test]
fn integer_variable_rejects_fractional_value() {
    use num_rational::BigRational;
    let mut s = Context::empty();
    let x = s.var("x");
    let s = ok(s.add(&Atom::member(Term::var(x), Cnstrnt::int())));
    let half = Term::num(BigRational::new(1.into(), 2.into()));
    assert!(s.add(&Atom::eq(Term::var(x), half)).is_inconsistent());
}

#[test]
fn branching_contexts_stay_independent() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let base = ok(s.add(&Atom::member(Term::var(x), Cnstrnt::nonneg())));
    let branch = base.copy();
    let left = ok(base.add(&Atom::eq(Term::var(x), Term::var(y))));
    // the branch did not see the union
    assert!(!branch.is_valid(&Atom::eq(Term::var(x), Term::var(y))));
    assert!(left.is_valid(&Atom::eq(Term::var(x), Term::var(y))));
}

#[test]
fn addl_stops_at_first_inconsistency() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let atoms = vec![
        Atom::eq(Term::var(x), Term::var(y)),
        Atom::diseq(Term::var(x), Term::var(y)),
        Atom::eq(Term::var(x), num(0)),
    ];
    let status = s.addl(&atoms);
    assert!(status.is_inconsistent());
}

#[test]
fn contexts_built_in_different_orders_agree() {
    let mut s = Context::empty();
    let x = s.var("x");
    let y = s.var("y");
    let z = s.var("z");
    let a1 = Atom::eq(Term::var(x), Term::var(y));
    let a2 = Atom::diseq(Term::var(y), Term::var(z));
    let a3 = Atom::member(Term::var(z), Cnstrnt::nonpos());
    let one = ok(s.addl(&[a1.clone(), a2.clone(), a3.clone()]));
    let two = ok(s.addl(&[a3, a2, a1]));
    assert!(one.eq(&two));
}
