//! Arithmetic domains: intervals over exact rationals
//!
//! A constraint is a domain tag (integer or real) together with an
//! interval with open, closed or unbounded ends. The sign lattice
//! `{bot, =0, >0, <0, >=0, <=0, top}` embeds into intervals; meet is
//! interval intersection plus domain meet, and an empty meet signals an
//! inconsistency to the caller.

use num_rational::BigRational;
use num_traits::{Signed, Zero};
use std::fmt;

/// Integer or real domain; meet prefers the smaller domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dom {
    Int,
    Real,
}

impl Dom {
    pub fn meet(self, other: Dom) -> Dom {
        if self == Dom::Int || other == Dom::Int {
            Dom::Int
        } else {
            Dom::Real
        }
    }
}

impl fmt::Display for Dom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dom::Int => write!(f, "int"),
            Dom::Real => write!(f, "real"),
        }
    }
}

/// An interval endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bound {
    Open(BigRational),
    Closed(BigRational),
    Unbounded,
}

impl Bound {
    pub fn value(&self) -> Option<&BigRational> {
        match self {
            Bound::Open(q) | Bound::Closed(q) => Some(q),
            Bound::Unbounded => None,
        }
    }
}

/// The classic sign lattice, derivable from any constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Bot,
    Zero,
    Pos,
    Neg,
    Nonneg,
    Nonpos,
    Top,
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sign::Bot => write!(f, "bot"),
            Sign::Zero => write!(f, "=0"),
            Sign::Pos => write!(f, ">0"),
            Sign::Neg => write!(f, "<0"),
            Sign::Nonneg => write!(f, ">=0"),
            Sign::Nonpos => write!(f, "<=0"),
            Sign::Top => write!(f, "top"),
        }
    }
}

/// An interval over exact rationals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    lo: Bound,
    hi: Bound,
}

impl Interval {
    pub fn new(lo: Bound, hi: Bound) -> Self {
        Interval { lo, hi }
    }

    pub fn full() -> Self {
        Interval {
            lo: Bound::Unbounded,
            hi: Bound::Unbounded,
        }
    }

    pub fn point(q: BigRational) -> Self {
        Interval {
            lo: Bound::Closed(q.clone()),
            hi: Bound::Closed(q),
        }
    }

    pub fn lo(&self) -> &Bound {
        &self.lo
    }

    pub fn hi(&self) -> &Bound {
        &self.hi
    }

    /// Whether the interval holds no rational at all
    pub fn is_empty(&self) -> bool {
        match (self.lo.value(), self.hi.value()) {
            (Some(l), Some(h)) => {
                if l > h {
                    true
                } else if l == h {
                    // a point survives only if both ends are closed
                    !matches!(
                        (&self.lo, &self.hi),
                        (Bound::Closed(_), Bound::Closed(_))
                    )
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// The single member, if the interval is a closed point
    pub fn as_point(&self) -> Option<&BigRational> {
        match (&self.lo, &self.hi) {
            (Bound::Closed(l), Bound::Closed(h)) if l == h => Some(l),
            _ => None,
        }
    }

    pub fn member(&self, q: &BigRational) -> bool {
        let lo_ok = match &self.lo {
            Bound::Unbounded => true,
            Bound::Closed(l) => q >= l,
            Bound::Open(l) => q > l,
        };
        let hi_ok = match &self.hi {
            Bound::Unbounded => true,
            Bound::Closed(h) => q <= h,
            Bound::Open(h) => q < h,
        };
        lo_ok && hi_ok
    }

    /// Intersection
    pub fn meet(&self, other: &Interval) -> Interval {
        Interval {
            lo: max_lower(&self.lo, &other.lo),
            hi: min_upper(&self.hi, &other.hi),
        }
    }

    /// Whether `self` is contained in `other`
    pub fn subset(&self, other: &Interval) -> bool {
        lower_geq(&self.lo, &other.lo) && upper_leq(&self.hi, &other.hi)
    }

    /// Interval addition
    pub fn add(&self, other: &Interval) -> Interval {
        Interval {
            lo: add_lower(&self.lo, &other.lo),
            hi: add_upper(&self.hi, &other.hi),
        }
    }

    /// Scale by a nonzero rational; negative factors flip the interval
    pub fn scale(&self, q: &BigRational) -> Interval {
        if q.is_zero() {
            return Interval::point(BigRational::zero());
        }
        let scale_bound = |b: &Bound| match b {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Open(v) => Bound::Open(v * q),
            Bound::Closed(v) => Bound::Closed(v * q),
        };
        if q.is_positive() {
            Interval {
                lo: scale_bound(&self.lo),
                hi: scale_bound(&self.hi),
            }
        } else {
            Interval {
                lo: scale_bound(&self.hi),
                hi: scale_bound(&self.lo),
            }
        }
    }
}

fn cmp_vals(a: &BigRational, b: &BigRational) -> std::cmp::Ordering {
    a.cmp(b)
}

/// The stricter of two lower bounds
fn max_lower(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, _) => b.clone(),
        (_, Bound::Unbounded) => a.clone(),
        _ => {
            let (av, bv) = (a.value().unwrap(), b.value().unwrap());
            match cmp_vals(av, bv) {
                std::cmp::Ordering::Greater => a.clone(),
                std::cmp::Ordering::Less => b.clone(),
                std::cmp::Ordering::Equal => {
                    // open beats closed at equal values
                    if matches!(a, Bound::Open(_)) {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
            }
        }
    }
}

/// The stricter of two upper bounds
fn min_upper(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, _) => b.clone(),
        (_, Bound::Unbounded) => a.clone(),
        _ => {
            let (av, bv) = (a.value().unwrap(), b.value().unwrap());
            match cmp_vals(av, bv) {
                std::cmp::Ordering::Less => a.clone(),
                std::cmp::Ordering::Greater => b.clone(),
                std::cmp::Ordering::Equal => {
                    if matches!(a, Bound::Open(_)) {
                        a.clone()
                    } else {
                        b.clone()
                    }
                }
            }
        }
    }
}

/// Whether lower bound `a` is at least as strict as `b`
fn lower_geq(a: &Bound, b: &Bound) -> bool {
    match (b, a) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        _ => {
            let (av, bv) = (a.value().unwrap(), b.value().unwrap());
            match cmp_vals(av, bv) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => {
                    !(matches!(b, Bound::Open(_)) && matches!(a, Bound::Closed(_)))
                }
            }
        }
    }
}

/// Whether upper bound `a` is at least as strict as `b`
fn upper_leq(a: &Bound, b: &Bound) -> bool {
    match (b, a) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        _ => {
            let (av, bv) = (a.value().unwrap(), b.value().unwrap());
            match cmp_vals(av, bv) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => {
                    !(matches!(b, Bound::Open(_)) && matches!(a, Bound::Closed(_)))
                }
            }
        }
    }
}

fn add_lower(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => Bound::Unbounded,
        (Bound::Closed(x), Bound::Closed(y)) => Bound::Closed(x + y),
        _ => Bound::Open(a.value().unwrap() + b.value().unwrap()),
    }
}

fn add_upper(a: &Bound, b: &Bound) -> Bound {
    match (a, b) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => Bound::Unbounded,
        (Bound::Closed(x), Bound::Closed(y)) => Bound::Closed(x + y),
        _ => Bound::Open(a.value().unwrap() + b.value().unwrap()),
    }
}

/// An arithmetic domain element: domain tag plus interval
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cnstrnt {
    dom: Dom,
    interval: Interval,
}

impl Cnstrnt {
    pub fn new(dom: Dom, interval: Interval) -> Self {
        Cnstrnt { dom, interval }
    }

    /// The full real line
    pub fn full() -> Self {
        Cnstrnt::new(Dom::Real, Interval::full())
    }

    pub fn int() -> Self {
        Cnstrnt::new(Dom::Int, Interval::full())
    }

    pub fn real() -> Self {
        Cnstrnt::full()
    }

    pub fn zero() -> Self {
        Cnstrnt::new(Dom::Real, Interval::point(BigRational::zero()))
    }

    pub fn pos() -> Self {
        Cnstrnt::new(
            Dom::Real,
            Interval::new(Bound::Open(BigRational::zero()), Bound::Unbounded),
        )
    }

    pub fn neg() -> Self {
        Cnstrnt::new(
            Dom::Real,
            Interval::new(Bound::Unbounded, Bound::Open(BigRational::zero())),
        )
    }

    pub fn nonneg() -> Self {
        Cnstrnt::new(
            Dom::Real,
            Interval::new(Bound::Closed(BigRational::zero()), Bound::Unbounded),
        )
    }

    pub fn nonpos() -> Self {
        Cnstrnt::new(
            Dom::Real,
            Interval::new(Bound::Unbounded, Bound::Closed(BigRational::zero())),
        )
    }

    pub fn point(q: BigRational) -> Self {
        Cnstrnt::new(Dom::Real, Interval::point(q))
    }

    pub fn dom(&self) -> Dom {
        self.dom
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn is_int(&self) -> bool {
        self.dom == Dom::Int
    }

    /// Whether no value satisfies this constraint
    ///
    /// Over the integer domain a bounded interval may be empty even when
    /// it holds rationals, e.g. the open interval `(0, 1)`.
    pub fn is_empty(&self) -> bool {
        if self.interval.is_empty() {
            return true;
        }
        if self.dom == Dom::Int {
            if let Some(p) = self.interval.as_point() {
                return !p.is_integer();
            }
            if self.interval.lo.value().is_some() && self.interval.hi.value().is_some() {
                let lo_int = match &self.interval.lo {
                    Bound::Closed(q) => q.ceil(),
                    Bound::Open(q) => {
                        if q.is_integer() {
                            q + BigRational::from_integer(1.into())
                        } else {
                            q.ceil()
                        }
                    }
                    Bound::Unbounded => unreachable!(),
                };
                let hi_int = match &self.interval.hi {
                    Bound::Closed(q) => q.floor(),
                    Bound::Open(q) => {
                        if q.is_integer() {
                            q - BigRational::from_integer(1.into())
                        } else {
                            q.floor()
                        }
                    }
                    Bound::Unbounded => unreachable!(),
                };
                return lo_int > hi_int;
            }
        }
        false
    }

    /// The single member, if any
    pub fn as_point(&self) -> Option<&BigRational> {
        self.interval.as_point()
    }

    /// Whether this constraint carries no information at all
    pub fn is_full(&self) -> bool {
        self.dom == Dom::Real
            && matches!(self.interval.lo, Bound::Unbounded)
            && matches!(self.interval.hi, Bound::Unbounded)
    }

    pub fn member(&self, q: &BigRational) -> bool {
        if self.dom == Dom::Int && !q.is_integer() {
            return false;
        }
        self.interval.member(q)
    }

    /// Lattice meet; the caller checks emptiness
    pub fn meet(&self, other: &Cnstrnt) -> Cnstrnt {
        Cnstrnt {
            dom: self.dom.meet(other.dom),
            interval: self.interval.meet(&other.interval),
        }
    }

    /// Whether every member of `self` satisfies `other`
    pub fn subset(&self, other: &Cnstrnt) -> bool {
        let dom_ok = other.dom == Dom::Real || self.dom == Dom::Int;
        dom_ok && self.interval.subset(&other.interval)
    }

    pub fn add(&self, other: &Cnstrnt) -> Cnstrnt {
        Cnstrnt {
            dom: Dom::Real,
            interval: self.interval.add(&other.interval),
        }
    }

    pub fn scale(&self, q: &BigRational) -> Cnstrnt {
        Cnstrnt {
            dom: Dom::Real,
            interval: self.interval.scale(q),
        }
    }

    /// The sign this constraint exactly denotes, if it is one of the
    /// canonical sign constraints over the reals
    pub fn sign_exact(&self) -> Option<Sign> {
        let table = [
            (Cnstrnt::pos(), Sign::Pos),
            (Cnstrnt::neg(), Sign::Neg),
            (Cnstrnt::nonneg(), Sign::Nonneg),
            (Cnstrnt::nonpos(), Sign::Nonpos),
            (Cnstrnt::zero(), Sign::Zero),
            (Cnstrnt::full(), Sign::Top),
        ];
        table.into_iter().find(|(c, _)| self == c).map(|(_, s)| s)
    }

    /// Project onto the sign lattice
    pub fn sign(&self) -> Sign {
        if self.is_empty() {
            return Sign::Bot;
        }
        if let Some(p) = self.as_point() {
            if p.is_zero() {
                return Sign::Zero;
            }
        }
        let zero = BigRational::zero();
        let lo_pos = match &self.interval.lo {
            Bound::Open(q) => *q >= zero,
            Bound::Closed(q) => *q > zero,
            Bound::Unbounded => false,
        };
        let lo_nonneg = match &self.interval.lo {
            Bound::Open(q) | Bound::Closed(q) => *q >= zero,
            Bound::Unbounded => false,
        };
        let hi_neg = match &self.interval.hi {
            Bound::Open(q) => *q <= zero,
            Bound::Closed(q) => *q < zero,
            Bound::Unbounded => false,
        };
        let hi_nonpos = match &self.interval.hi {
            Bound::Open(q) | Bound::Closed(q) => *q <= zero,
            Bound::Unbounded => false,
        };
        if lo_pos {
            Sign::Pos
        } else if hi_neg {
            Sign::Neg
        } else if lo_nonneg {
            Sign::Nonneg
        } else if hi_nonpos {
            Sign::Nonpos
        } else {
            Sign::Top
        }
    }
}

impl fmt::Display for Cnstrnt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dom == Dom::Int {
            write!(f, "int ")?;
        }
        match &self.interval.lo {
            Bound::Unbounded => write!(f, "(-inf")?,
            Bound::Open(q) => write!(f, "({}", q)?,
            Bound::Closed(q) => write!(f, "[{}", q)?,
        }
        write!(f, ", ")?;
        match &self.interval.hi {
            Bound::Unbounded => write!(f, "+inf)"),
            Bound::Open(q) => write!(f, "{})", q),
            Bound::Closed(q) => write!(f, "{}]", q),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    fn qr(n: i64, d: i64) -> BigRational {
        BigRational::new(n.into(), d.into())
    }

    #[test]
    fn meet_of_nonneg_and_nonpos_is_zero() {
        let m = Cnstrnt::nonneg().meet(&Cnstrnt::nonpos());
        assert!(!m.is_empty());
        assert_eq!(m.as_point(), Some(&q(0)));
        assert_eq!(m.sign(), Sign::Zero);
    }

    #[test]
    fn meet_of_pos_and_zero_is_empty() {
        let m = Cnstrnt::pos().meet(&Cnstrnt::zero());
        assert!(m.is_empty());
    }

    #[test]
    fn open_point_is_empty() {
        let i = Interval::new(Bound::Open(q(0)), Bound::Closed(q(0)));
        assert!(i.is_empty());
    }

    #[test]
    fn integer_gap_is_empty() {
        let c = Cnstrnt::new(
            Dom::Int,
            Interval::new(Bound::Open(q(0)), Bound::Open(q(1))),
        );
        assert!(c.is_empty());
    }

    #[test]
    fn fractional_point_not_integer() {
        let c = Cnstrnt::new(Dom::Int, Interval::point(qr(1, 2)));
        assert!(c.is_empty());
    }

    #[test]
    fn subset_and_membership() {
        assert!(Cnstrnt::pos().subset(&Cnstrnt::nonneg()));
        assert!(!Cnstrnt::nonneg().subset(&Cnstrnt::pos()));
        assert!(Cnstrnt::pos().member(&qr(1, 2)));
        assert!(!Cnstrnt::pos().member(&q(0)));
        assert!(!Cnstrnt::int().member(&qr(1, 2)));
    }

    #[test]
    fn interval_arithmetic() {
        let a = Cnstrnt::new(
            Dom::Real,
            Interval::new(Bound::Closed(q(1)), Bound::Closed(q(2))),
        );
        let b = a.scale(&q(-3));
        assert_eq!(
            b.interval(),
            &Interval::new(Bound::Closed(q(-6)), Bound::Closed(q(-3)))
        );
        let s = a.add(&a);
        assert!(s.member(&q(2)) && s.member(&q(4)) && !s.member(&q(5)));
    }

    #[test]
    fn signs() {
        assert_eq!(Cnstrnt::pos().sign(), Sign::Pos);
        assert_eq!(Cnstrnt::nonpos().sign(), Sign::Nonpos);
        assert_eq!(Cnstrnt::full().sign(), Sign::Top);
    }
}
