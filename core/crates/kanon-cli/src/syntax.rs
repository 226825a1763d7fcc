//! Surface syntax for atoms
//!
//! One atom per line: `t = t`, `t <> t`, `t in C`, a bare monadic
//! predicate application `p(x)` or its negation `~p(x)`, or the
//! constants `true` / `false`. Terms mix identifiers, rationals,
//! arithmetic (`+`, `-`, scalar `*`, `^`), bitvector constants
//! (`0b1011`, `++`, `ext[lo,hi,n]`), tuples (`tuple(..)`,
//! `proj[i,n](..)`), coproducts (`inl`, `inr`, `outl`, `outr`) and
//! arrays (`select`, `update`). Constraints are `int`, `real`, the sign
//! keywords, or an interval such as `[0, 10)` optionally prefixed by
//! `int`.

use kanon_core::theories::bv::width as bv_width;
use kanon_core::{Atom, Bitv, Bound, Cnstrnt, Context, Dom, Interval, Sym, Term};
use num_bigint::BigInt;
use num_rational::BigRational;
use thiserror::Error;

/// A parse failure on one input line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("syntax error: {message}")]
pub struct SyntaxError {
    pub message: String,
}

impl SyntaxError {
    fn new(message: impl Into<String>) -> Self {
        SyntaxError {
            message: message.into(),
        }
    }
}

type ParseResult<T> = Result<T, SyntaxError>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Int(BigInt),
    Bits(Vec<bool>),
    Eq,
    Neq,
    LPar,
    RPar,
    LBrack,
    RBrack,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Concat,
    Tilde,
    In,
    True,
    False,
}

fn lex(input: &str) -> ParseResult<Vec<Tok>> {
    let mut toks = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '#' => break,
            '=' => {
                chars.next();
                toks.push(Tok::Eq);
            }
            '<' => {
                chars.next();
                if chars.next() != Some('>') {
                    return Err(SyntaxError::new("expected '>' after '<'"));
                }
                toks.push(Tok::Neq);
            }
            '(' => {
                chars.next();
                toks.push(Tok::LPar);
            }
            ')' => {
                chars.next();
                toks.push(Tok::RPar);
            }
            '[' => {
                chars.next();
                toks.push(Tok::LBrack);
            }
            ']' => {
                chars.next();
                toks.push(Tok::RBrack);
            }
            ',' => {
                chars.next();
                toks.push(Tok::Comma);
            }
            '+' => {
                chars.next();
                if chars.peek() == Some(&'+') {
                    chars.next();
                    toks.push(Tok::Concat);
                } else {
                    toks.push(Tok::Plus);
                }
            }
            '-' => {
                chars.next();
                toks.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                toks.push(Tok::Star);
            }
            '/' => {
                chars.next();
                toks.push(Tok::Slash);
            }
            '^' => {
                chars.next();
                toks.push(Tok::Caret);
            }
            '~' => {
                chars.next();
                toks.push(Tok::Tilde);
            }
            '0'..='9' => {
                let mut digits = String::new();
                digits.push(c);
                chars.next();
                if digits == "0" && chars.peek() == Some(&'b') {
                    chars.next();
                    let mut bits = Vec::new();
                    while let Some(&b) = chars.peek() {
                        match b {
                            '0' => bits.push(false),
                            '1' => bits.push(true),
                            _ => break,
                        }
                        chars.next();
                    }
                    if bits.is_empty() {
                        return Err(SyntaxError::new("empty bitvector constant"));
                    }
                    toks.push(Tok::Bits(bits));
                    continue;
                }
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: BigInt = digits
                    .parse()
                    .map_err(|_| SyntaxError::new(format!("bad number '{}'", digits)))?;
                toks.push(Tok::Int(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&a) = chars.peek() {
                    if a.is_ascii_alphanumeric() || a == '_' || a == '\'' {
                        ident.push(a);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.as_str() {
                    "in" => toks.push(Tok::In),
                    "true" => toks.push(Tok::True),
                    "false" => toks.push(Tok::False),
                    _ => toks.push(Tok::Ident(ident)),
                }
            }
            other => {
                return Err(SyntaxError::new(format!("unexpected character '{}'", other)));
            }
        }
    }
    Ok(toks)
}

struct Parser<'a> {
    toks: Vec<Tok>,
    pos: usize,
    ctx: &'a mut Context,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: Tok) -> ParseResult<()> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            other => Err(SyntaxError::new(format!(
                "expected {:?}, found {:?}",
                tok, other
            ))),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn atom(&mut self) -> ParseResult<Atom> {
        match self.peek() {
            Some(Tok::True) => {
                self.next();
                return Ok(Atom::True);
            }
            Some(Tok::False) => {
                self.next();
                return Ok(Atom::False);
            }
            Some(Tok::Tilde) => {
                self.next();
                let name = self.ident()?;
                self.expect(Tok::LPar)?;
                let arg = self.term()?;
                self.expect(Tok::RPar)?;
                return Ok(Atom::NegPred(name, arg));
            }
            _ => {}
        }
        let lhs = self.term()?;
        match self.next() {
            Some(Tok::Eq) => {
                let rhs = self.term()?;
                Ok(Atom::Eq(lhs, rhs))
            }
            Some(Tok::Neq) => {
                let rhs = self.term()?;
                Ok(Atom::Diseq(lhs, rhs))
            }
            Some(Tok::In) => {
                let c = self.cnstrnt()?;
                Ok(Atom::In(lhs, c))
            }
            None => match lhs {
                Term::App(Sym::Uninterp(p), args) if args.len() == 1 => {
                    let mut args = args;
                    Ok(Atom::Pred(p, args.pop().expect("one argument")))
                }
                other => Err(SyntaxError::new(format!(
                    "expected '=', '<>' or 'in' after term '{}'",
                    other
                ))),
            },
            Some(other) => Err(SyntaxError::new(format!(
                "expected relation, found {:?}",
                other
            ))),
        }
    }

    fn ident(&mut self) -> ParseResult<String> {
        match self.next() {
            Some(Tok::Ident(s)) => Ok(s),
            other => Err(SyntaxError::new(format!(
                "expected identifier, found {:?}",
                other
            ))),
        }
    }

    fn cnstrnt(&mut self) -> ParseResult<Cnstrnt> {
        match self.peek().cloned() {
            Some(Tok::Ident(kw)) => {
                match kw.as_str() {
                    "int" | "real" => {
                        self.next();
                        let dom = if kw == "int" { Dom::Int } else { Dom::Real };
                        if matches!(self.peek(), Some(Tok::LBrack) | Some(Tok::LPar)) {
                            let iv = self.interval()?;
                            Ok(Cnstrnt::new(dom, iv))
                        } else if dom == Dom::Int {
                            Ok(Cnstrnt::int())
                        } else {
                            Ok(Cnstrnt::real())
                        }
                    }
                    "pos" => {
                        self.next();
                        Ok(Cnstrnt::pos())
                    }
                    "neg" => {
                        self.next();
                        Ok(Cnstrnt::neg())
                    }
                    "nonneg" => {
                        self.next();
                        Ok(Cnstrnt::nonneg())
                    }
                    "nonpos" => {
                        self.next();
                        Ok(Cnstrnt::nonpos())
                    }
                    "zero" => {
                        self.next();
                        Ok(Cnstrnt::zero())
                    }
                    other => Err(SyntaxError::new(format!("unknown constraint '{}'", other))),
                }
            }
            Some(Tok::LBrack) | Some(Tok::LPar) => {
                let iv = self.interval()?;
                Ok(Cnstrnt::new(Dom::Real, iv))
            }
            other => Err(SyntaxError::new(format!(
                "expected constraint, found {:?}",
                other
            ))),
        }
    }

    fn interval(&mut self) -> ParseResult<Interval> {
        let lo_open = match self.next() {
            Some(Tok::LBrack) => false,
            Some(Tok::LPar) => true,
            other => {
                return Err(SyntaxError::new(format!(
                    "expected interval, found {:?}",
                    other
                )))
            }
        };
        let lo = self.bound(lo_open)?;
        self.expect(Tok::Comma)?;
        let hi_open_probe = self.bound_value()?;
        let hi = match self.next() {
            Some(Tok::RBrack) => match hi_open_probe {
                Some(q) => Bound::Closed(q),
                None => {
                    return Err(SyntaxError::new("infinite bound must be open"));
                }
            },
            Some(Tok::RPar) => match hi_open_probe {
                Some(q) => Bound::Open(q),
                None => Bound::Unbounded,
            },
            other => {
                return Err(SyntaxError::new(format!(
                    "expected ']' or ')', found {:?}",
                    other
                )))
            }
        };
        Ok(Interval::new(lo, hi))
    }

    fn bound(&mut self, open: bool) -> ParseResult<Bound> {
        match self.bound_value()? {
            Some(q) => Ok(if open { Bound::Open(q) } else { Bound::Closed(q) }),
            None => Ok(Bound::Unbounded),
        }
    }

    /// A finite rational, or `None` for an infinity
    fn bound_value(&mut self) -> ParseResult<Option<BigRational>> {
        let negative = if matches!(self.peek(), Some(Tok::Minus)) {
            self.next();
            true
        } else if matches!(self.peek(), Some(Tok::Plus)) {
            self.next();
            false
        } else {
            false
        };
        match self.next() {
            Some(Tok::Ident(s)) if s == "inf" => Ok(None),
            Some(Tok::Int(n)) => {
                let mut q = BigRational::from_integer(n);
                if matches!(self.peek(), Some(Tok::Slash)) {
                    self.next();
                    match self.next() {
                        Some(Tok::Int(d)) => {
                            if d == BigInt::from(0) {
                                return Err(SyntaxError::new("zero denominator"));
                            }
                            q /= BigRational::from_integer(d);
                        }
                        other => {
                            return Err(SyntaxError::new(format!(
                                "expected denominator, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Ok(Some(if negative { -q } else { q }))
            }
            other => Err(SyntaxError::new(format!(
                "expected bound, found {:?}",
                other
            ))),
        }
    }

    fn term(&mut self) -> ParseResult<Term> {
        let mut t = self.concat()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.next();
                    let rhs = self.concat()?;
                    t = Term::add(vec![t, rhs]);
                }
                Some(Tok::Minus) => {
                    self.next();
                    let rhs = self.concat()?;
                    t = Term::add(vec![t, negate(rhs)]);
                }
                _ => return Ok(t),
            }
        }
    }

    fn concat(&mut self) -> ParseResult<Term> {
        let mut t = self.product()?;
        while matches!(self.peek(), Some(Tok::Concat)) {
            self.next();
            let rhs = self.product()?;
            let n = bv_width(&t).ok_or_else(|| {
                SyntaxError::new(format!("cannot infer bitvector width of '{}'", t))
            })?;
            let m = bv_width(&rhs).ok_or_else(|| {
                SyntaxError::new(format!("cannot infer bitvector width of '{}'", rhs))
            })?;
            t = Term::concat(n, m, t, rhs)
                .map_err(|e| SyntaxError::new(e.to_string()))?;
        }
        Ok(t)
    }

    fn product(&mut self) -> ParseResult<Term> {
        let mut factors = vec![self.factor()?];
        while matches!(self.peek(), Some(Tok::Star)) {
            self.next();
            factors.push(self.factor()?);
        }
        if factors.len() == 1 {
            return Ok(factors.pop().expect("one factor"));
        }
        // split rational coefficients from symbolic factors
        let mut coeff = BigRational::from_integer(1.into());
        let mut symbolic = Vec::new();
        for f in factors {
            match f.as_num() {
                Some(q) => coeff *= q,
                None => symbolic.push(f),
            }
        }
        let core = match symbolic.len() {
            0 => return Ok(Term::num(coeff)),
            1 => symbolic.pop().expect("one symbolic factor"),
            _ => Term::mult(symbolic),
        };
        if coeff == BigRational::from_integer(1.into()) {
            Ok(core)
        } else {
            Ok(Term::multq(coeff, core))
        }
    }

    fn factor(&mut self) -> ParseResult<Term> {
        let base = self.primary()?;
        if matches!(self.peek(), Some(Tok::Caret)) {
            self.next();
            match self.next() {
                Some(Tok::Int(n)) => {
                    let exp: u32 = n
                        .try_into()
                        .map_err(|_| SyntaxError::new("exponent out of range"))?;
                    Ok(Term::expt(exp, base))
                }
                other => Err(SyntaxError::new(format!(
                    "expected exponent, found {:?}",
                    other
                ))),
            }
        } else {
            Ok(base)
        }
    }

    fn primary(&mut self) -> ParseResult<Term> {
        match self.next() {
            Some(Tok::LPar) => {
                let t = self.term()?;
                self.expect(Tok::RPar)?;
                Ok(t)
            }
            Some(Tok::Minus) => {
                let t = self.primary()?;
                Ok(negate(t))
            }
            Some(Tok::Int(n)) => {
                let mut q = BigRational::from_integer(n);
                if matches!(self.peek(), Some(Tok::Slash)) {
                    self.next();
                    match self.next() {
                        Some(Tok::Int(d)) => {
                            if d == BigInt::from(0) {
                                return Err(SyntaxError::new("zero denominator"));
                            }
                            q /= BigRational::from_integer(d);
                        }
                        other => {
                            return Err(SyntaxError::new(format!(
                                "expected denominator, found {:?}",
                                other
                            )))
                        }
                    }
                }
                Ok(Term::num(q))
            }
            Some(Tok::Bits(bits)) => Ok(Term::bv_const(Bitv::new(bits))),
            Some(Tok::Ident(name)) => self.named(name),
            other => Err(SyntaxError::new(format!(
                "expected term, found {:?}",
                other
            ))),
        }
    }

    fn named(&mut self, name: String) -> ParseResult<Term> {
        match name.as_str() {
            "tuple" => {
                let args = self.paren_args()?;
                Ok(Term::tuple(args))
            }
            "proj" => {
                let idx = self.bracket_naturals(2)?;
                let mut args = self.paren_args()?;
                if args.len() != 1 {
                    return Err(SyntaxError::new("proj takes one argument"));
                }
                Term::proj(idx[0], idx[1], args.pop().expect("one argument"))
                    .map_err(|e| SyntaxError::new(e.to_string()))
            }
            "ext" => {
                let idx = self.bracket_naturals(3)?;
                let mut args = self.paren_args()?;
                if args.len() != 1 {
                    return Err(SyntaxError::new("ext takes one argument"));
                }
                Term::extract(idx[0], idx[1], idx[2], args.pop().expect("one argument"))
                    .map_err(|e| SyntaxError::new(e.to_string()))
            }
            "inl" | "inr" | "outl" | "outr" => {
                let mut args = self.paren_args()?;
                if args.len() != 1 {
                    return Err(SyntaxError::new(format!("{} takes one argument", name)));
                }
                let arg = args.pop().expect("one argument");
                Ok(match name.as_str() {
                    "inl" => Term::inl(arg),
                    "inr" => Term::inr(arg),
                    "outl" => Term::outl(arg),
                    _ => Term::outr(arg),
                })
            }
            "select" => {
                let mut args = self.paren_args()?;
                if args.len() != 2 {
                    return Err(SyntaxError::new("select takes two arguments"));
                }
                let i = args.pop().expect("two arguments");
                let a = args.pop().expect("two arguments");
                Ok(Term::select(a, i))
            }
            "update" | "store" => {
                let mut args = self.paren_args()?;
                if args.len() != 3 {
                    return Err(SyntaxError::new("update takes three arguments"));
                }
                let e = args.pop().expect("three arguments");
                let i = args.pop().expect("three arguments");
                let a = args.pop().expect("three arguments");
                Ok(Term::update(a, i, e))
            }
            "apply" => {
                let mut args = self.paren_args()?;
                if args.len() != 2 {
                    return Err(SyntaxError::new("apply takes two arguments"));
                }
                let x = args.pop().expect("two arguments");
                let f = args.pop().expect("two arguments");
                Ok(Term::apply(f, x))
            }
            _ => {
                if matches!(self.peek(), Some(Tok::LPar)) {
                    let args = self.paren_args()?;
                    Ok(Term::uninterp(name, args))
                } else {
                    Ok(Term::var(self.ctx.var(&name)))
                }
            }
        }
    }

    fn paren_args(&mut self) -> ParseResult<Vec<Term>> {
        self.expect(Tok::LPar)?;
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Tok::RPar)) {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.term()?);
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RPar) => return Ok(args),
                other => {
                    return Err(SyntaxError::new(format!(
                        "expected ',' or ')', found {:?}",
                        other
                    )))
                }
            }
        }
    }

    fn bracket_naturals(&mut self, count: usize) -> ParseResult<Vec<usize>> {
        self.expect(Tok::LBrack)?;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            if i > 0 {
                self.expect(Tok::Comma)?;
            }
            match self.next() {
                Some(Tok::Int(n)) => {
                    let v: usize = n
                        .try_into()
                        .map_err(|_| SyntaxError::new("index out of range"))?;
                    out.push(v);
                }
                other => {
                    return Err(SyntaxError::new(format!(
                        "expected index, found {:?}",
                        other
                    )))
                }
            }
        }
        self.expect(Tok::RBrack)?;
        Ok(out)
    }
}

fn negate(t: Term) -> Term {
    match t.as_num() {
        Some(q) => Term::num(-q),
        None => Term::multq(BigRational::from_integer((-1).into()), t),
    }
}

/// Parse one atom, interning external variables into `ctx`
pub fn parse_atom(line: &str, ctx: &mut Context) -> ParseResult<Atom> {
    let toks = lex(line)?;
    if toks.is_empty() {
        return Err(SyntaxError::new("empty input"));
    }
    let mut parser = Parser { toks, pos: 0, ctx };
    let atom = parser.atom()?;
    if !parser.at_end() {
        return Err(SyntaxError::new("trailing input after atom"));
    }
    Ok(atom)
}

/// Whether a script line carries an atom at all
pub fn is_blank(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}
