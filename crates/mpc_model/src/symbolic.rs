//! Symbolic scalar expressions and vectors.
//!
//! Expressions are immutable trees with shared children, so cloning is cheap
//! and sub-expressions produced by one stage of an integrator can be reused by
//! the next without copying. Constructors fold constants and drop algebraic
//! identities (`x + 0`, `1 * x`, ...) so discretized models stay readable.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Deref, Div, Mul, Neg, Range, Sub};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(0);

/// A scalar unknown: entry `index` of the vector `name` created by one `SymbolSource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    source: u64,
    name: Rc<str>,
    index: usize,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.name, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Pow => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
}

impl UnaryOp {
    fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Sin => a.sin(),
            UnaryOp::Cos => a.cos(),
            UnaryOp::Tan => a.tan(),
            UnaryOp::Exp => a.exp(),
            UnaryOp::Ln => a.ln(),
            UnaryOp::Sqrt => a.sqrt(),
        }
    }

    /// Name of the function as accepted by the equation parser.
    pub fn function_name(self) -> Option<&'static str> {
        match self {
            UnaryOp::Neg => None,
            UnaryOp::Sin => Some("sin"),
            UnaryOp::Cos => Some("cos"),
            UnaryOp::Tan => Some("tan"),
            UnaryOp::Exp => Some("exp"),
            UnaryOp::Ln => Some("ln"),
            UnaryOp::Sqrt => Some("sqrt"),
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(UnaryOp::Sin),
            "cos" => Some(UnaryOp::Cos),
            "tan" => Some(UnaryOp::Tan),
            "exp" => Some(UnaryOp::Exp),
            "ln" | "log" => Some(UnaryOp::Ln),
            "sqrt" => Some(UnaryOp::Sqrt),
            _ => None,
        }
    }
}

/// Symbolic scalar expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Sym(Symbol),
    Binary(BinaryOp, Rc<Expr>, Rc<Expr>),
    Unary(UnaryOp, Rc<Expr>),
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Expr::Const(value)
    }

    pub fn zero() -> Self {
        Expr::Const(0.0)
    }

    pub fn one() -> Self {
        Expr::Const(1.0)
    }

    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Expr::Sym(s) => Some(s),
            _ => None,
        }
    }

    fn is_const(&self, value: f64) -> bool {
        matches!(self, Expr::Const(v) if *v == value)
    }

    pub fn binary(op: BinaryOp, a: Expr, b: Expr) -> Self {
        if let (Some(x), Some(y)) = (a.as_const(), b.as_const()) {
            return Expr::Const(op.apply(x, y));
        }
        match op {
            BinaryOp::Add if a.is_const(0.0) => b,
            BinaryOp::Add | BinaryOp::Sub if b.is_const(0.0) => a,
            BinaryOp::Sub if a.is_const(0.0) => -b,
            BinaryOp::Mul if a.is_const(0.0) || b.is_const(0.0) => Expr::zero(),
            BinaryOp::Mul if a.is_const(1.0) => b,
            BinaryOp::Mul | BinaryOp::Div if b.is_const(1.0) => a,
            BinaryOp::Div if a.is_const(0.0) => Expr::zero(),
            BinaryOp::Pow if b.is_const(0.0) => Expr::one(),
            BinaryOp::Pow if b.is_const(1.0) => a,
            _ => Expr::Binary(op, Rc::new(a), Rc::new(b)),
        }
    }

    pub fn unary(op: UnaryOp, a: Expr) -> Self {
        if let Some(x) = a.as_const() {
            return Expr::Const(op.apply(x));
        }
        if let (UnaryOp::Neg, Expr::Unary(UnaryOp::Neg, inner)) = (op, &a) {
            return (**inner).clone();
        }
        Expr::Unary(op, Rc::new(a))
    }

    pub fn sin(&self) -> Self {
        Expr::unary(UnaryOp::Sin, self.clone())
    }

    pub fn cos(&self) -> Self {
        Expr::unary(UnaryOp::Cos, self.clone())
    }

    pub fn tan(&self) -> Self {
        Expr::unary(UnaryOp::Tan, self.clone())
    }

    pub fn exp(&self) -> Self {
        Expr::unary(UnaryOp::Exp, self.clone())
    }

    pub fn ln(&self) -> Self {
        Expr::unary(UnaryOp::Ln, self.clone())
    }

    pub fn sqrt(&self) -> Self {
        Expr::unary(UnaryOp::Sqrt, self.clone())
    }

    pub fn powf(&self, exponent: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Pow, self.clone(), exponent.into())
    }

    /// Replaces every symbol found in `bindings` by its bound expression.
    pub fn substitute(&self, bindings: &HashMap<Symbol, Expr>) -> Expr {
        match self {
            Expr::Const(_) => self.clone(),
            Expr::Sym(s) => bindings.get(s).cloned().unwrap_or_else(|| self.clone()),
            Expr::Binary(op, a, b) => {
                Expr::binary(*op, a.substitute(bindings), b.substitute(bindings))
            }
            Expr::Unary(op, a) => Expr::unary(*op, a.substitute(bindings)),
        }
    }

    /// Partial derivative with respect to `wrt`.
    pub fn diff(&self, wrt: &Symbol) -> Expr {
        match self {
            Expr::Const(_) => Expr::zero(),
            Expr::Sym(s) => {
                if s == wrt {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Expr::Binary(op, a, b) => {
                let (a, b) = (&**a, &**b);
                let da = a.diff(wrt);
                let db = b.diff(wrt);
                match op {
                    BinaryOp::Add => da + db,
                    BinaryOp::Sub => da - db,
                    BinaryOp::Mul => da * b + a * &db,
                    BinaryOp::Div => (da * b - a * &db) / (b * b),
                    BinaryOp::Pow => match b.as_const() {
                        // d(a^c) = c a^(c-1) da
                        Some(c) => c * a.powf(c - 1.0) * da,
                        // d(a^b) = a^b (db ln a + b da / a)
                        None => self.clone() * (db * a.ln() + b * &da / a),
                    },
                }
            }
            Expr::Unary(op, a) => {
                let da = a.diff(wrt);
                match op {
                    UnaryOp::Neg => -da,
                    UnaryOp::Sin => a.cos() * da,
                    UnaryOp::Cos => -(a.sin() * da),
                    UnaryOp::Tan => (1.0 + self * self) * da,
                    UnaryOp::Exp => self.clone() * da,
                    UnaryOp::Ln => da / &**a,
                    UnaryOp::Sqrt => da / (2.0 * self),
                }
            }
        }
    }

    /// Whether `symbol` appears anywhere in the expression.
    pub fn depends_on(&self, symbol: &Symbol) -> bool {
        match self {
            Expr::Const(_) => false,
            Expr::Sym(s) => s == symbol,
            Expr::Binary(_, a, b) => a.depends_on(symbol) || b.depends_on(symbol),
            Expr::Unary(_, a) => a.depends_on(symbol),
        }
    }

    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, parent: u8) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{}", v),
            Expr::Sym(s) => write!(f, "{}", s),
            Expr::Binary(op, a, b) => {
                let prec = op.precedence();
                let wrap = prec < parent;
                if wrap {
                    write!(f, "(")?;
                }
                // Sub and Div are left-associative, Pow is right-associative.
                let (left, right) = match op {
                    BinaryOp::Pow => (prec + 1, prec),
                    BinaryOp::Sub | BinaryOp::Div => (prec, prec + 1),
                    _ => (prec, prec),
                };
                a.fmt_with(f, left)?;
                if *op == BinaryOp::Pow {
                    write!(f, "^")?;
                } else {
                    write!(f, " {} ", op.symbol())?;
                }
                b.fmt_with(f, right)?;
                if wrap {
                    write!(f, ")")?;
                }
                Ok(())
            }
            Expr::Unary(op, a) => match op.function_name() {
                Some(name) => {
                    write!(f, "{}(", name)?;
                    a.fmt_with(f, 0)?;
                    write!(f, ")")
                }
                None => {
                    write!(f, "-")?;
                    a.fmt_with(f, 4)
                }
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 0)
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Const(value)
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Expr::Sym(symbol)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self, rhs)
            }
        }

        impl<'a> $trait<&'a Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &'a Expr) -> Expr {
                Expr::binary($op, self, rhs.clone())
            }
        }

        impl<'a> $trait<Expr> for &'a Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs)
            }
        }

        impl<'a, 'b> $trait<&'b Expr> for &'a Expr {
            type Output = Expr;
            fn $method(self, rhs: &'b Expr) -> Expr {
                Expr::binary($op, self.clone(), rhs.clone())
            }
        }

        impl $trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self, Expr::Const(rhs))
            }
        }

        impl<'a> $trait<f64> for &'a Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::binary($op, self.clone(), Expr::Const(rhs))
            }
        }

        impl $trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::Const(self), rhs)
            }
        }

        impl<'a> $trait<&'a Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &'a Expr) -> Expr {
                Expr::binary($op, Expr::Const(self), rhs.clone())
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);
impl_binary_op!(Div, div, BinaryOp::Div);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

impl<'a> Neg for &'a Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self.clone())
    }
}

/// Ordered column of symbolic expressions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymVector(Vec<Expr>);

impl SymVector {
    pub fn new(entries: Vec<Expr>) -> Self {
        Self(entries)
    }

    /// Entries `range` as a new vector.
    pub fn slice(&self, range: Range<usize>) -> SymVector {
        SymVector(self.0[range].to_vec())
    }

    /// Vertical concatenation, `self` on top.
    pub fn vertcat(&self, below: &SymVector) -> SymVector {
        let mut entries = Vec::with_capacity(self.len() + below.len());
        entries.extend_from_slice(&self.0);
        entries.extend_from_slice(&below.0);
        SymVector(entries)
    }

    pub fn into_vec(self) -> Vec<Expr> {
        self.0
    }

    /// Symbols of the vector, in order. `None` if any entry is not a bare symbol.
    pub fn symbols(&self) -> Option<Vec<Symbol>> {
        self.0.iter().map(|e| e.as_symbol().cloned()).collect()
    }
}

impl Deref for SymVector {
    type Target = [Expr];

    fn deref(&self) -> &[Expr] {
        &self.0
    }
}

impl From<Vec<Expr>> for SymVector {
    fn from(entries: Vec<Expr>) -> Self {
        Self(entries)
    }
}

impl FromIterator<Expr> for SymVector {
    fn from_iter<I: IntoIterator<Item = Expr>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for SymVector {
    type Item = Expr;
    type IntoIter = std::vec::IntoIter<Expr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for SymVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, entry) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", entry)?;
        }
        write!(f, "]")
    }
}

/// Hands out symbolic vectors.
///
/// Symbols created by two different sources never compare equal, even when
/// they share a name, so binding a model twice yields independent unknowns.
#[derive(Debug)]
pub struct SymbolSource {
    id: u64,
}

impl SymbolSource {
    pub fn new() -> Self {
        Self {
            id: NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// A vector of `len` unknowns named `name_0 .. name_{len-1}`.
    pub fn vector(&self, name: &str, len: usize) -> SymVector {
        let name: Rc<str> = Rc::from(name);
        (0..len)
            .map(|index| {
                Expr::Sym(Symbol {
                    source: self.id,
                    name: Rc::clone(&name),
                    index,
                })
            })
            .collect()
    }

    pub fn scalar(&self, name: &str) -> Expr {
        Expr::Sym(Symbol {
            source: self.id,
            name: Rc::from(name),
            index: 0,
        })
    }
}

impl Default for SymbolSource {
    fn default() -> Self {
        Self::new()
    }
}
