use crate::error::{ModelError, ModelResult};
use crate::symbolic::{BinaryOp, Expr, Symbol, UnaryOp};
use crate::traits::Scalar;
use std::collections::HashMap;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a function argument (by position) onto the stack.
    LoadArg(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `args`: Argument vector (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, args: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(T::lit(*val)),
                OpCode::LoadArg(idx) => stack.push(args[*idx]),
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
                OpCode::Pow => binary(stack, |a, b| a.powf(b)),
                OpCode::Sin => unary(stack, T::sin),
                OpCode::Cos => unary(stack, T::cos),
                OpCode::Tan => unary(stack, T::tan),
                OpCode::Exp => unary(stack, T::exp),
                OpCode::Ln => unary(stack, T::ln),
                OpCode::Sqrt => unary(stack, T::sqrt),
                OpCode::Neg => unary(stack, |a: T| -a),
            }
        }

        // Compiled expressions always leave exactly one value.
        stack.pop().unwrap_or_else(T::nan)
    }
}

fn binary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T, T) -> T) {
    let b = stack.pop().unwrap_or_else(T::nan);
    let a = stack.pop().unwrap_or_else(T::nan);
    stack.push(f(a, b));
}

fn unary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T) -> T) {
    let a = stack.pop().unwrap_or_else(T::nan);
    stack.push(f(a));
}

/// Compiles symbolic expressions into `Bytecode`.
/// Resolves argument symbols to their positions.
pub struct Compiler {
    pub arg_map: HashMap<Symbol, usize>,
}

impl Compiler {
    pub fn new(args: &[Symbol]) -> Self {
        let mut arg_map = HashMap::new();
        for (i, symbol) in args.iter().enumerate() {
            arg_map.insert(symbol.clone(), i);
        }
        Self { arg_map }
    }

    pub fn compile(&self, expr: &Expr) -> ModelResult<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> ModelResult<()> {
        match expr {
            Expr::Const(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Sym(symbol) => match self.arg_map.get(symbol) {
                Some(&idx) => ops.push(OpCode::LoadArg(idx)),
                None => {
                    return Err(ModelError::FreeSymbol {
                        symbol: symbol.to_string(),
                    })
                }
            },
            Expr::Binary(op, left, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Sin => OpCode::Sin,
                    UnaryOp::Cos => OpCode::Cos,
                    UnaryOp::Tan => OpCode::Tan,
                    UnaryOp::Exp => OpCode::Exp,
                    UnaryOp::Ln => OpCode::Ln,
                    UnaryOp::Sqrt => OpCode::Sqrt,
                });
            }
        }
        Ok(())
    }
}

/// A vector-valued function of fixed symbolic arguments, compiled for numeric evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    n_args: usize,
    outputs: Vec<Bytecode>,
}

impl CompiledFunction {
    pub fn new(args: &[Symbol], outputs: &[Expr]) -> ModelResult<Self> {
        let compiler = Compiler::new(args);
        let outputs = outputs
            .iter()
            .map(|expr| compiler.compile(expr))
            .collect::<ModelResult<Vec<_>>>()?;
        Ok(Self {
            n_args: args.len(),
            outputs,
        })
    }

    pub fn n_args(&self) -> usize {
        self.n_args
    }

    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn eval<T: Scalar>(&self, args: &[T], out: &mut [T]) -> ModelResult<()> {
        if args.len() != self.n_args {
            return Err(ModelError::shape("function arguments", self.n_args, args.len()));
        }
        if out.len() != self.outputs.len() {
            return Err(ModelError::shape(
                "function outputs",
                self.outputs.len(),
                out.len(),
            ));
        }
        let mut stack = Vec::with_capacity(64);
        for (slot, code) in out.iter_mut().zip(&self.outputs) {
            *slot = VM::execute(code, args, &mut stack);
        }
        Ok(())
    }

    pub fn call(&self, args: &[f64]) -> ModelResult<Vec<f64>> {
        let mut out = vec![0.0; self.outputs.len()];
        self.eval(args, &mut out)?;
        Ok(out)
    }
}

// --- Simple Parser ---

/// Parses an equation string into an expression.
///
/// Identifiers are resolved through `resolve`; `pi` is accepted as a constant
/// when the resolver does not claim it.
pub fn parse(input: &str, resolve: &dyn Fn(&str) -> Option<Expr>) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        resolve,
    };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("Unexpected trailing input at token {}", parser.pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else if (d == 'e' || d == 'E') && !num_str.contains(['e', 'E']) {
                    // Exponent, optionally signed: 1e-3, 2.5E+2.
                    num_str.push(d);
                    chars.next();
                    if let Some(&sign) = chars.peek() {
                        if sign == '+' || sign == '-' {
                            num_str.push(sign);
                            chars.next();
                        }
                    }
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| format!("Invalid number `{}`", num_str))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(format!("Unexpected character `{}`", other)),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    resolve: &'a dyn Fn(&str) -> Option<Expr>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_product()?;

        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.consume();
                    left = left + self.parse_product()?;
                }
                Some(Token::Minus) => {
                    self.consume();
                    left = left - self.parse_product()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.consume();
                    left = left * self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.consume();
                    left = left / self.parse_unary()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // Unary minus binds looser than `^`: -x^2 == -(x^2).
    fn parse_unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(-expr);
        }
        self.parse_power()
    }

    // Right-associative: a^b^c == a^(b^c). The exponent may carry its own sign.
    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::constant(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    if self.consume() != Some(Token::RParen) {
                        return Err("Expected ')'".to_string());
                    }
                    let op = UnaryOp::from_function_name(&name)
                        .ok_or_else(|| format!("Unknown function: {}", name))?;
                    Ok(Expr::unary(op, arg))
                } else if let Some(expr) = (self.resolve)(&name) {
                    Ok(expr)
                } else if name == "pi" {
                    Ok(Expr::constant(std::f64::consts::PI))
                } else {
                    Err(format!("Unknown variable: {}", name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                if self.consume() != Some(Token::RParen) {
                    return Err("Expected ')'".to_string());
                }
                Ok(expr)
            }
            Some(token) => Err(format!("Unexpected token {:?}", token)),
            None => Err("Unexpected end of input".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::SymbolSource;
    use approx::assert_relative_eq;

    fn resolver(source: &SymbolSource) -> impl Fn(&str) -> Option<Expr> + '_ {
        move |name| match name {
            "x" | "y" | "v" | "psi" => Some(source.scalar(name)),
            _ => None,
        }
    }

    #[test]
    fn parses_unicycle_kinematics() {
        let source = SymbolSource::new();
        let resolve = resolver(&source);
        let expr = parse("v * cos(psi)", &resolve).expect("parse");
        assert_eq!(expr, source.scalar("v") * source.scalar("psi").cos());
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        let source = SymbolSource::new();
        let resolve = resolver(&source);
        let x = source.scalar("x");

        let expr = parse("x^2^3", &resolve).expect("parse");
        assert_eq!(expr, x.powf(Expr::constant(8.0)));

        let expr = parse("-x^2", &resolve).expect("parse");
        assert_eq!(expr, -(x.powf(2.0)));

        let expr = parse("x^-1", &resolve).expect("parse");
        assert_eq!(expr, x.powf(-1.0));

        let args = [x.as_symbol().unwrap().clone()];
        let function = CompiledFunction::new(&args, &[parse("-x^2", &resolve).unwrap()])
            .expect("compile");
        assert_relative_eq!(function.call(&[3.0]).expect("eval")[0], -9.0);
    }

    #[test]
    fn numbers_accept_exponents() {
        let source = SymbolSource::new();
        let resolve = resolver(&source);
        let v = source.scalar("v");

        let expr = parse("1e-3 * v", &resolve).expect("parse");
        assert_eq!(expr, 1e-3 * &v);
        assert_relative_eq!(parse("2.5E+2", &resolve).unwrap().as_const().unwrap(), 250.0);
        assert_relative_eq!(parse("4e2 - 1", &resolve).unwrap().as_const().unwrap(), 399.0);
        assert!(parse("1e", &resolve).is_err());
    }

    #[test]
    fn parse_rejects_unknown_names_and_garbage() {
        let source = SymbolSource::new();
        let resolve = resolver(&source);

        let err = parse("x + z", &resolve).expect_err("unknown variable");
        assert!(err.contains("Unknown variable: z"));

        let err = parse("foo(x)", &resolve).expect_err("unknown function");
        assert!(err.contains("Unknown function"));

        assert!(parse("x $ y", &resolve).is_err());
        assert!(parse("(x + y", &resolve).is_err());
        assert!(parse("x y", &resolve).is_err());
    }

    #[test]
    fn pi_is_a_builtin_constant() {
        let source = SymbolSource::new();
        let resolve = resolver(&source);
        let expr = parse("2 * pi", &resolve).expect("parse");
        assert_relative_eq!(expr.as_const().unwrap(), 2.0 * std::f64::consts::PI);
    }

    #[test]
    fn compiled_function_evaluates_outputs() {
        let source = SymbolSource::new();
        let x = source.vector("x", 2);
        let args = x.symbols().unwrap();
        let outputs = vec![&x[0] * x[1].sin(), x[0].exp() - 1.0];

        let function = CompiledFunction::new(&args, &outputs).expect("compile");
        let values = function.call(&[2.0, 0.5]).expect("eval");

        assert_relative_eq!(values[0], 2.0 * 0.5_f64.sin());
        assert_relative_eq!(values[1], 2.0_f64.exp() - 1.0);
    }

    #[test]
    fn compiled_function_runs_on_f32() {
        let source = SymbolSource::new();
        let x = source.vector("x", 1);
        let function =
            CompiledFunction::new(&x.symbols().unwrap(), &[&x[0] * &x[0]]).expect("compile");
        let mut out = [0.0_f32];
        function.eval(&[3.0_f32], &mut out).expect("eval");
        assert_relative_eq!(out[0], 9.0_f32);
    }

    #[test]
    fn compile_rejects_free_symbols() {
        let source = SymbolSource::new();
        let x = source.vector("x", 1);
        let stray = source.scalar("w");
        let err = CompiledFunction::new(&x.symbols().unwrap(), &[&x[0] + &stray])
            .expect_err("free symbol");
        assert!(matches!(err, ModelError::FreeSymbol { .. }));
    }

    #[test]
    fn eval_checks_argument_count() {
        let source = SymbolSource::new();
        let x = source.vector("x", 2);
        let function =
            CompiledFunction::new(&x.symbols().unwrap(), &[&x[0] + &x[1]]).expect("compile");
        assert!(matches!(
            function.call(&[1.0]),
            Err(ModelError::ShapeMismatch { expected: 2, found: 1, .. })
        ));
    }
}
