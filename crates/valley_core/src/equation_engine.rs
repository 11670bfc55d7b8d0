use crate::error::ValleyError;
use crate::traits::{Scalar, ScalarField};
use anyhow::{bail, Result};
use std::collections::HashMap;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64, Dual or HyperDual).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
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
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes g(a).
    Call(Function),
}

/// Built-in unary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Sqrt,
    Abs,
    Tanh,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "ln" | "log" => Some(Function::Ln),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            "tanh" => Some(Function::Tanh),
            _ => None,
        }
    }

    fn apply<T: Scalar>(self, a: T) -> T {
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
            Function::Tanh => a.tanh(),
        }
    }
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Current point (read-only).
/// - `params`: Parameter vector (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Returns the value left on the stack, or NaN for malformed bytecode.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], params: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => {
                    stack.push(T::from_f64(val).unwrap_or_else(T::nan));
                }
                OpCode::LoadVar(idx) => {
                    stack.push(vars.get(idx).copied().unwrap_or_else(T::nan));
                }
                OpCode::LoadParam(idx) => {
                    stack.push(params.get(idx).copied().unwrap_or_else(T::nan));
                }
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
                OpCode::Pow => binary(stack, |a, b| a.powf(b)),
                OpCode::Neg => {
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(-a);
                }
                OpCode::Call(func) => {
                    let a = stack.pop().unwrap_or_else(T::nan);
                    stack.push(func.apply(a));
                }
            }
        }

        stack.pop().unwrap_or_else(T::nan)
    }
}

fn binary<T: Scalar>(stack: &mut Vec<T>, op: impl Fn(T, T) -> T) {
    let b = stack.pop().unwrap_or_else(T::nan);
    let a = stack.pop().unwrap_or_else(T::nan);
    stack.push(op(a, b));
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Unary(char, Box<Expr>),
    Call(String, Box<Expr>),
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    return Err(expression_error(format!(
                        "Unknown variable or parameter: {name}"
                    )));
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                let code = match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => return Err(expression_error(format!("Unknown binary operator: {op}"))),
                };
                ops.push(code);
            }
            Expr::Unary(op, operand) => {
                self.compile_recursive(operand, ops)?;
                match op {
                    '-' => ops.push(OpCode::Neg),
                    _ => return Err(expression_error(format!("Unknown unary operator: {op}"))),
                }
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                let function = Function::from_name(func)
                    .ok_or_else(|| expression_error(format!("Unknown function: {func}")))?;
                ops.push(OpCode::Call(function));
            }
        }
        Ok(())
    }
}

fn expression_error(message: String) -> anyhow::Error {
    ValleyError::Expression(message).into()
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        bail!(ValleyError::Expression(format!(
            "Unexpected trailing token {token:?}"
        )));
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

fn tokenize(input: &str) -> Result<Vec<Token>> {
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
                } else {
                    break;
                }
            }
            // Exponent part: 1e-3, 2.5E+4
            if let Some(&e) = chars.peek() {
                if e == 'e' || e == 'E' {
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut exponent = String::from("e");
                    if let Some(&sign) = lookahead.peek() {
                        if sign == '+' || sign == '-' {
                            exponent.push(sign);
                            lookahead.next();
                        }
                    }
                    let mut has_digits = false;
                    while let Some(&d) = lookahead.peek() {
                        if d.is_ascii_digit() {
                            exponent.push(d);
                            lookahead.next();
                            has_digits = true;
                        } else {
                            break;
                        }
                    }
                    if has_digits {
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }
            }
            let value = num_str.parse::<f64>().map_err(|_| {
                expression_error(format!("Invalid number literal: {num_str}"))
            })?;
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
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(expression_error(format!("Unexpected character '{other}'"))),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => Err(expression_error("Expected ')'".to_string())),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        while let Some(token) = self.peek() {
            let op = match token {
                Token::Star => '*',
                Token::Slash => '/',
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    // Unary minus binds looser than '^', so -x^2 = -(x^2).
    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary('-', Box::new(expr)));
        }
        self.parse_power()
    }

    // Right associative: a^b^c = a^(b^c).
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some(token) => Err(expression_error(format!("Unexpected token {token:?}"))),
            None => Err(expression_error("Unexpected end of expression".to_string())),
        }
    }
}

// --- ExpressionObjective ---

/// A scalar objective compiled from a text expression.
///
/// Evaluates on any [`Scalar`], so it can be wrapped by either
/// differentiation provider. The VM stack is allocated per evaluation, which
/// keeps the objective `Sync` for parallel batch tracing.
#[derive(Debug, Clone)]
pub struct ExpressionObjective {
    pub code: Bytecode,
    pub params: Vec<f64>,
    pub var_names: Vec<String>,
    pub param_names: Vec<String>,
}

impl ExpressionObjective {
    pub fn compile(
        expression: &str,
        var_names: &[String],
        param_names: &[String],
        params: Vec<f64>,
    ) -> Result<Self> {
        if var_names.is_empty() {
            bail!(ValleyError::Expression(
                "Objective needs at least one variable.".to_string()
            ));
        }
        if param_names.len() != params.len() {
            bail!(ValleyError::Expression(format!(
                "Expected {} parameter values, got {}.",
                param_names.len(),
                params.len()
            )));
        }
        let expr = parse(expression)?;
        let compiler = Compiler::new(var_names, param_names);
        let code = compiler.compile(&expr)?;
        Ok(Self {
            code,
            params,
            var_names: var_names.to_vec(),
            param_names: param_names.to_vec(),
        })
    }

    pub fn set_param(&mut self, name: &str, value: f64) -> Result<()> {
        let idx = self
            .param_names
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| expression_error(format!("Unknown parameter: {name}")))?;
        self.params[idx] = value;
        Ok(())
    }
}

impl<T: Scalar> ScalarField<T> for ExpressionObjective {
    fn dimension(&self) -> usize {
        self.var_names.len()
    }

    fn evaluate(&self, x: &[T]) -> T {
        let params: Vec<T> = self
            .params
            .iter()
            .map(|&p| T::from_f64(p).unwrap_or_else(T::nan))
            .collect();
        let mut stack = Vec::with_capacity(self.code.ops.len());
        VM::execute(&self.code, x, &params, &mut stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivatives::AutoDiff;
    use crate::traits::Objective;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn eval(expr: &str, vars: &[f64]) -> f64 {
        let var_names: Vec<String> = (0..vars.len()).map(|i| format!("x{}", i + 1)).collect();
        let objective = ExpressionObjective::compile(expr, &var_names, &[], Vec::new())
            .expect("expression should compile");
        ScalarField::<f64>::evaluate(&objective, vars)
    }

    #[test]
    fn unary_minus_binds_looser_than_power() {
        assert!((eval("-x1^2", &[3.0]) + 9.0).abs() < 1e-12);
    }

    #[test]
    fn power_is_right_associative() {
        assert!((eval("2^3^2", &[0.0]) - 512.0).abs() < 1e-9);
    }

    #[test]
    fn precedence_and_functions() {
        let value = eval("1 + 2 * x1 - sqrt(x2) / 2", &[3.0, 16.0]);
        assert!((value - 5.0).abs() < 1e-12);
        assert!((eval("exp(ln(x1))", &[2.5]) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn scientific_literals_parse() {
        assert!((eval("x1 + 1e-3", &[1.0]) - 1.001).abs() < 1e-15);
        assert!((eval("2.5E+1", &[0.0]) - 25.0).abs() < 1e-12);
    }

    #[test]
    fn parameters_are_resolved_and_updatable() {
        let mut objective = ExpressionObjective::compile(
            "(x^2 + y^2 - 1)^2 + c",
            &names(&["x", "y"]),
            &names(&["c"]),
            vec![0.01],
        )
        .expect("compile");
        assert!((ScalarField::<f64>::evaluate(&objective, &[1.0, 0.0]) - 0.01).abs() < 1e-15);
        objective.set_param("c", 0.5).expect("known parameter");
        assert!((ScalarField::<f64>::evaluate(&objective, &[1.0, 0.0]) - 0.5).abs() < 1e-15);
        assert!(objective.set_param("missing", 1.0).is_err());
    }

    #[test]
    fn compile_errors_are_reported() {
        let vars = names(&["x"]);
        let unknown = ExpressionObjective::compile("x + z", &vars, &[], Vec::new())
            .expect_err("unknown identifier");
        assert!(format!("{unknown}").contains("Unknown variable or parameter: z"));
        assert!(matches!(
            unknown.downcast_ref::<ValleyError>(),
            Some(ValleyError::Expression(_))
        ));

        let func = ExpressionObjective::compile("foo(x)", &vars, &[], Vec::new())
            .expect_err("unknown function");
        assert!(format!("{func}").contains("Unknown function: foo"));

        let paren = parse("(x + 1").expect_err("missing paren");
        assert!(format!("{paren}").contains("Expected ')'"));

        let trailing = parse("x 1").expect_err("trailing token");
        assert!(format!("{trailing}").contains("trailing"));

        let character = parse("x # 2").expect_err("bad character");
        assert!(format!("{character}").contains("Unexpected character"));
    }

    #[test]
    fn compiled_objective_differentiates_with_autodiff() {
        let objective = ExpressionObjective::compile(
            "(x^2 + y^2 - 1)^2",
            &names(&["x", "y"]),
            &[],
            Vec::new(),
        )
        .expect("compile");
        let f = AutoDiff::new(objective);
        let x = [0.6, 0.9];
        let r = x[0] * x[0] + x[1] * x[1] - 1.0;
        let grad = f.gradient(&x);
        assert!((grad[0] - 4.0 * r * x[0]).abs() < 1e-12);
        let hess = f.hessian(&x);
        assert!((hess[(0, 1)] - 8.0 * x[0] * x[1]).abs() < 1e-12);
    }
}
