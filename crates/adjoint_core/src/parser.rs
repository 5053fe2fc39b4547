//! Infix expression front end.
//!
//! Parses strings such as `"x*y + sin(x)^2"` into an AST and lowers it onto a
//! [`Graph`], creating one placeholder per distinct identifier. Constant
//! subexpressions are folded during lowering since the graph has no constant
//! leaves.

use crate::graph::{Graph, NodeId, Operand};
use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // char is operator +, -, *, /, ^
    Negate(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Result of [`parse_expression`].
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    pub root: NodeId,
    /// Placeholder created for each identifier, by name.
    pub variables: BTreeMap<String, NodeId>,
}

/// Parses `input` and builds it into `graph` with fresh placeholders.
pub fn parse_expression(graph: &mut Graph, input: &str) -> Result<ParsedExpression> {
    let mut variables = BTreeMap::new();
    let root = parse_with_variables(graph, input, &mut variables)?;
    Ok(ParsedExpression { root, variables })
}

/// Parses `input` and builds it into `graph`, reusing placeholders already
/// present in `variables` so several expressions can share inputs.
pub fn parse_with_variables(
    graph: &mut Graph,
    input: &str,
    variables: &mut BTreeMap<String, NodeId>,
) -> Result<NodeId> {
    let expr = parse(input).with_context(|| format!("Failed to parse `{}`", input))?;
    let start_len = graph.len();
    let known = variables.clone();
    let mut builder = Builder {
        graph: &mut *graph,
        variables: &mut *variables,
    };
    let lowered = builder
        .lower(&expr)
        .with_context(|| format!("Failed to build `{}`", input));

    // Nodes built before a lowering error are unreachable; discard them.
    let failure = match lowered {
        Ok(Operand::Node(root)) => return Ok(root),
        Ok(Operand::Const(value)) => Err(anyhow!(
            "Expression `{}` is the constant {} and has no variables.",
            input,
            value
        )),
        Err(err) => Err(err),
    };
    graph.truncate(start_len);
    *variables = known;
    failure
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        bail!("Unexpected trailing token {:?}", token);
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
            // Exponent suffix: 1e-3, 2.5E+4. A bare `e` is left for the identifier branch.
            if let Some(&e @ ('e' | 'E')) = chars.peek() {
                let mut ahead = chars.clone();
                ahead.next();
                let sign = ahead.next_if(|&d| d == '+' || d == '-');
                if ahead.peek().is_some_and(|d| d.is_ascii_digit()) {
                    num_str.push(e);
                    num_str.extend(sign);
                    chars = ahead;
                    while let Some(d) = chars.next_if(|d| d.is_ascii_digit()) {
                        num_str.push(d);
                    }
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| anyhow!("Invalid number literal `{}`", num_str))?;
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
                _ => bail!("Unexpected character `{}`", c),
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

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(expr)));
        }
        self.parse_power()
    }

    // Right-associative, binds tighter than unary minus: -x^2 == -(x^2).
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
                    self.consume(); // eat '('
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
            Some(token) => bail!("Unexpected token {:?}", token),
            None => bail!("Unexpected end of input"),
        }
    }

    fn expect_rparen(&mut self) -> Result<()> {
        match self.consume() {
            Some(Token::RParen) => Ok(()),
            _ => bail!("Expected ')'"),
        }
    }
}

/// Lowers an [`Expr`] onto a graph. Resolves identifiers to placeholders.
struct Builder<'a> {
    graph: &'a mut Graph,
    variables: &'a mut BTreeMap<String, NodeId>,
}

impl Builder<'_> {
    fn lower(&mut self, expr: &Expr) -> Result<Operand> {
        match expr {
            Expr::Number(n) => Ok(Operand::Const(*n)),
            Expr::Variable(name) => {
                let graph = &mut *self.graph;
                let id = *self
                    .variables
                    .entry(name.clone())
                    .or_insert_with(|| graph.variable(name.as_str()));
                Ok(Operand::Node(id))
            }
            Expr::Negate(inner) => match self.lower(inner)? {
                Operand::Node(a) => Ok(Operand::Node(self.graph.neg(a)?)),
                Operand::Const(c) => Ok(Operand::Const(-c)),
            },
            Expr::Binary(left, op, right) => {
                let left = self.lower(left)?;
                let right = self.lower(right)?;
                self.binary(left, *op, right)
            }
            Expr::Call(func, arg) => {
                let arg = self.lower(arg)?;
                self.call(func, arg)
            }
        }
    }

    fn binary(&mut self, left: Operand, op: char, right: Operand) -> Result<Operand> {
        use Operand::{Const, Node};

        let g = &mut *self.graph;
        let id = match (left, op, right) {
            (Const(a), _, Const(b)) => return Ok(Const(fold_binary(a, op, b)?)),
            (Node(a), '+', b) => g.add(a, b)?,
            (Const(a), '+', Node(b)) => g.add(b, a)?,
            (Node(a), '*', b) => g.mul(a, b)?,
            (Const(a), '*', Node(b)) => g.mul(b, a)?,
            (Node(a), '-', b) => g.sub(a, b)?,
            (Const(a), '-', Node(b)) => g.rsub(b, a)?,
            (Node(a), '/', b) => g.div(a, b)?,
            (Const(a), '/', Node(b)) => g.rdiv(b, a)?,
            (Node(a), '^', Const(c)) => g.pow(a, c)?,
            (Const(base), '^', Node(x)) => g.exp_base(base, x)?,
            (Node(_), '^', Node(_)) => {
                bail!("Exponents must be constants or have a constant base")
            }
            (_, op, _) => bail!("Unknown binary operator: {}", op),
        };
        Ok(Node(id))
    }

    fn call(&mut self, func: &str, arg: Operand) -> Result<Operand> {
        let a = match arg {
            Operand::Const(c) => return Ok(Operand::Const(fold_call(func, c)?)),
            Operand::Node(a) => a,
        };
        let g = &mut *self.graph;
        let id = match func {
            "sin" => g.sin(a)?,
            "cos" => g.cos(a)?,
            "tan" => g.tan(a)?,
            "sinh" => g.sinh(a)?,
            "cosh" => g.cosh(a)?,
            "tanh" => g.tanh(a)?,
            "asin" | "arcsin" => g.arcsin(a)?,
            "acos" | "arccos" => g.arccos(a)?,
            "atan" | "arctan" => g.arctan(a)?,
            "exp" => g.exp(a)?,
            "ln" | "log" => g.ln(a)?,
            "sqrt" => g.sqrt(a)?,
            "logistic" => g.logistic(a)?,
            _ => bail!("Unknown function: {}", func),
        };
        Ok(Operand::Node(id))
    }
}

fn fold_binary(a: f64, op: char, b: f64) -> Result<f64> {
    Ok(match op {
        '+' => a + b,
        '-' => a - b,
        '*' => a * b,
        '/' => a / b,
        '^' => a.powf(b),
        _ => bail!("Unknown binary operator: {}", op),
    })
}

fn fold_call(func: &str, c: f64) -> Result<f64> {
    Ok(match func {
        "sin" => c.sin(),
        "cos" => c.cos(),
        "tan" => c.tan(),
        "sinh" => c.sinh(),
        "cosh" => c.cosh(),
        "tanh" => c.tanh(),
        "asin" | "arcsin" => c.asin(),
        "acos" | "arccos" => c.acos(),
        "atan" | "arctan" => c.atan(),
        "exp" => c.exp(),
        "ln" | "log" => c.ln(),
        "sqrt" => c.sqrt(),
        "logistic" => 1.0 / (1.0 + (-c).exp()),
        _ => bail!("Unknown function: {}", func),
    })
}
