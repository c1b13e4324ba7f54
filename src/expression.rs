//! Lazy arithmetic expression tree for aperture macros.

use std::collections::HashMap;

use crate::units::Unit;
use crate::GerberError;

/// Arithmetic operator. Gerber macro source uses `x` for multiplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, l: f64, r: f64) -> f64 {
        match self {
            Op::Add => l + r,
            Op::Sub => l - r,
            Op::Mul => l * r,
            Op::Div => l / r,
        }
    }

    fn to_gerber(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => 'x',
            Op::Div => '/',
        }
    }

    fn is_commutative(self) -> bool {
        matches!(self, Op::Add | Op::Mul)
    }
}

/// A node in the aperture-macro expression tree: a constant, a `$n`
/// variable reference, or a binary operator over two sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Constant(f64),
    Variable(u32),
    Operator(Op, Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn constant(v: f64) -> Self {
        Expression::Constant(v)
    }

    pub fn variable(n: u32) -> Self {
        Expression::Variable(n)
    }

    pub fn op(op: Op, l: Expression, r: Expression) -> Self {
        Expression::Operator(op, Box::new(l), Box::new(r))
    }

    /// Recursively fold constants under `binding`, canonicalizing the
    /// operand order of commutative operators so structurally equal
    /// expressions always serialize identically (testable property #7).
    /// The original Python canonicalizes by `id()` (object-identity hash),
    /// which is not meaningful in Rust; this canonicalizes by the operands'
    /// own Gerber serialization instead, which is deterministic and achieves
    /// the same goal.
    pub fn optimized(&self, binding: &HashMap<u32, f64>) -> Expression {
        match self {
            Expression::Constant(_) => self.clone(),
            Expression::Variable(n) => match binding.get(n) {
                Some(&v) => Expression::Constant(v),
                None => self.clone(),
            },
            Expression::Operator(op, l, r) => {
                let mut l = l.optimized(binding);
                let mut r = r.optimized(binding);

                if op.is_commutative() && r.to_gerber(None) < l.to_gerber(None) {
                    std::mem::swap(&mut l, &mut r);
                }

                if let (Expression::Constant(lv), Expression::Constant(rv)) = (&l, &r) {
                    return Expression::Constant(op.apply(*lv, *rv));
                }

                Expression::Operator(*op, Box::new(l), Box::new(r))
            }
        }
    }

    /// Fully evaluate to a scalar. Fails if unresolved variables remain.
    pub fn calculate(&self, binding: &HashMap<u32, f64>) -> Result<f64, GerberError> {
        match self.optimized(binding) {
            Expression::Constant(v) => Ok(v),
            other => Err(GerberError::Syntax(format!(
                "cannot fully resolve aperture macro expression due to unresolved variables: {}",
                other.to_gerber(None)
            ))),
        }
    }

    /// Re-serialize to Gerber macro syntax. `unit` is accepted for parity
    /// with `UnitExpression::to_gerber` call sites but is unused by plain
    /// expressions (only `UnitExpression` carries a unit to convert under).
    pub fn to_gerber(&self, _unit: Option<Unit>) -> String {
        match self {
            Expression::Constant(v) => format_constant(*v),
            Expression::Variable(n) => format!("${n}"),
            Expression::Operator(op, l, r) => {
                let lval = l.to_gerber(None);
                let rval = r.to_gerber(None);
                let lval = if matches!(**l, Expression::Operator(..)) {
                    format!("({lval})")
                } else {
                    lval
                };
                let rval = if matches!(**r, Expression::Operator(..)) {
                    format!("({rval})")
                } else {
                    rval
                };
                format!("{lval}{}{rval}", op.to_gerber())
            }
        }
    }
}

fn format_constant(v: f64) -> String {
    let s = format!("{v:.6}");
    let s = s.trim_end_matches('0');
    let s = s.trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

impl std::ops::Add for Expression {
    type Output = Expression;
    fn add(self, rhs: Expression) -> Expression {
        Expression::op(Op::Add, self, rhs).optimized(&HashMap::new())
    }
}

impl std::ops::Sub for Expression {
    type Output = Expression;
    fn sub(self, rhs: Expression) -> Expression {
        Expression::op(Op::Sub, self, rhs).optimized(&HashMap::new())
    }
}

impl std::ops::Mul for Expression {
    type Output = Expression;
    fn mul(self, rhs: Expression) -> Expression {
        Expression::op(Op::Mul, self, rhs).optimized(&HashMap::new())
    }
}

impl std::ops::Neg for Expression {
    type Output = Expression;
    fn neg(self) -> Expression {
        Expression::Constant(0.0) - self
    }
}

/// An `Expression` tagged with the unit its value is expressed in.
/// Arithmetic between `UnitExpression`s enforces unit compatibility:
/// addition/subtraction require both sides to carry a unit (converting via
/// the 25.4 mm/inch factor if they differ); multiplication/division accept a
/// bare scalar right-hand side and preserve the left side's unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitExpression {
    pub expr: Expression,
    pub unit: Option<Unit>,
}

impl UnitExpression {
    pub fn new(expr: Expression, unit: Option<Unit>) -> Self {
        UnitExpression { expr, unit }
    }

    pub fn converted(&self, unit: Option<Unit>) -> Expression {
        match (self.unit, unit) {
            (None, _) | (_, None) => self.expr.clone(),
            (Some(a), Some(b)) if a == b => self.expr.clone(),
            (Some(a), Some(b)) => {
                let factor = a.convert_to(b, 1.0);
                Expression::op(Op::Mul, self.expr.clone(), Expression::Constant(factor))
            }
        }
    }

    pub fn to_gerber(&self, unit: Option<Unit>) -> String {
        self.converted(unit).optimized(&HashMap::new()).to_gerber(None)
    }

    pub fn add(&self, other: &UnitExpression) -> Result<UnitExpression, GerberError> {
        let unit = match (self.unit, other.unit) {
            (Some(a), Some(b)) if a != b => Some(a),
            (a, b) => a.or(b),
        };
        let rhs = match (self.unit, other.unit) {
            (Some(a), Some(b)) if a != b => {
                let factor = b.convert_to(a, 1.0);
                Expression::op(Op::Mul, other.expr.clone(), Expression::Constant(factor))
            }
            _ => other.expr.clone(),
        };
        Ok(UnitExpression::new(Expression::op(Op::Add, self.expr.clone(), rhs), unit))
    }

    pub fn scalar_mul(&self, factor: f64) -> UnitExpression {
        UnitExpression::new(
            Expression::op(Op::Mul, self.expr.clone(), Expression::Constant(factor)),
            self.unit,
        )
    }

    pub fn scalar_div(&self, factor: f64) -> UnitExpression {
        UnitExpression::new(
            Expression::op(Op::Div, self.expr.clone(), Expression::Constant(factor)),
            self.unit,
        )
    }
}

/// Parse aperture-macro arithmetic source: lowercase, `x` -> `*`, `$n` ->
/// a variable token, standard precedence (unary +/-, then * /, then + -),
/// left-associative.
pub fn parse_expression(src: &str) -> Result<Expression, GerberError> {
    let lowered = src.to_ascii_lowercase().replace('x', "*");
    let mut parser = ExprParser::new(&lowered)?;
    let expr = parser.parse_additive()?;
    parser.skip_ws();
    if parser.pos != parser.tokens.len() {
        return Err(GerberError::Syntax(format!("invalid aperture macro expression {src:?}")));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable(u32),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn new(src: &str) -> Result<Self, GerberError> {
        Ok(ExprParser { tokens: tokenize(src)?, pos: 0 })
    }

    fn skip_ws(&self) {}

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_additive(&mut self) -> Result<Expression, GerberError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expression::op(Op::Add, lhs, rhs);
                }
                Some(Token::Minus) => {
                    self.bump();
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expression::op(Op::Sub, lhs, rhs);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, GerberError> {
        let mut lhs = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    lhs = Expression::op(Op::Mul, lhs, rhs);
                }
                Some(Token::Slash) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    lhs = Expression::op(Op::Div, lhs, rhs);
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression, GerberError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.bump();
                self.parse_unary()
            }
            Some(Token::Minus) => {
                self.bump();
                let inner = self.parse_unary()?;
                Ok(Expression::op(Op::Sub, Expression::Constant(0.0), inner))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Expression, GerberError> {
        match self.bump() {
            Some(Token::Number(v)) => Ok(Expression::Constant(v)),
            Some(Token::Variable(n)) => Ok(Expression::Variable(n)),
            Some(Token::LParen) => {
                let inner = self.parse_additive()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(GerberError::Syntax("unbalanced parentheses in macro expression".into())),
                }
            }
            _ => Err(GerberError::Syntax("invalid aperture macro expression".into())),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<Token>, GerberError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '+' {
            tokens.push(Token::Plus);
            i += 1;
        } else if c == '-' {
            tokens.push(Token::Minus);
            i += 1;
        } else if c == '*' {
            tokens.push(Token::Star);
            i += 1;
        } else if c == '/' {
            tokens.push(Token::Slash);
            i += 1;
        } else if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '$' {
            let start = i + 1;
            let mut j = start;
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            if j == start {
                return Err(GerberError::Syntax("invalid variable reference in macro expression".into()));
            }
            let n: u32 = chars[start..j].iter().collect::<String>().parse().unwrap();
            tokens.push(Token::Variable(n));
            i = j;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            let mut j = i;
            while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                j += 1;
            }
            let s: String = chars[start..j].iter().collect();
            let v: f64 = s
                .parse()
                .map_err(|_| GerberError::Syntax(format!("invalid number {s:?} in macro expression")))?;
            tokens.push(Token::Number(v));
            i = j;
        } else {
            return Err(GerberError::Syntax(format!("unexpected character {c:?} in macro expression")));
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constant_formatting_strips_trailing_zeros() {
        assert_eq!(Expression::Constant(2.5).to_gerber(None), "2.5");
        assert_eq!(Expression::Constant(2.0).to_gerber(None), "2");
    }

    #[test]
    fn operator_serialization_parenthesizes_operator_children() {
        let inner = Expression::op(Op::Add, Expression::Constant(1.0), Expression::Constant(2.0));
        let outer = Expression::op(Op::Mul, inner, Expression::Constant(3.0));
        assert_eq!(outer.to_gerber(None), "(1+2)x3");
    }

    #[test]
    fn parse_and_evaluate_variable_expression() {
        let expr = parse_expression("$1+2x3").unwrap();
        let mut binding = HashMap::new();
        binding.insert(1, 4.0);
        assert_eq!(expr.calculate(&binding).unwrap(), 10.0);
    }

    #[test]
    fn unresolved_variable_calculate_fails() {
        let expr = parse_expression("$1").unwrap();
        assert!(expr.calculate(&HashMap::new()).is_err());
    }

    #[test]
    fn unit_expression_converts_mm_to_inch() {
        let ue = UnitExpression::new(Expression::Constant(25.4), Some(Unit::Millimeter));
        let converted = ue.converted(Some(Unit::Inch));
        let value = converted.calculate(&HashMap::new()).unwrap();
        assert!((value - 1.0).abs() < 1e-9);
    }
}
