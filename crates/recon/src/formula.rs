//! Difference-formula parser and evaluator.
//!
//! Formulas reference named quantities (the canonical manual/system
//! totals, their legacy aliases, and pivot category columns) and combine
//! them with `+ - * /` and parentheses. The formula is parsed once per run
//! into a small AST; variable names are matched at lex time against the
//! known-variable set, longest name first, so no name can be mangled
//! inside another. No string is ever substituted or executed.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    Empty,
    /// A character that is not an operator, number or known variable.
    UnexpectedChar(char),
    UnexpectedEnd,
    UnexpectedToken(String),
    UnknownVariable(String),
    DivideByZero,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty formula"),
            Self::UnexpectedChar(c) => write!(f, "unexpected character '{c}'"),
            Self::UnexpectedEnd => write!(f, "formula ends unexpectedly"),
            Self::UnexpectedToken(t) => write!(f, "unexpected token {t}"),
            Self::UnknownVariable(name) => write!(f, "unknown variable '{name}'"),
            Self::DivideByZero => write!(f, "division by zero"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// A parsed difference formula, ready to evaluate per row.
#[derive(Debug, Clone)]
pub struct DiffFormula {
    expr: Expr,
}

impl DiffFormula {
    /// Parse `source` against the set of recognized variable names.
    pub fn parse(source: &str, variables: &[String]) -> Result<Self, FormulaError> {
        let tokens = tokenize(source, variables)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }
        let (expr, pos) = parse_add_sub(&tokens, 0)?;
        if pos != tokens.len() {
            return Err(FormulaError::UnexpectedToken(describe(&tokens[pos])));
        }
        Ok(Self { expr })
    }

    /// Evaluate against a row's variable table.
    pub fn eval(&self, variables: &HashMap<String, f64>) -> Result<f64, FormulaError> {
        eval_expr(&self.expr, variables)
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(n) => format!("number {n}"),
        Token::Variable(name) => format!("variable '{name}'"),
        Token::Plus => "'+'".into(),
        Token::Minus => "'-'".into(),
        Token::Star => "'*'".into(),
        Token::Slash => "'/'".into(),
        Token::LParen => "'('".into(),
        Token::RParen => "')'".into(),
    }
}

fn tokenize(input: &str, variables: &[String]) -> Result<Vec<Token>, FormulaError> {
    // Longest name first, so a variable can never swallow a prefix of a
    // longer one that also matches here.
    let mut names: Vec<&str> = variables
        .iter()
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .collect();
    names.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    names.dedup();

    let mut tokens = Vec::new();
    let mut rest = input;

    'scan: while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        // Variables take precedence over everything: they are an explicit,
        // known set and may start with a digit.
        for name in &names {
            if rest.starts_with(name) {
                tokens.push(Token::Variable((*name).to_string()));
                rest = &rest[name.len()..];
                continue 'scan;
            }
        }

        match c {
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '0'..='9' | '.' => {
                let end = rest
                    .find(|ch: char| !ch.is_ascii_digit() && ch != '.')
                    .unwrap_or(rest.len());
                let number: f64 = rest[..end]
                    .parse()
                    .map_err(|_| FormulaError::UnexpectedChar(c))?;
                tokens.push(Token::Number(number));
                rest = &rest[end..];
                continue 'scan;
            }
            other => return Err(FormulaError::UnexpectedChar(other)),
        }
        rest = &rest[1..];
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser (recursive descent, precedence: +- then */ then unary/primary)
// ---------------------------------------------------------------------------

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;
    while pos < tokens.len() {
        let op = match tokens[pos] {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            _ => break,
        };
        let (right, next) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = next;
    }
    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaError> {
    let (mut left, mut pos) = parse_unary(tokens, pos)?;
    while pos < tokens.len() {
        let op = match tokens[pos] {
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            _ => break,
        };
        let (right, next) = parse_unary(tokens, pos + 1)?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = next;
    }
    Ok((left, pos))
}

fn parse_unary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaError> {
    match tokens.get(pos) {
        Some(Token::Minus) => {
            let (inner, next) = parse_unary(tokens, pos + 1)?;
            Ok((Expr::Negate(Box::new(inner)), next))
        }
        Some(Token::Plus) => parse_unary(tokens, pos + 1),
        _ => parse_primary(tokens, pos),
    }
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), FormulaError> {
    match tokens.get(pos) {
        None => Err(FormulaError::UnexpectedEnd),
        Some(Token::Number(n)) => Ok((Expr::Number(*n), pos + 1)),
        Some(Token::Variable(name)) => Ok((Expr::Variable(name.clone()), pos + 1)),
        Some(Token::LParen) => {
            let (inner, next) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(next) {
                Some(Token::RParen) => Ok((inner, next + 1)),
                Some(other) => Err(FormulaError::UnexpectedToken(describe(other))),
                None => Err(FormulaError::UnexpectedEnd),
            }
        }
        Some(other) => Err(FormulaError::UnexpectedToken(describe(other))),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval_expr(expr: &Expr, variables: &HashMap<String, f64>) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Variable(name) => variables
            .get(name)
            .copied()
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone())),
        Expr::Negate(inner) => Ok(-eval_expr(inner, variables)?),
        Expr::Binary { op, left, right } => {
            let left = eval_expr(left, variables)?;
            let right = eval_expr(right, variables)?;
            match op {
                BinOp::Add => Ok(left + right),
                BinOp::Sub => Ok(left - right),
                BinOp::Mul => Ok(left * right),
                BinOp::Div => {
                    if right == 0.0 {
                        // Falls back to the default difference, like every
                        // other formula failure.
                        Err(FormulaError::DivideByZero)
                    } else {
                        Ok(left / right)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn eval(source: &str, variables: &[(&str, f64)]) -> Result<f64, FormulaError> {
        let names: Vec<String> = variables.iter().map(|(k, _)| k.to_string()).collect();
        DiffFormula::parse(source, &names)?.eval(&vars(variables))
    }

    #[test]
    fn subtracts_pivot_category_from_total() {
        let result = eval(
            "手工数量 - (系统总计 - 已关闭)",
            &[("手工数量", 200.0), ("系统总计", 150.0), ("已关闭", 50.0)],
        );
        assert_eq!(result, Ok(100.0));
    }

    #[test]
    fn precedence_and_parens() {
        assert_eq!(eval("2 + 3 * 4", &[]), Ok(14.0));
        assert_eq!(eval("(2 + 3) * 4", &[]), Ok(20.0));
        assert_eq!(eval("10 - 4 - 3", &[]), Ok(3.0));
        assert_eq!(eval("12 / 3 / 2", &[]), Ok(2.0));
    }

    #[test]
    fn unary_sign() {
        assert_eq!(eval("-5 + 8", &[]), Ok(3.0));
        assert_eq!(eval("3 - -2", &[]), Ok(5.0));
        assert_eq!(eval("-(1 + 2)", &[]), Ok(-3.0));
        assert_eq!(eval("+4", &[]), Ok(4.0));
    }

    #[test]
    fn longest_variable_name_wins() {
        // "已关闭" must not be matched inside "已关闭待审"
        let result = eval(
            "已关闭待审 - 已关闭",
            &[("已关闭", 10.0), ("已关闭待审", 25.0)],
        );
        assert_eq!(result, Ok(15.0));
    }

    #[test]
    fn variable_names_may_start_with_digits() {
        assert_eq!(eval("3PL + 1", &[("3PL", 9.0)]), Ok(10.0));
    }

    #[test]
    fn rejects_unknown_words() {
        let err = DiffFormula::parse("manual_quantity - fudge", &names(&["manual_quantity"]));
        assert!(matches!(err, Err(FormulaError::UnexpectedChar('f'))));
    }

    #[test]
    fn rejects_function_syntax_and_separators() {
        let variables = names(&["manual_quantity", "system_total"]);
        assert!(DiffFormula::parse("sum(manual_quantity)", &variables).is_err());
        assert!(DiffFormula::parse("manual_quantity; system_total", &variables).is_err());
        assert!(DiffFormula::parse("manual_quantity > system_total", &variables).is_err());
    }

    #[test]
    fn rejects_unbalanced_parens() {
        assert!(matches!(
            DiffFormula::parse("(1 + 2", &[]),
            Err(FormulaError::UnexpectedEnd)
        ));
        assert!(matches!(
            DiffFormula::parse("1 + 2)", &[]),
            Err(FormulaError::UnexpectedToken(_))
        ));
    }

    #[test]
    fn rejects_empty_and_dangling_operator() {
        assert!(matches!(DiffFormula::parse("", &[]), Err(FormulaError::Empty)));
        assert!(matches!(DiffFormula::parse("   ", &[]), Err(FormulaError::Empty)));
        assert!(matches!(
            DiffFormula::parse("1 +", &[]),
            Err(FormulaError::UnexpectedEnd)
        ));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(
            eval("1 / (2 - 2)", &[]),
            Err(FormulaError::DivideByZero)
        );
        assert_eq!(eval("10 / 4", &[]), Ok(2.5));
    }

    #[test]
    fn missing_variable_value_is_an_error() {
        let formula = DiffFormula::parse("qty", &names(&["qty"])).unwrap();
        assert_eq!(
            formula.eval(&HashMap::new()),
            Err(FormulaError::UnknownVariable("qty".into()))
        );
    }
}
