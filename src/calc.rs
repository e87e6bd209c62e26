//! Deterministic arithmetic for calculation tasks.
//!
//! Grammar (recursive descent, usual precedence, `^` right-associative):
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/' | '%') factor)*
//! factor := unary ('^' factor)?
//! unary  := ('-' | '+') unary | atom
//! atom   := number | '(' expr ')'
//! ```
//!
//! Numbers may contain `_` or `,` digit separators and a trailing `%`,
//! which divides by 100. Parentheses, unary signs and `^` chains may nest at
//! most [`MAX_DEPTH`] levels deep.

use anyhow::{bail, Result};

/// Deepest nesting the parser will recurse into.
pub const MAX_DEPTH: usize = 64;

/// Evaluate an arithmetic expression.
pub fn evaluate(expression: &str) -> Result<f64> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        bail!("empty expression");
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some(tok) = parser.peek() {
        bail!("unexpected token {:?} in '{}'", tok, expression);
    }
    if !value.is_finite() {
        bail!("expression '{}' does not evaluate to a finite number", expression);
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => i += 1,
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while i < chars.len() && matches!(chars[i], '0'..='9' | '.' | '_' | ',') {
                    if chars[i].is_ascii_digit() || chars[i] == '.' {
                        literal.push(chars[i]);
                    }
                    i += 1;
                }
                let mut value: f64 = match literal.parse() {
                    Ok(v) => v,
                    Err(_) => bail!("invalid number '{}'", literal),
                };
                if i < chars.len() && chars[i] == '%' {
                    value /= 100.0;
                    i += 1;
                }
                tokens.push(Token::Num(value));
            }
            '+' | '-' | '*' | '/' | '%' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => bail!("unexpected character '{}'", other),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.peek();
        self.pos += 1;
        tok
    }

    /// Run `parse` one nesting level deeper.
    fn nested(&mut self, parse: fn(&mut Self) -> Result<f64>) -> Result<f64> {
        if self.depth >= MAX_DEPTH {
            bail!("expression nested deeper than {} levels", MAX_DEPTH);
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => bail!("division by zero"),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64> {
        let base = self.unary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.nested(Self::factor)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.nested(Self::unary)?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64> {
        match self.next() {
            Some(Token::Num(v)) => Ok(v),
            Some(Token::LParen) => {
                let value = self.nested(Self::expr)?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => bail!("missing closing parenthesis"),
                }
            }
            Some(tok) => bail!("unexpected token {:?}", tok),
            None => bail!("unexpected end of expression"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(expr: &str, expected: f64) {
        let got = evaluate(expr).unwrap();
        assert!((got - expected).abs() < 1e-9, "{} = {}, expected {}", expr, got, expected);
    }

    #[test]
    fn test_precedence() {
        approx("1 + 2 * 3", 7.0);
        approx("(1 + 2) * 3", 9.0);
        approx("10 - 4 - 3", 3.0);
        approx("2 ^ 3 ^ 2", 512.0);
    }

    #[test]
    fn test_unary_and_decimals() {
        approx("-2.5 * -2", 5.0);
        approx("+.5 + 1", 1.5);
    }

    #[test]
    fn test_percent_and_separators() {
        approx("250,000 * 0.75%", 1875.0);
        approx("1_000 / 8", 125.0);
    }

    #[test]
    fn test_modulo() {
        approx("17 % 5", 2.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("").is_err());
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1 + + ").is_err());
        assert!(evaluate("2 apples").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let wrap = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        approx(&wrap(MAX_DEPTH), 1.0);
        approx(&format!("{}1", "-".repeat(10)), 1.0);

        for expr in [
            wrap(1000),
            format!("{}1", "-".repeat(1000)),
            format!("{}2", "2 ^ ".repeat(1000)),
        ] {
            let err = evaluate(&expr).unwrap_err();
            assert!(err.to_string().contains("nested deeper than"), "{}", err);
        }
    }
}
