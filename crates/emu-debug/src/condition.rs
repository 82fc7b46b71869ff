//! Condition compiler and evaluator.

use thiserror::Error;

/// Capacity of the evaluation stack.
pub const STACK_SIZE: usize = 256;

/// One compiled condition token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Constant(i32),
    Add,
    Subtract,
    Multiply,
    /// Integer division; a zero divisor yields 0.
    Divide,
    And,
    Or,
    Xor,
}

impl Token {
    fn operator(text: &str) -> Option<Self> {
        Some(match text {
            "+" => Self::Add,
            "-" => Self::Subtract,
            "*" => Self::Multiply,
            "/" => Self::Divide,
            "&" => Self::And,
            "|" => Self::Or,
            "^" => Self::Xor,
            _ => return None,
        })
    }

    fn apply(self, lhs: i32, rhs: i32) -> i32 {
        match self {
            Self::Constant(value) => value,
            Self::Add => lhs.wrapping_add(rhs),
            Self::Subtract => lhs.wrapping_sub(rhs),
            Self::Multiply => lhs.wrapping_mul(rhs),
            Self::Divide => lhs.checked_div(rhs).unwrap_or(0),
            Self::And => lhs & rhs,
            Self::Or => lhs | rhs,
            Self::Xor => lhs ^ rhs,
        }
    }
}

/// Why a condition failed to compile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unknown token `{0}`")]
    UnknownToken(String),
    #[error("invalid number `{0}`")]
    BadNumber(String),
    #[error("operator at token {position} has fewer than two operands")]
    StackUnderflow { position: usize },
    #[error("expression needs more than 256 stack slots")]
    StackOverflow,
    #[error("expression leaves {0} values on the stack")]
    LeftoverOperands(usize),
}

/// A compiled, well-formed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    tokens: Vec<Token>,
}

fn parse_number(text: &str) -> Result<i32, ConditionError> {
    let bad = || ConditionError::BadNumber(text.to_string());
    let hex = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .or_else(|| text.strip_prefix('$'))
        .or_else(|| text.strip_prefix('&'));
    let value = match hex {
        Some(digits) => u32::from_str_radix(digits, 16).map_err(|_| bad())? as i32,
        None => text.parse::<i32>().map_err(|_| bad())?,
    };
    Ok(value)
}

impl Condition {
    /// Compile condition text.
    pub fn compile(text: &str) -> Result<Self, ConditionError> {
        let tokens = text
            .split_whitespace()
            .map(|word| {
                if let Some(op) = Token::operator(word) {
                    Ok(op)
                } else if word.starts_with(|c: char| c.is_ascii_digit() || c == '$' || c == '&') {
                    parse_number(word).map(Token::Constant)
                } else {
                    Err(ConditionError::UnknownToken(word.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tokens(text.trim(), tokens)
    }

    /// Wrap an already tokenised stream, checking it is well formed:
    /// every operator has two operands, the stack never exceeds
    /// [`STACK_SIZE`], and exactly one value remains.
    pub fn from_tokens(source: &str, tokens: Vec<Token>) -> Result<Self, ConditionError> {
        let mut depth = 0usize;
        for (position, token) in tokens.iter().enumerate() {
            if let Token::Constant(_) = token {
                depth += 1;
                if depth > STACK_SIZE {
                    return Err(ConditionError::StackOverflow);
                }
            } else if depth < 2 {
                return Err(ConditionError::StackUnderflow { position });
            } else {
                depth -= 1;
            }
        }
        if depth > 1 {
            return Err(ConditionError::LeftoverOperands(depth));
        }
        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// The text this condition was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Evaluate the expression. True when the result is non-zero; an
    /// empty condition is always true.
    #[must_use]
    pub fn evaluate(&self) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        self.value() != 0
    }

    /// The numeric result of the expression (0 for an empty condition).
    #[must_use]
    pub fn value(&self) -> i32 {
        let mut stack = [0i32; STACK_SIZE];
        let mut sp = 0usize;
        for &token in &self.tokens {
            if let Token::Constant(value) = token {
                stack[sp] = value;
                sp += 1;
            } else {
                sp -= 1;
                stack[sp - 1] = token.apply(stack[sp - 1], stack[sp]);
            }
        }
        stack[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_plus_two_is_true() {
        let condition = Condition::from_tokens(
            "1 2 +",
            vec![Token::Constant(1), Token::Constant(2), Token::Add],
        )
        .expect("well formed");
        assert_eq!(condition.value(), 3);
        assert!(condition.evaluate());
        assert_eq!(Condition::compile("1 2 +"), Ok(condition));
    }

    #[test]
    fn empty_is_true() {
        let condition = Condition::compile("   ").expect("empty compiles");
        assert!(condition.tokens().is_empty());
        assert!(condition.evaluate());
    }

    #[test]
    fn zero_result_is_false() {
        let condition = Condition::compile("5 5 -").expect("compiles");
        assert!(!condition.evaluate());
        let condition = Condition::compile("$F0 &0F &").expect("compiles");
        assert!(!condition.evaluate());
    }

    #[test]
    fn operators() {
        let cases = [
            ("6 7 *", 42),
            ("7 2 /", 3),
            ("7 0 /", 0),
            ("0x0C 0x0A &", 8),
            ("0x0C 0x0A |", 14),
            ("0x0C 0x0A ^", 6),
            ("1 2 3 + -", -4),
            ("0xFFFFFFFF 1 +", 0),
        ];
        for (text, expected) in cases {
            let condition = Condition::compile(text).expect(text);
            assert_eq!(condition.value(), expected, "{text}");
        }
    }

    #[test]
    fn malformed_streams_rejected() {
        assert_eq!(
            Condition::compile("1 +"),
            Err(ConditionError::StackUnderflow { position: 1 })
        );
        assert_eq!(Condition::compile("1 2"), Err(ConditionError::LeftoverOperands(2)));
        assert_eq!(
            Condition::compile("1 pc +"),
            Err(ConditionError::UnknownToken("pc".into()))
        );
        assert_eq!(
            Condition::compile("0xZZ"),
            Err(ConditionError::BadNumber("0xZZ".into()))
        );
    }

    #[test]
    fn stack_limit() {
        let full = vec!["1"; STACK_SIZE].join(" ") + &" +".repeat(STACK_SIZE - 1);
        assert!(Condition::compile(&full).is_ok());
        let over = vec!["1"; STACK_SIZE + 1].join(" ") + &" +".repeat(STACK_SIZE);
        assert_eq!(Condition::compile(&over), Err(ConditionError::StackOverflow));
    }
}
