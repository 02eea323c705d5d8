//! Formula parser: tokens to a tagged AST
//!
//! Precedence, loosest first:
//!
//! ```text
//! c ? a : b   ||   &&   == !=   < <= > >=   + -   * / %   - + !   .member call()
//! ```

use chumsky::{input::ValueInput, pratt::*, prelude::*};

use super::lexer::{Span, Spanned, Token};
use super::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `new Class(args)`
    Construct {
        class: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

/// Deepest accepted nesting of groups, conditionals and prefix operators
pub const MAX_NESTING: usize = 32;

/// Longest accepted formula, in tokens
pub const MAX_TOKENS: usize = 256;

pub fn parse(tokens: &[Spanned<'_>], eoi: usize) -> Result<Expr, EvalError> {
    if tokens.is_empty() {
        return Err(EvalError::EmptyFormula);
    }
    check_shape(tokens)?;

    let input = tokens.map(Span::from(eoi..eoi), |(token, span)| (token, span));
    expression()
        .then_ignore(end())
        .parse(input)
        .into_result().map_err(|errors| {
        errors
            .first()
            .map(parse_error)
            .unwrap_or(EvalError::UnexpectedEnd)
    })
}

fn expression<'tokens, 'src: 'tokens, I>()
-> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token<'src>, Span>>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = Span>,
{
    recursive(|expression| {
        let arguments = expression
            .clone()
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let identifier = select! { Token::Identifier(name) => name };

        let literal = select! {
            Token::Number(n) => Expr::Number(n),
            Token::Text(s) => Expr::Text(s.to_string()),
            Token::Identifier("true") => Expr::Bool(true),
            Token::Identifier("false") => Expr::Bool(false),
        };

        let construct = just(Token::Identifier("new"))
            .ignore_then(identifier.clone())
            .then(arguments.clone().or_not())
            .map(|(class, args): (&str, Option<Vec<Expr>>)| Expr::Construct {
                class: class.to_string(),
                args: args.unwrap_or_default(),
            });

        let name = identifier.clone().map(|name: &str| Expr::Name(name.to_string()));

        let nested = expression
            .clone()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let atom = choice((literal, construct, name, nested));

        let binary = atom.pratt((
            postfix(
                9,
                just(Token::Dot).ignore_then(identifier),
                |object, property: &str, _| Expr::Member {
                    object: Box::new(object),
                    property: property.to_string(),
                },
            ),
            postfix(9, arguments, |callee, args, _| Expr::Call {
                callee: Box::new(callee),
                args,
            }),
            prefix(
                8,
                select! {
                    Token::Minus => UnaryOp::Negate,
                    Token::Plus => UnaryOp::Plus,
                    Token::Bang => UnaryOp::Not,
                },
                |op, operand, _| Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
            ),
            infix(
                left(6),
                select! {
                    Token::Asterisk => BinaryOp::Multiply,
                    Token::Slash => BinaryOp::Divide,
                    Token::Percent => BinaryOp::Remainder,
                },
                |lhs, op, rhs, _| fold(op, lhs, rhs),
            ),
            infix(
                left(5),
                select! {
                    Token::Plus => BinaryOp::Add,
                    Token::Minus => BinaryOp::Subtract,
                },
                |lhs, op, rhs, _| fold(op, lhs, rhs),
            ),
            infix(
                left(4),
                select! {
                    Token::Less => BinaryOp::Less,
                    Token::LessOrEqual => BinaryOp::LessOrEqual,
                    Token::Greater => BinaryOp::Greater,
                    Token::GreaterOrEqual => BinaryOp::GreaterOrEqual,
                },
                |lhs, op, rhs, _| fold(op, lhs, rhs),
            ),
            infix(
                left(3),
                select! {
                    Token::Equal => BinaryOp::Equal,
                    Token::NotEqual => BinaryOp::NotEqual,
                },
                |lhs, op, rhs, _| fold(op, lhs, rhs),
            ),
            infix(left(2), just(Token::And).to(BinaryOp::And), |lhs, op, rhs, _| {
                fold(op, lhs, rhs)
            }),
            infix(left(1), just(Token::Or).to(BinaryOp::Or), |lhs, op, rhs, _| {
                fold(op, lhs, rhs)
            }),
        ));

        // `c ? a : b` binds loosest and nests to the right
        binary
            .then(
                just(Token::Question)
                    .ignore_then(expression.clone())
                    .then_ignore(just(Token::Colon))
                    .then(expression)
                    .or_not(),
            )
            .map(|(condition, branches)| match branches {
                Some((then, otherwise)) => Expr::Conditional {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
                None => condition,
            })
    })
}

fn fold(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

fn parse_error(error: &Rich<'_, Token<'_>, Span>) -> EvalError {
    match error.found() {
        Some(token) => EvalError::UnexpectedToken {
            found: token.to_string(),
            pos: error.span().start,
        },
        None => EvalError::UnexpectedEnd,
    }
}

/// Reject formulas whose tree would nest deeper than [`MAX_NESTING`] or
/// that exceed [`MAX_TOKENS`]. Parsing, evaluation and drop all recurse
/// over the tree, so both are bounded before any of them runs.
fn check_shape(tokens: &[Spanned<'_>]) -> Result<(), EvalError> {
    let mut groups = 0usize;
    let mut conditionals = 0usize;
    let mut prefix_run = 0usize;
    let mut previous: Option<&Token<'_>> = None;

    for (token, _) in tokens {
        let is_prefix = match token {
            Token::Bang => true,
            Token::Minus | Token::Plus => !ends_operand(previous),
            _ => false,
        };
        prefix_run = if is_prefix { prefix_run + 1 } else { 0 };
        match token {
            Token::ParenOpen => groups += 1,
            Token::ParenClose => groups = groups.saturating_sub(1),
            Token::Question => conditionals += 1,
            _ => {}
        }
        if groups + conditionals + prefix_run > MAX_NESTING {
            return Err(EvalError::TooDeep(MAX_NESTING));
        }
        previous = Some(token);
    }

    if tokens.len() > MAX_TOKENS {
        return Err(EvalError::TooLong(tokens.len()));
    }
    Ok(())
}

/// Whether a `+`/`-` after `previous` is binary
fn ends_operand(previous: Option<&Token<'_>>) -> bool {
    matches!(
        previous,
        Some(Token::Number(_) | Token::Text(_) | Token::Identifier(_) | Token::ParenClose)
    )
}

#[cfg(test)]
mod tests {
    use super::super::lexer::tokenize;
    use super::*;

    fn parse_str(src: &str) -> Result<Expr, EvalError> {
        parse(&tokenize(src)?, src.len())
    }

    fn num(n: f64) -> Box<Expr> {
        Box::new(Expr::Number(n))
    }

    #[test]
    fn test_precedence() {
        let expr = parse_str("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: num(1.0),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Multiply,
                    lhs: num(2.0),
                    rhs: num(3.0),
                }),
            }
        );
    }

    #[test]
    fn test_left_associative() {
        let expr = parse_str("8 - 4 - 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Subtract,
                lhs: Box::new(Expr::Binary {
                    op: BinaryOp::Subtract,
                    lhs: num(8.0),
                    rhs: num(4.0),
                }),
                rhs: num(2.0),
            }
        );
    }

    #[test]
    fn test_nested_ternary_is_right_associative() {
        let expr = parse_str("a ? 1 : b ? 2 : 3").unwrap();
        let Expr::Conditional { otherwise, .. } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*otherwise, Expr::Conditional { .. }));
    }

    #[test]
    fn test_age_formula_shape() {
        let expr = parse_str(
            "Math.floor((DOB ? (Date.now() - new Date(DOB).getTime()) / 3.15576e+10 : 0))",
        )
        .unwrap();
        let Expr::Call { callee, args } = expr else {
            panic!("expected call");
        };
        assert_eq!(
            *callee,
            Expr::Member {
                object: Box::new(Expr::Name("Math".into())),
                property: "floor".into(),
            }
        );
        assert_eq!(args.len(), 1);
        assert!(matches!(args[0], Expr::Conditional { .. }));
    }

    #[test]
    fn test_construct_without_args() {
        assert_eq!(
            parse_str("new Date").unwrap(),
            Expr::Construct { class: "Date".into(), args: vec![] }
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_str(""), Err(EvalError::EmptyFormula)));
        assert!(matches!(parse_str("   "), Err(EvalError::EmptyFormula)));
        assert!(matches!(parse_str("1 2"), Err(EvalError::UnexpectedToken { pos: 2, .. })));
        assert!(parse_str("1 +").is_err());
        assert!(parse_str("(1").is_err());
        assert!(parse_str("a ? 1").is_err());
        assert!(parse_str("f(1,)").is_err());
        assert!(parse_str("1.2.3").is_err());
    }

    #[test]
    fn test_unary_binds_tighter_than_binary() {
        assert_eq!(
            parse_str("-a * 2").unwrap(),
            Expr::Binary {
                op: BinaryOp::Multiply,
                lhs: Box::new(Expr::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(Expr::Name("a".into())),
                }),
                rhs: num(2.0),
            }
        );
        assert_eq!(
            parse_str("1 - -2").unwrap(),
            Expr::Binary {
                op: BinaryOp::Subtract,
                lhs: num(1.0),
                rhs: Box::new(Expr::Unary { op: UnaryOp::Negate, operand: num(2.0) }),
            }
        );
    }

    #[test]
    fn test_moderate_nesting_parses() {
        let src = format!("{}1{}", "(".repeat(16), ")".repeat(16));
        assert_eq!(parse_str(&src).unwrap(), Expr::Number(1.0));
        assert!(parse_str(&format!("{}x", "!".repeat(16))).is_ok());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let n = 10_000;
        let parens = format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(parse_str(&parens), Err(EvalError::TooDeep(MAX_NESTING)));

        let minus = format!("{}1", "-".repeat(n));
        assert_eq!(parse_str(&minus), Err(EvalError::TooDeep(MAX_NESTING)));

        let bangs = format!("{}x", "!".repeat(n));
        assert_eq!(parse_str(&bangs), Err(EvalError::TooDeep(MAX_NESTING)));

        let ternaries = "a ? 1 : ".repeat(n) + "0";
        assert_eq!(parse_str(&ternaries), Err(EvalError::TooDeep(MAX_NESTING)));
    }

    #[test]
    fn test_binary_minus_does_not_count_as_nesting() {
        let src = vec!["1"; 100].join(" - ");
        assert!(parse_str(&src).is_ok());
    }

    #[test]
    fn test_long_formula_is_rejected() {
        let src = vec!["1"; MAX_TOKENS].join(" + ");
        assert!(matches!(parse_str(&src), Err(EvalError::TooLong(_))));
    }
}
