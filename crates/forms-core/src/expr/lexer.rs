//! Formula tokenizer

use chumsky::error::RichReason;
use chumsky::prelude::*;
use std::fmt;

use super::EvalError;

pub type Span = SimpleSpan;

/// Token with its byte span in the formula
pub type Spanned<'src> = (Token<'src>, Span);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'src> {
    Number(f64),
    Text(&'src str),
    Identifier(&'src str),
    ParenOpen,
    ParenClose,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Bang,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::Identifier(name) => write!(f, "{}", name),
            Self::ParenOpen => write!(f, "("),
            Self::ParenClose => write!(f, ")"),
            Self::Comma => write!(f, ","),
            Self::Dot => write!(f, "."),
            Self::Question => write!(f, "?"),
            Self::Colon => write!(f, ":"),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Asterisk => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Percent => write!(f, "%"),
            Self::Bang => write!(f, "!"),
            Self::Equal => write!(f, "=="),
            Self::NotEqual => write!(f, "!="),
            Self::Less => write!(f, "<"),
            Self::LessOrEqual => write!(f, "<="),
            Self::Greater => write!(f, ">"),
            Self::GreaterOrEqual => write!(f, ">="),
            Self::And => write!(f, "&&"),
            Self::Or => write!(f, "||"),
        }
    }
}

pub fn lexer<'src>()
-> impl Parser<'src, &'src str, Vec<Spanned<'src>>, extra::Err<Rich<'src, char, Span>>> {
    // 12, 1.5, .5, 1., 3.15576e+10
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));
    let number = choice((
        text::digits(10)
            .then(just('.').then(text::digits(10).or_not()).or_not())
            .ignored(),
        just('.').then(text::digits(10)).ignored(),
    ))
    .then(exponent.or_not())
    .to_slice()
    .try_map(|literal: &str, span| {
        literal
            .parse()
            .map(Token::Number)
            .map_err(|_| Rich::custom(span, literal))
    });

    let text = choice((
        just('\'')
            .ignore_then(none_of('\'').repeated().to_slice())
            .then_ignore(just('\'')),
        just('"')
            .ignore_then(none_of('"').repeated().to_slice())
            .then_ignore(just('"')),
    ))
    .map(Token::Text);

    let identifier = any()
        .filter(|c: &char| c.is_alphabetic() || *c == '_' || *c == '$')
        .then(
            any()
                .filter(|c: &char| c.is_alphanumeric() || *c == '_' || *c == '$')
                .repeated(),
        )
        .to_slice()
        .map(Token::Identifier);

    // `==` and `===` are the same loose equality
    let operator = choice((
        just("===").to(Token::Equal),
        just("!==").to(Token::NotEqual),
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just("<=").to(Token::LessOrEqual),
        just(">=").to(Token::GreaterOrEqual),
        just("&&").to(Token::And),
        just("||").to(Token::Or),
        just('<').to(Token::Less),
        just('>').to(Token::Greater),
        just('!').to(Token::Bang),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
        just('?').to(Token::Question),
        just(':').to(Token::Colon),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just('(').to(Token::ParenOpen),
        just(')').to(Token::ParenClose),
    ));

    let token = choice((number, text, identifier, operator))
        .map_with(|token, extra| (token, extra.span()));

    text::whitespace()
        .ignore_then(token.then_ignore(text::whitespace()).repeated().collect())
        .then_ignore(end())
}

pub fn tokenize(src: &str) -> Result<Vec<Spanned<'_>>, EvalError> {
    lexer().parse(src).into_result().map_err(|errors| {
        errors
            .first()
            .map(lex_error)
            .unwrap_or(EvalError::UnexpectedEnd)
    })
}

fn lex_error(error: &Rich<'_, char, Span>) -> EvalError {
    match (error.reason(), error.found()) {
        (RichReason::Custom(literal), _) => EvalError::InvalidNumber(literal.to_string()),
        (_, Some(ch)) => EvalError::UnexpectedChar {
            ch: *ch,
            pos: error.span().start,
        },
        (_, None) => EvalError::UnexpectedEnd,
    }
}
