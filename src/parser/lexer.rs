//! Lexer for the circuit description language using logos

use logos::Logos;

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Technology keywords
    #[token("primitive")]
    Primitive,
    #[token("port")]
    Port,
    #[token("arcproto")]
    ArcProto,

    // Cell contents
    #[token("cell")]
    Cell,
    #[token("node")]
    Node,
    #[token("arc")]
    Arc,
    #[token("export")]
    Export,
    #[token("at")]
    At,

    // Edit scripts
    #[token("batch")]
    Batch,
    #[token("move")]
    Move,
    #[token("rigid")]
    Rigid,
    #[token("flexible")]
    Flexible,

    // Arc operator (longer pattern first)
    #[token("--")]
    Dash,
    #[token("-")]
    Minus,

    // Delimiters
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("=")]
    Equals,

    // Literals - identifiers must come after keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    // Comments (skip)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,
}

/// Lex input string into tokens with spans. Every character the lexer
/// cannot read is reported, not skipped.
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, Vec<ParseError>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    for (tok, span) in Token::lexer(input).spanned() {
        match tok {
            Ok(tok) => tokens.push((tok, span)),
            Err(()) => errors.push(ParseError::Syntax {
                message: format!("Unexpected character '{}'", &input[span.clone()]),
                span,
                expected: Vec::new(),
            }),
        }
    }
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokens("primitive port arcproto cell node arc export at batch move rigid flexible"),
            vec![
                Token::Primitive,
                Token::Port,
                Token::ArcProto,
                Token::Cell,
                Token::Node,
                Token::Arc,
                Token::Export,
                Token::At,
                Token::Batch,
                Token::Move,
                Token::Rigid,
                Token::Flexible,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            tokens("cells arcs rigidity"),
            vec![
                Token::Ident("cells".to_string()),
                Token::Ident("arcs".to_string()),
                Token::Ident("rigidity".to_string()),
            ]
        );
    }

    #[test]
    fn test_dash_versus_minus() {
        assert_eq!(
            tokens("a.y -- b.p -0.5"),
            vec![
                Token::Ident("a".to_string()),
                Token::Dot,
                Token::Ident("y".to_string()),
                Token::Dash,
                Token::Ident("b".to_string()),
                Token::Dot,
                Token::Ident("p".to_string()),
                Token::Minus,
                Token::Number(0.5),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("10 2.5 1e-6"),
            vec![Token::Number(10.0), Token::Number(2.5), Token::Number(1e-6)]
        );
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            tokens("cell // comment\n/* block */ node"),
            vec![Token::Cell, Token::Node]
        );
    }

    #[test]
    fn test_spans() {
        let spans: Vec<_> = lex("node g1").unwrap().into_iter().map(|(_, s)| s).collect();
        assert_eq!(spans, vec![0..4, 5..7]);
    }

    #[test]
    fn test_unreadable_characters_are_errors() {
        let errors = lex("move top.a @ [dx: 1] #").unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].span(), &(11..12));
        let ParseError::Syntax { message, .. } = &errors[0];
        assert_eq!(message, "Unexpected character '@'");
        assert_eq!(errors[1].span(), &(21..22));
    }
}
