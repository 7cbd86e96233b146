//! Error types for parsing

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::parser::lexer::Token;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    pub fn span(&self) -> &Span {
        match self {
            ParseError::Syntax { span, .. } => span,
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let ParseError::Syntax {
            span,
            message,
            expected,
        } = self;
        let detail = if expected.is_empty() {
            message.clone()
        } else {
            format!("{}\nExpected: {}", message, expected.join(", "))
        };
        render_report(source, filename, span, message, &detail)
    }
}

/// Render a single-label error report; falls back to the bare message if
/// the report cannot be written
pub fn render_report(source: &str, filename: &str, span: &Span, message: &str, label: &str) -> String {
    let mut buf = Vec::new();
    let written = Report::build(ReportKind::Error, filename, span.start)
        .with_message(message)
        .with_label(
            Label::new((filename, span.clone()))
                .with_message(label)
                .with_color(Color::Red),
        )
        .finish()
        .write((filename, Source::from(source)), &mut buf);
    match written {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(_) => format!("{}: {}", filename, message),
    }
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { .. } => match err.found() {
                Some(tok) if keyword_text(tok).is_some() => format!(
                    "Unexpected {} - keywords cannot be used as names",
                    format_token(tok)
                ),
                Some(tok) => format!("Unexpected {}", format_token(tok)),
                None => "Unexpected end of input".to_string(),
            },
            RichReason::Custom(msg) => msg.to_string(),
            #[allow(unreachable_patterns)]
            _ => "Unexpected input".to_string(),
        };

        let mut expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of input".to_string()),
                RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                RichPattern::Any => Some("any token".to_string()),
                RichPattern::SomethingElse => None,
            })
            .collect();
        expected.sort();
        expected.dedup();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

fn keyword_text(tok: &Token) -> Option<&'static str> {
    Some(match tok {
        Token::Primitive => "primitive",
        Token::Port => "port",
        Token::ArcProto => "arcproto",
        Token::Cell => "cell",
        Token::Node => "node",
        Token::Arc => "arc",
        Token::Export => "export",
        Token::At => "at",
        Token::Batch => "batch",
        Token::Move => "move",
        Token::Rigid => "rigid",
        Token::Flexible => "flexible",
        _ => return None,
    })
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    if let Some(keyword) = keyword_text(tok) {
        return format!("keyword '{}'", keyword);
    }
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Number(n) => format!("number {}", n),
        Token::Dash => "'--'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Equals => "'='".to_string(),
        _ => format!("{:?}", tok),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_error_names_found_token() {
        let errs = parse("cell top { node g1 gate }").unwrap_err();
        let ParseError::Syntax { message, .. } = &errs[0];
        assert!(message.contains("identifier 'gate'"), "{}", message);
    }

    #[test]
    fn test_keyword_misuse_is_explained() {
        let errs = parse("cell node { }").unwrap_err();
        let ParseError::Syntax { message, .. } = &errs[0];
        assert!(message.contains("keyword 'node'"), "{}", message);
        assert!(message.contains("cannot be used as names"), "{}", message);
    }

    #[test]
    fn test_format_includes_source_line() {
        let src = "cell top {\n  node g1 gate\n}";
        let errs = parse(src).unwrap_err();
        let rendered = errs[0].format(src, "demo.cct");
        assert!(rendered.contains("demo.cct"));
        assert!(rendered.contains("node g1"));
    }

    #[test]
    fn test_unexpected_end_of_input() {
        let errs = parse("cell top {").unwrap_err();
        let ParseError::Syntax { message, .. } = &errs[0];
        assert!(message.contains("end of input"), "{}", message);
    }
}
