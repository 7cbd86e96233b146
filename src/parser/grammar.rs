//! Parser implementation using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::parser::ast::*;
use crate::parser::lexer::Token;

/// Parse circuit description source into an AST
pub fn parse(input: &str) -> Result<Document, Vec<crate::ParseError>> {
    let len = input.len();

    let tokens = crate::parser::lexer::lex(input)?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    // Split (Token, SimpleSpan) into token and span parts
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    document_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn document_parser<'a, I>() -> impl Parser<'a, I, Document, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let identifier = select! {
        Token::Ident(s) => Identifier::new(s),
    }
    .map_with(|id, e| Spanned::new(id, span_range(&e.span())));

    let number = select! {
        Token::Number(n) => n,
    };

    // Numbers (including negative via Minus token)
    let signed = just(Token::Minus)
        .or_not()
        .then(number)
        .map(|(neg, n)| if neg.is_some() { -n } else { n });

    let pair = signed
        .clone()
        .then_ignore(just(Token::Comma))
        .then(signed.clone())
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

    // `rigid` and `flexible` are keywords in batches but plain flags on arcs
    let modifier_key = choice((
        identifier.clone(),
        just(Token::Rigid)
            .map_with(|_, e| Spanned::new(Identifier::new("rigid"), span_range(&e.span()))),
        just(Token::Flexible)
            .map_with(|_, e| Spanned::new(Identifier::new("flexible"), span_range(&e.span()))),
    ));

    let value = choice((
        pair.clone().map(|(x, y)| Value::Pair(x, y)),
        signed.clone().map(Value::Number),
        identifier.clone().map(|id| Value::Name(id.node)),
    ))
    .map_with(|v, e| Spanned::new(v, span_range(&e.span())));

    let modifier = modifier_key
        .then(just(Token::Colon).ignore_then(value).or_not())
        .map_with(|(key, value), e| Spanned::new(Modifier { key, value }, span_range(&e.span())));

    let modifiers = modifier
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
        .or_not()
        .map(|m| m.unwrap_or_default());

    // Technology
    let port_decl = just(Token::Port)
        .ignore_then(identifier.clone())
        .then(modifiers.clone())
        .map_with(|(name, modifiers), e| {
            Spanned::new(PortDecl { name, modifiers }, span_range(&e.span()))
        });

    let primitive_decl = just(Token::Primitive)
        .ignore_then(identifier.clone())
        .then(modifiers.clone())
        .then(
            port_decl
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
                .or_not(),
        )
        .map(|((name, modifiers), ports)| PrimitiveDecl {
            name,
            modifiers,
            ports: ports.unwrap_or_default(),
        });

    let arc_proto_decl = just(Token::ArcProto)
        .ignore_then(identifier.clone())
        .then(modifiers.clone())
        .map(|(name, modifiers)| ArcProtoDecl { name, modifiers });

    // Cell contents
    let port_ref = identifier
        .clone()
        .then(just(Token::Dot).ignore_then(identifier.clone()).or_not())
        .map(|(node, port)| PortRef { node, port });

    let node_decl = just(Token::Node)
        .ignore_then(identifier.clone())
        .then_ignore(just(Token::Colon))
        .then(identifier.clone())
        .then(
            just(Token::At)
                .ignore_then(pair.clone().map_with(|p, e| Spanned::new(p, span_range(&e.span()))))
                .or_not(),
        )
        .then(modifiers.clone())
        .map(|(((name, proto), at), modifiers)| NodeDecl {
            name,
            proto,
            at,
            modifiers,
        });

    let arc_decl = just(Token::Arc)
        .ignore_then(identifier.clone().then_ignore(just(Token::Colon)).or_not())
        .then(identifier.clone())
        .then(port_ref.clone())
        .then_ignore(just(Token::Dash))
        .then(port_ref.clone())
        .then(modifiers.clone())
        .map(|((((name, proto), head), tail), modifiers)| ArcDecl {
            name,
            proto,
            head,
            tail,
            modifiers,
        });

    let export_decl = just(Token::Export)
        .ignore_then(identifier.clone())
        .then_ignore(just(Token::Equals))
        .then(port_ref)
        .map(|(name, target)| ExportDecl { name, target });

    let cell_item = choice((
        node_decl.map(CellItem::Node),
        arc_decl.map(CellItem::Arc),
        export_decl.map(CellItem::Export),
    ))
    .map_with(|item, e| Spanned::new(item, span_range(&e.span())));

    let cell_decl = just(Token::Cell)
        .ignore_then(identifier.clone())
        .then(modifiers.clone())
        .then(
            cell_item
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
        )
        .map(|((name, modifiers), items)| CellDecl {
            name,
            modifiers,
            items,
        });

    // Edit scripts
    let qualified = identifier
        .clone()
        .then_ignore(just(Token::Dot))
        .then(identifier)
        .map(|(cell, item)| QualifiedName { cell, item });

    let batch_item = choice((
        just(Token::Move)
            .ignore_then(qualified.clone())
            .then(modifiers)
            .map(|(target, modifiers)| BatchItem::Move { target, modifiers }),
        just(Token::Rigid)
            .ignore_then(qualified.clone())
            .map(BatchItem::Rigid),
        just(Token::Flexible)
            .ignore_then(qualified)
            .map(BatchItem::Flexible),
    ))
    .map_with(|item, e| Spanned::new(item, span_range(&e.span())));

    let batch_decl = just(Token::Batch)
        .ignore_then(
            batch_item
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::BraceOpen), just(Token::BraceClose)),
        )
        .map(|items| BatchDecl { items });

    let statement = choice((
        primitive_decl.map(Statement::Primitive),
        arc_proto_decl.map(Statement::ArcProto),
        cell_decl.map(Statement::Cell),
        batch_decl.map(Statement::Batch),
    ))
    .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
    .boxed();

    statement
        .repeated()
        .collect()
        .then_ignore(end())
        .map(|statements| Document { statements })
}
