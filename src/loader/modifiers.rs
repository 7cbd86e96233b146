//! Typed access to `[key: value]` modifier lists

use crate::parser::ast::{Identifier, Modifier, Span, Spanned, Value};

use super::error::LoadError;
use super::find_similar;

pub struct Modifiers<'a> {
    list: &'a [Spanned<Modifier>],
}

impl<'a> Modifiers<'a> {
    /// Reject unknown and repeated keys
    pub fn new(
        list: &'a [Spanned<Modifier>],
        target: &'static str,
        allowed: &[&str],
    ) -> Result<Self, LoadError> {
        for (i, m) in list.iter().enumerate() {
            let key = m.node.key.node.as_str();
            if !allowed.contains(&key) {
                return Err(LoadError::UnknownModifier {
                    key: key.to_string(),
                    target,
                    span: m.node.key.span.clone(),
                    suggestions: find_similar(allowed.iter().copied(), key, 3),
                });
            }
            if list[..i].iter().any(|prev| prev.node.key.node.as_str() == key) {
                return Err(LoadError::duplicate("modifier", key, m.node.key.span.clone()));
            }
        }
        Ok(Self { list })
    }

    fn get(&self, key: &str) -> Option<&'a Spanned<Modifier>> {
        self.list.iter().find(|m| m.node.key.node.as_str() == key)
    }

    pub fn span_of(&self, key: &str) -> Option<Span> {
        self.get(key).map(|m| m.span.clone())
    }

    /// A bare `key`
    pub fn flag(&self, key: &str) -> Result<bool, LoadError> {
        match self.get(key) {
            None => Ok(false),
            Some(m) => match &m.node.value {
                None => Ok(true),
                Some(v) => Err(LoadError::invalid(key, "no value", v.span.clone())),
            },
        }
    }

    fn value(&self, key: &str) -> Result<Option<&'a Spanned<Value>>, LoadError> {
        match self.get(key) {
            None => Ok(None),
            Some(m) => m
                .node
                .value
                .as_ref()
                .map(Some)
                .ok_or_else(|| LoadError::invalid(key, "a value", m.span.clone())),
        }
    }

    pub fn number(&self, key: &str) -> Result<Option<f64>, LoadError> {
        match self.value(key)? {
            None => Ok(None),
            Some(Spanned {
                node: Value::Number(n),
                ..
            }) => Ok(Some(*n)),
            Some(v) => Err(LoadError::invalid(key, "a number", v.span.clone())),
        }
    }

    /// An angle in whole tenths of a degree
    pub fn angle(&self, key: &str) -> Result<Option<i32>, LoadError> {
        let Some(n) = self.number(key)? else {
            return Ok(None);
        };
        let rounded = n.round();
        if (n - rounded).abs() > 1e-9 || rounded.abs() > i32::MAX as f64 {
            let span = self.span_of(key).unwrap_or_default();
            return Err(LoadError::invalid(key, "a whole number of tenths of a degree", span));
        }
        Ok(Some(rounded as i32))
    }

    pub fn pair(&self, key: &str) -> Result<Option<(f64, f64)>, LoadError> {
        match self.value(key)? {
            None => Ok(None),
            Some(Spanned {
                node: Value::Pair(x, y),
                ..
            }) => Ok(Some((*x, *y))),
            Some(v) => Err(LoadError::invalid(key, "a pair '(x, y)'", v.span.clone())),
        }
    }

    pub fn name(&self, key: &str) -> Result<Option<Spanned<&'a Identifier>>, LoadError> {
        match self.value(key)? {
            None => Ok(None),
            Some(Spanned {
                node: Value::Name(id),
                span,
            }) => Ok(Some(Spanned::new(id, span.clone()))),
            Some(v) => Err(LoadError::invalid(key, "a name", v.span.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, Statement};

    fn arc_proto_modifiers(src: &str) -> Vec<Spanned<Modifier>> {
        let doc = parse(src).expect("Should parse");
        match doc.statements.into_iter().next().map(|s| s.node) {
            Some(Statement::ArcProto(a)) => a.modifiers,
            _ => panic!("Expected arcproto"),
        }
    }

    #[test]
    fn test_typed_access() {
        let list = arc_proto_modifiers("arcproto m [width: 2, pin: p, pos: (1, -2), bare]");
        let mods = Modifiers::new(&list, "arc prototype", &["width", "pin", "pos", "bare", "other"]).unwrap();
        assert_eq!(mods.number("width").unwrap(), Some(2.0));
        assert_eq!(mods.name("pin").unwrap().map(|n| n.node.as_str()), Some("p"));
        assert_eq!(mods.pair("pos").unwrap(), Some((1.0, -2.0)));
        assert!(mods.flag("bare").unwrap());
        assert!(!mods.flag("other").unwrap());
        assert_eq!(mods.number("other").unwrap(), None);
    }

    #[test]
    fn test_wrong_value_kind() {
        let list = arc_proto_modifiers("arcproto m [width: wide, bare: 1]");
        let mods = Modifiers::new(&list, "arc prototype", &["width", "bare"]).unwrap();
        assert!(matches!(
            mods.number("width"),
            Err(LoadError::InvalidValue { expected: "a number", .. })
        ));
        assert!(matches!(
            mods.flag("bare"),
            Err(LoadError::InvalidValue { expected: "no value", .. })
        ));
    }

    #[test]
    fn test_unknown_key_suggests_close_match() {
        let list = arc_proto_modifiers("arcproto m [widht: 2]");
        let err = Modifiers::new(&list, "arc prototype", &["width", "pin"]).err().unwrap();
        match err {
            LoadError::UnknownModifier { key, suggestions, .. } => {
                assert_eq!(key, "widht");
                assert_eq!(suggestions, vec!["width".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_repeated_key_rejected() {
        let list = arc_proto_modifiers("arcproto m [width: 2, width: 3]");
        assert!(matches!(
            Modifiers::new(&list, "arc prototype", &["width"]),
            Err(LoadError::Duplicate { kind: "modifier", .. })
        ));
    }

    #[test]
    fn test_fractional_angle_rejected() {
        let list = arc_proto_modifiers("arcproto m [angle: 45.5]");
        let mods = Modifiers::new(&list, "arc prototype", &["angle"]).unwrap();
        assert!(mods.angle("angle").is_err());
    }
}
