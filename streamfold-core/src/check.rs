//! Check expressions decide whether the currently buffered messages form a
//! complete batch. The batcher evaluates the compiled check against a
//! snapshot of the buffer after every append, positioned at the message
//! that was just appended. Evaluation errors are the batcher's problem (it
//! logs them and treats them as `false`); compilation errors fail batcher
//! construction.
//!
//! The built-in [`ComparisonCompiler`] understands single comparisons
//! (`payload == "END"`, `meta("kind") != "data"`,
//! `payload.contains("\u{4}")`). Anything richer belongs to a full mapping
//! language, which embedders plug in through
//! [`Registry::set_check_compiler`](crate::registry::Registry::set_check_compiler).

use std::borrow::Cow;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::message::Message;

/// A compiled check, evaluated over the buffered messages with `index`
/// pointing at the message appended last.
pub trait Check: Send + Sync {
    fn check(&self, parts: &[Message], index: usize) -> Result<bool>;
}

impl std::fmt::Debug for dyn Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn Check>")
    }
}

/// Compiles the `check` config string into an evaluator.
pub trait CheckCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn Check>>;
}

#[derive(Debug, Clone, PartialEq)]
enum Subject {
    Payload,
    Meta(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Cmp {
    Eq,
    Ne,
    Contains,
}

/// A single comparison of the current message's payload or one of its
/// metadata headers against a string literal.
struct ComparisonCheck {
    subject: Subject,
    cmp: Cmp,
    literal: String,
}

impl Check for ComparisonCheck {
    fn check(&self, parts: &[Message], index: usize) -> Result<bool> {
        let part = parts.get(index).ok_or_else(|| {
            Error::Check(format!(
                "index {index} out of range for a batch of {}",
                parts.len()
            ))
        })?;
        let value: Cow<'_, str> = match &self.subject {
            Subject::Payload => String::from_utf8_lossy(&part.value),
            Subject::Meta(key) => Cow::Borrowed(
                part.header(key)
                    .ok_or_else(|| Error::Check(format!("metadata key {key:?} is not set")))?,
            ),
        };
        Ok(match self.cmp {
            Cmp::Eq => value.as_ref() == self.literal,
            Cmp::Ne => value.as_ref() != self.literal,
            Cmp::Contains => value.contains(self.literal.as_str()),
        })
    }
}

/// The default check compiler: one comparison per expression.
///
/// Grammar: `<subject> == "lit"`, `<subject> != "lit"`, or
/// `<subject>.contains("lit")`, where `<subject>` is `payload` or
/// `meta("key")`. String literals do not support escapes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComparisonCompiler;

impl CheckCompiler for ComparisonCompiler {
    fn compile(&self, source: &str) -> Result<Arc<dyn Check>> {
        parse(source).map(|check| Arc::new(check) as Arc<dyn Check>)
    }
}

fn parse(source: &str) -> Result<ComparisonCheck> {
    let bad = |detail: &str| Error::BadCheck(format!("{detail} in {source:?}"));

    let s = source.trim();
    let (subject, rest) = if let Some(rest) = s.strip_prefix("payload") {
        (Subject::Payload, rest)
    } else if let Some(rest) = s.strip_prefix("meta(") {
        let (key, rest) = parse_quoted(rest, source)?;
        let rest = rest
            .trim_start()
            .strip_prefix(')')
            .ok_or_else(|| bad("expected ')' after meta key"))?;
        (Subject::Meta(key), rest)
    } else {
        return Err(bad("expected subject 'payload' or 'meta(\"key\")'"));
    };

    let rest = rest.trim_start();
    let (check, rest) = if let Some(rest) = rest.strip_prefix("==") {
        let (literal, rest) = parse_quoted(rest, source)?;
        (ComparisonCheck { subject, cmp: Cmp::Eq, literal }, rest)
    } else if let Some(rest) = rest.strip_prefix("!=") {
        let (literal, rest) = parse_quoted(rest, source)?;
        (ComparisonCheck { subject, cmp: Cmp::Ne, literal }, rest)
    } else if let Some(rest) = rest.strip_prefix(".contains(") {
        let (literal, rest) = parse_quoted(rest, source)?;
        let rest = rest
            .trim_start()
            .strip_prefix(')')
            .ok_or_else(|| bad("expected ')' after contains argument"))?;
        (
            ComparisonCheck {
                subject,
                cmp: Cmp::Contains,
                literal,
            },
            rest,
        )
    } else {
        return Err(bad("expected '==', '!=' or '.contains(...)'"));
    };

    if !rest.trim().is_empty() {
        return Err(bad("unexpected trailing input"));
    }
    Ok(check)
}

fn parse_quoted<'a>(s: &'a str, source: &str) -> Result<(String, &'a str)> {
    let rest = s
        .trim_start()
        .strip_prefix('"')
        .ok_or_else(|| Error::BadCheck(format!("expected a quoted string in {source:?}")))?;
    let end = rest
        .find('"')
        .ok_or_else(|| Error::BadCheck(format!("unterminated string literal in {source:?}")))?;
    Ok((rest[..end].to_string(), &rest[end + 1..]))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;

    use super::*;

    fn part(payload: &'static str) -> Message {
        Message {
            value: Bytes::from_static(payload.as_bytes()),
            ..Default::default()
        }
    }

    fn part_with_header(payload: &'static str, key: &str, value: &str) -> Message {
        Message {
            value: Bytes::from_static(payload.as_bytes()),
            headers: Arc::new(HashMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    fn compile(source: &str) -> Arc<dyn Check> {
        ComparisonCompiler.compile(source).unwrap()
    }

    #[test]
    fn test_payload_equality() {
        let check = compile(r#"payload == "END""#);
        let parts = vec![part("a"), part("END")];
        assert!(!check.check(&parts, 0).unwrap());
        assert!(check.check(&parts, 1).unwrap());
    }

    #[test]
    fn test_payload_inequality() {
        let check = compile(r#"payload != "keepalive""#);
        let parts = vec![part("keepalive"), part("data")];
        assert!(!check.check(&parts, 0).unwrap());
        assert!(check.check(&parts, 1).unwrap());
    }

    #[test]
    fn test_payload_contains() {
        let check = compile(r#"payload.contains("flush")"#);
        let parts = vec![part("please flush now")];
        assert!(check.check(&parts, 0).unwrap());
    }

    #[test]
    fn test_meta_comparison() {
        let check = compile(r#"meta("kind") == "terminator""#);
        let parts = vec![part_with_header("x", "kind", "terminator")];
        assert!(check.check(&parts, 0).unwrap());
    }

    #[test]
    fn test_meta_missing_key_is_an_error() {
        let check = compile(r#"meta("kind") == "terminator""#);
        let parts = vec![part("x")];
        let err = check.check(&parts, 0).unwrap_err();
        assert!(matches!(err, Error::Check(_)), "got {err:?}");
    }

    #[test]
    fn test_index_out_of_range_is_an_error() {
        let check = compile(r#"payload == "END""#);
        assert!(check.check(&[], 0).is_err());
    }

    #[test]
    fn test_compile_errors() {
        for source in [
            "",
            "payload",
            r#"payload = "END""#,
            r#"headers == "x""#,
            r#"meta(kind) == "x""#,
            r#"payload == "END" trailing"#,
            r#"payload == "unterminated"#,
            r#"payload.contains("x""#,
        ] {
            let err = ComparisonCompiler.compile(source).unwrap_err();
            assert!(matches!(err, Error::BadCheck(_)), "{source:?} gave {err:?}");
        }
    }
}
