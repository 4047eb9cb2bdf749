//! JSON conversion of values

use crate::builtins::json::{Escape, Serializer};
use crate::value::Value;

/// Serialize `value` as JSON text
///
/// Strings escape `"`, `\`, `/` and the short escapes `\n \r \t \b \f`;
/// every other character, non-ASCII included, is written as is. A value
/// without a JSON form (`undefined`, a function) gives `null`. When
/// serialization throws, the exception is reported like any other and the
/// result is empty.
pub fn to_json(value: &Value) -> Vec<u8> {
    let raw = value.raw().clone();
    let text = value
        .engine()
        .execute(value.realm(), |interp| Serializer::new(Escape::Binding).serialize(interp, raw));
    match text {
        Some(Some(text)) => text.into_bytes(),
        Some(None) => b"null".to_vec(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;

    #[test]
    fn test_object_round_trip() {
        let engine = Engine::new();
        let text = r#"{"a":1,"b":2,"c":"xyz","e":true,"f":false,"g":null,"h":[4,5,6]}"#;
        let value = engine.parse_json(text).unwrap();
        assert_eq!(to_json(&value), text.as_bytes());
    }

    #[test]
    fn test_string_escapes_round_trip() {
        let engine = Engine::new();
        let text = r#""\"\/\r\n\t\b\\""#;
        let value = engine.parse_json(text).unwrap();
        assert_eq!(value.to_string(), "\"/\r\n\t\u{8}\\");
        assert_eq!(to_json(&value), text.as_bytes());
    }

    #[test]
    fn test_non_ascii_passes_through() {
        let engine = Engine::new();
        let context = engine.new_context(None);
        context.scope(|scope| {
            let value = scope.eval("({ '中文字段': 'é\\u0001' })").unwrap();
            assert_eq!(to_json(&value), "{\"中文字段\":\"é\u{1}\"}".as_bytes());
        });
    }

    #[test]
    fn test_values_without_json_form() {
        let engine = Engine::new();
        assert_eq!(to_json(&engine.undefined()), b"null");
        let context = engine.new_context(None);
        context.scope(|scope| {
            let function = scope.eval("(function () {})").unwrap();
            assert_eq!(to_json(&function), b"null");
            let cyclic = scope.eval("var o = {}; o.self = o; o").unwrap();
            let message = scope.try_catch(false, |_| assert!(to_json(&cyclic).is_empty()));
            assert!(message.starts_with("TypeError"), "{}", message);
        });
    }
}
