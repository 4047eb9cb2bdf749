//! Regular expression support
//!
//! Patterns use JavaScript syntax and are translated to the `regex` crate's
//! dialect. The translation keeps JavaScript's ASCII meaning of `\d` and
//! `\w` and rejects features `regex` does not implement (backreferences and
//! lookaround) instead of silently matching something else.

use regex::{Regex, RegexBuilder};

use crate::runtime::JSString;

/// Compiled regular expression
#[derive(Debug)]
pub struct RegExpData {
    pub source: JSString,
    pub flags: JSString,
    pub regex: Regex,
    pub global: bool,
    pub ignore_case: bool,
    pub multiline: bool,
    pub sticky: bool,
}

impl RegExpData {
    /// Compile `source` with the given flag string
    pub fn new(source: &str, flags: &str) -> Result<Self, String> {
        let mut global = false;
        let mut ignore_case = false;
        let mut multiline = false;
        let mut dot_all = false;
        let mut sticky = false;
        let mut unicode = false;
        for c in flags.chars() {
            let seen = match c {
                'g' => std::mem::replace(&mut global, true),
                'i' => std::mem::replace(&mut ignore_case, true),
                'm' => std::mem::replace(&mut multiline, true),
                's' => std::mem::replace(&mut dot_all, true),
                'y' => std::mem::replace(&mut sticky, true),
                'u' => std::mem::replace(&mut unicode, true),
                _ => true,
            };
            if seen {
                return Err(format!("Invalid flags supplied to RegExp constructor '{}'", flags));
            }
        }

        let translated = translate(source).map_err(|e| invalid(source, &e))?;
        let regex = RegexBuilder::new(&translated)
            .case_insensitive(ignore_case)
            .multi_line(multiline)
            .dot_matches_new_line(dot_all)
            .build()
            .map_err(|e| invalid(source, &first_line(&e.to_string())))?;

        Ok(RegExpData {
            source: JSString::from(if source.is_empty() { "(?:)" } else { source }),
            flags: JSString::from(flags),
            regex,
            global,
            ignore_case,
            multiline,
            sticky,
        })
    }
}

fn invalid(source: &str, reason: &str) -> String {
    format!("Invalid regular expression: /{}/: {}", source, reason)
}

fn first_line(s: &str) -> String {
    s.lines()
        .rev()
        .find(|l| l.starts_with("error:"))
        .map(|l| l.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| s.lines().next().unwrap_or_default().to_string())
}

/// Length of a `{n}`, `{n,}` or `{n,m}` quantifier starting at `rest[0] == '{'`
fn quantifier_len(rest: &[char]) -> Option<usize> {
    let mut i = 1;
    let digits_start = i;
    while i < rest.len() && rest[i].is_ascii_digit() {
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    if i < rest.len() && rest[i] == ',' {
        i += 1;
        while i < rest.len() && rest[i].is_ascii_digit() {
            i += 1;
        }
    }
    (i < rest.len() && rest[i] == '}').then_some(i + 1)
}

fn hex_value(digits: &[char]) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    digits
        .iter()
        .try_fold(0u32, |acc, c| Some(acc.checked_mul(16)? + c.to_digit(16)?))
}

/// Translate a JavaScript pattern into `regex` syntax
pub fn translate(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut in_class = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' => {
                let Some(&e) = chars.get(i) else {
                    return Err("\\ at end of pattern".to_string());
                };
                i += 1;
                match e {
                    'd' => out.push_str(if in_class { "0-9" } else { "[0-9]" }),
                    'D' => out.push_str(if in_class { "\\D" } else { "[^0-9]" }),
                    'w' => out.push_str(if in_class { "0-9A-Za-z_" } else { "[0-9A-Za-z_]" }),
                    'W' => out.push_str(if in_class { "\\W" } else { "[^0-9A-Za-z_]" }),
                    's' | 'S' | 'n' | 'r' | 't' | 'f' | 'v' => {
                        out.push('\\');
                        out.push(e);
                    }
                    'b' if in_class => out.push_str("\\x08"),
                    'b' | 'B' => {
                        out.push('\\');
                        out.push(e);
                    }
                    '0' => out.push_str("\\x00"),
                    '1'..='9' | 'k' => return Err("backreferences are not supported".to_string()),
                    'u' if chars.get(i) == Some(&'{') => {
                        let close = chars[i..].iter().position(|c| *c == '}');
                        match close.and_then(|end| hex_value(&chars[i + 1..i + end]).map(|v| (end, v))) {
                            Some((end, value)) => {
                                out.push_str(&format!("\\x{{{:X}}}", value));
                                i += end + 1;
                            }
                            None => out.push('u'),
                        }
                    }
                    'u' | 'x' => {
                        let width = if e == 'u' { 4 } else { 2 };
                        match chars.get(i..i + width).and_then(hex_value) {
                            Some(value) => {
                                out.push_str(&format!("\\x{{{:X}}}", value));
                                i += width;
                            }
                            None => out.push(e),
                        }
                    }
                    'c' => match chars.get(i) {
                        Some(l) if l.is_ascii_alphabetic() => {
                            out.push_str(&format!("\\x{{{:X}}}", (*l as u32) % 32));
                            i += 1;
                        }
                        _ => out.push_str("\\\\c"),
                    },
                    other => out.push_str(&regex::escape(&other.to_string())),
                }
            }
            '[' if !in_class => {
                let negated = chars.get(i) == Some(&'^');
                let empty_at = if negated { i + 1 } else { i };
                if chars.get(empty_at) == Some(&']') {
                    // `[]` never matches, `[^]` matches anything
                    out.push_str(if negated { "[\\s\\S]" } else { "[^\\s\\S]" });
                    i = empty_at + 1;
                } else {
                    in_class = true;
                    out.push('[');
                    if negated {
                        out.push('^');
                        i += 1;
                    }
                }
            }
            '[' => out.push_str("\\["),
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            '&' | '~' if in_class => {
                out.push('\\');
                out.push(c);
            }
            '(' if !in_class && chars.get(i) == Some(&'?') => {
                match (chars.get(i + 1), chars.get(i + 2)) {
                    (Some('='), _) | (Some('!'), _) | (Some('<'), Some('=')) | (Some('<'), Some('!')) => {
                        return Err("lookaround assertions are not supported".to_string());
                    }
                    (Some('<'), _) => {
                        out.push_str("(?P<");
                        i += 2;
                    }
                    _ => out.push('('),
                }
            }
            '{' if !in_class => match quantifier_len(&chars[i - 1..]) {
                Some(len) => {
                    out.extend(&chars[i - 1..i - 1 + len]);
                    i += len - 1;
                }
                None => out.push_str("\\{"),
            },
            '}' if !in_class => out.push_str("\\}"),
            _ => out.push(c),
        }
    }

    if in_class {
        return Err("missing terminating ] for character class".to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_classes() {
        assert_eq!(translate(r"\d+").unwrap(), "[0-9]+");
        assert_eq!(translate(r"[\w-]").unwrap(), "[0-9A-Za-z_-]");
        assert_eq!(translate(r"a\/b").unwrap(), "a/b");
        assert_eq!(translate(r"[[]").unwrap(), r"[\[]");
        assert_eq!(translate("A").unwrap(), "A");
        assert_eq!(translate(r"\x41\u0041").unwrap(), r"\x{41}\x{41}");
    }

    #[test]
    fn test_translate_braces() {
        assert_eq!(translate("a{2,3}").unwrap(), "a{2,3}");
        assert_eq!(translate("{x}").unwrap(), r"\{x\}");
    }

    #[test]
    fn test_unsupported_features() {
        assert!(translate(r"(a)\1").is_err());
        assert!(translate("a(?=b)").is_err());
        assert!(translate("(?<!a)b").is_err());
        assert_eq!(translate("(?<year>\\d{4})").unwrap(), "(?P<year>[0-9]{4})");
    }

    #[test]
    fn test_compile_flags() {
        let re = RegExpData::new("ab+c", "gi").unwrap();
        assert!(re.global && re.ignore_case && !re.multiline);
        assert!(re.regex.is_match("xABBC"));
        assert!(RegExpData::new("a", "gg").is_err());
        assert!(RegExpData::new("a", "q").is_err());
        assert!(RegExpData::new("(", "").is_err());
        assert_eq!(RegExpData::new("", "").unwrap().source.as_str(), "(?:)");
    }

    #[test]
    fn test_ascii_digit_class() {
        let re = RegExpData::new(r"^\d+$", "").unwrap();
        assert!(re.regex.is_match("123"));
        assert!(!re.regex.is_match("١٢٣"));
    }
}
