use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Num(&'a str),
    Alpha(&'a str),
}

fn tokenize(raw: &str) -> Vec<Token<'_>> {
    let mut out = vec![];
    let bytes = raw.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            out.push(Token::Num(&raw[start..i]));
        } else if c.is_ascii_alphabetic() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                i += 1;
            }
            out.push(Token::Alpha(&raw[start..i]));
        } else {
            // separators and anything non-ascii
            i += 1;
        }
    }
    out
}

fn cmp_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_token(a: &Token<'_>, b: &Token<'_>) -> Ordering {
    match (a, b) {
        (Token::Num(x), Token::Num(y)) => cmp_numeric(x, y),
        (Token::Alpha(x), Token::Alpha(y)) => x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()),
        // 1.0.1 > 1.0.b
        (Token::Num(_), Token::Alpha(_)) => Ordering::Greater,
        (Token::Alpha(_), Token::Num(_)) => Ordering::Less,
    }
}

/// Orders two version strings component by component.
///
/// Digit runs compare numerically and letter runs case-insensitively. When one
/// side runs out, a trailing digit run on the other side is compared against
/// zero (`1.0 == 1.0.0`) and a trailing letter run marks a pre-release
/// (`1.0b1 < 1.0`).
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let ta = tokenize(a.trim());
    let tb = tokenize(b.trim());
    let len = ta.len().max(tb.len());
    for i in 0..len {
        let ord = match (ta.get(i), tb.get(i)) {
            (Some(x), Some(y)) => cmp_token(x, y),
            (Some(Token::Num(x)), None) => cmp_numeric(x, "0"),
            (None, Some(Token::Num(y))) => cmp_numeric("0", y),
            (Some(Token::Alpha(_)), None) => Ordering::Less,
            (None, Some(Token::Alpha(_))) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub fn is_outdated(installed: &str, latest: &str) -> bool {
    compare_versions(installed, latest) == Ordering::Less
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)+|\d+").expect("static version regex"))
}

/// Pulls the first version-looking substring out of `--version` style output.
pub fn extract_version(text: &str) -> Option<String> {
    version_re()
        .find(text)
        .map(|m| m.as_str().to_string())
}
