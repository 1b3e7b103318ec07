use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%[A-Za-z_][A-Za-z0-9_]*%").expect("static placeholder regex"))
}

/// Substitutes `%KEY%` tokens. Tokens without a value are left as-is.
pub fn render(template: &str, vars: &BTreeMap<&str, &str>) -> String {
    placeholder_re()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            let key = &token[1..token.len() - 1];
            match vars.get(key) {
                Some(v) => (*v).to_string(),
                None => token.to_string(),
            }
        })
        .into_owned()
}

pub fn render_app(template: &str, app: &str) -> String {
    render(template, &BTreeMap::from([("APP", app)]))
}

/// True when a value still carries an unsubstituted `%KEY%` token.
pub fn has_placeholder(s: &str) -> bool {
    placeholder_re().is_match(s)
}
