//! `${VAR}` expansion in raw config text.
//!
//! Expansion runs on the file contents before parsing, so any string value
//! (API URLs, profile ids, launch commands) can reference the environment.

/// Expand `${NAME}` placeholders from the process environment.
///
/// Placeholders that do not resolve, and malformed ones (no closing brace,
/// empty name), pass through untouched.
pub fn expand_env(raw: &str) -> String {
    expand_with(raw, |name| std::env::var(name).ok())
}

fn expand_with(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body = &rest[start + 2..];

        let Some(end) = body.find('}') else {
            // Unterminated placeholder: keep the tail as written.
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };

        let name = &body[..end];
        match lookup(name).filter(|_| !name.is_empty()) {
            Some(value) => out.push_str(&value),
            None => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            },
        }
        rest = &body[end + 1..];
    }

    out.push_str(rest);
    out
}
