//! Case conversion helpers exposed to templates
//!
//! `_`, `-` and space are the only word separators. Beyond those, a word
//! boundary is only recognized where the letter case changes.

use heck::{ToKebabCase, ToShoutySnakeCase, ToTitleCase};

fn is_separator(c: char) -> bool {
    matches!(c, '_' | '-' | ' ')
}

/// Convert to `camelCase`
pub fn camel_case(s: &str) -> String {
    humped(s, false)
}

/// Convert to `PascalCase`
pub fn pascal_case(s: &str) -> String {
    humped(s, true)
}

/// Shared camel/pascal walk
///
/// A rune is upper-cased when it follows a separator, or when it is already
/// upper-case and follows a non-upper-case rune. Either way an output rune is
/// never upper-cased directly after another upper-case output rune, which keeps
/// the conversion stable when applied to its own output.
fn humped(s: &str, upper_first: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_in: Option<char> = None;
    let mut prev_out: Option<char> = None;
    let mut after_sep = false;

    for c in s.chars() {
        if is_separator(c) {
            after_sep = prev_out.is_some();
            prev_in = Some(c);
            continue;
        }

        let upper = match prev_out {
            None => upper_first,
            Some(p) if p.is_uppercase() => false,
            Some(_) => after_sep || (c.is_uppercase() && !prev_in.is_some_and(char::is_uppercase)),
        };

        let start = out.len();
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }

        prev_out = out[start..].chars().last();
        prev_in = Some(c);
        after_sep = false;
    }

    out
}

/// Convert to `snake_case`, joining words with `sep`
///
/// A separator is inserted before an upper-case rune that follows a
/// lower-case one, before the last upper-case rune of a run that continues
/// in lower case (`FOOBar` -> `foo_bar`), and in place of a separator rune
/// that directly follows a letter. Separator runes after anything else are
/// dropped.
pub fn snake_case(sep: &str, s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { Some(chars[i - 1]) } else { None };

        if is_separator(c) {
            if prev.is_some_and(char::is_alphabetic) {
                out.push_str(sep);
            }
            continue;
        }

        if c.is_uppercase() {
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = match prev {
                Some(p) if p.is_lowercase() => true,
                Some(p) if p.is_uppercase() => next_lower,
                _ => false,
            };
            if boundary {
                out.push_str(sep);
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Convert to `kebab-case`
pub fn kebab_case(s: &str) -> String {
    s.to_kebab_case()
}

/// Convert to `SHOUTY_SNAKE_CASE`
pub fn shouty_case(s: &str) -> String {
    s.to_shouty_snake_case()
}

/// Convert to `Title Case`
pub fn title_case(s: &str) -> String {
    s.to_title_case()
}
