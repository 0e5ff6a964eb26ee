//! Placeholder translation between the portable query style and backend dialects.
//!
//! Callers write `%s` for positional values, `%(name)s` for named values and
//! `%%` for a percent sign outside quoted literals. Backends receive `?` and
//! `:name`. Quoted literals are never rewritten.

use crate::types::Params;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    /// Rewrites portable placeholders into this dialect's syntax.
    ///
    /// Text inside `'...'`, `"..."` and `` `...` `` is copied verbatim, so a
    /// literal such as `LIKE '%sales'` is never touched. Queries already using
    /// `?` or `:name` pass through unchanged.
    pub fn translate(&self, query: &str) -> String {
        let mut out = String::with_capacity(query.len());
        let mut chars = query.chars().peekable();
        let mut quote: Option<char> = None;
        while let Some(c) = chars.next() {
            if let Some(open) = quote {
                // a doubled quote closes and reopens, which keeps the state right
                if c == open {
                    quote = None;
                }
                out.push(c);
                continue;
            }
            if matches!(c, '\'' | '"' | '`') {
                quote = Some(c);
                out.push(c);
                continue;
            }
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.peek().copied() {
                Some('s') => {
                    chars.next();
                    out.push('?');
                }
                Some('%') => {
                    chars.next();
                    out.push('%');
                }
                Some('(') => {
                    // %(name)s
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for n in lookahead.by_ref() {
                        if n == ')' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if closed && lookahead.peek() == Some(&'s') && is_identifier(&name) {
                        lookahead.next();
                        chars = lookahead;
                        out.push(':');
                        out.push_str(&name);
                    } else {
                        out.push('%');
                    }
                }
                _ => out.push('%'),
            }
        }
        out
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Counts portable positional placeholders, used to catch arity mistakes early.
pub fn positional_arity(query: &str) -> usize {
    let translated = Dialect::Sqlite.translate(query);
    let mut quote: Option<char> = None;
    let mut count = 0;
    for c in translated.chars() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if matches!(c, '\'' | '"' | '`') => quote = Some(c),
            None if c == '?' => count += 1,
            None => {}
        }
    }
    count
}

/// True when a positional parameter set matches the placeholder count.
pub fn arity_matches(query: &str, params: &Params) -> bool {
    match params {
        Params::Positional(values) => positional_arity(query) == values.len(),
        Params::Named(_) => true,
    }
}
