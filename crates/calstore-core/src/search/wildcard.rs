//! User wildcards (`*`, `?`) to SQL `LIKE` patterns.

/// Escape character used in generated `LIKE ... ESCAPE` clauses.
pub const LIKE_ESCAPE: char = '\\';

/// Whether `value` contains a user wildcard.
pub fn contains_wildcards(value: &str) -> bool {
    value.contains(['*', '?'])
}

/// Turn a user pattern into a `LIKE` pattern.
///
/// Literal `%`, `_` and the escape character are escaped, `*` becomes `%`,
/// `?` becomes `_`, and a trailing `%` is appended unless the pattern
/// already ends with a wildcard `%`.
pub fn prepare_for_search(value: &str) -> String {
    let mut pattern = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        match c {
            '*' => pattern.push('%'),
            '?' => pattern.push('_'),
            '%' | '_' | LIKE_ESCAPE => {
                pattern.push(LIKE_ESCAPE);
                pattern.push(c);
            }
            _ => pattern.push(c),
        }
    }
    // Only a trailing `*` yields an unescaped trailing `%`.
    if !value.ends_with('*') {
        pattern.push('%');
    }
    pattern
}
