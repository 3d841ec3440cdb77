//! Shared utility helpers.
//!
//! The SQL helpers here normalise expression fragments (defaults, check and
//! filter conditions, module bodies) so that two schemas can be compared on
//! meaning rather than on formatting.

/// Characters that carry no meaning when comparing SQL fragments.
const SCRUBBED_CHARS: &[char] = &['\r', '\n', '\t', ' ', '(', ')', '[', ']'];

/// Makes SQL easier to compare by removing subjective characters.
///
/// Strips whitespace, parentheses and identifier brackets, then lowercases.
/// This is deliberately shallow: `a*b/c` and `(a*b)/c` scrub to the same text
/// even though a different grouping could change the result.
pub fn scrub_sql(sql: &str) -> String {
    sql.chars()
        .filter(|c| !SCRUBBED_CHARS.contains(c))
        .collect::<String>()
        .to_lowercase()
}

/// Remove one layer of unnecessary parentheses from well-formed SQL.
///
/// `(a+b)` becomes `a+b`, but `(a),(b)` and `(a)+(b)` are returned unchanged
/// because the leading `(` closes before the end of the expression. The
/// brackets must be the very first and last characters.
pub fn reduce_brackets(sql: &str) -> &str {
    if sql.len() < 2 || !sql.starts_with('(') || !sql.ends_with(')') {
        return sql;
    }

    let last = sql.len() - 1;
    let mut depth = 0i32;
    for (i, chr) in sql.char_indices() {
        match chr {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                // Outer pair closed early: a concatenation of groups
                if depth == 0 && i != last {
                    return sql;
                }
                if depth < 0 {
                    return sql;
                }
            }
            _ => {}
        }
    }

    if depth != 0 {
        return sql;
    }
    &sql[1..last]
}

/// Convert any mix of `\r\n`, `\r` and `\n` line endings to `eol`.
pub fn standardise_line_endings(text: &str, eol: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\n', eol)
}

/// Case-insensitive equality without allocating.
#[inline]
pub fn eq_ci(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().eq_ignore_ascii_case(b.as_bytes())
}

/// Quote a value as a T-SQL string literal.
pub fn sql_string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
