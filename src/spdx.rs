/// Splitting of SPDX license expressions into atomic license names.
///
/// Recursive descent on ` OR ` / ` AND ` tokens with parenthesis stripping.
/// `WITH` clauses and exotic nesting are intentionally left alone: an
/// unrecognized compound stays a single atom rather than being guessed at.

/// Split a raw license field into atomic license names.
///
/// An already-atomic name comes back as a one-element list. Empty input
/// produces an empty list.
pub fn split_expression(raw: &str) -> Vec<String> {
    let trimmed = strip_outer_parens(raw.trim());
    if trimmed.is_empty() {
        return Vec::new();
    }

    for separator in [" OR ", " AND "] {
        if let Some(parts) = split_top_level(trimmed, separator) {
            return parts
                .iter()
                .flat_map(|part| split_expression(part))
                .collect();
        }
    }

    vec![trimmed.to_string()]
}

/// True when a license string still carries multi-license separator syntax.
/// The evaluator uses this to detect unsplit strings leaking past a parser.
pub fn contains_separator(license: &str) -> bool {
    license.contains('|') ||
        license.contains(" OR ") ||
        license.contains(" AND ") ||
        license.contains('(') ||
        license.contains(')')
}

/// Strip one or more balanced outer parenthesis pairs: "(MIT OR ISC)" -> "MIT OR ISC".
fn strip_outer_parens(expr: &str) -> &str {
    let mut current = expr.trim();
    while current.starts_with('(') && current.ends_with(')') {
        // Only strip when the opening paren matches the final one.
        let mut depth = 0usize;
        let mut closes_at_end = false;
        for (i, c) in current.char_indices() {
            match c {
                '(' => {
                    depth += 1;
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        closes_at_end = i == current.len() - 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        if !closes_at_end {
            break;
        }
        current = current[1..current.len() - 1].trim();
    }
    current
}

/// Split on a separator at parenthesis depth zero. Returns None when the
/// separator does not occur at the top level.
fn split_top_level(expr: &str, separator: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = expr.as_bytes();
    let sep_len = separator.len();

    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                depth += 1;
                i += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b' ' if depth == 0 && expr[i..].starts_with(separator) => {
                parts.push(expr[start..i].trim().to_string());
                i += sep_len;
                start = i;
            }
            _ => {
                i += 1;
            }
        }
    }

    if parts.is_empty() {
        return None;
    }
    parts.push(expr[start..].trim().to_string());
    Some(parts)
}
