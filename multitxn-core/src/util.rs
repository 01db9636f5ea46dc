use std::cmp::min;

/// Longest prefix of `value` not exceeding `max` bytes and ending on a char boundary.
pub fn truncate_str(value: &str, max: usize) -> &str {
    let mut end = min(value.len(), max);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].trim_end()
}

pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut first = true;
    for v in values {
        if !first {
            out.push_str(separator);
        }
        first = false;
        f(out, v);
    }
}

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            $crate::truncate_str(&$query, 497),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}
