//! `%NAME%` environment reference expansion.

/// Expand `%NAME%` references in `arg` using `lookup`.
///
/// References whose name is unknown are left untouched, as are lone `%`
/// characters and `%%`.
pub fn expand_percent_vars<F>(arg: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('%') {
            Some(end) if end > 0 => match lookup(&after[..end]) {
                Some(value) => {
                    out.push_str(&value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            },
            _ => {
                out.push('%');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
