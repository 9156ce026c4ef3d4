//! Principal extraction from addressing header values

/// Return the user part of the first `sip:`/`sips:` URI in a From/To style
/// header value.
///
/// The user part runs from the scheme to the first `@`, `;` or `>`, so both
/// `<sip:1001@10.0.0.5>;tag=x` and `sip:support` are handled. Returns `None`
/// when the value carries no SIP scheme (e.g. `tel:123`).
pub fn extract_principal(value: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let start = find_scheme(&lower)?;
    let rest = &value[start..];
    let end = rest.find(['@', ';', '>']).unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

/// Byte offset just past the first `sip:` or `sips:` scheme
fn find_scheme(lower: &str) -> Option<usize> {
    let sip = lower.find("sip:").map(|i| i + "sip:".len());
    let sips = lower.find("sips:").map(|i| i + "sips:".len());
    match (sip, sips) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
