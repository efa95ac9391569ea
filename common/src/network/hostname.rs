//! Hostname normalization.
//!
//! Reverse lookups on home and small-office networks come back qualified with the
//! router's local domain. Names are stored without it so that the same device
//! reported by DNS and by LLDP (which usually carries the short name) compares equal.

/// Suffixes stripped even when the resolver configuration does not mention them.
pub const DEFAULT_SUFFIXES: &[&str] = &["fritz.box", "local", "lan"];

/// Removes the trailing dot and the first matching local suffix.
///
/// Matching is case-insensitive and only strips whole labels; the original case
/// of the remaining name is preserved. Returns `None` when nothing is left.
pub fn normalize(name: &str, suffixes: &[String]) -> Option<String> {
    let trimmed: &str = name.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    let lower: String = trimmed.to_ascii_lowercase();
    let configured = suffixes.iter().map(String::as_str);
    for suffix in configured.chain(DEFAULT_SUFFIXES.iter().copied()) {
        let suffix: String = suffix.trim_matches('.').to_ascii_lowercase();
        if suffix.is_empty() {
            continue;
        }
        let dotted: String = format!(".{suffix}");
        if lower.ends_with(&dotted) {
            let short: &str = &trimmed[..trimmed.len() - dotted.len()];
            return (!short.is_empty()).then(|| short.to_string());
        }
    }

    Some(trimmed.to_string())
}

/// Case-insensitive comparison of two already-normalized names.
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
