//! Hostname label utilities
//!
//! Suffix walking for block/allow set lookups and the registrable-label
//! heuristics used by the suspicious-TLD check.
//!
//! # Examples
//!
//! ```
//! use es_core::domain::walk_suffixes;
//!
//! let suffixes: Vec<_> = walk_suffixes("a.b.ad.com").collect();
//! assert_eq!(suffixes, ["a.b.ad.com", "b.ad.com", "ad.com", "com"]);
//! ```

use std::net::IpAddr;

/// Common two-part public suffixes. No PSL is shipped, so the registrable
/// label falls back to this list plus "last two labels".
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "ac.uk", "ne.jp", "or.jp",
];

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator over a host and every parent suffix, most specific first.
pub struct SuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for SuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
pub fn walk_suffixes(host: &str) -> SuffixIter<'_> {
    SuffixIter {
        current: Some(host).filter(|h| !h.is_empty()),
    }
}

/// Rightmost label.
pub fn tld_of(host: &str) -> &str {
    host.rsplit('.').next().unwrap_or(host)
}

/// The label a registrant chose: `x7k2` in `cdn.x7k2.co.uk`.
pub fn registrable_label(host: &str) -> Option<&str> {
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let n = labels.len();
    if n < 2 {
        return None;
    }

    if n >= 3 {
        let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
        if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
            return Some(labels[n - 3]);
        }
    }

    Some(labels[n - 2])
}

pub fn is_ip_literal(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

/// Shannon entropy in bits per character.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for &b in s.as_bytes() {
        counts[b as usize] += 1;
    }
    let len = s.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Thresholds for the machine-generated label heuristic.
pub const MIN_SUSPICIOUS_LABEL_LEN: usize = 7;
pub const SUSPICIOUS_ENTROPY_BITS: f64 = 3.3;
pub const SUSPICIOUS_VOWEL_RATIO: f64 = 0.2;

/// Does this label look machine-generated? Short labels never do.
pub fn is_high_entropy_label(label: &str) -> bool {
    if label.len() < MIN_SUSPICIOUS_LABEL_LEN {
        return false;
    }

    let bytes = label.as_bytes();
    let digits = bytes.iter().filter(|b| b.is_ascii_digit()).count();
    let letters = bytes.iter().filter(|b| b.is_ascii_alphabetic()).count();
    if digits >= 2 && letters >= 2 {
        return true;
    }

    let vowels = bytes
        .iter()
        .filter(|b| matches!(b.to_ascii_lowercase(), b'a' | b'e' | b'i' | b'o' | b'u' | b'y'))
        .count();
    if letters > 0 && (vowels as f64 / letters as f64) < SUSPICIOUS_VOWEL_RATIO {
        return true;
    }

    shannon_entropy(label) >= SUSPICIOUS_ENTROPY_BITS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_parent_domain() {
        assert_eq!(get_parent_domain("sub.example.com"), Some("example.com"));
        assert_eq!(get_parent_domain("example.com"), Some("com"));
        assert_eq!(get_parent_domain("com"), None);
        assert_eq!(get_parent_domain(""), None);
        assert_eq!(get_parent_domain("trailing."), None);
    }

    #[test]
    fn test_walk_suffixes() {
        let all: Vec<_> = walk_suffixes("a.b.ad.com").collect();
        assert_eq!(all, vec!["a.b.ad.com", "b.ad.com", "ad.com", "com"]);
        assert_eq!(walk_suffixes("").count(), 0);
    }

    #[test]
    fn test_registrable_label() {
        assert_eq!(registrable_label("cdn.x7k2.co.uk"), Some("x7k2"));
        assert_eq!(registrable_label("sub.example.com"), Some("example"));
        assert_eq!(registrable_label("localhost"), None);
    }

    #[test]
    fn test_tld_of() {
        assert_eq!(tld_of("a.b.top"), "top");
        assert_eq!(tld_of("top"), "top");
    }

    #[test]
    fn test_high_entropy_label() {
        assert!(is_high_entropy_label("a8x3kq7z"));
        assert!(is_high_entropy_label("qwrtzpkxm"));
        assert!(!is_high_entropy_label("wellness"));
        assert!(!is_high_entropy_label("vidsrc"));
        assert!(!is_high_entropy_label("stream"));
    }

    #[test]
    fn test_ip_literal() {
        assert!(is_ip_literal("127.0.0.1"));
        assert!(is_ip_literal("[::1]"));
        assert!(!is_ip_literal("example.com"));
    }
}
