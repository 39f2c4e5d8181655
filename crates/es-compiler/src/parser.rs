use std::net::IpAddr;

use es_core::rules::{normalize_domain, PatternKind, PatternRule};

/// One rule line after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledRule {
    /// Domain (and subdomains) to block
    Block(String),
    /// Embed host the wrapper page may frame
    Allow(String),
    /// Redirect or beacon URL pattern
    Pattern(PatternRule),
    /// Token that marks a dynamic-code payload as hostile
    CodeKeyword(String),
    /// Token that marks a cross-frame message as a redirect command
    MessageKeyword(String),
    /// TLD whose machine-generated hosts are refused in nested frames
    SuspiciousTld(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub lines: usize,
    pub comments: usize,
    pub rules: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    pub rules: Vec<CompiledRule>,
    /// Value of a `! Version:` header, if the list has one
    pub version: Option<String>,
    pub stats: ParseStats,
}

pub fn parse_rule_list(text: &str) -> ParsedList {
    parse_rule_list_from(text, 0)
}

/// Parse a list whose rules continue the numbering of earlier lists, so
/// unnamed patterns get ids unique across a whole compile.
pub fn parse_rule_list_from(text: &str, first_ordinal: usize) -> ParsedList {
    let mut parsed = ParsedList::default();

    for (index, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        parsed.stats.lines += 1;

        if is_comment_line(line) {
            parsed.stats.comments += 1;
            if parsed.version.is_none() {
                parsed.version = parse_version_header(line);
            }
            continue;
        }

        match parse_line(line, first_ordinal + parsed.stats.rules) {
            Ok(rule) => {
                parsed.stats.rules += 1;
                parsed.rules.push(rule);
            }
            Err(reason) => {
                parsed.stats.invalid += 1;
                log::warn!("line {}: {reason}: {line}", index + 1);
            }
        }
    }

    parsed
}

fn parse_line(line: &str, ordinal: usize) -> Result<CompiledRule, &'static str> {
    if let Some((name, value)) = split_directive(line) {
        let value = value.trim();
        if value.is_empty() {
            return Err("empty directive");
        }
        return match name {
            "keyword" => Ok(CompiledRule::CodeKeyword(value.to_string())),
            "message" => Ok(CompiledRule::MessageKeyword(value.to_string())),
            "tld" => normalize_domain(value)
                .filter(|tld| !tld.contains('.'))
                .map(CompiledRule::SuspiciousTld)
                .ok_or("invalid tld"),
            _ => Err("unknown directive"),
        };
    }

    if line.starts_with('/') {
        return parse_pattern_rule(line, ordinal).map(CompiledRule::Pattern);
    }

    if let Some(rest) = line.strip_prefix("@@") {
        return parse_host(rest.trim_start())
            .map(CompiledRule::Allow)
            .ok_or("invalid allow entry");
    }

    parse_host(line).map(CompiledRule::Block).ok_or("invalid hostname")
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line.starts_with('#')
}

fn parse_version_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix('!')?.trim_start();
    let (key, value) = rest.split_once(':')?;
    if !key.trim().eq_ignore_ascii_case("version") {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// `keyword:popunder`, `message:location.href`, `tld:xyz`
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    match name {
        "keyword" | "message" | "tld" => Some((name, value)),
        _ => None,
    }
}

/// `||host^`, hosts-file `0.0.0.0 host`, or a bare `host`.
fn parse_host(line: &str) -> Option<String> {
    if let Some(domain) = parse_host_anchor_rule(line) {
        return Some(domain);
    }
    if let Some(domain) = parse_hosts_file_domain(line) {
        return Some(domain);
    }
    if line.contains(char::is_whitespace) {
        return None;
    }
    dotted(normalize_domain(line)?)
}

fn parse_host_anchor_rule(line: &str) -> Option<String> {
    let mut rest = line.strip_prefix("||")?;
    if rest.starts_with('.') {
        rest = &rest[1..];
    }

    let mut end = rest.len();
    for (i, ch) in rest.char_indices() {
        if ch == '^' || ch == '|' {
            end = i;
            break;
        }
        if ch == '/' || ch == '?' || ch == '#' || ch == ':' || ch == '*' {
            return None;
        }
    }

    // Only `||host^` with nothing (or an option list) after it
    let tail = rest[end..].trim_start_matches(['^', '|']);
    if !tail.is_empty() && !tail.starts_with('$') {
        return None;
    }

    dotted(normalize_domain(&rest[..end])?)
}

fn parse_hosts_file_domain(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    let first = parts.next()?;
    let second = parts.next()?;

    if first.parse::<IpAddr>().is_ok() {
        return dotted(normalize_domain(second)?);
    }

    None
}

/// Hosts files list `localhost` and friends; a rule needs a dotted name.
fn dotted(domain: String) -> Option<String> {
    domain.contains('.').then_some(domain)
}

/// `/regex/` optionally followed by `$category=<kind>,id=<name>`.
fn parse_pattern_rule(line: &str, ordinal: usize) -> Result<PatternRule, &'static str> {
    let close = line.rfind('/').filter(|&i| i > 0).ok_or("unterminated pattern")?;
    let source = &line[1..close];
    if source.is_empty() {
        return Err("empty pattern");
    }

    let options = match &line[close + 1..] {
        "" => "",
        rest => rest.strip_prefix('$').ok_or("trailing text after pattern")?,
    };

    let mut kind = PatternKind::Custom;
    let mut id = None;
    for option in options.split(',').map(str::trim).filter(|o| !o.is_empty()) {
        match option.split_once('=') {
            Some(("category", value)) => kind = PatternKind::from_str(value.trim()),
            Some(("id", value)) if !value.trim().is_empty() => id = Some(value.trim().to_string()),
            _ => return Err("unknown pattern option"),
        }
    }

    if regex::Regex::new(source).is_err() {
        return Err("pattern does not compile");
    }

    let id = id.unwrap_or_else(|| format!("{}-{}", kind.as_str(), ordinal));
    Ok(PatternRule::new(id, kind, source))
}
