// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

/// only the opening chunk of a file is scanned for headers; version
/// headers live in the top comment block.
const HEADER_SCAN_LIMIT: usize = 8 * 1024;

/// parses a `Key: value` header comment block into a lowercase-keyed map.
/// leading comment markers (`/*`, `*`, `//`, `#`) and trailing `*/` are
/// tolerated. the first occurrence of a key wins.
pub fn parse_header_block(content: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    let scan_end = floor_char_boundary(content, HEADER_SCAN_LIMIT);

    for line in content[..scan_end].lines() {
        let Some((key, value)) = parse_header_line(line) else {
            continue;
        };
        headers.entry(key).or_insert(value);
    }

    headers
}

/// returns the value for one header key (case-insensitive), scanning the
/// same way as [`parse_header_block`] but stopping at the first match.
pub fn header_value(content: &str, key: &str) -> Option<String> {
    let wanted = key.to_ascii_lowercase();
    let scan_end = floor_char_boundary(content, HEADER_SCAN_LIMIT);

    content[..scan_end]
        .lines()
        .filter_map(parse_header_line_ref)
        .find(|(k, _)| *k == wanted)
        .map(|(_, v)| v)
}

/// extracts the remote version from a file's header block. absence is a
/// recoverable "no remote version" condition, not an error.
pub fn parse_remote_version(content: &str) -> Option<String> {
    let version = header_value(content, "version")?;
    if version.is_empty() { None } else { Some(version) }
}

fn parse_header_line(line: &str) -> Option<(String, String)> {
    parse_header_line_ref(line).map(|(k, v)| (k.to_string(), v))
}

fn parse_header_line_ref(line: &str) -> Option<(String, String)> {
    let mut rest = line.trim_start();

    for marker in ["/*", "//", "#", "*"] {
        if let Some(stripped) = rest.strip_prefix(marker) {
            rest = stripped.trim_start();
            break;
        }
    }

    let (key, value) = rest.split_once(':')?;
    let key = key.trim();

    // header keys are short word sequences; a colon in prose or a URL is
    // not a header line
    if key.is_empty()
        || key.len() > 40
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-')
    {
        return None;
    }

    // a colon inside a URL leaves "//host/..." as the value
    if value.starts_with("//") {
        return None;
    }

    let value = value.trim().trim_end_matches("*/").trim().to_string();
    Some((key.to_ascii_lowercase(), value))
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut index = index;
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
