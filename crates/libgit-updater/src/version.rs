// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cmp::Ordering;

/// parsed semantic-ish version: dotted numeric components plus an
/// optional pre-release suffix. git tags are rarely strict semver, so the
/// parser is lenient about component count ("1.2" == "1.2.0") but refuses
/// anything whose numeric part is not purely dotted digits.
#[derive(Debug, Clone)]
pub struct Version {
    parts: Vec<u64>,
    pre: Option<String>,
}

// equality must agree with the comparator: "1.2" and "1.2.0" are the
// same version even though their component lists differ
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Version {
    /// parses a version string, stripping a single leading `v`/`V`.
    /// returns None for malformed input; malformed versions never
    /// participate in comparisons.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let s = s.strip_prefix(['v', 'V']).unwrap_or(s);

        if s.is_empty() {
            return None;
        }

        let (numeric, pre) = match s.split_once('-') {
            Some((n, p)) => (n, Some(p.to_string())),
            None => (s, None),
        };

        // build metadata carries no precedence
        let numeric = numeric.split('+').next().unwrap_or(numeric);
        if numeric.is_empty() {
            return None;
        }

        let mut parts = Vec::new();
        for piece in numeric.split('.') {
            if piece.is_empty() || !piece.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            parts.push(piece.parse::<u64>().ok()?);
        }

        Some(Self { parts, pre })
    }

    pub fn pre_release(&self) -> Option<&str> {
        self.pre.as_deref()
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let max_len = self.parts.len().max(other.parts.len());

        for i in 0..max_len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        // equal numerics: a pre-release sorts below the plain release
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => compare_pre_release(a, b),
        }
    }
}

/// semver pre-release precedence: dot-separated identifiers compared
/// left to right, numeric identifiers below alphanumeric ones, fewer
/// identifiers below more when all shared ones are equal.
fn compare_pre_release(a: &str, b: &str) -> Ordering {
    let mut ids_a = a.split('.');
    let mut ids_b = b.split('.');

    loop {
        match (ids_a.next(), ids_b.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// compares two version strings. returns None when either side is
/// malformed; callers treat that as "cannot decide, no update".
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(Version::parse(a)?.cmp(&Version::parse(b)?))
}

/// returns true if `remote` is strictly newer than `local`.
/// malformed versions on either side degrade to false.
pub fn is_update_available(local: &str, remote: &str) -> bool {
    compare(local, remote) == Some(Ordering::Less)
}

/// returns true when `candidate >= reference`, the tie-break used when
/// deciding between a tag-based and a branch-based download.
pub fn is_at_least(candidate: &str, reference: &str) -> bool {
    matches!(
        compare(candidate, reference),
        Some(Ordering::Greater | Ordering::Equal)
    )
}
