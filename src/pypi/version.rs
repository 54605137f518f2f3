use std::cmp::Ordering;
use std::fmt;

/// A version compared segment by segment, the way loosely-versioned Python
/// packages expect: `1.10 > 1.9`, `1.0 == 1.0.0`, `1.0rc1 < 1.0`.
#[derive(Debug, Clone)]
pub struct LooseVersion {
    pub original: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment(Vec<Part>);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Number(u64),
    Text(String),
}

impl LooseVersion {
    pub fn parse(version: &str) -> Self {
        let trimmed = version.trim();
        let segments = trimmed
            .split('.')
            .filter(|s| !s.is_empty())
            .map(Segment::parse)
            .collect();

        Self {
            original: trimmed.to_string(),
            segments,
        }
    }
}

impl Segment {
    fn parse(raw: &str) -> Self {
        let mut parts = Vec::new();
        let mut digits = String::new();
        let mut text = String::new();

        for ch in raw.chars() {
            if ch.is_ascii_digit() {
                if !text.is_empty() {
                    parts.push(Part::Text(std::mem::take(&mut text).to_lowercase()));
                }
                digits.push(ch);
            } else {
                if !digits.is_empty() {
                    parts.push(Part::number(&std::mem::take(&mut digits)));
                }
                text.push(ch);
            }
        }

        if !digits.is_empty() {
            parts.push(Part::number(&digits));
        }
        if !text.is_empty() {
            parts.push(Part::Text(text.to_lowercase()));
        }

        Segment(parts)
    }

    fn zero() -> Self {
        Segment(vec![Part::Number(0)])
    }
}

impl Part {
    fn number(digits: &str) -> Self {
        // Digit runs longer than u64 saturate instead of failing the parse.
        Part::Number(digits.parse().unwrap_or(u64::MAX))
    }
}

impl Ord for Part {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Part::Number(a), Part::Number(b)) => a.cmp(b),
            (Part::Text(a), Part::Text(b)) => a.cmp(b),
            (Part::Number(_), Part::Text(_)) => Ordering::Greater,
            (Part::Text(_), Part::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Part {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        // Extra text run: pre-release (`0rc1` < `0`). Extra number run: newer.
        match self.0.len().cmp(&other.0.len()) {
            Ordering::Equal => Ordering::Equal,
            Ordering::Greater => match &self.0[other.0.len()] {
                Part::Text(_) => Ordering::Less,
                Part::Number(_) => Ordering::Greater,
            },
            Ordering::Less => match &other.0[self.0.len()] {
                Part::Text(_) => Ordering::Greater,
                Part::Number(_) => Ordering::Less,
            },
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        let zero = Segment::zero();

        for index in 0..len {
            let a = self.segments.get(index).unwrap_or(&zero);
            let b = other.segments.get(index).unwrap_or(&zero);
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }

        Ordering::Equal
    }
}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LooseVersion {}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

pub struct VersionComparator;

impl VersionComparator {
    /// Compare two version strings with loose ordering
    pub fn compare(a: &str, b: &str) -> Ordering {
        LooseVersion::parse(a).cmp(&LooseVersion::parse(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_newer(a: &str, b: &str) -> bool {
        VersionComparator::compare(a, b) == Ordering::Greater
    }

    #[test]
    fn numeric_segments_compare_numerically() {
        assert!(is_newer("1.10", "1.9"));
        assert!(is_newer("2.0", "1.99.99"));
        assert!(!is_newer("1.2.3", "1.2.3"));
    }

    #[test]
    fn missing_trailing_segments_are_zero() {
        assert_eq!(LooseVersion::parse("1.0"), LooseVersion::parse("1.0.0"));
        assert_eq!(VersionComparator::compare("3", "3.0.0.0"), Ordering::Equal);
        assert!(is_newer("1.0.1", "1.0"));
    }

    #[test]
    fn pre_release_sorts_before_release() {
        assert!(is_newer("1.0", "1.0rc1"));
        assert!(is_newer("1.0rc2", "1.0rc1"));
        assert!(is_newer("1.0rc1", "0.9"));
        assert!(is_newer("1.0", "1.0.dev1"));
    }

    #[test]
    fn display_keeps_original_text() {
        assert_eq!(LooseVersion::parse(" 3.24.0 ").to_string(), "3.24.0");
    }

    #[test]
    fn sorting_uses_loose_order() {
        let mut versions: Vec<LooseVersion> = ["1.10", "1.2", "1.9.1", "0.5"]
            .iter()
            .map(|v| LooseVersion::parse(v))
            .collect();
        versions.sort();
        let ordered: Vec<&str> = versions.iter().map(|v| v.original.as_str()).collect();
        assert_eq!(ordered, vec!["0.5", "1.2", "1.9.1", "1.10"]);
    }
}
