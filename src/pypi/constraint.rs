use crate::error::{CubeError, Result};
use crate::pypi::version::VersionComparator;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

// Two-character comparators come first so `>=` is never read as `>`.
static CLAUSE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(==|>=|<=|!=|>|<)\s*([0-9][0-9.]*)\s*$").expect("valid clause regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Whether `candidate <op> bound`, given how the two compare.
    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `<comparator><version>` clause of a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub comparator: Comparator,
    pub version: String,
}

impl Clause {
    pub fn is_satisfied_by(&self, version: &str) -> bool {
        self.comparator
            .holds(VersionComparator::compare(version, &self.version))
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.comparator, self.version)
    }
}

/// Comma separated clauses, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    clauses: Vec<Clause>,
}

impl VersionConstraint {
    /// Parse constraint text such as `>= 1.2.0, < 2.0`.
    ///
    /// Returns `Ok(None)` for empty text: such a dependency is not pinned to
    /// anything that could be compared, so it is never auto-upgraded.
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        if raw.trim().is_empty() {
            return Ok(None);
        }

        let mut clauses = Vec::new();
        for part in raw.split(',') {
            let captures = CLAUSE_PATTERN.captures(part).ok_or_else(|| {
                CubeError::Constraint(format!(
                    "clause '{}' in '{}' is not of the form <comparator><version>",
                    part.trim(),
                    raw
                ))
            })?;

            let comparator = Comparator::from_symbol(&captures[1]).ok_or_else(|| {
                CubeError::Constraint(format!("unknown comparator '{}'", &captures[1]))
            })?;

            clauses.push(Clause {
                comparator,
                version: captures[2].to_string(),
            });
        }

        Ok(Some(Self { clauses }))
    }

    #[cfg(test)]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_satisfied_by(&self, version: &str) -> bool {
        self.clauses.iter().all(|clause| clause.is_satisfied_by(version))
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(","))
    }
}
