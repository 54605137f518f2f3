//! Format-preserving edits of the `__depends__` mapping in `__pkginfo__.py`.
//!
//! Editing is a read -> transform -> serialize pipeline: the file is parsed
//! into an immutable [`PkgInfoDocument`] that remembers where each value
//! literal sits, a [`Patch`] names the one value to replace, and applying it
//! copies every other byte of the source verbatim.

use crate::error::{CubeError, Result};
use regex::Regex;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static DEPENDS_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^__depends__\s*=\s*\{").expect("valid assignment regex"));

/// One `'name': 'constraint'` entry of `__depends__`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependsEntry {
    pub name: String,
    /// `None` when the value is the literal `None`.
    pub constraint: Option<String>,
    value_span: Range<usize>,
    quote: char,
}

impl DependsEntry {
    /// Constraint text, empty when unconstrained.
    pub fn constraint_text(&self) -> &str {
        self.constraint.as_deref().unwrap_or("")
    }
}

/// Parsed view of a `__pkginfo__.py` source; never mutated.
#[derive(Debug, Clone)]
pub struct PkgInfoDocument {
    source: String,
    entries: Vec<DependsEntry>,
}

/// Pin one dependency to `== version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub dependency: String,
    pub version: String,
}

impl Patch {
    pub fn pin(dependency: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            dependency: dependency.into(),
            version: version.into(),
        }
    }

    pub fn constraint_text(&self) -> String {
        format!("== {}", self.version)
    }
}

impl PkgInfoDocument {
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let start = DEPENDS_ASSIGNMENT
            .find(&source)
            .ok_or_else(|| CubeError::Parse("couldn't find __depends__ assignment".into()))?
            .end();

        let entries = DictScanner::new(&source, start).scan()?;
        Ok(Self { source, entries })
    }

    pub fn entries(&self) -> &[DependsEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&DependsEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Render the source with `patch` applied; all other bytes are untouched.
    pub fn apply(&self, patch: &Patch) -> Result<String> {
        let entry = self.entry(&patch.dependency).ok_or_else(|| {
            CubeError::Parse(format!(
                "dependency '{}' is not declared in __depends__",
                patch.dependency
            ))
        })?;

        let literal = format!("{q}{}{q}", patch.constraint_text(), q = entry.quote);

        let mut rendered = String::with_capacity(self.source.len() + literal.len());
        rendered.push_str(&self.source[..entry.value_span.start]);
        rendered.push_str(&literal);
        rendered.push_str(&self.source[entry.value_span.end..]);
        Ok(rendered)
    }
}

/// Write access to the declared dependency constraints of a package.
pub trait DependencyStore {
    /// Rewrite `dependency`'s declared constraint to `== version`.
    fn pin(&self, dependency: &str, version: &str) -> Result<()>;
}

/// PkgInfoEditor reads and rewrites a `__pkginfo__.py` on disk
pub struct PkgInfoEditor {
    path: PathBuf,
}

impl PkgInfoEditor {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn read(&self) -> Result<PkgInfoDocument> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            CubeError::MetadataNotFound(format!(
                "Failed to read '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        PkgInfoDocument::parse(content).map_err(|e| match e {
            CubeError::Parse(message) => {
                CubeError::Parse(format!("{} ({})", message, self.path.display()))
            }
            other => other,
        })
    }

    pub fn write(&self, document: &PkgInfoDocument, patch: &Patch) -> Result<()> {
        let rendered = document.apply(patch)?;
        fs::write(&self.path, rendered)?;
        Ok(())
    }
}

impl DependencyStore for PkgInfoEditor {
    fn pin(&self, dependency: &str, version: &str) -> Result<()> {
        // Re-read every time: commits and reverts change the file under us.
        let document = self.read()?;
        self.write(&document, &Patch::pin(dependency, version))
    }
}

/// Minimal scanner for the dict literal body following `__depends__ = {`.
struct DictScanner<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> DictScanner<'a> {
    fn new(source: &'a str, pos: usize) -> Self {
        Self { source, pos }
    }

    fn scan(mut self) -> Result<Vec<DependsEntry>> {
        let mut entries: Vec<DependsEntry> = Vec::new();

        loop {
            self.skip_trivia();
            match self.peek() {
                Some('}') => return Ok(entries),
                None => return Err(self.error("unterminated __depends__ mapping")),
                _ => {}
            }

            let (name, _) = self.string_literal()?;
            self.skip_trivia();
            self.expect(':')?;
            self.skip_trivia();

            let start = self.pos;
            let (constraint, quote) = if self.source[self.pos..].starts_with("None") {
                self.pos += "None".len();
                (None, '\'')
            } else {
                let (value, quote) = self.string_literal()?;
                (Some(value), quote)
            };
            let value_span = start..self.pos;

            if entries.iter().any(|entry| entry.name == name) {
                return Err(self.error(&format!("duplicate dependency '{name}'")));
            }
            entries.push(DependsEntry {
                name,
                constraint,
                value_span,
                quote,
            });

            self.skip_trivia();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(self.error("expected ',' or '}' after value")),
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
            } else if ch.is_whitespace() || ch == '\\' {
                self.pos += ch.len_utf8();
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, wanted: char) -> Result<()> {
        if self.peek() == Some(wanted) {
            self.pos += wanted.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{wanted}'")))
        }
    }

    /// Returns the literal's value and its quote character.
    fn string_literal(&mut self) -> Result<(String, char)> {
        let mut raw = false;
        for _ in 0..2 {
            match self.peek() {
                Some('r' | 'R') => {
                    raw = true;
                    self.pos += 1;
                }
                Some('u' | 'U' | 'b' | 'B') => self.pos += 1,
                _ => break,
            }
        }

        let quote = match self.bump() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected a string literal")),
        };

        if self.peek() == Some(quote) && self.source[self.pos + 1..].starts_with(quote) {
            return Err(self.error("triple-quoted strings are not supported"));
        }

        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string literal")),
                Some('\\') if !raw => match self.bump() {
                    Some(escaped) => value.push(escaped),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(ch) if ch == quote => return Ok((value, quote)),
                Some(ch) => value.push(ch),
            }
        }
    }

    fn error(&self, message: &str) -> CubeError {
        let line = self.source[..self.pos].matches('\n').count() + 1;
        CubeError::Parse(format!("{message} in __depends__ at line {line}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PKGINFO: &str = r#"# pylint: disable=W0622
"""cubicweb-blog application packaging information"""

modname = 'blog'
distname = 'cubicweb-blog'

numversion = (1, 2, 0)
version = '.'.join(str(num) for num in numversion)

__depends__ = {
    'cubicweb': '>= 3.24.0',
    "cubicweb-card": ">= 0.5.0, < 1.0",  # keep card below 1.0
    'cubicweb-preview': None,
    u'six': '>=1.4.0',
    'pyramid[testing]': '== 1.9',
}
__recommends__ = {'cubicweb-tag': '>= 1.2.0'}
"#;

    fn constraints(doc: &PkgInfoDocument) -> Vec<(&str, &str)> {
        doc.entries()
            .iter()
            .map(|e| (e.name.as_str(), e.constraint_text()))
            .collect()
    }

    #[test]
    fn parses_depends_mapping() {
        let doc = PkgInfoDocument::parse(PKGINFO).unwrap();
        assert_eq!(
            constraints(&doc),
            vec![
                ("cubicweb", ">= 3.24.0"),
                ("cubicweb-card", ">= 0.5.0, < 1.0"),
                ("cubicweb-preview", ""),
                ("six", ">=1.4.0"),
                ("pyramid[testing]", "== 1.9"),
            ]
        );
        assert!(doc.entry("cubicweb-preview").unwrap().constraint.is_none());
    }

    #[test]
    fn patch_only_touches_one_value() {
        let doc = PkgInfoDocument::parse(PKGINFO).unwrap();
        let rendered = doc.apply(&Patch::pin("cubicweb-card", "0.9.1")).unwrap();

        let expected = PKGINFO.replace(
            r#""cubicweb-card": ">= 0.5.0, < 1.0","#,
            r#""cubicweb-card": "== 0.9.1","#,
        );
        assert_eq!(rendered, expected);
    }

    #[test]
    fn patch_replaces_none_with_single_quoted_literal() {
        let doc = PkgInfoDocument::parse(PKGINFO).unwrap();
        let rendered = doc.apply(&Patch::pin("cubicweb-preview", "2.0")).unwrap();
        assert!(rendered.contains("'cubicweb-preview': '== 2.0',"));
        assert!(rendered.contains("'cubicweb': '>= 3.24.0',"));
    }

    #[test]
    fn patch_for_unknown_dependency_fails() {
        let doc = PkgInfoDocument::parse(PKGINFO).unwrap();
        assert!(matches!(
            doc.apply(&Patch::pin("cubicweb-tag", "1.3")),
            Err(CubeError::Parse(_))
        ));
    }

    #[test]
    fn missing_section_is_a_parse_error() {
        let err = PkgInfoDocument::parse("modname = 'blog'\n").unwrap_err();
        assert!(matches!(err, CubeError::Parse(_)));
    }

    #[test]
    fn unsupported_values_are_rejected() {
        let source = "__depends__ = {\n    'cubicweb': CW_VERSION,\n}\n";
        let err = PkgInfoDocument::parse(source).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let source = "__depends__ = {'six': '>=1', 'six': '>=2'}\n";
        assert!(PkgInfoDocument::parse(source).is_err());
    }

    #[test]
    fn empty_mapping_parses() {
        let doc = PkgInfoDocument::parse("__depends__ = {}\n").unwrap();
        assert!(doc.entries().is_empty());
    }

    #[test]
    fn editor_pins_on_disk_and_rereads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("__pkginfo__.py");
        fs::write(&path, PKGINFO).unwrap();

        let editor = PkgInfoEditor::new(&path);
        editor.pin("cubicweb", "3.26.1").unwrap();
        editor.pin("cubicweb", "3.27.0").unwrap();
        editor.pin("six", "1.12").unwrap();

        let doc = editor.read().unwrap();
        assert_eq!(doc.entry("cubicweb").unwrap().constraint_text(), "== 3.27.0");
        assert_eq!(doc.entry("six").unwrap().constraint_text(), "== 1.12");
        let source = fs::read_to_string(&path).unwrap();
        assert!(source.contains("# keep card below 1.0"));
        assert!(source.contains("__recommends__ = {'cubicweb-tag': '>= 1.2.0'}"));
    }

    #[test]
    fn editor_reports_missing_file() {
        let dir = tempdir().unwrap();
        let editor = PkgInfoEditor::new(dir.path().join("__pkginfo__.py"));
        assert!(matches!(editor.read(), Err(CubeError::MetadataNotFound(_))));
    }
}
