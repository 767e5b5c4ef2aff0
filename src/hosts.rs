//! Hosts file rule editor.
//!
//! blockd owns exactly one contiguous section of the hosts file, bounded by
//! [`START_MARKER`] and [`END_MARKER`]. The section is always regenerated in
//! full from the domain list; it is never patched line by line.
//!
//! ```text
//! 127.0.0.1 localhost
//!
//! # >>> blockd: managed block start >>>
//! 0.0.0.0 x.com
//! 0.0.0.0 www.x.com
//! :: x.com
//! :: www.x.com
//! # <<< blockd: managed block end <<<
//! ```

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::BlockdError;
use crate::fs_abstraction::{FileSystem, RealFileSystem};
use crate::validation::{is_valid_domain, normalize_domain};

pub const START_MARKER: &str = "# >>> blockd: managed block start >>>";
pub const END_MARKER: &str = "# <<< blockd: managed block end <<<";

const REDIRECT_V4: &str = "0.0.0.0";
const REDIRECT_V6: &str = "::";

/// Normalized base domains, in order, without duplicates. Entries that are
/// not valid DNS names after normalization are dropped.
fn base_domains(domains: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(domains.len());
    for raw in domains {
        let domain = normalize_domain(raw);
        if !is_valid_domain(&domain) {
            warn!("Skipping invalid domain in block list: {:?}", raw);
            continue;
        }
        if !out.contains(&domain) {
            out.push(domain);
        }
    }
    out
}

/// Every host name a block covers: each base domain and its `www.` variant.
pub fn host_names(domains: &[String]) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(domains.len() * 2);
    for domain in base_domains(domains) {
        let www = format!("www.{}", domain);
        for name in [domain, www] {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Render the managed section for `domains` (LF line endings, trailing newline).
pub fn render(domains: &[String]) -> String {
    let mut lines: Vec<String> = vec![START_MARKER.to_string()];

    for domain in base_domains(domains) {
        let www = format!("www.{}", domain);
        for line in [
            format!("{} {}", REDIRECT_V4, domain),
            format!("{} {}", REDIRECT_V4, www),
            format!("{} {}", REDIRECT_V6, domain),
            format!("{} {}", REDIRECT_V6, www),
        ] {
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
    }

    lines.push(END_MARKER.to_string());

    let mut section = lines.join("\n");
    section.push('\n');
    section
}

fn line_ending(content: &str) -> &'static str {
    if content.contains("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.trim() == marker
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn join_lines(lines: &[&str], eol: &str) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push_str(eol);
    }
    out
}

/// True if the content holds a managed section (start marker present).
pub fn contains(content: &str) -> bool {
    content.lines().any(|line| is_marker(line, START_MARKER))
}

/// Remove every managed section.
///
/// A start marker without a matching end marker removes everything up to
/// end-of-file, so a half-deleted section can never leave entries behind.
/// Blank lines at the seams are collapsed; the original line ending style
/// (LF or CRLF) is kept.
pub fn remove(content: &str) -> String {
    let eol = line_ending(content);
    let mut lines: Vec<&str> = content.lines().collect();

    while let Some(start) = lines.iter().position(|l| is_marker(l, START_MARKER)) {
        let end = lines[start + 1..]
            .iter()
            .position(|l| is_marker(l, END_MARKER))
            .map(|offset| start + 1 + offset + 1)
            .unwrap_or(lines.len());

        let mut head: Vec<&str> = lines[..start].to_vec();
        let mut tail: Vec<&str> = lines[end..].to_vec();

        while head.last().is_some_and(|l| is_blank(l)) {
            head.pop();
        }
        let leading_blanks = tail.iter().take_while(|l| is_blank(l)).count();
        tail.drain(..leading_blanks);

        if !head.is_empty() && !tail.is_empty() {
            head.push("");
        }
        head.extend(tail);
        lines = head;
    }

    while lines.last().is_some_and(|l| is_blank(l)) {
        lines.pop();
    }

    join_lines(&lines, eol)
}

/// Remove any existing section, then append `section` after one blank line.
pub fn insert(content: &str, section: &str) -> String {
    let eol = line_ending(content);
    let base = remove(content);
    let base = base.trim_end();

    let mut out = String::with_capacity(base.len() + section.len() + 4);
    if !base.is_empty() {
        out.push_str(base);
        out.push_str(eol);
        out.push_str(eol);
    }
    let section_lines: Vec<&str> = section.lines().collect();
    out.push_str(&join_lines(&section_lines, eol));
    out
}

/// The first managed section (markers included), LF-normalized.
pub fn extract_section(content: &str) -> Option<String> {
    let mut lines = content.lines().skip_while(|l| !is_marker(l, START_MARKER));
    let first = lines.next()?;

    let mut section = String::new();
    section.push_str(first.trim_end());
    section.push('\n');
    for line in lines {
        section.push_str(line.trim_end());
        section.push('\n');
        if is_marker(line, END_MARKER) {
            break;
        }
    }
    Some(section)
}

/// True if the content's managed section is exactly `section`.
pub fn section_matches(content: &str, section: &str) -> bool {
    let expected: String = section
        .lines()
        .map(|l| format!("{}\n", l.trim_end()))
        .collect();
    extract_section(content).is_some_and(|found| found == expected)
}

/// The system hosts file, read and written through a [`FileSystem`].
pub struct HostsFile {
    path: PathBuf,
    fs: Box<dyn FileSystem>,
}

impl HostsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Box::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Box<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content. A missing hosts file reads as empty.
    pub fn read(&self) -> Result<String, BlockdError> {
        match self.fs.read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(source) => Err(BlockdError::HostsRead {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn write(&self, content: &str) -> Result<(), BlockdError> {
        self.fs
            .write(&self.path, content.as_bytes())
            .map_err(|source| BlockdError::HostsWrite {
                path: self.path.clone(),
                source,
            })
    }

    /// Make the file carry exactly the section for `domains`.
    ///
    /// Returns `true` if the file had to be rewritten.
    pub fn apply(&self, domains: &[String]) -> Result<bool, BlockdError> {
        let content = self.read()?;
        let section = render(domains);
        if section_matches(&content, &section) && !has_duplicate_section(&content) {
            debug!("Hosts section already up to date");
            return Ok(false);
        }
        self.write(&insert(&content, &section))?;
        Ok(true)
    }

    /// Strip the managed section. Returns `true` if the file was rewritten.
    pub fn clear(&self) -> Result<bool, BlockdError> {
        let content = self.read()?;
        if !contains(&content) {
            return Ok(false);
        }
        self.write(&remove(&content))?;
        Ok(true)
    }

    /// True if the file currently carries exactly the section for `domains`.
    pub fn is_enforced(&self, domains: &[String]) -> Result<bool, BlockdError> {
        let content = self.read()?;
        Ok(section_matches(&content, &render(domains)) && !has_duplicate_section(&content))
    }
}

fn has_duplicate_section(content: &str) -> bool {
    content
        .lines()
        .filter(|line| is_marker(line, START_MARKER))
        .count()
        > 1
}
