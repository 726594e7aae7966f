//! Virtual path abstraction
//!
//! A [`VirtualPath`] is an absolute, `/`-rooted path in the gateway's unified
//! namespace. The same type is used for paths the client sees (before mount
//! resolution) and for the sub-path handed to a driver after its mount
//! prefix has been stripped -- both are just slash-separated segments under
//! a root.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An absolute path in the gateway namespace, stored as normalized segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    /// Parse a path string. Backslashes are normalized to `/`, repeated
    /// slashes collapse, and `.`/`..` segments are resolved against the
    /// root (a leading `..` is simply dropped, it cannot escape the root).
    pub fn new(path: impl AsRef<str>) -> Self {
        let raw = path.as_ref().replace('\\', "/");
        let mut segments = Vec::new();
        for part in raw.split('/').filter(|s| !s.is_empty()) {
            match part {
                "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(part.to_string()),
            }
        }
        Self { segments }
    }

    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn join(&self, name: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        for part in name.as_ref().replace('\\', "/").split('/').filter(|s| !s.is_empty()) {
            match part {
                "." => {}
                ".." => {
                    segments.pop();
                }
                _ => segments.push(part.to_string()),
            }
        }
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(Self { segments })
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn extension(&self) -> Option<&str> {
        self.name().and_then(|n| n.rsplit_once('.')).map(|(_, ext)| ext)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True if `self` is `other` or a descendant of `other`.
    pub fn is_sub_path_of(&self, other: &VirtualPath) -> bool {
        if other.is_root() {
            return true;
        }
        other.segments.len() <= self.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// The portion of `self` below `prefix`, as a new root-relative path.
    /// Panics if `self` is not a sub-path of `prefix` -- callers are
    /// expected to have checked with [`is_sub_path_of`] first (this is
    /// exactly how mount resolution uses it).
    pub fn strip_prefix(&self, prefix: &VirtualPath) -> VirtualPath {
        assert!(self.is_sub_path_of(prefix), "{self} is not under {prefix}");
        VirtualPath { segments: self.segments[prefix.segments.len()..].to_vec() }
    }

    pub fn to_path_string(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl From<&str> for VirtualPath {
    fn from(s: &str) -> Self {
        VirtualPath::new(s)
    }
}

impl From<String> for VirtualPath {
    fn from(s: String) -> Self {
        VirtualPath::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_slashes_and_dots() {
        let p = VirtualPath::new("/a//b/./c/../d");
        assert_eq!(p.to_path_string(), "/a/b/d");
    }

    #[test]
    fn leading_dotdot_cannot_escape_root() {
        let p = VirtualPath::new("/../../etc/passwd");
        assert_eq!(p.to_path_string(), "/etc/passwd");
    }

    #[test]
    fn sub_path_and_strip_prefix() {
        let mount = VirtualPath::new("/s3");
        let child = VirtualPath::new("/s3/a/b.txt");
        assert!(child.is_sub_path_of(&mount));
        assert_eq!(child.strip_prefix(&mount).to_path_string(), "/a/b.txt");

        let root = VirtualPath::root();
        assert!(child.is_sub_path_of(&root));
        assert_eq!(child.strip_prefix(&root), child);
    }

    #[test]
    fn not_a_sub_path_when_sibling() {
        let mount = VirtualPath::new("/s3");
        let sibling = VirtualPath::new("/s3-backup/x");
        assert!(!sibling.is_sub_path_of(&mount));
    }
}
