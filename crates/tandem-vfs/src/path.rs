//! Device-relative paths.
//!
//! A [`VfsPath`] is a forward-slash separated sequence of name components
//! with no leading or trailing separator; the empty path is the device root.
//! All engine code addresses items through these, never through native
//! `std::path` values (those appear only inside device implementations).

/// Device-relative path, normalized on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VfsPath {
    value: String,
}

impl VfsPath {
    /// The device root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build from a raw string: backslashes become slashes, repeated and
    /// leading/trailing separators are dropped.
    pub fn new(raw: &str) -> Self {
        let mut value = String::with_capacity(raw.len());
        for part in raw.split(['/', '\\']).filter(|p| !p.is_empty()) {
            if !value.is_empty() {
                value.push('/');
            }
            value.push_str(part);
        }
        Self { value }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn is_root(&self) -> bool {
        self.value.is_empty()
    }

    /// Append a relative path (itself sanitized).
    pub fn join(&self, rel: &str) -> Self {
        let rel = Self::new(rel);
        if self.is_root() {
            return rel;
        }
        if rel.is_root() {
            return self.clone();
        }
        Self {
            value: format!("{}/{}", self.value, rel.value),
        }
    }

    /// Final name component; empty for the root.
    pub fn item_name(&self) -> &str {
        match self.value.rfind('/') {
            Some(pos) => &self.value[pos + 1..],
            None => &self.value,
        }
    }

    /// Everything up to the final component; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.value.rfind('/') {
            Some(pos) => Some(Self {
                value: self.value[..pos].to_string(),
            }),
            None => Some(Self::root()),
        }
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.value.split('/').filter(|c| !c.is_empty())
    }
}

impl std::fmt::Display for VfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A raw string qualifies as an already-normalized relative path.
pub fn is_valid_rel_path(raw: &str) -> bool {
    !raw.starts_with('/')
        && !raw.ends_with('/')
        && !raw.contains('\\')
        && !raw.contains("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_separators() {
        assert_eq!(VfsPath::new("a\\b//c/").as_str(), "a/b/c");
        assert_eq!(VfsPath::new("/").as_str(), "");
        assert!(VfsPath::new("").is_root());
    }

    #[test]
    fn join_and_parent() {
        let p = VfsPath::new("sub").join("dir/file.txt");
        assert_eq!(p.as_str(), "sub/dir/file.txt");
        assert_eq!(p.item_name(), "file.txt");
        assert_eq!(p.parent().unwrap().as_str(), "sub/dir");
        assert_eq!(VfsPath::new("x").parent().unwrap(), VfsPath::root());
        assert_eq!(VfsPath::root().parent(), None);
    }

    #[test]
    fn rel_path_validity() {
        assert!(is_valid_rel_path("a/b"));
        assert!(is_valid_rel_path(""));
        assert!(!is_valid_rel_path("/a"));
        assert!(!is_valid_rel_path("a//b"));
    }
}
