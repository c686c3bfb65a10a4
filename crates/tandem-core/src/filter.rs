//! Include/exclude filtering over the pair tree.
//!
//! Two filters adjust each pair's `active` flag: the hard filter matches
//! relative paths against include/exclude glob lists, the soft filter
//! checks time and size windows. Both compose via a strategy: `Set`
//! overwrites the flag (full re-apply), `And` only tightens it. Folder
//! pruning relies on those semantics; an "or" strategy would break it.

use globset::{Glob, GlobSet, GlobSetBuilder};

use tandem_vfs::FileError;

use crate::compare::join_rel;
use crate::tree::{BaseFolderPair, ChildItems, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Overwrite `active` with the filter result.
    Set,
    /// `active := active && result`.
    And,
}

fn combine(strategy: FilterStrategy, current: bool, result: bool) -> bool {
    match strategy {
        FilterStrategy::Set => result,
        FilterStrategy::And => current && result,
    }
}

/// Answer for a folder: whether the folder itself passes, and whether any
/// descendant still might (the traversal-pruning hint).
#[derive(Debug, Clone, Copy)]
pub struct DirFilterResult {
    pub passed: bool,
    pub child_might_match: bool,
}

/// Path-pattern filter: include list ∧ ¬ exclude list, matched against the
/// relative path and the item name (case-sensitive).
pub struct NameFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    include_set: GlobSet,
    exclude_set: GlobSet,
}

impl NameFilter {
    pub fn new(
        include: impl IntoIterator<Item = impl Into<String>>,
        exclude: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, FileError> {
        let include: Vec<String> = include.into_iter().map(Into::into).collect();
        let exclude: Vec<String> = exclude.into_iter().map(Into::into).collect();
        let include_set = compile(&include)?;
        let exclude_set = compile(&exclude)?;
        Ok(Self {
            include,
            exclude,
            include_set,
            exclude_set,
        })
    }

    /// The pass-everything filter.
    pub fn include_all() -> Self {
        Self::new(["*"], [] as [&str; 0]).expect("'*' always compiles")
    }

    pub fn is_null(&self) -> bool {
        self.exclude.is_empty() && self.include.iter().any(|p| p.as_str() == "*")
    }

    fn matches(set: &GlobSet, rel_path: &str) -> bool {
        if set.is_match(rel_path) {
            return true;
        }
        match rel_path.rfind('/') {
            Some(pos) => set.is_match(&rel_path[pos + 1..]),
            None => false,
        }
    }

    fn matches_include(&self, rel_path: &str) -> bool {
        Self::matches(&self.include_set, rel_path)
    }

    fn matches_exclude(&self, rel_path: &str) -> bool {
        Self::matches(&self.exclude_set, rel_path)
    }

    pub fn passes_file(&self, rel_path: &str) -> bool {
        !self.matches_exclude(rel_path) && self.matches_include(rel_path)
    }

    /// An excluded folder excludes its whole subtree; a folder that merely
    /// fails the include list may still contain matching descendants.
    pub fn passes_dir(&self, rel_path: &str) -> DirFilterResult {
        if self.matches_exclude(rel_path) {
            return DirFilterResult {
                passed: false,
                child_might_match: false,
            };
        }
        DirFilterResult {
            passed: self.matches_include(rel_path),
            child_might_match: true,
        }
    }
}

fn compile(patterns: &[String]) -> Result<GlobSet, FileError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            FileError::new(
                format!("invalid filter pattern: {pattern}"),
                e.to_string(),
            )
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| FileError::new("cannot compile filter patterns", e.to_string()))
}

/// Time/size window filter. An active time window also drops all folders,
/// which gets rid of empty-folder noise in time-scoped views.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftFilter {
    pub time_from: Option<i64>,
    pub time_to: Option<i64>,
    pub size_min: Option<u64>,
    pub size_max: Option<u64>,
}

impl SoftFilter {
    pub fn is_null(&self) -> bool {
        self.time_from.is_none()
            && self.time_to.is_none()
            && self.size_min.is_none()
            && self.size_max.is_none()
    }

    fn match_time(&self, mod_time: i64) -> bool {
        self.time_from.is_none_or(|from| mod_time >= from)
            && self.time_to.is_none_or(|to| mod_time <= to)
    }

    fn match_size(&self, size: u64) -> bool {
        self.size_min.is_none_or(|min| size >= min)
            && self.size_max.is_none_or(|max| size <= max)
    }

    fn match_folder(&self) -> bool {
        self.time_from.is_none() && self.time_to.is_none()
    }
}

//---------------------------------------------------------------------------

pub fn apply_hard_filter(base: &mut BaseFolderPair, filter: &NameFilter, strategy: FilterStrategy) {
    hard_filter_children(&mut base.children, "", filter, strategy);
}

fn hard_filter_children(
    children: &mut ChildItems,
    rel_parent: &str,
    filter: &NameFilter,
    strategy: FilterStrategy,
) {
    for file in &mut children.files {
        let rel = join_rel(rel_parent, file.name_pref(Side::Left));
        file.active = combine(strategy, file.active, filter.passes_file(&rel));
    }
    for link in &mut children.symlinks {
        let rel = join_rel(rel_parent, link.name_pref(Side::Left));
        link.active = combine(strategy, link.active, filter.passes_file(&rel));
    }
    for folder in &mut children.folders {
        let rel = join_rel(rel_parent, folder.name_pref(Side::Left));
        let result = filter.passes_dir(&rel);
        folder.active = combine(strategy, folder.active, result.passed);

        if !result.child_might_match {
            // same pruning as directory traversal: nothing below can match
            folder.children.set_active_rec(false);
            continue;
        }
        hard_filter_children(&mut folder.children, &rel, filter, strategy);
    }
}

pub fn apply_soft_filter(base: &mut BaseFolderPair, filter: &SoftFilter, strategy: FilterStrategy) {
    if filter.is_null() && strategy == FilterStrategy::And {
        return; // nothing can change
    }
    soft_filter_children(&mut base.children, filter, strategy);
}

fn soft_filter_children(children: &mut ChildItems, filter: &SoftFilter, strategy: FilterStrategy) {
    for file in &mut children.files {
        let result = match (file.attrs(Side::Left), file.attrs(Side::Right)) {
            (Some(l), Some(r)) => {
                // matching on either side is enough to keep the row
                (filter.match_size(l.size) && filter.match_time(l.mod_time))
                    || (filter.match_size(r.size) && filter.match_time(r.mod_time))
            }
            (Some(l), None) => filter.match_size(l.size) && filter.match_time(l.mod_time),
            (None, Some(r)) => filter.match_size(r.size) && filter.match_time(r.mod_time),
            (None, None) => false,
        };
        file.active = combine(strategy, file.active, result);
    }
    for link in &mut children.symlinks {
        let result = match (link.attrs(Side::Left), link.attrs(Side::Right)) {
            (Some(l), Some(r)) => filter.match_time(l.mod_time) || filter.match_time(r.mod_time),
            (Some(l), None) => filter.match_time(l.mod_time),
            (None, Some(r)) => filter.match_time(r.mod_time),
            (None, None) => false,
        };
        link.active = combine(strategy, link.active, result);
    }
    for folder in &mut children.folders {
        folder.active = combine(strategy, folder.active, filter.match_folder());
        soft_filter_children(&mut folder.children, filter, strategy);
    }
}

/// Full re-apply: "set" the hard filter, then "and" the soft filter.
pub fn apply_filtering(base: &mut BaseFolderPair, name_filter: &NameFilter, soft: &SoftFilter) {
    apply_hard_filter(base, name_filter, FilterStrategy::Set);
    apply_soft_filter(base, soft, FilterStrategy::And);
}

/// Convenience view filter: keep items whose mod-time on any present side
/// lies in `[time_from, time_to]`; folders are always dropped (descendants
/// still evaluated).
pub fn apply_time_span_filter(base: &mut BaseFolderPair, time_from: i64, time_to: i64) {
    let filter = SoftFilter {
        time_from: Some(time_from),
        time_to: Some(time_to),
        size_min: None,
        size_max: None,
    };
    soft_filter_children(&mut base.children, &filter, FilterStrategy::Set);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_wins_over_include() {
        let filter = NameFilter::new(["*"], ["*.log"]).unwrap();
        assert!(filter.passes_file("notes.txt"));
        assert!(!filter.passes_file("debug.log"));
        assert!(!filter.passes_file("sub/dir/debug.log"));
    }

    #[test]
    fn excluded_dir_prunes_children() {
        let filter = NameFilter::new(["*"], ["logs"]).unwrap();
        let result = filter.passes_dir("logs");
        assert!(!result.passed);
        assert!(!result.child_might_match);

        let kept = filter.passes_dir("src");
        assert!(kept.passed);
        assert!(kept.child_might_match);
    }

    #[test]
    fn include_miss_keeps_child_hope() {
        let filter = NameFilter::new(["*.txt"], [] as [&str; 0]).unwrap();
        let result = filter.passes_dir("docs");
        assert!(!result.passed);
        assert!(result.child_might_match);
        assert!(filter.passes_file("docs/readme.txt"));
    }

    #[test]
    fn soft_filter_windows() {
        let filter = SoftFilter {
            time_from: Some(100),
            time_to: Some(200),
            size_min: None,
            size_max: Some(1000),
        };
        assert!(filter.match_time(100) && filter.match_time(200));
        assert!(!filter.match_time(99) && !filter.match_time(201));
        assert!(filter.match_size(1000));
        assert!(!filter.match_size(1001));
        assert!(!filter.match_folder());
        assert!(SoftFilter::default().is_null());
    }
}
