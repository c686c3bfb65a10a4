//! Warn when two base folders overlap.
//!
//! A sync configuration that reads and writes the same storage area (one
//! base path being an ancestor of the other on the same device) is almost
//! always a mistake; the check is filter-aware so a fully excluded
//! subfolder does not trigger the warning.

use tandem_vfs::{devices_equal, AbstractPath};

use crate::compare::join_rel;
use crate::filter::NameFilter;

#[derive(Debug, Clone)]
pub struct PathDependency {
    pub parent: AbstractPath,
    pub child: AbstractPath,
    /// Child base relative to the parent base; empty if they are identical.
    pub rel_path: String,
}

/// Detect an ancestor/descendant relationship between the two base paths.
/// Returns `None` when the ancestor's filter provably excludes the
/// descendant subtree.
pub fn path_dependency(
    base_left: &AbstractPath,
    filter_left: &NameFilter,
    base_right: &AbstractPath,
    filter_right: &NameFilter,
) -> Option<PathDependency> {
    if !devices_equal(&base_left.device, &base_right.device) {
        return None;
    }

    let comps_left: Vec<&str> = base_left.path.components().collect();
    let comps_right: Vec<&str> = base_right.path.components().collect();

    let left_is_parent = comps_left.len() <= comps_right.len();
    let (parent, parent_comps, parent_filter, child, child_comps) = if left_is_parent {
        (base_left, &comps_left, filter_left, base_right, &comps_right)
    } else {
        (base_right, &comps_right, filter_right, base_left, &comps_left)
    };

    let is_prefix = parent_comps
        .iter()
        .zip(child_comps.iter())
        .all(|(p, c)| p == c);
    if !is_prefix {
        return None;
    }

    let mut rel_path = String::new();
    for comp in &child_comps[parent_comps.len()..] {
        rel_path = join_rel(&rel_path, comp);
    }

    // filter-excluded subfolder: no dependency. The check is best effort;
    // the user may have changed filters without re-comparing.
    if !rel_path.is_empty() {
        let result = parent_filter.passes_dir(&rel_path);
        if !result.passed && !result.child_might_match {
            return None;
        }
    }

    Some(PathDependency {
        parent: parent.clone(),
        child: child.clone(),
        rel_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_vfs::{native_device, VfsPath};

    fn ap(rel: &str) -> AbstractPath {
        AbstractPath::new(native_device("/tmp"), VfsPath::new(rel))
    }

    #[test]
    fn nested_bases_are_dependent() {
        let all = NameFilter::include_all();
        let dep = path_dependency(&ap("data"), &all, &ap("data/backup"), &all)
            .expect("nested paths must be flagged");
        assert_eq!(dep.rel_path, "backup");
        assert_eq!(dep.parent.path, VfsPath::new("data"));
    }

    #[test]
    fn siblings_are_independent() {
        let all = NameFilter::include_all();
        assert!(path_dependency(&ap("data/a"), &all, &ap("data/b"), &all).is_none());
    }

    #[test]
    fn prefix_match_is_case_sensitive() {
        let all = NameFilter::include_all();
        assert!(path_dependency(&ap("Data"), &all, &ap("data/backup"), &all).is_none());
    }

    #[test]
    fn excluded_subfolder_suppresses_dependency() {
        let excluding = NameFilter::new(["*"], ["backup"]).unwrap();
        let all = NameFilter::include_all();
        assert!(path_dependency(&ap("data"), &excluding, &ap("data/backup"), &all).is_none());
    }

    #[test]
    fn identical_bases_are_dependent() {
        let all = NameFilter::include_all();
        let dep = path_dependency(&ap("data"), &all, &ap("data"), &all).unwrap();
        assert!(dep.rel_path.is_empty());
    }
}
