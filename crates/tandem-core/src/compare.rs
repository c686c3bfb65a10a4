//! The category engine.
//!
//! Assigns every pair its [`Category`] from the two sides' attributes and
//! the base pair's comparison settings. Time comparison allows a tolerance
//! plus whitelisted timezone-shift multiples; byte comparison is delegated
//! to a caller-supplied probe so the pure classification stays device-free.

use tandem_vfs::FileError;

use crate::insync::CompareVariant;
use crate::tree::{
    BaseFolderPair, Category, ChildItems, FileAttrs, FolderAttrs, LinkAttrs, Side,
};

/// FAT stores file times with 2-second precision: "why does the timestamp
/// increase by up to 2 seconds when I copy a file to a USB thumb drive?"
pub const FAT_FILE_TIME_PRECISION_SEC: i64 = 2;

#[derive(Debug, Clone)]
pub struct CompareConfig {
    pub variant: CompareVariant,
    /// Seconds two mod-times may differ and still count as equal.
    pub file_time_tolerance: i64,
    /// Whole-minute shifts to ignore (DST, timezone-naive filesystems);
    /// any multiple of an entry is accepted.
    pub ignore_time_shift_minutes: Vec<u32>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            variant: CompareVariant::TimeSize,
            file_time_tolerance: FAT_FILE_TIME_PRECISION_SEC,
            ignore_time_shift_minutes: Vec::new(),
        }
    }
}

/// `true` iff the two times agree within `tolerance`, directly or after
/// subtracting some multiple of a whitelisted shift.
pub fn same_file_time(lhs: i64, rhs: i64, tolerance: i64, shift_minutes: &[u32]) -> bool {
    let delta = (lhs - rhs).abs();
    if delta <= tolerance {
        return true;
    }
    for &minutes in shift_minutes {
        if minutes == 0 {
            continue;
        }
        let shift = i64::from(minutes) * 60;
        let residual = delta % shift;
        if residual <= tolerance || shift - residual <= tolerance {
            return true;
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeCompare {
    Equal,
    LeftNewer,
    RightNewer,
}

pub fn compare_file_time(lhs: i64, rhs: i64, tolerance: i64, shift_minutes: &[u32]) -> TimeCompare {
    if same_file_time(lhs, rhs, tolerance, shift_minutes) {
        TimeCompare::Equal
    } else if lhs > rhs {
        TimeCompare::LeftNewer
    } else {
        TimeCompare::RightNewer
    }
}

/// Byte-equality oracle for the `Content` variant: receives the relative
/// paths of both sides, answers whether the contents match.
pub type ContentProbe<'a> = dyn FnMut(&str, &str) -> Result<bool, FileError> + 'a;

/// Category plus the optional extra description carried into the resolver.
type Classified = (Category, Option<String>);

fn equal_or_metadata_diff(name_left: &str, name_right: &str) -> Classified {
    if name_left == name_right {
        (Category::Equal, None)
    } else {
        (
            Category::DifferentMetadata,
            Some(format!("name differs in case: {name_left} <-> {name_right}")),
        )
    }
}

pub fn classify_file(
    left: Option<&FileAttrs>,
    right: Option<&FileAttrs>,
    cfg: &CompareConfig,
    content_equal: Option<Result<bool, FileError>>,
) -> Classified {
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        (Some(_), None) => return (Category::LeftOnly, None),
        (None, Some(_)) => return (Category::RightOnly, None),
        (None, None) => return (Category::Equal, None),
    };

    match cfg.variant {
        CompareVariant::TimeSize => {
            let time = compare_file_time(
                l.mod_time,
                r.mod_time,
                cfg.file_time_tolerance,
                &cfg.ignore_time_shift_minutes,
            );
            if l.size == r.size {
                match time {
                    TimeCompare::Equal => equal_or_metadata_diff(&l.name, &r.name),
                    TimeCompare::LeftNewer => (Category::LeftNewer, None),
                    TimeCompare::RightNewer => (Category::RightNewer, None),
                }
            } else {
                match time {
                    TimeCompare::Equal => (
                        Category::Conflict,
                        Some("files have the same modification time but a different size".into()),
                    ),
                    _ => (Category::DifferentContent, None),
                }
            }
        }
        CompareVariant::Content => match content_equal {
            Some(Ok(true)) => equal_or_metadata_diff(&l.name, &r.name),
            Some(Ok(false)) => (Category::DifferentContent, None),
            Some(Err(err)) => (
                Category::Conflict,
                Some(format!("cannot compare file content: {err}")),
            ),
            None => (
                Category::Conflict,
                Some("content comparison not available".into()),
            ),
        },
        CompareVariant::Size => {
            if l.size == r.size {
                equal_or_metadata_diff(&l.name, &r.name)
            } else {
                (Category::DifferentContent, None)
            }
        }
    }
}

pub fn classify_symlink(
    left: Option<&LinkAttrs>,
    right: Option<&LinkAttrs>,
    cfg: &CompareConfig,
) -> Classified {
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        (Some(_), None) => return (Category::LeftOnly, None),
        (None, Some(_)) => return (Category::RightOnly, None),
        (None, None) => return (Category::Equal, None),
    };

    match cfg.variant {
        CompareVariant::TimeSize => match compare_file_time(
            l.mod_time,
            r.mod_time,
            cfg.file_time_tolerance,
            &cfg.ignore_time_shift_minutes,
        ) {
            TimeCompare::Equal => equal_or_metadata_diff(&l.name, &r.name),
            TimeCompare::LeftNewer => (Category::LeftNewer, None),
            TimeCompare::RightNewer => (Category::RightNewer, None),
        },
        // both variants compare the link target string
        CompareVariant::Content | CompareVariant::Size => match (&l.target, &r.target) {
            (Some(lt), Some(rt)) => {
                if lt == rt {
                    equal_or_metadata_diff(&l.name, &r.name)
                } else {
                    (Category::DifferentContent, None)
                }
            }
            _ => (
                Category::Conflict,
                Some("cannot compare symbolic link targets".into()),
            ),
        },
    }
}

pub fn classify_folder(left: Option<&FolderAttrs>, right: Option<&FolderAttrs>) -> Classified {
    let (l, r) = match (left, right) {
        (Some(l), Some(r)) => (l, r),
        (Some(_), None) => return (Category::LeftOnly, None),
        (None, Some(_)) => return (Category::RightOnly, None),
        (None, None) => return (Category::Equal, None),
    };
    if l.is_followed_symlink != r.is_followed_symlink {
        return (
            Category::DifferentMetadata,
            Some("one side is a followed symbolic link".into()),
        );
    }
    equal_or_metadata_diff(&l.name, &r.name)
}

/// Assign categories to every pair of the base. A `Content` comparison
/// needs `content_probe`; probe failures surface as per-item conflicts.
pub fn categorize_base(base: &mut BaseFolderPair, mut content_probe: Option<&mut ContentProbe<'_>>) {
    let cfg = base.config.clone();
    categorize_children(&mut base.children, "", "", &cfg, &mut content_probe);
}

fn categorize_children(
    children: &mut ChildItems,
    rel_left: &str,
    rel_right: &str,
    cfg: &CompareConfig,
    content_probe: &mut Option<&mut ContentProbe<'_>>,
) {
    for file in &mut children.files {
        let content_equal = match cfg.variant {
            CompareVariant::Content
                if !file.is_empty(Side::Left) && !file.is_empty(Side::Right) =>
            {
                content_probe.as_mut().map(|probe| {
                    probe(
                        &join_rel(rel_left, file.name_pref(Side::Left)),
                        &join_rel(rel_right, file.name_pref(Side::Right)),
                    )
                })
            }
            _ => None,
        };
        let (category, note) = classify_file(
            file.attrs(Side::Left),
            file.attrs(Side::Right),
            cfg,
            content_equal,
        );
        file.category = category;
        file.cat_note = note;
    }

    for link in &mut children.symlinks {
        let (category, note) = classify_symlink(link.attrs(Side::Left), link.attrs(Side::Right), cfg);
        link.category = category;
        link.cat_note = note;
    }

    for folder in &mut children.folders {
        let (category, note) = classify_folder(folder.attrs(Side::Left), folder.attrs(Side::Right));
        folder.category = category;
        folder.cat_note = note;

        let sub_left = join_rel(rel_left, folder.name_pref(Side::Left));
        let sub_right = join_rel(rel_right, folder.name_pref(Side::Right));
        categorize_children(&mut folder.children, &sub_left, &sub_right, cfg, content_probe);
    }
}

pub(crate) fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_boundary() {
        assert!(same_file_time(100, 102, 2, &[]));
        assert!(!same_file_time(100, 103, 2, &[]));
    }

    #[test]
    fn time_shift_multiples_accepted() {
        // exactly one hour off
        assert!(same_file_time(10_000, 10_000 + 3600, 2, &[60]));
        // two hours off: a multiple of the whitelisted hour
        assert!(same_file_time(10_000, 10_000 + 7200, 2, &[60]));
        // an hour plus a bit within tolerance
        assert!(same_file_time(10_000, 10_000 + 3601, 2, &[60]));
        // an hour plus too much
        assert!(!same_file_time(10_000, 10_000 + 3700, 2, &[60]));
        // no shift configured
        assert!(!same_file_time(10_000, 10_000 + 3600, 2, &[]));
    }

    #[test]
    fn time_size_categories() {
        let cfg = CompareConfig::default();
        let l = FileAttrs::new("a.txt", 10, 100);
        let mut r = FileAttrs::new("a.txt", 10, 100);
        assert_eq!(
            classify_file(Some(&l), Some(&r), &cfg, None).0,
            Category::Equal
        );

        r.mod_time = 200;
        assert_eq!(
            classify_file(Some(&l), Some(&r), &cfg, None).0,
            Category::RightNewer
        );

        // same time, different size: cannot say which side is wanted
        r.mod_time = 100;
        r.size = 11;
        let (cat, note) = classify_file(Some(&l), Some(&r), &cfg, None);
        assert_eq!(cat, Category::Conflict);
        assert!(note.unwrap().contains("same modification time"));

        // different time and size
        r.mod_time = 300;
        assert_eq!(
            classify_file(Some(&l), Some(&r), &cfg, None).0,
            Category::DifferentContent
        );
    }

    #[test]
    fn name_case_mismatch_is_metadata_difference() {
        let cfg = CompareConfig::default();
        let l = FileAttrs::new("Readme.txt", 5, 50);
        let r = FileAttrs::new("README.txt", 5, 50);
        let (cat, _) = classify_file(Some(&l), Some(&r), &cfg, None);
        assert_eq!(cat, Category::DifferentMetadata);
    }

    #[test]
    fn symlink_content_variant_compares_targets() {
        let cfg = CompareConfig {
            variant: CompareVariant::Content,
            ..CompareConfig::default()
        };
        let l = LinkAttrs::new("ln", 10).with_target("a");
        let mut r = LinkAttrs::new("ln", 999).with_target("a");
        assert_eq!(
            classify_symlink(Some(&l), Some(&r), &cfg).0,
            Category::Equal
        );
        r.target = Some("b".into());
        assert_eq!(
            classify_symlink(Some(&l), Some(&r), &cfg).0,
            Category::DifferentContent
        );
    }
}
