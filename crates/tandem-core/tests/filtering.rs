mod common;

use common::{add_file, memory_base};
use tandem_core::{
    apply_hard_filter, apply_soft_filter, apply_time_span_filter, FileAttrs, FilePair,
    FilterStrategy, FolderAttrs, FolderPair, NameFilter, SoftFilter,
};

fn base_with_logs_folder() -> tandem_core::BaseFolderPair {
    let mut base = memory_base();
    add_file(&mut base, "keep.txt", Some((1, 10)), Some((1, 10)));

    let folder_id = base.next_id();
    let mut logs = FolderPair::new(
        folder_id,
        Some(FolderAttrs::new("logs")),
        Some(FolderAttrs::new("logs")),
    );
    let f1 = base.next_id();
    logs.children
        .files
        .push(FilePair::new(f1, Some(FileAttrs::new("a.log", 2, 20)), None));
    let f2 = base.next_id();
    logs.children
        .files
        .push(FilePair::new(f2, None, Some(FileAttrs::new("b.log", 3, 30))));
    base.children.folders.push(logs);
    base
}

#[test]
fn excluded_folder_deactivates_whole_subtree() {
    let mut base = base_with_logs_folder();
    let filter = NameFilter::new(["*"], ["logs", "*.log"]).unwrap();

    apply_hard_filter(&mut base, &filter, FilterStrategy::Set);

    assert!(base.children.files[0].active);
    let logs = &base.children.folders[0];
    assert!(!logs.active);
    assert!(logs.children.files.iter().all(|f| !f.active));
}

#[test]
fn set_then_and_with_same_filter_changes_nothing() {
    let mut base = base_with_logs_folder();
    let filter = NameFilter::new(["*"], ["*.log"]).unwrap();

    apply_hard_filter(&mut base, &filter, FilterStrategy::Set);
    let snapshot: Vec<bool> = collect_active(&base);

    apply_hard_filter(&mut base, &filter, FilterStrategy::And);
    assert_eq!(collect_active(&base), snapshot);
}

fn collect_active(base: &tandem_core::BaseFolderPair) -> Vec<bool> {
    let mut out = Vec::new();
    base.children.for_each(&mut |node| {
        out.push(match node {
            tandem_core::NodeRef::File(f) => f.active,
            tandem_core::NodeRef::Symlink(l) => l.active,
            tandem_core::NodeRef::Folder(d) => d.active,
        });
    });
    out
}

#[test]
fn and_strategy_only_tightens() {
    let mut base = memory_base();
    add_file(&mut base, "a.txt", Some((1, 10)), None);
    add_file(&mut base, "b.log", Some((1, 10)), None);
    base.children.files[0].active = false; // user excluded the row manually

    let filter = NameFilter::new(["*"], ["*.log"]).unwrap();
    apply_hard_filter(&mut base, &filter, FilterStrategy::And);

    assert!(!base.children.files[0].active, "and must not re-activate");
    assert!(!base.children.files[1].active);
}

#[test]
fn soft_filter_keeps_row_if_either_side_matches() {
    let mut base = memory_base();
    add_file(&mut base, "mixed", Some((100, 10)), Some((5_000, 10)));
    add_file(&mut base, "both-large", Some((5_000, 10)), Some((6_000, 10)));

    let filter = SoftFilter {
        size_max: Some(1_000),
        ..SoftFilter::default()
    };
    apply_soft_filter(&mut base, &filter, FilterStrategy::And);

    assert!(base.children.files[0].active);
    assert!(!base.children.files[1].active);
}

#[test]
fn time_span_filter_drops_folders_but_scans_descendants() {
    let mut base = memory_base();
    let folder_id = base.next_id();
    let mut folder = FolderPair::new(
        folder_id,
        Some(FolderAttrs::new("sub")),
        Some(FolderAttrs::new("sub")),
    );
    let in_range = base.next_id();
    folder.children.files.push(FilePair::new(
        in_range,
        Some(FileAttrs::new("new.txt", 1, 150)),
        None,
    ));
    let out_of_range = base.next_id();
    folder.children.files.push(FilePair::new(
        out_of_range,
        Some(FileAttrs::new("old.txt", 1, 50)),
        None,
    ));
    base.children.folders.push(folder);

    apply_time_span_filter(&mut base, 100, 200);

    let folder = &base.children.folders[0];
    assert!(!folder.active, "folders always drop under a time span");
    assert!(folder.children.files[0].active);
    assert!(!folder.children.files[1].active);
}

#[test]
fn two_sided_time_span_uses_either_side() {
    let mut base = memory_base();
    add_file(&mut base, "a", Some((1, 50)), Some((1, 150)));
    add_file(&mut base, "b", Some((1, 50)), Some((1, 60)));

    apply_time_span_filter(&mut base, 100, 200);

    assert!(base.children.files[0].active);
    assert!(!base.children.files[1].active);
}
