mod common;

use std::sync::Arc;

use common::{add_file, memory_base, memory_base_with, RecordingCallback};
use tandem_core::insync::{
    FolderStatus, InSyncDescrFile, InSyncFile, InSyncFolder, InSyncSymlink, InSyncDescrLink,
};
use tandem_core::resolve::{
    TXT_BOTH_SIDES_CHANGED, TXT_DB_NOT_IN_SYNC, TXT_NO_SIDE_CHANGED,
};
use tandem_core::{
    apply_one_way, categorize_base, resolve_directions, Category, CompareConfig, CompareVariant,
    DirectionConfig, DirectionPolicy, FileAttrs, FilePair, FixedStateLoader, FolderAttrs,
    FolderPair, PolicyDir, SyncDirection,
};

fn db_file(size: u64, t_left: i64, t_right: i64, variant: CompareVariant) -> InSyncFile {
    InSyncFile {
        left: InSyncDescrFile {
            mod_time: t_left,
            file_print: 0,
        },
        right: InSyncDescrFile {
            mod_time: t_right,
            file_print: 0,
        },
        file_size: size,
        cmp_variant: variant,
    }
}

fn resolve_two_way(
    base: &mut tandem_core::BaseFolderPair,
    db: Option<InSyncFolder>,
) -> RecordingCallback {
    let mut callback = RecordingCallback::default();
    let mut loader = FixedStateLoader::new(db.map(Arc::new));
    let mut targets = [(base, DirectionConfig::two_way())];
    resolve_directions(&mut targets, &mut loader, &mut callback).expect("not cancelled");
    callback
}

#[test]
fn first_run_overwrites_older_with_newer() {
    // two-way without a database: newer side wins, and the user is told
    let mut base = memory_base();
    add_file(&mut base, "a.txt", Some((10, 100)), Some((10, 200)));
    categorize_base(&mut base, None);
    assert_eq!(base.children.files[0].category, Category::RightNewer);

    let callback = resolve_two_way(&mut base, None);
    assert_eq!(base.children.files[0].direction, SyncDirection::Left);
    assert!(callback
        .log
        .iter()
        .any(|msg| msg.contains("Setting directions for first synchronization")));
}

#[test]
fn unreadable_database_degrades_to_first_run() {
    let mut base = memory_base();
    add_file(&mut base, "a.txt", Some((10, 100)), Some((10, 200)));
    categorize_base(&mut base, None);

    let mut callback = RecordingCallback::default();
    let mut loader = tandem_core::insync::FailingStateLoader;
    let mut targets = [(&mut base, DirectionConfig::two_way())];
    resolve_directions(&mut targets, &mut loader, &mut callback).expect("not cancelled");

    // load error surfaced, then the no-database fallback took over
    assert!(callback
        .log
        .iter()
        .any(|msg| msg.contains("Cannot load the last synchronization state")));
    assert_eq!(base.children.files[0].direction, SyncDirection::Left);
}

#[test]
fn deletion_is_mirrored_not_resurrected() {
    // b.txt was in sync, then deleted on the left: the right copy goes too
    let mut base = memory_base();
    add_file(&mut base, "b.txt", None, Some((5, 50)));
    categorize_base(&mut base, None);

    let mut db = InSyncFolder::default();
    db.files
        .insert("b.txt".into(), db_file(5, 50, 50, CompareVariant::TimeSize));

    resolve_two_way(&mut base, Some(db));
    assert_eq!(base.children.files[0].direction, SyncDirection::Right);
}

#[test]
fn change_on_one_side_propagates_toward_other() {
    let mut base = memory_base();
    add_file(&mut base, "c.txt", Some((7, 500)), Some((5, 50)));
    categorize_base(&mut base, None);

    let mut db = InSyncFolder::default();
    db.files
        .insert("c.txt".into(), db_file(5, 50, 50, CompareVariant::TimeSize));

    resolve_two_way(&mut base, Some(db));
    // left changed, right untouched: push left's version to the right
    assert_eq!(base.children.files[0].direction, SyncDirection::Right);
}

#[test]
fn both_sides_changed_is_a_conflict() {
    let mut base = memory_base();
    add_file(&mut base, "c.txt", Some((7, 500)), Some((8, 600)));
    categorize_base(&mut base, None);

    let mut db = InSyncFolder::default();
    db.files
        .insert("c.txt".into(), db_file(5, 50, 50, CompareVariant::TimeSize));

    resolve_two_way(&mut base, Some(db));
    assert_eq!(
        base.children.files[0].direction,
        SyncDirection::Conflict(TXT_BOTH_SIDES_CHANGED.into())
    );
}

#[test]
fn no_change_but_unequal_is_a_conflict() {
    // both sides still match the database, yet they differ from each other:
    // the recorded state is contradictory
    let mut base = memory_base();
    add_file(&mut base, "c.txt", Some((5, 50)), Some((5, 50)));
    categorize_base(&mut base, None);
    // force a non-equal category with matching db state on both sides
    base.children.files[0].category = Category::DifferentContent;

    let mut db = InSyncFolder::default();
    db.files
        .insert("c.txt".into(), db_file(5, 50, 50, CompareVariant::TimeSize));

    resolve_two_way(&mut base, Some(db));
    assert_eq!(
        base.children.files[0].direction,
        SyncDirection::Conflict(TXT_NO_SIDE_CHANGED.into())
    );
}

#[test]
fn stale_database_blocks_direction() {
    // database recorded under time/size; session now compares content:
    // the record proves nothing, so a one-sided change must not sync
    let mut base = memory_base_with(CompareConfig {
        variant: CompareVariant::Content,
        ..CompareConfig::default()
    });
    add_file(&mut base, "d.txt", Some((5, 50)), Some((5, 999)));
    let mut probe = |_l: &str, _r: &str| Ok(false);
    categorize_base(&mut base, Some(&mut probe));
    assert_eq!(base.children.files[0].category, Category::DifferentContent);

    let mut db = InSyncFolder::default();
    db.files
        .insert("d.txt".into(), db_file(5, 50, 50, CompareVariant::TimeSize));

    resolve_two_way(&mut base, Some(db));
    assert_eq!(
        base.children.files[0].direction,
        SyncDirection::Conflict(TXT_DB_NOT_IN_SYNC.into())
    );
}

#[test]
fn content_database_satisfies_time_size_session() {
    // the asymmetric acceptance rule: a content-verified record is
    // certainly good enough for a time/size session, even when its two
    // recorded times lie far apart
    let mut base = memory_base();
    add_file(&mut base, "d.txt", Some((5, 50)), Some((5, 400)));
    categorize_base(&mut base, None);

    let mut db = InSyncFolder::default();
    // |50 - 999| is way past any tolerance; a time/size record this shape
    // would be stale, but the content variant vouches for it
    db.files
        .insert("d.txt".into(), db_file(5, 50, 999, CompareVariant::Content));

    resolve_two_way(&mut base, Some(db));
    // only the right side changed: propagate its version to the left
    assert_eq!(base.children.files[0].direction, SyncDirection::Left);
}

#[test]
fn temp_files_are_swept_regardless_of_policy() {
    let mut base = memory_base();
    add_file(&mut base, "e.txt.tdm_tmp", Some((3, 10)), None);
    categorize_base(&mut base, None);

    // update policy would normally copy a left-only file to the right
    let policy = tandem_core::extract_directions(&DirectionConfig::update());
    apply_one_way(&mut base, &policy);
    assert_eq!(base.children.files[0].direction, SyncDirection::Left);
}

#[test]
fn temp_folder_is_swept_recursively_without_descending() {
    let mut base = memory_base();
    let folder_id = base.next_id();
    let mut folder = FolderPair::new(
        folder_id,
        Some(FolderAttrs::new("work.tdm_tmp")),
        None,
    );
    let child_id = base.next_id();
    folder.children.files.push(FilePair::new(
        child_id,
        Some(FileAttrs::new("part", 1, 1)),
        None,
    ));
    base.children.folders.push(folder);

    apply_one_way(&mut base, &tandem_core::extract_directions(&DirectionConfig::mirror()));

    let folder = &base.children.folders[0];
    assert_eq!(folder.direction, SyncDirection::Left);
    assert_eq!(folder.children.files[0].direction, SyncDirection::Left);
}

#[test]
fn equal_items_always_resolve_to_none() {
    let mut base = memory_base();
    add_file(&mut base, "same.txt", Some((4, 40)), Some((4, 40)));
    categorize_base(&mut base, None);

    resolve_two_way(&mut base, Some(InSyncFolder::default()));
    assert_eq!(base.children.files[0].direction, SyncDirection::None);
}

#[test]
fn resolver_is_idempotent() {
    let mut base = memory_base();
    add_file(&mut base, "a", Some((1, 10)), Some((1, 20)));
    add_file(&mut base, "b", Some((2, 30)), None);
    add_file(&mut base, "c", None, Some((3, 40)));
    categorize_base(&mut base, None);

    let mut db = InSyncFolder::default();
    db.files
        .insert("b".into(), db_file(2, 30, 30, CompareVariant::TimeSize));

    resolve_two_way(&mut base, Some(db.clone()));
    let first: Vec<SyncDirection> = base
        .children
        .files
        .iter()
        .map(|f| f.direction.clone())
        .collect();

    resolve_two_way(&mut base, Some(db));
    let second: Vec<SyncDirection> = base
        .children
        .files
        .iter()
        .map(|f| f.direction.clone())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn mirrored_tree_with_mirrored_policy_flips_every_direction() {
    let policy = DirectionPolicy {
        ex_left_only: PolicyDir::Right,
        ex_right_only: PolicyDir::None,
        left_newer: PolicyDir::Right,
        right_newer: PolicyDir::Left,
        different: PolicyDir::None,
        conflict: PolicyDir::None,
    };

    let mut base = memory_base();
    add_file(&mut base, "a", Some((1, 10)), Some((1, 20)));
    add_file(&mut base, "b", Some((2, 30)), None);
    add_file(&mut base, "c", None, Some((3, 40)));
    add_file(&mut base, "d", Some((9, 50)), Some((4, 60)));
    add_file(&mut base, "e", Some((5, 70)), Some((5, 70)));
    categorize_base(&mut base, None);

    apply_one_way(&mut base, &policy);
    let original: Vec<SyncDirection> = base
        .children
        .files
        .iter()
        .map(|f| f.direction.clone())
        .collect();

    base.flip();
    apply_one_way(&mut base, &policy.mirrored());
    let mirrored: Vec<SyncDirection> = base
        .children
        .files
        .iter()
        .map(|f| f.direction.clone())
        .collect();

    assert_eq!(original.len(), mirrored.len());
    for (before, after) in original.into_iter().zip(mirrored) {
        match before {
            SyncDirection::Left => assert_eq!(after, SyncDirection::Right),
            SyncDirection::Right => assert_eq!(after, SyncDirection::Left),
            SyncDirection::None => assert_eq!(after, SyncDirection::None),
            SyncDirection::Conflict(_) => assert!(after.is_conflict()),
        }
    }
}

#[test]
fn straw_man_folder_is_absent_but_traversable() {
    let mut base = memory_base();
    let folder_id = base.next_id();
    let mut folder = FolderPair::new(
        folder_id,
        Some(FolderAttrs::new("sub")),
        Some(FolderAttrs::new("sub")),
    );
    let file_id = base.next_id();
    folder.children.files.push(FilePair::new(
        file_id,
        None,
        Some(FileAttrs::new("f.txt", 5, 50)),
    ));
    base.children.folders.push(folder);
    categorize_base(&mut base, None);

    let mut sub = InSyncFolder {
        status: FolderStatus::StrawMan,
        ..InSyncFolder::default()
    };
    sub.files
        .insert("f.txt".into(), db_file(5, 50, 50, CompareVariant::TimeSize));
    let mut db = InSyncFolder::default();
    db.folders.insert("sub".into(), sub);

    resolve_two_way(&mut base, Some(db));

    let folder = &base.children.folders[0];
    // folder itself is equal: no decision needed
    assert_eq!(folder.direction, SyncDirection::None);
    // the child record inside the straw-man entry still drives mirroring
    assert_eq!(folder.children.files[0].direction, SyncDirection::Right);
}

#[test]
fn symlink_database_reconciliation() {
    use tandem_core::{LinkAttrs, SymlinkPair};

    let mut base = memory_base();
    let id = base.next_id();
    base.children.symlinks.push(SymlinkPair::new(
        id,
        None,
        Some(LinkAttrs::new("ln", 50)),
    ));
    categorize_base(&mut base, None);

    let mut db = InSyncFolder::default();
    db.symlinks.insert(
        "ln".into(),
        InSyncSymlink {
            left: InSyncDescrLink { mod_time: 50 },
            right: InSyncDescrLink { mod_time: 50 },
            cmp_variant: CompareVariant::TimeSize,
        },
    );

    resolve_two_way(&mut base, Some(db));
    // deleted on the left since last sync: delete the right copy too
    assert_eq!(base.children.symlinks[0].direction, SyncDirection::Right);
}
