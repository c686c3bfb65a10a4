mod common;

use std::fs;
use std::sync::Arc;

use common::{disk_base, RecordingCallback};
use eyre::Result;
use tandem_core::{
    copy_to_alternate_folder, delete_from_model, CompareConfig, DirectionConfig, FileAttrs,
    FilePair, FolderAttrs, FolderPair, NodeId, Side, SyncDirection,
};
use tandem_vfs::{AbstractPath, NativeDevice, VfsPath};

fn add_disk_file(
    base: &mut tandem_core::BaseFolderPair,
    name: &str,
    left: Option<(u64, i64)>,
    right: Option<(u64, i64)>,
) -> NodeId {
    let id = base.next_id();
    base.children.files.push(FilePair::new(
        id,
        left.map(|(size, t)| FileAttrs::new(name, size, t)),
        right.map(|(size, t)| FileAttrs::new(name, size, t)),
    ));
    id
}

#[test]
fn copy_to_keeps_relative_paths_and_creates_parents() -> Result<()> {
    let temp = tempfile::tempdir()?;
    fs::create_dir_all(temp.path().join("left/sub"))?;
    fs::create_dir(temp.path().join("right"))?;
    fs::write(temp.path().join("left/doc.txt"), b"hello")?;
    fs::write(temp.path().join("left/sub/inner.txt"), b"abc")?;

    let mut base = disk_base(temp.path());
    let doc = add_disk_file(&mut base, "doc.txt", Some((5, 1_000)), None);

    let folder_id = base.next_id();
    let mut sub = FolderPair::new(folder_id, Some(FolderAttrs::new("sub")), None);
    let inner = base.next_id();
    sub.children.files.push(FilePair::new(
        inner,
        Some(FileAttrs::new("inner.txt", 3, 2_000)),
        None,
    ));
    base.children.folders.push(sub);

    let target = AbstractPath::new(
        Arc::clone(&base.base_path(Side::Left).device),
        VfsPath::new("target"),
    );

    let mut callback = RecordingCallback::default();
    copy_to_alternate_folder(
        &base,
        &[doc, folder_id, inner],
        &[],
        &target,
        true,
        false,
        &mut callback,
    )
    .expect("not cancelled");

    assert_eq!(callback.phases, vec![(3, 8)]);
    assert!(callback.errors.is_empty());
    assert_eq!(fs::read(temp.path().join("target/doc.txt"))?, b"hello");
    assert_eq!(fs::read(temp.path().join("target/sub/inner.txt"))?, b"abc");

    // the modification times recorded in the model were applied
    let meta = fs::metadata(temp.path().join("target/doc.txt"))?;
    assert_eq!(
        filetime::FileTime::from_last_modification_time(&meta).unix_seconds(),
        1_000
    );
    assert_eq!(callback.items_done, 3);
    assert_eq!(callback.bytes_done, 8);
    Ok(())
}

#[test]
fn copy_to_respects_overwrite_flag() -> Result<()> {
    let temp = tempfile::tempdir()?;
    fs::create_dir(temp.path().join("left"))?;
    fs::create_dir(temp.path().join("right"))?;
    fs::create_dir(temp.path().join("target"))?;
    fs::write(temp.path().join("left/doc.txt"), b"fresh")?;
    fs::write(temp.path().join("target/doc.txt"), b"stale")?;

    let mut base = disk_base(temp.path());
    let doc = add_disk_file(&mut base, "doc.txt", Some((5, 1_000)), None);
    let target = AbstractPath::new(
        Arc::clone(&base.base_path(Side::Left).device),
        VfsPath::new("target"),
    );

    // without overwrite: the existing target is an error, batch continues
    let mut callback = RecordingCallback::default();
    copy_to_alternate_folder(&base, &[doc], &[], &target, false, false, &mut callback)
        .expect("not cancelled");
    assert_eq!(callback.errors.len(), 1);
    assert_eq!(fs::read(temp.path().join("target/doc.txt"))?, b"stale");

    // with overwrite: replaced
    let mut callback = RecordingCallback::default();
    copy_to_alternate_folder(&base, &[doc], &[], &target, false, true, &mut callback)
        .expect("not cancelled");
    assert!(callback.errors.is_empty());
    assert_eq!(fs::read(temp.path().join("target/doc.txt"))?, b"fresh");
    Ok(())
}

#[test]
fn delete_updates_model_directions_and_prunes() -> Result<()> {
    let temp = tempfile::tempdir()?;
    fs::create_dir(temp.path().join("left"))?;
    fs::create_dir(temp.path().join("right"))?;
    fs::write(temp.path().join("left/kill.txt"), b"k")?;
    fs::write(temp.path().join("right/kill.txt"), b"k")?;
    fs::write(temp.path().join("left/gone.txt"), b"g")?;
    fs::create_dir(temp.path().join("left/subdir"))?;
    fs::write(temp.path().join("left/subdir/nested.txt"), b"n")?;

    let mut base = disk_base(temp.path());
    let kill = add_disk_file(&mut base, "kill.txt", Some((1, 10)), Some((1, 10)));
    let gone = add_disk_file(&mut base, "gone.txt", Some((1, 10)), None);
    let folder_id = base.next_id();
    let mut subdir = FolderPair::new(folder_id, Some(FolderAttrs::new("subdir")), None);
    let nested = base.next_id();
    subdir.children.files.push(FilePair::new(
        nested,
        Some(FileAttrs::new("nested.txt", 1, 10)),
        None,
    ));
    base.children.folders.push(subdir);

    let mut callback = RecordingCallback::default();
    let mut warn_flag = true;
    delete_from_model(
        &mut base,
        &DirectionConfig::two_way(),
        &[kill, gone, folder_id],
        &[],
        false,
        &mut warn_flag,
        &mut callback,
    )
    .expect("not cancelled");

    assert!(!temp.path().join("left/kill.txt").exists());
    assert!(!temp.path().join("left/gone.txt").exists());
    assert!(!temp.path().join("left/subdir").exists());
    assert!(temp.path().join("right/kill.txt").exists());
    assert!(callback.warnings.is_empty());

    // the surviving half gets a policy-derived direction
    assert_eq!(base.children.files.len(), 1);
    let kill_pair = &base.children.files[0];
    assert!(kill_pair.is_empty(Side::Left));
    assert_eq!(kill_pair.direction, SyncDirection::Right);

    // fully deleted rows are pruned from the model
    assert!(base.children.folders.is_empty());
    Ok(())
}

#[test]
fn delete_warns_once_when_recycler_missing() -> Result<()> {
    let temp = tempfile::tempdir()?;
    fs::create_dir(temp.path().join("left"))?;
    fs::create_dir(temp.path().join("right"))?;
    fs::write(temp.path().join("left/a.txt"), b"a")?;
    fs::write(temp.path().join("left/b.txt"), b"b")?;

    let dev: Arc<dyn tandem_vfs::Device> =
        Arc::new(NativeDevice::new(temp.path()).with_recycle_support(false));
    let mut base = tandem_core::BaseFolderPair::new(
        AbstractPath::new(Arc::clone(&dev), VfsPath::new("left")),
        AbstractPath::new(dev, VfsPath::new("right")),
        CompareConfig::default(),
    );
    let a = add_disk_file(&mut base, "a.txt", Some((1, 10)), None);
    let b = add_disk_file(&mut base, "b.txt", Some((1, 10)), None);

    let mut callback = RecordingCallback::default();
    let mut warn_flag = true;
    delete_from_model(
        &mut base,
        &DirectionConfig::two_way(),
        &[a, b],
        &[],
        true, // user asked for the recycle bin
        &mut warn_flag,
        &mut callback,
    )
    .expect("not cancelled");

    // one warning for the whole batch, then permanent deletion
    assert_eq!(callback.warnings.len(), 1);
    assert!(callback.warnings[0].contains("recycle bin is not supported"));
    assert!(!temp.path().join("left/a.txt").exists());
    assert!(!temp.path().join("left/b.txt").exists());
    Ok(())
}

#[test]
fn cancelled_delete_keeps_model_consistent_with_disk() -> Result<()> {
    let temp = tempfile::tempdir()?;
    fs::create_dir(temp.path().join("left"))?;
    fs::create_dir(temp.path().join("right"))?;
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(temp.path().join("left").join(name), b"x")?;
    }

    let mut base = disk_base(temp.path());
    let a = add_disk_file(&mut base, "a.txt", Some((1, 10)), None);
    let b = add_disk_file(&mut base, "b.txt", Some((1, 10)), None);
    let c = add_disk_file(&mut base, "c.txt", Some((1, 10)), None);

    let mut callback = RecordingCallback {
        cancel_after_polls: Some(1),
        ..Default::default()
    };
    let mut warn_flag = true;
    let outcome = delete_from_model(
        &mut base,
        &DirectionConfig::two_way(),
        &[a, b, c],
        &[],
        false,
        &mut warn_flag,
        &mut callback,
    );
    assert!(outcome.is_err(), "expected cancellation");

    // committed work stays; the aborted remainder is untouched
    assert!(!temp.path().join("left/a.txt").exists());
    assert!(!temp.path().join("left/b.txt").exists());
    assert!(temp.path().join("left/c.txt").exists());

    // model mirrors disk: a and b pruned, c still present on the left
    assert_eq!(base.children.files.len(), 1);
    assert!(!base.children.files[0].is_empty(Side::Left));
    Ok(())
}
