//! Manual copy of selected items to an alternate folder.

use tandem_vfs::{
    copy_file_transactional, copy_symlink, create_folder_if_missing_recursive, AbstractPath,
    Cancelled, FileError, OpError, StreamAttributes,
};

use crate::progress::{log_and_status, try_reporting_error, ProcessCallback, ProcessPhase};
use crate::tree::{BaseFolderPair, NodeId, Side};

use super::{resolve_selection, ItemKind, SelectedItem};

/// Copy the selected left-side and right-side items into `target_folder`,
/// flat or with their relative paths. Per-item failures go through the
/// error callback; cancellation aborts the batch but keeps completed work.
pub fn copy_to_alternate_folder(
    base: &BaseFolderPair,
    sel_left: &[NodeId],
    sel_right: &[NodeId],
    target_folder: &AbstractPath,
    keep_rel_paths: bool,
    overwrite_if_exists: bool,
    callback: &mut dyn ProcessCallback,
) -> Result<(), Cancelled> {
    let items_left = resolve_selection(base, Side::Left, sel_left);
    let items_right = resolve_selection(base, Side::Right, sel_right);

    let item_total = items_left.len() + items_right.len();
    let byte_total = items_left
        .iter()
        .chain(items_right.iter())
        .filter(|item| item.kind == ItemKind::File)
        .map(|item| item.size)
        .sum();
    callback.init_new_phase(item_total, byte_total, ProcessPhase::None);

    copy_side(&items_left, target_folder, keep_rel_paths, overwrite_if_exists, callback)?;
    copy_side(&items_right, target_folder, keep_rel_paths, overwrite_if_exists, callback)
}

fn copy_side(
    items: &[SelectedItem],
    target_folder: &AbstractPath,
    keep_rel_paths: bool,
    overwrite_if_exists: bool,
    callback: &mut dyn ProcessCallback,
) -> Result<(), Cancelled> {
    for item in items {
        try_reporting_error(callback, &mut |cb| {
            copy_single(item, target_folder, keep_rel_paths, overwrite_if_exists, cb)
        })?;
        callback.request_ui_update(false)?;
    }
    Ok(())
}

fn copy_single(
    item: &SelectedItem,
    target_folder: &AbstractPath,
    keep_rel_paths: bool,
    overwrite_if_exists: bool,
    callback: &mut dyn ProcessCallback,
) -> Result<(), OpError> {
    let rel: &str = if keep_rel_paths {
        &item.rel_path
    } else {
        &item.name
    };
    let target = target_folder.join(rel);

    match item.kind {
        ItemKind::Folder => {
            log_and_status(callback, &format!("Creating folder {}", target.display()));
            // "already exists" is fine: intermediate parents may have been
            // created by an earlier file copy
            create_folder_if_missing_recursive(&target)?;
            callback.update_data_processed(1, 0);
        }
        ItemKind::File => {
            log_and_status(callback, &format!("Creating file {}", target.display()));
            let attrs = StreamAttributes {
                mod_time: item.mod_time,
                file_size: item.size,
                file_print: item.file_print,
            };
            let source = item.abstract_path.clone();
            let mut attempt = |on_delete: Option<&mut dyn FnMut() -> Result<(), FileError>>,
                              cb: &mut dyn ProcessCallback|
             -> Result<(), OpError> {
                copy_file_transactional(&source, &attrs, &target, true, on_delete, &mut |delta| {
                    cb.update_data_processed(0, delta);
                    cb.request_ui_update(false)
                })
                .map(|_result| ())
                // result.error_mod_time: behave like a file manager, ignore
            };
            copy_with_parent_retry(&target, overwrite_if_exists, callback, &mut attempt)?;
            callback.update_data_processed(1, 0);
        }
        ItemKind::Symlink => {
            log_and_status(
                callback,
                &format!("Creating symbolic link {}", target.display()),
            );
            let source = item.abstract_path.clone();
            let mut attempt = |on_delete: Option<&mut dyn FnMut() -> Result<(), FileError>>,
                              _cb: &mut dyn ProcessCallback|
             -> Result<(), OpError> {
                if let Some(delete_target) = on_delete {
                    delete_target()?;
                }
                copy_symlink(&source, &target)?;
                Ok(())
            };
            copy_with_parent_retry(&target, overwrite_if_exists, callback, &mut attempt)?;
            callback.update_data_processed(1, 0);
        }
    }
    Ok(())
}

/// Shared retry shape for create-new targets: attempt the copy with an
/// injectable pre-delete step; if it fails and the target turns out *not*
/// to exist, the parent path was missing (or appeared concurrently), so
/// build it and retry once. A deferred deletion failure is surfaced in
/// preference to the (then misleading) copy error.
fn copy_with_parent_retry(
    target: &AbstractPath,
    overwrite_if_exists: bool,
    callback: &mut dyn ProcessCallback,
    attempt: &mut dyn FnMut(
        Option<&mut dyn FnMut() -> Result<(), FileError>>,
        &mut dyn ProcessCallback,
    ) -> Result<(), OpError>,
) -> Result<(), OpError> {
    let mut deletion_error: Option<FileError> = None;

    let first = {
        let deletion_error = &mut deletion_error;
        let target_to_delete = target.clone();
        let mut delete_hook = move || -> Result<(), FileError> {
            if overwrite_if_exists {
                // probably "not existing"; defer judgement until the copy result
                if let Err(err) = target_to_delete
                    .device
                    .remove_file_plain(&target_to_delete.path)
                {
                    *deletion_error = Some(err);
                }
            }
            Ok(())
        };
        attempt(Some(&mut delete_hook), callback)
    };

    let err = match first {
        Ok(()) => return Ok(()),
        Err(OpError::Cancelled) => return Err(OpError::Cancelled),
        Err(OpError::File(err)) => err,
    };

    let already_existing = target.device.item_type(&target.path).is_ok();
    if already_existing {
        if let Some(deletion_error) = deletion_error {
            return Err(deletion_error.into());
        }
        return Err(err.into());
    }

    // parent folder missing, or created externally right after the attempt
    if let Some(parent) = target.parent() {
        create_folder_if_missing_recursive(&parent)?;
    }
    attempt(None, callback)
}
