//! Manual deletion of selected items, with recycle-bin support.
//!
//! Physical deletion and model update are transactional per item: the tree
//! loses a side only after the corresponding delete succeeded, so an
//! aborted batch leaves the model consistent with disk. Afterwards (also on
//! cancellation) surviving one-side-only rows get a fresh direction from
//! the base's policy and empty rows are pruned.

use std::cell::RefCell;
use std::collections::HashMap;

use tandem_vfs::{remove_file_if_exists, remove_symlink_if_exists, Cancelled, OpError};

use crate::progress::{log_and_status, try_reporting_error, ProcessCallback, ProcessPhase};
use crate::resolve::{extract_directions, DirectionConfig, PolicyDir, SyncVariant};
use crate::tree::{BaseFolderPair, NodeId, Side, SyncDirection};

use super::{resolve_selection, ItemKind, SelectedItem};

pub fn delete_from_model(
    base: &mut BaseFolderPair,
    cfg: &DirectionConfig,
    sel_left: &[NodeId],
    sel_right: &[NodeId],
    use_recycle_bin: bool,
    warn_recycler_missing: &mut bool,
    callback: &mut dyn ProcessCallback,
) -> Result<(), Cancelled> {
    let items_left = resolve_selection(base, Side::Left, sel_left);
    let items_right = resolve_selection(base, Side::Right, sel_right);

    callback.init_new_phase(items_left.len() + items_right.len(), 0, ProcessPhase::None);

    // one recycler probe per distinct base folder touched, memoized
    let mut recycler_supported: HashMap<String, bool> = HashMap::new();
    let recycle_left = !items_left.is_empty()
        && side_uses_recycler(
            base,
            Side::Left,
            use_recycle_bin,
            &mut recycler_supported,
            callback,
        )?;
    let recycle_right = !items_right.is_empty()
        && side_uses_recycler(
            base,
            Side::Right,
            use_recycle_bin,
            &mut recycler_supported,
            callback,
        )?;

    if use_recycle_bin && recycler_supported.values().any(|supported| !supported) {
        let mut msg = String::from(
            "The recycle bin is not supported by the following folders. \
             Deleted or overwritten files will not be able to be restored:",
        );
        for side in [Side::Left, Side::Right] {
            let folder = base.base_path(side);
            if recycler_supported.get(&folder.identity_key()) == Some(&false) {
                msg.push('\n');
                msg.push_str(&folder.display());
            }
        }
        callback.report_warning(&msg, warn_recycler_missing);
    }

    // left before right, for deterministic logs
    let outcome = match delete_side(base, Side::Left, &items_left, recycle_left, callback) {
        Ok(()) => delete_side(base, Side::Right, &items_right, recycle_right, callback),
        Err(err) => Err(err),
    };

    // cleanup runs even after cancellation
    fix_up_directions(base, cfg, &items_left, &items_right);
    base.remove_empty();

    outcome
}

fn side_uses_recycler(
    base: &BaseFolderPair,
    side: Side,
    use_recycle_bin: bool,
    memo: &mut HashMap<String, bool>,
    callback: &mut dyn ProcessCallback,
) -> Result<bool, Cancelled> {
    if !use_recycle_bin {
        return Ok(false);
    }
    let folder = base.base_path(side);
    let key = folder.identity_key();
    if let Some(&supported) = memo.get(&key) {
        return Ok(supported);
    }

    callback.update_status(&format!(
        "Checking recycle bin availability for folder {}...",
        folder.display()
    ));
    let mut supported = false;
    try_reporting_error(callback, &mut |_cb| {
        supported = folder.device.supports_recycle_bin(&folder.path)?;
        Ok(())
    })?;

    memo.insert(key, supported);
    Ok(supported)
}

fn delete_side(
    base: &mut BaseFolderPair,
    side: Side,
    items: &[SelectedItem],
    use_recycler: bool,
    callback: &mut dyn ProcessCallback,
) -> Result<(), Cancelled> {
    for item in items {
        try_reporting_error(callback, &mut |cb| delete_single(base, side, item, use_recycler, cb))?;
        // allow abort only *after* the model update was committed
        callback.request_ui_update(false)?;
    }
    Ok(())
}

fn delete_single(
    base: &mut BaseFolderPair,
    side: Side,
    item: &SelectedItem,
    use_recycler: bool,
    callback: &mut dyn ProcessCallback,
) -> Result<(), OpError> {
    // may have vanished already, e.g. if its parent folder went first
    let still_present = base
        .children
        .find_mut(item.id)
        .map(|node| !node.is_empty(side))
        .unwrap_or(false);
    if !still_present {
        callback.update_data_processed(1, 0);
        return Ok(());
    }

    let path = &item.abstract_path;
    match item.kind {
        ItemKind::File => {
            if use_recycler {
                log_and_status(
                    callback,
                    &format!("Moving file {} to the recycle bin", path.display()),
                );
                path.device.recycle_item_if_exists(&path.path)?;
            } else {
                log_and_status(callback, &format!("Deleting file {}", path.display()));
                remove_file_if_exists(path)?;
            }
            callback.update_data_processed(1, 0);
        }
        ItemKind::Symlink => {
            if use_recycler {
                log_and_status(
                    callback,
                    &format!("Moving symbolic link {} to the recycle bin", path.display()),
                );
                path.device.recycle_item_if_exists(&path.path)?;
            } else {
                log_and_status(
                    callback,
                    &format!("Deleting symbolic link {}", path.display()),
                );
                remove_symlink_if_exists(path)?;
            }
            callback.update_data_processed(1, 0);
        }
        ItemKind::Folder => {
            if use_recycler {
                log_and_status(
                    callback,
                    &format!("Moving folder {} to the recycle bin", path.display()),
                );
                path.device.recycle_item_if_exists(&path.path)?;
                callback.update_data_processed(1, 0);
            } else {
                // report each contained object as the device gets to it
                let shared_cb = RefCell::new(callback);
                let mut on_file = |display_path: &str| {
                    let mut cb = shared_cb.borrow_mut();
                    log_and_status(&mut **cb, &format!("Deleting file {display_path}"));
                    cb.update_data_processed(1, 0);
                };
                let mut on_folder = |display_path: &str| {
                    let mut cb = shared_cb.borrow_mut();
                    log_and_status(&mut **cb, &format!("Deleting folder {display_path}"));
                    cb.update_data_processed(1, 0);
                };
                path.device.remove_folder_if_exists_recursive(
                    &path.path,
                    &mut on_file,
                    &mut on_folder,
                )?;
            }
        }
    }

    // physical delete succeeded: now the model may forget this side
    if let Some(mut node) = base.children.find_mut(item.id) {
        node.remove_side(side);
    }
    Ok(())
}

/// Deletion turned some pairs one-side-only; give them a direction matching
/// the base's policy instead of leaving the stale pre-delete decision. A
/// full re-resolve would clobber manual user overrides elsewhere.
fn fix_up_directions(
    base: &mut BaseFolderPair,
    cfg: &DirectionConfig,
    items_left: &[SelectedItem],
    items_right: &[SelectedItem],
) {
    let mut ids: Vec<NodeId> = items_left
        .iter()
        .chain(items_right.iter())
        .map(|item| item.id)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    for id in ids {
        let Some(mut node) = base.children.find_mut(id) else {
            continue;
        };
        let empty_left = node.is_empty(Side::Left);
        let empty_right = node.is_empty(Side::Right);
        if empty_left == empty_right {
            continue; // fully gone (pruned next) or still two-sided
        }

        let new_direction = if cfg.variant == SyncVariant::TwoWay {
            if empty_left {
                SyncDirection::Right
            } else {
                SyncDirection::Left
            }
        } else {
            let policy = extract_directions(cfg);
            let slot = if empty_left {
                policy.ex_right_only
            } else {
                policy.ex_left_only
            };
            match slot {
                PolicyDir::None => SyncDirection::None,
                PolicyDir::Left => SyncDirection::Left,
                PolicyDir::Right => SyncDirection::Right,
            }
        };
        node.set_direction_rec(&new_direction);
    }
}
