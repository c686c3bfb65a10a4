//! Parallel folder-existence checking with timeouts.
//!
//! Checking whether a base folder exists may hang on unreachable network
//! drives or sleeping disks, so all folders are probed in parallel (one
//! worker per device) while the caller keeps its UI responsive. Workers that
//! outlive the timeout are abandoned, not joined, so one dead share cannot
//! stall the rest of the session.

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::device::{AbstractPath, ItemType};
use crate::error::{Cancelled, FileError};

/// Covers CD-ROM insertion and disks spinning up from sleep.
pub const DEFAULT_FOLDER_ACCESS_TIMEOUT_SEC: u32 = 20;

/// Poll interval for UI updates while blocked on device access.
pub const UI_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct FolderStatus {
    pub existing: Vec<AbstractPath>,
    pub not_existing: Vec<AbstractPath>,
    pub failed_checks: Vec<(AbstractPath, FileError)>,
}

/// Probe every folder with a definite existence check, one worker thread per
/// device, each check bounded by the device timeout (or the default).
/// `request_ui_update` is polled on a fixed interval and may cancel.
pub fn folder_status_parallel(
    folder_paths: &[AbstractPath],
    update_status: &mut dyn FnMut(&str),
    request_ui_update: &mut dyn FnMut() -> Result<(), Cancelled>,
) -> Result<FolderStatus, Cancelled> {
    // group by device so search times on one unreachable share don't add up
    let mut per_device: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, folder) in folder_paths.iter().enumerate() {
        let key = format!("{}:{}", folder.device.kind(), folder.device.device_id());
        per_device.entry(key).or_default().push(idx);
    }

    let start = Instant::now();
    let (tx, rx) = mpsc::channel::<(usize, Result<Option<ItemType>, FileError>)>();

    for indices in per_device.into_values() {
        let tx = tx.clone();
        let paths: Vec<(usize, AbstractPath)> = indices
            .into_iter()
            .map(|idx| (idx, folder_paths[idx].clone()))
            .collect();
        // deliberately detached: a hanging device must not block shutdown
        std::thread::spawn(move || {
            for (idx, folder) in paths {
                let result = folder.device.item_still_exists(&folder.path);
                if tx.send((idx, result)).is_err() {
                    return; // caller gave up on us
                }
            }
        });
    }
    drop(tx);

    let mut results: HashMap<usize, Result<Option<ItemType>, FileError>> = HashMap::new();
    let mut disconnected = false;

    for (idx, folder) in folder_paths.iter().enumerate() {
        update_status(&format!("Searching for folder {}...", folder.display()));

        let timeout_sec = match folder.device.timeout_secs() {
            0 => DEFAULT_FOLDER_ACCESS_TIMEOUT_SEC,
            secs => secs,
        };
        let deadline = start + Duration::from_secs(u64::from(timeout_sec));

        while !results.contains_key(&idx) && !disconnected {
            if Instant::now() >= deadline {
                break;
            }
            match rx.recv_timeout(UI_UPDATE_INTERVAL / 2) {
                Ok((done_idx, result)) => {
                    results.insert(done_idx, result);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => request_ui_update()?,
                Err(mpsc::RecvTimeoutError::Disconnected) => disconnected = true,
            }
        }
    }

    let mut status = FolderStatus::default();
    for (idx, folder) in folder_paths.iter().enumerate() {
        match results.remove(&idx) {
            Some(Ok(Some(_))) => status.existing.push(folder.clone()),
            Some(Ok(None)) => status.not_existing.push(folder.clone()),
            Some(Err(err)) => status.failed_checks.push((folder.clone(), err)),
            None => {
                let timeout_sec = match folder.device.timeout_secs() {
                    0 => DEFAULT_FOLDER_ACCESS_TIMEOUT_SEC,
                    secs => secs,
                };
                status.failed_checks.push((
                    folder.clone(),
                    FileError::timeout(
                        format!("timeout while searching for folder {}", folder.display()),
                        format!("{timeout_sec} sec"),
                    ),
                ));
            }
        }
    }
    Ok(status)
}
