//! The direction resolver.
//!
//! Turns categories into per-item [`SyncDirection`]s, either by an explicit
//! one-way policy or by reconciling against the last-synchronized state.
//! Resolution itself cannot fail: database problems degrade to "no state
//! available" and surface as conflicts or the first-run fallback.

use tandem_vfs::{Cancelled, OpError};

use crate::compare::{same_file_time, CompareConfig, FAT_FILE_TIME_PRECISION_SEC};
use crate::insync::{
    CompareVariant, FolderStatus, InSyncFile, InSyncFolder, InSyncSymlink, LastSyncStateLoader,
};
use crate::moves::detect_moved_files;
use crate::progress::ProcessCallback;
use crate::tree::{
    BaseFolderPair, Category, ChildItems, FilePair, FolderPair, Side, SymlinkPair, SyncDirection,
};
use tandem_vfs::TEMP_FILE_SUFFIX;

pub const TXT_BOTH_SIDES_CHANGED: &str = "Both sides have changed since last synchronization.";
pub const TXT_NO_SIDE_CHANGED: &str =
    "Cannot determine sync-direction: No change since last synchronization.";
pub const TXT_DB_NOT_IN_SYNC: &str =
    "Cannot determine sync-direction: The database entry is not in sync considering current settings.";

/// Direction slot of a one-way policy. `None` on the conflict slot means
/// "propagate as conflict annotation".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDir {
    None,
    Left,
    Right,
}

impl PolicyDir {
    fn mirrored(self) -> Self {
        match self {
            PolicyDir::Left => PolicyDir::Right,
            PolicyDir::Right => PolicyDir::Left,
            PolicyDir::None => PolicyDir::None,
        }
    }
}

impl From<PolicyDir> for SyncDirection {
    fn from(dir: PolicyDir) -> Self {
        match dir {
            PolicyDir::None => SyncDirection::None,
            PolicyDir::Left => SyncDirection::Left,
            PolicyDir::Right => SyncDirection::Right,
        }
    }
}

/// Category → direction mapping for one-way resolution.
#[derive(Debug, Clone, Copy)]
pub struct DirectionPolicy {
    pub ex_left_only: PolicyDir,
    pub ex_right_only: PolicyDir,
    pub left_newer: PolicyDir,
    pub right_newer: PolicyDir,
    pub different: PolicyDir,
    pub conflict: PolicyDir,
}

impl DirectionPolicy {
    /// The policy that makes sense after swapping the tree's sides.
    pub fn mirrored(&self) -> Self {
        Self {
            ex_left_only: self.ex_right_only.mirrored(),
            ex_right_only: self.ex_left_only.mirrored(),
            left_newer: self.right_newer.mirrored(),
            right_newer: self.left_newer.mirrored(),
            different: self.different.mirrored(),
            conflict: self.conflict.mirrored(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVariant {
    /// Database-driven reconciliation.
    TwoWay,
    /// Make right an exact copy of left.
    Mirror,
    /// Copy new and updated items to right, leave right extras alone.
    Update,
    /// Explicit per-category directions.
    Custom,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionConfig {
    pub variant: SyncVariant,
    /// Used by `SyncVariant::Custom` (and as fallback bookkeeping).
    pub custom: DirectionPolicy,
    /// Opt-in rename detection for one-way variants; two-way always has it.
    pub detect_moved_files: bool,
}

impl DirectionConfig {
    pub fn two_way() -> Self {
        Self {
            variant: SyncVariant::TwoWay,
            custom: two_way_update_policy(),
            detect_moved_files: false,
        }
    }

    pub fn mirror() -> Self {
        Self {
            variant: SyncVariant::Mirror,
            custom: extract_variant_policy(SyncVariant::Mirror),
            detect_moved_files: false,
        }
    }

    pub fn update() -> Self {
        Self {
            variant: SyncVariant::Update,
            custom: extract_variant_policy(SyncVariant::Update),
            detect_moved_files: false,
        }
    }

    pub fn custom(policy: DirectionPolicy) -> Self {
        Self {
            variant: SyncVariant::Custom,
            custom: policy,
            detect_moved_files: false,
        }
    }

    pub fn with_move_detection(mut self) -> Self {
        self.detect_moved_files = true;
        self
    }

    pub fn detect_moves_effective(&self) -> bool {
        self.variant == SyncVariant::TwoWay || self.detect_moved_files
    }
}

/// "Overwrite older side with newer side": the two-way fallback when no
/// last-sync state exists yet.
pub fn two_way_update_policy() -> DirectionPolicy {
    DirectionPolicy {
        ex_left_only: PolicyDir::Right,
        ex_right_only: PolicyDir::Left,
        left_newer: PolicyDir::Right,
        right_newer: PolicyDir::Left,
        different: PolicyDir::None,
        conflict: PolicyDir::None,
    }
}

/// The effective one-way policy of a direction config.
pub fn extract_directions(cfg: &DirectionConfig) -> DirectionPolicy {
    match cfg.variant {
        SyncVariant::TwoWay => two_way_update_policy(),
        SyncVariant::Custom => cfg.custom,
        variant => extract_variant_policy(variant),
    }
}

fn extract_variant_policy(variant: SyncVariant) -> DirectionPolicy {
    match variant {
        SyncVariant::Mirror => DirectionPolicy {
            ex_left_only: PolicyDir::Right,
            ex_right_only: PolicyDir::Right,
            left_newer: PolicyDir::Right,
            right_newer: PolicyDir::Right,
            different: PolicyDir::Right,
            conflict: PolicyDir::Right,
        },
        SyncVariant::Update => DirectionPolicy {
            ex_left_only: PolicyDir::Right,
            ex_right_only: PolicyDir::None,
            left_newer: PolicyDir::Right,
            right_newer: PolicyDir::None,
            different: PolicyDir::Right,
            conflict: PolicyDir::None,
        },
        SyncVariant::TwoWay | SyncVariant::Custom => two_way_update_policy(),
    }
}

//---------------------------------------------------------------------------
// Temp-file sweep
//---------------------------------------------------------------------------

/// Copy-in-progress leftovers are deleted on their side regardless of
/// policy. Returns the direction to force, if the sweep applies.
fn temp_sweep_direction(category: Category, name_left: &str, name_right: &str) -> Option<SyncDirection> {
    match category {
        Category::LeftOnly if name_left.ends_with(TEMP_FILE_SUFFIX) => Some(SyncDirection::Left),
        Category::RightOnly if name_right.ends_with(TEMP_FILE_SUFFIX) => {
            Some(SyncDirection::Right)
        }
        _ => None,
    }
}

//---------------------------------------------------------------------------
// One-way resolution
//---------------------------------------------------------------------------

pub fn apply_one_way(base: &mut BaseFolderPair, policy: &DirectionPolicy) {
    one_way_children(&mut base.children, policy);
}

fn one_way_children(children: &mut ChildItems, policy: &DirectionPolicy) {
    for file in &mut children.files {
        one_way_file(file, policy);
    }
    for link in &mut children.symlinks {
        one_way_symlink(link, policy);
    }
    for folder in &mut children.folders {
        one_way_folder(folder, policy);
    }
}

fn conflict_note(note: &Option<String>) -> String {
    note.clone()
        .unwrap_or_else(|| "cannot categorize item".to_string())
}

fn one_way_file(file: &mut FilePair, policy: &DirectionPolicy) {
    if let Some(dir) = temp_sweep_direction(
        file.category,
        file.name_pref(Side::Left),
        file.name_pref(Side::Right),
    ) {
        file.direction = dir;
        return;
    }

    file.direction = match file.category {
        Category::LeftOnly => policy.ex_left_only.into(),
        Category::RightOnly => policy.ex_right_only.into(),
        Category::LeftNewer => policy.left_newer.into(),
        Category::RightNewer => policy.right_newer.into(),
        Category::DifferentContent => policy.different.into(),
        Category::Conflict | Category::DifferentMetadata => match policy.conflict {
            PolicyDir::None => SyncDirection::Conflict(conflict_note(&file.cat_note)),
            dir => dir.into(),
        },
        Category::Equal => SyncDirection::None,
    };
}

fn one_way_symlink(link: &mut SymlinkPair, policy: &DirectionPolicy) {
    if let Some(dir) = temp_sweep_direction(
        link.category,
        link.name_pref(Side::Left),
        link.name_pref(Side::Right),
    ) {
        link.direction = dir;
        return;
    }

    link.direction = match link.category {
        Category::LeftOnly => policy.ex_left_only.into(),
        Category::RightOnly => policy.ex_right_only.into(),
        Category::LeftNewer => policy.left_newer.into(),
        Category::RightNewer => policy.right_newer.into(),
        Category::DifferentContent => policy.different.into(),
        Category::Conflict | Category::DifferentMetadata => match policy.conflict {
            PolicyDir::None => SyncDirection::Conflict(conflict_note(&link.cat_note)),
            dir => dir.into(),
        },
        Category::Equal => SyncDirection::None,
    };
}

fn one_way_folder(folder: &mut FolderPair, policy: &DirectionPolicy) {
    // abandoned temporary folder: delete the whole subtree on that side
    if let Some(dir) = temp_sweep_direction(
        folder.category,
        folder.name_pref(Side::Left),
        folder.name_pref(Side::Right),
    ) {
        folder.set_direction_rec(&dir);
        return; // don't recurse below
    }

    folder.direction = match folder.category {
        Category::LeftOnly => policy.ex_left_only.into(),
        Category::RightOnly => policy.ex_right_only.into(),
        Category::Equal => SyncDirection::None,
        Category::Conflict | Category::DifferentMetadata => match policy.conflict {
            PolicyDir::None => SyncDirection::Conflict(conflict_note(&folder.cat_note)),
            dir => dir.into(),
        },
        // folders are never categorized newer/different-content
        Category::LeftNewer | Category::RightNewer | Category::DifferentContent => {
            SyncDirection::None
        }
    };

    one_way_children(&mut folder.children, policy);
}

//---------------------------------------------------------------------------
// Two-way resolution against the last-sync state
//---------------------------------------------------------------------------

/// Does the current item on `side` still look like the recorded state?
/// Irrespective of the current comparison variant; file identity is
/// deliberately not considered (moving data to another medium is no change).
fn file_matches_db(
    file: &FilePair,
    side: Side,
    db: Option<&InSyncFile>,
    shift_minutes: &[u32],
) -> bool {
    let attrs = match file.attrs(side) {
        Some(attrs) => attrs,
        None => return db.is_none(),
    };
    let db = match db {
        Some(db) => db,
        None => return false,
    };
    let descr = match side {
        Side::Left => &db.left,
        Side::Right => &db.right,
    };
    same_file_time(
        attrs.mod_time,
        descr.mod_time,
        FAT_FILE_TIME_PRECISION_SEC,
        shift_minutes,
    ) && attrs.size == db.file_size
}

fn link_matches_db(
    link: &SymlinkPair,
    side: Side,
    db: Option<&InSyncSymlink>,
    shift_minutes: &[u32],
) -> bool {
    let attrs = match link.attrs(side) {
        Some(attrs) => attrs,
        None => return db.is_none(),
    };
    let db = match db {
        Some(db) => db,
        None => return false,
    };
    let descr = match side {
        Side::Left => &db.left,
        Side::Right => &db.right,
    };
    same_file_time(
        attrs.mod_time,
        descr.mod_time,
        FAT_FILE_TIME_PRECISION_SEC,
        shift_minutes,
    )
}

fn folder_matches_db(folder: &FolderPair, side: Side, db: Option<&InSyncFolder>) -> bool {
    let have_db_entry = db.is_some_and(|db| db.status != FolderStatus::StrawMan);
    have_db_entry == !folder.is_empty(side)
}

/// Is the recorded state itself still acceptable as "in sync" under the
/// *current* comparison variant? The cross-variant rules are asymmetric by
/// design; do not generalize.
pub(crate) fn file_still_in_sync(db: &InSyncFile, cfg: &CompareConfig) -> bool {
    match cfg.variant {
        CompareVariant::TimeSize => {
            if db.cmp_variant == CompareVariant::Content {
                return true; // certainly good enough for time/size
            }
            same_file_time(
                db.left.mod_time,
                db.right.mod_time,
                cfg.file_time_tolerance,
                &cfg.ignore_time_shift_minutes,
            )
        }
        CompareVariant::Content => db.cmp_variant == CompareVariant::Content,
        CompareVariant::Size => true, // size + name always match for an in-sync entry
    }
}

fn link_still_in_sync(db: &InSyncSymlink, cfg: &CompareConfig) -> bool {
    match cfg.variant {
        CompareVariant::TimeSize => {
            if db.cmp_variant == CompareVariant::Content || db.cmp_variant == CompareVariant::Size {
                return true;
            }
            same_file_time(
                db.left.mod_time,
                db.right.mod_time,
                cfg.file_time_tolerance,
                &cfg.ignore_time_shift_minutes,
            )
        }
        // symlinks under size variant are categorized by target content too
        CompareVariant::Content | CompareVariant::Size => {
            db.cmp_variant == CompareVariant::Content || db.cmp_variant == CompareVariant::Size
        }
    }
}

pub fn apply_two_way(base: &mut BaseFolderPair, db: &InSyncFolder) {
    let cfg = base.config.clone();
    two_way_children(&mut base.children, Some(db), Some(db), &cfg);
}

/// Look an entry up for both sides: one lookup suffices unless the two
/// sides stored differently-cased names (or their parents did).
pub(crate) fn db_pair<'a, T>(
    db_left: Option<&'a InSyncFolder>,
    db_right: Option<&'a InSyncFolder>,
    name_left: &str,
    name_right: &str,
    get: impl Fn(&'a InSyncFolder, &str) -> Option<&'a T>,
) -> (Option<&'a T>, Option<&'a T>) {
    let entry_left = db_left.and_then(|db| get(db, name_left));
    let same_lookup = name_left == name_right
        && match (db_left, db_right) {
            (Some(l), Some(r)) => std::ptr::eq(l, r),
            (None, None) => true,
            _ => false,
        };
    let entry_right = if same_lookup {
        entry_left
    } else {
        db_right.and_then(|db| get(db, name_right))
    };
    (entry_left, entry_right)
}

fn two_way_children(
    children: &mut ChildItems,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    cfg: &CompareConfig,
) {
    for file in &mut children.files {
        two_way_file(file, db_left, db_right, cfg);
    }
    for link in &mut children.symlinks {
        two_way_symlink(link, db_left, db_right, cfg);
    }
    for folder in &mut children.folders {
        two_way_folder(folder, db_left, db_right, cfg);
    }
}

fn two_way_file(
    file: &mut FilePair,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    cfg: &CompareConfig,
) {
    if file.category == Category::Equal {
        file.direction = SyncDirection::None;
        return;
    }

    if let Some(dir) = temp_sweep_direction(
        file.category,
        file.name_pref(Side::Left),
        file.name_pref(Side::Right),
    ) {
        file.direction = dir;
        return;
    }

    let (db_entry_l, db_entry_r) = db_pair(
        db_left,
        db_right,
        file.name_pref(Side::Left),
        file.name_pref(Side::Right),
        |db, name| db.file(name),
    );

    let changed_left = !file_matches_db(file, Side::Left, db_entry_l, &cfg.ignore_time_shift_minutes);
    let changed_right =
        !file_matches_db(file, Side::Right, db_entry_r, &cfg.ignore_time_shift_minutes);

    if changed_left != changed_right {
        let db_stale = db_entry_l.is_some_and(|db| !file_still_in_sync(db, cfg))
            || db_entry_r.is_some_and(|db| !file_still_in_sync(db, cfg));
        if db_stale {
            file.set_conflict(TXT_DB_NOT_IN_SYNC);
        } else {
            file.direction = if changed_left {
                SyncDirection::Right
            } else {
                SyncDirection::Left
            };
        }
    } else if changed_left {
        file.set_conflict(TXT_BOTH_SIDES_CHANGED);
    } else {
        file.set_conflict(TXT_NO_SIDE_CHANGED);
    }
}

fn two_way_symlink(
    link: &mut SymlinkPair,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    cfg: &CompareConfig,
) {
    if link.category == Category::Equal {
        link.direction = SyncDirection::None;
        return;
    }

    if let Some(dir) = temp_sweep_direction(
        link.category,
        link.name_pref(Side::Left),
        link.name_pref(Side::Right),
    ) {
        link.direction = dir;
        return;
    }

    let (db_entry_l, db_entry_r) = db_pair(
        db_left,
        db_right,
        link.name_pref(Side::Left),
        link.name_pref(Side::Right),
        |db, name| db.symlink(name),
    );

    let changed_left = !link_matches_db(link, Side::Left, db_entry_l, &cfg.ignore_time_shift_minutes);
    let changed_right =
        !link_matches_db(link, Side::Right, db_entry_r, &cfg.ignore_time_shift_minutes);

    if changed_left != changed_right {
        let db_stale = db_entry_l.is_some_and(|db| !link_still_in_sync(db, cfg))
            || db_entry_r.is_some_and(|db| !link_still_in_sync(db, cfg));
        if db_stale {
            link.set_conflict(TXT_DB_NOT_IN_SYNC);
        } else {
            link.direction = if changed_left {
                SyncDirection::Right
            } else {
                SyncDirection::Left
            };
        }
    } else if changed_left {
        link.set_conflict(TXT_BOTH_SIDES_CHANGED);
    } else {
        link.set_conflict(TXT_NO_SIDE_CHANGED);
    }
}

fn two_way_folder(
    folder: &mut FolderPair,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    cfg: &CompareConfig,
) {
    if let Some(dir) = temp_sweep_direction(
        folder.category,
        folder.name_pref(Side::Left),
        folder.name_pref(Side::Right),
    ) {
        folder.set_direction_rec(&dir);
        return; // don't recurse below
    }

    let (db_entry_l, db_entry_r) = db_pair(
        db_left,
        db_right,
        folder.name_pref(Side::Left),
        folder.name_pref(Side::Right),
        |db, name| db.folder(name),
    );

    if folder.category != Category::Equal {
        let changed_left = !folder_matches_db(folder, Side::Left, db_entry_l);
        let changed_right = !folder_matches_db(folder, Side::Right, db_entry_r);

        if changed_left != changed_right {
            // folder records have no variant to go stale
            folder.direction = if changed_left {
                SyncDirection::Right
            } else {
                SyncDirection::Left
            };
        } else if changed_left {
            folder.set_conflict(TXT_BOTH_SIDES_CHANGED);
        } else {
            folder.set_conflict(TXT_NO_SIDE_CHANGED);
        }
    } else {
        folder.direction = SyncDirection::None;
    }

    // straw-man entries still provide context for their descendants
    two_way_children(&mut folder.children, db_entry_l, db_entry_r, cfg);
}

//---------------------------------------------------------------------------
// Driver
//---------------------------------------------------------------------------

/// Resolve directions for every base pair. Last-sync state is loaded only
/// where needed; load errors degrade to "no state". Directions are set even
/// when loading is cancelled mid-way (best effort), then the cancellation
/// propagates.
pub fn resolve_directions(
    targets: &mut [(&mut BaseFolderPair, DirectionConfig)],
    loader: &mut dyn LastSyncStateLoader,
    callback: &mut dyn ProcessCallback,
) -> Result<(), Cancelled> {
    if targets.is_empty() {
        return Ok(());
    }

    let count = targets.len();
    let mut all_equal = vec![false; count];
    let mut states = Vec::with_capacity(count);
    states.resize_with(count, || None);
    let mut cancelled = false;

    for (idx, (base, cfg)) in targets.iter().enumerate() {
        if cfg.variant != SyncVariant::TwoWay && !cfg.detect_moves_effective() {
            continue;
        }
        if base.all_items_equal() {
            all_equal[idx] = true; // nothing to do: don't even open the database
            continue;
        }
        if cancelled {
            continue;
        }
        match loader.load(base, callback) {
            Ok(state) => states[idx] = state,
            Err(OpError::Cancelled) => cancelled = true,
            Err(OpError::File(err)) => {
                log::warn!("cannot load last synchronization state: {err}");
                callback.log_info(&format!(
                    "Cannot load the last synchronization state: {err}"
                ));
            }
        }
    }

    for (idx, (base, cfg)) in targets.iter_mut().enumerate() {
        if all_equal[idx] {
            continue;
        }
        let state = states[idx].as_deref();

        if cfg.variant == SyncVariant::TwoWay {
            match state {
                Some(db) => apply_two_way(base, db),
                None => {
                    let mut msg = "Setting directions for first synchronization: \
                                   Old files will be overwritten with newer files."
                        .to_string();
                    if count > 1 {
                        msg.push('\n');
                        msg.push_str(&format!(
                            "{} <-> {}",
                            base.base_path(Side::Left).display(),
                            base.base_path(Side::Right).display()
                        ));
                    }
                    callback.log_info(&msg);
                    apply_one_way(base, &two_way_update_policy());
                }
            }
        } else {
            apply_one_way(base, &extract_directions(cfg));
        }

        if let Some(db) = state {
            detect_moved_files(base, db);
        }
    }

    callback.update_status("Calculating sync directions...");
    callback.request_ui_update(true)?;

    if cancelled {
        return Err(Cancelled);
    }
    Ok(())
}

/// Mirror every base pair's sides and re-resolve with the same configs.
pub fn swap_sides(
    targets: &mut [(&mut BaseFolderPair, DirectionConfig)],
    loader: &mut dyn LastSyncStateLoader,
    callback: &mut dyn ProcessCallback,
) -> Result<(), Cancelled> {
    for (base, _) in targets.iter_mut() {
        base.flip();
    }
    resolve_directions(targets, loader, callback)
}
