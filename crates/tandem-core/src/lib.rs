//! tandem-core: the synchronization decision engine.
//!
//! Given two scanned directory trees plus the last-synchronized state, this
//! crate decides per item whether to copy left, copy right, delete, do
//! nothing, or flag a conflict. It also detects renames, applies filtering,
//! and runs manual bulk copy/delete over the same model.
//!
//! Typical session flow:
//! 1. the host's scanner populates a [`tree::BaseFolderPair`] per configured pair;
//! 2. [`compare::categorize_base`] assigns each pair its category;
//! 3. [`resolve::resolve_directions`] turns categories + last-sync state +
//!    policy into per-item directions (running move detection where a
//!    database exists);
//! 4. [`filter`] adjusts the active flags;
//! 5. [`ops`] executes manual bulk operations on user selections.

pub mod compare;
pub mod depend;
pub mod filter;
pub mod insync;
pub mod moves;
pub mod ops;
pub mod progress;
pub mod resolve;
pub mod tree;

pub use compare::{categorize_base, CompareConfig, FAT_FILE_TIME_PRECISION_SEC};
pub use depend::{path_dependency, PathDependency};
pub use filter::{
    apply_filtering, apply_hard_filter, apply_soft_filter, apply_time_span_filter, FilterStrategy,
    NameFilter, SoftFilter,
};
pub use insync::{
    CompareVariant, FixedStateLoader, InSyncDescrFile, InSyncDescrLink, InSyncFile, InSyncFolder,
    InSyncSymlink, LastSyncStateLoader,
};
pub use moves::detect_moved_files;
pub use ops::{copy_to_alternate_folder, delete_from_model, selection_summary};
pub use progress::{
    log_and_status, try_reporting_error, ErrorChoice, ProcessCallback, ProcessPhase,
    SilentCallback,
};
pub use resolve::{
    apply_one_way, apply_two_way, extract_directions, resolve_directions, swap_sides,
    two_way_update_policy, DirectionConfig, DirectionPolicy, PolicyDir, SyncVariant,
};
pub use tree::{
    BaseFolderPair, Category, ChildItems, FileAttrs, FilePair, FolderAttrs, FolderPair, LinkAttrs,
    NodeId, NodeMut, NodeRef, Side, SymlinkPair, SyncDirection,
};
