//! Last-synchronized state.
//!
//! A read-only parallel tree describing what both sides looked like when
//! they were last in sync. The engine never reads or writes the on-disk
//! format; an injected loader hands over this object model (the serde
//! derives exist for such loaders). Keys are the case-sensitive item names;
//! when the two sides stored different case or normalization, callers look
//! the entry up once per side.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tandem_vfs::{FileError, FingerPrint, OpError};

use crate::progress::ProcessCallback;
use crate::tree::BaseFolderPair;

/// How a pair of files was established as "in sync". Stored per record so a
/// later run under a stricter variant can detect a superseded database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareVariant {
    TimeSize,
    Content,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InSyncDescrFile {
    pub mod_time: i64,
    pub file_print: FingerPrint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InSyncDescrLink {
    pub mod_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InSyncFile {
    pub left: InSyncDescrFile,
    pub right: InSyncDescrFile,
    pub file_size: u64,
    pub cmp_variant: CompareVariant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InSyncSymlink {
    pub left: InSyncDescrLink,
    pub right: InSyncDescrLink,
    pub cmp_variant: CompareVariant,
}

/// `StrawMan` marks a folder entry that exists only as context for its
/// children; the folder itself was not actually present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FolderStatus {
    #[default]
    Normal,
    StrawMan,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InSyncFolder {
    pub status: FolderStatus,
    pub files: BTreeMap<String, InSyncFile>,
    pub symlinks: BTreeMap<String, InSyncSymlink>,
    pub folders: BTreeMap<String, InSyncFolder>,
}

impl InSyncFolder {
    pub fn file(&self, name: &str) -> Option<&InSyncFile> {
        self.files.get(name)
    }

    pub fn symlink(&self, name: &str) -> Option<&InSyncSymlink> {
        self.symlinks.get(name)
    }

    pub fn folder(&self, name: &str) -> Option<&InSyncFolder> {
        self.folders.get(name)
    }
}

/// Host-provided access to the persisted state. Loading may block and may
/// talk to the user through the callback; a missing database is `Ok(None)`,
/// not an error.
pub trait LastSyncStateLoader {
    fn load(
        &mut self,
        base: &BaseFolderPair,
        callback: &mut dyn ProcessCallback,
    ) -> Result<Option<Arc<InSyncFolder>>, OpError>;
}

/// Loader for hosts (and tests) that already hold the parsed state.
pub struct FixedStateLoader {
    state: Option<Arc<InSyncFolder>>,
}

impl FixedStateLoader {
    pub fn new(state: Option<Arc<InSyncFolder>>) -> Self {
        Self { state }
    }
}

impl LastSyncStateLoader for FixedStateLoader {
    fn load(
        &mut self,
        _base: &BaseFolderPair,
        _callback: &mut dyn ProcessCallback,
    ) -> Result<Option<Arc<InSyncFolder>>, OpError> {
        Ok(self.state.clone())
    }
}

/// Loader that always fails; exercises the "degrade to no database" path.
pub struct FailingStateLoader;

impl LastSyncStateLoader for FailingStateLoader {
    fn load(
        &mut self,
        base: &BaseFolderPair,
        _callback: &mut dyn ProcessCallback,
    ) -> Result<Option<Arc<InSyncFolder>>, OpError> {
        Err(FileError::new(
            format!(
                "cannot read synchronization database for {}",
                base.base_path(crate::tree::Side::Left).display()
            ),
            "state unavailable",
        )
        .into())
    }
}
