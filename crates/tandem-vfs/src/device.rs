//! The device abstraction.
//!
//! A [`Device`] is an abstract filesystem handle: native disk, network share,
//! cloud drive. Engine code addresses items only through an [`AbstractPath`]
//! (device + device-relative path) and the operations here. Devices are
//! shared via `Arc` and must behave like values for concurrent access.
//!
//! Two devices are *equivalent* iff they report the same kind and identity;
//! every two-path operation checks equivalence first and either decomposes
//! into generic per-device calls or fails with `MoveUnsupported`.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Cancelled, FileError, OpError};
use crate::path::VfsPath;

/// Device-persistent numeric file identity (inode-like); 0 = unknown.
pub type FingerPrint = u64;

/// Reserved suffix marking copy-in-progress artifacts. Items carrying it on
/// exactly one side are always scheduled for deletion, regardless of policy.
pub const TEMP_FILE_SUFFIX: &str = ".tdm_tmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    File,
    Folder,
    Symlink,
}

/// Source attributes handed to a transactional copy.
#[derive(Debug, Clone, Copy)]
pub struct StreamAttributes {
    pub mod_time: i64,
    pub file_size: u64,
    pub file_print: FingerPrint,
}

/// Outcome of closing an output stream.
#[derive(Debug, Default)]
pub struct FinalizeResult {
    pub file_print: FingerPrint,
    /// Failure to set the modification time is reported here instead of
    /// failing the whole copy; the written file is kept.
    pub error_mod_time: Option<FileError>,
}

pub trait InputStream {
    /// Fills `buf` completely unless the end of the stream is reached.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError>;
    /// Preferred buffer size; device contract requires a non-zero value.
    fn block_size(&self) -> usize;
}

pub trait OutputStream {
    fn write(&mut self, buf: &[u8]) -> Result<(), FileError>;
    /// Close the handle *before* the modification time is set; certain
    /// network shares drop the time on close otherwise.
    fn finalize(self: Box<Self>) -> Result<FinalizeResult, FileError>;
}

/// Outcome of a (transactional) file copy.
#[derive(Debug)]
pub struct FileCopyResult {
    pub file_size: u64,
    pub mod_time: i64,
    pub source_print: FingerPrint,
    pub target_print: FingerPrint,
    pub error_mod_time: Option<FileError>,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub mod_time: i64,
    pub file_print: FingerPrint,
    pub is_followed_symlink: bool,
}

#[derive(Debug, Clone)]
pub struct FolderInfo {
    pub name: String,
    pub is_followed_symlink: bool,
}

#[derive(Debug, Clone)]
pub struct SymlinkInfo {
    pub name: String,
    pub mod_time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleLink {
    Follow,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    Retry,
    Ignore,
}

/// Visitor for recursive traversal. Traversal may fan out over worker
/// threads, so callbacks are shared and internally locked.
pub trait TraverserCallback: Send {
    fn on_file(&mut self, info: &FileInfo);
    fn on_symlink(&mut self, info: &SymlinkInfo) -> HandleLink;
    /// `None` prunes the subfolder; otherwise the returned callback receives
    /// the subfolder's events.
    fn on_folder(&mut self, info: &FolderInfo) -> Option<SharedTraverserCallback>;
    /// Failed directory listing: current level is incomplete.
    fn on_folder_error(&mut self, msg: &str, retry_number: usize) -> HandleError;
    /// Failed to stat a single child item.
    fn on_item_error(&mut self, msg: &str, retry_number: usize, item_name: &str) -> HandleError;
}

pub type SharedTraverserCallback = Arc<Mutex<dyn TraverserCallback>>;
pub type TraverserWorkload = Vec<(VfsPath, SharedTraverserCallback)>;

/// Abstract filesystem. All methods take `&self`; implementations must be
/// safe to share across threads ("like an integer").
pub trait Device: Send + Sync {
    /// Backend discriminator ("native", ...); equivalence requires equal kinds.
    fn kind(&self) -> &'static str;
    /// Stable identity within the kind, e.g. the canonical root of a disk.
    fn device_id(&self) -> String;
    fn display_path(&self, path: &VfsPath) -> String;
    /// Per-device access timeout for existence checks; 0 = use the default.
    fn timeout_secs(&self) -> u32 {
        0
    }

    /// Fast type probe; does not distinguish "missing" from "error".
    fn item_type(&self, path: &VfsPath) -> Result<ItemType, FileError>;
    /// Slow but definite: traverses ancestors with case-sensitive name
    /// search, so `Ok(None)` reliably means "not there".
    fn item_still_exists(&self, path: &VfsPath) -> Result<Option<ItemType>, FileError>;

    /// Fails with `TargetExisting` if the folder is already there.
    fn create_folder_plain(&self, path: &VfsPath) -> Result<(), FileError>;

    fn remove_file_plain(&self, path: &VfsPath) -> Result<(), FileError>;
    fn remove_symlink_plain(&self, path: &VfsPath) -> Result<(), FileError>;
    /// Non-recursive; fails on non-empty folders.
    fn remove_folder_plain(&self, path: &VfsPath) -> Result<(), FileError>;
    /// Deferred-recursion delete: list children, remove files, then
    /// symlinks, then recurse into subfolders, then the folder itself.
    /// The hooks fire once per object with its display path.
    fn remove_folder_if_exists_recursive(
        &self,
        path: &VfsPath,
        on_before_file: &mut dyn FnMut(&str),
        on_before_folder: &mut dyn FnMut(&str),
    ) -> Result<(), FileError>;

    /// Atomic within the device. With `replace_existing = false` a source
    /// and destination referring to the same underlying item must still be
    /// accepted, so idempotent renames do not fail.
    fn move_and_rename(
        &self,
        from: &VfsPath,
        to: &VfsPath,
        replace_existing: bool,
    ) -> Result<(), FileError>;

    fn open_input(&self, path: &VfsPath) -> Result<Box<dyn InputStream>, FileError>;
    /// Target must not exist. `size_hint` preallocates, `mod_time` is set
    /// after the handle is closed during finalize.
    fn open_output(
        &self,
        path: &VfsPath,
        size_hint: Option<u64>,
        mod_time: Option<i64>,
    ) -> Result<Box<dyn OutputStream>, FileError>;

    fn read_symlink(&self, path: &VfsPath) -> Result<String, FileError>;
    /// Already existing: fail.
    fn create_symlink(&self, path: &VfsPath, target: &str) -> Result<(), FileError>;

    /// Copy owner + mode within this device; mode is skipped on symlinks.
    fn copy_item_permissions(&self, from: &VfsPath, to: &VfsPath) -> Result<(), FileError>;

    /// `None` if the backend cannot tell.
    fn free_disk_space(&self, path: &VfsPath) -> Result<Option<u64>, FileError>;

    fn supports_recycle_bin(&self, path: &VfsPath) -> Result<bool, FileError>;
    /// Missing items are not an error.
    fn recycle_item_if_exists(&self, path: &VfsPath) -> Result<(), FileError>;

    /// Run all workload callbacks, fanning folder traversal out over at most
    /// `parallel_ops` workers. Errors are routed through the callbacks.
    fn traverse_folder_recursive(&self, workload: TraverserWorkload, parallel_ops: usize);
}

pub fn devices_equal(lhs: &Arc<dyn Device>, rhs: &Arc<dyn Device>) -> bool {
    lhs.kind() == rhs.kind() && lhs.device_id() == rhs.device_id()
}

/// A device plus a path on it; the unit every engine operation works with.
#[derive(Clone)]
pub struct AbstractPath {
    pub device: Arc<dyn Device>,
    pub path: VfsPath,
}

impl AbstractPath {
    pub fn new(device: Arc<dyn Device>, path: VfsPath) -> Self {
        Self { device, path }
    }

    pub fn join(&self, rel: &str) -> Self {
        Self {
            device: Arc::clone(&self.device),
            path: self.path.join(rel),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|path| Self {
            device: Arc::clone(&self.device),
            path,
        })
    }

    pub fn item_name(&self) -> &str {
        self.path.item_name()
    }

    pub fn display(&self) -> String {
        self.device.display_path(&self.path)
    }

    /// Key usable in maps: kind + identity + path.
    pub fn identity_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.device.kind(),
            self.device.device_id(),
            self.path
        )
    }
}

impl std::fmt::Debug for AbstractPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.device.kind(), self.display())
    }
}

impl PartialEq for AbstractPath {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && devices_equal(&self.device, &other.device)
    }
}

//---------------------------------------------------------------------------
// "if exists" wrappers: removal failure is accepted when a definite
// existence check proves the item is gone (racing deleters, prior cleanup).
//---------------------------------------------------------------------------

fn accept_if_gone(ap: &AbstractPath, err: FileError) -> Result<(), FileError> {
    match ap.device.item_still_exists(&ap.path) {
        Ok(None) => Ok(()),
        _ => Err(err),
    }
}

pub fn remove_file_if_exists(ap: &AbstractPath) -> Result<(), FileError> {
    match ap.device.remove_file_plain(&ap.path) {
        Ok(()) => Ok(()),
        Err(err) => accept_if_gone(ap, err),
    }
}

pub fn remove_symlink_if_exists(ap: &AbstractPath) -> Result<(), FileError> {
    match ap.device.remove_symlink_plain(&ap.path) {
        Ok(()) => Ok(()),
        Err(err) => accept_if_gone(ap, err),
    }
}

pub fn remove_empty_folder_if_exists(ap: &AbstractPath) -> Result<(), FileError> {
    match ap.device.remove_folder_plain(&ap.path) {
        Ok(()) => Ok(()),
        Err(err) => accept_if_gone(ap, err),
    }
}

/// Create a folder including missing parents; tolerates racing creators.
/// Returns `false` if the folder already existed.
pub fn create_folder_if_missing_recursive(ap: &AbstractPath) -> Result<bool, FileError> {
    if ap.path.is_root() {
        return Ok(false); // device root always exists
    }
    let first = match ap.device.create_folder_plain(&ap.path) {
        Ok(()) => return Ok(true),
        Err(err) if err.is_target_existing() => return Ok(false),
        Err(err) => err,
    };

    let created_parent = match ap.parent() {
        Some(parent) => create_folder_if_missing_recursive(&parent)?,
        None => false,
    };
    let _ = created_parent;

    match ap.device.create_folder_plain(&ap.path) {
        Ok(()) => Ok(true),
        Err(err) if err.is_target_existing() => Ok(false), // someone else won the race
        Err(_) => Err(first),
    }
}

//---------------------------------------------------------------------------
// Cross-device operations
//---------------------------------------------------------------------------

/// Rename without copying. Non-equivalent devices fail with
/// `MoveUnsupported`; callers fall back to copy + delete.
pub fn move_and_rename_item(
    from: &AbstractPath,
    to: &AbstractPath,
    replace_existing: bool,
) -> Result<(), FileError> {
    if !devices_equal(&from.device, &to.device) {
        return Err(FileError::move_unsupported(
            format!("cannot move {} to {}", from.display(), to.display()),
            "operation not supported between different devices",
        ));
    }
    from.device.move_and_rename(&from.path, &to.path, replace_existing)
}

/// Already existing: fail. Decomposes across devices via read + create.
pub fn copy_symlink(source: &AbstractPath, target: &AbstractPath) -> Result<(), FileError> {
    let link_target = source.device.read_symlink(&source.path)?;
    target.device.create_symlink(&target.path, &link_target)
}

/// Already existing: fail. Permissions are copied only within one device.
pub fn copy_new_folder(
    source: &AbstractPath,
    target: &AbstractPath,
    copy_permissions: bool,
) -> Result<(), FileError> {
    target.device.create_folder_plain(&target.path)?;
    if copy_permissions {
        if !devices_equal(&source.device, &target.device) {
            return Err(FileError::new(
                format!("cannot write permissions of {}", target.display()),
                "operation not supported between different devices",
            ));
        }
        source
            .device
            .copy_item_permissions(&source.path, &target.path)?;
    }
    Ok(())
}

/// Copy owner + mode; requires equivalent devices.
pub fn copy_item_permissions(
    source: &AbstractPath,
    target: &AbstractPath,
) -> Result<(), FileError> {
    if !devices_equal(&source.device, &target.device) {
        return Err(FileError::new(
            format!("cannot write permissions of {}", target.display()),
            "operation not supported between different devices",
        ));
    }
    source
        .device
        .copy_item_permissions(&source.path, &target.path)
}

/// Stream `source` into a new file at `target_path` on `target`'s device.
/// The partially-written target is removed on every failure path.
fn copy_as_stream(
    source: &AbstractPath,
    attrs: &StreamAttributes,
    target: &AbstractPath,
    io_notify: &mut dyn FnMut(u64) -> Result<(), Cancelled>,
) -> Result<(u64, FinalizeResult), OpError> {
    let mut input = source.device.open_input(&source.path)?;
    let output = target
        .device
        .open_output(&target.path, Some(attrs.file_size), Some(attrs.mod_time))?;

    let run = |input: &mut dyn InputStream,
               mut output: Box<dyn OutputStream>,
               io_notify: &mut dyn FnMut(u64) -> Result<(), Cancelled>|
     -> Result<(u64, FinalizeResult), OpError> {
        let mut buf = vec![0u8; input.block_size().max(1)];
        let mut written: u64 = 0;
        loop {
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            output.write(&buf[..n])?;
            written += n as u64;
            io_notify(n as u64)?;
        }
        if written != attrs.file_size {
            return Err(FileError::new(
                format!("cannot write file {}", target.display()),
                format!(
                    "unexpected size of data stream: expected {} bytes, got {}",
                    attrs.file_size, written
                ),
            )
            .into());
        }
        let fin = output.finalize()?;
        Ok((written, fin))
    };

    match run(input.as_mut(), output, io_notify) {
        Ok(done) => Ok(done),
        Err(err) => {
            // scope-fail cleanup: never leave a partial target behind
            if let Err(cleanup) = target.device.remove_file_plain(&target.path) {
                log::warn!(
                    "failed to remove partial file {}: {}",
                    target.display(),
                    cleanup
                );
            }
            Err(err)
        }
    }
}

/// Transactional copy: either the complete new target exists afterwards, or
/// no target at all. With `transactional = true` data goes to a sibling
/// `*.tdm_tmp` file first and is renamed over on success; `on_delete_target`
/// runs after the source has been fully read, right before the rename.
///
/// Target already existing without a deletion hook: undefined behavior.
pub fn copy_file_transactional(
    source: &AbstractPath,
    attrs: &StreamAttributes,
    target: &AbstractPath,
    transactional: bool,
    mut on_delete_target: Option<&mut dyn FnMut() -> Result<(), FileError>>,
    io_notify: &mut dyn FnMut(u64) -> Result<(), Cancelled>,
) -> Result<FileCopyResult, OpError> {
    let (bytes, fin) = if transactional {
        let tmp = AbstractPath::new(
            Arc::clone(&target.device),
            VfsPath::new(&format!("{}{}", target.path, TEMP_FILE_SUFFIX)),
        );

        let (bytes, fin) = copy_as_stream(source, attrs, &tmp, io_notify)?;

        if let Some(delete_target) = on_delete_target.as_mut() {
            if let Err(err) = delete_target() {
                let _ = tmp.device.remove_file_plain(&tmp.path);
                return Err(err.into());
            }
        }
        if let Err(err) = move_and_rename_item(&tmp, target, false) {
            let _ = tmp.device.remove_file_plain(&tmp.path);
            return Err(err.into());
        }
        (bytes, fin)
    } else {
        if let Some(delete_target) = on_delete_target.as_mut() {
            delete_target()?;
        }
        copy_as_stream(source, attrs, target, io_notify)?
    };

    Ok(FileCopyResult {
        file_size: bytes,
        mod_time: attrs.mod_time,
        source_print: attrs.file_print,
        target_print: fin.file_print,
        error_mod_time: fin.error_mod_time,
    })
}

/// Byte-wise equality of two files via their input streams.
pub fn contents_equal(lhs: &AbstractPath, rhs: &AbstractPath) -> Result<bool, FileError> {
    let mut in_l = lhs.device.open_input(&lhs.path)?;
    let mut in_r = rhs.device.open_input(&rhs.path)?;

    let block = in_l.block_size().max(in_r.block_size()).max(1);
    let mut buf_l = vec![0u8; block];
    let mut buf_r = vec![0u8; block];

    loop {
        let n_l = read_full(in_l.as_mut(), &mut buf_l)?;
        let n_r = read_full(in_r.as_mut(), &mut buf_r)?;
        if n_l != n_r || buf_l[..n_l] != buf_r[..n_r] {
            return Ok(false);
        }
        if n_l == 0 {
            return Ok(true);
        }
    }
}

fn read_full(stream: &mut dyn InputStream, buf: &mut [u8]) -> Result<usize, FileError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
