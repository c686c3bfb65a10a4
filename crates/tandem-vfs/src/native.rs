//! Native-disk device.
//!
//! Maps a [`VfsPath`] beneath a fixed root directory and implements the
//! device contract with `std::fs` plus `filetime` for modification times.
//! Traversal is hand-rolled `read_dir` recursion: the callback contract
//! (per-folder retry decisions, pruning, per-subfolder callbacks) does not
//! map onto an iterator walker. Recycle-bin support goes through the
//! `trash` crate.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use crate::device::{
    Device, FileInfo, FinalizeResult, FingerPrint, FolderInfo, HandleError, HandleLink,
    InputStream, ItemType, OutputStream, SharedTraverserCallback, SymlinkInfo, TraverserWorkload,
};
use crate::error::FileError;
use crate::path::VfsPath;

/// Stream buffer size; matches the sweet spot for buffered local copies.
const BLOCK_SIZE: usize = 128 * 1024;

/// `rename(2)` error for cross-filesystem moves.
#[cfg(unix)]
const EXDEV: i32 = 18;
/// ERROR_NOT_SAME_DEVICE
#[cfg(windows)]
const EXDEV: i32 = 17;

pub struct NativeDevice {
    root: PathBuf,
    device_id: String,
    recycle_supported: bool,
}

impl NativeDevice {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        // canonical root so two spellings of the same disk compare equal
        let device_id = fs::canonicalize(&root)
            .unwrap_or_else(|_| root.clone())
            .to_string_lossy()
            .into_owned();
        Self {
            root,
            device_id,
            recycle_supported: true,
        }
    }

    /// Network mounts and stripped-down filesystems often have no trash
    /// folder; model them by disabling the recycler up front.
    pub fn with_recycle_support(mut self, supported: bool) -> Self {
        self.recycle_supported = supported;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &VfsPath) -> PathBuf {
        let mut abs = self.root.clone();
        for part in path.components() {
            abs.push(part);
        }
        abs
    }
}

fn mod_time_secs(meta: &fs::Metadata) -> i64 {
    match meta.modified() {
        Ok(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(e) => -(e.duration().as_secs() as i64),
        },
        Err(_) => 0,
    }
}

#[cfg(unix)]
fn file_print_of(meta: &fs::Metadata) -> FingerPrint {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn file_print_of(_meta: &fs::Metadata) -> FingerPrint {
    0
}

fn item_type_of(file_type: fs::FileType) -> ItemType {
    if file_type.is_symlink() {
        ItemType::Symlink
    } else if file_type.is_dir() {
        ItemType::Folder
    } else {
        ItemType::File
    }
}

impl Device for NativeDevice {
    fn kind(&self) -> &'static str {
        "native"
    }

    fn device_id(&self) -> String {
        self.device_id.clone()
    }

    fn display_path(&self, path: &VfsPath) -> String {
        self.resolve(path).to_string_lossy().into_owned()
    }

    fn item_type(&self, path: &VfsPath) -> Result<ItemType, FileError> {
        let abs = self.resolve(path);
        let meta = fs::symlink_metadata(&abs)
            .map_err(|e| FileError::from_io(format!("cannot read attributes of {}", abs.display()), &e))?;
        Ok(item_type_of(meta.file_type()))
    }

    fn item_still_exists(&self, path: &VfsPath) -> Result<Option<ItemType>, FileError> {
        let abs = self.resolve(path);
        match fs::symlink_metadata(&abs) {
            Ok(meta) => Ok(Some(item_type_of(meta.file_type()))),
            Err(err) => {
                if path.is_root() {
                    // no ancestors to walk: the access test is all we have
                    return if err.kind() == std::io::ErrorKind::NotFound {
                        Ok(None)
                    } else {
                        Err(FileError::from_io(
                            format!("cannot read attributes of {}", abs.display()),
                            &err,
                        ))
                    };
                }
                let parent = match path.parent() {
                    Some(p) => p,
                    None => return Ok(None),
                };
                match self.item_still_exists(&parent)? {
                    None | Some(ItemType::File) => Ok(None),
                    Some(_) => {
                        // case-sensitive name search through the parent
                        let parent_abs = self.resolve(&parent);
                        let read = fs::read_dir(&parent_abs).map_err(|e| {
                            FileError::from_io(
                                format!("cannot enumerate folder {}", parent_abs.display()),
                                &e,
                            )
                        })?;
                        for entry in read {
                            let entry = entry.map_err(|e| {
                                FileError::from_io(
                                    format!("cannot enumerate folder {}", parent_abs.display()),
                                    &e,
                                )
                            })?;
                            if entry.file_name().to_string_lossy() == path.item_name() {
                                let meta = fs::symlink_metadata(entry.path()).map_err(|e| {
                                    FileError::from_io(
                                        format!(
                                            "cannot read attributes of {}",
                                            entry.path().display()
                                        ),
                                        &e,
                                    )
                                })?;
                                return Ok(Some(item_type_of(meta.file_type())));
                            }
                        }
                        Ok(None)
                    }
                }
            }
        }
    }

    fn create_folder_plain(&self, path: &VfsPath) -> Result<(), FileError> {
        let abs = self.resolve(path);
        fs::create_dir(&abs)
            .map_err(|e| FileError::from_io(format!("cannot create folder {}", abs.display()), &e))
    }

    fn remove_file_plain(&self, path: &VfsPath) -> Result<(), FileError> {
        let abs = self.resolve(path);
        fs::remove_file(&abs)
            .map_err(|e| FileError::from_io(format!("cannot delete file {}", abs.display()), &e))
    }

    fn remove_symlink_plain(&self, path: &VfsPath) -> Result<(), FileError> {
        let abs = self.resolve(path);
        #[cfg(windows)]
        {
            // directory links need RemoveDirectory semantics
            if fs::remove_file(&abs).is_ok() {
                return Ok(());
            }
            return fs::remove_dir(&abs).map_err(|e| {
                FileError::from_io(format!("cannot delete symbolic link {}", abs.display()), &e)
            });
        }
        #[cfg(not(windows))]
        fs::remove_file(&abs).map_err(|e| {
            FileError::from_io(format!("cannot delete symbolic link {}", abs.display()), &e)
        })
    }

    fn remove_folder_plain(&self, path: &VfsPath) -> Result<(), FileError> {
        let abs = self.resolve(path);
        fs::remove_dir(&abs)
            .map_err(|e| FileError::from_io(format!("cannot delete folder {}", abs.display()), &e))
    }

    fn remove_folder_if_exists_recursive(
        &self,
        path: &VfsPath,
        on_before_file: &mut dyn FnMut(&str),
        on_before_folder: &mut dyn FnMut(&str),
    ) -> Result<(), FileError> {
        let abs = self.resolve(path);
        let meta = match fs::symlink_metadata(&abs) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(FileError::from_io(
                    format!("cannot read attributes of {}", abs.display()),
                    &err,
                ))
            }
        };
        if meta.file_type().is_symlink() {
            on_before_folder(&abs.to_string_lossy());
            return self.remove_symlink_plain(path);
        }
        remove_dir_deferred(&abs, on_before_file, on_before_folder)
    }

    fn move_and_rename(
        &self,
        from: &VfsPath,
        to: &VfsPath,
        replace_existing: bool,
    ) -> Result<(), FileError> {
        let abs_from = self.resolve(from);
        let abs_to = self.resolve(to);
        let err_msg = || {
            format!(
                "cannot move {} to {}",
                abs_from.display(),
                abs_to.display()
            )
        };

        if !replace_existing {
            if let Ok(target_meta) = fs::symlink_metadata(&abs_to) {
                let source_meta = fs::symlink_metadata(&abs_from)
                    .map_err(|e| FileError::from_io(err_msg(), &e))?;
                if !same_underlying_item(&source_meta, &target_meta, &abs_from, &abs_to) {
                    return Err(FileError::target_existing(err_msg(), "target already exists"));
                }
                // same item (idempotent rename, hardlink alias): fall through
            }
        }

        fs::rename(&abs_from, &abs_to).map_err(|e| {
            if e.raw_os_error() == Some(EXDEV) {
                FileError::move_unsupported(err_msg(), "cross-device rename")
            } else {
                FileError::from_io(err_msg(), &e)
            }
        })
    }

    fn open_input(&self, path: &VfsPath) -> Result<Box<dyn InputStream>, FileError> {
        let abs = self.resolve(path);
        let file = fs::File::open(&abs).map_err(|e| {
            let msg = format!("cannot open file {}", abs.display());
            if e.kind() == std::io::ErrorKind::WouldBlock {
                FileError::file_locked(msg, e.to_string())
            } else {
                FileError::from_io(msg, &e)
            }
        })?;
        Ok(Box::new(NativeInputStream { file, path: abs }))
    }

    fn open_output(
        &self,
        path: &VfsPath,
        size_hint: Option<u64>,
        mod_time: Option<i64>,
    ) -> Result<Box<dyn OutputStream>, FileError> {
        let abs = self.resolve(path);
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&abs)
            .map_err(|e| FileError::from_io(format!("cannot write file {}", abs.display()), &e))?;
        if let Some(size) = size_hint {
            // preallocate so running out of space fails early, not mid-stream
            if let Err(err) = file.set_len(size) {
                let _ = fs::remove_file(&abs);
                return Err(FileError::from_io(
                    format!("cannot write file {}", abs.display()),
                    &err,
                ));
            }
        }
        Ok(Box::new(NativeOutputStream {
            file: Some(file),
            path: abs,
            mod_time,
            bytes_written: 0,
        }))
    }

    fn read_symlink(&self, path: &VfsPath) -> Result<String, FileError> {
        let abs = self.resolve(path);
        let target = fs::read_link(&abs).map_err(|e| {
            FileError::from_io(format!("cannot resolve symbolic link {}", abs.display()), &e)
        })?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn create_symlink(&self, path: &VfsPath, target: &str) -> Result<(), FileError> {
        let abs = self.resolve(path);
        #[cfg(unix)]
        let result = std::os::unix::fs::symlink(target, &abs);
        #[cfg(windows)]
        let result = std::os::windows::fs::symlink_file(target, &abs);
        result.map_err(|e| {
            FileError::from_io(
                format!("cannot create symbolic link {}", abs.display()),
                &e,
            )
        })
    }

    fn copy_item_permissions(&self, from: &VfsPath, to: &VfsPath) -> Result<(), FileError> {
        let abs_from = self.resolve(from);
        let abs_to = self.resolve(to);
        let meta = fs::symlink_metadata(&abs_from).map_err(|e| {
            FileError::from_io(
                format!("cannot read permissions of {}", abs_from.display()),
                &e,
            )
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let err_map = |e: std::io::Error| {
                FileError::from_io(format!("cannot write permissions of {}", abs_to.display()), &e)
            };
            if meta.file_type().is_symlink() {
                // owner only; mode is meaningless on the link itself
                std::os::unix::fs::lchown(&abs_to, Some(meta.uid()), Some(meta.gid()))
                    .map_err(&err_map)?;
            } else {
                std::os::unix::fs::chown(&abs_to, Some(meta.uid()), Some(meta.gid()))
                    .map_err(&err_map)?;
                fs::set_permissions(&abs_to, meta.permissions()).map_err(&err_map)?;
            }
        }
        #[cfg(not(unix))]
        {
            let _ = meta;
        }
        Ok(())
    }

    fn free_disk_space(&self, _path: &VfsPath) -> Result<Option<u64>, FileError> {
        Ok(None)
    }

    fn supports_recycle_bin(&self, _path: &VfsPath) -> Result<bool, FileError> {
        Ok(self.recycle_supported)
    }

    fn recycle_item_if_exists(&self, path: &VfsPath) -> Result<(), FileError> {
        let abs = self.resolve(path);
        match fs::symlink_metadata(&abs) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(FileError::from_io(
                    format!("cannot read attributes of {}", abs.display()),
                    &err,
                ))
            }
            Ok(_) => {}
        }
        trash::delete(&abs).map_err(|e| {
            FileError::new(
                format!("cannot move {} to the recycle bin", abs.display()),
                e.to_string(),
            )
        })
    }

    fn traverse_folder_recursive(&self, workload: TraverserWorkload, parallel_ops: usize) {
        let ops = if parallel_ops == 0 {
            num_cpus::get()
        } else {
            parallel_ops
        };
        match rayon::ThreadPoolBuilder::new().num_threads(ops).build() {
            Ok(pool) => pool.scope(|scope| {
                for (path, callback) in workload {
                    let abs = self.resolve(&path);
                    scope.spawn(move |scope| traverse_dir(abs, callback, Some(scope)));
                }
            }),
            Err(err) => {
                log::warn!("traversal worker pool unavailable, running serially: {err}");
                for (path, callback) in workload {
                    traverse_dir(self.resolve(&path), callback, None);
                }
            }
        }
    }
}

#[cfg(unix)]
fn same_underlying_item(
    source: &fs::Metadata,
    target: &fs::Metadata,
    _from: &Path,
    _to: &Path,
) -> bool {
    use std::os::unix::fs::MetadataExt;
    source.dev() == target.dev() && source.ino() == target.ino()
}

#[cfg(not(unix))]
fn same_underlying_item(
    _source: &fs::Metadata,
    _target: &fs::Metadata,
    from: &Path,
    to: &Path,
) -> bool {
    match (fs::canonicalize(from), fs::canonicalize(to)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// List children first, delete files, then symlinks, then recurse into
/// subfolders, then the folder itself; keeps stack depth bounded by the
/// folder nesting level, not the item count.
fn remove_dir_deferred(
    abs: &Path,
    on_before_file: &mut dyn FnMut(&str),
    on_before_folder: &mut dyn FnMut(&str),
) -> Result<(), FileError> {
    let mut files = Vec::new();
    let mut symlinks = Vec::new();
    let mut folders = Vec::new();

    let read = fs::read_dir(abs)
        .map_err(|e| FileError::from_io(format!("cannot enumerate folder {}", abs.display()), &e))?;
    for entry in read {
        let entry = entry.map_err(|e| {
            FileError::from_io(format!("cannot enumerate folder {}", abs.display()), &e)
        })?;
        let file_type = entry.file_type().map_err(|e| {
            FileError::from_io(
                format!("cannot read attributes of {}", entry.path().display()),
                &e,
            )
        })?;
        if file_type.is_symlink() {
            symlinks.push(entry.path());
        } else if file_type.is_dir() {
            folders.push(entry.path());
        } else {
            files.push(entry.path());
        }
    }

    for file in files {
        on_before_file(&file.to_string_lossy());
        fs::remove_file(&file)
            .map_err(|e| FileError::from_io(format!("cannot delete file {}", file.display()), &e))?;
    }
    for link in symlinks {
        on_before_file(&link.to_string_lossy());
        fs::remove_file(&link).map_err(|e| {
            FileError::from_io(format!("cannot delete symbolic link {}", link.display()), &e)
        })?;
    }
    for folder in folders {
        remove_dir_deferred(&folder, on_before_file, on_before_folder)?;
    }

    on_before_folder(&abs.to_string_lossy());
    fs::remove_dir(abs)
        .map_err(|e| FileError::from_io(format!("cannot delete folder {}", abs.display()), &e))
}

struct NativeInputStream {
    file: fs::File,
    path: PathBuf,
}

impl InputStream for NativeInputStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        self.file.read(buf).map_err(|e| {
            FileError::from_io(format!("cannot read file {}", self.path.display()), &e)
        })
    }

    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }
}

struct NativeOutputStream {
    file: Option<fs::File>,
    path: PathBuf,
    mod_time: Option<i64>,
    bytes_written: u64,
}

impl OutputStream for NativeOutputStream {
    fn write(&mut self, buf: &[u8]) -> Result<(), FileError> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(FileError::new(
                    format!("cannot write file {}", self.path.display()),
                    "stream already finalized",
                ))
            }
        };
        file.write_all(buf).map_err(|e| {
            FileError::from_io(format!("cannot write file {}", self.path.display()), &e)
        })?;
        self.bytes_written += buf.len() as u64;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<FinalizeResult, FileError> {
        if let Some(file) = self.file.take() {
            // preallocation may have left the file longer than what arrived
            file.set_len(self.bytes_written).map_err(|e| {
                FileError::from_io(format!("cannot write file {}", self.path.display()), &e)
            })?;
            file.sync_all().map_err(|e| {
                FileError::from_io(format!("cannot write file {}", self.path.display()), &e)
            })?;
            drop(file); // close *before* setting the modification time
        }

        let mut result = FinalizeResult::default();
        if let Some(mod_time) = self.mod_time {
            let ft = filetime::FileTime::from_unix_time(mod_time, 0);
            if let Err(err) = filetime::set_file_mtime(&self.path, ft) {
                result.error_mod_time = Some(FileError::from_io(
                    format!("cannot change modification time of {}", self.path.display()),
                    &err,
                ));
            }
        }
        if let Ok(meta) = fs::metadata(&self.path) {
            result.file_print = file_print_of(&meta);
        }
        Ok(result)
    }
}

//---------------------------------------------------------------------------
// Recursive traversal
//---------------------------------------------------------------------------

fn report_folder_error(callback: &SharedTraverserCallback, msg: &str, retry: usize) -> HandleError {
    callback.lock().on_folder_error(msg, retry)
}

fn traverse_dir(abs: PathBuf, callback: SharedTraverserCallback, scope: Option<&rayon::Scope<'_>>) {
    let mut retry = 0;
    let entries = loop {
        match list_dir(&abs) {
            Ok(entries) => break entries,
            Err(err) => match report_folder_error(&callback, &err.to_string(), retry) {
                HandleError::Retry => retry += 1,
                HandleError::Ignore => return,
            },
        }
    };

    'entries: for (name, entry_path) in entries {
        let mut retry = 0;
        let meta = loop {
            match fs::symlink_metadata(&entry_path) {
                Ok(meta) => break meta,
                Err(err) => {
                    let msg = format!(
                        "cannot read attributes of {} ({err})",
                        entry_path.display()
                    );
                    match callback.lock().on_item_error(&msg, retry, &name) {
                        HandleError::Retry => retry += 1,
                        HandleError::Ignore => continue 'entries,
                    }
                }
            }
        };

        if meta.file_type().is_symlink() {
            let info = SymlinkInfo {
                name: name.clone(),
                mod_time: mod_time_secs(&meta),
            };
            // bind before matching: the callback may be re-entered below
            let handling = callback.lock().on_symlink(&info);
            match handling {
                HandleLink::Skip => {}
                HandleLink::Follow => {
                    let mut retry = 0;
                    let target_meta = loop {
                        match fs::metadata(&entry_path) {
                            Ok(meta) => break meta,
                            Err(err) => {
                                let msg = format!(
                                    "cannot resolve symbolic link {} ({err})",
                                    entry_path.display()
                                );
                                match callback.lock().on_item_error(&msg, retry, &name) {
                                    HandleError::Retry => retry += 1,
                                    HandleError::Ignore => continue 'entries,
                                }
                            }
                        }
                    };
                    if target_meta.is_dir() {
                        let info = FolderInfo {
                            name,
                            is_followed_symlink: true,
                        };
                        let sub = callback.lock().on_folder(&info);
                        if let Some(sub) = sub {
                            descend(entry_path, sub, scope);
                        }
                    } else {
                        callback.lock().on_file(&FileInfo {
                            name,
                            size: target_meta.len(),
                            mod_time: mod_time_secs(&target_meta),
                            file_print: file_print_of(&target_meta),
                            is_followed_symlink: true,
                        });
                    }
                }
            }
        } else if meta.is_dir() {
            let info = FolderInfo {
                name,
                is_followed_symlink: false,
            };
            let sub = callback.lock().on_folder(&info);
            if let Some(sub) = sub {
                descend(entry_path, sub, scope);
            }
        } else {
            callback.lock().on_file(&FileInfo {
                name,
                size: meta.len(),
                mod_time: mod_time_secs(&meta),
                file_print: file_print_of(&meta),
                is_followed_symlink: false,
            });
        }
    }
}

fn descend(abs: PathBuf, callback: SharedTraverserCallback, scope: Option<&rayon::Scope<'_>>) {
    match scope {
        Some(scope) => scope.spawn(move |scope| traverse_dir(abs, callback, Some(scope))),
        None => traverse_dir(abs, callback, None),
    }
}

fn list_dir(abs: &Path) -> Result<Vec<(String, PathBuf)>, FileError> {
    let read = fs::read_dir(abs)
        .map_err(|e| FileError::from_io(format!("cannot enumerate folder {}", abs.display()), &e))?;
    let mut out = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| {
            FileError::from_io(format!("cannot enumerate folder {}", abs.display()), &e)
        })?;
        out.push((
            entry.file_name().to_string_lossy().into_owned(),
            entry.path(),
        ));
    }
    // deterministic, case-sensitive sibling order
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

/// Wrap a root directory as a shareable device handle.
pub fn native_device(root: impl Into<PathBuf>) -> Arc<dyn Device> {
    Arc::new(NativeDevice::new(root))
}
