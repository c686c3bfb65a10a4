//! Device and path abstraction for the tandem synchronization engine.
//!
//! Everything above this crate addresses storage through [`AbstractPath`]
//! and the [`Device`] trait, so the same decision logic drives native disks
//! and whatever other backends a host plugs in.

pub mod device;
pub mod error;
pub mod exist;
pub mod native;
pub mod path;

pub use device::{
    contents_equal, copy_file_transactional, copy_item_permissions, copy_new_folder, copy_symlink,
    create_folder_if_missing_recursive, devices_equal, move_and_rename_item,
    remove_empty_folder_if_exists, remove_file_if_exists, remove_symlink_if_exists, AbstractPath,
    Device, FileCopyResult, FileInfo, FinalizeResult, FingerPrint, FolderInfo, HandleError,
    HandleLink, InputStream, ItemType, OutputStream, SharedTraverserCallback, StreamAttributes,
    SymlinkInfo, TraverserCallback, TraverserWorkload, TEMP_FILE_SUFFIX,
};
pub use error::{Cancelled, FileError, FileErrorKind, OpError};
pub use native::{native_device, NativeDevice};
pub use path::{is_valid_rel_path, VfsPath};
