#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tandem_core::progress::{ErrorChoice, ProcessCallback, ProcessPhase};
use tandem_core::{BaseFolderPair, CompareConfig, FileAttrs, FilePair, NodeId};
use tandem_vfs::{native_device, AbstractPath, Cancelled, VfsPath};

/// Callback recording everything, optionally cancelling after N polls.
#[derive(Default)]
pub struct RecordingCallback {
    pub status: Vec<String>,
    pub log: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub phases: Vec<(usize, u64)>,
    pub items_done: usize,
    pub bytes_done: u64,
    pub cancel_after_polls: Option<usize>,
    pub polls: usize,
    pub error_choice: Option<ErrorChoice>,
}

impl ProcessCallback for RecordingCallback {
    fn init_new_phase(&mut self, item_total: usize, byte_total: u64, _phase: ProcessPhase) {
        self.phases.push((item_total, byte_total));
    }

    fn update_data_processed(&mut self, items_delta: usize, bytes_delta: u64) {
        self.items_done += items_delta;
        self.bytes_done += bytes_delta;
    }

    fn update_status(&mut self, msg: &str) {
        self.status.push(msg.to_string());
    }

    fn log_info(&mut self, msg: &str) {
        self.log.push(msg.to_string());
    }

    fn request_ui_update(&mut self, _force: bool) -> Result<(), Cancelled> {
        self.polls += 1;
        match self.cancel_after_polls {
            Some(limit) if self.polls > limit => Err(Cancelled),
            _ => Ok(()),
        }
    }

    fn report_warning(&mut self, msg: &str, _warn_flag: &mut bool) {
        self.warnings.push(msg.to_string());
    }

    fn report_error(&mut self, msg: &str, _retry_number: usize) -> ErrorChoice {
        self.errors.push(msg.to_string());
        self.error_choice.unwrap_or(ErrorChoice::Ignore)
    }
}

/// Base pair for pure decision tests; the device is never touched.
pub fn memory_base() -> BaseFolderPair {
    memory_base_with(CompareConfig::default())
}

pub fn memory_base_with(config: CompareConfig) -> BaseFolderPair {
    let dev = native_device("/tmp");
    BaseFolderPair::new(
        AbstractPath::new(Arc::clone(&dev), VfsPath::new("left")),
        AbstractPath::new(dev, VfsPath::new("right")),
        config,
    )
}

/// Base pair over `<root>/left` and `<root>/right` on a shared native device.
pub fn disk_base(root: &Path) -> BaseFolderPair {
    let dev = native_device(root);
    BaseFolderPair::new(
        AbstractPath::new(Arc::clone(&dev), VfsPath::new("left")),
        AbstractPath::new(dev, VfsPath::new("right")),
        CompareConfig::default(),
    )
}

/// Push a top-level file pair; sides given as `(size, mod_time)`.
pub fn add_file(
    base: &mut BaseFolderPair,
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
