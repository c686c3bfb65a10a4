//! Manual bulk operations over the decision model.
//!
//! Both operations take user selections as node ids per side, resolve them
//! against the live tree, and drive the devices through the same progress
//! callback contract as the rest of the engine.

mod copy_to;
mod delete;

pub use copy_to::copy_to_alternate_folder;
pub use delete::delete_from_model;

use std::collections::HashSet;

use tandem_vfs::AbstractPath;

use crate::compare::join_rel;
use crate::tree::{BaseFolderPair, ChildItems, NodeId, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemKind {
    File,
    Folder,
    Symlink,
}

/// Snapshot of one selected node on one side, taken before any mutation.
#[derive(Debug, Clone)]
pub(crate) struct SelectedItem {
    pub id: NodeId,
    pub kind: ItemKind,
    /// Path relative to the base folder, on the selected side.
    pub rel_path: String,
    /// Item name on the selected side.
    pub name: String,
    pub size: u64,
    pub mod_time: i64,
    pub file_print: u64,
    pub abstract_path: AbstractPath,
}

/// Resolve a selection to the nodes physically present on `side`, in tree
/// order. Nodes empty on that side are dropped (needed for correct stats).
pub(crate) fn resolve_selection(
    base: &BaseFolderPair,
    side: Side,
    ids: &[NodeId],
) -> Vec<SelectedItem> {
    let wanted: HashSet<NodeId> = ids.iter().copied().collect();
    let mut out = Vec::new();
    collect_selected(
        &base.children,
        "",
        side,
        &wanted,
        base.base_path(side),
        &mut out,
    );
    out
}

fn collect_selected(
    children: &ChildItems,
    rel_parent: &str,
    side: Side,
    wanted: &HashSet<NodeId>,
    base_path: &AbstractPath,
    out: &mut Vec<SelectedItem>,
) {
    for file in &children.files {
        if wanted.contains(&file.id) {
            if let Some(attrs) = file.attrs(side) {
                let rel_path = join_rel(rel_parent, &attrs.name);
                out.push(SelectedItem {
                    id: file.id,
                    kind: ItemKind::File,
                    abstract_path: base_path.join(&rel_path),
                    name: attrs.name.clone(),
                    size: attrs.size,
                    mod_time: attrs.mod_time,
                    file_print: attrs.file_print,
                    rel_path,
                });
            }
        }
    }
    for link in &children.symlinks {
        if wanted.contains(&link.id) {
            if let Some(attrs) = link.attrs(side) {
                let rel_path = join_rel(rel_parent, &attrs.name);
                out.push(SelectedItem {
                    id: link.id,
                    kind: ItemKind::Symlink,
                    abstract_path: base_path.join(&rel_path),
                    name: attrs.name.clone(),
                    size: 0,
                    mod_time: attrs.mod_time,
                    file_print: 0,
                    rel_path,
                });
            }
        }
    }
    for folder in &children.folders {
        if wanted.contains(&folder.id) {
            if let Some(attrs) = folder.attrs(side) {
                let rel_path = join_rel(rel_parent, &attrs.name);
                out.push(SelectedItem {
                    id: folder.id,
                    kind: ItemKind::Folder,
                    abstract_path: base_path.join(&rel_path),
                    name: attrs.name.clone(),
                    size: 0,
                    mod_time: 0,
                    file_print: 0,
                    rel_path,
                });
            }
        }
        let sub_rel = join_rel(rel_parent, folder.name_pref(side));
        collect_selected(&folder.children, &sub_rel, side, wanted, base_path, out);
    }
}

/// Display paths + count of the physically present sides of a selection;
/// feeds confirmation dialogs.
pub fn selection_summary(
    base: &BaseFolderPair,
    sel_left: &[NodeId],
    sel_right: &[NodeId],
) -> (Vec<String>, usize) {
    let mut paths = Vec::new();
    for item in resolve_selection(base, Side::Left, sel_left) {
        paths.push(item.abstract_path.display());
    }
    for item in resolve_selection(base, Side::Right, sel_right) {
        paths.push(item.abstract_path.display());
    }
    let count = paths.len();
    (paths, count)
}
