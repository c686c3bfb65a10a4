//! The scanned pair tree.
//!
//! The scanner hands the engine one [`BaseFolderPair`] per configured
//! (left root, right root) pair: a forest of file/symlink/folder pairs, each
//! holding the attributes found on either side plus the engine-maintained
//! category, sync direction, active flag, and (for files) move reference.
//!
//! Invariants:
//! - a pair is never empty on both sides (except transiently during bulk
//!   deletion, until [`BaseFolderPair::remove_empty`] prunes it);
//! - sibling order is name-sorted, case-sensitive;
//! - move references are mutually consistent or absent on both partners.

use std::sync::atomic::{AtomicU64, Ordering};

use tandem_vfs::{AbstractPath, FingerPrint};

use crate::compare::CompareConfig;

/// Stable node handle within one base pair; survives tree mutation.
pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Classification of a pair's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Equal,
    LeftOnly,
    RightOnly,
    LeftNewer,
    RightNewer,
    DifferentContent,
    /// Equal by the comparison variant, but metadata (name case) differs.
    DifferentMetadata,
    /// Cannot categorize; the reason lives in the pair's `cat_note`.
    Conflict,
}

impl Category {
    pub fn flipped(self) -> Self {
        match self {
            Category::LeftOnly => Category::RightOnly,
            Category::RightOnly => Category::LeftOnly,
            Category::LeftNewer => Category::RightNewer,
            Category::RightNewer => Category::LeftNewer,
            other => other,
        }
    }
}

/// The resolved sync action for one pair.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncDirection {
    #[default]
    None,
    Left,
    Right,
    /// Unresolvable; carries the reason shown to the user.
    Conflict(String),
}

impl SyncDirection {
    pub fn flipped(self) -> Self {
        match self {
            SyncDirection::Left => SyncDirection::Right,
            SyncDirection::Right => SyncDirection::Left,
            other => other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncDirection::Conflict(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttrs {
    pub name: String,
    pub size: u64,
    /// Seconds since the Unix epoch, UTC.
    pub mod_time: i64,
    /// Device-persistent identity; 0 = unknown.
    pub file_print: FingerPrint,
    pub is_followed_symlink: bool,
}

impl FileAttrs {
    pub fn new(name: impl Into<String>, size: u64, mod_time: i64) -> Self {
        Self {
            name: name.into(),
            size,
            mod_time,
            file_print: 0,
            is_followed_symlink: false,
        }
    }

    pub fn with_print(mut self, file_print: FingerPrint) -> Self {
        self.file_print = file_print;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAttrs {
    pub name: String,
    pub mod_time: i64,
    /// Link target as scanned; only needed for content-style comparison.
    pub target: Option<String>,
}

impl LinkAttrs {
    pub fn new(name: impl Into<String>, mod_time: i64) -> Self {
        Self {
            name: name.into(),
            mod_time,
            target: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderAttrs {
    pub name: String,
    pub is_followed_symlink: bool,
}

impl FolderAttrs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_followed_symlink: false,
        }
    }
}

//---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FilePair {
    pub id: NodeId,
    left: Option<FileAttrs>,
    right: Option<FileAttrs>,
    pub category: Category,
    /// Extra description for `Conflict`/`DifferentMetadata` categories.
    pub cat_note: Option<String>,
    pub direction: SyncDirection,
    pub active: bool,
    /// Partner in a detected move; must mirror the partner's reference.
    pub move_ref: Option<NodeId>,
}

impl FilePair {
    pub fn new(id: NodeId, left: Option<FileAttrs>, right: Option<FileAttrs>) -> Self {
        debug_assert!(left.is_some() || right.is_some());
        let category = initial_category(left.is_some(), right.is_some());
        Self {
            id,
            left,
            right,
            category,
            cat_note: None,
            direction: SyncDirection::None,
            active: true,
            move_ref: None,
        }
    }

    pub fn attrs(&self, side: Side) -> Option<&FileAttrs> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        self.attrs(side).is_none()
    }

    pub fn item_name(&self, side: Side) -> Option<&str> {
        self.attrs(side).map(|a| a.name.as_str())
    }

    /// Name on `side`, falling back to the other side for display/paths.
    pub fn name_pref(&self, side: Side) -> &str {
        self.item_name(side)
            .or_else(|| self.item_name(side.opposite()))
            .unwrap_or_default()
    }

    pub fn file_print(&self, side: Side) -> FingerPrint {
        self.attrs(side).map(|a| a.file_print).unwrap_or(0)
    }

    pub fn clear_file_print(&mut self, side: Side) {
        let attrs = match side {
            Side::Left => self.left.as_mut(),
            Side::Right => self.right.as_mut(),
        };
        if let Some(attrs) = attrs {
            attrs.file_print = 0;
        }
    }

    pub fn set_conflict(&mut self, reason: impl Into<String>) {
        self.direction = SyncDirection::Conflict(reason.into());
    }

    /// Physically removed on `side`: clear attributes and re-categorize.
    pub fn remove_side(&mut self, side: Side) {
        match side {
            Side::Left => self.left = None,
            Side::Right => self.right = None,
        }
        self.category = initial_category(self.left.is_some(), self.right.is_some());
        self.cat_note = None;
        self.direction = SyncDirection::None;
        self.move_ref = None;
    }

    fn flip(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
        self.category = self.category.flipped();
        self.direction = std::mem::take(&mut self.direction).flipped();
    }
}

#[derive(Debug)]
pub struct SymlinkPair {
    pub id: NodeId,
    left: Option<LinkAttrs>,
    right: Option<LinkAttrs>,
    pub category: Category,
    pub cat_note: Option<String>,
    pub direction: SyncDirection,
    pub active: bool,
}

impl SymlinkPair {
    pub fn new(id: NodeId, left: Option<LinkAttrs>, right: Option<LinkAttrs>) -> Self {
        debug_assert!(left.is_some() || right.is_some());
        let category = initial_category(left.is_some(), right.is_some());
        Self {
            id,
            left,
            right,
            category,
            cat_note: None,
            direction: SyncDirection::None,
            active: true,
        }
    }

    pub fn attrs(&self, side: Side) -> Option<&LinkAttrs> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        self.attrs(side).is_none()
    }

    pub fn item_name(&self, side: Side) -> Option<&str> {
        self.attrs(side).map(|a| a.name.as_str())
    }

    pub fn name_pref(&self, side: Side) -> &str {
        self.item_name(side)
            .or_else(|| self.item_name(side.opposite()))
            .unwrap_or_default()
    }

    pub fn set_conflict(&mut self, reason: impl Into<String>) {
        self.direction = SyncDirection::Conflict(reason.into());
    }

    pub fn remove_side(&mut self, side: Side) {
        match side {
            Side::Left => self.left = None,
            Side::Right => self.right = None,
        }
        self.category = initial_category(self.left.is_some(), self.right.is_some());
        self.cat_note = None;
        self.direction = SyncDirection::None;
    }

    fn flip(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
        self.category = self.category.flipped();
        self.direction = std::mem::take(&mut self.direction).flipped();
    }
}

#[derive(Debug)]
pub struct FolderPair {
    pub id: NodeId,
    left: Option<FolderAttrs>,
    right: Option<FolderAttrs>,
    pub category: Category,
    pub cat_note: Option<String>,
    pub direction: SyncDirection,
    pub active: bool,
    pub children: ChildItems,
}

impl FolderPair {
    pub fn new(id: NodeId, left: Option<FolderAttrs>, right: Option<FolderAttrs>) -> Self {
        debug_assert!(left.is_some() || right.is_some());
        let category = initial_category(left.is_some(), right.is_some());
        Self {
            id,
            left,
            right,
            category,
            cat_note: None,
            direction: SyncDirection::None,
            active: true,
            children: ChildItems::default(),
        }
    }

    pub fn attrs(&self, side: Side) -> Option<&FolderAttrs> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        self.attrs(side).is_none()
    }

    pub fn item_name(&self, side: Side) -> Option<&str> {
        self.attrs(side).map(|a| a.name.as_str())
    }

    pub fn name_pref(&self, side: Side) -> &str {
        self.item_name(side)
            .or_else(|| self.item_name(side.opposite()))
            .unwrap_or_default()
    }

    pub fn set_conflict(&mut self, reason: impl Into<String>) {
        self.direction = SyncDirection::Conflict(reason.into());
    }

    /// Removal on one side wipes the whole subtree on that side.
    pub fn remove_side(&mut self, side: Side) {
        match side {
            Side::Left => self.left = None,
            Side::Right => self.right = None,
        }
        self.category = initial_category(self.left.is_some(), self.right.is_some());
        self.cat_note = None;
        self.direction = SyncDirection::None;
        for file in &mut self.children.files {
            if !file.is_empty(side) {
                file.remove_side(side);
            }
        }
        for link in &mut self.children.symlinks {
            if !link.is_empty(side) {
                link.remove_side(side);
            }
        }
        for folder in &mut self.children.folders {
            if !folder.is_empty(side) {
                folder.remove_side(side);
            }
        }
    }

    /// Force a direction on this folder and every descendant; items already
    /// categorized `Equal` keep `None`.
    pub fn set_direction_rec(&mut self, direction: &SyncDirection) {
        if self.category != Category::Equal {
            self.direction = direction.clone();
        }
        self.children.set_direction_rec(direction);
    }

    /// In-/exclude this folder and all descendants.
    pub fn set_active_rec(&mut self, active: bool) {
        self.active = active;
        self.children.set_active_rec(active);
    }

    fn flip(&mut self) {
        std::mem::swap(&mut self.left, &mut self.right);
        self.category = self.category.flipped();
        self.direction = std::mem::take(&mut self.direction).flipped();
        self.children.flip();
    }
}

fn initial_category(has_left: bool, has_right: bool) -> Category {
    match (has_left, has_right) {
        (true, false) => Category::LeftOnly,
        (false, true) => Category::RightOnly,
        _ => Category::Equal,
    }
}

//---------------------------------------------------------------------------

/// The recurring (files, symlinks, folders) triple of a container level.
#[derive(Debug, Default)]
pub struct ChildItems {
    pub files: Vec<FilePair>,
    pub symlinks: Vec<SymlinkPair>,
    pub folders: Vec<FolderPair>,
}

/// Borrowed view of any pair node.
pub enum NodeRef<'a> {
    File(&'a FilePair),
    Symlink(&'a SymlinkPair),
    Folder(&'a FolderPair),
}

/// Mutable view of any pair node.
pub enum NodeMut<'a> {
    File(&'a mut FilePair),
    Symlink(&'a mut SymlinkPair),
    Folder(&'a mut FolderPair),
}

impl NodeRef<'_> {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::File(n) => n.id,
            NodeRef::Symlink(n) => n.id,
            NodeRef::Folder(n) => n.id,
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        match self {
            NodeRef::File(n) => n.is_empty(side),
            NodeRef::Symlink(n) => n.is_empty(side),
            NodeRef::Folder(n) => n.is_empty(side),
        }
    }

    pub fn name_pref(&self, side: Side) -> &str {
        match self {
            NodeRef::File(n) => n.name_pref(side),
            NodeRef::Symlink(n) => n.name_pref(side),
            NodeRef::Folder(n) => n.name_pref(side),
        }
    }
}

impl NodeMut<'_> {
    pub fn id(&self) -> NodeId {
        match self {
            NodeMut::File(n) => n.id,
            NodeMut::Symlink(n) => n.id,
            NodeMut::Folder(n) => n.id,
        }
    }

    pub fn is_empty(&self, side: Side) -> bool {
        match self {
            NodeMut::File(n) => n.is_empty(side),
            NodeMut::Symlink(n) => n.is_empty(side),
            NodeMut::Folder(n) => n.is_empty(side),
        }
    }

    /// Set a direction on this node; recursive for folders.
    pub fn set_direction_rec(&mut self, direction: &SyncDirection) {
        match self {
            NodeMut::File(n) => {
                if n.category != Category::Equal {
                    n.direction = direction.clone();
                }
            }
            NodeMut::Symlink(n) => {
                if n.category != Category::Equal {
                    n.direction = direction.clone();
                }
            }
            NodeMut::Folder(n) => n.set_direction_rec(direction),
        }
    }

    pub fn remove_side(&mut self, side: Side) {
        match self {
            NodeMut::File(n) => n.remove_side(side),
            NodeMut::Symlink(n) => n.remove_side(side),
            NodeMut::Folder(n) => n.remove_side(side),
        }
    }
}

impl ChildItems {
    pub fn is_empty_tree(&self) -> bool {
        self.files.is_empty() && self.symlinks.is_empty() && self.folders.is_empty()
    }

    /// Name-sorted sibling order (case-sensitive), as the scanner contract
    /// requires; builders call this after pushing out of order.
    pub fn sort_by_name(&mut self) {
        self.files
            .sort_by(|a, b| a.name_pref(Side::Left).cmp(b.name_pref(Side::Left)));
        self.symlinks
            .sort_by(|a, b| a.name_pref(Side::Left).cmp(b.name_pref(Side::Left)));
        self.folders
            .sort_by(|a, b| a.name_pref(Side::Left).cmp(b.name_pref(Side::Left)));
        for folder in &mut self.folders {
            folder.children.sort_by_name();
        }
    }

    /// Visit every pair beneath this level: files, then symlinks, then each
    /// folder followed by its contents.
    pub fn for_each(&self, f: &mut dyn FnMut(NodeRef<'_>)) {
        for file in &self.files {
            f(NodeRef::File(file));
        }
        for link in &self.symlinks {
            f(NodeRef::Symlink(link));
        }
        for folder in &self.folders {
            f(NodeRef::Folder(folder));
            folder.children.for_each(f);
        }
    }

    pub fn for_each_mut(&mut self, f: &mut dyn FnMut(NodeMut<'_>)) {
        for file in &mut self.files {
            f(NodeMut::File(file));
        }
        for link in &mut self.symlinks {
            f(NodeMut::Symlink(link));
        }
        for folder in &mut self.folders {
            f(NodeMut::Folder(folder));
            folder.children.for_each_mut(f);
        }
    }

    pub fn find_mut(&mut self, id: NodeId) -> Option<NodeMut<'_>> {
        for file in &mut self.files {
            if file.id == id {
                return Some(NodeMut::File(file));
            }
        }
        for link in &mut self.symlinks {
            if link.id == id {
                return Some(NodeMut::Symlink(link));
            }
        }
        for folder in &mut self.folders {
            if folder.id == id {
                return Some(NodeMut::Folder(folder));
            }
            if let Some(found) = folder.children.find_mut(id) {
                return Some(found);
            }
        }
        None
    }

    pub fn all_equal(&self) -> bool {
        self.files.iter().all(|f| f.category == Category::Equal)
            && self.symlinks.iter().all(|l| l.category == Category::Equal)
            && self
                .folders
                .iter()
                .all(|d| d.category == Category::Equal && d.children.all_equal())
    }

    pub fn set_active_rec(&mut self, active: bool) {
        for file in &mut self.files {
            file.active = active;
        }
        for link in &mut self.symlinks {
            link.active = active;
        }
        for folder in &mut self.folders {
            folder.active = active;
            folder.children.set_active_rec(active);
        }
    }

    pub fn set_direction_rec(&mut self, direction: &SyncDirection) {
        for file in &mut self.files {
            if file.category != Category::Equal {
                file.direction = direction.clone();
            }
        }
        for link in &mut self.symlinks {
            if link.category != Category::Equal {
                link.direction = direction.clone();
            }
        }
        for folder in &mut self.folders {
            folder.set_direction_rec(direction);
        }
    }

    fn flip(&mut self) {
        for file in &mut self.files {
            file.flip();
        }
        for link in &mut self.symlinks {
            link.flip();
        }
        for folder in &mut self.folders {
            folder.flip();
        }
    }

    fn remove_empty(&mut self) {
        self.files
            .retain(|f| !(f.is_empty(Side::Left) && f.is_empty(Side::Right)));
        self.symlinks
            .retain(|l| !(l.is_empty(Side::Left) && l.is_empty(Side::Right)));
        for folder in &mut self.folders {
            folder.children.remove_empty();
        }
        self.folders.retain(|d| {
            !(d.is_empty(Side::Left) && d.is_empty(Side::Right) && d.children.is_empty_tree())
        });
    }
}

//---------------------------------------------------------------------------

/// Allocates node ids within one base pair.
#[derive(Debug, Default)]
pub struct IdGen(AtomicU64);

impl IdGen {
    pub fn next(&self) -> NodeId {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// One configured (left root, right root) pair plus its scanned contents.
pub struct BaseFolderPair {
    left_base: AbstractPath,
    right_base: AbstractPath,
    pub config: CompareConfig,
    pub children: ChildItems,
    id_gen: IdGen,
}

impl BaseFolderPair {
    pub fn new(left_base: AbstractPath, right_base: AbstractPath, config: CompareConfig) -> Self {
        Self {
            left_base,
            right_base,
            config,
            children: ChildItems::default(),
            id_gen: IdGen::default(),
        }
    }

    pub fn base_path(&self, side: Side) -> &AbstractPath {
        match side {
            Side::Left => &self.left_base,
            Side::Right => &self.right_base,
        }
    }

    pub fn next_id(&self) -> NodeId {
        self.id_gen.next()
    }

    pub fn all_items_equal(&self) -> bool {
        self.children.all_equal()
    }

    /// Mirror the whole tree: swap sides of every node and the base paths.
    pub fn flip(&mut self) {
        std::mem::swap(&mut self.left_base, &mut self.right_base);
        self.children.flip();
    }

    /// Drop pairs that became empty on both sides (after bulk deletion).
    pub fn remove_empty(&mut self) {
        self.children.remove_empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CompareConfig;
    use std::sync::Arc;
    use tandem_vfs::{native_device, VfsPath};

    fn test_base() -> BaseFolderPair {
        let dev = native_device("/tmp");
        BaseFolderPair::new(
            AbstractPath::new(Arc::clone(&dev), VfsPath::new("l")),
            AbstractPath::new(dev, VfsPath::new("r")),
            CompareConfig::default(),
        )
    }

    #[test]
    fn flip_mirrors_categories_and_directions() {
        let mut base = test_base();
        let id = base.next_id();
        let mut file = FilePair::new(id, Some(FileAttrs::new("a", 1, 10)), None);
        file.direction = SyncDirection::Left;
        base.children.files.push(file);

        base.flip();
        let file = &base.children.files[0];
        assert_eq!(file.category, Category::RightOnly);
        assert_eq!(file.direction, SyncDirection::Right);
        assert!(file.is_empty(Side::Left));

        assert_eq!(base.base_path(Side::Left).path, VfsPath::new("r"));
    }

    #[test]
    fn remove_side_recurses_and_prunes() {
        let mut base = test_base();
        let id = base.next_id();
        let mut folder = FolderPair::new(
            id,
            Some(FolderAttrs::new("d")),
            Some(FolderAttrs::new("d")),
        );
        let child_id = base.next_id();
        folder.children.files.push(FilePair::new(
            child_id,
            Some(FileAttrs::new("f", 1, 1)),
            None,
        ));
        base.children.folders.push(folder);

        {
            let folder = &mut base.children.folders[0];
            folder.remove_side(Side::Left);
            assert_eq!(folder.category, Category::RightOnly);
            assert!(folder.children.files[0].is_empty(Side::Left));
        }

        // child is now empty on both sides; folder survives (right present)
        base.remove_empty();
        assert_eq!(base.children.folders.len(), 1);
        assert!(base.children.folders[0].children.files.is_empty());
    }

    #[test]
    fn sort_by_name_is_case_sensitive() {
        let mut base = test_base();
        for name in ["b.txt", "A.txt", "a.txt"] {
            let id = base.next_id();
            base.children
                .files
                .push(FilePair::new(id, Some(FileAttrs::new(name, 1, 1)), None));
        }
        base.children.sort_by_name();
        let names: Vec<&str> = base
            .children
            .files
            .iter()
            .map(|f| f.name_pref(Side::Left))
            .collect();
        assert_eq!(names, vec!["A.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn find_mut_reaches_nested_nodes() {
        let mut base = test_base();
        let folder_id = base.next_id();
        let mut folder = FolderPair::new(folder_id, Some(FolderAttrs::new("d")), None);
        let file_id = base.next_id();
        folder
            .children
            .files
            .push(FilePair::new(file_id, Some(FileAttrs::new("f", 1, 1)), None));
        base.children.folders.push(folder);

        assert!(matches!(
            base.children.find_mut(file_id),
            Some(NodeMut::File(_))
        ));
        assert!(base.children.find_mut(999).is_none());
    }
}
