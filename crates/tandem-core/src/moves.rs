//! Move/rename detection.
//!
//! A file that vanished on one side while an identical-looking file
//! appeared elsewhere on the same side is a rename, not a delete + create.
//! Evidence comes from the last-sync state: its records are probed against
//! still-present one-side-only files, by old path first, then by persistent
//! file print. Matching is *exact* on size and time; a tolerance here would
//! break transitivity and with it the hash-lookup predicate.
//!
//! Duplicate file prints (hardlink/alias ambiguity) would produce false
//! pairings, so every member of an equal-print run is purged up front.

use std::collections::{HashMap, HashSet};

use tandem_vfs::FingerPrint;

use crate::compare::CompareConfig;
use crate::insync::{InSyncFile, InSyncFolder};
use crate::resolve::{db_pair, file_still_in_sync};
use crate::tree::{BaseFolderPair, Category, ChildItems, NodeId, Side};

/// A one-side view of a file pair, frozen while the tree is walked.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: NodeId,
    print: FingerPrint,
    size: u64,
    mod_time: i64,
    one_side_only: bool,
}

#[derive(Default)]
struct Collected {
    /// Every file with a non-zero print, per side: input to the purge.
    files_left: Vec<Candidate>,
    files_right: Vec<Candidate>,
    /// Last-sync record -> the one-side-only file still sitting at the
    /// record's old path (keyed by record identity).
    by_path_left: HashMap<usize, Candidate>,
    by_path_right: HashMap<usize, Candidate>,
}

/// Link left-only deletions with right-only creations (and vice versa)
/// where the last-sync state ties them together. Writes mutual move
/// references; everything else is left untouched.
pub fn detect_moved_files(base: &mut BaseFolderPair, db: &InSyncFolder) {
    let cfg = base.config.clone();

    let mut collected = Collected::default();
    collect(&base.children, Some(db), Some(db), &mut collected);

    let (clear_left, by_id_left) = purge_duplicates(&collected.files_left);
    let (clear_right, by_id_right) = purge_duplicates(&collected.files_right);

    let mut links: HashMap<NodeId, NodeId> = HashMap::new();
    if (!by_id_left.is_empty() || !collected.by_path_left.is_empty())
        && (!by_id_right.is_empty() || !collected.by_path_right.is_empty())
    {
        let mut finder = PairFinder {
            cfg: &cfg,
            by_path_left: &collected.by_path_left,
            by_path_right: &collected.by_path_right,
            by_id_left: &by_id_left,
            by_id_right: &by_id_right,
            used: HashSet::new(),
            links: &mut links,
        };
        finder.scan_container(db);
    }

    apply(&mut base.children, &clear_left, &clear_right, &links);
}

fn candidate(file: &crate::tree::FilePair, side: Side) -> Option<Candidate> {
    file.attrs(side).map(|attrs| Candidate {
        id: file.id,
        print: attrs.file_print,
        size: attrs.size,
        mod_time: attrs.mod_time,
        one_side_only: file.category
            == match side {
                Side::Left => Category::LeftOnly,
                Side::Right => Category::RightOnly,
            },
    })
}

fn record_key(db_file: &InSyncFile) -> usize {
    db_file as *const InSyncFile as usize
}

fn collect(
    children: &ChildItems,
    db_left: Option<&InSyncFolder>,
    db_right: Option<&InSyncFolder>,
    out: &mut Collected,
) {
    for file in &children.files {
        if let Some(cand) = candidate(file, Side::Left) {
            if cand.print != 0 {
                out.files_left.push(cand); // *all* prints count for the uniqueness check
            }
            if cand.one_side_only {
                if let Some(db_entry) =
                    db_left.and_then(|db| db.file(file.name_pref(Side::Left)))
                {
                    out.by_path_left.insert(record_key(db_entry), cand);
                }
            }
        }
        if let Some(cand) = candidate(file, Side::Right) {
            if cand.print != 0 {
                out.files_right.push(cand);
            }
            if cand.one_side_only {
                if let Some(db_entry) =
                    db_right.and_then(|db| db.file(file.name_pref(Side::Right)))
                {
                    out.by_path_right.insert(record_key(db_entry), cand);
                }
            }
        }
    }

    for folder in &children.folders {
        let (sub_left, sub_right) = db_pair(
            db_left,
            db_right,
            folder.name_pref(Side::Left),
            folder.name_pref(Side::Right),
            |db, name| db.folder(name),
        );
        collect(&folder.children, sub_left, sub_right, out);
    }
}

/// Equal-print runs are hardlink/alias ambiguities: purge *every* member
/// (guessing one would pair arbitrarily). Returns the pairs whose print
/// must be cleared in the tree, plus the unique-print index of files
/// existing on this side only.
fn purge_duplicates(
    files: &[Candidate],
) -> (HashSet<NodeId>, HashMap<FingerPrint, Candidate>) {
    let mut sorted: Vec<&Candidate> = files.iter().collect();
    sorted.sort_by_key(|c| c.print);

    let mut to_clear = HashSet::new();
    let mut idx = 0;
    while idx < sorted.len() {
        let mut run_end = idx + 1;
        while run_end < sorted.len() && sorted[run_end].print == sorted[idx].print {
            run_end += 1;
        }
        if run_end - idx > 1 {
            for cand in &sorted[idx..run_end] {
                to_clear.insert(cand.id);
            }
        }
        idx = run_end;
    }

    let mut by_id = HashMap::new();
    for cand in files {
        if cand.one_side_only && !to_clear.contains(&cand.id) {
            by_id.insert(cand.print, *cand);
        }
    }
    (to_clear, by_id)
}

struct PairFinder<'a> {
    cfg: &'a CompareConfig,
    by_path_left: &'a HashMap<usize, Candidate>,
    by_path_right: &'a HashMap<usize, Candidate>,
    by_id_left: &'a HashMap<FingerPrint, Candidate>,
    by_id_right: &'a HashMap<FingerPrint, Candidate>,
    used: HashSet<NodeId>,
    links: &'a mut HashMap<NodeId, NodeId>,
}

impl PairFinder<'_> {
    fn scan_container(&mut self, container: &InSyncFolder) {
        for db_file in container.files.values() {
            self.try_pair(db_file);
        }
        for sub in container.folders.values() {
            self.scan_container(sub);
        }
    }

    /// Old path association wins over file-print association, even when the
    /// path association fails the size/date check afterwards.
    fn assoc(&self, db_file: &InSyncFile, side: Side) -> Option<Candidate> {
        let (by_path, by_id, descr) = match side {
            Side::Left => (self.by_path_left, self.by_id_left, &db_file.left),
            Side::Right => (self.by_path_right, self.by_id_right, &db_file.right),
        };
        if let Some(cand) = by_path.get(&record_key(db_file)) {
            return Some(*cand);
        }
        if descr.file_print != 0 {
            return by_id.get(&descr.file_print).copied();
        }
        None
    }

    fn try_pair(&mut self, db_file: &InSyncFile) {
        if !file_still_in_sync(db_file, self.cfg) {
            return;
        }
        let Some(left) = self.assoc(db_file, Side::Left) else {
            return;
        };
        if !same_size_and_date(&left, db_file, Side::Left) {
            return;
        }
        let Some(right) = self.assoc(db_file, Side::Right) else {
            return;
        };
        if !same_size_and_date(&right, db_file, Side::Right) {
            return;
        }

        if self.used.contains(&left.id) || self.used.contains(&right.id) {
            return; // already part of another pair
        }
        self.used.insert(left.id);
        self.used.insert(right.id);
        self.links.insert(left.id, right.id);
        self.links.insert(right.id, left.id);
    }
}

/// Exact comparison, deliberately without the FAT tolerance: the state is
/// either scan metadata or estimated right after a copy, both second-exact.
fn same_size_and_date(cand: &Candidate, db_file: &InSyncFile, side: Side) -> bool {
    let descr = match side {
        Side::Left => &db_file.left,
        Side::Right => &db_file.right,
    };
    cand.size == db_file.file_size && cand.mod_time == descr.mod_time
}

fn apply(
    children: &mut ChildItems,
    clear_left: &HashSet<NodeId>,
    clear_right: &HashSet<NodeId>,
    links: &HashMap<NodeId, NodeId>,
) {
    for file in &mut children.files {
        if clear_left.contains(&file.id) {
            file.clear_file_print(Side::Left);
        }
        if clear_right.contains(&file.id) {
            file.clear_file_print(Side::Right);
        }
        if let Some(partner) = links.get(&file.id) {
            file.move_ref = Some(*partner);
        }
    }
    for folder in &mut children.folders {
        apply(&mut folder.children, clear_left, clear_right, links);
    }
}
