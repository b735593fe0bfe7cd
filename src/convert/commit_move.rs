use super::commit::{Commit, CommitArena};
use crate::cvs::file::FileSet;
use crate::{FHashMap, FHashSet};

/// Instructions to relocate file revisions of earlier commits to just
/// after an anchor commit. A commit that only partly moves is split: the
/// part that stays keeps the slot as `{id}-1`, the moved part becomes a new
/// commit `{id}-2`.
pub(crate) struct CommitMoveRecord {
    anchor: usize,
    moves: FHashMap<usize, FHashSet<usize>>,
}

/// State needed to revert an applied [`CommitMoveRecord`].
pub(crate) struct MoveUndo {
    commits: Vec<usize>,
    arena_len: usize,
    saved: Vec<(usize, Commit)>,
}

impl CommitMoveRecord {
    pub(crate) fn new(anchor: usize) -> Self {
        Self {
            anchor,
            moves: FHashMap::default(),
        }
    }

    pub(crate) fn add(&mut self, commit: usize, file: usize) {
        self.moves.entry(commit).or_default().insert(file);
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Number of commits touched by the record.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.moves.len()
    }

    /// Commits that lose file revisions.
    pub(crate) fn commits(&self) -> impl Iterator<Item = usize> + '_ {
        self.moves.keys().copied()
    }

    /// Applies every move to `commits`. All moved commits must be placed
    /// before the anchor.
    pub(crate) fn apply(
        self,
        arena: &mut CommitArena,
        files: &FileSet,
        commits: &mut Vec<usize>,
    ) -> MoveUndo {
        let mut undo = MoveUndo {
            commits: commits.clone(),
            arena_len: arena.len(),
            saved: Vec::new(),
        };

        let Some(mut anchor_pos) = commits.iter().position(|&c| c == self.anchor) else {
            return undo;
        };

        let mut positions: Vec<_> = self
            .moves
            .into_iter()
            .filter_map(|(commit, move_files)| {
                let pos = commits[..anchor_pos].iter().position(|&c| c == commit)?;
                Some((pos, commit, move_files))
            })
            .collect();

        // latest first, so inserting right after the anchor keeps the
        // original relative order of the moved commits
        positions.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        for (pos, commit, move_files) in positions {
            let total = arena[commit].files.len();
            let moving = arena[commit]
                .files
                .iter()
                .filter(|f| move_files.contains(&f.file))
                .count();

            if moving == total {
                tracing::info!(
                    "moving commit {} after {}",
                    arena[commit].id,
                    arena[self.anchor].id,
                );
                commits.remove(pos);
                anchor_pos -= 1;
                commits.insert(anchor_pos + 1, commit);
            } else {
                undo.saved.push((commit, arena[commit].clone()));

                let original = &mut arena[commit];
                let (moved, kept): (Vec<_>, Vec<_>) = original
                    .files
                    .drain(..)
                    .partition(|f| move_files.contains(&f.file));
                let base_id = std::mem::take(&mut original.id);
                original.id = format!("{base_id}-1");
                original.set_files(kept);

                let mut split = Commit::new(format!("{base_id}-2"), original.branch.clone(), moved);
                split.author = original.author.clone();
                split.message = original.message.clone();

                tracing::info!(
                    "splitting commit {base_id}, moving {} after {}",
                    split
                        .files
                        .iter()
                        .map(|f| format!("{} r{}", files[f.file].name, f.revision))
                        .collect::<Vec<_>>()
                        .join(", "),
                    arena[self.anchor].id,
                );

                let split = arena.push(split);
                commits.insert(anchor_pos + 1, split);
            }
        }

        undo
    }
}

impl MoveUndo {
    pub(crate) fn undo(self, arena: &mut CommitArena, commits: &mut Vec<usize>) {
        arena.truncate(self.arena_len);
        for (i, commit) in self.saved {
            arena[i] = commit;
        }
        *commits = self.commits;
    }
}
