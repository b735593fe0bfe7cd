use super::commit::CommitArena;
use super::streams::BranchStreams;
use crate::cvs::file::MAIN_BRANCH;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PlayError {
    Cycle { commit: String },
    UnknownBranch { commit: String, branch: String },
}

impl std::fmt::Display for PlayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Cycle { ref commit } => {
                write!(f, "commit {commit} depends on itself through merges")
            }
            Self::UnknownBranch {
                ref commit,
                ref branch,
            } => write!(f, "commit {commit} is on unknown branch {branch}"),
        }
    }
}

/// Interleaves the branch streams into a single order where every commit
/// comes after its predecessor (including the branchpoint for the first
/// commit of a branch) and after the commit it merges from.
pub(crate) fn play(arena: &CommitArena, streams: &BranchStreams) -> Result<Vec<usize>, PlayError> {
    let mut player = Player {
        arena,
        streams,
        heads: vec![0; streams.len()],
        emitted: vec![false; arena.len()],
        in_progress: vec![false; arena.len()],
        order: Vec::new(),
    };

    if let Some(&first) = streams
        .commits(MAIN_BRANCH)
        .and_then(|commits| commits.first())
    {
        player.emit(first)?;
    }

    while let Some(next) = player.earliest_head() {
        player.emit(next)?;
    }

    Ok(player.order)
}

struct Player<'a> {
    arena: &'a CommitArena,
    streams: &'a BranchStreams,
    /// Position of the next commit to emit in each stream.
    heads: Vec<usize>,
    emitted: Vec<bool>,
    in_progress: Vec<bool>,
    order: Vec<usize>,
}

impl Player<'_> {
    fn head(&self, slot: usize) -> Option<usize> {
        self.streams
            .slot_commits(slot)
            .get(self.heads[slot])
            .copied()
    }

    /// The head with the earliest time. Exhausted streams never win, and
    /// ties go to the branch that appeared first.
    fn earliest_head(&self) -> Option<usize> {
        (0..self.streams.len())
            .filter_map(|slot| self.head(slot))
            .min_by_key(|&c| self.arena[c].time)
    }

    fn slot_of(&self, commit: usize) -> Result<usize, PlayError> {
        let branch = &self.arena[commit].branch;
        self.streams
            .slot(branch)
            .ok_or_else(|| PlayError::UnknownBranch {
                commit: self.arena[commit].id.clone(),
                branch: branch.clone(),
            })
    }

    /// Emits every commit of `target`'s branch up to and including
    /// `target`.
    fn fast_forward(&mut self, target: usize) -> Result<(), PlayError> {
        let slot = self.slot_of(target)?;
        while !self.emitted[target] {
            let Some(next) = self.head(slot) else {
                break;
            };
            self.emit(next)?;
        }
        Ok(())
    }

    /// Emits `commit`, which must be the head of its stream, after
    /// everything it depends on.
    fn emit(&mut self, commit: usize) -> Result<(), PlayError> {
        if self.emitted[commit] {
            return Ok(());
        }
        if self.in_progress[commit] {
            return Err(PlayError::Cycle {
                commit: self.arena[commit].id.clone(),
            });
        }
        self.in_progress[commit] = true;

        if let Some(predecessor) = self.arena[commit].predecessor {
            if !self.emitted[predecessor] {
                self.fast_forward(predecessor)?;
            }
        }
        if let Some(source) = self.arena[commit].merge_from {
            if !self.emitted[source] {
                tracing::trace!(
                    "fast-forwarding {} up to {} before {}",
                    self.arena[source].branch,
                    self.arena[source].id,
                    self.arena[commit].id,
                );
                self.fast_forward(source)?;
            }
        }

        self.in_progress[commit] = false;
        self.emitted[commit] = true;
        self.order.push(commit);
        let slot = self.slot_of(commit)?;
        self.heads[slot] += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::{Rng as _, SeedableRng as _};

    use super::{PlayError, play};
    use crate::convert::commit::test_utils::{Builder, time};
    use crate::convert::commit::{Commit, CommitArena};
    use crate::convert::commit_builder::build_commits;
    use crate::convert::repo_state::RepositoryState;
    use crate::convert::streams::BranchStreams;
    use crate::cvs::file::{FileRevision, FileSet};
    use crate::cvs::revision::Revision;

    fn streams(b: &mut Builder, branchpoints: &[(&str, usize)]) -> BranchStreams {
        let commits = b.commits.clone();
        let branchpoints = branchpoints
            .iter()
            .map(|&(name, c)| (name.to_string(), c))
            .collect::<BTreeMap<_, _>>();
        BranchStreams::build(&mut b.arena, &commits, branchpoints).unwrap()
    }

    #[test]
    fn test_interleave_by_time() {
        let mut b = Builder::new();
        b.symbol("file1", "branch1", "1.1.0.2");
        let c0 = b.commit("c0", &["file1@1.1"]);
        let c1 = b.commit("c1", &["file1@1.1.2.1"]);
        let c2 = b.commit("c2", &["file1@1.2"]);
        let c3 = b.commit("c3", &["file1@1.1.2.2"]);
        let streams = streams(&mut b, &[("branch1", c0)]);

        assert_eq!(play(&b.arena, &streams).unwrap(), [c0, c1, c2, c3]);
    }

    #[test]
    fn test_nested_merges() {
        let mut b = Builder::new();
        b.symbol("file1", "branch1", "1.1.0.2");
        b.symbol("file1", "branch2", "1.1.2.1.0.2");
        let c0 = b.commit("c0", &["file1@1.1"]);
        let merge = b.commit("merge", &["file1@1.2<1.1.2.2"]);
        let b1 = b.commit("b1", &["file1@1.1.2.1"]);
        let b2 = b.commit("b2", &["file1@1.1.2.1.2.1"]);
        let b1_merge = b.commit("b1-merge", &["file1@1.1.2.2<1.1.2.1.2.1"]);
        let streams = streams(&mut b, &[("branch1", c0), ("branch2", b1)]);
        b.arena[merge].merge_from = Some(b1_merge);
        b.arena[b1_merge].merge_from = Some(b2);

        let order = play(&b.arena, &streams).unwrap();
        assert_eq!(order, [c0, b1, b2, b1_merge, merge]);
    }

    #[test]
    fn test_cycle() {
        let mut b = Builder::new();
        b.symbol("file1", "branch1", "1.1.0.2");
        let c0 = b.commit("c0", &["file1@1.1"]);
        let c1 = b.commit("c1", &["file1@1.2"]);
        let b1 = b.commit("b1", &["file1@1.1.2.1"]);
        let streams = streams(&mut b, &[("branch1", c0)]);
        b.arena[c1].merge_from = Some(b1);
        b.arena[b1].merge_from = Some(c1);

        assert_eq!(
            play(&b.arena, &streams),
            Err(PlayError::Cycle { commit: "c1".into() }),
        );
    }

    /// Random linear histories on a trunk and a few branches, with file
    /// revisions shuffled before grouping.
    #[test]
    fn test_random_round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let mut files = FileSet::new();
            let num_files = 1 + rng.random::<u32>() as usize % 4;
            let num_branches = rng.random::<u32>() as usize % 3;
            let file_ids: Vec<_> = (0..num_files)
                .map(|i| files.insert(&format!("file{i}")))
                .collect();
            for &f in file_ids.iter() {
                for branch in 0..num_branches {
                    let symbol = format!("1.1.0.{}", 2 * (branch + 1));
                    files[f].add_symbol(&format!("branch{branch}"), Revision::parse(&symbol).unwrap());
                }
            }

            let mut revisions = Vec::new();
            let mut next_rev = vec![vec![1u32; num_branches + 1]; num_files];
            let num_commits = 2 + rng.random::<u32>() as usize % 12;
            for n in 0..num_commits {
                // the first commit adds every file on the trunk
                let line = if n == 0 {
                    0
                } else {
                    rng.random::<u32>() as usize % (num_branches + 1)
                };
                for (i, &f) in file_ids.iter().enumerate() {
                    if n != 0 && rng.random::<u32>() % 2 == 0 {
                        continue;
                    }
                    let revision = if line == 0 {
                        format!("1.{}", next_rev[i][0])
                    } else {
                        format!("1.1.{}.{}", 2 * line, next_rev[i][line])
                    };
                    next_rev[i][line] += 1;
                    revisions.push(FileRevision {
                        file: f,
                        revision: Revision::parse(&revision).unwrap(),
                        mergepoint: None,
                        time: time(n as i64 * 100 + i as i64),
                        author: "author".into(),
                        commit_id: format!("id{n}"),
                        is_dead: false,
                        message: format!("commit {n}"),
                    });
                }
            }
            for i in (1..revisions.len()).rev() {
                let j = rng.random::<u32>() as usize % (i + 1);
                revisions.swap(i, j);
            }

            let commits = build_commits(&mut files, revisions);
            let num_built = commits.len();
            let mut arena = CommitArena::new();
            let commits = arena.extend(commits);
            let first = commits[0];
            let branchpoints = (0..num_branches)
                .map(|branch| (format!("branch{branch}"), first))
                .collect::<BTreeMap<_, _>>();
            let streams = BranchStreams::build(&mut arena, &commits, branchpoints).unwrap();
            let order = play(&arena, &streams).unwrap();

            let mut sorted = order.clone();
            sorted.sort_unstable();
            let mut expected = commits.clone();
            expected.sort_unstable();
            assert_eq!(sorted, expected);
            assert_eq!(order.len(), num_built);

            let mut state = RepositoryState::new();
            state
                .apply_all(order.iter().map(|&c| &arena[c]), &files)
                .unwrap();
            check_links(&arena, &order);
        }
    }

    fn check_links(arena: &CommitArena, order: &[usize]) {
        let mut seen = vec![false; arena.len()];
        for &c in order {
            let commit: &Commit = &arena[c];
            if let Some(p) = commit.predecessor {
                assert!(seen[p], "{} played before its predecessor", commit.id);
            }
            seen[c] = true;
        }
    }
}
