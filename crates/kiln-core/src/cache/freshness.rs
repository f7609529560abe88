use std::path::Path;

use super::{EntryId, FileCache, Freshness};

/// Computes the newest modification time reachable from a file through its
/// recorded source dependencies.
///
/// Results are memoized on the entries until the next
/// [`FileCache::clear_dependency_times`]. Before recursing, an entry is
/// marked with its own time; a cycle that leads back to it reads that
/// provisional value and terminates.
pub struct FreshnessEngine<'a> {
    cache: &'a mut FileCache,
    project_dir: &'a Path,
}

impl<'a> FreshnessEngine<'a> {
    pub fn new(cache: &'a mut FileCache, project_dir: &'a Path) -> Self {
        Self { cache, project_dir }
    }

    /// Cache entry for a project-relative or absolute name
    pub fn entry_id(&mut self, name: &str) -> EntryId {
        self.cache.get(name, self.project_dir)
    }

    /// Start a new pass, forgetting every memoized value.
    pub fn reset(&mut self) {
        self.cache.clear_dependency_times();
    }

    /// Freshness of `id`.
    ///
    /// With `ignore_missing_output` unset, a file that was never emitted is
    /// unresolvable, which forces it into the stale set.
    pub fn compute_max_time_for_deps(
        &mut self,
        id: EntryId,
        ignore_missing_output: bool,
    ) -> Freshness {
        let memo = self.cache.entry(id).max_time_for_deps;
        if memo != Freshness::Unset {
            return memo;
        }

        let Some(cur_time) = self.cache.probe_existence(id).time() else {
            self.cache.entry_mut(id).max_time_for_deps = Freshness::Unresolvable;
            return Freshness::Unresolvable;
        };
        self.cache.entry_mut(id).max_time_for_deps = Freshness::InProgress(cur_time);

        let entry = self.cache.entry(id);
        if !ignore_missing_output && !entry.output_time.is_set() {
            self.cache.entry_mut(id).max_time_for_deps = Freshness::Unresolvable;
            return Freshness::Unresolvable;
        }

        let deps: Vec<String> = match entry.reference_info() {
            Some(info) => info.source_deps.iter().map(|(_, full)| full.clone()).collect(),
            None => Vec::new(),
        };

        let mut result = cur_time;
        for dep in deps {
            let dep_id = self.cache.get(&dep, self.project_dir);
            match self.compute_max_time_for_deps(dep_id, ignore_missing_output).time() {
                Some(time) => result = result.max(time),
                None => {
                    self.cache.entry_mut(id).max_time_for_deps = Freshness::Unresolvable;
                    return Freshness::Unresolvable;
                }
            }
        }

        self.cache.entry_mut(id).max_time_for_deps = Freshness::At(result);
        Freshness::At(result)
    }

    /// Whether the file has to be re-emitted.
    pub fn is_stale(&mut self, id: EntryId, ignore_missing_output: bool, force: bool) -> bool {
        if force {
            return true;
        }
        self.compute_max_time_for_deps(id, ignore_missing_output);
        !self.cache.entry(id).is_output_current()
    }
}
