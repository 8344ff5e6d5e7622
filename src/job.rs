//! Physical job descriptions: one external-process invocation each.

use std::collections::BTreeMap;
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::action::ActionId;
use crate::file_type::FileType;

/// Index of a job in its `JobArena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u32);

/// Per-job rerun policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    /// Run unconditionally.
    #[default]
    Always,
    /// Run, and tolerate failed inputs instead of being cancelled with them.
    RunWithoutCascading,
    /// Inputs look unchanged; the rerun decision is deferred to the
    /// dependency check, so the scheduler does not spawn this job.
    CheckDependencies,
}

/// The set of output paths one job produces.
///
/// There is almost always exactly one primary output; whole-module compiles
/// running multi-threaded carry one primary per source input. Auxiliary
/// outputs (module, module-doc, header, dependency and diagnostics files) are
/// keyed by their artifact kind.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    primaries: Vec<(PathBuf, PathBuf)>,
    auxiliary: BTreeMap<&'static str, PathBuf>,
}

impl CommandOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a primary output derived from `base_input`. The base input is
    /// empty for steps without a single originating file (link, merge).
    pub fn add_primary(&mut self, base_input: PathBuf, path: PathBuf) {
        self.primaries.push((base_input, path));
    }

    /// The first primary output path, if the job produces one at all.
    pub fn primary(&self) -> Option<&Path> {
        self.primaries.first().map(|(_, p)| p.as_path())
    }

    pub fn primaries(&self) -> &[(PathBuf, PathBuf)] {
        &self.primaries
    }

    pub fn set_auxiliary(&mut self, ty: FileType, path: PathBuf) {
        self.auxiliary.insert(ty.name(), path);
    }

    pub fn auxiliary(&self, ty: FileType) -> Option<&Path> {
        self.auxiliary.get(ty.name()).map(PathBuf::as_path)
    }

    /// Auxiliary outputs in a stable (kind-name) order.
    pub fn auxiliaries(&self) -> impl Iterator<Item = (&'static str, &Path)> {
        self.auxiliary.iter().map(|(k, v)| (*k, v.as_path()))
    }
}

/// Job inputs, with logical ownership of shared sub-jobs.
#[derive(Debug, Clone, Default)]
pub struct JobList {
    pub jobs: Vec<JobId>,
    /// Exactly one list logically owns a shared job; the rest hold
    /// non-owning references. Inherited from the action's `owns_inputs`.
    pub owns_jobs: bool,
}

impl JobList {
    pub fn owning(jobs: Vec<JobId>) -> Self {
        Self {
            jobs,
            owns_jobs: true,
        }
    }
}

/// One concrete external-process invocation.
///
/// Immutable after construction; owned by the Compilation's job arena.
#[derive(Debug)]
pub struct Job {
    /// The action this job was lowered from.
    pub source: ActionId,
    /// What the primary outputs are, artifact-wise.
    pub output_type: FileType,
    pub executable: PathBuf,
    pub arguments: Vec<String>,
    pub inputs: JobList,
    pub output: CommandOutput,
    pub condition: Condition,
    /// Mtime of the existing primary output observed at job-build time;
    /// feeds incremental decisions.
    pub previous_build_time: Option<SystemTime>,
}

/// Arena storage for jobs; the Compilation owns it.
#[derive(Debug, Default)]
pub struct JobArena {
    jobs: Vec<Job>,
}

impl JobArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, job: Job) -> JobId {
        let id = JobId(self.jobs.len() as u32);
        self.jobs.push(job);
        id
    }

    pub fn get(&self, id: JobId) -> &Job {
        &self.jobs[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobId, &Job)> {
        self.jobs
            .iter()
            .enumerate()
            .map(|(i, j)| (JobId(i as u32), j))
    }
}

impl Index<JobId> for JobArena {
    type Output = Job;

    fn index(&self, id: JobId) -> &Job {
        self.get(id)
    }
}
