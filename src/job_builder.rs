//! Lowers the action DAG into concrete jobs.
//!
//! One job is built per compilation-relevant action, memoized on the
//! (action, tool chain) pair so diamond-shared sub-actions produce exactly
//! one job referenced from every parent. Output paths are derived here as
//! well, under the priority rules described on `output_filename`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::debug;
use thiserror::Error;

use crate::action::{Action, ActionId, ActionKind, ActionList};
use crate::driver::{CompilerMode, LinkKind, OutputInfo};
use crate::file_type::FileType;
use crate::job::{CommandOutput, Condition, Job, JobArena, JobId, JobList};
use crate::mtime::ModTimeSource;
use crate::output_file_map::OutputFileMap;
use crate::toolchain::{ConstructJobError, ToolChain, ToolChainId};

#[derive(Debug, Error)]
pub enum JobBuildError {
    #[error("no tool available for {0} steps")]
    NoTool(&'static str),
    #[error("could not allocate temporary output: {0}")]
    TempFile(std::io::Error),
    #[error(transparent)]
    Construct(#[from] ConstructJobError),
}

/// Builds the job graph for one action graph against one tool chain.
pub struct JobBuilder<'a> {
    actions: &'a ActionList,
    toolchain: &'a dyn ToolChain,
    toolchain_id: ToolChainId,
    output_info: &'a OutputInfo,
    output_file_map: Option<&'a OutputFileMap>,
    mtimes: &'a dyn ModTimeSource,
    extra_args: &'a [String],
    /// The top-level action entitled to the explicit `-o` path, when one was
    /// given; decided by the driver before job construction starts.
    output_claimant: Option<ActionId>,
    has_merge_module: bool,
    jobs: JobArena,
    cache: HashMap<(ActionId, ToolChainId), JobId>,
    temp_ledger: Vec<PathBuf>,
}

impl<'a> JobBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actions: &'a ActionList,
        toolchain: &'a dyn ToolChain,
        toolchain_id: ToolChainId,
        output_info: &'a OutputInfo,
        output_file_map: Option<&'a OutputFileMap>,
        mtimes: &'a dyn ModTimeSource,
        extra_args: &'a [String],
        output_claimant: Option<ActionId>,
    ) -> Self {
        let has_merge_module = actions
            .iter()
            .any(|(_, a)| matches!(a.kind, ActionKind::MergeModule));
        Self {
            actions,
            toolchain,
            toolchain_id,
            output_info,
            output_file_map,
            mtimes,
            extra_args,
            output_claimant,
            has_merge_module,
            jobs: JobArena::new(),
            cache: HashMap::new(),
            temp_ledger: Vec::new(),
        }
    }

    /// Hands the finished arena and temp-file ledger to the Compilation.
    pub fn finish(self) -> (JobArena, Vec<PathBuf>) {
        (self.jobs, self.temp_ledger)
    }

    /// Deletes any temporaries allocated so far; called when construction
    /// fails partway and no Compilation will ever own the ledger.
    pub fn discard(self) {
        for path in &self.temp_ledger {
            let _ = fs::remove_file(path);
        }
    }

    /// Builds (or returns the already-built) job for `action`.
    pub fn job_for_action(
        &mut self,
        id: ActionId,
        at_top_level: bool,
    ) -> Result<JobId, JobBuildError> {
        if let Some(&cached) = self.cache.get(&(id, self.toolchain_id)) {
            debug!("job cache hit for action {}", id.0);
            return Ok(cached);
        }
        let actions = self.actions;
        let action = &actions[id];
        debug_assert!(!action.is_input(), "input actions have no job");

        // Direct input children become the base-input list; everything else
        // is recursively lowered, inheriting this action's ownership onto
        // the child job list.
        let mut base_inputs = Vec::new();
        let mut inputs = Vec::new();
        for &child in &action.inputs {
            match &actions[child].kind {
                ActionKind::Input { path, file_type } => {
                    base_inputs.push((*file_type, path.clone()));
                }
                _ => inputs.push(self.job_for_action(child, false)?),
            }
        }
        let input_jobs = JobList {
            jobs: inputs,
            owns_jobs: action.owns_inputs,
        };

        let toolchain = self.toolchain;
        let tool = toolchain
            .select_tool(action)
            .ok_or(JobBuildError::NoTool(action.kind.name()))?;

        let mut output = self.compute_output(id, action, &base_inputs, &input_jobs, at_top_level)?;
        self.attach_auxiliary_outputs(action, &base_inputs, &mut output)?;
        if let Some(diagnostics) = output.auxiliary(FileType::Diagnostics) {
            // A stale file must not look like a record of this run.
            let _ = fs::remove_file(diagnostics);
        }

        let (condition, previous_build_time) =
            self.compute_condition(&base_inputs, &input_jobs, &output);

        let input_refs: Vec<&Job> = input_jobs.jobs.iter().map(|&j| &self.jobs[j]).collect();
        let invocation = tool.construct_job(
            action,
            &input_refs,
            &output,
            &base_inputs,
            self.extra_args,
            self.output_info,
        )?;

        let job = Job {
            source: id,
            output_type: action.output_type,
            executable: invocation.executable,
            arguments: invocation.arguments,
            inputs: input_jobs,
            output,
            condition,
            previous_build_time,
        };
        let job_id = self.jobs.add(job);
        self.cache.insert((id, self.toolchain_id), job_id);
        debug!("built {} job {} for action {}", action.kind.name(), job_id.0, id.0);
        Ok(job_id)
    }

    fn compute_output(
        &mut self,
        id: ActionId,
        action: &Action,
        base_inputs: &[(FileType, PathBuf)],
        input_jobs: &JobList,
        at_top_level: bool,
    ) -> Result<CommandOutput, JobBuildError> {
        let mut output = CommandOutput::new();
        if action.output_type == FileType::Nothing {
            return Ok(output);
        }

        // Whole-module compiles running multi-threaded emit one object per
        // source input; each path is derived per input, never from `-o`.
        if matches!(action.kind, ActionKind::Compile)
            && self.output_info.mode == CompilerMode::WholeModule
            && self.output_info.num_threads > 1
            && base_inputs.len() > 1
        {
            let sources: Vec<PathBuf> = base_inputs
                .iter()
                .filter(|(ty, _)| *ty == FileType::Source)
                .map(|(_, p)| p.clone())
                .collect();
            for path in sources {
                let out = match self.lookup_override(Some(&path), action.output_type) {
                    Some(explicit) => explicit,
                    None if at_top_level => stem_path(Some(&path), &self.output_info.module_name, action.output_type),
                    None => self.temp_output(Some(&path), action.output_type)?,
                };
                output.add_primary(path, out);
            }
            return Ok(output);
        }

        let base = base_inputs.first().map(|(_, p)| p.clone());
        let path = self.output_filename(id, action, base.as_deref(), input_jobs, at_top_level)?;
        output.add_primary(base.unwrap_or_default(), path);
        Ok(output)
    }

    /// Derives the primary output path for an action. Priority order, first
    /// match wins: output-file-map entry, kind-specific command-line
    /// override, the explicit total output for the entitled top-level
    /// action, kind-specific synthesis, and finally a fresh temporary for
    /// purely intermediate artifacts.
    fn output_filename(
        &mut self,
        id: ActionId,
        action: &Action,
        base_input: Option<&Path>,
        input_jobs: &JobList,
        at_top_level: bool,
    ) -> Result<PathBuf, JobBuildError> {
        let oi = self.output_info;

        if let Some(explicit) = self.lookup_override(base_input, action.output_type) {
            return Ok(explicit);
        }

        if matches!(action.kind, ActionKind::MergeModule) {
            if let Some(path) = &oi.module_output_path {
                return Ok(path.clone());
            }
        }

        if at_top_level {
            if let Some(path) = &oi.output_path {
                if self.output_claimant == Some(id) {
                    return Ok(path.clone());
                }
            } else if action.output_type.is_textual() {
                return Ok(PathBuf::from("-"));
            }
        }

        match action.kind {
            ActionKind::MergeModule => Ok(self.module_filename()),
            ActionKind::GenerateDebugSymbols => {
                let image = input_jobs
                    .jobs
                    .first()
                    .and_then(|&j| self.jobs[j].output.primary())
                    .ok_or(ConstructJobError::MissingInput("generate-debug-symbols"))?;
                let mut name = image.as_os_str().to_os_string();
                name.push(".");
                name.push(self.toolchain.debug_symbols_suffix());
                Ok(PathBuf::from(name))
            }
            ActionKind::Link => {
                if oi.link_kind == LinkKind::DynamicLibrary {
                    Ok(PathBuf::from(format!(
                        "lib{}.{}",
                        oi.module_name,
                        self.toolchain.shared_library_suffix()
                    )))
                } else if oi.module_name_is_fallback {
                    // A synthesized module name is not a user-chosen image
                    // name; fall back to the literal input's stem.
                    let stem = oi
                        .first_input_stem
                        .clone()
                        .unwrap_or_else(|| oi.module_name.clone());
                    Ok(PathBuf::from(stem))
                } else {
                    Ok(PathBuf::from(oi.module_name.clone()))
                }
            }
            _ if at_top_level => Ok(stem_path(base_input, &oi.module_name, action.output_type)),
            _ => self.temp_output(base_input, action.output_type),
        }
    }

    fn attach_auxiliary_outputs(
        &mut self,
        action: &Action,
        base_inputs: &[(FileType, PathBuf)],
        output: &mut CommandOutput,
    ) -> Result<(), JobBuildError> {
        let oi = self.output_info;
        let base = base_inputs.first().map(|(_, p)| p.clone());
        match action.kind {
            ActionKind::Compile if oi.mode != CompilerMode::Immediate => {
                if oi.should_emit_module {
                    let module = if self.has_merge_module {
                        // A partial module, consumed by the merge step.
                        match self.lookup_override(base.as_deref(), FileType::Module) {
                            Some(explicit) => explicit,
                            None => self.temp_output(base.as_deref(), FileType::Module)?,
                        }
                    } else {
                        self.module_aux_filename(base.as_deref())
                    };
                    let doc = self.module_doc_filename(base.as_deref(), &module);
                    output.set_auxiliary(FileType::Module, module);
                    output.set_auxiliary(FileType::ModuleDoc, doc);
                }
                if oi.emit_header && !self.has_merge_module {
                    let header = self.header_filename(base.as_deref());
                    output.set_auxiliary(FileType::Header, header);
                }
                if oi.emit_dependencies {
                    let path = match self.lookup_override(base.as_deref(), FileType::Dependencies) {
                        Some(explicit) => explicit,
                        None => self.sibling_output(output, FileType::Dependencies),
                    };
                    output.set_auxiliary(FileType::Dependencies, path);
                }
                if oi.serialize_diagnostics {
                    let path = match self.lookup_override(base.as_deref(), FileType::Diagnostics) {
                        Some(explicit) => explicit,
                        None => self.sibling_output(output, FileType::Diagnostics),
                    };
                    output.set_auxiliary(FileType::Diagnostics, path);
                }
            }
            ActionKind::MergeModule => {
                // The module itself is the primary; the doc rides along.
                if let Some(primary) = output.primary().map(Path::to_path_buf) {
                    let doc = self.module_doc_filename(base.as_deref(), &primary);
                    output.set_auxiliary(FileType::ModuleDoc, doc);
                }
                if oi.emit_header {
                    let header = self.header_filename(base.as_deref());
                    output.set_auxiliary(FileType::Header, header);
                }
                if oi.serialize_diagnostics {
                    let path = match self.lookup_override(base.as_deref(), FileType::Diagnostics) {
                        Some(explicit) => explicit,
                        None => self.sibling_output(output, FileType::Diagnostics),
                    };
                    output.set_auxiliary(FileType::Diagnostics, path);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// The rerun condition for a freshly built job: when the single input is
    /// no newer than the existing primary output and a dependency file is
    /// tracked, the full decision is deferred to the dependency check.
    fn compute_condition(
        &self,
        base_inputs: &[(FileType, PathBuf)],
        input_jobs: &JobList,
        output: &CommandOutput,
    ) -> (Condition, Option<SystemTime>) {
        let previous = output
            .primary()
            .and_then(|p| self.mtimes.modified(p).ok());
        if base_inputs.len() == 1
            && input_jobs.jobs.is_empty()
            && output.auxiliary(FileType::Dependencies).is_some()
        {
            if let (Ok(input_time), Some(output_time)) =
                (self.mtimes.modified(&base_inputs[0].1), previous)
            {
                if input_time <= output_time {
                    return (Condition::CheckDependencies, previous);
                }
            }
        }
        (Condition::Always, previous)
    }

    fn lookup_override(&self, base: Option<&Path>, ty: FileType) -> Option<PathBuf> {
        let base = base?;
        self.output_file_map?
            .lookup(base, ty)
            .map(Path::to_path_buf)
    }

    /// `<ModuleName>.kmod`, next to the top-level output if one exists.
    fn module_filename(&self) -> PathBuf {
        let oi = self.output_info;
        let name = format!("{}.{}", oi.module_name, FileType::Module.suffix());
        match oi.output_path.as_ref().and_then(|p| p.parent()) {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
            _ => PathBuf::from(name),
        }
    }

    /// Where the real (non-partial) module of a sole compile step goes.
    fn module_aux_filename(&self, base: Option<&Path>) -> PathBuf {
        if let Some(explicit) = self.lookup_override(base, FileType::Module) {
            return explicit;
        }
        if let Some(path) = &self.output_info.module_output_path {
            return path.clone();
        }
        self.module_filename()
    }

    /// Module-doc paths always shadow the module path unless overridden.
    fn module_doc_filename(&self, base: Option<&Path>, module: &Path) -> PathBuf {
        self.lookup_override(base, FileType::ModuleDoc)
            .unwrap_or_else(|| module.with_extension(FileType::ModuleDoc.suffix()))
    }

    fn header_filename(&self, base: Option<&Path>) -> PathBuf {
        if let Some(explicit) = self.lookup_override(base, FileType::Header) {
            return explicit;
        }
        if let Some(path) = &self.output_info.header_output_path {
            return path.clone();
        }
        let oi = self.output_info;
        let name = format!("{}.{}", oi.module_name, FileType::Header.suffix());
        match oi.output_path.as_ref().and_then(|p| p.parent()) {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
            _ => PathBuf::from(name),
        }
    }

    /// A dependency or diagnostics file placed next to the primary output.
    /// When the primary is itself a ledgered temporary, the sibling joins
    /// the ledger too.
    fn sibling_output(&mut self, output: &CommandOutput, ty: FileType) -> PathBuf {
        match output.primary() {
            Some(primary) => {
                let path = primary.with_extension(ty.suffix());
                if self.temp_ledger.iter().any(|p| p == primary) {
                    self.temp_ledger.push(path.clone());
                }
                path
            }
            None => PathBuf::from(format!(
                "{}.{}",
                self.output_info.module_name,
                ty.suffix()
            )),
        }
    }

    /// A fresh unique temporary with the right suffix, for intermediate
    /// artifacts; allocation failure is a hard construction error.
    fn temp_output(&mut self, base: Option<&Path>, ty: FileType) -> Result<PathBuf, JobBuildError> {
        let stem = base
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.output_info.module_name.clone());
        let file = tempfile::Builder::new()
            .prefix(&format!("{}-", stem))
            .suffix(&format!(".{}", ty.suffix()))
            .tempfile()
            .map_err(JobBuildError::TempFile)?;
        let path = file
            .into_temp_path()
            .keep()
            .map_err(|e| JobBuildError::TempFile(e.error))?;
        self.temp_ledger.push(path.clone());
        Ok(path)
    }
}

fn stem_path(base: Option<&Path>, module_name: &str, ty: FileType) -> PathBuf {
    let stem = base
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| module_name.to_string());
    PathBuf::from(format!("{}.{}", stem, ty.suffix()))
}
