//! The driver: command-line surface, input classification, output planning
//! and action-graph construction.
//!
//! Construction runs in phases (classify inputs, plan outputs, build
//! actions, build jobs) and the diagnostic engine is polled after each one;
//! any error aborts before a single process is spawned.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser as ClapParser;
use log::debug;
use target_lexicon::Triple;
use thiserror::Error;

use crate::action::{Action, ActionId, ActionKind, ActionList};
use crate::compilation::Compilation;
use crate::diagnostic::DiagnosticEngine;
use crate::file_type::FileType;
use crate::job::JobList;
use crate::job_builder::JobBuilder;
use crate::logger::Logger;
use crate::mtime::{ModTimeSource, SystemModTime};
use crate::output_file_map::OutputFileMap;
use crate::toolchain::{ToolChain, ToolChainCache, ToolChainError};

/// Command-line arguments for the kemudi driver.
#[derive(ClapParser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The input files
    #[arg()]
    pub input_files: Vec<PathBuf>,

    /// Output file
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Compile only, do not link
    #[arg(short = 'c')]
    pub compile_only: bool,

    /// Link the inputs into an executable even when a module is emitted
    #[arg(long)]
    pub emit_executable: bool,

    /// Link as a shared library instead of an executable
    #[arg(long)]
    pub emit_library: bool,

    /// Emit a module file for the inputs
    #[arg(long)]
    pub emit_module: bool,

    /// Explicit path for the emitted module
    #[arg(long, value_name = "FILE")]
    pub emit_module_path: Option<PathBuf>,

    /// Emit a C interoperability header
    #[arg(long)]
    pub emit_header: bool,

    /// Explicit path for the emitted header
    #[arg(long, value_name = "FILE")]
    pub emit_header_path: Option<PathBuf>,

    /// Emit make-style dependency files
    #[arg(long)]
    pub emit_dependencies: bool,

    /// Serialize frontend diagnostics next to each output
    #[arg(long)]
    pub serialize_diagnostics: bool,

    /// Generate debug info
    #[arg(short = 'g', long)]
    pub debug_info: bool,

    /// Module name (defaults to the output or first input stem)
    #[arg(long, value_name = "NAME")]
    pub module_name: Option<String>,

    /// Compile all inputs in one frontend job
    #[arg(long)]
    pub whole_module: bool,

    /// Number of frontend threads for whole-module compiles
    #[arg(long, value_name = "N")]
    pub num_threads: Option<usize>,

    /// Interpret the inputs instead of producing artifacts
    #[arg(short = 'i', long)]
    pub interpret: bool,

    /// Start a REPL
    #[arg(long)]
    pub repl: bool,

    /// Maximum number of parallel jobs
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Keep temporary files
    #[arg(long)]
    pub save_temps: bool,

    /// Target triple (defaults to the host)
    #[arg(long)]
    pub target: Option<String>,

    /// Path to an output file map
    #[arg(long, value_name = "FILE")]
    pub output_file_map: Option<PathBuf>,

    /// Print the job graph instead of running it
    #[arg(long)]
    pub print_jobs: bool,

    /// Pass an extra argument through to frontend jobs
    #[arg(short = 'X', value_name = "ARG")]
    pub frontend_args: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// How the compiler is being invoked overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerMode {
    /// One frontend invocation per source file.
    Standard,
    /// All sources in a single frontend invocation.
    WholeModule,
    /// Run the inputs directly; no on-disk outputs.
    Immediate,
    /// Interactive session; no inputs at all.
    Repl,
}

/// What kind of image the link step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    None,
    Executable,
    DynamicLibrary,
}

/// Everything downstream construction needs to know about requested outputs.
#[derive(Debug, Clone)]
pub struct OutputInfo {
    pub mode: CompilerMode,
    pub link_kind: LinkKind,
    pub should_emit_module: bool,
    pub module_output_path: Option<PathBuf>,
    pub emit_header: bool,
    pub header_output_path: Option<PathBuf>,
    pub emit_dependencies: bool,
    pub serialize_diagnostics: bool,
    pub debug_info: bool,
    pub module_name: String,
    /// Set when the module name was synthesized rather than user-chosen;
    /// image naming falls back to the input stem in that case.
    pub module_name_is_fallback: bool,
    pub first_input_stem: Option<String>,
    /// The single explicit total output (`-o`), if any.
    pub output_path: Option<PathBuf>,
    pub num_threads: usize,
    pub target: Option<String>,
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// Configuration problems were reported through the diagnostic engine.
    #[error("compilation was aborted by configuration errors")]
    Diagnosed,
    #[error(transparent)]
    ToolChain(#[from] ToolChainError),
}

/// Main compiler driver
pub struct Driver {
    cli: Cli,
    diagnostics: DiagnosticEngine,
    toolchains: ToolChainCache,
    mtimes: Box<dyn ModTimeSource>,
    logger: Logger,
}

impl Driver {
    pub fn new(cli: Cli) -> Self {
        Self::with_parts(cli, ToolChainCache::new(), Box::new(SystemModTime))
    }

    /// Full constructor: tests seat fake tool chains and a fixed clock here.
    pub fn with_parts(
        cli: Cli,
        toolchains: ToolChainCache,
        mtimes: Box<dyn ModTimeSource>,
    ) -> Self {
        let logger = Logger::new(cli.verbose);
        Self {
            cli,
            diagnostics: DiagnosticEngine::new(),
            toolchains,
            mtimes,
            logger,
        }
    }

    pub fn diagnostics(&self) -> &DiagnosticEngine {
        &self.diagnostics
    }

    pub fn print_diagnostics(&self) {
        self.diagnostics.print_all();
    }

    /// Runs every construction phase and returns an executable Compilation.
    pub fn build_compilation(&mut self) -> Result<Compilation, DriverError> {
        let triple = match &self.cli.target {
            Some(spec) => match Triple::from_str(spec) {
                Ok(triple) => triple,
                Err(err) => {
                    self.diagnostics
                        .error(format!("invalid target triple '{}': {}", spec, err));
                    return Err(DriverError::Diagnosed);
                }
            },
            None => Triple::host(),
        };
        let (toolchain_id, toolchain) = self.toolchains.get(&triple)?;

        let inputs = self.classify_inputs(&*toolchain);
        self.check_phase()?;

        let output_info = self.compute_output_info(&inputs);
        self.check_phase()?;

        let output_file_map = match &self.cli.output_file_map {
            Some(path) => match OutputFileMap::load(path) {
                Ok(map) => Some(map),
                Err(err) => {
                    self.diagnostics.error(err.to_string());
                    None
                }
            },
            None => None,
        };
        self.check_phase()?;

        let mut actions = ActionList::new();
        let top_level = self.build_actions(&mut actions, &inputs, &output_info);
        self.check_phase()?;
        debug!("built {} actions, {} top level", actions.len(), top_level.len());

        let output_claimant = self.designate_output_claimant(&actions, &top_level, &output_info);
        self.check_phase()?;

        let mut builder = JobBuilder::new(
            &actions,
            &*toolchain,
            toolchain_id,
            &output_info,
            output_file_map.as_ref(),
            &*self.mtimes,
            &self.cli.frontend_args,
            output_claimant,
        );
        let mut top_jobs = Vec::new();
        let mut build_error = None;
        for &action_id in &top_level {
            match builder.job_for_action(action_id, true) {
                Ok(job) => top_jobs.push(job),
                Err(err) => {
                    build_error = Some(err.to_string());
                    break;
                }
            }
        }
        if let Some(message) = build_error {
            self.diagnostics.error(message);
            builder.discard();
            return Err(DriverError::Diagnosed);
        }
        let (jobs, temp_files) = builder.finish();
        debug!("built {} jobs", jobs.len());

        Ok(Compilation::new(
            actions,
            jobs,
            JobList::owning(top_jobs),
            temp_files,
            self.cli.save_temps,
            self.cli.jobs.unwrap_or(1),
            self.logger,
        ))
    }

    fn check_phase(&self) -> Result<(), DriverError> {
        if self.diagnostics.has_errors() {
            Err(DriverError::Diagnosed)
        } else {
            Ok(())
        }
    }

    /// Maps each input to its file type; unrecognized inputs are reported
    /// and skipped while the rest keep going.
    fn classify_inputs(&mut self, toolchain: &dyn ToolChain) -> Vec<(FileType, PathBuf)> {
        let mut inputs = Vec::new();
        for path in &self.cli.input_files {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            match toolchain.file_type_for_extension(ext) {
                Some(ty) => inputs.push((ty, path.clone())),
                None => self
                    .diagnostics
                    .error_at(path, format!("unrecognized file type '{}'", ext)),
            }
        }
        inputs
    }

    fn compute_output_info(&mut self, inputs: &[(FileType, PathBuf)]) -> OutputInfo {
        let cli = &self.cli;

        let mode = if cli.repl {
            CompilerMode::Repl
        } else if cli.interpret {
            CompilerMode::Immediate
        } else if cli.whole_module {
            CompilerMode::WholeModule
        } else {
            CompilerMode::Standard
        };

        let link_kind = if matches!(mode, CompilerMode::Immediate | CompilerMode::Repl)
            || cli.compile_only
        {
            LinkKind::None
        } else if cli.emit_library {
            LinkKind::DynamicLibrary
        } else if cli.emit_module && !cli.emit_executable {
            LinkKind::None
        } else {
            LinkKind::Executable
        };

        let should_emit_module = cli.emit_module || cli.emit_module_path.is_some();

        let (module_name, module_name_is_fallback) = if let Some(name) = &cli.module_name {
            if !is_valid_module_name(name) {
                self.diagnostics
                    .error(format!("invalid module name '{}'", name));
            }
            (name.clone(), false)
        } else if let Some(stem) = self
            .cli
            .output_file
            .as_ref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
        {
            (stem.to_string(), !is_valid_module_name(stem))
        } else if let Some(stem) = inputs
            .first()
            .and_then(|(_, p)| p.file_stem())
            .and_then(|s| s.to_str())
        {
            (stem.to_string(), true)
        } else {
            ("main".to_string(), true)
        };

        let cli = &self.cli;
        let first_input_stem = inputs
            .first()
            .and_then(|(_, p)| p.file_stem())
            .and_then(|s| s.to_str())
            .map(str::to_string);

        let source_count = inputs
            .iter()
            .filter(|(ty, _)| *ty == FileType::Source)
            .count();
        if cli.emit_header
            && mode == CompilerMode::Standard
            && source_count > 1
            && !should_emit_module
        {
            self.diagnostics
                .error("cannot emit a header for multiple files without module generation");
        }

        OutputInfo {
            mode,
            link_kind,
            should_emit_module,
            module_output_path: self.cli.emit_module_path.clone(),
            emit_header: self.cli.emit_header,
            header_output_path: self.cli.emit_header_path.clone(),
            emit_dependencies: self.cli.emit_dependencies,
            serialize_diagnostics: self.cli.serialize_diagnostics,
            debug_info: self.cli.debug_info,
            module_name,
            module_name_is_fallback,
            first_input_stem,
            output_path: self.cli.output_file.clone(),
            num_threads: self.cli.num_threads.unwrap_or(0),
            target: self.cli.target.clone(),
        }
    }

    /// Converts the classified inputs into the conceptual action DAG.
    fn build_actions(
        &mut self,
        actions: &mut ActionList,
        inputs: &[(FileType, PathBuf)],
        oi: &OutputInfo,
    ) -> Vec<ActionId> {
        let mut top_level = Vec::new();

        if oi.mode == CompilerMode::Repl {
            if !inputs.is_empty() {
                self.diagnostics.error("REPL mode does not accept input files");
                return top_level;
            }
            top_level.push(actions.add(Action::new(
                ActionKind::Repl,
                FileType::Nothing,
                Vec::new(),
            )));
            return top_level;
        }
        if inputs.is_empty() {
            self.diagnostics.error("no input files");
            return top_level;
        }

        let compile_output = if oi.mode == CompilerMode::Immediate {
            FileType::Nothing
        } else {
            FileType::Object
        };
        let mut compile_actions = Vec::new();
        let mut object_inputs = Vec::new();
        let mut module_inputs = Vec::new();

        match oi.mode {
            CompilerMode::Standard => {
                for (ty, path) in inputs {
                    let input = actions.add(Action::input(path, *ty));
                    match ty {
                        FileType::Source => {
                            compile_actions.push(actions.add(Action::new(
                                ActionKind::Compile,
                                compile_output,
                                vec![input],
                            )));
                        }
                        FileType::Object if oi.link_kind != LinkKind::None => {
                            object_inputs.push(input);
                        }
                        FileType::Module if oi.should_emit_module => {
                            module_inputs.push(input);
                        }
                        FileType::Object => self
                            .diagnostics
                            .error_at(path, "object files are only accepted when linking"),
                        FileType::Module => self.diagnostics.error_at(
                            path,
                            "module files are only accepted when a module is being emitted",
                        ),
                        _ => self.diagnostics.error_at(path, "file is not a valid input"),
                    }
                }
            }
            CompilerMode::WholeModule | CompilerMode::Immediate => {
                let mut children = Vec::new();
                for (ty, path) in inputs {
                    let input = actions.add(Action::input(path, *ty));
                    match ty {
                        FileType::Source => children.push(input),
                        FileType::Object if oi.link_kind != LinkKind::None => {
                            object_inputs.push(input);
                        }
                        FileType::Module if oi.should_emit_module => {
                            module_inputs.push(input);
                        }
                        _ => self.diagnostics.error_at(path, "file is not a valid input"),
                    }
                }
                if !children.is_empty() {
                    compile_actions.push(actions.add(Action::new(
                        ActionKind::Compile,
                        compile_output,
                        children,
                    )));
                }
            }
            CompilerMode::Repl => unreachable!("handled above"),
        }

        if compile_actions.is_empty() {
            // Fail closed: every input errored out (or none could be
            // compiled), so no downstream action is built at all.
            if !self.diagnostics.has_errors() {
                self.diagnostics.error("no compilable input files");
            }
            return top_level;
        }

        if oi.mode == CompilerMode::Immediate {
            top_level.extend(compile_actions);
            return top_level;
        }

        let mut merge_module = None;
        if oi.should_emit_module && (compile_actions.len() > 1 || !module_inputs.is_empty()) {
            let mut children = compile_actions.clone();
            children.extend(module_inputs.iter().copied());
            merge_module = Some(actions.add(Action::new(
                ActionKind::MergeModule,
                FileType::Module,
                children,
            )));
        }

        if oi.link_kind != LinkKind::None {
            let mut children = compile_actions.clone();
            children.extend(object_inputs.iter().copied());
            if let Some(merge) = merge_module {
                // The merge's children are now also reachable through the
                // link action; it no longer owns them.
                actions.clear_owns_inputs(merge);
                if oi.debug_info {
                    // The module timestamp flows into the debug-info step.
                    children.push(merge);
                } else {
                    top_level.push(merge);
                }
            }
            let link = actions.add(Action::new(ActionKind::Link, FileType::Image, children));
            top_level.push(link);
            if oi.debug_info {
                let dsym = actions.add(Action::new(
                    ActionKind::GenerateDebugSymbols,
                    FileType::DebugInfo,
                    vec![link],
                ));
                actions.clear_owns_inputs(dsym);
                top_level.push(dsym);
            }
        } else {
            top_level.extend(compile_actions.iter().copied());
            if let Some(merge) = merge_module {
                actions.clear_owns_inputs(merge);
                top_level.push(merge);
            }
        }

        top_level
    }

    /// With a single `-o` given, exactly one top-level action may claim it;
    /// a link step always wins, anything else must be unambiguous.
    fn designate_output_claimant(
        &mut self,
        actions: &ActionList,
        top_level: &[ActionId],
        oi: &OutputInfo,
    ) -> Option<ActionId> {
        oi.output_path.as_ref()?;
        if let Some(link) = top_level
            .iter()
            .copied()
            .find(|&id| matches!(actions[id].kind, ActionKind::Link))
        {
            return Some(link);
        }
        let candidates: Vec<ActionId> = top_level
            .iter()
            .copied()
            .filter(|&id| {
                let action = &actions[id];
                !matches!(action.kind, ActionKind::GenerateDebugSymbols)
                    && action.output_type != FileType::Nothing
            })
            .collect();
        match candidates.as_slice() {
            [] => None,
            [single] => Some(*single),
            _ => {
                self.diagnostics
                    .error("cannot specify -o when producing multiple output files");
                None
            }
        }
    }
}

fn is_valid_module_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
