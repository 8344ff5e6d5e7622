//! Tool chain for ELF and Mach-O platforms.
//!
//! Compile-side steps run the `kemudi-frontend` executable; linking goes
//! through the system C compiler driver found on `PATH`, and debug-info
//! extraction uses `dsymutil` on Darwin and `objcopy` elsewhere.

use std::path::{Path, PathBuf};

use target_lexicon::{OperatingSystem, Triple};

use crate::action::{Action, ActionKind};
use crate::driver::{CompilerMode, LinkKind, OutputInfo};
use crate::file_type::FileType;
use crate::job::{CommandOutput, Job};
use crate::toolchain::{ConstructJobError, Invocation, Tool, ToolChain};

/// Name of the frontend executable, resolved through `PATH` at spawn time.
pub const FRONTEND_EXECUTABLE: &str = "kemudi-frontend";

pub struct UnixToolChain {
    triple: Triple,
    frontend: FrontendTool,
    linker: LinkerTool,
    debug_info: DebugInfoTool,
    shared_suffix: &'static str,
    debug_suffix: &'static str,
}

impl UnixToolChain {
    pub fn new(triple: Triple) -> Self {
        let darwin = matches!(
            triple.operating_system,
            OperatingSystem::Darwin | OperatingSystem::MacOSX { .. }
        );
        Self {
            triple,
            frontend: FrontendTool {
                executable: PathBuf::from(FRONTEND_EXECUTABLE),
            },
            linker: LinkerTool,
            debug_info: DebugInfoTool { darwin },
            shared_suffix: if darwin { "dylib" } else { "so" },
            debug_suffix: if darwin { "dSYM" } else { "debug" },
        }
    }

    /// Points compile-side steps at a different frontend executable; tests
    /// aim this at a stub script.
    pub fn with_frontend_executable(mut self, executable: PathBuf) -> Self {
        self.frontend.executable = executable;
        self
    }
}

impl ToolChain for UnixToolChain {
    fn file_type_for_extension(&self, ext: &str) -> Option<FileType> {
        FileType::from_extension(ext)
    }

    fn select_tool(&self, action: &Action) -> Option<&dyn Tool> {
        match action.kind {
            ActionKind::Compile | ActionKind::MergeModule | ActionKind::Repl => {
                Some(&self.frontend)
            }
            ActionKind::Link => Some(&self.linker),
            ActionKind::GenerateDebugSymbols => Some(&self.debug_info),
            ActionKind::Input { .. } => None,
        }
    }

    fn shared_library_suffix(&self) -> &'static str {
        self.shared_suffix
    }

    fn debug_symbols_suffix(&self) -> &'static str {
        self.debug_suffix
    }

    fn triple(&self) -> &Triple {
        &self.triple
    }
}

/// Invokes `kemudi-frontend` for compile, module-merge and REPL steps.
struct FrontendTool {
    executable: PathBuf,
}

impl FrontendTool {
    fn push_auxiliary_args(output: &CommandOutput, arguments: &mut Vec<String>) {
        let flags = [
            (FileType::Module, "--emit-module-path"),
            (FileType::ModuleDoc, "--emit-module-doc-path"),
            (FileType::Header, "--emit-header-path"),
            (FileType::Dependencies, "--emit-dependencies-path"),
            (FileType::Diagnostics, "--serialize-diagnostics-path"),
        ];
        for (ty, flag) in flags {
            if let Some(path) = output.auxiliary(ty) {
                arguments.push(flag.to_string());
                arguments.push(path.display().to_string());
            }
        }
    }
}

impl Tool for FrontendTool {
    fn name(&self) -> &'static str {
        "frontend"
    }

    fn construct_job(
        &self,
        action: &Action,
        inputs: &[&Job],
        output: &CommandOutput,
        base_inputs: &[(FileType, PathBuf)],
        extra_args: &[String],
        output_info: &OutputInfo,
    ) -> Result<Invocation, ConstructJobError> {
        let mut arguments = Vec::new();
        match action.kind {
            ActionKind::Compile if output_info.mode == CompilerMode::Immediate => {
                arguments.push("-i".to_string());
                for (ty, path) in base_inputs {
                    if *ty == FileType::Source {
                        arguments.push(path.display().to_string());
                    }
                }
            }
            ActionKind::Compile => {
                arguments.push("-c".to_string());
                for (ty, path) in base_inputs {
                    if *ty == FileType::Source {
                        arguments.push(path.display().to_string());
                    }
                }
                arguments.push("--module-name".to_string());
                arguments.push(output_info.module_name.clone());
                if output_info.num_threads > 1 {
                    arguments.push("--num-threads".to_string());
                    arguments.push(output_info.num_threads.to_string());
                }
                Self::push_auxiliary_args(output, &mut arguments);
                for (_, path) in output.primaries() {
                    arguments.push("-o".to_string());
                    arguments.push(path.display().to_string());
                }
            }
            ActionKind::MergeModule => {
                arguments.push("--merge-modules".to_string());
                // Partial modules from the compile steps, plus any module
                // files given directly on the command line.
                for job in inputs {
                    let module = job
                        .output
                        .auxiliary(FileType::Module)
                        .or_else(|| job.output.primary());
                    if let Some(path) = module {
                        arguments.push(path.display().to_string());
                    }
                }
                for (ty, path) in base_inputs {
                    if *ty == FileType::Module {
                        arguments.push(path.display().to_string());
                    }
                }
                arguments.push("--module-name".to_string());
                arguments.push(output_info.module_name.clone());
                Self::push_auxiliary_args(output, &mut arguments);
                if let Some(primary) = output.primary() {
                    arguments.push("-o".to_string());
                    arguments.push(primary.display().to_string());
                }
            }
            ActionKind::Repl => arguments.push("--repl".to_string()),
            _ => unreachable!("frontend tool selected for {}", action.kind.name()),
        }
        if let Some(target) = &output_info.target {
            arguments.push("--target".to_string());
            arguments.push(target.clone());
        }
        arguments.extend(extra_args.iter().cloned());
        Ok(Invocation {
            executable: self.executable.clone(),
            arguments,
        })
    }
}

/// Drives the system C compiler driver to link objects.
struct LinkerTool;

impl Tool for LinkerTool {
    fn name(&self) -> &'static str {
        "linker"
    }

    fn construct_job(
        &self,
        _action: &Action,
        inputs: &[&Job],
        output: &CommandOutput,
        base_inputs: &[(FileType, PathBuf)],
        _extra_args: &[String],
        output_info: &OutputInfo,
    ) -> Result<Invocation, ConstructJobError> {
        let linker = find_linker().ok_or(ConstructJobError::NoLinker)?;
        let mut arguments = Vec::new();
        // Only object outputs land on the link line; module inputs exist for
        // scheduling, their timestamps flow into the debug-info step.
        for job in inputs {
            if job.output_type == FileType::Object {
                for (_, path) in job.output.primaries() {
                    arguments.push(path.display().to_string());
                }
            }
        }
        for (ty, path) in base_inputs {
            if *ty == FileType::Object {
                arguments.push(path.display().to_string());
            }
        }
        if output_info.link_kind == LinkKind::DynamicLibrary {
            arguments.push("-shared".to_string());
        }
        if output_info.debug_info {
            arguments.push("-g".to_string());
        }
        if let Some(primary) = output.primary() {
            arguments.push("-o".to_string());
            arguments.push(primary.display().to_string());
        }
        Ok(Invocation {
            executable: linker,
            arguments,
        })
    }
}

/// Extracts debug information from a linked image.
struct DebugInfoTool {
    darwin: bool,
}

impl Tool for DebugInfoTool {
    fn name(&self) -> &'static str {
        "debug-info"
    }

    fn construct_job(
        &self,
        _action: &Action,
        inputs: &[&Job],
        output: &CommandOutput,
        _base_inputs: &[(FileType, PathBuf)],
        _extra_args: &[String],
        _output_info: &OutputInfo,
    ) -> Result<Invocation, ConstructJobError> {
        let image = inputs
            .first()
            .and_then(|job| job.output.primary())
            .ok_or(ConstructJobError::MissingInput("generate-debug-symbols"))?;
        let out = output
            .primary()
            .ok_or(ConstructJobError::MissingInput("generate-debug-symbols"))?;
        let (executable, arguments) = if self.darwin {
            (
                PathBuf::from("dsymutil"),
                vec![
                    image.display().to_string(),
                    "-o".to_string(),
                    out.display().to_string(),
                ],
            )
        } else {
            (
                PathBuf::from("objcopy"),
                vec![
                    "--only-keep-debug".to_string(),
                    image.display().to_string(),
                    out.display().to_string(),
                ],
            )
        };
        Ok(Invocation {
            executable,
            arguments,
        })
    }
}

/// Searches for an available link driver in the system.
///
/// The candidates are tried in the following order:
/// 1. cc
/// 2. clang
/// 3. gcc
pub fn find_linker() -> Option<PathBuf> {
    for linker in &["cc", "clang", "gcc"] {
        if let Some(path) = find_in_path(linker) {
            return Some(path);
        }
    }
    None
}

/// Checks whether a program is in the system's PATH.
fn find_in_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let candidate = Path::new(dir).join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}
