//! Shared helpers for driver tests.
//!
//! Builders for CLI configurations, bare `OutputInfo` values and
//! shell-backed jobs, used by the integration tests under `tests/`.

use std::path::PathBuf;

use crate::action::{Action, ActionKind, ActionList};
use crate::compilation::Compilation;
use crate::driver::{Cli, CompilerMode, LinkKind, OutputInfo};
use crate::file_type::FileType;
use crate::job::{CommandOutput, Condition, Job, JobId, JobList};

/// A CLI configuration over the given input paths, everything else default.
pub fn cli_for(inputs: &[&str]) -> Cli {
    Cli {
        input_files: inputs.iter().map(PathBuf::from).collect(),
        ..Default::default()
    }
}

/// A plain standard-mode `OutputInfo` for driving the job builder directly.
pub fn plain_output_info() -> OutputInfo {
    OutputInfo {
        mode: CompilerMode::Standard,
        link_kind: LinkKind::None,
        should_emit_module: false,
        module_output_path: None,
        emit_header: false,
        header_output_path: None,
        emit_dependencies: false,
        serialize_diagnostics: false,
        debug_info: false,
        module_name: "app".to_string(),
        module_name_is_fallback: false,
        first_input_stem: None,
        output_path: None,
        num_threads: 0,
        target: None,
    }
}

/// A job that runs `command` through `/bin/sh -c`.
pub fn shell_job(actions: &mut ActionList, command: &str, inputs: Vec<JobId>) -> Job {
    let source = actions.add(Action::new(ActionKind::Compile, FileType::Nothing, Vec::new()));
    Job {
        source,
        output_type: FileType::Nothing,
        executable: PathBuf::from("/bin/sh"),
        arguments: vec!["-c".to_string(), command.to_string()],
        inputs: JobList {
            jobs: inputs,
            owns_jobs: true,
        },
        output: CommandOutput::new(),
        condition: Condition::Always,
        previous_build_time: None,
    }
}

/// Counts the jobs lowered from actions of the given kind name.
pub fn count_jobs(compilation: &Compilation, kind: &str) -> usize {
    compilation
        .jobs()
        .iter()
        .filter(|(_, job)| compilation.actions()[job.source].kind.name() == kind)
        .count()
}
