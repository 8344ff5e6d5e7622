//! Platform tool registries.
//!
//! A `ToolChain` knows which input kinds a platform understands and which
//! `Tool` is responsible for each conceptual build step; the `Tool` turns a
//! step plus its computed outputs into the literal command line of a job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use target_lexicon::{Architecture, OperatingSystem, Triple};
use thiserror::Error;

use crate::action::Action;
use crate::driver::OutputInfo;
use crate::file_type::FileType;
use crate::job::{CommandOutput, Job};

pub mod unix;

/// Identity the cache assigns each constructed tool chain; part of the
/// job-cache key so jobs built against different chains never unify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ToolChainId(pub u32);

/// The literal invocation a tool materializes for a job.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub executable: PathBuf,
    pub arguments: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ToolChainError {
    #[error("unsupported target architecture '{0}'")]
    UnsupportedArchitecture(String),
    #[error("unsupported target OS '{0}'")]
    UnsupportedOs(String),
}

#[derive(Debug, Error)]
pub enum ConstructJobError {
    #[error("no linker found in PATH")]
    NoLinker,
    #[error("{0} step has no output to work from")]
    MissingInput(&'static str),
}

/// Produces the literal invocation for one action kind on one tool chain.
pub trait Tool {
    /// Human-readable tool name for logs and dumps.
    fn name(&self) -> &'static str;

    /// Materializes the command line for `action`.
    ///
    /// `inputs` are the already-built jobs this one consumes, `base_inputs`
    /// the action's direct input files, and `extra_args` the caller's
    /// pass-through argument list.
    fn construct_job(
        &self,
        action: &Action,
        inputs: &[&Job],
        output: &CommandOutput,
        base_inputs: &[(FileType, PathBuf)],
        extra_args: &[String],
        output_info: &OutputInfo,
    ) -> Result<Invocation, ConstructJobError>;
}

/// Platform-specific registry of tools and extension classifications.
///
/// Shared read-only during execution, so implementations must be `Send` and
/// `Sync`; all mutation happens while the single-threaded graph build holds
/// the cache exclusively.
pub trait ToolChain: Send + Sync {
    /// Classify a filename extension into an input kind.
    fn file_type_for_extension(&self, ext: &str) -> Option<FileType>;

    /// Pick the tool responsible for `action`, if any.
    fn select_tool(&self, action: &Action) -> Option<&dyn Tool>;

    /// Shared-library suffix for the target ("so", "dylib").
    fn shared_library_suffix(&self) -> &'static str;

    /// Suffix appended to an image path to name its extracted debug info.
    fn debug_symbols_suffix(&self) -> &'static str;

    fn triple(&self) -> &Triple;
}

/// Lazily builds one tool chain per normalized target triple.
///
/// Owned by the driver instance and constructor-injected where needed, so
/// tests can pre-seat fakes; never evicted for the lifetime of the driver.
#[derive(Default)]
pub struct ToolChainCache {
    chains: HashMap<String, (ToolChainId, Arc<dyn ToolChain>)>,
    next_id: u32,
}

impl ToolChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seats a tool chain for `triple`, replacing lazy construction.
    pub fn insert(&mut self, triple: &Triple, chain: Arc<dyn ToolChain>) -> ToolChainId {
        let id = ToolChainId(self.next_id);
        self.next_id += 1;
        self.chains.insert(triple.to_string(), (id, chain));
        id
    }

    /// Returns the chain for `triple`, constructing it on first use.
    ///
    /// An unknown architecture or OS is fatal to graph construction, not a
    /// recoverable configuration error.
    pub fn get(
        &mut self,
        triple: &Triple,
    ) -> Result<(ToolChainId, Arc<dyn ToolChain>), ToolChainError> {
        let key = triple.to_string();
        if let Some((id, chain)) = self.chains.get(&key) {
            return Ok((*id, chain.clone()));
        }

        if matches!(triple.architecture, Architecture::Unknown) {
            return Err(ToolChainError::UnsupportedArchitecture(
                triple.architecture.to_string(),
            ));
        }
        match triple.operating_system {
            OperatingSystem::Linux
            | OperatingSystem::Darwin
            | OperatingSystem::MacOSX { .. }
            | OperatingSystem::Freebsd
            | OperatingSystem::Netbsd
            | OperatingSystem::Openbsd => {}
            other => return Err(ToolChainError::UnsupportedOs(other.to_string())),
        }

        let chain: Arc<dyn ToolChain> = Arc::new(unix::UnixToolChain::new(triple.clone()));
        let id = ToolChainId(self.next_id);
        self.next_id += 1;
        self.chains.insert(key, (id, chain.clone()));
        Ok((id, chain))
    }
}
