//! Owns the finished job graph and executes it.
//!
//! Scheduling is pure DAG shape: a job becomes ready once every job in its
//! input set has completed, and at most `parallelism` external processes are
//! in flight at a time. No locks order the work; the graph does.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc;

use log::debug;
use petgraph::graph::NodeIndex;
use petgraph::{Direction, Graph};

use crate::action::ActionList;
use crate::job::{Condition, JobArena, JobId, JobList};
use crate::logger::Logger;

/// Aggregate result of performing all jobs.
///
/// A crash (abnormal termination) is deliberately kept apart from an
/// ordinary nonzero exit so callers can tell "the tool disagreed with its
/// input" from "the tool itself broke"; only `code` flattens the distinction
/// into the historical numeric sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// The first failing job's exit code.
    Failure(i32),
    /// Some job's process terminated abnormally.
    Crashed,
}

impl ExitStatus {
    /// Numeric code exposed at the process boundary; crashes map to -2.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure(code) => code,
            ExitStatus::Crashed => -2,
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    /// All inputs completed; queued to start.
    Ready,
    Running,
    Succeeded,
    Failed,
    /// Not started because an input failed.
    Cancelled,
}

impl NodeState {
    fn is_completed(self) -> bool {
        matches!(
            self,
            NodeState::Succeeded | NodeState::Failed | NodeState::Cancelled
        )
    }
}

/// The root object of one driver invocation's execution phase.
///
/// Owns the action arena (the actions live exactly as long as this), the job
/// arena with the top-level job list, the temp-file ledger and the
/// parallelism budget.
pub struct Compilation {
    actions: ActionList,
    jobs: JobArena,
    top_jobs: JobList,
    temp_files: Vec<PathBuf>,
    save_temps: bool,
    parallelism: usize,
    logger: Logger,
    cleaned: bool,
}

impl Compilation {
    pub fn new(
        actions: ActionList,
        jobs: JobArena,
        top_jobs: JobList,
        temp_files: Vec<PathBuf>,
        save_temps: bool,
        parallelism: usize,
        logger: Logger,
    ) -> Self {
        Self {
            actions,
            jobs,
            top_jobs,
            temp_files,
            save_temps,
            parallelism: parallelism.max(1),
            logger,
            cleaned: false,
        }
    }

    pub fn actions(&self) -> &ActionList {
        &self.actions
    }

    pub fn jobs(&self) -> &JobArena {
        &self.jobs
    }

    pub fn top_jobs(&self) -> &JobList {
        &self.top_jobs
    }

    pub fn temp_files(&self) -> &[PathBuf] {
        &self.temp_files
    }

    /// Executes the whole job graph and cleans up the temp ledger.
    ///
    /// Cleanup runs regardless of the outcome; an early abort or a dropped
    /// Compilation deletes the same files.
    pub fn perform_jobs(&mut self) -> ExitStatus {
        let status = self.run_graph();
        self.remove_temp_files();
        status
    }

    /// Prints every job's command line instead of executing anything.
    pub fn print_jobs(&self) {
        for (_, job) in self.jobs.iter() {
            let arguments = job.arguments.join(" ");
            println!("{} {}", job.executable.display(), arguments);
        }
    }

    fn run_graph(&self) -> ExitStatus {
        // Mirror the job graph into a scheduler graph; an edge points from a
        // job to one of its inputs.
        let mut graph: Graph<JobId, ()> = Graph::new();
        let mut nodes: HashMap<JobId, NodeIndex> = HashMap::new();
        for (id, _) in self.jobs.iter() {
            nodes.insert(id, graph.add_node(id));
        }
        for (id, job) in self.jobs.iter() {
            for input in &job.inputs.jobs {
                graph.add_edge(nodes[&id], nodes[input], ());
            }
        }

        let total = graph.node_count();
        let mut state: HashMap<NodeIndex, NodeState> = HashMap::new();
        let mut ready: VecDeque<NodeIndex> = VecDeque::new();
        for node in graph.node_indices() {
            if graph.edges_directed(node, Direction::Outgoing).count() == 0 {
                ready.push_back(node);
                state.insert(node, NodeState::Ready);
            } else {
                state.insert(node, NodeState::Waiting);
            }
        }

        let mut completed = 0usize;
        let mut first_failure: Option<ExitStatus> = None;

        let result = crossbeam::thread::scope(|s| {
            let (tx, rx) = mpsc::channel::<(NodeIndex, std::io::Result<std::process::ExitStatus>)>();
            let mut in_flight = 0usize;

            while completed < total {
                while in_flight < self.parallelism {
                    let node = match ready.pop_front() {
                        Some(node) => node,
                        None => break,
                    };
                    let job = &self.jobs[graph[node]];
                    if job.condition == Condition::CheckDependencies {
                        // Inputs looked unchanged at build time; the rerun
                        // decision was deferred, so nothing is spawned.
                        self.logger
                            .log(&format!("skipping up-to-date job {}", graph[node].0));
                        state.insert(node, NodeState::Succeeded);
                        completed += 1;
                        promote_dependents(&graph, node, &self.jobs, &mut state, &mut ready, &mut completed);
                        continue;
                    }
                    self.logger.log_command(&job.executable, &job.arguments);
                    state.insert(node, NodeState::Running);
                    let tx = tx.clone();
                    s.spawn(move |_| {
                        let status = Command::new(&job.executable).args(&job.arguments).status();
                        // The receiver only goes away when the scheduler is
                        // done, and it never finishes with jobs in flight.
                        let _ = tx.send((node, status));
                    });
                    in_flight += 1;
                }

                if in_flight == 0 {
                    // Everything left is waiting on work that will never
                    // run; the cancellation pass has already counted it.
                    break;
                }

                let (node, status) = rx
                    .recv()
                    .expect("worker threads outlive the scheduler loop");
                in_flight -= 1;
                completed += 1;

                match interpret_status(status) {
                    ExitStatus::Success => {
                        state.insert(node, NodeState::Succeeded);
                    }
                    failure => {
                        debug!("job {} failed: {:?}", graph[node].0, failure);
                        if first_failure.is_none() {
                            first_failure = Some(failure);
                        }
                        state.insert(node, NodeState::Failed);
                    }
                }
                promote_dependents(&graph, node, &self.jobs, &mut state, &mut ready, &mut completed);
            }

            first_failure.unwrap_or(ExitStatus::Success)
        });
        result.expect("scheduler thread panicked")
    }

    /// Delete every path recorded in the ledger unless the caller opted into
    /// keeping intermediates. Safe to call more than once.
    fn remove_temp_files(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        if self.save_temps {
            return;
        }
        for path in &self.temp_files {
            let _ = fs::remove_file(path);
        }
    }
}

impl Drop for Compilation {
    fn drop(&mut self) {
        self.remove_temp_files();
    }
}

/// See whether finishing `node` freed up any dependents, cancelling the ones
/// whose inputs failed (unless they opted out of cascading).
fn promote_dependents(
    graph: &Graph<JobId, ()>,
    node: NodeIndex,
    jobs: &JobArena,
    state: &mut HashMap<NodeIndex, NodeState>,
    ready: &mut VecDeque<NodeIndex>,
    completed: &mut usize,
) {
    let mut work = vec![node];
    while let Some(current) = work.pop() {
        for dependent in graph.neighbors_directed(current, Direction::Incoming) {
            if state[&dependent] != NodeState::Waiting {
                continue;
            }
            let mut all_done = true;
            let mut any_failed = false;
            for dependency in graph.neighbors_directed(dependent, Direction::Outgoing) {
                let dep_state = state[&dependency];
                if !dep_state.is_completed() {
                    all_done = false;
                    break;
                }
                if matches!(dep_state, NodeState::Failed | NodeState::Cancelled) {
                    any_failed = true;
                }
            }
            if !all_done {
                continue;
            }
            let condition = jobs[graph[dependent]].condition;
            if any_failed && condition != Condition::RunWithoutCascading {
                debug!("cancelling job {} after failed input", graph[dependent].0);
                state.insert(dependent, NodeState::Cancelled);
                *completed += 1;
                work.push(dependent);
            } else {
                state.insert(dependent, NodeState::Ready);
                ready.push_back(dependent);
            }
        }
    }
}

fn interpret_status(status: std::io::Result<std::process::ExitStatus>) -> ExitStatus {
    match status {
        Ok(status) => {
            if status.success() {
                ExitStatus::Success
            } else {
                match status.code() {
                    Some(code) => ExitStatus::Failure(code),
                    // Terminated by a signal: the tool itself broke.
                    None => ExitStatus::Crashed,
                }
            }
        }
        // The process could not even be spawned.
        Err(_) => ExitStatus::Crashed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Failure(3).code(), 3);
        assert_eq!(ExitStatus::Crashed.code(), -2);
        assert!(ExitStatus::Success.is_success());
        assert!(!ExitStatus::Crashed.is_success());
    }
}
