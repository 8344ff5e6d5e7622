//! Conceptual build steps and the arena that owns them.
//!
//! Actions form a DAG, not a tree: with module merging or linking requested
//! the same compile step is reachable from more than one parent. Ownership of
//! shared children is expressed by the `owns_inputs` flag on the parent, kept
//! purely as logical-ownership information for dumps and debugging.

use std::fmt::Write as _;
use std::ops::Index;
use std::path::{Path, PathBuf};

use crate::file_type::FileType;

/// Index of an action in its `ActionList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(pub u32);

/// What kind of conceptual step an action represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// An input file handed to the driver; never executed.
    Input { path: PathBuf, file_type: FileType },
    /// One frontend run over one or more sources.
    Compile,
    /// Combine per-file partial modules into the module for the build.
    MergeModule,
    /// Produce the final linked image.
    Link,
    /// Extract debug information from a linked image.
    GenerateDebugSymbols,
    /// An interactive session; no inputs, no on-disk output.
    Repl,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Input { .. } => "input",
            ActionKind::Compile => "compile",
            ActionKind::MergeModule => "merge-module",
            ActionKind::Link => "link",
            ActionKind::GenerateDebugSymbols => "generate-debug-symbols",
            ActionKind::Repl => "repl",
        }
    }
}

/// A node in the conceptual build DAG.
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    /// The kind of artifact this step conceptually produces.
    pub output_type: FileType,
    /// Ordered children this step depends on.
    pub inputs: Vec<ActionId>,
    /// Cleared when the same children are also reachable through another
    /// parent, leaving exactly one logical owner.
    pub owns_inputs: bool,
}

impl Action {
    pub fn new(kind: ActionKind, output_type: FileType, inputs: Vec<ActionId>) -> Self {
        Self {
            kind,
            output_type,
            inputs,
            owns_inputs: true,
        }
    }

    /// Shorthand for an input-file leaf.
    pub fn input(path: &Path, file_type: FileType) -> Self {
        Self::new(
            ActionKind::Input {
                path: path.to_path_buf(),
                file_type,
            },
            file_type,
            Vec::new(),
        )
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, ActionKind::Input { .. })
    }
}

/// Arena storage for one driver invocation's actions.
///
/// Actions are created during graph construction, immutable afterwards
/// (except for ownership demotion), and live as long as the Compilation.
#[derive(Debug, Default)]
pub struct ActionList {
    actions: Vec<Action>,
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, action: Action) -> ActionId {
        let id = ActionId(self.actions.len() as u32);
        self.actions.push(action);
        id
    }

    pub fn get(&self, id: ActionId) -> &Action {
        &self.actions[id.0 as usize]
    }

    /// Demotes `id` to a non-owning reference over its children.
    pub fn clear_owns_inputs(&mut self, id: ActionId) {
        self.actions[id.0 as usize].owns_inputs = false;
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionId, &Action)> {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, a)| (ActionId(i as u32), a))
    }

    /// Renders the whole graph, one action per line, in creation order.
    ///
    /// Owned child lists print in braces, non-owning references in brackets.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (id, action) in self.iter() {
            let _ = write!(out, "{}: {}", id.0, action.kind.name());
            if let ActionKind::Input { path, .. } = &action.kind {
                let _ = write!(out, ", \"{}\"", path.display());
            }
            if !action.inputs.is_empty() {
                let ids: Vec<String> = action.inputs.iter().map(|i| i.0.to_string()).collect();
                let (open, close) = if action.owns_inputs { ('{', '}') } else { ('[', ']') };
                let _ = write!(out, ", {}{}{}", open, ids.join(", "), close);
            }
            let _ = writeln!(out, ", {}", action.output_type);
        }
        out
    }
}

impl Index<ActionId> for ActionList {
    type Output = Action;

    fn index(&self, id: ActionId) -> &Action {
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_marks_non_owning_references() {
        let mut actions = ActionList::new();
        let input = actions.add(Action::input(Path::new("a.km"), FileType::Source));
        let compile = actions.add(Action::new(
            ActionKind::Compile,
            FileType::Object,
            vec![input],
        ));
        let merge = actions.add(Action::new(
            ActionKind::MergeModule,
            FileType::Module,
            vec![compile],
        ));
        actions.add(Action::new(ActionKind::Link, FileType::Image, vec![compile, merge]));
        actions.clear_owns_inputs(merge);

        insta::assert_snapshot!(actions.dump(), @r###"
        0: input, "a.km", source
        1: compile, {0}, object
        2: merge-module, [1], module
        3: link, {1, 2}, image
        "###);
    }
}
