//! The action log: a tree-shaped undo/redo history with branch
//! preservation.
//!
//! Nodes live in an arena and are addressed by index, so actions can
//! reference spans that outlive any particular chain state without
//! back-pointers or cycles. The root is a sentinel composite ("initial
//! state") whose `applied` counter is the undo cursor: everything before
//! it has been applied, everything after it is redoable. Recording a new
//! edit while the cursor is rewound archives the abandoned future as a
//! branch instead of discarding it.

use tracing::trace;

use crate::editing::span::Span;

pub(crate) type NodeId = usize;

#[derive(Debug)]
pub(crate) enum ActionNode {
    Insert {
        position: u64,
        spans: Vec<Span>,
        length: u64,
    },
    Remove {
        position: u64,
        spans: Vec<Span>,
        length: u64,
    },
    Complex {
        title: String,
        children: Vec<NodeId>,
        /// Count of applied children; the original stored this as a
        /// `currentStep` index one below it.
        applied: usize,
        branches: Vec<ArchivedBranch>,
    },
}

/// A future discarded by editing after an undo, kept for later replay.
#[derive(Debug)]
pub(crate) struct ArchivedBranch {
    /// Child index the branch forked from; eligible for replay only
    /// while the undo cursor sits exactly there.
    pub start_index: usize,
    pub actions: Vec<NodeId>,
}

/// Caller-facing description of an archived branch eligible for
/// [`redo_branch`](crate::editing::Editor::redo_branch).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub id: usize,
    /// Titles of the archived actions, in replay order.
    pub titles: Vec<String>,
}

/// One primitive chain mutation to replay during undo or redo.
#[derive(Debug)]
pub(crate) enum ReplayStep {
    Insert { position: u64, spans: Vec<Span> },
    Remove { position: u64, length: u64 },
}

#[derive(Debug)]
pub(crate) struct ActionLog {
    nodes: Vec<ActionNode>,
    root: NodeId,
    /// Innermost-last stack of open composite actions.
    open: Vec<NodeId>,
}

impl ActionLog {
    pub fn new() -> Self {
        let root = ActionNode::Complex {
            title: "initial state".to_string(),
            children: Vec::new(),
            applied: 0,
            branches: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: 0,
            open: Vec::new(),
        }
    }

    /// Discard the whole history, e.g. after an in-place full save has
    /// invalidated the device windows held by old actions.
    pub fn reset(&mut self) {
        assert!(self.open.is_empty(), "reset with an open complex action");
        *self = Self::new();
    }

    fn node(&self, id: NodeId) -> &ActionNode {
        &self.nodes[id]
    }

    fn alloc(&mut self, node: ActionNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn root_complex(&mut self) -> &mut ActionNode {
        &mut self.nodes[self.root]
    }

    /// Record a freshly applied primitive action.
    pub fn record_insert(&mut self, position: u64, spans: Vec<Span>, length: u64) {
        let id = self.alloc(ActionNode::Insert {
            position,
            spans,
            length,
        });
        self.append_applied(id);
    }

    pub fn record_remove(&mut self, position: u64, spans: Vec<Span>, length: u64) {
        let id = self.alloc(ActionNode::Remove {
            position,
            spans,
            length,
        });
        self.append_applied(id);
    }

    /// Append an already-applied action to the innermost open composite,
    /// or to the root. Appending to a rewound root archives the
    /// abandoned future as a branch first.
    fn append_applied(&mut self, id: NodeId) {
        let parent = self.open.last().copied().unwrap_or(self.root);
        let ActionNode::Complex {
            children,
            applied,
            branches,
            ..
        } = &mut self.nodes[parent]
        else {
            unreachable!("record parent is always a complex node");
        };
        if *applied < children.len() {
            let actions: Vec<NodeId> = children.drain(*applied..).collect();
            trace!(start_index = *applied, steps = actions.len(), "archiving redo branch");
            branches.push(ArchivedBranch {
                start_index: *applied,
                actions,
            });
        }
        children.push(id);
        *applied += 1;
    }

    /// Open a composite action. Every mutation recorded until the
    /// matching [`end_complex`](Self::end_complex) becomes one undo step.
    pub fn begin_complex(&mut self, title: &str) {
        let id = self.alloc(ActionNode::Complex {
            title: title.to_string(),
            children: Vec::new(),
            applied: 0,
            branches: Vec::new(),
        });
        self.open.push(id);
    }

    /// Close the innermost composite and attach it to its parent.
    /// Panics on a mismatched bracket: that is a programmer error.
    pub fn end_complex(&mut self) {
        let id = self
            .open
            .pop()
            .expect("end_complex without matching begin_complex");
        let ActionNode::Complex { children, .. } = self.node(id) else {
            unreachable!()
        };
        if children.is_empty() {
            trace!("dropping empty complex action");
            return;
        }
        self.append_applied(id);
    }

    pub fn has_open_complex(&self) -> bool {
        !self.open.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        let ActionNode::Complex { applied, .. } = self.node(self.root) else {
            unreachable!()
        };
        *applied > 0
    }

    pub fn can_redo(&self) -> bool {
        let ActionNode::Complex {
            children, applied, ..
        } = self.node(self.root)
        else {
            unreachable!()
        };
        *applied < children.len()
    }

    /// The action the next `undo` will revert, without moving the cursor.
    pub fn next_undo(&self) -> Option<NodeId> {
        let ActionNode::Complex {
            children, applied, ..
        } = self.node(self.root)
        else {
            unreachable!()
        };
        applied.checked_sub(1).map(|i| children[i])
    }

    pub fn next_redo(&self) -> Option<NodeId> {
        let ActionNode::Complex {
            children, applied, ..
        } = self.node(self.root)
        else {
            unreachable!()
        };
        children.get(*applied).copied()
    }

    pub fn note_undone(&mut self) {
        let ActionNode::Complex { applied, .. } = self.root_complex() else {
            unreachable!()
        };
        *applied -= 1;
    }

    pub fn note_redone(&mut self) {
        let ActionNode::Complex { applied, .. } = self.root_complex() else {
            unreachable!()
        };
        *applied += 1;
    }

    /// Branches that forked at the current cursor position.
    pub fn alternative_branches(&self) -> Vec<BranchInfo> {
        let ActionNode::Complex {
            applied, branches, ..
        } = self.node(self.root)
        else {
            unreachable!()
        };
        branches
            .iter()
            .enumerate()
            .filter(|(_, b)| b.start_index == *applied)
            .map(|(id, b)| BranchInfo {
                id,
                titles: b.actions.iter().map(|&a| self.title(a)).collect(),
            })
            .collect()
    }

    /// Detach an eligible branch and re-append its actions to the
    /// mainline, un-applied. Any redoable mainline future standing at the
    /// fork is archived in its place, so switching branches never loses
    /// history. Returns the actions in replay order, or `None` when the
    /// branch does not fork at the current cursor.
    pub fn reattach_branch(&mut self, id: usize) -> Option<Vec<NodeId>> {
        let ActionNode::Complex {
            children,
            applied,
            branches,
            ..
        } = self.root_complex()
        else {
            unreachable!()
        };
        if branches.get(id)?.start_index != *applied {
            return None;
        }
        let branch = branches.remove(id);
        let abandoned: Vec<NodeId> = children.drain(*applied..).collect();
        if !abandoned.is_empty() {
            branches.push(ArchivedBranch {
                start_index: *applied,
                actions: abandoned,
            });
        }
        children.extend(&branch.actions);
        Some(branch.actions)
    }

    pub fn title(&self, id: NodeId) -> String {
        match self.node(id) {
            ActionNode::Insert {
                position, length, ..
            } => format!("insert {length} bytes at {position}"),
            ActionNode::Remove {
                position, length, ..
            } => format!("remove {length} bytes at {position}"),
            ActionNode::Complex { title, .. } => title.clone(),
        }
    }

    /// Primitive inverse mutations that revert `id`, in execution order.
    /// Composites unwind their children in reverse.
    pub fn undo_steps(&self, id: NodeId) -> Vec<ReplayStep> {
        match self.node(id) {
            ActionNode::Insert {
                position, length, ..
            } => vec![ReplayStep::Remove {
                position: *position,
                length: *length,
            }],
            ActionNode::Remove {
                position, spans, ..
            } => vec![ReplayStep::Insert {
                position: *position,
                spans: spans.clone(),
            }],
            ActionNode::Complex { children, .. } => children
                .iter()
                .rev()
                .flat_map(|&child| self.undo_steps(child))
                .collect(),
        }
    }

    /// Primitive mutations that re-apply `id`, in execution order.
    pub fn redo_steps(&self, id: NodeId) -> Vec<ReplayStep> {
        match self.node(id) {
            ActionNode::Insert {
                position, spans, ..
            } => vec![ReplayStep::Insert {
                position: *position,
                spans: spans.clone(),
            }],
            ActionNode::Remove {
                position, length, ..
            } => vec![ReplayStep::Remove {
                position: *position,
                length: *length,
            }],
            ActionNode::Complex { children, .. } => children
                .iter()
                .flat_map(|&child| self.redo_steps(child))
                .collect(),
        }
    }
}
