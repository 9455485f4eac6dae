// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! A [`FlowProgrammer`] for tests: it records every call, keeps the flow tables the
//! nodes would have and fails on demand.

use ahash::RandomState;
use sal::{Flow, FlowProgrammer, Node, ProgrammerError};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Add,
    Remove,
    Modify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Add { node: Node, flow: Flow },
    Remove { node: Node, flow: Flow },
    Modify { node: Node, old: Flow, new: Flow },
}

impl Call {
    #[must_use]
    pub fn kind(&self) -> CallKind {
        match self {
            Call::Add { .. } => CallKind::Add,
            Call::Remove { .. } => CallKind::Remove,
            Call::Modify { .. } => CallKind::Modify,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    counts: HashMap<CallKind, usize, RandomState>,
    fail_at: HashSet<(CallKind, usize), RandomState>,
    fail_always: HashSet<CallKind, RandomState>,
    disconnected: HashSet<Node, RandomState>,
    tables: HashMap<Node, Vec<Flow>, RandomState>,
}

#[derive(Debug, Default)]
pub struct MockProgrammer {
    state: Mutex<MockState>,
    delay: Mutex<Option<Duration>>,
}

impl MockProgrammer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call received so far, failed ones included
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    #[must_use]
    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind() == kind).count()
    }

    /// Forget the recorded calls. Flow tables are kept.
    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    /// Fail the `n`-th call of `kind` from now on, counting from 1
    pub fn fail_nth(&self, kind: CallKind, n: usize) {
        let mut state = self.lock();
        let seen = state.counts.get(&kind).copied().unwrap_or(0);
        state.fail_at.insert((kind, seen + n));
    }

    /// Fail every call of `kind` until [`MockProgrammer::heal`]
    pub fn fail_always(&self, kind: CallKind) {
        self.lock().fail_always.insert(kind);
    }

    /// Stop failing calls
    pub fn heal(&self) {
        let mut state = self.lock();
        state.fail_at.clear();
        state.fail_always.clear();
    }

    pub fn disconnect(&self, node: &Node) {
        self.lock().disconnected.insert(node.clone());
    }

    pub fn connect(&self, node: &Node) {
        self.lock().disconnected.remove(node);
    }

    /// Slow down every call
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// The flows programmed on `node`, in programming order
    #[must_use]
    pub fn table(&self, node: &Node) -> Vec<Flow> {
        self.lock().tables.get(node).cloned().unwrap_or_default()
    }

    /// Total number of flows programmed in all nodes
    #[must_use]
    pub fn table_size(&self) -> usize {
        self.lock().tables.values().map(Vec::len).sum()
    }

    /// Drop `flow` from the table of `node` as the node would on a timeout. No call is
    /// recorded. Returns false if the flow was not programmed.
    pub fn expire(&self, node: &Node, flow: &Flow) -> bool {
        let mut state = self.lock();
        let Some(table) = state.tables.get_mut(node) else {
            return false;
        };
        let Some(pos) = table.iter().position(|f| f == flow) else {
            return false;
        };
        table.remove(pos);
        if table.is_empty() {
            state.tables.remove(node);
        }
        true
    }

    fn call(&self, call: Call) -> Result<(), ProgrammerError> {
        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.lock();
        let kind = call.kind();
        let nth = {
            let count = state.counts.entry(kind).or_insert(0);
            *count += 1;
            *count
        };
        state.calls.push(call.clone());

        let node = match &call {
            Call::Add { node, .. } | Call::Remove { node, .. } | Call::Modify { node, .. } => {
                node.clone()
            }
        };
        if state.disconnected.contains(&node) {
            debug!("mock: {node} is disconnected");
            return Err(ProgrammerError::NotConnected(node));
        }
        if state.fail_always.contains(&kind) || state.fail_at.remove(&(kind, nth)) {
            debug!("mock: failing {kind:?} call #{nth} on {node}");
            return Err(ProgrammerError::Rejected {
                node,
                reason: format!("injected failure of {kind:?} call #{nth}"),
            });
        }

        let table = state.tables.entry(node.clone()).or_default();
        match call {
            Call::Add { flow, .. } => table.push(flow),
            Call::Remove { flow, .. } => {
                let Some(pos) = table.iter().position(|f| *f == flow) else {
                    return Err(ProgrammerError::Rejected {
                        node,
                        reason: format!("no such flow: {flow}"),
                    });
                };
                table.remove(pos);
            }
            Call::Modify { old, new, .. } => {
                let Some(slot) = table.iter_mut().find(|f| **f == old) else {
                    return Err(ProgrammerError::Rejected {
                        node,
                        reason: format!("no such flow: {old}"),
                    });
                };
                *slot = new;
            }
        }
        if table.is_empty() {
            state.tables.remove(&node);
        }
        Ok(())
    }
}

impl FlowProgrammer for MockProgrammer {
    fn add_flow(&self, node: &Node, flow: &Flow) -> Result<(), ProgrammerError> {
        self.call(Call::Add {
            node: node.clone(),
            flow: flow.clone(),
        })
    }

    fn remove_flow(&self, node: &Node, flow: &Flow) -> Result<(), ProgrammerError> {
        self.call(Call::Remove {
            node: node.clone(),
            flow: flow.clone(),
        })
    }

    fn modify_flow(&self, node: &Node, old: &Flow, new: &Flow) -> Result<(), ProgrammerError> {
        self.call(Call::Modify {
            node: node.clone(),
            old: old.clone(),
            new: new.clone(),
        })
    }
}
