//! Workflow definitions.
//!
//! A `WorkflowSpec` is the caller-facing description of a workflow: tasks,
//! chains of tasks, groups of tasks and chains, each optionally followed by
//! a `then` node that runs with the result. The engine validates a spec
//! against the registry and lays it out as flat store nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::chain::ChainRecord;
use crate::domain::group::GroupRecord;
use crate::domain::ids::{ChainId, GroupId, NodeId, TaskId};
use crate::domain::node::{Member, Node, Parent};
use crate::domain::outcome::Payload;
use crate::domain::task::TaskRecord;
use crate::engine::injector::inject;
use crate::ports::IdGenerator;
use crate::typed::TaskRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    #[error("invalid workflow: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub endpoint: String,

    #[serde(default)]
    pub args: Payload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<WorkflowSpec>>,
}

impl TaskSpec {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            args: Payload::new(),
            delay_secs: None,
            on_error: None,
            then: None,
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn delay(mut self, secs: u64) -> Self {
        self.delay_secs = Some(secs);
        self
    }

    pub fn on_error(mut self, endpoint: impl Into<String>) -> Self {
        self.on_error = Some(endpoint.into());
        self
    }

    pub fn then(mut self, next: impl Into<WorkflowSpec>) -> Self {
        self.then = Some(Box::new(next.into()));
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub tasks: Vec<TaskSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<WorkflowSpec>>,
}

impl ChainSpec {
    pub fn new(tasks: impl IntoIterator<Item = TaskSpec>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
            then: None,
        }
    }

    pub fn then(mut self, next: impl Into<WorkflowSpec>) -> Self {
        self.then = Some(Box::new(next.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemberSpec {
    Task(TaskSpec),
    Chain(ChainSpec),
}

impl From<TaskSpec> for MemberSpec {
    fn from(spec: TaskSpec) -> Self {
        MemberSpec::Task(spec)
    }
}

impl From<ChainSpec> for MemberSpec {
    fn from(spec: ChainSpec) -> Self {
        MemberSpec::Chain(spec)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub members: Vec<MemberSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<WorkflowSpec>>,
}

impl GroupSpec {
    pub fn new<M: Into<MemberSpec>>(members: impl IntoIterator<Item = M>) -> Self {
        Self {
            members: members.into_iter().map(Into::into).collect(),
            then: None,
        }
    }

    pub fn member(mut self, member: impl Into<MemberSpec>) -> Self {
        self.members.push(member.into());
        self
    }

    pub fn then(mut self, next: impl Into<WorkflowSpec>) -> Self {
        self.then = Some(Box::new(next.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowSpec {
    Task(TaskSpec),
    Chain(ChainSpec),
    Group(GroupSpec),
}

impl From<TaskSpec> for WorkflowSpec {
    fn from(spec: TaskSpec) -> Self {
        WorkflowSpec::Task(spec)
    }
}

impl From<ChainSpec> for WorkflowSpec {
    fn from(spec: ChainSpec) -> Self {
        WorkflowSpec::Chain(spec)
    }
}

impl From<GroupSpec> for WorkflowSpec {
    fn from(spec: GroupSpec) -> Self {
        WorkflowSpec::Group(spec)
    }
}

impl WorkflowSpec {
    /// Check every endpoint, error callback and statically missing argument.
    /// All problems are reported at once.
    pub fn validate(&self, registry: &TaskRegistry) -> Result<(), CanvasError> {
        let mut problems = Vec::new();
        Validator {
            registry,
            problems: &mut problems,
        }
        .workflow(self, "root", false);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CanvasError::Invalid(problems))
        }
    }

    /// Lay the spec out as store nodes, all PENDING. The first node is the
    /// root.
    pub(crate) fn materialize(&self, ids: &dyn IdGenerator, now: DateTime<Utc>) -> Vec<Node> {
        let mut builder = Builder {
            ids,
            now,
            nodes: Vec::new(),
        };
        builder.workflow(self, None, Parent::Standalone);
        builder.nodes
    }
}

struct Validator<'a> {
    registry: &'a TaskRegistry,
    problems: &'a mut Vec<String>,
}

impl Validator<'_> {
    fn workflow(&mut self, spec: &WorkflowSpec, path: &str, has_previous: bool) {
        match spec {
            WorkflowSpec::Task(task) => self.task(task, path, has_previous, true),
            WorkflowSpec::Chain(chain) => self.chain(chain, path, has_previous),
            WorkflowSpec::Group(group) => self.group(group, path, has_previous),
        }
    }

    fn task(&mut self, spec: &TaskSpec, path: &str, has_previous: bool, standalone: bool) {
        let at = format!("{path} ({})", spec.endpoint);

        match self.registry.signature(&spec.endpoint) {
            None => self.problems.push(format!("{at}: unknown endpoint")),
            Some(signature) => {
                let placeholder = Value::Null;
                let previous = has_previous.then_some(&placeholder);
                if let Err(e) = inject(&spec.endpoint, &spec.args, signature, previous) {
                    self.problems.push(format!("{at}: {e}"));
                }
            }
        }

        if let Some(callback) = &spec.on_error
            && !self.registry.contains(callback)
        {
            self.problems
                .push(format!("{at}: unknown error callback '{callback}'"));
        }

        match (&spec.then, standalone) {
            (Some(next), true) => self.workflow(next, &format!("{path}.then"), true),
            (Some(_), false) => self
                .problems
                .push(format!("{at}: `then` is only allowed on standalone tasks")),
            (None, _) => {}
        }
    }

    fn chain(&mut self, spec: &ChainSpec, path: &str, has_previous: bool) {
        for (position, task) in spec.tasks.iter().enumerate() {
            let previous = if position == 0 { has_previous } else { true };
            self.task(task, &format!("{path}[{position}]"), previous, false);
        }
        if let Some(next) = &spec.then {
            self.workflow(next, &format!("{path}.then"), !spec.tasks.is_empty());
        }
    }

    fn group(&mut self, spec: &GroupSpec, path: &str, has_previous: bool) {
        for (index, member) in spec.members.iter().enumerate() {
            let at = format!("{path}{{{index}}}");
            match member {
                MemberSpec::Task(task) => self.task(task, &at, has_previous, false),
                MemberSpec::Chain(chain) => self.chain(chain, &at, has_previous),
            }
        }
        if let Some(next) = &spec.then {
            self.workflow(next, &format!("{path}.then"), true);
        }
    }
}

struct Builder<'a> {
    ids: &'a dyn IdGenerator,
    now: DateTime<Utc>,
    nodes: Vec<Node>,
}

impl Builder<'_> {
    fn workflow(&mut self, spec: &WorkflowSpec, root: Option<NodeId>, parent: Parent) -> NodeId {
        match spec {
            WorkflowSpec::Task(task) => NodeId::Task(self.task(task, root, parent)),
            WorkflowSpec::Chain(chain) => NodeId::Chain(self.chain(chain, root, parent)),
            WorkflowSpec::Group(group) => NodeId::Group(self.group(group, root, parent)),
        }
    }

    fn task(&mut self, spec: &TaskSpec, root: Option<NodeId>, parent: Parent) -> TaskId {
        let id = self.ids.task_id();
        let root = root.unwrap_or(NodeId::Task(id));

        let mut record = TaskRecord::new(
            id,
            root,
            &spec.endpoint,
            spec.args.clone(),
            parent,
            self.now,
        );
        record.delay_secs = spec.delay_secs;
        record.on_error = spec.on_error.clone();

        let slot = self.nodes.len();
        self.nodes.push(Node::Task(record));
        if let Some(next) = &spec.then {
            let trigger = self.workflow(next, Some(root), Parent::Standalone);
            if let Node::Task(t) = &mut self.nodes[slot] {
                t.trigger = Some(trigger);
            }
        }
        id
    }

    fn chain(&mut self, spec: &ChainSpec, root: Option<NodeId>, parent: Parent) -> ChainId {
        let id = self.ids.chain_id();
        let root = root.unwrap_or(NodeId::Chain(id));

        let slot = self.nodes.len();
        self.nodes.push(Node::Chain(ChainRecord::new(
            id,
            root,
            Vec::new(),
            parent,
            self.now,
        )));

        let tasks: Vec<TaskId> = spec
            .tasks
            .iter()
            .enumerate()
            .map(|(position, task)| self.task(task, Some(root), Parent::Chain { id, position }))
            .collect();
        let trigger = spec
            .then
            .as_ref()
            .map(|next| self.workflow(next, Some(root), Parent::Standalone));

        if let Node::Chain(c) = &mut self.nodes[slot] {
            c.tasks = tasks;
            c.trigger = trigger;
        }
        id
    }

    fn group(&mut self, spec: &GroupSpec, root: Option<NodeId>, parent: Parent) -> GroupId {
        let id = self.ids.group_id();
        let root = root.unwrap_or(NodeId::Group(id));

        let slot = self.nodes.len();
        self.nodes.push(Node::Group(GroupRecord::new(
            id,
            root,
            Vec::new(),
            parent,
            self.now,
        )));

        let members: Vec<Member> = spec
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                let parent = Parent::Group { id, index };
                match member {
                    MemberSpec::Task(task) => Member::Task(self.task(task, Some(root), parent)),
                    MemberSpec::Chain(chain) => {
                        Member::Chain(self.chain(chain, Some(root), parent))
                    }
                }
            })
            .collect();
        let trigger = spec
            .then
            .as_ref()
            .map(|next| self.workflow(next, Some(root), Parent::Standalone));

        if let Node::Group(g) = &mut self.nodes[slot] {
            *g = GroupRecord::new(id, root, members, parent, self.now);
            g.trigger = trigger;
        }
        id
    }
}
