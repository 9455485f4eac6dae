// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Scenarios: sequences of requests and notifications run against a manager
//! programming simulated nodes.
//!
//! Nodes, ports, matches and actions are given as strings and parsed with the
//! identifier types of an [`IdTypeRegistry`]. A step may state the result it expects,
//! in which case any other result aborts the scenario.

use frm::params::ParamsError;
use frm::testing::MockProgrammer;
use frm::{
    ContainerFlow, ContainerView, FlowEntry, ForwardingRulesManager, FrmError, FrmParams,
    StaticFlow,
};
use sal::{Action, Flow, IdTypeRegistry, Match, Node, NodeConnector, SalError, UpdateType};
use serde::Deserialize;
use serde_yaml_ng::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub(crate) enum ScenarioError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse scenario: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("Bad parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("Step {step}: {source}")]
    Model { step: usize, source: SalError },
    #[error("Step {step}: expected {expected}, got {got}")]
    Unexpected {
        step: usize,
        expected: Expect,
        got: String,
    },
}

/// The result a step expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Expect {
    Ok,
    InvalidArgument,
    Conflict,
    Hardware,
    Internal,
    NotFound,
    NotAcceptable,
}

impl Expect {
    fn matches(self, result: &Result<(), FrmError>) -> bool {
        matches!(
            (self, result),
            (Expect::Ok, Ok(()))
                | (Expect::InvalidArgument, Err(FrmError::InvalidArgument(_)))
                | (Expect::Conflict, Err(FrmError::Conflict(_)))
                | (Expect::Hardware, Err(FrmError::Hardware(_)))
                | (Expect::Internal, Err(FrmError::Internal(_)))
                | (Expect::NotFound, Err(FrmError::NotFound(_)))
                | (Expect::NotAcceptable, Err(FrmError::NotAcceptable(_)))
        )
    }
}

impl Display for Expect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expect::Ok => write!(f, "ok"),
            Expect::InvalidArgument => write!(f, "invalid argument"),
            Expect::Conflict => write!(f, "conflict"),
            Expect::Hardware => write!(f, "hardware failure"),
            Expect::Internal => write!(f, "internal error"),
            Expect::NotFound => write!(f, "not found"),
            Expect::NotAcceptable => write!(f, "not acceptable"),
        }
    }
}

/// A flow on a node, as written in scenarios
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FlowSpec {
    node: String,
    name: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    priority: u16,
    #[serde(default, rename = "match")]
    matching: BTreeMap<String, Value>,
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    idle_timeout: u16,
    #[serde(default)]
    hard_timeout: u16,
    #[serde(default)]
    cookie: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FlowRef {
    node: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PortEdit {
    node: String,
    name: String,
    ports: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Transition {
    Enter,
    Leave,
}

fn installed() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Op {
    Install(FlowSpec),
    Uninstall(FlowSpec),
    Modify { current: FlowSpec, new: FlowSpec },
    ModifyOrAdd(FlowSpec),
    UninstallGroup(String),
    AddOutputPorts(PortEdit),
    RemoveOutputPorts(PortEdit),
    ReplaceOutputPort(PortEdit),
    ContainerFlows(Vec<BTreeMap<String, Value>>),
    ContainerMode(Transition),
    AddStaticFlow {
        flow: FlowSpec,
        #[serde(default = "installed")]
        install: bool,
    },
    RemoveStaticFlow(FlowRef),
    ModifyStaticFlow(FlowSpec),
    ToggleStaticFlow(FlowRef),
    NodeUp(String),
    NodeDown(String),
    PortUp(String),
    PortDown(String),
    /// the node drops the flow on its own
    Expire(FlowSpec),
    Proactive(String),
    Reactive(String),
    Disconnect(String),
    Connect(String),
    Show(Option<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Step {
    #[serde(flatten)]
    op: Op,
    #[serde(default)]
    expect: Option<Expect>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    params: FrmParams,
    #[serde(default)]
    steps: Vec<Step>,
}

impl Scenario {
    pub(crate) fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml_ng::from_str(yaml)?;
        scenario.params.validate()?;
        Ok(scenario)
    }

    pub(crate) fn load(path: &Path) -> Result<Self, ScenarioError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    pub(crate) fn params(&self) -> &FrmParams {
        &self.params
    }

    pub(crate) fn steps(&self) -> &[Step] {
        &self.steps
    }
}

/// YAML scalars as the strings the model parsers expect
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_match(
    registry: &IdTypeRegistry,
    node: &Node,
    fields: &BTreeMap<String, Value>,
) -> Result<Match, SalError> {
    fields.iter().try_fold(Match::any(), |m, (field, value)| {
        let value = scalar(value).ok_or_else(|| SalError::InvalidMatch(field.clone()))?;
        m.with_field(registry, node, field, &value)
    })
}

/// Runs scenario steps against a manager programming simulated nodes
pub(crate) struct Runner {
    registry: IdTypeRegistry,
    programmer: Arc<MockProgrammer>,
    container: Arc<ContainerView>,
    frm: ForwardingRulesManager,
    verbose: bool,
}

impl Runner {
    pub(crate) fn new(params: FrmParams, verbose: bool) -> Result<Self, ScenarioError> {
        let programmer = Arc::new(MockProgrammer::new());
        let container = Arc::new(ContainerView::new(params.container_name.clone()));
        let frm = ForwardingRulesManager::new(params, programmer.clone(), container.clone())?;
        Ok(Self {
            registry: IdTypeRegistry::with_defaults(),
            programmer,
            container,
            frm,
            verbose,
        })
    }

    pub(crate) fn manager(&self) -> &ForwardingRulesManager {
        &self.frm
    }

    pub(crate) fn programmer(&self) -> &MockProgrammer {
        &self.programmer
    }

    fn node(&self, input: &str) -> Result<Node, SalError> {
        Node::parse(&self.registry, input)
    }

    fn flow(&self, spec: &FlowSpec) -> Result<(Node, Flow), SalError> {
        let node = self.node(&spec.node)?;
        let matching = parse_match(&self.registry, &node, &spec.matching)?;
        let actions = spec
            .actions
            .iter()
            .map(|a| Action::parse(&self.registry, &node, a))
            .collect::<Result<Vec<_>, _>>()?;
        let flow = Flow::new(matching, actions)
            .with_priority(spec.priority)
            .with_timeouts(spec.idle_timeout, spec.hard_timeout)
            .with_id(spec.cookie);
        Ok((node, flow))
    }

    fn flow_entry(&self, spec: &FlowSpec) -> Result<FlowEntry, SalError> {
        let (node, flow) = self.flow(spec)?;
        let entry = FlowEntry::new(node, spec.name.clone(), flow);
        Ok(match &spec.group {
            Some(group) => entry.with_group(group.clone()),
            None => entry,
        })
    }

    fn static_flow(&self, spec: &FlowSpec) -> Result<StaticFlow, SalError> {
        let (node, flow) = self.flow(spec)?;
        Ok(StaticFlow::new(spec.name.clone(), node, flow))
    }

    fn ports(&self, node: &Node, ports: &[String]) -> Result<Vec<NodeConnector>, SalError> {
        ports
            .iter()
            .map(|p| NodeConnector::parse_on(&self.registry, node, p))
            .collect()
    }

    fn container_flows(
        &self,
        flows: &[BTreeMap<String, Value>],
    ) -> Result<Vec<ContainerFlow>, SalError> {
        // container flows are not bound to a node: ports must be given in full
        let anchor = Node::new(&self.registry, "OF", 0_u64)?;
        flows
            .iter()
            .map(|fields| parse_match(&self.registry, &anchor, fields).map(ContainerFlow::new))
            .collect()
    }

    /// Execute one step. The outer error is for steps that cannot be understood, the inner
    /// result is the manager response.
    fn execute(&self, op: &Op) -> Result<Result<(), FrmError>, SalError> {
        let frm = &self.frm;
        let result = match op {
            Op::Install(spec) => frm.install_flow_entry(&self.flow_entry(spec)?).map(drop),
            Op::Uninstall(spec) => frm.uninstall_flow_entry(&self.flow_entry(spec)?).map(drop),
            Op::Modify { current, new } => frm
                .modify_flow_entry(&self.flow_entry(current)?, &self.flow_entry(new)?)
                .map(drop),
            Op::ModifyOrAdd(spec) => frm
                .modify_or_add_flow_entry(&self.flow_entry(spec)?)
                .map(drop),
            Op::UninstallGroup(group) => frm.uninstall_flow_entry_group(group),
            Op::AddOutputPorts(edit) => {
                let node = self.node(&edit.node)?;
                let ports = self.ports(&node, &edit.ports)?;
                frm.add_output_port(&node, &edit.name, &ports).map(drop)
            }
            Op::RemoveOutputPorts(edit) => {
                let node = self.node(&edit.node)?;
                let ports = self.ports(&node, &edit.ports)?;
                frm.remove_output_port(&node, &edit.name, &ports).map(drop)
            }
            Op::ReplaceOutputPort(edit) => {
                let node = self.node(&edit.node)?;
                let ports = self.ports(&node, &edit.ports)?;
                match ports.first() {
                    Some(port) => frm.replace_output_port(&node, &edit.name, port).map(drop),
                    None => Err(FrmError::InvalidArgument("no port given".to_string())),
                }
            }
            Op::ContainerFlows(flows) => {
                let current = self.container_flows(flows)?;
                let previous = self.container.set_container_flows(current.clone());
                let update = match current.len().cmp(&previous.len()) {
                    std::cmp::Ordering::Greater => UpdateType::Added,
                    std::cmp::Ordering::Less => UpdateType::Removed,
                    std::cmp::Ordering::Equal => UpdateType::Changed,
                };
                let any = ContainerFlow::new(Match::any());
                frm.container_flow_updated(
                    previous.first().unwrap_or(&any),
                    current.first().unwrap_or(&any),
                    update,
                );
                Ok(())
            }
            Op::ContainerMode(transition) => {
                frm.container_mode_updated(match transition {
                    Transition::Enter => UpdateType::Added,
                    Transition::Leave => UpdateType::Removed,
                });
                Ok(())
            }
            Op::AddStaticFlow { flow, install } => {
                let config = self.static_flow(flow)?.with_install_in_hw(*install);
                frm.add_static_flow(config, false)
            }
            Op::RemoveStaticFlow(flow) => frm.remove_static_flow(&flow.name, &self.node(&flow.node)?),
            Op::ModifyStaticFlow(spec) => frm.modify_static_flow(self.static_flow(spec)?),
            Op::ToggleStaticFlow(flow) => {
                frm.toggle_static_flow_status(&flow.name, &self.node(&flow.node)?)
            }
            Op::NodeUp(node) => {
                frm.notify_node(&self.node(node)?, UpdateType::Added, &[]);
                Ok(())
            }
            Op::NodeDown(node) => {
                frm.notify_node(&self.node(node)?, UpdateType::Removed, &[]);
                Ok(())
            }
            Op::PortUp(port) => {
                let port = NodeConnector::parse(&self.registry, port)?;
                frm.notify_node_connector(&port, UpdateType::Added, &[]);
                Ok(())
            }
            Op::PortDown(port) => {
                let port = NodeConnector::parse(&self.registry, port)?;
                frm.notify_node_connector(&port, UpdateType::Removed, &[]);
                Ok(())
            }
            Op::Expire(spec) => {
                let (node, flow) = self.flow(spec)?;
                if !self.programmer.expire(&node, &flow) {
                    debug!("Flow {flow} is not programmed on {node}");
                }
                frm.flow_removed(&node, &flow);
                Ok(())
            }
            Op::Proactive(node) => {
                frm.mode_change_notify(&self.node(node)?, true);
                Ok(())
            }
            Op::Reactive(node) => {
                frm.mode_change_notify(&self.node(node)?, false);
                Ok(())
            }
            Op::Disconnect(node) => {
                self.programmer.disconnect(&self.node(node)?);
                Ok(())
            }
            Op::Connect(node) => {
                self.programmer.connect(&self.node(node)?);
                Ok(())
            }
            Op::Show(title) => {
                if let Some(title) = title {
                    println!("\n{title}");
                }
                println!("{frm}");
                Ok(())
            }
        };
        Ok(result)
    }

    /// Run all the steps, stopping at the first step whose result is not the expected one.
    /// Returns the number of steps that failed without an expectation.
    pub(crate) fn run(&self, steps: &[Step]) -> Result<usize, ScenarioError> {
        let mut failures = 0;
        for (n, step) in steps.iter().enumerate() {
            let step_no = n + 1;
            debug!("Step {step_no}: {:?}", step.op);
            let result = self
                .execute(&step.op)
                .map_err(|source| ScenarioError::Model {
                    step: step_no,
                    source,
                })?;
            match (step.expect, &result) {
                (Some(expected), _) if !expected.matches(&result) => {
                    return Err(ScenarioError::Unexpected {
                        step: step_no,
                        expected,
                        got: result
                            .as_ref()
                            .err()
                            .map_or_else(|| "ok".to_string(), ToString::to_string),
                    });
                }
                (None, Err(e)) => {
                    warn!("Step {step_no} failed: {e}");
                    failures += 1;
                }
                _ => info!("Step {step_no}: done"),
            }
            if self.verbose {
                println!("── after step {step_no} ──\n{}", self.frm);
            }
        }
        Ok(failures)
    }
}
