//! Graph model - nodes, ports, edges and typed per-kind attributes
//!
//! Graph documents are authored externally (YAML or JSON) and loaded with
//! [`WorkflowGraph::from_file`]. Every node kind carries its own attribute
//! record, so malformed configuration is rejected when the document is parsed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const PORT_IN: &str = "in";
pub const PORT_OUT: &str = "out";
pub const PORT_TRUE: &str = "true";
pub const PORT_FALSE: &str = "false";

/// Branch selector used when an edge has no source port
pub const DEFAULT_BRANCH: &str = "default";

/// Job kind without attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Start,
    Task,
    Condition,
    ApiCall,
    Script,
    SendEmail,
    End,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Task => write!(f, "task"),
            Self::Condition => write!(f, "condition"),
            Self::ApiCall => write!(f, "api_call"),
            Self::Script => write!(f, "script"),
            Self::SendEmail => write!(f, "send_email"),
            Self::End => write!(f, "end"),
        }
    }
}

/// Node kind with its typed attribute record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Start(StartAttrs),
    Task(TaskAttrs),
    Condition(ConditionAttrs),
    #[serde(alias = "apiCall")]
    ApiCall(ApiCallAttrs),
    Script(ScriptAttrs),
    #[serde(alias = "sendEmail")]
    SendEmail(EmailAttrs),
    End(EndAttrs),
}

impl NodeKind {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::Start(_) => JobType::Start,
            Self::Task(_) => JobType::Task,
            Self::Condition(_) => JobType::Condition,
            Self::ApiCall(_) => JobType::ApiCall,
            Self::Script(_) => JobType::Script,
            Self::SendEmail(_) => JobType::SendEmail,
            Self::End(_) => JobType::End,
        }
    }

    /// Ports a node of this kind gets when the document declares none
    pub fn default_ports(&self) -> Vec<Port> {
        match self {
            Self::Start(_) => vec![Port::output(PORT_OUT)],
            Self::End(_) => vec![Port::input(PORT_IN).required()],
            Self::Condition(_) => vec![
                Port::input(PORT_IN).required(),
                Port::output(PORT_TRUE),
                Port::output(PORT_FALSE),
            ],
            _ => vec![Port::input(PORT_IN).required(), Port::output(PORT_OUT)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartAttrs {
    pub trigger: String,
    pub payload: Option<Value>,
}

impl Default for StartAttrs {
    fn default() -> Self {
        Self {
            trigger: "manual".to_string(),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskAttrs {
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub tags: Vec<String>,
}

/// How condition rules are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

impl Default for Logic {
    fn default() -> Self {
        Self::And
    }
}

/// Comparison operator of a condition rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Self::Equals),
            "not_equals" => Ok(Self::NotEquals),
            "greater_than" => Ok(Self::GreaterThan),
            "less_than" => Ok(Self::LessThan),
            "contains" => Ok(Self::Contains),
            "not_contains" => Ok(Self::NotContains),
            "is_empty" => Ok(Self::IsEmpty),
            "is_not_empty" => Ok(Self::IsNotEmpty),
            other => Err(format!("unknown operator '{}'", other)),
        }
    }
}

impl TryFrom<String> for Operator {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `{field, operator, value}` predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl ConditionRule {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConditionAttrs {
    pub conditions: Vec<ConditionRule>,
    pub logic: Logic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Get
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiCallAttrs {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Overrides the configured API timeout
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptAttrs {
    pub language: String,
    pub code: String,
    /// Overrides the configured script timeout
    pub timeout_ms: Option<u64>,
    pub variables: Map<String, Value>,
}

impl Default for ScriptAttrs {
    fn default() -> Self {
        Self {
            language: "shell".to_string(),
            code: String::new(),
            timeout_ms: None,
            variables: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailAttrs {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndAttrs {
    pub status: String,
    pub message: Option<String>,
}

impl Default for EndAttrs {
    fn default() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// A named connection point on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub direction: PortDirection,
    #[serde(default)]
    pub required: bool,
}

impl Port {
    pub fn input(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Input,
            required: false,
        }
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            direction: PortDirection::Output,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

fn default_true() -> bool {
    true
}

/// A graph vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub ports: Vec<Port>,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            kind,
            ports: Vec::new(),
            continue_on_error: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_ports(mut self, ports: Vec<Port>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn job_type(&self) -> JobType {
        self.kind.job_type()
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start(_))
    }

    pub fn is_condition(&self) -> bool {
        matches!(self.kind, NodeKind::Condition(_))
    }

    /// Declared ports, or the kind's defaults when none are declared
    pub fn ports(&self) -> Vec<Port> {
        if self.ports.is_empty() {
            self.kind.default_ports()
        } else {
            self.ports.clone()
        }
    }

    pub fn has_port(&self, id: &str, direction: PortDirection) -> bool {
        self.ports()
            .iter()
            .any(|p| p.id == id && p.direction == direction)
    }
}

/// A directed connection between two node ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub source_port: Option<String>,
    pub target: String,
    #[serde(default)]
    pub target_port: Option<String>,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            source_port: None,
            target: target.into(),
            target_port: None,
        }
    }

    pub fn from_port(mut self, port: impl Into<String>) -> Self {
        self.source_port = Some(port.into());
        self
    }

    pub fn to_port(mut self, port: impl Into<String>) -> Self {
        self.target_port = Some(port.into());
        self
    }

    /// Branch selector carried by this edge
    pub fn branch(&self) -> &str {
        self.source_port.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    pub fn input_port(&self) -> &str {
        self.target_port.as_deref().unwrap_or(PORT_IN)
    }

    /// Whether the edge leaves a condition's true/false port
    pub fn is_branch_edge(&self) -> bool {
        matches!(self.branch(), PORT_TRUE | PORT_FALSE)
    }
}

/// A workflow graph document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            name: name.into(),
            description: None,
            nodes,
            edges,
        }
    }

    /// Load a graph document; `.json` files are read as JSON, anything else as YAML
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading graph {}", path.display()))?;
        let graph = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        Ok(graph)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn start_nodes(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_start()).collect()
    }

    pub fn incoming(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.source == node_id).collect()
    }
}
