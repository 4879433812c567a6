use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::filename::FileNameGrammar;

pub const TRACE_RECORD_SCHEMA_VERSION: &str = "v1";
pub const MAX_DIMENSION_VALUES: usize = 1_000;
pub const MAX_TOTAL_PARAMETER_POINTS: usize = 100_000;
pub const MAX_TRIALS: usize = 10_000;
pub const DEFAULT_TRIALS: usize = 10;
pub const DEFAULT_WARMUPS: usize = 1;
pub const TRIAL_FIELD: &str = "trial";

pub type Args = BTreeMap<String, Value>;
pub type Context = BTreeMap<String, Value>;
pub type Dimensions = BTreeMap<String, Vec<i64>>;

/// The payload every workflow step receives and forwards.
///
/// `workflow` lists the functions still to run after the current one; the
/// chain invariant is that each hop removes exactly its head.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowEnvelope {
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub workflow: VecDeque<String>,
    #[serde(default)]
    pub context: Context,
}

impl WorkflowEnvelope {
    pub fn new<I, S>(args: Args, workflow: I, context: Context) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args,
            workflow: workflow.into_iter().map(Into::into).collect(),
            context,
        }
    }

    pub fn remaining_len(&self) -> usize {
        self.workflow.len()
    }

    pub fn trial(&self) -> Option<i64> {
        context_trial(&self.context)
    }

    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reads `context.metadata.trial`; warm-up invocations carry no trial.
pub fn context_trial(context: &Context) -> Option<i64> {
    context.get("metadata")?.get(TRIAL_FIELD)?.as_i64()
}

pub fn experiment_context(trial: Option<i64>, time: i64) -> Context {
    let metadata = match trial {
        Some(trial) => json!({ TRIAL_FIELD: trial }),
        None => json!({}),
    };
    Context::from([
        ("metadata".to_string(), metadata),
        ("time".to_string(), Value::from(time)),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedRequest {
    pub function: String,
    pub payload: WorkflowEnvelope,
}

/// One completed invocation. Timestamps are nanoseconds since the epoch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub launched: i64,
    pub completed: i64,
    pub request: RecordedRequest,
}

impl ExecutionRecord {
    pub fn runtime_ns(&self) -> i64 {
        self.completed - self.launched
    }

    pub fn function(&self) -> &str {
        &self.request.function
    }

    pub fn trial(&self) -> Option<i64> {
        self.request.payload.trial()
    }

    pub fn remaining_workflow_len(&self) -> usize {
        self.request.payload.remaining_len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExecutionPolicy {
    #[serde(rename = "baseline")]
    Baseline,
    #[serde(rename = "ext_sync")]
    ExternalSynchrony,
}

impl ExecutionPolicy {
    pub const ALL: [ExecutionPolicy; 2] = [Self::Baseline, Self::ExternalSynchrony];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::ExternalSynchrony => "ext_sync",
        }
    }
}

impl fmt::Display for ExecutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionPolicy {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "baseline" => Ok(Self::Baseline),
            "ext_sync" | "ext-sync" | "external_synchrony" => Ok(Self::ExternalSynchrony),
            other => Err(ValidationError::new(format!(
                "unknown execution policy '{other}' (expected baseline or ext_sync)"
            ))),
        }
    }
}

/// How step keys are namespaced in the shared store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyScope {
    #[default]
    Shared,
    PerTrial,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunContext {
    pub family: String,
    pub schema_version: String,
    pub plan_fingerprint: String,
    pub started_at: String,
    pub policies: Vec<ExecutionPolicy>,
}

/// A benchmark family as submitted by the operator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentPlan {
    pub family: String,
    pub workflow: Vec<String>,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub fixed_args: Args,
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default = "default_warmups")]
    pub warmups: usize,
    #[serde(default = "default_policies")]
    pub policies: Vec<ExecutionPolicy>,
    #[serde(default)]
    pub key_scope: KeyScope,
    pub file_name_pattern: FileNameGrammar,
    #[serde(default)]
    pub store_latency_dimension: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedPlan {
    pub family: String,
    pub entry_function: String,
    pub continuation: Vec<String>,
    pub dimensions: Dimensions,
    pub fixed_args: Args,
    pub total_points: usize,
    pub trials: usize,
    pub warmups: usize,
    pub policies: Vec<ExecutionPolicy>,
    pub key_scope: KeyScope,
    pub file_name_pattern: FileNameGrammar,
    pub store_latency_dimension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

pub fn default_trials() -> usize {
    DEFAULT_TRIALS
}

pub fn default_warmups() -> usize {
    DEFAULT_WARMUPS
}

pub fn default_policies() -> Vec<ExecutionPolicy> {
    ExecutionPolicy::ALL.to_vec()
}

pub fn normalize_plan(plan: ExperimentPlan) -> Result<NormalizedPlan, ValidationError> {
    let family = plan.family.trim().to_string();
    if family.is_empty() {
        return Err(ValidationError::new("family cannot be empty"));
    }
    if !family
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::new(format!(
            "family '{family}' may only contain ASCII letters, digits, '_' and '-'"
        )));
    }

    let mut workflow = plan.workflow.into_iter().map(|name| name.trim().to_string());
    let entry_function = workflow
        .next()
        .ok_or_else(|| ValidationError::new("workflow must name at least one function"))?;
    let continuation: Vec<String> = workflow.collect();
    if entry_function.is_empty() || continuation.iter().any(String::is_empty) {
        return Err(ValidationError::new(
            "workflow function names must be non-empty strings",
        ));
    }

    let mut total_points = 1usize;
    for (name, values) in &plan.dimensions {
        if name.trim().is_empty() {
            return Err(ValidationError::new(
                "dimension names must be non-empty strings",
            ));
        }
        if name == TRIAL_FIELD {
            return Err(ValidationError::new(
                "'trial' is reserved and cannot be used as a dimension",
            ));
        }
        if values.is_empty() {
            return Err(ValidationError::new(format!(
                "Dimension '{name}' must be a non-empty list"
            )));
        }
        if values.len() > MAX_DIMENSION_VALUES {
            return Err(ValidationError::new(format!(
                "Dimension '{name}' exceeds MAX_DIMENSION_VALUES={MAX_DIMENSION_VALUES}"
            )));
        }
        if plan.fixed_args.contains_key(name) {
            return Err(ValidationError::new(format!(
                "Dimension '{name}' is also set in fixed_args"
            )));
        }
        total_points = total_points.saturating_mul(values.len());
        if total_points > MAX_TOTAL_PARAMETER_POINTS {
            return Err(ValidationError::new(format!(
                "Parameter space is too large (>{MAX_TOTAL_PARAMETER_POINTS} points)"
            )));
        }
    }

    if plan.trials == 0 {
        return Err(ValidationError::new("trials must be a positive integer"));
    }
    if plan.trials > MAX_TRIALS {
        return Err(ValidationError::new(format!(
            "trials exceeds MAX_TRIALS={MAX_TRIALS}"
        )));
    }

    let mut policies = plan.policies;
    policies.sort_unstable();
    policies.dedup();
    if policies.is_empty() {
        return Err(ValidationError::new("policies cannot be empty"));
    }

    let grammar = plan.file_name_pattern;
    if grammar.has_wildcard() {
        return Err(ValidationError::new(
            "file_name_pattern used for writing traces cannot contain '*'",
        ));
    }
    if !grammar.has_label(TRIAL_FIELD) {
        return Err(ValidationError::new(
            "file_name_pattern must contain a {trial} field",
        ));
    }
    for label in grammar.labels() {
        if label != TRIAL_FIELD && !plan.dimensions.contains_key(label) {
            return Err(ValidationError::new(format!(
                "file_name_pattern field '{{{label}}}' is not a dimension"
            )));
        }
    }
    for name in plan.dimensions.keys() {
        if !grammar.has_label(name) {
            return Err(ValidationError::new(format!(
                "Dimension '{name}' is missing from file_name_pattern"
            )));
        }
    }

    if let Some(dimension) = &plan.store_latency_dimension {
        if !plan.dimensions.contains_key(dimension) {
            return Err(ValidationError::new(format!(
                "store_latency_dimension '{dimension}' is not a dimension"
            )));
        }
        if plan.dimensions[dimension].iter().any(|value| *value < 0) {
            return Err(ValidationError::new(format!(
                "Dimension '{dimension}' is a store latency and must be non-negative"
            )));
        }
    }

    Ok(NormalizedPlan {
        family,
        entry_function,
        continuation,
        dimensions: plan.dimensions,
        fixed_args: plan.fixed_args,
        total_points,
        trials: plan.trials,
        warmups: plan.warmups,
        policies,
        key_scope: plan.key_scope,
        file_name_pattern: grammar,
        store_latency_dimension: plan.store_latency_dimension,
    })
}

pub fn plan_fingerprint(plan: &NormalizedPlan) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stable_contract_json(plan));
    format!("{:x}", hasher.finalize())
}

pub fn stable_contract_json(value: impl Serialize) -> String {
    serde_json::to_string(&value).expect("serialization of contract value should not fail")
}
