//! Lifecycle driver for one source.
//!
//! For every declared tag, in declaration order, the runner walks
//! `NotStarted -> Begun -> Preparing -> Transforming -> Ended`:
//!
//! 1. `on_begin` hooks, in registration order
//! 2. open the record stream and pass it through `prepare_data`, if any
//! 3. the tag's transform, forwarding every resulting graph to the writer;
//!    skipped when no records remain
//! 4. `on_end` hooks, in registration order (also when no record was seen)
//!
//! After the last tag the writer is finalized and the minimum output counts
//! are checked. A runner runs once.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::IngestError;
use crate::hooks::{HookPlan, HookRegistry, HookSet, Stage, TransformKind};
use crate::model::KnowledgeGraph;
use crate::source::{RecordSource, RecordStream};
use crate::state::{MappingTable, TransformState};
use crate::writer::Writer;

/// What to do with a record that fails to read or transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop the run for the source.
    #[default]
    Abort,
    /// Log the failure, count it and continue with the next record.
    Skip,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Abort => write!(f, "abort"),
            ErrorPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(ErrorPolicy::Abort),
            "skip" => Ok(ErrorPolicy::Skip),
            other => Err(format!("Unknown error policy '{}' (expected abort or skip)", other)),
        }
    }
}

/// Lifecycle position of one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Begun,
    Preparing,
    Transforming,
    Ended,
}

/// Record source for one tag, with an optional error policy override.
pub struct TagInput {
    pub source: Box<dyn RecordSource>,
    pub error_policy: Option<ErrorPolicy>,
}

impl TagInput {
    pub fn new(source: impl RecordSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            error_policy: None,
        }
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = Some(policy);
        self
    }
}

impl fmt::Debug for TagInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagInput")
            .field("source", &self.source.describe())
            .field("error_policy", &self.error_policy)
            .finish()
    }
}

/// Outcome of one tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSummary {
    pub tag: String,
    /// Items pulled from the record source, before the prepare stage.
    pub records_read: usize,
    /// Records skipped under [`ErrorPolicy::Skip`].
    pub records_failed: usize,
    /// Graphs returned by the transform.
    pub graphs: usize,
    pub nodes: usize,
    pub edges: usize,
    #[serde(default)]
    pub transform_metadata: IndexMap<String, serde_json::Value>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub tags: Vec<TagSummary>,
    /// Nodes accepted by the writer.
    pub node_count: usize,
    /// Edges accepted by the writer.
    pub edge_count: usize,
}

impl RunSummary {
    pub fn tag(&self, tag: &str) -> Option<&TagSummary> {
        self.tags.iter().find(|t| t.tag == tag)
    }

    pub fn records_failed(&self) -> usize {
        self.tags.iter().map(|t| t.records_failed).sum()
    }
}

/// Drives the hooks of one source over its tag inputs.
pub struct Runner {
    source: String,
    plan: HookPlan,
    inputs: IndexMap<String, TagInput>,
    error_policy: ErrorPolicy,
    parameters: IndexMap<String, serde_json::Value>,
    mappings: HashMap<String, Arc<MappingTable>>,
    min_node_count: Option<usize>,
    min_edge_count: Option<usize>,
    phases: IndexMap<String, Phase>,
    has_run: bool,
}

impl Runner {
    /// Validate the hook registrations against the declared tags.
    ///
    /// # Arguments
    /// * `source` - Source name, used in log and error messages
    /// * `hooks` - The ingest's hook registrations
    /// * `inputs` - One record source per tag, in declaration order
    ///
    /// # Errors
    /// Returns a configuration error when a tag has no transform or a hook
    /// names an undeclared tag. Nothing is read.
    pub fn new(
        source: impl Into<String>,
        hooks: &HookRegistry,
        inputs: IndexMap<String, TagInput>,
    ) -> Result<Self, IngestError> {
        let tags: Vec<String> = inputs.keys().cloned().collect();
        let plan = hooks.build(&tags)?;
        let phases = tags.iter().map(|t| (t.clone(), Phase::NotStarted)).collect();

        Ok(Self {
            source: source.into(),
            plan,
            inputs,
            error_policy: ErrorPolicy::default(),
            parameters: IndexMap::new(),
            mappings: HashMap::new(),
            min_node_count: None,
            min_edge_count: None,
            phases,
            has_run: false,
        })
    }

    /// Default error policy for tags without their own.
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_parameters(mut self, parameters: IndexMap<String, serde_json::Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_mapping(mut self, name: impl Into<String>, table: MappingTable) -> Self {
        self.mappings.insert(name.into(), Arc::new(table));
        self
    }

    /// Fail the run when fewer nodes or edges than this were written.
    pub fn with_min_counts(mut self, nodes: Option<usize>, edges: Option<usize>) -> Self {
        self.min_node_count = nodes;
        self.min_edge_count = edges;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn phase(&self, tag: &str) -> Option<Phase> {
        self.phases.get(tag).copied()
    }

    /// Verify every tag's input without reading records.
    pub fn check_inputs(&self) -> Result<(), IngestError> {
        for (tag, input) in &self.inputs {
            input.source.check(tag)?;
        }
        Ok(())
    }

    /// Run every tag and finalize the writer.
    ///
    /// # Errors
    /// * [`IngestError::Lifecycle`] when called a second time
    /// * input check failures, before any hook runs
    /// * hook failures wrapped in [`IngestError::Stage`]
    /// * [`IngestError::MinimumCount`] after the writer is finalized
    pub fn run(&mut self, writer: &mut dyn Writer) -> Result<RunSummary, IngestError> {
        if self.has_run {
            return Err(IngestError::Lifecycle(format!(
                "Runner for source '{}' has already run",
                self.source
            )));
        }
        self.has_run = true;
        self.check_inputs()?;

        tracing::info!(
            "Running source '{}' over {} tag(s)",
            self.source,
            self.plan.len()
        );

        let tags: Vec<String> = self.inputs.keys().cloned().collect();
        let mut summaries = Vec::with_capacity(tags.len());
        for tag in &tags {
            summaries.push(self.run_tag(tag, writer)?);
        }

        writer.finalize()?;

        let summary = RunSummary {
            source: self.source.clone(),
            tags: summaries,
            node_count: writer.node_count(),
            edge_count: writer.edge_count(),
        };

        check_minimum("nodes", self.min_node_count, summary.node_count)?;
        check_minimum("edges", self.min_edge_count, summary.edge_count)?;

        tracing::info!(
            "Source '{}' done: {} nodes, {} edges",
            self.source,
            summary.node_count,
            summary.edge_count
        );
        Ok(summary)
    }

    fn run_tag(&mut self, tag: &str, writer: &mut dyn Writer) -> Result<TagSummary, IngestError> {
        let hooks: HookSet = self
            .plan
            .get(tag)
            .cloned()
            .ok_or_else(|| IngestError::Lifecycle(format!("No hooks planned for tag '{}'", tag)))?;
        let policy = self
            .inputs
            .get(tag)
            .and_then(|input| input.error_policy)
            .unwrap_or(self.error_policy);

        let mut state = self.new_state(tag);
        let mut summary = TagSummary {
            tag: tag.to_string(),
            ..TagSummary::default()
        };
        let read = Rc::new(Cell::new(0usize));
        let failed = Rc::new(Cell::new(0usize));

        self.set_phase(tag, Phase::Begun);
        for hook in &hooks.begin {
            hook.call(&mut state)
                .map_err(|e| e.at_stage(&self.source, tag, Stage::Begin, None))?;
        }

        let records = self.open(tag, &read, &failed, policy)?;

        self.set_phase(tag, Phase::Preparing);
        let records = match &hooks.prepare {
            Some(prepare) => prepare
                .prepare(records, &mut state)
                .map_err(|e| e.at_stage(&self.source, tag, Stage::Prepare, None))?,
            None => Some(records),
        };
        let records = match records {
            Some(records) => {
                let mut records = records.peekable();
                if records.peek().is_some() {
                    Some(Box::new(records) as RecordStream)
                } else {
                    tracing::info!("[{}/{}] no records to transform", self.source, tag);
                    None
                }
            }
            None => {
                tracing::info!("[{}/{}] prepare stage dropped the remaining data", self.source, tag);
                None
            }
        };

        self.set_phase(tag, Phase::Transforming);
        if let Some(records) = records {
            let context = TagContext {
                source: &self.source,
                tag,
                policy,
                failed: &failed,
            };
            match &hooks.transform {
                TransformKind::PerRecord(transform) => {
                    for (index, item) in records.enumerate() {
                        let (result, origin) = match item {
                            Ok(record) => (
                                transform.transform_record(&record, &mut state),
                                record.origin().cloned(),
                            ),
                            Err(e) => (Err(e), None),
                        };
                        match result {
                            Ok(Some(graph)) => emit(writer, graph, &mut summary)?,
                            Ok(None) => {}
                            Err(e) => context.handle(
                                e.at_stage(
                                    &self.source,
                                    tag,
                                    Stage::TransformRecord,
                                    Some(index + 1),
                                )
                                .with_origin(origin.as_ref()),
                            )?,
                        }
                    }
                }
                TransformKind::Batch(transform) => {
                    let graphs = transform
                        .transform(records, &mut state)
                        .map_err(|e| e.at_stage(&self.source, tag, Stage::Transform, None))?;
                    for item in graphs {
                        match item {
                            Ok(graph) => emit(writer, graph, &mut summary)?,
                            Err(e) => context.handle(e.at_stage(
                                &self.source,
                                tag,
                                Stage::Transform,
                                None,
                            ))?,
                        }
                    }
                }
            }
        }

        for hook in &hooks.end {
            hook.call(&mut state)
                .map_err(|e| e.at_stage(&self.source, tag, Stage::End, None))?;
        }
        self.set_phase(tag, Phase::Ended);

        summary.records_read = read.get();
        summary.records_failed = failed.get();
        summary.transform_metadata = state.into_transform_metadata();

        tracing::info!(
            "[{}/{}] {} records read, {} failed, {} graphs, {} nodes, {} edges",
            self.source,
            tag,
            summary.records_read,
            summary.records_failed,
            summary.graphs,
            summary.nodes,
            summary.edges
        );
        Ok(summary)
    }

    fn new_state(&self, tag: &str) -> TransformState {
        self.mappings.iter().fold(
            TransformState::new(self.source.clone(), tag).with_parameters(self.parameters.clone()),
            |state, (name, table)| state.with_mapping(name.clone(), Arc::clone(table)),
        )
    }

    /// Open the tag's records, counting reads and, under the skip policy,
    /// dropping unreadable records.
    fn open(
        &self,
        tag: &str,
        read: &Rc<Cell<usize>>,
        failed: &Rc<Cell<usize>>,
        policy: ErrorPolicy,
    ) -> Result<RecordStream, IngestError> {
        let input = self
            .inputs
            .get(tag)
            .ok_or_else(|| IngestError::Lifecycle(format!("No input for tag '{}'", tag)))?;
        tracing::debug!("[{}/{}] reading {}", self.source, tag, input.source.describe());

        let counter = Rc::clone(read);
        let stream: RecordStream = Box::new(
            input
                .source
                .open()?
                .inspect(move |_| counter.set(counter.get() + 1)),
        );

        if policy == ErrorPolicy::Abort {
            return Ok(stream);
        }

        let source = self.source.clone();
        let tag = tag.to_string();
        let failed = Rc::clone(failed);
        Ok(Box::new(stream.enumerate().filter_map(move |(index, item)| {
            match item {
                Err(e) if e.is_record_level() => {
                    tracing::warn!("[{}/{}] skipping record {}: {}", source, tag, index + 1, e);
                    failed.set(failed.get() + 1);
                    None
                }
                other => Some(other),
            }
        })))
    }

    fn set_phase(&mut self, tag: &str, phase: Phase) {
        tracing::debug!("[{}/{}] {:?}", self.source, tag, phase);
        self.phases.insert(tag.to_string(), phase);
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("source", &self.source)
            .field("plan", &self.plan)
            .field("inputs", &self.inputs)
            .field("error_policy", &self.error_policy)
            .field("phases", &self.phases)
            .field("has_run", &self.has_run)
            .finish()
    }
}

struct TagContext<'a> {
    source: &'a str,
    tag: &'a str,
    policy: ErrorPolicy,
    failed: &'a Rc<Cell<usize>>,
}

impl TagContext<'_> {
    /// Skip a record-level failure under the skip policy, otherwise abort.
    fn handle(&self, error: IngestError) -> Result<(), IngestError> {
        if self.policy == ErrorPolicy::Skip && error.is_record_level() {
            tracing::warn!("[{}/{}] skipping: {}", self.source, self.tag, error);
            self.failed.set(self.failed.get() + 1);
            Ok(())
        } else {
            Err(error)
        }
    }
}

fn emit(
    writer: &mut dyn Writer,
    graph: KnowledgeGraph,
    summary: &mut TagSummary,
) -> Result<(), IngestError> {
    summary.graphs += 1;
    summary.nodes += graph.nodes.len();
    summary.edges += graph.edges.len();
    writer.write(&graph)?;
    Ok(())
}

fn check_minimum(kind: &'static str, expected: Option<usize>, actual: usize) -> Result<(), IngestError> {
    match expected {
        Some(expected) if actual < expected => Err(IngestError::MinimumCount {
            kind,
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}
