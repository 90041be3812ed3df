//! Hook registration for ingest plugins.
//!
//! An ingest registers callables against lifecycle stages, optionally scoped
//! to a tag. [`HookRegistry::build`] validates the registrations against the
//! tags a source declares and produces a [`HookPlan`]: one [`HookSet`] per
//! tag, each holding exactly one transform, either per-record or batch.
//!
//! ```
//! use kg_ingest::{HookRegistry, KnowledgeGraph, Record, TransformState, IngestError};
//!
//! fn transform(record: &Record, state: &mut TransformState) -> Result<Option<KnowledgeGraph>, IngestError> {
//!     state.increment("seen");
//!     Ok(None)
//! }
//!
//! let mut hooks = HookRegistry::new();
//! hooks.transform_record(None, transform).unwrap();
//! let plan = hooks.build(&["default".to_string()]).unwrap();
//! assert!(plan.get("default").is_some());
//! ```

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

use crate::error::IngestError;
use crate::model::KnowledgeGraph;
use crate::record::Record;
use crate::source::RecordStream;
use crate::state::TransformState;

/// Lazy sequence of transform results. May borrow the run's state.
pub type GraphStream<'s> = Box<dyn Iterator<Item = Result<KnowledgeGraph, IngestError>> + 's>;

/// Lifecycle stage a hook is registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Begin,
    Prepare,
    TransformRecord,
    Transform,
    End,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Begin => "on_begin",
            Stage::Prepare => "prepare_data",
            Stage::TransformRecord => "transform_record",
            Stage::Transform => "transform",
            Stage::End => "on_end",
        };
        write!(f, "{}", name)
    }
}

/// Hook run once at the start or end of a tag.
pub trait LifecycleHook {
    fn call(&self, state: &mut TransformState) -> Result<(), IngestError>;
}

impl<F> LifecycleHook for F
where
    F: Fn(&mut TransformState) -> Result<(), IngestError>,
{
    fn call(&self, state: &mut TransformState) -> Result<(), IngestError> {
        self(state)
    }
}

/// Whole-stream preprocessing. Returning `Ok(None)` drops the remaining data for the tag.
pub trait PrepareHook {
    fn prepare(
        &self,
        records: RecordStream,
        state: &mut TransformState,
    ) -> Result<Option<RecordStream>, IngestError>;
}

impl<F> PrepareHook for F
where
    F: Fn(RecordStream, &mut TransformState) -> Result<Option<RecordStream>, IngestError>,
{
    fn prepare(
        &self,
        records: RecordStream,
        state: &mut TransformState,
    ) -> Result<Option<RecordStream>, IngestError> {
        self(records, state)
    }
}

/// One record in, zero or one graph out.
pub trait RecordTransform {
    fn transform_record(
        &self,
        record: &Record,
        state: &mut TransformState,
    ) -> Result<Option<KnowledgeGraph>, IngestError>;
}

impl<F> RecordTransform for F
where
    F: Fn(&Record, &mut TransformState) -> Result<Option<KnowledgeGraph>, IngestError>,
{
    fn transform_record(
        &self,
        record: &Record,
        state: &mut TransformState,
    ) -> Result<Option<KnowledgeGraph>, IngestError> {
        self(record, state)
    }
}

/// The whole prepared stream in, a lazy sequence of graphs out.
///
/// Implementations may stream one graph per record, emit batches, or build
/// everything and return a single graph.
pub trait BatchTransform {
    fn transform<'s>(
        &self,
        records: RecordStream,
        state: &'s mut TransformState,
    ) -> Result<GraphStream<'s>, IngestError>;
}

impl<F> BatchTransform for F
where
    F: for<'s> Fn(RecordStream, &'s mut TransformState) -> Result<GraphStream<'s>, IngestError>,
{
    fn transform<'s>(
        &self,
        records: RecordStream,
        state: &'s mut TransformState,
    ) -> Result<GraphStream<'s>, IngestError> {
        self(records, state)
    }
}

/// A registered callable, tagged by the stage it runs in.
#[derive(Clone)]
pub enum Hook {
    Begin(Rc<dyn LifecycleHook>),
    Prepare(Rc<dyn PrepareHook>),
    TransformRecord(Rc<dyn RecordTransform>),
    Transform(Rc<dyn BatchTransform>),
    End(Rc<dyn LifecycleHook>),
}

impl Hook {
    pub fn stage(&self) -> Stage {
        match self {
            Hook::Begin(_) => Stage::Begin,
            Hook::Prepare(_) => Stage::Prepare,
            Hook::TransformRecord(_) => Stage::TransformRecord,
            Hook::Transform(_) => Stage::Transform,
            Hook::End(_) => Stage::End,
        }
    }

    pub fn begin(hook: impl LifecycleHook + 'static) -> Self {
        Hook::Begin(Rc::new(hook))
    }

    pub fn prepare(hook: impl PrepareHook + 'static) -> Self {
        Hook::Prepare(Rc::new(hook))
    }

    pub fn transform_record(hook: impl RecordTransform + 'static) -> Self {
        Hook::TransformRecord(Rc::new(hook))
    }

    pub fn transform(hook: impl BatchTransform + 'static) -> Self {
        Hook::Transform(Rc::new(hook))
    }

    pub fn end(hook: impl LifecycleHook + 'static) -> Self {
        Hook::End(Rc::new(hook))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook({})", self.stage())
    }
}

/// The transform a tag runs. Exactly one per tag.
#[derive(Clone)]
pub enum TransformKind {
    PerRecord(Rc<dyn RecordTransform>),
    Batch(Rc<dyn BatchTransform>),
}

impl TransformKind {
    pub fn stage(&self) -> Stage {
        match self {
            TransformKind::PerRecord(_) => Stage::TransformRecord,
            TransformKind::Batch(_) => Stage::Transform,
        }
    }
}

/// Validated hooks for one tag.
#[derive(Clone)]
pub struct HookSet {
    pub begin: Vec<Rc<dyn LifecycleHook>>,
    pub prepare: Option<Rc<dyn PrepareHook>>,
    pub transform: TransformKind,
    pub end: Vec<Rc<dyn LifecycleHook>>,
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("begin", &self.begin.len())
            .field("prepare", &self.prepare.is_some())
            .field("transform", &self.transform.stage())
            .field("end", &self.end.len())
            .finish()
    }
}

/// Validated hooks for every tag of a source, in tag declaration order.
#[derive(Debug, Clone, Default)]
pub struct HookPlan {
    sets: IndexMap<String, HookSet>,
}

impl HookPlan {
    pub fn get(&self, tag: &str) -> Option<&HookSet> {
        self.sets.get(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &String> {
        self.sets.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HookSet)> {
        self.sets.iter()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Registrations for one ingest, before validation.
#[derive(Debug, Default)]
pub struct HookRegistry {
    /// `(tag, hook)` in registration order; `None` applies to every tag.
    hooks: Vec<(Option<String>, Hook)>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for a tag, or for every tag when `tag` is `None`.
    ///
    /// # Errors
    /// Fails immediately when the registration conflicts with an earlier one:
    /// a per-record and a batch transform for overlapping tags, or a second
    /// transform or prepare hook for the same tag.
    pub fn register(&mut self, tag: Option<&str>, hook: Hook) -> Result<&mut Self, IngestError> {
        let stage = hook.stage();
        if matches!(stage, Stage::Prepare | Stage::TransformRecord | Stage::Transform) {
            if let Some((existing_tag, existing)) = self
                .hooks
                .iter()
                .find(|(t, h)| overlaps(t.as_deref(), tag) && conflicts(h.stage(), stage))
            {
                return Err(IngestError::config(format!(
                    "{} for {} conflicts with {} already registered for {}",
                    stage,
                    describe_tag(tag),
                    existing.stage(),
                    describe_tag(existing_tag.as_deref()),
                )));
            }
        }

        tracing::debug!("Registered {} hook for {}", stage, describe_tag(tag));
        self.hooks.push((tag.map(str::to_string), hook));
        Ok(self)
    }

    pub fn on_begin(
        &mut self,
        tag: Option<&str>,
        hook: impl LifecycleHook + 'static,
    ) -> Result<&mut Self, IngestError> {
        self.register(tag, Hook::begin(hook))
    }

    pub fn prepare_data(
        &mut self,
        tag: Option<&str>,
        hook: impl PrepareHook + 'static,
    ) -> Result<&mut Self, IngestError> {
        self.register(tag, Hook::prepare(hook))
    }

    pub fn transform_record(
        &mut self,
        tag: Option<&str>,
        hook: impl RecordTransform + 'static,
    ) -> Result<&mut Self, IngestError> {
        self.register(tag, Hook::transform_record(hook))
    }

    pub fn transform(
        &mut self,
        tag: Option<&str>,
        hook: impl BatchTransform + 'static,
    ) -> Result<&mut Self, IngestError> {
        self.register(tag, Hook::transform(hook))
    }

    pub fn on_end(
        &mut self,
        tag: Option<&str>,
        hook: impl LifecycleHook + 'static,
    ) -> Result<&mut Self, IngestError> {
        self.register(tag, Hook::end(hook))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Validate registrations against the declared tags and build the plan.
    ///
    /// # Errors
    /// * a hook names a tag that is not declared
    /// * a declared tag ends up with no transform
    pub fn build(&self, tags: &[String]) -> Result<HookPlan, IngestError> {
        if tags.is_empty() {
            return Err(IngestError::config("No tags declared"));
        }

        for (tag, hook) in &self.hooks {
            if let Some(tag) = tag {
                if !tags.contains(tag) {
                    return Err(IngestError::config(format!(
                        "{} registered for undeclared tag '{}'",
                        hook.stage(),
                        tag
                    )));
                }
            }
        }

        let mut sets = IndexMap::new();
        for tag in tags {
            if sets.contains_key(tag) {
                return Err(IngestError::config(format!("Tag '{}' declared twice", tag)));
            }

            let mut begin = Vec::new();
            let mut prepare = None;
            let mut transform = None;
            let mut end = Vec::new();

            let applicable = self
                .hooks
                .iter()
                .filter(|(t, _)| t.as_deref().map_or(true, |t| t == tag.as_str()))
                .map(|(_, hook)| hook);

            for hook in applicable {
                match hook {
                    Hook::Begin(h) => begin.push(Rc::clone(h)),
                    Hook::Prepare(h) => prepare = Some(Rc::clone(h)),
                    Hook::TransformRecord(h) => {
                        transform = Some(TransformKind::PerRecord(Rc::clone(h)))
                    }
                    Hook::Transform(h) => transform = Some(TransformKind::Batch(Rc::clone(h))),
                    Hook::End(h) => end.push(Rc::clone(h)),
                }
            }

            let transform = transform.ok_or_else(|| {
                IngestError::config(format!(
                    "No transform or transform_record registered for tag '{}'",
                    tag
                ))
            })?;

            sets.insert(
                tag.clone(),
                HookSet {
                    begin,
                    prepare,
                    transform,
                    end,
                },
            );
        }

        Ok(HookPlan { sets })
    }
}

fn overlaps(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn conflicts(existing: Stage, new: Stage) -> bool {
    match (existing, new) {
        (Stage::Prepare, Stage::Prepare) => true,
        (Stage::TransformRecord | Stage::Transform, Stage::TransformRecord | Stage::Transform) => {
            true
        }
        _ => false,
    }
}

fn describe_tag(tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("tag '{}'", tag),
        None => "all tags".to_string(),
    }
}
