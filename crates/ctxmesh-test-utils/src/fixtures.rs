//! Fixture widget sources and interpreter transforms.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use ctxmesh_core::BoxFuture;
use ctxmesh_core::ContextInformationList;
use ctxmesh_core::component::{InterpreterError, Transform, WidgetError, WidgetSource};

type TransformFn =
    dyn Fn(&ContextInformationList, &ContextInformationList) -> Result<ContextInformationList, InterpreterError>
        + Send
        + Sync;

/// A transform backed by a closure that counts its invocations.
#[derive(Clone)]
pub struct FnTransform {
    f: Arc<TransformFn>,
    calls: Arc<AtomicUsize>,
}

impl FnTransform {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ContextInformationList, &ContextInformationList) -> Result<ContextInformationList, InterpreterError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            f: Arc::new(f),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emit every requested output with `value`.
    pub fn constant(value: serde_json::Value) -> Self {
        Self::new(move |_, outputs| Ok(outputs.iter().map(|o| o.clone().with_value(value.clone())).collect()))
    }

    /// Emit every requested output carrying the sum of all numeric inputs.
    pub fn sum() -> Self {
        Self::new(|inputs, outputs| {
            let total: f64 = inputs.iter().filter_map(|i| i.value().as_f64()).sum();
            Ok(outputs.iter().map(|o| o.clone().with_value(total)).collect())
        })
    }

    /// A shared handle on the invocation count, valid after the transform is
    /// moved into an interpreter.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transform for FnTransform {
    fn interpret_data<'a>(
        &'a self,
        inputs: &'a ContextInformationList,
        outputs: &'a ContextInformationList,
    ) -> BoxFuture<'a, Result<ContextInformationList, InterpreterError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = (self.f)(inputs, outputs);
        Box::pin(async move { result })
    }
}

/// A widget source replaying a fixed sequence of acquisitions. Once the
/// sequence is exhausted every acquisition fails.
#[derive(Default)]
pub struct SequenceSource {
    queue: Mutex<VecDeque<ContextInformationList>>,
}

impl SequenceSource {
    pub fn new(batches: impl IntoIterator<Item = ContextInformationList>) -> Self {
        Self {
            queue: Mutex::new(batches.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl WidgetSource for SequenceSource {
    fn query_generator<'a>(
        &'a self,
        _outputs: &'a ContextInformationList,
    ) -> BoxFuture<'a, Result<ContextInformationList, WidgetError>> {
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        Box::pin(async move { next.ok_or_else(|| WidgetError::Acquisition("sequence exhausted".into())) })
    }
}

/// A widget source that always fails.
pub struct FailingSource;

impl WidgetSource for FailingSource {
    fn query_generator<'a>(
        &'a self,
        _outputs: &'a ContextInformationList,
    ) -> BoxFuture<'a, Result<ContextInformationList, WidgetError>> {
        Box::pin(async { Err(WidgetError::Acquisition("sensor offline".into())) })
    }
}
