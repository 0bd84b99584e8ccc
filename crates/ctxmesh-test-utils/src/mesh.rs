//! A prewired mesh for end-to-end tests.
//!
//! Two widgets `W1` (out `A`) and `W2` (out `B`), an interpreter `I1`
//! (in `A`, `B`; out `C`) summing its inputs, and optionally an aggregator
//! desiring `C` backed by in-memory storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ctxmesh_core::component::{StaticSource, WidgetSource};
use ctxmesh_core::storage::{FlushPolicy, InMemoryStorage, Storage};
use ctxmesh_core::{Aggregator, ContextInformation, ContextInformationList, Discoverer, Interpreter, Widget};

use crate::fixtures::FnTransform;

pub const DATA_TYPE: &str = "INTEGER";

pub struct TestMesh {
    pub discoverer: Arc<Discoverer>,
    pub w1: Arc<Widget>,
    pub w2: Option<Arc<Widget>>,
    pub i1: Arc<Interpreter>,
    pub storage: Arc<InMemoryStorage>,
    i1_calls: Arc<AtomicUsize>,
}

impl TestMesh {
    /// The full mesh: both widgets and the interpreter.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// The mesh without `W2`, so nothing can supply `B`.
    pub fn without_b() -> Self {
        Self::build(false)
    }

    fn build(with_b: bool) -> Self {
        let discoverer = Discoverer::new();
        let w1 = Widget::new(
            &discoverer,
            "W1",
            kinds(&discoverer, &["A"]),
            StaticSource::new(vec![kind(&discoverer, "A").with_value(2)].into()),
        );
        let w2 = with_b.then(|| {
            Widget::new(
                &discoverer,
                "W2",
                kinds(&discoverer, &["B"]),
                StaticSource::new(vec![kind(&discoverer, "B").with_value(3)].into()),
            )
        });
        let transform = FnTransform::sum();
        let i1_calls = transform.counter();
        let i1 = Interpreter::new(
            &discoverer,
            "I1",
            kinds(&discoverer, &["A", "B"]),
            kinds(&discoverer, &["C"]),
            transform,
        );
        let storage = Arc::new(InMemoryStorage::new(FlushPolicy::default()));
        Self {
            discoverer,
            w1,
            w2,
            i1,
            storage,
            i1_calls,
        }
    }

    /// Construct the aggregator desiring `C`.
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Aggregator::new(
            &self.discoverer,
            "Aggregator",
            kinds(&self.discoverer, &["C"]),
            Some(self.storage.clone() as Arc<dyn Storage>),
        )
    }

    pub fn kind(&self, name: &str) -> ContextInformation {
        kind(&self.discoverer, name)
    }

    /// How often `I1` has run.
    pub fn i1_calls(&self) -> usize {
        self.i1_calls.load(Ordering::SeqCst)
    }
}

impl Default for TestMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a kind of [`DATA_TYPE`] through the discoverer.
pub fn kind(discoverer: &Discoverer, name: &str) -> ContextInformation {
    discoverer.build_context_information(name, DATA_TYPE, Vec::new())
}

pub fn kinds(discoverer: &Discoverer, names: &[&str]) -> ContextInformationList {
    names.iter().map(|n| kind(discoverer, n)).collect()
}

/// Register a widget named `name` with the given source.
pub fn widget(
    discoverer: &Arc<Discoverer>,
    name: &str,
    outputs: &[&str],
    source: impl WidgetSource + 'static,
) -> Arc<Widget> {
    Widget::new(discoverer, name, kinds(discoverer, outputs), source)
}
