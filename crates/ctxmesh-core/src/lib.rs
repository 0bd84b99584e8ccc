#![deny(unsafe_code)]

//! ctxmesh core: a runtime registry and resolution engine for context
//! producers.
//!
//! Widgets produce context information, interpreters transform it and
//! aggregators collect it. The [`Discoverer`] registers all of them and wires
//! each aggregator to whatever can satisfy the kinds it declares, subscribing
//! it to widgets and binding interpreters as interpretations. At runtime
//! widgets notify their subscribers, and aggregators persist what they
//! receive and run the interpretation cascades it triggers.

use std::future::Future;
use std::pin::Pin;

/// A type-erased, `Send` boxed future, the return type of async trait
/// methods used through `dyn Trait`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Widgets, interpreters, aggregators and their shared identity.
pub mod component;
/// Context information items, kind matching and kind-unique lists.
pub mod context;
/// Component registry, item factory and the resolution algorithm.
pub mod discoverer;
/// Persistence backends for aggregated data.
pub mod storage;
/// Callbacks, subscribers and notification conditions.
pub mod subscription;

pub use component::{
    Aggregator, ComponentDescription, ComponentHandle, ComponentId, Interpreter, KindDescription, Role,
    Widget,
};
pub use context::{ContextInformation, ContextInformationList, Parameter, ParameterValue};
pub use discoverer::{ComponentClass, Discoverer, DiscovererError};
pub use storage::{InMemoryStorage, Storage, StorageError};
