//! Widgets, autonomous producers of context information.
//!
//! A widget owns its current outputs and publishes them to subscribers.
//! Acquisition is delegated to a [`WidgetSource`], the hook concrete sensors
//! implement.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use ctxmesh_config::WidgetConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Component, ComponentDescription, ComponentHandle, ComponentId, KindDescription, Queryable, Role};
use crate::BoxFuture;
use crate::context::ContextInformationList;
use crate::discoverer::Discoverer;
use crate::subscription::{CallbackList, Subscriber};

/// Errors from widget acquisition.
#[derive(Debug, thiserror::Error)]
pub enum WidgetError {
    #[error("required hook not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("acquisition failed: {0}")]
    Acquisition(String),
}

/// The acquisition hook a concrete widget implements.
pub trait WidgetSource: Send + Sync {
    /// Acquire fresh values for `outputs` (the widget's output kinds).
    fn query_generator<'a>(
        &'a self,
        outputs: &'a ContextInformationList,
    ) -> BoxFuture<'a, Result<ContextInformationList, WidgetError>> {
        let _ = outputs;
        Box::pin(async { Err(WidgetError::NotImplemented("query_generator")) })
    }

    /// Extra callbacks besides `UPDATE`.
    fn callbacks(&self, outputs: &ContextInformationList) -> CallbackList {
        let _ = outputs;
        CallbackList::new()
    }
}

/// A source that returns a fixed set of values on every acquisition.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    values: ContextInformationList,
}

impl StaticSource {
    pub fn new(values: ContextInformationList) -> Self {
        Self { values }
    }
}

impl WidgetSource for StaticSource {
    fn query_generator<'a>(
        &'a self,
        _outputs: &'a ContextInformationList,
    ) -> BoxFuture<'a, Result<ContextInformationList, WidgetError>> {
        Box::pin(async move {
            let now = SystemTime::now();
            Ok(self
                .values
                .iter()
                .map(|v| v.clone().with_timestamp(now))
                .collect())
        })
    }
}

/// Construction options for a [`Widget`].
#[derive(Debug, Clone, Default)]
pub struct WidgetOptions {
    /// Outputs that never change after construction.
    pub constants: ContextInformationList,
    /// Period of automatic acquisition (see [`Widget::start_update_interval`]).
    pub update_interval: Option<Duration>,
}

/// A registered producer.
pub struct Widget {
    component: Component,
    queryable: Queryable,
    update_interval: Option<Duration>,
    source: Box<dyn WidgetSource>,
    discoverer: Weak<Discoverer>,
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("id", &self.component.id())
            .field("name", &self.component.name())
            .field("update_interval", &self.update_interval)
            .finish_non_exhaustive()
    }
}

impl Widget {
    /// Create a widget and register it with the discoverer.
    pub fn new(
        discoverer: &Arc<Discoverer>,
        name: impl Into<String>,
        outputs: ContextInformationList,
        source: impl WidgetSource + 'static,
    ) -> Arc<Self> {
        Self::with_options(discoverer, name, outputs, WidgetOptions::default(), source)
    }

    pub fn with_options(
        discoverer: &Arc<Discoverer>,
        name: impl Into<String>,
        outputs: ContextInformationList,
        options: WidgetOptions,
        source: impl WidgetSource + 'static,
    ) -> Arc<Self> {
        let outputs = outputs.kind_clone();
        let queryable = Queryable::new(outputs.clone(), options.constants);
        for callback in source.callbacks(&outputs).iter() {
            queryable.put_callback(callback.clone());
        }

        let widget = Arc::new(Self {
            component: Component::new(name),
            queryable,
            update_interval: options.update_interval,
            source: Box::new(source),
            discoverer: Arc::downgrade(discoverer),
        });
        discoverer.register_new_component(ComponentHandle::Widget(Arc::clone(&widget)));
        widget
    }

    /// A widget serving the configured values through a [`StaticSource`].
    pub fn from_config(discoverer: &Arc<Discoverer>, config: &WidgetConfig) -> Arc<Self> {
        let values: ContextInformationList = config
            .outputs
            .iter()
            .map(|o| discoverer.build_valued_from_config(o))
            .collect();
        let constants = config
            .constants
            .iter()
            .map(|c| discoverer.build_valued_from_config(c))
            .collect();
        let options = WidgetOptions {
            constants,
            update_interval: config.update_interval_ms.map(Duration::from_millis),
        };
        Self::with_options(
            discoverer,
            &config.name,
            values.kind_clone(),
            options,
            StaticSource::new(values),
        )
    }

    pub fn id(&self) -> ComponentId {
        self.component.id()
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    pub fn queryable(&self) -> &Queryable {
        &self.queryable
    }

    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval
    }

    pub fn add_subscriber(&self, subscriber: Subscriber) {
        self.queryable.add_subscriber(subscriber);
    }

    pub fn remove_subscriber(&self, id: ComponentId) -> Option<Subscriber> {
        self.queryable.remove_subscriber(id)
    }

    /// The cached outputs and constants, without waiting for any pending
    /// acquisition.
    pub fn query_widget(&self) -> ContextInformationList {
        self.queryable.snapshot()
    }

    /// Acquire fresh values through the source, store them and notify
    /// subscribers. Returns the accepted items.
    pub async fn update_widget_information(&self) -> Result<ContextInformationList, WidgetError> {
        let kinds = self.queryable.outputs().kind_clone();
        let acquired = self.source.query_generator(&kinds).await?;
        self.queryable.remember_previous();
        let accepted = self.queryable.update(acquired);
        debug!(widget = %self.id(), items = accepted.len(), "Widget acquired values");
        self.notify().await;
        Ok(accepted)
    }

    /// Acquire, then return the refreshed cache.
    pub async fn update_and_query_widget(&self) -> Result<ContextInformationList, WidgetError> {
        self.update_widget_information().await?;
        Ok(self.query_widget())
    }

    /// Push current outputs to subscribers.
    pub async fn notify(&self) {
        self.queryable.notify(self.id(), &self.discoverer).await;
    }

    /// Spawn a task that acquires every `update_interval` for as long as the
    /// widget is alive. Returns `None` for on-demand widgets.
    pub fn start_update_interval(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.update_interval?;
        let weak = Arc::downgrade(self);
        info!(widget = %self.id(), interval_ms = interval.as_millis() as u64, "Starting update interval");

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(widget) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = widget.update_widget_information().await {
                    warn!(widget = %widget.id(), error = %e, "Periodic acquisition failed");
                }
            }
        }))
    }

    pub fn description(&self) -> ComponentDescription {
        let mut description = ComponentDescription::new(Role::Widget, self.name());
        description.out = KindDescription::all_of(&self.queryable.outputs());
        description.constants = KindDescription::all_of(self.queryable.constants());
        description.update_interval_ms = self.update_interval.map(|d| d.as_millis() as u64);
        description
    }
}
