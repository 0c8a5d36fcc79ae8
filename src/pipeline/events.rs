//! Lifecycle notifications for observers of a pipeline run.
//!
//! Observers are plain callbacks invoked synchronously on the control thread, in subscription
//! order. A callback must not call back into the pipeline.

use crate::pipeline::state::PipelineState;

/// Something observers may care about.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The plan was built and the sequence locked.
    Initialized {
        /// Planned shots, disabled ones included.
        shots: usize,
    },
    /// The pipeline moved between states.
    StateChanged {
        /// Previous state.
        from: PipelineState,
        /// New state.
        to: PipelineState,
    },
    /// A shot was set up on the render sink.
    ShotStarted {
        /// Shot index in the plan.
        index: usize,
        /// Shot name.
        name: String,
    },
    /// A shot's last sample was flushed and the sink torn down.
    ShotFinished {
        /// Shot index in the plan.
        index: usize,
        /// Shot name.
        name: String,
    },
    /// An error was recorded.
    Error {
        /// Rendered error.
        message: String,
        /// The run will shut down because of it.
        fatal: bool,
    },
    /// The run ended. Sent exactly once.
    Finished {
        /// No error was recorded.
        success: bool,
    },
}

/// Handle returned by [`PipelineEvents::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&PipelineEvent) + Send>;

/// Registered observers.
#[derive(Default)]
pub struct PipelineEvents {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback)>,
}

impl std::fmt::Debug for PipelineEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEvents")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl PipelineEvents {
    /// Register `callback` for every following event.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&PipelineEvent) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` when `id` was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every subscriber.
    pub fn emit(&mut self, event: PipelineEvent) {
        tracing::trace!(?event, "pipeline event");
        for (_, callback) in &mut self.subscribers {
            callback(&event);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/events.rs"]
mod tests;
