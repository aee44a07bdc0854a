//! Construction options for signals, computeds and effects.

use std::fmt;
use std::rc::Rc;

use crate::graph::Hook;

/// Options accepted by [`Signal::with_options`](super::Signal::with_options)
/// and [`Computed::with_options`](super::Computed::with_options).
///
/// `name` is debug metadata and has no effect on the graph.
#[derive(Default, Clone)]
pub struct SignalOptions {
    pub name: Option<String>,
    pub(crate) watched: Option<Hook>,
    pub(crate) unwatched: Option<Hook>,
}

impl SignalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Called (untracked) when the node gains its first subscriber.
    pub fn watched(mut self, hook: impl Fn() + 'static) -> Self {
        self.watched = Some(Rc::new(hook));
        self
    }

    /// Called (untracked) when the node loses its last subscriber.
    pub fn unwatched(mut self, hook: impl Fn() + 'static) -> Self {
        self.unwatched = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for SignalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalOptions")
            .field("name", &self.name)
            .field("watched", &self.watched.is_some())
            .field("unwatched", &self.unwatched.is_some())
            .finish()
    }
}

impl From<&str> for SignalOptions {
    fn from(name: &str) -> Self {
        Self::new().name(name)
    }
}

/// Options accepted by [`Effect::with_options`](super::Effect::with_options).
#[derive(Debug, Default, Clone)]
pub struct EffectOptions {
    pub name: Option<String>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl From<&str> for EffectOptions {
    fn from(name: &str) -> Self {
        Self::new().name(name)
    }
}
