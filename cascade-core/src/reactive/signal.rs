//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    read is recorded as an edge from the signal to that computation.
//!
//! 2. When a signal is written with a different value, its version and the
//!    global write counter are bumped and everything downstream is marked.
//!
//! 3. Effects reached by the write run when the surrounding batch closes.
//!    Writing an equal value does nothing at all.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A generational [`NodeId`] into the thread's graph arena
//! - The value, stored behind an `Rc` shared by every clone of the handle
//!
//! Edges, version and debug name live in the graph node, not in the handle.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::ReactiveError;
use crate::graph::{Node, NodeId};

use super::batch::Batch;
use super::effect::Effect;
use super::options::SignalOptions;
use super::runtime::Runtime;
use super::subscriber;

/// A writable reactive value of type `T`.
///
/// Handles are cheap to clone; every clone refers to the same signal. The
/// signal is removed from the graph when its last handle is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::release(self.id);
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_options(value, SignalOptions::default())
    }

    /// Create a new signal with a debug name and/or watch hooks.
    pub fn with_options(value: T, options: impl Into<SignalOptions>) -> Self {
        let options = options.into();
        let node = Node::source(options.name).with_hooks(options.watched, options.unwatched);
        Self {
            inner: Rc::new(SignalInner {
                id: Runtime::insert(node),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the signal's debug name, if it was given one.
    pub fn name(&self) -> Option<String> {
        Runtime::name(self.inner.id)
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal
    /// as a dependency of the current computation.
    pub fn get(&self) -> T {
        Runtime::track(self.inner.id);
        self.inner.value.borrow().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value and notify dependents.
    ///
    /// Panics with the [`ReactiveError`] if the write is rejected as a cycle
    /// or an effect fails while the implicit batch is flushed. See
    /// [`try_set`](Self::try_set).
    pub fn set(&self, value: T) {
        self.try_set(value).unwrap_or_else(|err| err.raise());
    }

    /// Set a new value and notify dependents.
    ///
    /// Writing a value equal to the current one is a no-op. Otherwise the
    /// write opens an implicit batch, so effects reached by it run before
    /// this returns unless an outer batch is open.
    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        if *self.inner.value.borrow() == value {
            return Ok(());
        }

        let id = self.inner.id;
        if Batch::iteration() > Runtime::config().max_flush_iterations {
            return Err(Runtime::cycle(id));
        }

        let previous = self.inner.value.replace(value);
        Runtime::with_graph(|graph| {
            if let Some(node) = graph.get_mut(id) {
                node.version += 1;
            }
        });
        Runtime::bump_global_version();
        tracing::trace!(node = ?id, "signal written");

        let batch = Batch::start();
        Batch::propagate(id);
        drop(previous);
        batch.finish()
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.try_update(f).unwrap_or_else(|err| err.raise());
    }

    /// Fallible form of [`update`](Self::update).
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<(), ReactiveError> {
        let current = self.peek();
        self.try_set(f(&current))
    }

    /// Call `listener` with the current value now and after every change.
    ///
    /// The listener runs untracked; dispose the returned [`Effect`] to stop.
    pub fn subscribe(&self, listener: impl Fn(T) + 'static) -> Effect {
        self.try_subscribe(listener).unwrap_or_else(|err| err.raise())
    }

    /// Fallible form of [`subscribe`](Self::subscribe).
    pub fn try_subscribe(&self, listener: impl Fn(T) + 'static) -> Result<Effect, ReactiveError> {
        let this = self.clone();
        subscriber::subscribe(move || Ok(this.get()), listener)
    }

    /// Number of times the value has changed.
    pub fn version(&self) -> u64 {
        Runtime::version(self.inner.id).unwrap_or_default()
    }

    /// Number of computeds and effects currently subscribed to this signal.
    pub fn subscriber_count(&self) -> usize {
        Runtime::with_graph(|graph| graph.get(self.inner.id).map_or(0, |node| node.targets.len()))
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Signal<T>
where
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.version())
            .finish()
    }
}

/// Formats the current value. The read is tracked like [`Signal::get`].
impl<T> fmt::Display for Signal<T>
where
    T: Clone + PartialEq + fmt::Display + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.get(), f)
    }
}

#[cfg(feature = "serde")]
impl<T> serde::Serialize for Signal<T>
where
    T: Clone + PartialEq + serde::Serialize + 'static,
{
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.value.borrow().serialize(serializer)
    }
}

/// Create a new signal. Shorthand for [`Signal::new`].
pub fn signal<T: Clone + PartialEq + 'static>(value: T) -> Signal<T> {
    Signal::new(value)
}
