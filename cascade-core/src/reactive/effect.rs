//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When a write reaches the effect, it is queued on the batch scheduler
//!    and re-runs once the outermost batch closes, provided one of its
//!    sources really changed.
//!
//! 3. Each run records a fresh set of sources; sources that were not read
//!    again are unsubscribed.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when deps change).
//! - Computeds are removed when their last handle drops; effects live until disposed.
//!
//! # Cleanup
//!
//! Effects can optionally return a [`Cleanup`]. It is called before the
//! effect re-runs and when the effect is disposed, inside an implicit batch
//! and with tracking disabled. A cleanup that fails disposes its effect.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ReactiveError;
use crate::graph::NodeId;

use super::batch::Batch;
use super::context::{untracked, ReactiveContext};
use super::options::EffectOptions;
use super::runtime::{Evaluating, Runtime};

/// Teardown returned by an effect run.
pub struct Cleanup(Box<dyn FnOnce()>);

impl Cleanup {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Box::new(f))
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cleanup(..)")
    }
}

/// Values an effect function may return.
///
/// Implemented for `()`, [`Cleanup`], `Option<Cleanup>` and `Result`s of
/// the first two, so effects can use `?` on [`ReactiveError`]s.
pub trait EffectOutput {
    fn into_cleanup(self) -> Result<Option<Cleanup>, ReactiveError>;
}

impl EffectOutput for () {
    fn into_cleanup(self) -> Result<Option<Cleanup>, ReactiveError> {
        Ok(None)
    }
}

impl EffectOutput for Cleanup {
    fn into_cleanup(self) -> Result<Option<Cleanup>, ReactiveError> {
        Ok(Some(self))
    }
}

impl EffectOutput for Option<Cleanup> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, ReactiveError> {
        Ok(self)
    }
}

impl<E: Into<ReactiveError>> EffectOutput for Result<(), E> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, ReactiveError> {
        self.map(|()| None).map_err(Into::into)
    }
}

impl<E: Into<ReactiveError>> EffectOutput for Result<Cleanup, E> {
    fn into_cleanup(self) -> Result<Option<Cleanup>, ReactiveError> {
        self.map(Some).map_err(Into::into)
    }
}

type EffectFn = Box<dyn FnMut() -> Result<Option<Cleanup>, ReactiveError>>;

/// The half of an effect owned by the graph.
pub(crate) struct EffectInner {
    id: NodeId,
    callback: RefCell<EffectFn>,
    cleanup: RefCell<Option<Cleanup>>,
    runs: Rc<Cell<usize>>,
}

impl EffectInner {
    /// Run the effect once: previous cleanup first, then the callback with
    /// its reads tracked.
    ///
    /// Writes made by the callback are batched and flushed when it returns
    /// (or when the enclosing batch closes).
    pub(crate) fn run(self: &Rc<Self>) -> Result<(), ReactiveError> {
        let id = self.id;
        let busy = Runtime::with_graph(|graph| {
            let node = graph.get_mut(id)?;
            let busy = node.evaluating;
            node.evaluating = true;
            Some(busy)
        });
        match busy {
            None => return Ok(()),
            Some(true) => return Err(Runtime::cycle(id)),
            Some(false) => {}
        }
        let evaluating = Evaluating::new(id);

        if let Err(err) = self.run_cleanup() {
            tracing::warn!(node = ?id, error = %err, "effect cleanup failed; disposing effect");
            if let Err(again) = self.dispose_now() {
                tracing::warn!(node = ?id, error = %again, "effect cleanup failed during disposal");
            }
            return Err(err);
        }

        let batch = Batch::start();
        let ctx = ReactiveContext::enter(id);
        let result = Runtime::guarded(|| {
            let mut callback = self
                .callback
                .try_borrow_mut()
                .map_err(|_| Runtime::cycle(id))?;
            (&mut **callback)()
        });
        let sources = ctx.finish();
        let hooks = Runtime::install_sources(id, sources);
        self.runs.set(self.runs.get() + 1);
        tracing::trace!(node = ?id, runs = self.runs.get(), "effect ran");

        drop(evaluating);
        let disposed =
            Runtime::with_graph(|graph| graph.get(id).map_or(true, |node| node.disposed));

        let mut errors = Vec::new();
        if let Err(err) = hooks {
            errors.push(err);
        }
        match result {
            Ok(cleanup) => *self.cleanup.borrow_mut() = cleanup,
            Err(err) => errors.push(err),
        }
        if disposed {
            if let Err(err) = self.dispose_now() {
                errors.push(err);
            }
        }
        if let Err(err) = batch.finish() {
            errors.push(err);
        }
        ReactiveError::collect(errors)
    }

    /// Call the pending cleanup, if any.
    fn run_cleanup(&self) -> Result<(), ReactiveError> {
        let Some(cleanup) = self.cleanup.borrow_mut().take() else {
            return Ok(());
        };

        let batch = Batch::start();
        let result = untracked(|| {
            Runtime::guarded(|| {
                (cleanup.0)();
                Ok(())
            })
        });
        result.and(batch.finish())
    }

    /// Detach from the graph and call the last cleanup.
    fn dispose_now(self: &Rc<Self>) -> Result<(), ReactiveError> {
        let detached = Runtime::remove(self.id);
        tracing::debug!(node = ?self.id, "effect disposed");
        let cleanup = self.run_cleanup();
        ReactiveError::collect(detached.err().into_iter().chain(cleanup.err()).collect())
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The handle does not own the effect: dropping it leaves the effect
/// running. Call [`dispose`](Effect::dispose) to stop it.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count.get());
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    id: NodeId,
    inner: Weak<EffectInner>,
    runs: Rc<Cell<usize>>,
}

impl Effect {
    /// Create a new effect and run it immediately.
    ///
    /// Panics with the [`ReactiveError`] if the first run fails; see
    /// [`try_new`](Self::try_new).
    pub fn new<O: EffectOutput>(f: impl FnMut() -> O + 'static) -> Self {
        Self::try_new(f).unwrap_or_else(|err| err.raise())
    }

    /// Create a new effect and run it immediately.
    ///
    /// If the first run fails, the effect is disposed and the error
    /// returned.
    pub fn try_new<O: EffectOutput>(f: impl FnMut() -> O + 'static) -> Result<Self, ReactiveError> {
        Self::try_with_options(EffectOptions::default(), f)
    }

    /// Create a named effect and run it immediately.
    pub fn with_options<O: EffectOutput>(
        options: impl Into<EffectOptions>,
        f: impl FnMut() -> O + 'static,
    ) -> Self {
        Self::try_with_options(options, f).unwrap_or_else(|err| err.raise())
    }

    /// Fallible form of [`with_options`](Self::with_options).
    pub fn try_with_options<O: EffectOutput>(
        options: impl Into<EffectOptions>,
        mut f: impl FnMut() -> O + 'static,
    ) -> Result<Self, ReactiveError> {
        let options = options.into();
        let runs = Rc::new(Cell::new(0));
        let callback: EffectFn = Box::new(move || f().into_cleanup());

        let shared = runs.clone();
        let (id, inner) = Runtime::insert_effect(options.name, move |id| {
            Rc::new(EffectInner {
                id,
                callback: RefCell::new(callback),
                cleanup: RefCell::new(None),
                runs: shared,
            })
        });

        if let Err(err) = inner.run() {
            tracing::debug!(node = ?id, error = %err, "first effect run failed; disposing");
            if let Err(cleanup) = inner.dispose_now() {
                tracing::warn!(node = ?id, error = %cleanup, "effect cleanup failed during disposal");
            }
            return Err(err);
        }

        Ok(Self {
            id,
            inner: Rc::downgrade(&inner),
            runs,
        })
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the effect's debug name, if it was given one.
    pub fn name(&self) -> Option<String> {
        Runtime::name(self.id)
    }

    /// Stop the effect: unsubscribe from every source and call the last
    /// cleanup.
    ///
    /// Disposing an effect from inside its own callback takes effect when
    /// the callback returns. Disposing twice is a no-op. Panics with the
    /// [`ReactiveError`] if the cleanup fails; see
    /// [`try_dispose`](Self::try_dispose).
    pub fn dispose(&self) {
        self.try_dispose().unwrap_or_else(|err| err.raise());
    }

    /// Fallible form of [`dispose`](Self::dispose).
    pub fn try_dispose(&self) -> Result<(), ReactiveError> {
        let Some(inner) = self.inner.upgrade() else {
            return Ok(());
        };

        let running = Runtime::with_graph(|graph| match graph.get_mut(self.id) {
            Some(node) => {
                node.disposed = true;
                node.evaluating
            }
            None => true,
        });
        if running {
            return Ok(());
        }
        inner.dispose_now()
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with_graph(|graph| graph.get(self.id).map_or(true, |node| node.disposed))
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.runs.get()
    }

    /// Get the number of sources read by the last run.
    pub fn dependency_count(&self) -> usize {
        Runtime::with_graph(|graph| graph.get(self.id).map_or(0, |node| node.sources.len()))
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create and run a new effect. Shorthand for [`Effect::new`].
pub fn effect<O: EffectOutput>(f: impl FnMut() -> O + 'static) -> Effect {
    Effect::new(f)
}

/// Create and run a new effect. Shorthand for [`Effect::try_new`].
pub fn try_effect<O: EffectOutput>(f: impl FnMut() -> O + 'static) -> Result<Effect, ReactiveError> {
    Effect::try_new(f)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
