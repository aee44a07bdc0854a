//! Either kind of readable node behind one type.

use std::fmt;

use crate::error::ReactiveError;
use crate::graph::NodeId;

use super::computed::Computed;
use super::effect::Effect;
use super::signal::Signal;

/// A signal or a computed, for APIs that accept both.
///
/// Reads behave exactly like the wrapped handle. Writes succeed only on a
/// signal; writing to a computed fails with
/// [`ReactiveError::ReadOnlyViolation`].
pub enum AnySignal<T: 'static> {
    Signal(Signal<T>),
    Computed(Computed<T>),
}

impl<T> AnySignal<T>
where
    T: Clone + PartialEq + 'static,
{
    pub fn id(&self) -> NodeId {
        match self {
            Self::Signal(signal) => signal.id(),
            Self::Computed(computed) => computed.id(),
        }
    }

    pub fn name(&self) -> Option<String> {
        match self {
            Self::Signal(signal) => signal.name(),
            Self::Computed(computed) => computed.name(),
        }
    }

    /// Whether [`try_set`](Self::try_set) can succeed.
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Signal(_))
    }

    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| err.raise())
    }

    pub fn try_get(&self) -> Result<T, ReactiveError> {
        match self {
            Self::Signal(signal) => Ok(signal.get()),
            Self::Computed(computed) => computed.try_get(),
        }
    }

    pub fn peek(&self) -> T {
        self.try_peek().unwrap_or_else(|err| err.raise())
    }

    pub fn try_peek(&self) -> Result<T, ReactiveError> {
        match self {
            Self::Signal(signal) => Ok(signal.peek()),
            Self::Computed(computed) => computed.try_peek(),
        }
    }

    pub fn set(&self, value: T) {
        self.try_set(value).unwrap_or_else(|err| err.raise());
    }

    pub fn try_set(&self, value: T) -> Result<(), ReactiveError> {
        match self {
            Self::Signal(signal) => signal.try_set(value),
            Self::Computed(computed) => Err(ReactiveError::ReadOnlyViolation {
                name: computed.name(),
            }),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(T) + 'static) -> Effect {
        self.try_subscribe(listener).unwrap_or_else(|err| err.raise())
    }

    pub fn try_subscribe(&self, listener: impl Fn(T) + 'static) -> Result<Effect, ReactiveError> {
        match self {
            Self::Signal(signal) => signal.try_subscribe(listener),
            Self::Computed(computed) => computed.try_subscribe(listener),
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Self::Signal(signal) => signal.version(),
            Self::Computed(computed) => computed.version(),
        }
    }
}

impl<T: 'static> Clone for AnySignal<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Signal(signal) => Self::Signal(signal.clone()),
            Self::Computed(computed) => Self::Computed(computed.clone()),
        }
    }
}

impl<T: 'static> From<Signal<T>> for AnySignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self::Signal(signal)
    }
}

impl<T: 'static> From<Computed<T>> for AnySignal<T> {
    fn from(computed: Computed<T>) -> Self {
        Self::Computed(computed)
    }
}

impl<T> fmt::Debug for AnySignal<T>
where
    T: Clone + PartialEq + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => fmt::Debug::fmt(signal, f),
            Self::Computed(computed) => fmt::Debug::fmt(computed, f),
        }
    }
}

impl<T> fmt::Display for AnySignal<T>
where
    T: Clone + PartialEq + fmt::Display + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => fmt::Display::fmt(signal, f),
            Self::Computed(computed) => fmt::Display::fmt(computed, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computed_is_read_only() {
        let source = Signal::new(2);
        let read = source.clone();
        let doubled: AnySignal<i32> =
            Computed::with_options("doubled", move || read.get() * 2).into();

        assert!(!doubled.is_writable());
        assert_eq!(doubled.get(), 4);
        assert_eq!(
            doubled.try_set(10),
            Err(ReactiveError::ReadOnlyViolation {
                name: Some("doubled".into())
            })
        );
        assert_eq!(doubled.get(), 4);
    }

    #[test]
    fn signal_writes_through() {
        let source = Signal::new(1);
        let any = AnySignal::from(source.clone());

        assert!(any.is_writable());
        any.set(3);
        assert_eq!(source.get(), 3);
        assert_eq!(any.version(), 1);
    }
}
