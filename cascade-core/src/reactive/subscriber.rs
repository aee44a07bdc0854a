//! Listener subscriptions.
//!
//! `subscribe` on a signal or computed is sugar for an effect that reads the
//! value (tracked) and hands it to a plain callback (untracked). Whatever the
//! listener reads therefore never becomes a dependency, and the listener is
//! called only when the subscribed value itself changes.

use crate::error::ReactiveError;

use super::context::untracked;
use super::effect::Effect;

/// Subscribe `listener` to the value produced by `read`.
///
/// `listener` is called once immediately and again every time `read`
/// would produce a different value. A failing read fails the subscription
/// (or the flush that re-ran it) instead of calling the listener.
pub(crate) fn subscribe<T, R, L>(read: R, listener: L) -> Result<Effect, ReactiveError>
where
    T: 'static,
    R: Fn() -> Result<T, ReactiveError> + 'static,
    L: Fn(T) + 'static,
{
    Effect::try_new(move || -> Result<(), ReactiveError> {
        let value = read()?;
        untracked(|| listener(value));
        Ok(())
    })
}
