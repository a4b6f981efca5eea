//! Named mutations.

use crate::error::{ActionError, MailroomError, MailroomResult};
use std::fmt;
use std::sync::Arc;

type ActionFn<T> = dyn Fn(&mut T) -> Result<(), ActionError> + Send + Sync;

/// A labelled, reusable mutation of a document value.
///
/// Actions mutate the value they are given in place. The commit engine may
/// apply the same action more than once (to a snapshot chain, to the root,
/// and again after every version conflict), so an action must depend only on
/// the value it receives.
///
/// ```rust
/// use mailroom_core::Action;
///
/// let double = Action::infallible("double", |n: &mut i64| *n *= 2);
/// let mut value = 21;
/// double.apply(&mut value).unwrap();
/// assert_eq!(value, 42);
/// ```
pub struct Action<T> {
    label: Arc<str>,
    apply: Arc<ActionFn<T>>,
}

impl<T> Action<T> {
    /// Creates an action that may fail.
    pub fn new<F>(label: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            apply: Arc::new(apply),
        }
    }

    /// Creates an action that cannot fail.
    pub fn infallible<F>(label: impl Into<String>, apply: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        Self::new(label, move |value: &mut T| {
            apply(value);
            Ok(())
        })
    }

    /// Returns the action's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Applies the action to `value`.
    pub fn apply(&self, value: &mut T) -> Result<(), ActionError> {
        (self.apply)(value)
    }
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            apply: Arc::clone(&self.apply),
        }
    }
}

impl<T> fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.label).finish()
    }
}

/// Applies `actions` to `value` in order, stopping at the first failure.
///
/// On failure `value` keeps the effects of the actions that ran before the
/// failing one; callers apply to a scratch copy and discard it.
pub fn apply_actions<T>(value: &mut T, actions: &[Action<T>]) -> MailroomResult<()> {
    for (index, action) in actions.iter().enumerate() {
        action
            .apply(value)
            .map_err(|e| MailroomError::ActionFailed {
                label: action.label().to_string(),
                index,
                message: e.to_string(),
            })?;
    }
    Ok(())
}
