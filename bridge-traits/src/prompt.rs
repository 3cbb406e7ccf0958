//! User Confirmation Abstraction
//!
//! Destructive operations (wiping the offline library) must be confirmed by
//! the user. The host decides how: a modal dialog, a terminal prompt, or a
//! policy that always answers one way.

use async_trait::async_trait;

/// Asks the user a yes/no question.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::prompt::UserPrompt;
///
/// async fn wipe(prompt: &dyn UserPrompt) {
///     if prompt.confirm("Delete all downloaded messages?").await {
///         // ...
///     }
/// }
/// ```
#[async_trait]
pub trait UserPrompt: Send + Sync {
    /// Returns `true` only if the user explicitly agreed.
    async fn confirm(&self, message: &str) -> bool;
}
