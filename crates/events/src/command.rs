use uuid::Uuid;

/// A command is a transient request to change state (command abstraction).
///
/// Commands are rejected if invalid; accepted commands turn into events, which
/// are the only thing persisted.
///
/// ## Self-validation
///
/// `validate()` checks the command's own shape (non-empty lines, positive
/// quantities, ...) without touching any state. The dispatcher calls it before
/// anything else; a command that fails it never reaches a handler.
///
/// ## Routing
///
/// `command_type()` is the stable key handlers are registered under. It is a
/// `&'static str` chosen by the command type itself, never parsed from input.
///
/// ## Design Constraints
///
/// Commands must be `Clone + Send + Sync + 'static` so they can be retried,
/// logged and moved across worker threads.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable routing key (e.g. "sales.confirm_sale").
    fn command_type(&self) -> &'static str;

    /// Client-generated id; doubles as the causation id of produced events.
    fn command_id(&self) -> Uuid;

    /// Check the command's own invariants. `Err` carries a human-readable reason.
    fn validate(&self) -> Result<(), String>;
}
