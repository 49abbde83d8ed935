//! Command execution pipeline (application-level orchestration).
//!
//! ## Command Execution Flow
//!
//! ```text
//! execute(command)
//!   ↓
//! 1. command.validate()          → InvalidCommand (never reaches a handler)
//!   ↓
//! 2. look up handler by type     → UnregisteredHandler
//!   ↓
//! 3. middleware chain            (first registered = outermost)
//!   ↓
//! 4. handler                     (decide, commit atomically, publish)
//! ```
//!
//! The dispatcher never swallows an error: whatever the chain returns is what
//! the caller gets. Logging, authorization and retries are middleware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use kardex_auth::AuthzError;
use kardex_catalog::CatalogError;
use kardex_core::{DomainError, Money, Quantity};
use kardex_events::Command;
use kardex_inventory::{LedgerError, StockCheckError};
use kardex_sales::SaleRepositoryError;

use crate::event_store::EventStoreError;

/// Every way a command can fail, as seen by its caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The command failed its own validation.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// No handler registered for the command type (configuration defect).
    #[error("no handler registered for '{0}'")]
    UnregisteredHandler(String),

    #[error("sale has no lines")]
    EmptySale,

    #[error("sale total must be positive (found {total})")]
    InvalidTotal { total: Money },

    #[error("insufficient stock (available {available}, requested {requested})")]
    InsufficientStock {
        available: Quantity,
        requested: Quantity,
    },

    /// The aggregate moved on while the command ran; re-issue the command.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The deadline passed before the chain finished.
    ///
    /// Anything the handler committed before its last await point stays
    /// committed; look the outcome up before re-issuing a command that is
    /// not idempotent.
    #[error("command timed out after {0:?}; it may still have committed")]
    Timeout(Duration),

    /// Storage failed; the enclosing atomic unit was rolled back.
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl DispatchError {
    /// Transient failures worth re-issuing. After a timeout, check the
    /// outcome first; the command may already have committed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::ConcurrencyConflict(_) | DispatchError::Timeout(_)
        )
    }

    /// Configuration or infrastructure faults, as opposed to failures the
    /// caller can correct.
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            DispatchError::UnregisteredHandler(_) | DispatchError::Persistence(_)
        )
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                DispatchError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::NotFound => DispatchError::NotFound("requested record".to_string()),
            DomainError::Conflict(msg) => DispatchError::ConcurrencyConflict(msg),
            DomainError::Unauthorized => DispatchError::Forbidden("unauthorized".to_string()),
            DomainError::EmptySale => DispatchError::EmptySale,
            DomainError::InvalidTotal { total } => DispatchError::InvalidTotal { total },
            DomainError::InsufficientStock {
                available,
                requested,
            } => DispatchError::InsufficientStock {
                available,
                requested,
            },
            err @ DomainError::InvalidTransition { .. } => {
                DispatchError::InvariantViolation(err.to_string())
            }
        }
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            err @ EventStoreError::Concurrency { .. } => {
                DispatchError::ConcurrencyConflict(err.to_string())
            }
            other => DispatchError::Persistence(other.to_string()),
        }
    }
}

impl From<SaleRepositoryError> for DispatchError {
    fn from(value: SaleRepositoryError) -> Self {
        match value {
            err @ SaleRepositoryError::Concurrency { .. } => {
                DispatchError::ConcurrencyConflict(err.to_string())
            }
            err @ SaleRepositoryError::Unassigned => {
                DispatchError::InvariantViolation(err.to_string())
            }
            other => DispatchError::Persistence(other.to_string()),
        }
    }
}

impl From<LedgerError> for DispatchError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::InsufficientStock {
                available,
                requested,
                ..
            } => DispatchError::InsufficientStock {
                available,
                requested,
            },
            LedgerError::InvalidMovement(msg) => DispatchError::Validation(msg),
            other => DispatchError::Persistence(other.to_string()),
        }
    }
}

impl From<StockCheckError> for DispatchError {
    fn from(value: StockCheckError) -> Self {
        match value {
            StockCheckError::Domain(e) => e.into(),
            StockCheckError::Ledger(e) => e.into(),
            StockCheckError::Catalog(e) => e.into(),
        }
    }
}

impl From<CatalogError> for DispatchError {
    fn from(value: CatalogError) -> Self {
        DispatchError::Persistence(value.to_string())
    }
}

impl From<AuthzError> for DispatchError {
    fn from(value: AuthzError) -> Self {
        DispatchError::Forbidden(value.to_string())
    }
}

/// Terminal step of the pipeline for one command type.
#[async_trait]
pub trait CommandHandler<C, R>: Send + Sync {
    async fn handle(&self, command: C) -> Result<R, DispatchError>;
}

/// Wraps the rest of the pipeline. Call `next.run(command)` to continue, or
/// return early to short-circuit.
#[async_trait]
pub trait Middleware<C, R>: Send + Sync {
    async fn handle(&self, command: C, next: Next<'_, C, R>) -> Result<R, DispatchError>;
}

/// The remainder of the chain as seen from one middleware.
pub struct Next<'a, C, R> {
    middleware: &'a [Arc<dyn Middleware<C, R>>],
    handler: &'a dyn CommandHandler<C, R>,
}

impl<C, R> Clone for Next<'_, C, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C, R> Copy for Next<'_, C, R> {}

impl<'a, C, R> Next<'a, C, R>
where
    C: Send + 'static,
    R: Send + 'static,
{
    /// Run the remaining middleware and then the handler.
    ///
    /// `Next` is `Copy`, so a middleware may run the rest of the chain more
    /// than once (retries).
    pub async fn run(self, command: C) -> Result<R, DispatchError> {
        match self.middleware.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    middleware: rest,
                    handler: self.handler,
                };
                first.handle(command, next).await
            }
            None => self.handler.handle(command).await,
        }
    }
}

/// Routes commands to handlers by `command_type()`, through the middleware
/// chain.
pub struct CommandDispatcher<C, R> {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler<C, R>>>,
    middleware: Vec<Arc<dyn Middleware<C, R>>>,
}

impl<C, R> Default for CommandDispatcher<C, R> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            middleware: Vec::new(),
        }
    }
}

impl<C, R> core::fmt::Debug for CommandDispatcher<C, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut types: Vec<&&str> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("CommandDispatcher")
            .field("handlers", &types)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl<C, R> CommandDispatcher<C, R>
where
    C: Command,
    R: Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for `command_type`, replacing any previous one.
    pub fn register(
        &mut self,
        command_type: &'static str,
        handler: Arc<dyn CommandHandler<C, R>>,
    ) -> &mut Self {
        if self.handlers.insert(command_type, handler).is_some() {
            tracing::warn!(command = command_type, "command handler replaced");
        }
        self
    }

    /// Append a middleware. The first one registered is the outermost.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware<C, R>>) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub async fn execute(&self, command: C) -> Result<R, DispatchError> {
        let command_type = command.command_type();

        if let Err(reason) = command.validate() {
            tracing::warn!(
                command = command_type,
                command_id = %command.command_id(),
                %reason,
                "command rejected by validation"
            );
            return Err(DispatchError::InvalidCommand(reason));
        }

        let Some(handler) = self.handlers.get(command_type) else {
            tracing::error!(
                command = command_type,
                command_id = %command.command_id(),
                "no handler registered"
            );
            return Err(DispatchError::UnregisteredHandler(command_type.to_string()));
        };

        Next {
            middleware: &self.middleware,
            handler: handler.as_ref(),
        }
        .run(command)
        .await
    }

    /// [`execute`](Self::execute) bounded by `timeout`.
    ///
    /// The deadline is only observed at await points. Handlers commit in one
    /// synchronous step with no await point inside it, so a timeout either
    /// lands before the commit (nothing written) or after it (everything
    /// written, yet reported as [`DispatchError::Timeout`]); never in
    /// between. A handler that blocks past the deadline and then returns
    /// has its result delivered as is.
    pub async fn execute_with_timeout(
        &self,
        command: C,
        timeout: Duration,
    ) -> Result<R, DispatchError> {
        let command_type = command.command_type();
        let command_id = command.command_id();

        match tokio::time::timeout(timeout, self.execute(command)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    command = command_type,
                    %command_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "command timed out"
                );
                Err(DispatchError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;

    #[derive(Debug, Clone)]
    struct Ping {
        id: Uuid,
        kind: &'static str,
        valid: bool,
    }

    impl Ping {
        fn new(kind: &'static str) -> Self {
            Self {
                id: Uuid::now_v7(),
                kind,
                valid: true,
            }
        }
    }

    impl Command for Ping {
        fn command_type(&self) -> &'static str {
            self.kind
        }

        fn command_id(&self) -> Uuid {
            self.id
        }

        fn validate(&self) -> Result<(), String> {
            if self.valid {
                Ok(())
            } else {
                Err("ping is malformed".to_string())
            }
        }
    }

    struct Pong(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl CommandHandler<Ping, &'static str> for Pong {
        async fn handle(&self, _command: Ping) -> Result<&'static str, DispatchError> {
            self.0.lock().unwrap().push("handler".into());
            Ok("pong")
        }
    }

    struct Tag(&'static str, Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Middleware<Ping, &'static str> for Tag {
        async fn handle(
            &self,
            command: Ping,
            next: Next<'_, Ping, &'static str>,
        ) -> Result<&'static str, DispatchError> {
            self.1.lock().unwrap().push(format!("{} in", self.0));
            let result = next.run(command).await;
            self.1.lock().unwrap().push(format!("{} out", self.0));
            result
        }
    }

    struct Slow;

    #[async_trait]
    impl CommandHandler<Ping, &'static str> for Slow {
        async fn handle(&self, _command: Ping) -> Result<&'static str, DispatchError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("late")
        }
    }

    /// Commits synchronously, then keeps the caller waiting.
    struct CommitThenWait(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl CommandHandler<Ping, &'static str> for CommitThenWait {
        async fn handle(&self, _command: Ping) -> Result<&'static str, DispatchError> {
            self.0.lock().unwrap().push("committed".into());
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok("late")
        }
    }

    /// Blocks past any short deadline without yielding.
    struct Blocking;

    #[async_trait]
    impl CommandHandler<Ping, &'static str> for Blocking {
        async fn handle(&self, _command: Ping) -> Result<&'static str, DispatchError> {
            std::thread::sleep(Duration::from_millis(60));
            Ok("done")
        }
    }

    #[tokio::test]
    async fn first_registered_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = CommandDispatcher::<Ping, &'static str>::new();
        dispatcher
            .register("ping", Arc::new(Pong(Arc::clone(&log))))
            .use_middleware(Arc::new(Tag("a", Arc::clone(&log))))
            .use_middleware(Arc::new(Tag("b", Arc::clone(&log))));

        assert_eq!(dispatcher.execute(Ping::new("ping")).await.unwrap(), "pong");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a in", "b in", "handler", "b out", "a out"]
        );
    }

    #[tokio::test]
    async fn invalid_commands_never_reach_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = CommandDispatcher::<Ping, &'static str>::new();
        dispatcher
            .register("ping", Arc::new(Pong(Arc::clone(&log))))
            .use_middleware(Arc::new(Tag("a", Arc::clone(&log))));

        let mut ping = Ping::new("ping");
        ping.valid = false;
        assert_eq!(
            dispatcher.execute(ping).await.unwrap_err(),
            DispatchError::InvalidCommand("ping is malformed".into())
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_command_type_is_unregistered() {
        let dispatcher = CommandDispatcher::<Ping, &'static str>::new();
        let err = dispatcher.execute(Ping::new("nope")).await.unwrap_err();
        assert_eq!(err, DispatchError::UnregisteredHandler("nope".into()));
        assert!(err.is_fault());
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn slow_handlers_time_out() {
        let mut dispatcher = CommandDispatcher::<Ping, &'static str>::new();
        dispatcher.register("ping", Arc::new(Slow));

        let err = dispatcher
            .execute_with_timeout(Ping::new("ping"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Timeout(Duration::from_millis(20)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn timeout_after_the_commit_keeps_the_commit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = CommandDispatcher::<Ping, &'static str>::new();
        dispatcher.register("ping", Arc::new(CommitThenWait(Arc::clone(&log))));

        let err = dispatcher
            .execute_with_timeout(Ping::new("ping"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Timeout(Duration::from_millis(20)));
        assert_eq!(*log.lock().unwrap(), vec!["committed"]);
    }

    #[tokio::test]
    async fn synchronous_work_is_never_cut_short() {
        let mut dispatcher = CommandDispatcher::<Ping, &'static str>::new();
        dispatcher.register("ping", Arc::new(Blocking));

        let result = dispatcher
            .execute_with_timeout(Ping::new("ping"), Duration::from_millis(10))
            .await;
        assert_eq!(result, Ok("done"));
    }

    #[test]
    fn port_errors_map_onto_the_taxonomy() {
        let stock: DispatchError = DomainError::insufficient_stock(
            Quantity::from(10),
            Quantity::from(15),
        )
        .into();
        assert_eq!(
            stock,
            DispatchError::InsufficientStock {
                available: Quantity::from(10),
                requested: Quantity::from(15),
            }
        );

        let conflict: DispatchError = EventStoreError::Concurrency {
            expected: kardex_core::ExpectedVersion::Exact(0),
            actual: 1,
        }
        .into();
        assert!(conflict.is_retryable());

        let storage: DispatchError = LedgerError::Storage("disk".into()).into();
        assert!(matches!(storage, DispatchError::Persistence(_)));
        assert!(storage.is_fault());

        assert_eq!(DispatchError::from(DomainError::EmptySale), DispatchError::EmptySale);
    }
}
