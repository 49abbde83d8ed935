//! Cross-cutting command middleware: logging, authorization, retries.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use kardex_auth::{CommandAuthorization, RolePermissions};
use kardex_events::Command;

use crate::command_dispatcher::{DispatchError, Middleware, Next};

/// One structured log event per command execution, success or failure.
///
/// Register it first so it also times the other middleware.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

#[async_trait]
impl<C, R> Middleware<C, R> for LoggingMiddleware
where
    C: Command,
    R: Send + 'static,
{
    async fn handle(&self, command: C, next: Next<'_, C, R>) -> Result<R, DispatchError> {
        let name = command.command_type();
        let command_id = command.command_id();
        let started = Instant::now();

        let result = next.run(command).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => {
                tracing::info!(command = name, %command_id, elapsed_ms, "command executed");
            }
            Err(err) if err.is_fault() => {
                tracing::error!(
                    command = name,
                    %command_id,
                    elapsed_ms,
                    error = %err,
                    retryable = err.is_retryable(),
                    "command failed"
                );
            }
            Err(err) => {
                tracing::warn!(
                    command = name,
                    %command_id,
                    elapsed_ms,
                    error = %err,
                    retryable = err.is_retryable(),
                    "command failed"
                );
            }
        }

        result
    }
}

/// Rejects commands whose actor role lacks the required permission.
#[derive(Debug, Clone)]
pub struct AuthorizationMiddleware {
    permissions: Arc<RolePermissions>,
}

impl AuthorizationMiddleware {
    pub fn new(permissions: Arc<RolePermissions>) -> Self {
        Self { permissions }
    }
}

#[async_trait]
impl<C, R> Middleware<C, R> for AuthorizationMiddleware
where
    C: Command + CommandAuthorization,
    R: Send + 'static,
{
    async fn handle(&self, command: C, next: Next<'_, C, R>) -> Result<R, DispatchError> {
        self.permissions
            .authorize(command.actor_role(), &command.required_permission())?;
        next.run(command).await
    }
}

/// Re-runs the rest of the chain on [`DispatchError::ConcurrencyConflict`],
/// at most `max_retries` extra times. Any other error is returned at once.
#[derive(Debug, Clone, Copy)]
pub struct RetryMiddleware {
    max_retries: u32,
}

impl RetryMiddleware {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

#[async_trait]
impl<C, R> Middleware<C, R> for RetryMiddleware
where
    C: Command,
    R: Send + 'static,
{
    async fn handle(&self, command: C, next: Next<'_, C, R>) -> Result<R, DispatchError> {
        let mut attempt = 0;
        loop {
            match next.run(command.clone()).await {
                Err(DispatchError::ConcurrencyConflict(reason)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        command = command.command_type(),
                        command_id = %command.command_id(),
                        attempt,
                        %reason,
                        "retrying after concurrency conflict"
                    );
                    tokio::task::yield_now().await;
                }
                result => return result,
            }
        }
    }
}
