/// Execute an aggregate command deterministically (no IO, no async).
///
/// The canonical event-sourced step:
///
/// 1. **Decide**: `aggregate.handle(command)` returns events without mutating.
/// 2. **Evolve**: each event is applied via `aggregate.apply(event)`.
///
/// Aggregates use this to keep their imperative API (`confirm`, `void`) and
/// their replay path (`apply`) on the exact same code.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: kardex_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
