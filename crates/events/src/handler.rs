use tallyup_core::Aggregate;

/// Execute an aggregate command deterministically (no IO, no async).
///
/// 1. **Decide**: `aggregate.handle(command)` produces events without mutating.
/// 2. **Evolve**: each event is applied in order.
///
/// If `handle` fails nothing is applied, so the aggregate is left untouched.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}

/// Rehydrate an aggregate by applying historical events in order.
pub fn replay<'a, A>(aggregate: &mut A, events: impl IntoIterator<Item = &'a A::Event>)
where
    A: Aggregate,
    A::Event: 'a,
{
    for ev in events {
        A::apply(aggregate, ev);
    }
}
