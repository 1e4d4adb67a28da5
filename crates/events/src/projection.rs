use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying the
/// group's events. They never feed back into the ledger.
///
/// `apply` does not return errors. Events that are irrelevant to the projection
/// are ignored; ordering and duplicate checks live in `ProjectionRunner`.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
