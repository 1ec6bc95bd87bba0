use crate::event::Event;
use crate::room::Room;

/// Fan-out seam used by event producers.
///
/// Emission is fire-and-forget: implementations deliver to whoever is in the
/// room at the time of the call and never report delivery failures.
pub trait Notifier: Send + Sync {
    fn emit(&self, room: &Room, event: Event);
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn emit(&self, _room: &Room, _event: Event) {}
}

impl<N: Notifier + ?Sized> Notifier for std::sync::Arc<N> {
    fn emit(&self, room: &Room, event: Event) {
        (**self).emit(room, event);
    }
}
