//! Broadcast channel for committed order events.
//!
//! Events are published after the storage commit that produced them. A send
//! with no live subscribers is not an error for the publisher.

use courier_types::CourierEvent;
use tokio::sync::broadcast;

/// In-process notification sink shared by the engine and its handlers.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<CourierEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per slow subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<CourierEvent> {
		self.sender.subscribe()
	}

	/// Returns the number of subscribers that will see the event.
	pub fn publish(
		&self,
		event: CourierEvent,
	) -> Result<usize, broadcast::error::SendError<CourierEvent>> {
		self.sender.send(event)
	}
}
