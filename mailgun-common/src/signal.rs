/// Broadcast over the shutdown channel shared by every long-running task
/// (delivery workers, the retention cleaner, the queue proxy, the HTTP
/// listener).
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}
