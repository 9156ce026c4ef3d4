use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::EventChannel;

/// Single-assignment holder for the broker channel.
///
/// The [`ConnectionManager`](super::ConnectionManager) is the only writer.
/// Once set the channel is never replaced; readers observe either nothing or
/// the established channel.
#[derive(Clone, Default)]
pub struct ChannelSlot {
    cell: Arc<OnceCell<Arc<dyn EventChannel>>>,
}

impl ChannelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that already holds `channel`
    pub fn with_channel(channel: Arc<dyn EventChannel>) -> Self {
        Self {
            cell: Arc::new(OnceCell::new_with(Some(channel))),
        }
    }

    /// The established channel, if any
    pub fn get(&self) -> Option<Arc<dyn EventChannel>> {
        self.cell.get().cloned()
    }

    pub fn is_established(&self) -> bool {
        self.cell.initialized()
    }

    /// Store the channel. Returns `false` if one was already stored.
    pub(crate) fn set(&self, channel: Arc<dyn EventChannel>) -> bool {
        self.cell.set(channel).is_ok()
    }
}

impl fmt::Debug for ChannelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSlot")
            .field("established", &self.is_established())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::memory::MemoryChannel;

    #[test]
    fn test_slot_is_set_once() {
        let slot = ChannelSlot::new();
        assert!(!slot.is_established());
        assert!(slot.get().is_none());

        assert!(slot.set(MemoryChannel::shared()));
        assert!(slot.is_established());
        assert!(!slot.set(MemoryChannel::shared()));
    }

    #[test]
    fn test_clones_share_the_channel() {
        let slot = ChannelSlot::new();
        let reader = slot.clone();
        slot.set(MemoryChannel::shared());
        assert!(reader.get().is_some());
    }

    #[test]
    fn test_prefilled_slot() {
        let slot = ChannelSlot::with_channel(MemoryChannel::shared());
        assert!(slot.is_established());
    }
}
