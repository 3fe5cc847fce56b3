//! Relays watcher callbacks into the notification channel as notify records.

use std::fmt::Write;
use std::sync::Arc;

use scanmap_core::{NotifyPayload, NotifyRecord};
use tracing::debug;

use crate::application::notification_channel::NotificationChannel;
use crate::application::sync::SyncObject;
use crate::application::thread_watcher::ThreadObserver;

/// A [`ThreadObserver`] that writes one line per event into a channel.
pub struct ChannelThreadObserver {
    channel: Arc<NotificationChannel>,
    level: u32,
}

impl ChannelThreadObserver {
    /// Writes at `level`, so the channel's threshold can silence attach noise.
    pub fn new(channel: Arc<NotificationChannel>, level: u32) -> Self {
        Self { channel, level }
    }

    fn relay(&self, record: NotifyRecord) {
        debug!(%record, "relaying watcher event");
        let mut guard = self.channel.acquire_with_level(self.level);
        let _ = writeln!(guard, "{record}");
    }
}

impl ThreadObserver for ChannelThreadObserver {
    fn on_thread_attach(&self, thread_id: u32) {
        self.relay(NotifyRecord::new(NotifyPayload::ThreadAttach { thread_id }));
    }

    fn on_thread_detach(&self, thread_id: u32) {
        self.relay(NotifyRecord::new(NotifyPayload::ThreadDetach { thread_id }));
    }
}
