//! Bounded notification listener used by Sync
//!
//! Races the peripheral's notification stream against a fixed window. Each
//! distinct payload (compared by value) is reported once, in arrival order.
//! Whatever is still buffered when the window closes was delivered in time and
//! is drained; the stream is then dropped, so anything later is lost.

use std::collections::HashSet;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use gattmaster_proto::{Notification, NotificationStream};
use tokio::time::Instant;
use tracing::{debug, trace};

pub const DEFAULT_LISTEN_WINDOW: Duration = Duration::from_millis(4000);

/// Upper bound on the post-deadline drain, so a flooding peripheral cannot
/// hold the prompt
const MAX_DRAIN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenState {
    Armed,
    Listening,
    /// The window elapsed
    Expired,
    /// The stream ended before the window did
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenSummary {
    pub state: ListenState,
    pub reported: usize,
    pub duplicates: usize,
    /// Events from some other peripheral
    pub foreign: usize,
}

pub struct NotificationListener {
    peripheral_id: String,
    window: Duration,
    seen: HashSet<Vec<u8>>,
    summary: ListenSummary,
}

impl NotificationListener {
    pub fn arm(peripheral_id: &str, window: Duration) -> Self {
        Self {
            peripheral_id: peripheral_id.to_string(),
            window,
            seen: HashSet::new(),
            summary: ListenSummary {
                state: ListenState::Armed,
                reported: 0,
                duplicates: 0,
                foreign: 0,
            },
        }
    }

    pub fn state(&self) -> ListenState {
        self.summary.state
    }

    /// Listen until the window expires or the stream ends
    pub async fn listen<F>(
        mut self,
        mut stream: NotificationStream,
        mut on_notification: F,
    ) -> ListenSummary
    where
        F: FnMut(&Notification),
    {
        self.summary.state = ListenState::Listening;
        let deadline = tokio::time::sleep_until(Instant::now() + self.window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Some(notification) => self.accept(notification, &mut on_notification),
                    None => {
                        self.summary.state = ListenState::Closed;
                        break;
                    }
                },
                () = &mut deadline => {
                    self.summary.state = ListenState::Expired;
                    break;
                }
            }
        }

        if self.summary.state == ListenState::Expired {
            for _ in 0..MAX_DRAIN {
                match stream.next().now_or_never() {
                    Some(Some(notification)) => self.accept(notification, &mut on_notification),
                    _ => break,
                }
            }
        }

        debug!(
            state = ?self.summary.state,
            reported = self.summary.reported,
            duplicates = self.summary.duplicates,
            "notification window finished"
        );
        self.summary
    }

    fn accept<F>(&mut self, notification: Notification, on_notification: &mut F)
    where
        F: FnMut(&Notification),
    {
        if notification.peripheral_id != self.peripheral_id {
            trace!(
                from = %notification.peripheral_id,
                "ignoring notification from another peripheral"
            );
            self.summary.foreign += 1;
            return;
        }

        if self.seen.insert(notification.value.clone()) {
            self.summary.reported += 1;
            on_notification(&notification);
        } else {
            self.summary.duplicates += 1;
        }
    }
}
