//! Timeout-based failure detection over the last-seen table.
//!
//! There is no dead/alive state: every scan re-derives the set of silent
//! peers from scratch, so a peer keeps being reported on each scan while it
//! stays silent and drops out as soon as a heartbeat arrives again.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::directory::{LastSeen, now_ms};
use crate::event::{EventSink, NodeEvent};
use crate::identity::PeerId;
use crate::shutdown::ShutdownListener;

/// A peer that has been silent longer than the failure timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadPeer {
    pub peer_id: PeerId,
    pub silent_for_ms: u64,
}

/// Periodic scanner that reports silent peers.
pub struct FailureDetector {
    local_id: PeerId,
    last_seen: LastSeen,
    failure_timeout: Duration,
    check_interval: Duration,
    events: EventSink,
}

impl FailureDetector {
    pub fn new(
        local_id: PeerId,
        last_seen: LastSeen,
        failure_timeout: Duration,
        check_interval: Duration,
        events: EventSink,
    ) -> Self {
        Self {
            local_id,
            last_seen,
            failure_timeout,
            check_interval,
            events,
        }
    }

    /// Peers whose last heartbeat is strictly older than the timeout at
    /// `now_ms`, ordered by id. The local peer is never reported.
    pub fn scan(&self, now_ms: u64) -> Vec<DeadPeer> {
        let timeout_ms = u64::try_from(self.failure_timeout.as_millis()).unwrap_or(u64::MAX);

        let mut dead: Vec<DeadPeer> = self
            .last_seen
            .snapshot()
            .into_iter()
            .filter(|(id, _)| *id != self.local_id)
            .filter_map(|(peer_id, seen_at)| {
                let silent_for_ms = now_ms.saturating_sub(seen_at);
                (silent_for_ms > timeout_ms).then_some(DeadPeer {
                    peer_id,
                    silent_for_ms,
                })
            })
            .collect();

        dead.sort_by_key(|d| d.peer_id);
        dead
    }

    /// Scan every check interval until shutdown, reporting each silent peer.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the immediate first tick; nobody can be late at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for dead in self.scan(now_ms()) {
                        warn!(
                            "Node {} considered DEAD ({} ms no heartbeat)",
                            dead.peer_id, dead.silent_for_ms
                        );
                        self.events.emit(NodeEvent::PeerDead {
                            peer_id: dead.peer_id,
                            silent_for_ms: dead.silent_for_ms,
                        });
                    }
                }
                _ = shutdown.wait() => {
                    debug!("Failure detector shutting down");
                    break;
                }
            }
        }
    }
}
