//! # Topic Following
//!
//! Backfill a topic set from history, then follow it live. The live
//! subscription is opened first so nothing published during the backfill is
//! lost; a message may therefore arrive twice and consumers must tolerate
//! that.

use pm_02_event_cache::CacheSink;
use shared_bus::{Capability, ContentTopic, QueryOptions, Transport, TransportMessage};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Deliver every history and live message on `topics` to `on_message`.
///
/// Marks `sink` live once the backfill is done. Returns when the transport
/// closes or `sink` is torn down.
pub(crate) async fn follow_topics<V, F>(
    transport: Arc<dyn Transport>,
    topics: Vec<ContentTopic>,
    page_size: usize,
    peer_timeout: Duration,
    sink: CacheSink<V>,
    mut on_message: F,
) where
    V: Clone + Send + 'static,
    F: FnMut(&TransportMessage) + Send,
{
    let mut live = match transport.subscribe_live(&topics).await {
        Ok(live) => live,
        Err(e) => {
            warn!(?topics, error = %e, "Live subscription failed");
            return;
        }
    };

    let options = QueryOptions {
        page_size,
        ..QueryOptions::default()
    };
    let backfill = match transport
        .wait_for_capability(Capability::Store, peer_timeout)
        .await
    {
        Ok(()) => {
            transport
                .query_history(&topics, options, &mut |page| {
                    page.iter().for_each(&mut on_message);
                    ControlFlow::Continue(())
                })
                .await
        }
        Err(e) => Err(e),
    };
    match backfill {
        Ok(outcome) => debug!(?topics, delivered = outcome.delivered, "Backfill complete"),
        // A missing store peer only costs history; live delivery still works.
        Err(e) => warn!(?topics, error = %e, "Backfill failed, following live only"),
    }
    sink.backfill_complete();

    while let Some(message) = live.recv().await {
        if sink.is_closed() {
            break;
        }
        on_message(&message);
    }
}
