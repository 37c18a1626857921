//! Cross-instance broadcast relay: store channel in, local hub fan-out out.

use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream::BoxStream};
use tokio::{task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    dao::{game_store::GameStore, models::ChannelMessage, storage::StorageResult},
    services::hub::HubHandle,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Subscribe to every game channel and forward each payload verbatim to the hub.
///
/// The first subscription is established before returning so that events
/// published right after startup are not missed. Later losses are retried with
/// exponential backoff; messages published meanwhile are gone. The task ends
/// once the hub has stopped.
pub async fn start(store: Arc<dyn GameStore>, hub: HubHandle) -> StorageResult<JoinHandle<()>> {
    let first = store.subscribe().await?;
    info!("broadcast relay subscribed");

    Ok(tokio::spawn(async move {
        let mut stream = first;
        loop {
            while let Some(message) = stream.next().await {
                let delivered = hub.broadcast_to_game(&message.game_id, &message.payload);
                debug!(game_id = %message.game_id, delivered, "relayed game event");
            }

            if hub.is_closed() {
                break;
            }
            warn!("broadcast subscription lost; resubscribing");
            match resubscribe(store.as_ref(), &hub).await {
                Some(next) => stream = next,
                None => break,
            }
        }
        info!("broadcast relay stopped");
    }))
}

async fn resubscribe(
    store: &dyn GameStore,
    hub: &HubHandle,
) -> Option<BoxStream<'static, ChannelMessage>> {
    let mut delay = INITIAL_BACKOFF;
    loop {
        sleep(delay).await;
        if hub.is_closed() {
            return None;
        }
        match store.subscribe().await {
            Ok(stream) => {
                info!("broadcast relay resubscribed");
                return Some(stream);
            }
            Err(err) => {
                delay = (delay * 2).min(MAX_BACKOFF);
                warn!(error = %err, retry_in = ?delay, "resubscribe failed");
            }
        }
    }
}
