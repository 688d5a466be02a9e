//! The client response registry: routes a `Response` produced by any `P2x`
//! worker back to the client that originated the request (the fan-in half
//! of spec §4.5, viewed from the producer side).

use qnet_core::{ClientId, Response};
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

#[derive(Default)]
pub struct ClientRegistry {
    senders: RwLock<HashMap<ClientId, mpsc::UnboundedSender<Response>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client` and returns the receiving half it should drive
    /// its fan-in loop with.
    pub async fn register(&self, client: ClientId) -> mpsc::UnboundedReceiver<Response> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.write().await.insert(client, tx);
        rx
    }

    /// Delivers `response` to its origin client, if still registered.
    /// Responses for clients that have already shut down are dropped
    /// silently — the spec treats "consumed after final outcome" the same
    /// way.
    pub async fn route(&self, response: Response, origin: ClientId) {
        if let Some(tx) = self.senders.read().await.get(&origin) {
            let _ = tx.send(response);
        }
    }
}
