use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::StrandedReservation;
use crate::services::commerce::CheckoutMode;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event and logs instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!(error = %e, "Dropping checkout event");
        }
    }
}

/// Events emitted by checkout and cancellation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        mode: CheckoutMode,
    },
    /// A retried checkout resolved to an existing order.
    OrderReplayed { order_id: Uuid, user_id: Uuid },
    OrderCancelled { order_id: Uuid, mode: CheckoutMode },
    /// A unit of work ran without a storage transaction.
    CheckoutDegraded { user_id: Option<Uuid> },
    /// Stock stayed decremented after a degraded checkout failed.
    InventoryDrift {
        user_id: Option<Uuid>,
        stranded: Vec<StrandedReservation>,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated {
                order_id,
                user_id,
                mode,
            } => info!(%order_id, %user_id, ?mode, "Order created"),
            Event::OrderReplayed { order_id, user_id } => {
                info!(%order_id, %user_id, "Checkout replayed existing order")
            }
            Event::OrderCancelled { order_id, mode } => {
                info!(%order_id, ?mode, "Order cancelled")
            }
            Event::CheckoutDegraded { user_id } => {
                warn!(?user_id, "Checkout ran without a storage transaction")
            }
            Event::InventoryDrift { user_id, stranded } => {
                for line in &stranded {
                    warn!(
                        category = "inventory_drift",
                        ?user_id,
                        product_id = %line.product_id,
                        variant_id = ?line.variant_id,
                        quantity = line.quantity,
                        "Reservation requires manual reconciliation"
                    );
                }
            }
        }
    }

    info!("Event processing loop finished");
}
