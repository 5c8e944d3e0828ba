use async_trait::async_trait;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::cart_snapshot::{self, QuotedLine};
use super::checkout_orchestrator::{
    CheckoutMode, Completed, TransactionOrchestrator, UnitOfWork,
};
use super::idempotency;
use super::order_cancellation::CancelOrder;
use super::order_materializer::{self, OrderDraft};
use super::payment_verification::PaymentVerifier;
use super::pricing_service::{compute_totals, ShippingPolicy};
use super::stock_reservation::{self, Reservation};
use crate::config::{AppConfig, TransactionPolicy};
use crate::db::TransactionContext;
use crate::errors::{CheckoutError, StorageError, UniqueConstraint};
use crate::events::{Event, EventSender};
use crate::models::{Order, PaymentMethod, ShippingContact};
use crate::repositories::CheckoutStorage;
use crate::services::coupons::CouponValidator;
use crate::services::payment_gateway::PaymentGateway;

/// Checkout request as submitted by an authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    /// Gateway payment reference, required for card payments
    #[validate(length(min = 1, max = 255))]
    pub payment_reference: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: Option<String>,
    pub idempotency_key: Option<String>,
    #[validate]
    pub shipping: ShippingContact,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// The order was created by an earlier request with the same idempotency key.
    pub already_exists: bool,
    /// How the writes ran; `None` when nothing was written.
    pub mode: Option<CheckoutMode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub order: Order,
    pub mode: CheckoutMode,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub shipping: ShippingPolicy,
    pub transaction_policy: TransactionPolicy,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            shipping: ShippingPolicy::default(),
            transaction_policy: TransactionPolicy::Auto,
        }
    }
}

impl From<&AppConfig> for CheckoutSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            currency: cfg.currency.to_uppercase(),
            shipping: ShippingPolicy::from(cfg),
            transaction_policy: cfg.transaction_policy,
        }
    }
}

enum Placed {
    Created(Order),
    Replayed(Order),
}

/// Reprice, reserve every line, write the order, clear the cart.
struct PlaceOrder {
    draft: OrderDraft,
    shipping: ShippingPolicy,
    coupon_discount: Option<Decimal>,
}

impl PlaceOrder {
    /// The draft priced against the catalog inside the unit of work.
    async fn repriced<S: CheckoutStorage>(
        &self,
        storage: &S,
        ctx: &mut TransactionContext<'_, S::Session>,
    ) -> Result<OrderDraft, CheckoutError> {
        let lines = cart_snapshot::requote(storage, ctx, &self.draft.lines).await?;
        let totals = compute_totals(
            cart_snapshot::subtotal(&lines),
            &self.shipping,
            self.coupon_discount,
        );
        if totals != self.draft.totals {
            warn!(
                quoted = %self.draft.totals.total,
                current = %totals.total,
                "Catalog prices changed during checkout"
            );
        }
        Ok(OrderDraft {
            lines,
            totals,
            ..self.draft.clone()
        })
    }

    async fn reserve_and_materialize<S: CheckoutStorage>(
        draft: &OrderDraft,
        storage: &S,
        ctx: &mut TransactionContext<'_, S::Session>,
        reserved: &mut Vec<Reservation>,
    ) -> Result<Order, CheckoutError> {
        debug!(state = "reserving");
        stock_reservation::reserve_lines(storage, ctx, &draft.lines, reserved).await?;

        debug!(state = "materializing");
        let order = draft.build(chrono::Utc::now());
        order_materializer::materialize(storage, ctx, order, &draft.payment).await
    }
}

#[async_trait]
impl<S> UnitOfWork<S> for PlaceOrder
where
    S: CheckoutStorage,
{
    type Output = Placed;

    async fn run(
        &self,
        storage: &S,
        ctx: &mut TransactionContext<'_, S::Session>,
    ) -> Result<Placed, CheckoutError> {
        let transactional = ctx.is_transactional();

        // A concurrent retry may have committed since the pre-flight lookup.
        let key = self.draft.idempotency_key.as_deref();
        if let Some(existing) =
            idempotency::find_existing(storage, ctx, self.draft.user_id, key).await?
        {
            return Ok(Placed::Replayed(existing));
        }

        let draft = self.repriced(storage, ctx).await?;
        let mut reserved = Vec::with_capacity(draft.lines.len());
        match Self::reserve_and_materialize(&draft, storage, ctx, &mut reserved).await {
            Ok(order) => Ok(Placed::Created(order)),
            Err(err) if !transactional && !reserved.is_empty() => {
                Err(stock_reservation::strand(err, &reserved))
            }
            Err(err) => Err(err),
        }
    }
}

/// Converts carts into orders.
pub struct CheckoutService<S> {
    storage: Arc<S>,
    orchestrator: TransactionOrchestrator<S>,
    payments: PaymentVerifier,
    coupons: Arc<dyn CouponValidator>,
    settings: CheckoutSettings,
    event_sender: EventSender,
}

impl<S> Clone for CheckoutService<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            orchestrator: self.orchestrator.clone(),
            payments: self.payments.clone(),
            coupons: self.coupons.clone(),
            settings: self.settings.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}

impl<S> CheckoutService<S>
where
    S: CheckoutStorage,
{
    pub fn new(
        storage: Arc<S>,
        gateway: Arc<dyn PaymentGateway>,
        coupons: Arc<dyn CouponValidator>,
        settings: CheckoutSettings,
        event_sender: EventSender,
    ) -> Self {
        Self {
            orchestrator: TransactionOrchestrator::new(
                storage.clone(),
                settings.transaction_policy,
            ),
            payments: PaymentVerifier::new(gateway, settings.currency.clone()),
            storage,
            coupons,
            settings,
            event_sender,
        }
    }

    pub fn settings(&self) -> &CheckoutSettings {
        &self.settings
    }

    /// Turns the user's cart into an order.
    ///
    /// Retries with the same idempotency key return the first order with
    /// `already_exists` set and never reserve stock twice.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn checkout(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        request.validate()?;
        let key = idempotency::normalize_key(request.idempotency_key.as_deref())?;

        let mut ctx = TransactionContext::Detached;
        if let Some(existing) =
            idempotency::find_existing(&*self.storage, &mut ctx, user_id, key.as_deref()).await?
        {
            return Ok(self.replayed(existing, None).await);
        }

        let snapshot = match cart_snapshot::read_snapshot(&*self.storage, &mut ctx, user_id).await
        {
            Ok(snapshot) => snapshot,
            Err(CheckoutError::EmptyCart) => {
                // A retry with the same key may have committed and cleared the cart
                // after the lookup above.
                return match idempotency::find_existing(
                    &*self.storage,
                    &mut ctx,
                    user_id,
                    key.as_deref(),
                )
                .await?
                {
                    Some(existing) => Ok(self.replayed(existing, None).await),
                    None => Err(CheckoutError::EmptyCart),
                };
            }
            Err(err) => return Err(err),
        };
        let lines: Vec<QuotedLine> = snapshot.quote()?;
        let subtotal = cart_snapshot::subtotal(&lines);

        let coupon = match request.coupon_code.as_deref() {
            Some(code) => Some(self.coupons.validate(code, user_id, subtotal).await?),
            None => None,
        };
        let coupon_discount = coupon.as_ref().map(|c| c.amount);
        let totals = compute_totals(subtotal, &self.settings.shipping, coupon_discount);

        let payment = self
            .payments
            .verify(
                &*self.storage,
                user_id,
                request.payment_method,
                request.payment_reference.as_deref(),
                totals.total,
            )
            .await?;

        let unit = PlaceOrder {
            draft: OrderDraft {
                user_id,
                lines,
                totals,
                coupon_code: coupon.map(|c| c.code),
                currency: self.settings.currency.clone(),
                payment_method: request.payment_method,
                payment,
                shipping: request.shipping,
                idempotency_key: key.clone(),
            },
            shipping: self.settings.shipping,
            coupon_discount,
        };

        match self.orchestrator.execute(&unit).await {
            Ok(Completed {
                value: Placed::Created(order),
                mode,
            }) => {
                info!(
                    order_id = %order.id,
                    total = %order.total_amount,
                    mode = mode.as_str(),
                    "Checkout completed"
                );
                counter!("stateset_checkout.orders_created", 1, "mode" => mode.as_str());
                if mode == CheckoutMode::Degraded {
                    self.event_sender
                        .send_or_log(Event::CheckoutDegraded {
                            user_id: Some(user_id),
                        })
                        .await;
                }
                self.event_sender
                    .send_or_log(Event::OrderCreated {
                        order_id: order.id,
                        user_id,
                        mode,
                    })
                    .await;
                Ok(CheckoutOutcome {
                    order,
                    already_exists: false,
                    mode: Some(mode),
                })
            }
            Ok(Completed {
                value: Placed::Replayed(order),
                mode,
            }) => Ok(self.replayed(order, Some(mode)).await),
            Err(err) => self.resolve_failure(user_id, key.as_deref(), err).await,
        }
    }

    /// An order owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, CheckoutError> {
        let mut ctx = TransactionContext::Detached;
        self.storage
            .find_by_id(&mut ctx, order_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Cancels a `new` or `processing` order and restores its stock.
    /// `requested_by` limits the cancel to that user's orders.
    #[instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        requested_by: Option<Uuid>,
    ) -> Result<CancellationOutcome, CheckoutError> {
        let unit = CancelOrder {
            order_id,
            requested_by,
        };
        let Completed { value: order, mode } = self.orchestrator.execute(&unit).await?;

        counter!("stateset_checkout.orders_cancelled", 1, "mode" => mode.as_str());
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id: order.id,
                mode,
            })
            .await;
        Ok(CancellationOutcome { order, mode })
    }

    async fn replayed(&self, order: Order, mode: Option<CheckoutMode>) -> CheckoutOutcome {
        info!(order_id = %order.id, "Returning existing order for idempotent retry");
        counter!("stateset_checkout.replays", 1);
        self.event_sender
            .send_or_log(Event::OrderReplayed {
                order_id: order.id,
                user_id: order.user_id,
            })
            .await;
        CheckoutOutcome {
            order,
            already_exists: true,
            mode,
        }
    }

    async fn resolve_failure(
        &self,
        user_id: Uuid,
        key: Option<&str>,
        err: CheckoutError,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if let CheckoutError::StrandedReservations { stranded, .. } = &err {
            self.event_sender
                .send_or_log(Event::InventoryDrift {
                    user_id: Some(user_id),
                    stranded: stranded.clone(),
                })
                .await;
        }

        // The unique index caught a concurrent request with the same key.
        let lost_idempotency_race = matches!(
            err.root(),
            CheckoutError::StorageFailure(StorageError::UniqueViolation {
                constraint: UniqueConstraint::IdempotencyKey,
                ..
            })
        );
        if let (true, Some(key)) = (lost_idempotency_race, key) {
            let mut ctx = TransactionContext::Detached;
            if let Some(existing) = self
                .storage
                .find_by_idempotency_key(&mut ctx, user_id, key)
                .await?
            {
                return Ok(self.replayed(existing, None).await);
            }
        }

        Err(err)
    }
}
