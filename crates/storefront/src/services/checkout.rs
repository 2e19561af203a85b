//! Checkout orchestration.
//!
//! Drives a [`CheckoutSession`] through shipping, review and payment, calling
//! the shipping aggregator and the payment processor along the way. After
//! the processor confirms a payment the service buys a label, writes the
//! order and shipment, and clears the cart.
//!
//! The order is written from the cart lines the intent was priced from, not
//! from the live cart, and only when the captured amount matches them.
//! Once a payment has succeeded every failure becomes
//! [`CheckoutFlowError::OrderCreationFailed`] and an orphaned-payment row is
//! recorded. Order creation is keyed by payment intent id, so the client can
//! retry `complete` without creating a second order or buying a second label.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use threadline_core::{
    Cart, CheckoutError, CheckoutSession, CheckoutStep, CurrencyCode, MoneyError, OrderStatus,
    PaymentIntentHandle, PaymentStatus, ShipmentStatus, ShippingAddress, ShippingRate, UserId,
    calculate_order_total, parcel_weight_kg,
};

use crate::db::{RepositoryError, Stores};
use crate::models::{NewOrder, NewShipment, NewTrackingEvent, Order, OrphanedPayment, Shipment};
use crate::payments::{CreateIntent, PaymentError, PaymentGateway};
use crate::shipping::{RateRequest, ShippingError, ShippingProvider, Transaction};

use super::retry::with_retry;

/// Errors from the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutFlowError {
    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("shipping error: {0}")]
    Shipping(#[from] ShippingError),

    #[error("payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("invalid order total: {0}")]
    Money(#[from] MoneyError),

    /// The processor has not captured the payment.
    #[error("payment has not succeeded (status: {status})")]
    PaymentNotSucceeded { status: String },

    /// Payment succeeded but the order could not be recorded.
    #[error("payment {payment_intent_id} succeeded but order creation failed: {reason}")]
    OrderCreationFailed {
        payment_intent_id: String,
        reason: String,
    },
}

/// Result of a completed checkout.
#[derive(Debug, Clone)]
pub struct CompletedCheckout {
    pub order: Order,
    pub shipment: Shipment,
    /// `false` when a previous attempt had already created the order.
    pub created: bool,
}

impl CompletedCheckout {
    /// Where the browser goes next.
    #[must_use]
    pub fn redirect_url(&self) -> String {
        format!("/checkout/success?order={}", self.order.id)
    }
}

/// Checkout service for one request.
pub struct CheckoutService<'a> {
    stores: &'a Stores,
    payments: &'a dyn PaymentGateway,
    shipping: &'a dyn ShippingProvider,
    currency: CurrencyCode,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        stores: &'a Stores,
        payments: &'a dyn PaymentGateway,
        shipping: &'a dyn ShippingProvider,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            stores,
            payments,
            shipping,
            currency,
        }
    }

    /// Begin checkout, prefilled with the member's last address.
    #[instrument(skip(self))]
    pub async fn start(&self, user: Option<UserId>) -> CheckoutSession {
        let saved = match user {
            Some(user_id) => match self.stores.addresses.saved_address(user_id).await {
                Ok(address) => address,
                Err(e) => {
                    warn!(error = %e, "Could not load saved address");
                    None
                }
            },
            None => None,
        };
        CheckoutSession::new(saved)
    }

    /// Validate the address, fetch rates for the cart's parcel and store them.
    ///
    /// # Errors
    ///
    /// Returns `Checkout` for an empty cart, a wrong step or invalid fields,
    /// and `Shipping` if the aggregator call fails.
    #[instrument(skip(self, session, cart, address))]
    pub async fn submit_address(
        &self,
        session: &mut CheckoutSession,
        cart: &Cart,
        address: ShippingAddress,
        user: Option<UserId>,
    ) -> Result<Vec<ShippingRate>, CheckoutFlowError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart.into());
        }
        session.set_address(address)?;
        let address = session.address.clone().ok_or(CheckoutError::MissingAddress)?;

        if let Some(user_id) = user
            && let Err(e) = self.stores.addresses.save_address(user_id, &address).await
        {
            warn!(error = %e, "Could not save shipping address");
        }

        let request = RateRequest {
            to: address,
            weight_kg: parcel_weight_kg(cart.items()),
        };
        let rates = self.shipping.get_rates(&request).await?;
        info!(count = rates.len(), "Fetched shipping rates");

        session.set_rates(rates.clone())?;
        Ok(rates)
    }

    /// Review -> Payment.
    ///
    /// The intent already held by the session is reused when the cart still
    /// prices to its amount. Repeating the step during payment hands back
    /// the open intent.
    ///
    /// # Errors
    ///
    /// Fails without a network call outside the review and payment steps or
    /// with an empty cart; returns `Payment` if intent creation fails.
    #[instrument(skip(self, session, cart))]
    pub async fn continue_to_payment(
        &self,
        session: &mut CheckoutSession,
        cart: &Cart,
        user: Option<UserId>,
    ) -> Result<PaymentIntentHandle, CheckoutFlowError> {
        match session.step {
            CheckoutStep::Review => {}
            CheckoutStep::Payment => {
                let open = session
                    .existing_payment()
                    .cloned()
                    .ok_or(CheckoutError::MissingClientSecret)?;
                info!(payment_intent_id = %open.payment_intent_id, "Payment already open");
                return Ok(open);
            }
            from => {
                return Err(CheckoutError::InvalidTransition {
                    from,
                    action: "continue to payment",
                }
                .into());
            }
        }
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart.into());
        }

        let rate = session
            .selected_rate()
            .cloned()
            .ok_or(CheckoutError::NoRateSelected)?;
        let amount = calculate_order_total(cart.items(), rate.price).total_minor_units()?;

        if let Some(existing) = session.existing_payment().cloned() {
            if existing.amount_minor == amount && session.items == cart.items() {
                info!(payment_intent_id = %existing.payment_intent_id, "Reusing payment intent");
                session.enter_payment(existing.clone(), cart.items().to_vec())?;
                return Ok(existing);
            }
            info!(
                payment_intent_id = %existing.payment_intent_id,
                previous_minor = existing.amount_minor,
                amount_minor = amount,
                "Cart changed since the intent was created"
            );
        }

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "user_id".to_owned(),
            user.map_or_else(|| "guest".to_owned(), |u| u.to_string()),
        );
        metadata.insert("rate_id".to_owned(), rate.id.clone());
        metadata.insert("item_count".to_owned(), cart.total_quantity().to_string());

        let intent = self
            .payments
            .create_intent(&CreateIntent {
                amount,
                currency: self.currency,
                receipt_email: session.address.as_ref().map(|a| a.email.clone()),
                metadata,
            })
            .await?;

        let client_secret = intent
            .client_secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::Parse("payment intent has no client secret".to_owned()))?;

        let handle = PaymentIntentHandle {
            client_secret,
            payment_intent_id: intent.id,
            amount_minor: intent.amount,
        };
        session.enter_payment(handle.clone(), cart.items().to_vec())?;
        Ok(handle)
    }

    /// Finish checkout after the browser confirmed the payment.
    ///
    /// # Errors
    ///
    /// - `Checkout` without a network call when the session holds no client
    ///   secret or a different intent
    /// - `PaymentNotSucceeded` when the processor has not captured it
    /// - `OrderCreationFailed` for any failure after a captured payment
    #[instrument(skip(self, session, cart))]
    pub async fn complete(
        &self,
        session: &mut CheckoutSession,
        cart: &mut Cart,
        payment_intent_id: &str,
        user: Option<UserId>,
    ) -> Result<CompletedCheckout, CheckoutFlowError> {
        session.authorize_completion(payment_intent_id)?;

        let intent = self.payments.retrieve_intent(payment_intent_id).await?;
        if !intent.is_succeeded() {
            return Err(CheckoutFlowError::PaymentNotSucceeded {
                status: intent.status,
            });
        }

        let completed = match self
            .record_order(session, payment_intent_id, intent.amount, user)
            .await
        {
            Ok(completed) => completed,
            Err(reason) => {
                error!(payment_intent_id, %reason, "Payment succeeded but order creation failed");
                self.record_orphan(session, payment_intent_id, intent.amount, &reason)
                    .await;
                return Err(CheckoutFlowError::OrderCreationFailed {
                    payment_intent_id: payment_intent_id.to_owned(),
                    reason,
                });
            }
        };

        session.mark_complete(completed.order.id)?;
        cart.clear();
        if let Some(user_id) = user
            && let Err(e) = with_retry("clear cart", || self.stores.carts.clear(user_id)).await
        {
            warn!(error = %e, "Could not clear remote cart after checkout");
        }

        info!(order_id = %completed.order.id, created = completed.created, "Checkout complete");
        Ok(completed)
    }

    /// Steps after a captured payment. Errors are reported as text because
    /// they all collapse into `OrderCreationFailed`.
    async fn record_order(
        &self,
        session: &CheckoutSession,
        payment_intent_id: &str,
        captured_minor: i64,
        user: Option<UserId>,
    ) -> Result<CompletedCheckout, String> {
        let rate = session
            .selected_rate()
            .cloned()
            .ok_or_else(|| CheckoutError::NoRateSelected.to_string())?;
        let address = session
            .address
            .clone()
            .ok_or_else(|| CheckoutError::MissingAddress.to_string())?;

        let existing = self
            .stores
            .orders
            .order_by_payment_intent(payment_intent_id)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(order) = existing {
            // A previous attempt got this far; finish without buying again.
            let shipment = self
                .create_shipment(&order, &rate, None)
                .await
                .map_err(|e| e.to_string())?;
            self.record_label_event(&shipment)
                .await
                .map_err(|e| e.to_string())?;
            return Ok(CompletedCheckout {
                order,
                shipment,
                created: false,
            });
        }

        if session.items.is_empty() {
            return Err(CheckoutError::EmptyCart.to_string());
        }
        let totals = calculate_order_total(&session.items, rate.price);
        let expected_minor = totals.total_minor_units().map_err(|e| e.to_string())?;
        if expected_minor != captured_minor {
            return Err(format!(
                "captured {captured_minor} minor units but the checkout totals {expected_minor}"
            ));
        }

        let label = match self.shipping.purchase_label(&rate.id).await {
            Ok(transaction) => Some(transaction),
            Err(e) => {
                warn!(error = %e, rate_id = %rate.id, "Label purchase failed; shipment left pending");
                None
            }
        };

        // The processor already reports the intent as succeeded, so the
        // order starts out confirmed.
        let new_order = NewOrder {
            user_id: user,
            payment_intent_id: payment_intent_id.to_owned(),
            subtotal: totals.subtotal,
            shipping_cost: totals.shipping,
            tax: totals.tax,
            total: totals.total,
            currency: self.currency.as_str().to_owned(),
            status: OrderStatus::Completed,
            payment_status: PaymentStatus::Paid,
            items: session.items.clone(),
            email: address.email.clone(),
            shipping_address: address,
            shipping_details: (&rate).into(),
            tracking_number: label.as_ref().and_then(|l| l.tracking_number.clone()),
            label_url: label.as_ref().and_then(|l| l.label_url.clone()),
        };

        let inserted = self
            .stores
            .orders
            .create_order(&new_order)
            .await
            .map_err(|e| e.to_string())?;

        let shipment = self
            .create_shipment(&inserted.order, &rate, label.as_ref())
            .await
            .map_err(|e| e.to_string())?;
        self.record_label_event(&shipment)
            .await
            .map_err(|e| e.to_string())?;

        Ok(CompletedCheckout {
            order: inserted.order,
            shipment,
            created: inserted.created,
        })
    }

    /// First tracking event for a labelled shipment. Skipped when the
    /// shipment has no tracking number or already has events.
    async fn record_label_event(&self, shipment: &Shipment) -> Result<(), RepositoryError> {
        let Some(tracking_number) = &shipment.tracking_number else {
            return Ok(());
        };
        if !self
            .stores
            .shipments
            .tracking_events(shipment.id)
            .await?
            .is_empty()
        {
            return Ok(());
        }
        let event = NewTrackingEvent {
            shipment_id: shipment.id,
            status: shipment.status,
            status_details: format!("Label created, tracking number {tracking_number}"),
            location: None,
            occurred_at: Utc::now(),
        };
        self.stores.shipments.add_tracking_event(&event).await?;
        Ok(())
    }

    async fn create_shipment(
        &self,
        order: &Order,
        rate: &ShippingRate,
        label: Option<&Transaction>,
    ) -> Result<Shipment, RepositoryError> {
        let status = if label.is_some() || order.tracking_number.is_some() {
            ShipmentStatus::PreTransit
        } else {
            ShipmentStatus::Pending
        };

        let shipment = NewShipment {
            order_id: order.id,
            carrier: rate.provider.clone(),
            tracking_number: order.tracking_number.clone(),
            rate_id: rate.id.clone(),
            status,
            label_url: order.label_url.clone(),
            estimated_delivery: label.and_then(|l| l.eta),
        };
        self.stores.shipments.create_shipment(&shipment).await
    }

    async fn record_orphan(
        &self,
        session: &CheckoutSession,
        payment_intent_id: &str,
        captured_minor: i64,
        reason: &str,
    ) {
        let orphan = OrphanedPayment {
            payment_intent_id: payment_intent_id.to_owned(),
            amount: Decimal::new(captured_minor, 2),
            email: session.address.as_ref().map(|a| a.email.clone()),
            error: reason.to_owned(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.stores.orders.record_orphaned_payment(&orphan).await {
            error!(payment_intent_id, error = %e, "Could not record orphaned payment");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use threadline_core::{CartItem, ProductId};

    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::{OrderStore, ShipmentStore};
    use crate::payments::PaymentIntent;
    use crate::shipping::Track;

    #[derive(Default)]
    struct FakePayments {
        calls: AtomicUsize,
        status: Mutex<String>,
        created: Mutex<Vec<i64>>,
        captured: Mutex<Option<i64>>,
    }

    impl FakePayments {
        fn succeeding() -> Self {
            let fake = Self::default();
            *fake.status.lock().unwrap() = "succeeded".to_owned();
            fake
        }
    }

    #[async_trait]
    impl PaymentGateway for FakePayments {
        async fn create_intent(
            &self,
            request: &CreateIntent,
        ) -> Result<crate::payments::PaymentIntent, PaymentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.created.lock().unwrap().push(request.amount);
            Ok(PaymentIntent {
                id: "pi_test".to_owned(),
                amount: request.amount,
                currency: request.currency.as_str().to_owned(),
                status: "requires_payment_method".to_owned(),
                client_secret: Some("pi_test_secret_abc".to_owned()),
                receipt_email: request.receipt_email.clone(),
                metadata: request.metadata.clone(),
            })
        }

        async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PaymentIntent {
                id: id.to_owned(),
                amount: self.captured.lock().unwrap().unwrap_or(1_080_000),
                currency: "usd".to_owned(),
                status: self.status.lock().unwrap().clone(),
                client_secret: None,
                receipt_email: None,
                metadata: BTreeMap::new(),
            })
        }
    }

    struct FakeShipping {
        label_ok: bool,
        labels_bought: AtomicUsize,
    }

    impl FakeShipping {
        fn new(label_ok: bool) -> Self {
            Self {
                label_ok,
                labels_bought: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ShippingProvider for FakeShipping {
        async fn get_rates(&self, _: &RateRequest) -> Result<Vec<ShippingRate>, ShippingError> {
            Ok(vec![ShippingRate {
                id: "rate_ground".to_owned(),
                provider: "USPS".to_owned(),
                service: "Ground Advantage".to_owned(),
                price: Decimal::from(300),
                currency: "USD".to_owned(),
                estimated_days: Some(4),
                duration_terms: None,
            }])
        }

        async fn purchase_label(&self, _: &str) -> Result<Transaction, ShippingError> {
            if !self.label_ok {
                return Err(ShippingError::LabelFailed("carrier down".to_owned()));
            }
            self.labels_bought.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::from_value(serde_json::json!({
                "object_id": "tx_1",
                "status": "SUCCESS",
                "tracking_number": "9400111",
                "label_url": "https://labels.example/tx_1.pdf"
            }))
            .unwrap())
        }

        async fn track(&self, _: &str, _: &str) -> Result<Track, ShippingError> {
            Err(ShippingError::Api {
                status: 404,
                message: "not used".to_owned(),
            })
        }
    }

    fn cart() -> Cart {
        Cart::from_items([CartItem {
            product_id: ProductId::new("coat"),
            name: "Wool Coat".to_owned(),
            price: Decimal::from(5000),
            quantity: 2,
            size: Some("M".to_owned()),
            image: None,
            description: None,
            color: None,
            weight: None,
        }])
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Grace Hopper".to_owned(),
            street1: "1 Compiler Ct".to_owned(),
            street2: None,
            city: "Arlington".to_owned(),
            state: "VA".to_owned(),
            postal_code: "22201".to_owned(),
            country: "US".to_owned(),
            phone: "703-555-0199".to_owned(),
            email: "grace@example.com".to_owned(),
        }
    }

    async fn session_at_payment(service: &CheckoutService<'_>, cart: &Cart) -> CheckoutSession {
        let mut session = service.start(None).await;
        service
            .submit_address(&mut session, cart, address(), None)
            .await
            .unwrap();
        session.select_rate("rate_ground").unwrap();
        session.continue_to_review().unwrap();
        service
            .continue_to_payment(&mut session, cart, None)
            .await
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_end_to_end_order_with_label() {
        let (stores, memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        assert_eq!(*payments.created.lock().unwrap(), vec![1_080_000]);

        let done = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap();

        assert_eq!(done.order.subtotal, Decimal::from(10000));
        assert_eq!(done.order.tax, Decimal::from(500));
        assert_eq!(done.order.total, Decimal::from(10800));
        assert_eq!(done.order.status, OrderStatus::Completed);
        assert_eq!(done.order.payment_status, PaymentStatus::Paid);
        assert!(done.order.guest_mode);
        assert_eq!(done.shipment.status, ShipmentStatus::PreTransit);
        assert_eq!(done.shipment.tracking_number.as_deref(), Some("9400111"));
        assert_eq!(done.redirect_url(), format!("/checkout/success?order={}", done.order.id));
        assert_eq!(memory.all_orders().await.len(), 1);
        assert_eq!(
            memory.tracking_events(done.shipment.id).await.unwrap().len(),
            1
        );
        assert!(cart.is_empty());
        assert_eq!(session.step, CheckoutStep::Complete);
    }

    #[tokio::test]
    async fn test_label_failure_leaves_shipment_pending() {
        let (stores, _memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(false);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        let done = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap();

        assert_eq!(done.order.total, Decimal::from(10800));
        assert_eq!(done.shipment.status, ShipmentStatus::Pending);
        assert!(done.shipment.tracking_number.is_none());
        assert!(done.order.label_url.is_none());
    }

    #[tokio::test]
    async fn test_complete_without_client_secret_makes_no_call() {
        let (stores, _memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut session = CheckoutSession {
            step: CheckoutStep::Payment,
            ..CheckoutSession::default()
        };

        let err = service
            .complete(&mut session, &mut cart(), "pi_test", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CheckoutFlowError::Checkout(CheckoutError::MissingClientSecret)
        ));
        assert_eq!(payments.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_existing_intent_is_reused() {
        let (stores, _memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        let again = service
            .continue_to_payment(&mut session, &cart, None)
            .await
            .unwrap();
        assert_eq!(again.payment_intent_id, "pi_test");
        assert_eq!(session.step, CheckoutStep::Payment);

        session.back_to_review().unwrap();
        let handle = service
            .continue_to_payment(&mut session, &cart, None)
            .await
            .unwrap();

        assert_eq!(handle.payment_intent_id, "pi_test");
        assert_eq!(payments.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_cart_gets_a_fresh_intent() {
        let (stores, _memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        session.back_to_review().unwrap();
        cart.update_quantity(&ProductId::new("coat"), 1);
        service
            .continue_to_payment(&mut session, &cart, None)
            .await
            .unwrap();

        assert_eq!(*payments.created.lock().unwrap(), vec![1_080_000, 555_000]);
        assert_eq!(session.items, cart.items());
    }

    #[tokio::test]
    async fn test_order_uses_the_lines_that_were_charged() {
        let (stores, _memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        // Lines that reach the cart after the intent was priced.
        cart.add_item(CartItem {
            product_id: ProductId::new("linen-shirt"),
            name: "Linen Shirt".to_owned(),
            price: Decimal::from(4500),
            quantity: 5,
            size: None,
            image: None,
            description: None,
            color: None,
            weight: None,
        });

        let done = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap();

        assert_eq!(done.order.total, Decimal::from(10800));
        assert_eq!(done.order.items.len(), 1);
        assert_eq!(done.order.items[0].product_id, ProductId::new("coat"));
    }

    #[tokio::test]
    async fn test_captured_amount_mismatch_is_orphaned() {
        let (stores, memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;
        *payments.captured.lock().unwrap() = Some(160_000);

        let err = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutFlowError::OrderCreationFailed { .. }));
        assert!(memory.all_orders().await.is_empty());
        assert_eq!(shipping.labels_bought.load(Ordering::SeqCst), 0);
        let orphans = memory.orphaned_payments().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].amount, Decimal::from(1600));
    }

    #[tokio::test]
    async fn test_unconfirmed_payment_creates_nothing() {
        let (stores, memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;
        *payments.status.lock().unwrap() = "requires_action".to_owned();

        let err = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap_err();

        assert!(matches!(err, CheckoutFlowError::PaymentNotSucceeded { .. }));
        assert!(memory.all_orders().await.is_empty());
        assert!(!cart.is_empty());
    }

    #[tokio::test]
    async fn test_order_failure_records_orphan_and_retry_succeeds() {
        let (stores, memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        memory.fail_next_writes(1);
        let err = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutFlowError::OrderCreationFailed { ref payment_intent_id, .. } if payment_intent_id == "pi_test"
        ));
        let orphans = memory.orphaned_payments().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].amount, Decimal::from(10800));

        let done = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap();
        assert!(done.created);
        assert_eq!(memory.all_orders().await.len(), 1);
        assert!(memory.orphaned_payments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_after_shipment_failure_does_not_buy_second_label() {
        let (stores, memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let mut cart = cart();
        let mut session = session_at_payment(&service, &cart).await;

        // An earlier attempt wrote the order, then failed before the shipment.
        let pending = NewOrder {
            user_id: None,
            payment_intent_id: "pi_test".to_owned(),
            subtotal: Decimal::from(10000),
            shipping_cost: Decimal::from(300),
            tax: Decimal::from(500),
            total: Decimal::from(10800),
            currency: "usd".to_owned(),
            status: OrderStatus::Processing,
            payment_status: PaymentStatus::Paid,
            items: cart.items().to_vec(),
            shipping_address: address(),
            shipping_details: session.selected_rate().unwrap().into(),
            tracking_number: Some("9400111".to_owned()),
            label_url: None,
            email: "grace@example.com".to_owned(),
        };
        memory.create_order(&pending).await.unwrap();

        let done = service
            .complete(&mut session, &mut cart, "pi_test", None)
            .await
            .unwrap();

        assert!(!done.created);
        assert_eq!(shipping.labels_bought.load(Ordering::SeqCst), 0);
        assert_eq!(done.shipment.status, ShipmentStatus::PreTransit);
        let events = memory.tracking_events(done.shipment.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(
            memory
                .shipment_for_order(done.order.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_member_checkout_saves_address_and_clears_remote_cart() {
        let (stores, memory) = Stores::in_memory();
        let payments = FakePayments::succeeding();
        let shipping = FakeShipping::new(true);
        let service = CheckoutService::new(&stores, &payments, &shipping, CurrencyCode::USD);
        let user = UserId::generate();
        let mut cart = cart();
        stores.carts.replace(user, cart.items()).await.unwrap();

        let mut session = service.start(Some(user)).await;
        service
            .submit_address(&mut session, &cart, address(), Some(user))
            .await
            .unwrap();
        session.select_rate("rate_ground").unwrap();
        session.continue_to_review().unwrap();
        service
            .continue_to_payment(&mut session, &cart, Some(user))
            .await
            .unwrap();
        let done = service
            .complete(&mut session, &mut cart, "pi_test", Some(user))
            .await
            .unwrap();

        assert_eq!(done.order.user_id, Some(user));
        assert!(!done.order.guest_mode);
        assert!(stores.carts.load(user).await.unwrap().is_empty());

        let next = service.start(Some(user)).await;
        assert_eq!(next.address.unwrap().email, "grace@example.com");
        assert_eq!(memory.all_orders().await.len(), 1);
    }
}
