//! Domain models for storefront.

pub mod order;
pub mod session;
pub mod user;

pub use order::{
    NewNotification, NewOrder, NewShipment, NewTrackingEvent, Notification, Order, OrderInsert,
    OrphanedPayment, PaymentConfirmation, Shipment, ShippingDetails, TrackingEvent,
};
pub use session::{CurrentUser, keys as session_keys};
pub use user::User;
