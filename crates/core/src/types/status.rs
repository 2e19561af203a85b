//! Status enums for orders, payments, shipments and accounts.
//!
//! Statuses are stored as `TEXT` columns and exchanged as snake_case strings,
//! so every enum here has `as_str`, `Display` and `FromStr`.

use serde::{Deserialize, Serialize};

/// A status string did not match any known variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct StatusParseError {
    /// Which status type was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Database / wire representation.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = StatusParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(StatusParseError {
                        kind: $kind,
                        value: s.to_owned(),
                    }),
                }
            }
        }
    };
}

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    /// Payment confirmed by the processor.
    Completed,
    Shipped,
    Delivered,
    Cancelled,
}

text_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Pending and processing orders still wait on the processor. A payment
    /// confirmation never moves an order out of any later status.
    #[must_use]
    pub const fn awaits_payment(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

text_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

/// Shipment status, mirroring the shipping aggregator's tracking states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// No label purchased yet (or label purchase failed).
    #[default]
    Pending,
    PreTransit,
    Transit,
    Delivered,
    Returned,
    Failure,
    Unknown,
}

text_enum!(ShipmentStatus, "shipment status", {
    Pending => "pending",
    PreTransit => "pre_transit",
    Transit => "transit",
    Delivered => "delivered",
    Returned => "returned",
    Failure => "failure",
    Unknown => "unknown",
});

impl ShipmentStatus {
    /// Map a carrier tracking status (`PRE_TRANSIT`, `TRANSIT`, ...) as
    /// reported by the aggregator. Unrecognized values become `Unknown`.
    #[must_use]
    pub fn from_tracking(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PRE_TRANSIT" => Self::PreTransit,
            "TRANSIT" => Self::Transit,
            "DELIVERED" => Self::Delivered,
            "RETURNED" => Self::Returned,
            "FAILURE" => Self::Failure,
            _ => Self::Unknown,
        }
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular shopper.
    #[default]
    Customer,
    /// Can view all orders and override statuses.
    Admin,
}

text_enum!(UserRole, "user role", {
    Customer => "customer",
    Admin => "admin",
});
