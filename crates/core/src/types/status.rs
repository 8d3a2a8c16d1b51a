//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Cart lifecycle status.
///
/// `shopping → pending_payment / paid / shipping → completed`, or `delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "market.cart_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Shopping,
    PendingPayment,
    Paid,
    Shipping,
    Completed,
    Delivered,
}

impl CartStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::Shopping,
        Self::PendingPayment,
        Self::Paid,
        Self::Shipping,
        Self::Completed,
        Self::Delivered,
    ];

    /// Whether a cart in this status is still mutable.
    ///
    /// Open carts take part in zone sweeps, accept location changes and item
    /// edits, and can be checked out. This is the only place the open set is
    /// defined.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        match self {
            Self::Shopping | Self::PendingPayment | Self::Paid | Self::Shipping => true,
            Self::Completed | Self::Delivered => false,
        }
    }

    /// The statuses for which [`is_open`](Self::is_open) holds.
    pub fn open_statuses() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(Self::is_open)
    }

    /// Database/wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shopping => "shopping",
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Shipping => "shipping",
            Self::Completed => "completed",
            Self::Delivered => "delivered",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CartStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid cart status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_statuses() {
        let open: Vec<_> = CartStatus::open_statuses().collect();
        assert_eq!(
            open,
            vec![
                CartStatus::Shopping,
                CartStatus::PendingPayment,
                CartStatus::Paid,
                CartStatus::Shipping
            ]
        );
        assert!(!CartStatus::Completed.is_open());
        assert!(!CartStatus::Delivered.is_open());
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in CartStatus::ALL {
            assert_eq!(status.as_str().parse::<CartStatus>(), Ok(status));
        }
        assert!("cancelled".parse::<CartStatus>().is_err());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&CartStatus::PendingPayment).unwrap_or_default();
        assert_eq!(json, "\"pending_payment\"");
    }
}
