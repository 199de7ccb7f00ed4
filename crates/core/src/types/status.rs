//! Role, capability and status enums.
//!
//! The backend sends roles and order statuses as lowercase strings. They are
//! parsed once into these enums so the rest of the client matches on variants
//! instead of comparing strings.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Account role assigned at signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Shopper: browses, fills a cart, places orders.
    #[default]
    Customer,
    /// Seller: everything a customer can do plus managing own products.
    Vendor,
    /// Operator: manages every product and order status.
    Admin,
}

/// Something a signed-in user is allowed to do.
///
/// Role checks are expressed as capability queries
/// (`role.can(Capability::ManageProducts)`) rather than role comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Maintain a cart and check out.
    Shop,
    /// View and cancel own orders.
    ViewOrders,
    /// Create, edit and delete catalog products.
    ManageProducts,
    /// Manage products owned by other vendors.
    ManageAllProducts,
    /// Move orders through fulfillment statuses.
    ManageOrderStatus,
}

impl UserRole {
    /// All roles, in ascending privilege.
    pub const ALL: [Self; 3] = [Self::Customer, Self::Vendor, Self::Admin];

    /// The capability set granted to this role.
    #[must_use]
    pub const fn capabilities(self) -> &'static [Capability] {
        match self {
            Self::Customer => &[Capability::Shop, Capability::ViewOrders],
            Self::Vendor => &[
                Capability::Shop,
                Capability::ViewOrders,
                Capability::ManageProducts,
                Capability::ManageOrderStatus,
            ],
            Self::Admin => &[
                Capability::Shop,
                Capability::ViewOrders,
                Capability::ManageProducts,
                Capability::ManageAllProducts,
                Capability::ManageOrderStatus,
            ],
        }
    }

    /// Whether this role grants `capability`.
    #[must_use]
    pub fn can(self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "vendor" => Ok(Self::Vendor),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid role: {s} (expected customer, vendor or admin)")),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shop => "shop",
            Self::ViewOrders => "view orders",
            Self::ManageProducts => "manage products",
            Self::ManageAllProducts => "manage all products",
            Self::ManageOrderStatus => "manage order status",
        };
        f.write_str(name)
    }
}

/// Order lifecycle status.
///
/// ```text
/// created ──► confirmed ──► shipped ──► delivered
///    │
///    └──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Created,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Only freshly created orders may be cancelled by the customer.
    #[must_use]
    pub const fn can_cancel(self) -> bool {
        matches!(self, Self::Created)
    }

    /// No further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Confirmed => "confirmed",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "confirmed" => Ok(Self::Confirmed),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid order status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_cannot_manage_products() {
        assert!(UserRole::Customer.can(Capability::Shop));
        assert!(!UserRole::Customer.can(Capability::ManageProducts));
    }

    #[test]
    fn test_vendor_manages_only_own_products() {
        assert!(UserRole::Vendor.can(Capability::ManageProducts));
        assert!(!UserRole::Vendor.can(Capability::ManageAllProducts));
    }

    #[test]
    fn test_admin_has_every_capability() {
        for capability in [
            Capability::Shop,
            Capability::ViewOrders,
            Capability::ManageProducts,
            Capability::ManageAllProducts,
            Capability::ManageOrderStatus,
        ] {
            assert!(UserRole::Admin.can(capability), "{capability}");
        }
    }

    #[test]
    fn test_role_wire_format() {
        assert_eq!(serde_json::to_string(&UserRole::Vendor).unwrap(), "\"vendor\"");
        let role: UserRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(role, UserRole::Admin);
        assert_eq!("Customer".parse::<UserRole>().unwrap(), UserRole::Customer);
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_only_created_orders_cancel() {
        assert!(OrderStatus::Created.can_cancel());
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert!(!status.can_cancel(), "{status}");
        }
    }

    #[test]
    fn test_order_status_round_trips_through_str() {
        let status: OrderStatus = "shipped".parse().unwrap();
        assert_eq!(status.to_string(), "shipped");
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }
}
