use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use gss_common::Money;
use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::map_status;

//--------------------------------------      OwnerId       ----------------------------------------------------------
/// The identity of the user that owns a set of orders.
///
/// The `key` is the stable identifier assigned by the identity provider and is the primary lookup key against the
/// remote order service. The `email` doubles as the alternate lookup key when the primary query is refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId {
    pub key: String,
    pub email: String,
}

impl OwnerId {
    pub fn new<S1: Into<String>, S2: Into<String>>(key: S1, email: S2) -> Self {
        Self { key: key.into(), email: email.into() }
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.key, self.email)
    }
}

//--------------------------------------      OrderId       ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------  LifecycleStatus   ----------------------------------------------------------
/// The remote order service's fine-grained payment lifecycle. Only the remote service advances this status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    /// The order exists but no payment has been declared yet.
    #[default]
    Pending,
    /// The customer has declared a bank transfer; an admin still has to validate it.
    Declared,
    /// The payment is being processed by the admin console.
    Processing,
    /// The payment was approved and the order is complete from the payment side.
    Confirmed,
    /// The payment was rejected by an admin.
    Rejected,
}

impl Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleStatus::Pending => write!(f, "pending"),
            LifecycleStatus::Declared => write!(f, "declared"),
            LifecycleStatus::Processing => write!(f, "processing"),
            LifecycleStatus::Confirmed => write!(f, "confirmed"),
            LifecycleStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid lifecycle status: {0}")]
pub struct StatusConversionError(String);

impl FromStr for LifecycleStatus {
    type Err = StatusConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "declared" => Ok(Self::Declared),
            "processing" => Ok(Self::Processing),
            "confirmed" => Ok(Self::Confirmed),
            "rejected" => Ok(Self::Rejected),
            s => Err(StatusConversionError(s.to_string())),
        }
    }
}

impl From<String> for LifecycleStatus {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            warn!("Unknown lifecycle status '{value}' received from the remote service. Treating it as pending.");
            LifecycleStatus::Pending
        })
    }
}

//--------------------------------------    ClientStatus    ----------------------------------------------------------
/// The coarse, UI-facing order status. Always derived from [`LifecycleStatus`] via [`map_status`]; it is never
/// stored, so the two vocabularies cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientStatus {
    Pending,
    Preparing,
    Processing,
    Delivered,
    Rejected,
}

impl Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientStatus::Pending => write!(f, "Pending"),
            ClientStatus::Preparing => write!(f, "Preparing"),
            ClientStatus::Processing => write!(f, "Processing"),
            ClientStatus::Delivered => write!(f, "Delivered"),
            ClientStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

//--------------------------------------      LineItem      ----------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub image_ref: Option<String>,
}

impl LineItem {
    pub fn new<S1: Into<String>, S2: Into<String>>(product_id: S1, name: S2, unit_price: Money, quantity: u32) -> Self {
        Self { product_id: product_id.into(), name: name.into(), unit_price, quantity, image_ref: None }
    }

    pub fn with_image_ref<S: Into<String>>(mut self, image_ref: S) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price * i64::from(self.quantity)
    }
}

//--------------------------------------  ShippingAddress   ----------------------------------------------------------
/// A structured postal/contact record. An order may be created before the address is complete, so every field is
/// optional and updates merge field-by-field rather than replacing the whole record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub recipient: Option<String>,
    pub phone: Option<String>,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl ShippingAddress {
    /// Merge `newer` over this address. Fields known in `newer` win; fields absent in `newer` keep their current
    /// value. A partial update can therefore never null out a field that was already known.
    pub fn merged_with(&self, newer: &ShippingAddress) -> ShippingAddress {
        ShippingAddress {
            recipient: newer.recipient.clone().or_else(|| self.recipient.clone()),
            phone: newer.phone.clone().or_else(|| self.phone.clone()),
            line1: newer.line1.clone().or_else(|| self.line1.clone()),
            line2: newer.line2.clone().or_else(|| self.line2.clone()),
            city: newer.city.clone().or_else(|| self.city.clone()),
            region: newer.region.clone().or_else(|| self.region.clone()),
            postal_code: newer.postal_code.clone().or_else(|| self.postal_code.clone()),
            country: newer.country.clone().or_else(|| self.country.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.recipient.is_none()
            && self.phone.is_none()
            && self.line1.is_none()
            && self.line2.is_none()
            && self.city.is_none()
            && self.region.is_none()
            && self.postal_code.is_none()
            && self.country.is_none()
    }
}

//--------------------------------------       Order        ----------------------------------------------------------
/// One purchase transaction, as held in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: OwnerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total: Money,
    pub item_count: u32,
    pub line_items: Vec<LineItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub lifecycle_status: LifecycleStatus,
    pub tracking_reference: Option<String>,
}

impl Order {
    /// The UI-facing status. Derived on every read; there is deliberately no field to set.
    pub fn client_status(&self) -> ClientStatus {
        map_status(Some(self.lifecycle_status))
    }

    /// Apply a partial shipping address update, merging over any fields already known.
    pub fn merge_shipping_address(&mut self, update: &ShippingAddress) {
        self.shipping_address = Some(match &self.shipping_address {
            Some(current) => current.merged_with(update),
            None => update.clone(),
        });
    }
}

//--------------------------------------     DraftOrder     ----------------------------------------------------------
/// The checkout payload from which a new [`Order`] is created. The total and item count are derived from the line
/// items, so a draft cannot disagree with its own contents.
#[derive(Debug, Clone)]
pub struct DraftOrder {
    pub line_items: Vec<LineItem>,
    pub shipping_address: Option<ShippingAddress>,
}

impl DraftOrder {
    pub fn new(line_items: Vec<LineItem>) -> Self {
        Self { line_items, shipping_address: None }
    }

    pub fn with_shipping_address(mut self, address: ShippingAddress) -> Self {
        self.shipping_address = Some(address);
        self
    }

    pub fn total(&self) -> Money {
        self.line_items.iter().map(LineItem::subtotal).sum()
    }

    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|li| li.quantity).sum()
    }
}

//--------------------------------------  RemoteOrderRecord ----------------------------------------------------------
/// The loosely-shaped order row as it arrives from the remote order service.
///
/// Everything is optional at this boundary. [`RemoteOrderRecord::validate`] is the single place where a remote row
/// is normalised into a strict [`Order`]; malformed rows are rejected there and never propagate inward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteOrderRecord {
    pub id: Option<String>,
    pub owner_key: Option<String>,
    pub owner_email: Option<String>,
    pub total: Option<Money>,
    pub item_count: Option<u32>,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    pub shipping_address: Option<ShippingAddress>,
    pub lifecycle_status: Option<String>,
    pub tracking_reference: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Error)]
pub enum OrderValidationError {
    #[error("Remote order record has no id")]
    MissingId,
    #[error("Remote order record {0} has no owner key")]
    MissingOwner(OrderId),
    #[error("Remote order record {0} has a negative total: {1}")]
    NegativeTotal(OrderId, Money),
    #[error("Remote order record {0} has a zero item count and no line items")]
    EmptyOrder(OrderId),
}

impl RemoteOrderRecord {
    /// Normalise this record into a strict [`Order`].
    ///
    /// - An unknown or absent lifecycle status becomes `pending` (logged, not fatal).
    /// - A missing item count is derived from the line items.
    /// - Missing timestamps default to now; a record without them is still usable, just unordered.
    pub fn validate(&self) -> Result<Order, OrderValidationError> {
        let id = match self.id.as_deref() {
            Some(s) if !s.trim().is_empty() => OrderId::from(s),
            _ => return Err(OrderValidationError::MissingId),
        };
        let owner_key = match self.owner_key.as_deref() {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return Err(OrderValidationError::MissingOwner(id)),
        };
        let total = self.total.unwrap_or_default();
        if total.is_negative() {
            return Err(OrderValidationError::NegativeTotal(id, total));
        }
        let item_count = match self.item_count {
            Some(n) if n > 0 => n,
            _ => {
                let derived: u32 = self.line_items.iter().map(|li| li.quantity).sum();
                if derived == 0 {
                    return Err(OrderValidationError::EmptyOrder(id));
                }
                derived
            },
        };
        let lifecycle_status = match self.lifecycle_status.clone() {
            Some(raw) => LifecycleStatus::from(raw),
            None => LifecycleStatus::Pending,
        };
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let updated_at = self.updated_at.unwrap_or(created_at);
        // An address with every field blank carries no information; normalise it to absent.
        let shipping_address = self.shipping_address.clone().filter(|a| !a.is_empty());
        Ok(Order {
            id,
            owner: OwnerId::new(owner_key, self.owner_email.clone().unwrap_or_default()),
            created_at,
            updated_at,
            total,
            item_count,
            line_items: self.line_items.clone(),
            shipping_address,
            lifecycle_status,
            tracking_reference: self.tracking_reference.clone(),
        })
    }
}

impl From<&Order> for RemoteOrderRecord {
    fn from(order: &Order) -> Self {
        Self {
            id: Some(order.id.0.clone()),
            owner_key: Some(order.owner.key.clone()),
            owner_email: Some(order.owner.email.clone()),
            total: Some(order.total),
            item_count: Some(order.item_count),
            line_items: order.line_items.clone(),
            shipping_address: order.shipping_address.clone(),
            lifecycle_status: Some(order.lifecycle_status.to_string()),
            tracking_reference: order.tracking_reference.clone(),
            created_at: Some(order.created_at),
            updated_at: Some(order.updated_at),
        }
    }
}
