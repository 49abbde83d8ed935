//! Point-of-sale commands routed through the dispatcher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kardex_auth::{CommandAuthorization, Permission, Role};
use kardex_core::{CashSessionId, CustomerId, Money, ProductId, Quantity, UserId, WarehouseId};
use kardex_events::Command;
use kardex_sales::{PaymentMethod, SaleId, SaleStatus};

pub const CONFIRM_SALE: &str = "sales.confirm_sale";
pub const VOID_SALE: &str = "sales.void_sale";

/// One requested line. Without an explicit price the product's base price is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLineInput {
    pub product_id: ProductId,
    pub quantity: Quantity,
    pub unit_price: Option<Money>,
}

/// Build a draft from the given lines and confirm it in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmSale {
    pub command_id: Uuid,
    pub customer_id: Option<CustomerId>,
    pub warehouse_id: WarehouseId,
    pub cash_session_id: CashSessionId,
    pub payment_method: PaymentMethod,
    pub lines: Vec<SaleLineInput>,
    pub actor: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

impl ConfirmSale {
    pub fn new(
        warehouse_id: WarehouseId,
        cash_session_id: CashSessionId,
        payment_method: PaymentMethod,
        actor: UserId,
        role: Role,
    ) -> Self {
        Self {
            command_id: Uuid::now_v7(),
            customer_id: None,
            warehouse_id,
            cash_session_id,
            payment_method,
            lines: Vec::new(),
            actor,
            role,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_customer(mut self, customer_id: CustomerId) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Add a line at the product's base price.
    pub fn line(mut self, product_id: ProductId, quantity: Quantity) -> Self {
        self.lines.push(SaleLineInput {
            product_id,
            quantity,
            unit_price: None,
        });
        self
    }

    /// Add a line at an explicit unit price.
    pub fn line_at(
        mut self,
        product_id: ProductId,
        quantity: Quantity,
        unit_price: Money,
    ) -> Self {
        self.lines.push(SaleLineInput {
            product_id,
            quantity,
            unit_price: Some(unit_price),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidSale {
    pub command_id: Uuid,
    pub sale_id: SaleId,
    pub reason: String,
    pub actor: UserId,
    pub role: Role,
    pub occurred_at: DateTime<Utc>,
}

impl VoidSale {
    pub fn new(sale_id: SaleId, reason: impl Into<String>, actor: UserId, role: Role) -> Self {
        Self {
            command_id: Uuid::now_v7(),
            sale_id,
            reason: reason.into(),
            actor,
            role,
            occurred_at: Utc::now(),
        }
    }
}

/// Every command the point-of-sale dispatcher accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesCommand {
    Confirm(ConfirmSale),
    Void(VoidSale),
}

impl From<ConfirmSale> for SalesCommand {
    fn from(value: ConfirmSale) -> Self {
        SalesCommand::Confirm(value)
    }
}

impl From<VoidSale> for SalesCommand {
    fn from(value: VoidSale) -> Self {
        SalesCommand::Void(value)
    }
}

impl Command for SalesCommand {
    fn command_type(&self) -> &'static str {
        match self {
            SalesCommand::Confirm(_) => CONFIRM_SALE,
            SalesCommand::Void(_) => VOID_SALE,
        }
    }

    fn command_id(&self) -> Uuid {
        match self {
            SalesCommand::Confirm(c) => c.command_id,
            SalesCommand::Void(c) => c.command_id,
        }
    }

    /// Shape checks only. An empty line list is left to the aggregate, which
    /// reports it as [`EmptySale`](crate::command_dispatcher::DispatchError::EmptySale).
    fn validate(&self) -> Result<(), String> {
        match self {
            SalesCommand::Confirm(c) => {
                for (i, line) in c.lines.iter().enumerate() {
                    if !line.quantity.is_positive() {
                        return Err(format!("line {}: quantity must be positive", i + 1));
                    }
                    if line.unit_price.is_some_and(|p| p.is_negative()) {
                        return Err(format!("line {}: unit price cannot be negative", i + 1));
                    }
                }
                Ok(())
            }
            SalesCommand::Void(c) => {
                if c.reason.trim().is_empty() {
                    return Err("void reason is required".to_string());
                }
                Ok(())
            }
        }
    }
}

impl CommandAuthorization for SalesCommand {
    fn required_permission(&self) -> Permission {
        match self {
            SalesCommand::Confirm(_) => Permission::SALES_CONFIRM,
            SalesCommand::Void(_) => Permission::SALES_VOID,
        }
    }

    fn actor_role(&self) -> &Role {
        match self {
            SalesCommand::Confirm(c) => &c.role,
            SalesCommand::Void(c) => &c.role,
        }
    }
}

/// Result of a successful sale command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleReceipt {
    pub sale_id: SaleId,
    pub status: SaleStatus,
    pub total: Money,
    /// Stream version after the command's events were appended.
    pub stream_version: u64,
}
