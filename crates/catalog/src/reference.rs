use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kardex_core::{CustomerId, Entity, Money, ProductId, UserId, WarehouseId};

/// Catalog product as seen by the sales core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// When false, sales never consult or gate on the stock ledger.
    pub tracks_stock: bool,
    pub base_price: Money,
    /// Tax rate included in the sale price, in percent (e.g. `18` for 18%).
    pub tax_percentage: Decimal,
    /// Cost per unit used to value stock movements in the kardex.
    #[serde(default)]
    pub standard_cost: Money,
}

impl Product {
    pub fn new(id: ProductId, sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            tracks_stock: true,
            base_price: Money::zero(),
            tax_percentage: Decimal::ZERO,
            standard_cost: Money::zero(),
        }
    }

    pub fn with_cost(mut self, standard_cost: Money) -> Self {
        self.standard_cost = standard_cost;
        self
    }

    pub fn with_price(mut self, base_price: Money) -> Self {
        self.base_price = base_price;
        self
    }

    pub fn with_tax(mut self, tax_percentage: Decimal) -> Self {
        self.tax_percentage = tax_percentage;
        self
    }

    /// Services and other non-stocked items.
    pub fn untracked(mut self) -> Self {
        self.tracks_stock = false;
        self
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub display_name: String,
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
}

impl Entity for Warehouse {
    type Id = WarehouseId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A user who can ring up sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cashier {
    pub id: UserId,
    pub name: String,
}

impl Entity for Cashier {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn builder_defaults_to_tracked_untaxed() {
        let p = Product::new(ProductId::new(), "SKU-1", "Widget");
        assert!(p.tracks_stock);
        assert_eq!(p.tax_percentage, Decimal::ZERO);

        let s = Product::new(ProductId::new(), "SRV-1", "Install")
            .untracked()
            .with_tax(dec!(18))
            .with_price(Money::new(dec!(25)));
        assert!(!s.tracks_stock);
        assert_eq!(s.tax_percentage, dec!(18));
        assert_eq!(s.base_price.to_string(), "25.00");
    }
}
