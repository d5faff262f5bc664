//! Cart model and mutation operations.
//!
//! A cart belongs to exactly one user and is stored on the user record;
//! it is read fresh at checkout and never trusted from the client. The
//! add-item path tolerates stock capping (the buyer just gets fewer
//! units); checkout treats any cap as blocking.

pub mod pricer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use minishops_core::{ProductId, ShopId};

use crate::catalog::{CatalogError, CatalogStore};
use crate::stock::available_stock;

pub use pricer::{
    CheckoutTruths, PricedItem, PricingError, ShopTotals, Totals, price_cart,
};

/// The shipping class currently assigned to a cart line. Carries just
/// enough to re-identify the class at pricing time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedShipping {
    pub rule: String,
    pub per_product: bool,
}

/// One line in a cart or wish list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    /// Style descriptor; empty for single unnamed styles.
    #[serde(default)]
    pub style: String,
    /// Option descriptor; empty for single unnamed options.
    #[serde(default)]
    pub option: String,
    pub quantity: u32,
    pub shop_id: ShopId,
    pub shipping_class: Option<AssignedShipping>,
}

impl CartItem {
    /// Whether two lines refer to the same variant of the same product.
    #[must_use]
    pub fn same_variant(&self, other: &Self) -> bool {
        self.product_id == other.product_id && self.style == other.style && self.option == other.option
    }
}

/// A user's cart. The wish list shares the line shape but is never
/// priced at checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub wish_list: Vec<CartItem>,
}

impl Cart {
    /// An empty cart, written back after a completed checkout.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A requested quantity change for one cart line.
#[derive(Debug, Clone, Deserialize)]
pub struct QuantityUpdate {
    pub product_id: ProductId,
    pub style: String,
    pub option: String,
    pub new_quantity: u32,
}

/// Cart mutation failures.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("product not found: {0}")]
    UnknownProduct(ProductId),

    #[error("product is not published: {0}")]
    Unpublished(ProductId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Outcome of an add-to-cart call. `capped` is informational here, not
/// blocking; the buyer can review the adjusted quantity in the cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddOutcome {
    pub quantity_added: u32,
    pub capped: bool,
}

/// Add a line to the cart, merging with an existing line for the same
/// variant and capping the total at available stock.
///
/// # Errors
///
/// Fails if the product does not exist, is unpublished, or the catalog
/// read fails.
pub async fn add_item<C: CatalogStore>(
    catalog: &C,
    cart: &mut Cart,
    mut line: CartItem,
) -> Result<AddOutcome, CartError> {
    let product = catalog
        .get_product(&line.product_id)
        .await?
        .ok_or_else(|| CartError::UnknownProduct(line.product_id.clone()))?;
    if !product.published {
        return Err(CartError::Unpublished(product.id));
    }

    let available = available_stock(&product, &line.style, &line.option).unwrap_or(0);
    let existing_quantity = cart
        .items
        .iter()
        .find(|existing| existing.same_variant(&line))
        .map_or(0, |existing| existing.quantity);

    let requested = existing_quantity.saturating_add(line.quantity);
    let granted = requested.min(available);
    let capped = granted < requested;

    match cart
        .items
        .iter_mut()
        .find(|existing| existing.same_variant(&line))
    {
        Some(existing) => existing.quantity = granted,
        None => {
            line.quantity = granted;
            line.shop_id = product.shop_id;
            if granted > 0 {
                cart.items.push(line);
            }
        }
    }

    Ok(AddOutcome {
        quantity_added: granted.saturating_sub(existing_quantity),
        capped,
    })
}

/// Apply a batch of quantity updates to matching lines. A new quantity
/// of zero removes the line. Unmatched updates are ignored, mirroring
/// how a stale client row simply has nothing to update.
pub fn set_quantities(cart: &mut Cart, updates: &[QuantityUpdate]) {
    for update in updates {
        if update.new_quantity == 0 {
            cart.items.retain(|item| {
                !(item.product_id == update.product_id
                    && item.style == update.style
                    && item.option == update.option)
            });
        } else if let Some(item) = cart.items.iter_mut().find(|item| {
            item.product_id == update.product_id
                && item.style == update.style
                && item.option == update.option
        }) {
            item.quantity = update.new_quantity;
        }
    }
}

/// Re-assign the shipping class on every line of a product in the cart.
pub fn change_shipping_class(cart: &mut Cart, product: &ProductId, class: AssignedShipping) {
    for item in cart
        .items
        .iter_mut()
        .filter(|item| &item.product_id == product)
    {
        item.shipping_class = Some(class.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCatalog;
    use crate::store::memory::test_fixtures::{product_with_stock, shop_with_classes};

    fn line(product: &str, qty: u32) -> CartItem {
        CartItem {
            product_id: ProductId::new(product),
            style: "Color".to_owned(),
            option: "Red".to_owned(),
            quantity: qty,
            shop_id: ShopId::new("shop1"),
            shipping_class: None,
        }
    }

    #[tokio::test]
    async fn add_merges_same_variant_lines() {
        let catalog = MemoryCatalog::new();
        catalog.insert_shop(shop_with_classes("shop1", &[]), None);
        catalog.insert_product(product_with_stock("p1", "shop1", "10.00", 10));

        let mut cart = Cart::empty();
        add_item(&catalog, &mut cart, line("p1", 2)).await.expect("add");
        let outcome = add_item(&catalog, &mut cart, line("p1", 3)).await.expect("add");

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items.first().expect("line").quantity, 5);
        assert!(!outcome.capped);
    }

    #[tokio::test]
    async fn add_caps_at_available_stock() {
        let catalog = MemoryCatalog::new();
        catalog.insert_shop(shop_with_classes("shop1", &[]), None);
        catalog.insert_product(product_with_stock("p1", "shop1", "10.00", 4));

        let mut cart = Cart::empty();
        let outcome = add_item(&catalog, &mut cart, line("p1", 9)).await.expect("add");

        assert!(outcome.capped);
        assert_eq!(outcome.quantity_added, 4);
        assert_eq!(cart.items.first().expect("line").quantity, 4);
    }

    #[tokio::test]
    async fn add_unknown_product_fails() {
        let catalog = MemoryCatalog::new();
        let mut cart = Cart::empty();
        let err = add_item(&catalog, &mut cart, line("ghost", 1)).await;
        assert!(matches!(err, Err(CartError::UnknownProduct(_))));
    }

    #[test]
    fn zero_quantity_removes_line() {
        let mut cart = Cart {
            items: vec![line("p1", 2), line("p2", 1)],
            wish_list: Vec::new(),
        };
        set_quantities(
            &mut cart,
            &[QuantityUpdate {
                product_id: ProductId::new("p1"),
                style: "Color".to_owned(),
                option: "Red".to_owned(),
                new_quantity: 0,
            }],
        );
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items.first().expect("line").product_id, ProductId::new("p2"));
    }

    #[test]
    fn quantity_update_changes_matching_line_only() {
        let mut cart = Cart {
            items: vec![line("p1", 2), line("p2", 1)],
            wish_list: Vec::new(),
        };
        set_quantities(
            &mut cart,
            &[QuantityUpdate {
                product_id: ProductId::new("p2"),
                style: "Color".to_owned(),
                option: "Red".to_owned(),
                new_quantity: 7,
            }],
        );
        assert_eq!(cart.items.first().expect("line").quantity, 2);
        assert_eq!(cart.items.get(1).expect("line").quantity, 7);
    }

    #[test]
    fn change_shipping_class_touches_all_product_lines() {
        let mut cart = Cart {
            items: vec![line("p1", 2), line("p2", 1)],
            wish_list: Vec::new(),
        };
        change_shipping_class(
            &mut cart,
            &ProductId::new("p1"),
            AssignedShipping {
                rule: "Express".to_owned(),
                per_product: true,
            },
        );
        let first = cart.items.first().expect("line");
        assert_eq!(first.shipping_class.as_ref().expect("class").rule, "Express");
        assert!(cart.items.get(1).expect("line").shipping_class.is_none());
    }
}
