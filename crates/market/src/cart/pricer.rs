//! Authoritative cart pricing.
//!
//! Recomputes per-item prices, per-shop shipping, and grand totals from
//! the server's own catalog state. The client's cart is never a pricing
//! source; checkout compares the client's claimed totals against this
//! output and aborts on any mismatch.
//!
//! Money discipline: accumulation stays exact and amounts are rounded to
//! two places only when they land in the output snapshot. The grand
//! total feeds the gateway's integer-cents conversion, and rounding
//! earlier produces off-by-one-cent charge mismatches.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use minishops_core::{Country, ProductId, ShopId, round_money};

use crate::catalog::{CatalogError, CatalogStore, Shop, ShippingClass, classes_valid_for};

use super::{AssignedShipping, Cart, CartItem};

/// Checkout-blocking pricing failures.
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("product not found: {0}")]
    UnknownProduct(ProductId),

    #[error("shop not found: {0}")]
    UnknownShop(ShopId),

    /// No shipping class on the item's shop covers the purchaser's
    /// country for this product. The buyer cannot be quoted a price.
    #[error("no valid shipping class for product {product} to {country}")]
    NoShippingClass { product: ProductId, country: Country },

    /// The product carries no priceable option at all.
    #[error("product has no priceable option: {0}")]
    NoPriceableOption(ProductId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// A cart line with server-assigned price, name, image, and shipping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedItem {
    pub product_id: ProductId,
    pub style: String,
    pub option: String,
    pub quantity: u32,
    pub shop_id: ShopId,
    /// Server-assigned display name.
    pub name: String,
    /// Server-assigned image, if the product has one.
    pub image: Option<String>,
    /// Authoritative unit price.
    pub unit_price: Decimal,
    /// The shipping class in effect for this line after validation.
    pub shipping_class: AssignedShipping,
    /// This line's shipping accrual before shop-level exclusivity:
    /// `price * quantity` for per-product classes, the class price for
    /// once-only classes.
    pub shipping: Decimal,
    /// `unit_price * quantity`.
    pub line_total: Decimal,
}

/// Per-shop aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopTotals {
    pub total_shipping: Decimal,
    pub total_product_costs: Decimal,
}

/// Grand totals across the whole cart. Field-for-field equality against
/// the client's claimed totals gates checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub shipping: Decimal,
    pub products: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// Totals for an empty or fully free cart.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            shipping: Decimal::ZERO,
            products: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

/// The server-authoritative pricing snapshot for one checkout attempt.
/// Ephemeral: recomputed on every attempt, never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutTruths {
    pub cart: Vec<PricedItem>,
    pub shops: BTreeMap<ShopId, ShopTotals>,
    pub totals: Totals,
    /// True when any line's shipping class had to be silently
    /// reassigned; surfaced so the UI can prompt the buyer to review.
    pub shipping_changed: bool,
}

impl CheckoutTruths {
    /// The distinct shops involved, in stable order.
    #[must_use]
    pub fn shop_ids(&self) -> Vec<ShopId> {
        self.shops.keys().cloned().collect()
    }
}

/// Per-shop shipping accumulator. Per-product and once-only shipping are
/// mutually exclusive at the shop level; per-product takes priority.
#[derive(Debug, Default)]
struct ShopAccumulator {
    per_product_shipping: Decimal,
    lowest_once_only: Option<Decimal>,
    product_costs: Decimal,
}

impl ShopAccumulator {
    fn shipping_total(&self) -> Decimal {
        if self.per_product_shipping > Decimal::ZERO {
            self.per_product_shipping
        } else {
            self.lowest_once_only.unwrap_or(Decimal::ZERO)
        }
    }
}

/// Price a cart against live catalog state.
///
/// Pure aside from store reads: repeated invocation over unchanged
/// catalog state yields an identical snapshot.
///
/// # Errors
///
/// Any [`PricingError`] is checkout-blocking; the cart itself is left
/// untouched so the buyer can fix it and retry.
#[instrument(skip(catalog, cart), fields(lines = cart.items.len(), %country))]
pub async fn price_cart<C: CatalogStore>(
    catalog: &C,
    cart: &Cart,
    country: &Country,
) -> Result<CheckoutTruths, PricingError> {
    let mut shop_cache: BTreeMap<ShopId, Shop> = BTreeMap::new();
    let mut accumulators: BTreeMap<ShopId, ShopAccumulator> = BTreeMap::new();
    let mut priced_items = Vec::with_capacity(cart.items.len());
    let mut shipping_changed = false;

    for item in &cart.items {
        let product = catalog
            .get_product(&item.product_id)
            .await?
            .ok_or_else(|| PricingError::UnknownProduct(item.product_id.clone()))?;

        if !shop_cache.contains_key(&product.shop_id) {
            let shop = catalog
                .get_shop(&product.shop_id)
                .await?
                .ok_or_else(|| PricingError::UnknownShop(product.shop_id.clone()))?;
            shop_cache.insert(product.shop_id.clone(), shop);
        }
        let shop = shop_cache
            .get(&product.shop_id)
            .ok_or_else(|| PricingError::UnknownShop(product.shop_id.clone()))?;

        let valid = classes_valid_for(&shop.shipping_classes, &product, country);
        let Some(first_valid) = valid.first() else {
            return Err(PricingError::NoShippingClass {
                product: product.id,
                country: country.clone(),
            });
        };

        let assigned = resolve_class(item, &valid, first_valid, &mut shipping_changed);

        let option = product
            .resolve_option(&item.style, &item.option)
            .ok_or_else(|| PricingError::NoPriceableOption(item.product_id.clone()))?;

        let quantity = Decimal::from(item.quantity);
        let line_total = option.price * quantity;
        let line_shipping = if assigned.per_product {
            assigned.shipping_price * quantity
        } else {
            assigned.shipping_price
        };

        let accumulator = accumulators.entry(product.shop_id.clone()).or_default();
        accumulator.product_costs += line_total;
        if assigned.per_product {
            accumulator.per_product_shipping += line_shipping;
        } else {
            let lowest = accumulator
                .lowest_once_only
                .map_or(assigned.shipping_price, |current| {
                    current.min(assigned.shipping_price)
                });
            accumulator.lowest_once_only = Some(lowest);
        }

        priced_items.push(PricedItem {
            product_id: item.product_id.clone(),
            style: item.style.clone(),
            option: item.option.clone(),
            quantity: item.quantity,
            shop_id: product.shop_id.clone(),
            name: product.name.clone(),
            image: product.images.first().map(|image| image.url.clone()),
            unit_price: option.price,
            shipping_class: AssignedShipping {
                rule: assigned.shipping_rule.clone(),
                per_product: assigned.per_product,
            },
            shipping: round_money(line_shipping),
            line_total: round_money(line_total),
        });
    }

    let mut shops = BTreeMap::new();
    let mut shipping_sum = Decimal::ZERO;
    let mut products_sum = Decimal::ZERO;
    for (shop_id, accumulator) in &accumulators {
        let shipping = accumulator.shipping_total();
        shipping_sum += shipping;
        products_sum += accumulator.product_costs;
        shops.insert(
            shop_id.clone(),
            ShopTotals {
                total_shipping: round_money(shipping),
                total_product_costs: round_money(accumulator.product_costs),
            },
        );
    }

    Ok(CheckoutTruths {
        cart: priced_items,
        shops,
        totals: Totals {
            shipping: round_money(shipping_sum),
            products: round_money(products_sum),
            total: round_money(products_sum + shipping_sum),
        },
        shipping_changed,
    })
}

/// Keep the line's assigned class when it is still valid, otherwise
/// reassign to the first valid class and raise the review flag.
fn resolve_class<'a>(
    item: &CartItem,
    valid: &[&'a ShippingClass],
    first_valid: &'a ShippingClass,
    shipping_changed: &mut bool,
) -> &'a ShippingClass {
    let current = item
        .shipping_class
        .as_ref()
        .and_then(|assigned| {
            valid
                .iter()
                .find(|class| class.shipping_rule == assigned.rule)
        })
        .copied();
    current.unwrap_or_else(|| {
        *shipping_changed = true;
        first_valid
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Style, StyleOption};
    use crate::store::memory::MemoryCatalog;
    use crate::store::memory::test_fixtures::{
        once_only_class, per_product_class, product_with_stock, shop_with_classes,
    };
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    fn canada() -> Country {
        Country::new("Canada")
    }

    fn line(product: &str, qty: u32, class: Option<(&str, bool)>) -> CartItem {
        CartItem {
            product_id: ProductId::new(product),
            style: "Color".to_owned(),
            option: "Red".to_owned(),
            quantity: qty,
            shop_id: ShopId::new("shop1"),
            shipping_class: class.map(|(rule, per_product)| AssignedShipping {
                rule: rule.to_owned(),
                per_product,
            }),
        }
    }

    /// Scenario A: one item, qty 2, unit 10.00, per-product shipping
    /// 2.50/unit -> shipping 5.00, products 20.00, total 25.00.
    #[tokio::test]
    async fn per_product_shipping_scales_with_quantity() {
        let catalog = MemoryCatalog::new();
        let standard = per_product_class("std", "Standard", "2.50");
        catalog.insert_shop(shop_with_classes("shop1", &[standard]), None);
        let mut product = product_with_stock("p1", "shop1", "10.00", 10);
        product.shipping = vec![minishops_core::ClassUuid::new("std")];
        catalog.insert_product(product);

        let cart = Cart {
            items: vec![line("p1", 2, Some(("Standard", true)))],
            wish_list: Vec::new(),
        };
        let truths = price_cart(&catalog, &cart, &canada()).await.expect("price");

        assert_eq!(truths.totals.shipping, dec("5.00"));
        assert_eq!(truths.totals.products, dec("20.00"));
        assert_eq!(truths.totals.total, dec("25.00"));
        assert!(!truths.shipping_changed);
        let shop = truths.shops.get(&ShopId::new("shop1")).expect("shop");
        assert_eq!(shop.total_shipping, dec("5.00"));
        assert_eq!(shop.total_product_costs, dec("20.00"));
    }

    /// A line naming a variant the product does not carry must fail the
    /// pricing pass, not quietly charge another option's price.
    #[tokio::test]
    async fn bogus_variant_on_multi_variant_product_fails_pricing() {
        let catalog = MemoryCatalog::new();
        let standard = per_product_class("std", "Standard", "2.50");
        catalog.insert_shop(shop_with_classes("shop1", &[standard]), None);
        let mut product = product_with_stock("p1", "shop1", "5.00", 10);
        product.styles = vec![Style {
            descriptor: "Size".to_owned(),
            options: vec![
                StyleOption {
                    descriptor: "Small".to_owned(),
                    price: dec("5.00"),
                    quantity: 10,
                },
                StyleOption {
                    descriptor: "Large".to_owned(),
                    price: dec("9.00"),
                    quantity: 10,
                },
            ],
        }];
        product.shipping = vec![minishops_core::ClassUuid::new("std")];
        catalog.insert_product(product);

        let mut item = line("p1", 1, Some(("Standard", true)));
        item.style = "Size".to_owned();
        item.option = "Gone".to_owned();
        let cart = Cart {
            items: vec![item],
            wish_list: Vec::new(),
        };

        let err = price_cart(&catalog, &cart, &canada()).await;
        assert!(matches!(err, Err(PricingError::NoPriceableOption(_))));
    }

    /// Scenario B: per-product (3.00/unit, qty 1) and once-only (4.00)
    /// on the same shop -> once-only contributes 0, shop shipping 3.00.
    #[tokio::test]
    async fn per_product_shipping_suppresses_once_only() {
        let catalog = MemoryCatalog::new();
        let per_unit = per_product_class("pp", "PerUnit", "3.00");
        let once = once_only_class("oo", "OnceOnly", "4.00");
        catalog.insert_shop(shop_with_classes("shop1", &[per_unit, once]), None);

        let mut first = product_with_stock("p1", "shop1", "10.00", 10);
        first.shipping = vec![minishops_core::ClassUuid::new("pp")];
        catalog.insert_product(first);
        let mut second = product_with_stock("p2", "shop1", "8.00", 10);
        second.shipping = vec![minishops_core::ClassUuid::new("oo")];
        catalog.insert_product(second);

        let cart = Cart {
            items: vec![
                line("p1", 1, Some(("PerUnit", true))),
                line("p2", 1, Some(("OnceOnly", false))),
            ],
            wish_list: Vec::new(),
        };
        let truths = price_cart(&catalog, &cart, &canada()).await.expect("price");

        let shop = truths.shops.get(&ShopId::new("shop1")).expect("shop");
        assert_eq!(shop.total_shipping, dec("3.00"));
        assert_eq!(truths.totals.shipping, dec("3.00"));
    }

    /// With only once-only classes on a shop, the lowest price applies
    /// exactly once.
    #[tokio::test]
    async fn lowest_once_only_applies_once() {
        let catalog = MemoryCatalog::new();
        let cheap = once_only_class("a", "Cheap", "2.00");
        let dear = once_only_class("b", "Dear", "6.00");
        catalog.insert_shop(shop_with_classes("shop1", &[cheap, dear]), None);

        for (id, class_uuid) in [("p1", "a"), ("p2", "b")] {
            let mut product = product_with_stock(id, "shop1", "5.00", 10);
            product.shipping = vec![minishops_core::ClassUuid::new(class_uuid)];
            catalog.insert_product(product);
        }

        let cart = Cart {
            items: vec![
                line("p1", 3, Some(("Cheap", false))),
                line("p2", 1, Some(("Dear", false))),
            ],
            wish_list: Vec::new(),
        };
        let truths = price_cart(&catalog, &cart, &canada()).await.expect("price");
        assert_eq!(truths.totals.shipping, dec("2.00"));
        assert_eq!(truths.totals.products, dec("20.00"));
    }

    #[tokio::test]
    async fn invalid_assignment_reassigns_and_flags() {
        let catalog = MemoryCatalog::new();
        let standard = per_product_class("std", "Standard", "2.50");
        catalog.insert_shop(shop_with_classes("shop1", &[standard]), None);
        let mut product = product_with_stock("p1", "shop1", "10.00", 10);
        product.shipping = vec![minishops_core::ClassUuid::new("std")];
        catalog.insert_product(product);

        // The line claims a class that no longer exists on the shop.
        let cart = Cart {
            items: vec![line("p1", 1, Some(("Discontinued", false)))],
            wish_list: Vec::new(),
        };
        let truths = price_cart(&catalog, &cart, &canada()).await.expect("price");
        assert!(truths.shipping_changed);
        let first = truths.cart.first().expect("line");
        assert_eq!(first.shipping_class.rule, "Standard");
        assert!(first.shipping_class.per_product);
    }

    #[tokio::test]
    async fn no_valid_class_blocks_checkout() {
        let catalog = MemoryCatalog::new();
        let standard = per_product_class("std", "Standard", "2.50");
        catalog.insert_shop(shop_with_classes("shop1", &[standard]), None);
        // Product does not list the class, so the valid set is empty.
        catalog.insert_product(product_with_stock("p1", "shop1", "10.00", 10));

        let cart = Cart {
            items: vec![line("p1", 1, None)],
            wish_list: Vec::new(),
        };
        let err = price_cart(&catalog, &cart, &canada()).await;
        assert!(matches!(err, Err(PricingError::NoShippingClass { .. })));
    }

    /// P2: pricing is idempotent over unchanged state.
    #[tokio::test]
    async fn pricing_is_idempotent() {
        let catalog = MemoryCatalog::new();
        let standard = per_product_class("std", "Standard", "2.50");
        catalog.insert_shop(shop_with_classes("shop1", &[standard]), None);
        let mut product = product_with_stock("p1", "shop1", "10.00", 10);
        product.shipping = vec![minishops_core::ClassUuid::new("std")];
        catalog.insert_product(product);

        let cart = Cart {
            items: vec![line("p1", 2, Some(("Standard", true)))],
            wish_list: Vec::new(),
        };
        let first = price_cart(&catalog, &cart, &canada()).await.expect("price");
        let second = price_cart(&catalog, &cart, &canada()).await.expect("price");
        assert_eq!(first, second);
        let first_json = serde_json::to_string(&first).expect("serialize");
        let second_json = serde_json::to_string(&second).expect("serialize");
        assert_eq!(first_json, second_json);
    }

    /// Price resolution falls back for unnamed single-variant products.
    #[tokio::test]
    async fn unnamed_variant_falls_back_to_cheapest() {
        let catalog = MemoryCatalog::new();
        let standard = per_product_class("std", "Standard", "1.00");
        catalog.insert_shop(shop_with_classes("shop1", &[standard]), None);

        let mut product = product_with_stock("p1", "shop1", "7.50", 10);
        // Wipe the descriptors: a single-variant product need not name
        // its style or option.
        for style in &mut product.styles {
            style.descriptor = String::new();
            for option in &mut style.options {
                option.descriptor = String::new();
            }
        }
        product.shipping = vec![minishops_core::ClassUuid::new("std")];
        catalog.insert_product(product);

        let cart = Cart {
            items: vec![line("p1", 1, Some(("Standard", true)))],
            wish_list: Vec::new(),
        };
        let truths = price_cart(&catalog, &cart, &canada()).await.expect("price");
        assert_eq!(truths.cart.first().expect("line").unit_price, dec("7.50"));
    }
}
