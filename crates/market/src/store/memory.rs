//! In-memory store backends.
//!
//! Single-process implementations of the catalog, user, and ledger
//! traits. Used by the test suites and local development; the locking
//! here also makes the conditional stock decrement and the pending →
//! complete index move genuinely atomic, matching what a transactional
//! backend must provide.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use minishops_core::{OrderId, PaymentId, ProductId, ShopId, UserId};

use crate::cart::Cart;
use crate::catalog::{
    CatalogError, CatalogStore, Product, RawProduct, RawShop, ShippingClass, Shop, Style,
};
use crate::ledger::{Ledger, LedgerError, Order, PaymentRecord, ShopOrderEntry};
use crate::users::{UserProfile, UserStore, UserStoreError};

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, String> {
    mutex
        .lock()
        .map_err(|_| format!("{what} lock poisoned by a panicked writer"))
}

// =============================================================================
// Catalog
// =============================================================================

/// In-memory catalog store.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    products: Mutex<BTreeMap<ProductId, Product>>,
    shops: Mutex<BTreeMap<ShopId, Shop>>,
    owners: Mutex<BTreeMap<ShopId, UserId>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed product, replacing any existing record.
    pub fn insert_product(&self, product: Product) {
        if let Ok(mut products) = self.products.lock() {
            products.insert(product.id.clone(), product);
        }
    }

    /// Insert a product from a raw property bag, decoding defensively.
    pub fn insert_raw_product(&self, raw: RawProduct) {
        self.insert_product(raw.decode());
    }

    /// Insert a shop, optionally recording its owner.
    pub fn insert_shop(&self, shop: Shop, owner: Option<UserId>) {
        if let Ok(mut shops) = self.shops.lock() {
            if let Some(owner) = owner
                && let Ok(mut owners) = self.owners.lock()
            {
                owners.insert(shop.id.clone(), owner);
            }
            shops.insert(shop.id.clone(), shop);
        }
    }

    /// Insert a shop from a raw property bag.
    pub fn insert_raw_shop(&self, raw: RawShop, owner: Option<UserId>) {
        self.insert_shop(raw.decode(), owner);
    }
}

impl CatalogStore for MemoryCatalog {
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, CatalogError> {
        let products = lock(&self.products, "products").map_err(CatalogError::Store)?;
        Ok(products.get(id).cloned())
    }

    async fn get_shop(&self, id: &ShopId) -> Result<Option<Shop>, CatalogError> {
        let shops = lock(&self.shops, "shops").map_err(CatalogError::Store)?;
        Ok(shops.get(id).cloned())
    }

    async fn shop_owner(&self, id: &ShopId) -> Result<Option<UserId>, CatalogError> {
        let owners = lock(&self.owners, "owners").map_err(CatalogError::Store)?;
        Ok(owners.get(id).cloned())
    }

    async fn list_shop_products(
        &self,
        owner: &UserId,
        limit: usize,
    ) -> Result<Vec<Product>, CatalogError> {
        let owned: Vec<ShopId> = {
            let owners = lock(&self.owners, "owners").map_err(CatalogError::Store)?;
            owners
                .iter()
                .filter(|(_, shop_owner)| *shop_owner == owner)
                .map(|(shop, _)| shop.clone())
                .collect()
        };
        let products = lock(&self.products, "products").map_err(CatalogError::Store)?;
        Ok(products
            .values()
            .filter(|product| owned.contains(&product.shop_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_styles(&self, id: &ProductId, styles: Vec<Style>) -> Result<(), CatalogError> {
        let mut products = lock(&self.products, "products").map_err(CatalogError::Store)?;
        let product = products
            .get_mut(id)
            .ok_or_else(|| CatalogError::Store(format!("no such product: {id}")))?;
        product.styles = styles;
        Ok(())
    }

    async fn decrement_stock(
        &self,
        id: &ProductId,
        style: &str,
        option: &str,
        amount: u32,
    ) -> Result<(), CatalogError> {
        let mut products = lock(&self.products, "products").map_err(CatalogError::Store)?;
        let product = products
            .get_mut(id)
            .ok_or_else(|| CatalogError::Store(format!("no such product: {id}")))?;

        let Some((style_index, option_index)) = product.resolve_option_index(style, option) else {
            return Err(CatalogError::UnknownVariant {
                product: id.clone(),
                style: style.to_owned(),
                option: option.to_owned(),
            });
        };
        let slot = product
            .styles
            .get_mut(style_index)
            .and_then(|s| s.options.get_mut(option_index))
            .ok_or_else(|| CatalogError::UnknownVariant {
                product: id.clone(),
                style: style.to_owned(),
                option: option.to_owned(),
            })?;

        // Decrement-if-enough, under the same lock as the read.
        if slot.quantity < amount {
            return Err(CatalogError::InsufficientStock {
                product: id.clone(),
                available: slot.quantity,
                requested: amount,
            });
        }
        slot.quantity -= amount;
        Ok(())
    }

    async fn save_shipping_classes(
        &self,
        shop: &ShopId,
        classes: Vec<ShippingClass>,
    ) -> Result<(), CatalogError> {
        let mut shops = lock(&self.shops, "shops").map_err(CatalogError::Store)?;
        let shop = shops
            .get_mut(shop)
            .ok_or_else(|| CatalogError::Store(format!("no such shop: {shop}")))?;
        shop.shipping_classes = classes;
        Ok(())
    }
}

// =============================================================================
// Users
// =============================================================================

/// In-memory user store.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    profiles: Mutex<BTreeMap<UserId, UserProfile>>,
    carts: Mutex<BTreeMap<UserId, Cart>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_profile(&self, profile: UserProfile) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(profile.id.clone(), profile);
        }
    }

    /// Seed a user's cart directly.
    pub fn seed_cart(&self, id: &UserId, cart: Cart) {
        if let Ok(mut carts) = self.carts.lock() {
            carts.insert(id.clone(), cart);
        }
    }
}

impl UserStore for MemoryUserStore {
    async fn get_profile(&self, id: &UserId) -> Result<UserProfile, UserStoreError> {
        let profiles = lock(&self.profiles, "profiles").map_err(UserStoreError::Store)?;
        profiles
            .get(id)
            .cloned()
            .ok_or_else(|| UserStoreError::NotFound(id.clone()))
    }

    async fn get_cart(&self, id: &UserId) -> Result<Cart, UserStoreError> {
        let carts = lock(&self.carts, "carts").map_err(UserStoreError::Store)?;
        Ok(carts.get(id).cloned().unwrap_or_default())
    }

    async fn put_cart(&self, id: &UserId, cart: &Cart) -> Result<(), UserStoreError> {
        let mut carts = lock(&self.carts, "carts").map_err(UserStoreError::Store)?;
        carts.insert(id.clone(), cart.clone());
        Ok(())
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Default)]
struct LedgerState {
    orders: BTreeMap<OrderId, Order>,
    payments: Vec<PaymentRecord>,
    pending: BTreeMap<ShopId, Vec<ShopOrderEntry>>,
    complete: BTreeMap<ShopId, Vec<ShopOrderEntry>>,
}

/// In-memory ledger. One mutex over the whole state so the pending →
/// complete move is a single atomic step.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders recorded, for asserting P5-style properties.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.state.lock().map_or(0, |state| state.orders.len())
    }
}

impl Ledger for MemoryLedger {
    async fn create_order(&self, order: Order) -> Result<Order, LedgerError> {
        let mut state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        if state.orders.contains_key(&order.id) {
            return Err(LedgerError::IdCollision(order.id));
        }
        state.orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: &OrderId) -> Result<Option<Order>, LedgerError> {
        let state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        Ok(state.orders.get(id).cloned())
    }

    async fn find_order_by_key(&self, key: &str) -> Result<Option<Order>, LedgerError> {
        let state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        Ok(state
            .orders
            .values()
            .find(|order| order.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn create_payment(&self, record: PaymentRecord) -> Result<PaymentRecord, LedgerError> {
        let mut state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        state.payments.push(record.clone());
        Ok(record)
    }

    async fn payments_for_order(&self, order: &OrderId) -> Result<Vec<PaymentRecord>, LedgerError> {
        let state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        Ok(state
            .payments
            .iter()
            .filter(|record| &record.order_id == order)
            .cloned()
            .collect())
    }

    async fn amend_payment_note(&self, id: &PaymentId, note: String) -> Result<(), LedgerError> {
        let mut state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        let record = state
            .payments
            .iter_mut()
            .find(|record| &record.id == id)
            .ok_or_else(|| LedgerError::Store(format!("no such payment: {id}")))?;
        record.note = Some(note);
        Ok(())
    }

    async fn push_pending(&self, shop: &ShopId, entry: ShopOrderEntry) -> Result<(), LedgerError> {
        let mut state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        state.pending.entry(shop.clone()).or_default().push(entry);
        Ok(())
    }

    async fn complete_order(&self, shop: &ShopId, order: &OrderId) -> Result<(), LedgerError> {
        let mut state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        let pending = state.pending.entry(shop.clone()).or_default();
        let Some(index) = pending.iter().position(|entry| &entry.order_id == order) else {
            return Err(LedgerError::NotPending {
                shop: shop.clone(),
                order: order.clone(),
            });
        };
        let entry = pending.remove(index);
        state.complete.entry(shop.clone()).or_default().push(entry);
        Ok(())
    }

    async fn shop_orders(
        &self,
        shop: &ShopId,
    ) -> Result<(Vec<ShopOrderEntry>, Vec<ShopOrderEntry>), LedgerError> {
        let state = lock(&self.state, "ledger").map_err(LedgerError::Store)?;
        Ok((
            state.pending.get(shop).cloned().unwrap_or_default(),
            state.complete.get(shop).cloned().unwrap_or_default(),
        ))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Builders shared by unit tests, integration tests, and local
/// development seeds.
pub mod test_fixtures {
    use rust_decimal::Decimal;
    use std::str::FromStr;

    use minishops_core::{
        ClassUuid, Country, CustomerRef, PayoutAccountRef, ProductId, ShopId, UserId,
    };

    use crate::catalog::{Product, ShippingClass, Shop, Style, StyleOption};
    use crate::users::UserProfile;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap_or_default()
    }

    /// A published product with a single "Color"/"Red" variant.
    #[must_use]
    pub fn product_with_stock(id: &str, shop: &str, price: &str, quantity: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            description: String::new(),
            styles: vec![Style {
                descriptor: "Color".to_owned(),
                options: vec![StyleOption {
                    descriptor: "Red".to_owned(),
                    price: dec(price),
                    quantity,
                }],
            }],
            shipping: Vec::new(),
            images: Vec::new(),
            published: true,
            shop_id: ShopId::new(shop),
        }
    }

    /// A shop carrying the given shipping classes and the default fee.
    #[must_use]
    pub fn shop_with_classes(id: &str, classes: &[ShippingClass]) -> Shop {
        Shop {
            id: ShopId::new(id),
            name: format!("Shop {id}"),
            shipping_classes: classes.to_vec(),
            fee_retain: None,
        }
    }

    /// A per-unit shipping class shipping to Canada.
    #[must_use]
    pub fn per_product_class(uuid: &str, rule: &str, price: &str) -> ShippingClass {
        ShippingClass {
            uuid: ClassUuid::new(uuid),
            shipping_rule: rule.to_owned(),
            selected_countries: vec![Country::new("Canada")],
            shipping_price: dec(price),
            per_product: true,
            international: false,
        }
    }

    /// A once-per-shop shipping class shipping to Canada.
    #[must_use]
    pub fn once_only_class(uuid: &str, rule: &str, price: &str) -> ShippingClass {
        ShippingClass {
            per_product: false,
            ..per_product_class(uuid, rule, price)
        }
    }

    /// A buyer with a processor customer reference, shipping to Canada.
    #[must_use]
    pub fn buyer_profile(id: &str, customer: &str) -> UserProfile {
        UserProfile {
            id: UserId::new(id),
            customer_ref: Some(CustomerRef::new(customer)),
            payout_account: None,
            country: Country::new("Canada"),
        }
    }

    /// A vendor with a linked payout account.
    #[must_use]
    pub fn vendor_profile(id: &str, account: &str) -> UserProfile {
        UserProfile {
            id: UserId::new(id),
            customer_ref: None,
            payout_account: Some(PayoutAccountRef::new(account)),
            country: Country::new("Canada"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::{product_with_stock, shop_with_classes};
    use super::*;
    use crate::catalog::StyleOption;
    use minishops_core::round_money;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn ledger_rejects_order_id_collision() {
        let ledger = MemoryLedger::new();
        let order = Order::skeletal(OrderId::new("o1"), None);
        ledger.create_order(order.clone()).await.expect("create");
        let err = ledger.create_order(order).await;
        assert!(matches!(err, Err(LedgerError::IdCollision(_))));
        assert_eq!(ledger.order_count(), 1);
    }

    #[tokio::test]
    async fn pending_to_complete_is_a_move() {
        let ledger = MemoryLedger::new();
        let shop = ShopId::new("s1");
        let entry = ShopOrderEntry {
            order_id: OrderId::new("o1"),
            bill: round_money(Decimal::from(25)),
            paid: crate::ledger::PayoutResult::COMPLETED,
        };
        ledger.push_pending(&shop, entry).await.expect("push");

        ledger
            .complete_order(&shop, &OrderId::new("o1"))
            .await
            .expect("complete");
        let (pending, complete) = ledger.shop_orders(&shop).await.expect("read");
        assert!(pending.is_empty());
        assert_eq!(complete.len(), 1);

        // Completing again is an error, not a duplicate entry.
        let err = ledger.complete_order(&shop, &OrderId::new("o1")).await;
        assert!(matches!(err, Err(LedgerError::NotPending { .. })));
    }

    #[tokio::test]
    async fn payment_note_amendment_is_the_only_mutation() {
        let ledger = MemoryLedger::new();
        let record = PaymentRecord {
            id: PaymentId::new("pay1"),
            shop_id: ShopId::new("s1"),
            complete_total: Decimal::from(20),
            adjusted_total: Decimal::from(19),
            order_id: OrderId::new("o1"),
            results: crate::ledger::PayoutResult::FAILED,
            note: None,
        };
        ledger.create_payment(record).await.expect("create");
        ledger
            .amend_payment_note(&PaymentId::new("pay1"), "retried manually".to_owned())
            .await
            .expect("amend");
        let payments = ledger
            .payments_for_order(&OrderId::new("o1"))
            .await
            .expect("read");
        assert_eq!(
            payments.first().expect("record").note.as_deref(),
            Some("retried manually")
        );
    }

    #[tokio::test]
    async fn user_without_cart_has_empty_cart() {
        let users = MemoryUserStore::new();
        let cart = users.get_cart(&UserId::new("u1")).await.expect("read");
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn update_styles_replaces_variants_wholesale() {
        let catalog = MemoryCatalog::new();
        catalog.insert_product(product_with_stock("p1", "s1", "4.00", 3));

        let restocked = vec![Style {
            descriptor: "Color".to_owned(),
            options: vec![StyleOption {
                descriptor: "Blue".to_owned(),
                price: Decimal::from(5),
                quantity: 12,
            }],
        }];
        catalog
            .update_styles(&ProductId::new("p1"), restocked)
            .await
            .expect("update");

        let product = catalog
            .get_product(&ProductId::new("p1"))
            .await
            .expect("read")
            .expect("present");
        let option = product
            .resolve_option("Color", "Blue")
            .expect("replaced variant");
        assert_eq!(option.quantity, 12);
        // The old unnamed variant is gone; the fallback chain now lands
        // on the replacement.
        assert_eq!(product.resolve_option("", "").map(|o| o.quantity), Some(12));
    }

    #[tokio::test]
    async fn list_shop_products_follows_ownership() {
        let catalog = MemoryCatalog::new();
        catalog.insert_shop(shop_with_classes("s1", &[]), Some(UserId::new("vendor")));
        catalog.insert_shop(shop_with_classes("s2", &[]), Some(UserId::new("other")));
        catalog.insert_product(product_with_stock("p1", "s1", "1.00", 1));
        catalog.insert_product(product_with_stock("p2", "s2", "1.00", 1));

        let products = catalog
            .list_shop_products(&UserId::new("vendor"), 20)
            .await
            .expect("list");
        assert_eq!(products.len(), 1);
        assert_eq!(products.first().expect("product").id, ProductId::new("p1"));
    }
}
