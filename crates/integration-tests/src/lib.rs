//! Integration test harness for minishops.
//!
//! Assembles the full checkout stack against in-memory stores and a
//! scripted payment gateway, so every test exercises the real pricing,
//! reconciliation, and recording code with only the processor replaced.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p minishops-integration-tests
//! ```

use std::sync::{Arc, Mutex};

use minishops_core::{
    ChargeId, ClassUuid, CustomerRef, MinorUnits, PayoutAccountRef, ProductId, ShopId, TransferId,
    UserId,
};
use minishops_market::cart::{AssignedShipping, Cart, CartItem};
use minishops_market::catalog::ShippingClass;
use minishops_market::checkout::CheckoutService;
use minishops_market::payment::{ChargeOutcome, GatewayError, PaymentGateway};
use minishops_market::store::memory::test_fixtures::{
    buyer_profile, product_with_stock, shop_with_classes, vendor_profile,
};
use minishops_market::store::memory::{MemoryCatalog, MemoryLedger, MemoryUserStore};

// =============================================================================
// Scripted gateway
// =============================================================================

/// A payment gateway double. By default every charge captures in full
/// and every transfer succeeds; individual tests script failures.
pub struct MockGateway {
    has_card: bool,
    charge_result: Mutex<Option<Result<ChargeOutcome, GatewayError>>>,
    charges: Mutex<Vec<(CustomerRef, MinorUnits, Option<String>)>>,
    transfers: Mutex<Vec<(PayoutAccountRef, MinorUnits)>>,
    failing_accounts: Mutex<Vec<(PayoutAccountRef, String)>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            has_card: true,
            charge_result: Mutex::new(None),
            charges: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            failing_accounts: Mutex::new(Vec::new()),
        }
    }
}

impl MockGateway {
    #[must_use]
    pub fn without_valid_card() -> Self {
        Self {
            has_card: false,
            ..Self::default()
        }
    }

    /// Script the next charge attempt's result.
    pub fn script_charge(&self, result: Result<ChargeOutcome, GatewayError>) {
        *self.charge_result.lock().expect("lock") = Some(result);
    }

    /// Make transfers to one account fail with a processor code.
    pub fn fail_transfers_to(&self, account: &str, code: &str) {
        self.failing_accounts
            .lock()
            .expect("lock")
            .push((PayoutAccountRef::new(account), code.to_owned()));
    }

    #[must_use]
    pub fn charge_calls(&self) -> Vec<(CustomerRef, MinorUnits, Option<String>)> {
        self.charges.lock().expect("lock").clone()
    }

    #[must_use]
    pub fn transfer_calls(&self) -> Vec<(PayoutAccountRef, MinorUnits)> {
        self.transfers.lock().expect("lock").clone()
    }
}

impl PaymentGateway for MockGateway {
    async fn has_valid_card(&self, _customer: &CustomerRef) -> Result<bool, GatewayError> {
        Ok(self.has_card)
    }

    async fn charge_default_card(
        &self,
        customer: &CustomerRef,
        amount: MinorUnits,
        idempotency_key: Option<&str>,
    ) -> Result<ChargeOutcome, GatewayError> {
        self.charges.lock().expect("lock").push((
            customer.clone(),
            amount,
            idempotency_key.map(str::to_owned),
        ));
        match self.charge_result.lock().expect("lock").take() {
            Some(result) => result,
            None => Ok(ChargeOutcome {
                charge_id: Some(ChargeId::new("ch_mock")),
                amount_captured: amount,
                amount_expected: amount,
                receipt_url: Some("https://receipts.test/ch_mock".to_owned()),
                currency: Some("cad".to_owned()),
                created: Some(1_700_000_000),
                ..ChargeOutcome::default()
            }),
        }
    }

    async fn transfer(
        &self,
        destination: &PayoutAccountRef,
        amount: MinorUnits,
    ) -> Result<TransferId, GatewayError> {
        self.transfers
            .lock()
            .expect("lock")
            .push((destination.clone(), amount));
        let failing = self.failing_accounts.lock().expect("lock");
        if let Some((_, code)) = failing.iter().find(|(account, _)| account == destination) {
            return Err(GatewayError::TransferFailed { code: code.clone() });
        }
        Ok(TransferId::new("tr_mock"))
    }

    async fn cancel_charge(&self, _charge: &ChargeId) -> Result<(), GatewayError> {
        Ok(())
    }
}

// =============================================================================
// Test context
// =============================================================================

/// The assembled stack plus handles to every store for assertions.
pub struct TestContext {
    pub catalog: Arc<MemoryCatalog>,
    pub users: Arc<MemoryUserStore>,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: Arc<MockGateway>,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new(MockGateway::default())
    }
}

impl TestContext {
    #[must_use]
    pub fn new(gateway: MockGateway) -> Self {
        Self {
            catalog: Arc::new(MemoryCatalog::new()),
            users: Arc::new(MemoryUserStore::new()),
            ledger: Arc::new(MemoryLedger::new()),
            gateway: Arc::new(gateway),
        }
    }

    #[must_use]
    pub fn service(
        &self,
    ) -> CheckoutService<MemoryCatalog, MemoryUserStore, MemoryLedger, MockGateway> {
        CheckoutService::new(
            Arc::clone(&self.catalog),
            Arc::clone(&self.users),
            Arc::clone(&self.ledger),
            Arc::clone(&self.gateway),
            "cad",
        )
    }

    /// A shop owned by a vendor with a linked payout account.
    pub fn seed_vendor_shop(
        &self,
        shop: &str,
        vendor: &str,
        account: &str,
        classes: &[ShippingClass],
    ) {
        self.catalog.insert_shop(
            shop_with_classes(shop, classes),
            Some(UserId::new(vendor)),
        );
        self.users.insert_profile(vendor_profile(vendor, account));
    }

    /// A published single-variant product linked to shipping classes.
    pub fn seed_product(&self, id: &str, shop: &str, price: &str, quantity: u32, classes: &[&str]) {
        let mut product = product_with_stock(id, shop, price, quantity);
        product.shipping = classes.iter().copied().map(ClassUuid::new).collect();
        self.catalog.insert_product(product);
    }

    /// A buyer shipping to Canada with a processor customer reference.
    pub fn seed_buyer(&self, user: &str, customer: &str) {
        self.users.insert_profile(buyer_profile(user, customer));
    }

    pub fn seed_cart(&self, user: &str, items: Vec<CartItem>) {
        self.users.seed_cart(
            &UserId::new(user),
            Cart {
                items,
                wish_list: Vec::new(),
            },
        );
    }

    /// Live stock for the single-variant fixture product.
    pub async fn stock_of(&self, product: &str) -> u32 {
        use minishops_market::catalog::CatalogStore;
        self.catalog
            .get_product(&ProductId::new(product))
            .await
            .expect("read")
            .expect("product")
            .styles[0]
            .options[0]
            .quantity
    }
}

/// A cart line for the single-variant fixture product.
#[must_use]
pub fn cart_line(product: &str, shop: &str, quantity: u32, rule: &str, per_product: bool) -> CartItem {
    CartItem {
        product_id: ProductId::new(product),
        style: "Color".to_owned(),
        option: "Red".to_owned(),
        quantity,
        shop_id: ShopId::new(shop),
        shipping_class: Some(AssignedShipping {
            rule: rule.to_owned(),
            per_product,
        }),
    }
}
