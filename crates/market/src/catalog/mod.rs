//! Catalog read path: products, shops, and shipping classes.
//!
//! The backing store is graph-shaped and hands back property bags whose
//! nested structures (styles, images, shipping classes) are JSON-encoded
//! strings. Decoding is defensive: a corrupt blob degrades to an empty
//! list rather than failing the whole read, because a product page that
//! renders without images beats a product page that 500s.

pub mod shipping;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use minishops_core::{ClassUuid, Country, FeeRate, ProductId, ShopId, UserId};

pub use shipping::{ShippingClassError, classes_valid_for, upsert_class, validate_class};

// =============================================================================
// Types
// =============================================================================

/// A purchasable option within a style: the unit that carries price and
/// stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleOption {
    /// Option name, e.g. "Small". May be empty for single-option styles.
    #[serde(default)]
    pub descriptor: String,
    /// Unit price in the currency's standard unit, two decimal places.
    pub price: Decimal,
    /// Units in stock.
    pub quantity: u32,
}

/// A named variant axis of a product, e.g. "Color".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Style name. May be empty when the product has a single style.
    #[serde(default)]
    pub descriptor: String,
    #[serde(default)]
    pub options: Vec<StyleOption>,
}

/// A product image reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductImage {
    pub url: String,
}

/// A product owned by exactly one shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered variant styles. Invariant: with more than one style every
    /// style is named; with more than one option every option is named
    /// and priced.
    #[serde(default)]
    pub styles: Vec<Style>,
    /// Shipping classes this product may ship under, referencing the
    /// owning shop's classes by uuid.
    #[serde(default)]
    pub shipping: Vec<ClassUuid>,
    #[serde(default)]
    pub images: Vec<ProductImage>,
    #[serde(default)]
    pub published: bool,
    pub shop_id: ShopId,
}

impl Product {
    /// Whether this product distinguishes variants by name. Single
    /// unnamed style/option products are allowed to omit descriptors.
    #[must_use]
    pub fn is_multi_variant(&self) -> bool {
        self.styles.len() > 1
            || self
                .styles
                .first()
                .is_some_and(|style| style.options.len() > 1)
    }

    /// The cheapest option across all styles, used as the pricing
    /// fallback of last resort for unnamed single-variant products.
    #[must_use]
    pub fn cheapest_option(&self) -> Option<&StyleOption> {
        self.styles
            .iter()
            .flat_map(|style| style.options.iter())
            .min_by_key(|option| option.price)
    }

    /// Locate the variant a cart line refers to.
    ///
    /// Exact (style, option) descriptor match wins. Only a line on a
    /// single unnamed style/option product (which is not required to
    /// name either) falls back to matching the option descriptor alone,
    /// and past that to the single cheapest option; on a multi-variant
    /// product a descriptor mismatch is a mismatch, not a shortcut to
    /// some other option's price and stock.
    #[must_use]
    pub fn resolve_option_index(&self, style: &str, option: &str) -> Option<(usize, usize)> {
        // Exact match on both descriptors.
        for (style_index, candidate) in self.styles.iter().enumerate() {
            if candidate.descriptor == style {
                for (option_index, candidate_option) in candidate.options.iter().enumerate() {
                    if candidate_option.descriptor == option {
                        return Some((style_index, option_index));
                    }
                }
            }
        }
        if self.is_multi_variant() {
            return None;
        }
        // Option descriptor alone.
        for (style_index, candidate) in self.styles.iter().enumerate() {
            for (option_index, candidate_option) in candidate.options.iter().enumerate() {
                if candidate_option.descriptor == option {
                    return Some((style_index, option_index));
                }
            }
        }
        // Cheapest option, for unnamed single-variant products.
        self.styles
            .iter()
            .enumerate()
            .flat_map(|(style_index, candidate)| {
                candidate
                    .options
                    .iter()
                    .enumerate()
                    .map(move |(option_index, candidate_option)| {
                        (style_index, option_index, candidate_option)
                    })
            })
            .min_by_key(|(_, _, candidate_option)| candidate_option.price)
            .map(|(style_index, option_index, _)| (style_index, option_index))
    }

    /// Resolve the variant a cart line refers to. See
    /// [`Self::resolve_option_index`] for the fallback chain.
    #[must_use]
    pub fn resolve_option(&self, style: &str, option: &str) -> Option<&StyleOption> {
        let (style_index, option_index) = self.resolve_option_index(style, option)?;
        self.styles.get(style_index)?.options.get(option_index)
    }
}

/// A named shipping rule on a shop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingClass {
    /// Shop-scoped identifier; not globally unique.
    pub uuid: ClassUuid,
    /// Rule name shown to buyers, e.g. "Standard". At most one class per
    /// shop may carry the distinguished name "International".
    pub shipping_rule: String,
    /// Destinations this rule can ship to.
    pub selected_countries: Vec<Country>,
    /// Price in the currency's standard unit.
    pub shipping_price: Decimal,
    /// Charged per unit when true, once per shop per order when false.
    pub per_product: bool,
    #[serde(default)]
    pub international: bool,
}

/// A vendor's storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    #[serde(default)]
    pub shipping_classes: Vec<ShippingClass>,
    /// Per-shop override of the vendor-retained fraction of gross.
    /// `None` means the platform default (5.2% fee).
    #[serde(default)]
    pub fee_retain: Option<FeeRate>,
}

impl Shop {
    /// The retain rate in effect for this shop.
    #[must_use]
    pub fn retain_rate(&self) -> FeeRate {
        self.fee_retain.unwrap_or_default()
    }
}

// =============================================================================
// Raw records and defensive decoding
// =============================================================================

/// A product property bag as the graph store returns it, nested
/// structures still JSON-encoded.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub styles: Option<String>,
    #[serde(default)]
    pub shipping: Option<String>,
    #[serde(default)]
    pub images: Option<String>,
    #[serde(default)]
    pub published: bool,
    pub shop_id: String,
}

impl RawProduct {
    /// Decode into a typed [`Product`]. Corrupt nested blobs degrade to
    /// empty lists.
    #[must_use]
    pub fn decode(self) -> Product {
        Product {
            id: ProductId::new(self.id),
            name: self.name,
            description: self.description,
            styles: decode_blob(self.styles.as_deref()),
            shipping: decode_blob(self.shipping.as_deref()),
            images: decode_blob(self.images.as_deref()),
            published: self.published,
            shop_id: ShopId::new(self.shop_id),
        }
    }
}

/// A shop property bag as the graph store returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawShop {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shipping_classes: Option<String>,
    #[serde(default)]
    pub fee_retain: Option<Decimal>,
}

impl RawShop {
    /// Decode into a typed [`Shop`]. A corrupt class blob degrades to no
    /// classes; an out-of-range fee override degrades to the default.
    #[must_use]
    pub fn decode(self) -> Shop {
        Shop {
            id: ShopId::new(self.id),
            name: self.name,
            shipping_classes: decode_blob(self.shipping_classes.as_deref()),
            fee_retain: self.fee_retain.and_then(FeeRate::new),
        }
    }
}

/// Decode a JSON-encoded list property, returning an empty list for a
/// missing or corrupt blob.
fn decode_blob<T: serde::de::DeserializeOwned>(blob: Option<&str>) -> Vec<T> {
    let Some(blob) = blob else {
        return Vec::new();
    };
    match serde_json::from_str(blob) {
        Ok(values) => values,
        Err(err) => {
            tracing::warn!(error = %err, "corrupt catalog blob, degrading to empty list");
            Vec::new()
        }
    }
}

// =============================================================================
// Store contract
// =============================================================================

/// Catalog store failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store could not be reached or the query failed.
    #[error("catalog store error: {0}")]
    Store(String),

    /// A conditional stock decrement found fewer units than requested.
    #[error("insufficient stock for product {product}: have {available}, want {requested}")]
    InsufficientStock {
        product: ProductId,
        available: u32,
        requested: u32,
    },

    /// The referenced variant does not exist on the product.
    #[error("unknown variant on product {product}: style {style:?}, option {option:?}")]
    UnknownVariant {
        product: ProductId,
        style: String,
        option: String,
    },
}

/// Injected catalog access. `NotFound` is a normal outcome on the read
/// path, expressed as `Ok(None)`.
pub trait CatalogStore: Send + Sync {
    /// Look up a product by id.
    fn get_product(
        &self,
        id: &ProductId,
    ) -> impl Future<Output = Result<Option<Product>, CatalogError>> + Send;

    /// Look up a shop by id.
    fn get_shop(
        &self,
        id: &ShopId,
    ) -> impl Future<Output = Result<Option<Shop>, CatalogError>> + Send;

    /// Resolve the owner of a shop. Vendors receive payouts through their
    /// owner's processor account.
    fn shop_owner(
        &self,
        id: &ShopId,
    ) -> impl Future<Output = Result<Option<UserId>, CatalogError>> + Send;

    /// List a shop owner's products, `limit` at a time.
    fn list_shop_products(
        &self,
        owner: &UserId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Product>, CatalogError>> + Send;

    /// Replace a product's style groups wholesale. The vendor edit path;
    /// checkout only ever uses the conditional decrement.
    fn update_styles(
        &self,
        id: &ProductId,
        styles: Vec<Style>,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// Conditionally decrement stock for one variant: succeeds only if at
    /// least `amount` units remain, so concurrent buyers cannot drive the
    /// count negative.
    fn decrement_stock(
        &self,
        id: &ProductId,
        style: &str,
        option: &str,
        amount: u32,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;

    /// Replace a shop's shipping classes.
    fn save_shipping_classes(
        &self,
        shop: &ShopId,
        classes: Vec<ShippingClass>,
    ) -> impl Future<Output = Result<(), CatalogError>> + Send;
}
