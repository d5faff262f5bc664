//! Shipping class administration and eligibility.
//!
//! Classes live as a list on the shop record. Saving is an upsert:
//! a uuid match takes priority, then a rule-name match, otherwise the
//! class is appended as new. Any class literally named "International"
//! is folded into a single canonical instance per shop.

use rust_decimal::Decimal;
use thiserror::Error;

use minishops_core::{ClassUuid, Country, round_money};

use super::{Product, ShippingClass};

/// The distinguished rule name that must stay unique per shop.
pub const INTERNATIONAL_RULE: &str = "International";

/// Rejected shipping class submissions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShippingClassError {
    #[error("shipping rule name must not be empty")]
    EmptyRule,

    #[error("shipping class must select at least one country")]
    NoCountries,

    #[error("shipping price must not be negative")]
    NegativePrice,
}

/// Untrusted shipping class fields as submitted by a shop owner.
#[derive(Debug, Clone)]
pub struct ShippingClassDraft {
    pub shipping_rule: String,
    pub selected_countries: Vec<Country>,
    pub shipping_price: Decimal,
    pub per_product: bool,
    pub international: bool,
}

/// Check a submitted class and strip it down to a valid [`ShippingClass`].
///
/// # Errors
///
/// Returns a [`ShippingClassError`] naming the first failed field. You
/// can ship for free, but not for a negative price.
pub fn validate_class(
    draft: &ShippingClassDraft,
    uuid: Option<ClassUuid>,
) -> Result<ShippingClass, ShippingClassError> {
    if draft.shipping_rule.is_empty() {
        return Err(ShippingClassError::EmptyRule);
    }
    if draft.selected_countries.is_empty() {
        return Err(ShippingClassError::NoCountries);
    }
    if draft.shipping_price < Decimal::ZERO {
        return Err(ShippingClassError::NegativePrice);
    }
    Ok(ShippingClass {
        // A fresh uuid means we are probably creating a new class; a name
        // match during upsert still wins over the fresh uuid.
        uuid: uuid.unwrap_or_else(ClassUuid::random),
        shipping_rule: draft.shipping_rule.clone(),
        selected_countries: draft.selected_countries.clone(),
        shipping_price: round_money(draft.shipping_price),
        per_product: draft.per_product,
        international: draft.international,
    })
}

/// Upsert a validated class into a shop's class list.
///
/// Match-by-uuid takes priority, match-by-rule-name is the fallback; the
/// first match is overwritten in place and keeps its uuid. When the
/// matched slot is the "International" class, the incoming class is
/// renamed to "International" so the shop never ends up with two.
#[must_use]
pub fn upsert_class(
    mut classes: Vec<ShippingClass>,
    mut incoming: ShippingClass,
) -> Vec<ShippingClass> {
    let matched = classes
        .iter()
        .position(|existing| existing.uuid == incoming.uuid)
        .or_else(|| {
            classes
                .iter()
                .position(|existing| existing.shipping_rule == incoming.shipping_rule)
        });

    match matched {
        Some(index) => {
            if let Some(existing) = classes.get_mut(index) {
                if existing.shipping_rule == INTERNATIONAL_RULE {
                    incoming.shipping_rule = INTERNATIONAL_RULE.to_owned();
                }
                incoming.uuid = existing.uuid.clone();
                *existing = incoming;
            }
        }
        None => classes.push(incoming),
    }
    classes
}

/// The shipping classes a cart line may use: classes on the item's shop
/// whose country list contains the purchaser's country and whose uuid is
/// on the product's shipping list.
#[must_use]
pub fn classes_valid_for<'a>(
    shop_classes: &'a [ShippingClass],
    product: &Product,
    country: &Country,
) -> Vec<&'a ShippingClass> {
    shop_classes
        .iter()
        .filter(|class| class.selected_countries.contains(country))
        .filter(|class| product.shipping.contains(&class.uuid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minishops_core::{ProductId, ShopId};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    fn draft(rule: &str, price: &str) -> ShippingClassDraft {
        ShippingClassDraft {
            shipping_rule: rule.to_owned(),
            selected_countries: vec![Country::new("Canada")],
            shipping_price: dec(price),
            per_product: false,
            international: false,
        }
    }

    fn class(rule: &str, uuid: &str) -> ShippingClass {
        ShippingClass {
            uuid: ClassUuid::new(uuid),
            shipping_rule: rule.to_owned(),
            selected_countries: vec![Country::new("Canada")],
            shipping_price: dec("2.00"),
            per_product: false,
            international: false,
        }
    }

    #[test]
    fn validate_rejects_bad_fields() {
        assert_eq!(
            validate_class(&draft("", "1.00"), None),
            Err(ShippingClassError::EmptyRule)
        );
        assert_eq!(
            validate_class(&draft("Standard", "-0.01"), None),
            Err(ShippingClassError::NegativePrice)
        );
        let mut no_countries = draft("Standard", "1.00");
        no_countries.selected_countries.clear();
        assert_eq!(
            validate_class(&no_countries, None),
            Err(ShippingClassError::NoCountries)
        );
    }

    #[test]
    fn validate_allows_free_shipping() {
        let class = validate_class(&draft("Free", "0.00"), None).expect("valid");
        assert_eq!(class.shipping_price, Decimal::ZERO);
        assert_eq!(class.uuid.as_str().len(), 32);
    }

    #[test]
    fn upsert_matches_uuid_first() {
        let classes = vec![class("Standard", "aaa"), class("Express", "bbb")];
        let mut incoming = class("Renamed", "bbb");
        incoming.shipping_price = dec("9.00");
        let result = upsert_class(classes, incoming);
        assert_eq!(result.len(), 2);
        let updated = result.get(1).expect("slot");
        assert_eq!(updated.shipping_rule, "Renamed");
        assert_eq!(updated.shipping_price, dec("9.00"));
        assert_eq!(updated.uuid, ClassUuid::new("bbb"));
    }

    #[test]
    fn upsert_falls_back_to_name_and_keeps_uuid() {
        let classes = vec![class("Standard", "aaa")];
        let incoming = class("Standard", "zzz");
        let result = upsert_class(classes, incoming);
        assert_eq!(result.len(), 1);
        assert_eq!(result.first().expect("slot").uuid, ClassUuid::new("aaa"));
    }

    #[test]
    fn upsert_appends_when_no_match() {
        let classes = vec![class("Standard", "aaa")];
        let result = upsert_class(classes, class("Express", "bbb"));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn international_never_duplicates() {
        let classes = vec![class(INTERNATIONAL_RULE, "aaa")];
        // Incoming matches by uuid but arrives under a different name.
        let renamed = class("Worldwide", "aaa");
        let result = upsert_class(classes, renamed);
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.first().expect("slot").shipping_rule,
            INTERNATIONAL_RULE
        );
    }

    #[test]
    fn valid_classes_filter_by_country_and_product() {
        let shop_classes = vec![
            class("Standard", "aaa"),
            class("Express", "bbb"),
            ShippingClass {
                selected_countries: vec![Country::new("Mexico")],
                ..class("MexicoOnly", "ccc")
            },
        ];
        let product = Product {
            id: ProductId::new("p1"),
            name: "Mug".to_owned(),
            description: String::new(),
            styles: Vec::new(),
            shipping: vec![ClassUuid::new("aaa"), ClassUuid::new("ccc")],
            images: Vec::new(),
            published: true,
            shop_id: ShopId::new("s1"),
        };
        let valid = classes_valid_for(&shop_classes, &product, &Country::new("canada"));
        assert_eq!(valid.len(), 1);
        assert_eq!(valid.first().expect("class").shipping_rule, "Standard");
    }
}
