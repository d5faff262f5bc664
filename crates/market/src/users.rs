//! User profile access.
//!
//! Authentication itself is a black-box collaborator; by the time the
//! core sees a [`UserId`] it has already been verified. What checkout
//! needs from the user record is the processor customer reference, the
//! payout account for vendors, the shipping country, and the cart.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use minishops_core::{Country, CustomerRef, PayoutAccountRef, UserId};

use crate::cart::Cart;

/// The slice of a user record that checkout reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    /// Payment-processor customer reference for charging this user.
    pub customer_ref: Option<CustomerRef>,
    /// Payment-processor account for receiving payouts, present for
    /// vendors with a linked account.
    pub payout_account: Option<PayoutAccountRef>,
    /// Shipping destination country from the user's address.
    pub country: Country,
}

/// User store failures.
#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("user not found: {0}")]
    NotFound(UserId),

    #[error("user store error: {0}")]
    Store(String),
}

/// Injected user record access.
pub trait UserStore: Send + Sync {
    /// Read a user's profile.
    fn get_profile(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<UserProfile, UserStoreError>> + Send;

    /// Read a user's cart. A user without a cart has an empty one.
    fn get_cart(&self, id: &UserId) -> impl Future<Output = Result<Cart, UserStoreError>> + Send;

    /// Replace a user's cart.
    fn put_cart(
        &self,
        id: &UserId,
        cart: &Cart,
    ) -> impl Future<Output = Result<(), UserStoreError>> + Send;
}
