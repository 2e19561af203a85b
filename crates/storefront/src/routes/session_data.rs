//! Typed access to per-session shopping state.

use serde::{Serialize, de::DeserializeOwned};
use tower_sessions::Session;

use threadline_core::{Cart, CheckoutSession, OrderId, Wishlist};

use crate::error::Result;
use crate::models::session_keys;

async fn load<T>(session: &Session, key: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    Ok(session.get::<T>(key).await?.unwrap_or_default())
}

async fn store<T>(session: &Session, key: &str, value: &T) -> Result<()>
where
    T: Serialize + Send + Sync,
{
    session.insert(key, value).await?;
    Ok(())
}

pub async fn cart(session: &Session) -> Result<Cart> {
    load(session, session_keys::CART).await
}

pub async fn save_cart(session: &Session, cart: &Cart) -> Result<()> {
    store(session, session_keys::CART, cart).await
}

pub async fn checkout(session: &Session) -> Result<Option<CheckoutSession>> {
    Ok(session
        .get::<CheckoutSession>(session_keys::CHECKOUT)
        .await?)
}

pub async fn save_checkout(session: &Session, checkout: &CheckoutSession) -> Result<()> {
    store(session, session_keys::CHECKOUT, checkout).await
}

pub async fn clear_checkout(session: &Session) -> Result<()> {
    session
        .remove::<CheckoutSession>(session_keys::CHECKOUT)
        .await?;
    Ok(())
}

pub async fn wishlist(session: &Session) -> Result<Wishlist> {
    load(session, session_keys::WISHLIST).await
}

pub async fn save_wishlist(session: &Session, wishlist: &Wishlist) -> Result<()> {
    store(session, session_keys::WISHLIST, wishlist).await
}

pub async fn remember_order(session: &Session, order_id: OrderId) -> Result<()> {
    store(session, session_keys::LAST_ORDER, &order_id).await
}

pub async fn last_order(session: &Session) -> Result<Option<OrderId>> {
    Ok(session.get::<OrderId>(session_keys::LAST_ORDER).await?)
}
