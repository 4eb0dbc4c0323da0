//! `giftshop cart`: a scripted cart session.

use giftshop_core::{CartLine, CartLineKey, Price, ProductId};
use giftshop_sync::{CartStore, SyncConfig};

use super::CommandError;

fn line(
    product: &str,
    name: &str,
    minor: i64,
    color: &str,
    size: &str,
    config: &SyncConfig,
) -> CartLine {
    CartLine {
        product_id: ProductId::new(product),
        name: name.to_string(),
        unit_price: Price::from_minor(minor, config.currency),
        quantity: 1,
        color: color.to_string(),
        size: size.to_string(),
        image_ref: None,
    }
}

/// Add, merge, adjust and remove lines, then print the cart.
///
/// # Errors
///
/// Returns `CommandError::Cart` if a scripted mutation is rejected
/// unexpectedly.
pub fn run(config: &SyncConfig) -> Result<(), CommandError> {
    let cart = CartStore::new(config.currency);

    let mug = line("mug-classic", "Classic Mug", 1299, "white", "M", config);
    let tee = line("tee-logo", "Logo Tee", 2450, "blue", "L", config);

    cart.add_or_merge(mug.clone())?;
    cart.add_or_merge(CartLine {
        quantity: 2,
        ..mug.clone()
    })?;
    cart.add_or_merge(tee.clone())?;
    cart.increment(&tee.key())?;
    cart.decrement(&mug.key())?;

    if let Err(e) = cart.set_quantity(&mug.key(), 0) {
        tracing::info!(error = %e, "Zero quantity rejected");
    }
    let gift_card = CartLineKey::new(ProductId::new("gift-card"), "none", "none");
    cart.remove(&gift_card);

    for line in cart.lines() {
        println!(
            "{:>3} x {:<12} {:<6} {:<2} {}",
            line.quantity,
            line.name,
            line.color,
            line.size,
            line.line_total()
        );
    }
    let aggregate = cart.aggregate();
    println!(
        "items: {}  total: {}",
        aggregate.total_items,
        aggregate.formatted_total()
    );
    Ok(())
}
