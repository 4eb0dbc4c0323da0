//! `giftshop simulate`: a scripted session against in-memory collaborators.
//!
//! Signs in, creates orders, writes one unread counter value per poll tick
//! (as the chat surface would), then logs out and prints the observed side
//! effects in order.

use std::time::Duration;

use chrono::Utc;
use giftshop_core::{
    AccountDocument, OrderId, OrderRecord, OrderStatus, PermissionStatus, UserId,
};
use giftshop_sync::memory::MemoryClients;
use giftshop_sync::{SessionLifecycle, SyncConfig};
use tokio::sync::watch;

use super::CommandError;

/// How long a scripted step may take to become visible.
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed `simulate` arguments.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub user: String,
    pub unread: Vec<u64>,
    pub orders: usize,
    pub deny_notifications: bool,
}

/// Run the scripted session.
///
/// # Errors
///
/// Returns `CommandError` if the session rejects a step or a step does not
/// settle within the timeout.
pub async fn run(config: SyncConfig, options: SimulateOptions) -> Result<(), CommandError> {
    let permission = if options.deny_notifications {
        PermissionStatus::Denied
    } else {
        PermissionStatus::Granted
    };
    let fakes = MemoryClients::with_permission(permission);
    let user_id = UserId::new(options.user.as_str());

    fakes.remote.put_account(
        &config.accounts_collection,
        &user_id,
        AccountDocument {
            display_name: Some(options.user.clone()),
            email: Some(format!("{}@example.com", options.user)),
            role: Some(0),
            profile_image: None,
        },
    );

    let mut unread = options.unread.iter().copied();
    if let Some(first) = unread.next() {
        fakes.counter.set_raw(&config.unread_key, &first.to_string());
    }

    let session = SessionLifecycle::new(fakes.clients(), config.clone());
    session.activate()?;
    let permission = session.request_permission().await;
    println!("notification permission: {permission}");

    fakes.auth.sign_in(&user_id);
    settle(session.state(), |s| s.is_authenticated(), "sign-in").await?;
    println!("session: {}", session.current_state());

    for n in 1..=options.orders {
        fakes.remote.add_order(
            &config.orders_collection,
            OrderRecord {
                id: OrderId::new(format!("order-{n}")),
                user_id: user_id.clone(),
                status: OrderStatus::Pending,
                created_at: Utc::now(),
            },
        );
    }
    let expected = options.orders;
    settle(session.order_count(), |c| *c == expected, "order count").await?;
    settle(session.profile(), Option::is_some, "profile").await?;

    let profile_name = session
        .profile()
        .borrow()
        .as_ref()
        .map(|p| p.display_name.clone())
        .unwrap_or_default();
    println!("profile: {profile_name} (admin: {})", session.is_admin());
    println!("orders: {}", *session.order_count().borrow());

    // Writes land half a tick after each poll.
    let badge = session.unread_badge();
    let interval = config.unread_poll_interval;
    tokio::time::sleep(interval / 2).await;
    println!("tick 0: badge={}", *badge.borrow());
    for (tick, value) in unread.enumerate() {
        fakes.counter.set_raw(&config.unread_key, &value.to_string());
        tokio::time::sleep(interval).await;
        let shown = *badge.borrow();
        println!("tick {}: counter={value} badge={shown}", tick + 1);
    }
    println!("notifications: {}", fakes.notifier.notifications().len());

    session.logout().await?;
    println!(
        "after logout: session={} orders={} badge={} cart_items={}",
        session.current_state(),
        *session.order_count().borrow(),
        *badge.borrow(),
        session.cart().aggregate().total_items,
    );
    println!("effects: {:?}", fakes.log.effects());

    session.dispose();
    Ok(())
}

/// Wait until `rx` satisfies `ready`.
async fn settle<T>(
    mut rx: watch::Receiver<T>,
    ready: impl FnMut(&T) -> bool,
    step: &'static str,
) -> Result<(), CommandError> {
    match tokio::time::timeout(STEP_TIMEOUT, rx.wait_for(ready)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(CommandError::Timeout(step)),
    }
}
