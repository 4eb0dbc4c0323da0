//! Logout ordering: clear, sign out remotely, settle, navigate.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use giftshop_core::{SessionState, UserId};
use giftshop_integration_tests::{
    ObservingAuth, SignOutSnapshot, account, order, wait_for_state, wait_until,
};
use giftshop_sync::memory::{Effect, MemoryClients};
use giftshop_sync::{HeaderState, SessionError, SessionLifecycle, SyncConfig};

struct Observed {
    fakes: MemoryClients,
    auth: ObservingAuth,
    session: SessionLifecycle,
}

/// A signed-in session whose auth provider records what the UI showed when
/// remote sign-out was invoked.
async fn observed_session(user: &UserId) -> Observed {
    let fakes = MemoryClients::new();
    fakes
        .remote
        .put_account("accounts", user, account("Alice", 0));
    fakes.remote.add_order("orderManager", order("o1", user));
    fakes
        .counter
        .set_raw(&SyncConfig::default().unread_key, "2");

    let auth = ObservingAuth::new(fakes.auth.clone());
    let mut clients = fakes.clients();
    clients.auth = Arc::new(auth.clone());
    let session = SessionLifecycle::new(clients, SyncConfig::default());
    auth.observe(&session);

    session.activate().unwrap();
    fakes.auth.sign_in(user);
    wait_for_state(&session, &SessionState::Authenticated(user.clone())).await;
    let mut orders = session.order_count();
    wait_until(&mut orders, |c| *c == 1).await;
    let mut badge = session.unread_badge();
    wait_until(&mut badge, |b| *b == 2).await;

    Observed {
        fakes,
        auth,
        session,
    }
}

#[tokio::test(start_paused = true)]
async fn test_ui_state_is_cleared_before_remote_sign_out() {
    let alice = UserId::new("alice");
    let observed = observed_session(&alice).await;
    observed.session.header().set_search_open(true);
    observed.session.header().set_menu_open(true);

    observed.session.logout().await.unwrap();

    assert_eq!(
        observed.auth.snapshots(),
        vec![SignOutSnapshot {
            state: SessionState::Unauthenticated,
            order_count: 0,
            profile_present: false,
            header: HeaderState::default(),
            unread_badge: 0,
        }]
    );
    observed.auth.detach();
}

#[tokio::test(start_paused = true)]
async fn test_navigation_waits_for_settle_delay() {
    let alice = UserId::new("alice");
    let observed = observed_session(&alice).await;
    let settle = SyncConfig::default().logout_settle_delay;
    let log = observed.fakes.log.clone();

    let logout = tokio::spawn({
        let session = observed.session.clone();
        async move { session.logout().await }
    });

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(log.contains(&Effect::SignOutRequested));
    assert!(!log.contains(&Effect::Navigated));

    tokio::time::sleep(settle - Duration::from_millis(2)).await;
    assert!(!log.contains(&Effect::Navigated));

    tokio::time::sleep(Duration::from_millis(2)).await;
    logout.await.unwrap().unwrap();

    let effects = log.effects();
    let sign_out = effects
        .iter()
        .position(|e| *e == Effect::SignOutRequested)
        .unwrap();
    let navigated = effects
        .iter()
        .position(|e| *e == Effect::Navigated)
        .unwrap();
    assert!(sign_out < navigated);
    assert_eq!(effects.last(), Some(&Effect::Navigated));
    observed.auth.detach();
}

#[tokio::test(start_paused = true)]
async fn test_rejected_sign_out_surfaces_error_without_navigation() {
    let alice = UserId::new("alice");
    let observed = observed_session(&alice).await;
    observed.fakes.auth.reject_sign_outs(true);

    let result = observed.session.logout().await;
    assert!(matches!(result, Err(SessionError::SignOut(_))));

    tokio::time::sleep(SyncConfig::default().logout_settle_delay * 2).await;
    assert!(!observed.fakes.log.contains(&Effect::Navigated));

    // Cleared state stays cleared.
    assert_eq!(
        observed.session.current_state(),
        SessionState::Unauthenticated
    );
    assert_eq!(*observed.session.order_count().borrow(), 0);
    assert!(!observed.session.watcher().is_active());
    observed.auth.detach();
}

#[tokio::test(start_paused = true)]
async fn test_logout_after_dispose_is_rejected() {
    let alice = UserId::new("alice");
    let observed = observed_session(&alice).await;

    observed.session.dispose();
    assert_eq!(observed.session.logout().await, Err(SessionError::Disposed));
    assert!(!observed.fakes.log.contains(&Effect::SignOutRequested));
    observed.auth.detach();
}

#[tokio::test(start_paused = true)]
async fn test_navigation_failure_is_reported() {
    let alice = UserId::new("alice");
    let observed = observed_session(&alice).await;
    observed.fakes.navigator.fail_navigation(true);

    let result = observed.session.logout().await;
    assert!(matches!(result, Err(SessionError::Navigation(_))));
    observed.auth.detach();
}
