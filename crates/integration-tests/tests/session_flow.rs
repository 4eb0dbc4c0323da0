//! Sign-in, identity switch and sign-out through the identity provider.

#![allow(clippy::unwrap_used)]

use giftshop_core::{AccountDocument, AuthEvent, SessionState, UserId};
use giftshop_integration_tests::{Harness, WAIT, account, line, order, wait_for_state, wait_until};

// =============================================================================
// Sign-in
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_in_publishes_profile_and_orders() {
    let harness = Harness::new();
    let alice = UserId::new("alice");
    let remote = &harness.fakes.remote;
    remote.put_account("accounts", &alice, account("Alice", 0));
    remote.add_order("orderManager", order("o1", &alice));
    remote.add_order("orderManager", order("o2", &alice));

    harness.sign_in(&alice).await;

    let mut orders = harness.session.order_count();
    wait_until(&mut orders, |c| *c == 2).await;
    let mut profile = harness.session.profile();
    wait_until(&mut profile, Option::is_some).await;

    let profile = harness.session.profile().borrow().clone().unwrap();
    assert_eq!(profile.display_name, "Alice");
    assert_eq!(
        profile.photo_url.as_deref(),
        Some("https://cdn.example.com/alice.jpg")
    );
    assert!(!harness.session.is_admin());
}

#[tokio::test(start_paused = true)]
async fn test_admin_role_comes_from_profile() {
    let harness = Harness::new();
    let admin = UserId::new("admin");
    harness
        .fakes
        .remote
        .put_account("accounts", &admin, account("Admin", 1));

    harness.sign_in(&admin).await;
    let mut profile = harness.session.profile();
    wait_until(&mut profile, Option::is_some).await;

    assert!(harness.session.is_admin());
}

#[tokio::test(start_paused = true)]
async fn test_missing_account_document_falls_back_to_absent_profile() {
    let harness = Harness::new();
    let alice = UserId::new("alice");

    harness.sign_in(&alice).await;
    tokio::task::yield_now().await;

    assert_eq!(*harness.session.profile().borrow(), None);

    harness
        .fakes
        .remote
        .put_account("accounts", &alice, AccountDocument::default());
    let mut profile = harness.session.profile();
    wait_until(&mut profile, Option::is_some).await;
    let name = harness
        .session
        .profile()
        .borrow()
        .as_ref()
        .map(|p| p.display_name.clone());
    assert_eq!(name.as_deref(), Some("User"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_sign_in_returns_to_unauthenticated() {
    let harness = Harness::new();
    harness.session.activate().unwrap();

    harness.fakes.auth.begin_sign_in();
    wait_for_state(&harness.session, &SessionState::Authenticating).await;

    harness.fakes.auth.fail_sign_in("invalid credentials");
    wait_for_state(&harness.session, &SessionState::Unauthenticated).await;
    assert!(!harness.session.watcher().is_active());
    assert!(!harness.session.tracker().is_running());
}

// =============================================================================
// Identity switch
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_identity_switch_resets_then_follows_new_identity() {
    let harness = Harness::new();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    let remote = &harness.fakes.remote;
    remote.add_order("orderManager", order("o1", &alice));
    remote.add_order("orderManager", order("o2", &alice));
    remote.add_order("orderManager", order("o3", &alice));
    remote.add_order("orderManager", order("o4", &bob));

    harness.sign_in(&alice).await;
    let mut orders = harness.session.order_count();
    wait_until(&mut orders, |c| *c == 3).await;

    // The reset is synchronous: Bob's listeners have not run yet.
    harness
        .session
        .handle_auth_event(AuthEvent::SignedIn(bob.clone()));
    assert_eq!(*harness.session.order_count().borrow(), 0);
    assert_eq!(*harness.session.profile().borrow(), None);

    let mut orders = harness.session.order_count();
    wait_until(&mut orders, |c| *c == 1).await;

    // Alice's listener is gone; her new orders are never attributed to Bob.
    remote.add_order("orderManager", order("o5", &alice));
    tokio::task::yield_now().await;
    assert_eq!(*harness.session.order_count().borrow(), 1);
    assert_eq!(remote.owned_listener_count("orderManager", &alice), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_sign_in_churn_leaves_single_listener() {
    let harness = Harness::new();
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");
    harness.session.activate().unwrap();

    for _ in 0..5 {
        harness.fakes.auth.sign_in(&alice);
        tokio::task::yield_now().await;
        harness.fakes.auth.expire();
        tokio::task::yield_now().await;
        harness.fakes.auth.sign_in(&bob);
        tokio::task::yield_now().await;
    }
    wait_for_state(&harness.session, &SessionState::Authenticated(bob.clone())).await;
    tokio::task::yield_now().await;

    let remote = &harness.fakes.remote;
    assert_eq!(remote.owned_listener_count("orderManager", &alice), 0);
    assert_eq!(remote.owned_listener_count("orderManager", &bob), 1);
    assert_eq!(remote.document_listener_count("accounts"), 1);
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_external_sign_out_clears_state_and_keeps_cart() {
    let harness = Harness::new();
    let alice = UserId::new("alice");
    harness
        .fakes
        .remote
        .add_order("orderManager", order("o1", &alice));
    harness.sign_in(&alice).await;
    let mut orders = harness.session.order_count();
    wait_until(&mut orders, |c| *c == 1).await;

    let cart = harness.session.cart();
    cart.add_or_merge(line("mug", "red", "M", 2, 1299)).unwrap();
    harness.session.header().set_profile_menu_open(true);

    harness.fakes.auth.expire();
    wait_for_state(&harness.session, &SessionState::Unauthenticated).await;

    assert_eq!(*harness.session.order_count().borrow(), 0);
    assert_eq!(*harness.session.profile().borrow(), None);
    assert!(!harness.session.header().current().profile_menu_open);
    assert_eq!(harness.session.cart().aggregate().total_items, 2);
    assert_eq!(
        harness.session.cart().aggregate().formatted_total(),
        "$25.98"
    );

    // The next identity sees the same cart.
    harness.fakes.auth.sign_in(&UserId::new("bob"));
    wait_for_state(
        &harness.session,
        &SessionState::Authenticated(UserId::new("bob")),
    )
    .await;
    assert_eq!(harness.session.cart().lines().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_listener_error_is_reported_and_value_retained() {
    let harness = Harness::new();
    let alice = UserId::new("alice");
    harness
        .fakes
        .remote
        .add_order("orderManager", order("o1", &alice));
    harness.sign_in(&alice).await;
    let mut orders = harness.session.order_count();
    wait_until(&mut orders, |c| *c == 1).await;

    harness
        .fakes
        .remote
        .fail_listeners("orderManager", "permission revoked");
    tokio::time::timeout(WAIT, async {
        while harness.fakes.errors.reports().is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(harness.fakes.errors.reports().len(), 1);
    assert_eq!(*harness.session.order_count().borrow(), 1);
    assert!(harness.session.current_state().is_authenticated());
}
