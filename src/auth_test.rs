use super::*;
use crate::test_helpers::{MockApi, context, make_token, status_err};
use std::sync::Mutex;
use std::time::Duration;

fn admin_session() -> Session {
    Session::new(make_token(1, Role::Administrator), Some(1), Some(Role::Administrator))
}

// =============================================================================
// login / logout
// =============================================================================

#[test]
fn login_then_get_returns_exact_session() {
    let (auth, store, _) = context(MockApi::default(), None);
    auth.login("tok", Some(9), Some(Role::User)).unwrap();
    assert_eq!(store.get(), Session::new("tok", Some(9), Some(Role::User)));
}

#[test]
fn logout_empties_session_regardless_of_prior_state() {
    let (auth, store, _) = context(MockApi::default(), Some(admin_session()));
    auth.logout().unwrap();
    assert_eq!(store.get(), Session::default());

    auth.logout().unwrap();
    assert_eq!(store.get(), Session::default());
}

#[test]
fn local_role_is_for_branching_only() {
    let (auth, _, api) = context(MockApi::default(), Some(admin_session()));
    assert_eq!(auth.role(), Some(Role::Administrator));
    assert!(auth.has_role(Role::Administrator));
    assert!(!auth.has_role(Role::User));
    assert_eq!(api.role_calls(), 0);
}

// =============================================================================
// is_authenticated
// =============================================================================

#[tokio::test]
async fn no_token_fails_fast_without_request() {
    let (auth, _, api) = context(MockApi::granting(200), None);
    assert!(!auth.is_authenticated(Role::User).await);
    assert_eq!(api.role_calls(), 0);
}

#[tokio::test]
async fn success_status_grants() {
    let (auth, _, api) = context(MockApi::granting(200), Some(admin_session()));
    assert!(auth.is_authenticated(Role::Administrator).await);
    assert_eq!(api.seen_tokens.lock().unwrap().as_slice(), [admin_session().token]);
}

#[tokio::test]
async fn forbidden_denies_but_keeps_session() {
    let (auth, store, _) = context(MockApi::granting(403), Some(admin_session()));
    assert!(!auth.is_authenticated(Role::Administrator).await);
    assert_eq!(store.get(), admin_session());
}

#[tokio::test]
async fn unauthorized_denies_and_clears_session() {
    let (auth, store, _) = context(MockApi::granting(401), Some(admin_session()));
    assert!(!auth.is_authenticated(Role::User).await);
    assert_eq!(store.get(), Session::default());
}

#[tokio::test]
async fn server_error_denies() {
    let (auth, _, _) = context(MockApi::granting(500), Some(admin_session()));
    assert!(!auth.is_authenticated(Role::User).await);
}

#[tokio::test]
async fn every_call_revalidates() {
    let (auth, _, api) = context(MockApi::granting(200), Some(admin_session()));
    assert!(auth.is_authenticated(Role::User).await);
    api.set_role_status(403);
    assert!(!auth.is_authenticated(Role::User).await);
    assert_eq!(api.role_calls(), 2);
}

// =============================================================================
// refresh_on_mount
// =============================================================================

#[tokio::test]
async fn refresh_skipped_without_token() {
    let (auth, _, api) = context(MockApi::default(), None);
    assert_eq!(auth.refresh_on_mount().await, RefreshOutcome::Skipped);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_replaces_session_with_new_claims() {
    let fresh = make_token(5, Role::User);
    let api = MockApi { refresh: Mutex::new(Ok(fresh.clone())), ..MockApi::default() };
    let (auth, store, _) = context(api, Some(admin_session()));

    assert_eq!(auth.refresh_on_mount().await, RefreshOutcome::Refreshed);
    assert_eq!(store.get(), Session::new(fresh, Some(5), Some(Role::User)));
}

#[tokio::test]
async fn refresh_runs_only_once_per_context() {
    let api = MockApi { refresh: Mutex::new(Ok(make_token(1, Role::Administrator))), ..MockApi::default() };
    let (auth, _, api) = context(api, Some(admin_session()));

    assert_eq!(auth.refresh_on_mount().await, RefreshOutcome::Refreshed);
    assert_eq!(auth.refresh_on_mount().await, RefreshOutcome::Skipped);
    assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_refresh_logs_out() {
    let api = MockApi { refresh: Mutex::new(Err(status_err(401))), ..MockApi::default() };
    let (auth, store, _) = context(api, Some(admin_session()));

    assert_eq!(auth.refresh_on_mount().await, RefreshOutcome::LoggedOut);
    assert_eq!(store.get(), Session::default());
}

#[tokio::test]
async fn undecodable_refreshed_token_logs_out() {
    let api = MockApi { refresh: Mutex::new(Ok("not-a-jwt".to_owned())), ..MockApi::default() };
    let (auth, store, _) = context(api, Some(admin_session()));

    assert_eq!(auth.refresh_on_mount().await, RefreshOutcome::LoggedOut);
    assert!(!store.get().is_authenticated());
}

// =============================================================================
// late responses
// =============================================================================

const IN_FLIGHT: Duration = Duration::from_millis(80);
const MIDWAY: Duration = Duration::from_millis(20);

#[tokio::test(start_paused = true)]
async fn logout_during_refresh_is_not_undone() {
    let api = MockApi {
        refresh: Mutex::new(Ok(make_token(1, Role::Administrator))),
        refresh_delay: IN_FLIGHT,
        ..MockApi::default()
    };
    let (auth, store, _) = context(api, Some(admin_session()));

    let pending = tokio::spawn({
        let auth = auth.clone();
        async move { auth.refresh_on_mount().await }
    });
    tokio::time::sleep(MIDWAY).await;
    auth.logout().unwrap();

    assert_eq!(pending.await.unwrap(), RefreshOutcome::Superseded);
    assert_eq!(store.get(), Session::default());
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_newer_login() {
    let api = MockApi { refresh: Mutex::new(Err(status_err(401))), refresh_delay: IN_FLIGHT, ..MockApi::default() };
    let (auth, store, _) = context(api, Some(admin_session()));

    let pending = tokio::spawn({
        let auth = auth.clone();
        async move { auth.refresh_on_mount().await }
    });
    tokio::time::sleep(MIDWAY).await;
    auth.login("fresh.token.new", Some(3), Some(Role::User)).unwrap();

    assert_eq!(pending.await.unwrap(), RefreshOutcome::Superseded);
    assert_eq!(store.get(), Session::new("fresh.token.new", Some(3), Some(Role::User)));
}

#[tokio::test(start_paused = true)]
async fn stale_401_keeps_newer_login() {
    let api = MockApi { role_delay: IN_FLIGHT, ..MockApi::granting(401) };
    let (auth, store, _) = context(api, Some(admin_session()));

    let pending = tokio::spawn({
        let auth = auth.clone();
        async move { auth.is_authenticated(Role::User).await }
    });
    tokio::time::sleep(MIDWAY).await;
    auth.login("fresh.token.new", Some(3), Some(Role::User)).unwrap();

    assert!(!pending.await.unwrap());
    assert_eq!(store.get().token, "fresh.token.new");
}

// =============================================================================
// sign_in / profile / register
// =============================================================================

#[tokio::test]
async fn sign_in_stores_decoded_claims() {
    let token = make_token(12, Role::User);
    let api = MockApi { login: Mutex::new(Ok(token.clone())), ..MockApi::default() };
    let (auth, store, _) = context(api, None);

    let session = auth.sign_in(" ada@example.com ", "pw").await.unwrap();
    assert_eq!(session, Session::new(token, Some(12), Some(Role::User)));
    assert_eq!(store.get(), session);
}

#[tokio::test]
async fn sign_in_rejects_blank_credentials_locally() {
    let (auth, _, api) = context(MockApi::default(), None);
    assert!(matches!(auth.sign_in("", "pw").await, Err(AuthError::MissingCredentials)));
    assert!(matches!(auth.sign_in("a@b.c", "").await, Err(AuthError::MissingCredentials)));
    assert_eq!(api.login_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sign_in_surfaces_rejection_and_leaves_session_empty() {
    let (auth, store, _) = context(MockApi::default(), None);
    let err = auth.sign_in("a@b.c", "wrong").await.unwrap_err();
    assert!(matches!(err, AuthError::Api(ref e) if e.is_unauthorized()));
    assert_eq!(store.get(), Session::default());
}

#[tokio::test]
async fn profile_requires_login() {
    let (auth, _, _) = context(MockApi::default(), None);
    assert!(matches!(auth.fetch_profile().await, Err(AuthError::NotLoggedIn)));
}

#[tokio::test]
async fn profile_requires_user_id() {
    let (auth, _, _) = context(MockApi::default(), Some(Session::new("t", None, Some(Role::User))));
    assert!(matches!(auth.fetch_profile().await, Err(AuthError::MissingUserId)));
}

#[tokio::test]
async fn profile_fetches_stored_user() {
    let user = User {
        id: 1,
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        role_id: Some("1".into()),
        role_name: Some("Administrator".into()),
        created_utc: None,
        updated_utc: None,
    };
    let api = MockApi { user: Some(user.clone()), ..MockApi::default() };
    let (auth, _, _) = context(api, Some(admin_session()));
    assert_eq!(auth.fetch_profile().await.unwrap(), user);
}

#[tokio::test]
async fn duplicate_registration_is_reported_once() {
    let api = MockApi { register_status: 409, ..MockApi::default() };
    let (auth, _, api) = context(api, None);
    let registration = Registration {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        password: "pw".into(),
    };

    let outcome = auth.register(&registration).await.unwrap();
    assert_eq!(outcome, RegisterOutcome::EmailExists);
    assert_eq!(outcome.message(), "Email already exists.");
    assert_eq!(api.register_calls.load(Ordering::SeqCst), 1);
}
