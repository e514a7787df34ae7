mod common;

use async_trait::async_trait;
use common::{failing_maker, in_memory_maker, user, PermissionsFixture, QUIET, WAIT};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sync_permissions::permissions::{
    HiddenRealm, PermissionChangeRecord, PermissionChangeResult, PERMISSION_CHANGE_TABLE,
};
use sync_permissions::{
    AccessLevel, ChangeStage, ChangeStatus, Condition, OperationState, Permission,
    PermissionChangeError, PermissionChangeTicket, PermissionResults, Permissions,
    PermissionsConfig, RealmConfig, RealmError, RealmOpener, RealmResult, SharedRealm,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

async fn get(
    permissions: &Permissions,
    user: Arc<sync_permissions::SyncUser>,
    maker: sync_permissions::ConfigMaker,
) -> PermissionChangeResult<PermissionResults> {
    let (tx, rx) = oneshot::channel();
    permissions.get_permissions(
        user,
        move |result| {
            let _ = tx.send(result);
        },
        maker,
    );
    timeout(WAIT, rx).await.expect("callback not invoked").unwrap()
}

async fn set(
    permissions: &Permissions,
    user: Arc<sync_permissions::SyncUser>,
    permission: Permission,
    maker: sync_permissions::ConfigMaker,
) -> PermissionChangeResult<PermissionChangeTicket> {
    let (tx, rx) = oneshot::channel();
    permissions.set_permission(
        user,
        permission,
        move |result| {
            let _ = tx.send(result);
        },
        maker,
    );
    timeout(WAIT, rx).await.expect("callback not invoked").unwrap()
}

fn subscribe(
    results: &PermissionResults,
) -> (
    sync_permissions::NotificationToken,
    mpsc::UnboundedReceiver<RealmResult<()>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let token = results
        .add_notification_callback(move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();
    (token, rx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_permission_completes_on_local_commit() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let permission = Permission::new("/A/Data", AccessLevel::Write, Condition::user_id("userB"));

    let ticket = set(
        &fixture.permissions,
        Arc::clone(&user_a),
        permission,
        fixture.on_disk_maker(),
    )
    .await
    .unwrap();
    assert_eq!(ticket.user, "userA");

    let management = fixture.hidden_realm(&user_a, HiddenRealm::Management);
    let stored = management
        .find(PERMISSION_CHANGE_TABLE, &ticket.id)
        .unwrap()
        .expect("change record was not written");
    let record: PermissionChangeRecord = serde_json::from_value(stored).unwrap();
    assert_eq!(record.user_id.as_deref(), Some("userB"));
    assert_eq!(record.realm_url, "realm://127.0.0.1:9080/A/Data");
    assert_eq!(record.access(), AccessLevel::Write);
    assert_eq!(record.status_code, None);

    // nothing processed it yet
    let status = fixture
        .permissions
        .change_status(&user_a, &ticket, &fixture.on_disk_maker())
        .await
        .unwrap();
    assert_eq!(status, ChangeStatus::Pending);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_permission_writes_revocation() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let permission = Permission::new("/A/Data", AccessLevel::Admin, "userB");

    let (tx, rx) = oneshot::channel();
    let handle = fixture.permissions.delete_permission(
        Arc::clone(&user_a),
        permission,
        move |result| {
            let _ = tx.send(result);
        },
        in_memory_maker(),
    );
    let ticket = timeout(WAIT, rx).await.unwrap().unwrap().unwrap();
    handle.finished().await;

    let stored = fixture
        .hidden_realm(&user_a, HiddenRealm::Management)
        .find(PERMISSION_CHANGE_TABLE, &ticket.id)
        .unwrap()
        .unwrap();
    let record: PermissionChangeRecord = serde_json::from_value(stored).unwrap();
    assert_eq!(record.access(), AccessLevel::None);
    assert_eq!(record.may_read, Some(false));
    assert_eq!(record.may_manage, Some(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_permissions_on_empty_realm() {
    let fixture = PermissionsFixture::new();
    let results = get(&fixture.permissions, user("userA"), in_memory_maker())
        .await
        .unwrap();
    assert_eq!(results.size().unwrap(), 0);
    assert!(results.get(0).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_initial_notification_then_one_per_change() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let results = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();

    let (_token, mut rx) = subscribe(&results);
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(Ok(())));
    assert!(timeout(QUIET, rx.recv()).await.is_err());

    fixture.apply_grant(
        &user_a,
        &Permission::new("/A/Data", AccessLevel::Read, "userA"),
    );
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(Ok(())));
    assert!(timeout(QUIET, rx.recv()).await.is_err());
    assert_eq!(results.size().unwrap(), 1);
    assert_eq!(results.get(0).unwrap().path, "/A/Data");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_token_receives_nothing() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let results = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();

    let (token, mut rx) = subscribe(&results);
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(Ok(())));
    drop(token);

    fixture.apply_grant(
        &user_a,
        &Permission::new("/A/Data", AccessLevel::Write, "userA"),
    );
    // the callback (and its sender) is released with the token
    assert!(matches!(timeout(QUIET, rx.recv()).await, Ok(None) | Err(_)));
    assert_eq!(results.size().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_token_dropped_on_another_thread_waits_for_delivery() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let results = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let delivered = Arc::new(AtomicBool::new(false));
    let (entered_tx, mut entered) = mpsc::unbounded_channel();
    let token = {
        let calls = Arc::clone(&calls);
        let delivered = Arc::clone(&delivered);
        results
            .add_notification_callback(move |_| {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = entered_tx.send(call);
                if call == 2 {
                    std::thread::sleep(Duration::from_millis(200));
                    delivered.store(true, Ordering::SeqCst);
                }
            })
            .unwrap()
    };
    assert_eq!(timeout(WAIT, entered.recv()).await.unwrap(), Some(1));

    fixture.apply_grant(
        &user_a,
        &Permission::new("/A/Data", AccessLevel::Read, "userA"),
    );
    // the second delivery is now sleeping on the notifier thread
    assert_eq!(timeout(WAIT, entered.recv()).await.unwrap(), Some(2));

    let finished_before_drop_returned = {
        let delivered = Arc::clone(&delivered);
        tokio::task::spawn_blocking(move || {
            std::thread::spawn(move || {
                drop(token);
                delivered.load(Ordering::SeqCst)
            })
            .join()
            .unwrap()
        })
        .await
        .unwrap()
    };
    assert!(finished_before_drop_returned);

    fixture.apply_grant(
        &user_a,
        &Permission::new("/B/Data", AccessLevel::Read, "userA"),
    );
    tokio::time::sleep(QUIET).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(results.size().unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hidden_realm_grants_are_not_reported() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let results = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();

    for path in ["/~/__management", "/~/__permission", "/B/Data", "/A/Data"] {
        fixture.apply_grant(
            &user_a,
            &Permission::new(path, AccessLevel::Admin, "userA"),
        );
    }
    let paths: Vec<String> = results
        .snapshot()
        .unwrap()
        .into_iter()
        .map(|p| p.path)
        .collect();
    assert_eq!(paths, vec!["/A/Data".to_string(), "/B/Data".to_string()]);

    let writable = results.with_access(AccessLevel::Write);
    assert_eq!(writable.size().unwrap(), 2);
    assert_eq!(results.for_path("/B/Data").size().unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_remote_rejection_is_reported_once() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let maker = in_memory_maker();
    let ticket = set(
        &fixture.permissions,
        Arc::clone(&user_a),
        Permission::new("/A/Data", AccessLevel::Read, "userB"),
        Arc::clone(&maker),
    )
    .await
    .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = fixture.permissions.watch_change(
        Arc::clone(&user_a),
        ticket.clone(),
        move |result| {
            let _ = tx.send(result);
        },
        Arc::clone(&maker),
    );
    assert!(timeout(QUIET, rx.recv()).await.is_err());

    fixture.process_change(&user_a, &ticket, 614, Some("realm does not exist"));
    let outcome = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        outcome,
        Err(PermissionChangeError::rejected(614, "realm does not exist"))
    );
    assert_eq!(outcome.unwrap_err().stage, ChangeStage::RemoteRejection);
    handle.finished().await;
    assert_eq!(timeout(QUIET, rx.recv()).await.unwrap(), None);

    let status = fixture
        .permissions
        .change_status(&user_a, &ticket, &maker)
        .await
        .unwrap();
    assert_eq!(
        status,
        ChangeStatus::Rejected {
            code: 614,
            message: "realm does not exist".to_string()
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_accepted_change_completes_watch() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let maker = in_memory_maker();
    let ticket = set(
        &fixture.permissions,
        Arc::clone(&user_a),
        Permission::new("/A/Data", AccessLevel::Read, Condition::key_value("team", "ops")),
        Arc::clone(&maker),
    )
    .await
    .unwrap();
    fixture.process_change(&user_a, &ticket, 0, None);

    let (tx, rx) = oneshot::channel();
    let handle = fixture.permissions.watch_change(
        Arc::clone(&user_a),
        ticket,
        move |result| {
            let _ = tx.send(result);
        },
        maker,
    );
    assert_eq!(timeout(WAIT, rx).await.unwrap().unwrap(), Ok(()));
    handle.finished().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_configuration_error_is_reported() {
    let fixture = PermissionsFixture::new();
    let (tx, rx) = oneshot::channel();
    let handle = fixture.permissions.get_permissions(
        user("userA"),
        move |result| {
            let _ = tx.send(result);
        },
        failing_maker(),
    );
    let error = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert_eq!(error.stage, ChangeStage::Configuration);
    assert_eq!(error.code, PermissionChangeError::CONFIGURATION);

    let user_bad = Arc::new(sync_permissions::SyncUser::new("userB", "ftp://h", "t"));
    let error = get(&fixture.permissions, user_bad, in_memory_maker())
        .await
        .unwrap_err();
    assert_eq!(error.stage, ChangeStage::Configuration);

    // the state is final before the callback runs
    assert_eq!(handle.state(), OperationState::Failed);
    handle.finished().await;
    assert!(fixture.permissions.cache().is_empty());
}

/// Opener that refuses every open.
struct RejectingOpener {
    opens: AtomicUsize,
}

#[async_trait]
impl RealmOpener for RejectingOpener {
    async fn open(&self, _config: RealmConfig) -> RealmResult<SharedRealm> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Err(RealmError::Auth("refresh token expired".to_string()))
    }
}

/// Opener that takes longer than any test is willing to wait.
struct StalledOpener;

#[async_trait]
impl RealmOpener for StalledOpener {
    async fn open(&self, _config: RealmConfig) -> RealmResult<SharedRealm> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(RealmError::Sync("never reached".to_string()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_failure_is_not_retried() {
    let opener = Arc::new(RejectingOpener {
        opens: AtomicUsize::new(0),
    });
    let permissions = Permissions::new(
        opener.clone(),
        PermissionsConfig::default(),
        tokio::runtime::Handle::current(),
    );

    let (tx, rx) = oneshot::channel();
    let handle = permissions.set_permission(
        user("userA"),
        Permission::new("/A/Data", AccessLevel::Read, "userB"),
        move |result| {
            let _ = tx.send(result);
        },
        in_memory_maker(),
    );
    let error = timeout(WAIT, rx).await.unwrap().unwrap().unwrap_err();
    assert_eq!(error.stage, ChangeStage::Open);
    assert_eq!(error.code, PermissionChangeError::AUTH);
    assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state(), OperationState::Failed);
    assert!(permissions.cache().get("userA", HiddenRealm::Management).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_open_times_out() {
    let config = PermissionsConfig {
        open_timeout_ms: 50,
        ..PermissionsConfig::default()
    };
    let permissions = Permissions::new(
        Arc::new(StalledOpener),
        config,
        tokio::runtime::Handle::current(),
    );
    let error = permissions
        .fetch_permissions(&user("userA"), &in_memory_maker())
        .await
        .unwrap_err();
    assert_eq!(error.code, PermissionChangeError::TIMEOUT);
    assert_eq!(error.stage, ChangeStage::Open);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_operation_never_calls_back() {
    let permissions = Permissions::new(
        Arc::new(StalledOpener),
        PermissionsConfig::default(),
        tokio::runtime::Handle::current(),
    );
    let (tx, rx) = oneshot::channel::<()>();
    let handle = permissions.get_permissions(
        user("userA"),
        move |_| {
            let _ = tx.send(());
        },
        in_memory_maker(),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.state(), OperationState::OpeningRealm);
    handle.abort();
    handle.finished().await;
    // the callback was dropped unused
    assert!(timeout(QUIET, rx).await.unwrap().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_realms_are_cached_per_user() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let user_b = user("userB");

    let results_a = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();
    let results_b = get(&fixture.permissions, Arc::clone(&user_b), in_memory_maker())
        .await
        .unwrap();
    let again_a = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();

    let realm_a = fixture.hidden_realm(&user_a, HiddenRealm::Permission);
    let realm_b = fixture.hidden_realm(&user_b, HiddenRealm::Permission);
    assert!(!Arc::ptr_eq(&realm_a, &realm_b));
    assert_eq!(fixture.permissions.cache().len(), 2);

    fixture.apply_grant(
        &user_a,
        &Permission::new("/A/Data", AccessLevel::Write, "userA"),
    );
    assert_eq!(results_a.size().unwrap(), 1);
    assert_eq!(again_a.size().unwrap(), 1);
    assert_eq!(results_b.size().unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_survives_reopen() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let maker = fixture.on_disk_maker();
    let ticket = fixture
        .permissions
        .submit_permission(
            &user_a,
            &Permission::new("/A/Data", AccessLevel::Read, "userB"),
            &maker,
        )
        .await
        .unwrap();

    fixture.permissions.close_user("userA");
    assert!(fixture.permissions.cache().is_empty());

    let status = fixture
        .permissions
        .change_status(&user_a, &ticket, &maker)
        .await
        .unwrap();
    assert_eq!(status, ChangeStatus::Pending);

    let revoked = fixture
        .permissions
        .revoke_permission(
            &user_a,
            &Permission::new("/A/Data", AccessLevel::Read, "userB"),
            &maker,
        )
        .await
        .unwrap();
    assert_ne!(revoked.id, ticket.id);
    fixture.permissions.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_closing_realm_ends_subscriptions_with_error() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let results = get(&fixture.permissions, Arc::clone(&user_a), in_memory_maker())
        .await
        .unwrap();
    let (token, mut rx) = subscribe(&results);
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), Some(Ok(())));

    fixture.permissions.close_user("userA");
    assert_eq!(
        timeout(WAIT, rx.recv()).await.unwrap(),
        Some(Err(RealmError::Closed))
    );
    assert!(!token.is_active());
    assert!(matches!(timeout(QUIET, rx.recv()).await, Ok(None) | Err(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_results_held_across_close_user_do_not_block_reopen() {
    let fixture = PermissionsFixture::new();
    let user_a = user("userA");
    let maker = fixture.on_disk_maker();
    let held = fixture
        .permissions
        .fetch_permissions(&user_a, &maker)
        .await
        .unwrap();

    fixture.permissions.close_user("userA");
    let reopened = fixture
        .permissions
        .fetch_permissions(&user_a, &maker)
        .await
        .unwrap();
    assert_eq!(reopened.size().unwrap(), 0);
    assert!(held.size().is_err());

    fixture.apply_grant(
        &user_a,
        &Permission::new("/A/Data", AccessLevel::Read, "userA"),
    );
    assert_eq!(reopened.size().unwrap(), 1);
    fixture.permissions.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_results_held_across_eviction_share_the_realm() {
    let fixture = PermissionsFixture::with_cache_capacity(1);
    let user_a = user("userA");
    let maker = fixture.on_disk_maker();
    let held = fixture
        .permissions
        .fetch_permissions(&user_a, &maker)
        .await
        .unwrap();

    // opening the management realm pushes the permission realm out
    fixture
        .permissions
        .submit_permission(
            &user_a,
            &Permission::new("/A/Data", AccessLevel::Read, "userB"),
            &maker,
        )
        .await
        .unwrap();
    assert!(fixture
        .permissions
        .cache()
        .get("userA", HiddenRealm::Permission)
        .is_none());

    let again = fixture
        .permissions
        .fetch_permissions(&user_a, &maker)
        .await
        .unwrap();
    fixture.apply_grant(
        &user_a,
        &Permission::new("/A/Data", AccessLevel::Write, "userA"),
    );
    assert_eq!(again.size().unwrap(), 1);
    assert_eq!(held.size().unwrap(), 1);
    fixture.permissions.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_callback_does_not_escape_the_handle() {
    let fixture = PermissionsFixture::new();
    let handle = fixture.permissions.get_permissions(
        user("userA"),
        |_| panic!("callback failure"),
        in_memory_maker(),
    );
    timeout(WAIT, handle.finished()).await.unwrap();
}
