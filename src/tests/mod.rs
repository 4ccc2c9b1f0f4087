
use std::sync::Arc;

use crate::api::{ApiError, PortalApi, PrioritizedInitiative, Status};
use crate::dashboard::{
    Dashboard, DashboardOptions, FetchOutcome, Filters, Phase, SentinelHub, SortOrder,
    StatusFilter, ViewportEvent,
};
use crate::form::{InitiativeDraft, Step};
use crate::session::{FileTokenStore, MemoryTokenStore, Route, Session};

use stub::{initiative, page, StubApi};

fn admin_dashboard(api: Arc<StubApi>) -> (Dashboard<StubApi>, Arc<Session>) {
    let session = Arc::new(Session::new(MemoryTokenStore::with_token("t")));
    let dashboard = Dashboard::new(
        api,
        session.clone(),
        DashboardOptions::default(),
        Filters::default(),
    );
    (dashboard, session)
}

async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn filter_change_mid_flight_reissues_with_new_filters() {
    let api = Arc::new(StubApi::default());
    api.push_page(Ok(page(1..=20)));
    api.push_page(Ok((21..=23)
        .map(|id| initiative(id, Status::Responded))
        .collect()));
    let gate = api.hold_next_list();
    let (dashboard, _) = admin_dashboard(api.clone());

    let (mounted, changed) = tokio::join!(dashboard.mount(), async {
        let outcome = dashboard
            .set_status_filter(StatusFilter::Only(Status::Responded))
            .await;
        let snapshot = dashboard.pager().snapshot();
        assert_eq!(snapshot.len, 0);
        assert_eq!(snapshot.offset, 0);
        gate.notify_one();
        outcome
    });

    assert_eq!(changed.unwrap(), FetchOutcome::Skipped);
    assert_eq!(
        mounted.unwrap(),
        FetchOutcome::Applied {
            received: 3,
            has_more: false
        }
    );

    let requests = api.list_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].status, Some(Status::Responded));
    assert_eq!(requests[1].offset, Some(0));
    assert_eq!(api.max_outstanding(), 1);

    let ids: Vec<u64> = dashboard.view().records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![21, 22, 23]);
}

#[tokio::test]
async fn forbidden_response_logs_out_and_discards_draft() {
    let api = Arc::new(StubApi::default());
    api.push_respond_result(Err(ApiError::Unauthorized { status: 403 }));
    let (dashboard, session) = admin_dashboard(api.clone());

    dashboard.start_response(5);
    dashboard.edit_response("Hvala za pobudo.");
    let err = dashboard.submit_response().await.unwrap_err();

    assert!(err.is_auth_failure());
    assert!(!session.is_authenticated());
    assert_eq!(session.take_redirect(), Some(Route::Login));
    assert!(dashboard.draft().is_none());
    assert_eq!(api.responses(), vec![(5, "t".to_string(), "Hvala za pobudo.".to_string())]);
}

#[tokio::test]
async fn successful_response_reloads_from_the_first_page() {
    let api = Arc::new(StubApi::default());
    api.push_page(Ok(page(1..=20)));
    api.push_page(Ok(page(21..=40)));
    api.push_page(Ok(page(2..=21)));
    let (dashboard, _) = admin_dashboard(api.clone());
    dashboard.mount().await.unwrap();
    dashboard.load_more().await.unwrap();
    assert_eq!(dashboard.view().loaded, 40);

    dashboard.respond(1, "Urejeno.").await.unwrap();

    let view = dashboard.view();
    assert_eq!(view.loaded, 20);
    assert_eq!(view.records[0].id, 2);
    assert_eq!(api.list_requests().last().and_then(|q| q.offset), Some(0));
}

#[tokio::test]
async fn auto_fill_stops_after_two_pages() {
    let api = Arc::new(StubApi::default());
    for start in 0..5u64 {
        api.push_page(Ok(page(start * 20 + 1..=start * 20 + 20)));
    }
    let (dashboard, _) = admin_dashboard(api.clone());
    dashboard.mount().await.unwrap();
    let hub = SentinelHub::new();

    let run = dashboard.run(&hub, |_, outcome| {
        if let Some(FetchOutcome::Applied { .. }) = outcome {
            hub.notify(ViewportEvent::Layout { scrollable: false });
        }
    });
    let drive = async {
        settle().await;
        hub.notify(ViewportEvent::Layout { scrollable: false });
        settle().await;
        assert_eq!(api.list_requests().len(), 3);

        hub.notify(ViewportEvent::SentinelVisible);
        settle().await;
        assert_eq!(api.list_requests().len(), 4);

        dashboard.teardown();
        hub.close();
    };
    tokio::join!(run, drive);

    assert_eq!(hub.subscriber_count(), 0);
    assert_eq!(api.max_outstanding(), 1);
}

#[tokio::test]
async fn error_phase_waits_for_a_filter_change() {
    let api = Arc::new(StubApi::default());
    api.push_page(Err(ApiError::Status {
        endpoint: "/pobude".to_string(),
        status: 502,
        body: "bad gateway".to_string(),
    }));
    let (dashboard, _) = admin_dashboard(api.clone());
    assert!(dashboard.mount().await.is_err());
    assert_eq!(dashboard.view().phase, Phase::Error);
    assert!(dashboard.error_message().unwrap().contains("502"));

    let outcome = dashboard
        .handle_event(ViewportEvent::SentinelVisible)
        .await
        .unwrap();
    assert_eq!(outcome, None);
    assert_eq!(api.list_requests().len(), 1);

    api.push_page(Ok(page(1..=2)));
    dashboard
        .set_category(Some("Ceste".to_string()))
        .await
        .unwrap();
    assert_eq!(dashboard.error_message(), None);
    assert_eq!(dashboard.view().records.len(), 2);
}

#[tokio::test]
async fn remote_priorities_sort_stably() {
    let api = Arc::new(StubApi::default());
    api.push_page(Ok(page(1..=4)));
    let score = |id, priority_score| PrioritizedInitiative {
        id,
        title: String::new(),
        priority_score,
        ai_analysis: None,
    };
    api.set_prioritized(Ok(vec![score(1, 40), score(2, 90), score(3, 40), score(4, 150)]));
    let (dashboard, _) = admin_dashboard(api);
    dashboard.mount().await.unwrap();

    assert_eq!(dashboard.prioritize_remote().await.unwrap(), 4);
    let ids = |d: &Dashboard<StubApi>| d.view().records.iter().map(|r| r.id).collect::<Vec<_>>();
    assert_eq!(ids(&dashboard), vec![4, 2, 1, 3]);

    dashboard.set_sort_order(SortOrder::Ascending);
    assert_eq!(ids(&dashboard), vec![1, 3, 2, 4]);
    assert_eq!(dashboard.view().importance.get(4), Some(100));
}

#[tokio::test]
async fn login_persists_token_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("token");
    let api = StubApi::default();
    api.set_login_token("abc123");

    let session = Session::new(FileTokenStore::new(&path));
    assert!(!session.is_authenticated());
    let err = session.login(&api, "admin", "wrong").await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { status: 401 }));
    assert!(!path.exists());

    session.login(&api, "admin", "secret").await.unwrap();
    assert_eq!(session.take_redirect(), Some(Route::Admin));
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "abc123");

    let restored = Session::new(FileTokenStore::new(&path));
    assert_eq!(restored.credential().unwrap().token(), "abc123");

    restored.logout();
    assert!(!path.exists());
    assert!(Session::new(FileTokenStore::new(&path)).credential().is_err());
}

#[tokio::test]
async fn submitted_form_reaches_the_backend() {
    let api = StubApi::default();
    let mut draft = InitiativeDraft::new();
    draft.set_address("Trubarjeva cesta", "5");
    assert_eq!(draft.advance().unwrap(), Step::Details);
    draft.title = "Luknja na cesti".to_string();
    draft.description = "Globoka luknja pred vhodom v park.".to_string();
    draft.category = Some("Oglaševanje".to_string());
    assert_eq!(draft.advance().unwrap(), Step::Contact);
    draft.email = "janez@example.si".to_string();
    assert_eq!(draft.advance().unwrap(), Step::Ready);

    let request = draft.into_request().unwrap();
    let created = api.create_initiative(&request).await.unwrap();
    assert_eq!(created.status, Status::Pending);
    assert_eq!(created.location, "Trubarjeva cesta 5, Ljubljana");

    let sent = api.created();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].category.as_deref(), Some("Oglaševanje "));
}
