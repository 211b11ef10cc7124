//! Integration Tests for the Filterlist Engine
//!
//! These tests drive the engine end to end: mutations, the data stores, the
//! persistence overlay and the request lifecycle against scripted loaders.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{ready, BoxFuture};
use futures_util::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use filterlist_core::reactive::Signal;
use filterlist_core::{
    DurableStorage, EventType, Filterlist, FilterlistError, Filters, ItemLoader, ItemsResponse, ListState,
    LoadAction, LoadFailure, LoadListError, LoadResult, MemoryStorage, Options, QueryCodec, RequestParams, Sort,
    StateUpdate, StringStore,
};

type State = ListState<u32, Value, String>;
type List = Filterlist<u32, Value, String>;

/// A loader call waiting for the test to settle it.
struct Call {
    params: RequestParams,
    action: LoadAction,
    respond: oneshot::Sender<LoadResult<u32, Value, String>>,
}

impl Call {
    fn succeed(self, items: Vec<u32>) {
        let _ = self.respond.send(Ok(ItemsResponse::new(items)));
    }

    fn fail(self, failure: LoadFailure<Value, String>) {
        let _ = self.respond.send(Err(failure));
    }
}

/// Loader whose calls settle only when the test says so.
#[derive(Clone, Default)]
struct Scripted {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Scripted {
    fn take(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn pending(&self) -> usize {
        self.calls.lock().len()
    }
}

impl ItemLoader<u32, Value, String> for Scripted {
    fn load(&self, params: RequestParams, _prev: State, action: LoadAction) -> BoxFuture<'static, LoadResult<u32, Value, String>> {
        let (respond, settled) = oneshot::channel();
        self.calls.lock().push(Call {
            params,
            action,
            respond,
        });
        async move {
            settled
                .await
                .unwrap_or_else(|_| Err(LoadFailure::defect("call dropped by test")))
        }
        .boxed()
    }
}

/// Loader that settles at once with the next page number.
#[derive(Clone, Default)]
struct Counting {
    calls: Arc<Mutex<Vec<(RequestParams, LoadAction)>>>,
}

impl Counting {
    fn actions(&self) -> Vec<LoadAction> {
        self.calls.lock().iter().map(|(_, action)| *action).collect()
    }

    fn last_params(&self) -> Option<RequestParams> {
        self.calls.lock().last().map(|(params, _)| params.clone())
    }
}

impl ItemLoader<u32, Value, String> for Counting {
    fn load(&self, params: RequestParams, prev: State, action: LoadAction) -> BoxFuture<'static, LoadResult<u32, Value, String>> {
        self.calls.lock().push((params, action));
        let page = if prev.should_clean { 1 } else { prev.loaded_pages + 1 };
        ready(Ok(ItemsResponse::new(vec![page]).with_total(100))).boxed()
    }
}

fn manual() -> Options {
    Options {
        autoload: false,
        ..Options::default()
    }
}

fn filters(pairs: &[(&str, Value)]) -> Filters {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

/// Test that construction starts the first load and its result commits.
#[tokio::test]
async fn autoload_commits_first_result() {
    let loader = |_: RequestParams, _: State, _: LoadAction| {
        ready(Ok::<_, LoadFailure<Value, String>>(ItemsResponse::<u32, Value>::new(vec![1, 2, 3])))
    };
    let list = List::builder().loader(loader).build().unwrap();

    // Loading from the very start
    assert!(list.list_state().loading);

    list.take_pending_load().unwrap().await.unwrap();

    let state = list.list_state();
    assert_eq!(state.items, vec![1, 2, 3]);
    assert!(!state.loading);
    assert!(!state.is_first_load);
    assert_eq!(state.loaded_pages, 1);
}

/// Test that nothing loads without autoload until asked to.
#[tokio::test]
async fn manual_list_waits_for_an_action() {
    let loader = Counting::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    settle().await;
    assert!(!list.list_state().loading);
    assert!(loader.actions().is_empty());

    list.reload().unwrap().await.unwrap();
    assert_eq!(loader.actions(), vec![LoadAction::Reload]);
}

/// Test that only the latest request commits, whatever the settle order.
#[tokio::test]
async fn stale_results_are_discarded() {
    let loader = Scripted::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    let handles: Vec<_> = (2..=4).filter_map(|page| list.set_page(page)).collect();
    settle().await;
    let mut calls = loader.take();
    assert_eq!(calls.len(), 3);

    // Settle the latest first, then the stale ones
    let latest = calls.pop().unwrap();
    assert_eq!(latest.params.page, 4);
    latest.succeed(vec![4]);
    settle().await;
    for call in calls {
        let page = call.params.page;
        call.succeed(vec![page]);
    }

    for handle in handles {
        handle.await.unwrap();
    }
    let state = list.list_state();
    assert_eq!(state.items, vec![4]);
    assert!(!state.loading);
}

/// Test that loading stays on until the latest request settles.
#[tokio::test]
async fn loading_survives_stale_settlements() {
    let loader = Scripted::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    list.set_page(2);
    list.set_page(3);
    settle().await;
    let mut calls = loader.take();
    let latest = calls.pop().unwrap();

    calls.pop().unwrap().succeed(vec![2]);
    settle().await;
    assert!(list.list_state().loading);
    assert!(list.list_state().items.is_empty());

    latest.succeed(vec![3]);
    settle().await;
    assert_eq!(list.list_state().items, vec![3]);
}

/// Test sort toggling on the same column.
#[tokio::test]
async fn sorting_same_column_toggles_direction() {
    let list = List::builder().options(manual()).loader(Counting::default()).build().unwrap();

    list.set_sorting("id", None);
    assert_eq!(list.request_params().sort, Sort::new("id", true));

    list.set_sorting("id", None);
    assert_eq!(list.request_params().sort, Sort::new("id", false));

    list.set_sorting("id", Some(false));
    assert_eq!(list.request_params().sort, Sort::new("id", false));
}

/// Test that an existing query string seeds the request parameters.
#[tokio::test]
async fn query_string_seeds_request_params() {
    let source = Signal::new("?page=3&page_size=20&sort=-id&foo=bar".to_string());
    let list = List::builder()
        .options(manual())
        .loader(Counting::default())
        .store(StringStore::factory(source, QueryCodec::new()))
        .build()
        .unwrap();

    let params = list.request_params();
    assert_eq!(params.page, 3);
    assert_eq!(params.page_size, Some(20));
    assert_eq!(params.sort, Sort::new("id", false));
    assert_eq!(params.applied_filters, filters(&[("foo", json!("bar"))]));

    // Intermediate filters start from the applied ones
    assert_eq!(list.list_state().filters["foo"], json!("bar"));
}

/// Test that mutations write the query string.
#[tokio::test]
async fn mutations_are_written_to_the_query_string() {
    let source = Signal::new(String::new());
    let list = List::builder()
        .options(manual())
        .loader(Counting::default())
        .store(StringStore::factory(source.clone(), QueryCodec::new()))
        .build()
        .unwrap();

    list.set_and_apply_filters(filters(&[("foo", json!("bar"))]));
    list.set_page_size(Some(20));
    list.set_sorting("id", Some(false));
    list.set_page(3);

    assert_eq!(source.get_untracked(), "?foo=bar&page=3&page_size=20&sort=-id");
}

/// Test that a query-string store honours the configured default direction.
#[tokio::test]
async fn query_string_store_uses_default_sort_direction() {
    let source = Signal::new(String::new());
    let list = List::builder()
        .options(Options {
            is_default_sort_asc: false,
            ..manual()
        })
        .loader(Counting::default())
        .store(StringStore::factory(source.clone(), QueryCodec::new()))
        .build()
        .unwrap();
    assert_eq!(list.request_params().sort, Sort::unsorted(false));

    list.set_sorting("id", None);
    assert_eq!(list.request_params().sort, Sort::new("id", false));
    assert_eq!(source.get_untracked(), "?sort=-id");

    list.reset_sorting();
    assert_eq!(list.request_params().sort, Sort::unsorted(false));
    assert_eq!(source.get_untracked(), "");
}

/// Test that an expected failure is recovered into the state.
#[tokio::test]
async fn list_error_is_recovered() {
    let loader = |_: RequestParams, _: State, _: LoadAction| {
        let failure = LoadListError::new("e".to_string()).with_additional(json!({"count": 3}));
        ready(Err::<ItemsResponse<u32, Value>, _>(LoadFailure::from(failure)))
    };
    let list = List::builder().loader(loader).build().unwrap();

    list.take_pending_load().unwrap().await.unwrap();

    let state = list.list_state();
    assert_eq!(state.error.as_deref(), Some("e"));
    assert_eq!(state.additional, Some(json!({"count": 3})));
    assert!(!state.loading);
}

/// Test that a defect reaches the caller and a later success clears nothing it shouldn't.
#[tokio::test]
async fn defects_propagate_to_the_caller() {
    let loader = Scripted::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    let handle = list.reload().unwrap();
    settle().await;
    loader.take().pop().unwrap().fail(LoadFailure::defect("backend exploded"));

    let err = handle.await.unwrap_err();
    assert!(matches!(err, FilterlistError::Loader(_)));
    assert_eq!(list.list_state().error, None);
}

/// Test that a superseded defect is dropped like any stale result.
#[tokio::test]
async fn stale_defects_are_discarded() {
    let loader = Scripted::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    let first = list.reload().unwrap();
    let second = list.reload().unwrap();
    settle().await;
    let mut calls = loader.take();
    let latest = calls.pop().unwrap();
    calls.pop().unwrap().fail(LoadFailure::defect("late"));
    latest.succeed(vec![9]);

    assert!(first.await.is_ok());
    assert!(second.await.is_ok());
    assert_eq!(list.list_state().items, vec![9]);
}

/// Test every filter and sort mutation returns to page 1.
#[tokio::test]
async fn filter_and_sort_mutations_reset_page() {
    let list = List::builder().options(manual()).loader(Counting::default()).build().unwrap();
    let to_page_five = |list: &List| {
        list.set_page(5);
        assert_eq!(list.request_params().page, 5);
    };

    to_page_five(&list);
    list.set_filter_value("q", Some(json!("x")));
    assert_eq!(list.request_params().page, 5);
    list.apply_filter("q");
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.apply_filters(&["q"]);
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.set_and_apply_filter("a", Some(json!(1)));
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.set_and_apply_empty_filters(filters(&[("b", json!(2))]));
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.reset_filter("a");
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.reset_all_filters();
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.set_sorting("id", None);
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.reset_sorting();
    assert_eq!(list.request_params().page, 1);

    to_page_five(&list);
    list.update_state_and_request(StateUpdate {
        applied_filters: Some(Filters::new()),
        ..StateUpdate::default()
    });
    assert_eq!(list.request_params().page, 1);

    // Page size alone keeps the page
    to_page_five(&list);
    list.set_page_size(Some(10));
    assert_eq!(list.request_params().page, 5);
}

/// Test that a full reset keeps saved filters and forces always-reset ones.
#[tokio::test]
async fn reset_all_filters_respects_saved_and_forced_filters() {
    let mut options = manual();
    options.reset_filters_to = filters(&[("status", json!("open"))]);
    options.save_filters_on_reset_all = vec!["keep".to_string()];
    options.always_reset_filters = filters(&[("archived", json!(false))]);
    let list = List::builder().options(options).loader(Counting::default()).build().unwrap();

    list.set_and_apply_filters(filters(&[
        ("keep", json!("mine")),
        ("status", json!("closed")),
        ("q", json!("text")),
    ]));
    list.set_filter_value("draft", Some(json!("unapplied")));
    let before = list.request_params().applied_filters;
    assert_eq!(before["archived"], json!(false));

    list.reset_all_filters();

    let applied = list.request_params().applied_filters;
    assert_eq!(applied.get("keep"), before.get("keep"));
    assert_eq!(applied.get("status"), Some(&json!("open")));
    assert_eq!(applied.get("archived"), Some(&json!(false)));
    assert!(!applied.contains_key("q"));

    let intermediate = list.list_state().filters;
    assert_eq!(intermediate.get("keep"), Some(&json!("mine")));
    assert!(!intermediate.contains_key("draft"));
}

/// Test load-more accumulation and reload replacement.
#[tokio::test]
async fn load_more_accumulates_and_reload_replaces() {
    let loader = Counting::default();
    let list = List::builder().loader(loader.clone()).build().unwrap();
    list.take_pending_load().unwrap().await.unwrap();

    list.load_more().unwrap().await.unwrap();
    list.load_more().unwrap().await.unwrap();
    let state = list.list_state();
    assert_eq!(state.items, vec![1, 2, 3]);
    assert_eq!(state.loaded_pages, 3);
    assert_eq!(state.total, Some(100));

    // Reload drops the items right away
    let reload = list.reload().unwrap();
    assert!(list.list_state().items.is_empty());
    assert!(list.list_state().loading);
    reload.await.unwrap();
    assert_eq!(list.list_state().items, vec![1]);

    assert_eq!(
        loader.actions(),
        vec![LoadAction::Init, LoadAction::LoadMore, LoadAction::LoadMore, LoadAction::Reload]
    );
}

/// Test that saved items stay visible during a cleaning load.
#[tokio::test]
async fn save_items_while_load_keeps_old_items() {
    let options = Options {
        save_items_while_load: true,
        ..Options::default()
    };
    let list = List::builder().options(options).loader(Counting::default()).build().unwrap();
    list.take_pending_load().unwrap().await.unwrap();

    let handle = list.set_sorting("id", None).unwrap();
    assert_eq!(list.list_state().items, vec![1]);
    assert!(list.list_state().should_clean);
    handle.await.unwrap();
}

/// Test that a rewritten query string reloads and syncs intermediate filters.
#[tokio::test]
async fn external_store_change_reloads() {
    let source = Signal::new(String::new());
    let loader = Counting::default();
    let list = List::builder()
        .options(manual())
        .loader(loader.clone())
        .store(StringStore::factory(source.clone(), QueryCodec::new()))
        .build()
        .unwrap();
    list.set_filter_value("foo", Some(json!("draft")));

    let changed = Arc::new(Mutex::new(Vec::new()));
    let changed_clone = changed.clone();
    list.subscribe(EventType::ChangeRequestParams, move |state| {
        changed_clone.lock().push(state.filters.clone());
    });

    // Back/forward navigation rewrites the query
    source.set("?foo=baz&page=2".to_string());
    list.take_pending_load().unwrap().await.unwrap();

    assert_eq!(loader.actions(), vec![LoadAction::ChangeRequestParams]);
    let params = loader.last_params().unwrap();
    assert_eq!(params.page, 2);
    assert_eq!(params.applied_filters["foo"], json!("baz"));
    assert_eq!(list.list_state().filters["foo"], json!("baz"));
    assert_eq!(*changed.lock(), vec![filters(&[("foo", json!("baz"))])]);
}

/// Test that persisted filters win over the store and are written through.
#[tokio::test]
async fn persisted_filters_override_and_write_through() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set("list.status", "\"open\"".to_string());
    storage.set("list.page_size", "{broken".to_string());

    let mut options = manual();
    options.persist.filters.insert("status".into(), "list.status".into());
    options.persist.page_size = Some("list.page_size".into());

    let source = Signal::new("?status=closed".to_string());
    let list = List::builder()
        .options(options)
        .loader(Counting::default())
        .store(StringStore::factory(source.clone(), QueryCodec::new()))
        .storage(storage.clone())
        .build()
        .unwrap();

    // Persisted value wins, unreadable page size is ignored
    let params = list.request_params();
    assert_eq!(params.applied_filters["status"], json!("open"));
    assert_eq!(params.page_size, None);

    list.set_and_apply_filter("status", Some(json!("archived")));
    assert_eq!(storage.get("list.status").as_deref(), Some("\"archived\""));
    assert_eq!(list.request_params().applied_filters["status"], json!("archived"));
    assert_eq!(source.get_untracked(), "?status=archived");

    list.set_page_size(Some(50));
    assert_eq!(storage.get("list.page_size").as_deref(), Some("50"));
    assert_eq!(list.request_params().page_size, Some(50));
}

/// Test that the debounce collapses a burst into one loader call.
#[tokio::test(start_paused = true)]
async fn debounce_collapses_bursts() {
    let loader = Counting::default();
    let options = Options {
        debounce_timeout: Some(Duration::from_millis(300)),
        ..manual()
    };
    let list = List::builder().options(options).loader(loader.clone()).build().unwrap();

    list.set_page(2);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let last = list.set_page(3).unwrap();
    assert!(list.list_state().loading);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(loader.actions().is_empty());

    last.await.unwrap();
    assert_eq!(loader.actions(), vec![LoadAction::ChangeRequestParams]);
    assert_eq!(loader.last_params().unwrap().page, 3);
    assert!(!list.list_state().loading);
}

/// Test auto-refresh and the refresh predicate.
#[tokio::test(start_paused = true)]
async fn auto_refresh_reloads_when_allowed() {
    let loader = Counting::default();
    let allow = Arc::new(Mutex::new(false));
    let allow_clone = allow.clone();
    let options = Options {
        refresh_timeout: Some(Duration::from_millis(1000)),
        ..Options::default()
    };
    let list = List::builder()
        .options(options)
        .loader(loader.clone())
        .should_refresh(move |_| *allow_clone.lock())
        .build()
        .unwrap();
    list.take_pending_load().unwrap().await.unwrap();

    // Declined ticks reschedule silently
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(loader.actions(), vec![LoadAction::Init]);

    *allow.lock() = true;
    tokio::time::sleep(Duration::from_millis(1000)).await;
    settle().await;
    assert_eq!(loader.actions(), vec![LoadAction::Init, LoadAction::Reload]);

    // Destroy stops the timer
    list.destroy();
    tokio::time::sleep(Duration::from_millis(5000)).await;
    assert_eq!(loader.actions().len(), 2);
}

/// Test that a result settling after destroy is not committed.
#[tokio::test]
async fn destroy_discards_in_flight_results() {
    let loader = Scripted::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    let handle = list.reload().unwrap();
    settle().await;
    assert_eq!(loader.pending(), 1);

    let notified = Arc::new(Mutex::new(0));
    let notified_clone = notified.clone();
    list.subscribe(EventType::ChangeListState, move |_| *notified_clone.lock() += 1);

    list.destroy();
    loader.take().pop().unwrap().succeed(vec![1]);
    handle.await.unwrap();

    assert!(list.list_state().items.is_empty());
    assert!(list.set_page(2).is_none());
    assert_eq!(*notified.lock(), 0);
}

/// Test that every load-triggering mutation announces itself already loading.
#[tokio::test]
async fn mutation_events_carry_loading_state() {
    let loader = Scripted::default();
    let list = List::builder()
        .options(manual())
        .loader(loader.clone())
        .items(vec![7, 8])
        .build()
        .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in [
        EventType::SetAndApplyFilter,
        EventType::SetSorting,
        EventType::SetPage,
        EventType::SetPageSize,
        EventType::LoadMore,
        EventType::Reload,
        EventType::UpdateStateAndRequest,
    ] {
        let seen = seen.clone();
        list.subscribe(event, move |state: &State| {
            seen.lock().push((event, state.loading, state.items.len()))
        });
    }

    list.load_more();
    list.set_and_apply_filter("q", Some(json!("x")));
    list.set_sorting("id", None);
    list.set_page(3);
    list.set_page_size(Some(50));
    list.reload();
    list.update_state_and_request(StateUpdate {
        page: Some(2),
        ..StateUpdate::default()
    });

    assert_eq!(
        *seen.lock(),
        vec![
            (EventType::LoadMore, true, 2),
            (EventType::SetAndApplyFilter, true, 0),
            (EventType::SetSorting, true, 0),
            (EventType::SetPage, true, 0),
            (EventType::SetPageSize, true, 0),
            (EventType::Reload, true, 0),
            (EventType::UpdateStateAndRequest, true, 0),
        ]
    );
}

/// Test the event sequence of a load.
#[tokio::test]
async fn events_follow_the_request() {
    let list = List::builder().options(manual()).loader(Counting::default()).build().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event in [
        EventType::SetPage,
        EventType::ChangeLoadParams,
        EventType::ChangeRequestParams,
        EventType::RequestItems,
        EventType::LoadItemsSuccess,
    ] {
        let seen = seen.clone();
        list.subscribe(event, move |state: &State| seen.lock().push((event, state.loading)));
    }
    let changes = Arc::new(Mutex::new(0));
    let changes_clone = changes.clone();
    let id = list.subscribe(EventType::ChangeListState, move |_| *changes_clone.lock() += 1);

    list.set_page(2).unwrap().await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            (EventType::SetPage, true),
            (EventType::ChangeLoadParams, true),
            (EventType::ChangeRequestParams, true),
            (EventType::RequestItems, true),
            (EventType::LoadItemsSuccess, false),
        ]
    );
    assert_eq!(*changes.lock(), 3);

    assert!(list.unsubscribe(EventType::ChangeListState, id));
    list.set_total(Some(7));
    assert_eq!(*changes.lock(), 3);
    assert_eq!(list.list_state().total, Some(7));
}

/// Test local item edits with replacement of additional data.
#[tokio::test]
async fn item_edits_replace_additional() {
    let list = List::builder()
        .options(manual())
        .loader(Counting::default())
        .items(vec![1, 2, 3])
        .additional(json!({"count": 3}))
        .build()
        .unwrap();

    list.delete_item(0, Some(json!({"count": 2}))).unwrap();
    list.insert_item(0, 7, None).unwrap();

    let state = list.list_state();
    assert_eq!(state.items, vec![7, 2, 3]);
    assert_eq!(state.additional, Some(json!({"count": 2})));
    assert!(matches!(
        list.update_item(3, 0, None),
        Err(FilterlistError::ItemIndexOutOfRange { index: 3, len: 3 })
    ));
}

/// Test a bulk update loads once with every change.
#[tokio::test]
async fn bulk_update_loads_once() {
    let loader = Counting::default();
    let list = List::builder().options(manual()).loader(loader.clone()).build().unwrap();

    list.update_state_and_request(StateUpdate {
        filters: Some(filters(&[("q", json!("draft"))])),
        applied_filters: Some(filters(&[("q", json!("x"))])),
        sort: Some(Sort::new("name", false)),
        page: Some(3),
        page_size: Some(Some(25)),
    })
    .unwrap()
    .await
    .unwrap();

    assert_eq!(loader.actions(), vec![LoadAction::ChangeRequestParams]);
    let params = loader.last_params().unwrap();
    assert_eq!(params.page, 3);
    assert_eq!(params.page_size, Some(25));
    assert_eq!(params.sort, Sort::new("name", false));
    assert_eq!(params.applied_filters["q"], json!("x"));
    assert_eq!(list.list_state().filters["q"], json!("draft"));
}
