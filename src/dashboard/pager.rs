use std::sync::{Arc, Mutex};

use futures::future::join;
use tracing::{debug, info, warn};

use crate::api::models::canonical_category;
use crate::api::{ApiError, Initiative, ListQuery, PortalApi, Statistics, Status};
use crate::session::Session;

use super::projection::StatusFilter;

pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Server-side filters. Changing any of them starts a new filter session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filters {
    pub status: StatusFilter,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl Filters {
    pub fn pending() -> Self {
        Self {
            status: StatusFilter::Only(Status::Pending),
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    LoadingMore,
    Loaded,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A page was merged into the accumulator.
    Applied { received: usize, has_more: bool },
    /// Another request already holds the in-flight slot.
    Skipped,
    /// The pager was torn down before the response arrived.
    Ignored,
}

#[derive(Clone, Debug)]
pub struct PagerOptions {
    pub page_size: usize,
    /// Status whose listing is requested unpaginated in one go.
    pub full_fetch_status: Option<Status>,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            full_fetch_status: Some(Status::Pending),
        }
    }
}

#[derive(Debug)]
struct PageState {
    accumulator: Vec<Initiative>,
    offset: usize,
    has_more: bool,
    in_flight: bool,
    phase: Phase,
    error: Option<String>,
    filters: Filters,
    generation: u64,
    statistics: Option<Statistics>,
    page_loads: u64,
    mounted: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            accumulator: Vec::new(),
            offset: 0,
            has_more: true,
            in_flight: false,
            phase: Phase::Idle,
            error: None,
            filters: Filters::default(),
            generation: 0,
            statistics: None,
            page_loads: 0,
            mounted: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PagerSnapshot {
    pub len: usize,
    pub offset: usize,
    pub has_more: bool,
    pub in_flight: bool,
    pub phase: Phase,
    pub error: Option<String>,
    pub filters: Filters,
    pub generation: u64,
    pub statistics: Option<Statistics>,
    pub page_loads: u64,
}

struct Ticket {
    generation: u64,
    reset: bool,
    full_fetch: bool,
    query: ListQuery,
}

enum Settled {
    Applied(FetchOutcome),
    Failed(ApiError),
    Ignored,
    Restart(Ticket),
}

struct InFlightGuard<'a> {
    state: &'a Mutex<PageState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.in_flight = false;
    }
}

/// Offset-paginated accumulator over the initiative listing.
///
/// At most one list request is outstanding at a time. A filter change while a
/// request is in flight bumps the generation; the in-flight task then discards
/// its response and re-issues the reset request for the new filters before
/// releasing the slot.
pub struct Pager<A: PortalApi + ?Sized> {
    api: Arc<A>,
    session: Arc<Session>,
    options: PagerOptions,
    state: Mutex<PageState>,
}

impl<A: PortalApi + ?Sized> Pager<A> {
    pub fn new(api: Arc<A>, session: Arc<Session>, options: PagerOptions) -> Self {
        Self::with_filters(api, session, options, Filters::default())
    }

    pub fn with_filters(
        api: Arc<A>,
        session: Arc<Session>,
        options: PagerOptions,
        filters: Filters,
    ) -> Self {
        let state = PageState {
            filters,
            ..PageState::default()
        };
        Self {
            api,
            session,
            options,
            state: Mutex::new(state),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn options(&self) -> &PagerOptions {
        &self.options
    }

    pub fn snapshot(&self) -> PagerSnapshot {
        self.with_state(|s| PagerSnapshot {
            len: s.accumulator.len(),
            offset: s.offset,
            has_more: s.has_more,
            in_flight: s.in_flight,
            phase: s.phase,
            error: s.error.clone(),
            filters: s.filters.clone(),
            generation: s.generation,
            statistics: s.statistics.clone(),
            page_loads: s.page_loads,
        })
    }

    /// Runs `f` against the accumulated records without copying them.
    pub fn with_records<R>(&self, f: impl FnOnce(&[Initiative]) -> R) -> R {
        self.with_state(|s| f(&s.accumulator))
    }

    pub fn filters(&self) -> Filters {
        self.with_state(|s| s.filters.clone())
    }

    pub fn is_mounted(&self) -> bool {
        self.with_state(|s| s.mounted)
    }

    fn is_full_fetch(&self, filters: &Filters) -> bool {
        match (filters.status.status(), self.options.full_fetch_status) {
            (Some(status), Some(full)) => status == full,
            _ => false,
        }
    }

    fn ticket(&self, state: &PageState, reset: bool) -> Ticket {
        let full_fetch = self.is_full_fetch(&state.filters);
        let (limit, offset) = if full_fetch {
            (None, None)
        } else {
            let offset = if reset { 0 } else { state.offset };
            (Some(self.options.page_size), Some(offset))
        };
        Ticket {
            generation: state.generation,
            reset,
            full_fetch,
            query: ListQuery {
                limit,
                offset,
                status: state.filters.status.status(),
                category: state.filters.category.as_deref().map(canonical_category),
                search: state.filters.search.clone(),
            },
        }
    }

    fn begin(&self, reset: bool) -> Result<Ticket, FetchOutcome> {
        self.with_state(|state| {
            if !state.mounted {
                return Err(FetchOutcome::Ignored);
            }
            if state.in_flight {
                debug!(reset, "list request already in flight, skipping");
                return Err(FetchOutcome::Skipped);
            }
            if !reset && state.phase == Phase::Error {
                return Err(FetchOutcome::Skipped);
            }
            if !reset && (!state.has_more || self.is_full_fetch(&state.filters)) {
                debug!("listing exhausted, nothing more to request");
                return Err(FetchOutcome::Skipped);
            }
            state.in_flight = true;
            state.phase = if reset {
                Phase::Loading
            } else {
                Phase::LoadingMore
            };
            Ok(self.ticket(state, reset))
        })
    }

    async fn fetch_statistics(&self) -> Option<Result<Statistics, ApiError>> {
        let credential = self.session.credential().ok()?;
        let result = self.api.admin_statistics(&credential).await;
        Some(self.session.intercept(result))
    }

    /// Requests the next page, or the first page of the current filters when
    /// `reset` is set. Returns `Skipped` without issuing a request while
    /// another fetch holds the in-flight slot.
    pub async fn fetch_page(&self, reset: bool) -> Result<FetchOutcome, ApiError> {
        let mut ticket = match self.begin(reset) {
            Ok(ticket) => ticket,
            Err(outcome) => return Ok(outcome),
        };
        let _release = InFlightGuard { state: &self.state };

        loop {
            debug!(
                generation = ticket.generation,
                reset = ticket.reset,
                offset = ?ticket.query.offset,
                "requesting initiatives"
            );
            let (page, statistics) = join(
                self.api.list_initiatives(&ticket.query),
                self.fetch_statistics(),
            )
            .await;
            let page = self.session.intercept(page);

            match self.settle(ticket, page, statistics) {
                Settled::Applied(outcome) => return Ok(outcome),
                Settled::Failed(e) => return Err(e),
                Settled::Ignored => return Ok(FetchOutcome::Ignored),
                Settled::Restart(next) => ticket = next,
            }
        }
    }

    fn settle(
        &self,
        ticket: Ticket,
        page: Result<Vec<Initiative>, ApiError>,
        statistics: Option<Result<Statistics, ApiError>>,
    ) -> Settled {
        self.with_state(|state| {
            if !state.mounted {
                debug!("pager torn down, dropping late response");
                return Settled::Ignored;
            }
            if ticket.generation != state.generation {
                debug!(
                    stale = ticket.generation,
                    current = state.generation,
                    "filters changed mid-request, reissuing"
                );
                state.phase = Phase::Loading;
                return Settled::Restart(self.ticket(state, true));
            }

            match statistics {
                Some(Ok(stats)) => state.statistics = Some(stats),
                Some(Err(e)) => warn!(error = %e, "failed to load admin statistics"),
                None => {}
            }

            let records = match page {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "failed to load initiatives");
                    state.phase = Phase::Error;
                    state.error = Some(e.to_string());
                    return Settled::Failed(e);
                }
            };

            let received = records.len();
            if ticket.reset {
                state.accumulator = records;
            } else {
                state.accumulator.extend(records);
            }
            state.offset = state.accumulator.len();
            state.has_more = !ticket.full_fetch && received == self.options.page_size;
            state.phase = Phase::Loaded;
            state.error = None;
            state.page_loads += 1;
            info!(
                received,
                total = state.accumulator.len(),
                has_more = state.has_more,
                "initiatives loaded"
            );
            Settled::Applied(FetchOutcome::Applied {
                received,
                has_more: state.has_more,
            })
        })
    }

    /// Replaces the filters and clears the accumulator. The caller issues the
    /// reset fetch; if one is already in flight it picks the new filters up.
    pub fn set_filters(&self, filters: Filters) {
        self.with_state(|state| {
            state.filters = filters;
            state.accumulator.clear();
            state.offset = 0;
            state.has_more = true;
            state.error = None;
            state.generation += 1;
            state.phase = Phase::Loading;
        });
    }

    /// Starts a fresh session with the current filters.
    pub fn invalidate(&self) {
        let filters = self.filters();
        self.set_filters(filters);
    }

    pub fn teardown(&self) {
        self.with_state(|state| state.mounted = false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::stub::{page, StubApi};

    fn pager(api: Arc<StubApi>, filters: Filters) -> Pager<StubApi> {
        Pager::with_filters(
            api,
            Arc::new(Session::in_memory()),
            PagerOptions::default(),
            filters,
        )
    }

    #[tokio::test]
    async fn pages_accumulate_until_a_short_page() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=20)));
        api.push_page(Ok(page(21..=40)));
        api.push_page(Ok(page(41..=45)));
        let pager = pager(api.clone(), Filters::default());

        assert_eq!(
            pager.fetch_page(true).await.unwrap(),
            FetchOutcome::Applied {
                received: 20,
                has_more: true
            }
        );
        pager.fetch_page(false).await.unwrap();
        let outcome = pager.fetch_page(false).await.unwrap();
        assert_eq!(
            outcome,
            FetchOutcome::Applied {
                received: 5,
                has_more: false
            }
        );

        let snapshot = pager.snapshot();
        assert_eq!(snapshot.len, 45);
        assert_eq!(snapshot.offset, 45);
        assert_eq!(snapshot.phase, Phase::Loaded);
        let offsets: Vec<_> = api.list_requests().iter().map(|q| q.offset).collect();
        assert_eq!(offsets, vec![Some(0), Some(20), Some(40)]);
        pager.with_records(|records| {
            let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
            assert_eq!(ids, (1..=45).collect::<Vec<_>>());
        });
    }

    #[tokio::test]
    async fn full_fetch_status_requests_everything_once() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=57)));
        let pager = pager(api.clone(), Filters::pending());

        pager.fetch_page(true).await.unwrap();
        let requests = api.list_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].limit, None);
        assert_eq!(requests[0].offset, None);
        assert_eq!(requests[0].status, Some(Status::Pending));
        assert!(!pager.snapshot().has_more);
        assert_eq!(pager.snapshot().len, 57);
    }

    #[tokio::test]
    async fn concurrent_fetches_issue_one_request() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=20)));
        api.push_page(Ok(page(21..=40)));
        let pager = pager(api.clone(), Filters::default());

        let (a, b) = tokio::join!(pager.fetch_page(true), pager.fetch_page(false));
        assert!(matches!(a.unwrap(), FetchOutcome::Applied { .. }));
        assert_eq!(b.unwrap(), FetchOutcome::Skipped);
        assert_eq!(api.list_requests().len(), 1);
        assert_eq!(api.max_outstanding(), 1);
        assert!(!pager.snapshot().in_flight);
    }

    #[tokio::test]
    async fn failure_moves_to_error_and_blocks_more() {
        let api = Arc::new(StubApi::default());
        api.push_page(Err(ApiError::Status {
            endpoint: "/pobude".to_string(),
            status: 500,
            body: "boom".to_string(),
        }));
        let pager = pager(api.clone(), Filters::default());

        assert!(pager.fetch_page(true).await.is_err());
        let snapshot = pager.snapshot();
        assert_eq!(snapshot.phase, Phase::Error);
        assert!(snapshot.error.unwrap().contains("500"));
        assert!(!snapshot.in_flight);

        assert_eq!(pager.fetch_page(false).await.unwrap(), FetchOutcome::Skipped);
        assert_eq!(api.list_requests().len(), 1);
    }

    #[tokio::test]
    async fn teardown_ignores_late_response() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=20)));
        let gate = api.hold_next_list();
        let pager = pager(api.clone(), Filters::default());

        let (outcome, ()) = tokio::join!(pager.fetch_page(true), async {
            pager.teardown();
            gate.notify_one();
        });
        assert_eq!(outcome.unwrap(), FetchOutcome::Ignored);
        assert_eq!(pager.snapshot().len, 0);
        assert_eq!(pager.fetch_page(true).await.unwrap(), FetchOutcome::Ignored);
        assert_eq!(api.list_requests().len(), 1);
    }

    #[tokio::test]
    async fn statistics_failure_does_not_fail_the_page() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=3)));
        let session = Arc::new(Session::new(
            crate::session::MemoryTokenStore::with_token("t"),
        ));
        let pager = Pager::new(api.clone(), session, PagerOptions::default());

        let outcome = pager.fetch_page(true).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Applied { received: 3, .. }));
        assert_eq!(pager.snapshot().statistics, None);
        assert_eq!(api.statistics_requests(), 1);
    }

    fn statistics() -> Statistics {
        Statistics {
            total_pobude: 12,
            pending_pobude: 7,
            responded_pobude: 5,
            daily_stats: vec![crate::api::models::DailyCount {
                date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
                count: 3,
            }],
            response_stats: Vec::new(),
        }
    }

    fn admin_pager(api: Arc<StubApi>, filters: Filters) -> Pager<StubApi> {
        let session = Arc::new(Session::new(
            crate::session::MemoryTokenStore::with_token("t"),
        ));
        Pager::with_filters(api, session, PagerOptions::default(), filters)
    }

    #[tokio::test]
    async fn full_fetch_session_never_pages_further() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=7)));
        api.push_page(Ok(page(1..=7)));
        let pager = pager(api.clone(), Filters::pending());

        pager.fetch_page(true).await.unwrap();
        assert_eq!(pager.fetch_page(false).await.unwrap(), FetchOutcome::Skipped);
        assert_eq!(api.list_requests().len(), 1);
        pager.with_records(|records| {
            let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
            assert_eq!(ids, (1..=7).collect::<Vec<_>>());
        });
    }

    #[tokio::test]
    async fn short_page_ends_the_listing() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(page(1..=5)));
        api.push_page(Ok(page(6..=10)));
        let pager = pager(api.clone(), Filters::default());

        pager.fetch_page(true).await.unwrap();
        assert_eq!(pager.fetch_page(false).await.unwrap(), FetchOutcome::Skipped);
        assert_eq!(api.list_requests().len(), 1);
        assert_eq!(pager.snapshot().len, 5);
    }

    #[tokio::test]
    async fn category_is_sent_in_backend_spelling() {
        let api = Arc::new(StubApi::default());
        api.push_page(Ok(Vec::new()));
        let filters = Filters {
            category: Some("Oglaševanje".to_string()),
            ..Filters::default()
        };
        let pager = pager(api.clone(), filters);

        pager.fetch_page(true).await.unwrap();
        assert_eq!(
            api.list_requests()[0].category.as_deref(),
            Some("Oglaševanje ")
        );
    }

    #[tokio::test]
    async fn statistics_are_stored_with_the_page() {
        let api = Arc::new(StubApi::default());
        api.set_statistics(statistics());
        api.push_page(Ok(page(1..=3)));
        let pager = admin_pager(api.clone(), Filters::default());

        pager.fetch_page(true).await.unwrap();
        assert_eq!(pager.snapshot().statistics, Some(statistics()));
        assert_eq!(api.statistics_requests(), 1);
    }

    #[tokio::test]
    async fn statistics_survive_a_stale_restart() {
        let api = Arc::new(StubApi::default());
        api.set_statistics(statistics());
        api.push_page(Ok(page(1..=20)));
        api.push_page(Ok(page(21..=22)));
        let gate = api.hold_next_list();
        let pager = admin_pager(api.clone(), Filters::default());

        let (outcome, ()) = tokio::join!(pager.fetch_page(true), async {
            pager.set_filters(Filters {
                category: Some("Ceste".to_string()),
                ..Filters::default()
            });
            gate.notify_one();
        });

        assert_eq!(
            outcome.unwrap(),
            FetchOutcome::Applied {
                received: 2,
                has_more: false
            }
        );
        let snapshot = pager.snapshot();
        assert_eq!(snapshot.statistics, Some(statistics()));
        assert_eq!(snapshot.len, 2);
        assert_eq!(api.statistics_requests(), 2);
        assert_eq!(api.list_requests()[1].category.as_deref(), Some("Ceste"));
    }
}
