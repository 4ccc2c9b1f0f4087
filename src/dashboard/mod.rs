pub mod importance;
pub mod pager;
pub mod projection;
pub mod scroll;

use std::sync::{Arc, Mutex};

use rand::Rng;
use tracing::{info, warn};

use crate::api::{ApiError, Initiative, PortalApi, PrioritizeItem, Statistics};
use crate::session::Session;

pub use importance::ImportanceMap;
pub use pager::{FetchOutcome, Filters, Pager, PagerOptions, PagerSnapshot, Phase};
pub use projection::{project, Projection, SortOrder, StatusFilter};
pub use scroll::{
    Binding, FetchKey, ScrollTrigger, SentinelHub, Subscription, TriggerInput, ViewportEvent,
    VisibilityObserver,
};

#[derive(Clone, Debug)]
pub struct DashboardOptions {
    pub pager: PagerOptions,
    pub auto_fill_limit: u32,
}

impl Default for DashboardOptions {
    fn default() -> Self {
        Self {
            pager: PagerOptions::default(),
            auto_fill_limit: scroll::DEFAULT_AUTO_FILL_LIMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseDraft {
    pub initiative_id: u64,
    pub text: String,
}

/// Everything a renderer needs, copied out of the dashboard.
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardView {
    pub records: Vec<Initiative>,
    pub no_results: bool,
    pub has_more: bool,
    pub in_flight: bool,
    pub phase: Phase,
    pub error: Option<String>,
    pub filters: Filters,
    pub sort_order: SortOrder,
    pub statistics: Option<Statistics>,
    pub importance: ImportanceMap,
    pub loaded: usize,
}

#[derive(Debug, Default)]
struct ViewState {
    importance: ImportanceMap,
    /// Page load count the importance map was computed against.
    importance_loads: u64,
    sort_order: SortOrder,
    trigger: ScrollTrigger,
    draft: Option<ResponseDraft>,
}

/// Admin view over the initiative listing: paginated accumulation, client
/// projection, priority annotations and the respond flow.
pub struct Dashboard<A: PortalApi + ?Sized> {
    api: Arc<A>,
    session: Arc<Session>,
    pager: Pager<A>,
    view: Mutex<ViewState>,
}

impl<A: PortalApi + ?Sized> Dashboard<A> {
    pub fn new(
        api: Arc<A>,
        session: Arc<Session>,
        options: DashboardOptions,
        filters: Filters,
    ) -> Self {
        let pager = Pager::with_filters(api.clone(), session.clone(), options.pager, filters);
        let view = ViewState {
            trigger: ScrollTrigger::new(options.auto_fill_limit),
            ..ViewState::default()
        };
        Self {
            api,
            session,
            pager,
            view: Mutex::new(view),
        }
    }

    fn with_view<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        let mut guard = match self.view.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn pager(&self) -> &Pager<A> {
        &self.pager
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn mount(&self) -> Result<FetchOutcome, ApiError> {
        self.pager.fetch_page(true).await
    }

    /// Starts a new filter session and requests its first page.
    pub async fn apply_filters(&self, filters: Filters) -> Result<FetchOutcome, ApiError> {
        self.pager.set_filters(filters);
        self.with_view(|v| {
            v.trigger.reset();
            v.importance.clear();
        });
        self.pager.fetch_page(true).await
    }

    pub async fn set_status_filter(&self, status: StatusFilter) -> Result<FetchOutcome, ApiError> {
        let filters = Filters {
            status,
            ..self.pager.filters()
        };
        self.apply_filters(filters).await
    }

    pub async fn set_category(&self, category: Option<String>) -> Result<FetchOutcome, ApiError> {
        let filters = Filters {
            category,
            ..self.pager.filters()
        };
        self.apply_filters(filters).await
    }

    pub async fn set_search(&self, search: Option<String>) -> Result<FetchOutcome, ApiError> {
        let filters = Filters {
            search,
            ..self.pager.filters()
        };
        self.apply_filters(filters).await
    }

    pub async fn load_more(&self) -> Result<FetchOutcome, ApiError> {
        self.pager.fetch_page(false).await
    }

    pub fn set_sort_order(&self, order: SortOrder) {
        self.with_view(|v| v.sort_order = order);
    }

    pub fn fetch_key(&self) -> FetchKey {
        let snapshot = self.pager.snapshot();
        FetchKey {
            generation: snapshot.generation,
            filters: snapshot.filters,
        }
    }

    /// Scores computed before the latest applied page are dropped here.
    fn current_importance(&self, page_loads: u64) -> (ImportanceMap, SortOrder) {
        self.with_view(|v| {
            if v.importance_loads != page_loads && !v.importance.is_empty() {
                v.importance.clear();
            }
            (v.importance.clone(), v.sort_order)
        })
    }

    pub fn view(&self) -> DashboardView {
        let snapshot = self.pager.snapshot();
        let (importance, sort_order) = self.current_importance(snapshot.page_loads);
        let (records, no_results) = self.pager.with_records(|accumulator| {
            let projection = project(
                accumulator,
                snapshot.filters.status,
                snapshot.filters.category.as_deref(),
                &importance,
                sort_order,
            );
            let no_results = projection.no_results;
            (projection.into_owned(), no_results)
        });
        DashboardView {
            records,
            no_results,
            has_more: snapshot.has_more,
            in_flight: snapshot.in_flight,
            phase: snapshot.phase,
            error: snapshot.error,
            filters: snapshot.filters,
            sort_order,
            statistics: snapshot.statistics,
            importance,
            loaded: snapshot.len,
        }
    }

    /// The last page failure, if the list is in the error phase.
    pub fn error_message(&self) -> Option<String> {
        self.pager.snapshot().error
    }

    fn trigger_input(&self) -> TriggerInput {
        let snapshot = self.pager.snapshot();
        let no_results = self.pager.with_records(|accumulator| {
            project(
                accumulator,
                snapshot.filters.status,
                snapshot.filters.category.as_deref(),
                &ImportanceMap::new(),
                SortOrder::default(),
            )
            .no_results
        });
        TriggerInput {
            has_more: snapshot.has_more,
            in_flight: snapshot.in_flight,
            // An empty projection before anything loaded is not "no results".
            no_results: no_results && snapshot.phase == Phase::Loaded,
            errored: snapshot.phase == Phase::Error,
        }
    }

    /// Reacts to one viewport event, requesting the next page when the
    /// trigger conditions hold.
    pub async fn handle_event(
        &self,
        event: ViewportEvent,
    ) -> Result<Option<FetchOutcome>, ApiError> {
        let input = self.trigger_input();
        if !self.with_view(|v| v.trigger.decide(event, input)) {
            return Ok(None);
        }
        self.pager.fetch_page(false).await.map(Some)
    }

    /// Consumes viewport events until the observer closes or the dashboard is
    /// torn down. The subscription is replaced whenever the fetch key changes.
    pub async fn run<O, F>(&self, observer: &O, mut on_event: F)
    where
        O: VisibilityObserver + ?Sized,
        F: FnMut(ViewportEvent, Option<FetchOutcome>),
    {
        let mut binding = Binding::new();
        while self.pager.is_mounted() {
            let key = self.fetch_key();
            let Some(event) = binding.bind(observer, key).next().await else {
                break;
            };
            match self.handle_event(event).await {
                Ok(outcome) => on_event(event, outcome),
                Err(e) => {
                    warn!(error = %e, "page request failed");
                    on_event(event, None);
                }
            }
        }
        binding.release();
    }

    pub fn prioritize_random<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let page_loads = self.pager.snapshot().page_loads;
        let map = self
            .pager
            .with_records(|records| ImportanceMap::randomize(records, rng));
        let scored = map.len();
        self.with_view(|v| {
            v.importance = map;
            v.importance_loads = page_loads;
        });
        scored
    }

    /// Asks the backend to score the loaded initiatives.
    pub async fn prioritize_remote(&self) -> Result<usize, ApiError> {
        let page_loads = self.pager.snapshot().page_loads;
        let items: Vec<PrioritizeItem> = self
            .pager
            .with_records(|records| records.iter().map(PrioritizeItem::from).collect());
        if items.is_empty() {
            return Ok(0);
        }
        let api = self.api.clone();
        let prioritized = self
            .session
            .authorized(|credential| async move {
                api.ai_prioritize(&credential, &items).await
            })
            .await?;
        let map = ImportanceMap::from_prioritized(&prioritized);
        let scored = map.len();
        self.with_view(|v| {
            v.importance = map;
            v.importance_loads = page_loads;
        });
        info!(scored, "applied remote priorities");
        Ok(scored)
    }

    pub fn start_response(&self, initiative_id: u64) {
        self.with_view(|v| {
            v.draft = Some(ResponseDraft {
                initiative_id,
                text: String::new(),
            })
        });
    }

    pub fn edit_response(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_view(|v| {
            if let Some(draft) = v.draft.as_mut() {
                draft.text = text;
            }
        });
    }

    pub fn draft(&self) -> Option<ResponseDraft> {
        self.with_view(|v| v.draft.clone())
    }

    pub fn cancel_response(&self) {
        self.with_view(|v| v.draft = None);
    }

    /// Sends the current draft. On success the listing is reloaded; an auth
    /// failure discards the draft, other failures keep it for a retry.
    pub async fn submit_response(&self) -> Result<(), ApiError> {
        let draft = self
            .draft()
            .ok_or(ApiError::EmptyField { field: "response" })?;
        let text = draft.text.trim().to_string();
        if text.is_empty() {
            return Err(ApiError::EmptyField { field: "response" });
        }

        let api = self.api.clone();
        let id = draft.initiative_id;
        let result = self
            .session
            .authorized(|credential| async move { api.respond(&credential, id, &text).await })
            .await;

        match result {
            Ok(()) => {
                self.cancel_response();
                info!(id, "response submitted");
                self.pager.invalidate();
                self.with_view(|v| v.trigger.reset());
                if let Err(e) = self.pager.fetch_page(true).await {
                    warn!(error = %e, "failed to reload initiatives after responding");
                }
                Ok(())
            }
            Err(e) => {
                if e.is_auth_failure() {
                    self.cancel_response();
                }
                Err(e)
            }
        }
    }

    pub async fn respond(&self, initiative_id: u64, text: &str) -> Result<(), ApiError> {
        self.start_response(initiative_id);
        self.edit_response(text);
        self.submit_response().await
    }

    /// Stops accepting responses and drops view state.
    pub fn teardown(&self) {
        self.pager.teardown();
        self.with_view(|v| {
            v.draft = None;
            v.importance.clear();
        });
    }
}
