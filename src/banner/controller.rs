use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::join;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::{ClosureRegistrationRequest, InsightApi, PreferenceRequest};
use crate::campaign::rotation::{self, RotationDefaults, RotationParams};
use crate::closure::policy::{
    self, ClosureDecision, PromptChoice, PromptLevel, GENERIC_CONFIRMATION,
};
use crate::closure::{ClosureAction, ClosureStore};
use crate::error::Error;
use crate::identity::IdentityTriple;
use crate::storage::{SessionStorage, StorageProvider};

use super::{BannerEvent, BannerEventKind, BannerView};

pub const GLOBAL_OPT_OUT_KEY: &str = "insight_global_opt_out";

const EVENT_CAPACITY: usize = 64;

/// How long a dismissal flow nobody touches is kept, e.g. a prompt left
/// open in a tab that was closed.
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
struct FlowKey {
    scope: String,
    triple: IdentityTriple,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum FlowPhase {
    Registering,
    Prompt(PromptLevel),
    Submitting(PromptLevel),
    Complete,
}

/// One dismissal of one banner, from the close click until the user's
/// choice has been recorded.
#[derive(Clone, Debug)]
struct DismissalFlow {
    generation: u64,
    closure_count: u32,
    phase: FlowPhase,
    confirmation: Option<String>,
    touched: Instant,
}

impl DismissalFlow {
    fn prompt(&self) -> Option<PromptLevel> {
        match self.phase {
            FlowPhase::Prompt(level) | FlowPhase::Submitting(level) => Some(level),
            FlowPhase::Registering | FlowPhase::Complete => None,
        }
    }

    fn processing(&self) -> bool {
        matches!(
            self.phase,
            FlowPhase::Registering | FlowPhase::Submitting(_)
        )
    }

    fn view(&self) -> BannerView {
        BannerView {
            visible: false,
            hidden: true,
            campaign: None,
            prompt: self.prompt(),
            processing: self.processing(),
            confirmation: self.confirmation.clone(),
        }
    }
}

fn hidden_view(confirmation: Option<&str>) -> BannerView {
    BannerView {
        hidden: true,
        confirmation: confirmation.map(str::to_owned),
        ..BannerView::default()
    }
}

/// The single place that decides whether a banner renders, and that runs
/// dismissal flows to completion.
pub struct BannerController {
    storage: Arc<dyn StorageProvider>,
    defaults: RotationDefaults,
    flows: Mutex<HashMap<FlowKey, DismissalFlow>>,
    flow_ttl: Duration,
    generations: AtomicU64,
    events: broadcast::Sender<BannerEvent>,
}

impl BannerController {
    pub fn new(storage: Arc<dyn StorageProvider>, defaults: RotationDefaults) -> BannerController {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        BannerController {
            storage,
            defaults,
            flows: Mutex::new(HashMap::new()),
            flow_ttl: DEFAULT_FLOW_TTL,
            generations: AtomicU64::new(0),
            events,
        }
    }

    pub fn with_flow_ttl(mut self, flow_ttl: Duration) -> BannerController {
        self.flow_ttl = flow_ttl;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BannerEvent> {
        self.events.subscribe()
    }

    fn flows(&self) -> MutexGuard<'_, HashMap<FlowKey, DismissalFlow>> {
        self.flows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, key: &FlowKey, kind: BannerEventKind) {
        // nobody listening is fine
        let _ = self.events.send(BannerEvent {
            scope: key.scope.clone(),
            triple: key.triple.clone(),
            kind,
        });
    }

    /// Applies `update` to the flow, unless it was unmounted or replaced
    /// since `generation` was handed out.
    fn update<F>(&self, key: &FlowKey, generation: u64, update: F) -> Option<BannerView>
    where
        F: FnOnce(&mut DismissalFlow),
    {
        let mut flows = self.flows();
        let flow = flows
            .get_mut(key)
            .filter(|flow| flow.generation == generation)?;
        update(flow);
        flow.touched = Instant::now();

        Some(flow.view())
    }

    /// The flow's current state. A completed flow is handed out this one
    /// last time and then forgotten.
    fn observe(&self, key: &FlowKey) -> Option<DismissalFlow> {
        let mut flows = self.flows();
        let complete = flows
            .get(key)
            .map(|flow| flow.phase == FlowPhase::Complete);

        match complete {
            Some(true) => flows.remove(key),
            Some(false) => flows.get(key).cloned(),
            None => None,
        }
    }

    #[tracing::instrument(skip(self, api))]
    pub async fn view(
        &self,
        api: &dyn InsightApi,
        scope: &str,
        params: &RotationParams,
    ) -> BannerView {
        let storage = self.storage.open(scope);
        let user_id = params.user_id(&self.defaults);
        let company_id = params.company_id(&self.defaults);
        let (rotation, opted_out) = join!(
            rotation::rotate(api, &storage, &self.defaults, params),
            self.global_opt_out(api, &storage, user_id)
        );
        let candidate = match &rotation.candidate {
            Some(candidate) => candidate,
            None => return BannerView::default(),
        };

        let flow = match IdentityTriple::new(&*candidate.campaign_id, user_id, company_id) {
            Some(triple) => {
                let key = FlowKey {
                    scope: scope.to_owned(),
                    triple,
                };
                self.observe(&key)
            }
            None => None,
        };

        let hidden = rotation.closed || opted_out || flow.is_some();
        BannerView {
            visible: !hidden,
            hidden,
            campaign: rotation.display().cloned(),
            prompt: flow.as_ref().and_then(DismissalFlow::prompt),
            processing: flow.as_ref().map_or(false, DismissalFlow::processing),
            confirmation: flow.and_then(|flow| flow.confirmation),
        }
    }

    /// Whether the user opted out of all campaigns. Asked once per session
    /// and user; a failed check counts as "no" and is asked again later.
    async fn global_opt_out(
        &self,
        api: &dyn InsightApi,
        storage: &Arc<dyn SessionStorage>,
        user_id: &str,
    ) -> bool {
        let key = format!("{}:{}", GLOBAL_OPT_OUT_KEY, user_id);
        match storage.get_item(&key).await {
            Ok(Some(value)) => return value == "true",
            Ok(None) => {}
            Err(err) => warn!("failed to read cached opt-out flag: {}", err),
        }

        match api.global_opt_out(user_id).await {
            Ok(response) if response.success => {
                let opted_out = response.data.unwrap_or(false);
                remember_opt_out(storage, user_id, opted_out).await;
                opted_out
            }
            Ok(response) => {
                warn!("opt-out check was rejected: {:?}", response.message);
                false
            }
            Err(err) => {
                warn!("opt-out check failed: {}", err);
                false
            }
        }
    }

    /// Handles a click on the banner's close button.
    #[tracing::instrument(skip(self, api))]
    pub async fn dismiss(
        &self,
        api: &dyn InsightApi,
        scope: &str,
        triple: Option<IdentityTriple>,
    ) -> BannerView {
        let triple = match triple {
            Some(triple) => triple,
            None => {
                warn!("dismissal without a complete identity, hiding locally");
                return hidden_view(Some(GENERIC_CONFIRMATION));
            }
        };

        let key = FlowKey {
            scope: scope.to_owned(),
            triple,
        };
        let generation = {
            let now = Instant::now();
            let flow_ttl = self.flow_ttl;
            let mut flows = self.flows();
            flows.retain(|_, flow| now.duration_since(flow.touched) < flow_ttl);

            if let Some(flow) = flows.get(&key) {
                debug!("ignoring dismissal, a flow is already open");
                return flow.view();
            }

            let generation = self.generations.fetch_add(1, Ordering::Relaxed);
            flows.insert(
                key.clone(),
                DismissalFlow {
                    generation,
                    closure_count: 1,
                    phase: FlowPhase::Registering,
                    confirmation: None,
                    touched: now,
                },
            );
            generation
        };
        self.publish(&key, BannerEventKind::Hidden);

        let request = ClosureRegistrationRequest {
            user_id: key.triple.user_id().to_owned(),
            company_id: key.triple.company_id().to_owned(),
            campaign_id: key.triple.campaign_id().to_owned(),
            closure_date: Utc::now(),
        };
        let registration = match api.register_closure(&request).await {
            Ok(response) => {
                if !response.success {
                    warn!("closure registration was rejected: {:?}", response.message);
                }
                response.into_data()
            }
            Err(err) => {
                warn!("closure registration failed: {}", err);
                None
            }
        };

        let closure_count = registration
            .as_ref()
            .map_or(1, |registration| registration.closure_count.max(1));

        match policy::decide(registration.as_ref()) {
            ClosureDecision::HideFirstClosure => {
                let view = self.update(&key, generation, |flow| {
                    flow.closure_count = closure_count;
                    flow.phase = FlowPhase::Complete;
                });
                let view = match view {
                    Some(view) => view,
                    None => {
                        debug!("discarding closure registration for an unmounted banner");
                        return hidden_view(None);
                    }
                };

                let closures = ClosureStore::new(self.storage.open(scope));
                closures
                    .record_closure(&key.triple, closure_count, ClosureAction::FirstClosureHide)
                    .await;
                self.publish(
                    &key,
                    BannerEventKind::ClosureRecorded {
                        action: ClosureAction::FirstClosureHide,
                    },
                );

                view
            }
            ClosureDecision::Prompt(level) => {
                let view = self.update(&key, generation, |flow| {
                    flow.closure_count = closure_count;
                    flow.phase = FlowPhase::Prompt(level);
                });
                match view {
                    Some(view) => {
                        self.publish(&key, BannerEventKind::PromptOpened { prompt: level });
                        view
                    }
                    None => {
                        debug!("discarding closure registration for an unmounted banner");
                        hidden_view(None)
                    }
                }
            }
        }
    }

    /// Commits the user's answer to an open dismissal prompt.
    ///
    /// The local outcome is recorded even if the insight service cannot be
    /// told about it; only the confirmation text differs.
    #[tracing::instrument(skip(self, api))]
    pub async fn choose(
        &self,
        api: &dyn InsightApi,
        scope: &str,
        triple: Option<IdentityTriple>,
        choice: PromptChoice,
    ) -> Result<BannerView, Error> {
        let triple = match triple {
            Some(triple) => triple,
            None => {
                warn!("prompt choice without a complete identity, hiding locally");
                return Ok(hidden_view(Some(GENERIC_CONFIRMATION)));
            }
        };

        let key = FlowKey {
            scope: scope.to_owned(),
            triple,
        };
        let (generation, closure_count, outcome) = {
            let mut flows = self.flows();
            let no_prompt = || Error::NoPromptOpen {
                campaign_id: key.triple.campaign_id().to_owned(),
            };
            let flow = flows.get_mut(&key).ok_or_else(no_prompt)?;
            let level = match flow.phase {
                FlowPhase::Prompt(level) => level,
                FlowPhase::Registering | FlowPhase::Submitting(_) => {
                    debug!("ignoring choice, the flow is busy");
                    return Ok(flow.view());
                }
                FlowPhase::Complete => return Err(no_prompt()),
            };

            let outcome = policy::resolve_choice(key.triple.campaign_id(), level, &choice)?;
            flow.phase = FlowPhase::Submitting(level);
            flow.touched = Instant::now();
            (flow.generation, flow.closure_count, outcome)
        };

        let request = PreferenceRequest {
            user_id: key.triple.user_id().to_owned(),
            company_id: key.triple.company_id().to_owned(),
            campaign_id: key.triple.campaign_id().to_owned(),
            wants_to_see: outcome.wants_to_see,
            reason: outcome.reason.clone(),
            is_global_response: outcome.is_global_response,
            preference_date: Utc::now(),
        };
        let confirmed = match api.register_preference(&request).await {
            Ok(response) if response.success => true,
            Ok(response) => {
                warn!("preference registration was rejected: {:?}", response.message);
                false
            }
            Err(err) => {
                warn!("preference registration failed: {}", err);
                false
            }
        };

        let storage = self.storage.open(scope);
        ClosureStore::new(Arc::clone(&storage))
            .record_closure(&key.triple, closure_count, outcome.action)
            .await;
        if outcome.action == ClosureAction::GlobalOptOut {
            remember_opt_out(&storage, key.triple.user_id(), true).await;
        }

        let confirmation = if confirmed {
            outcome.confirmation
        } else {
            GENERIC_CONFIRMATION
        };
        let view = self.update(&key, generation, |flow| {
            flow.phase = FlowPhase::Complete;
            flow.confirmation = Some(confirmation.to_owned());
        });

        self.publish(
            &key,
            BannerEventKind::ClosureRecorded {
                action: outcome.action,
            },
        );
        self.publish(&key, BannerEventKind::Hidden);
        self.publish(
            &key,
            BannerEventKind::Confirmation {
                message: confirmation.to_owned(),
            },
        );

        Ok(view.unwrap_or_else(|| hidden_view(Some(confirmation))))
    }

    /// Forgets the flow of a banner that is no longer on screen. A remote
    /// answer still in flight for it is dropped when it arrives.
    #[tracing::instrument(skip(self))]
    pub fn unmount(&self, scope: &str, triple: IdentityTriple) {
        let key = FlowKey {
            scope: scope.to_owned(),
            triple,
        };
        self.flows().remove(&key);
    }

    /// Drops everything known about a session: stored closures, the cached
    /// rotation, flags and open flows.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self, scope: &str) -> Result<(), Error> {
        self.flows().retain(|key, _| key.scope != scope);
        self.storage.open(scope).clear().await?;

        Ok(())
    }
}

async fn remember_opt_out(storage: &Arc<dyn SessionStorage>, user_id: &str, opted_out: bool) {
    let key = format!("{}:{}", GLOBAL_OPT_OUT_KEY, user_id);
    let value = if opted_out { "true" } else { "false" };

    if let Err(err) = storage.set_item(&key, value).await {
        warn!("failed to cache opt-out flag: {}", err);
    }
}
