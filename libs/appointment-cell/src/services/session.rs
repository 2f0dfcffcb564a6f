// libs/appointment-cell/src/services/session.rs
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::AppointmentError;
use crate::services::flow::{AppointmentFlow, FlowSettings, FlowSnapshot, FlowView};
use crate::services::gateway::AppointmentGateway;
use crate::services::lifecycle::FlowState;

pub type SharedFlow = Arc<Mutex<AppointmentFlow>>;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct FlowEntry {
    flow: SharedFlow,
    touched: Instant,
}

type FlowMap = RwLock<HashMap<Uuid, FlowEntry>>;

/// Live flows keyed by id. A flow runs one operation at a time; a second
/// request against a busy flow is refused instead of queued.
///
/// Browsers never say when they leave, so flows expire: any flow untouched
/// for `idle_timeout`, or for `confirmed_grace` once confirmed, is swept on
/// the next creation or sweeper tick.
pub struct FlowRegistry {
    flows: Arc<FlowMap>,
    gateway: Arc<dyn AppointmentGateway>,
    settings: FlowSettings,
}

impl FlowRegistry {
    pub fn new(gateway: Arc<dyn AppointmentGateway>, settings: FlowSettings) -> Self {
        Self {
            flows: Arc::new(RwLock::new(HashMap::new())),
            gateway,
            settings,
        }
    }

    pub async fn create(&self) -> FlowView {
        let flow = AppointmentFlow::new(self.gateway.clone(), self.settings.clone());
        self.insert(flow).await
    }

    pub async fn resume(&self, snapshot: FlowSnapshot) -> Result<FlowView, AppointmentError> {
        let flow = AppointmentFlow::resume(self.gateway.clone(), self.settings.clone(), snapshot)?;
        Ok(self.insert(flow).await)
    }

    async fn insert(&self, flow: AppointmentFlow) -> FlowView {
        sweep_expired(&self.flows, &self.settings).await;

        let view = flow.view();
        let mut flows = self.flows.write().await;
        flows.insert(
            view.flow_id,
            FlowEntry {
                flow: Arc::new(Mutex::new(flow)),
                touched: Instant::now(),
            },
        );
        info!("Registered flow {} ({} active)", view.flow_id, flows.len());
        view
    }

    /// Look a flow up and mark it as in use.
    pub async fn get(&self, flow_id: Uuid) -> Result<SharedFlow, AppointmentError> {
        let mut flows = self.flows.write().await;
        let entry = flows
            .get_mut(&flow_id)
            .ok_or(AppointmentError::FlowNotFound(flow_id))?;
        entry.touched = Instant::now();
        Ok(entry.flow.clone())
    }

    /// Exclusive access for a state-changing operation.
    pub async fn acquire(&self, flow_id: Uuid) -> Result<OwnedMutexGuard<AppointmentFlow>, AppointmentError> {
        let flow = self.get(flow_id).await?;
        flow.try_lock_owned().map_err(|_| {
            debug!("Flow {} is busy", flow_id);
            AppointmentError::OperationInFlight
        })
    }

    /// Current view, waiting for any running operation to settle first.
    pub async fn view(&self, flow_id: Uuid) -> Result<FlowView, AppointmentError> {
        let flow = self.get(flow_id).await?;
        let guard = flow.lock().await;
        Ok(guard.view())
    }

    pub async fn remove(&self, flow_id: Uuid) -> Result<(), AppointmentError> {
        let mut flows = self.flows.write().await;
        flows
            .remove(&flow_id)
            .map(|_| info!("Discarded flow {}", flow_id))
            .ok_or(AppointmentError::FlowNotFound(flow_id))
    }

    /// Evict expired flows now. Returns how many went.
    pub async fn prune_expired(&self) -> usize {
        sweep_expired(&self.flows, &self.settings).await
    }

    /// Periodic sweep on a background task. The task ends once the registry
    /// is dropped.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let flows: Weak<FlowMap> = Arc::downgrade(&self.flows);
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let mut sweep_interval = interval(SWEEP_INTERVAL);
            loop {
                sweep_interval.tick().await;
                let Some(flows) = flows.upgrade() else {
                    debug!("Flow sweeper stopping, registry dropped");
                    break;
                };
                sweep_expired(&flows, &settings).await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn sweep_expired(flows: &FlowMap, settings: &FlowSettings) -> usize {
    let now = Instant::now();
    let mut flows = flows.write().await;
    let before = flows.len();

    flows.retain(|flow_id, entry| {
        // Busy flows are in use by definition.
        let Ok(flow) = entry.flow.try_lock() else {
            return true;
        };
        let window = if flow.state() == FlowState::MutationConfirmed {
            settings.confirmed_grace
        } else {
            settings.idle_timeout
        };
        let expired = now.saturating_duration_since(entry.touched) >= window;
        if expired {
            debug!("Evicting flow {} in {} after {:?} untouched", flow_id, flow.state(), window);
        }
        !expired
    });

    let evicted = before - flows.len();
    if evicted > 0 {
        info!("Evicted {} expired flow(s) ({} active)", evicted, flows.len());
    }
    evicted
}
