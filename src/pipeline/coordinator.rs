//! Pipeline Coordinator - routes samples and requests to equipment workers
//!
//! The coordinator owns one worker task per monitor and a routing table from
//! sensor device IDs to equipment. It never touches monitor state itself:
//! everything goes through the worker queues, so all operations on one piece
//! of equipment are serialized.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::dispatcher::Dispatcher;
use super::worker::{Command, EquipmentStatus, Worker};
use crate::config::defaults::WORKER_QUEUE_CAPACITY;
use crate::config::ServiceConfig;
use crate::monitor::tank::{group_percent_full, PERCENT_FULL};
use crate::monitor::{EquipmentKind, Monitor};
use crate::types::{AlarmState, Sample, StateSnapshot};

/// Errors returned to callers of the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("unknown equipment '{0}'")]
    UnknownEquipment(String),
    #[error("no equipment consumes sensor '{0}'")]
    UnknownSensor(String),
    #[error("worker for '{0}' is no longer running")]
    WorkerGone(String),
}

struct WorkerHandle {
    kind: EquipmentKind,
    commands: mpsc::Sender<Command>,
}

pub struct Coordinator {
    workers: BTreeMap<String, WorkerHandle>,
    /// Sensor device ID -> equipment ID
    routes: HashMap<String, String>,
    /// Tank group name -> level sensor IDs
    tank_groups: BTreeMap<String, HashSet<String>>,
    /// Snapshots older than this are pruned after each snapshot tick
    state_retention: Option<chrono::Duration>,
    dispatcher: Arc<Dispatcher>,
    clock: Clock,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl Coordinator {
    /// Spawn one worker per monitor. Must be called inside a tokio runtime.
    ///
    /// `cancel` stops the workers and any pending deferred checks.
    pub fn start(
        monitors: Vec<Box<dyn Monitor>>,
        config: &ServiceConfig,
        dispatcher: Arc<Dispatcher>,
        clock: Clock,
        cancel: CancellationToken,
    ) -> Self {
        let mut workers = BTreeMap::new();
        let mut routes = HashMap::new();
        let mut tasks = JoinSet::new();

        for monitor in monitors {
            let id = monitor.id().to_string();
            for sensor in monitor.sensor_ids() {
                if let Some(previous) = routes.insert(sensor.clone(), id.clone()) {
                    warn!(sensor = %sensor, previous = %previous, now = %id, "Sensor routed to more than one equipment");
                }
            }

            let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
            workers.insert(
                id,
                WorkerHandle {
                    kind: monitor.kind(),
                    commands: tx.clone(),
                },
            );
            let worker = Worker::new(
                monitor,
                rx,
                tx.downgrade(),
                Arc::clone(&dispatcher),
                clock,
                cancel.clone(),
            );
            tasks.spawn(worker.run());
        }

        let mut tank_groups: BTreeMap<String, HashSet<String>> = BTreeMap::new();
        for tank in &config.tanks {
            if let Some(group) = &tank.group {
                tank_groups
                    .entry(group.clone())
                    .or_default()
                    .insert(tank.level_sensor.clone());
            }
        }

        let state_retention = config
            .service
            .state_retention()
            .and_then(|retention| chrono::Duration::from_std(retention).ok());

        info!(
            workers = workers.len(),
            sensors = routes.len(),
            tank_groups = tank_groups.len(),
            retention_days = config.service.state_retention_days,
            "Coordinator started"
        );

        Self {
            workers,
            routes,
            tank_groups,
            state_retention,
            dispatcher,
            clock,
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Equipment IDs with their kinds, sorted by ID.
    pub fn equipment(&self) -> Vec<(String, EquipmentKind)> {
        self.workers
            .iter()
            .map(|(id, handle)| (id.clone(), handle.kind))
            .collect()
    }

    fn handle(&self, equipment_id: &str) -> Result<&WorkerHandle, PipelineError> {
        self.workers
            .get(equipment_id)
            .ok_or_else(|| PipelineError::UnknownEquipment(equipment_id.to_string()))
    }

    async fn send(&self, equipment_id: &str, command: Command) -> Result<(), PipelineError> {
        self.handle(equipment_id)?
            .commands
            .send(command)
            .await
            .map_err(|_| PipelineError::WorkerGone(equipment_id.to_string()))
    }

    async fn request<T>(
        &self,
        equipment_id: &str,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(equipment_id, build(tx)).await?;
        rx.await
            .map_err(|_| PipelineError::WorkerGone(equipment_id.to_string()))
    }

    /// Hand a sample to the equipment that consumes its device.
    pub async fn route(&self, sample: Sample) -> Result<(), PipelineError> {
        let equipment_id = self
            .routes
            .get(&sample.device_id)
            .ok_or_else(|| PipelineError::UnknownSensor(sample.device_id.clone()))?;
        self.send(equipment_id, Command::Sample(sample)).await
    }

    /// Transitions-only evaluation of every monitor.
    pub async fn sweep(&self) {
        for id in self.workers.keys() {
            if let Err(e) = self.send(id, Command::Sweep).await {
                debug!("Sweep skipped: {}", e);
            }
        }
    }

    /// Current state of every dimension of one piece of equipment.
    ///
    /// Transitions found along the way are still dispatched.
    pub async fn status(&self, equipment_id: &str) -> Result<EquipmentStatus, PipelineError> {
        self.request(equipment_id, |reply| Command::Status { reply }).await
    }

    /// Status of every piece of equipment, sorted by ID.
    pub async fn status_all(&self) -> Vec<EquipmentStatus> {
        let mut out = Vec::with_capacity(self.workers.len());
        for id in self.workers.keys() {
            match self.status(id).await {
                Ok(status) => out.push(status),
                Err(e) => warn!("Status unavailable: {}", e),
            }
        }
        out
    }

    /// Enable or disable equipment. Returns true when the flag changed.
    pub async fn set_enabled(&self, equipment_id: &str, enabled: bool) -> Result<bool, PipelineError> {
        self.request(equipment_id, |reply| Command::SetEnabled { enabled, reply })
            .await
    }

    /// Collect and persist raw-value snapshots, including tank group levels,
    /// then prune snapshots past the retention window.
    pub async fn snapshot_all(&self) -> Vec<StateSnapshot> {
        let mut snapshots = Vec::new();
        for id in self.workers.keys() {
            match self.request(id, |reply| Command::Snapshot { reply }).await {
                Ok(mut s) => snapshots.append(&mut s),
                Err(e) => debug!("Snapshot skipped: {}", e),
            }
        }

        let group_snapshots = self.group_snapshots(&snapshots);
        snapshots.extend(group_snapshots);
        let now = self.clock.now();
        self.dispatcher.persist_snapshots(&snapshots, now);
        debug!(count = snapshots.len(), "Snapshots persisted");
        if let Some(retention) = self.state_retention {
            self.dispatcher.prune_snapshots(now - retention);
        }
        snapshots
    }

    fn group_snapshots(&self, snapshots: &[StateSnapshot]) -> Vec<StateSnapshot> {
        self.tank_groups
            .iter()
            .filter_map(|(group, sensors)| {
                let levels: Vec<f64> = snapshots
                    .iter()
                    .filter(|s| s.name == PERCENT_FULL && sensors.contains(&s.source))
                    .map(|s| s.value)
                    .collect();
                group_percent_full(&levels).map(|value| StateSnapshot {
                    source: group.clone(),
                    name: PERCENT_FULL.to_string(),
                    value,
                    description: Some(format!("Group of {} tanks", levels.len())),
                })
            })
            .collect()
    }

    /// Raise a diagnostic alarm on a device and lower it after `duration`.
    ///
    /// Returns false when a test is already running for the device.
    pub fn test_alarm(&self, device_id: &str, state: AlarmState, duration: Duration) -> bool {
        if !self.dispatcher.start_test_alarm(device_id, state, self.clock.now()) {
            return false;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        let clock = self.clock;
        let cancel = self.cancel.clone();
        let device = device_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(duration) => dispatcher.end_test_alarm(&device, clock.now()),
            }
        });
        true
    }

    /// Stop every worker and wait for them to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Worker task failed: {}", e);
            }
        }
        info!("All workers stopped");
    }
}
