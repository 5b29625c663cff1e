//! Worker pool
//!
//! Jobs ask the [`Scheduler`] for a worker bound to their URL. Idle workers
//! are kept per [`PoolKey`] and handed out before anything new is spawned.
//! Two permit pools bound the number of running jobs: one per protocol and
//! one per (protocol, host). A [`WorkerLease`] carries its permits and the
//! worker; giving it back with [`Scheduler::release`] may pool the worker,
//! dropping it terminates the worker.
//!
//! Jobs that need several workers at once, like a get feeding a put, take
//! all their permits up front with [`Scheduler::reserve`] and bind workers
//! inside that [`Reservation`]. Permits are always taken protocols first,
//! then hosts, each group sorted by name.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::auth::AuthCache;
use crate::config::{Config, IdleEviction, LaunchMode};
use crate::connection::{Launcher, Worker, WorkerState};
use crate::error::{ConfigError, ConnectionError, ErrorCode, JobError};
use crate::logging::*;
use crate::metadata::MetaData;
use crate::protocol::commands::cmd;
use crate::protocol::messages::HostInfo;
use crate::worker::registry::{ProtocolInfo, ProtocolRegistry};

/// Workers are reused only between jobs with the same key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
	pub protocol: String,
	pub host: String,
	pub port: Option<u16>,
	pub user: Option<String>,
}

impl PoolKey {
	pub fn from_url(url: &Url) -> Self {
		PoolKey {
			protocol: url.scheme().to_string(),
			host: url.host_str().unwrap_or("").to_string(),
			port: url.port(),
			user: if url.username().is_empty() { None } else { Some(url.username().to_string()) },
		}
	}
}

/// Permit pools, in the order they are taken
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SlotKey {
	Protocol(String),
	Host(String, String),
}

/// Permits held for one or more workers that run together
pub struct Reservation {
	hosts: Vec<(String, String)>,
	_permits: Vec<OwnedSemaphorePermit>,
}

impl Reservation {
	/// Whether workers for `url` may run inside this reservation
	pub fn covers(&self, url: &Url) -> bool {
		let host = url.host_str().unwrap_or("");
		self.hosts.iter().any(|(p, h)| p == url.scheme() && h == host)
	}
}

/// A worker bound to one job
pub struct WorkerLease {
	worker: Option<Worker>,
	key: PoolKey,
	_slots: Arc<Reservation>,
}

impl WorkerLease {
	pub fn key(&self) -> &PoolKey {
		&self.key
	}

	pub fn worker(&mut self) -> Result<&mut Worker, JobError> {
		let protocol = self.key.protocol.clone();
		self.worker.as_mut().ok_or_else(|| JobError::new(ErrorCode::WorkerDied, protocol))
	}

	pub fn worker_id(&self) -> Option<u64> {
		self.worker.as_ref().map(|w| w.id())
	}
}

struct SchedulerInner {
	config: Config,
	registry: ProtocolRegistry,
	launcher: Launcher,
	idle: Mutex<HashMap<PoolKey, VecDeque<Worker>>>,
	protocol_slots: Mutex<HashMap<String, Arc<Semaphore>>>,
	host_slots: Mutex<HashMap<(String, String), Arc<Semaphore>>>,
	auth: AuthCache,
	spawned: AtomicUsize,
	next_worker_id: AtomicU64,
	next_job_id: AtomicU64,
}

/// Cheap to clone; all clones share one pool
#[derive(Clone)]
pub struct Scheduler {
	inner: Arc<SchedulerInner>,
}

impl Scheduler {
	/// Scheduler for the built-in protocols
	pub fn new(config: Config) -> Result<Self, ConfigError> {
		Self::with_registry(config, ProtocolRegistry::builtin())
	}

	/// Scheduler for a custom protocol table. Limits and pooling flags from
	/// `config` are folded into the table.
	pub fn with_registry(config: Config, mut registry: ProtocolRegistry) -> Result<Self, ConfigError> {
		registry.apply_config(&config);
		let launcher = match config.scheduler.launch_mode {
			LaunchMode::Process => Launcher::Process {
				binary: config.scheduler.worker_binary()?,
				socket_dir: config.scheduler.socket_dir(),
			},
			LaunchMode::InProcess => Launcher::InProcess,
		};
		debug!("Scheduler using {:?} for {:?}", launcher, registry.names().collect::<Vec<_>>());

		let inner = Arc::new(SchedulerInner {
			config,
			registry,
			launcher,
			idle: Mutex::new(HashMap::new()),
			protocol_slots: Mutex::new(HashMap::new()),
			host_slots: Mutex::new(HashMap::new()),
			auth: AuthCache::new(),
			spawned: AtomicUsize::new(0),
			next_worker_id: AtomicU64::new(1),
			next_job_id: AtomicU64::new(1),
		});
		start_reaper(&inner);
		Ok(Scheduler { inner })
	}

	pub fn config(&self) -> &Config {
		&self.inner.config
	}

	pub fn registry(&self) -> &ProtocolRegistry {
		&self.inner.registry
	}

	pub fn protocol_info(&self, scheme: &str) -> Option<&ProtocolInfo> {
		self.inner.registry.get(scheme)
	}

	/// Credentials workers cached during this session
	pub fn auth_cache(&self) -> &AuthCache {
		&self.inner.auth
	}

	/// Workers spawned over the scheduler's lifetime
	pub fn spawned_count(&self) -> usize {
		self.inner.spawned.load(Ordering::SeqCst)
	}

	pub fn idle_count(&self, key: &PoolKey) -> usize {
		match self.inner.idle.lock() {
			Ok(idle) => idle.get(key).map(|q| q.len()).unwrap_or(0),
			Err(_) => 0,
		}
	}

	pub(crate) fn next_job_id(&self) -> u64 {
		self.inner.next_job_id.fetch_add(1, Ordering::SeqCst)
	}

	fn protocol_for(&self, url: &Url) -> Result<&ProtocolInfo, JobError> {
		self.inner
			.registry
			.get(url.scheme())
			.ok_or_else(|| JobError::new(ErrorCode::UnsupportedProtocol, url.scheme()))
	}

	/// Bind a worker for `url`, waiting for a free slot first. `meta` is sent
	/// with CMD_META_DATA when not empty.
	pub async fn acquire(&self, url: &Url, meta: &MetaData) -> Result<WorkerLease, JobError> {
		let info = self.protocol_for(url)?;
		let slots = Arc::new(self.reserve(&[url]).await?);
		self.bind(info, url, meta, slots).await
	}

	/// Bind a worker for `url` inside `reservation`. Falls back to
	/// [`Scheduler::acquire`] when the reservation does not cover `url`.
	pub async fn acquire_reserved(
		&self,
		url: &Url,
		meta: &MetaData,
		reservation: &Arc<Reservation>,
	) -> Result<WorkerLease, JobError> {
		let info = self.protocol_for(url)?;
		let slots = if reservation.covers(url) {
			reservation.clone()
		} else {
			debug!("Reservation does not cover {}, waiting for a slot", url);
			Arc::new(self.reserve(&[url]).await?)
		};
		self.bind(info, url, meta, slots).await
	}

	/// Take the permits for one worker per URL in a single step. A pool
	/// asked for more permits than it has hands out all of them, so the
	/// workers then share.
	pub async fn reserve(&self, urls: &[&Url]) -> Result<Reservation, JobError> {
		let mut wanted: BTreeMap<SlotKey, (Arc<Semaphore>, usize, usize)> = BTreeMap::new();
		let mut hosts = Vec::new();
		for url in urls {
			let info = self.protocol_for(url)?;
			let host = url.host_str().unwrap_or("").to_string();
			wanted
				.entry(SlotKey::Protocol(info.name.clone()))
				.or_insert_with(|| (self.inner.protocol_slots(info), 0, info.max_workers))
				.1 += 1;
			wanted
				.entry(SlotKey::Host(info.name.clone(), host.clone()))
				.or_insert_with(|| (self.inner.host_slots(info, &host), 0, info.max_workers_per_host))
				.1 += 1;
			hosts.push((info.name.clone(), host));
		}

		let mut permits = Vec::with_capacity(wanted.len());
		for (key, (slots, count, capacity)) in wanted {
			let count = count.min(capacity.max(1));
			trace!("Taking {} permits from {:?}", count, key);
			permits.push(slots.acquire_many_owned(count as u32).await.map_err(closed)?);
		}
		Ok(Reservation { hosts, _permits: permits })
	}

	async fn bind(
		&self,
		info: &ProtocolInfo,
		url: &Url,
		meta: &MetaData,
		slots: Arc<Reservation>,
	) -> Result<WorkerLease, JobError> {
		let key = PoolKey::from_url(url);
		let host = HostInfo::from_url(url);
		let worker = loop {
			let (mut worker, fresh) = match self.inner.take_idle(&key) {
				Some(worker) => (worker, false),
				None => (self.spawn(info).await?, true),
			};
			match prepare(&mut worker, &host, meta).await {
				Ok(()) => break worker,
				Err(e) if !fresh => debug!("Pooled worker {} unusable ({}), trying another", worker.id(), e),
				Err(e) => return Err(e.into()),
			}
		};
		Ok(WorkerLease { worker: Some(worker), key, _slots: slots })
	}

	/// Give a worker back. It is pooled unless the job failed fatally, the
	/// protocol is not poolable or the worker is gone.
	pub fn release(&self, mut lease: WorkerLease, fatal: bool) {
		let mut worker = match lease.worker.take() {
			Some(worker) => worker,
			None => return,
		};
		let poolable = self.inner.registry.get(worker.protocol()).map(|i| i.poolable).unwrap_or(false);
		if fatal || !poolable || !worker.is_alive() {
			debug!("Dropping worker {} (fatal: {}, poolable: {})", worker.id(), fatal, poolable);
			return;
		}

		let cap = self.inner.config.scheduler.max_idle_per_key;
		let mut evicted = Vec::new();
		worker.set_state(WorkerState::Idle);
		match self.inner.idle.lock() {
			Ok(mut idle) => {
				let queue = idle.entry(lease.key.clone()).or_default();
				queue.push_back(worker);
				while queue.len() > cap {
					let victim = match self.inner.config.scheduler.idle_eviction {
						IdleEviction::Oldest => queue.pop_front(),
						IdleEviction::Newest => queue.pop_back(),
					};
					evicted.extend(victim);
				}
			}
			Err(_) => warn!("Idle pool poisoned, dropping worker"),
		}
		for worker in &evicted {
			debug!("Evicting idle worker {} for {}", worker.id(), lease.key.protocol);
		}
	}

	async fn spawn(&self, info: &ProtocolInfo) -> Result<Worker, ConnectionError> {
		let id = self.inner.next_worker_id.fetch_add(1, Ordering::SeqCst);
		let timeout = self.inner.config.scheduler.connect_timeout();
		let mut worker = self.inner.launcher.launch(id, info, timeout).await?;
		self.inner.spawned.fetch_add(1, Ordering::SeqCst);

		let settings = self.inner.config.worker_settings(&info.name);
		worker.send(cmd::CONFIG, &settings.encode()?).await?;
		Ok(worker)
	}

	/// Terminate idle workers that outlived the idle lifetime
	pub fn reap_idle(&self) -> usize {
		self.inner.reap()
	}
}

fn closed(_: AcquireError) -> JobError {
	JobError::new(ErrorCode::Internal, "scheduler shut down")
}

async fn prepare(worker: &mut Worker, host: &HostInfo, meta: &MetaData) -> Result<(), ConnectionError> {
	worker.set_state(WorkerState::Dispatching);
	if worker.host() != Some(host) {
		let payload = serde_json::to_vec(host).map_err(crate::protocol::error::ProtocolError::from)?;
		worker.send(cmd::HOST, &payload).await?;
		worker.set_host(host.clone());
	}
	if !meta.is_empty() {
		worker.send(cmd::META_DATA, &meta.encode()?).await?;
	}
	Ok(())
}

impl SchedulerInner {
	fn protocol_slots(&self, info: &ProtocolInfo) -> Arc<Semaphore> {
		let mut slots = match self.protocol_slots.lock() {
			Ok(slots) => slots,
			Err(poisoned) => poisoned.into_inner(),
		};
		slots.entry(info.name.clone()).or_insert_with(|| Arc::new(Semaphore::new(info.max_workers))).clone()
	}

	fn host_slots(&self, info: &ProtocolInfo, host: &str) -> Arc<Semaphore> {
		let mut slots = match self.host_slots.lock() {
			Ok(slots) => slots,
			Err(poisoned) => poisoned.into_inner(),
		};
		slots
			.entry((info.name.clone(), host.to_string()))
			.or_insert_with(|| Arc::new(Semaphore::new(info.max_workers_per_host)))
			.clone()
	}

	/// Most recently pooled live worker for `key`
	fn take_idle(&self, key: &PoolKey) -> Option<Worker> {
		let mut idle = self.idle.lock().ok()?;
		let queue = idle.get_mut(key)?;
		while let Some(mut worker) = queue.pop_back() {
			if worker.is_alive() {
				trace!("Reusing worker {} for {:?}", worker.id(), key);
				return Some(worker);
			}
			debug!("Discarding dead idle worker {}", worker.id());
		}
		None
	}

	fn reap(&self) -> usize {
		let lifetime = self.config.scheduler.max_idle_lifetime();
		let mut reaped = Vec::new();
		if let Ok(mut idle) = self.idle.lock() {
			for queue in idle.values_mut() {
				let mut keep = VecDeque::with_capacity(queue.len());
				for mut worker in queue.drain(..) {
					if worker.is_alive() && worker.idle_for() < lifetime {
						keep.push_back(worker);
					} else {
						reaped.push(worker);
					}
				}
				*queue = keep;
			}
			idle.retain(|_, queue| !queue.is_empty());
		}
		if !reaped.is_empty() {
			debug!("Reaped {} idle workers", reaped.len());
		}
		reaped.len()
	}
}

fn start_reaper(inner: &Arc<SchedulerInner>) {
	let handle = match tokio::runtime::Handle::try_current() {
		Ok(handle) => handle,
		Err(_) => {
			debug!("No runtime, idle reaper disabled");
			return;
		}
	};
	let weak: Weak<SchedulerInner> = Arc::downgrade(inner);
	let period = inner.config.scheduler.reaper_interval();
	handle.spawn(async move {
		let mut ticker = tokio::time::interval(period);
		ticker.tick().await;
		loop {
			ticker.tick().await;
			match weak.upgrade() {
				Some(inner) => {
					inner.reap();
				}
				None => break,
			}
		}
	});
}


// vim: ts=4
