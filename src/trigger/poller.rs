//! Polling listener over a contract reader.
//!
//! One worker thread per listener polls every watched (contract, event) pair.
//! Each pair keeps a cursor at the last emitted `(block, log_index)`: the first
//! poll starts `lookback_blocks` behind head, later polls resume at the position
//! right after the cursor, so a log is emitted once and a block holding more
//! than `query_count` logs is paged through.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::config::ContractConfig;
use crate::error::{ListenerError, TriggerError, TriggerResult};

use super::context::RegistrationContext;
use super::events::LogEvent;
use super::listener::{EventListener, ListenerFactory, ListenerSpec};

/// Read access to contract logs on one chain.
///
/// `query_logs` must return logs at or after the chain position `from`
/// (`(block_number, log_index)`), ordered by position, at most `limit` of them.
pub trait ContractReader: Send + Sync {
    /// Current chain head.
    fn latest_block(&self) -> Result<u64, ListenerError>;

    /// Logs of `event_name` emitted by `contract`.
    fn query_logs(
        &self,
        contract: &ContractConfig,
        event_name: &str,
        from: (u64, u32),
        limit: u64,
    ) -> Result<Vec<LogEvent>, ListenerError>;
}

#[derive(Debug, Clone)]
struct Cursor {
    contract: ContractConfig,
    event_name: String,
    /// Next position to query from.
    from: (u64, u32),
    last: Option<(u64, u32)>,
}

impl Cursor {
    fn is_new(&self, log: &LogEvent) -> bool {
        self.last.map_or(true, |last| log.position() > last)
    }

    fn advance(&mut self, log: &LogEvent) {
        let (block, index) = log.position();
        self.last = Some((block, index));
        self.from = match index.checked_add(1) {
            Some(next) => (block, next),
            None => (block.saturating_add(1), 0),
        };
    }
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Listener that polls a [`ContractReader`] on a fixed period.
pub struct PollingListener {
    name: String,
    reader: Arc<dyn ContractReader>,
    contracts: Vec<ContractConfig>,
    lookback_blocks: u64,
    query_count: u64,
    poll_period: Duration,
    events_tx: Mutex<Option<Sender<LogEvent>>>,
    worker: Mutex<Option<Worker>>,
    started: AtomicBool,
}

impl std::fmt::Debug for PollingListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingListener")
            .field("name", &self.name)
            .field("contracts", &self.contracts.len())
            .field("started", &self.started.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl PollingListener {
    /// Builds a listener for `spec` that emits on `events_tx`.
    #[must_use]
    pub fn new(
        reader: Arc<dyn ContractReader>,
        spec: &ListenerSpec<'_>,
        events_tx: Sender<LogEvent>,
    ) -> Self {
        Self {
            name: format!("logevent-poller-{}", spec.trigger_id),
            reader,
            contracts: spec.config.contracts.clone(),
            lookback_blocks: spec.service.lookback_blocks,
            query_count: spec.service.query_count.max(1),
            poll_period: Duration::from_millis(u64::from(spec.service.poll_period.max(1))),
            events_tx: Mutex::new(Some(events_tx)),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    fn initial_cursors(&self, head: u64) -> Vec<Cursor> {
        let from_block = head.saturating_sub(self.lookback_blocks);
        self.contracts
            .iter()
            .flat_map(|contract| {
                contract.contract_event_names.iter().map(move |event| Cursor {
                    contract: contract.clone(),
                    event_name: event.clone(),
                    from: (from_block, 0),
                    last: None,
                })
            })
            .collect()
    }
}

impl EventListener for PollingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, ctx: &RegistrationContext) -> TriggerResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ListenerError::AlreadyStarted {
                listener: self.name.clone(),
            }
            .into());
        }

        let started = (|| -> TriggerResult<()> {
            ctx.check()?;
            let head = self.reader.latest_block().map_err(|e| ListenerError::StartFailed {
                listener: self.name.clone(),
                message: e.to_string(),
            })?;
            ctx.check()?;

            let events_tx = self
                .events_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
                .ok_or_else(|| TriggerError::internal("polling listener has no event channel"))?;

            let cursors = self.initial_cursors(head);
            let (stop_tx, stop_rx) = bounded::<()>(1);
            let reader = Arc::clone(&self.reader);
            let poll_period = self.poll_period;
            let query_count = self.query_count;
            let name = self.name.clone();

            let handle = thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || {
                    poll_loop(
                        &name,
                        reader.as_ref(),
                        cursors,
                        query_count,
                        poll_period,
                        &events_tx,
                        &stop_rx,
                    );
                })
                .map_err(|e| ListenerError::Spawn {
                    message: e.to_string(),
                })?;

            *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Worker { stop_tx, handle });
            info!(listener = %self.name, head, lookback = self.lookback_blocks, "polling listener started");
            Ok(())
        })();

        if started.is_err() {
            self.started.store(false, Ordering::Release);
        }
        started
    }

    fn close(&self) -> TriggerResult<()> {
        // Drops the channel of a listener that never started.
        self.events_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Worker { stop_tx, handle }) = worker {
            drop(stop_tx);
            handle.join().map_err(|_| ListenerError::CloseFailed {
                listener: self.name.clone(),
                message: "poll worker panicked".to_string(),
            })?;
            info!(listener = %self.name, "polling listener stopped");
        }
        Ok(())
    }
}

fn poll_loop(
    name: &str,
    reader: &dyn ContractReader,
    mut cursors: Vec<Cursor>,
    query_count: u64,
    poll_period: Duration,
    events_tx: &Sender<LogEvent>,
    stop_rx: &Receiver<()>,
) {
    loop {
        if !poll_once(name, reader, &mut cursors, query_count, events_tx, stop_rx) {
            return;
        }
        select! {
            recv(stop_rx) -> _ => return,
            default(poll_period) => {}
        }
    }
}

/// Returns false once the listener should exit.
fn poll_once(
    name: &str,
    reader: &dyn ContractReader,
    cursors: &mut [Cursor],
    query_count: u64,
    events_tx: &Sender<LogEvent>,
    stop_rx: &Receiver<()>,
) -> bool {
    for cursor in cursors.iter_mut() {
        let queried = reader.query_logs(
            &cursor.contract,
            &cursor.event_name,
            cursor.from,
            query_count,
        );
        let logs = match queried {
            Ok(logs) => logs,
            Err(e) => {
                warn!(
                    listener = %name,
                    contract = %cursor.contract.contract_name,
                    event = %cursor.event_name,
                    error = %e,
                    "log query failed"
                );
                continue;
            }
        };

        for log in logs {
            if !cursor.is_new(&log) {
                continue;
            }
            cursor.advance(&log);
            debug!(listener = %name, id = %log.id(), block = log.block_number, "log observed");
            select! {
                send(events_tx, log) -> res => {
                    if res.is_err() {
                        return false;
                    }
                }
                recv(stop_rx) -> _ => return false,
            }
        }
    }
    true
}

/// Factory producing [`PollingListener`]s over a shared reader.
#[derive(Clone)]
pub struct PollingListenerFactory {
    reader: Arc<dyn ContractReader>,
}

impl PollingListenerFactory {
    #[must_use]
    pub fn new(reader: Arc<dyn ContractReader>) -> Self {
        Self { reader }
    }
}

impl std::fmt::Debug for PollingListenerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingListenerFactory").finish_non_exhaustive()
    }
}

impl ListenerFactory for PollingListenerFactory {
    fn new_listener(
        &self,
        spec: &ListenerSpec<'_>,
    ) -> TriggerResult<(Box<dyn EventListener>, Receiver<LogEvent>)> {
        let (tx, rx) = bounded(spec.service.response_buffer_size.max(1));
        let listener = PollingListener::new(Arc::clone(&self.reader), spec, tx);
        Ok((Box::new(listener), rx))
    }
}

#[derive(Debug, Default)]
struct ChainState {
    head: u64,
    logs: BTreeMap<(u64, u32), LogEvent>,
    unavailable: bool,
}

/// In-memory chain for embedded use and tests.
///
/// Logs are matched by contract address and event name.
#[derive(Debug, Default)]
pub struct InMemoryContractReader {
    state: Mutex<ChainState>,
}

impl InMemoryContractReader {
    /// Create an empty chain at block 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a log; head advances to its block if needed.
    pub fn push_log(&self, log: LogEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.head = state.head.max(log.block_number);
        state.logs.insert(log.position(), log);
    }

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).head = head;
    }

    /// Simulates an unreachable node: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).unavailable = unavailable;
    }

    fn available(state: &ChainState) -> Result<(), ListenerError> {
        if state.unavailable {
            return Err(ListenerError::Reader {
                message: "node unavailable".to_string(),
            });
        }
        Ok(())
    }
}

impl ContractReader for InMemoryContractReader {
    fn latest_block(&self) -> Result<u64, ListenerError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::available(&state)?;
        Ok(state.head)
    }

    fn query_logs(
        &self,
        contract: &ContractConfig,
        event_name: &str,
        from: (u64, u32),
        limit: u64,
    ) -> Result<Vec<LogEvent>, ListenerError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::available(&state)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(state
            .logs
            .range(from..)
            .map(|(_, log)| log)
            .filter(|log| {
                log.contract_address == contract.contract_address && log.event_name == event_name
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
