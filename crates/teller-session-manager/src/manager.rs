//! Session manager: slot allocation, multiplexed inbound traffic, reaping
//! and shutdown.
//!
//! The manager is a single owner of every slot. Work that may block (channel
//! opens, reading frames, ledger access) runs in tasks that report back over
//! an internal event queue, so the loop in [`SessionManager::run`] only ever
//! waits in one place.

use crate::channel::open_outbound;
use crate::session::{Session, Slot};
use crate::{ChannelPaths, ClientLauncher, LaunchSpec, SessionError, SessionResult, SlotState};
use bank_config_and_utils::{Config, Paths};
use bank_operations::{messages, TellerService};
use ledger_store::AccountNumber;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use teller_protocol::{decode, encode, ProtocolError, RequestKind, Response, MAX_FRAME_LEN};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Runtime settings of the manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub fifo_dir: PathBuf,
    pub base_name: String,
    pub max_sessions: usize,
    /// Reap pass period and outbound-open retry interval.
    pub poll_interval: Duration,
    /// How long a launched client has to open its channels.
    pub open_timeout: Duration,
    pub write_timeout: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub shutdown_timeout: Duration,
}

impl ManagerConfig {
    pub fn from_config(config: &Config, paths: &Paths) -> Self {
        Self {
            fifo_dir: config.fifo_dir(paths),
            base_name: config.fifo_base_name.clone(),
            max_sessions: config.max_sessions,
            poll_interval: config.poll_interval(),
            open_timeout: config.open_timeout(),
            write_timeout: config.write_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }
}

/// Requests from the external connection source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRequest {
    /// Open a session for this account.
    Open(AccountNumber),
    /// Stop accepting and tear everything down.
    Shutdown,
}

/// Channels and process of a freshly allocated slot.
#[derive(Debug)]
struct Allocation {
    child: Child,
    inbound: pipe::Receiver,
    outbound: pipe::Sender,
}

/// One unit read from an inbound channel.
#[derive(Debug)]
enum InboundFrame {
    /// Raw bytes of one line, newline included when present.
    Line(Vec<u8>),
    /// A line longer than [`MAX_FRAME_LEN`]; its bytes were discarded.
    Oversized(usize),
}

#[derive(Debug)]
enum SessionEvent {
    Allocated {
        slot: usize,
        generation: u64,
        result: SessionResult<Allocation>,
    },
    Frame {
        slot: usize,
        generation: u64,
        frame: InboundFrame,
    },
    Closed {
        slot: usize,
        generation: u64,
        reason: String,
    },
}

/// Owns the fixed set of teller slots.
pub struct SessionManager {
    config: ManagerConfig,
    service: Arc<TellerService>,
    launcher: Arc<dyn ClientLauncher>,
    slots: Vec<Slot>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    /// Set at shutdown so pending allocations stop waiting for their client.
    cancel: watch::Sender<bool>,
    accepting: bool,
    responses_sent: u64,
}

impl SessionManager {
    /// Create a manager with `config.max_sessions` free slots.
    ///
    /// Creates the FIFO directory if needed.
    pub fn new(
        config: ManagerConfig,
        service: Arc<TellerService>,
        launcher: Arc<dyn ClientLauncher>,
    ) -> SessionResult<Self> {
        std::fs::create_dir_all(&config.fifo_dir).map_err(|source| SessionError::Channel {
            path: config.fifo_dir.clone(),
            source,
        })?;

        let slots = (0..config.max_sessions)
            .map(|index| {
                Slot::new(
                    index,
                    ChannelPaths::for_slot(&config.fifo_dir, &config.base_name, index),
                )
            })
            .collect();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel, _) = watch::channel(false);

        Ok(Self {
            config,
            service,
            launcher,
            slots,
            events_tx,
            events_rx,
            cancel,
            accepting: true,
            responses_sent: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots not in `Free`.
    pub fn active_sessions(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state != SlotState::Free)
            .count()
    }

    pub fn slot_state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    pub fn slot_account(&self, slot: usize) -> Option<AccountNumber> {
        self.slots.get(slot).and_then(|s| s.account)
    }

    pub fn channel_paths(&self, slot: usize) -> Option<&ChannelPaths> {
        self.slots.get(slot).map(|s| &s.paths)
    }

    /// PID of the launched client, while it has not been reaped.
    pub fn client_pid(&self, slot: usize) -> Option<u32> {
        self.slots
            .get(slot)
            .and_then(|s| s.session.as_ref())
            .and_then(|s| s.pid)
    }

    /// Response frames written since startup.
    pub fn responses_sent(&self) -> u64 {
        self.responses_sent
    }

    // =========================================================================
    // Main loop
    // =========================================================================

    /// Serve until `shutdown` resolves or the connection source asks to stop,
    /// then tear every session down. If the source goes away, existing
    /// sessions keep being served.
    pub async fn run<S>(mut self, mut connections: mpsc::Receiver<ConnectionRequest>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            max_sessions = self.capacity(),
            fifo_dir = %self.config.fifo_dir.display(),
            "session manager running"
        );

        let mut source_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received");
                    break;
                }
                request = connections.recv(), if source_open => match request {
                    Some(ConnectionRequest::Open(account)) => {
                        match self.open_session(account).await {
                            Ok(slot) => debug!(slot, %account, "connection accepted"),
                            Err(e) => warn!(%account, error = %e, "connection rejected"),
                        }
                    }
                    Some(ConnectionRequest::Shutdown) => {
                        info!("shutdown requested by connection source");
                        break;
                    }
                    None => {
                        info!("connection source closed, serving existing sessions");
                        source_open = false;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                _ = ticker.tick() => self.reap(),
            }
        }

        self.shutdown().await;
    }

    /// Process internal events until `done` holds or `max_wait` elapses.
    /// Runs a reap pass whenever the queue stays idle for a poll interval.
    pub async fn pump_until<F>(&mut self, max_wait: Duration, mut done: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = Instant::now() + max_wait;
        loop {
            if done(&*self) {
                return true;
            }
            let wake = (Instant::now() + self.config.poll_interval).min(deadline);
            match timeout_at(wake, self.events_rx.recv()).await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => return done(&*self),
                Err(_) => {
                    self.reap();
                    if Instant::now() >= deadline {
                        return done(&*self);
                    }
                }
            }
        }
    }

    /// Process internal events for `duration`.
    pub async fn pump(&mut self, duration: Duration) {
        self.pump_until(duration, |_| false).await;
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Claim a free slot for `account` and start allocating it.
    ///
    /// Returns the slot index once the slot is `Allocating`; the transition to
    /// `Connected` happens when the allocation event is processed.
    pub async fn open_session(&mut self, account: AccountNumber) -> SessionResult<usize> {
        if !self.accepting {
            return Err(SessionError::ShuttingDown);
        }

        let service = Arc::clone(&self.service);
        let admitted = tokio::task::spawn_blocking(move || service.admit(account))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))?;
        if let Err(e) = admitted {
            let err = SessionError::from(e);
            self.service.session_rejected(account, &err.to_string());
            return Err(err);
        }

        let Some(index) = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Free)
        else {
            let err = SessionError::CapacityExceeded {
                max_sessions: self.capacity(),
            };
            self.service.session_rejected(account, &err.to_string());
            return Err(err);
        };

        let launcher = Arc::clone(&self.launcher);
        let events = self.events_tx.clone();
        let timing = AllocationTiming {
            open_timeout: self.config.open_timeout,
            retry: self.config.poll_interval,
            grace: self.config.shutdown_timeout,
        };
        let cancel = self.cancel.subscribe();

        let slot = &mut self.slots[index];
        slot.state = SlotState::Allocating;
        slot.account = Some(account);
        let generation = slot.generation;
        let paths = slot.paths.clone();
        let spec = LaunchSpec {
            slot: index,
            account,
            to_client: paths.to_client.clone(),
            from_client: paths.from_client.clone(),
        };

        slot.allocation = Some(tokio::spawn(async move {
            let result = allocate(&spec, &paths, launcher.as_ref(), timing, cancel).await;
            let _ = events.send(SessionEvent::Allocated {
                slot: index,
                generation,
                result,
            });
        }));

        info!(slot = index, %account, "slot allocating");
        Ok(index)
    }

    fn on_allocated(&mut self, index: usize, generation: u64, result: SessionResult<Allocation>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if !slot.is_current(generation) || slot.state != SlotState::Allocating {
            debug!(slot = index, generation, "discarding stale allocation");
            return;
        }
        let Some(account) = slot.account else {
            return;
        };
        slot.allocation = None;

        match result {
            Ok(Allocation {
                child,
                inbound,
                outbound,
            }) => {
                let pid = child.id();
                let reader = tokio::spawn(read_frames(
                    index,
                    generation,
                    inbound,
                    self.events_tx.clone(),
                ));
                slot.session = Some(Session {
                    child: Some(child),
                    pid,
                    outbound,
                    reader,
                });
                slot.state = SlotState::Connected;
                self.service.session_opened(index, account);
            }
            Err(e) => {
                warn!(slot = index, %account, error = %e, "slot allocation failed");
                slot.release();
                self.service.session_rejected(account, &e.to_string());
            }
        }
    }

    // =========================================================================
    // Traffic
    // =========================================================================

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Allocated {
                slot,
                generation,
                result,
            } => self.on_allocated(slot, generation, result),
            SessionEvent::Frame {
                slot,
                generation,
                frame,
            } => self.on_frame(slot, generation, frame).await,
            SessionEvent::Closed {
                slot,
                generation,
                reason,
            } => {
                if self.is_connected(slot, generation) {
                    self.drain(slot, &reason);
                }
            }
        }
    }

    fn is_connected(&self, slot: usize, generation: u64) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|s| s.is_current(generation) && s.state == SlotState::Connected)
    }

    async fn on_frame(&mut self, slot: usize, generation: u64, frame: InboundFrame) {
        if !self.is_connected(slot, generation) {
            return;
        }
        let Some(account) = self.slot_account(slot) else {
            return;
        };

        let line = match frame {
            InboundFrame::Line(bytes) => match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    warn!(slot, %account, error = %e, "frame is not valid UTF-8");
                    let err = ProtocolError::MalformedRequest("frame is not valid UTF-8".into());
                    self.reply(slot, &Response::error(err.to_string())).await;
                    return;
                }
            },
            InboundFrame::Oversized(len) => {
                warn!(slot, %account, len, "oversized frame");
                let err = ProtocolError::MalformedRequest(format!(
                    "frame longer than {} bytes",
                    MAX_FRAME_LEN
                ));
                self.reply(slot, &Response::error(err.to_string())).await;
                return;
            }
        };

        let request = match decode(&line, account) {
            Ok(request) => request,
            Err(e) => {
                warn!(slot, %account, frame = line.trim_end(), error = %e, "rejected frame");
                self.reply(slot, &Response::error(e.to_string())).await;
                return;
            }
        };
        debug!(slot, %account, frame = line.trim_end(), "request received");

        let service = Arc::clone(&self.service);
        let kind = request.kind;
        let response = match tokio::task::spawn_blocking(move || service.handle(slot, &request)).await {
            Ok(response) => response,
            Err(e) => {
                error!(slot, %account, error = %e, "request processing task failed");
                Response::error(messages::LEDGER_UNAVAILABLE)
            }
        };

        if self.reply(slot, &response).await && kind == RequestKind::Exit {
            self.drain(slot, "client exit");
        }
    }

    /// Write one response frame. On failure the session is drained and
    /// `false` is returned.
    async fn reply(&mut self, slot: usize, response: &Response) -> bool {
        let frame = format!("{}\n", encode(response));
        let write_timeout = self.config.write_timeout;
        let Some(session) = self.slots.get_mut(slot).and_then(|s| s.session.as_mut()) else {
            return false;
        };

        let result = match timeout(write_timeout, session.outbound.write_all(frame.as_bytes())).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::ChannelBroken {
                slot,
                reason: e.to_string(),
            }),
            Err(_) => Err(SessionError::ChannelBroken {
                slot,
                reason: format!("write timed out after {:?}", write_timeout),
            }),
        };

        match result {
            Ok(()) => {
                debug!(slot, frame = frame.trim_end(), "response sent");
                self.responses_sent += 1;
                true
            }
            Err(e) => {
                warn!(slot, error = %e, "outbound channel failed");
                self.drain(slot, &e.to_string());
                false
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Collect exited client processes.
    ///
    /// Never drains: the reader's `Closed` event follows every frame it
    /// forwarded, so the session ends only after those are answered. A host
    /// process (e.g. a terminal launcher) may exit while its channel stays
    /// open, and then the session simply continues.
    fn reap(&mut self) {
        for slot in self
            .slots
            .iter_mut()
            .filter(|s| s.state == SlotState::Connected)
        {
            let Some(session) = slot.session.as_mut() else {
                continue;
            };
            let Some(child) = session.child.as_mut() else {
                continue;
            };

            match child.try_wait() {
                Ok(Some(status)) => {
                    session.child = None;
                    session.pid = None;
                    if session.reader.is_finished() {
                        debug!(slot = slot.index, %status, "client exited");
                    } else {
                        info!(slot = slot.index, %status, "host process exited, channel still open");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(slot = slot.index, error = %e, "failed to poll client process"),
            }
        }
    }

    /// Tear down one session and return its slot to `Free`.
    fn drain(&mut self, index: usize, reason: &str) {
        let grace = self.config.shutdown_timeout;
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.state == SlotState::Free {
            return;
        }
        slot.state = SlotState::Draining;
        info!(slot = index, account = ?slot.account, reason, "draining session");

        if let Some(task) = slot.allocation.take() {
            task.abort();
        }
        if let Some(session) = slot.session.take() {
            session.reader.abort();
            drop(session.outbound);
            if let Some(child) = session.child {
                spawn_final_reap(index, child, grace);
            }
        }
        slot.paths.remove();

        let account = slot.account;
        slot.release();
        if let Some(account) = account {
            self.service.session_closed(index, account, reason);
        }
    }

    /// Stop accepting, SIGTERM every client, wait for them (bounded), and
    /// remove every channel object.
    pub async fn shutdown(&mut self) {
        self.accepting = false;
        let mut clients = Vec::new();

        // Pending allocations terminate their own client once cancelled, or
        // hand a finished one over through the event queue.
        self.cancel.send_replace(true);
        let allocation_deadline =
            Instant::now() + self.config.shutdown_timeout + self.config.poll_interval;
        for slot in self.slots.iter_mut() {
            if let Some(mut task) = slot.allocation.take() {
                if timeout_at(allocation_deadline, &mut task).await.is_err() {
                    warn!(slot = slot.index, "allocation did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        let deadline = Instant::now() + self.config.shutdown_timeout;
        while let Ok(event) = self.events_rx.try_recv() {
            if let SessionEvent::Allocated {
                slot,
                result: Ok(allocation),
                ..
            } = event
            {
                clients.push((slot, allocation.child));
            }
        }

        for slot in self.slots.iter_mut() {
            if slot.state == SlotState::Free {
                continue;
            }
            slot.state = SlotState::Draining;

            if let Some(session) = slot.session.take() {
                session.reader.abort();
                drop(session.outbound);
                if let Some(child) = session.child {
                    clients.push((slot.index, child));
                }
            }
            slot.paths.remove();

            if let Some(account) = slot.account {
                self.service
                    .session_closed(slot.index, account, "server shutdown");
            }
            slot.release();
        }

        for (slot, child) in &clients {
            if let Some(pid) = child.id() {
                match i32::try_from(pid) {
                    Ok(raw) => {
                        if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
                            warn!(slot, pid, error = %e, "failed to signal client");
                        }
                    }
                    Err(_) => warn!(slot, pid, "client pid out of range"),
                }
            }
        }

        for (slot, mut child) in clients {
            match timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => debug!(slot, %status, "client terminated"),
                Ok(Err(e)) => warn!(slot, error = %e, "failed to wait for client"),
                Err(_) => {
                    warn!(slot, "client ignored SIGTERM, killing");
                    if let Err(e) = child.kill().await {
                        warn!(slot, error = %e, "failed to kill client");
                    }
                }
            }
        }

        info!("session manager stopped");
    }
}

#[derive(Debug, Clone, Copy)]
struct AllocationTiming {
    open_timeout: Duration,
    retry: Duration,
    /// How long a client that never connected gets to exit after SIGTERM.
    grace: Duration,
}

/// Create channels, launch the client and open both ends.
///
/// Leaves no channel objects behind on failure.
async fn allocate(
    spec: &LaunchSpec,
    paths: &ChannelPaths,
    launcher: &dyn ClientLauncher,
    timing: AllocationTiming,
    cancel: watch::Receiver<bool>,
) -> SessionResult<Allocation> {
    paths.create()?;

    let result = connect(spec, paths, launcher, timing, cancel).await;
    if result.is_err() {
        paths.remove();
    }
    result
}

async fn connect(
    spec: &LaunchSpec,
    paths: &ChannelPaths,
    launcher: &dyn ClientLauncher,
    timing: AllocationTiming,
    mut cancel: watch::Receiver<bool>,
) -> SessionResult<Allocation> {
    let inbound = paths.open_inbound()?;
    let child = launcher.launch(spec).map_err(SessionError::Launch)?;

    let opened = tokio::select! {
        result = open_outbound(&paths.to_client, timing.open_timeout, timing.retry) => result,
        _ = cancelled(&mut cancel) => Err(SessionError::ShuttingDown),
    };

    match opened {
        Ok(outbound) => Ok(Allocation {
            child,
            inbound,
            outbound,
        }),
        Err(e) => {
            terminate(spec.slot, child, timing.grace).await;
            Err(e)
        }
    }
}

/// Resolves once shutdown starts or the manager is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|cancelled| *cancelled).await;
}

/// SIGTERM `child`, then SIGKILL it if it outlives `grace`.
async fn terminate(slot: usize, mut child: Child, grace: Duration) {
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
            debug!(slot, pid, error = %e, "failed to signal client");
        }
    }
    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(slot, %status, "unconnected client terminated"),
        Ok(Err(e)) => warn!(slot, error = %e, "failed to wait for client"),
        Err(_) => {
            warn!(slot, "client ignored SIGTERM, killing");
            let _ = child.kill().await;
        }
    }
}

/// Forward inbound lines as events until EOF or error.
///
/// At most `MAX_FRAME_LEN` bytes plus the newline are buffered per line;
/// the rest of a longer line is skipped and reported as oversized.
async fn read_frames(
    slot: usize,
    generation: u64,
    inbound: pipe::Receiver,
    events: mpsc::UnboundedSender<SessionEvent>,
) {
    let mut reader = BufReader::new(inbound);
    let mut buf = Vec::with_capacity(MAX_FRAME_LEN + 1);
    let cap = MAX_FRAME_LEN as u64 + 1;

    let reason = loop {
        buf.clear();
        let frame = match (&mut reader).take(cap).read_until(b'\n', &mut buf).await {
            Ok(0) => break "end of stream".to_string(),
            Ok(_) if buf.ends_with(b"\n") || buf.len() <= MAX_FRAME_LEN => {
                InboundFrame::Line(buf.clone())
            }
            Ok(_) => match skip_line(&mut reader).await {
                Ok(skipped) => InboundFrame::Oversized(buf.len() + skipped),
                Err(e) => break e.to_string(),
            },
            Err(e) => break e.to_string(),
        };

        let event = SessionEvent::Frame {
            slot,
            generation,
            frame,
        };
        if events.send(event).is_err() {
            return;
        }
    };

    let _ = events.send(SessionEvent::Closed {
        slot,
        generation,
        reason,
    });
}

/// Discard input through the next newline (or EOF). Returns the byte count.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut skipped = 0;
    loop {
        let (used, done) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(skipped);
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (chunk.len(), false),
            }
        };
        reader.consume(used);
        skipped += used;
        if done {
            return Ok(skipped);
        }
    }
}

fn spawn_final_reap(slot: usize, mut child: Child, grace: Duration) {
    tokio::spawn(async move {
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!(slot, %status, "client reaped"),
            Ok(Err(e)) => warn!(slot, error = %e, "failed to reap client"),
            Err(_) => {
                warn!(slot, "client still running after session closed, killing");
                let _ = child.kill().await;
            }
        }
    });
}
