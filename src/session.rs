//! Mission queue and printer session.
//!
//! A [`Session`] owns the transport and feeds it one mission at a time:
//! write the whole job, then read terminator-delimited chunks until the
//! printer acknowledges, then move on to the next mission. Missions are
//! taken strictly in submission order.
//!
//! The dispatch loop runs either on a worker thread ([`Session::start`]) or
//! on the calling thread ([`Session::run_until_idle`]). Callers on other
//! threads submit through a [`MissionQueue`] handle and learn the outcome of
//! their mission from the returned [`Ticket`].
//!
//! # Example
//!
//! ```rust,no_run
//! use guagua::{transport, Canvas, Mission, Session, SessionConfig};
//!
//! let transport = transport::open("/dev/rfcomm0").unwrap();
//! let mut session = Session::new(transport, SessionConfig::default());
//! session.start().unwrap();
//!
//! let ticket = session.submit(Mission::from(&Canvas::new(64).unwrap()));
//! ticket.wait().unwrap();
//! ```

use log::{debug, error, info, warn};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    error::{Error, ProtocolError, TransportError},
    protocol::{Frame, Mission, TERM},
    transport::Transport,
};

/// Handshake state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    AwaitingAck,
}

/// What the session does after an acknowledgment timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Fail the mission and carry on with the next one.
    SkipAndContinue,
    /// Fail the mission and every queued mission, then stop the worker.
    AbortSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Print everything already queued, then stop.
    Drain,
    /// Drop queued missions and stop waiting on the current one.
    Abandon,
}

/// Session settings
///
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    ack_timeout: Duration,
    poll_interval: Duration,
    max_ack_chunks: usize,
    on_timeout: TimeoutPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            ack_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            max_ack_chunks: 64,
            on_timeout: TimeoutPolicy::SkipAndContinue,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Longest wait for the acknowledgment of one mission.
    pub fn ack_timeout(self, ack_timeout: Duration) -> Self {
        SessionConfig {
            ack_timeout,
            ..self
        }
    }

    /// How often the wait checks for an abandoning shutdown.
    pub fn poll_interval(self, poll_interval: Duration) -> Self {
        SessionConfig {
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            ..self
        }
    }

    /// Chunks other than the acknowledgment tolerated per mission.
    pub fn max_ack_chunks(self, max_ack_chunks: usize) -> Self {
        SessionConfig {
            max_ack_chunks: max_ack_chunks.max(1),
            ..self
        }
    }

    pub fn on_timeout(self, on_timeout: TimeoutPolicy) -> Self {
        SessionConfig { on_timeout, ..self }
    }
}

/// Outcome of one submitted mission.
#[derive(Debug)]
pub struct Ticket {
    id: u64,
    done: Receiver<Result<(), Error>>,
}

impl Ticket {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the mission has been acknowledged or has failed.
    ///
    /// Someone has to run the dispatch loop for this to return, either a
    /// started session or a call to [`Session::run_until_idle`].
    pub fn wait(self) -> Result<(), Error> {
        self.done.recv().unwrap_or(Err(Error::SessionClosed))
    }

    /// Like [`Ticket::wait`] but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), Error>> {
        match self.done.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(Error::SessionClosed)),
        }
    }

    /// The result, if the mission has finished.
    pub fn try_result(&self) -> Option<Result<(), Error>> {
        match self.done.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(Error::SessionClosed)),
        }
    }
}

struct Pending {
    id: u64,
    mission: Mission,
    done: Sender<Result<(), Error>>,
}

impl Pending {
    fn complete(self, result: Result<(), Error>) {
        // the submitter may have dropped its ticket
        let _ = self.done.send(result);
    }
}

#[derive(Default)]
struct Queue {
    pending: VecDeque<Pending>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
    state: Mutex<SessionState>,
    abandon: AtomicBool,
    next_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable submission handle for a session's queue.
#[derive(Clone)]
pub struct MissionQueue {
    shared: Arc<Shared>,
}

impl MissionQueue {
    fn new() -> Self {
        MissionQueue {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                ready: Condvar::new(),
                state: Mutex::new(SessionState::Idle),
                abandon: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Append `mission` to the tail of the queue. Never blocks.
    ///
    /// On a closed session the ticket resolves to [`Error::SessionClosed`]
    /// straight away.
    pub fn submit(&self, mission: Mission) -> Ticket {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, rx) = mpsc::channel();
        let pending = Pending { id, mission, done };

        let mut queue = lock(&self.shared.queue);
        if queue.closed {
            drop(queue);
            debug!("mission {} submitted to a closed session", id);
            pending.complete(Err(Error::SessionClosed));
        } else {
            debug!("mission {} queued, {} bytes", id, pending.mission.len());
            queue.pending.push_back(pending);
            drop(queue);
            self.shared.ready.notify_one();
        }
        Ticket { id, done: rx }
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.queue).pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    fn set_state(&self, state: SessionState) {
        *lock(&self.shared.state) = state;
    }

    /// Take the head of the queue, waiting for one if `block` is set.
    ///
    /// Returns `None` once the queue is closed and empty, or straight away
    /// when not blocking and the queue is empty.
    fn pop(&self, block: bool) -> Option<Pending> {
        let mut queue = lock(&self.shared.queue);
        loop {
            if let Some(pending) = queue.pending.pop_front() {
                return Some(pending);
            }
            if queue.closed || !block {
                return None;
            }
            queue = self
                .shared
                .ready
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting missions and wake the worker.
    fn close(&self) {
        lock(&self.shared.queue).closed = true;
        self.shared.ready.notify_all();
    }

    /// Fail every mission still waiting in the queue.
    fn fail_pending(&self, reason: impl Fn() -> Error) {
        let dropped: Vec<Pending> = lock(&self.shared.queue).pending.drain(..).collect();
        for pending in dropped {
            debug!("mission {} dropped", pending.id);
            pending.complete(Err(reason()));
        }
    }

    fn abandoning(&self) -> bool {
        self.shared.abandon.load(Ordering::SeqCst)
    }
}

/// Owns the transport and performs the per-mission handshake.
struct Dispatcher<T: Transport> {
    transport: T,
    config: SessionConfig,
    queue: MissionQueue,
}

impl<T: Transport> Dispatcher<T> {
    /// Dispatch queued missions until the queue runs dry (or is closed,
    /// when `block` is set).
    fn run(&mut self, block: bool) {
        while let Some(pending) = self.queue.pop(block) {
            let result = self.dispatch(pending.id, &pending.mission);
            let abort = matches!(result, Err(Error::Transport(TransportError::ReadTimeout(_))))
                && self.config.on_timeout == TimeoutPolicy::AbortSession;

            match &result {
                Ok(()) => info!("mission {} printed", pending.id),
                Err(err) => warn!("mission {} failed: {}", pending.id, err),
            }
            pending.complete(result);

            if abort {
                error!("acknowledgment timeout, aborting session");
                self.queue.close();
                self.queue.fail_pending(|| Error::SessionAborted);
                break;
            }
        }
    }

    fn dispatch(&mut self, id: u64, mission: &Mission) -> Result<(), Error> {
        self.queue.set_state(SessionState::Sending);
        debug!("mission {}: sending {} bytes", id, mission.len());
        let result = match self.transport.write_all(mission.as_bytes()) {
            Ok(()) => {
                self.queue.set_state(SessionState::AwaitingAck);
                self.await_ack(id)
            }
            Err(err) => Err(err.into()),
        };
        self.queue.set_state(SessionState::Idle);
        result
    }

    fn await_ack(&mut self, id: u64) -> Result<(), Error> {
        let deadline = Instant::now() + self.config.ack_timeout;
        let mut chunks = 0;

        loop {
            if self.queue.abandoning() {
                return Err(Error::Abandoned);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::ReadTimeout(self.config.ack_timeout).into());
            }

            match self
                .transport
                .read_until(&TERM, remaining.min(self.config.poll_interval))
            {
                Ok(chunk) if Frame::is_ack(&chunk) => {
                    debug!("mission {}: acknowledged", id);
                    return Ok(());
                }
                Ok(chunk) => {
                    chunks += 1;
                    debug!("mission {}: ignoring chunk {:02X?}", id, chunk);
                    if chunks >= self.config.max_ack_chunks {
                        return Err(ProtocolError::UnexpectedResponse { chunks, last: chunk }.into());
                    }
                }
                Err(TransportError::ReadTimeout(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Printer session: a mission queue plus the transport that drains it.
///
/// Creating a session does not start any thread; call [`Session::start`]
/// for a background worker or [`Session::run_until_idle`] to dispatch on
/// the current thread.
pub struct Session<T: Transport + 'static> {
    queue: MissionQueue,
    dispatcher: Option<Dispatcher<T>>,
    worker: Option<JoinHandle<Dispatcher<T>>>,
}

impl<T: Transport + 'static> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let queue = MissionQueue::new();
        Session {
            dispatcher: Some(Dispatcher {
                transport,
                config,
                queue: queue.clone(),
            }),
            queue,
            worker: None,
        }
    }

    /// Handle for submitting from other threads.
    pub fn queue(&self) -> MissionQueue {
        self.queue.clone()
    }

    pub fn submit(&self, mission: Mission) -> Ticket {
        self.queue.submit(mission)
    }

    pub fn state(&self) -> SessionState {
        self.queue.state()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Dispatch every queued mission on the calling thread, then return.
    ///
    /// Per-mission results are delivered through the tickets.
    pub fn run_until_idle(&mut self) -> Result<(), Error> {
        let dispatcher = self.dispatcher.as_mut().ok_or(Error::AlreadyStarted)?;
        dispatcher.run(false);
        Ok(())
    }

    /// Spawn the worker thread that owns the transport from now on.
    pub fn start(&mut self) -> Result<(), Error> {
        let mut dispatcher = self.dispatcher.take().ok_or(Error::AlreadyStarted)?;
        info!("session worker starting");
        self.worker = Some(thread::spawn(move || {
            dispatcher.run(true);
            info!("session worker stopped");
            dispatcher
        }));
        Ok(())
    }

    /// Stop the session and hand back the transport.
    ///
    /// `Drain` prints everything already queued first; `Abandon` fails the
    /// queued missions with [`Error::SessionClosed`] and the in-flight one
    /// with [`Error::Abandoned`].
    pub fn shutdown(mut self, mode: ShutdownMode) -> Result<T, Error> {
        let dispatcher = self.stop(mode)?;
        Ok(dispatcher.transport)
    }

    fn stop(&mut self, mode: ShutdownMode) -> Result<Dispatcher<T>, Error> {
        info!("session shutting down ({:?})", mode);
        match mode {
            ShutdownMode::Drain => self.queue.close(),
            ShutdownMode::Abandon => {
                self.queue.shared.abandon.store(true, Ordering::SeqCst);
                self.queue.close();
                self.queue.fail_pending(|| Error::SessionClosed);
            }
        }

        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| Error::WorkerPanicked),
            None => {
                let mut dispatcher = self.dispatcher.take().ok_or(Error::WorkerPanicked)?;
                dispatcher.run(false);
                Ok(dispatcher)
            }
        }
    }
}

impl<T: Transport + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(err) = self.stop(ShutdownMode::Abandon) {
                error!("session shutdown failed: {}", err);
            }
        }
        // queue handles outlive the session, later submissions fail at once
        self.queue.close();
        self.queue.fail_pending(|| Error::SessionClosed);
    }
}
