//! The call queue sequencer
//!
//! Walks the queue one contact at a time: dial, wait for a terminal outcome,
//! record it, wait `call_delay`, advance. Three modes share that contract and
//! differ only in how a single attempt is carried out:
//!
//! - **IVR blast**: the backend places the call; its status is polled on a
//!   fixed interval until it is terminal.
//! - **Power dialer**: the operator's voice device connects to the contact
//!   with the campaign's IVR menu available for transfers.
//! - **Direct call**: like power dialer but with no IVR step, plus live
//!   duration ticks while connected.
//!
//! # Cancellation
//!
//! Each run owns a `CancellationToken`; each contact step owns a child of
//! it. `pause` and `reset` cancel the run, `skip` cancels the step. Every
//! continuation of the run loop (poll tick, connection event, end of the
//! delay) re-checks its step token under the state lock before touching the
//! queue, so once an operator action returns, no stale callback can move the
//! cursor.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dialer_core::{CallSequencer, HttpBackend, DialerConfig};
//! use dialer_core::import::parse_contacts_str;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DialerConfig::load(None)?;
//! let backend = Arc::new(HttpBackend::new(&config.backend)?);
//! let sequencer = CallSequencer::builder(backend)
//!     .campaign(config.campaign.clone())
//!     .config(config.sequencer.clone())
//!     .build();
//!
//! let report = parse_contacts_str("name,phone\nAda,5551234567\n", &config.campaign.country_code)?;
//! sequencer.load_contacts(report.contacts).await?;
//! sequencer.start().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::backend::{CallSid, CampaignBackend, IvrCallRequest, IvrScript, RedirectRequest};
use crate::config::{CallMode, CampaignConfig, SequencerConfig};
use crate::contact::{CallOutcome, Contact, ContactStatus, INTERRUPTED_REASON};
use crate::device::{
    ConnectParams, ConnectionEvent, ConnectionHandle, VoiceConnection, VoiceDevice,
};
use crate::error::{DialerError, DialerResult};
use crate::events::{EventBus, SequencerEvent};
use crate::feedback::{play_best_effort, FeedbackSink, NoFeedback, Tone};
use crate::queue::{CallQueue, QueueStats};

/// Lifecycle of the sequencer as a whole
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Nothing started since load or reset
    Idle,
    /// Placing calls
    Running,
    /// Stopped by the operator; `start` resumes
    Paused,
    /// Stopped on a blocking error
    Halted { reason: String },
    /// Every contact settled
    Finished,
}

/// Where an in-call transfer should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferTarget {
    /// The campaign's forwarding number
    Forward,
    /// The campaign's agent number
    Agent,
    /// An explicit number
    Number(String),
}

/// Point-in-time copy of the sequencer state
#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub contacts: Vec<Contact>,
    pub current_index: usize,
    pub completed_count: usize,
    pub run_state: RunState,
    pub mode: CallMode,
    pub stats: QueueStats,
}

/// How a single attempt ended, as seen by the run loop
#[derive(Debug)]
enum Attempt {
    Outcome(CallOutcome),
    Halt(DialerError),
    /// The step was cancelled by skip/pause/reset, which already updated state
    Cancelled,
}

impl Attempt {
    fn from_error(error: DialerError) -> Self {
        if error.halts_sequence() || matches!(error, DialerError::DeviceNotReady { .. }) {
            Attempt::Halt(error)
        } else {
            Attempt::Outcome(CallOutcome::Failed(error.to_string()))
        }
    }
}

/// What the run loop does after settling an attempt
enum Flow {
    Delay,
    Stop,
    Cancelled,
}

/// The call in progress
struct ActiveCall {
    index: usize,
    sid: Option<CallSid>,
    connection: Option<Arc<dyn VoiceConnection>>,
    connected_at: Option<Instant>,
}

/// Everything one step of the run loop needs, copied out of the lock
struct Step {
    index: usize,
    contact: Contact,
    token: CancellationToken,
    campaign: CampaignConfig,
    config: SequencerConfig,
}

struct Inner {
    queue: CallQueue,
    campaign: CampaignConfig,
    config: SequencerConfig,
    run_state: RunState,
    run_token: Option<CancellationToken>,
    step_token: Option<CancellationToken>,
    active: Option<ActiveCall>,
}

struct Shared {
    state: Mutex<Inner>,
    backend: Arc<dyn CampaignBackend>,
    device: Option<Arc<dyn VoiceDevice>>,
    feedback: Arc<dyn FeedbackSink>,
    events: EventBus,
}

/// Collaborators and configuration a sequencer is built from
pub struct SequencerDeps {
    pub backend: Arc<dyn CampaignBackend>,
    /// Voice device used by power-dialer and direct-call modes
    pub device: Option<Arc<dyn VoiceDevice>>,
    pub feedback: Arc<dyn FeedbackSink>,
    pub campaign: CampaignConfig,
    pub config: SequencerConfig,
    pub event_capacity: usize,
}

impl SequencerDeps {
    pub fn new(backend: Arc<dyn CampaignBackend>) -> Self {
        Self {
            backend,
            device: None,
            feedback: Arc::new(NoFeedback),
            campaign: CampaignConfig::default(),
            config: SequencerConfig::default(),
            event_capacity: crate::events::EVENT_CHANNEL_CAPACITY,
        }
    }
}

/// Builder for [`CallSequencer`]
pub struct SequencerBuilder {
    deps: SequencerDeps,
}

impl SequencerBuilder {
    pub fn device(mut self, device: Arc<dyn VoiceDevice>) -> Self {
        self.deps.device = Some(device);
        self
    }

    pub fn feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.deps.feedback = feedback;
        self
    }

    pub fn campaign(mut self, campaign: CampaignConfig) -> Self {
        self.deps.campaign = campaign;
        self
    }

    pub fn config(mut self, config: SequencerConfig) -> Self {
        self.deps.config = config;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.deps.event_capacity = capacity;
        self
    }

    pub fn build(self) -> CallSequencer {
        CallSequencer::new(self.deps)
    }
}

/// Dials a contact queue one call at a time
#[derive(Clone)]
pub struct CallSequencer {
    shared: Arc<Shared>,
}

impl CallSequencer {
    pub fn new(deps: SequencerDeps) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(Inner {
                    queue: CallQueue::default(),
                    campaign: deps.campaign,
                    config: deps.config,
                    run_state: RunState::Idle,
                    run_token: None,
                    step_token: None,
                    active: None,
                }),
                backend: deps.backend,
                device: deps.device,
                feedback: deps.feedback,
                events: EventBus::new(deps.event_capacity),
            }),
        }
    }

    pub fn builder(backend: Arc<dyn CampaignBackend>) -> SequencerBuilder {
        SequencerBuilder {
            deps: SequencerDeps::new(backend),
        }
    }

    /// Receive sequencer events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SequencerEvent> {
        self.shared.events.subscribe()
    }

    /// Replace the queue with freshly imported contacts
    pub async fn load_contacts(&self, contacts: Vec<Contact>) -> DialerResult<()> {
        let mut st = self.shared.state.lock().await;
        if st.run_state == RunState::Running {
            return Err(DialerError::AlreadyRunning);
        }
        st.queue = CallQueue::new(contacts);
        st.run_state = RunState::Idle;
        info!(contacts = st.queue.len(), "Loaded call queue");
        self.shared.events.emit(SequencerEvent::Reset);
        Ok(())
    }

    /// Replace the campaign fields; picked up by the next call attempt
    ///
    /// While a run is in progress the new fields must still satisfy the
    /// running mode, otherwise the current campaign is kept.
    pub async fn update_campaign(&self, campaign: CampaignConfig) -> DialerResult<()> {
        let mut st = self.shared.state.lock().await;
        if st.run_state == RunState::Running {
            campaign.validate_for(st.config.mode)?;
        }
        st.campaign = campaign;
        Ok(())
    }

    /// Switch calling mode; not allowed mid-run
    pub async fn set_mode(&self, mode: CallMode) -> DialerResult<()> {
        let mut st = self.shared.state.lock().await;
        if st.run_state == RunState::Running {
            return Err(DialerError::AlreadyRunning);
        }
        st.config.mode = mode;
        Ok(())
    }

    /// Start, or resume, dialing
    ///
    /// Resumes at the current contact if it is still pending, otherwise at
    /// the next pending one. On error nothing changes.
    pub async fn start(&self) -> DialerResult<()> {
        let mut st = self.shared.state.lock().await;
        if st.run_state == RunState::Running {
            return Err(DialerError::AlreadyRunning);
        }
        if st.queue.is_empty() {
            return Err(DialerError::EmptyQueue);
        }
        let mode = st.config.mode;
        st.campaign.validate_for(mode)?;
        if mode.uses_device() {
            self.shared.check_device()?;
        }
        let index = st.queue.seek_pending().ok_or(DialerError::QueueExhausted)?;

        let run = CancellationToken::new();
        st.run_token = Some(run.clone());
        st.run_state = RunState::Running;
        drop(st);

        info!(%mode, index, "Starting call sequence");
        self.shared.events.emit(SequencerEvent::Started {
            mode,
            index,
            timestamp: Utc::now(),
        });

        let shared = self.shared.clone();
        tokio::spawn(
            run_loop(shared, run).instrument(info_span!("call_sequence", mode = %mode)),
        );
        Ok(())
    }

    /// Stop dialing; the current call is torn down
    ///
    /// A contact interrupted mid-call is recorded as failed. An IVR blast call
    /// already placed by the backend is not canceled there; it is simply no
    /// longer polled.
    pub async fn pause(&self) -> DialerResult<()> {
        let mut st = self.shared.state.lock().await;
        if st.run_state != RunState::Running {
            return Err(DialerError::invalid_state("sequencer is not running"));
        }
        let connection = self.shared.stop_run_locked(&mut st);
        if st.queue.current().map(|c| &c.status) == Some(&ContactStatus::Calling) {
            let outcome = CallOutcome::Failed(INTERRUPTED_REASON.to_string());
            if let Ok(contact) = st.queue.settle_current(&outcome) {
                let (id, status) = (contact.id, contact.status.clone());
                self.shared.events.contact_status(st.queue.current_index(), id, status);
            }
        }
        st.run_state = RunState::Paused;
        let index = st.queue.current_index();
        drop(st);

        info!(index, "Call sequence paused");
        self.shared.events.emit(SequencerEvent::Paused { index });
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
        Ok(())
    }

    /// Fail the current contact as skipped and move on immediately
    ///
    /// If the current contact has already settled (the run is waiting out the
    /// delay), the wait is cut short instead.
    pub async fn skip(&self) -> DialerResult<()> {
        let mut st = self.shared.state.lock().await;
        let index = st.queue.current_index();
        let status = st
            .queue
            .current()
            .map(|c| c.status.clone())
            .ok_or(DialerError::QueueExhausted)?;

        let mut connection = None;
        if !status.is_terminal() {
            connection = st.active.take().and_then(|active| active.connection);
            let contact = st.queue.skip_current()?;
            let (id, status) = (contact.id, contact.status.clone());
            self.shared.events.contact_status(index, id, status);
            info!(index, contact_id = %id, "Contact skipped by operator");
        }
        if let Some(step) = st.step_token.take() {
            step.cancel();
        }
        let next = st.queue.advance();
        drop(st);

        self.shared.events.emit(SequencerEvent::CursorAdvanced { index: next });
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
        Ok(())
    }

    /// Stop any run and return every contact to pending at index 0
    pub async fn reset(&self) {
        let mut st = self.shared.state.lock().await;
        let connection = self.shared.stop_run_locked(&mut st);
        st.queue.reset();
        st.run_state = RunState::Idle;
        drop(st);

        info!("Call queue reset");
        self.shared.events.emit(SequencerEvent::Reset);
        if let Some(connection) = connection {
            connection.disconnect().await;
        }
    }

    /// Redirect the active call
    ///
    /// A failed redirect is reported on the event bus and returned; the call
    /// itself carries on.
    pub async fn transfer(&self, target: TransferTarget) -> DialerResult<()> {
        let (sid, campaign) = {
            let st = self.shared.state.lock().await;
            let active = st.active.as_ref().ok_or(DialerError::NoActiveCall)?;
            let sid = active
                .sid
                .clone()
                .or_else(|| active.connection.as_ref().and_then(|c| c.call_sid()))
                .ok_or(DialerError::NoActiveCall)?;
            (sid, st.campaign.clone())
        };

        let to = match target {
            TransferTarget::Forward => campaign
                .forward_number
                .clone()
                .ok_or_else(|| DialerError::config("forward_number", "not set"))?,
            TransferTarget::Agent => campaign
                .agent_number
                .clone()
                .ok_or_else(|| DialerError::config("agent_number", "not set"))?,
            TransferTarget::Number(number) => number,
        };
        let request = RedirectRequest {
            to,
            hold_music_url: campaign.hold_music_url.clone(),
            record: campaign.record,
        };

        match self.shared.backend.redirect_call(&sid, &request).await {
            Ok(()) => {
                info!(sid = %sid, to = %request.to, "Call redirected");
                Ok(())
            }
            Err(e) => {
                let reason = match e {
                    DialerError::TransferFailed { reason } => reason,
                    other => other.to_string(),
                };
                warn!(sid = %sid, %reason, "Call redirect failed");
                self.shared.events.emit(SequencerEvent::TransferFailed {
                    reason: reason.clone(),
                });
                Err(DialerError::TransferFailed { reason })
            }
        }
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        let st = self.shared.state.lock().await;
        QueueSnapshot {
            contacts: st.queue.contacts().to_vec(),
            current_index: st.queue.current_index(),
            completed_count: st.queue.completed_count(),
            run_state: st.run_state.clone(),
            mode: st.config.mode,
            stats: st.queue.stats(),
        }
    }

    pub async fn run_state(&self) -> RunState {
        self.shared.state.lock().await.run_state.clone()
    }

    /// Time since the active call was answered
    pub async fn active_call_duration(&self) -> Option<Duration> {
        let st = self.shared.state.lock().await;
        st.active
            .as_ref()
            .and_then(|a| a.connected_at)
            .map(|at| at.elapsed())
    }
}

impl Shared {
    fn check_device(&self) -> DialerResult<()> {
        match &self.device {
            None => Err(DialerError::DeviceNotReady {
                reason: "no voice device configured".to_string(),
            }),
            Some(device) if !device.is_ready() => Err(DialerError::DeviceNotReady {
                reason: "device has not completed registration".to_string(),
            }),
            Some(_) => Ok(()),
        }
    }

    /// Cancel the run and detach the active call; caller disconnects it
    fn stop_run_locked(&self, st: &mut Inner) -> Option<Arc<dyn VoiceConnection>> {
        if let Some(run) = st.run_token.take() {
            run.cancel();
        }
        st.step_token = None;
        let active = st.active.take()?;
        if active.connection.is_none() {
            if let Some(sid) = &active.sid {
                debug!(sid = %sid, index = active.index, "Abandoning poll of dispatched call");
            }
        }
        active.connection
    }

    fn halt_locked(&self, st: &mut Inner, reason: String) {
        error!(%reason, index = st.queue.current_index(), "Call sequence halted");
        if let Some(run) = st.run_token.take() {
            run.cancel();
        }
        st.step_token = None;
        st.active = None;
        st.run_state = RunState::Halted {
            reason: reason.clone(),
        };
        self.events.emit(SequencerEvent::Halted { reason });
    }

    /// Pick the next pending contact and move it into `Calling`
    async fn begin_step(&self, run: &CancellationToken) -> Option<Step> {
        let mut st = self.state.lock().await;
        if run.is_cancelled() {
            return None;
        }

        let Some(index) = st.queue.seek_pending() else {
            let stats = st.queue.stats();
            st.run_state = RunState::Finished;
            st.run_token = None;
            st.step_token = None;
            info!(completed = stats.completed, failed = stats.failed, "Call sequence finished");
            self.events.emit(SequencerEvent::Finished {
                completed: stats.completed,
                failed: stats.failed,
                timestamp: Utc::now(),
            });
            return None;
        };

        let contact = match st.queue.begin_current() {
            Ok(contact) => contact.clone(),
            Err(e) => {
                self.halt_locked(&mut st, e.to_string());
                return None;
            }
        };

        let token = run.child_token();
        st.step_token = Some(token.clone());
        st.active = Some(ActiveCall {
            index,
            sid: None,
            connection: None,
            connected_at: None,
        });
        self.events
            .contact_status(index, contact.id, ContactStatus::Calling);
        info!(index, contact_id = %contact.id, phone = %contact.phone, "Dialing contact");

        Some(Step {
            index,
            contact,
            token,
            campaign: st.campaign.clone(),
            config: st.config.clone(),
        })
    }

    async fn place_call(&self, step: &Step) -> Attempt {
        let Some(from) = step.campaign.caller_id().map(str::to_string) else {
            return Attempt::from_error(DialerError::MissingCallerId);
        };
        match step.config.mode {
            CallMode::IvrBlast => self.ivr_blast(step, from).await,
            CallMode::PowerDialer => self.device_call(step, from, false).await,
            CallMode::DirectCall => self.device_call(step, from, true).await,
        }
    }

    async fn ivr_blast(&self, step: &Step, from: String) -> Attempt {
        let script = IvrScript::from_campaign(&step.campaign);
        let request = IvrCallRequest::new(&step.contact, from, script);
        let sid = match or_cancelled(&step.token, self.backend.dispatch_call(&request)).await {
            None => return Attempt::Cancelled,
            Some(Ok(sid)) => sid,
            Some(Err(e)) => {
                warn!(index = step.index, error = %e, "Call dispatch failed");
                return Attempt::from_error(e);
            }
        };

        {
            let mut st = self.state.lock().await;
            if step.token.is_cancelled() {
                return Attempt::Cancelled;
            }
            if let Some(active) = st.active.as_mut() {
                active.sid = Some(sid.clone());
            }
        }
        debug!(index = step.index, sid = %sid, "Call dispatched, polling status");

        let poll = step.config.poll_interval();
        let max_poll = step.config.max_poll_duration();
        let started = Instant::now();
        let mut ticker = interval_at(started + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if or_cancelled(&step.token, ticker.tick()).await.is_none() {
                return Attempt::Cancelled;
            }
            if !max_poll.is_zero() && started.elapsed() >= max_poll {
                warn!(index = step.index, sid = %sid, "Gave up polling call status");
                let operation =
                    format!("no final status for call {sid} after {}s", max_poll.as_secs());
                return Attempt::from_error(DialerError::Timeout { operation });
            }
            match or_cancelled(&step.token, self.backend.call_status(&sid)).await {
                None => return Attempt::Cancelled,
                Some(Ok(status)) => {
                    debug!(index = step.index, sid = %sid, %status, "Polled call status");
                    if let Some(outcome) = status.outcome() {
                        return Attempt::Outcome(outcome);
                    }
                }
                Some(Err(e)) => {
                    warn!(index = step.index, sid = %sid, error = %e, "Status poll failed");
                    return Attempt::from_error(e);
                }
            }
        }
    }

    async fn device_call(&self, step: &Step, from: String, bypass_ivr: bool) -> Attempt {
        let Some(device) = self.device.clone() else {
            return Attempt::from_error(DialerError::DeviceNotReady {
                reason: "no voice device configured".to_string(),
            });
        };
        if !device.is_ready() {
            return Attempt::from_error(DialerError::DeviceNotReady {
                reason: "device is no longer registered".to_string(),
            });
        }

        let params = ConnectParams {
            to: step.contact.phone.clone(),
            caller_id: from,
            bypass_ivr,
            ivr: (!bypass_ivr).then(|| IvrScript::from_campaign(&step.campaign)),
        };
        let ConnectionHandle {
            connection,
            mut events,
        } = match or_cancelled(&step.token, device.connect(params)).await {
            None => return Attempt::Cancelled,
            Some(Ok(handle)) => handle,
            Some(Err(e)) => {
                warn!(index = step.index, error = %e, "Device connect failed");
                return Attempt::from_error(e);
            }
        };

        {
            let mut st = self.state.lock().await;
            if step.token.is_cancelled() {
                drop(st);
                connection.disconnect().await;
                return Attempt::Cancelled;
            }
            if let Some(active) = st.active.as_mut() {
                active.connection = Some(connection.clone());
                active.sid = connection.call_sid();
            }
        }

        let tick = step.config.duration_tick();
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut connected_at: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                _ = step.token.cancelled() => {
                    connection.disconnect().await;
                    return Attempt::Cancelled;
                }
                event = events.recv() => {
                    let event = match event {
                        Some(event) => event,
                        None => return Attempt::Outcome(CallOutcome::Failed(
                            "connection closed unexpectedly".to_string(),
                        )),
                    };
                    debug!(index = step.index, %event, "Connection event");
                    match event {
                        ConnectionEvent::Ringing => {}
                        ConnectionEvent::Accepted => {
                            let now = Instant::now();
                            connected_at = Some(now);
                            ticker.reset();
                            let sid = self.mark_connected(step, now, &connection).await;
                            self.events.emit(SequencerEvent::CallConnected {
                                index: step.index,
                                sid,
                            });
                        }
                        ConnectionEvent::Disconnected => {
                            return Attempt::Outcome(CallOutcome::Completed)
                        }
                        ConnectionEvent::Rejected => {
                            return Attempt::Outcome(CallOutcome::Failed("call rejected".into()))
                        }
                        ConnectionEvent::Canceled => {
                            return Attempt::Outcome(CallOutcome::Failed("call canceled".into()))
                        }
                        ConnectionEvent::Error(message) => {
                            return Attempt::Outcome(CallOutcome::Failed(message))
                        }
                    }
                }
                _ = ticker.tick(), if bypass_ivr && connected_at.is_some() => {
                    if let Some(at) = connected_at {
                        self.events.emit(SequencerEvent::DurationTick {
                            index: step.index,
                            elapsed: at.elapsed(),
                        });
                    }
                }
            }
        }
    }

    async fn mark_connected(
        &self,
        step: &Step,
        at: Instant,
        connection: &Arc<dyn VoiceConnection>,
    ) -> Option<CallSid> {
        let mut st = self.state.lock().await;
        if step.token.is_cancelled() {
            return None;
        }
        let active = st.active.as_mut()?;
        active.connected_at = Some(at);
        if active.sid.is_none() {
            active.sid = connection.call_sid();
        }
        active.sid.clone()
    }

    /// Record the attempt's outcome on the current contact
    async fn settle(&self, step: &Step, attempt: Attempt) -> Flow {
        let mut st = self.state.lock().await;
        if step.token.is_cancelled() {
            return Flow::Cancelled;
        }
        st.active = None;

        let (outcome, halt) = match attempt {
            Attempt::Cancelled => return Flow::Cancelled,
            Attempt::Outcome(outcome) => (outcome, None),
            Attempt::Halt(error) => (CallOutcome::Failed(error.to_string()), Some(error)),
        };

        match st.queue.settle_current(&outcome) {
            Ok(contact) => {
                let (id, status) = (contact.id, contact.status.clone());
                info!(index = step.index, contact_id = %id, %status, "Contact settled");
                self.events.contact_status(step.index, id, status);
            }
            Err(e) => {
                self.halt_locked(&mut st, e.to_string());
                return Flow::Stop;
            }
        }

        let tone = match outcome {
            CallOutcome::Completed => Tone::Success,
            CallOutcome::Failed(_) => Tone::Error,
        };
        play_best_effort(self.feedback.as_ref(), tone);

        match halt {
            Some(error) => {
                self.halt_locked(&mut st, error.to_string());
                Flow::Stop
            }
            None => Flow::Delay,
        }
    }

    /// Move past the settled contact once the delay has run out
    async fn advance_after_delay(&self, step: &Step) {
        let mut st = self.state.lock().await;
        if step.token.is_cancelled() {
            return;
        }
        st.step_token = None;
        let index = st.queue.advance();
        debug!(index, "Cursor advanced");
        self.events.emit(SequencerEvent::CursorAdvanced { index });
    }
}

async fn or_cancelled<F: Future>(token: &CancellationToken, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        output = future => Some(output),
    }
}

async fn run_loop(shared: Arc<Shared>, run: CancellationToken) {
    while let Some(step) = shared.begin_step(&run).await {
        play_best_effort(shared.feedback.as_ref(), Tone::Dial);

        let attempt = shared.place_call(&step).await;
        match shared.settle(&step, attempt).await {
            Flow::Delay => {}
            Flow::Stop => break,
            Flow::Cancelled => continue,
        }

        let delay = step.config.call_delay();
        if or_cancelled(&step.token, sleep(delay)).await.is_none() {
            continue;
        }
        shared.advance_after_delay(&step).await;
    }
    debug!("Run loop exited");
}
