//! Scripted collaborators for sequencer tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};

use dialer_core::{
    CallSid, CampaignBackend, ConnectParams, ConnectionEvent, ConnectionHandle, DialerError,
    DialerResult, FromNumber, IvrCallRequest, RedirectRequest, RemoteCallStatus, SequencerEvent,
    VoiceConnection, VoiceDevice,
};

/// What the backend does with the next dispatched call
#[derive(Debug, Clone)]
pub enum CallScript {
    /// Successive status poll results; the last one repeats
    Statuses(Vec<RemoteCallStatus>),
    /// Dispatch fails
    DispatchError(DialerError),
}

#[derive(Default)]
pub struct MockBackend {
    scripts: Mutex<VecDeque<CallScript>>,
    statuses: Mutex<HashMap<String, VecDeque<RemoteCallStatus>>>,
    pub dispatched: Mutex<Vec<IvrCallRequest>>,
    pub redirects: Mutex<Vec<(CallSid, RedirectRequest)>>,
    redirect_error: Mutex<Option<DialerError>>,
    next_sid: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_scripts(scripts: Vec<CallScript>) -> Arc<Self> {
        let backend = Self::default();
        *backend.scripts.lock().unwrap() = scripts.into();
        Arc::new(backend)
    }

    pub fn fail_redirects(&self, error: DialerError) {
        *self.redirect_error.lock().unwrap() = Some(error);
    }

    pub fn dispatched_numbers(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().iter().map(|r| r.to.clone()).collect()
    }
}

#[async_trait]
impl CampaignBackend for MockBackend {
    async fn dispatch_call(&self, request: &IvrCallRequest) -> DialerResult<CallSid> {
        self.dispatched.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(CallScript::Statuses(vec![RemoteCallStatus::Completed]));
        match script {
            CallScript::DispatchError(error) => Err(error),
            CallScript::Statuses(statuses) => {
                let sid = format!("CA{:04}", self.next_sid.fetch_add(1, Ordering::SeqCst));
                self.statuses.lock().unwrap().insert(sid.clone(), statuses.into());
                Ok(CallSid(sid))
            }
        }
    }

    async fn call_status(&self, sid: &CallSid) -> DialerResult<RemoteCallStatus> {
        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses
            .get_mut(sid.as_str())
            .ok_or_else(|| DialerError::Backend {
                status: 404,
                message: format!("unknown call {sid}"),
            })?;
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(status.unwrap_or(RemoteCallStatus::Completed))
    }

    async fn redirect_call(&self, sid: &CallSid, request: &RedirectRequest) -> DialerResult<()> {
        if let Some(error) = self.redirect_error.lock().unwrap().clone() {
            return Err(error);
        }
        self.redirects.lock().unwrap().push((sid.clone(), request.clone()));
        Ok(())
    }

    async fn list_from_numbers(&self) -> DialerResult<Vec<FromNumber>> {
        Ok(vec![FromNumber {
            number: "+15550001111".to_string(),
            label: Some("Main".to_string()),
        }])
    }
}

pub struct MockConnection {
    sid: CallSid,
    disconnected: AtomicBool,
    // Keeps the event channel open for calls that never end on their own
    held: Mutex<Option<mpsc::UnboundedSender<ConnectionEvent>>>,
}

impl MockConnection {
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for MockConnection {
    fn call_sid(&self) -> Option<CallSid> {
        Some(self.sid.clone())
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
        self.held.lock().unwrap().take();
    }
}

/// What the device does with the next connection
#[derive(Debug, Clone)]
pub enum DeviceScript {
    /// Events sent after the given delays (relative to the previous event)
    Events(Vec<(Duration, ConnectionEvent)>),
    /// Rings, is answered, and stays up until disconnected
    Hold,
    /// Connect itself fails
    ConnectError(DialerError),
}

impl DeviceScript {
    pub fn answered_for(duration: Duration) -> Self {
        DeviceScript::Events(vec![
            (Duration::ZERO, ConnectionEvent::Ringing),
            (Duration::ZERO, ConnectionEvent::Accepted),
            (duration, ConnectionEvent::Disconnected),
        ])
    }
}

pub struct MockDevice {
    ready: AtomicBool,
    scripts: Mutex<VecDeque<DeviceScript>>,
    pub params: Mutex<Vec<ConnectParams>>,
    pub connections: Mutex<Vec<Arc<MockConnection>>>,
}

impl MockDevice {
    pub fn new(ready: bool, scripts: Vec<DeviceScript>) -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(ready),
            scripts: Mutex::new(scripts.into()),
            params: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn connection(&self, n: usize) -> Arc<MockConnection> {
        self.connections.lock().unwrap()[n].clone()
    }

    pub fn connect_count(&self) -> usize {
        self.params.lock().unwrap().len()
    }
}

#[async_trait]
impl VoiceDevice for MockDevice {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn connect(&self, params: ConnectParams) -> DialerResult<ConnectionHandle> {
        let n = {
            let mut all = self.params.lock().unwrap();
            all.push(params);
            all.len()
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| DeviceScript::answered_for(Duration::from_secs(5)));

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Arc::new(MockConnection {
            sid: CallSid(format!("CA-dev-{n}")),
            disconnected: AtomicBool::new(false),
            held: Mutex::new(None),
        });

        match script {
            DeviceScript::ConnectError(error) => return Err(error),
            DeviceScript::Hold => {
                let _ = tx.send(ConnectionEvent::Ringing);
                let _ = tx.send(ConnectionEvent::Accepted);
                *connection.held.lock().unwrap() = Some(tx);
            }
            DeviceScript::Events(steps) => {
                tokio::spawn(async move {
                    for (delay, event) in steps {
                        sleep(delay).await;
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                });
            }
        }

        self.connections.lock().unwrap().push(connection.clone());
        Ok(ConnectionHandle {
            connection,
            events: rx,
        })
    }
}

pub const CONTACTS_CSV: &str = "\
Name,Phone Number
Ada Lovelace,(555) 123-4567
Grace Hopper,555.987.6543
Alan Turing,+44 20 7946 0000
";

/// Receive events until one matches
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<SequencerEvent>, matches: F) -> SequencerEvent
where
    F: Fn(&SequencerEvent) -> bool,
{
    timeout(Duration::from_secs(3600), async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for sequencer event")
}
