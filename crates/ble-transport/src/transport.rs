use std::collections::VecDeque;

use ble_frame::{ReassemblyOutcome, ReassemblyState, encode_apdu};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use crate::profile::redact_device_id;
use crate::radio::{Radio, RadioEvent, RadioLink, RadioPeripheral};
use crate::{BleProfile, ConnectionState, Device, TransportConfig, TransportError, TransportResult};

const STATUS_SUCCESS: u16 = 0x9000;

type Reply<T> = oneshot::Sender<TransportResult<T>>;
type LinkOf<R> = <<R as Radio>::Peripheral as RadioPeripheral>::Link;

enum Request {
    StartScanning(Reply<()>),
    StopScanning(Reply<()>),
    DiscoveredDevices(oneshot::Sender<Vec<Device>>),
    Connect { device_id: String, reply: Reply<Device> },
    Disconnect(Reply<()>),
    Exchange {
        apdus: VecDeque<Vec<u8>>,
        reply: Reply<Vec<u8>>,
    },
    LinkInfo(oneshot::Sender<Option<LinkInfo>>),
    Shutdown(Reply<()>),
}

/// The device behind the active link and the MTU used to frame commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub device: Device,
    pub mtu: usize,
}

/// The single outstanding command slot. Success, device error, timeout and
/// disconnect are all just different values passed to `resolve`.
struct PendingExchange {
    reply: Reply<Vec<u8>>,
    remaining: VecDeque<Vec<u8>>,
    deadline: Instant,
}

impl PendingExchange {
    fn resolve(self, result: TransportResult<Vec<u8>>) {
        // The caller may have stopped waiting; nothing else to do then.
        let _ = self.reply.send(result);
    }
}

struct ActiveLink<L> {
    device: Device,
    link: L,
    mtu: usize,
}

/// Handle to the transport actor. Cloning is cheap; every clone talks to the
/// same actor, which serializes all operations.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    requests: mpsc::Sender<Request>,
    state: watch::Receiver<ConnectionState>,
}

impl TransportHandle {
    /// Attaches `radio` and spawns the actor that owns it.
    pub async fn spawn<R: Radio>(
        mut radio: R,
        profile: BleProfile,
        config: TransportConfig,
    ) -> TransportResult<Self> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        radio.attach(event_tx).await?;

        let (request_tx, request_rx) = mpsc::channel(config.request_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = TransportActor {
            radio,
            profile,
            config,
            state: ConnectionState::Disconnected,
            state_tx,
            requests: request_rx,
            events: event_rx,
            discovered: Vec::new(),
            scan_deadline: None,
            active: None,
            pending: None,
            reassembly: ReassemblyState::new(),
        };
        tokio::spawn(actor.run());

        Ok(Self {
            requests: request_tx,
            state: state_rx,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every committed state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Starts discovery; returns once the radio is scanning. Scanning stops by
    /// itself after the configured duration.
    pub async fn start_scanning(&self) -> TransportResult<()> {
        self.call(Request::StartScanning).await?
    }

    pub async fn stop_scanning(&self) -> TransportResult<()> {
        self.call(Request::StopScanning).await?
    }

    pub async fn discovered_devices(&self) -> TransportResult<Vec<Device>> {
        self.call(Request::DiscoveredDevices).await
    }

    pub async fn connect(&self, device_id: impl Into<String>) -> TransportResult<Device> {
        let device_id = device_id.into();
        self.call(|reply| Request::Connect { device_id, reply })
            .await?
    }

    pub async fn disconnect(&self) -> TransportResult<()> {
        self.call(Request::Disconnect).await?
    }

    pub async fn link_info(&self) -> TransportResult<Option<LinkInfo>> {
        self.call(Request::LinkInfo).await
    }

    /// Disconnects and stops the actor. Every handle fails with
    /// [`TransportError::Stopped`] afterwards.
    pub async fn shutdown(&self) -> TransportResult<()> {
        self.call(Request::Shutdown).await?
    }

    /// Sends one command and waits for its complete response.
    pub async fn send_command(&self, apdu: Vec<u8>) -> TransportResult<Vec<u8>> {
        self.send_command_sequence(vec![apdu]).await
    }

    /// Sends `apdus` in order as one exchange and returns the last response.
    ///
    /// An intermediate response made only of a non-success status word ends
    /// the exchange with [`TransportError::Apdu`].
    pub async fn send_command_sequence(&self, apdus: Vec<Vec<u8>>) -> TransportResult<Vec<u8>> {
        if apdus.is_empty() {
            return Err(TransportError::EmptySequence);
        }
        self.call(|reply| Request::Exchange {
            apdus: apdus.into(),
            reply,
        })
        .await?
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> TransportResult<T> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(build(tx))
            .await
            .map_err(|_| TransportError::Stopped)?;
        rx.await.map_err(|_| TransportError::Stopped)
    }
}

struct TransportActor<R: Radio> {
    radio: R,
    profile: BleProfile,
    config: TransportConfig,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    requests: mpsc::Receiver<Request>,
    events: mpsc::UnboundedReceiver<RadioEvent>,
    discovered: Vec<Device>,
    scan_deadline: Option<Instant>,
    active: Option<ActiveLink<LinkOf<R>>>,
    pending: Option<PendingExchange>,
    reassembly: ReassemblyState,
}

impl<R: Radio> TransportActor<R> {
    async fn run(mut self) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                // Radio events first so requests always see fresh state.
                biased;
                Some(event) = self.events.recv() => self.handle_event(event).await,
                _ = sleep_until(deadline) => self.handle_deadline().await,
                request = self.requests.recv() => match request {
                    Some(Request::Shutdown(reply)) => {
                        let _ = reply.send(self.disconnect().await);
                        break;
                    }
                    Some(request) => self.handle_request(request).await,
                    None => break,
                },
            }
        }

        debug!("BLE transport shutting down");
        if let Some(mut active) = self.active.take() {
            if let Err(err) = active.link.disconnect().await {
                warn!(error = %err, "BLE disconnect on shutdown failed");
            }
        }
        self.fail_pending(TransportError::Stopped);
    }

    fn next_deadline(&self) -> Option<Instant> {
        let pending = self.pending.as_ref().map(|pending| pending.deadline);
        match (pending, self.scan_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::StartScanning(reply) => {
                let _ = reply.send(self.start_scanning().await);
            }
            Request::StopScanning(reply) => {
                let _ = reply.send(self.stop_scanning().await);
            }
            Request::DiscoveredDevices(reply) => {
                let _ = reply.send(self.discovered.clone());
            }
            Request::Connect { device_id, reply } => {
                let _ = reply.send(self.connect(device_id).await);
            }
            Request::Disconnect(reply) => {
                let _ = reply.send(self.disconnect().await);
            }
            Request::Exchange { apdus, reply } => self.begin_exchange(apdus, reply).await,
            Request::LinkInfo(reply) => {
                let info = self.active.as_ref().map(|active| LinkInfo {
                    device: active.device.clone(),
                    mtu: active.mtu,
                });
                let _ = reply.send(info);
            }
            Request::Shutdown(reply) => {
                let _ = reply.send(Err(TransportError::Stopped));
            }
        }
    }

    async fn handle_event(&mut self, event: RadioEvent) {
        match event {
            RadioEvent::Discovered(device) => self.on_discovered(device),
            RadioEvent::Notification { device_id, value } => {
                self.on_notification(&device_id, value).await
            }
            RadioEvent::Disconnected { device_id } => self.on_disconnected(&device_id).await,
            RadioEvent::PoweredOff => {
                warn!(state = ?self.state, "BLE radio powered off");
                self.drop_link();
            }
        }
    }

    async fn handle_deadline(&mut self) {
        let now = Instant::now();
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.deadline <= now)
        {
            warn!(
                timeout_secs = self.config.command_timeout.as_secs(),
                "BLE command timed out"
            );
            self.reassembly.reset();
            self.fail_pending(TransportError::Timeout);
        }
        if self.scan_deadline.is_some_and(|deadline| deadline <= now) {
            info!("BLE scan reached its time limit");
            if let Err(err) = self.finish_scan().await {
                warn!(error = %err, "BLE stop scan failed");
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) -> TransportResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(TransportError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        info!(from = ?self.state, to = ?next, "BLE transport state changed");
        self.state = next;
        self.state_tx.send_replace(next);
        Ok(())
    }

    async fn start_scanning(&mut self) -> TransportResult<()> {
        match self.state {
            ConnectionState::Scanning => return Ok(()),
            ConnectionState::Disconnected => {}
            other => {
                return Err(TransportError::InvalidState {
                    from: other,
                    to: ConnectionState::Scanning,
                });
            }
        }

        self.discovered.clear();
        self.radio.start_scan(&self.profile).await?;
        self.transition(ConnectionState::Scanning)?;
        self.scan_deadline = Some(Instant::now() + self.config.scan_duration);
        debug!(
            profile = self.profile.id,
            duration_secs = self.config.scan_duration.as_secs(),
            "BLE scan started"
        );
        Ok(())
    }

    async fn stop_scanning(&mut self) -> TransportResult<()> {
        if self.state == ConnectionState::Scanning {
            self.finish_scan().await?;
        }
        Ok(())
    }

    /// Leaves `Scanning` even when the radio fails to stop cleanly.
    async fn finish_scan(&mut self) -> TransportResult<()> {
        self.scan_deadline = None;
        let result = self.radio.stop_scan().await;
        if self.state == ConnectionState::Scanning {
            self.transition(ConnectionState::Disconnected)?;
        }
        result.map_err(Into::into)
    }

    fn on_discovered(&mut self, device: Device) {
        if self.state != ConnectionState::Scanning {
            debug!(
                device_id = %redact_device_id(&device.id),
                "ignoring advertisement outside of scan"
            );
            return;
        }
        match self.discovered.iter_mut().find(|known| known.id == device.id) {
            Some(known) => known.refresh(&device),
            None => {
                debug!(
                    device_id = %redact_device_id(&device.id),
                    name = device.display_name(),
                    model = ?device.model,
                    rssi = ?device.rssi,
                    "BLE device discovered"
                );
                self.discovered.push(device);
            }
        }
    }

    async fn connect(&mut self, device_id: String) -> TransportResult<Device> {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Scanning => {
                if let Err(err) = self.finish_scan().await {
                    warn!(error = %err, "BLE stop scan before connect failed");
                }
            }
            ConnectionState::Connected if self.is_active(&device_id) => {
                if let Some(active) = &self.active {
                    return Ok(active.device.clone());
                }
            }
            other => {
                return Err(TransportError::InvalidState {
                    from: other,
                    to: ConnectionState::Connecting,
                });
            }
        }

        let device = self
            .discovered
            .iter()
            .find(|known| known.id == device_id)
            .cloned()
            .unwrap_or_else(|| Device::new(device_id.clone(), None, None));

        self.transition(ConnectionState::Connecting)?;
        let deadline = Instant::now() + self.config.connect_timeout;
        match self.establish(&device, deadline).await {
            Ok(active) => {
                info!(
                    device_id = %redact_device_id(&device.id),
                    mtu = active.mtu,
                    "BLE link ready"
                );
                self.active = Some(active);
                self.reassembly.reset();
                self.transition(ConnectionState::Connected)?;
                Ok(device)
            }
            Err(err) => {
                warn!(
                    device_id = %redact_device_id(&device.id),
                    error = %err,
                    "BLE connect failed"
                );
                if self.state != ConnectionState::Disconnected {
                    self.transition(ConnectionState::Disconnected)?;
                }
                Err(err)
            }
        }
    }

    async fn establish(
        &mut self,
        device: &Device,
        deadline: Instant,
    ) -> TransportResult<ActiveLink<LinkOf<R>>> {
        let peripheral = time::timeout_at(deadline, self.radio.connect(&device.id))
            .await
            .map_err(|_| TransportError::Timeout)??;

        self.transition(ConnectionState::DiscoveringCapabilities)?;
        let link = time::timeout_at(deadline, peripheral.discover(&self.profile))
            .await
            .map_err(|_| TransportError::Timeout)??;

        let reported = link.mtu();
        let mtu = reported
            .unwrap_or(usize::from(self.profile.mtu_hint))
            .min(self.config.max_mtu);
        debug!(reported_mtu = ?reported, mtu, "BLE link MTU selected");

        Ok(ActiveLink {
            device: device.clone(),
            link,
            mtu,
        })
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        match self.state {
            ConnectionState::Disconnected => Ok(()),
            ConnectionState::Scanning => self.finish_scan().await,
            ConnectionState::Connected => {
                self.transition(ConnectionState::Disconnecting)?;
                self.fail_pending(TransportError::Disconnected);
                self.reassembly.reset();
                let result = match self.active.take() {
                    Some(mut active) => active.link.disconnect().await.map_err(Into::into),
                    None => Ok(()),
                };
                self.transition(ConnectionState::Disconnected)?;
                result
            }
            other => Err(TransportError::InvalidState {
                from: other,
                to: ConnectionState::Disconnecting,
            }),
        }
    }

    async fn on_disconnected(&mut self, device_id: &str) {
        let Some(active) = self.active.as_ref().filter(|active| active.device.id == device_id)
        else {
            debug!(
                device_id = %redact_device_id(device_id),
                "ignoring disconnect of inactive device"
            );
            return;
        };
        // The event may belong to an earlier link to the same device.
        if matches!(active.link.is_connected().await, Ok(true)) {
            debug!(
                device_id = %redact_device_id(device_id),
                "ignoring stale disconnect, link is still up"
            );
            return;
        }
        warn!(
            device_id = %redact_device_id(device_id),
            "BLE link dropped by radio"
        );
        self.drop_link();
    }

    /// Radio-initiated teardown: the link is already gone.
    fn drop_link(&mut self) {
        self.fail_pending(TransportError::Disconnected);
        self.reassembly.reset();
        self.active = None;
        self.scan_deadline = None;
        if self.state != ConnectionState::Disconnected {
            // Every state may drop to Disconnected.
            let _ = self.transition(ConnectionState::Disconnected);
        }
    }

    fn is_active(&self, device_id: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.device.id == device_id)
    }

    fn fail_pending(&mut self, err: TransportError) {
        if let Some(pending) = self.pending.take() {
            pending.resolve(Err(err));
        }
    }

    async fn begin_exchange(&mut self, mut apdus: VecDeque<Vec<u8>>, reply: Reply<Vec<u8>>) {
        if self.state != ConnectionState::Connected {
            let _ = reply.send(Err(TransportError::NotConnected));
            return;
        }
        if self.pending.is_some() {
            let _ = reply.send(Err(TransportError::Busy));
            return;
        }
        let Some(first) = apdus.pop_front() else {
            let _ = reply.send(Err(TransportError::EmptySequence));
            return;
        };

        self.reassembly.reset();
        match self.write_apdu(&first).await {
            Ok(()) => {
                self.pending = Some(PendingExchange {
                    reply,
                    remaining: apdus,
                    deadline: Instant::now() + self.config.command_timeout,
                });
            }
            Err(err) => {
                let _ = reply.send(Err(err));
            }
        }
    }

    async fn write_apdu(&mut self, apdu: &[u8]) -> TransportResult<()> {
        let timeout = self.config.command_timeout;
        let active = self.active.as_mut().ok_or(TransportError::NotConnected)?;
        let frames = encode_apdu(apdu, active.mtu)?;
        debug!(
            apdu_len = apdu.len(),
            frames = frames.len(),
            mtu = active.mtu,
            "BLE sending command"
        );
        for frame in frames {
            time::timeout(timeout, active.link.write(&frame))
                .await
                .map_err(|_| TransportError::Timeout)??;
        }
        Ok(())
    }

    async fn on_notification(&mut self, device_id: &str, value: Vec<u8>) {
        if !self.is_active(device_id) {
            debug!(
                device_id = %redact_device_id(device_id),
                "ignoring notification from inactive device"
            );
            return;
        }
        if self.pending.is_none() {
            warn!(bytes = value.len(), "dropping unsolicited BLE notification");
            return;
        }

        match self.reassembly.push(&value) {
            Ok(ReassemblyOutcome::Incomplete) => {
                debug!(bytes = value.len(), "BLE response frame buffered");
            }
            Ok(ReassemblyOutcome::Complete(response)) => self.on_response(response).await,
            Err(err) => {
                warn!(error = %err, "BLE response framing failed");
                self.fail_pending(err.into());
            }
        }
    }

    async fn on_response(&mut self, response: Vec<u8>) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        debug!(bytes = response.len(), "BLE response complete");

        let Some(next) = pending.remaining.pop_front() else {
            pending.resolve(Ok(response));
            return;
        };
        if let Some(status) = bare_failure_status(&response) {
            debug!(status = format_args!("0x{status:04X}"), "BLE sequence aborted by device");
            pending.resolve(Err(TransportError::Apdu(status)));
            return;
        }

        match self.write_apdu(&next).await {
            Ok(()) => {
                pending.deadline = Instant::now() + self.config.command_timeout;
                self.pending = Some(pending);
            }
            Err(err) => pending.resolve(Err(err)),
        }
    }
}

fn bare_failure_status(response: &[u8]) -> Option<u16> {
    match response {
        [hi, lo] => {
            let status = u16::from_be_bytes([*hi, *lo]);
            (status != STATUS_SUCCESS).then_some(status)
        }
        _ => None,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
