/// Hand link carried over a CAN bus
///
/// The byte encoding of hand commands is owned by the firmware vendor and is
/// plugged in through `HandProtocol`. This module glues such a codec onto a
/// `CanBus`: requests are encoded, split into frames for the hand's node id,
/// and the answer is reassembled from frames addressed to the controller.
/// Responses that do not answer the pending request, such as late replies to
/// a request that already timed out, are dropped.
/// A request that is not answered within the command timeout yields
/// `HAND_RESP_TIMEOUT` instead of blocking the worker.
use anyhow::{anyhow, Result};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use super::traits::{
    FingerPosition, HandDriver, HandLink, Reply, StatusCode, DEFAULT_COMMAND_TIMEOUT_MS,
    HAND_RESP_SUCCESS, HAND_RESP_TIMEOUT,
};
use crate::{
    core::port::PortId,
    protocol::can::{
        split_into_frames, CanBus, InboundFilter, SlcanBus, ADDRESS_MASTER, DEFAULT_BITRATE,
        RECV_POLL_TIMEOUT,
    },
};

/// Requests the test engine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandRequest {
    SetFingerPos {
        node_id: u8,
        finger_id: u8,
        position: u16,
        speed: u16,
    },
    GetFingerPos {
        node_id: u8,
        finger_id: u8,
    },
    GetFingerCurrent {
        node_id: u8,
        finger_id: u8,
    },
    SetFingerCurrentLimit {
        node_id: u8,
        finger_id: u8,
        limit_ma: u16,
    },
}

impl HandRequest {
    pub fn finger_id(&self) -> u8 {
        match *self {
            HandRequest::SetFingerPos { finger_id, .. }
            | HandRequest::GetFingerPos { finger_id, .. }
            | HandRequest::GetFingerCurrent { finger_id, .. }
            | HandRequest::SetFingerCurrentLimit { finger_id, .. } => finger_id,
        }
    }
}

/// Decoded answers, tagged with the finger they concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandResponse {
    Status {
        finger_id: u8,
        status: StatusCode,
    },
    Position {
        finger_id: u8,
        reply: Reply<FingerPosition>,
    },
    Current {
        finger_id: u8,
        reply: Reply<u16>,
    },
}

impl HandResponse {
    pub fn finger_id(&self) -> u8 {
        match *self {
            HandResponse::Status { finger_id, .. }
            | HandResponse::Position { finger_id, .. }
            | HandResponse::Current { finger_id, .. } => finger_id,
        }
    }

    /// Whether this response can be the answer to `request`.
    ///
    /// The finger must match and so must the kind of answer, except that an
    /// error status may answer any request.
    pub fn answers(&self, request: &HandRequest) -> bool {
        if self.finger_id() != request.finger_id() {
            return false;
        }
        match (self, request) {
            (HandResponse::Status { status, .. }, _) if *status != HAND_RESP_SUCCESS => true,
            (
                HandResponse::Status { .. },
                HandRequest::SetFingerPos { .. } | HandRequest::SetFingerCurrentLimit { .. },
            ) => true,
            (HandResponse::Position { .. }, HandRequest::GetFingerPos { .. }) => true,
            (HandResponse::Current { .. }, HandRequest::GetFingerCurrent { .. }) => true,
            _ => false,
        }
    }
}

/// Vendor command codec.
pub trait HandProtocol: Send {
    /// Encode a request into the bytes to put on the wire.
    fn encode(&mut self, request: &HandRequest) -> Vec<u8>;

    /// Feed one received byte; returns a response once one is complete.
    fn on_byte(&mut self, byte: u8) -> Option<HandResponse>;

    /// Drop any partially received response.
    fn reset(&mut self) {}

    /// Whether `response` answers `request`. Codecs whose wire format carries
    /// more identity (sequence numbers, command echo) can tighten this.
    fn answers(&self, request: &HandRequest, response: &HandResponse) -> bool {
        response.answers(request)
    }
}

/// Upper bound on frames discarded before a request is sent.
const MAX_DRAINED_FRAMES: usize = 256;

/// `HandLink` over any `CanBus` with a pluggable codec.
pub struct CanHandLink<B: CanBus> {
    bus: Option<B>,
    protocol: Box<dyn HandProtocol>,
    device_id: u32,
    filter: InboundFilter,
    timeout: Duration,
}

impl<B: CanBus> CanHandLink<B> {
    pub fn new(bus: B, protocol: Box<dyn HandProtocol>, node_id: u8) -> Self {
        Self {
            bus: Some(bus),
            protocol,
            device_id: node_id as u32,
            filter: InboundFilter::new(ADDRESS_MASTER),
            timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS as u64),
        }
    }

    /// Send one request and wait for its answer.
    ///
    /// Frames already queued on the bus belong to earlier, timed out requests
    /// and are dropped before sending. Complete responses that do not answer
    /// this request are discarded while waiting. `None` covers every way the
    /// exchange can go wrong: bus closed, send failure, receive failure or
    /// timeout.
    fn transact(&mut self, request: HandRequest) -> Option<HandResponse> {
        let Self {
            bus,
            protocol,
            device_id,
            filter,
            timeout,
        } = self;
        let bus = bus.as_mut()?;

        let mut drained = 0;
        while drained < MAX_DRAINED_FRAMES {
            match bus.recv(Duration::ZERO) {
                Ok(Some(_)) => drained += 1,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("CAN receive failed for {request:?}: {err}");
                    return None;
                }
            }
        }
        if drained > 0 {
            log::debug!("Dropped {drained} stale frame(s) before {request:?}");
        }
        protocol.reset();

        let frames = match split_into_frames(*device_id, &protocol.encode(&request)) {
            Ok(frames) => frames,
            Err(err) => {
                log::warn!("Cannot frame {request:?}: {err}");
                return None;
            }
        };
        for frame in &frames {
            if let Err(err) = bus.send(frame) {
                log::warn!("CAN send failed for {request:?}: {err}");
                return None;
            }
        }

        let deadline = Instant::now() + *timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                log::warn!("No answer to {request:?} within {timeout:?}");
                return None;
            }

            match bus.recv(RECV_POLL_TIMEOUT.min(deadline - now)) {
                Ok(Some(frame)) => {
                    let mut answer = None;
                    filter.deliver(&frame, |byte| {
                        if answer.is_some() {
                            return;
                        }
                        if let Some(response) = protocol.on_byte(byte) {
                            if protocol.answers(&request, &response) {
                                answer = Some(response);
                            } else {
                                log::debug!("Discarding {response:?} while waiting on {request:?}");
                            }
                        }
                    });
                    if answer.is_some() {
                        return answer;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    log::warn!("CAN receive failed for {request:?}: {err}");
                    return None;
                }
            }
        }
    }

    fn transact_status(&mut self, request: HandRequest) -> StatusCode {
        match self.transact(request) {
            Some(HandResponse::Status { status, .. }) => status,
            Some(other) => {
                log::warn!("Unexpected answer {other:?} to {request:?}");
                HAND_RESP_TIMEOUT
            }
            None => HAND_RESP_TIMEOUT,
        }
    }
}

impl<B: CanBus> HandLink for CanHandLink<B> {
    fn set_command_timeout(&mut self, timeout_ms: u16) -> StatusCode {
        self.timeout = Duration::from_millis(timeout_ms as u64);
        HAND_RESP_SUCCESS
    }

    fn set_finger_pos(
        &mut self,
        node_id: u8,
        finger_id: u8,
        position: u16,
        speed: u16,
    ) -> StatusCode {
        self.transact_status(HandRequest::SetFingerPos {
            node_id,
            finger_id,
            position,
            speed,
        })
    }

    fn get_finger_pos(&mut self, node_id: u8, finger_id: u8) -> Reply<FingerPosition> {
        match self.transact(HandRequest::GetFingerPos { node_id, finger_id }) {
            Some(HandResponse::Position { reply, .. }) => reply,
            Some(HandResponse::Status { status, .. }) => {
                Reply::failure(status, FingerPosition::default())
            }
            _ => Reply::failure(HAND_RESP_TIMEOUT, FingerPosition::default()),
        }
    }

    fn get_finger_current(&mut self, node_id: u8, finger_id: u8) -> Reply<u16> {
        match self.transact(HandRequest::GetFingerCurrent { node_id, finger_id }) {
            Some(HandResponse::Current { reply, .. }) => reply,
            Some(HandResponse::Status { status, .. }) => Reply::failure(status, 0),
            _ => Reply::failure(HAND_RESP_TIMEOUT, 0),
        }
    }

    fn set_finger_current_limit(
        &mut self,
        node_id: u8,
        finger_id: u8,
        limit_ma: u16,
    ) -> StatusCode {
        self.transact_status(HandRequest::SetFingerCurrentLimit {
            node_id,
            finger_id,
            limit_ma,
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        match self.bus.take() {
            Some(mut bus) => bus.shutdown(),
            None => Ok(()),
        }
    }
}

/// Builds a fresh codec for every connection.
pub type ProtocolFactory = Arc<dyn Fn() -> Box<dyn HandProtocol> + Send + Sync>;

/// Driver for hands reached through slcan dongles.
///
/// Each port channel (for example `PCAN_USBBUS1`) is mapped onto the serial
/// device of the dongle serving it.
pub struct CanHandDriver {
    bitrate: u32,
    devices: HashMap<String, String>,
    protocol: ProtocolFactory,
}

impl CanHandDriver {
    pub fn new(protocol: ProtocolFactory) -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            devices: HashMap::new(),
            protocol,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Route `channel` to the serial device at `path`.
    pub fn with_device(mut self, channel: &str, path: &str) -> Self {
        self.devices.insert(channel.to_string(), path.to_string());
        self
    }
}

impl HandDriver for CanHandDriver {
    fn connect(&self, port: &PortId) -> Result<Box<dyn HandLink>> {
        port.channel_index()?;
        let path = self
            .devices
            .get(&port.channel)
            .ok_or_else(|| anyhow!("No CAN adapter device configured for {}", port.channel))?;

        let bus = SlcanBus::open(path, self.bitrate)?;
        Ok(Box::new(CanHandLink::new(
            bus,
            (self.protocol)(),
            port.node_id,
        )))
    }
}
