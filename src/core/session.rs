/// Device session: one port, one connection, released on every exit path
///
/// A session walks `Disconnected -> Connected -> Configured -> Disconnected`.
/// `close()` may be called any number of times; dropping a session that is
/// still open closes it, so an early return or a panic in the middle of a
/// gesture never leaks the bus handle.
use crate::{
    api::hand::{HandDriver, HandError, HandLink, HAND_RESP_SUCCESS},
    core::port::PortId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Configured,
}

pub struct DeviceSession {
    port: PortId,
    link: Option<Box<dyn HandLink>>,
    state: SessionState,
}

impl DeviceSession {
    /// Connect to the hand behind `port`.
    pub fn open(driver: &dyn HandDriver, port: &PortId) -> Result<Self, HandError> {
        let link = driver.connect(port).map_err(|err| HandError::Connection {
            port: port.to_string(),
            reason: format!("{err:#}"),
        })?;
        log::debug!("[port = {port}] connected");

        Ok(Self {
            port: port.clone(),
            link: Some(link),
            state: SessionState::Connected,
        })
    }

    /// Apply the command timeout. A refusal counts as a connection failure.
    pub fn configure(&mut self, timeout_ms: u16) -> Result<(), HandError> {
        let port = self.port.to_string();
        let status = self.link()?.set_command_timeout(timeout_ms);
        if status != HAND_RESP_SUCCESS {
            return Err(HandError::Connection {
                port,
                reason: format!("setting command timeout failed with status {status}"),
            });
        }
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Release the device handle. Errors are logged, never returned.
    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            match link.shutdown() {
                Ok(()) => log::info!("[port = {}] API shutdown successfully", self.port),
                Err(err) => log::error!("[port = {}] Error during API shutdown: {err}", self.port),
            }
        }
        self.state = SessionState::Disconnected;
    }

    pub fn port(&self) -> &PortId {
        &self.port
    }

    pub fn node_id(&self) -> u8 {
        self.port.node_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The live link, or `SessionClosed` once the session has been closed.
    pub fn link(&mut self) -> Result<&mut dyn HandLink, HandError> {
        match self.link.as_mut() {
            Some(link) => Ok(link.as_mut()),
            None => Err(HandError::SessionClosed {
                port: self.port.to_string(),
            }),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}
