/// In-process CAN bus
///
/// Two connected endpoints backed by flume channels. Whatever one side sends
/// the other side receives, unfiltered, the same way a two-node physical bus
/// would behave. Used to exercise the framed hand link without hardware.
use anyhow::{anyhow, Result};
use flume::{Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use super::{CanBus, CanFrame};

pub struct VirtualCanBus {
    name: String,
    tx: Option<Sender<CanFrame>>,
    rx: Option<Receiver<CanFrame>>,
}

impl VirtualCanBus {
    /// Create two endpoints wired to each other.
    pub fn pair(name: &str) -> (Self, Self) {
        let (a_tx, b_rx) = flume::unbounded();
        let (b_tx, a_rx) = flume::unbounded();
        (
            Self {
                name: format!("{name}/a"),
                tx: Some(a_tx),
                rx: Some(a_rx),
            },
            Self {
                name: format!("{name}/b"),
                tx: Some(b_tx),
                rx: Some(b_rx),
            },
        )
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some()
    }
}

impl CanBus for VirtualCanBus {
    fn send(&mut self, frame: &CanFrame) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("Virtual bus {} is shut down", self.name))?;
        tx.send(*frame)
            .map_err(|_| anyhow!("Virtual bus {} has no peer", self.name))
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<CanFrame>> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| anyhow!("Virtual bus {} is shut down", self.name))?;
        match rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("Virtual bus {} peer disconnected", self.name))
            }
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        self.tx = None;
        self.rx = None;
        Ok(())
    }
}
