use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Node id the hands ship with.
pub const DEFAULT_NODE_ID: u8 = 2;

/// Highest adapter channel number the bench supports.
pub const MAX_CHANNEL_INDEX: u8 = 16;

/// One hand under test: the bus channel it hangs off plus its node id on that bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId {
    pub channel: String,
    pub node_id: u8,
}

impl PortId {
    pub fn new(channel: impl Into<String>, node_id: u8) -> Self {
        Self {
            channel: channel.into(),
            node_id,
        }
    }

    /// Adapter channel number embedded in the channel name (`PCAN_USBBUS3` -> 3).
    pub fn channel_index(&self) -> Result<u8> {
        let digits: String = self
            .channel
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if digits.is_empty() {
            return Err(anyhow!("Channel name '{}' carries no number", self.channel));
        }

        let index: u32 = digits
            .parse()
            .with_context(|| format!("Channel number in '{}' is malformed", self.channel))?;
        if !(1..=MAX_CHANNEL_INDEX as u32).contains(&index) {
            return Err(anyhow!(
                "Invalid channel number {index} in '{}', must be within 1-{MAX_CHANNEL_INDEX}",
                self.channel
            ));
        }
        Ok(index as u8)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.channel, self.node_id)
    }
}

/// Parses `CHANNEL:NODE`; the node id may be omitted and defaults to `DEFAULT_NODE_ID`.
impl FromStr for PortId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (channel, node) = match s.rsplit_once(':') {
            Some((channel, node)) => {
                let node_id = node
                    .trim()
                    .parse::<u8>()
                    .with_context(|| format!("Invalid node id in port spec '{s}'"))?;
                (channel.trim(), node_id)
            }
            None => (s, DEFAULT_NODE_ID),
        };

        if channel.is_empty() {
            return Err(anyhow!("Port spec '{s}' has an empty channel name"));
        }
        Ok(Self::new(channel, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_port_spec() -> Result<()> {
        let port: PortId = "PCAN_USBBUS3:5".parse()?;
        assert_eq!(port, PortId::new("PCAN_USBBUS3", 5));
        assert_eq!(port.to_string(), "PCAN_USBBUS3#5");

        let default_node: PortId = "PCAN_USBBUS1".parse()?;
        assert_eq!(default_node.node_id, DEFAULT_NODE_ID);

        assert!("PCAN_USBBUS1:x".parse::<PortId>().is_err());
        assert!(":2".parse::<PortId>().is_err());
        Ok(())
    }

    #[test]
    fn test_channel_index() {
        assert_eq!(PortId::new("PCAN_USBBUS1", 2).channel_index().unwrap(), 1);
        assert_eq!(PortId::new("PCAN_USBBUS16", 2).channel_index().unwrap(), 16);
        assert!(PortId::new("PCAN_USBBUS17", 2).channel_index().is_err());
        assert!(PortId::new("PCAN_USBBUS0", 2).channel_index().is_err());
        assert!(PortId::new("can", 2).channel_index().is_err());
    }
}
