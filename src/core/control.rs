/// External stop / pause control
///
/// The scheduler polls a `ControlChannel` once per round. Every adapter is
/// fail-open: whatever cannot be read means "keep running".
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// Default control file, relative to the working directory.
pub const DEFAULT_CONTROL_FILE: &str = "shared_data.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSignal {
    #[serde(rename = "stop_test")]
    pub stop: bool,
    #[serde(rename = "pause_test")]
    pub pause: bool,
}

impl ControlSignal {
    pub fn or(self, other: ControlSignal) -> ControlSignal {
        ControlSignal {
            stop: self.stop || other.stop,
            pause: self.pause || other.pause,
        }
    }
}

pub trait ControlChannel: Send + Sync {
    fn poll(&self) -> ControlSignal;
}

/// Reads `{"stop_test": bool, "pause_test": bool}` from a JSON file.
#[derive(Debug, Clone)]
pub struct FileControlChannel {
    path: PathBuf,
}

impl Default for FileControlChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROL_FILE)
    }
}

impl FileControlChannel {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<ControlSignal> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ControlChannel for FileControlChannel {
    fn poll(&self) -> ControlSignal {
        match self.read() {
            Ok(signal) => signal,
            Err(err) => {
                log::debug!("Control file {} unreadable: {err}", self.path.display());
                ControlSignal::default()
            }
        }
    }
}

/// In-process control flags, e.g. flipped from a Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct SharedControl {
    stop: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl SharedControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn set_pause(&self, pause: bool) {
        self.pause.store(pause, Ordering::SeqCst);
    }
}

impl ControlChannel for SharedControl {
    fn poll(&self) -> ControlSignal {
        ControlSignal {
            stop: self.stop.load(Ordering::SeqCst),
            pause: self.pause.load(Ordering::SeqCst),
        }
    }
}

/// Never stops, never pauses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverControl;

impl ControlChannel for NeverControl {
    fn poll(&self) -> ControlSignal {
        ControlSignal::default()
    }
}

/// Stops or pauses when any of its channels says so.
#[derive(Default)]
pub struct AnyControl {
    channels: Vec<Arc<dyn ControlChannel>>,
}

impl AnyControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Arc<dyn ControlChannel>) -> Self {
        self.channels.push(channel);
        self
    }
}

impl ControlChannel for AnyControl {
    fn poll(&self) -> ControlSignal {
        self.channels
            .iter()
            .fold(ControlSignal::default(), |acc, channel| acc.or(channel.poll()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use uuid::Uuid;

    fn temp_control_file(contents: Option<&str>) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("handbench_control_{}.json", Uuid::new_v4()));
        if let Some(contents) = contents {
            std::fs::write(&path, contents)?;
        }
        Ok(path)
    }

    #[test]
    fn test_file_channel_fails_open() -> Result<()> {
        let missing = temp_control_file(None)?;
        assert_eq!(
            FileControlChannel::new(&missing).poll(),
            ControlSignal::default()
        );

        for contents in [
            "not json",
            r#"{"stop_test": true}"#,
            r#"{"stop_test": "yes", "pause_test": false}"#,
        ] {
            let path = temp_control_file(Some(contents))?;
            assert_eq!(
                FileControlChannel::new(&path).poll(),
                ControlSignal::default(),
                "contents: {contents}"
            );
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    #[test]
    fn test_file_channel_reads_flags() -> Result<()> {
        let path = temp_control_file(Some(r#"{"stop_test": false, "pause_test": true}"#))?;
        let signal = FileControlChannel::new(&path).poll();
        std::fs::remove_file(&path)?;
        assert_eq!(
            signal,
            ControlSignal {
                stop: false,
                pause: true
            }
        );
        Ok(())
    }

    #[test]
    fn test_any_control_is_logical_or() {
        let shared = SharedControl::new();
        let any = AnyControl::new()
            .with(Arc::new(NeverControl))
            .with(Arc::new(shared.clone()));
        assert_eq!(any.poll(), ControlSignal::default());

        shared.request_stop();
        assert!(any.poll().stop);
        assert!(!any.poll().pause);
    }
}
