//! Process liveness probing.
//!
//! The handle only ever asks one question of the process: has it exited
//! yet? Keeping that behind a trait lets tests drive crashes without
//! spawning anything.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use tokio::process::Child;

/// How an engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineExit {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

/// Non-blocking liveness check for an engine process.
pub trait ProcessProbe: Send {
    /// `Ok(Some(exit))` once the process has exited, `Ok(None)` while it runs.
    fn try_exit(&mut self) -> io::Result<Option<EngineExit>>;
}

impl ProcessProbe for Child {
    fn try_exit(&mut self) -> io::Result<Option<EngineExit>> {
        Ok(self.try_wait()?.map(|status| EngineExit {
            code: status.code(),
        }))
    }
}

/// A probe whose verdict is set by hand.
///
/// Cloning shares the state, so a test keeps one clone and hands the
/// other to the `EngineHandle`.
#[derive(Debug, Clone, Default)]
pub struct ManualProbe {
    exited: Arc<AtomicBool>,
    code: Arc<AtomicI32>,
}

impl ManualProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the process as exited with `code`.
    pub fn exit(&self, code: i32) {
        self.code.store(code, Ordering::SeqCst);
        self.exited.store(true, Ordering::SeqCst);
    }
}

impl ProcessProbe for ManualProbe {
    fn try_exit(&mut self) -> io::Result<Option<EngineExit>> {
        if self.exited.load(Ordering::SeqCst) {
            Ok(Some(EngineExit {
                code: Some(self.code.load(Ordering::SeqCst)),
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_probe_reports_exit_through_clones() {
        let probe = ManualProbe::new();
        let mut handed_out = probe.clone();

        assert_eq!(handed_out.try_exit().unwrap(), None);
        probe.exit(3);
        assert_eq!(
            handed_out.try_exit().unwrap(),
            Some(EngineExit { code: Some(3) })
        );
    }
}
