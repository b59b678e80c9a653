//! The payload process collaborator.
//!
//! The watchdog never spawns or owns the payload itself — it asks this
//! collaborator for its PID, whether it is still alive, and recent
//! stdout for the peek feature. [`ChildProcessExecutionThread`] is the
//! concrete implementation the binary entry point uses; tests substitute
//! a fake.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use jobwatch_common::process::ProcessError;

/// Number of trailing stdout lines retained for `peek`.
const PEEK_BUFFER_LINES: usize = 200;

/// The payload process collaborator.
pub trait ExecutionThread: Send {
    fn pid(&self) -> u32;
    fn is_alive(&mut self) -> bool;
    /// Recent stdout lines, oldest first. Failure increments the
    /// watchdog's `peekFailCount` (§4.1 "Peek").
    fn recent_output(&self) -> Result<Vec<String>, ProcessError>;
}

/// Spawns the payload via `std::process::Command` and tees stdout into a
/// bounded ring buffer on a background thread.
pub struct ChildProcessExecutionThread {
    child: Child,
    output: Arc<Mutex<VecDeque<String>>>,
    _reader_thread: JoinHandle<()>,
}

impl ChildProcessExecutionThread {
    pub fn spawn(executable: &std::path::Path, args: &[String]) -> std::io::Result<Self> {
        let mut child = Command::new(executable)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let output = Arc::new(Mutex::new(VecDeque::with_capacity(PEEK_BUFFER_LINES)));
        let output_for_thread = Arc::clone(&output);

        let reader_thread = std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                let mut buf = output_for_thread.lock().unwrap();
                if buf.len() == PEEK_BUFFER_LINES {
                    buf.pop_front();
                }
                buf.push_back(line);
            }
        });

        Ok(Self {
            child,
            output,
            _reader_thread: reader_thread,
        })
    }
}

impl ExecutionThread for ChildProcessExecutionThread {
    fn pid(&self) -> u32 {
        self.child.id()
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn recent_output(&self) -> Result<Vec<String>, ProcessError> {
        Ok(self.output.lock().unwrap().iter().cloned().collect())
    }
}
