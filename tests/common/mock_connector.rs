//! Connector that plays back a fixed script instead of opening sockets.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use kronos_lib::channel::{Connection, Connector, TransportError};

/// What one connect attempt does.
pub enum Step {
    /// Fail the attempt with a connection error.
    Refuse(&'static str),
    /// Open, deliver these frames in order, then report the peer closed.
    Deliver(Vec<String>),
}

pub struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    attempts: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Deliver(frames)) => Ok(Box::new(ScriptedConnection {
                frames: frames.into(),
            })),
            Some(Step::Refuse(reason)) => Err(TransportError::Connection(reason.to_string())),
            None => Err(TransportError::Connection("script exhausted".to_string())),
        }
    }
}

struct ScriptedConnection {
    frames: VecDeque<String>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send_text(&mut self, _text: String) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        self.frames.pop_front().map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}
