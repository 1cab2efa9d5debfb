//! Scripted in-memory links for worker tests.

use std::{
    collections::VecDeque,
    marker::PhantomData,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use futures::StreamExt;

use super::{Notifications, NotifyLink, Open, RecordLink};
use crate::error::{Error, Result};

/// One scripted response to a serial request.
#[derive(Debug, Clone)]
pub enum Reply {
    Line(String),
    Timeout,
    IoError,
    Closed,
}

/// Serial link that answers from a script, then blocks forever.
pub struct ScriptedSerial {
    replies: VecDeque<Reply>,
    triggers: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedSerial {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            triggers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn lines<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(lines.into_iter().map(|l| Reply::Line(l.into())))
    }

    /// Trigger bytes written so far, shared with the test.
    pub fn triggers(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.triggers)
    }
}

#[async_trait]
impl RecordLink for ScriptedSerial {
    async fn request(&mut self, trigger: u8, timeout: Duration) -> Result<String> {
        self.triggers.lock().unwrap().push(trigger);
        match self.replies.pop_front() {
            Some(Reply::Line(line)) => Ok(line),
            Some(Reply::Timeout) => Err(Error::LinkTimeout(timeout)),
            Some(Reply::IoError) => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted failure",
            ))),
            Some(Reply::Closed) => Err(Error::LinkClosed),
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
impl Open for ScriptedSerial {
    type Link = Self;

    async fn open(self) -> Result<Self> {
        Ok(self)
    }
}

/// Opener that always fails, like a missing port.
pub struct FailingOpen<L>(PhantomData<fn() -> L>);

impl<L> FailingOpen<L> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

#[async_trait]
impl<L: Send + 'static> Open for FailingOpen<L> {
    type Link = L;

    async fn open(self) -> Result<L> {
        Err(Error::LinkUnavailable("scripted open failure".into()))
    }
}

/// BLE link that delivers fixed payloads, then stays subscribed.
pub struct ScriptedBle {
    payloads: Vec<Vec<u8>>,
    fail_connect: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl ScriptedBle {
    pub fn new(payloads: Vec<Vec<u8>>) -> Self {
        Self {
            payloads,
            fail_connect: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_connect() -> Self {
        Self {
            fail_connect: true,
            ..Self::new(Vec::new())
        }
    }

    /// Names of the link methods called so far, in order.
    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl NotifyLink for ScriptedBle {
    async fn connect(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("connect");
        if self.fail_connect {
            return Err(Error::LinkUnavailable("scripted connect failure".into()));
        }
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<Notifications> {
        self.calls.lock().unwrap().push("subscribe");
        let payloads = std::mem::take(&mut self.payloads);
        Ok(Box::pin(
            futures::stream::iter(payloads).chain(futures::stream::pending()),
        ))
    }

    async fn unsubscribe(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("unsubscribe");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("disconnect");
        Ok(())
    }
}

#[async_trait]
impl Open for ScriptedBle {
    type Link = Self;

    async fn open(self) -> Result<Self> {
        Ok(self)
    }
}
