//! Scripted stand-ins for the chat service and the automation backend.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::browser::{Browser, BrowserSession};
use crate::platform::{Channel, IncomingMessage, Update};
use crate::reply::Reply;

pub fn text_update(id: i64, chat_id: i64, text: &str) -> Update {
    Update {
        id,
        message: Some(IncomingMessage {
            chat_id,
            user_id: Some(1),
            text: Some(text.to_string()),
        }),
    }
}

pub fn message(text: &str) -> IncomingMessage {
    IncomingMessage {
        chat_id: 42,
        user_id: Some(1),
        text: Some(text.to_string()),
    }
}

/// In-memory chat server: `fetch` behaves like `getUpdates`, dropping
/// everything below the requested offset.
#[derive(Default)]
pub struct ScriptedChannel {
    pending: Mutex<Vec<Update>>,
    failures: Mutex<VecDeque<String>>,
    offsets: Mutex<Vec<Option<i64>>>,
    sent: Mutex<Vec<(i64, Reply)>>,
}

impl ScriptedChannel {
    pub fn push(&self, update: Update) {
        self.pending.lock().unwrap().push(update);
    }

    pub fn fail_next_fetch(&self, reason: &str) {
        self.failures.lock().unwrap().push_back(reason.to_string());
    }

    pub fn offsets(&self) -> Vec<Option<i64>> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(i64, Reply)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|(_, reply)| reply.text).collect()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn fetch(&self, offset: Option<i64>, _timeout_secs: u32) -> Result<Vec<Update>> {
        self.offsets.lock().unwrap().push(offset);

        if let Some(reason) = self.failures.lock().unwrap().pop_front() {
            bail!("{}", reason);
        }

        let mut pending = self.pending.lock().unwrap();
        if let Some(offset) = offset {
            pending.retain(|update| update.id >= offset);
        }
        Ok(pending.clone())
    }

    async fn send(&self, chat_id: i64, reply: &Reply) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, reply.clone()));
        Ok(())
    }
}

/// How one scripted session behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptScript {
    Confirm,
    TriggerMissing,
    ConfirmationMissing,
    ClickFails,
    ClickPanics,
    OpenFails,
}

#[derive(Default)]
struct BrowserLog {
    opened: usize,
    closed: usize,
    clicks: Vec<String>,
    visited: Vec<String>,
}

/// Browser whose n-th session follows the n-th script entry; sessions past
/// the end of the script confirm.
pub struct ScriptedBrowser {
    script: Vec<AttemptScript>,
    fail_close: bool,
    log: Arc<Mutex<BrowserLog>>,
}

impl ScriptedBrowser {
    pub fn new(script: Vec<AttemptScript>) -> Self {
        Self {
            script,
            fail_close: false,
            log: Arc::default(),
        }
    }

    pub fn always_confirming() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.log.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }

    pub fn clicks(&self) -> Vec<String> {
        self.log.lock().unwrap().clicks.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.log.lock().unwrap().visited.clone()
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>> {
        let mut log = self.log.lock().unwrap();
        let script = self
            .script
            .get(log.opened)
            .copied()
            .unwrap_or(AttemptScript::Confirm);

        if script == AttemptScript::OpenFails {
            bail!("chromedriver unreachable");
        }

        log.opened += 1;
        Ok(Box::new(ScriptedSession {
            script,
            waits: 0,
            closed: false,
            fail_close: self.fail_close,
            log: self.log.clone(),
        }))
    }
}

struct ScriptedSession {
    script: AttemptScript,
    waits: usize,
    closed: bool,
    fail_close: bool,
    log: Arc<Mutex<BrowserLog>>,
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        self.log.lock().unwrap().visited.push(url.to_string());
        Ok(())
    }

    async fn wait_for(&mut self, _selector: &str, _timeout: Duration) -> Result<bool> {
        self.waits += 1;
        // First wait is the trigger, second the confirmation.
        let present = match (self.script, self.waits) {
            (AttemptScript::TriggerMissing, 1) => false,
            (AttemptScript::ConfirmationMissing, 2) => false,
            _ => true,
        };
        Ok(present)
    }

    async fn click(&mut self, selector: &str) -> Result<()> {
        match self.script {
            AttemptScript::ClickFails => bail!("click failed: element detached"),
            AttemptScript::ClickPanics => panic!("kettle exploded"),
            _ => {}
        }
        self.log.lock().unwrap().clicks.push(selector.to_string());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.log.lock().unwrap().closed += 1;
        if self.fail_close {
            bail!("session already gone");
        }
        Ok(())
    }
}
