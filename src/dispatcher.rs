use anyhow::Result;
use tracing::{debug, error, info, warn};

use crate::action::{extract_target, validate_target, ActionExecutor, ActionRun};
use crate::config::Mode;
use crate::memory::audit::now_timestamp;
use crate::memory::MemoryStore;
use crate::platform::IncomingMessage;
use crate::reply::Reply;

pub const COMMAND_PREFIX: char = '/';

const TODO_WELCOME: &str = "Welcome to your personal To Do list. Send any text to me and \
     I'll store it as an item. Send /done to remove items";
const WATERING_WELCOME: &str = "Hi! Send me a link to your plant and I'll water it. \
     Send /log to see how the last watering went.";
const UNSUPPORTED_RESPONSE: &str = "Sorry, I can only read text messages.";
const EMPTY_LIST_RESPONSE: &str = "There is nothing on your todo list.";
const SELECT_ITEM_RESPONSE: &str = "Select an item to delete";
const EMPTY_LOG_RESPONSE: &str = "The log is empty.";
pub const CONFUSED_RESPONSE: &str = "I am confused 😕";
pub const SUCCESS_RESPONSE: &str = "Successfully watered your plant today 🌱";
pub const ERROR_RESPONSE: &str = "Oops something went wrong... Please try again";

pub fn fail_response(attempt: u32) -> String {
    format!(
        "I was not able to water your plant [[{}]] 😓 Please try again",
        attempt
    )
}

/// Recognized command tokens. Matching is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Show,
    Done,
    Log,
    Water,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "/start" => Some(Command::Start),
            "/show" => Some(Command::Show),
            "/done" => Some(Command::Done),
            "/log" => Some(Command::Log),
            "/water" => Some(Command::Water),
            _ => None,
        }
    }
}

/// Routes one message to its handler and renders the reply.
/// Holds no per-call state.
pub struct Dispatcher {
    mode: Mode,
    store: MemoryStore,
    executor: ActionExecutor,
    default_target: Option<reqwest::Url>,
}

impl Dispatcher {
    pub fn new(
        mode: Mode,
        store: MemoryStore,
        executor: ActionExecutor,
        default_target: Option<reqwest::Url>,
    ) -> Self {
        Self {
            mode,
            store,
            executor,
            default_target,
        }
    }

    /// Handle a message. `None` means stay silent. Handler failures are
    /// written to the audit log and answered with the generic error text.
    pub async fn dispatch(&self, message: &IncomingMessage) -> Option<Reply> {
        match self.handle(message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Error handling message in chat {}: {:#}", message.chat_id, e);
                self.record_failure(&format!("{:#}", e)).await;
                Some(Reply::text(ERROR_RESPONSE))
            }
        }
    }

    /// Append a failure to the audit log; a failing write is only logged.
    pub async fn record_failure(&self, description: &str) {
        if let Err(e) = self.store.append_log(&now_timestamp(), description).await {
            error!("Failed to write audit entry: {:#}", e);
        }
    }

    async fn handle(&self, message: &IncomingMessage) -> Result<Option<Reply>> {
        let text = match message.text.as_deref() {
            Some(text) => text,
            None => return Ok(Some(Reply::text(UNSUPPORTED_RESPONSE))),
        };

        if let Some(command) = Command::parse(text) {
            info!("Command {:?} from chat {}", command, message.chat_id);
            return self.run_command(command).await.map(Some);
        }

        if text.starts_with(COMMAND_PREFIX) {
            debug!("Ignoring unknown command: {}", text);
            return Ok(None);
        }

        let reply = match self.mode {
            Mode::Todo => {
                if self.store.has_item(text).await? {
                    self.remove_item(text).await?
                } else {
                    self.add_item(text).await?
                }
            }
            Mode::Watering => self.water(extract_target(text)).await?,
        };
        Ok(Some(reply))
    }

    async fn run_command(&self, command: Command) -> Result<Reply> {
        match command {
            Command::Start => Ok(Reply::text(match self.mode {
                Mode::Todo => TODO_WELCOME,
                Mode::Watering => WATERING_WELCOME,
            })),
            Command::Show => match self.mode {
                Mode::Todo => self.show_items().await,
                Mode::Watering => self.latest_log().await,
            },
            Command::Done => match self.mode {
                Mode::Todo => {
                    let items = self.store.all_items().await?;
                    Ok(removal_prompt(items))
                }
                Mode::Watering => self.clear_latest_log().await,
            },
            Command::Log => self.latest_log().await,
            Command::Water => match &self.default_target {
                Some(target) => self.run_action(target).await,
                None => Ok(Reply::text(CONFUSED_RESPONSE)),
            },
        }
    }

    async fn show_items(&self) -> Result<Reply> {
        let items = self.store.all_items().await?;
        if items.is_empty() {
            return Ok(Reply::text(EMPTY_LIST_RESPONSE));
        }
        Ok(Reply::text(items.join("\n")))
    }

    async fn add_item(&self, description: &str) -> Result<Reply> {
        self.store.add_item(description).await?;
        let items = self.store.all_items().await?;
        Ok(Reply::text(items.join("\n")))
    }

    async fn remove_item(&self, description: &str) -> Result<Reply> {
        self.store.delete_item(description).await?;
        let items = self.store.all_items().await?;
        Ok(removal_prompt(items))
    }

    async fn latest_log(&self) -> Result<Reply> {
        let reply = match self.store.latest_log().await? {
            Some(entry) => entry.to_string(),
            None => EMPTY_LOG_RESPONSE.to_string(),
        };
        Ok(Reply::text(reply))
    }

    /// Acknowledge the most recent audit entry by removing it.
    async fn clear_latest_log(&self) -> Result<Reply> {
        let entry = match self.store.latest_log().await? {
            Some(entry) => entry,
            None => return Ok(Reply::text(EMPTY_LOG_RESPONSE)),
        };
        let removed = self.store.remove_log(&entry.timestamp).await?;
        debug!("Removed {} audit entries at {}", removed, entry.timestamp);
        Ok(Reply::text(format!("Cleared: {}", entry)))
    }

    async fn water(&self, candidate: &str) -> Result<Reply> {
        match validate_target(candidate) {
            Ok(target) => self.run_action(&target).await,
            Err(e) => {
                info!("Rejected target '{}': {}", candidate, e);
                Ok(Reply::text(CONFUSED_RESPONSE))
            }
        }
    }

    async fn run_action(&self, target: &reqwest::Url) -> Result<Reply> {
        let run = self.executor.perform(target).await?;

        if let Err(e) = self
            .store
            .append_log(&now_timestamp(), &describe_run(&run))
            .await
        {
            warn!("Failed to record action outcome: {:#}", e);
        }

        if run.succeeded() {
            info!("Watered {} ({} attempts)", run.target, run.attempts_made);
            Ok(Reply::text(SUCCESS_RESPONSE))
        } else {
            info!(
                "Watering {} stopped after {}/{} attempts",
                run.target,
                run.attempts_made,
                self.executor.limit()
            );
            Ok(Reply::text(fail_response(run.attempts_made + 1)))
        }
    }
}

fn removal_prompt(items: Vec<String>) -> Reply {
    if items.is_empty() {
        Reply::remove_keyboard(EMPTY_LIST_RESPONSE)
    } else {
        Reply::with_choices(SELECT_ITEM_RESPONSE, items)
    }
}

fn describe_run(run: &ActionRun) -> String {
    if run.succeeded() {
        format!("Watered {} ({}/{})", run.target, run.attempts_made, run.limit)
    } else {
        format!(
            "Failed to water {} at attempt {}/{}",
            run.target,
            run.attempts_made + 1,
            run.limit
        )
    }
}
