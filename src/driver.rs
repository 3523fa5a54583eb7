//! Async host for a conversation session
//!
//! `SessionDriver` runs one `ConversationSession` inside a single tokio task
//! and is the only writer to it. It:
//! - Receives user intents from `SessionHandle` over a command channel
//! - Receives server-pushed `InboundEvent`s from the transport
//! - Executes request descriptors against a `Transport` on spawned tasks
//! - Applies their completions back on the driver task, in arrival order
//! - Ticks the typing debouncer on a fixed interval
//!
//! While the conversation is visible, new messages are marked read as they
//! arrive.

use crate::model::{ClientTempId, ConversationId, Message, OutgoingPayload, Page, Participant, Timestamp};
use crate::pagination::FetchOlderRequest;
use crate::presence::TypingSignal;
use crate::receipts::MarkReadRequest;
use crate::session::{ConversationSession, SessionSnapshot};
use crate::transport::{InboundEvent, OutboundSend, Transport};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Capacity of the command channel
const COMMAND_BUFFER: usize = 64;

/// User intent sent to the driver
#[derive(Debug)]
enum Command {
    Open(ConversationId),
    Close,
    Minimize,
    Restore,
    Send(OutgoingPayload),
    RetrySend(ClientTempId),
    DiscardFailed(ClientTempId),
    LoadOlder,
    Input(bool),
    Blur,
    MarkRead,
    SetParticipants(Vec<Participant>),
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Result of a transport call together with the request that produced it
#[derive(Debug)]
enum Completion {
    Sent {
        request: OutboundSend,
        result: Result<Message>,
    },
    Fetched {
        request: FetchOlderRequest,
        result: Result<Page<Message>>,
    },
    Marked {
        request: MarkReadRequest,
        result: Result<Timestamp>,
    },
}

/// Cloneable handle for talking to a running driver
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    async fn command(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::SessionClosed)
    }

    /// Open a conversation (discarding the current one)
    pub async fn open(&self, conversation_id: impl Into<ConversationId>) -> Result<()> {
        self.command(Command::Open(conversation_id.into())).await
    }

    /// Close the open conversation
    pub async fn close(&self) -> Result<()> {
        self.command(Command::Close).await
    }

    /// Minimize the open conversation
    pub async fn minimize(&self) -> Result<()> {
        self.command(Command::Minimize).await
    }

    /// Restore a minimized conversation
    pub async fn restore(&self) -> Result<()> {
        self.command(Command::Restore).await
    }

    /// Send a message optimistically
    pub async fn send(&self, payload: OutgoingPayload) -> Result<()> {
        self.command(Command::Send(payload)).await
    }

    /// Retry a failed send
    pub async fn retry_send(&self, client_temp_id: ClientTempId) -> Result<()> {
        self.command(Command::RetrySend(client_temp_id)).await
    }

    /// Remove a failed send
    pub async fn discard_failed(&self, client_temp_id: ClientTempId) -> Result<()> {
        self.command(Command::DiscardFailed(client_temp_id)).await
    }

    /// Load the next page of older history
    pub async fn load_older(&self) -> Result<()> {
        self.command(Command::LoadOlder).await
    }

    /// Report a composer change
    pub async fn input(&self, has_content: bool) -> Result<()> {
        self.command(Command::Input(has_content)).await
    }

    /// Report that the composer lost focus
    pub async fn blur(&self) -> Result<()> {
        self.command(Command::Blur).await
    }

    /// Mark the open conversation read
    pub async fn mark_read(&self) -> Result<()> {
        self.command(Command::MarkRead).await
    }

    /// Replace the participant roster
    pub async fn set_participants(&self, participants: Vec<Participant>) -> Result<()> {
        self.command(Command::SetParticipants(participants)).await
    }

    /// Copy the session state
    ///
    /// Every command sent before this one has been applied when it returns.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Snapshot(tx)).await?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Stop the driver; its task resolves to the session
    pub async fn shutdown(&self) -> Result<()> {
        self.command(Command::Shutdown).await
    }
}

/// Single-writer actor hosting a `ConversationSession`
pub struct SessionDriver<T: Transport> {
    session: ConversationSession,
    transport: Arc<T>,
    commands: mpsc::Receiver<Command>,
    inbound: mpsc::UnboundedReceiver<InboundEvent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    tick_interval: Duration,
}

impl<T: Transport> SessionDriver<T> {
    /// Spawn a driver on the current tokio runtime
    ///
    /// Returns the command handle and the task, which resolves to the session
    /// after `shutdown` or once every handle is dropped.
    pub fn spawn(
        session: ConversationSession,
        transport: Arc<T>,
        inbound: mpsc::UnboundedReceiver<InboundEvent>,
    ) -> (SessionHandle, JoinHandle<ConversationSession>) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let tick_interval = Duration::from_millis(session.settings().tick_interval_ms.max(1));

        let driver = Self {
            session,
            transport,
            commands,
            inbound,
            completions_tx,
            completions_rx,
            tick_interval,
        };
        let task = tokio::spawn(driver.run());
        (SessionHandle { tx }, task)
    }

    async fn run(mut self) -> ConversationSession {
        info!(
            "Session driver started for {} (tick every {:?})",
            self.session.local_user(),
            self.tick_interval
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbound_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.observe_typing(|driver| driver.apply_command(command)),
                },
                event = self.inbound.recv(), if inbound_open => match event {
                    Some(event) => self.apply_inbound(event),
                    None => {
                        debug!("Inbound stream ended");
                        inbound_open = false;
                    }
                },
                Some(completion) = self.completions_rx.recv() => self.apply_completion(completion),
                _ = ticker.tick() => self.observe_typing(|driver| {
                    driver.session.tick();
                }),
            }
        }

        info!("Session driver stopped for {}", self.session.local_user());
        self.session
    }

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::Open(conversation_id) => {
                if let Some(request) = self.session.open(conversation_id) {
                    self.dispatch_fetch(request);
                }
            }
            Command::Close => self.session.close(),
            Command::Minimize => {
                self.session.minimize();
            }
            Command::Restore => {
                if let Some(request) = self.session.restore() {
                    self.dispatch_mark(request);
                }
            }
            Command::Send(payload) => {
                if let Some(request) = self.session.send(payload) {
                    self.dispatch_send(request);
                }
            }
            Command::RetrySend(client_temp_id) => {
                if let Some(request) = self.session.retry_send(&client_temp_id) {
                    self.dispatch_send(request);
                }
            }
            Command::DiscardFailed(client_temp_id) => {
                self.session.discard_failed(&client_temp_id);
            }
            Command::LoadOlder => {
                if let Some(request) = self.session.load_older() {
                    self.dispatch_fetch(request);
                }
            }
            Command::Input(has_content) => {
                self.session.input(has_content);
            }
            Command::Blur => {
                self.session.blur();
            }
            Command::MarkRead => {
                if let Some(request) = self.session.mark_read() {
                    self.dispatch_mark(request);
                }
            }
            Command::SetParticipants(participants) => self.session.set_participants(participants),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Shutdown => {}
        }
    }

    fn apply_inbound(&mut self, event: InboundEvent) {
        let is_message = matches!(event, InboundEvent::NewMessage { .. });
        self.session.handle_inbound(event);
        if is_message {
            self.mark_visible_read();
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Sent { request, result } => match result {
                Ok(message) => {
                    self.session.confirm_send(&request, message);
                }
                Err(e) => {
                    self.session.fail_send(&request, e.to_string());
                }
            },
            Completion::Fetched { request, result } => match result {
                Ok(page) => {
                    if self.session.complete_older(&request, page).is_some() {
                        self.mark_visible_read();
                    }
                }
                Err(e) => self.session.fail_older(&request, e.to_string()),
            },
            Completion::Marked { request, result } => match result {
                Ok(at) => {
                    self.session.complete_mark(&request, at);
                    // Messages may have arrived while the request was in flight
                    self.mark_visible_read();
                }
                Err(e) => self.session.fail_mark(&request, e.to_string()),
            },
        }
    }

    fn mark_visible_read(&mut self) {
        if !self.session.is_visible() || self.session.unread_count() == 0 {
            return;
        }
        if let Some(request) = self.session.mark_read() {
            self.dispatch_mark(request);
        }
    }

    /// Run `apply` and forward any change of the local typing state
    fn observe_typing(&mut self, apply: impl FnOnce(&mut Self)) {
        let before = self.local_typing_state();
        apply(self);
        let after = self.local_typing_state();

        if let Some((conversation_id, true)) = &before {
            let still_typing = matches!(&after, Some((id, true)) if id == conversation_id);
            if !still_typing {
                self.dispatch_typing(conversation_id.clone(), TypingSignal::Stop);
            }
        }
        if let Some((conversation_id, true)) = &after {
            let was_typing = matches!(&before, Some((id, true)) if id == conversation_id);
            if !was_typing {
                self.dispatch_typing(conversation_id.clone(), TypingSignal::Start);
            }
        }
    }

    fn local_typing_state(&self) -> Option<(ConversationId, bool)> {
        self.session
            .typing_state()
            .map(|state| (state.conversation_id.clone(), state.local_typing))
    }

    fn dispatch_send(&self, request: OutboundSend) {
        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = transport.send(request.clone()).await;
            let _ = completions.send(Completion::Sent { request, result });
        });
    }

    fn dispatch_fetch(&self, request: FetchOlderRequest) {
        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = transport.fetch_older(request.clone()).await;
            let _ = completions.send(Completion::Fetched { request, result });
        });
    }

    fn dispatch_mark(&self, request: MarkReadRequest) {
        let transport = Arc::clone(&self.transport);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = transport.mark_read(request.clone()).await;
            let _ = completions.send(Completion::Marked { request, result });
        });
    }

    fn dispatch_typing(&self, conversation_id: ConversationId, signal: TypingSignal) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.send_typing(conversation_id, signal).await {
                warn!("Failed to forward typing signal: {}", e);
            }
        });
    }
}
