//! # Bridge Module
//!
//! Cross-thread access to the voice core.
//!
//! Voice sessions and playback state live on a single thread: the voice loop,
//! which also drives serenity and songbird. Nothing on that thread is `Send`.
//! Code running anywhere else (the HTTP facade, gateway event handlers)
//! reaches it only through a [`CommandBridge`]:
//!
//! 1. wait, bounded, until the [`ReadySignal`] reports the bot connected
//! 2. ship a `Send` closure to the loop over an unbounded channel
//! 3. the loop runs the closure's future on its own thread
//! 4. await the reply with a timeout; the loop-side work is not cancelled
//!    when the caller gives up, its result is simply dropped
//!
//! ## Example
//!
//! ```rust,ignore
//! let left = bridge
//!     .call(timeouts.connect, move |core| async move {
//!         Ok(core.sessions.leave(guild_id).await)
//!     })
//!     .await?;
//! ```

use futures::future::LocalBoxFuture;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::{BotError, BotResult};

pub mod runtime;

pub use runtime::{CoreSettings, GuildStatus, VoiceCore, VoiceLoop};

/// Unit of work executed on the voice loop thread.
pub type Job = Box<dyn FnOnce(Rc<VoiceCore>) -> LocalBoxFuture<'static, ()> + Send>;

/// Who the bot is logged in as, published once the gateway is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: u64,
    pub tag: String,
}

/// Single-assignment readiness flag shared between the bot and its callers.
#[derive(Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<Option<BotIdentity>>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Publishes the identity. Only the first call has any effect.
    pub fn mark_ready(&self, identity: BotIdentity) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(identity);
            true
        })
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn identity(&self) -> Option<BotIdentity> {
        self.tx.borrow().clone()
    }

    /// Waits up to `timeout` for readiness; `false` if it never came.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let wait = async move {
            loop {
                if rx.borrow_and_update().is_some() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.unwrap_or(false)
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Deadlines for the two classes of bridged operations.
#[derive(Debug, Clone, Copy)]
pub struct BridgeTimeouts {
    /// Espera máxima hasta que el bot esté listo
    pub ready: Duration,
    /// Join, leave, stop, pause, resume, status
    pub connect: Duration,
    /// Resolución + reproducción
    pub play: Duration,
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self {
            ready: Duration::from_secs(30),
            connect: Duration::from_secs(30),
            play: Duration::from_secs(60),
        }
    }
}

/// Cloneable, `Send` handle for scheduling work on the voice loop.
#[derive(Clone)]
pub struct CommandBridge {
    jobs: mpsc::UnboundedSender<Job>,
    ready: ReadySignal,
    timeouts: BridgeTimeouts,
}

impl CommandBridge {
    /// Returns the bridge and the receiving end the [`VoiceLoop`] consumes.
    pub fn new(ready: ReadySignal, timeouts: BridgeTimeouts) -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        (
            Self {
                jobs,
                ready,
                timeouts,
            },
            rx,
        )
    }

    pub fn ready(&self) -> &ReadySignal {
        &self.ready
    }

    pub fn timeouts(&self) -> BridgeTimeouts {
        self.timeouts
    }

    /// Runs `op` on the voice loop and waits up to `timeout` for its result.
    ///
    /// # Errors
    ///
    /// - `NotReady` if the bot is not ready within the readiness wait, or the loop is gone
    /// - `RequestTimeout` if the reply takes longer than `timeout`
    /// - whatever `op` itself returns, unchanged
    pub async fn call<T, F, Fut>(&self, timeout: Duration, op: F) -> BotResult<T>
    where
        F: FnOnce(Rc<VoiceCore>) -> Fut + Send + 'static,
        Fut: Future<Output = BotResult<T>> + 'static,
        T: Send + 'static,
    {
        if !self.ready.wait_ready(self.timeouts.ready).await {
            return Err(BotError::NotReady(
                "no voice connection to Discord yet".to_string(),
            ));
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue(move |core| async move {
            // Si el llamador ya se fue, el resultado se descarta
            let _ = reply_tx.send(op(core).await);
        })?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BotError::NotReady("voice loop dropped the request".to_string())),
            Err(_) => {
                warn!("⏰ Operación de voz superó {:?}", timeout);
                Err(BotError::RequestTimeout(timeout))
            }
        }
    }

    /// Fire-and-forget variant for callers that must never wait on the loop.
    pub fn submit<F, Fut>(&self, op: F) -> BotResult<()>
    where
        F: FnOnce(Rc<VoiceCore>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.enqueue(op)
    }

    fn enqueue<F, Fut>(&self, op: F) -> BotResult<()>
    where
        F: FnOnce(Rc<VoiceCore>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let job: Job = Box::new(move |core: Rc<VoiceCore>| -> LocalBoxFuture<'static, ()> { Box::pin(op(core)) });
        self.jobs.send(job).map_err(|_| {
            debug!("Bucle de voz cerrado, descartando trabajo");
            BotError::NotReady("voice loop is not running".to_string())
        })
    }
}
