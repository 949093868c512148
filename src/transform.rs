//! The streaming transform: PDF bytes in, bitmap bytes out.
//!
//! A [`RasterTransform`] owns exactly one conversion session. The engine is
//! started as soon as the transform is constructed; from then on the caller
//!
//! 1. [`write`](RasterTransform::write)s PDF chunks of any size,
//! 2. calls [`finish`](RasterTransform::finish) once, and
//! 3. reads bitmap chunks from [`output`](RasterTransform::output).
//!
//! `finish` resolves only after the engine's stdout has ended, so the output
//! stream is complete once it returns `Ok`. Output is buffered in memory
//! until read, which means the caller may finish first and read afterwards.
//!
//! Every failure goes through the same channel: the `Result` of `write` or
//! `finish`. The first failure is latched; later calls return the same error
//! and the engine is killed as soon as an error has been reported.
//!
//! For the common "pipe a stream through" case use
//! [`pipe`](RasterTransform::pipe).

use crate::command::{build_invocation, EngineInvocation};
use crate::config::{resolve_engine_path, TransformConfig};
use crate::error::RasterError;
use crate::resolution::ResolutionSpec;
use crate::session::{spawn_session, SessionCommand, SessionState};
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Raw bitmap chunks as produced by the engine.
pub type OutputStream = UnboundedReceiverStream<Vec<u8>>;

/// Bitmap chunks followed, on failure, by exactly one error.
pub type BitmapStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, RasterError>> + Send>>;

/// A PDF-to-monochrome-bitmap transform backed by one engine process.
pub struct RasterTransform {
    engine: PathBuf,
    invocation: EngineInvocation,
    pid: Option<u32>,
    commands: Option<mpsc::Sender<SessionCommand>>,
    output: Option<OutputStream>,
    state: watch::Receiver<SessionState>,
    latched: Option<RasterError>,
    input_ended: bool,
}

impl std::fmt::Debug for RasterTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterTransform")
            .field("engine", &self.engine)
            .field("invocation", &self.invocation)
            .field("pid", &self.pid)
            .field("state", &self.state())
            .field("latched", &self.latched)
            .finish()
    }
}

impl RasterTransform {
    /// Create a transform, spawning the engine immediately.
    ///
    /// `engine_path` falls back to the `GS_EXE` environment variable. A
    /// missing path or an unusable resolution fails here, before anything is
    /// spawned. A spawn failure does *not* fail construction: it is latched
    /// and returned by the first `write` or `finish`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(engine_path: Option<&Path>, resolution: ResolutionSpec) -> Result<Self, RasterError> {
        let engine = resolve_engine_path(engine_path)?;
        let invocation = build_invocation(&resolution)?;
        Ok(Self::start(engine, invocation, true))
    }

    /// Create a transform from a [`TransformConfig`].
    pub fn from_config(config: &TransformConfig) -> Result<Self, RasterError> {
        let engine = config.resolve_engine_path()?;
        let invocation = build_invocation(&config.resolution)?;
        Ok(Self::start(engine, invocation, config.forward_stderr))
    }

    pub(crate) fn start(engine: PathBuf, invocation: EngineInvocation, forward_stderr: bool) -> Self {
        match spawn_session(&engine, &invocation, forward_stderr) {
            Ok(link) => Self {
                engine,
                invocation,
                pid: link.pid,
                commands: Some(link.commands),
                output: Some(UnboundedReceiverStream::new(link.output)),
                state: link.state,
                latched: None,
                input_ended: false,
            },
            Err(e) => {
                debug!("Latching spawn failure: {}", e);
                let (_, state) = watch::channel(SessionState::Failed);
                let (_, output) = mpsc::unbounded_channel();
                Self {
                    engine,
                    invocation,
                    pid: None,
                    commands: None,
                    output: Some(UnboundedReceiverStream::new(output)),
                    state,
                    latched: Some(e),
                    input_ended: false,
                }
            }
        }
    }

    /// Forward one chunk of PDF bytes to the engine.
    ///
    /// Resolves once the engine's stdin accepted the whole chunk.
    pub async fn write(&mut self, chunk: impl Into<Vec<u8>>) -> Result<(), RasterError> {
        if let Some(e) = &self.latched {
            return Err(e.clone());
        }
        if self.input_ended {
            return Err(RasterError::InputClosed);
        }
        let chunk = chunk.into();
        match self
            .request(|reply| SessionCommand::Write { chunk, reply })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => Err(self.report(e)),
        }
    }

    /// Signal end of input and wait until the engine's output has ended.
    pub async fn finish(&mut self) -> Result<(), RasterError> {
        if let Some(e) = &self.latched {
            return Err(e.clone());
        }
        if self.input_ended {
            return Err(RasterError::InputClosed);
        }
        self.input_ended = true;
        match self.request(|reply| SessionCommand::Finish { reply }).await {
            Ok(()) => {
                self.commands = None;
                Ok(())
            }
            Err(e) => Err(self.report(e)),
        }
    }

    /// Take the output side. Returns `None` if it was already taken.
    ///
    /// The stream ends when the engine closes its stdout, or early when the
    /// transform fails.
    pub fn output(&mut self) -> Option<OutputStream> {
        self.output.take()
    }

    /// Feed `input` through the engine, then finish.
    pub async fn feed<S>(&mut self, input: S) -> Result<(), RasterError>
    where
        S: Stream<Item = io::Result<Vec<u8>>>,
    {
        futures::pin_mut!(input);
        while let Some(chunk) = input.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => return Err(self.report(RasterError::input_read(e))),
            };
            self.write(chunk).await?;
        }
        self.finish().await
    }

    /// Pipe `input` through the engine and return the bitmap stream.
    ///
    /// The returned stream yields output chunks as the engine produces them.
    /// If the conversion fails the last item is the error; it appears once.
    /// Dropping the returned stream stops feeding input and kills the engine.
    pub fn pipe<S>(mut self, input: S) -> BitmapStream
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        let output = self
            .output()
            .map(|s| s.map(Ok).boxed())
            .unwrap_or_else(|| stream::empty().boxed());

        let (done_tx, done_rx) = oneshot::channel();
        let feeder = tokio::spawn(async move {
            let result = self.feed(input).await;
            let _ = done_tx.send(result);
        });

        let tail = stream::once(done_rx).filter_map(|done| async move {
            match done {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(Err(e)),
                Err(_) => Some(Err(RasterError::Internal(
                    "conversion task ended without a result".into(),
                ))),
            }
        });

        Box::pin(Piped {
            inner: Box::pin(output.chain(tail)),
            feeder,
        })
    }

    /// Watch the session state as it changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        if self.latched.is_some() {
            return SessionState::Failed;
        }
        *self.state.borrow()
    }

    /// The error latched on this transform, if any has been reported.
    pub fn error(&self) -> Option<&RasterError> {
        self.latched.as_ref()
    }

    /// The engine executable in use.
    pub fn engine_path(&self) -> &Path {
        &self.engine
    }

    /// The arguments the engine was started with.
    pub fn invocation(&self) -> &EngineInvocation {
        &self.invocation
    }

    /// OS process id of the engine, if it was started.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn request<F>(&mut self, make: F) -> Result<(), RasterError>
    where
        F: FnOnce(oneshot::Sender<Result<(), RasterError>>) -> SessionCommand,
    {
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| RasterError::Internal("conversion session already closed".into()))?;
        let (reply, response) = oneshot::channel();
        commands
            .send(make(reply))
            .await
            .map_err(|_| RasterError::Internal("conversion session task exited".into()))?;
        response
            .await
            .map_err(|_| RasterError::Internal("conversion session dropped the request".into()))?
    }

    /// Latch `err` and tear the session down. Returns the latched error.
    fn report(&mut self, err: RasterError) -> RasterError {
        // Dropping the sender makes the session task kill the engine if it
        // has not already done so.
        self.commands = None;
        self.latched.get_or_insert(err).clone()
    }
}

/// Output of [`RasterTransform::pipe`]; owns the task feeding the engine.
struct Piped {
    inner: BitmapStream,
    feeder: JoinHandle<()>,
}

impl Stream for Piped {
    type Item = Result<Vec<u8>, RasterError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for Piped {
    fn drop(&mut self) {
        // Dropping the transform inside the task closes its command channel,
        // which kills the engine.
        self.feeder.abort();
    }
}
