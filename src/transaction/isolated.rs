use super::context::{Cx, Phase};
use super::state::{Transaction, TransactionState};
use crate::core::{KvError, Reply, Result};
use futures::future::{Ready, ready, try_join_all};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Setup used by `Cx::multi`
pub type NoSetup = fn(Cx) -> Ready<Result<()>>;

pub(crate) fn no_setup(_cx: Cx) -> Ready<Result<()>> {
    ready(Ok(()))
}

/// Outcome of `exec`
#[derive(Debug)]
pub struct Exec<R> {
    /// What the multi body returned
    pub value: R,
    /// One reply per queued command; `None` when this exec joined an
    /// enclosing transaction, which commits the batch instead
    pub replies: Option<Vec<Reply>>,
}

/// `cx.isolated(setup)`, waiting for its body
pub struct Isolated<S> {
    cx: Cx,
    setup: S,
}

impl<S> Isolated<S> {
    pub(crate) fn new(cx: Cx, setup: S) -> Self {
        Self { cx, setup }
    }
}

impl<S, SFut, T> Isolated<S>
where
    S: FnOnce(Cx) -> SFut,
    SFut: Future<Output = Result<T>>,
{
    /// Attach the body that queues the transaction's writes
    pub fn multi<B, BFut, R>(self, body: B) -> Multi<S, B>
    where
        B: FnOnce(Cx, T) -> BFut,
        BFut: Future<Output = Result<R>>,
    {
        Multi {
            cx: self.cx,
            setup: self.setup,
            body,
        }
    }
}

/// `cx.isolated(setup).multi(body)`, ready to `exec`
pub struct Multi<S, B> {
    cx: Cx,
    setup: S,
    body: B,
}

impl<S, SFut, T, B, BFut, R> Multi<S, B>
where
    S: FnOnce(Cx) -> SFut,
    SFut: Future<Output = Result<T>>,
    B: FnOnce(Cx, T) -> BFut,
    BFut: Future<Output = Result<R>>,
{
    /// Run setup, then body, then commit the batch atomically
    ///
    /// Fails with `KvError::Conflict` (nothing applied) when a watched key
    /// changed before commit. On an already-isolated `Cx` setup and body
    /// run inside the enclosing transaction and nothing is committed here.
    pub async fn exec(self) -> Result<Exec<R>> {
        let Self { cx, setup, body } = self;

        if let Some(tx) = cx.transaction().cloned() {
            debug!(tx = %tx.id(), "joining enclosing transaction");
            let prepared = setup(cx.scoped(Arc::clone(&tx), Phase::Setup)).await?;
            let value = body(cx.scoped(tx, Phase::Body), prepared).await?;
            return Ok(Exec {
                value,
                replies: None,
            });
        }

        let connection = cx.backend().pool().get_connection().await?;
        let tx = Arc::new(Transaction::new(Some(connection)));
        debug!(tx = %tx.id(), "transaction started");

        let outcome = async {
            let prepared = setup(cx.scoped(Arc::clone(&tx), Phase::Setup)).await?;
            let value = body(cx.scoped(Arc::clone(&tx), Phase::Body), prepared).await?;

            // Deferred work may defer more work
            loop {
                let pending = tx.take_pending()?;
                if pending.is_empty() {
                    break;
                }
                try_join_all(pending).await?;
            }

            let commands = tx.take_batch()?;
            let mut connection = tx.connection().lock().await;
            let connection = connection.as_mut().ok_or(KvError::ConnectionClosed)?;
            let replies = connection.exec(commands).await?;
            Ok::<_, KvError>((value, replies))
        }
        .await;

        // Release the dedicated connection even if a Cx clone outlives us
        tx.connection().lock().await.take();

        match outcome {
            Ok((value, replies)) => {
                tx.finish(TransactionState::Committed)?;
                debug!(
                    tx = %tx.id(),
                    commands = replies.len(),
                    elapsed_us = tx.duration().as_micros() as u64,
                    "transaction committed"
                );
                Ok(Exec {
                    value,
                    replies: Some(replies),
                })
            }
            Err(err) => {
                tx.finish(TransactionState::Aborted)?;
                debug!(tx = %tx.id(), error = %err, "transaction aborted");
                Err(err)
            }
        }
    }
}
