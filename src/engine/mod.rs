pub mod rate;

use crate::model::{Config, ProbeResult};
use crate::output::OutputSink;
use crate::probe;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use rate::RateLimiter;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// Drives the probes: streams targets in, fans out to independent tasks
/// under a concurrency cap and rate limit, and emits one result per target.
/// Probes share no mutable state with each other.
pub struct Engine {
    cfg: Arc<Config>,
    sink: OutputSink,
    limiter: RateLimiter,
    sem: Arc<Semaphore>,
}

impl Engine {
    pub fn new(cfg: Config, sink: OutputSink) -> anyhow::Result<Self> {
        Ok(Self {
            limiter: RateLimiter::new(cfg.rate),
            sem: Arc::new(Semaphore::new(cfg.concurrency)),
            cfg: Arc::new(cfg),
            sink,
        })
    }

    #[instrument(skip(self))]
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut stream = crate::input::stream_targets(&self.cfg)?;
        let mut tasks = FuturesUnordered::new();

        while let Some(target) = stream.next().await {
            self.limiter.acquire().await;
            let permit = self.sem.clone().acquire_owned().await?;
            let cfg = self.cfg.clone();
            let sink = self.sink.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = permit;
                let start = Instant::now();
                let result = match timeout(cfg.overall_timeout, probe::evaluate(&target, &cfg))
                    .await
                {
                    Ok(result) => result,
                    // overall timeout elapsed: report the defaults rather
                    // than nothing, so every target yields a record
                    Err(_) => ProbeResult::new(&target.host, target.port),
                };
                debug!(
                    host = %target.host,
                    port = target.port,
                    ms = start.elapsed().as_millis() as u64,
                    "probed target"
                );
                if let Err(err) = sink.emit(&result) {
                    tracing::error!(error = %err, "failed to write probe result");
                }
            }));

            self.limiter.sleep_jitter().await;
        }

        while tasks.next().await.is_some() {}
        self.sink.flush()?;
        Ok(())
    }
}
