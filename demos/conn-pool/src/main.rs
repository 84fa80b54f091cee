mod pool;

use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use argh::FromArgs;

use self::pool::Pool;

/// Upper bound on the simulated query time.
const MAX_BUSY: Duration = Duration::from_millis(250);

#[derive(Debug, FromArgs)]
/// Connection pool backed by a blocking handoff queue
#[argh(help_triggers("--help"))]
struct Args {
    /// number of worker threads
    #[argh(option, arg_name = "int", default = "8")]
    workers: usize,
    /// maximum number of connections the pool may open
    #[argh(option, arg_name = "int", default = "4")]
    max_conns: usize,
    /// how long a checkout waits for an idle connection, in milliseconds
    #[argh(option, arg_name = "int", default = "50")]
    timeout_ms: u64,
    /// checkouts performed by each worker
    #[argh(option, arg_name = "int", default = "16")]
    rounds: usize,
}

pub fn main() -> Result<()> {
    let args = argh::from_env::<Args>();
    tracing_subscriber::fmt()
        .with_thread_names(true)
        .without_time()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    ensure!(args.workers != 0, "workers must not be zero");
    let max_conns =
        NonZeroUsize::new(args.max_conns).ok_or_else(|| anyhow!("max-conns must not be zero"))?;
    let timeout = Duration::from_millis(args.timeout_ms);

    let pool = Pool::new(max_conns);
    tracing::info!(
        "started pool, workers={}, max_conns={max_conns}, timeout={timeout:?}",
        args.workers
    );

    let (pool, rounds) = (&pool, args.rounds);
    let exhausted = std::thread::scope(|cx| -> Result<usize> {
        let workers = (0..args.workers)
            .map(|i| {
                std::thread::Builder::new()
                    .name(format!("worker-{i}"))
                    .spawn_scoped(cx, move || run_worker(pool, rounds, timeout))
                    .map_err(|e| anyhow!("failed to spawn worker-{i}: {e}"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut exhausted = 0;
        for w in workers {
            exhausted += w.join().map_err(|_| anyhow!("worker panicked"))?;
        }
        Ok(exhausted)
    })?;

    let conns = pool.drain();
    let uses = conns.iter().map(|c| c.uses).sum::<usize>();
    tracing::info!(
        "finished, opened={}, checkouts={uses}, exhausted={exhausted}",
        pool.opened()
    );
    ensure!(
        conns.len() == pool.opened(),
        "leaked connections, opened={}, returned={}",
        pool.opened(),
        conns.len()
    );

    Ok(())
}

fn run_worker(pool: &Pool, rounds: usize, timeout: Duration) -> usize {
    let mut exhausted = 0;
    for round in 0..rounds {
        let Some(conn) = pool.checkout(timeout) else {
            tracing::warn!("pool exhausted, round={round}, idle={}", pool.idle());
            exhausted += 1;
            continue;
        };
        tracing::info!("checked out connection, id={}, uses={}", conn.id, conn.uses);

        std::thread::sleep(busy_time(timeout));
        pool.checkin(conn);
    }
    exhausted
}

// Simulated query, up to twice the checkout timeout.
fn busy_time(timeout: Duration) -> Duration {
    let max = timeout.saturating_mul(2).min(MAX_BUSY);
    Duration::from_millis(fastrand::u64(0..=max.as_millis() as u64))
}
