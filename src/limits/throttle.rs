use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use http::StatusCode;

use crate::context::{Context, Handler};
use crate::filter::Filter;

/// Limits the rate of requests per time duration, globally.
///
/// A background producer emits one token every `per / requests` onto a
/// bounded channel pre-loaded with `burst` credits. A request either takes a
/// token without blocking or is dropped with HTTP status 429.
pub struct Throttle {
    /// Requests allowed per `per` duration.
    pub requests: u32,

    /// Burst credits allowed before the time limit is enforced.
    pub burst: u32,

    /// The unit of time to quantize requests over.
    pub per: Duration,

    limiter: Arc<OnceLock<Mutex<Receiver<Instant>>>>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self {
            requests: 100,
            burst: 0,
            per: Duration::from_secs(1),
            limiter: Arc::new(OnceLock::new()),
        }
    }
}

impl Throttle {
    /// A throttle of `requests` per `per`, with `burst` initial credits.
    pub fn new(requests: u32, burst: u32, per: Duration) -> Self {
        Self {
            requests,
            burst,
            per,
            limiter: Arc::new(OnceLock::new()),
        }
    }

    /// A throttle of `requests` per second.
    pub fn per_second(requests: u32) -> Self {
        Self {
            requests,
            ..Self::default()
        }
    }

    /// Start the token producer. The channel is bounded so idle periods
    /// cannot accumulate more than the burst allowance.
    fn process(requests: u32, burst: u32, per: Duration) -> Receiver<Instant> {
        let (tx, rx) = sync_channel(burst.max(1) as usize);
        let tick = per / requests;
        thread::spawn(move || {
            for _ in 0..burst {
                let _ = tx.try_send(Instant::now());
            }
            loop {
                thread::sleep(tick);
                // blocks while the bucket is full; errors once the receiver
                // is gone, which ends the producer
                if tx.send(Instant::now()).is_err() {
                    return;
                }
            }
        });
        rx
    }
}

impl Filter for Throttle {
    fn run(&self, next: Handler) -> Handler {
        let requests = if self.requests == 0 { 100 } else { self.requests };
        let per = if self.per.is_zero() {
            Duration::from_secs(1)
        } else {
            self.per
        };
        let burst = self.burst;
        let limiter = self.limiter.clone();
        limiter.get_or_init(|| Mutex::new(Self::process(requests, burst, per)));

        Arc::new(move |ctx: &mut Context<'_>| {
            let taken = limiter
                .get()
                .expect("throttle limiter initialized in run")
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .try_recv()
                .is_ok();
            if taken {
                next(ctx);
            } else {
                ctx.error(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests");
            }
        })
    }
}
