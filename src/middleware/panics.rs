use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Once};

use futures_util::FutureExt;

use super::Middleware;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::metrics::Metrics;
use crate::request::Request;

thread_local! {
    /// Backtrace of the most recent panic on this thread, taken before unwinding.
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

/// Chains a hook in front of the existing one that records where the panic
/// happened. The recovery point runs after the unwind, when those frames are
/// already gone.
fn install_trace_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            let _ = PANIC_TRACE.try_with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> String {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Recovers panics raised anywhere inside the wrapped handler.
///
/// Both a panic while building the inner future and one while polling it are
/// caught. The panic becomes [`Error::Panic`] with the payload and the
/// backtrace of the panic site, and the panic counter goes up by one. Errors
/// the inner layers return normally are passed through as they are.
///
/// The first call installs a process-wide panic hook; any hook set before it
/// keeps running.
pub fn panics(metrics: Arc<Metrics>) -> Middleware {
    install_trace_hook();
    Middleware::new(move |next: BoxedHandler| {
        let metrics = Arc::clone(&metrics);
        (move |req: Request| {
            let next = Arc::clone(&next);
            let metrics = Arc::clone(&metrics);
            async move {
                let outcome = match catch_unwind(AssertUnwindSafe(|| next.call(req))) {
                    Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                    Err(payload) => Err(payload),
                };

                outcome.unwrap_or_else(|payload| {
                    metrics.add_panics();
                    Err(Error::Panic {
                        message: panic_message(payload.as_ref()),
                        trace: take_panic_trace(),
                    })
                })
            }
        })
        .into_boxed_handler()
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
