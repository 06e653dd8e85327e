// SPDX-License-Identifier: BSD-3-Clause
use std::time::Instant;

use tracing::{Id, Subscriber};
use tracing_subscriber::{layer::Context, registry::LookupSpan, Layer};

/// Prints the time spent in each span, in nanoseconds, when it is exited.
#[derive(Debug, Default)]
pub struct NanoCountLayer;

impl<S> Layer<S> for NanoCountLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().replace(Instant::now());
        }
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(start) = span.extensions().get::<Instant>() {
                eprintln!("nanos {}: {}", span.name(), start.elapsed().as_nanos())
            }
        }
    }
}
