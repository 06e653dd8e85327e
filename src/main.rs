// SPDX-License-Identifier: BSD-3-Clause
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use tracing_flame::FlameLayer;
use tracing_subscriber::{fmt as tfmt, prelude::*};

use spds::analysis::{ForwardResults, OneWeights, PathWeights, WeightFunctions};
use spds::ir::Program;
use spds::layers;
use spds::scope::{DataFlowScope, IncludeAll, RegexScope};
use spds::weight::{DataFlowPath, Weight};
use spds::{BackwardQuery, Boomerang, ForwardQuery, Options};

mod cli;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn setup_global_subscriber() -> Result<impl Drop> {
    let filter_layer = tracing::level_filters::LevelFilter::TRACE;
    let fmt_layer = tfmt::Layer::default().with_writer(io::stderr);
    let (flame_layer, guard) =
        FlameLayer::with_file("./tracing.folded").context("Couldn't create ./tracing.folded")?;
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(flame_layer)
        .with(layers::NanoCountLayer)
        .with(cfg!(feature = "count").then(layers::ExecCountLayer::default))
        .init();
    Ok(guard)
}

/// Solves each query, on its own thread with `par`.
fn solve_all<Q, R, F>(queries: &[Q], solve: F) -> Result<Vec<R>>
where
    Q: Sync + fmt::Display,
    R: Send,
    F: Fn(&Q) -> spds::Result<R> + Sync,
{
    #[cfg(feature = "par")]
    {
        std::thread::scope(|s| {
            let handles: Vec<_> = queries
                .iter()
                .map(|q| s.spawn(|| solve(q).with_context(|| format!("Couldn't solve {q}"))))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().map_err(|_| anyhow!("Query thread panicked"))?)
                .collect()
        })
    }
    #[cfg(not(feature = "par"))]
    {
        queries
            .iter()
            .map(|q| solve(q).with_context(|| format!("Couldn't solve {q}")))
            .collect()
    }
}

/// Runs and prints every query. Returns whether any timed out.
fn analyze<W: Weight>(
    program: &Program,
    scope: &dyn DataFlowScope,
    weights: &dyn WeightFunctions<W>,
    options: Options,
    args: &cli::Args,
    print_paths: impl Fn(&ForwardResults<W>, &mut dyn Write) -> io::Result<()>,
) -> Result<bool> {
    let boomerang = Boomerang::new(program, scope, weights, options);
    let mut stdout = io::stdout().lock();
    let mut timed_out = false;

    if args.forward {
        let queries = program
            .allocation_sites()
            .into_iter()
            .map(|(s, l)| ForwardQuery::new(s, l))
            .collect::<spds::Result<Vec<_>>>()
            .context("Bad allocation site")?;
        for r in solve_all(&queries, |q| boomerang.solve_forward(q))? {
            timed_out |= r.timed_out;
            if !args.quiet {
                writeln!(stdout, "{}", r.query)?;
                for n in r.nodes() {
                    writeln!(stdout, "  {n}")?;
                }
                for m in &r.invoked_methods {
                    writeln!(stdout, "  invokes {m}")?;
                }
                if r.contains_call_recursion {
                    writeln!(stdout, "  call recursion")?;
                }
                if r.contains_field_loop {
                    writeln!(stdout, "  field loop")?;
                }
                print_paths(&r, &mut stdout)?;
            }
            if r.timed_out {
                writeln!(stdout, "  timed out")?;
            }
            if args.stats {
                writeln!(stdout, "  {}", r.stats)?;
            }
        }
    } else {
        let queries = program
            .calls_named("queryFor")
            .map(|cs| BackwardQuery::for_invoke_arg(cs.clone(), 0))
            .collect::<spds::Result<Vec<_>>>()
            .context("Bad call to queryFor")?;
        for r in solve_all(&queries, |q| boomerang.solve_backward(q))? {
            timed_out |= r.timed_out;
            if !args.quiet {
                writeln!(stdout, "{}", r.query)?;
                for a in &r.allocation_sites {
                    writeln!(stdout, "  allocation {}", a.node())?;
                }
                for a in &r.aliases {
                    writeln!(stdout, "  alias {a}")?;
                }
            }
            if r.timed_out {
                writeln!(stdout, "  timed out")?;
            }
            if args.stats {
                writeln!(stdout, "  {}", r.stats)?;
            }
        }
    }
    if args.stats {
        writeln!(stdout, "call graph edges: {}", boomerang.callgraph().len())?;
    }
    Ok(timed_out)
}

fn print_paths(r: &ForwardResults<DataFlowPath>, out: &mut dyn Write) -> io::Result<()> {
    for n in r.nodes() {
        if let Some(path) = r.data_flow_path(n) {
            writeln!(out, "  path to {n}")?;
            for e in path {
                writeln!(out, "    {e}")?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = cli::Args::parse();

    let _guard = if args.tracing {
        Some(setup_global_subscriber()?)
    } else {
        None
    };

    let scope: Box<dyn DataFlowScope> = if let Some(scope_path) = &args.scope {
        let scope_string =
            std::fs::read_to_string(scope_path).context("Couldn't read analysis scope")?;
        Box::new(RegexScope::from_json(&scope_string).context("Couldn't construct analysis scope")?)
    } else {
        Box::new(IncludeAll)
    };

    let program_string = std::fs::read_to_string(&args.program).with_context(|| {
        format!("Couldn't read program at {}", args.program.display())
    })?;
    let program = Program::from_json(&program_string).context("Malformed program")?;

    let options = Options {
        timeout: (args.timeout_ms > 0).then(|| Duration::from_millis(args.timeout_ms)),
        max_steps: args.max_steps,
        on_the_fly_call_graph: args.on_the_fly,
        track_data_flow_path: args.path || args.prune,
        prune_contradictory_data_flow_path: args.prune,
        check_assertions: args.check != cli::Check::None,
        compute_aliases: !args.forward,
    };

    let timed_out = if options.track_data_flow_path {
        analyze(&program, scope.as_ref(), &PathWeights, options, &args, print_paths)?
    } else {
        analyze(&program, scope.as_ref(), &OneWeights, options, &args, |_, _| Ok(()))?
    };

    if let cli::Check::Strict = args.check {
        if timed_out {
            return Err(anyhow!("Some queries timed out!"));
        }
    }

    Ok(())
}
