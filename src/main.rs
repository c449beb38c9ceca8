//! fsm-agent demo
//!
//! 用法：`fsm-agent [--config path] [--log-trace] <query...>`；打印最终答案与最近 20 条追踪事件。
//! `--log-trace` 时追踪事件改为写入 debug 日志（配合 `RUST_LOG=fsm_agent=debug`），不再打印尾部。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use fsm_agent::agent::create_agent;
use fsm_agent::observability::{self, LogTracer, MemoryTracer};

const TRACE_TAIL: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    let mut log_trace = false;
    loop {
        match args.first().map(String::as_str) {
            Some("--config") => {
                args.remove(0);
                anyhow::ensure!(!args.is_empty(), "--config needs a path");
                config_path = Some(PathBuf::from(args.remove(0)));
            }
            Some("--log-trace") => {
                args.remove(0);
                log_trace = true;
            }
            _ => break,
        }
    }
    let query = if args.is_empty() {
        "What is 17 * 23 + 4? Also, what is an FSM?".to_string()
    } else {
        args.join(" ")
    };

    if log_trace {
        let orchestrator = create_agent(config_path, Arc::new(LogTracer));
        let outcome = orchestrator.run(&query).await;
        println!("state: {}", outcome.state);
        println!("answer: {}", outcome.answer);
        return Ok(());
    }

    let tracer = Arc::new(MemoryTracer::new());
    let orchestrator = create_agent(config_path, tracer.clone());
    let outcome = orchestrator.run(&query).await;

    println!("state: {}", outcome.state);
    println!("answer: {}", outcome.answer);
    println!("--- last {} trace events ---", TRACE_TAIL);
    for event in tracer.tail(TRACE_TAIL) {
        let line = serde_json::to_string(&event).context("serialize trace event")?;
        println!("{}", line);
    }
    Ok(())
}
