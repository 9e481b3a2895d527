//! Application startup
//!
//! Loads settings, brings up the model, wires Ctrl-C to the session and
//! hands the terminal over to the chat loop.

use std::io::{self, Write};
use std::process::ExitCode;

use crate::cli::Args;
use crate::inference::engine::route_llama_logs;
use crate::inference::{EngineError, LlamaEngine};
use crate::session::{InterruptHandle, Session};
use crate::storage::history::HistoryStore;
use crate::storage::settings::load_settings;
use crate::ui;

/// Run the interactive chat; the exit code reflects startup success
pub fn run(args: Args) -> ExitCode {
    let mut settings = load_settings(args.config.as_deref());
    args.apply(&mut settings);
    tracing::info!("Settings resolved: {:?}", settings.model_config());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    // Output errors here only mean the terminal went away
    let _ = ui::print_banner(&mut out);

    route_llama_logs(args.verbose);

    let _ = write!(out, "\n⏳ Loading {} ... ", settings.model_path.display());
    let _ = out.flush();
    let model_config = settings.model_config();
    let engine = match LlamaEngine::load(&model_config) {
        Ok(engine) => engine,
        Err(e) => {
            let _ = writeln!(out);
            report_startup_failure(&e);
            return ExitCode::FAILURE;
        }
    };
    let _ = ui::print_model_loaded(
        &mut out,
        engine.info(),
        model_config.threads,
        model_config.gpu_layers,
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start signal runtime: {}", e);
            eprintln!("❌ Failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut session = Session::new(
        engine,
        HistoryStore::new(&settings.history_dir),
        settings.generation_config(),
        settings.system_prompt.clone(),
    );
    spawn_interrupt_listener(&runtime, session.interrupt_handle());

    let stdin = io::stdin();
    let mut input = stdin.lock();
    if let Err(e) = session.run(&mut input, &mut out) {
        tracing::error!("Terminal I/O failed: {}", e);
    }

    tracing::info!("Session ended");
    ExitCode::SUCCESS
}

/// Ctrl-C stops a streaming reply; at the prompt it only reminds how to exit
fn spawn_interrupt_listener(runtime: &tokio::runtime::Runtime, handle: InterruptHandle) {
    runtime.spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                return;
            }
            if !handle.interrupt() {
                eprintln!("\n⚠️  Type /quit to exit");
            }
        }
    });
}

fn report_startup_failure(err: &EngineError) {
    tracing::error!("Startup failed: {}", err);
    eprintln!("❌ {err}");
    match err {
        EngineError::ModelNotFound(_) => {
            eprintln!("💡 Place a GGUF model there or pass --model <path>");
        }
        EngineError::ModelLoad { .. } => {
            eprintln!("💡 The file may be corrupt or not a GGUF model");
        }
        EngineError::BackendInit(_) => {}
    }
}
