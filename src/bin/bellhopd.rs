//! Bellhop daemon - owns the chat connection and the question registry.
//!
//! The bellhopd binary is a long-running background process that:
//! - Accepts IPC connections from session adapters over a Unix domain socket
//! - Tracks live sessions and hands out short labels ("proj/1", "proj/2")
//! - Persists questions and arbitrates answer/timeout/cancel races
//! - Relays questions and notices to the configured chat channel
//! - Handles graceful shutdown on SIGTERM/SIGINT
//!
//! ## Usage
//!
//! The daemon is typically started automatically by an adapter when needed.
//! Manual start: `bellhopd`
//!
//! ## Files
//!
//! All state lives in the scope runtime directory
//! (`~/.bellhop/daemon/<scope>/`):
//!
//! - `bellhopd.sock` - Unix socket for IPC
//! - `bellhopd.pid` - PID file for process tracking
//! - `daemon.log` - Daemon log file, rotated daily
//! - `questions.db` - Persisted question store

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use uuid::Uuid;

use bellhop::daemon::listener::{IpcConnection, IpcListener};
use bellhop::daemon::protocol::{
    AskQuestionResult, CheckAnswersResult, CreateTopicResult, ListQuestionsResult,
    ListSessionsResult, Method, PingResult, RegisterSessionResult, Request, ResolveResult,
    Response, decode_request, write_response,
};
use bellhop::daemon::state::DaemonState;
use bellhop::db::connection::{create_pool, run_migrations};
use bellhop::error::BellhopError;
use bellhop::notifier;
use bellhop::services::global_config as global_config_service;

/// How often uncollected terminal questions are swept out of the store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Scope runtime directory holds every file the daemon touches
    let runtime_dir = global_config_service::ensure_scope_runtime_dir()?;

    // Initialize logging to the daemon log file
    let _guard = init_logging(&runtime_dir)?;

    tracing::info!("bellhopd starting, version {}", env!("CARGO_PKG_VERSION"));

    // Write PID file
    let pid_path = global_config_service::pid_path()?;
    std::fs::write(&pid_path, std::process::id().to_string())?;

    // Chat notifier from global config; absent credentials disable it
    let config = global_config_service::load()?;
    let chat = notifier::from_config(&config)?;

    // Open the question store
    let pool = create_pool(&global_config_service::db_path()?).await?;
    run_migrations(&pool).await?;

    let state = Arc::new(DaemonState::new(pool, chat, &config));

    // Re-arm questions that were pending when the previous daemon stopped
    if let Err(e) = state.questions.recover().await {
        tracing::warn!("Failed to recover pending questions: {}", e);
    }

    // Start IPC listener
    let listener = {
        let socket_path = global_config_service::socket_path()?;
        let listener = IpcListener::bind(&socket_path).await?;
        tracing::info!("bellhopd listening on {:?}", listener.socket_path());
        listener
    };

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    // Periodic sweep of terminal questions nobody collected
    let mut sweep_interval = tokio::time::interval(SWEEP_INTERVAL);
    // Skip the first immediate tick
    sweep_interval.tick().await;

    loop {
        select! {
            // Handle shutdown signals
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, shutting down...");
                break;
            }

            // Shutdown requested over IPC
            _ = state.shutdown_requested() => {
                tracing::info!("Shutdown requested via IPC");
                break;
            }

            // Periodic question sweep
            _ = sweep_interval.tick() => {
                state.questions.sweep().await;
            }

            // Accept new connections
            result = listener.accept() => {
                match result {
                    Ok(conn) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::error!("Connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                    }
                }
            }
        }
    }

    // Let queued responses (the shutdown ack among them) flush
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Clean up PID file
    let _ = std::fs::remove_file(&pid_path);

    tracing::info!("bellhopd shutdown complete");
    Ok(())
}

/// Serve one adapter connection.
///
/// Each request runs in its own task and writes its response through a
/// shared channel, so a long-poll never blocks the connection's read loop;
/// responses may leave out of request order and are correlated by id.
///
/// Malformed lines are answered in-band with the salvaged request id. Only
/// an unrecoverable stream (buffer cap exceeded, EOF mid-line) closes the
/// connection, and closing reaps the connection's sessions.
async fn handle_connection(conn: IpcConnection, state: Arc<DaemonState>) -> anyhow::Result<()> {
    let client_id = Uuid::new_v4();
    tracing::debug!(%client_id, "adapter connected");

    let (mut reader, mut writer) = conn.into_split();

    // Single writer task keeps response lines atomic under pipelining
    let (tx, mut rx) = mpsc::channel::<Response>(64);
    tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            if let Err(e) = write_response(&mut writer, &response).await {
                tracing::debug!("response write failed: {}", e);
                break;
            }
        }
    });

    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            // Clean EOF: the adapter hung up
            Ok(None) => break,
            Err(e) => {
                // Cap overflow or truncated stream: the line boundary is
                // lost, nothing further can be parsed safely
                tracing::warn!(%client_id, "closing connection: {}", e);
                break;
            }
        };

        let request = match decode_request(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%client_id, code = %e.code, "undecodable request: {}", e.message);
                let _ = tx.send(Response::err_code(e.id, e.code, e.message)).await;
                continue;
            }
        };

        let state = Arc::clone(&state);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = dispatch(request, client_id, &state).await;
            let _ = tx.send(response).await;
        });
    }

    // Reap immediately; straggling long-polls drain on their own and their
    // responses fail harmlessly against the closed writer
    state.registry.handle_disconnect(client_id);
    tracing::debug!(%client_id, "adapter disconnected");
    Ok(())
}

/// Route one request to the owning service and shape the outcome for the
/// wire. Every service failure becomes an error response here; nothing
/// propagates past the dispatch boundary.
async fn dispatch(request: Request, client_id: Uuid, state: &DaemonState) -> Response {
    let id = request.id;

    match request.method {
        Method::Ping => Response::ok(
            id,
            PingResult {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: state.uptime_secs(),
                sessions: state.registry.count(),
                pending_questions: state.questions.pending_count(),
            },
        ),

        Method::Shutdown => {
            // Acknowledge first; the main loop exits after the ack flushes
            state.request_shutdown();
            Response::ok_empty(id)
        }

        Method::RegisterSession(params) => {
            match state.registry.register(client_id, &params.project_root) {
                Ok(session) => Response::ok(
                    id,
                    RegisterSessionResult {
                        session_id: session.id,
                        label: session.label,
                    },
                ),
                Err(e) => Response::from_error(id, &e),
            }
        }

        Method::UnregisterSession { session_id } => {
            match state.registry.unregister(client_id, &session_id) {
                Ok(()) => Response::ok_empty(id),
                Err(e) => Response::from_error(id, &e),
            }
        }

        Method::UpdateSessionStatus(params) => match state.registry.update_status(
            client_id,
            &params.session_id,
            params.status,
            params.question_title,
        ) {
            Ok(session) => Response::ok(id, session),
            Err(e) => Response::from_error(id, &e),
        },

        Method::ListSessions => Response::ok(
            id,
            ListSessionsResult {
                sessions: state.registry.list(),
            },
        ),

        Method::AskBlockingQuestion(params) => {
            // The session must exist; its label tags the chat delivery
            let session = state.registry.get(&params.session_id);
            match session {
                Some(session) => {
                    let input = params.into_new_question(state.default_timeout_minutes);
                    match state.questions.ask(input, &session.label).await {
                        Ok(question) => Response::ok(id, AskQuestionResult { question }),
                        Err(e) => Response::from_error(id, &e),
                    }
                }
                None => Response::from_error(
                    id,
                    &BellhopError::SessionNotFound(params.session_id),
                ),
            }
        }

        Method::CheckQuestionAnswers(params) => {
            match state
                .questions
                .check_answers(&params.session_id, &params.question_ids, params.wait_seconds)
                .await
            {
                Ok((answers, pending)) => {
                    Response::ok(id, CheckAnswersResult { answers, pending })
                }
                Err(e) => Response::from_error(id, &e),
            }
        }

        Method::MarkQuestionAnswered {
            question_id,
            answer,
        } => match state.questions.deliver_answer(&question_id, &answer).await {
            Ok(question) => Response::ok(
                id,
                ResolveResult {
                    resolved: true,
                    status: question.status,
                },
            ),
            // Losing the transition race is a reportable no-op, not a failure
            Err(BellhopError::QuestionAlreadyResolved(_, status)) => Response::ok(
                id,
                ResolveResult {
                    resolved: false,
                    status,
                },
            ),
            Err(e) => Response::from_error(id, &e),
        },

        Method::CancelQuestion {
            question_id,
            reason,
        } => match state.questions.cancel(&question_id, reason.as_deref()).await {
            Ok(question) => Response::ok(
                id,
                ResolveResult {
                    resolved: true,
                    status: question.status,
                },
            ),
            Err(BellhopError::QuestionAlreadyResolved(_, status)) => Response::ok(
                id,
                ResolveResult {
                    resolved: false,
                    status,
                },
            ),
            Err(e) => Response::from_error(id, &e),
        },

        Method::ListQuestions { session_id } => {
            let mut questions = state.questions.list();
            if let Some(session_id) = session_id {
                questions.retain(|q| q.session_id == session_id);
            }
            Response::ok(id, ListQuestionsResult { questions })
        }

        Method::SendMessage { text, thread_id } => {
            match state.notifier.send_message(&text, thread_id.as_deref()).await {
                Ok(()) => Response::ok_empty(id),
                Err(e) => Response::from_error(id, &e),
            }
        }

        Method::SendStatusUpdate { session_id, text } => {
            match state.registry.get(&session_id) {
                Some(session) => {
                    let line = format!("💬 [{}] {}", session.label, text);
                    match state.notifier.send_message(&line, None).await {
                        Ok(()) => Response::ok_empty(id),
                        Err(e) => Response::from_error(id, &e),
                    }
                }
                None => {
                    Response::from_error(id, &BellhopError::SessionNotFound(session_id))
                }
            }
        }

        Method::CreateTopic { name } => match state.notifier.create_topic(&name).await {
            Ok(thread_id) => Response::ok(id, CreateTopicResult { thread_id }),
            Err(e) => Response::from_error(id, &e),
        },
    }
}

/// Initialize file-based logging for the daemon with daily rotation.
///
/// Sets up tracing-subscriber with a non-blocking file appender that writes
/// to `daemon.log` in the scope runtime directory. Log files are rotated
/// daily with timestamps appended to the filename.
///
/// The returned `WorkerGuard` must be kept alive for the duration of the
/// program to ensure all logs are flushed.
fn init_logging(runtime_dir: &std::path::Path) -> anyhow::Result<WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    // Creates files like: daemon.log.2026-08-21
    let file_appender =
        tracing_appender::rolling::daily(runtime_dir, global_config_service::LOG_FILE_PREFIX);

    // Make it non-blocking for better performance
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    Ok(guard)
}
