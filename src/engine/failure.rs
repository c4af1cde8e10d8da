//! Captured failures: the `exception` block of a report.
//!
//! Errors arrive as `anyhow::Error`; panics arrive as unwind payloads. Both are
//! turned into a [`Failure`] carrying a kind, a message and the stack frames
//! that led to it.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::sync::Once;

use serde::{Deserialize, Serialize};

use crate::tasks::TaskError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub backtrace: Vec<String>,
}

struct PanicRecord {
    location: Option<String>,
    frames: Vec<String>,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicRecord>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// First backtrace entry when the frames were taken where the error was caught.
pub const CATCH_SITE_MARKER: &str = "(caught at the task boundary; no backtrace was captured where the error was raised)";

/// Make anyhow capture a backtrace wherever an error is created.
///
/// Leaves an explicit `RUST_LIB_BACKTRACE` setting alone. std reads the
/// variable once, at the first capture, so this must run before any error
/// is created.
///
/// # Safety
///
/// Mutates the process environment: no other thread may be running.
pub unsafe fn enable_error_backtraces() {
    if std::env::var_os("RUST_LIB_BACKTRACE").is_none() {
        // SAFETY: the caller guarantees the process is still single-threaded.
        unsafe { std::env::set_var("RUST_LIB_BACKTRACE", "1") };
    }
}

/// Install a panic hook that records where a panic happened, then defers to
/// the hook that was installed before it.
///
/// The record lives in a thread-local so [`Failure::from_panic`] can pick it up
/// after `catch_unwind` returns on the same thread. Safe to call repeatedly.
pub fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            let frames = backtrace_frames(&Backtrace::force_capture());

            tracing::debug!(
                location = location.as_deref().unwrap_or("unknown"),
                frames = frames.len(),
                "Recorded panic"
            );

            LAST_PANIC.with(|slot| {
                *slot.borrow_mut() = Some(PanicRecord { location, frames });
            });

            previous(info);
        }));
    });
}

impl Failure {
    /// Build a failure with a backtrace captured at the call site.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut backtrace = backtrace_frames(&Backtrace::force_capture());
        if backtrace.is_empty() {
            backtrace.push(message.clone());
        }
        Self {
            kind: kind.into(),
            message,
            backtrace,
        }
    }

    /// Build a failure from an error. The frames are the ones anyhow captured
    /// where the error was created (see [`enable_error_backtraces`]); without
    /// them the stack is taken here and its first entry says so.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let message = format!("{:#}", err);

        let captured = err.backtrace();
        let mut backtrace = if captured.status() == BacktraceStatus::Captured {
            backtrace_frames(captured)
        } else {
            let frames = backtrace_frames(&Backtrace::force_capture());
            if frames.is_empty() {
                frames
            } else {
                std::iter::once(CATCH_SITE_MARKER.to_string())
                    .chain(frames)
                    .collect()
            }
        };
        if backtrace.is_empty() {
            backtrace = err.chain().map(|cause| cause.to_string()).collect();
        }

        Self {
            kind: error_kind(err),
            message,
            backtrace,
        }
    }

    /// Build a failure from a `catch_unwind` payload. Uses the frames recorded
    /// by the panic hook when one is installed.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload_message(payload.as_ref());
        let record = LAST_PANIC.with(|slot| slot.borrow_mut().take());

        let backtrace = match record {
            Some(PanicRecord { frames, .. }) if !frames.is_empty() => frames,
            Some(PanicRecord {
                location: Some(location),
                ..
            }) => vec![location],
            _ => vec![message.clone()],
        };

        Self {
            kind: "panic".to_string(),
            message,
            backtrace,
        }
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Name the root cause of an error by its type, for the known ones.
fn error_kind(err: &anyhow::Error) -> String {
    let root = err.root_cause();

    if let Some(task_err) = root.downcast_ref::<TaskError>() {
        return format!("TaskError::{}", task_err.variant_name());
    }
    if root.is::<std::io::Error>() {
        return "std::io::Error".to_string();
    }
    if root.is::<serde_json::Error>() {
        return "serde_json::Error".to_string();
    }
    if root.is::<serde_yml::Error>() {
        return "serde_yml::Error".to_string();
    }
    if root.is::<reqwest::Error>() {
        return "reqwest::Error".to_string();
    }
    if root.is::<sqlx::Error>() {
        return "sqlx::Error".to_string();
    }
    if root.is::<std::num::ParseIntError>() {
        return "std::num::ParseIntError".to_string();
    }
    if root.is::<std::num::ParseFloatError>() {
        return "std::num::ParseFloatError".to_string();
    }
    if root.is::<chrono::ParseError>() {
        return "chrono::ParseError".to_string();
    }
    "anyhow::Error".to_string()
}

/// Split a rendered backtrace into one string per frame.
///
/// A frame is a `N: symbol` line plus any `at file:line` lines under it.
pub fn backtrace_frames(backtrace: &Backtrace) -> Vec<String> {
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }

    let rendered = backtrace.to_string();
    let mut frames: Vec<String> = Vec::new();

    for line in rendered.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let starts_frame = trimmed
            .split_once(':')
            .is_some_and(|(index, _)| !index.is_empty() && index.chars().all(|c| c.is_ascii_digit()));

        if starts_frame {
            frames.push(trimmed.to_string());
        } else if let Some(last) = frames.last_mut() {
            last.push(' ');
            last.push_str(trimmed);
        } else {
            frames.push(trimmed.to_string());
        }
    }

    frames
}
