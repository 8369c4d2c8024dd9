//! Developer timing records (`dev6!`).
//!
//! Each record is one JSON object tagged with a `bench` name, logged at trace level under
//! [`DEV6_TARGET`](crate::logger::DEV6_TARGET). Tests can capture the records of their own
//! thread with [`capture`].

use serde_json::{Map, Value};
use std::cell::RefCell;

thread_local! {
    static CAPTURED: RefCell<Option<Vec<Value>>> = const { RefCell::new(None) };
}

/// Stops capturing on drop.
#[must_use = "capturing stops when the guard is dropped"]
pub struct CaptureGuard(());

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

/// Starts capturing records emitted on the current thread.
pub fn capture() -> CaptureGuard {
    CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
    CaptureGuard(())
}

/// Captured records whose `bench` is `bench`, oldest first. Empty when not capturing.
#[must_use]
pub fn captured(bench: &str) -> Vec<Value> {
    CAPTURED.with(|c| {
        c.borrow()
            .iter()
            .flatten()
            .filter(|v| v.get("bench").and_then(Value::as_str) == Some(bench))
            .cloned()
            .collect()
    })
}

/// Takes every captured record, leaving capture on.
pub fn drain() -> Vec<Value> {
    CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Tags `fields` with `bench`, logs it and captures it if enabled. Non-object payloads are
/// wrapped under `value`.
pub fn emit(bench: &str, fields: Value) {
    let mut record = match fields {
        Value::Object(m) => m,
        other => Map::from_iter([("value".to_string(), other)]),
    };
    record.insert("bench".into(), Value::String(bench.to_string()));
    let record = Value::Object(record);
    log::trace!(target: crate::logger::DEV6_TARGET, "{record}");
    CAPTURED.with(|c| {
        if let Some(buf) = c.borrow_mut().as_mut() {
            buf.push(record);
        }
    });
}

/// `dev6!("query", { "op": "find", "matched": n })`
macro_rules! dev6 {
    ($bench:expr, { $($body:tt)* }) => {
        $crate::utils::devlog::emit($bench, serde_json::json!({ $($body)* }))
    };
}
pub(crate) use dev6;
