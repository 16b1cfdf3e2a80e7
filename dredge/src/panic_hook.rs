use std::{
    any::Any,
    backtrace::Backtrace,
    panic::{PanicHookInfo, take_hook},
    thread,
};

/// Installs a global panic hook that logs panics via `tracing` before
/// delegating to the previous hook.
pub fn install() {
    let previous_hook = take_hook();

    std::panic::set_hook(Box::new(move |panic_info: &PanicHookInfo<'_>| {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let record = format_panic_record(panic_info);
            tracing::error!(target: "dredge::panic", "{record}");
        }));

        previous_hook(panic_info);
    }));
}

/// Best-effort text of a payload returned by `catch_unwind`.
pub fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "<non-string panic payload>".to_string()
}

fn format_panic_record(panic_info: &PanicHookInfo<'_>) -> String {
    let payload = payload_message(panic_info.payload());
    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "<unknown>".to_string());

    let thread_name = thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| "<unnamed>".to_string());

    let backtrace = Backtrace::capture();

    format!("PANIC thread={thread_name} location={location} payload={payload}\nBacktrace:\n{backtrace}")
}
