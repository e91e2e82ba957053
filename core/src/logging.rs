use log::Level;
use serde_json::Value;

/// Emit a diagnostic event through the `log` facade.
///
/// Events are ephemeral: nothing is persisted and no caller branches on
/// whether an event was written.
pub fn log_event(
    level: Level,
    code: Option<&str>,
    module: &str,
    message: &str,
    explain: Option<&str>,
    data: Option<Value>,
) {
    if !log::log_enabled!(target: module, level) {
        return;
    }
    let code = code.unwrap_or("-");
    let data = data.map(|v| v.to_string()).unwrap_or_default();
    match explain {
        Some(explain) => {
            log::log!(target: module, level, "[{code}] {message} ({explain}) {data}")
        }
        None => log::log!(target: module, level, "[{code}] {message} {data}"),
    }
}
