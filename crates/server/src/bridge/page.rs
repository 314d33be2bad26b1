use shared::protocol::ActionResponse;
use thiserror::Error;

/// Delay after `load` before the action query is erased from the address bar.
pub const ADDRESS_CLEAR_DELAY_MS: u64 = 300;

pub const RESPONSE_GLOBAL: &str = "__WARDROBE_RESPONSE__";
pub const RESPONSE_EVENT: &str = "wardrobe:response";

/// Outcome of dispatching the current request: either nothing to deliver or
/// exactly one response for the page to pick up.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PendingResult {
    #[default]
    Empty,
    Ready(ActionResponse),
}

impl PendingResult {
    pub fn response(&self) -> Option<&ActionResponse> {
        match self {
            PendingResult::Empty => None,
            PendingResult::Ready(response) => Some(response),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize action response: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Renders the application shell with the pending result embedded as an
/// inline script. The response literal is assigned to the page global before
/// the announcing event fires.
pub fn render_page(pending: &PendingResult, clear_address: bool) -> Result<String, RenderError> {
    let literal = match pending {
        PendingResult::Empty => "null".to_string(),
        PendingResult::Ready(response) => script_safe_json(response)?,
    };

    let mut page = String::with_capacity(SHELL_HEAD.len() + CLIENT_SCRIPT.len() + 512);
    page.push_str(SHELL_HEAD);
    page.push_str("<script>\n");
    page.push_str(CLIENT_SCRIPT);
    page.push_str("</script>\n<script>\n");
    page.push_str(&format!("window.{RESPONSE_GLOBAL} = {literal};\n"));
    page.push_str(&format!(
        "if (window.{RESPONSE_GLOBAL} !== null) {{\n  \
         window.dispatchEvent(new CustomEvent(\"{RESPONSE_EVENT}\", {{ detail: window.{RESPONSE_GLOBAL} }}));\n}}\n"
    ));
    if clear_address {
        page.push_str(&format!(
            "window.addEventListener(\"load\", function () {{\n  \
             setTimeout(function () {{\n    \
             history.replaceState(null, \"\", window.location.pathname);\n  \
             }}, {ADDRESS_CLEAR_DELAY_MS});\n}});\n"
        ));
    }
    page.push_str("</script>\n");
    page.push_str(SHELL_TAIL);
    Ok(page)
}

/// JSON text that is safe inside a `<script>` element. The replaced
/// characters can only occur inside JSON strings, so `\u` escapes keep the
/// literal equivalent.
pub fn script_safe_json(response: &ActionResponse) -> Result<String, RenderError> {
    let json = serde_json::to_string(response)?;
    let mut escaped = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => escaped.push_str("\\u003c"),
            '>' => escaped.push_str("\\u003e"),
            '&' => escaped.push_str("\\u0026"),
            '\u{2028}' => escaped.push_str("\\u2028"),
            '\u{2029}' => escaped.push_str("\\u2029"),
            _ => escaped.push(ch),
        }
    }
    Ok(escaped)
}

const SHELL_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Wardrobe Assistant</title>
<style>
body { font-family: system-ui, sans-serif; margin: 0 auto; max-width: 48rem; padding: 1rem; }
#status { min-height: 1.5rem; }
#status.failure { color: #b00020; }
pre { background: #f4f4f4; padding: 0.75rem; overflow-x: auto; }
</style>
</head>
<body>
<h1>Wardrobe Assistant</h1>
<p id="status"></p>
<pre id="response"></pre>
"#;

const SHELL_TAIL: &str = "</body>\n</html>\n";

// Mirrors ActionRequest::to_query: parameters in call order, lists packed as
// JSON strings, then the cache-buster. Navigation is a full reload.
const CLIENT_SCRIPT: &str = r#"function callAction(action, args) {
  var params = new URLSearchParams();
  params.set("action", action);
  Object.keys(args || {}).forEach(function (key) {
    var value = args[key];
    if (value === undefined || value === null) {
      return;
    }
    params.set(key, Array.isArray(value) ? JSON.stringify(value) : String(value));
  });
  params.set("_t", String(Date.now()));
  window.location.href = window.location.pathname + "?" + params.toString();
}

window.addEventListener("wardrobe:response", function (event) {
  var response = event.detail;
  var status = document.getElementById("status");
  status.className = response.success ? "success" : "failure";
  status.textContent = response.message || (response.success ? "done" : "failed");
  document.getElementById("response").textContent = JSON.stringify(response, null, 2);
});
"#;

#[cfg(test)]
#[path = "tests/page_tests.rs"]
mod tests;
