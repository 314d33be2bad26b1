use std::{collections::HashMap, time::Duration};

use server_api::{handle, ApiContext};
use shared::protocol::{
    ActionRequest, ActionResponse, ProtocolError, ACTION_KEY, INVALID_ITEM_IDS_MESSAGE,
};
use tracing::{debug, warn};

pub mod page;

pub use page::{render_page, PendingResult};

/// Turns the current query into at most one handler call.
///
/// No action, or an action nobody handles, yields `Empty` without touching a
/// handler. A malformed item-id list is answered here and never reaches the
/// batch handler.
pub async fn dispatch(
    ctx: &ApiContext,
    params: &HashMap<String, String>,
    timeout: Duration,
) -> PendingResult {
    let request = match ActionRequest::from_query(params) {
        Ok(Some(request)) => request,
        Ok(None) => return PendingResult::Empty,
        Err(ProtocolError::InvalidItemIds(detail)) => {
            warn!(%detail, "rejecting batch request with malformed item ids");
            return PendingResult::Ready(ActionResponse::failure(INVALID_ITEM_IDS_MESSAGE));
        }
        Err(err @ ProtocolError::UnknownAction(_)) => {
            warn!(error = %err, "ignoring action");
            return PendingResult::Empty;
        }
    };
    PendingResult::Ready(run_action(ctx, request, timeout).await)
}

/// Runs one decoded request, giving up after `timeout`.
pub async fn run_action(
    ctx: &ApiContext,
    request: ActionRequest,
    timeout: Duration,
) -> ActionResponse {
    let action = request.action();
    debug!(%action, "dispatching action");
    match tokio::time::timeout(timeout, handle(ctx, request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%action, timeout_secs = timeout.as_secs(), "action timed out");
            ActionResponse::failure(timed_out_message(timeout))
        }
    }
}

pub fn timed_out_message(timeout: Duration) -> String {
    format!("request timed out after {}s", timeout.as_secs())
}

/// The address bar is cleared whenever the request carried an action key,
/// including one that named no known action.
pub fn carries_action(params: &HashMap<String, String>) -> bool {
    params.contains_key(ACTION_KEY)
}

#[cfg(test)]
#[path = "tests/dispatch_tests.rs"]
mod tests;
