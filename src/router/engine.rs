//! Extension command engine.
//!
//! Implements `vibium:find`, `vibium:click`, and `vibium:type` by composing
//! BiDi primitives:
//!
//! 1. Resolve a single deadline from the `timeout` param (default 30 s).
//! 2. Resolve the browsing context (`browsingContext.getTree` when absent).
//! 3. Poll for the element with `script.callFunction` every 100 ms.
//! 4. For click/type: `input.performActions`, then the navigation waits the
//!    wait policy enables, each bounded by the remaining deadline.
//!
//! Navigation listeners are registered before the action is issued and are
//! removed on every exit arc — success, timeout, or error — via the
//! listener handle's drop.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::protocol::command::{
    key_type, pointer_click, CallFunctionParams, CallFunctionResult, GetTreeResult,
    PerformActionsParams, ScriptArgument, Target,
};
use crate::protocol::extension::{
    effective_timeout_ms, ClickParams, ElementInfo, FindParams, TypeParams, WaitBehavior,
};
use crate::protocol::Frame;
use crate::router::listeners::EventListener;
use crate::router::session::{
    Session, EVENT_DOM_CONTENT_LOADED, EVENT_LOAD, EVENT_NAVIGATION_STARTED,
};

// ============================================================================
// Constants
// ============================================================================

/// Element polling interval.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Script evaluated in the page per polling attempt.
///
/// Returns a JSON string describing the element, or `null` while it does
/// not exist.
const FIND_ELEMENT_SCRIPT: &str = r"(selector) => {
  const el = document.querySelector(selector);
  if (!el) return null;
  const r = el.getBoundingClientRect();
  return JSON.stringify({
    tag: el.tagName.toLowerCase(),
    text: (el.textContent||'').trim().substring(0,100),
    box: { x: r.x, y: r.y, width: r.width, height: r.height }
  });
}";

// ============================================================================
// Deadline
// ============================================================================

/// A single deadline shared by every stage of one extension command.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    end: Instant,
    total_ms: u64,
}

impl Deadline {
    /// Starts a deadline `total_ms` from now.
    fn after_ms(total_ms: u64) -> Self {
        Self {
            end: Instant::now() + Duration::from_millis(total_ms),
            total_ms,
        }
    }

    /// Time left, saturating at zero.
    fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the deadline has passed.
    fn expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The full timeout, for error messages.
    fn total_ms(&self) -> u64 {
        self.total_ms
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

/// Handles one `vibium:find` command to completion.
pub(crate) async fn handle_find(session: Arc<Session>, command_id: u64, params: Value) {
    let params: FindParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => {
            session.respond_error(command_id, &Error::invalid_params(e.to_string()));
            return;
        }
    };

    let deadline = Deadline::after_ms(effective_timeout_ms(params.timeout));
    match find(&session, &params, deadline).await {
        Ok(info) => match serde_json::to_value(&info) {
            Ok(result) => session.respond_success(command_id, result),
            Err(e) => session.respond_error(command_id, &e.into()),
        },
        Err(e) => session.respond_error(command_id, &e),
    }
}

/// Handles one `vibium:click` command to completion.
pub(crate) async fn handle_click(session: Arc<Session>, command_id: u64, params: Value) {
    let params: ClickParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => {
            session.respond_error(command_id, &Error::invalid_params(e.to_string()));
            return;
        }
    };

    let deadline = Deadline::after_ms(effective_timeout_ms(params.timeout));
    match click(&session, &params, deadline).await {
        Ok(()) => session.respond_success(command_id, json!({"clicked": true})),
        Err(e) => session.respond_error(command_id, &e),
    }
}

/// Handles one `vibium:type` command to completion.
pub(crate) async fn handle_type(session: Arc<Session>, command_id: u64, params: Value) {
    let params: TypeParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => {
            session.respond_error(command_id, &Error::invalid_params(e.to_string()));
            return;
        }
    };

    let deadline = Deadline::after_ms(effective_timeout_ms(params.timeout));
    match type_text(&session, &params, deadline).await {
        Ok(()) => session.respond_success(command_id, json!({"typed": true})),
        Err(e) => session.respond_error(command_id, &e),
    }
}

// ============================================================================
// Command Bodies
// ============================================================================

async fn find(session: &Session, params: &FindParams, deadline: Deadline) -> Result<ElementInfo> {
    let context = resolve_context(session, params.context.as_deref()).await?;
    wait_for_element(session, &context, &params.selector, deadline).await
}

async fn click(session: &Session, params: &ClickParams, deadline: Deadline) -> Result<()> {
    let context = resolve_context(session, params.context.as_deref()).await?;
    let info = wait_for_element(session, &context, &params.selector, deadline).await?;
    let (x, y) = info.bounds.center();
    debug!(selector = %params.selector, x, y, "clicking element center");

    let mut waiters = NavWaiters::register(session, params.wait_behavior);
    perform_actions(session, pointer_click(&context, x, y)).await?;
    waiters.await_stages(session, params.wait_behavior, deadline).await
}

async fn type_text(session: &Session, params: &TypeParams, deadline: Deadline) -> Result<()> {
    let context = resolve_context(session, params.context.as_deref()).await?;
    let info = wait_for_element(session, &context, &params.selector, deadline).await?;
    let (x, y) = info.bounds.center();
    debug!(selector = %params.selector, chars = params.text.chars().count(), "typing into element");

    // Click first to focus the element.
    perform_actions(session, pointer_click(&context, x, y)).await?;

    let mut waiters = NavWaiters::register(session, params.wait_behavior);
    perform_actions(session, key_type(&context, &params.text)).await?;
    waiters.await_stages(session, params.wait_behavior, deadline).await
}

// ============================================================================
// Prologue Steps
// ============================================================================

/// Resolves the browsing context: explicit param, or the first top-level
/// context from `browsingContext.getTree`.
async fn resolve_context(session: &Session, context: Option<&str>) -> Result<String> {
    if let Some(context) = context {
        if !context.is_empty() {
            return Ok(context.to_string());
        }
    }

    let frame = session
        .send_internal("browsingContext.getTree", json!({}))
        .await?;
    let result = Frame::from_value(frame).into_result()?;
    let tree: GetTreeResult = serde_json::from_value(result)
        .map_err(|e| Error::protocol(format!("malformed getTree result: {e}")))?;

    tree.contexts
        .into_iter()
        .next()
        .map(|entry| entry.context)
        .ok_or(Error::NoContext)
}

/// Polls for the element until it appears or the deadline expires.
///
/// A failed attempt — browser error, malformed result, or `null` — counts
/// as "not yet"; only the deadline ends the loop. A stopped session aborts
/// immediately.
async fn wait_for_element(
    session: &Session,
    context: &str,
    selector: &str,
    deadline: Deadline,
) -> Result<ElementInfo> {
    loop {
        match poll_element(session, context, selector).await {
            Ok(Some(info)) => return Ok(info),
            Ok(None) => {}
            Err(Error::SessionClosed) => return Err(Error::SessionClosed),
            Err(e) => trace!(selector, error = %e, "element poll attempt failed"),
        }

        if deadline.expired() {
            return Err(Error::element_not_found(selector, deadline.total_ms()));
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            () = session.stop_token().cancelled() => return Err(Error::SessionClosed),
        }
    }
}

/// One `script.callFunction` attempt; `Ok(None)` means the element does not
/// exist yet.
async fn poll_element(
    session: &Session,
    context: &str,
    selector: &str,
) -> Result<Option<ElementInfo>> {
    let params = CallFunctionParams {
        function_declaration: FIND_ELEMENT_SCRIPT.to_string(),
        target: Target {
            context: context.to_string(),
        },
        arguments: vec![ScriptArgument::String {
            value: selector.to_string(),
        }],
        await_promise: false,
        result_ownership: "root",
    };

    let frame = session
        .send_internal("script.callFunction", serde_json::to_value(&params)?)
        .await?;
    let result = Frame::from_value(frame).into_result()?;

    let Ok(call) = serde_json::from_value::<CallFunctionResult>(result) else {
        return Ok(None);
    };
    if call.result.kind != "string" {
        return Ok(None);
    }
    let Some(encoded) = call.result.value else {
        return Ok(None);
    };
    if encoded.is_empty() {
        return Ok(None);
    }

    Ok(serde_json::from_str(&encoded).ok())
}

/// Issues `input.performActions` and surfaces a BiDi error as fatal.
async fn perform_actions(session: &Session, params: PerformActionsParams) -> Result<()> {
    let frame = session
        .send_internal("input.performActions", serde_json::to_value(&params)?)
        .await?;
    Frame::from_value(frame).into_result().map(|_| ())
}

// ============================================================================
// Navigation Waits
// ============================================================================

/// The listeners one command registers for its wait policy.
///
/// Registration happens before the action is issued so no event can slip
/// between action and wait. Dropping the struct removes every queue.
struct NavWaiters {
    started: Option<EventListener>,
    dom_content_loaded: Option<EventListener>,
    load: Option<EventListener>,
}

impl NavWaiters {
    fn register(session: &Session, behavior: WaitBehavior) -> Self {
        let registry = session.listeners();
        Self {
            started: (behavior != WaitBehavior::None)
                .then(|| registry.add(EVENT_NAVIGATION_STARTED)),
            dom_content_loaded: (behavior == WaitBehavior::WaitForDomContentLoaded)
                .then(|| registry.add(EVENT_DOM_CONTENT_LOADED)),
            load: (behavior == WaitBehavior::WaitForLoad).then(|| registry.add(EVENT_LOAD)),
        }
    }

    /// Waits through the stages the policy enables, each with the time
    /// remaining until the shared deadline.
    async fn await_stages(
        &mut self,
        session: &Session,
        behavior: WaitBehavior,
        deadline: Deadline,
    ) -> Result<()> {
        let Some(started) = self.started.as_mut() else {
            return Ok(());
        };
        wait_stage(session, started, deadline, "navigation to start").await?;

        match behavior {
            WaitBehavior::WaitForDomContentLoaded => {
                if let Some(listener) = self.dom_content_loaded.as_mut() {
                    wait_stage(session, listener, deadline, "DOMContentLoaded").await?;
                }
            }
            WaitBehavior::WaitForLoad => {
                if let Some(listener) = self.load.as_mut() {
                    wait_stage(session, listener, deadline, "page load").await?;
                }
            }
            WaitBehavior::None | WaitBehavior::WaitForNavigationStarted => {}
        }

        Ok(())
    }
}

/// Waits for one milestone event within the remaining deadline.
async fn wait_stage(
    session: &Session,
    listener: &mut EventListener,
    deadline: Deadline,
    stage: &'static str,
) -> Result<()> {
    let remaining = deadline.remaining();
    if remaining.is_zero() {
        return Err(Error::navigation_timeout(stage, deadline.total_ms()));
    }

    tokio::select! {
        event = listener.recv() => match event {
            Some(_) => {
                trace!(stage, "navigation milestone observed");
                Ok(())
            }
            None => Err(Error::SessionClosed),
        },
        () = tokio::time::sleep(remaining) => {
            Err(Error::navigation_timeout(stage, deadline.total_ms()))
        }
        () = session.stop_token().cancelled() => Err(Error::SessionClosed),
    }
}

// ============================================================================
// Tests
// ============================================================================
