//! Notification action handler.
//!
//! Best effort: with the `desktop-notify` feature a desktop notification is
//! shown, and any failure (or a build without the feature) degrades to an
//! `info` log line. This handler never fails.

use serde_json::{json, Value};

use crate::error::ActionError;
use crate::handler::ActionEnv;
use crate::types::WorkflowAction;

pub async fn execute(action: &WorkflowAction, env: &ActionEnv) -> Result<Value, ActionError> {
    let title = action
        .parameters
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or(&env.notification_title)
        .to_string();
    let body = action.command.clone();

    if !show_desktop(&title, &body).await {
        tracing::info!("NOTIFICATION: {} - {}", title, body);
    }

    Ok(json!({
        "notification_sent": body,
        "title": title,
    }))
}

#[cfg(feature = "desktop-notify")]
async fn show_desktop(title: &str, body: &str) -> bool {
    let (title, body) = (title.to_string(), body.to_string());
    let shown = tokio::task::spawn_blocking(move || {
        notify_rust::Notification::new()
            .summary(&title)
            .body(&body)
            .timeout(notify_rust::Timeout::Milliseconds(5000))
            .show()
            .map(|_| ())
    })
    .await;

    match shown {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Desktop notification failed");
            false
        }
        Err(e) => {
            tracing::debug!(error = %e, "Desktop notification task failed");
            false
        }
    }
}

#[cfg(not(feature = "desktop-notify"))]
async fn show_desktop(_title: &str, _body: &str) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionType;

    #[tokio::test]
    async fn test_notification_uses_default_title() {
        let env = ActionEnv::new(std::env::temp_dir());
        let action = WorkflowAction::new(ActionType::Notification, "Build finished");
        let result = execute(&action, &env).await.unwrap();
        assert_eq!(result["notification_sent"], "Build finished");
        assert_eq!(result["title"], "Autochain");
    }

    #[tokio::test]
    async fn test_notification_title_parameter() {
        let env = ActionEnv::new(std::env::temp_dir());
        let action = WorkflowAction::new(ActionType::Notification, "Tests failing")
            .with_parameter("title", "Test Alert");
        let result = execute(&action, &env).await.unwrap();
        assert_eq!(result["title"], "Test Alert");
    }
}
