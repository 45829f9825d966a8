//! Built-in example chains seeded into a new engine.

use autochain_core::ContextType;

use crate::types::{ActionType, WorkflowAction, WorkflowChain};

/// Commit validation, test-failure handling and idle maintenance.
pub fn default_chains() -> Vec<WorkflowChain> {
    vec![
        WorkflowChain::new("git_commit_validation", vec![ContextType::GitCommit])
            .with_description("Run tests and build after git commit")
            .with_priority(1)
            .with_action(WorkflowAction::new(
                ActionType::Notification,
                "Running automated validation after git commit",
            ))
            .with_action(WorkflowAction::shell("npm test").with_timeout(120).allow_failure())
            .with_action(
                WorkflowAction::shell("npm run build")
                    .with_timeout(180)
                    .with_condition("context_type == 'git_commit'"),
            ),
        WorkflowChain::new("test_failure_handling", vec![ContextType::TestFailure])
            .with_description("Handle test failures with retry and reporting")
            .with_priority(2)
            .with_action(
                WorkflowAction::new(
                    ActionType::Notification,
                    "Test failure detected, attempting retry",
                )
                .with_parameter("title", "Test Alert"),
            )
            .with_action(WorkflowAction::new(ActionType::Delay, "5"))
            .with_action(
                WorkflowAction::shell("npm test")
                    .with_timeout(120)
                    .with_retries(1, 5),
            ),
        WorkflowChain::new("claude_idle_maintenance", vec![ContextType::ClaudeIdle])
            .with_description("Perform maintenance when the agent is idle")
            .with_priority(3)
            .with_action(WorkflowAction::shell("git status").with_timeout(10))
            .with_action(
                WorkflowAction::new(ActionType::ConditionCheck, "confidence > 0.8")
                    .with_parameter("check_deployment_readiness", true),
            ),
    ]
}
