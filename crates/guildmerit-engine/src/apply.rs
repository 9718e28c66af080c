use guildmerit_core::ports::{ChatRoleWriter, CodeHostWriter};
use guildmerit_core::{
    AssignmentAction, AssignmentDecision, Channel, Gate, MutationPolicy, Outcome, RoleAction,
    RoleDecision, SkipReason,
};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{error, info};

/// A decision together with what happened when it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied<D> {
    #[serde(flatten)]
    pub decision: D,
    pub outcome: Outcome,
}

/// Apply role decisions through the policy, one at a time
///
/// Repeated `(user, role, action)` tuples are only attempted once; writer
/// errors turn into `Failed` outcomes and never stop the batch.
pub async fn apply_role_decisions(
    decisions: &[RoleDecision],
    policy: &MutationPolicy,
    writer: &dyn ChatRoleWriter,
) -> Vec<Applied<RoleDecision>> {
    let mut seen = BTreeSet::new();
    let mut applied = Vec::with_capacity(decisions.len());

    for decision in decisions {
        let outcome = match policy.gate(Channel::ChatRoles) {
            Gate::Skip(reason) => Outcome::Skipped(reason),
            Gate::Allow => {
                let key = (
                    decision.chat_user_id.as_str(),
                    decision.role.as_str(),
                    decision.action,
                );
                if !seen.insert(key) {
                    Outcome::Skipped(SkipReason::Duplicate)
                } else {
                    let result = match decision.action {
                        RoleAction::Add => {
                            writer.add_role(&decision.chat_user_id, &decision.role).await
                        }
                        RoleAction::Remove => {
                            writer.remove_role(&decision.chat_user_id, &decision.role).await
                        }
                    };
                    match result {
                        Ok(()) => Outcome::Applied,
                        Err(e) => Outcome::Failed(e.to_string()),
                    }
                }
            }
        };

        if matches!(outcome, Outcome::Failed(_)) {
            error!(
                user = %decision.chat_user_id,
                role = %decision.role,
                action = %decision.action,
                result = %outcome,
                "Role change failed"
            );
        } else {
            info!(
                user = %decision.chat_user_id,
                role = %decision.role,
                action = %decision.action,
                result = %outcome,
                "Role change"
            );
        }

        applied.push(Applied {
            decision: decision.clone(),
            outcome,
        });
    }

    applied
}

/// Apply assignment and review-request decisions through the policy
pub async fn apply_assignment_decisions(
    decisions: &[AssignmentDecision],
    policy: &MutationPolicy,
    writer: &dyn CodeHostWriter,
) -> Vec<Applied<AssignmentDecision>> {
    let mut seen = BTreeSet::new();
    let mut applied = Vec::with_capacity(decisions.len());

    for decision in decisions {
        let outcome = match policy.gate(Channel::CodeHost) {
            Gate::Skip(reason) => Outcome::Skipped(reason),
            Gate::Allow => {
                let key = (
                    decision.repo.as_str(),
                    decision.target_number,
                    decision.action,
                    decision.assignee.as_str(),
                );
                if !seen.insert(key) {
                    Outcome::Skipped(SkipReason::Duplicate)
                } else {
                    let result = match decision.action {
                        AssignmentAction::Assign => {
                            writer
                                .assign(&decision.repo, decision.target_number, &decision.assignee)
                                .await
                        }
                        AssignmentAction::RequestReview => {
                            writer
                                .request_review(
                                    &decision.repo,
                                    decision.target_number,
                                    &decision.assignee,
                                )
                                .await
                        }
                    };
                    match result {
                        Ok(()) => Outcome::Applied,
                        Err(e) => Outcome::Failed(e.to_string()),
                    }
                }
            }
        };

        if matches!(outcome, Outcome::Failed(_)) {
            error!(
                repo = %decision.repo,
                number = decision.target_number,
                assignee = %decision.assignee,
                action = %decision.action,
                result = %outcome,
                "Assignment failed"
            );
        } else {
            info!(
                repo = %decision.repo,
                number = decision.target_number,
                assignee = %decision.assignee,
                action = %decision.action,
                result = %outcome,
                "Assignment"
            );
        }

        applied.push(Applied {
            decision: decision.clone(),
            outcome,
        });
    }

    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use guildmerit_core::{
        AdapterError, AdapterResult, AssignmentEvidence, DecisionKind, RoleEvidence, RunMode,
        TargetKind,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingWriter {
        calls: Mutex<Vec<String>>,
        fail_for: Option<String>,
    }

    impl RecordingWriter {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String, target: &str) -> AdapterResult<()> {
            if self.fail_for.as_deref() == Some(target) {
                return Err(AdapterError::Chat("missing permissions".to_string()));
            }
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    #[async_trait]
    impl ChatRoleWriter for RecordingWriter {
        async fn add_role(&self, chat_user_id: &str, role: &str) -> AdapterResult<()> {
            self.record(format!("add {} {}", chat_user_id, role), chat_user_id)
        }

        async fn remove_role(&self, chat_user_id: &str, role: &str) -> AdapterResult<()> {
            self.record(format!("remove {} {}", chat_user_id, role), chat_user_id)
        }
    }

    #[async_trait]
    impl CodeHostWriter for RecordingWriter {
        async fn assign(&self, repo: &str, number: u64, assignee: &str) -> AdapterResult<()> {
            self.record(format!("assign {}#{} {}", repo, number, assignee), assignee)
        }

        async fn request_review(
            &self,
            repo: &str,
            number: u64,
            reviewer: &str,
        ) -> AdapterResult<()> {
            self.record(format!("review {}#{} {}", repo, number, reviewer), reviewer)
        }
    }

    fn role(user: &str, role: &str, action: RoleAction) -> RoleDecision {
        RoleDecision {
            chat_user_id: user.to_string(),
            code_host_user: format!("gh-{}", user),
            role: role.to_string(),
            action,
            reason: "test".to_string(),
            kind: DecisionKind::Score,
            evidence: RoleEvidence::Score {
                score: 10,
                threshold: 10,
            },
        }
    }

    fn assignment(number: u64, assignee: &str) -> AssignmentDecision {
        AssignmentDecision {
            repo: "core".to_string(),
            target_number: number,
            target_kind: TargetKind::Issue,
            assignee: assignee.to_string(),
            action: AssignmentAction::Assign,
            reason: "round robin".to_string(),
            evidence: AssignmentEvidence {
                eligible_pool: vec![assignee.to_string()],
                author: None,
            },
        }
    }

    #[tokio::test]
    async fn test_duplicates_are_applied_once() {
        let writer = RecordingWriter::default();
        let policy = MutationPolicy::new(RunMode::Active, true, true);
        let decisions = vec![
            role("1", "Maintainer", RoleAction::Add),
            role("1", "Maintainer", RoleAction::Add),
            role("1", "Contributor", RoleAction::Remove),
        ];

        let applied = apply_role_decisions(&decisions, &policy, &writer).await;
        let outcomes: Vec<String> = applied.iter().map(|a| a.outcome.to_string()).collect();
        assert_eq!(outcomes, vec!["applied", "skipped (duplicate)", "applied"]);
        assert_eq!(writer.calls(), vec!["add 1 Maintainer", "remove 1 Contributor"]);
    }

    #[tokio::test]
    async fn test_dry_run_never_calls_writers() {
        let writer = RecordingWriter::default();
        let policy = MutationPolicy::new(RunMode::DryRun, true, true);

        let roles =
            apply_role_decisions(&[role("1", "Maintainer", RoleAction::Add)], &policy, &writer)
                .await;
        let assignments =
            apply_assignment_decisions(&[assignment(3, "ann")], &policy, &writer).await;

        assert_eq!(roles[0].outcome, Outcome::Skipped(SkipReason::DryRun));
        assert_eq!(assignments[0].outcome, Outcome::Skipped(SkipReason::DryRun));
        assert!(writer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_writer_error_does_not_stop_batch() {
        let writer = RecordingWriter {
            fail_for: Some("ann".to_string()),
            ..Default::default()
        };
        let policy = MutationPolicy::new(RunMode::Active, false, true);

        let decisions = [assignment(1, "ann"), assignment(2, "ben")];
        let applied = apply_assignment_decisions(&decisions, &policy, &writer).await;
        assert!(matches!(
            &applied[0].outcome,
            Outcome::Failed(msg) if msg.contains("missing permissions")
        ));
        assert_eq!(applied[1].outcome, Outcome::Applied);
        assert_eq!(writer.calls(), vec!["assign core#2 ben"]);
    }

    #[tokio::test]
    async fn test_applied_serializes_flat() {
        let applied = Applied {
            decision: assignment(4, "ann"),
            outcome: Outcome::Skipped(SkipReason::WriteDisabled),
        };
        let value = serde_json::to_value(&applied).unwrap();
        assert_eq!(value["target_number"], 4);
        assert_eq!(value["outcome"]["status"], "skipped");
    }
}
