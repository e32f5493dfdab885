use crate::content_type::ContentType;

use super::{RuleTable, Task};

const NAME: (&str, &str) = ("Policy Name", "policy.name");
const AUDIENCE: (&str, &str) = ("Audience", "policy.audience");
const REGULATIONS: (&str, &str) = ("Related Regulations", "policy.regulations");

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::PolicyPurpose,
        Task {
            instruction: "Write the purpose section of the policy.",
            fields: &[NAME, REGULATIONS],
            requirements: &["Between 60 and 120 words", "Explain the risk the policy addresses"],
        },
    );
    rules.task(
        ContentType::PolicyScope,
        Task {
            instruction: "Write the scope section of the policy, stating who and what it applies to.",
            fields: &[NAME, AUDIENCE, ("Locations", "policy.locations")],
            requirements: &["Name the people, systems and locations covered", "State any exclusions"],
        },
    );
    rules.task(
        ContentType::PolicyStatement,
        Task {
            instruction: "Write the policy statements that set out the mandatory requirements.",
            fields: &[NAME, REGULATIONS, ("Key Requirements", "policy.requirements")],
            requirements: &[
                "Use 'must' for mandatory requirements and 'should' for recommendations",
                "Number each statement",
            ],
        },
    );
    rules.task(
        ContentType::RolesResponsibilities,
        Task {
            instruction: "Write the roles and responsibilities section of the policy.",
            fields: &[NAME, ("Policy Owner", "policy.owner"), AUDIENCE],
            requirements: &[
                "Cover the policy owner, management, employees and oversight functions",
                "Describe each role in one or two sentences",
            ],
        },
    );
    rules.task(
        ContentType::PolicyDefinitions,
        Task {
            instruction: "Write definitions for the key terms used in the policy.",
            fields: &[NAME, ("Terms", "policy.terms")],
            requirements: &["Present one term per line as 'Term: definition'", "Keep definitions to one sentence"],
        },
    );
    rules.task(
        ContentType::PolicyCompliance,
        Task {
            instruction: "Write the compliance section describing how adherence is monitored and the \
consequences of breaches.",
            fields: &[NAME, REGULATIONS],
            requirements: &["Describe monitoring activities", "State disciplinary consequences proportionately"],
        },
    );
    rules.task(
        ContentType::PolicyExceptions,
        Task {
            instruction: "Write the exceptions process for the policy.",
            fields: &[NAME, ("Policy Owner", "policy.owner")],
            requirements: &[
                "Describe how exceptions are requested, approved, recorded and reviewed",
                "Require time-limited approvals with compensating controls",
            ],
        },
    );
    rules.task(
        ContentType::PolicyReview,
        Task {
            instruction: "Write the review and maintenance section of the policy.",
            fields: &[NAME, ("Review Cycle", "policy.reviewCycle"), ("Policy Owner", "policy.owner")],
            requirements: &["State the review frequency and the triggers for an early review"],
        },
    );
    rules.task(
        ContentType::ProcedureSteps,
        Task {
            instruction: "List the procedure steps that put the policy into practice.",
            fields: &[NAME, ("Process", "policy.process")],
            requirements: &[
                "Provide between 5 and 10 steps in the order they are performed",
                "Name the role that performs each step",
            ],
        },
    );
    rules.task(
        ContentType::PolicySummary,
        Task {
            instruction: "Write a short summary of the policy for staff communications.",
            fields: &[NAME, AUDIENCE],
            requirements: &["Under 100 words", "Highlight what staff must do differently"],
        },
    );
}
