use crate::content_type::ContentType;

use super::{RuleTable, Task};

const PROCESS: (&str, &str) = ("Business Process", "resilience.process");
const DEPENDENCIES: (&str, &str) = ("Dependencies", "resilience.dependencies");
const SCENARIO: (&str, &str) = ("Disruption Scenario", "resilience.scenario");

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::ImpactAnalysis,
        Task {
            instruction: "Write a business impact analysis for the process described below.",
            fields: &[PROCESS, DEPENDENCIES, ("Impact Tolerance", "resilience.impactTolerance")],
            requirements: &[
                "Describe financial, operational, regulatory and reputational impacts over time",
                "Use time bands such as 4 hours, 24 hours, 72 hours and 1 week",
            ],
        },
    );
    rules.task(
        ContentType::CriticalProcesses,
        Task {
            instruction: "List the critical business processes for the business unit.",
            fields: &[("Services", "resilience.services"), DEPENDENCIES],
            requirements: &[
                "Provide between 4 and 8 processes",
                "Give a one-line reason why each process is critical",
            ],
        },
    );
    rules.task(
        ContentType::RecoveryObjectives,
        Task {
            instruction: "Define the recovery objectives for the process.",
            fields: &[
                PROCESS,
                ("Target RTO", "resilience.rto"),
                ("Target RPO", "resilience.rpo"),
            ],
            requirements: &[
                "State RTO, RPO and minimum service level with a justification for each",
                "Between 100 and 160 words",
            ],
        },
    );
    rules.task(
        ContentType::RecoveryStrategy,
        Task {
            instruction: "Describe the recovery strategy for the process.",
            fields: &[PROCESS, DEPENDENCIES, ("Target RTO", "resilience.rto")],
            requirements: &[
                "Cover people, premises, technology, data and suppliers",
                "Explain how the strategy meets the recovery objectives",
            ],
        },
    );
    rules.task(
        ContentType::ContinuityPlan,
        Task {
            instruction: "Write a business continuity plan section for the process.",
            fields: &[PROCESS, SCENARIO, ("Plan Owner", "resilience.owner")],
            requirements: &[
                "Include activation criteria, roles, recovery steps and stand-down",
                "Use numbered steps for recovery actions",
            ],
        },
    );
    rules.task(
        ContentType::CrisisCommunication,
        Task {
            instruction: "Write a crisis communication plan for the disruption.",
            fields: &[SCENARIO, ("Stakeholders", "resilience.stakeholders")],
            requirements: &[
                "Identify audiences, channels, spokespeople and message timing",
                "Include a short holding statement",
            ],
        },
    );
    rules.task(
        ContentType::IncidentScenario,
        Task {
            instruction: "Write a plausible incident scenario for planning and testing.",
            fields: &[PROCESS, SCENARIO, DEPENDENCIES],
            requirements: &["Between 120 and 200 words", "Describe how the incident escalates over time"],
        },
    );
    rules.task(
        ContentType::ExercisePlan,
        Task {
            instruction: "Write a plan for a resilience exercise.",
            fields: &[SCENARIO, ("Exercise Type", "resilience.exerciseType"), ("Participants", "resilience.participants")],
            requirements: &[
                "Cover objectives, format, injects, success criteria and debrief",
            ],
        },
    );
    rules.task(
        ContentType::DependencyAnalysis,
        Task {
            instruction: "Analyse the dependencies of the process and their points of failure.",
            fields: &[PROCESS, DEPENDENCIES],
            requirements: &[
                "Group dependencies into internal, third-party and technology",
                "Identify single points of failure",
            ],
        },
    );
    rules.task(
        ContentType::LessonsLearned,
        Task {
            instruction: "Write a lessons learned report following the incident or exercise.",
            fields: &[SCENARIO, ("What Happened", "resilience.summary"), ("Outcome", "resilience.outcome")],
            requirements: &[
                "Separate what went well from what needs improvement",
                "End with actions that have owners",
            ],
        },
    );
}
