use crate::content_type::ContentType;

use super::{RuleTable, Task};

const ACTIVITY: (&str, &str) = ("Processing Activity", "privacy.processingActivity");
const SUBJECTS: (&str, &str) = ("Data Subjects", "privacy.dataSubjects");
const CATEGORIES: (&str, &str) = ("Data Categories", "privacy.dataCategories");
const JURISDICTIONS: (&str, &str) = ("Jurisdictions", "privacy.jurisdictions");

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::PrivacyNotice,
        Task {
            instruction: "Write a privacy notice that tells data subjects how their personal data is used.",
            fields: &[ACTIVITY, SUBJECTS, CATEGORIES, ("Controller", "privacy.controller")],
            requirements: &[
                "Use plain language a member of the public can follow",
                "Cover purposes, lawful basis, recipients, retention and data subject rights",
                "Write in the second person",
            ],
        },
    );
    rules.task(
        ContentType::DpiaDescription,
        Task {
            instruction: "Describe the processing for a data protection impact assessment, including its \
nature, scope, context and purposes.",
            fields: &[ACTIVITY, SUBJECTS, CATEGORIES, ("Technology", "privacy.technology")],
            requirements: &["Between 150 and 250 words", "Flag any high-risk processing characteristics"],
        },
    );
    rules.task(
        ContentType::ProcessingPurpose,
        Task {
            instruction: "State the purpose of the processing activity precisely enough to satisfy the \
purpose limitation principle.",
            fields: &[ACTIVITY, SUBJECTS],
            requirements: &["Between 50 and 100 words", "Avoid vague purposes such as 'business needs'"],
        },
    );
    rules.task(
        ContentType::LawfulBasis,
        Task {
            instruction: "Justify the lawful basis relied on for the processing activity.",
            fields: &[ACTIVITY, ("Proposed Lawful Basis", "privacy.lawfulBasis"), JURISDICTIONS],
            requirements: &[
                "Name the article or provision that applies",
                "Explain why alternative bases were not chosen",
                "Mention any balancing test when legitimate interests is relied on",
            ],
        },
    );
    rules.task(
        ContentType::DataCategories,
        Task {
            instruction: "List the categories of personal data processed in this activity.",
            fields: &[ACTIVITY, SUBJECTS],
            requirements: &[
                "Provide between 4 and 10 categories",
                "Mark special category or criminal offence data explicitly",
            ],
        },
    );
    rules.task(
        ContentType::DataRetention,
        Task {
            instruction: "Write the data retention statement for this processing activity.",
            fields: &[ACTIVITY, ("Retention Period", "privacy.retentionPeriod"), JURISDICTIONS],
            requirements: &[
                "State the retention period and the trigger that starts it",
                "Describe how data is deleted or anonymised at the end of the period",
            ],
        },
    );
    rules.task(
        ContentType::DataSubjectRights,
        Task {
            instruction: "Describe the procedure for handling data subject rights requests.",
            fields: &[SUBJECTS, JURISDICTIONS, ("Request Channel", "privacy.requestChannel")],
            requirements: &[
                "Cover access, rectification, erasure, restriction, portability and objection",
                "Include identity verification and statutory response deadlines",
            ],
        },
    );
    rules.task(
        ContentType::PrivacyRisks,
        Task {
            instruction: "List the privacy risks to individuals arising from this processing.",
            fields: &[ACTIVITY, CATEGORIES, ("Recipients", "privacy.recipients")],
            requirements: &[
                "Provide between 4 and 8 risks",
                "Describe each risk from the data subject's perspective",
            ],
        },
    );
    rules.task(
        ContentType::PrivacyMitigations,
        Task {
            instruction: "Describe measures that mitigate the identified privacy risks.",
            fields: &[ACTIVITY, ("Identified Risks", "privacy.risks")],
            requirements: &[
                "Link each measure to the risk it reduces",
                "State the residual risk after mitigation",
            ],
        },
    );
    rules.task(
        ContentType::TransferAssessment,
        Task {
            instruction: "Assess the international transfer of personal data described below.",
            fields: &[
                ACTIVITY,
                ("Destination Country", "privacy.destination"),
                ("Transfer Mechanism", "privacy.transferMechanism"),
            ],
            requirements: &[
                "Evaluate the legal framework of the destination country",
                "Identify supplementary measures where the mechanism alone is not sufficient",
            ],
        },
    );
    rules.task(
        ContentType::BreachResponse,
        Task {
            instruction: "Write the personal data breach response procedure.",
            fields: &[JURISDICTIONS, ("Supervisory Authority", "privacy.authority")],
            requirements: &[
                "Cover containment, assessment, notification and review",
                "State the notification deadlines that apply",
                "Use numbered steps",
            ],
        },
    );
    rules.task(
        ContentType::ConsentStatement,
        Task {
            instruction: "Write a consent statement that data subjects will agree to.",
            fields: &[ACTIVITY, CATEGORIES, ("Controller", "privacy.controller")],
            requirements: &[
                "Make the consent specific, informed and unambiguous",
                "Explain how consent can be withdrawn",
                "Keep it under 120 words",
            ],
        },
    );
    rules.task(
        ContentType::ProcessingRecord,
        Task {
            instruction: "Write a record of processing activities entry for this activity.",
            fields: &[
                ACTIVITY,
                SUBJECTS,
                CATEGORIES,
                ("Recipients", "privacy.recipients"),
                ("Retention Period", "privacy.retentionPeriod"),
            ],
            requirements: &[
                "Use labelled lines for purpose, categories, recipients, transfers, retention and security measures",
            ],
        },
    );
}
