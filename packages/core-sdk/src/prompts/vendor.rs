use crate::content_type::ContentType;
use crate::models::GenerationRequest;

use super::{render_task, RuleTable, Task};

const NAME: (&str, &str) = ("Vendor Name", "vendor.name");
const SERVICE: (&str, &str) = ("Service Provided", "vendor.service");
const TIER: (&str, &str) = ("Risk Tier", "vendor.tier");
const DATA_ACCESS: (&str, &str) = ("Data Access", "vendor.dataAccess");

/**
 * \brief 尽调问题的深度随供应商风险等级变化。
 */
fn due_diligence_questions(request: &GenerationRequest) -> String {
    let tier = request.fields.lookup("vendor.tier").unwrap_or_default().to_ascii_lowercase();
    let depth = if tier.contains("critical") || tier.contains("high") {
        "This is a high-risk vendor: provide between 12 and 15 questions, including questions on \
independent assurance reports, sub-processors and exit support."
    } else if tier.contains("low") {
        "This is a low-risk vendor: provide between 5 and 7 questions focused on the essentials."
    } else {
        "Provide between 8 and 10 questions."
    };
    let task = Task {
        instruction: "Write due diligence questions to send to the vendor.",
        fields: &[NAME, SERVICE, TIER, DATA_ACCESS],
        requirements: &[
            "Cover security, privacy, resilience, financial stability and compliance",
            "Phrase each as a direct question the vendor can answer",
        ],
    };
    render_task(ContentType::DueDiligenceQuestions, &task, request, &[depth.to_string()])
}

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::VendorDescription,
        Task {
            instruction: "Describe the vendor and the service it provides to the organisation.",
            fields: &[NAME, SERVICE, ("Country", "vendor.country")],
            requirements: &["Between 60 and 120 words"],
        },
    );
    rules.task(
        ContentType::VendorRiskAssessment,
        Task {
            instruction: "Assess the risk the vendor relationship poses to the organisation.",
            fields: &[NAME, SERVICE, TIER, DATA_ACCESS, ("Contract Value", "vendor.contractValue")],
            requirements: &[
                "Rate inherent risk across security, privacy, operational, financial and compliance domains",
                "Conclude with an overall rating of Low, Medium, High or Critical",
            ],
        },
    );
    rules.add(ContentType::DueDiligenceQuestions, due_diligence_questions);
    rules.task(
        ContentType::VendorControls,
        Task {
            instruction: "List the controls the organisation should expect the vendor to operate.",
            fields: &[NAME, SERVICE, DATA_ACCESS],
            requirements: &["Provide between 5 and 8 controls", "Make each control verifiable"],
        },
    );
    rules.task(
        ContentType::ContractClauses,
        Task {
            instruction: "Draft the key risk-related clauses for the vendor contract.",
            fields: &[NAME, SERVICE, DATA_ACCESS],
            requirements: &[
                "Cover audit rights, data protection, incident notification, subcontracting and termination",
                "Label each clause with a short heading",
            ],
        },
    );
    rules.task(
        ContentType::VendorMonitoring,
        Task {
            instruction: "Write the ongoing monitoring plan for the vendor.",
            fields: &[NAME, TIER, ("Key Metrics", "vendor.metrics")],
            requirements: &["State monitoring activities, their frequency and who performs them"],
        },
    );
    rules.task(
        ContentType::VendorExitStrategy,
        Task {
            instruction: "Write the exit strategy for the vendor relationship.",
            fields: &[NAME, SERVICE, ("Alternatives", "vendor.alternatives")],
            requirements: &[
                "Cover triggers, transition steps, data return and deletion, and timelines",
            ],
        },
    );
    rules.task(
        ContentType::VendorRiskSummary,
        Task {
            instruction: "Summarise the vendor risk position for the approval committee.",
            fields: &[NAME, TIER, ("Open Issues", "vendor.openIssues")],
            requirements: &["Under 120 words", "End with a clear recommendation"],
        },
    );
    rules.task(
        ContentType::VendorIssue,
        Task {
            instruction: "Describe the vendor issue and the remediation expected from the vendor.",
            fields: &[NAME, ("Issue", "vendor.issue"), ("Due Date", "vendor.dueDate")],
            requirements: &["State the impact on the organisation", "Between 80 and 150 words"],
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::build_prompt;
    use serde_json::json;

    #[test]
    fn test_question_depth_follows_tier() {
        let mut request =
            GenerationRequest::new("openai", "gpt-4o", ContentType::DueDiligenceQuestions);
        request.fields = serde_json::from_value(json!({"vendor": {"tier": "Critical"}}))
            .expect("fields");
        assert!(build_prompt(&request).contains("between 12 and 15 questions"));

        request.fields = Default::default();
        assert!(build_prompt(&request).contains("between 8 and 10 questions"));
    }
}
