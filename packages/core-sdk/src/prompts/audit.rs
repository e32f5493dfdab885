use crate::content_type::ContentType;
use crate::models::GenerationRequest;

use super::{render_task, RuleTable, Task};

/**
 * \brief 审计类型，决定审计目标的关注领域。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    Internal,
    External,
    Compliance,
    Operational,
    Financial,
    InformationTechnology,
    Quality,
    Environmental,
    General,
}

impl AuditCategory {
    /**
     * \brief 由请求中的 `type` 字段识别，无法识别时为 General。
     */
    pub fn from_label(label: Option<&str>) -> Self {
        let Some(label) = label else {
            return AuditCategory::General;
        };
        let label = label.trim().to_ascii_lowercase();
        let label = label.trim_end_matches(" audit").trim();
        match label {
            "internal" => AuditCategory::Internal,
            "external" => AuditCategory::External,
            "compliance" | "regulatory" => AuditCategory::Compliance,
            "operational" => AuditCategory::Operational,
            "financial" => AuditCategory::Financial,
            "it" | "information technology" | "technology" | "cyber" => {
                AuditCategory::InformationTechnology
            }
            "quality" => AuditCategory::Quality,
            "environmental" | "esg" => AuditCategory::Environmental,
            _ => AuditCategory::General,
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            AuditCategory::Internal => {
                "Focus areas for an internal audit:\n\
- Effectiveness of governance, risk management and internal control processes\n\
- Adherence to internal policies, procedures and delegated authorities\n\
- Efficiency of resource use and achievement of business objectives\n\
- Reliability of management information used for decision making"
            }
            AuditCategory::External => {
                "Focus areas for an external audit:\n\
- Fair presentation of financial statements in line with the applicable reporting framework\n\
- Sufficiency of audit evidence supporting material balances and disclosures\n\
- Independence and objectivity of the assessment\n\
- Controls relevant to financial reporting that the opinion relies on"
            }
            AuditCategory::Compliance => {
                "Focus areas for a compliance audit:\n\
- Adherence to applicable laws, regulations and contractual obligations\n\
- Completeness of the compliance obligations register\n\
- Monitoring, reporting and escalation of compliance breaches\n\
- Evidence that remediation of previous regulatory findings is effective"
            }
            AuditCategory::Operational => {
                "Focus areas for an operational audit:\n\
- Efficiency and effectiveness of core operating processes\n\
- Performance measurement against service levels and KPIs\n\
- Bottlenecks, duplication and manual workarounds\n\
- Alignment of process design with strategic objectives"
            }
            AuditCategory::Financial => {
                "Focus areas for a financial audit:\n\
- Accuracy and completeness of financial records and reconciliations\n\
- Segregation of duties over payments, journals and approvals\n\
- Valuation and cut-off of significant balances\n\
- Safeguarding of assets and prevention of fraud"
            }
            AuditCategory::InformationTechnology => {
                "Focus areas for an IT audit:\n\
- Logical access management and privileged account controls\n\
- Change management and segregation between development and production\n\
- Backup, recovery and resilience of critical systems\n\
- Security monitoring, vulnerability management and incident response"
            }
            AuditCategory::Quality => {
                "Focus areas for a quality audit:\n\
- Conformance of products and services with defined quality standards\n\
- Effectiveness of the quality management system and its document control\n\
- Handling of nonconformities, corrective actions and customer complaints\n\
- Evidence of continual improvement"
            }
            AuditCategory::Environmental => {
                "Focus areas for an environmental audit:\n\
- Compliance with environmental permits and regulations\n\
- Management of emissions, waste and hazardous materials\n\
- Accuracy of environmental and sustainability reporting\n\
- Effectiveness of the environmental management system"
            }
            AuditCategory::General => {
                "Focus areas:\n\
- Design and operating effectiveness of key controls\n\
- Compliance with relevant policies and regulations\n\
- Risks that could prevent the area from meeting its objectives"
            }
        }
    }
}

fn objectives(request: &GenerationRequest) -> String {
    let category = AuditCategory::from_label(request.fields.kind.as_deref());
    let task = Task {
        instruction: "Write the audit objectives for this engagement. Each objective states what the \
audit will determine, assess or verify.",
        fields: &[
            ("Audit Period", "audit.period"),
            ("Key Risk Areas", "audit.riskAreas"),
            ("Applicable Regulations", "audit.regulations"),
        ],
        requirements: &[
            "Provide between 4 and 6 objectives",
            "Start each objective with an action verb such as Assess, Evaluate, Determine or Verify",
            "Make each objective specific and measurable",
        ],
    };
    render_task(
        ContentType::Objectives,
        &task,
        request,
        &[category.guidance().to_string()],
    )
}

const MATRIX_SCHEMA: &str = r#"{
  "risks": [
    {
      "id": "R1",
      "title": "Short risk title",
      "description": "What could go wrong and why it matters",
      "likelihood": "Low | Medium | High",
      "impact": "Low | Medium | High",
      "controls": [
        {
          "id": "C1",
          "description": "What the control does",
          "type": "Preventive | Detective | Corrective",
          "nature": "Manual | Automated",
          "frequency": "Continuous | Daily | Weekly | Monthly | Quarterly | Annually",
          "owner": "Role responsible for the control",
          "testProcedure": "How the auditor will test the control"
        }
      ]
    }
  ]
}"#;

fn risk_control_matrix(request: &GenerationRequest) -> String {
    let task = Task {
        instruction: "Build a risk and control matrix for the area under review. Identify the key \
risks and map each one to the controls that mitigate it.",
        fields: &[
            ("Key Risk Areas", "audit.riskAreas"),
            ("Applicable Regulations", "audit.regulations"),
            ("Known Controls", "audit.controls"),
        ],
        requirements: &[
            "Identify between 5 and 8 risks",
            "Map every risk to at least one control, and at most three",
            "Use sequential identifiers R1, R2, ... for risks and C1, C2, ... for controls",
            "Complete the whole object, even if that makes the response long",
        ],
    };
    let schema = format!("Schema (follow it exactly):\n{}", MATRIX_SCHEMA);
    let rules = "Strict JSON formatting rules:\n\
- Use double quotes for every key and every string value; never use single quotes\n\
- Do not put a trailing comma after the last element of any array or object\n\
- Use exactly the keys shown in the schema, with no additional keys\n\
- Pick one of the listed values for likelihood, impact, type, nature and frequency\n\
- Do not include comments, ellipses or placeholder text"
        .to_string();
    render_task(ContentType::RiskControlMatrix, &task, request, &[schema, rules])
}

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::Description,
        Task {
            instruction: "Write a description of this audit engagement that explains what is being \
audited and why.",
            fields: &[("Department", "audit.department"), ("Audit Period", "audit.period")],
            requirements: &[
                "Between 100 and 180 words",
                "Mention the business context and the main risks that motivate the audit",
                "Use a professional, objective tone",
            ],
        },
    );
    rules.add(ContentType::Objectives, objectives);
    rules.task(
        ContentType::Scope,
        Task {
            instruction: "Write the scope statement for this audit, covering what is included, what is \
excluded and the period under review.",
            fields: &[
                ("Audit Period", "audit.period"),
                ("Locations", "audit.locations"),
                ("Systems", "audit.systems"),
            ],
            requirements: &[
                "Between 120 and 200 words",
                "Name in-scope entities, processes and systems explicitly",
                "State exclusions where they can reasonably be inferred",
            ],
        },
    );
    rules.task(
        ContentType::Methodology,
        Task {
            instruction: "Describe the methodology the audit team will follow from planning through reporting.",
            fields: &[("Audit Period", "audit.period"), ("Standards", "audit.standards")],
            requirements: &[
                "Cover planning, fieldwork, testing approach and reporting",
                "Reference a recognised standard such as the IIA Standards where appropriate",
                "Between 150 and 250 words",
            ],
        },
    );
    rules.task(
        ContentType::Criteria,
        Task {
            instruction: "List the criteria the audit will measure the area against.",
            fields: &[
                ("Applicable Regulations", "audit.regulations"),
                ("Internal Policies", "audit.policies"),
            ],
            requirements: &[
                "Provide between 4 and 7 criteria",
                "Cite the source of each criterion (law, standard, policy or contract)",
            ],
        },
    );
    rules.task(
        ContentType::RiskAssessment,
        Task {
            instruction: "Write a risk assessment narrative for the area under audit, explaining the \
inherent risks and how they influence the audit approach.",
            fields: &[("Key Risk Areas", "audit.riskAreas"), ("Prior Findings", "audit.priorFindings")],
            requirements: &[
                "Rate each risk discussed as Low, Medium or High with a short justification",
                "Between 150 and 250 words",
            ],
        },
    );
    rules.task(
        ContentType::ControlEvaluation,
        Task {
            instruction: "Evaluate the design and operating effectiveness of the control described below.",
            fields: &[
                ("Control", "control.description"),
                ("Control Owner", "control.owner"),
                ("Test Results", "control.testResults"),
            ],
            requirements: &[
                "Conclude separately on design and on operating effectiveness",
                "Refer to the evidence that supports each conclusion",
                "Between 120 and 200 words",
            ],
        },
    );
    rules.task(
        ContentType::AuditProgram,
        Task {
            instruction: "Draft an audit program listing the audit steps for each key risk area.",
            fields: &[("Key Risk Areas", "audit.riskAreas"), ("Audit Period", "audit.period")],
            requirements: &[
                "Group steps under each risk area",
                "Number the steps and make each one an actionable instruction",
            ],
        },
    );
    rules.task(
        ContentType::TestingProcedures,
        Task {
            instruction: "List the testing procedures the auditor should perform.",
            fields: &[("Control", "control.description"), ("Systems", "audit.systems")],
            requirements: &[
                "Provide between 5 and 8 procedures",
                "Mix inquiry, inspection, observation and re-performance where relevant",
            ],
        },
    );
    rules.task(
        ContentType::SamplingApproach,
        Task {
            instruction: "Describe the sampling approach for testing in this audit.",
            fields: &[
                ("Population", "audit.population"),
                ("Control Frequency", "control.frequency"),
            ],
            requirements: &[
                "State the sampling method and justify the sample size",
                "Explain how exceptions will be evaluated",
                "Between 100 and 180 words",
            ],
        },
    );
    rules.task(
        ContentType::EvidenceRequirements,
        Task {
            instruction: "List the evidence the auditee must provide to support the audit.",
            fields: &[("Systems", "audit.systems"), ("Audit Period", "audit.period")],
            requirements: &[
                "Provide between 5 and 10 items",
                "Name the document or report and the period it should cover",
            ],
        },
    );
    rules.task(
        ContentType::Findings,
        Task {
            instruction: "Write an audit finding using the condition, criteria, cause and effect structure.",
            fields: &[
                ("Condition", "finding.condition"),
                ("Criteria", "finding.criteria"),
                ("Cause", "finding.cause"),
                ("Effect", "finding.effect"),
                ("Severity", "finding.severity"),
            ],
            requirements: &[
                "Use one short paragraph for each element",
                "State facts only and avoid assigning personal blame",
            ],
        },
    );
    rules.task(
        ContentType::Recommendations,
        Task {
            instruction: "List recommendations that address the finding described below.",
            fields: &[
                ("Condition", "finding.condition"),
                ("Cause", "finding.cause"),
                ("Severity", "finding.severity"),
            ],
            requirements: &[
                "Provide between 3 and 5 recommendations",
                "Address the root cause, not only the symptom",
            ],
        },
    );
    rules.task(
        ContentType::ManagementResponse,
        Task {
            instruction: "Draft a management response to the audit finding, written from management's point of view.",
            fields: &[
                ("Condition", "finding.condition"),
                ("Responsible Owner", "finding.owner"),
                ("Target Date", "finding.targetDate"),
            ],
            requirements: &[
                "State whether management agrees with the finding",
                "Commit to specific actions with an owner and a target date",
                "Between 80 and 150 words",
            ],
        },
    );
    rules.task(
        ContentType::ActionPlan,
        Task {
            instruction: "Write a corrective action plan that remediates the finding.",
            fields: &[
                ("Condition", "finding.condition"),
                ("Responsible Owner", "finding.owner"),
                ("Target Date", "finding.targetDate"),
            ],
            requirements: &[
                "Break the plan into numbered milestones with owners and dates",
                "Define how completion will be evidenced",
            ],
        },
    );
    rules.task(
        ContentType::FollowUp,
        Task {
            instruction: "Describe how the audit team will follow up on the agreed actions.",
            fields: &[
                ("Open Actions", "audit.openActions"),
                ("Target Date", "finding.targetDate"),
            ],
            requirements: &[
                "Specify the evidence required to close each action",
                "Define the escalation path for overdue actions",
            ],
        },
    );
    rules.task(
        ContentType::ExecutiveSummary,
        Task {
            instruction: "Write an executive summary of the audit results for senior management and the audit committee.",
            fields: &[
                ("Overall Rating", "audit.rating"),
                ("Key Findings", "audit.keyFindings"),
            ],
            requirements: &[
                "Between 150 and 250 words",
                "Lead with the overall conclusion, then the most significant findings",
                "Avoid technical jargon",
            ],
        },
    );
    rules.task(
        ContentType::Conclusion,
        Task {
            instruction: "Write the overall audit conclusion.",
            fields: &[
                ("Overall Rating", "audit.rating"),
                ("Key Findings", "audit.keyFindings"),
            ],
            requirements: &[
                "State a clear opinion on the control environment",
                "Between 80 and 150 words",
            ],
        },
    );
    rules.task(
        ContentType::EngagementLetter,
        Task {
            instruction: "Draft an audit engagement letter addressed to the auditee.",
            fields: &[
                ("Auditee Contact", "audit.contact"),
                ("Audit Period", "audit.period"),
                ("Fieldwork Dates", "audit.fieldworkDates"),
            ],
            requirements: &[
                "Cover objectives, scope, timing, information requests and reporting",
                "Use a formal letter tone without a signature block",
            ],
        },
    );
    rules.add(ContentType::RiskControlMatrix, risk_control_matrix);
}
