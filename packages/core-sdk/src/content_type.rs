use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};

/**
 * \brief 内容类型所属业务分类。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Audit,
    Privacy,
    Policy,
    Training,
    Resilience,
    VendorRisk,
    Report,
}

/**
 * \brief 期望的输出结构；决定提示词的格式要求以及返回结果的后处理方式。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /** \brief 纯文本段落。 */
    Text,
    /** \brief JSON 字符串数组。 */
    StringList,
    /** \brief 固定 schema 的 JSON 对象。 */
    JsonObject,
}

macro_rules! content_types {
    ($( $variant:ident => $key:literal, $label:literal, $category:ident, $shape:ident; )*) => {
        /**
         * \brief 生成请求的内容类型（封闭枚举）。
         */
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum ContentType {
            $( #[serde(rename = $key)] $variant, )*
        }

        impl ContentType {
            /** \brief 全部内容类型，按声明顺序。 */
            pub const ALL: &'static [ContentType] = &[$( ContentType::$variant, )*];

            /** \brief 序列化与存储使用的键。 */
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( ContentType::$variant => $key, )*
                }
            }

            /** \brief 提示词中使用的可读名称。 */
            pub fn label(&self) -> &'static str {
                match self {
                    $( ContentType::$variant => $label, )*
                }
            }

            pub fn category(&self) -> ContentCategory {
                match self {
                    $( ContentType::$variant => ContentCategory::$category, )*
                }
            }

            pub fn output_shape(&self) -> OutputShape {
                match self {
                    $( ContentType::$variant => OutputShape::$shape, )*
                }
            }
        }
    };
}

content_types! {
    Description => "description", "audit description", Audit, Text;
    Objectives => "objectives", "audit objectives", Audit, StringList;
    Scope => "scope", "audit scope statement", Audit, Text;
    Methodology => "methodology", "audit methodology", Audit, Text;
    Criteria => "criteria", "audit criteria", Audit, StringList;
    RiskAssessment => "risk_assessment", "risk assessment narrative", Audit, Text;
    ControlEvaluation => "control_evaluation", "control evaluation", Audit, Text;
    AuditProgram => "audit_program", "audit program", Audit, Text;
    TestingProcedures => "testing_procedures", "testing procedures", Audit, StringList;
    SamplingApproach => "sampling_approach", "sampling approach", Audit, Text;
    EvidenceRequirements => "evidence_requirements", "evidence requirements", Audit, StringList;
    Findings => "findings", "audit finding", Audit, Text;
    Recommendations => "recommendations", "audit recommendations", Audit, StringList;
    ManagementResponse => "management_response", "management response", Audit, Text;
    ActionPlan => "action_plan", "corrective action plan", Audit, Text;
    FollowUp => "follow_up", "follow-up plan", Audit, Text;
    ExecutiveSummary => "executive_summary", "executive summary", Audit, Text;
    Conclusion => "conclusion", "audit conclusion", Audit, Text;
    EngagementLetter => "engagement_letter", "engagement letter", Audit, Text;
    RiskControlMatrix => "risk_control_matrix", "risk and control matrix", Audit, JsonObject;

    PrivacyNotice => "privacy_notice", "privacy notice", Privacy, Text;
    DpiaDescription => "dpia_description", "data protection impact assessment description", Privacy, Text;
    ProcessingPurpose => "processing_purpose", "processing purpose statement", Privacy, Text;
    LawfulBasis => "lawful_basis", "lawful basis justification", Privacy, Text;
    DataCategories => "data_categories", "personal data categories", Privacy, StringList;
    DataRetention => "data_retention", "data retention statement", Privacy, Text;
    DataSubjectRights => "data_subject_rights", "data subject rights procedure", Privacy, Text;
    PrivacyRisks => "privacy_risks", "privacy risks", Privacy, StringList;
    PrivacyMitigations => "privacy_mitigations", "privacy risk mitigations", Privacy, Text;
    TransferAssessment => "transfer_assessment", "international data transfer assessment", Privacy, Text;
    BreachResponse => "breach_response", "data breach response procedure", Privacy, Text;
    ConsentStatement => "consent_statement", "consent statement", Privacy, Text;
    ProcessingRecord => "processing_record", "record of processing activities entry", Privacy, Text;

    PolicyPurpose => "policy_purpose", "policy purpose", Policy, Text;
    PolicyScope => "policy_scope", "policy scope", Policy, Text;
    PolicyStatement => "policy_statement", "policy statement", Policy, Text;
    RolesResponsibilities => "roles_responsibilities", "roles and responsibilities section", Policy, Text;
    PolicyDefinitions => "policy_definitions", "policy definitions", Policy, Text;
    PolicyCompliance => "policy_compliance", "policy compliance section", Policy, Text;
    PolicyExceptions => "policy_exceptions", "policy exceptions process", Policy, Text;
    PolicyReview => "policy_review", "policy review and maintenance section", Policy, Text;
    ProcedureSteps => "procedure_steps", "procedure steps", Policy, StringList;
    PolicySummary => "policy_summary", "policy summary", Policy, Text;

    TrainingDescription => "training_description", "training course description", Training, Text;
    LearningObjectives => "learning_objectives", "learning objectives", Training, StringList;
    TrainingOutline => "training_outline", "training outline", Training, Text;
    TrainingScenario => "training_scenario", "training scenario", Training, Text;
    QuizQuestions => "quiz_questions", "quiz questions", Training, StringList;
    KeyTakeaways => "key_takeaways", "key takeaways", Training, StringList;
    TrainingSummary => "training_summary", "training summary", Training, Text;
    CompletionCriteria => "completion_criteria", "completion criteria", Training, Text;

    ImpactAnalysis => "impact_analysis", "business impact analysis", Resilience, Text;
    CriticalProcesses => "critical_processes", "critical business processes", Resilience, StringList;
    RecoveryObjectives => "recovery_objectives", "recovery objectives", Resilience, Text;
    RecoveryStrategy => "recovery_strategy", "recovery strategy", Resilience, Text;
    ContinuityPlan => "continuity_plan", "business continuity plan section", Resilience, Text;
    CrisisCommunication => "crisis_communication", "crisis communication plan", Resilience, Text;
    IncidentScenario => "incident_scenario", "incident scenario", Resilience, Text;
    ExercisePlan => "exercise_plan", "resilience exercise plan", Resilience, Text;
    DependencyAnalysis => "dependency_analysis", "dependency analysis", Resilience, Text;
    LessonsLearned => "lessons_learned", "lessons learned report", Resilience, Text;

    VendorDescription => "vendor_description", "vendor description", VendorRisk, Text;
    VendorRiskAssessment => "vendor_risk_assessment", "vendor risk assessment", VendorRisk, Text;
    DueDiligenceQuestions => "due_diligence_questions", "due diligence questions", VendorRisk, StringList;
    VendorControls => "vendor_controls", "expected vendor controls", VendorRisk, StringList;
    ContractClauses => "contract_clauses", "contract clauses", VendorRisk, Text;
    VendorMonitoring => "vendor_monitoring", "vendor monitoring plan", VendorRisk, Text;
    VendorExitStrategy => "vendor_exit_strategy", "vendor exit strategy", VendorRisk, Text;
    VendorRiskSummary => "vendor_risk_summary", "vendor risk summary", VendorRisk, Text;
    VendorIssue => "vendor_issue", "vendor issue description", VendorRisk, Text;

    ReportTitle => "report_title", "report title", Report, Text;
    ReportIntroduction => "report_introduction", "report introduction", Report, Text;
    ReportBackground => "report_background", "report background", Report, Text;
    ReportKeyFindings => "report_key_findings", "key findings", Report, StringList;
    ReportTrendAnalysis => "report_trend_analysis", "trend analysis", Report, Text;
    ReportKpiCommentary => "report_kpi_commentary", "KPI commentary", Report, Text;
    ReportChartNarrative => "report_chart_narrative", "chart narrative", Report, Text;
    ReportConclusion => "report_conclusion", "report conclusion", Report, Text;
    ReportNextSteps => "report_next_steps", "next steps", Report, StringList;
    ReportAppendix => "report_appendix", "report appendix", Report, Text;
}

impl ContentType {
    /**
     * \brief 是否期望结构化（数组或对象）输出。
     */
    pub fn is_structured(&self) -> bool {
        !matches!(self.output_shape(), OutputShape::Text)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        ContentType::ALL
            .iter()
            .copied()
            .find(|ct| ct.as_str().eq_ignore_ascii_case(key))
            .ok_or_else(|| anyhow!("unknown content type: {}", s))
    }
}
