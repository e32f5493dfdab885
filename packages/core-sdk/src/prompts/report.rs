use crate::content_type::ContentType;

use super::{RuleTable, Task};

const PERIOD: (&str, &str) = ("Reporting Period", "report.period");
const AUDIENCE: (&str, &str) = ("Audience", "report.audience");
const METRICS: (&str, &str) = ("Metrics", "report.metrics");
const HIGHLIGHTS: (&str, &str) = ("Highlights", "report.highlights");

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::ReportTitle,
        Task {
            instruction: "Write a title for the report.",
            fields: &[PERIOD, AUDIENCE],
            requirements: &["Under 12 words", "Return a single title"],
        },
    );
    rules.task(
        ContentType::ReportIntroduction,
        Task {
            instruction: "Write the introduction of the report.",
            fields: &[PERIOD, AUDIENCE],
            requirements: &["Between 80 and 140 words", "State the purpose of the report and what it covers"],
        },
    );
    rules.task(
        ContentType::ReportBackground,
        Task {
            instruction: "Write the background section of the report.",
            fields: &[PERIOD, ("Prior Period Results", "report.priorResults")],
            requirements: &["Between 100 and 180 words"],
        },
    );
    rules.task(
        ContentType::ReportKeyFindings,
        Task {
            instruction: "List the key findings of the report.",
            fields: &[PERIOD, METRICS, HIGHLIGHTS],
            requirements: &[
                "Provide between 3 and 6 findings",
                "Quote the supporting figure in each finding where one is given",
            ],
        },
    );
    rules.task(
        ContentType::ReportTrendAnalysis,
        Task {
            instruction: "Analyse the trends shown by the metrics.",
            fields: &[PERIOD, METRICS, ("Comparison Period", "report.comparisonPeriod")],
            requirements: &[
                "Explain the direction and likely drivers of each trend",
                "Do not invent figures that are not supplied",
            ],
        },
    );
    rules.task(
        ContentType::ReportKpiCommentary,
        Task {
            instruction: "Write commentary on the key performance indicators.",
            fields: &[METRICS, ("Targets", "report.targets")],
            requirements: &["Compare each KPI with its target", "Explain any breach of tolerance"],
        },
    );
    rules.task(
        ContentType::ReportChartNarrative,
        Task {
            instruction: "Write the narrative that accompanies the chart.",
            fields: &[("Chart Type", "report.chartType"), METRICS],
            requirements: &["Between 40 and 90 words", "Describe the main message of the chart first"],
        },
    );
    rules.task(
        ContentType::ReportConclusion,
        Task {
            instruction: "Write the conclusion of the report.",
            fields: &[PERIOD, HIGHLIGHTS],
            requirements: &["Between 80 and 140 words"],
        },
    );
    rules.task(
        ContentType::ReportNextSteps,
        Task {
            instruction: "List the next steps arising from the report.",
            fields: &[HIGHLIGHTS, AUDIENCE],
            requirements: &["Provide between 3 and 6 steps", "Name an owner for each step"],
        },
    );
    rules.task(
        ContentType::ReportAppendix,
        Task {
            instruction: "Write an appendix describing data sources, definitions and methodology.",
            fields: &[METRICS, ("Data Sources", "report.dataSources")],
            requirements: &["Use short labelled sections"],
        },
    );
}
