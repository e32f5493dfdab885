use crate::content_type::ContentType;
use crate::models::GenerationRequest;

use super::{render_task, RuleTable, Task};

const TOPIC: (&str, &str) = ("Topic", "training.topic");
const AUDIENCE: (&str, &str) = ("Audience", "training.audience");
const DURATION: (&str, &str) = ("Duration", "training.duration");
const LEVEL: (&str, &str) = ("Level", "training.level");

/**
 * \brief 题目数量可由 `training.questionCount` 指定，默认 5 道。
 */
fn quiz_questions(request: &GenerationRequest) -> String {
    let count = request
        .fields
        .lookup("training.questionCount")
        .and_then(|c| c.parse::<u32>().ok())
        .filter(|c| (1..=20).contains(c))
        .unwrap_or(5);
    let task = Task {
        instruction: "Write multiple-choice quiz questions that check understanding of the training.",
        fields: &[TOPIC, AUDIENCE, LEVEL],
        requirements: &[
            "Each item contains the question, four options labelled A to D, and the correct answer",
            "Test application of the material, not recall of definitions",
        ],
    };
    render_task(
        ContentType::QuizQuestions,
        &task,
        request,
        &[format!("Write exactly {} questions.", count)],
    )
}

pub(super) fn register(rules: &mut RuleTable) {
    rules.task(
        ContentType::TrainingDescription,
        Task {
            instruction: "Write the course description shown in the learning catalogue.",
            fields: &[TOPIC, AUDIENCE, DURATION],
            requirements: &["Between 80 and 140 words", "Explain why the course matters to the learner"],
        },
    );
    rules.task(
        ContentType::LearningObjectives,
        Task {
            instruction: "List the learning objectives for the course.",
            fields: &[TOPIC, AUDIENCE, LEVEL],
            requirements: &[
                "Provide between 3 and 6 objectives",
                "Begin each with 'Learners will be able to' followed by a measurable verb",
            ],
        },
    );
    rules.task(
        ContentType::TrainingOutline,
        Task {
            instruction: "Write a module-by-module outline for the course.",
            fields: &[TOPIC, DURATION, ("Delivery Format", "training.deliveryFormat")],
            requirements: &["Give each module a title, duration and two or three key points"],
        },
    );
    rules.task(
        ContentType::TrainingScenario,
        Task {
            instruction: "Write a realistic workplace scenario learners will discuss during the training.",
            fields: &[TOPIC, AUDIENCE],
            requirements: &[
                "Between 120 and 200 words",
                "End with two discussion questions",
                "Use fictional names and organisations",
            ],
        },
    );
    rules.add(ContentType::QuizQuestions, quiz_questions);
    rules.task(
        ContentType::KeyTakeaways,
        Task {
            instruction: "List the key takeaways learners should remember after the course.",
            fields: &[TOPIC, AUDIENCE],
            requirements: &["Provide between 3 and 6 takeaways", "Keep each under 25 words"],
        },
    );
    rules.task(
        ContentType::TrainingSummary,
        Task {
            instruction: "Write a closing summary for the course.",
            fields: &[TOPIC, AUDIENCE],
            requirements: &["Between 80 and 140 words", "Reinforce where learners can get further help"],
        },
    );
    rules.task(
        ContentType::CompletionCriteria,
        Task {
            instruction: "Write the completion criteria for the course.",
            fields: &[TOPIC, ("Pass Mark", "training.passMark"), DURATION],
            requirements: &["Cover attendance, assessment and attestation requirements"],
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::build_prompt;
    use serde_json::json;

    #[test]
    fn test_quiz_question_count_is_bounded() {
        let mut request = GenerationRequest::new("ollama", "mistral", ContentType::QuizQuestions);
        assert!(build_prompt(&request).contains("exactly 5 questions"));

        request.fields = serde_json::from_value(json!({"training": {"questionCount": "8"}}))
            .expect("fields");
        assert!(build_prompt(&request).contains("exactly 8 questions"));

        request.fields = serde_json::from_value(json!({"training": {"questionCount": 500}}))
            .expect("fields");
        assert!(build_prompt(&request).contains("exactly 5 questions"));
    }
}
