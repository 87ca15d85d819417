pub fn generate_typescript_definitions(
    type_names: &[&str],
) -> Result<String, Box<dyn std::error::Error>> {
    if type_names.is_empty() {
        return Err("No type names provided".into());
    }

    let mut definitions = Vec::new();

    for name in type_names {
        let type_def = export_type(name)?;
        let cleaned = clean_type(type_def);

        if !cleaned.trim().is_empty() {
            definitions.push(cleaned);
        }
    }

    Ok(definitions.join("\n\n"))
}

/// Every type the editor extension consumes, in declaration order
pub const EXTENSION_TYPES: &[&str] = &[
    "QuestionData",
    "PromptFormat",
    "QuestionStatus",
    "QuestionView",
    "QuestionResponse",
    "AskQuestionRequest",
    "CreateQuestionRequest",
    "AnswerRequest",
    "CancelRequest",
    "PendingQuestionsResponse",
    "QuestionStats",
    "Platform",
    "HandlerFeature",
    "HandlerCapabilities",
    "WebviewMessage",
    "AnswerMessage",
    "StreamEvent",
    "ToolStatus",
    "CompletionStatus",
    "StreamState",
    "CompleteRequest",
    "StreamSummary",
    "StreamHealthReport",
    "ErrorResponse",
];

fn export_type(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    use crate::*;
    use ts_rs::TS;

    let result = match name {
        "QuestionData" => QuestionData::export_to_string()?,
        "PromptFormat" => PromptFormat::export_to_string()?,
        "QuestionStatus" => QuestionStatus::export_to_string()?,
        "QuestionView" => QuestionView::export_to_string()?,
        "QuestionResponse" => QuestionResponse::export_to_string()?,
        "AskQuestionRequest" => AskQuestionRequest::export_to_string()?,
        "CreateQuestionRequest" => CreateQuestionRequest::export_to_string()?,
        "AnswerRequest" => AnswerRequest::export_to_string()?,
        "CancelRequest" => CancelRequest::export_to_string()?,
        "PendingQuestionsResponse" => PendingQuestionsResponse::export_to_string()?,
        "QuestionStats" => QuestionStats::export_to_string()?,
        "Platform" => Platform::export_to_string()?,
        "HandlerFeature" => HandlerFeature::export_to_string()?,
        "HandlerCapabilities" => HandlerCapabilities::export_to_string()?,
        "WebviewMessage" => WebviewMessage::export_to_string()?,
        "AnswerMessage" => AnswerMessage::export_to_string()?,

        "StreamEvent" => StreamEvent::export_to_string()?,
        "ToolStatus" => ToolStatus::export_to_string()?,
        "CompletionStatus" => CompletionStatus::export_to_string()?,
        "StreamState" => StreamState::export_to_string()?,
        "CompleteRequest" => CompleteRequest::export_to_string()?,
        "StreamSummary" => StreamSummary::export_to_string()?,
        "StreamHealthReport" => StreamHealthReport::export_to_string()?,

        "ErrorResponse" => ErrorResponse::export_to_string()?,

        _ => {
            return Err(format!(
                "Unknown type: '{}'. Available types can be found in shared-types/src/",
                name
            )
            .into());
        }
    };

    Ok(result)
}

fn clean_type(mut type_def: String) -> String {
    type_def.retain(|c| c != '\r');

    let lines: Vec<&str> = type_def.lines().collect();

    let filtered: Vec<&str> = lines
        .iter()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("import type")
                && !trimmed.starts_with("// This file was generated")
        })
        .cloned()
        .collect();

    filtered.join("\n").trim().to_string()
}
