//! Expert chain behaviour: parsing, repair, terminal failure, and timeouts.

use std::sync::Arc;
use std::time::Duration;

use machina_rag::chain::{ChainStage, ExpertChain};
use machina_rag::error::RagError;
use machina_rag::mock::{ScriptedModel, ScriptedReply};
use machina_rag::schema::{FieldDescriptor, OutputSchema};
use serde_json::json;

fn tool_schema() -> OutputSchema {
    OutputSchema::build(&[
        FieldDescriptor::new("toolType", "string", "kind of cutting tool"),
        FieldDescriptor::new("diameter", "number", "tool diameter in inches"),
        FieldDescriptor::new("flutes", "bigint", "number of flutes"),
    ])
}

const GOOD: &str = r#"{"toolType": "flat endmill", "diameter": 0.5, "flutes": 3}"#;

#[tokio::test]
async fn well_formed_answer_parses_without_repair() {
    let model = Arc::new(ScriptedModel::with_texts([GOOD]));
    let chain = ExpertChain::new(model.clone());

    let response = chain.get_response("context", "Which tool?", &tool_schema()).await.unwrap();

    assert_eq!(response.repair_attempts, 0);
    assert_eq!(response.trace, [ChainStage::Pending, ChainStage::ModelCalled, ChainStage::Parsed]);
    assert_eq!(
        response.into_value(),
        json!({"toolType": "flat endmill", "diameter": 0.5, "flutes": 3})
    );
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn prompt_carries_context_query_and_schema() {
    let model = Arc::new(ScriptedModel::with_texts([GOOD]));
    let chain = ExpertChain::new(model.clone());

    chain
        .get_response("Use 3 flutes in aluminum.", "Pocket 10 in²?", &tool_schema())
        .await
        .unwrap();

    let requests = model.requests();
    assert!(requests[0].prompt.contains("Use 3 flutes in aluminum."));
    assert!(requests[0].prompt.contains("Pocket 10 in²?"));
    assert!(requests[0].prompt.contains("toolType"));
    let schema = requests[0].schema.as_ref().unwrap();
    assert_eq!(schema["properties"]["flutes"]["type"], "integer");
}

#[tokio::test]
async fn fenced_answer_is_accepted() {
    let fenced = format!("Here you go:\n```json\n{GOOD}\n```");
    let model = Arc::new(ScriptedModel::with_texts([fenced]));
    let response = ExpertChain::new(model).get_response("", "q", &tool_schema()).await.unwrap();
    assert_eq!(response.value["toolType"], "flat endmill");
}

#[tokio::test]
async fn malformed_answer_is_repaired_once() {
    let model = Arc::new(ScriptedModel::with_texts(["I recommend a flat endmill.", GOOD]));
    let chain = ExpertChain::new(model.clone());

    let response = chain.get_response("ctx", "Which tool?", &tool_schema()).await.unwrap();

    assert_eq!(response.repair_attempts, 1);
    assert_eq!(
        response.trace,
        [
            ChainStage::Pending,
            ChainStage::ModelCalled,
            ChainStage::ParseFailed,
            ChainStage::RepairAttempted,
            ChainStage::Parsed,
        ]
    );
    let repair = &model.requests()[1].prompt;
    assert!(repair.contains("I recommend a flat endmill."));
    assert!(repair.contains("Error:"));
}

#[tokio::test]
async fn schema_violation_triggers_repair() {
    let missing_field = r#"{"toolType": "drill", "diameter": 0.25}"#;
    let model = Arc::new(ScriptedModel::with_texts([missing_field, GOOD]));

    let response =
        ExpertChain::new(model.clone()).get_response("", "q", &tool_schema()).await.unwrap();

    assert_eq!(response.repair_attempts, 1);
    assert!(model.requests()[1].prompt.contains("flutes"));
}

#[tokio::test]
async fn repair_budget_exhaustion_is_terminal() {
    let model = Arc::new(ScriptedModel::with_texts(["nope", "still nope", "never"]));
    let chain = ExpertChain::new(model.clone()).max_repairs(2);

    let err = chain.get_response("", "q", &tool_schema()).await.unwrap_err();

    assert!(matches!(err, RagError::OutputParse { attempts: 3, .. }), "{err}");
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn model_error_is_not_repaired() {
    let model = Arc::new(ScriptedModel::new([
        ScriptedReply::Fail("connection refused".to_string()),
        ScriptedReply::Text(GOOD.to_string()),
    ]));

    let err =
        ExpertChain::new(model.clone()).get_response("", "q", &tool_schema()).await.unwrap_err();

    assert!(matches!(err, RagError::ModelError { .. }));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_model_times_out() {
    let model = Arc::new(ScriptedModel::new([ScriptedReply::Delayed(
        Duration::from_secs(300),
        GOOD.to_string(),
    )]));
    let chain = ExpertChain::new(model.clone()).timeout(Duration::from_secs(30));

    let err = chain.get_response("", "q", &tool_schema()).await.unwrap_err();

    assert!(matches!(err, RagError::ModelTimeout { seconds: 30 }), "{err}");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_during_repair_ends_request() {
    let model = Arc::new(ScriptedModel::new([
        ScriptedReply::Text("garbage".to_string()),
        ScriptedReply::Delayed(Duration::from_secs(500), GOOD.to_string()),
    ]));
    let chain = ExpertChain::new(model.clone()).timeout(Duration::from_secs(120));

    let err = chain.get_response("", "q", &tool_schema()).await.unwrap_err();

    assert!(matches!(err, RagError::ModelTimeout { .. }));
    assert_eq!(model.call_count(), 2);
}
