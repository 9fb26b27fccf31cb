//! Integration tests for dataset evaluation.

mod common;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::{path::Path, sync::Arc};

use common::{BrokenEvaluatorConfig, EchoConfig, ExactMatchConfig, FailOnBoomConfig, Recorders};
use plexus_core::{
    EvalBuilder, TypedConfig, WorkflowConfig,
    config::DatasetConfig,
    types::{EvalInput, EvalInputItem, IntermediateStepType},
};
use plexus_runtime::{
    EvaluationResults, EvaluationRun, SessionManager, WorkflowBuilder, eval::WORKFLOW_OUTPUT_FILE,
};

async fn evaluate(
    workflow: impl TypedConfig,
    output_dir: &Path,
    max_concurrency: i64,
    input: EvalInput,
) -> EvaluationResults {
    let registry = Arc::new(common::registry(&Recorders::default()));
    let config = WorkflowConfig::new()
        .with_workflow(workflow)
        .with_evaluator("exact", ExactMatchConfig {})
        .with_evaluator("broken", BrokenEvaluatorConfig {})
        .with_output_dir(output_dir)
        .with_max_concurrency(max_concurrency);

    WorkflowBuilder::from_config(&config, registry, |builder| async move {
        let sessions = SessionManager::new(Arc::new(builder.build()?), builder.get_max_concurrency());
        EvaluationRun::from_builder(&builder, sessions).run(input).await
    })
    .await
    .unwrap()
}

fn items(entries: &[(&str, &str)]) -> EvalInput {
    EvalInput {
        eval_input_items: entries
            .iter()
            .enumerate()
            .map(|(id, (question, answer))| EvalInputItem::new(id, *question, *answer))
            .collect(),
    }
}

#[tokio::test]
async fn test_failed_evaluator_does_not_affect_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let input = items(&[("hi", "hi"), ("yo", "yo"), ("x", "nope")]);

    let results = evaluate(EchoConfig::default(), dir.path(), 4, input).await;

    assert!(!results.workflow_interrupted);
    assert_eq!(results.evaluation_results.keys().collect::<Vec<_>>(), vec!["exact"]);
    let exact = &results.evaluation_results["exact"];
    let scores: Vec<&Value> = exact.eval_output_items.iter().map(|item| &item.score).collect();
    assert_eq!(scores, vec![&json!(1), &json!(1), &json!(0)]);
    let average = exact.average_score.unwrap();
    assert!((average - 2.0 / 3.0).abs() < 1e-9);

    for item in &results.eval_input.eval_input_items {
        assert_eq!(item.output_obj, item.input_obj);
        let types: Vec<_> = item.trajectory.iter().map(|step| step.event_type()).collect();
        assert_eq!(
            types,
            vec![IntermediateStepType::FunctionStart, IntermediateStepType::FunctionEnd]
        );
    }

    assert_eq!(
        results.output_files,
        vec![dir.path().join(WORKFLOW_OUTPUT_FILE), dir.path().join("exact_output.json")]
    );
    assert!(!dir.path().join("broken_output.json").exists());

    let written: Vec<EvalInputItem> =
        serde_json::from_slice(&std::fs::read(dir.path().join(WORKFLOW_OUTPUT_FILE)).unwrap()).unwrap();
    let written_outputs: Vec<&Value> = written.iter().map(|item| &item.output_obj).collect();
    assert_eq!(written_outputs, vec![&json!("hi"), &json!("yo"), &json!("x")]);
}

#[tokio::test]
async fn test_workflow_failure_interrupts_remaining_items() {
    let dir = tempfile::tempdir().unwrap();
    let input = items(&[("a", "a"), ("boom", "boom"), ("c", "c")]);

    let results = evaluate(FailOnBoomConfig {}, dir.path(), 1, input).await;

    assert!(results.workflow_interrupted);
    let outputs: Vec<&Value> = results
        .eval_input
        .eval_input_items
        .iter()
        .map(|item| &item.output_obj)
        .collect();
    assert_eq!(outputs, vec![&json!("a"), &Value::Null, &Value::Null]);

    let exact = &results.evaluation_results["exact"];
    assert_eq!(exact.eval_output_items.len(), 3);
}

#[tokio::test]
async fn test_run_dataset_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let dataset_path = dir.path().join("dataset.json");
    std::fs::write(
        &dataset_path,
        json!([
            {"id": "q1", "question": "ping", "answer": "ping!"},
            {"id": "q2", "question": "pong", "answer": "pong"},
        ])
        .to_string(),
    )
    .unwrap();
    let dataset = DatasetConfig {
        file_path: dataset_path,
        ..DatasetConfig::default()
    };
    let output_dir = dir.path().join("out");

    let registry = Arc::new(common::registry(&Recorders::default()));
    let config = WorkflowConfig::new()
        .with_workflow(EchoConfig {
            suffix: "!".to_string(),
        })
        .with_evaluator("exact", ExactMatchConfig {})
        .with_output_dir(&output_dir);

    let results = WorkflowBuilder::from_config(&config, registry, |builder| async move {
        let sessions = SessionManager::new(Arc::new(builder.build()?), builder.get_max_concurrency());
        EvaluationRun::from_builder(&builder, sessions)
            .run_dataset(&dataset)
            .await
    })
    .await
    .unwrap();

    let exact = &results.evaluation_results["exact"];
    assert_eq!(exact.eval_output_items[0].id, json!("q1"));
    assert_eq!(exact.eval_output_items[0].score, json!(1));
    assert_eq!(exact.eval_output_items[1].score, json!(0));
    assert!(output_dir.join("exact_output.json").exists());
}
