//! Evaluation datasets.

use serde_json::Value;
use tracing::{debug, warn};

use plexus_core::{
    PlexusError, Result,
    config::DatasetConfig,
    types::{EvalInput, EvalInputItem},
};

/// Read a dataset file: a JSON array of records.
pub async fn load_dataset(config: &DatasetConfig) -> Result<EvalInput> {
    let content = tokio::fs::read_to_string(&config.file_path).await.map_err(|e| {
        PlexusError::configuration(format!(
            "Failed to read dataset `{}`: {e}",
            config.file_path.display()
        ))
    })?;
    let records: Value = serde_json::from_str(&content)?;
    let input = parse_dataset(records, config)?;
    debug!(
        "Loaded {} dataset items from {}",
        input.eval_input_items.len(),
        config.file_path.display()
    );
    Ok(input)
}

/// Turn dataset records into evaluation items.
///
/// Records without an id get their position as id. Records without a
/// question are rejected; a missing answer is kept as `null`.
pub fn parse_dataset(records: Value, config: &DatasetConfig) -> Result<EvalInput> {
    let Value::Array(records) = records else {
        return Err(PlexusError::validation(
            "A dataset must be a JSON array of records",
        ));
    };

    let mut items = Vec::with_capacity(records.len());
    for (position, record) in records.into_iter().enumerate() {
        let Value::Object(mut record) = record else {
            return Err(PlexusError::validation(format!(
                "Dataset record {position} is not an object"
            )));
        };
        let question = record.remove(&config.question_key).ok_or_else(|| {
            PlexusError::validation(format!(
                "Dataset record {position} has no `{}` field",
                config.question_key
            ))
        })?;
        let id = record
            .remove(&config.id_key)
            .unwrap_or_else(|| Value::from(position));
        let answer = record.remove(&config.answer_key).unwrap_or_else(|| {
            warn!("Dataset record {} has no `{}` field", position, config.answer_key);
            Value::Null
        });
        items.push(EvalInputItem::new(id, question, answer));
    }
    Ok(EvalInput {
        eval_input_items: items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_custom_keys() {
        let config = DatasetConfig {
            id_key: "qid".to_string(),
            question_key: "q".to_string(),
            answer_key: "a".to_string(),
            ..DatasetConfig::default()
        };
        let input = parse_dataset(json!([{"qid": "x1", "q": "2+2?", "a": "4"}, {"q": "?"}]), &config).unwrap();
        let items = input.eval_input_items;
        assert_eq!(items[0].id, json!("x1"));
        assert_eq!(items[0].input_obj, json!("2+2?"));
        assert_eq!(items[0].expected_output_obj, json!("4"));
        assert_eq!(items[1].id, json!(1));
        assert_eq!(items[1].expected_output_obj, Value::Null);
    }

    #[test]
    fn test_missing_question_rejected() {
        let err = parse_dataset(json!([{"answer": "4"}]), &DatasetConfig::default()).unwrap_err();
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_not_an_array() {
        assert!(parse_dataset(json!({"question": "?"}), &DatasetConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(&path, r#"[{"id": 1, "question": "hi", "answer": "hi"}]"#).unwrap();
        let config = DatasetConfig {
            file_path: path,
            ..DatasetConfig::default()
        };
        let input = load_dataset(&config).await.unwrap();
        assert_eq!(input.eval_input_items.len(), 1);
    }
}
