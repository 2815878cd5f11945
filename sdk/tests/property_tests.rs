use proptest::prelude::*;
use sdk::errors::{EngineError, EngineErrorExt};
use sdk::types::ToolInput;
use std::path::PathBuf;

proptest! {
    #[test]
    fn test_error_user_hint_completeness(detail in "\\PC*") {
        let errs = vec![
            EngineError::Config(detail.clone()),
            EngineError::NotFound(PathBuf::from(&detail)),
            EngineError::UnreadableBinary(PathBuf::from(&detail)),
            EngineError::Blocked(detail.clone()),
            EngineError::PermissionDenied(detail.clone()),
            EngineError::Transport(detail.clone()),
            EngineError::TextNotFound { path: PathBuf::from("f"), preview: detail.clone() },
            EngineError::EmptyModelResponse(detail.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            // Hints are static advice and never echo the raw detail back
            if detail.len() > 12 {
                prop_assert!(!hint.contains(detail.as_str()));
            }
        }
    }

    #[test]
    fn test_string_arguments_survive_decoding(key in "[a-z_]{1,12}", value in "\\PC*") {
        let raw = serde_json::json!({ key.clone(): value.clone() }).to_string();
        let input = ToolInput::from_json("t", &raw).unwrap();
        prop_assert_eq!(input.param_str(&key).unwrap(), value);
    }
}
