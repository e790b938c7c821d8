use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_EVAL_FILENAME: &str = "Eval()";

/// Engine limits use the engine's own convention: `0` means unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionOptions {
    pub eval_filename: String,
    pub max_call_args: usize,
    pub strict_variables: bool,
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_function_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            eval_filename: DEFAULT_EVAL_FILENAME.to_string(),
            max_call_args: 8,
            strict_variables: false,
            max_operations: 0,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1_000_000,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

impl SessionOptions {
    pub fn from_json_str(text: &str) -> Result<Self, BridgeError> {
        let options: Self =
            serde_json::from_str(text).map_err(|error| BridgeError::Config(error.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.eval_filename.is_empty() {
            return Err(BridgeError::Config(
                "evalFilename must not be empty".to_string(),
            ));
        }
        // The engine resolves wildcard parameters only up to this many arguments.
        if self.max_call_args > 16 {
            return Err(BridgeError::Config(format!(
                "maxCallArgs must be at most 16, got {}",
                self.max_call_args
            )));
        }
        Ok(())
    }
}
