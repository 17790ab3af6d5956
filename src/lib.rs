pub mod columns;
pub mod config;
pub mod context;
pub mod data_utils;
pub mod error;
pub mod export;
pub mod llm;
pub mod loader;
pub mod preprocess;
pub mod prompts;
pub mod query;
pub mod record;
pub mod session;
pub mod summary;

pub use columns::{resolve, resolve_column, ColumnMapping};
pub use config::AppConfig;
pub use context::{build_dynamic_context, build_static_prompt, ContextExtras};
pub use error::{GrantScopeError, Result};
pub use llm::{LlmClient, TabularQueryEngine};
pub use loader::{load_grants, load_grants_from_slice};
pub use preprocess::{preprocess, PreprocessedTables};
pub use query::{ai_analysis, full_analysis, query_data, AnalysisOutcome};
pub use record::{GrantDataset, GrantRecord};
pub use session::{InteractionLog, Session};
