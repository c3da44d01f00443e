//! Query side of the pipeline: retrieval, graph lookup, chat and script
//! execution.

pub mod executor;
pub mod extract;
pub mod knowledge;
pub mod orchestrator;
pub mod prompts;

pub use executor::{ExecutionResult, ExecutorError, ScriptRunner};
pub use extract::extract_python_code;
pub use knowledge::{parse_graph_elements, GraphElement, GraphNode, KnowledgeGraphAgent};
pub use orchestrator::{render_hits, PipelineError, QueryOptions, RagContext};
