pub mod llm_agent;
pub mod narrative;
pub mod pipeline;
pub mod planner;
pub mod schema_context;
pub mod structure;
pub mod visualization;
