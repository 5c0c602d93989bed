pub mod metadata;
pub mod results;

pub use metadata::EvalMetadata;
pub use results::{MetricsDocument, ResultWriter, SandboxRecord};
