pub mod config;
pub mod environment;
pub mod observability;
pub mod resolver;
pub mod types;

pub use resolver::resolve;
pub use types::{
    BodyDescriptor, EnvMap, ExecutionResult, FormField, FormFields, FormValue, HeaderValue,
    Method, RequestDescriptor, ResponseSnapshot, ScriptContext, UrlEncodedContent,
};
