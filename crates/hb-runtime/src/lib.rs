pub mod binding;
pub mod bridge;
mod dispatch;
mod engine;
pub mod registry;
mod report;
mod session;

pub use binding::{
    FunctionBinding, FunctionHandler, FunctionKind, GetterHandler, HandlerResult,
    PropertyBinding, SetterHandler,
};
pub use bridge::NullValue;
pub use dispatch::{Args, CallPhase, FunctionToken, HostException, Invocation};
pub use engine::SCRIPT_LOG_TARGET;
pub use registry::IdentityRegistry;
pub use session::{Script, Session};
