//! Method interceptor engine.
//!
//! Business methods are wrapped explicitly at construction time:
//!
//! 1. a [`PolicyTable`] maps each method to one policy (method, type, or layer)
//! 2. [`MethodInterceptor::wrap`] resolves that policy once
//! 3. every [`MonitoredMethod`] call records a timer, errors, and threshold breaches

mod engine;
mod guard;
mod policy_table;

pub use engine::{
    InterceptorDeps, METHOD_ERRORS_METRIC, MethodInterceptor, MonitoredMethod,
    THRESHOLD_EXCEEDED_METRIC,
};
pub use policy_table::PolicyTable;
