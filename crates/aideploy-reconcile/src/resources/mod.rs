//! Desired Service and Ingress synthesis
//!
//! Both are derived from the workload declaration and the desired
//! Deployment, so they always agree with it on name, namespace, and selector.

mod ingress;
mod service;

pub use ingress::desired_ingress;
pub use service::desired_service;

/// Name of the HTTP port on the generated Service
pub const HTTP_PORT_NAME: &str = "http";
