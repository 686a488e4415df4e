//! Client for the external policy decision engine.
//!
//! The engine is any REST service exposing the OPA data API: the client
//! POSTs `{"input": …}` to `<base>/v1/data<policy_path>` and decodes the
//! `result` subtree of the reply. Decisions are never cached; every
//! mediated request consults the engine.

pub mod client;
pub mod decision;
pub mod error;

pub use client::PolicyClient;
pub use decision::{
    CREATE_POLICY, DELETE_POLICY, URL_POLICY, DecisionStatus, TokenSubject, UrlDecision,
    VolumeDecision, VolumeResponse,
};
pub use error::{PolicyError, PolicyResult};
