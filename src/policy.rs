// src/policy.rs
//
// Modelo de política de acesso geográfico e os dois caminhos de aplicação
// derivados dele (RLS declarativo e filtro do caminho privilegiado).

pub mod declarative;
pub mod filter;
pub mod model;

pub use filter::{AccessMode, PrivilegedQuery, ScopeFilter};
pub use model::{Decision, Resource, ResourceKind};
